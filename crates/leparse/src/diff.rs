// Symbol-set diffing for incremental reindexing
//
// Symbols are matched by stable identity (kind + qualified name). Duplicates
// under one identity are paired by maximal line overlap, then in document
// order. Matched symbols inherit the old id so embeddings and feedback keyed
// by id survive edits elsewhere in the file.

use crate::symbol::{RelationTarget, Symbol, SymbolId, SymbolKind};
use std::collections::{HashMap, HashSet};

/// Classified change between two symbol sets of one file
#[derive(Debug, Clone, Default)]
pub struct SymbolDiff {
    /// New symbols with no counterpart
    pub added: Vec<Symbol>,
    /// Matched symbols whose body or signature changed
    pub modified: Vec<Symbol>,
    /// Matched symbols with identical body and signature (possibly moved)
    pub unchanged: Vec<Symbol>,
    /// Old symbols with no counterpart
    pub removed: Vec<Symbol>,
}

impl SymbolDiff {
    /// Whether nothing was added, modified or removed
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Symbols that need fresh embeddings
    pub fn changed(&self) -> impl Iterator<Item = &Symbol> {
        self.added.iter().chain(self.modified.iter())
    }

    /// Every symbol of the new set, sorted by position
    pub fn current(&self) -> Vec<&Symbol> {
        let mut all: Vec<&Symbol> = self
            .added
            .iter()
            .chain(self.modified.iter())
            .chain(self.unchanged.iter())
            .collect();
        all.sort_by_key(|s| (s.span.start_byte, s.span.end_byte, s.kind));
        all
    }
}

type Identity = (SymbolKind, String);

/// Diff an old symbol set against a freshly extracted one
pub fn diff_symbols(old: &[Symbol], new: Vec<Symbol>) -> SymbolDiff {
    let mut old_groups: HashMap<Identity, Vec<usize>> = HashMap::new();
    for (i, symbol) in old.iter().enumerate() {
        old_groups
            .entry((symbol.kind, symbol.qualified_name.clone()))
            .or_default()
            .push(i);
    }
    let mut new_groups: Vec<(Identity, Vec<usize>)> = Vec::new();
    let mut group_index: HashMap<Identity, usize> = HashMap::new();
    for (i, symbol) in new.iter().enumerate() {
        let key = (symbol.kind, symbol.qualified_name.clone());
        let slot = *group_index.entry(key.clone()).or_insert_with(|| {
            new_groups.push((key, Vec::new()));
            new_groups.len() - 1
        });
        new_groups[slot].1.push(i);
    }

    // new index -> old index
    let mut matched: HashMap<usize, usize> = HashMap::new();
    for (key, new_indices) in &new_groups {
        let Some(old_indices) = old_groups.get(key) else {
            continue;
        };
        for (n, o) in pair_by_overlap(old, &new, old_indices, new_indices) {
            matched.insert(n, o);
        }
    }

    // Final id for each new symbol
    let mut taken: HashSet<SymbolId> = old.iter().map(|s| s.id.clone()).collect();
    let mut remap: HashMap<SymbolId, SymbolId> = HashMap::new();
    for (i, symbol) in new.iter().enumerate() {
        if let Some(&o) = matched.get(&i) {
            remap.insert(symbol.id.clone(), old[o].id.clone());
        }
    }
    let inherited: HashSet<SymbolId> = remap.values().cloned().collect();
    for (i, symbol) in new.iter().enumerate() {
        if matched.contains_key(&i) {
            continue;
        }
        let mut id = symbol.id.clone();
        let mut ordinal = 0usize;
        while taken.contains(&id) || inherited.contains(&id) {
            id = SymbolId::derive(&symbol.unit.path, symbol.kind, &symbol.qualified_name, 1_000 + ordinal);
            ordinal += 1;
        }
        taken.insert(id.clone());
        remap.insert(symbol.id.clone(), id);
    }

    let mut diff = SymbolDiff::default();
    let used_old: HashSet<usize> = matched.values().copied().collect();
    for (i, mut symbol) in new.into_iter().enumerate() {
        rewrite_ids(&mut symbol, &remap);
        match matched.get(&i) {
            None => diff.added.push(symbol),
            Some(&o) => {
                let previous = &old[o];
                if previous.body_hash != symbol.body_hash || previous.signature != symbol.signature {
                    diff.modified.push(symbol);
                } else {
                    diff.unchanged.push(symbol);
                }
            }
        }
    }
    diff.removed = old
        .iter()
        .enumerate()
        .filter(|(i, _)| !used_old.contains(i))
        .map(|(_, s)| s.clone())
        .collect();
    diff
}

/// Pair duplicates of one identity: maximal line overlap first, document order after
fn pair_by_overlap(old: &[Symbol], new: &[Symbol], old_indices: &[usize], new_indices: &[usize]) -> Vec<(usize, usize)> {
    let mut candidates: Vec<(usize, usize, usize)> = Vec::new();
    for &n in new_indices {
        for &o in old_indices {
            let overlap = new[n].span.line_overlap(&old[o].span);
            if overlap > 0 {
                candidates.push((overlap, n, o));
            }
        }
    }
    candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut pairs = Vec::new();
    let mut used_new = HashSet::new();
    let mut used_old = HashSet::new();
    for (_, n, o) in candidates {
        if !used_new.contains(&n) && !used_old.contains(&o) {
            used_new.insert(n);
            used_old.insert(o);
            pairs.push((n, o));
        }
    }

    let rest_new = new_indices.iter().filter(|n| !used_new.contains(*n));
    let rest_old = old_indices.iter().filter(|o| !used_old.contains(*o));
    pairs.extend(rest_new.zip(rest_old).map(|(n, o)| (*n, *o)));
    pairs
}

fn rewrite_ids(symbol: &mut Symbol, remap: &HashMap<SymbolId, SymbolId>) {
    if let Some(id) = remap.get(&symbol.id) {
        symbol.id = id.clone();
    }
    if let Some(parent) = symbol.parent.as_mut() {
        if let Some(id) = remap.get(parent) {
            *parent = id.clone();
        }
    }
    for relation in &mut symbol.relations {
        if let RelationTarget::Resolved(target) = &mut relation.target {
            if let Some(id) = remap.get(target) {
                *target = id.clone();
            }
        }
    }
}
