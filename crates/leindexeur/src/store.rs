// Index state
//
// *Le Magasin* (The Store) - Committed source units, their symbols, the
// name index, the vector index and feedback. Every mutation for one file is
// a single `apply` call made under the engine's write lock.

use crate::error::IndexError;
use lemotif::{base_names, PatternDetector, PatternMatch, PatternSubject};
use lerecherche::vector::validate_vector;
use lerecherche::{EmbeddingRecord, FeedbackStore, RecordMetadata, VectorError, VectorIndex};
use leparse::source::SourceUnit;
use leparse::symbol::{RelationKind, RelationTarget, Symbol, SymbolId, SymbolKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::{debug, warn};

/// How many recent paths and symbol names feed query context hints
pub const RECENT_CAPACITY: usize = 16;

/// Committed state of one file
#[derive(Debug, Clone)]
pub struct UnitEntry {
    /// Committed version descriptor
    pub unit: SourceUnit,
    /// Symbols in document order
    pub symbol_ids: Vec<SymbolId>,
    /// Symbols that have a vector
    pub embedded: BTreeSet<SymbolId>,
}

/// Everything one commit replaces for a file
#[derive(Debug, Clone)]
pub struct UnitUpdate {
    /// New version descriptor
    pub unit: SourceUnit,
    /// Full symbol set of the new version, in document order
    pub symbols: Vec<Symbol>,
    /// Records to insert or replace
    pub upserts: Vec<EmbeddingRecord>,
    /// Records to delete
    pub deletes: Vec<SymbolId>,
    /// Names of symbols added or modified by this update
    pub changed_names: Vec<String>,
}

/// Counts from one commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    /// Symbols now held for the file
    pub symbols: usize,
    /// Vectors written
    pub upserted: usize,
    /// Vectors deleted
    pub deleted: usize,
}

/// One relation with its current cross-file resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRelation {
    /// Relation kind
    pub kind: RelationKind,
    /// Target name as written at the site
    pub name: String,
    /// Matching definitions; empty when the reference is unresolved
    pub targets: Vec<SymbolId>,
}

/// Index state shared by the pipeline and queries
#[derive(Debug)]
pub struct IndexState {
    units: HashMap<String, UnitEntry>,
    symbols: HashMap<SymbolId, Symbol>,
    /// Lowercased name and qualified name to symbol ids
    by_name: HashMap<String, BTreeSet<SymbolId>>,
    vectors: VectorIndex,
    feedback: FeedbackStore,
    recent_paths: VecDeque<String>,
    recent_symbols: VecDeque<String>,
}

/// Metadata stored with a symbol's vector
pub fn record_metadata(symbol: &Symbol) -> RecordMetadata {
    RecordMetadata {
        language: symbol.language,
        path: symbol.unit.path.clone(),
        kind: symbol.kind,
        modified_at: symbol.modified_at,
        author: symbol.author.clone(),
    }
}

fn name_keys(symbol: &Symbol) -> Vec<String> {
    let name = symbol.name.to_lowercase();
    let qualified = symbol.qualified_name.to_lowercase();
    if name == qualified {
        vec![name]
    } else {
        vec![name, qualified]
    }
}

fn push_recent(queue: &mut VecDeque<String>, value: String) {
    queue.retain(|v| *v != value);
    queue.push_front(value);
    queue.truncate(RECENT_CAPACITY);
}

impl IndexState {
    /// Empty state over a vector index
    pub fn new(vectors: VectorIndex) -> Self {
        Self {
            units: HashMap::new(),
            symbols: HashMap::new(),
            by_name: HashMap::new(),
            vectors,
            feedback: FeedbackStore::new(),
            recent_paths: VecDeque::new(),
            recent_symbols: VecDeque::new(),
        }
    }

    /// Replace everything held for `update.unit.path`.
    ///
    /// Vectors are validated and written before the previous version is
    /// dropped. A failed write restores the vectors it touched, so a rejected
    /// update leaves the previous version intact.
    pub fn apply(&mut self, update: UnitUpdate) -> Result<ApplySummary, VectorError> {
        let dimension = self.vectors.dimension();
        for record in &update.upserts {
            validate_vector(&record.vector, dimension)?;
        }

        let prior: Vec<(SymbolId, Option<EmbeddingRecord>)> = update
            .deletes
            .iter()
            .chain(update.upserts.iter().map(|r| &r.id))
            .map(|id| (id.clone(), self.vectors.get(id).cloned()))
            .collect();

        let mut summary = ApplySummary::default();
        for id in &update.deletes {
            if self.vectors.delete(id) {
                summary.deleted += 1;
            }
        }
        let mut written = Vec::with_capacity(update.upserts.len());
        for record in update.upserts {
            let id = record.id.clone();
            if let Err(err) = self.vectors.upsert(record) {
                self.restore_vectors(prior);
                return Err(err);
            }
            written.push(id);
            summary.upserted += 1;
        }

        let path = update.unit.path.clone();
        let mut embedded = match self.units.remove(&path) {
            Some(old) => {
                for id in &old.symbol_ids {
                    self.forget_symbol(id);
                }
                old.embedded
            }
            None => BTreeSet::new(),
        };
        for id in &update.deletes {
            embedded.remove(id);
        }
        embedded.extend(written);

        let mut symbol_ids = Vec::with_capacity(update.symbols.len());
        for symbol in update.symbols {
            for key in name_keys(&symbol) {
                self.by_name.entry(key).or_default().insert(symbol.id.clone());
            }
            symbol_ids.push(symbol.id.clone());
            self.symbols.insert(symbol.id.clone(), symbol);
        }
        summary.symbols = symbol_ids.len();

        push_recent(&mut self.recent_paths, path.clone());
        for name in update.changed_names {
            push_recent(&mut self.recent_symbols, name);
        }
        self.units.insert(
            path,
            UnitEntry {
                unit: update.unit,
                symbol_ids,
                embedded,
            },
        );
        Ok(summary)
    }

    /// Put back the vectors captured before a failed write, oldest state last
    fn restore_vectors(&mut self, prior: Vec<(SymbolId, Option<EmbeddingRecord>)>) {
        for (id, record) in prior.into_iter().rev() {
            match record {
                Some(record) => {
                    if let Err(err) = self.vectors.upsert(record) {
                        warn!(id = %id, error = %err, "Could not restore vector");
                    }
                }
                None => {
                    self.vectors.delete(&id);
                }
            }
        }
    }

    fn forget_symbol(&mut self, id: &SymbolId) {
        if let Some(symbol) = self.symbols.remove(id) {
            for key in name_keys(&symbol) {
                if let Some(ids) = self.by_name.get_mut(&key) {
                    ids.remove(id);
                    if ids.is_empty() {
                        self.by_name.remove(&key);
                    }
                }
            }
        }
    }

    /// Drop a file with its symbols and vectors; returns the symbol count
    pub fn remove_unit(&mut self, path: &str) -> Option<usize> {
        let entry = self.units.remove(path)?;
        for id in &entry.embedded {
            self.vectors.delete(id);
        }
        for id in &entry.symbol_ids {
            self.forget_symbol(id);
        }
        self.recent_paths.retain(|p| p != path);
        Some(entry.symbol_ids.len())
    }

    /// Committed entry for a path
    pub fn unit(&self, path: &str) -> Option<&UnitEntry> {
        self.units.get(path)
    }

    /// Committed paths, sorted
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.units.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    /// Symbols of a file in document order
    pub fn symbols_of(&self, path: &str) -> Vec<&Symbol> {
        self.units
            .get(path)
            .map(|u| u.symbol_ids.iter().filter_map(|id| self.symbols.get(id)).collect())
            .unwrap_or_default()
    }

    /// Symbol by id
    pub fn symbol(&self, id: &SymbolId) -> Option<&Symbol> {
        self.symbols.get(id)
    }

    /// All symbols, unordered
    pub fn all_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    /// Ids whose name or qualified name equals `name` (case-insensitive)
    pub fn lookup_name(&self, name: &str) -> impl Iterator<Item = &SymbolId> {
        self.by_name.get(&name.to_lowercase()).into_iter().flatten()
    }

    /// Vector index
    pub fn vectors(&self) -> &VectorIndex {
        &self.vectors
    }

    /// Feedback counts
    pub fn feedback(&self) -> &FeedbackStore {
        &self.feedback
    }

    /// Mutable feedback counts
    pub fn feedback_mut(&mut self) -> &mut FeedbackStore {
        &mut self.feedback
    }

    /// Recently committed paths, most recent first
    pub fn recent_paths(&self) -> Vec<String> {
        self.recent_paths.iter().cloned().collect()
    }

    /// Recently changed symbol names, most recent first
    pub fn recent_symbols(&self) -> Vec<String> {
        self.recent_symbols.iter().cloned().collect()
    }

    /// Number of symbols
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Number of committed files
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Whether the symbol's version is the committed version of its file
    pub fn check(&self, symbol: &Symbol) -> Result<(), IndexError> {
        let current = self.units.get(&symbol.unit.path).map(|u| u.unit.version);
        if current == Some(symbol.unit.version) {
            Ok(())
        } else {
            Err(IndexError::IndexConsistency {
                symbol: symbol.id.clone(),
                path: symbol.unit.path.clone(),
                symbol_version: symbol.unit.version,
                current_version: current,
            })
        }
    }

    /// Cosine similarity of the query to the symbol's vector, falling back to
    /// the enclosing definition's vector for unembedded symbols
    pub fn similarity(&self, query: &[f32], symbol: &Symbol) -> f32 {
        self.vectors
            .similarity_to(query, &symbol.id)
            .or_else(|| symbol.parent.as_ref().and_then(|p| self.vectors.similarity_to(query, p)))
            .unwrap_or(0.0)
    }

    /// Relations of a symbol, resolved across files by name.
    ///
    /// Intra-file targets that no longer exist are reported unresolved.
    pub fn resolve_relations(&self, symbol: &Symbol) -> Vec<ResolvedRelation> {
        symbol
            .relations
            .iter()
            .map(|relation| match &relation.target {
                RelationTarget::Resolved(id) => {
                    let name = self.symbols.get(id).map(|s| s.name.clone()).unwrap_or_default();
                    let targets = if self.symbols.contains_key(id) {
                        vec![id.clone()]
                    } else {
                        warn!(symbol = %symbol.id, target = %id, "Resolved relation points at a pruned symbol");
                        Vec::new()
                    };
                    ResolvedRelation {
                        kind: relation.kind,
                        name,
                        targets,
                    }
                }
                RelationTarget::Unresolved { name } => ResolvedRelation {
                    kind: relation.kind,
                    name: name.clone(),
                    targets: self.definitions_named(relation.kind, name),
                },
            })
            .collect()
    }

    fn definitions_named(&self, kind: RelationKind, name: &str) -> Vec<SymbolId> {
        let simple = leparse::traits::last_segment(name);
        let wanted = |s: &Symbol| match kind {
            RelationKind::Calls => matches!(s.kind, SymbolKind::Function | SymbolKind::Class),
            RelationKind::Extends => s.kind == SymbolKind::Class,
            RelationKind::Imports => s.kind.is_definition(),
        };
        let mut targets: Vec<SymbolId> = self
            .lookup_name(simple)
            .filter_map(|id| self.symbols.get(id))
            .filter(|s| wanted(s) && s.name.eq_ignore_ascii_case(simple))
            .map(|s| s.id.clone())
            .collect();
        targets.sort();
        targets
    }

    /// Pattern matches of a class or function symbol
    pub fn patterns_for(&self, symbol: &Symbol, detector: &PatternDetector) -> Vec<PatternMatch> {
        if !matches!(symbol.kind, SymbolKind::Class | SymbolKind::Function) {
            return Vec::new();
        }
        let members: Vec<&Symbol> = self
            .symbols_of(&symbol.unit.path)
            .into_iter()
            .filter(|s| s.parent.as_ref() == Some(&symbol.id))
            .collect();
        let bases = base_names(symbol, |id| self.symbols.get(id).map(|s| s.name.clone()));
        detector.detect(&PatternSubject::new(symbol, members, bases))
    }

    /// Remove symbols whose version is not the committed one, their vectors,
    /// and feedback for symbols that no longer exist; returns symbols removed
    pub fn prune_stale(&mut self) -> usize {
        let stale: Vec<SymbolId> = self
            .symbols
            .values()
            .filter(|s| self.check(s).is_err())
            .map(|s| s.id.clone())
            .collect();
        for id in &stale {
            warn!(symbol = %id, "Pruning symbol of a superseded version");
            self.vectors.delete(id);
            self.forget_symbol(id);
        }
        for entry in self.units.values_mut() {
            entry.symbol_ids.retain(|id| self.symbols.contains_key(id));
            entry.embedded.retain(|id| self.symbols.contains_key(id));
        }
        let symbols = &self.symbols;
        let dropped = self.feedback.retain(|id| symbols.contains_key(id));
        debug!(stale = stale.len(), feedback = dropped, "Pruned stale entries");
        stale.len()
    }

    /// Insert a symbol without a commit; only used to exercise consistency checks
    #[cfg(test)]
    pub(crate) fn insert_orphan(&mut self, symbol: Symbol) {
        for key in name_keys(&symbol) {
            self.by_name.entry(key).or_default().insert(symbol.id.clone());
        }
        self.symbols.insert(symbol.id.clone(), symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leparse::ast::Span;
    use leparse::grammar::LanguageId;
    use leparse::symbol::{Relation, UnitRef};

    fn unit(path: &str, version: u64) -> SourceUnit {
        SourceUnit::new(path, LanguageId::Python, "").with_version(version)
    }

    fn symbol(path: &str, version: u64, name: &str, kind: SymbolKind) -> Symbol {
        Symbol {
            id: SymbolId::derive(path, kind, name, 0),
            name: name.to_string(),
            qualified_name: name.to_string(),
            kind,
            language: LanguageId::Python,
            unit: UnitRef {
                path: path.to_string(),
                version,
            },
            span: Span::default(),
            signature: String::new(),
            body_hash: String::new(),
            snippet: String::new(),
            parent: None,
            relations: Vec::new(),
            shape: None,
            modified_at: Default::default(),
            author: None,
        }
    }

    fn record(symbol: &Symbol, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            id: symbol.id.clone(),
            vector,
            metadata: record_metadata(symbol),
        }
    }

    fn update(unit: SourceUnit, symbols: Vec<Symbol>, upserts: Vec<EmbeddingRecord>, deletes: Vec<SymbolId>) -> UnitUpdate {
        UnitUpdate {
            unit,
            symbols,
            upserts,
            deletes,
            changed_names: Vec::new(),
        }
    }

    #[test]
    fn test_apply_replaces_file_atomically() {
        let mut state = IndexState::new(VectorIndex::in_memory(2));
        let foo = symbol("a.py", 1, "foo", SymbolKind::Function);
        state
            .apply(update(unit("a.py", 1), vec![foo.clone()], vec![record(&foo, vec![1.0, 0.0])], vec![]))
            .expect("apply");
        assert_eq!(state.lookup_name("FOO").count(), 1);
        assert_eq!(state.vectors().len(), 1);

        // A bad vector leaves version 1 in place
        let bar = symbol("a.py", 2, "bar", SymbolKind::Function);
        let err = state
            .apply(update(unit("a.py", 2), vec![bar.clone()], vec![record(&bar, vec![1.0])], vec![foo.id.clone()]))
            .unwrap_err();
        assert!(matches!(err, VectorError::DimensionMismatch { .. }));
        assert_eq!(state.unit("a.py").map(|u| u.unit.version), Some(1));
        assert!(state.symbol(&foo.id).is_some());

        state
            .apply(update(unit("a.py", 2), vec![bar.clone()], vec![record(&bar, vec![0.0, 1.0])], vec![foo.id.clone()]))
            .expect("apply");
        assert!(state.symbol(&foo.id).is_none());
        assert_eq!(state.lookup_name("foo").count(), 0);
        assert_eq!(state.vectors().len(), 1);
        assert_eq!(state.unit("a.py").map(|u| u.embedded.len()), Some(1));
    }

    #[test]
    fn test_remove_unit_cascades() {
        let mut state = IndexState::new(VectorIndex::in_memory(2));
        let foo = symbol("a.py", 1, "foo", SymbolKind::Function);
        state
            .apply(update(unit("a.py", 1), vec![foo.clone()], vec![record(&foo, vec![1.0, 0.0])], vec![]))
            .expect("apply");
        assert_eq!(state.remove_unit("a.py"), Some(1));
        assert_eq!(state.symbol_count(), 0);
        assert!(state.vectors().is_empty());
        assert_eq!(state.remove_unit("a.py"), None);
    }

    #[test]
    fn test_cross_file_resolution() {
        let mut state = IndexState::new(VectorIndex::in_memory(2));
        let mut call = symbol("a.py", 1, "bar", SymbolKind::Call);
        call.relations.push(Relation::unresolved(RelationKind::Calls, "bar"));
        let bar = symbol("b.py", 1, "bar", SymbolKind::Function);
        state.apply(update(unit("a.py", 1), vec![call.clone()], vec![], vec![])).expect("apply");
        state.apply(update(unit("b.py", 1), vec![bar.clone()], vec![], vec![])).expect("apply");

        let resolved = state.resolve_relations(&call);
        assert_eq!(resolved[0].targets, vec![bar.id.clone()]);

        state.remove_unit("b.py");
        let resolved = state.resolve_relations(&call);
        assert!(resolved[0].targets.is_empty());
        assert_eq!(resolved[0].name, "bar");
    }

    #[test]
    fn test_stale_symbols_are_advisory_and_pruned() {
        let mut state = IndexState::new(VectorIndex::in_memory(2));
        let current = symbol("a.py", 2, "foo", SymbolKind::Function);
        state.apply(update(unit("a.py", 2), vec![current.clone()], vec![], vec![])).expect("apply");
        let mut stale = symbol("a.py", 1, "old", SymbolKind::Function);
        stale.id = SymbolId::from("stale");
        state.insert_orphan(stale.clone());
        state.feedback_mut().record(&SymbolId::from("gone"), lerecherche::FeedbackSignal::Accept);

        let err = state.check(&stale).unwrap_err();
        assert_eq!(err.kind(), "index_consistency");
        assert!(state.check(&current).is_ok());

        assert_eq!(state.prune_stale(), 1);
        assert!(state.symbol(&stale.id).is_none());
        assert!(state.feedback().is_empty());
    }

    #[test]
    fn test_recent_paths_most_recent_first() {
        let mut state = IndexState::new(VectorIndex::in_memory(2));
        for path in ["a.py", "b.py", "a.py"] {
            state.apply(update(unit(path, 1), vec![], vec![], vec![])).expect("apply");
        }
        assert_eq!(state.recent_paths(), vec!["a.py", "b.py"]);
    }
}
