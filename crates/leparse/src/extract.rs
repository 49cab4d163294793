// Symbol extraction
//
// One deterministic document-order walk over the arena. Definitions open a
// scope; `impl` blocks (Rust) and receiver types (Go) attach their members to
// a type declared elsewhere in the file. Intra-file relations are resolved
// right after the walk; everything else stays unresolved for deferred
// cross-file resolution.

use crate::ast::{attr, AstNode, NodeId};
use crate::languages::LanguageRegistry;
use crate::parser::ParsedTree;
use crate::shape::ShapeTree;
use crate::source::{content_hash, SourceUnit};
use crate::symbol::{Relation, RelationKind, RelationTarget, Symbol, SymbolId, SymbolKind, UnitRef};
use crate::traits::{last_segment, Error, LanguageSupport, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Default cap on snippet length, in characters
pub const DEFAULT_SNIPPET_CHARS: usize = 2000;
const SIGNATURE_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Module,
    Class,
    Function,
    /// `impl` block: members attach to a type by name
    Impl,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    prefix: String,
    symbol: Option<usize>,
    owner: Option<String>,
}

enum Frame {
    Enter(NodeId),
    Exit,
}

/// Symbol extractor service
#[derive(Debug, Clone)]
pub struct SymbolExtractor {
    registry: Arc<LanguageRegistry>,
    snippet_chars: usize,
}

struct Walk<'a> {
    tree: &'a ParsedTree,
    unit: &'a SourceUnit,
    support: &'a dyn LanguageSupport,
    snippet_chars: usize,
    symbols: Vec<Symbol>,
    ordinals: HashMap<(SymbolKind, String), usize>,
    scopes: Vec<Scope>,
    /// (symbol index, owner type name) for members declared outside their type
    pending_owner: Vec<(usize, String)>,
    /// (type name, base name) from `impl Trait for Type`
    pending_extends: Vec<(String, String)>,
}

impl SymbolExtractor {
    /// Create an extractor
    pub fn new(registry: Arc<LanguageRegistry>) -> Self {
        Self {
            registry,
            snippet_chars: DEFAULT_SNIPPET_CHARS,
        }
    }

    /// Override the snippet cap
    #[must_use]
    pub fn with_snippet_chars(mut self, chars: usize) -> Self {
        self.snippet_chars = chars;
        self
    }

    /// Extract symbols from a parsed tree, in document order
    pub fn extract(&self, tree: &ParsedTree, unit: &SourceUnit) -> Result<Vec<Symbol>> {
        let support = self
            .registry
            .get(tree.language)
            .ok_or_else(|| Error::UnsupportedLanguage(tree.language.to_string()))?;

        let mut walk = Walk {
            tree,
            unit,
            support: support.as_ref(),
            snippet_chars: self.snippet_chars,
            symbols: Vec::new(),
            ordinals: HashMap::new(),
            scopes: vec![Scope {
                kind: ScopeKind::Module,
                prefix: String::new(),
                symbol: None,
                owner: None,
            }],
            pending_owner: Vec::new(),
            pending_extends: Vec::new(),
        };
        walk.run();
        walk.attach_owners();
        let symbols = resolve_local(walk.symbols);

        debug!(path = %unit.path, symbols = symbols.len(), "Extracted symbols");
        Ok(symbols)
    }
}

impl<'a> Walk<'a> {
    fn run(&mut self) {
        let tree = self.tree;
        let arena = &tree.arena;
        let mut frames = vec![Frame::Enter(arena.root())];

        while let Some(frame) = frames.pop() {
            let id = match frame {
                Frame::Exit => {
                    self.scopes.pop();
                    continue;
                }
                Frame::Enter(id) => id,
            };
            let node = arena.node(id);
            let mut descend = true;

            if id != arena.root() {
                match self.support.symbol_kind(node) {
                    Some(kind @ (SymbolKind::Function | SymbolKind::Class)) => {
                        if let Some(name) = node.name() {
                            let index = self.definition(id, node, kind, name);
                            let scope_kind = match kind {
                                SymbolKind::Class => ScopeKind::Class,
                                _ => ScopeKind::Function,
                            };
                            let prefix = self.symbols[index].qualified_name.clone();
                            self.scopes.push(Scope {
                                kind: scope_kind,
                                prefix,
                                symbol: Some(index),
                                owner: None,
                            });
                            frames.push(Frame::Exit);
                        }
                    }
                    Some(SymbolKind::Import) => {
                        for target in node.attrs.list(attr::IMPORT) {
                            self.import(id, node, target);
                        }
                        descend = false;
                    }
                    Some(SymbolKind::Call) => {
                        if let Some(callee) = node.attrs.get(attr::CALLEE) {
                            self.call(id, node, callee);
                        }
                    }
                    Some(SymbolKind::Variable) => {
                        let at_member_level = matches!(
                            self.scope().kind,
                            ScopeKind::Module | ScopeKind::Class | ScopeKind::Impl
                        );
                        if let (true, Some(name)) = (at_member_level, node.name()) {
                            self.variable(id, node, name);
                        }
                    }
                    None => {
                        if let Some(owner) = node.attrs.get(attr::SCOPE) {
                            for base in node.attrs.list(attr::EXTENDS) {
                                self.pending_extends.push((owner.to_string(), base.to_string()));
                            }
                            self.scopes.push(Scope {
                                kind: ScopeKind::Impl,
                                prefix: owner.to_string(),
                                symbol: None,
                                owner: Some(owner.to_string()),
                            });
                            frames.push(Frame::Exit);
                        }
                    }
                }
            }

            if descend {
                frames.extend(node.children.iter().rev().map(|child| Frame::Enter(*child)));
            }
        }
    }

    fn scope(&self) -> &Scope {
        // The module scope is never popped
        &self.scopes[self.scopes.len() - 1]
    }

    fn enclosing_symbol(&self) -> Option<usize> {
        self.scopes.iter().rev().find_map(|s| s.symbol)
    }

    fn qualify(&self, name: &str) -> String {
        let prefix = &self.scope().prefix;
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}::{}", prefix, name)
        }
    }

    fn next_id(&mut self, kind: SymbolKind, qualified: &str) -> SymbolId {
        let ordinal = self.ordinals.entry((kind, qualified.to_string())).or_insert(0);
        let id = SymbolId::derive(&self.unit.path, kind, qualified, *ordinal);
        *ordinal += 1;
        id
    }

    fn definition(&mut self, id: NodeId, node: &AstNode, kind: SymbolKind, name: &str) -> usize {
        let owner = node
            .attrs
            .get(attr::OWNER)
            .map(str::to_string)
            .or_else(|| self.scope().owner.clone());
        let qualified = match (&owner, self.scope().kind) {
            (Some(owner), ScopeKind::Module) => format!("{}::{}", owner, name),
            _ => self.qualify(name),
        };
        let parent = self.enclosing_symbol().map(|i| self.symbols[i].id.clone());

        let mut relations = Vec::new();
        for base in node.attrs.list(attr::EXTENDS) {
            relations.push(Relation::unresolved(RelationKind::Extends, base));
        }
        let shape = ShapeTree::from_arena(&self.tree.arena, id, self.support.self_names());
        let index = self.emit(id, node, kind, name, &qualified, parent, relations, Some(shape));

        if let Some(owner) = owner {
            if self.enclosing_symbol().is_none() {
                self.pending_owner.push((index, owner));
            }
        }
        index
    }

    fn import(&mut self, id: NodeId, node: &AstNode, target: &str) {
        let parent = self.enclosing_symbol().map(|i| self.symbols[i].id.clone());
        let name = last_segment(target).to_string();
        let relations = vec![Relation::unresolved(RelationKind::Imports, target)];
        self.emit(id, node, SymbolKind::Import, &name, target, parent, relations, None);
    }

    fn call(&mut self, id: NodeId, node: &AstNode, callee: &str) {
        let enclosing = self.enclosing_symbol();
        let parent = enclosing.map(|i| self.symbols[i].id.clone());
        let qualified = self.qualify(callee);
        let relation = Relation::unresolved(RelationKind::Calls, callee);
        if let Some(owner) = enclosing {
            let relations = &mut self.symbols[owner].relations;
            if !relations.contains(&relation) {
                relations.push(relation.clone());
            }
        }
        self.emit(id, node, SymbolKind::Call, callee, &qualified, parent, vec![relation], None);
    }

    fn variable(&mut self, id: NodeId, node: &AstNode, name: &str) {
        let parent = self.enclosing_symbol().map(|i| self.symbols[i].id.clone());
        let qualified = self.qualify(name);
        self.emit(id, node, SymbolKind::Variable, name, &qualified, parent, Vec::new(), None);
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &mut self,
        id: NodeId,
        node: &AstNode,
        kind: SymbolKind,
        name: &str,
        qualified: &str,
        parent: Option<SymbolId>,
        relations: Vec<Relation>,
        shape: Option<ShapeTree>,
    ) -> usize {
        let tree = self.tree;
        let text = tree.arena.text(id, &tree.source);
        let symbol = Symbol {
            id: self.next_id(kind, qualified),
            name: name.to_string(),
            qualified_name: qualified.to_string(),
            kind,
            language: self.tree.language,
            unit: UnitRef {
                path: self.unit.path.clone(),
                version: self.unit.version,
            },
            span: node.span,
            signature: truncate_chars(text.lines().next().unwrap_or("").trim(), SIGNATURE_CHARS),
            body_hash: content_hash(text),
            snippet: truncate_chars(text, self.snippet_chars),
            parent,
            relations,
            shape,
            modified_at: self.unit.modified_at,
            author: self.unit.author.clone(),
        };
        self.symbols.push(symbol);
        self.symbols.len() - 1
    }

    /// Attach `impl` / receiver members to their type declared in the same file
    fn attach_owners(&mut self) {
        let classes: HashMap<String, usize> = self
            .symbols
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kind == SymbolKind::Class)
            .rev()
            .map(|(i, s)| (s.qualified_name.clone(), i))
            .collect();

        for (index, owner) in std::mem::take(&mut self.pending_owner) {
            if let Some(&class) = classes.get(&owner) {
                self.symbols[index].parent = Some(self.symbols[class].id.clone());
            }
        }
        for (owner, base) in std::mem::take(&mut self.pending_extends) {
            if let Some(&class) = classes.get(&owner) {
                let relation = Relation::unresolved(RelationKind::Extends, base);
                let relations = &mut self.symbols[class].relations;
                if !relations.contains(&relation) {
                    relations.push(relation);
                }
            }
        }
    }
}

/// Resolve calls and extends against definitions of the same file
fn resolve_local(mut symbols: Vec<Symbol>) -> Vec<Symbol> {
    let mut functions: HashMap<String, SymbolId> = HashMap::new();
    let mut classes: HashMap<String, SymbolId> = HashMap::new();
    for symbol in &symbols {
        let table = match symbol.kind {
            SymbolKind::Function => &mut functions,
            SymbolKind::Class => &mut classes,
            _ => continue,
        };
        table.entry(symbol.name.clone()).or_insert_with(|| symbol.id.clone());
    }

    for symbol in &mut symbols {
        for relation in &mut symbol.relations {
            let RelationTarget::Unresolved { name } = &relation.target else {
                continue;
            };
            let simple = last_segment(name);
            let found = match relation.kind {
                RelationKind::Calls => functions.get(simple).or_else(|| classes.get(simple)),
                RelationKind::Extends => classes.get(simple),
                RelationKind::Imports => None,
            };
            if let Some(id) = found {
                relation.target = RelationTarget::Resolved(id.clone());
            }
        }
    }
    symbols
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}
