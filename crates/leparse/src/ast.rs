// Arena-backed normalized AST
//
// A parse produces one `AstArena`. Nodes are stored contiguously in preorder
// and refer to their children by index; there are no parent pointers. The
// conversion from tree-sitter is iterative, so pathological nesting cannot
// overflow the stack.

use crate::traits::{node_text, LanguageSupport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tree_sitter::{Node, Tree};

/// Well-known attribute keys
pub mod attr {
    /// Declared or referenced name
    pub const NAME: &str = "name";
    /// Name of the called function or method
    pub const CALLEE: &str = "callee";
    /// Receiver expression of a call or field access
    pub const RECEIVER: &str = "receiver";
    /// Comma-separated base classes / implemented traits / embedded types
    pub const EXTENDS: &str = "extends";
    /// Comma-separated imported targets
    pub const IMPORT: &str = "import";
    /// Type an `impl` block attaches its members to
    pub const SCOPE: &str = "scope";
    /// Receiver type of a Go method
    pub const OWNER: &str = "owner";
    /// Receiver binding name inside a method (Go receivers, Python `self`)
    pub const SELF_NAME: &str = "self_name";
    /// Static / class-level member flag
    pub const STATIC: &str = "static";
    /// Constructed type of an instantiation
    pub const CONSTRUCT: &str = "construct";
}

/// Index of a node inside its arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Position in the arena's node vector
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Source span: byte range plus 1-based inclusive line range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    /// Start byte offset
    pub start_byte: usize,
    /// End byte offset (exclusive)
    pub end_byte: usize,
    /// First line (1-based)
    pub start_line: usize,
    /// Last line (1-based)
    pub end_line: usize,
}

impl Span {
    /// Span of a tree-sitter node
    pub fn of(node: &Node<'_>) -> Self {
        Self {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
        }
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.end_byte.saturating_sub(self.start_byte)
    }

    /// Whether the span covers no bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of overlapping lines between two spans
    pub fn line_overlap(&self, other: &Span) -> usize {
        let start = self.start_line.max(other.start_line);
        let end = self.end_line.min(other.end_line);
        if end >= start {
            end - start + 1
        } else {
            0
        }
    }

    /// Whether `other` lies within this span
    pub fn contains(&self, other: &Span) -> bool {
        self.start_byte <= other.start_byte && other.end_byte <= self.end_byte
    }
}

/// Normalized node vocabulary shared by all languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// File root
    Module,
    /// Function, method or function-valued binding
    Function,
    /// Class, struct, enum or trait
    Class,
    /// Interface / protocol declaration
    Interface,
    /// Import of one or more targets
    Import,
    /// Call site
    Call,
    /// Instantiation (`new T`, `T{}`, `T(...)` for classes)
    Construct,
    /// Variable or constant declaration
    Variable,
    /// Assignment expression
    Assign,
    /// Parameter list
    Parameters,
    /// Single parameter
    Parameter,
    /// Statement block
    Block,
    /// Conditional / match / switch
    Branch,
    /// Loop construct
    Loop,
    /// Return (or yield)
    Return,
    /// Member / field access expression
    FieldAccess,
    /// `self` / `this` / `cls`
    SelfRef,
    /// Plain identifier
    Identifier,
    /// Literal value
    Literal,
    /// Anonymous function
    Lambda,
    /// Binary / unary / comparison operator expression
    Operator,
    /// Comment
    Comment,
    /// Field declaration inside a class or struct
    Field,
    /// Anything else
    Other,
}

impl NodeKind {
    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Module => "module",
            NodeKind::Function => "function",
            NodeKind::Class => "class",
            NodeKind::Interface => "interface",
            NodeKind::Import => "import",
            NodeKind::Call => "call",
            NodeKind::Construct => "construct",
            NodeKind::Variable => "variable",
            NodeKind::Assign => "assign",
            NodeKind::Parameters => "parameters",
            NodeKind::Parameter => "parameter",
            NodeKind::Block => "block",
            NodeKind::Branch => "branch",
            NodeKind::Loop => "loop",
            NodeKind::Return => "return",
            NodeKind::FieldAccess => "field_access",
            NodeKind::SelfRef => "self_ref",
            NodeKind::Identifier => "identifier",
            NodeKind::Literal => "literal",
            NodeKind::Lambda => "lambda",
            NodeKind::Operator => "operator",
            NodeKind::Comment => "comment",
            NodeKind::Field => "field",
            NodeKind::Other => "other",
        }
    }

    /// Whether this kind introduces a named definition scope
    pub fn is_definition(&self) -> bool {
        matches!(self, NodeKind::Function | NodeKind::Class | NodeKind::Interface)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language-specific attribute bag
///
/// List-valued attributes (`extends`, `import`) are stored comma-joined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(BTreeMap<&'static str, String>);

impl Attributes {
    /// Empty bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a scalar attribute; empty values are ignored
    pub fn set(&mut self, key: &'static str, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.0.insert(key, value);
        }
    }

    /// Append to a list attribute; empty values are ignored
    pub fn push(&mut self, key: &'static str, value: impl AsRef<str>) {
        let value = value.as_ref().trim();
        if value.is_empty() {
            return;
        }
        let entry = self.0.entry(key).or_default();
        if !entry.is_empty() {
            entry.push(',');
        }
        entry.push_str(value);
    }

    /// Set a boolean flag
    pub fn flag(&mut self, key: &'static str) {
        self.0.insert(key, "true".to_string());
    }

    /// Get a scalar attribute
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterate a list attribute
    pub fn list(&self, key: &str) -> impl Iterator<Item = &str> {
        self.get(key)
            .into_iter()
            .flat_map(|value| value.split(','))
            .filter(|s| !s.is_empty())
    }

    /// Whether an attribute is present
    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Whether a boolean flag is set
    pub fn is_set(&self, key: &str) -> bool {
        self.get(key) == Some("true")
    }

    /// Number of attributes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the bag is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A node in the normalized AST
#[derive(Debug, Clone)]
pub struct AstNode {
    /// Normalized type tag
    pub kind: NodeKind,
    /// Raw grammar node type
    pub raw_kind: &'static str,
    /// Source span
    pub span: Span,
    /// Child nodes in source order
    pub children: Vec<NodeId>,
    /// Language-specific attributes
    pub attrs: Attributes,
}

impl AstNode {
    /// The `name` attribute, if any
    pub fn name(&self) -> Option<&str> {
        self.attrs.get(attr::NAME)
    }
}

/// Arena holding every node produced by one parse
#[derive(Debug, Clone)]
pub struct AstArena {
    nodes: Vec<AstNode>,
    root: NodeId,
}

impl AstArena {
    /// Convert a tree-sitter tree into a normalized arena.
    ///
    /// Only named nodes are kept. Nodes are allocated in preorder.
    pub fn from_tree(tree: &Tree, source: &[u8], support: &dyn LanguageSupport) -> Self {
        let mut nodes: Vec<AstNode> = Vec::new();
        let mut stack: Vec<(Node<'_>, Option<NodeId>)> = vec![(tree.root_node(), None)];

        while let Some((ts_node, parent)) = stack.pop() {
            let kind = match parent {
                None => NodeKind::Module,
                Some(_) => support.classify(&ts_node, source),
            };
            let mut attrs = Attributes::new();
            support.annotate(&ts_node, kind, source, &mut attrs);
            if matches!(kind, NodeKind::Identifier | NodeKind::Parameter) && !attrs.has(attr::NAME) {
                attrs.set(attr::NAME, node_text(&ts_node, source));
            }

            let id = NodeId(nodes.len() as u32);
            nodes.push(AstNode {
                kind,
                raw_kind: ts_node.kind(),
                span: Span::of(&ts_node),
                children: Vec::new(),
                attrs,
            });
            if let Some(parent) = parent {
                nodes[parent.index()].children.push(id);
            }

            let mut cursor = ts_node.walk();
            let named: Vec<Node<'_>> = ts_node.named_children(&mut cursor).collect();
            for child in named.into_iter().rev() {
                stack.push((child, Some(id)));
            }
        }

        Self { nodes, root: NodeId(0) }
    }

    /// Root node id
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Node by id
    pub fn node(&self, id: NodeId) -> &AstNode {
        &self.nodes[id.index()]
    }

    /// Node by id, if it exists
    pub fn get(&self, id: NodeId) -> Option<&AstNode> {
        self.nodes.get(id.index())
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in preorder
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &AstNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeId(i as u32), node))
    }

    /// Preorder ids of the subtree rooted at `id` (including `id`)
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.node(current).children.iter().rev().copied());
        }
        out
    }

    /// Text covered by a node
    pub fn text<'s>(&self, id: NodeId, source: &'s str) -> &'s str {
        let span = self.node(id).span;
        source.get(span.start_byte..span.end_byte).unwrap_or("")
    }
}

/// Locate the first error or missing node of a tree, in document order
pub fn first_error(tree: &Tree) -> Option<Span> {
    let root = tree.root_node();
    if !root.has_error() {
        return None;
    }
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(Span::of(&node));
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node
            .children(&mut cursor)
            .filter(|child| child.has_error() || child.is_missing())
            .collect();
        stack.extend(children.into_iter().rev());
    }
    Some(Span::of(&root))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_list_join() {
        let mut attrs = Attributes::new();
        attrs.push(attr::EXTENDS, "Base");
        attrs.push(attr::EXTENDS, " ");
        attrs.push(attr::EXTENDS, "Mixin");
        assert_eq!(attrs.get(attr::EXTENDS), Some("Base,Mixin"));
        assert_eq!(attrs.list(attr::EXTENDS).collect::<Vec<_>>(), vec!["Base", "Mixin"]);
    }

    #[test]
    fn test_attributes_flag_and_empty_set() {
        let mut attrs = Attributes::new();
        attrs.set(attr::NAME, "");
        assert!(!attrs.has(attr::NAME));
        attrs.flag(attr::STATIC);
        assert!(attrs.is_set(attr::STATIC));
        assert_eq!(attrs.len(), 1);
    }

    #[test]
    fn test_span_overlap() {
        let a = Span { start_byte: 0, end_byte: 50, start_line: 1, end_line: 5 };
        let b = Span { start_byte: 30, end_byte: 90, start_line: 4, end_line: 9 };
        let c = Span { start_byte: 100, end_byte: 120, start_line: 12, end_line: 13 };
        assert_eq!(a.line_overlap(&b), 2);
        assert_eq!(a.line_overlap(&c), 0);
        assert!(!a.contains(&b));
        assert_eq!(a.len(), 50);
    }

    #[test]
    fn test_node_kind_names_are_stable() {
        assert_eq!(NodeKind::FieldAccess.as_str(), "field_access");
        assert_eq!(NodeKind::SelfRef.to_string(), "self_ref");
        assert!(NodeKind::Interface.is_definition());
        assert!(!NodeKind::Call.is_definition());
    }
}
