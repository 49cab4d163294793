// Core traits for language support

use crate::ast::{attr, Attributes, AstNode, NodeKind};
use crate::grammar::LanguageId;
use crate::symbol::SymbolKind;
use tree_sitter::{Language, Node};

/// Result type for parsing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during parsing
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to parse the source code
    #[error("Failed to parse source: {0}")]
    ParseFailed(String),

    /// Syntax error at a specific position
    #[error("Invalid syntax at line {line} (byte {position}): {message}")]
    SyntaxError {
        /// Byte offset of the first error node
        position: usize,
        /// 1-based line of the first error node
        line: usize,
        /// Error message
        message: String,
    },

    /// The language is not supported
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// The grammar could not be loaded or attached to a parser
    #[error("Grammar error: {0}")]
    Grammar(String),
}

impl Error {
    /// Short machine-readable tag for the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ParseFailed(_) => "parse_failed",
            Error::SyntaxError { .. } => "syntax_error",
            Error::UnsupportedLanguage(_) => "unsupported_language",
            Error::Grammar(_) => "grammar",
        }
    }
}

/// Per-language capability set.
///
/// A language registers one implementation of this trait with the
/// [`LanguageRegistry`](crate::languages::LanguageRegistry). Everything the
/// rest of the crate needs to know about a grammar goes through here, so a new
/// language is added without touching any dispatch code.
pub trait LanguageSupport: Send + Sync {
    /// Language this support object handles
    fn id(&self) -> LanguageId;

    /// The tree-sitter grammar, loaded through the global grammar cache
    fn grammar(&self) -> Result<Language> {
        self.id().from_cache()
    }

    /// Map a raw grammar node type onto the normalized vocabulary
    fn node_kind(&self, raw: &str) -> NodeKind;

    /// Classify a concrete node.
    ///
    /// Defaults to [`node_kind`](Self::node_kind); languages override it when
    /// the kind depends on children or parents (e.g. a variable bound to a
    /// lambda is a function).
    fn classify(&self, node: &Node<'_>, _source: &[u8]) -> NodeKind {
        self.node_kind(node.kind())
    }

    /// Fill the attribute bag for a node (names, callees, receivers, ...)
    fn annotate(&self, node: &Node<'_>, kind: NodeKind, source: &[u8], attrs: &mut Attributes);

    /// Identifiers that denote the receiver object inside a method body
    fn self_names(&self) -> &'static [&'static str];

    /// Symbol kind emitted for a normalized node, if any
    fn symbol_kind(&self, node: &AstNode) -> Option<SymbolKind> {
        match node.kind {
            NodeKind::Function => Some(SymbolKind::Function),
            NodeKind::Class | NodeKind::Interface => Some(SymbolKind::Class),
            NodeKind::Import => Some(SymbolKind::Import),
            NodeKind::Call | NodeKind::Construct => Some(SymbolKind::Call),
            NodeKind::Variable | NodeKind::Field => Some(SymbolKind::Variable),
            NodeKind::Assign if node.attrs.has(attr::NAME) && !node.attrs.has(attr::RECEIVER) => {
                Some(SymbolKind::Variable)
            }
            _ => None,
        }
    }
}

/// Text of a node, or an empty string when the bytes are not UTF-8
pub fn node_text<'a>(node: &Node<'_>, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

/// Text of a named field child
pub fn field_text<'a>(node: &Node<'_>, field: &str, source: &'a [u8]) -> Option<&'a str> {
    node.child_by_field_name(field).map(|child| node_text(&child, source))
}

/// Whether a node has an anonymous child token with the given kind (e.g. `static`)
pub fn has_token(node: &Node<'_>, token: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|child| child.kind() == token);
    found
}

/// Strip string delimiters from a literal
pub fn unquote(text: &str) -> &str {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`')
}

/// Strip generic arguments and pointer/reference sigils from a type name
pub fn base_type_name(text: &str) -> &str {
    let trimmed = text.trim_start_matches(['*', '&']).trim();
    let trimmed = trimmed.strip_prefix("mut ").unwrap_or(trimmed);
    let end = trimmed.find(['<', '[', '(']).unwrap_or(trimmed.len());
    trimmed[..end].trim()
}

/// Last path segment of a dotted / scoped name
pub fn last_segment(text: &str) -> &str {
    text.rsplit(['.', ':', '/']).find(|s| !s.is_empty()).unwrap_or(text)
}
