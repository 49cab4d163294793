// Prelude module - common imports for convenience

pub use crate::ast::{attr, AstArena, AstNode, Attributes, NodeId, NodeKind, Span};
pub use crate::cache::{AstCache, AstCacheBackend, CacheKey, CacheStats, LruAstCache};
pub use crate::diff::{diff_symbols, SymbolDiff};
pub use crate::extract::{SymbolExtractor, DEFAULT_SNIPPET_CHARS};
pub use crate::grammar::LanguageId;
pub use crate::languages::LanguageRegistry;
pub use crate::parser::{ParsedTree, ParserAdapter};
pub use crate::shape::{ShapeNode, ShapeTree};
pub use crate::source::{content_hash, SourceUnit};
pub use crate::symbol::{Relation, RelationKind, RelationTarget, Symbol, SymbolId, SymbolKind, UnitRef};
pub use crate::traits::{Error, LanguageSupport, Result};
