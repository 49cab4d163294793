// Parser adapter
//
// Resolves the language, consults the AST cache and, on a miss, parses with a
// thread-local tree-sitter parser and converts the tree into an arena.

use crate::ast::{first_error, AstArena, Span};
use crate::cache::{AstCache, CacheKey};
use crate::grammar::LanguageId;
use crate::languages::LanguageRegistry;
use crate::source::SourceUnit;
use crate::traits::{Error, Result};
use std::cell::RefCell;
use std::sync::Arc;
use tracing::{debug, trace};
use tree_sitter::Parser;

thread_local! {
    /// Thread-local tree-sitter parser to avoid repeated allocations.
    static THREAD_PARSER: RefCell<Parser> = RefCell::new(Parser::new());
}

/// Result of one parse, shared read-only through the cache
#[derive(Debug)]
pub struct ParsedTree {
    /// Normalized nodes
    pub arena: AstArena,
    /// Language the content was parsed as
    pub language: LanguageId,
    /// Parsed content
    pub source: Arc<str>,
    /// Content hash the tree was produced from
    pub content_hash: String,
    /// Span of the first error or missing node, if any
    pub error_at: Option<Span>,
}

impl ParsedTree {
    /// Whether the tree contains error or missing nodes
    pub fn has_error(&self) -> bool {
        self.error_at.is_some()
    }
}

/// Parser adapter service
pub struct ParserAdapter {
    registry: Arc<LanguageRegistry>,
    cache: Arc<AstCache>,
    reject_syntax_errors: bool,
}

impl ParserAdapter {
    /// Create an adapter over a registry and a cache
    pub fn new(registry: Arc<LanguageRegistry>, cache: Arc<AstCache>) -> Self {
        Self {
            registry,
            cache,
            reject_syntax_errors: true,
        }
    }

    /// Whether trees with syntax errors are rejected (default `true`)
    #[must_use]
    pub fn with_reject_syntax_errors(mut self, reject: bool) -> Self {
        self.reject_syntax_errors = reject;
        self
    }

    /// Language registry in use
    pub fn registry(&self) -> &Arc<LanguageRegistry> {
        &self.registry
    }

    /// Shared AST cache
    pub fn cache(&self) -> &Arc<AstCache> {
        &self.cache
    }

    /// Parse `content` described by `unit`, reusing the cached tree for the
    /// same (path, content hash, language).
    pub fn parse(&self, unit: &SourceUnit, content: &str) -> Result<Arc<ParsedTree>> {
        let key = CacheKey::new(unit.path.clone(), unit.content_hash.clone(), unit.language);
        let (tree, hit) = self
            .cache
            .get_or_insert_with(key, || self.parse_uncached(unit, content))?;

        if hit {
            trace!(path = %unit.path, "AST cache hit");
        }
        if let (Some(span), true) = (tree.error_at, self.reject_syntax_errors) {
            return Err(Error::SyntaxError {
                position: span.start_byte,
                line: span.start_line,
                message: format!("{} source contains syntax errors", tree.language),
            });
        }
        Ok(tree)
    }

    fn parse_uncached(&self, unit: &SourceUnit, content: &str) -> Result<ParsedTree> {
        let support = self
            .registry
            .get(unit.language)
            .ok_or_else(|| Error::UnsupportedLanguage(unit.language.to_string()))?;
        let language = support.grammar()?;

        let tree = THREAD_PARSER.with(|parser| {
            let mut parser = parser.borrow_mut();
            parser
                .set_language(&language)
                .map_err(|e| Error::Grammar(e.to_string()))?;
            parser
                .parse(content, None)
                .ok_or_else(|| Error::ParseFailed(format!("tree-sitter returned no tree for {}", unit.path)))
        })?;

        let source = content.as_bytes();
        let arena = AstArena::from_tree(&tree, source, support.as_ref());
        let error_at = first_error(&tree);
        debug!(
            path = %unit.path,
            language = %unit.language,
            nodes = arena.len(),
            has_error = error_at.is_some(),
            "Parsed source unit"
        );

        Ok(ParsedTree {
            arena,
            language: unit.language,
            source: Arc::from(content),
            content_hash: unit.content_hash.clone(),
            error_at,
        })
    }
}
