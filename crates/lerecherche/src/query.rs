// Natural Language Query Processing
//
// *La Question* (The Question) - Classify free-text queries into intents,
// extract key terms and infer implicit filters

use crate::filter::Filter;
use lemotif::PatternId;
use leparse::grammar::LanguageId;
use leparse::symbol::SymbolKind;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::trace;

/// Cap on paths and symbol names attached as context hints
pub const MAX_CONTEXT_HINTS: usize = 16;

/// What the user is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryCategory {
    /// Where something is defined
    FindDefinition,
    /// Where something is called or imported
    FindUsage,
    /// Which code follows a design pattern
    FindPattern,
    /// How something works
    Explain,
    /// Anything else
    General,
}

/// Recently touched code, used to bias ranking
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecentContext {
    /// Recently indexed or opened paths, most recent first
    pub recent_paths: Vec<String>,
    /// Recently referenced symbol names
    pub recent_symbols: Vec<String>,
}

/// Context hints attached to an intent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextHints {
    /// Paths to favour
    pub paths: Vec<String>,
    /// Symbol names to favour
    pub symbols: Vec<String>,
}

impl ContextHints {
    /// No hints
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.symbols.is_empty()
    }
}

/// Classified query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIntent {
    /// Original text
    pub original: String,
    /// Category
    pub category: QueryCategory,
    /// Filters inferred from the text
    pub filters: Vec<Filter>,
    /// Text with abbreviations expanded, used for embedding
    pub rewritten: String,
    /// Lowercased key terms in order of appearance
    pub terms: Vec<String>,
    /// Recent-context hints
    pub context_hints: ContextHints,
}

/// Query understanding errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    /// Blank query text
    #[error("Empty query")]
    EmptyQuery,

    /// A classifier expression failed to compile
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(String),
}

static ABBREVIATIONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("fn", "function"),
        ("func", "function"),
        ("cfg", "config"),
        ("conf", "config"),
        ("auth", "authentication"),
        ("db", "database"),
        ("init", "initialize"),
        ("impl", "implementation"),
        ("err", "error"),
        ("msg", "message"),
        ("req", "request"),
        ("resp", "response"),
        ("ctx", "context"),
        ("util", "utility"),
        ("utils", "utilities"),
        ("params", "parameters"),
        ("args", "arguments"),
        ("str", "string"),
        ("dir", "directory"),
        ("env", "environment"),
        ("repo", "repository"),
        ("tx", "transaction"),
        ("conn", "connection"),
    ]
    .into_iter()
    .collect()
});

const STOP_WORDS: &[&str] = &[
    "a", "all", "an", "and", "any", "are", "as", "at", "be", "by", "call", "called", "calls", "callers", "code",
    "declared", "def", "defined", "definition", "describe", "does", "do", "explain", "find", "for", "from",
    "function", "functions", "get", "go", "how", "implemented", "implementation", "implementations", "in", "invoked",
    "is", "it", "locate", "me", "method", "methods", "of", "on", "or", "pattern", "patterns", "class", "classes",
    "reference", "references", "referenced", "show", "site", "sites", "tell", "that", "the", "this", "to", "use",
    "used", "usage", "usages", "uses", "what", "where", "which", "who", "why", "with", "work", "works", "design",
];

/// Free-text query classifier
#[derive(Debug, Clone)]
pub struct QueryParser {
    usage: Regex,
    pattern: Regex,
    explain: Regex,
    definition: Regex,
    token: Regex,
}

impl QueryParser {
    /// Create a new query parser
    pub fn new() -> Result<Self, QueryError> {
        let compile = |expr: &str| Regex::new(expr).map_err(|e| QueryError::InvalidPattern(e.to_string()));
        Ok(Self {
            usage: compile(
                r"(?i)\b(?:where\s+(?:is|are)\s+.+?\s+(?:used|called|referenced|invoked|imported)|(?:usages?|uses|callers?|references?|call\s+sites?)\s+(?:of|to|for)|(?:who|what)\s+calls|find\s+(?:all\s+)?(?:usages?|callers|references|calls))\b",
            )?,
            pattern: compile(
                r"(?i)\b(?:design\s+patterns?|patterns?|singletons|factories|builders|observers|strategies|decorators|adapters|iterators|visitors)\b|\b(?:singleton|factory|builder|observer|strategy|decorator|adapter|iterator|visitor|command)\s+(?:class(?:es)?|implementations?)\b",
            )?,
            explain: compile(
                r"(?i)^\s*(?:explain|describe|how\s+(?:does|do|is|are)|what\s+(?:does|do)|why\s+(?:does|do|is)|tell\s+me\s+(?:about|how)|show\s+me\s+how)\b",
            )?,
            definition: compile(
                r"(?i)\b(?:where\s+(?:is|are)\s+.+?\s+(?:defined|declared|implemented)|definition\s+of|defined|declaration\s+of|find\s+(?:the\s+)?(?:function|class|method|struct|type|trait|interface|enum)|(?:function|class|method|struct|def|fn)\s+(?:named|called)|go\s+to|locate)\b",
            )?,
            token: compile(r"[A-Za-z_][A-Za-z0-9_]*(?:(?:\.|::)[A-Za-z_][A-Za-z0-9_]*)*")?,
        })
    }

    /// Classify query text.
    ///
    /// Categories are checked in the order usage, pattern, explain,
    /// definition; anything unmatched is general.
    pub fn classify(&self, text: &str, context: Option<&RecentContext>) -> Result<QueryIntent, QueryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let category = self.category(text);
        let words: Vec<String> = self.token.find_iter(text).map(|m| m.as_str().to_lowercase()).collect();

        let mut filters = Vec::new();
        if let Some(language) = infer_language(&words) {
            filters.push(Filter::Language(language));
        }
        match category {
            QueryCategory::FindDefinition => {
                if let Some(kind) = words.iter().find_map(|w| kind_word(w)) {
                    filters.push(Filter::Kind(kind));
                }
            }
            QueryCategory::FindPattern => {
                if let Some(pattern) = words.iter().find_map(|w| PatternId::from_str(&singular(w)).ok()) {
                    filters.push(Filter::PatternType(pattern));
                }
            }
            _ => {}
        }

        let terms = key_terms(&words);
        let rewritten = expand(text, &self.token);
        let context_hints = context.map(hints).unwrap_or_default();

        trace!(
            ?category,
            terms = ?terms,
            filters = filters.len(),
            hints = context_hints.paths.len() + context_hints.symbols.len(),
            "Classified query"
        );

        Ok(QueryIntent {
            original: text.to_string(),
            category,
            filters,
            rewritten,
            terms,
            context_hints,
        })
    }

    fn category(&self, text: &str) -> QueryCategory {
        if self.usage.is_match(text) {
            QueryCategory::FindUsage
        } else if self.pattern.is_match(text) {
            QueryCategory::FindPattern
        } else if self.explain.is_match(text) {
            QueryCategory::Explain
        } else if self.definition.is_match(text) {
            QueryCategory::FindDefinition
        } else {
            QueryCategory::General
        }
    }
}

fn language_word(word: &str) -> Option<LanguageId> {
    match word {
        "python" | "py" => Some(LanguageId::Python),
        "rust" => Some(LanguageId::Rust),
        "javascript" | "js" => Some(LanguageId::JavaScript),
        "typescript" | "ts" => Some(LanguageId::TypeScript),
        "golang" => Some(LanguageId::Go),
        _ => None,
    }
}

// "go" is only a language after "in" ("defined in go"), never in "go to"
fn infer_language(words: &[String]) -> Option<LanguageId> {
    words.iter().enumerate().find_map(|(i, w)| {
        language_word(w).or_else(|| (w == "go" && i > 0 && words[i - 1] == "in").then_some(LanguageId::Go))
    })
}

fn kind_word(word: &str) -> Option<SymbolKind> {
    match word {
        "class" | "classes" | "struct" | "structs" | "interface" | "trait" | "enum" => Some(SymbolKind::Class),
        "function" | "functions" | "method" | "methods" | "func" | "fn" | "def" => Some(SymbolKind::Function),
        _ => None,
    }
}

fn singular(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        format!("{}y", stem)
    } else if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

fn key_terms(words: &[String]) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in words {
        // Qualified names are indexed with `::` separators
        let word = &word.replace('.', "::");
        if word.len() < 2 || STOP_WORDS.contains(&word.as_str()) || language_word(word).is_some() {
            continue;
        }
        if !terms.contains(word) {
            terms.push(word.clone());
        }
        if let Some(expanded) = ABBREVIATIONS.get(word.as_str()) {
            let expanded = expanded.to_string();
            if !terms.contains(&expanded) {
                terms.push(expanded);
            }
        }
    }
    terms
}

/// Append each abbreviation's expansion after it
fn expand(text: &str, token: &Regex) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in token.find_iter(text) {
        out.push_str(&text[last..m.end()]);
        if let Some(expanded) = ABBREVIATIONS.get(m.as_str().to_lowercase().as_str()) {
            out.push(' ');
            out.push_str(expanded);
        }
        last = m.end();
    }
    out.push_str(&text[last..]);
    out
}

fn hints(context: &RecentContext) -> ContextHints {
    let mut hints = ContextHints::default();
    for path in &context.recent_paths {
        if hints.paths.len() < MAX_CONTEXT_HINTS && !hints.paths.contains(path) {
            hints.paths.push(path.clone());
        }
    }
    for symbol in &context.recent_symbols {
        if hints.symbols.len() < MAX_CONTEXT_HINTS && !hints.symbols.contains(symbol) {
            hints.symbols.push(symbol.clone());
        }
    }
    hints
}
