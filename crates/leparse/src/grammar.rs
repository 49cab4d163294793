// Lazy-loaded grammar cache for memory-efficient parsing
//
// Grammars are loaded on first use and shared for the lifetime of the
// process. This is the only process-wide state in the crate; it is immutable
// once a slot has been filled.

use crate::traits::Error;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::RwLock;
use tree_sitter::Language;

/// Thread-safe grammar cache
///
/// Stores tree-sitter Language objects by index, loading each one lazily and
/// reusing it for every subsequent parse.
#[derive(Debug, Default)]
pub struct GrammarCache {
    grammars: RwLock<Vec<Option<Language>>>,
}

impl GrammarCache {
    /// Create a new empty grammar cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a language by index, loading it lazily if needed
    pub fn get_or_load<F>(&self, index: usize, loader: F) -> Result<Language, Error>
    where
        F: FnOnce() -> Language,
    {
        // Optimistic read path
        {
            let read_guard = self
                .grammars
                .read()
                .map_err(|e| Error::Grammar(format!("Cache lock poisoned: {}", e)))?;
            if let Some(Some(language)) = read_guard.get(index) {
                return Ok(language.clone());
            }
        }

        let mut write_guard = self
            .grammars
            .write()
            .map_err(|e| Error::Grammar(format!("Cache lock poisoned: {}", e)))?;

        // Another thread might have loaded it while we waited
        if let Some(Some(language)) = write_guard.get(index) {
            return Ok(language.clone());
        }

        while write_guard.len() <= index {
            write_guard.push(None);
        }

        let language = loader();
        write_guard[index] = Some(language.clone());
        Ok(language)
    }

    /// Number of loaded grammars
    pub fn len(&self) -> usize {
        self.grammars
            .read()
            .map(|g| g.iter().filter(|slot| slot.is_some()).count())
            .unwrap_or(0)
    }

    /// Check if no grammar has been loaded yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Global grammar cache instance
pub static GLOBAL_GRAMMAR_CACHE: Lazy<GrammarCache> = Lazy::new(GrammarCache::new);

/// Supported languages.
///
/// The discriminants correspond to grammar cache indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageId {
    /// Python
    Python = 0,
    /// JavaScript (including JSX)
    JavaScript = 1,
    /// TypeScript (including TSX)
    TypeScript = 2,
    /// Go
    Go = 3,
    /// Rust
    Rust = 4,
}

impl LanguageId {
    /// All supported languages
    pub const ALL: [LanguageId; 5] = [
        LanguageId::Python,
        LanguageId::JavaScript,
        LanguageId::TypeScript,
        LanguageId::Go,
        LanguageId::Rust,
    ];

    /// Get the LanguageId for a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "py" | "pyi" => Some(LanguageId::Python),
            "js" | "jsx" | "mjs" | "cjs" => Some(LanguageId::JavaScript),
            "ts" | "tsx" | "mts" | "cts" => Some(LanguageId::TypeScript),
            "go" => Some(LanguageId::Go),
            "rs" => Some(LanguageId::Rust),
            _ => None,
        }
    }

    /// Detect the language of a path from its extension
    pub fn from_path(path: &str) -> Option<Self> {
        Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Canonical lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            LanguageId::Python => "python",
            LanguageId::JavaScript => "javascript",
            LanguageId::TypeScript => "typescript",
            LanguageId::Go => "go",
            LanguageId::Rust => "rust",
        }
    }

    fn load_language(&self) -> Language {
        match self {
            LanguageId::Python => tree_sitter_python::LANGUAGE.into(),
            LanguageId::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            LanguageId::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            LanguageId::Go => tree_sitter_go::LANGUAGE.into(),
            LanguageId::Rust => tree_sitter_rust::LANGUAGE.into(),
        }
    }

    /// Get the language from the global cache (lazy-loaded)
    pub fn from_cache(&self) -> Result<Language, Error> {
        GLOBAL_GRAMMAR_CACHE.get_or_load(*self as usize, || self.load_language())
    }
}

impl fmt::Display for LanguageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LanguageId {
    type Err = Error;

    /// Accepts canonical names, common aliases and bare extensions
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        match lowered.as_str() {
            "python" | "python3" => Ok(LanguageId::Python),
            "javascript" | "node" => Ok(LanguageId::JavaScript),
            "typescript" => Ok(LanguageId::TypeScript),
            "go" | "golang" => Ok(LanguageId::Go),
            "rust" => Ok(LanguageId::Rust),
            other => Self::from_extension(other.trim_start_matches('.'))
                .ok_or_else(|| Error::UnsupportedLanguage(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_grammar_cache_creation() {
        let cache = GrammarCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_grammar_cache_lazy_loading() {
        let cache = GrammarCache::new();

        let lang = cache.get_or_load(0, || tree_sitter_python::LANGUAGE.into());
        assert!(lang.is_ok());
        assert_eq!(cache.len(), 1);

        let lang2 = cache.get_or_load(0, || {
            panic!("Should not call loader for cached grammar");
        });
        assert!(lang2.is_ok());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_sparse_slots_are_not_counted() {
        let cache = GrammarCache::new();
        cache
            .get_or_load(4, || tree_sitter_rust::LANGUAGE.into())
            .expect("rust grammar should load");
        assert_eq!(cache.len(), 1);
    }

    #[rstest]
    #[case("src/app.py", Some(LanguageId::Python))]
    #[case("web/index.jsx", Some(LanguageId::JavaScript))]
    #[case("web/types.ts", Some(LanguageId::TypeScript))]
    #[case("cmd/main.go", Some(LanguageId::Go))]
    #[case("src/lib.rs", Some(LanguageId::Rust))]
    #[case("README.md", None)]
    #[case("Makefile", None)]
    fn test_from_path(#[case] path: &str, #[case] expected: Option<LanguageId>) {
        assert_eq!(LanguageId::from_path(path), expected);
    }

    #[rstest]
    #[case("Python", LanguageId::Python)]
    #[case("golang", LanguageId::Go)]
    #[case("ts", LanguageId::TypeScript)]
    #[case(".rs", LanguageId::Rust)]
    fn test_from_str_aliases(#[case] input: &str, #[case] expected: LanguageId) {
        assert_eq!(input.parse::<LanguageId>().expect("known alias"), expected);
    }

    #[test]
    fn test_from_str_unknown() {
        let err = "cobol".parse::<LanguageId>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedLanguage(_)));
    }

    #[test]
    fn test_all_grammars_load_from_global_cache() {
        for id in LanguageId::ALL {
            assert!(id.from_cache().is_ok(), "grammar for {} should load", id);
        }
    }
}
