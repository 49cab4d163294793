// Chunking policy
//
// Decides which symbols of one file get an embedding and what text each
// embedding is computed from. The number of embeddings per file is bounded.

use leparse::symbol::{Symbol, SymbolKind};
use serde::{Deserialize, Serialize};

/// Embedding selection for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingPolicy {
    /// Upper bound on embedding records per file
    pub max_embeddings_per_unit: usize,
    /// Characters of snippet included in the embedded text
    pub max_text_chars: usize,
    /// Symbol kinds that are embedded
    pub embed_kinds: Vec<SymbolKind>,
}

impl Default for ChunkingPolicy {
    fn default() -> Self {
        Self {
            max_embeddings_per_unit: 256,
            max_text_chars: 1_500,
            embed_kinds: vec![SymbolKind::Class, SymbolKind::Function, SymbolKind::Variable],
        }
    }
}

impl ChunkingPolicy {
    /// Symbols to embed, in document order.
    ///
    /// When the file has more candidates than the bound, earlier kinds in
    /// `embed_kinds` win, then document order.
    pub fn select<'a>(&self, symbols: &[&'a Symbol]) -> Vec<&'a Symbol> {
        let mut candidates: Vec<(usize, usize, &'a Symbol)> = symbols
            .iter()
            .enumerate()
            .filter_map(|(order, s)| {
                self.embed_kinds
                    .iter()
                    .position(|k| *k == s.kind)
                    .map(|priority| (priority, order, *s))
            })
            .collect();
        if candidates.len() > self.max_embeddings_per_unit {
            candidates.sort_by_key(|(priority, order, _)| (*priority, *order));
            candidates.truncate(self.max_embeddings_per_unit);
            candidates.sort_by_key(|(_, order, _)| *order);
        }
        candidates.into_iter().map(|(_, _, s)| s).collect()
    }

    /// Text an embedding is computed from
    pub fn text(&self, symbol: &Symbol) -> String {
        let snippet: String = symbol.snippet.chars().take(self.max_text_chars).collect();
        format!("{} {}\n{}\n{}", symbol.kind, symbol.qualified_name, symbol.signature, snippet)
    }

    /// Validate bounds
    pub fn validate(&self) -> Result<(), String> {
        if self.max_embeddings_per_unit == 0 {
            return Err("chunking.max_embeddings_per_unit must be > 0".to_string());
        }
        if self.embed_kinds.is_empty() {
            return Err("chunking.embed_kinds must not be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leparse::ast::Span;
    use leparse::grammar::LanguageId;
    use leparse::symbol::{SymbolId, UnitRef};

    fn symbol(name: &str, kind: SymbolKind) -> Symbol {
        Symbol {
            id: SymbolId::from(name),
            name: name.to_string(),
            qualified_name: name.to_string(),
            kind,
            language: LanguageId::Go,
            unit: UnitRef {
                path: "a.go".to_string(),
                version: 1,
            },
            span: Span::default(),
            signature: format!("func {}()", name),
            body_hash: String::new(),
            snippet: "x".repeat(100),
            parent: None,
            relations: Vec::new(),
            shape: None,
            modified_at: Default::default(),
            author: None,
        }
    }

    #[test]
    fn test_select_skips_references() {
        let all = [
            symbol("f", SymbolKind::Function),
            symbol("call", SymbolKind::Call),
            symbol("imp", SymbolKind::Import),
            symbol("C", SymbolKind::Class),
        ];
        let refs: Vec<&Symbol> = all.iter().collect();
        let names: Vec<&str> = ChunkingPolicy::default()
            .select(&refs)
            .into_iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["f", "C"]);
    }

    #[test]
    fn test_bound_prefers_classes_then_document_order() {
        let all = [
            symbol("v", SymbolKind::Variable),
            symbol("f1", SymbolKind::Function),
            symbol("C", SymbolKind::Class),
            symbol("f2", SymbolKind::Function),
        ];
        let refs: Vec<&Symbol> = all.iter().collect();
        let policy = ChunkingPolicy {
            max_embeddings_per_unit: 2,
            ..ChunkingPolicy::default()
        };
        let names: Vec<&str> = policy.select(&refs).into_iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["f1", "C"]);
    }

    #[test]
    fn test_text_truncates_snippet() {
        let policy = ChunkingPolicy {
            max_text_chars: 10,
            ..ChunkingPolicy::default()
        };
        let text = policy.text(&symbol("run", SymbolKind::Function));
        assert!(text.starts_with("function run\nfunc run()"));
        assert!(text.ends_with(&"x".repeat(10)));
        assert!(!text.contains(&"x".repeat(11)));
    }
}
