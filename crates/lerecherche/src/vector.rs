// Vector Search Implementation
//
// *Le Vecteur* (The Vector) - Embedding records, the vector-store seam and
// filtered similarity search

use chrono::{DateTime, Utc};
use leparse::grammar::LanguageId;
use leparse::symbol::{SymbolId, SymbolKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::trace;

/// Default over-fetch multiplier for stores without filter pushdown
pub const DEFAULT_OVERFETCH_FACTOR: usize = 4;
/// Default number of over-fetch rounds before giving up on filling `k`
pub const DEFAULT_MAX_OVERFETCH_ROUNDS: usize = 3;

/// Metadata stored next to each vector, used for filter pushdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Source language
    pub language: LanguageId,
    /// File path
    pub path: String,
    /// Symbol kind
    pub kind: SymbolKind,
    /// Last modification of the owning file
    pub modified_at: DateTime<Utc>,
    /// Author of the owning file
    pub author: Option<String>,
}

/// One stored embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Symbol the vector represents
    pub id: SymbolId,
    /// Fixed-dimension vector
    pub vector: Vec<f32>,
    /// Filterable metadata
    pub metadata: RecordMetadata,
}

/// Search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Symbol id
    pub id: SymbolId,
    /// Cosine similarity to the query
    pub similarity: f32,
    /// Stored metadata
    pub metadata: RecordMetadata,
}

/// Metadata predicate pushed into a search
pub type MetadataPredicate<'a> = &'a (dyn Fn(&RecordMetadata) -> bool + Sync);

/// Vector search errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VectorError {
    /// Provided embedding dimension does not match the index dimension
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension received
        got: usize,
    },

    /// The provided embedding is invalid (e.g., contains NaN or infinite values)
    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),

    /// Invalid index parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Storage and similarity search over embedding records
pub trait VectorStore: Send + Sync {
    /// Vector dimension
    fn dimension(&self) -> usize;

    /// Insert or replace a record
    fn upsert(&mut self, record: EmbeddingRecord) -> Result<(), VectorError>;

    /// Remove a record; returns whether it existed
    fn delete(&mut self, id: &SymbolId) -> bool;

    /// Up to `k` candidates by descending cosine similarity, ties by id.
    ///
    /// Stores without pushdown may return fewer than `k` matching candidates
    /// when a filter is given.
    fn search(&self, query: &[f32], k: usize, filter: Option<MetadataPredicate<'_>>) -> Result<Vec<Candidate>, VectorError>;

    /// Whether `search` evaluates the filter during the scan
    fn supports_filter_pushdown(&self) -> bool;

    /// Stored record
    fn get(&self, id: &SymbolId) -> Option<&EmbeddingRecord>;

    /// Number of live records
    fn len(&self) -> usize;

    /// Whether no records are stored
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reject vectors of the wrong size or with non-finite components
pub fn validate_vector(vector: &[f32], dimension: usize) -> Result<(), VectorError> {
    if vector.len() != dimension {
        return Err(VectorError::DimensionMismatch {
            expected: dimension,
            got: vector.len(),
        });
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(VectorError::InvalidEmbedding("non-finite component".to_string()));
    }
    Ok(())
}

/// Descending similarity, ties broken by id
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.similarity.total_cmp(&a.similarity).then_with(|| a.id.cmp(&b.id)));
}

/// Exact brute-force store with filter pushdown
#[derive(Debug, Clone)]
pub struct InMemoryVectorStore {
    records: HashMap<SymbolId, EmbeddingRecord>,
    dimension: usize,
}

impl InMemoryVectorStore {
    /// Create an empty store
    pub fn new(dimension: usize) -> Self {
        Self {
            records: HashMap::new(),
            dimension,
        }
    }
}

impl VectorStore for InMemoryVectorStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn upsert(&mut self, record: EmbeddingRecord) -> Result<(), VectorError> {
        validate_vector(&record.vector, self.dimension)?;
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    fn delete(&mut self, id: &SymbolId) -> bool {
        self.records.remove(id).is_some()
    }

    fn search(&self, query: &[f32], k: usize, filter: Option<MetadataPredicate<'_>>) -> Result<Vec<Candidate>, VectorError> {
        validate_vector(query, self.dimension)?;
        let mut results: Vec<Candidate> = self
            .records
            .values()
            .filter(|r| filter.map(|f| f(&r.metadata)).unwrap_or(true))
            .map(|r| Candidate {
                id: r.id.clone(),
                similarity: cosine_similarity(query, &r.vector),
                metadata: r.metadata.clone(),
            })
            .collect();
        sort_candidates(&mut results);
        results.truncate(k);
        Ok(results)
    }

    fn supports_filter_pushdown(&self) -> bool {
        true
    }

    fn get(&self, id: &SymbolId) -> Option<&EmbeddingRecord> {
        self.records.get(id)
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

/// Vector index over a pluggable store
pub struct VectorIndex {
    store: Box<dyn VectorStore>,
    overfetch_factor: usize,
    max_overfetch_rounds: usize,
}

impl VectorIndex {
    /// Wrap a store
    pub fn new(store: Box<dyn VectorStore>) -> Self {
        Self {
            store,
            overfetch_factor: DEFAULT_OVERFETCH_FACTOR,
            max_overfetch_rounds: DEFAULT_MAX_OVERFETCH_ROUNDS,
        }
    }

    /// Exact in-memory index
    pub fn in_memory(dimension: usize) -> Self {
        Self::new(Box::new(InMemoryVectorStore::new(dimension)))
    }

    /// Set over-fetch behavior for stores without pushdown
    #[must_use]
    pub fn with_overfetch(mut self, factor: usize, rounds: usize) -> Self {
        self.overfetch_factor = factor.max(1);
        self.max_overfetch_rounds = rounds.max(1);
        self
    }

    /// Vector dimension
    pub fn dimension(&self) -> usize {
        self.store.dimension()
    }

    /// Insert or replace a record
    pub fn upsert(&mut self, record: EmbeddingRecord) -> Result<(), VectorError> {
        self.store.upsert(record)
    }

    /// Remove a record
    pub fn delete(&mut self, id: &SymbolId) -> bool {
        self.store.delete(id)
    }

    /// Stored record
    pub fn get(&self, id: &SymbolId) -> Option<&EmbeddingRecord> {
        self.store.get(id)
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Cosine similarity of the query to one stored record
    pub fn similarity_to(&self, query: &[f32], id: &SymbolId) -> Option<f32> {
        self.store.get(id).map(|r| cosine_similarity(query, &r.vector))
    }

    /// Top-`k` candidates satisfying `filter`.
    ///
    /// Pushes the predicate down when the store supports it; otherwise
    /// over-fetches `k * factor` (growing each round), post-filters and
    /// truncates to `k`.
    pub fn filtered_search(&self, query: &[f32], k: usize, filter: Option<MetadataPredicate<'_>>) -> Result<Vec<Candidate>, VectorError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let Some(predicate) = filter else {
            return self.store.search(query, k, None);
        };
        if self.store.supports_filter_pushdown() {
            return self.store.search(query, k, Some(predicate));
        }

        let available = self.store.len();
        let mut fetch = k.saturating_mul(self.overfetch_factor).min(available);
        let mut kept = Vec::new();
        for round in 0..self.max_overfetch_rounds {
            let raw = self.store.search(query, fetch, None)?;
            let exhausted = raw.len() < fetch || fetch >= available;
            kept = raw.into_iter().filter(|c| predicate(&c.metadata)).collect();
            trace!(round, fetch, kept = kept.len(), "Over-fetch round");
            if kept.len() >= k || exhausted {
                break;
            }
            fetch = fetch.saturating_mul(self.overfetch_factor).min(available);
        }
        sort_candidates(&mut kept);
        kept.truncate(k);
        Ok(kept)
    }
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("len", &self.store.len())
            .field("dimension", &self.store.dimension())
            .field("pushdown", &self.store.supports_filter_pushdown())
            .finish()
    }
}

/// Calculate cosine similarity between two vectors
///
/// Returns a value between -1.0 and 1.0, or 0.0 if either vector is zero or
/// the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(id: &str, vector: Vec<f32>, language: LanguageId, kind: SymbolKind) -> EmbeddingRecord {
        EmbeddingRecord {
            id: SymbolId::from(id),
            vector,
            metadata: RecordMetadata {
                language,
                path: format!("src/{}.py", id),
                kind,
                modified_at: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default(),
                author: None,
            },
        }
    }

    fn store() -> InMemoryVectorStore {
        let mut store = InMemoryVectorStore::new(3);
        store
            .upsert(record("a", vec![1.0, 0.0, 0.0], LanguageId::Python, SymbolKind::Function))
            .expect("upsert");
        store
            .upsert(record("b", vec![0.9, 0.1, 0.0], LanguageId::Rust, SymbolKind::Function))
            .expect("upsert");
        store
            .upsert(record("c", vec![0.0, 1.0, 0.0], LanguageId::Python, SymbolKind::Class))
            .expect("upsert");
        store
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let results = store().search(&[1.0, 0.0, 0.0], 3, None).expect("search");
        let ids: Vec<&str> = results.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_pushdown_filter() {
        let python = |m: &RecordMetadata| m.language == LanguageId::Python;
        let results = store().search(&[1.0, 0.0, 0.0], 3, Some(&python)).expect("search");
        assert!(results.iter().all(|c| c.metadata.language == LanguageId::Python));
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_dimension_mismatch_is_typed() {
        let mut store = InMemoryVectorStore::new(3);
        let err = store
            .upsert(record("x", vec![1.0, 0.0], LanguageId::Go, SymbolKind::Function))
            .unwrap_err();
        assert_eq!(err, VectorError::DimensionMismatch { expected: 3, got: 2 });
        assert!(store.search(&[1.0], 1, None).is_err());
    }

    #[test]
    fn test_upsert_replaces_and_delete_removes() {
        let mut store = store();
        store
            .upsert(record("a", vec![0.0, 0.0, 1.0], LanguageId::Python, SymbolKind::Function))
            .expect("upsert");
        assert_eq!(store.len(), 3);
        assert!(store.delete(&SymbolId::from("a")));
        assert!(!store.delete(&SymbolId::from("a")));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_ties_break_by_id() {
        let mut store = InMemoryVectorStore::new(2);
        for id in ["z", "m", "a"] {
            store
                .upsert(record(id, vec![1.0, 1.0], LanguageId::Go, SymbolKind::Function))
                .expect("upsert");
        }
        let ids: Vec<String> = store
            .search(&[1.0, 1.0], 3, None)
            .expect("search")
            .into_iter()
            .map(|c| c.id.0)
            .collect();
        assert_eq!(ids, vec!["a", "m", "z"]);
    }

    proptest! {
        #[test]
        fn cosine_is_bounded_and_symmetric(a in proptest::collection::vec(-10.0f32..10.0, 4), b in proptest::collection::vec(-10.0f32..10.0, 4)) {
            let ab = cosine_similarity(&a, &b);
            let ba = cosine_similarity(&b, &a);
            prop_assert!((ab - ba).abs() < 1e-5);
            prop_assert!((-1.0001..=1.0001).contains(&ab));
        }

        #[test]
        fn cosine_with_self_is_one(a in proptest::collection::vec(0.1f32..10.0, 1..8)) {
            prop_assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-4);
        }
    }
}
