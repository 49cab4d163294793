// lerecherche - Search & Ranking
//
// *La Recherche* (The Search) - Vector index, query understanding, filtering
// and multi-signal ranking over extracted symbols

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

pub mod embedding;
pub mod filter;
pub mod hnsw;
pub mod query;
pub mod ranking;
pub mod vector;

pub use embedding::{check_batch, sub_tokens, EmbeddingError, EmbeddingProvider, HashingEmbedder, DEFAULT_DIMENSION};
pub use filter::{Filter, FilterSet, FilterType, FilterValidationError};
pub use hnsw::{HnswParams, HnswVectorStore, RebuildStats};
pub use query::{ContextHints, QueryCategory, QueryError, QueryIntent, QueryParser, RecentContext};
pub use ranking::{
    recency_weight, structural_relevance, FeedbackSignal, FeedbackStore, RankCandidate, RankedResult, Ranker,
    RankingConfig, RankingConfigError, ScoreBreakdown,
};
pub use vector::{
    cosine_similarity, Candidate, EmbeddingRecord, InMemoryVectorStore, MetadataPredicate, RecordMetadata,
    VectorError, VectorIndex, VectorStore,
};
