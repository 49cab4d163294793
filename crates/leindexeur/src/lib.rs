// leindexeur - Incremental Indexing
//
// *L'Indexeur* (The Indexer) - Per-file incremental pipeline, atomic index
// state and the query operations of a code index

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

/// Per-file embedding selection.
pub mod chunking;

/// Time source.
pub mod clock;

/// Configuration loaded from `.leindex/config.toml`.
pub mod config;

/// Core operations on a code index.
pub mod engine;

/// Error kinds.
pub mod error;

/// Parse, extract, diff, embed and commit.
pub mod pipeline;

/// Retry backoff.
pub mod retry;

/// Per-file status machine.
pub mod state;

/// Committed index state.
pub mod store;

pub use chunking::ChunkingPolicy;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{IndexerConfig, VectorBackend, DEFAULT_CONFIG_FILE};
pub use engine::{CodeIndex, CodeIndexBuilder, IndexStats, PruneReport, QueryRequest};
pub use error::{FailureKind, IndexError, Result};
pub use pipeline::{AckOutcome, FileChange, FileEvent, IndexAck};
pub use retry::BackoffPolicy;
pub use state::{FailureInfo, FileStatus, PipelineStage};
pub use store::ResolvedRelation;
