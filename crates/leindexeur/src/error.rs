// Error Handling
//
// *La Gestion des Erreurs* (The Error Management) - Indexing and query error kinds

use lerecherche::{FilterValidationError, QueryError, VectorError};
use leparse::symbol::SymbolId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for indexing operations
pub type Result<T> = std::result::Result<T, IndexError>;

/// Indexing and query errors
#[derive(Debug, Error)]
pub enum IndexError {
    /// The file did not parse; the previous good version stays served
    #[error("parse error in {path}: {source}")]
    Parse {
        /// File path
        path: String,
        /// Parser error
        #[source]
        source: leparse::traits::Error,
    },

    /// The embedding provider failed or timed out; nothing was applied
    #[error("embedding failed for {path}: {message}")]
    Embedding {
        /// File path, or `<query>` for query embedding
        path: String,
        /// Provider message
        message: String,
    },

    /// A query filter was rejected before execution
    #[error(transparent)]
    FilterValidation(#[from] FilterValidationError),

    /// Query text was rejected
    #[error(transparent)]
    Query(#[from] QueryError),

    /// A symbol references a superseded version of its file (advisory)
    #[error("symbol {symbol} references {path} v{symbol_version}, index holds {current_version:?}")]
    IndexConsistency {
        /// Symbol id
        symbol: SymbolId,
        /// Owning path
        path: String,
        /// Version recorded on the symbol
        symbol_version: u64,
        /// Version currently indexed for the path
        current_version: Option<u64>,
    },

    /// No grammar for the file
    #[error("unsupported language for {0}")]
    Unsupported(String),

    /// No such symbol in the index
    #[error("unknown symbol {0}")]
    UnknownSymbol(SymbolId),

    /// Argument outside its domain
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Vector store rejected an operation
    #[error("vector index error: {0}")]
    Vector(#[from] VectorError),

    /// Worker task failed
    #[error("internal error: {0}")]
    Internal(String),
}

/// Kind recorded on a failed file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Content did not parse
    Parse,
    /// Provider failure or timeout
    Embedding,
    /// Vector store or worker failure
    Internal,
}

impl FailureKind {
    /// Whether the same content can succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureKind::Parse)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Parse => "parse",
            FailureKind::Embedding => "embedding",
            FailureKind::Internal => "internal",
        })
    }
}

impl IndexError {
    /// Failure kind for errors that mark a file Failed
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            IndexError::Parse { .. } => Some(FailureKind::Parse),
            IndexError::Embedding { .. } => Some(FailureKind::Embedding),
            IndexError::Vector(_) | IndexError::Internal(_) => Some(FailureKind::Internal),
            _ => None,
        }
    }

    /// Short machine-readable tag
    pub fn kind(&self) -> &'static str {
        match self {
            IndexError::Parse { .. } => "parse",
            IndexError::Embedding { .. } => "embedding",
            IndexError::FilterValidation(_) => "filter_validation",
            IndexError::Query(_) => "query",
            IndexError::IndexConsistency { .. } => "index_consistency",
            IndexError::Unsupported(_) => "unsupported",
            IndexError::UnknownSymbol(_) => "unknown_symbol",
            IndexError::InvalidArgument(_) => "invalid_argument",
            IndexError::Config(_) => "config",
            IndexError::Vector(_) => "vector",
            IndexError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        let parse = IndexError::Parse {
            path: "a.py".to_string(),
            source: leparse::traits::Error::ParseFailed("boom".to_string()),
        };
        assert_eq!(parse.failure_kind(), Some(FailureKind::Parse));
        assert!(!FailureKind::Parse.is_retryable());
        assert!(FailureKind::Embedding.is_retryable());
        assert_eq!(IndexError::Unsupported("x.txt".to_string()).failure_kind(), None);
    }

    #[test]
    fn test_filter_errors_convert() {
        let err: IndexError = FilterValidationError::UnknownType("colour".to_string()).into();
        assert_eq!(err.kind(), "filter_validation");
        assert!(err.to_string().contains("colour"));
    }
}
