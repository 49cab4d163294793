// Source unit descriptors

use crate::grammar::LanguageId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// blake3 hex digest of file content
pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// One indexed version of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    /// File path as reported by the caller
    pub path: String,
    /// Language used to parse the content
    pub language: LanguageId,
    /// blake3 hex digest of the content
    pub content_hash: String,
    /// Monotonic per-path version, bumped on each committed update
    pub version: u64,
    /// Last-modified timestamp
    pub modified_at: DateTime<Utc>,
    /// Author of the last change, when known
    pub author: Option<String>,
}

impl SourceUnit {
    /// Describe `content` at `path` (version 0, modified now)
    pub fn new(path: impl Into<String>, language: LanguageId, content: &str) -> Self {
        Self {
            path: path.into(),
            language,
            content_hash: content_hash(content),
            version: 0,
            modified_at: Utc::now(),
            author: None,
        }
    }

    /// Set the version
    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Set the modification time
    #[must_use]
    pub fn with_modified_at(mut self, modified_at: DateTime<Utc>) -> Self {
        self.modified_at = modified_at;
        self
    }

    /// Set the author
    #[must_use]
    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.author = author;
        self
    }
}
