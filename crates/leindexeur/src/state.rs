// Per-file pipeline state
//
// *L'État* (The State) - File status machine, generation counters and retry
// bookkeeping
//
// Unindexed -> Parsing -> Extracting -> Embedding -> Indexed
// Indexed -> Reindexing(stage) -> Indexed | Failed
// A newer event for a path bumps its generation; work started under an older
// generation is discarded.

use crate::error::FailureKind;
use crate::pipeline::FileChange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Parsing into an arena
    Parsing,
    /// Extracting and diffing symbols
    Extracting,
    /// Computing embeddings
    Embedding,
}

/// Failure details for a Failed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// What failed
    pub kind: FailureKind,
    /// Consecutive failed attempts for the same content
    pub attempts: u32,
    /// Last error message
    pub last_error: String,
    /// Earliest automatic retry; `None` when not retryable or exhausted
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Status of one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FileStatus {
    /// Never indexed, or removed
    Unindexed,
    /// First pass: parsing
    Parsing,
    /// First pass: extracting
    Extracting,
    /// First pass: embedding
    Embedding,
    /// Committed and queryable
    Indexed,
    /// Updating a committed file
    Reindexing {
        /// Current stage
        stage: PipelineStage,
    },
    /// Last pass failed; a previous committed version, if any, stays served
    Failed(FailureInfo),
}

impl FileStatus {
    /// Whether a pass is running
    pub fn in_progress(&self) -> bool {
        matches!(
            self,
            FileStatus::Parsing | FileStatus::Extracting | FileStatus::Embedding | FileStatus::Reindexing { .. }
        )
    }

    /// Whether the file failed
    pub fn is_failed(&self) -> bool {
        matches!(self, FileStatus::Failed(_))
    }
}

/// Change to replay on retry
#[derive(Debug, Clone)]
struct PendingRetry {
    change: FileChange,
    content_hash: String,
    attempts: u32,
}

#[derive(Debug, Clone)]
struct FileRecord {
    status: FileStatus,
    generation: u64,
    committed: bool,
    retry: Option<PendingRetry>,
}

impl Default for FileRecord {
    fn default() -> Self {
        Self {
            status: FileStatus::Unindexed,
            generation: 0,
            committed: false,
            retry: None,
        }
    }
}

/// Status table for every path seen
#[derive(Debug, Default)]
pub struct FileTable {
    records: Mutex<HashMap<String, FileRecord>>,
}

impl FileTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, FileRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new event for `path`; returns its generation
    pub fn begin(&self, path: &str) -> u64 {
        let mut records = self.lock();
        let record = records.entry(path.to_string()).or_default();
        record.generation += 1;
        record.generation
    }

    /// Whether `generation` is still the latest for `path`
    pub fn is_current(&self, path: &str, generation: u64) -> bool {
        self.lock().get(path).map(|r| r.generation == generation).unwrap_or(false)
    }

    /// Enter a stage if `generation` is current
    pub fn enter(&self, path: &str, generation: u64, stage: PipelineStage) -> bool {
        let mut records = self.lock();
        let Some(record) = records.get_mut(path) else {
            return false;
        };
        if record.generation != generation {
            return false;
        }
        record.status = if record.committed {
            FileStatus::Reindexing { stage }
        } else {
            match stage {
                PipelineStage::Parsing => FileStatus::Parsing,
                PipelineStage::Extracting => FileStatus::Extracting,
                PipelineStage::Embedding => FileStatus::Embedding,
            }
        };
        true
    }

    /// Mark committed
    pub fn indexed(&self, path: &str, generation: u64) {
        if let Some(record) = self.lock().get_mut(path) {
            if record.generation == generation {
                record.status = FileStatus::Indexed;
                record.committed = true;
                record.retry = None;
            }
        }
    }

    /// Record a failure for the current generation and return the stored info.
    ///
    /// Attempts accumulate while the content hash stays the same, across the
    /// passes in between.
    #[allow(clippy::too_many_arguments)]
    pub fn fail(
        &self,
        path: &str,
        generation: u64,
        kind: FailureKind,
        error: String,
        change: FileChange,
        content_hash: String,
        next_retry: impl FnOnce(u32) -> Option<DateTime<Utc>>,
    ) -> Option<FailureInfo> {
        let mut records = self.lock();
        let record = records.get_mut(path)?;
        if record.generation != generation {
            return None;
        }
        let attempts = match &record.retry {
            Some(pending) if pending.content_hash == content_hash => pending.attempts + 1,
            _ => 1,
        };
        let next_retry_at = if kind.is_retryable() { next_retry(attempts) } else { None };
        let info = FailureInfo {
            kind,
            attempts,
            last_error: error,
            next_retry_at,
        };
        record.status = FileStatus::Failed(info.clone());
        record.retry = Some(PendingRetry {
            change,
            content_hash,
            attempts,
        });
        Some(info)
    }

    /// Forget a removed path, keeping its generation counter
    pub fn removed(&self, path: &str) {
        if let Some(record) = self.lock().get_mut(path) {
            record.status = FileStatus::Unindexed;
            record.committed = false;
            record.retry = None;
        }
    }

    /// Return to the pre-pass status when an unsupported or rejected change stops early
    pub fn abandon(&self, path: &str, generation: u64) {
        if let Some(record) = self.lock().get_mut(path) {
            if record.generation == generation && record.status.in_progress() {
                record.status = if record.committed {
                    FileStatus::Indexed
                } else {
                    FileStatus::Unindexed
                };
            }
        }
    }

    /// Current status
    pub fn status(&self, path: &str) -> Option<FileStatus> {
        self.lock().get(path).map(|r| r.status.clone())
    }

    /// Failed changes whose retry window has elapsed, sorted by path
    pub fn due_retries(&self, now: DateTime<Utc>) -> Vec<FileChange> {
        let records = self.lock();
        let mut due: Vec<FileChange> = records
            .values()
            .filter_map(|r| match (&r.status, &r.retry) {
                (FileStatus::Failed(info), Some(pending)) => info
                    .next_retry_at
                    .filter(|at| *at <= now)
                    .map(|_| pending.change.clone()),
                _ => None,
            })
            .collect();
        due.sort_by(|a, b| a.path.cmp(&b.path));
        due
    }

    /// Counts by coarse status: (indexed, failed, in progress)
    pub fn counts(&self) -> (usize, usize, usize) {
        let records = self.lock();
        let mut counts = (0, 0, 0);
        for record in records.values() {
            match &record.status {
                FileStatus::Indexed => counts.0 += 1,
                FileStatus::Failed(_) => counts.1 += 1,
                s if s.in_progress() => counts.2 += 1,
                _ => {}
            }
        }
        counts
    }

    /// Drop records of paths that are neither indexed, failed nor in progress
    pub fn prune(&self) -> usize {
        let mut records = self.lock();
        let before = records.len();
        records.retain(|_, r| r.status != FileStatus::Unindexed);
        before - records.len()
    }
}
