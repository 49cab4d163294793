// Indexing Pipeline
//
// *Le Pipeline* - Parse, extract, diff, embed and commit one file change.
//
// Files run concurrently through a bounded worker pool; one path runs one pass
// at a time. Each event bumps the path's generation and a pass that is no
// longer current stops at the next stage boundary without applying anything.

use crate::chunking::ChunkingPolicy;
use crate::clock::Clock;
use crate::error::{IndexError, Result};
use crate::retry::BackoffPolicy;
use crate::state::{FileTable, PipelineStage};
use crate::store::{record_metadata, IndexState, UnitUpdate};
use chrono::{DateTime, Utc};
use lerecherche::{check_batch, EmbeddingProvider, EmbeddingRecord};
use leparse::diff::diff_symbols;
use leparse::extract::SymbolExtractor;
use leparse::grammar::LanguageId;
use leparse::parser::ParserAdapter;
use leparse::source::{content_hash, SourceUnit};
use leparse::symbol::{Symbol, SymbolId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, Semaphore};
use tracing::{debug, info, warn};

/// New content for one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    /// File path
    pub path: String,
    /// Full file content
    pub content: String,
    /// Language override; otherwise chosen by extension
    #[serde(default)]
    pub language_hint: Option<LanguageId>,
    /// Modification time; defaults to the index clock
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    /// Author of the change
    #[serde(default)]
    pub author: Option<String>,
}

impl FileChange {
    /// Change with content only
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            language_hint: None,
            modified_at: None,
            author: None,
        }
    }

    /// Set the language override
    #[must_use]
    pub fn with_language(mut self, language: Option<LanguageId>) -> Self {
        self.language_hint = language;
        self
    }

    /// Set the modification time
    #[must_use]
    pub fn with_modified_at(mut self, modified_at: DateTime<Utc>) -> Self {
        self.modified_at = Some(modified_at);
        self
    }

    /// Set the author
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

/// Watcher event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FileEvent {
    /// File appeared
    Created(FileChange),
    /// File content changed
    Modified(FileChange),
    /// File was deleted
    Deleted {
        /// File path
        path: String,
    },
}

impl FileEvent {
    /// Path the event is about
    pub fn path(&self) -> &str {
        match self {
            FileEvent::Created(change) | FileEvent::Modified(change) => &change.path,
            FileEvent::Deleted { path } => path,
        }
    }
}

/// What a pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AckOutcome {
    /// A new version was committed
    Indexed {
        /// Symbols with no previous counterpart
        added: usize,
        /// Symbols whose body or signature changed
        modified: usize,
        /// Symbols that disappeared
        removed: usize,
        /// Symbols carried over as-is
        unchanged: usize,
        /// Embeddings computed by the provider
        embedded: usize,
    },
    /// Content identical to the committed version
    Unchanged,
    /// The file and everything derived from it were dropped
    Removed {
        /// Symbols dropped
        symbols: usize,
    },
    /// A newer event for the path took over
    Superseded,
    /// Removal of a path that was never committed
    NotIndexed,
}

/// Acknowledgement for one file operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexAck {
    /// File path
    pub path: String,
    /// Committed version after the operation, if the file is indexed
    pub version: Option<u64>,
    /// Generation of the event
    pub generation: u64,
    /// What happened
    #[serde(flatten)]
    pub outcome: AckOutcome,
}

impl IndexAck {
    fn new(path: &str, version: Option<u64>, generation: u64, outcome: AckOutcome) -> Self {
        Self {
            path: path.to_string(),
            version,
            generation,
            outcome,
        }
    }

    fn superseded(path: &str, generation: u64) -> Self {
        Self::new(path, None, generation, AckOutcome::Superseded)
    }

    /// Whether a newer event took over
    pub fn is_superseded(&self) -> bool {
        self.outcome == AckOutcome::Superseded
    }
}

/// Committed state of a path, copied out of the index under a read lock
struct Previous {
    unit: SourceUnit,
    symbols: Vec<Symbol>,
    embedded: BTreeSet<SymbolId>,
}

/// The indexing pipeline and the state it commits into
pub struct Pipeline {
    pub(crate) parser: Arc<ParserAdapter>,
    pub(crate) extractor: Arc<SymbolExtractor>,
    pub(crate) embedder: Arc<dyn EmbeddingProvider>,
    pub(crate) chunking: ChunkingPolicy,
    pub(crate) backoff: BackoffPolicy,
    pub(crate) embed_timeout: Duration,
    pub(crate) workers: Arc<Semaphore>,
    pub(crate) files: FileTable,
    pub(crate) state: Arc<RwLock<IndexState>>,
    pub(crate) clock: Arc<dyn Clock>,
    path_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Pipeline {
    /// Assemble a pipeline
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        parser: Arc<ParserAdapter>,
        extractor: Arc<SymbolExtractor>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunking: ChunkingPolicy,
        backoff: BackoffPolicy,
        embed_timeout: Duration,
        workers: usize,
        state: Arc<RwLock<IndexState>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            parser,
            extractor,
            embedder,
            chunking,
            backoff,
            embed_timeout,
            workers: Arc::new(Semaphore::new(workers.max(1))),
            files: FileTable::new(),
            state,
            clock,
            path_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub(crate) async fn lock_path(&self, path: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.path_locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(path.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Run one change through parse, extract, diff, embed and commit
    pub async fn process(&self, change: FileChange) -> Result<IndexAck> {
        let path = change.path.clone();
        let generation = self.files.begin(&path);
        let _path_guard = self.lock_path(&path).await;
        let _permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|e| IndexError::Internal(e.to_string()))?;

        if !self.files.is_current(&path, generation) {
            debug!(path = %path, generation, "Superseded before start");
            return Ok(IndexAck::superseded(&path, generation));
        }

        let Some(language) = self.parser.registry().resolve(&path, change.language_hint) else {
            self.files.abandon(&path, generation);
            return Err(IndexError::Unsupported(path));
        };
        let hash = content_hash(&change.content);
        let previous = self.previous(&path).await;

        if let Some(prev) = &previous {
            if prev.unit.content_hash == hash && prev.unit.language == language {
                debug!(path = %path, version = prev.unit.version, "Content unchanged");
                self.files.indexed(&path, generation);
                return Ok(IndexAck::new(&path, Some(prev.unit.version), generation, AckOutcome::Unchanged));
            }
        }

        let version = previous.as_ref().map(|p| p.unit.version + 1).unwrap_or(1);
        let unit = SourceUnit::new(path.clone(), language, &change.content)
            .with_version(version)
            .with_modified_at(change.modified_at.unwrap_or_else(|| self.clock.now()))
            .with_author(change.author.clone());

        // Parsing
        self.files.enter(&path, generation, PipelineStage::Parsing);
        let tree = {
            let parser = Arc::clone(&self.parser);
            let unit = unit.clone();
            let content = change.content.clone();
            tokio::task::spawn_blocking(move || parser.parse(&unit, &content))
                .await
                .map_err(|e| IndexError::Internal(e.to_string()))?
        };
        let tree = match tree {
            Ok(tree) => tree,
            Err(source) => {
                let err = IndexError::Parse {
                    path: path.clone(),
                    source,
                };
                return self.fail(&change, &hash, generation, err);
            }
        };
        if !self.files.enter(&path, generation, PipelineStage::Extracting) {
            return Ok(IndexAck::superseded(&path, generation));
        }

        // Extracting
        let extracted = {
            let extractor = Arc::clone(&self.extractor);
            let unit = unit.clone();
            tokio::task::spawn_blocking(move || extractor.extract(&tree, &unit))
                .await
                .map_err(|e| IndexError::Internal(e.to_string()))?
        };
        let extracted = match extracted {
            Ok(symbols) => symbols,
            Err(source) => {
                let err = IndexError::Parse {
                    path: path.clone(),
                    source,
                };
                return self.fail(&change, &hash, generation, err);
            }
        };

        let (old_symbols, old_embedded) = match previous {
            Some(prev) => (prev.symbols, prev.embedded),
            None => (Vec::new(), BTreeSet::new()),
        };
        let diff = diff_symbols(&old_symbols, extracted);
        let counts = (diff.added.len(), diff.modified.len(), diff.removed.len(), diff.unchanged.len());
        debug!(
            path = %path,
            added = counts.0,
            modified = counts.1,
            removed = counts.2,
            unchanged = counts.3,
            "Diffed symbols"
        );

        let changed: HashSet<SymbolId> = diff.changed().map(|s| s.id.clone()).collect();
        let changed_names: Vec<String> = diff
            .changed()
            .filter(|s| s.kind.is_definition())
            .map(|s| s.name.clone())
            .collect();
        let old_by_id: HashMap<&SymbolId, &Symbol> = old_symbols.iter().map(|s| (&s.id, s)).collect();
        let symbols: Vec<Symbol> = diff
            .current()
            .into_iter()
            .map(|s| {
                let mut symbol = s.clone();
                if !changed.contains(&symbol.id) {
                    if let Some(old) = old_by_id.get(&symbol.id) {
                        symbol.modified_at = old.modified_at;
                        symbol.author = old.author.clone();
                    }
                }
                symbol
            })
            .collect();

        if !self.files.enter(&path, generation, PipelineStage::Embedding) {
            return Ok(IndexAck::superseded(&path, generation));
        }

        // Embedding
        let refs: Vec<&Symbol> = symbols.iter().collect();
        let selected = self.chunking.select(&refs);
        let selected_ids: HashSet<&SymbolId> = selected.iter().map(|s| &s.id).collect();
        let (to_embed, kept): (Vec<&Symbol>, Vec<&Symbol>) = selected
            .iter()
            .copied()
            .partition(|s| changed.contains(&s.id) || !old_embedded.contains(&s.id));
        let deletes: Vec<SymbolId> = old_embedded
            .iter()
            .filter(|id| !selected_ids.contains(id))
            .cloned()
            .collect();

        let mut upserts = self.refresh_metadata(&kept).await;
        let embedded = to_embed.len();
        if !to_embed.is_empty() {
            let vectors = match self.embed(&path, &to_embed).await {
                Ok(vectors) => vectors,
                Err(err) => return self.fail(&change, &hash, generation, err),
            };
            upserts.extend(to_embed.iter().zip(vectors).map(|(symbol, vector)| EmbeddingRecord {
                id: symbol.id.clone(),
                vector,
                metadata: record_metadata(symbol),
            }));
        }

        // Commit
        let mut state = self.state.write().await;
        if !self.files.is_current(&path, generation) {
            debug!(path = %path, generation, "Superseded before commit");
            return Ok(IndexAck::superseded(&path, generation));
        }
        let update = UnitUpdate {
            unit,
            symbols,
            upserts,
            deletes,
            changed_names,
        };
        let summary = match state.apply(update) {
            Ok(summary) => summary,
            Err(err) => {
                drop(state);
                return self.fail(&change, &hash, generation, err.into());
            }
        };
        self.files.indexed(&path, generation);
        drop(state);

        info!(
            path = %path,
            version,
            symbols = summary.symbols,
            embedded,
            deleted = summary.deleted,
            "Committed file"
        );
        Ok(IndexAck::new(
            &path,
            Some(version),
            generation,
            AckOutcome::Indexed {
                added: counts.0,
                modified: counts.1,
                removed: counts.2,
                unchanged: counts.3,
                embedded,
            },
        ))
    }

    /// Drop path locks no pass holds; returns how many were dropped
    pub fn prune_locks(&self) -> usize {
        let mut locks = self.path_locks.lock().unwrap_or_else(|e| e.into_inner());
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    /// Drop a path with everything derived from it
    pub async fn remove(&self, path: &str) -> IndexAck {
        let generation = self.files.begin(path);
        let _path_guard = self.lock_path(path).await;
        let mut state = self.state.write().await;
        if !self.files.is_current(path, generation) {
            debug!(path = %path, generation, "Remove superseded");
            return IndexAck::superseded(path, generation);
        }
        let removed = state.remove_unit(path);
        self.parser.cache().evict_path(path);
        self.files.removed(path);
        drop(state);
        match removed {
            Some(symbols) => {
                info!(path = %path, symbols, "Removed file");
                IndexAck::new(path, None, generation, AckOutcome::Removed { symbols })
            }
            None => {
                debug!(path = %path, "Remove for a path that is not indexed");
                IndexAck::new(path, None, generation, AckOutcome::NotIndexed)
            }
        }
    }

    async fn previous(&self, path: &str) -> Option<Previous> {
        let state = self.state.read().await;
        let entry = state.unit(path)?;
        Some(Previous {
            unit: entry.unit.clone(),
            symbols: state.symbols_of(path).into_iter().cloned().collect(),
            embedded: entry.embedded.clone(),
        })
    }

    /// Reuse stored vectors whose metadata went out of date
    async fn refresh_metadata(&self, kept: &[&Symbol]) -> Vec<EmbeddingRecord> {
        let state = self.state.read().await;
        kept.iter()
            .filter_map(|symbol| {
                let record = state.vectors().get(&symbol.id)?;
                let metadata = record_metadata(symbol);
                (record.metadata != metadata).then(|| EmbeddingRecord {
                    id: symbol.id.clone(),
                    vector: record.vector.clone(),
                    metadata,
                })
            })
            .collect()
    }

    async fn embed(&self, path: &str, symbols: &[&Symbol]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = symbols.iter().map(|s| self.chunking.text(s)).collect();
        debug!(path = %path, texts = texts.len(), model = self.embedder.model_name(), "Embedding symbols");
        let vectors = tokio::time::timeout(self.embed_timeout, self.embedder.embed_batch(&texts))
            .await
            .map_err(|_| IndexError::Embedding {
                path: path.to_string(),
                message: format!("timed out after {}ms", self.embed_timeout.as_millis()),
            })?
            .map_err(|e| IndexError::Embedding {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        check_batch(texts.len(), self.embedder.dimension(), &vectors).map_err(|e| IndexError::Embedding {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        Ok(vectors)
    }

    /// Mark the file Failed, or report the pass as superseded
    fn fail(&self, change: &FileChange, hash: &str, generation: u64, err: IndexError) -> Result<IndexAck> {
        let Some(kind) = err.failure_kind() else {
            return Err(err);
        };
        let now = self.clock.now();
        let backoff = &self.backoff;
        let info = self.files.fail(
            &change.path,
            generation,
            kind,
            err.to_string(),
            change.clone(),
            hash.to_string(),
            |attempts| backoff.next_retry_at(now, attempts),
        );
        match info {
            Some(info) => {
                warn!(
                    path = %change.path,
                    kind = %kind,
                    attempts = info.attempts,
                    next_retry_at = ?info.next_retry_at,
                    error = %err,
                    "Indexing failed"
                );
                Err(err)
            }
            None => Ok(IndexAck::superseded(&change.path, generation)),
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("model", &self.embedder.model_name())
            .field("workers", &self.workers.available_permits())
            .field("embed_timeout", &self.embed_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_path() {
        let created = FileEvent::Created(FileChange::new("a.py", "x = 1\n"));
        assert_eq!(created.path(), "a.py");
        let deleted = FileEvent::Deleted { path: "b.py".into() };
        assert_eq!(deleted.path(), "b.py");
    }

    #[test]
    fn test_change_builders() {
        let change = FileChange::new("a.ts", "let x = 1;")
            .with_language(Some(LanguageId::TypeScript))
            .with_author("ada");
        assert_eq!(change.language_hint, Some(LanguageId::TypeScript));
        assert_eq!(change.author.as_deref(), Some("ada"));
        assert_eq!(change.modified_at, None);
    }

    #[test]
    fn test_ack_serializes_flat() {
        let ack = IndexAck::new("a.py", Some(2), 3, AckOutcome::Indexed {
            added: 1,
            modified: 0,
            removed: 0,
            unchanged: 4,
            embedded: 1,
        });
        let json = serde_json::to_value(&ack).expect("serialize");
        assert_eq!(json["outcome"], "indexed");
        assert_eq!(json["unchanged"], 4);
        assert_eq!(json["version"], 2);
    }
}
