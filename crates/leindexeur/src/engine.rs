// Code Index
//
// *Le Moteur* (The Engine) - Unified API over the indexing pipeline, the
// index state, query understanding, ranking and the pattern detector

use crate::clock::{Clock, SystemClock};
use crate::config::{IndexerConfig, VectorBackend};
use crate::error::{IndexError, Result};
use crate::pipeline::{FileChange, FileEvent, IndexAck, Pipeline};
use crate::state::FileStatus;
use crate::store::{record_metadata, IndexState, ResolvedRelation};
use lemotif::{find_similar, PatternDetector, PatternMatch};
use lerecherche::vector::MetadataPredicate;
use lerecherche::{
    check_batch, EmbeddingProvider, FeedbackSignal, Filter, FilterSet, HashingEmbedder, HnswVectorStore,
    InMemoryVectorStore, QueryParser, RankCandidate, RankedResult, Ranker, RecentContext, RecordMetadata, VectorIndex,
    VectorStore,
};
use leparse::cache::{AstCache, AstCacheBackend, CacheStats};
use leparse::extract::SymbolExtractor;
use leparse::grammar::LanguageId;
use leparse::languages::LanguageRegistry;
use leparse::parser::ParserAdapter;
use leparse::symbol::{Symbol, SymbolId, SymbolKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Vector candidates fetched per query regardless of `top_k`
const MIN_VECTOR_CANDIDATES: usize = 32;

/// Query parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    /// Natural-language or identifier query
    pub text: String,
    /// Explicit filters, combined conjunctively with inferred ones
    pub filters: Vec<Filter>,
    /// Results wanted; the configured default when absent
    pub top_k: Option<usize>,
    /// Attach pattern matches to each result
    pub include_patterns: bool,
}

impl QueryRequest {
    /// Request with text only
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Add a filter
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Set the result count
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Attach pattern matches to results
    #[must_use]
    pub fn with_patterns(mut self, include: bool) -> Self {
        self.include_patterns = include;
        self
    }
}

/// Index statistics
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    /// Files with a committed version and no pending failure
    pub files_indexed: usize,
    /// Files whose last pass failed
    pub files_failed: usize,
    /// Files with a pass running
    pub files_in_progress: usize,
    /// Symbols held
    pub symbols: usize,
    /// Embedding records held
    pub embeddings: usize,
    /// AST cache counters
    pub cache: CacheStats,
    /// Symbols with recorded feedback
    pub feedback: usize,
    /// Embedding model in use
    pub model: String,
}

/// Result of a prune pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Symbols of superseded versions removed
    pub symbols: usize,
    /// Status records of removed paths dropped
    pub files: usize,
    /// Idle path locks dropped
    pub locks: usize,
}

struct Inner {
    pipeline: Pipeline,
    query_parser: QueryParser,
    ranker: Ranker,
    detector: PatternDetector,
    config: IndexerConfig,
}

/// Structural and semantic code index
///
/// Cheap to clone; clones share the same index.
///
/// # Example
///
/// ```ignore
/// let index = CodeIndex::builder(IndexerConfig::default()).build()?;
/// index.index_file("src/app.py", source, None).await?;
/// let results = index.query(QueryRequest::new("where is connect called")).await?;
/// ```
#[derive(Clone)]
pub struct CodeIndex {
    inner: Arc<Inner>,
}

/// Builder for [`CodeIndex`]
pub struct CodeIndexBuilder {
    config: IndexerConfig,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    clock: Option<Arc<dyn Clock>>,
    cache_backend: Option<Arc<dyn AstCacheBackend>>,
    vector_store: Option<Box<dyn VectorStore>>,
    registry: Option<Arc<LanguageRegistry>>,
}

impl CodeIndexBuilder {
    /// Use an embedding provider instead of the local hashing embedder
    #[must_use]
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Use a clock instead of the system clock
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use an AST cache backend instead of the LRU cache
    #[must_use]
    pub fn cache_backend(mut self, backend: Arc<dyn AstCacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    /// Use a vector store instead of the configured backend
    #[must_use]
    pub fn vector_store(mut self, store: Box<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Use a language registry instead of the default one
    #[must_use]
    pub fn registry(mut self, registry: Arc<LanguageRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Validate the configuration and assemble the index
    pub fn build(self) -> Result<CodeIndex> {
        let config = self.config;
        config.validate()?;
        let dimension = config.vector.dimension;

        let embedder = self
            .embedder
            .unwrap_or_else(|| Arc::new(HashingEmbedder::new(dimension)) as Arc<dyn EmbeddingProvider>);
        if embedder.dimension() != dimension {
            return Err(IndexError::Config(format!(
                "embedding provider {} produces {} dimensions, vector.dimension is {}",
                embedder.model_name(),
                embedder.dimension(),
                dimension
            )));
        }

        let store: Box<dyn VectorStore> = match self.vector_store {
            Some(store) => store,
            None => match config.vector.backend {
                VectorBackend::Exact => Box::new(InMemoryVectorStore::new(dimension)),
                VectorBackend::Hnsw => Box::new(HnswVectorStore::with_params(dimension, config.vector.hnsw.clone())),
            },
        };
        if store.dimension() != dimension {
            return Err(IndexError::Config(format!(
                "vector store has {} dimensions, vector.dimension is {}",
                store.dimension(),
                dimension
            )));
        }
        let vectors = VectorIndex::new(store).with_overfetch(config.vector.overfetch_factor, config.vector.max_overfetch_rounds);

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(LanguageRegistry::with_defaults()));
        let cache = match self.cache_backend {
            Some(backend) => AstCache::new(backend),
            None => AstCache::lru(config.cache.capacity),
        };
        let parser = ParserAdapter::new(Arc::clone(&registry), Arc::new(cache))
            .with_reject_syntax_errors(config.pipeline.reject_syntax_errors);
        let extractor = SymbolExtractor::new(registry).with_snippet_chars(config.pipeline.snippet_chars);

        let pipeline = Pipeline::new(
            Arc::new(parser),
            Arc::new(extractor),
            embedder,
            config.chunking.clone(),
            config.retry.clone(),
            config.pipeline.embed_timeout(),
            config.pipeline.workers,
            Arc::new(RwLock::new(IndexState::new(vectors))),
            self.clock.unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>),
        );

        info!(
            workers = config.pipeline.workers,
            dimension,
            backend = ?config.vector.backend,
            "Created code index"
        );
        Ok(CodeIndex {
            inner: Arc::new(Inner {
                pipeline,
                query_parser: QueryParser::new()?,
                ranker: Ranker::new(config.ranking.clone()),
                detector: PatternDetector::new(config.patterns.min_confidence),
                config,
            }),
        })
    }
}

impl CodeIndex {
    /// Start building an index
    pub fn builder(config: IndexerConfig) -> CodeIndexBuilder {
        CodeIndexBuilder {
            config,
            embedder: None,
            clock: None,
            cache_backend: None,
            vector_store: None,
            registry: None,
        }
    }

    /// Index with the default configuration and local embedder
    pub fn new() -> Result<Self> {
        Self::builder(IndexerConfig::default()).build()
    }

    /// Configuration in use
    pub fn config(&self) -> &IndexerConfig {
        &self.inner.config
    }

    fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    /// Index or reindex one file
    pub async fn index_file(&self, path: &str, content: &str, language_hint: Option<LanguageId>) -> Result<IndexAck> {
        self.index_change(FileChange::new(path, content).with_language(language_hint))
            .await
    }

    /// Index one change carrying modification time and author
    pub async fn index_change(&self, change: FileChange) -> Result<IndexAck> {
        self.pipeline().process(change).await
    }

    /// Drop a file, its symbols and its embeddings
    pub async fn remove_file(&self, path: &str) -> IndexAck {
        self.pipeline().remove(path).await
    }

    /// Apply a watcher event
    pub async fn handle_event(&self, event: FileEvent) -> Result<IndexAck> {
        match event {
            FileEvent::Created(change) | FileEvent::Modified(change) => self.index_change(change).await,
            FileEvent::Deleted { path } => Ok(self.remove_file(&path).await),
        }
    }

    /// Index several changes concurrently; results follow input order
    pub async fn index_batch(&self, changes: Vec<FileChange>) -> Vec<Result<IndexAck>> {
        let total = changes.len();
        let mut tasks = JoinSet::new();
        for (slot, change) in changes.into_iter().enumerate() {
            let index = self.clone();
            tasks.spawn(async move { (slot, index.index_change(change).await) });
        }

        let mut results: Vec<Option<Result<IndexAck>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, result)) => results[slot] = Some(result),
                Err(e) => warn!(error = %e, "Indexing task failed"),
            }
        }

        let results: Vec<Result<IndexAck>> = results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err(IndexError::Internal("indexing task did not complete".to_string()))))
            .collect();
        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(files = total, failed, "Batch indexed");
        results
    }

    /// Re-run failed files whose backoff window has elapsed
    pub async fn retry_failed(&self) -> Vec<Result<IndexAck>> {
        let due = self.pipeline().files.due_retries(self.pipeline().clock.now());
        if due.is_empty() {
            return Vec::new();
        }
        debug!(files = due.len(), "Retrying failed files");
        self.index_batch(due).await
    }

    /// Status of a path; `None` when never seen
    pub fn status(&self, path: &str) -> Option<FileStatus> {
        self.pipeline().files.status(path)
    }

    /// Symbol by id
    pub async fn symbol(&self, id: &SymbolId) -> Option<Symbol> {
        self.pipeline().state.read().await.symbol(id).cloned()
    }

    /// Symbols of a file in document order
    pub async fn symbols_of(&self, path: &str) -> Vec<Symbol> {
        self.pipeline()
            .state
            .read()
            .await
            .symbols_of(path)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Symbols whose name or qualified name equals `name` (case-insensitive)
    pub async fn find_symbols(&self, name: &str) -> Vec<Symbol> {
        let state = self.pipeline().state.read().await;
        let mut found: Vec<Symbol> = state
            .lookup_name(name)
            .filter_map(|id| state.symbol(id))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            (a.unit.path.as_str(), a.span.start_byte).cmp(&(b.unit.path.as_str(), b.span.start_byte))
        });
        found.dedup_by(|a, b| a.id == b.id);
        found
    }

    /// Relations of a symbol with cross-file resolution by name
    pub async fn resolve_relations(&self, id: &SymbolId) -> Result<Vec<ResolvedRelation>> {
        let state = self.pipeline().state.read().await;
        let symbol = state.symbol(id).ok_or_else(|| IndexError::UnknownSymbol(id.clone()))?;
        Ok(state.resolve_relations(symbol))
    }

    /// Record a reaction to a result
    pub async fn record_feedback(&self, id: &SymbolId, signal: FeedbackSignal) -> Result<()> {
        let mut state = self.pipeline().state.write().await;
        if state.symbol(id).is_none() {
            return Err(IndexError::UnknownSymbol(id.clone()));
        }
        state.feedback_mut().record(id, signal);
        debug!(symbol = %id, signal = %signal, "Recorded feedback");
        Ok(())
    }

    /// Drop superseded symbols, orphaned feedback and records of removed paths
    pub async fn prune_stale(&self) -> PruneReport {
        let symbols = self.pipeline().state.write().await.prune_stale();
        let files = self.pipeline().files.prune();
        let locks = self.pipeline().prune_locks();
        if symbols > 0 || files > 0 {
            info!(symbols, files, locks, "Pruned stale index entries");
        }
        PruneReport { symbols, files, locks }
    }

    /// Index statistics
    pub async fn stats(&self) -> IndexStats {
        let (files_indexed, files_failed, files_in_progress) = self.pipeline().files.counts();
        let state = self.pipeline().state.read().await;
        IndexStats {
            files_indexed,
            files_failed,
            files_in_progress,
            symbols: state.symbol_count(),
            embeddings: state.vectors().len(),
            cache: self.pipeline().parser.cache().stats(),
            feedback: state.feedback().len(),
            model: self.pipeline().embedder.model_name().to_string(),
        }
    }

    /// Pattern matches of a function or class; empty for other kinds
    pub async fn get_patterns(&self, id: &SymbolId) -> Result<Vec<PatternMatch>> {
        let state = self.pipeline().state.read().await;
        let symbol = state.symbol(id).ok_or_else(|| IndexError::UnknownSymbol(id.clone()))?;
        Ok(state.patterns_for(symbol, &self.inner.detector))
    }

    /// Structurally similar functions or classes at or above `threshold`
    pub async fn get_similar(&self, id: &SymbolId, threshold: f32) -> Result<Vec<(SymbolId, f32)>> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(IndexError::InvalidArgument(format!(
                "similarity threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        let state = self.pipeline().state.read().await;
        let target = state.symbol(id).ok_or_else(|| IndexError::UnknownSymbol(id.clone()))?;
        Ok(find_similar(target, state.all_symbols(), threshold))
    }

    /// Classify, filter, search and rank
    pub async fn query(&self, request: QueryRequest) -> Result<Vec<RankedResult>> {
        // Explicit filters are rejected before anything runs
        FilterSet::new(request.filters.clone())?;
        let top_k = request.top_k.unwrap_or(self.inner.config.query.default_top_k);

        let context = {
            let state = self.pipeline().state.read().await;
            RecentContext {
                recent_paths: state.recent_paths(),
                recent_symbols: state.recent_symbols(),
            }
        };
        let intent = self.inner.query_parser.classify(&request.text, Some(&context))?;
        let filters = FilterSet::with_inferred(request.filters, &intent.filters)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let query_vector = self.embed_query(&intent.rewritten).await?;

        let state = self.pipeline().state.read().await;
        let detector = &self.inner.detector;

        let mut candidates: BTreeMap<SymbolId, f32> = BTreeMap::new();
        let matches_metadata = |m: &RecordMetadata| filters.matches_metadata(m);
        let predicate: MetadataPredicate<'_> = &matches_metadata;
        let predicate = filters.has_metadata_filters().then_some(predicate);
        let fetch = top_k
            .saturating_mul(self.inner.config.query.candidate_multiplier)
            .max(MIN_VECTOR_CANDIDATES);
        for hit in state.vectors().filtered_search(&query_vector, fetch, predicate)? {
            candidates.insert(hit.id, hit.similarity);
        }

        for term in &intent.terms {
            for id in state.lookup_name(term) {
                if candidates.contains_key(id) {
                    continue;
                }
                if let Some(symbol) = state.symbol(id) {
                    if filters.matches_metadata(&record_metadata(symbol)) {
                        candidates.insert(id.clone(), state.similarity(&query_vector, symbol));
                    }
                }
            }
        }

        if filters.has_pattern_filters() {
            for symbol in state.all_symbols() {
                if matches!(symbol.kind, SymbolKind::Class | SymbolKind::Function)
                    && !candidates.contains_key(&symbol.id)
                    && filters.matches_metadata(&record_metadata(symbol))
                {
                    candidates.insert(symbol.id.clone(), state.similarity(&query_vector, symbol));
                }
            }
        }

        let mut patterns: HashMap<SymbolId, Vec<PatternMatch>> = HashMap::new();
        let mut ranked: Vec<RankCandidate<'_>> = Vec::with_capacity(candidates.len());
        for (id, similarity) in &candidates {
            let Some(symbol) = state.symbol(id) else {
                continue;
            };
            if let Err(err) = state.check(symbol) {
                warn!(error = %err, "Skipping inconsistent symbol");
                continue;
            }
            if filters.has_pattern_filters() {
                let found = state.patterns_for(symbol, detector);
                if !filters.matches_patterns(&found) {
                    continue;
                }
                patterns.insert(id.clone(), found);
            }
            ranked.push(RankCandidate {
                symbol,
                similarity: *similarity,
            });
        }

        let now = self.pipeline().clock.now();
        let mut results = self.inner.ranker.rank(&ranked, &intent, state.feedback(), now, top_k);
        if request.include_patterns {
            for result in &mut results {
                result.patterns = match patterns.remove(&result.symbol_id) {
                    Some(found) => found,
                    None => state
                        .symbol(&result.symbol_id)
                        .map(|s| state.patterns_for(s, detector))
                        .unwrap_or_default(),
                };
            }
        }

        debug!(
            query = %request.text,
            category = ?intent.category,
            candidates = candidates.len(),
            results = results.len(),
            "Query complete"
        );
        Ok(results)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let embedder = &self.pipeline().embedder;
        let texts = vec![text.to_string()];
        let query_error = |message: String| IndexError::Embedding {
            path: "<query>".to_string(),
            message,
        };
        let mut vectors = tokio::time::timeout(self.pipeline().embed_timeout, embedder.embed_batch(&texts))
            .await
            .map_err(|_| query_error("query embedding timed out".to_string()))?
            .map_err(|e| query_error(e.to_string()))?;
        check_batch(1, embedder.dimension(), &vectors).map_err(|e| query_error(e.to_string()))?;
        vectors
            .pop()
            .ok_or_else(|| query_error("provider returned no vector".to_string()))
    }
}

impl std::fmt::Debug for CodeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeIndex")
            .field("pipeline", &self.inner.pipeline)
            .finish()
    }
}
