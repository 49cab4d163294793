// Shared fixtures for index integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use leindexeur::{CodeIndex, FixedClock, IndexerConfig};
use lerecherche::vector::{Candidate, MetadataPredicate};
use lerecherche::{
    EmbeddingError, EmbeddingProvider, EmbeddingRecord, HashingEmbedder, InMemoryVectorStore, VectorError, VectorStore,
    DEFAULT_DIMENSION,
};
use leparse::symbol::SymbolId;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Hashing embedder that counts the texts it was asked to embed
#[derive(Debug, Default)]
pub struct CountingEmbedder {
    inner: HashingEmbedder,
    texts: AtomicUsize,
}

impl CountingEmbedder {
    pub fn texts(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed_batch(texts).await
    }

    fn dimension(&self) -> usize {
        DEFAULT_DIMENSION
    }

    fn model_name(&self) -> &str {
        "counting"
    }
}

/// Embedder that fails while switched off
#[derive(Debug, Default)]
pub struct FlakyEmbedder {
    inner: HashingEmbedder,
    offline: AtomicBool,
}

impl FlakyEmbedder {
    pub fn offline() -> Self {
        let embedder = Self::default();
        embedder.set_offline(true);
        embedder
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Provider("provider offline".to_string()));
        }
        self.inner.embed_batch(texts).await
    }

    fn dimension(&self) -> usize {
        DEFAULT_DIMENSION
    }

    fn model_name(&self) -> &str {
        "flaky"
    }
}

/// Embedder that answers after a delay
#[derive(Debug)]
pub struct SlowEmbedder {
    inner: HashingEmbedder,
    delay: Duration,
}

impl SlowEmbedder {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: HashingEmbedder::default(),
            delay,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        tokio::time::sleep(self.delay).await;
        self.inner.embed_batch(texts).await
    }

    fn dimension(&self) -> usize {
        DEFAULT_DIMENSION
    }

    fn model_name(&self) -> &str {
        "slow"
    }
}

/// In-memory store that rejects the upsert with a chosen sequence number
#[derive(Debug)]
pub struct FailingStore {
    inner: InMemoryVectorStore,
    writes: Arc<AtomicUsize>,
    fail_at: Arc<AtomicUsize>,
}

/// Handle for arming a [`FailingStore`] after it moved into an index
#[derive(Debug, Clone)]
pub struct FailSwitch {
    writes: Arc<AtomicUsize>,
    fail_at: Arc<AtomicUsize>,
}

impl FailSwitch {
    /// Reject the `n`th upsert from now (1-based), once
    pub fn fail_nth_write(&self, n: usize) {
        self.fail_at.store(self.writes.load(Ordering::SeqCst) + n, Ordering::SeqCst);
    }
}

impl FailingStore {
    pub fn new() -> (Self, FailSwitch) {
        let writes = Arc::new(AtomicUsize::new(0));
        let fail_at = Arc::new(AtomicUsize::new(usize::MAX));
        let switch = FailSwitch {
            writes: Arc::clone(&writes),
            fail_at: Arc::clone(&fail_at),
        };
        let store = Self {
            inner: InMemoryVectorStore::new(DEFAULT_DIMENSION),
            writes,
            fail_at,
        };
        (store, switch)
    }
}

impl VectorStore for FailingStore {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn upsert(&mut self, record: EmbeddingRecord) -> Result<(), VectorError> {
        let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_at.load(Ordering::SeqCst) {
            return Err(VectorError::InvalidParameter("store unavailable".to_string()));
        }
        self.inner.upsert(record)
    }

    fn delete(&mut self, id: &SymbolId) -> bool {
        self.inner.delete(id)
    }

    fn search(&self, query: &[f32], k: usize, filter: Option<MetadataPredicate<'_>>) -> Result<Vec<Candidate>, VectorError> {
        self.inner.search(query, k, filter)
    }

    fn supports_filter_pushdown(&self) -> bool {
        self.inner.supports_filter_pushdown()
    }

    fn get(&self, id: &SymbolId) -> Option<&EmbeddingRecord> {
        self.inner.get(id)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

pub fn fixed_clock() -> Arc<FixedClock> {
    let start = Utc
        .with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
        .single()
        .expect("valid date");
    Arc::new(FixedClock::new(start))
}

/// Index over a fixed clock with the given provider
pub fn index_with(config: IndexerConfig, embedder: Arc<dyn EmbeddingProvider>, clock: Arc<FixedClock>) -> CodeIndex {
    CodeIndex::builder(config)
        .embedder(embedder)
        .clock(clock)
        .build()
        .expect("build index")
}

/// Index over a fixed clock and the local hashing embedder
pub fn index() -> CodeIndex {
    index_with(IndexerConfig::default(), Arc::new(HashingEmbedder::default()), fixed_clock())
}

/// Ten top-level functions; `f{edited}` returns a different value
pub fn ten_functions(edited: Option<usize>) -> String {
    (0..10)
        .map(|i| {
            let value = if Some(i) == edited { i + 100 } else { i };
            format!("def f{}(x):\n    return x + {}\n\n", i, value)
        })
        .collect()
}
