// AST cache keyed by (path, content hash, language)
//
// An entry is never stale for its key: a different content hash or language
// is a different key. Concurrent misses for one key may both parse, but only the
// first insert wins and every caller gets the same shared tree back.

use crate::grammar::LanguageId;
use crate::parser::ParsedTree;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// File path
    pub path: String,
    /// Content hash
    pub hash: String,
    /// Language the content is parsed as
    pub language: LanguageId,
}

impl CacheKey {
    /// Build a key
    pub fn new(path: impl Into<String>, hash: impl Into<String>, language: LanguageId) -> Self {
        Self {
            path: path.into(),
            hash: hash.into(),
            language,
        }
    }
}

/// Storage backend for parsed trees
pub trait AstCacheBackend: Send + Sync {
    /// Look up a tree
    fn get(&self, key: &CacheKey) -> Option<Arc<ParsedTree>>;

    /// Store a tree
    fn set(&self, key: CacheKey, tree: Arc<ParsedTree>);

    /// Drop one entry; returns whether it existed
    fn evict(&self, key: &CacheKey) -> bool;

    /// Drop every entry for a path; returns how many were dropped
    fn evict_path(&self, path: &str) -> usize;

    /// Number of cached trees
    fn len(&self) -> usize;

    /// Whether the cache holds no trees
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Default backend: a bounded LRU behind a mutex
pub struct LruAstCache {
    inner: Mutex<LruCache<CacheKey, Arc<ParsedTree>>>,
}

impl LruAstCache {
    /// Create a cache holding at most `capacity` trees (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl AstCacheBackend for LruAstCache {
    fn get(&self, key: &CacheKey) -> Option<Arc<ParsedTree>> {
        self.inner.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: CacheKey, tree: Arc<ParsedTree>) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.put(key, tree);
        }
    }

    fn evict(&self, key: &CacheKey) -> bool {
        self.inner
            .lock()
            .map(|mut guard| guard.pop(key).is_some())
            .unwrap_or(false)
    }

    fn evict_path(&self, path: &str) -> usize {
        let Ok(mut guard) = self.inner.lock() else {
            return 0;
        };
        let stale: Vec<CacheKey> = guard
            .iter()
            .filter(|(key, _)| key.path == path)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            guard.pop(key);
        }
        stale.len()
    }

    fn len(&self) -> usize {
        self.inner.lock().map(|guard| guard.len()).unwrap_or(0)
    }
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that required a parse
    pub misses: u64,
    /// Trees currently held
    pub entries: usize,
}

/// Shared AST cache service
pub struct AstCache {
    backend: Arc<dyn AstCacheBackend>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AstCache {
    /// Wrap a backend
    pub fn new(backend: Arc<dyn AstCacheBackend>) -> Self {
        Self {
            backend,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// LRU-backed cache of the given capacity
    pub fn lru(capacity: usize) -> Self {
        Self::new(Arc::new(LruAstCache::new(capacity)))
    }

    /// Return the cached tree for `key`, or build, store and return it.
    ///
    /// The boolean is `true` on a cache hit.
    pub fn get_or_insert_with<F, E>(&self, key: CacheKey, build: F) -> Result<(Arc<ParsedTree>, bool), E>
    where
        F: FnOnce() -> Result<ParsedTree, E>,
    {
        if let Some(tree) = self.backend.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok((tree, true));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let tree = Arc::new(build()?);

        // Double-check: a concurrent miss may have filled the slot first
        if let Some(existing) = self.backend.get(&key) {
            return Ok((existing, false));
        }
        self.backend.set(key, Arc::clone(&tree));
        Ok((tree, false))
    }

    /// Look up without building
    pub fn get(&self, key: &CacheKey) -> Option<Arc<ParsedTree>> {
        self.backend.get(key)
    }

    /// Drop every entry for a path
    pub fn evict_path(&self, path: &str) -> usize {
        self.backend.evict_path(path)
    }

    /// Drop one entry
    pub fn evict(&self, key: &CacheKey) -> bool {
        self.backend.evict(key)
    }

    /// Counters snapshot
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.backend.len(),
        }
    }
}

impl std::fmt::Debug for AstCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AstCache").field("stats", &self.stats()).finish()
    }
}
