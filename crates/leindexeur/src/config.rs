// Indexer Configuration
//
// *La Configuration* (The Configuration) - Pool, cache, chunking, vector,
// ranking and query settings for a code index

use crate::chunking::ChunkingPolicy;
use crate::error::IndexError;
use crate::retry::BackoffPolicy;
use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use lerecherche::{HnswParams, RankingConfig, DEFAULT_DIMENSION};
use leparse::extract::DEFAULT_SNIPPET_CHARS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = ".leindex/config.toml";

/// Indexer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IndexerConfig {
    /// Worker pool and per-stage settings
    pub pipeline: PipelineConfig,

    /// Backoff for failed files
    pub retry: BackoffPolicy,

    /// AST cache settings
    pub cache: CacheConfig,

    /// Which symbols get embeddings
    pub chunking: ChunkingPolicy,

    /// Vector index settings
    pub vector: VectorConfig,

    /// Composite score weights
    pub ranking: RankingConfig,

    /// Pattern detection settings
    pub patterns: PatternConfig,

    /// Query defaults
    pub query: QueryConfig,

    /// Paths skipped when walking a directory
    pub exclusions: ExclusionConfig,
}

impl IndexerConfig {
    /// Load configuration from a project directory
    ///
    /// Looks for `.leindex/config.toml` in the project directory.
    /// If not found, returns default configuration. A loaded file is
    /// validated before it is returned.
    pub fn load<P: AsRef<Path>>(project_path: P) -> Result<Self> {
        let config_path = project_path.as_ref().join(DEFAULT_CONFIG_FILE);

        if !config_path.exists() {
            return Ok(IndexerConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: IndexerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", config_path))?;

        Ok(config)
    }

    /// Save configuration to a project directory
    ///
    /// Creates `.leindex` directory if it doesn't exist.
    pub fn save<P: AsRef<Path>>(&self, project_path: P) -> Result<()> {
        let config_dir = project_path.as_ref().join(".leindex");
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;

        let config_path = config_dir.join("config.toml");

        let toml_string = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(&config_path, toml_string)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Check every section
    pub fn validate(&self) -> std::result::Result<(), IndexError> {
        let invalid = |msg: String| Err(IndexError::Config(msg));

        if self.pipeline.workers == 0 {
            return invalid("pipeline.workers must be > 0".to_string());
        }
        if self.pipeline.embed_timeout_ms == 0 {
            return invalid("pipeline.embed_timeout_ms must be > 0".to_string());
        }
        if self.cache.capacity == 0 {
            return invalid("cache.capacity must be > 0".to_string());
        }
        if self.vector.dimension == 0 {
            return invalid("vector.dimension must be > 0".to_string());
        }
        if self.vector.overfetch_factor == 0 || self.vector.max_overfetch_rounds == 0 {
            return invalid("vector.overfetch_factor and vector.max_overfetch_rounds must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.patterns.min_confidence) {
            return invalid(format!(
                "patterns.min_confidence must be within [0, 1], got {}",
                self.patterns.min_confidence
            ));
        }
        if self.query.default_top_k == 0 {
            return invalid("query.default_top_k must be > 0".to_string());
        }
        if self.query.candidate_multiplier == 0 {
            return invalid("query.candidate_multiplier must be > 0".to_string());
        }

        self.retry.validate().map_err(IndexError::Config)?;
        self.chunking.validate().map_err(IndexError::Config)?;
        if self.vector.backend == VectorBackend::Hnsw {
            self.vector.hnsw.validate().map_err(|e| IndexError::Config(e.to_string()))?;
        }
        self.ranking.validate().map_err(|e| IndexError::Config(e.to_string()))?;
        self.exclusions.matcher()?;
        Ok(())
    }
}

/// Worker pool and per-stage settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Files processed concurrently
    pub workers: usize,

    /// Upper bound on one embedding call, in milliseconds
    pub embed_timeout_ms: u64,

    /// Treat trees containing syntax errors as parse failures
    pub reject_syntax_errors: bool,

    /// Characters of source kept on each symbol
    pub snippet_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            embed_timeout_ms: 10_000,
            reject_syntax_errors: true,
            snippet_chars: DEFAULT_SNIPPET_CHARS,
        }
    }
}

impl PipelineConfig {
    /// Embedding timeout
    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }
}

/// AST cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Parsed trees kept
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

/// Vector store implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Exact brute-force cosine with filter pushdown
    #[default]
    Exact,
    /// Approximate HNSW graph with post-filtering
    Hnsw,
}

/// Vector index settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Store implementation
    pub backend: VectorBackend,

    /// Embedding dimension; must match the provider
    pub dimension: usize,

    /// Over-fetch multiplier for stores without filter pushdown
    pub overfetch_factor: usize,

    /// Over-fetch rounds before returning fewer than `k`
    pub max_overfetch_rounds: usize,

    /// HNSW graph parameters
    pub hnsw: HnswParams,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Exact,
            dimension: DEFAULT_DIMENSION,
            overfetch_factor: lerecherche::vector::DEFAULT_OVERFETCH_FACTOR,
            max_overfetch_rounds: lerecherche::vector::DEFAULT_MAX_OVERFETCH_ROUNDS,
            hnsw: HnswParams::default(),
        }
    }
}

/// Pattern detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Lowest confidence reported
    pub min_confidence: f32,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            min_confidence: lemotif::DEFAULT_MIN_CONFIDENCE,
        }
    }
}

/// Query defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Results returned when the request does not say
    pub default_top_k: usize,

    /// Vector candidates fetched per requested result
    pub candidate_multiplier: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_top_k: 10,
            candidate_multiplier: 4,
        }
    }
}

/// Path exclusion globs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusionConfig {
    /// Glob patterns matched against the path relative to the walked root
    pub patterns: Vec<String>,
}

impl Default for ExclusionConfig {
    fn default() -> Self {
        Self {
            patterns: [
                "**/target/**",
                "**/node_modules/**",
                "**/.git/**",
                "**/vendor/**",
                "**/dist/**",
                "**/build/**",
                "**/__pycache__/**",
                "**/.venv/**",
                "**/*.min.js",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
        }
    }
}

impl ExclusionConfig {
    /// Compile the patterns
    pub fn matcher(&self) -> std::result::Result<GlobSet, IndexError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| IndexError::Config(format!("exclusions: invalid glob {:?}: {}", pattern, e)))?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| IndexError::Config(format!("exclusions: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = IndexerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.workers, 4);
        assert_eq!(config.vector.dimension, DEFAULT_DIMENSION);
        assert_eq!(config.query.default_top_k, 10);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let config = IndexerConfig::load(dir.path()).expect("load");
        assert_eq!(config, IndexerConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().expect("tempdir");
        let mut config = IndexerConfig::default();
        config.pipeline.workers = 2;
        config.vector.backend = VectorBackend::Hnsw;
        config.ranking.w_feedback = 0.3;
        config.save(dir.path()).expect("save");

        let loaded = IndexerConfig::load(dir.path()).expect("load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().expect("tempdir");
        fs::create_dir_all(dir.path().join(".leindex")).expect("mkdir");
        fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "[pipeline]\nworkers = 8\n\n[vector]\nbackend = \"hnsw\"\n\n[vector.hnsw]\nef_search = 80\n",
        )
        .expect("write");

        let config = IndexerConfig::load(dir.path()).expect("load");
        assert_eq!(config.pipeline.workers, 8);
        assert_eq!(config.pipeline.embed_timeout_ms, 10_000);
        assert_eq!(config.vector.backend, VectorBackend::Hnsw);
        assert_eq!(config.vector.hnsw.ef_search, 80);
        assert_eq!(config.vector.hnsw.m, 16);
    }

    #[test]
    fn test_invalid_file_is_rejected_with_context() {
        let dir = TempDir::new().expect("tempdir");
        fs::create_dir_all(dir.path().join(".leindex")).expect("mkdir");
        fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "[ranking]\nw_similarity = -1.0\n").expect("write");

        let err = IndexerConfig::load(dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("w_similarity"));
    }

    #[test]
    fn test_validation_failures() {
        let mut config = IndexerConfig::default();
        config.pipeline.workers = 0;
        assert!(matches!(config.validate(), Err(IndexError::Config(_))));

        let mut config = IndexerConfig::default();
        config.patterns.min_confidence = 1.5;
        assert!(config.validate().is_err());

        let mut config = IndexerConfig::default();
        config.exclusions.patterns.push("a[".to_string());
        assert!(config.validate().is_err());

        let mut config = IndexerConfig::default();
        config.chunking.max_embeddings_per_unit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_exclusions_match_nested_paths() {
        let matcher = ExclusionConfig::default().matcher().expect("compile");
        assert!(matcher.is_match("crate/target/debug/build.rs"));
        assert!(matcher.is_match("web/node_modules/react/index.js"));
        assert!(!matcher.is_match("src/lib.rs"));
    }
}
