// CLI Interface
//
// Command-line interface: walks a project, indexes it and runs queries and
// structural lookups against the resulting index.

use crate::params::{self, DEFAULT_SIMILARITY_THRESHOLD};
use anyhow::{Context, Result as AnyhowResult};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use globset::GlobSet;
use leindexeur::{CodeIndex, FileChange, IndexerConfig};
use leparse::grammar::LanguageId;
use leparse::symbol::Symbol;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::{DirEntry, WalkDir};

/// LeIndex - Structural and Semantic Code Index
#[derive(Parser, Debug)]
#[command(name = "leindex")]
#[command(author = "LeIndex Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Index source files and query them by meaning, structure and pattern", long_about = None)]
pub struct Cli {
    /// Enable verbose logging (overridden by RUST_LOG)
    #[arg(global = true, long = "verbose", short = 'v')]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index every supported file under a directory
    Index {
        /// Project directory
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Index a directory, then run a query and print ranked results as JSON
    Query {
        /// Project directory
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Query text
        #[arg(value_name = "QUERY")]
        query: String,

        /// Filter as key=value; repeat for a conjunction
        #[arg(long = "filter", short = 'f', value_name = "KEY=VALUE")]
        filters: Vec<String>,

        /// Maximum number of results
        #[arg(long = "top-k")]
        top_k: Option<usize>,

        /// Attach pattern matches to results
        #[arg(long = "patterns")]
        patterns: bool,
    },

    /// Print symbols structurally similar to the named symbol
    Similar {
        /// Project directory
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Symbol name or qualified name
        #[arg(value_name = "SYMBOL")]
        symbol: String,

        /// Minimum similarity in [0, 1]
        #[arg(long = "threshold", default_value_t = DEFAULT_SIMILARITY_THRESHOLD)]
        threshold: f32,
    },

    /// Print design patterns detected on the named symbol
    Patterns {
        /// Project directory
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Symbol name or qualified name
        #[arg(value_name = "SYMBOL")]
        symbol: String,
    },
}

impl Cli {
    /// Run the CLI
    pub async fn run(self) -> AnyhowResult<()> {
        init_logging(self.verbose);

        match self.command {
            Commands::Index { path } => cmd_index_impl(path).await,
            Commands::Query {
                path,
                query,
                filters,
                top_k,
                patterns,
            } => cmd_query_impl(path, query, filters, top_k, patterns).await,
            Commands::Similar { path, symbol, threshold } => cmd_similar_impl(path, symbol, threshold).await,
            Commands::Patterns { path, symbol } => cmd_patterns_impl(path, symbol).await,
        }
    }
}

/// Install the stderr subscriber; `RUST_LOG` wins over the verbosity flag
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Outcome of indexing a project directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexSummary {
    /// Supported files found
    pub files_found: usize,
    /// Files committed or unchanged
    pub indexed: usize,
    /// Files whose pass failed
    pub failed: usize,
    /// Files skipped before indexing (unreadable or not UTF-8)
    pub skipped: usize,
}

/// Supported source files under a project root
#[derive(Debug, Default)]
pub struct ProjectScan {
    /// One change per readable file, paths relative to the root
    pub changes: Vec<FileChange>,
    /// Files that could not be read
    pub skipped: usize,
}

/// Relative path with `/` separators
fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_excluded(root: &Path, entry: &DirEntry, exclusions: &GlobSet) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if entry.file_type().is_dir() && name.starts_with('.') {
        return true;
    }
    exclusions.is_match(relative_path(root, entry.path()))
}

/// Walk `root` and read every file with a supported extension
pub fn scan_project(root: &Path, config: &IndexerConfig) -> AnyhowResult<ProjectScan> {
    let exclusions = config.exclusions.matcher()?;
    let mut scan = ProjectScan::default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_excluded(root, entry, &exclusions));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = relative_path(root, entry.path());
        if LanguageId::from_path(&rel).is_none() {
            continue;
        }

        let content = match std::fs::read_to_string(entry.path()) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %rel, "Skipping file: {}", e);
                scan.skipped += 1;
                continue;
            }
        };
        let mut change = FileChange::new(rel, content);
        if let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) {
            change = change.with_modified_at(DateTime::<Utc>::from(modified));
        }
        scan.changes.push(change);
    }

    debug!(files = scan.changes.len(), skipped = scan.skipped, "Scanned {}", root.display());
    Ok(scan)
}

/// Load the project configuration, build an index and index the project
pub async fn open_project(path: &Path) -> AnyhowResult<(CodeIndex, IndexSummary)> {
    let root = path
        .canonicalize()
        .with_context(|| format!("Failed to canonicalize project path: {}", path.display()))?;
    let config = IndexerConfig::load(&root)?;
    let index = CodeIndex::builder(config.clone())
        .build()
        .context("Failed to create index")?;

    info!("Indexing project at: {}", root.display());
    let scan_root = root.clone();
    let scan = tokio::task::spawn_blocking(move || scan_project(&scan_root, &config))
        .await
        .context("Scan task failed")??;

    let mut summary = IndexSummary {
        files_found: scan.changes.len() + scan.skipped,
        skipped: scan.skipped,
        ..IndexSummary::default()
    };
    for result in index.index_batch(scan.changes).await {
        match result {
            Ok(_) => summary.indexed += 1,
            Err(e) => {
                warn!("{}", e);
                summary.failed += 1;
            }
        }
    }
    info!(
        indexed = summary.indexed,
        failed = summary.failed,
        skipped = summary.skipped,
        "Indexed {}",
        root.display()
    );
    Ok((index, summary))
}

fn print_json(value: &impl Serialize) -> AnyhowResult<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

/// Symbols named `name`, or an error naming the miss
async fn named_symbols(index: &CodeIndex, name: &str) -> AnyhowResult<Vec<Symbol>> {
    let found: Vec<Symbol> = index
        .find_symbols(name)
        .await
        .into_iter()
        .filter(|s| s.kind.is_definition())
        .collect();
    if found.is_empty() {
        anyhow::bail!("No symbol named '{}'", name);
    }
    Ok(found)
}

fn symbol_json(symbol: &Symbol) -> Value {
    json!({
        "symbol_id": symbol.id,
        "name": symbol.qualified_name,
        "kind": symbol.kind,
        "path": symbol.unit.path,
        "line": symbol.span.start_line,
    })
}

/// Index command implementation
async fn cmd_index_impl(path: PathBuf) -> AnyhowResult<()> {
    let (index, summary) = open_project(&path).await?;
    let stats = index.stats().await;

    println!("\nIndexing complete");
    println!("  Files found: {}", summary.files_found);
    println!("  Indexed: {}", summary.indexed);
    println!("  Failed: {}", summary.failed);
    println!("  Skipped: {}", summary.skipped);
    println!("  Symbols: {}", stats.symbols);
    println!("  Embeddings: {} ({})", stats.embeddings, stats.model);

    Ok(())
}

/// Query command implementation
async fn cmd_query_impl(
    path: PathBuf,
    query: String,
    filters: Vec<String>,
    top_k: Option<usize>,
    patterns: bool,
) -> AnyhowResult<()> {
    let request = params::query_request(&json!({
        "query": query,
        "filters": filters,
        "top_k": top_k,
        "include_patterns": patterns,
    }))?;

    let (index, _) = open_project(&path).await?;
    let results = index.query(request).await.context("Query failed")?;
    print_json(&results)
}

/// Similar command implementation
async fn cmd_similar_impl(path: PathBuf, symbol: String, threshold: f32) -> AnyhowResult<()> {
    let (index, _) = open_project(&path).await?;

    let mut output = Vec::new();
    for anchor in named_symbols(&index, &symbol).await? {
        let mut similar = Vec::new();
        for (id, score) in index.get_similar(&anchor.id, threshold).await? {
            if let Some(other) = index.symbol(&id).await {
                let mut entry = symbol_json(&other);
                entry["similarity"] = json!(score);
                similar.push(entry);
            }
        }
        let mut entry = symbol_json(&anchor);
        entry["similar"] = Value::Array(similar);
        output.push(entry);
    }
    print_json(&output)
}

/// Patterns command implementation
async fn cmd_patterns_impl(path: PathBuf, symbol: String) -> AnyhowResult<()> {
    let (index, _) = open_project(&path).await?;

    let mut output = Vec::new();
    for anchor in named_symbols(&index, &symbol).await? {
        let matches = index.get_patterns(&anchor.id).await?;
        let mut entry = symbol_json(&anchor);
        entry["patterns"] = serde_json::to_value(&matches).context("Failed to serialize patterns")?;
        output.push(entry);
    }
    print_json(&output)
}

/// Main entry point for the CLI
pub async fn main() -> AnyhowResult<()> {
    let cli = Cli::parse();
    cli.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path();
        fs::create_dir_all(root.join("src")).expect("mkdir");
        fs::create_dir_all(root.join("target/debug")).expect("mkdir");
        fs::create_dir_all(root.join(".cache")).expect("mkdir");
        fs::write(root.join("src/app.py"), "def main():\n    return run()\n\ndef run():\n    return 0\n").expect("write");
        fs::write(root.join("src/lib.rs"), "pub fn run() -> i32 {\n    0\n}\n").expect("write");
        fs::write(root.join("README.md"), "# readme\n").expect("write");
        fs::write(root.join("target/debug/gen.rs"), "fn generated() {}\n").expect("write");
        fs::write(root.join(".cache/tmp.py"), "x = 1\n").expect("write");
        dir
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["leindex", "index", "/path/to/project"]).unwrap();
        assert!(matches!(cli.command, Commands::Index { .. }));
    }

    #[test]
    fn test_query_command() {
        let cli = Cli::try_parse_from([
            "leindex", "query", ".", "parse config", "--filter", "language=python", "-f", "author=ada", "--top-k", "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Query {
                query, filters, top_k, patterns, ..
            } => {
                assert_eq!(query, "parse config");
                assert_eq!(filters, vec!["language=python", "author=ada"]);
                assert_eq!(top_k, Some(3));
                assert!(!patterns);
            }
            _ => panic!("Expected Query command"),
        }
    }

    #[test]
    fn test_similar_default_threshold() {
        let cli = Cli::try_parse_from(["leindex", "similar", ".", "run"]).unwrap();
        match cli.command {
            Commands::Similar { threshold, .. } => assert_eq!(threshold, DEFAULT_SIMILARITY_THRESHOLD),
            _ => panic!("Expected Similar command"),
        }
    }

    #[test]
    fn test_scan_skips_excluded_and_unsupported_files() {
        let dir = project();
        let scan = scan_project(dir.path(), &IndexerConfig::default()).expect("scan");
        let paths: Vec<&str> = scan.changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["src/app.py", "src/lib.rs"]);
        assert!(scan.changes.iter().all(|c| c.modified_at.is_some()));
        assert_eq!(scan.skipped, 0);
    }

    #[tokio::test]
    async fn test_open_project_indexes_supported_files() {
        let dir = project();
        let (index, summary) = open_project(dir.path()).await.expect("open");
        assert_eq!(
            summary,
            IndexSummary {
                files_found: 2,
                indexed: 2,
                failed: 0,
                skipped: 0,
            }
        );
        let runs = named_symbols(&index, "run").await.expect("run");
        let paths: Vec<&str> = runs.iter().map(|s| s.unit.path.as_str()).collect();
        assert_eq!(paths, vec!["src/app.py", "src/lib.rs"]);
        assert!(named_symbols(&index, "absent").await.is_err());
    }

    #[tokio::test]
    async fn test_open_project_rejects_invalid_config() {
        let dir = project();
        fs::create_dir_all(dir.path().join(".leindex")).expect("mkdir");
        fs::write(dir.path().join(".leindex/config.toml"), "[cache]\ncapacity = 0\n").expect("write");
        let err = open_project(dir.path()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("capacity"), "{:#}", err);
    }
}
