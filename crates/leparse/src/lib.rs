// leparse - Core Parsing Engine
//
// *Le Parse* (The Parsing) - Arena ASTs, cached parses and symbol extraction
// with multi-language support

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

/// Core parsing traits, errors and the language capability seam.
pub mod traits;

/// Lazy-loaded grammar cache for memory-efficient parsing.
pub mod grammar;

/// Arena-backed normalized AST.
pub mod ast;

/// Source unit descriptors (one indexed version of a file).
pub mod source;

/// AST cache keyed by (path, content hash).
pub mod cache;

/// Parser adapter combining grammars, the thread-local parser pool and the cache.
pub mod parser;

/// Capability-indexed language registry.
pub mod languages;

/// Python language support.
pub mod python;

/// JavaScript and TypeScript language support.
pub mod javascript;

/// Go language support.
pub mod go;

/// Rust language support.
pub mod rust;

/// Symbol model.
pub mod symbol;

/// Symbol extraction from parsed trees.
pub mod extract;

/// Normalized, label-carrying shape trees.
pub mod shape;

/// Symbol-set diffing for incremental reindexing.
pub mod diff;

/// Re-exports of commonly used types.
pub mod prelude;

/// Test suite for leparse.
#[cfg(test)]
mod tests;
