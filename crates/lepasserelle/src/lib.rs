// lepasserelle - Bridge & Integration
//
// *La Passerelle* (The Bridge) - Loose parameter normalization at the edge of
// the index and the `leindex` command-line interface

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

/// Command-line interface.
pub mod cli;

/// Loosely typed argument normalization.
pub mod params;

pub use cli::{open_project, scan_project, Cli, IndexSummary, ProjectScan};
pub use params::{query_request, similar_params, ParamError, SimilarParams};
