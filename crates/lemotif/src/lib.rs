// lemotif - Structural Pattern Detection
//
// *Le Motif* (The Pattern) - Design-pattern templates and clone similarity
// over normalized, cross-language shape trees

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

/// Pattern identifiers, weighted templates and subjects.
pub mod catalog;

/// Catalog scoring over classes and functions.
pub mod detector;

/// Identifier-independent structural similarity.
pub mod similarity;

pub use catalog::{PatternError, PatternId, PatternMatch, PatternSubject, Template, CATALOG};
pub use detector::{base_names, subjects, PatternDetector, DEFAULT_MIN_CONFIDENCE};
pub use similarity::{edit_distance, find_similar, shape_similarity, similarity_at_least};
