// Query Filters
//
// *Le Filtre* (The Filter) - Validated, conjunctive predicates over symbol
// metadata and query-time pattern matches

use crate::vector::RecordMetadata;
use chrono::{DateTime, NaiveDate, Utc};
use globset::{Glob, GlobMatcher};
use lemotif::{PatternId, PatternMatch};
use leparse::grammar::LanguageId;
use leparse::symbol::SymbolKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Filter type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    /// Source language
    Language,
    /// Path must match a glob
    PathInclude,
    /// Path must not match a glob
    PathExclude,
    /// File author
    Author,
    /// Symbol kind
    Kind,
    /// Modification time window
    DateRange,
    /// Path prefix directory
    Directory,
    /// Symbol participates in a design pattern
    PatternType,
    /// Minimum pattern confidence
    MinConfidence,
}

impl FilterType {
    /// Canonical key
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterType::Language => "language",
            FilterType::PathInclude => "path_include",
            FilterType::PathExclude => "path_exclude",
            FilterType::Author => "author",
            FilterType::Kind => "kind",
            FilterType::DateRange => "date_range",
            FilterType::Directory => "directory",
            FilterType::PatternType => "pattern_type",
            FilterType::MinConfidence => "min_confidence",
        }
    }

    /// Resolve a filter key, accepting common aliases
    pub fn from_key(key: &str) -> Result<Self, FilterValidationError> {
        match key.trim().to_lowercase().replace('-', "_").as_str() {
            "language" | "lang" => Ok(FilterType::Language),
            "path" | "path_include" | "include" | "glob" => Ok(FilterType::PathInclude),
            "path_exclude" | "exclude" | "not_path" => Ok(FilterType::PathExclude),
            "author" => Ok(FilterType::Author),
            "kind" | "symbol_kind" | "symbol_type" => Ok(FilterType::Kind),
            "date_range" | "date" | "modified" => Ok(FilterType::DateRange),
            "directory" | "dir" => Ok(FilterType::Directory),
            "pattern_type" | "pattern" => Ok(FilterType::PatternType),
            "min_confidence" | "confidence" => Ok(FilterType::MinConfidence),
            _ => Err(FilterValidationError::UnknownType(key.to_string())),
        }
    }

    /// Evaluated against pattern matches rather than stored metadata
    pub fn is_pattern_filter(&self) -> bool {
        matches!(self, FilterType::PatternType | FilterType::MinConfidence)
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One filter predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Filter {
    /// Source language equals
    Language(LanguageId),
    /// Path matches glob
    PathInclude(String),
    /// Path does not match glob
    PathExclude(String),
    /// Author equals (case-insensitive)
    Author(String),
    /// Symbol kind equals
    Kind(SymbolKind),
    /// Modified within the inclusive window; open ends are unbounded
    DateRange {
        /// Lower bound
        from: Option<DateTime<Utc>>,
        /// Upper bound
        to: Option<DateTime<Utc>>,
    },
    /// Path lies under directory
    Directory(String),
    /// Symbol matches the pattern
    PatternType(PatternId),
    /// Pattern confidence at least
    MinConfidence(f32),
}

/// Rejected filter
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterValidationError {
    /// Key names no filter type
    #[error("unknown filter type '{0}'")]
    UnknownType(String),

    /// Value is blank
    #[error("empty value for filter '{0}'")]
    EmptyValue(FilterType),

    /// Value cannot be parsed for the filter type
    #[error("invalid value '{value}' for filter '{filter}': {reason}")]
    InvalidValue {
        /// Filter type
        filter: FilterType,
        /// Raw value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// Glob does not compile
    #[error("invalid glob '{pattern}': {reason}")]
    InvalidGlob {
        /// Glob text
        pattern: String,
        /// Compiler message
        reason: String,
    },

    /// Confidence outside [0, 1]
    #[error("min_confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f32),

    /// Date range ends before it starts
    #[error("date range ends ({to}) before it starts ({from})")]
    InvertedDateRange {
        /// Lower bound
        from: DateTime<Utc>,
        /// Upper bound
        to: DateTime<Utc>,
    },
}

impl FilterValidationError {
    /// Short machine-readable reason tag
    pub fn reason(&self) -> &'static str {
        match self {
            FilterValidationError::UnknownType(_) => "unknown_type",
            FilterValidationError::EmptyValue(_) => "empty_value",
            FilterValidationError::InvalidValue { .. } => "invalid_value",
            FilterValidationError::InvalidGlob { .. } => "invalid_glob",
            FilterValidationError::ConfidenceOutOfRange(_) => "confidence_out_of_range",
            FilterValidationError::InvertedDateRange { .. } => "inverted_date_range",
        }
    }
}

impl Filter {
    /// Type tag
    pub fn filter_type(&self) -> FilterType {
        match self {
            Filter::Language(_) => FilterType::Language,
            Filter::PathInclude(_) => FilterType::PathInclude,
            Filter::PathExclude(_) => FilterType::PathExclude,
            Filter::Author(_) => FilterType::Author,
            Filter::Kind(_) => FilterType::Kind,
            Filter::DateRange { .. } => FilterType::DateRange,
            Filter::Directory(_) => FilterType::Directory,
            Filter::PatternType(_) => FilterType::PatternType,
            Filter::MinConfidence(_) => FilterType::MinConfidence,
        }
    }

    /// Parse a `key=value` pair.
    ///
    /// Date ranges are written `from..to` with either side optional; bounds
    /// are RFC 3339 timestamps or `YYYY-MM-DD` dates (a bare upper date
    /// includes the whole day).
    pub fn parse(key: &str, value: &str) -> Result<Self, FilterValidationError> {
        let filter_type = FilterType::from_key(key)?;
        let value = value.trim();
        if value.is_empty() {
            return Err(FilterValidationError::EmptyValue(filter_type));
        }
        let invalid = |reason: String| FilterValidationError::InvalidValue {
            filter: filter_type,
            value: value.to_string(),
            reason,
        };
        let filter = match filter_type {
            FilterType::Language => Filter::Language(LanguageId::from_str(value).map_err(|e| invalid(e.to_string()))?),
            FilterType::PathInclude => Filter::PathInclude(value.to_string()),
            FilterType::PathExclude => Filter::PathExclude(value.to_string()),
            FilterType::Author => Filter::Author(value.to_string()),
            FilterType::Kind => Filter::Kind(SymbolKind::from_str(value).map_err(invalid)?),
            FilterType::DateRange => {
                let (from, to) = value
                    .split_once("..")
                    .ok_or_else(|| invalid("expected 'from..to'".to_string()))?;
                Filter::DateRange {
                    from: parse_bound(from, false).map_err(&invalid)?,
                    to: parse_bound(to, true).map_err(&invalid)?,
                }
            }
            FilterType::Directory => Filter::Directory(value.to_string()),
            FilterType::PatternType => Filter::PatternType(PatternId::from_str(value).map_err(|e| invalid(e.to_string()))?),
            FilterType::MinConfidence => {
                Filter::MinConfidence(value.parse::<f32>().map_err(|e| invalid(e.to_string()))?)
            }
        };
        filter.validate()?;
        Ok(filter)
    }

    /// Check the value independently of how the filter was built
    pub fn validate(&self) -> Result<(), FilterValidationError> {
        match self {
            Filter::PathInclude(pattern) | Filter::PathExclude(pattern) => {
                compile_glob(pattern)?;
            }
            Filter::Author(value) | Filter::Directory(value) if value.trim().is_empty() => {
                return Err(FilterValidationError::EmptyValue(self.filter_type()));
            }
            Filter::DateRange {
                from: Some(from),
                to: Some(to),
            } if to < from => {
                return Err(FilterValidationError::InvertedDateRange { from: *from, to: *to });
            }
            Filter::MinConfidence(value) if !value.is_finite() || !(0.0..=1.0).contains(value) => {
                return Err(FilterValidationError::ConfidenceOutOfRange(*value));
            }
            _ => {}
        }
        Ok(())
    }
}

fn parse_bound(text: &str, upper: bool) -> Result<Option<DateTime<Utc>>, String> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|e| format!("bad date '{}': {}", text, e))?;
    let time = if upper {
        date.and_hms_milli_opt(23, 59, 59, 999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| Some(t.and_utc()))
        .ok_or_else(|| format!("bad date '{}'", text))
}

fn compile_glob(pattern: &str) -> Result<GlobMatcher, FilterValidationError> {
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| FilterValidationError::InvalidGlob {
            pattern: pattern.to_string(),
            reason: e.kind().to_string(),
        })
}

fn normalize_dir(dir: &str) -> String {
    dir.trim().trim_start_matches("./").trim_end_matches('/').to_string()
}

/// Validated conjunction of filters
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: Vec<Filter>,
    matchers: Vec<Option<GlobMatcher>>,
}

impl FilterSet {
    /// Validate and compile; fails on the first invalid filter
    pub fn new(filters: Vec<Filter>) -> Result<Self, FilterValidationError> {
        let mut matchers = Vec::with_capacity(filters.len());
        for filter in &filters {
            filter.validate()?;
            matchers.push(match filter {
                Filter::PathInclude(p) | Filter::PathExclude(p) => Some(compile_glob(p)?),
                _ => None,
            });
        }
        Ok(Self { filters, matchers })
    }

    /// Explicit filters plus inferred ones whose type is not given explicitly
    pub fn with_inferred(explicit: Vec<Filter>, inferred: &[Filter]) -> Result<Self, FilterValidationError> {
        let mut filters = explicit;
        let given: Vec<FilterType> = filters.iter().map(Filter::filter_type).collect();
        for filter in inferred {
            if !given.contains(&filter.filter_type()) && !filters.contains(filter) {
                filters.push(filter.clone());
            }
        }
        Self::new(filters)
    }

    /// Filters in the set
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// No filters at all
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Whether any metadata predicate is present
    pub fn has_metadata_filters(&self) -> bool {
        self.filters.iter().any(|f| !f.filter_type().is_pattern_filter())
    }

    /// Whether any pattern predicate is present
    pub fn has_pattern_filters(&self) -> bool {
        self.filters.iter().any(|f| f.filter_type().is_pattern_filter())
    }

    /// Every metadata predicate holds; pattern predicates are ignored here
    pub fn matches_metadata(&self, metadata: &RecordMetadata) -> bool {
        self.filters.iter().zip(&self.matchers).all(|(filter, matcher)| match filter {
            Filter::Language(language) => metadata.language == *language,
            Filter::PathInclude(_) => matcher.as_ref().map(|m| m.is_match(&metadata.path)).unwrap_or(false),
            Filter::PathExclude(_) => !matcher.as_ref().map(|m| m.is_match(&metadata.path)).unwrap_or(false),
            Filter::Author(author) => metadata
                .author
                .as_deref()
                .map(|a| a.eq_ignore_ascii_case(author.trim()))
                .unwrap_or(false),
            Filter::Kind(kind) => metadata.kind == *kind,
            Filter::DateRange { from, to } => {
                from.map(|f| metadata.modified_at >= f).unwrap_or(true)
                    && to.map(|t| metadata.modified_at <= t).unwrap_or(true)
            }
            Filter::Directory(dir) => {
                let dir = normalize_dir(dir);
                let path = metadata.path.trim_start_matches("./");
                dir.is_empty() || path == dir || path.starts_with(&format!("{}/", dir))
            }
            Filter::PatternType(_) | Filter::MinConfidence(_) => true,
        })
    }

    /// Every pattern predicate holds for the symbol's matches.
    ///
    /// Each requested pattern must be matched at no less than the strictest
    /// minimum confidence; a minimum alone requires some match reaching it.
    pub fn matches_patterns(&self, matches: &[PatternMatch]) -> bool {
        let min_confidence = self
            .filters
            .iter()
            .filter_map(|f| match f {
                Filter::MinConfidence(c) => Some(*c),
                _ => None,
            })
            .fold(None, |acc: Option<f32>, c| Some(acc.map_or(c, |a| a.max(c))));
        let threshold = min_confidence.unwrap_or(0.0);

        let mut wanted = self
            .filters
            .iter()
            .filter_map(|f| match f {
                Filter::PatternType(p) => Some(*p),
                _ => None,
            })
            .peekable();

        if wanted.peek().is_none() {
            return min_confidence.is_none() || matches.iter().any(|m| m.confidence >= threshold);
        }
        wanted.all(|pattern| matches.iter().any(|m| m.pattern == pattern && m.confidence >= threshold))
    }
}
