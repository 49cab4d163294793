// Parameter Normalization
//
// *Les Paramètres* (The Parameters) - Loosely typed JSON arguments coerced
// into typed requests before they reach the index

use leindexeur::QueryRequest;
use lerecherche::{Filter, FilterType, FilterValidationError};
use leparse::symbol::SymbolId;
use serde_json::{Map, Value};
use thiserror::Error;

/// Similarity threshold used when the caller gives none
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.8;

/// Rejected argument
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    /// Required argument absent or null
    #[error("missing required argument: {0}")]
    Missing(String),

    /// Argument present with an unusable type
    #[error("argument '{key}' must be {expected}, got {found}")]
    InvalidType {
        /// Argument name
        key: String,
        /// Accepted shape
        expected: &'static str,
        /// Received value
        found: String,
    },

    /// Filter rejected by validation
    #[error(transparent)]
    Filter(#[from] FilterValidationError),
}

impl ParamError {
    fn invalid(key: &str, expected: &'static str, found: &Value) -> Self {
        ParamError::InvalidType {
            key: key.to_string(),
            expected,
            found: found.to_string(),
        }
    }
}

/// Parameters of a similarity lookup
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarParams {
    /// Anchor symbol
    pub symbol_id: SymbolId,
    /// Minimum similarity in [0, 1]
    pub threshold: f32,
}

/// First present, non-null argument among `keys`
fn lookup<'a>(args: &'a Value, keys: &[&str]) -> Option<(&'a str, &'a Value)> {
    let object = args.as_object()?;
    keys.iter().find_map(|key| {
        object
            .get_key_value(*key)
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| (key.as_str(), value))
    })
}

/// Flatten a list argument.
///
/// Accepts an array, a JSON-encoded array or object inside a string, a
/// single scalar, or null (empty).
pub fn normalize_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().flat_map(normalize_list).collect(),
        Value::String(text) => match decode_embedded(text) {
            Some(decoded) => normalize_list(&decoded),
            None if text.trim().is_empty() => Vec::new(),
            None => vec![value.clone()],
        },
        other => vec![other.clone()],
    }
}

/// JSON array or object carried inside a string
fn decode_embedded(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if !(trimmed.starts_with('[') || trimmed.starts_with('{')) {
        return None;
    }
    serde_json::from_str::<Value>(trimmed)
        .ok()
        .filter(|v| v.is_array() || v.is_object())
}

/// Scalar rendered as the text a filter parser expects
fn scalar_text(key: &str, value: &Value) -> Result<String, ParamError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(ParamError::invalid(key, "a string or number", other)),
    }
}

/// Required string argument
pub fn string_arg(args: &Value, keys: &[&str]) -> Result<String, ParamError> {
    let name = keys.first().copied().unwrap_or_default();
    match lookup(args, keys) {
        Some((_, Value::String(s))) if !s.trim().is_empty() => Ok(s.clone()),
        Some((_, Value::Number(n))) => Ok(n.to_string()),
        Some((key, other)) => Err(ParamError::invalid(key, "a non-empty string", other)),
        None => Err(ParamError::Missing(name.to_string())),
    }
}

/// Optional unsigned integer; numeric strings are accepted
pub fn usize_arg(args: &Value, keys: &[&str]) -> Result<Option<usize>, ParamError> {
    let Some((key, value)) = lookup(args, keys) else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .map(|n| Some(n as usize))
        .ok_or_else(|| ParamError::invalid(key, "a non-negative integer", value))
}

/// Optional float; numeric strings are accepted
pub fn f32_arg(args: &Value, keys: &[&str]) -> Result<Option<f32>, ParamError> {
    let Some((key, value)) = lookup(args, keys) else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|n| n.is_finite())
        .map(|n| Some(n as f32))
        .ok_or_else(|| ParamError::invalid(key, "a number", value))
}

/// Optional flag; `"true"`, `"false"`, `1` and `0` are accepted
pub fn bool_arg(args: &Value, keys: &[&str]) -> Result<Option<bool>, ParamError> {
    let Some((key, value)) = lookup(args, keys) else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_u64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| ParamError::invalid(key, "a boolean", value))
}

/// Filters from any of the accepted shapes.
///
/// - an object of `key: value` or `key: [values]`
/// - an array of `{"type": .., "value": ..}` objects or `"key=value"` strings
/// - either of the above encoded as a JSON string
pub fn filters_arg(value: &Value) -> Result<Vec<Filter>, ParamError> {
    let mut filters = Vec::new();
    match value {
        Value::Object(map) => push_object(map, &mut filters)?,
        _ => {
            for item in normalize_list(value) {
                match item {
                    Value::Object(map) => push_typed(&map, &mut filters)?,
                    Value::String(pair) => {
                        let (key, raw) = pair
                            .split_once('=')
                            .ok_or_else(|| ParamError::invalid("filters", "'key=value' entries", &Value::String(pair.clone())))?;
                        filters.push(Filter::parse(key, raw)?);
                    }
                    other => return Err(ParamError::invalid("filters", "filter objects or 'key=value' strings", &other)),
                }
            }
        }
    }
    Ok(filters)
}

/// `{"language": "python", "author": ["ada", "bob"]}`
fn push_object(map: &Map<String, Value>, filters: &mut Vec<Filter>) -> Result<(), ParamError> {
    for (key, value) in map {
        push_values(key, value, filters)?;
    }
    Ok(())
}

/// `{"type": "language", "value": "python"}`; other objects are key maps
fn push_typed(map: &Map<String, Value>, filters: &mut Vec<Filter>) -> Result<(), ParamError> {
    match (map.get("type"), map.get("value")) {
        (Some(Value::String(key)), Some(value)) => push_values(key, value, filters),
        _ => push_object(map, filters),
    }
}

/// One filter per value; a key with no value is rejected
fn push_values(key: &str, value: &Value, filters: &mut Vec<Filter>) -> Result<(), ParamError> {
    let items = normalize_list(value);
    if items.is_empty() {
        let filter_type = FilterType::from_key(key)?;
        return Err(FilterValidationError::EmptyValue(filter_type).into());
    }
    for item in items {
        filters.push(Filter::parse(key, &scalar_text(key, &item)?)?);
    }
    Ok(())
}

/// Query request from loose arguments.
///
/// Keys: `query` (or `text`), `filters`, `top_k` (or `limit`),
/// `include_patterns`. Filters are validated here; the query text is
/// checked by the index.
pub fn query_request(args: &Value) -> Result<QueryRequest, ParamError> {
    let text = string_arg(args, &["query", "text"])?;
    let mut request = QueryRequest::new(text);
    if let Some((_, filters)) = lookup(args, &["filters", "filter"]) {
        request.filters = filters_arg(filters)?;
    }
    request.top_k = usize_arg(args, &["top_k", "limit"])?;
    request.include_patterns = bool_arg(args, &["include_patterns", "patterns"])?.unwrap_or(false);
    Ok(request)
}

/// Similarity parameters from loose arguments
pub fn similar_params(args: &Value) -> Result<SimilarParams, ParamError> {
    let symbol_id = SymbolId::from(string_arg(args, &["symbol_id", "symbol"])?);
    let threshold = f32_arg(args, &["threshold", "min_similarity"])?.unwrap_or(DEFAULT_SIMILARITY_THRESHOLD);
    Ok(SimilarParams { symbol_id, threshold })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lemotif::PatternId;
    use leparse::grammar::LanguageId;
    use leparse::symbol::SymbolKind;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!(["a", "b"]), 2)]
    #[case(json!("[\"a\", \"b\"]"), 2)]
    #[case(json!("a"), 1)]
    #[case(json!(3), 1)]
    #[case(json!(null), 0)]
    #[case(json!(""), 0)]
    #[case(json!([["a"], "[\"b\", \"c\"]"]), 3)]
    fn test_normalize_list(#[case] value: Value, #[case] expected: usize) {
        assert_eq!(normalize_list(&value).len(), expected);
    }

    #[test]
    fn test_brackets_in_plain_text_are_kept() {
        assert_eq!(normalize_list(&json!("[draft")), vec![json!("[draft")]);
    }

    #[test]
    fn test_query_request_from_loose_arguments() {
        let args = json!({
            "query": "where is connect called",
            "filters": "{\"language\": \"python\", \"kind\": [\"function\", \"call\"]}",
            "top_k": "5",
            "include_patterns": "true"
        });
        let request = query_request(&args).expect("request");
        assert_eq!(request.text, "where is connect called");
        assert_eq!(request.top_k, Some(5));
        assert!(request.include_patterns);
        assert_eq!(request.filters.len(), 3);
        for filter in [
            Filter::Language(LanguageId::Python),
            Filter::Kind(SymbolKind::Function),
            Filter::Kind(SymbolKind::Call),
        ] {
            assert!(request.filters.contains(&filter), "missing {:?}", filter);
        }
    }

    #[test]
    fn test_filter_shapes_agree() {
        let expected = vec![Filter::Author("ada".to_string()), Filter::MinConfidence(0.5)];
        let typed = json!([{"type": "author", "value": "ada"}, {"type": "min_confidence", "value": 0.5}]);
        let pairs = json!(["author=ada", "min_confidence=0.5"]);
        let encoded = json!("[\"author=ada\", \"min_confidence=0.5\"]");
        assert_eq!(filters_arg(&typed).expect("typed"), expected);
        assert_eq!(filters_arg(&pairs).expect("pairs"), expected);
        assert_eq!(filters_arg(&encoded).expect("encoded"), expected);
        assert_eq!(filters_arg(&json!("pattern=singleton")).expect("single"), vec![Filter::PatternType(PatternId::Singleton)]);
    }

    #[rstest]
    #[case(json!({"query": "x", "filters": {"colour": "red"}}), "unknown_type")]
    #[case(json!({"query": "x", "filters": ["path=src/["]}), "invalid_glob")]
    #[case(json!({"query": "x", "filters": {"min_confidence": "2"}}), "confidence_out_of_range")]
    #[case(json!({"query": "x", "filters": {"language": ""}}), "empty_value")]
    fn test_invalid_filters_are_rejected(#[case] args: Value, #[case] reason: &str) {
        match query_request(&args) {
            Err(ParamError::Filter(err)) => assert_eq!(err.reason(), reason),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_and_mistyped_arguments() {
        assert_eq!(query_request(&json!({})), Err(ParamError::Missing("query".to_string())));
        assert!(matches!(
            query_request(&json!({"text": "x", "top_k": "many"})),
            Err(ParamError::InvalidType { expected: "a non-negative integer", .. })
        ));
        assert!(matches!(
            query_request(&json!({"query": ["x"]})),
            Err(ParamError::InvalidType { .. })
        ));
        assert!(matches!(
            filters_arg(&json!(["language"])),
            Err(ParamError::InvalidType { .. })
        ));
    }

    #[test]
    fn test_similar_params() {
        let params = similar_params(&json!({"symbol": "abc", "threshold": "0.25"})).expect("params");
        assert_eq!(params.symbol_id, SymbolId::from("abc"));
        assert_eq!(params.threshold, 0.25);
        let params = similar_params(&json!({"symbol_id": "abc"})).expect("params");
        assert_eq!(params.threshold, DEFAULT_SIMILARITY_THRESHOLD);
    }
}
