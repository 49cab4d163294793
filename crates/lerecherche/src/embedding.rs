// Embedding provider seam
//
// *L'Empreinte* (The Imprint) - Text-to-vector providers and the local hashing embedder

use async_trait::async_trait;
use thiserror::Error;

/// Default dimension of the hashing embedder
pub const DEFAULT_DIMENSION: usize = 256;

/// Embedding provider errors
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    /// Provider call failed
    #[error("embedding provider failed: {0}")]
    Provider(String),

    /// Provider returned a vector of the wrong size
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Provider's declared dimension
        expected: usize,
        /// Returned dimension
        got: usize,
    },

    /// Provider returned a different number of vectors than texts
    #[error("embedding count mismatch: sent {sent}, received {received}")]
    CountMismatch {
        /// Texts sent
        sent: usize,
        /// Vectors received
        received: usize,
    },
}

/// Text/code to vector provider.
///
/// Implementations must return one vector per input text, in order, each of
/// `dimension()` components.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Vector dimensionality
    fn dimension(&self) -> usize;

    /// Model identifier
    fn model_name(&self) -> &str;
}

/// Check a provider response against the request
pub fn check_batch(sent: usize, dimension: usize, vectors: &[Vec<f32>]) -> Result<(), EmbeddingError> {
    if vectors.len() != sent {
        return Err(EmbeddingError::CountMismatch {
            sent,
            received: vectors.len(),
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimension,
            got: bad.len(),
        });
    }
    Ok(())
}

/// Deterministic local embedder.
///
/// Feature-hashes identifier sub-tokens (`parseConfig` and `parse_config`
/// both yield `parse`, `config`) and character trigrams into a fixed number
/// of buckets, then L2-normalizes.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    /// Create an embedder with `dimension` buckets (minimum 8)
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
        }
    }

    /// Embed one text synchronously
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in sub_tokens(text) {
            self.add_feature(&mut vector, token.as_bytes(), 1.0);
            let chars: Vec<char> = token.chars().collect();
            if chars.len() > 3 {
                for window in chars.windows(3) {
                    let gram: String = window.iter().collect();
                    self.add_feature(&mut vector, gram.as_bytes(), 0.25);
                }
            }
        }
        normalize(&mut vector);
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let digest = blake3::hash(feature);
        let bytes = digest.as_bytes();
        let bucket = u64::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]]);
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[(bucket % self.dimension as u64) as usize] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "hashing-subtoken-v1"
    }
}

/// Lowercased identifier sub-tokens: splits on non-alphanumerics, `_` and camelCase humps
pub fn sub_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let mut current = String::new();
        let mut previous_lower = false;
        for c in word.chars() {
            if c.is_uppercase() && previous_lower && !current.is_empty() {
                tokens.push(current.to_lowercase());
                current.clear();
            }
            previous_lower = c.is_lowercase() || c.is_ascii_digit();
            current.push(c);
        }
        if !current.is_empty() {
            tokens.push(current.to_lowercase());
        }
    }
    tokens
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::cosine_similarity;
    use rstest::rstest;

    #[rstest]
    #[case("parseConfig", vec!["parse", "config"])]
    #[case("parse_config", vec!["parse", "config"])]
    #[case("HTTPServer run", vec!["httpserver", "run"])]
    #[case("get2Items", vec!["get2", "items"])]
    fn test_sub_tokens(#[case] input: &str, #[case] expected: Vec<&str>) {
        assert_eq!(sub_tokens(input), expected);
    }

    #[test]
    fn test_embedding_is_normalized_and_deterministic() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed_text("def parse_config(path): pass");
        let b = embedder.embed_text("def parse_config(path): pass");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_shared_tokens_are_closer() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed_text("parse config");
        let near = embedder.embed_text("fn parseConfig(path: &str) -> Config");
        let far = embedder.embed_text("fn render_widget(canvas: &mut Canvas)");
        assert!(cosine_similarity(&query, &near) > cosine_similarity(&query, &far));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(16);
        assert!(embedder.embed_text("  ").iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_provider_batch() {
        let embedder = HashingEmbedder::new(32);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let vectors = embedder.embed_batch(&texts).await.expect("embed");
        assert!(check_batch(texts.len(), embedder.dimension(), &vectors).is_ok());
        assert!(check_batch(3, embedder.dimension(), &vectors).is_err());
    }
}
