//! Local feature-hashing embedder.
//!
//! Maps lowercase word unigrams and bigrams into a fixed number of signed
//! buckets and L2-normalizes the result. No network, fully deterministic.
//! Useful for offline runs and tests; it captures lexical overlap only.

use crate::embed::Embedder;
use crate::error::EmbedError;

const DEFAULT_DIM: usize = 256;
const BIGRAM_WEIGHT: f32 = 0.5;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

pub struct HashEmbedder {
    dim: usize,
    version: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        let dim = if dim == 0 { DEFAULT_DIM } else { dim };
        Self {
            dim,
            version: format!("hash-fnv1a/{dim}"),
        }
    }

    fn vectorize(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(EmbedError::EmptyInput);
        }

        let mut v = vec![0.0f32; self.dim];
        for t in &tokens {
            self.accumulate(&mut v, t.as_bytes(), 1.0);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&mut v, bigram.as_bytes(), BIGRAM_WEIGHT);
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }

    fn accumulate(&self, v: &mut [f32], feature: &[u8], weight: f32) {
        let h = fnv1a(feature);
        let bucket = (h % self.dim as u64) as usize;
        // Top bit picks the sign so collisions tend to cancel out.
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign * weight;
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIM)
    }
}

#[async_trait::async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.vectorize(text)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        texts.iter().map(|t| self.vectorize(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn model_version(&self) -> &str {
        &self.version
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

fn fnv1a(data: &[u8]) -> u64 {
    let mut h = FNV_OFFSET;
    for b in data {
        h ^= *b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_deterministic_and_normalized() {
        let e = HashEmbedder::new(64);
        let a = e.embed("Insider trading is prohibited").await.unwrap();
        let b = e.embed("insider   TRADING is prohibited!").await.unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        assert!((dot(&a, &a) - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_overlap_scores_higher() {
        let e = HashEmbedder::default();
        let rule = e.embed("trading on material non-public information").await.unwrap();
        let close = e.embed("we are trading on non-public information").await.unwrap();
        let far = e.embed("lunch is served at noon").await.unwrap();
        assert!(dot(&rule, &close) > dot(&rule, &far));
    }

    #[tokio::test]
    async fn test_empty_text() {
        let e = HashEmbedder::default();
        assert!(matches!(e.embed(" ,. ").await, Err(EmbedError::EmptyInput)));
    }

    #[test]
    fn test_version_tracks_dimension() {
        assert_eq!(HashEmbedder::new(0).model_version(), "hash-fnv1a/256");
        assert_eq!(HashEmbedder::new(32).model_version(), "hash-fnv1a/32");
    }
}
