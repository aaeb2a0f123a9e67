//! Embedder: an opaque text -> fixed-dim vector dependency.
//!
//! The real embedding model is out of core scope. `HashEmbedder` is the
//! deterministic content-hash fallback the Perception Adapter falls back to
//! when no embedding provider is configured: MD5 nibbles normalized to
//! [0, 1], right-padded/truncated to the configured dimension.

use async_trait::async_trait;
use md5::{Digest, Md5};

use super::error::Result;

pub const EMBEDDING_DIM: usize = 768;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Deterministic content-hash fallback embedder.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        HashEmbedder { dim: EMBEDDING_DIM }
    }

    pub fn with_dim(dim: usize) -> Self {
        HashEmbedder { dim }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dim);
        let mut counter: u64 = 0;
        while out.len() < self.dim {
            let mut hasher = Md5::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();
            for byte in digest.iter() {
                // Each byte yields two nibbles, normalized to [0, 1].
                out.push((byte >> 4) as f32 / 15.0);
                out.push((byte & 0x0f) as f32 / 15.0);
                if out.len() >= self.dim {
                    break;
                }
            }
            counter += 1;
        }
        out.truncate(self.dim);
        out
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}

/// Cosine similarity between two equal-length vectors; 0.0 if either is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..len {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_and_right_dimension() {
        let embedder = HashEmbedder::new();
        let a = embedder.embed_sync("hello world");
        let b = embedder.embed_sync("hello world");
        assert_eq!(a.len(), EMBEDDING_DIM);
        assert_eq!(a, b);
        assert!(a.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn different_text_different_embedding() {
        let embedder = HashEmbedder::new();
        let a = embedder.embed_sync("alpha");
        let b = embedder.embed_sync("beta");
        assert_ne!(a, b);
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }
}
