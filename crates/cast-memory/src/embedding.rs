//! Embedding capability and the vector math shared by tiers and scoring.
//!
//! Callers supply an [`Embedder`]; this crate never assumes a model. The
//! bundled [`HashingEmbedder`] is a deterministic bag-of-words projection
//! that needs no network, which makes it the default for offline runs and
//! tests.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Text → vector capability.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// Output dimension, when known up front.
    fn dimensions(&self) -> Option<usize>;

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

pub const DEFAULT_HASHING_DIMENSIONS: usize = 256;

/// Feature-hashing embedder: every lowercase word is hashed into one signed
/// bucket and the result is L2-normalized.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSIONS)
    }
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut idx_bytes = [0u8; 8];
            idx_bytes.copy_from_slice(&digest[..8]);
            let idx = (u64::from_le_bytes(idx_bytes) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }
        normalize(&mut v);
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimensions(&self) -> Option<usize> {
        Some(self.dims)
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale `v` to unit length in place. Zero vectors are left alone.
pub fn normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity; 0.0 when either side has zero length or the
/// dimensions differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let na = l2_norm(a);
    let nb = l2_norm(b);
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    (dot / (na * nb)).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_deterministic_and_unit_length() {
        let e = HashingEmbedder::new(64);
        let a = e.embed_sync("gm farcaster, building onchain");
        let b = e.embed_sync("gm farcaster, building onchain");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!((l2_norm(&a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hashing_ignores_case_and_punctuation() {
        let e = HashingEmbedder::default();
        assert_eq!(e.embed_sync("Hello, World!"), e.embed_sync("hello world"));
    }

    #[test]
    fn shared_words_score_higher_than_disjoint() {
        let e = HashingEmbedder::default();
        let base = e.embed_sync("rust async runtime tokio");
        let near = e.embed_sync("tokio async runtime internals");
        let far = e.embed_sync("sourdough baking hydration");
        assert!(cosine_similarity(&base, &near) > cosine_similarity(&base, &far));
    }

    #[test]
    fn cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn punctuation_only_text_embeds_to_zero() {
        let e = HashingEmbedder::new(8);
        assert!(e.embed_sync("!!! ...").iter().all(|x| *x == 0.0));
    }
}
