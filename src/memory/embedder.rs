//! Text embedders
//!
//! The hashing embedder is deterministic and dependency-free at runtime, which
//! keeps the on-disk index usable offline. The fastembed embedder produces
//! real sentence embeddings when the `fastembed` feature is enabled.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

pub const DEFAULT_DIMENSION: usize = 384;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder returns
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Feature-hashing bag of words and bigrams, L2 normalised
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension: dimension.max(1) }
    }

    fn tokens(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_string())
            .collect()
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut idx_bytes = [0u8; 8];
        idx_bytes.copy_from_slice(&digest[..8]);
        let idx = (u64::from_le_bytes(idx_bytes) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (idx, sign)
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dimension];
        let tokens = Self::tokens(text);

        for token in &tokens {
            let (idx, sign) = self.bucket(token);
            vec[idx] += sign;
        }
        for pair in tokens.windows(2) {
            let (idx, sign) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            vec[idx] += 0.5 * sign;
        }

        normalize(&mut vec);
        vec
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}

pub fn normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vec {
            *x /= norm;
        }
    }
}

#[cfg(feature = "fastembed")]
pub use self::fast::FastEmbedder;

#[cfg(feature = "fastembed")]
mod fast {
    use anyhow::{Context, Result};
    use async_trait::async_trait;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use tokio::sync::Mutex;

    use super::{normalize, Embedder};

    /// AllMiniLML6V2 sentence embeddings (384 dimensions)
    pub struct FastEmbedder {
        model: Mutex<TextEmbedding>,
    }

    impl FastEmbedder {
        pub fn new() -> Result<Self> {
            let model = TextEmbedding::try_new(InitOptions::new(EmbeddingModel::AllMiniLML6V2))
                .context("Failed to initialize embedding model")?;
            Ok(Self { model: Mutex::new(model) })
        }
    }

    #[async_trait]
    impl Embedder for FastEmbedder {
        fn dimension(&self) -> usize {
            384
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut model = self.model.lock().await;
            let mut embeddings = model.embed(vec![text.to_string()], None)?;
            let mut embedding = embeddings.pop().context("No embedding returned")?;
            normalize(&mut embedding);
            Ok(embedding)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::cosine_similarity;

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("Build a weather monitoring system").await.unwrap();
        let b = embedder.embed("build a WEATHER monitoring system").await.unwrap();
        assert_eq!(a.len(), DEFAULT_DIMENSION);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_related_texts_score_higher() {
        let embedder = HashingEmbedder::default();
        let base = embedder.embed("analyze stock prices for apple").await.unwrap();
        let near = embedder.embed("analyze stock prices for microsoft").await.unwrap();
        let far = embedder.embed("write a haiku about autumn leaves").await.unwrap();
        assert!(cosine_similarity(&base, &near) > cosine_similarity(&base, &far));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(16);
        assert!(embedder.embed_sync("   ").iter().all(|x| *x == 0.0));
    }
}
