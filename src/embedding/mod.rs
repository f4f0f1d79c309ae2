//! C1: Embedding Gateway. A memoized front for whichever embedding
//! provider was selected once at startup.

mod cloud;
mod ollama;

pub use cloud::CloudEmbedder;
pub use ollama::OllamaEmbedder;

use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;

const MEMO_CAPACITY: usize = 10_000;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns `None` on any failure. Callers must never substitute a zero
    /// vector for a missing embedding.
    async fn embed(&self, text: &str) -> Option<Vec<f32>>;

    fn model_name(&self) -> &str;
}

pub struct EmbeddingGateway {
    provider: Arc<dyn EmbeddingProvider>,
    memo: Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbeddingGateway {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            memo: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(MEMO_CAPACITY).unwrap(),
            )),
        }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Returns the cached embedding if present, otherwise calls the
    /// underlying provider and memoizes the result. Failures propagate as
    /// `None` and are never cached, so a transient outage can be retried by
    /// a later call.
    pub async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        if let Some(hit) = self.memo.lock().await.get(text).cloned() {
            return Some(hit);
        }

        let vector = self.provider.embed(text).await?;
        self.memo.lock().await.put(text.to_string(), vector.clone());
        Some(vector)
    }

    pub async fn embed_many(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await);
        }
        out
    }
}

/// Cosine similarity between two vectors. Returns `0.0` for a zero-norm
/// input rather than propagating a division error.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_zero_vector_is_zero() {
        let zero = vec![0.0, 0.0, 0.0];
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&zero, &v), 0.0);
    }

    #[test]
    fn cosine_similarity_mismatched_len_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }
}
