//! Embeddings for the semantic duplicate stage.
//!
//! The default embedder hashes character trigrams and word unigrams of the
//! comparison key into a fixed-size vector. It needs no model download and
//! is deterministic, which keeps duplicate detection reproducible. Any other
//! embedder can be plugged in through [`EmbeddingService`].

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use crate::services::normalizer::tokenize;
use crate::utils::math::vector_normalize;
use crate::OpinaError;

/// Produces dense text embeddings.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Generate embeddings for multiple texts, one per input.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, OpinaError>;

    /// Embedding dimensions.
    fn dimensions(&self) -> usize;
}

/// Feature-hashing embedder over character trigrams and words.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(8),
        }
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let mut hasher = DefaultHasher::new();
        feature.hash(&mut hasher);
        let hash = hasher.finish();
        let index = (hash % self.dimensions as u64) as usize;
        // Sign bit halves collision bias
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in tokenize(text) {
            let (i, sign) = self.bucket(word);
            vector[i] += 2.0 * sign;

            let padded: Vec<char> = format!(" {} ", word).chars().collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                let (i, sign) = self.bucket(&gram);
                vector[i] += sign;
            }
        }
        vector_normalize(&vector)
    }
}

#[async_trait]
impl EmbeddingService for HashingEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, OpinaError> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Memoizes another embedder by text.
pub struct CachedEmbedder {
    inner: Arc<dyn EmbeddingService>,
    cache: Cache<String, Arc<Vec<f32>>>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingService>, capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self { inner, cache }
    }
}

#[async_trait]
impl EmbeddingService for CachedEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, OpinaError> {
        let mut out: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut missing = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            match self.cache.get(text).await {
                Some(hit) => out.push(Some(hit.as_ref().clone())),
                None => {
                    out.push(None);
                    missing.push(i);
                }
            }
        }

        if !missing.is_empty() {
            let to_embed: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
            let fresh = self.inner.embed_batch(&to_embed).await?;
            if fresh.len() != to_embed.len() {
                return Err(OpinaError::Internal(format!(
                    "Embedder returned {} vectors for {} texts",
                    fresh.len(),
                    to_embed.len()
                )));
            }
            for (i, vector) in missing.into_iter().zip(fresh) {
                self.cache
                    .insert(texts[i].clone(), Arc::new(vector.clone()))
                    .await;
                out[i] = Some(vector);
            }
        }

        Ok(out.into_iter().flatten().collect())
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::math::cosine_similarity;

    #[test]
    fn test_hashing_embedder_is_deterministic_and_unit() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("atencion rapida amable");
        let b = embedder.embed("atencion rapida amable");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_related_texts_are_closer_than_unrelated() {
        let embedder = HashingEmbedder::default();
        let base = embedder.embed("atencion muy rapida");
        let close = embedder.embed("atencion rapidisima");
        let far = embedder.embed("precio elevado");
        assert!(cosine_similarity(&base, &close) > cosine_similarity(&base, &far));
    }

    #[test]
    fn test_empty_text_embeds_to_zero_vector() {
        let embedder = HashingEmbedder::new(16);
        assert!(embedder.embed("").iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_cached_embedder_matches_inner() {
        let inner = Arc::new(HashingEmbedder::default());
        let cached = CachedEmbedder::new(inner.clone(), 100, Duration::from_secs(60));
        let texts = vec!["hola".to_string(), "chau".to_string(), "hola".to_string()];

        let first = cached.embed_batch(&texts).await.expect("embed");
        let second = cached.embed_batch(&texts).await.expect("embed");
        assert_eq!(first, second);
        assert_eq!(first[0], inner.embed("hola"));
        assert_eq!(first.len(), 3);
    }
}
