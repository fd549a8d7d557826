//! In-process cache for query embeddings
//!
//! Uses moka async cache (Send + Sync, TTL-based eviction).

use moka::future::Cache;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

/// Cache key helper: hash a string to u64
fn hash_key(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

/// Embedding cache: hash(text) -> Vec<f32>
#[derive(Clone)]
pub struct EmbeddingCache {
    embeddings: Cache<u64, Vec<f32>>,
}

impl EmbeddingCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        EmbeddingCache {
            embeddings: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Get a cached embedding
    pub async fn get(&self, text: &str) -> Option<Vec<f32>> {
        self.embeddings.get(&hash_key(text)).await
    }

    /// Store an embedding in cache
    pub async fn put(&self, text: &str, embedding: Vec<f32>) {
        self.embeddings.insert(hash_key(text), embedding).await;
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        // 30 min TTL
        Self::new(1000, Duration::from_secs(30 * 60))
    }
}
