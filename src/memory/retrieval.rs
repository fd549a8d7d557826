//! Embedding retrieval orchestrator
//!
//! Ties together embedding generation, the query cache and the in-memory
//! vector store.

use std::sync::Arc;
use tracing::{debug, info};

use super::cache::EmbeddingCache;
use super::embedding::Embedder;
use super::vector_store::{RetrievalResult, VectorStore, VectorStoreItem};
use crate::error::Result;

/// Embeds documents into a store and answers similarity queries against it
pub struct EmbeddingRetriever {
    embedder: Arc<dyn Embedder>,
    store: VectorStore,
    cache: EmbeddingCache,
}

impl EmbeddingRetriever {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_cache(embedder, EmbeddingCache::default())
    }

    pub fn with_cache(embedder: Arc<dyn Embedder>, cache: EmbeddingCache) -> Self {
        EmbeddingRetriever {
            embedder,
            store: VectorStore::new(),
            cache,
        }
    }

    /// Embed a query, using the cache
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.cache.get(query).await {
            debug!("Query embedding cache hit");
            return Ok(cached);
        }

        let embedding = self.embedder.embed(query).await?;
        self.cache.put(query, embedding.clone()).await;
        Ok(embedding)
    }

    /// Embed a document and add it to the store
    pub async fn embed_document(&mut self, document: &str) -> Result<Vec<f32>> {
        let embedding = self.embedder.embed(document).await?;
        self.store
            .add_item(VectorStoreItem::new(embedding.clone(), document))?;
        Ok(embedding)
    }

    /// The `top_k` stored documents most similar to `query`
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalResult>> {
        if self.store.is_empty() {
            return Ok(Vec::new());
        }
        let embedding = self.embed_query(query).await?;
        let results = self.store.search(&embedding, top_k)?;
        info!("Retrieved {} of {} documents", results.len(), self.store.len());
        Ok(results)
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Drop every stored document; cached query embeddings stay valid
    pub fn clear(&mut self) {
        self.store = VectorStore::new();
    }
}

/// Format retrieved documents into a context string for injection as a user turn
pub fn format_context(results: &[RetrievalResult]) -> String {
    if results.is_empty() {
        return String::new();
    }

    let mut output = String::from("## Relevant Context\n\n");
    for (i, result) in results.iter().enumerate() {
        if i > 0 {
            output.push_str("\n\n---\n\n");
        }
        output.push_str(result.document.trim());
    }
    output
}
