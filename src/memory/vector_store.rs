//! Brute-force in-memory vector store with cosine top-K search

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One stored document and its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorStoreItem {
    pub embedding: Vec<f32>,
    pub document: String,
}

impl VectorStoreItem {
    pub fn new(embedding: Vec<f32>, document: impl Into<String>) -> Self {
        VectorStoreItem {
            embedding,
            document: document.into(),
        }
    }
}

/// A document matched by a search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub document: String,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
}

/// Cosine similarity of two equal-length vectors; 0 when either has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Append-only store; every embedding shares the dimensionality of the first
#[derive(Debug, Clone, Default)]
pub struct VectorStore {
    items: Vec<VectorStoreItem>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dimensionality fixed by the first item, if any
    pub fn dimensions(&self) -> Option<usize> {
        self.items.first().map(|item| item.embedding.len())
    }

    /// Add an item; rejects embeddings whose length differs from the store's
    pub fn add_item(&mut self, item: VectorStoreItem) -> Result<()> {
        if let Some(expected) = self.dimensions() {
            if item.embedding.len() != expected {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: item.embedding.len(),
                });
            }
        }
        self.items.push(item);
        Ok(())
    }

    /// The `min(top_k, len)` most similar documents, best first.
    ///
    /// Equal scores keep insertion order.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<RetrievalResult>> {
        let Some(expected) = self.dimensions() else {
            return Ok(Vec::new());
        };
        if query.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: query.len(),
            });
        }

        let mut scored = self
            .items
            .iter()
            .map(|item| {
                Ok(RetrievalResult {
                    document: item.document.clone(),
                    score: cosine_similarity(&item.embedding, query)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // sort_by is stable
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[VectorStoreItem] {
        &self.items
    }
}
