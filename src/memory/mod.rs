//! Memory module - embedding generation, caching, and retrieval
//!
//! Embeds documents through a remote `/embeddings` endpoint, keeps them in a
//! brute-force in-memory vector store and caches query embeddings (moka).
//! [`KnowledgeIndex`] wraps the pipeline with a build-once lifecycle over a
//! directory of text files.

pub mod cache;
pub mod embedding;
pub mod index;
pub mod retrieval;
pub mod vector_store;

pub use cache::EmbeddingCache;
pub use embedding::{Embedder, RemoteEmbedder};
pub use index::{IndexState, KnowledgeIndex};
pub use retrieval::{format_context, EmbeddingRetriever};
pub use vector_store::{cosine_similarity, RetrievalResult, VectorStore, VectorStoreItem};
