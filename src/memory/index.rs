//! Knowledge index built once from a directory of text files

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::embedding::Embedder;
use super::retrieval::{format_context, EmbeddingRetriever};
use super::vector_store::RetrievalResult;
use crate::error::{Error, Result};

/// Lifecycle of a [`KnowledgeIndex`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Empty,
    Building,
    Ready,
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexState::Empty => write!(f, "empty"),
            IndexState::Building => write!(f, "building"),
            IndexState::Ready => write!(f, "ready"),
        }
    }
}

/// Documents from one directory, embedded once and searched many times
pub struct KnowledgeIndex {
    retriever: EmbeddingRetriever,
    state: IndexState,
    /// Files that were embedded, in embedding order
    sources: Vec<PathBuf>,
}

impl KnowledgeIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        KnowledgeIndex {
            retriever: EmbeddingRetriever::new(embedder),
            state: IndexState::Empty,
            sources: Vec::new(),
        }
    }

    /// Embed every non-empty regular file directly inside `dir`.
    ///
    /// Runs at most once. Files are processed in file-name order. On failure
    /// the index returns to `Empty` with nothing stored.
    pub async fn build_from_dir(&mut self, dir: &Path) -> Result<usize> {
        if self.state != IndexState::Empty {
            return Err(Error::InvalidState(format!(
                "knowledge index is {}, it can only be built once",
                self.state
            )));
        }
        self.state = IndexState::Building;
        info!("Building knowledge index from {}", dir.display());

        match self.load(dir).await {
            Ok(count) => {
                self.state = IndexState::Ready;
                info!("Knowledge index ready with {} documents", count);
                Ok(count)
            }
            Err(e) => {
                warn!("Knowledge index build failed: {}", e);
                self.retriever.clear();
                self.sources.clear();
                self.state = IndexState::Empty;
                Err(e)
            }
        }
    }

    async fn load(&mut self, dir: &Path) -> Result<usize> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        for path in files {
            let bytes = tokio::fs::read(&path).await?;
            let Ok(text) = String::from_utf8(bytes) else {
                warn!("Skipping non-UTF-8 file {}", path.display());
                continue;
            };
            if text.trim().is_empty() {
                debug!("Skipping empty file {}", path.display());
                continue;
            }

            debug!("Embedding {}", path.display());
            self.retriever.embed_document(&text).await?;
            self.sources.push(path);
        }

        Ok(self.sources.len())
    }

    /// Context string for `query`; empty when not ready or nothing matches
    pub async fn context_for(&self, query: &str, top_k: usize) -> Result<String> {
        if self.state != IndexState::Ready {
            return Ok(String::new());
        }
        let results = self.retriever.retrieve(query, top_k).await?;
        Ok(format_context(&results))
    }

    /// Scored matches for `query`
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalResult>> {
        if self.state != IndexState::Ready {
            return Err(Error::InvalidState(format!(
                "knowledge index is {}, build it before searching",
                self.state
            )));
        }
        self.retriever.retrieve(query, top_k).await
    }

    pub fn state(&self) -> IndexState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.retriever.store().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }
}
