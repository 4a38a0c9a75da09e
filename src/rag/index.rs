use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// A chunk of a source document as stored in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub content: String,
    /// Source document name the chunk was cut from.
    pub source: String,
}

/// A chunk returned by similarity search, most relevant first.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub content: String,
    pub source: String,
    pub score: f32,
}

/// Abstract contract the RAG chain consumes. Implementations own the
/// embedding of the query text; callers never see vectors.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Top-k chunks most similar to the query, best first.
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, ApiError>;

    /// Total stored chunks. Zero means the index is empty or unbuilt
    /// and retrieval should be treated as unavailable.
    async fn count(&self) -> Result<usize, ApiError>;
}
