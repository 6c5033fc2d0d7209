//! The retrieval boundary.

use async_trait::async_trait;

use crate::error::Error;

/// One retrieved knowledge-base chunk.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub doc_id: String,
    pub chunk_index: usize,
    pub text: String,
    /// Cosine-like distance in `[0, 2]`; smaller is more relevant.
    pub distance: f32,
}

/// Encodes a query and searches an agent-scoped or global vector collection.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(
        &self,
        agent_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, Error>;
}
