//! Embeddings, chunking and Qdrant-backed retrieval with a distance cutoff
//!.

pub mod chunker;
pub mod embeddings;
pub mod retriever;
pub mod vector_store;

pub use chunker::{Chunk, Chunker};
pub use embeddings::{Embedder, EmbeddingConfig, HashEmbedder};
pub use retriever::{format_context, KnowledgeRetriever};
pub use vector_store::{agent_collection, ScoredPoint, VectorStore, GLOBAL_COLLECTION};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("embedding model error: {0}")]
    Model(String),

    #[error("vector store error: {0}")]
    Store(String),
}

impl From<RagError> for voice_agent_core::Error {
    fn from(err: RagError) -> Self {
        voice_agent_core::Error::TransientExternal(err.to_string())
    }
}
