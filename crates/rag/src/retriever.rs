//! `retrieve(query, top_k)`: encode the query, search the
//! agent-scoped collection if populated else the global one, filter by
//! distance cutoff, return the closest few.

use async_trait::async_trait;

use voice_agent_config::constants::rag as rag_constants;
use voice_agent_core::{Error as CoreError, RetrievedChunk, Retriever as RetrieverTrait};

use crate::embeddings::Embedder;
use crate::vector_store::{agent_collection, VectorStore, GLOBAL_COLLECTION};
use crate::RagError;

pub struct KnowledgeRetriever {
    embedder: Embedder,
    store: VectorStore,
}

impl KnowledgeRetriever {
    pub fn new(embedder: Embedder, store: VectorStore) -> Self {
        Self { embedder, store }
    }

    /// Cosine distance metric, cutoff `<= 1.3`, first 3 by ascending distance.
    pub async fn retrieve(
        &self,
        agent_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RagError> {
        let embedding = self.embedder.embed(query)?;
        let scoped = agent_collection(agent_id);
        let collection = if self.store.collection_exists(&scoped).await {
            scoped
        } else {
            GLOBAL_COLLECTION.to_string()
        };

        let candidates = self
            .store
            .query(&collection, embedding, (rag_constants::CANDIDATE_MULTIPLIER * top_k) as u64)
            .await?;

        let mut filtered: Vec<_> = candidates
            .into_iter()
            .filter(|c| c.distance <= rag_constants::DISTANCE_CUTOFF)
            .collect();
        filtered.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap());
        filtered.truncate(top_k.min(3));

        Ok(filtered
            .into_iter()
            .map(|c| {
                let (doc_id, chunk_index) = split_chunk_id(&c.id);
                RetrievedChunk {
                    doc_id,
                    chunk_index,
                    text: c.text,
                    distance: c.distance,
                }
            })
            .collect())
    }
}

fn split_chunk_id(id: &str) -> (String, usize) {
    match id.rsplit_once('_') {
        Some((doc, idx)) => (doc.to_string(), idx.parse().unwrap_or(0)),
        None => (id.to_string(), 0),
    }
}

#[async_trait]
impl RetrieverTrait for KnowledgeRetriever {
    async fn retrieve(
        &self,
        agent_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, CoreError> {
        KnowledgeRetriever::retrieve(self, agent_id, query, top_k)
            .await
            .map_err(|e| CoreError::TransientExternal(e.to_string()))
    }
}

/// Join retrieved chunks for the prompt's context block, or a fixed
/// fallback sentence when nothing cleared the cutoff.
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        "No specific context found.".to_string()
    } else {
        chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieval_cutoff_keeps_only_closest_within_bound() {
        // candidates at distances [0.8, 1.1, 1.4, 1.6] -> keep first two.
        let candidates = vec![
            RetrievedChunk { doc_id: "d".into(), chunk_index: 0, text: "a".into(), distance: 0.8 },
            RetrievedChunk { doc_id: "d".into(), chunk_index: 1, text: "b".into(), distance: 1.1 },
            RetrievedChunk { doc_id: "d".into(), chunk_index: 2, text: "c".into(), distance: 1.4 },
            RetrievedChunk { doc_id: "d".into(), chunk_index: 3, text: "d".into(), distance: 1.6 },
        ];
        let kept: Vec<_> = candidates
            .into_iter()
            .filter(|c| c.distance <= rag_constants::DISTANCE_CUTOFF)
            .collect();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].text, "a");
        assert_eq!(kept[1].text, "b");
    }

    #[test]
    fn empty_context_falls_back_to_fixed_sentence() {
        assert_eq!(format_context(&[]), "No specific context found.");
    }

    #[test]
    fn chunk_id_splits_on_last_underscore() {
        assert_eq!(split_chunk_id("faq_doc_3"), ("faq_doc".to_string(), 3));
    }
}
