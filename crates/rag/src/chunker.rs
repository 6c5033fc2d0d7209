//! Fixed-size, overlapping document chunking.

use serde::{Deserialize, Serialize};

/// A chunk of a knowledge-base document, ready for embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub doc_id: String,
    pub chunk_index: usize,
    pub text: String,
}

impl Chunk {
    /// `{doc_id}_{chunk_index}`, the chunk's stable identity in the vector store.
    pub fn id(&self) -> String {
        format!("{}_{}", self.doc_id, self.chunk_index)
    }
}

/// Splits `text` into fixed-size, overlapping word-count chunks.
#[derive(Debug, Clone)]
pub struct Chunker {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        assert!(overlap < chunk_size, "overlap must be smaller than chunk_size");
        Self { chunk_size, overlap }
    }

    pub fn chunk(&self, doc_id: &str, text: &str) -> Vec<Chunk> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }

        let stride = self.chunk_size - self.overlap;
        let mut chunks = Vec::new();
        let mut chunk_index = 0;
        let mut start = 0;
        while start < words.len() {
            let end = (start + self.chunk_size).min(words.len());
            chunks.push(Chunk {
                doc_id: doc_id.to_string(),
                chunk_index,
                text: words[start..end].join(" "),
            });
            chunk_index += 1;
            if end == words.len() {
                break;
            }
            start += stride;
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_carry_fixed_size_and_overlap() {
        let words: Vec<String> = (0..100).map(|i| format!("w{i}")).collect();
        let text = words.join(" ");
        let chunker = Chunker::new(20, 5);
        let chunks = chunker.chunk("doc1", &text);

        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.id(), format!("doc1_{i}"));
        }
        // Consecutive chunks overlap by the configured word count.
        let first_words: Vec<&str> = chunks[0].text.split_whitespace().collect();
        let second_words: Vec<&str> = chunks[1].text.split_whitespace().collect();
        assert_eq!(first_words[15..20], second_words[0..5]);
    }

    #[test]
    fn short_text_yields_single_chunk() {
        let chunker = Chunker::new(384, 64);
        let chunks = chunker.chunk("doc2", "a short document");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id(), "doc2_0");
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = Chunker::new(384, 64);
        assert!(chunker.chunk("doc3", "   ").is_empty());
    }
}
