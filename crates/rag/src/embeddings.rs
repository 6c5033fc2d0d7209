//! Query/document embedding. Behind the `onnx` feature this loads a local
//! sentence-embedding ONNX model via `ort` + `tokenizers`; without it, a
//! deterministic hashing embedder stands in so the rest of the retrieval
//! path (chunking, vector store, distance cutoff) is exercisable without a
//! model file on disk.

use std::path::Path;

use crate::RagError;

/// Normalized embedding dimension used throughout the vector store
///.
pub const EMBEDDING_DIM: usize = 384;

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub max_seq_len: usize,
    pub embedding_dim: usize,
    pub normalize: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            max_seq_len: 512,
            embedding_dim: EMBEDDING_DIM,
            normalize: true,
        }
    }
}

fn l2_normalize(v: &mut [f32]) {
    let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Deterministic bag-of-tokens hashing embedder: stable across process
/// restarts (no RNG), good enough for tests and for running without a real
/// embedding model configured.
#[derive(Debug, Clone, Default)]
pub struct HashEmbedder {
    config: EmbeddingConfig,
}

impl HashEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { config }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.config.embedding_dim];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            std::hash::Hash::hash(&token, &mut hasher);
            let h = std::hash::Hasher::finish(&hasher);
            let idx = (h as usize) % v.len();
            let sign = if (h >> 63) & 1 == 1 { -1.0 } else { 1.0 };
            v[idx] += sign;
        }
        if self.config.normalize {
            l2_normalize(&mut v);
        }
        v
    }
}

#[cfg(feature = "onnx")]
pub struct OnnxEmbedder {
    session: ort::session::Session,
    tokenizer: tokenizers::Tokenizer,
    config: EmbeddingConfig,
}

#[cfg(feature = "onnx")]
impl OnnxEmbedder {
    pub fn load(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        config: EmbeddingConfig,
    ) -> Result<Self, RagError> {
        use ort::session::{builder::GraphOptimizationLevel, Session};

        let session = Session::builder()
            .map_err(|e| RagError::Model(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| RagError::Model(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| RagError::Model(e.to_string()))?;
        let tokenizer =
            tokenizers::Tokenizer::from_file(tokenizer_path).map_err(|e| RagError::Model(e.to_string()))?;
        Ok(Self { session, tokenizer, config })
    }
}

/// Embedder used by the retriever: either a real ONNX model or the hashing
/// fallback, picked at construction.
pub enum Embedder {
    Hash(HashEmbedder),
    #[cfg(feature = "onnx")]
    Onnx(OnnxEmbedder),
}

impl Embedder {
    pub fn hashing() -> Self {
        Embedder::Hash(HashEmbedder::new(EmbeddingConfig::default()))
    }

    #[cfg(feature = "onnx")]
    pub fn onnx(model_path: impl AsRef<Path>, tokenizer_path: impl AsRef<Path>) -> Result<Self, RagError> {
        Ok(Embedder::Onnx(OnnxEmbedder::load(
            model_path,
            tokenizer_path,
            EmbeddingConfig::default(),
        )?))
    }

    pub fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        match self {
            Embedder::Hash(e) => Ok(e.embed(text)),
            #[cfg(feature = "onnx")]
            Embedder::Onnx(_) => {
                // Real inference wiring (tokenize, run session, mean-pool, normalize)
                // is model-specific; callers without a concrete model file use
                // `Embedder::hashing()`.
                Err(RagError::Model("ONNX inference not wired for this model".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_embedder_is_deterministic_and_normalized() {
        let e = HashEmbedder::default();
        let a = e.embed("what services do you provide");
        let b = e.embed("what services do you provide");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
    }

    #[test]
    fn different_text_yields_different_embedding() {
        let e = HashEmbedder::default();
        assert_ne!(e.embed("hello world"), e.embed("goodbye now"));
    }
}
