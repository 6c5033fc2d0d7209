//! The LLM generation boundary.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Error;

/// Deterministic-leaning sampling defaults for the chat-completion backend.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repeat_penalty: f32,
    pub num_predict: u32,
    pub stop: Vec<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.9,
            top_k: 40,
            repeat_penalty: 1.2,
            num_predict: 1200,
            stop: vec![
                "\nUser:".to_string(),
                "\nAssistant:".to_string(),
                "User:".to_string(),
            ],
        }
    }
}

/// A composed single-prompt streaming generation request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub model: String,
    pub options: GenerationOptions,
}

/// Streaming text generator. Tokens are forwarded on `tokens` as they
/// arrive; the full raw response is returned once generation completes or
/// is cancelled via `cancel`.
#[async_trait]
pub trait LlmStreamer: Send + Sync {
    async fn generate_stream(
        &self,
        request: GenerateRequest,
        tokens: mpsc::Sender<String>,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<String, Error>;
}
