//! Streaming LLM backend, prompt composition and tool-marker parsing
//!.

pub mod backend;
pub mod prompt;

pub use backend::{OllamaBackend, OllamaConfig};
pub use prompt::{compose_prompt, parse_tool_calls, substitute_variables, ParsedToolCall, PromptContext};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("generation failed: {0}")]
    Generation(String),
}

impl From<LlmError> for voice_agent_core::Error {
    fn from(err: LlmError) -> Self {
        voice_agent_core::Error::TransientExternal(err.to_string())
    }
}
