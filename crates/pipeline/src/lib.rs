//! Per-frame and per-turn signal processing: the barge-in detector, the
//! turn-taking arbiter, the streaming STT buffer/adapter, the response
//! shaper, and the streaming TTS sink.

pub mod barge_in;
pub mod response_shaper;
pub mod stt;
pub mod turn_arbiter;
pub mod tts;
pub mod tts_backend;

pub use barge_in::{BargeInConfig, BargeInOutcome, BargeInState};
pub use stt::{DeepgramConfig, DeepgramStt, SttBufferState};
pub use turn_arbiter::TurnInput;
pub use tts::TtsQueueItem;
pub use tts_backend::{ElevenLabsConfig, ElevenLabsTts};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("stt adapter error: {0}")]
    Stt(String),

    #[error("tts sink error: {0}")]
    Tts(String),
}

impl From<PipelineError> for voice_agent_core::Error {
    fn from(err: PipelineError) -> Self {
        voice_agent_core::Error::TransientExternal(err.to_string())
    }
}
