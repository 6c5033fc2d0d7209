//! Cross-crate trait seams: the interfaces `voice-agent-agent` programs
//! against without depending on concrete adapter crates.

pub mod generation;
pub mod media;
pub mod retrieval;
pub mod session;
pub mod speech;

pub use generation::{GenerateRequest, GenerationOptions, LlmStreamer};
pub use media::MediaSink;
pub use retrieval::{RetrievedChunk, Retriever};
pub use session::SessionControl;
pub use speech::{SpeechToText, SttConnection, SttEvent, SttSessionConfig, TextToSpeech, TtsChunk};
