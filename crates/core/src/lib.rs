//! Shared types for the telephony voice agent: audio codec utilities, the
//! conversation turn model, the cross-crate error type, and the trait seams
//! other crates implement/consume.

pub mod audio;
pub mod conversation;
pub mod error;
pub mod traits;

pub use conversation::{classify_intent, CallPhase, ConversationHistory, ConversationTurn, Intent};
pub use error::{Error, Result};
pub use traits::{
    GenerateRequest, GenerationOptions, LlmStreamer, MediaSink, RetrievedChunk, Retriever,
    SessionControl, SpeechToText, SttConnection, SttEvent, SttSessionConfig, TextToSpeech,
    TtsChunk,
};
