//! The cross-crate error type. Every crate defines its own `thiserror` enum
//! for its own failure modes and bridges into this one at the boundary, so
//! that only genuinely fatal configuration errors ever reach `main`.

use thiserror::Error;

/// Coarse failure taxonomy shared across crates so the propagation policy
/// (graceful fallback vs. dropped frame vs. fatal exit) can be decided
/// generically at the pipeline boundary.
#[derive(Error, Debug)]
pub enum Error {
    /// An external dependency (STT/TTS/LLM/webhook) failed transiently.
    /// The call continues; the user hears a fallback utterance.
    #[error("transient external failure: {0}")]
    TransientExternal(String),

    /// Missing/invalid configuration discovered at startup. Fatal.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A protocol event didn't match expectations (unknown event, stale
    /// `stream_id`). The frame is dropped and a warning logged.
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// The call's session ended unexpectedly (WS closed mid-turn, etc.).
    #[error("session lifecycle error: {0}")]
    SessionLifecycle(String),

    /// A tool invocation failed; surfaced to the LLM as `{success:false}`.
    #[error("tool failure: {0}")]
    ToolFailure(String),
}

pub type Result<T> = std::result::Result<T, Error>;
