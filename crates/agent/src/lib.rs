//! `MediaSession` + `MediaSessionManager`: per-call state and the
//! turn-processing pipeline wiring retrieval, generation, tools and
//! persistence.

pub mod config;
pub mod error;
pub mod manager;
pub mod media_sink;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod turn;

pub use config::AgentConfig;
pub use error::AgentError;
pub use manager::MediaSessionManager;
pub use media_sink::SessionMediaSink;
pub use registry::AgentRegistry;
pub use runtime::PipelineRuntime;
pub use session::{GatewayFrame, MediaSession};
pub use turn::{maybe_commit_turn, speak_greeting};
