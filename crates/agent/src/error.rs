//! The agent crate's own failure modes, bridged into the shared taxonomy
//!. Most component failures already arrive
//! pre-bridged as `voice_agent_core::Error`; what's left here is specific to
//! session lifecycle management itself.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session already exists: {0}")]
    AlreadyExists(String),

    #[error("session teardown did not complete in time: {0}")]
    TeardownTimeout(String),

    #[error(transparent)]
    Core(#[from] voice_agent_core::Error),
}

impl From<AgentError> for voice_agent_core::Error {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Core(e) => e,
            other => voice_agent_core::Error::SessionLifecycle(other.to_string()),
        }
    }
}
