//! Layered settings and shared constants for the voice agent.

pub mod constants;
pub mod settings;

pub use settings::{
    InterruptConfig, LlmConfig, ObservabilityConfig, PersistenceConfig, RagConfig,
    RuntimeEnvironment, ServerConfig, Settings, SttConfig, TelephonyConfig, TtsConfig, TurnConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),

    #[error("missing required field(s): {0}")]
    MissingField(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}

impl From<ConfigError> for voice_agent_core::Error {
    fn from(err: ConfigError) -> Self {
        voice_agent_core::Error::Configuration(err.to_string())
    }
}
