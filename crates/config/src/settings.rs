//! `Settings`: layered configuration loaded via the `config` crate — a base
//! `config/default.toml`, an environment overlay, then `VOICE_AGENT__`
//! environment variables.

use std::collections::HashMap;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{rag, turn};
use crate::ConfigError;

/// Deployment environment; governs how strictly [`Settings::validate`] enforces
/// required credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub websocket_path: String,
    pub max_connections: usize,
    pub connection_timeout_secs: u64,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            websocket_path: "/media".to_string(),
            max_connections: 500,
            connection_timeout_secs: 3600,
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TelephonyConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub default_from_number: String,
    pub public_base_url: String,
    pub department_numbers: HashMap<String, String>,
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub fallback_model: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: "wss://api.deepgram.com/v1/listen".to_string(),
            model: "nova-2".to_string(),
            fallback_model: "base".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub endpoint: String,
    pub api_key: String,
    pub default_voice_id: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.elevenlabs.io/v1/text-to-speech".to_string(),
            api_key: String::new(),
            default_voice_id: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repeat_penalty: f32,
    pub num_predict: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "qwen2.5:7b-instruct-q4_K_M".to_string(),
            temperature: 0.2,
            top_p: 0.9,
            top_k: 40,
            repeat_penalty: 1.2,
            num_predict: 1200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub vector_store_endpoint: String,
    pub embedding_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            vector_store_endpoint: "http://localhost:6334".to_string(),
            embedding_model: "bge-small-en-v1.5".to_string(),
            chunk_size: rag::DEFAULT_CHUNK_SIZE,
            chunk_overlap: rag::DEFAULT_CHUNK_OVERLAP,
            top_k: rag::DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    pub silence_threshold_sec: f64,
    pub interim_processing_enabled: bool,
    pub interim_min_length: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            silence_threshold_sec: turn::DEFAULT_SILENCE_THRESHOLD_SEC,
            interim_processing_enabled: false,
            interim_min_length: turn::DEFAULT_INTERIM_MIN_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterruptConfig {
    pub enabled: bool,
    pub min_energy: u32,
    pub baseline_factor: f64,
    pub min_speech_ms: u64,
    pub debounce_ms: u64,
    pub require_text: bool,
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_energy: crate::constants::interrupt::DEFAULT_MIN_ENERGY,
            baseline_factor: crate::constants::interrupt::DEFAULT_BASELINE_FACTOR,
            min_speech_ms: crate::constants::interrupt::DEFAULT_MIN_SPEECH_MS,
            debounce_ms: crate::constants::interrupt::DEFAULT_DEBOUNCE_MS,
            require_text: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub scylla_hosts: Vec<String>,
    pub keyspace: String,
    pub replication_factor: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            scylla_hosts: vec!["127.0.0.1:9042".to_string()],
            keyspace: "voice_agent".to_string(),
            replication_factor: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub otlp_endpoint: Option<String>,
    pub telemetry_enabled: bool,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            telemetry_enabled: false,
            metrics_enabled: true,
            metrics_port: 9090,
        }
    }
}

/// The full application settings tree.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub environment: RuntimeEnvironment,
    pub server: ServerConfig,
    pub telephony: TelephonyConfig,
    pub stt: SttConfig,
    pub tts: TtsConfig,
    pub llm: LlmConfig,
    pub rag: RagConfig,
    pub turn: TurnConfig,
    pub interrupt: InterruptConfig,
    pub persistence: PersistenceConfig,
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Layer `config/default.toml` < `config/{env}.toml` < `VOICE_AGENT__*` env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("VOICE_AGENT_ENV").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(
                Environment::with_prefix("VOICE_AGENT")
                    .separator("__")
                    .try_parsing(true),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Missing STT/TTS/LLM credentials are fatal in Staging/Production, a
    /// logged warning in Development.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.stt.api_key.is_empty() {
            missing.push("stt.api_key");
        }
        if self.tts.api_key.is_empty() {
            missing.push("tts.api_key");
        }
        if self.telephony.jwt_secret.is_empty() {
            missing.push("telephony.jwt_secret");
        }

        if missing.is_empty() {
            return Ok(());
        }

        if self.environment.is_strict() {
            return Err(ConfigError::MissingField(missing.join(", ")));
        }
        tracing::warn!(missing = %missing.join(", "), "missing credentials; continuing in development");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let settings = Settings::default();
        assert_eq!(settings.turn.silence_threshold_sec, 0.8);
        assert_eq!(settings.rag.top_k, 3);
        assert!(settings.interrupt.enabled);
    }

    #[test]
    fn development_tolerates_missing_credentials() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn production_requires_credentials() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        assert!(settings.validate().is_err());
    }
}
