//! `AgentRegistry`: resolves an `agent_id` carried on a call's `start` event
//! to its immutable [`AgentConfig`].
//!
//! The full agents/webhooks CRUD surface is an external, opaque interface
//!; this loads the same shape of data from a
//! flat TOML file so the pipeline has something real to run against without
//! that surface. `agents.toml` is optional — an unconfigured deployment
//! still boots with the single built-in default agent.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use voice_agent_tools::AgentTool;

use crate::config::AgentConfig;

#[derive(Debug, Deserialize)]
struct AgentFile {
    #[serde(default)]
    agent: Vec<AgentEntry>,
}

#[derive(Debug, Deserialize)]
struct AgentEntry {
    agent_id: String,
    #[serde(default = "default_system_prompt")]
    system_prompt: String,
    #[serde(default = "default_greeting")]
    greeting: String,
    #[serde(default = "default_voice_id")]
    voice_id: String,
    #[serde(default = "default_model")]
    model: String,
    #[serde(default = "default_silence_threshold")]
    silence_threshold_sec: f64,
    #[serde(default = "default_true")]
    interrupt_enabled: bool,
    #[serde(default)]
    tools: Vec<AgentToolEntry>,
}

#[derive(Debug, Deserialize)]
struct AgentToolEntry {
    tool_name: String,
    webhook_url: String,
}

fn default_system_prompt() -> String {
    "You are a helpful phone assistant. Keep responses brief and natural to speak aloud.".to_string()
}
fn default_greeting() -> String {
    "Hello, thanks for calling. How can I help you today?".to_string()
}
fn default_voice_id() -> String {
    "default".to_string()
}
fn default_model() -> String {
    "qwen2.5:7b-instruct-q4_K_M".to_string()
}
fn default_silence_threshold() -> f64 {
    0.8
}
fn default_true() -> bool {
    true
}

impl From<AgentEntry> for AgentConfig {
    fn from(entry: AgentEntry) -> Self {
        AgentConfig {
            agent_id: entry.agent_id,
            system_prompt: entry.system_prompt,
            greeting: entry.greeting,
            voice_id: entry.voice_id,
            model: entry.model,
            silence_threshold_sec: entry.silence_threshold_sec,
            interrupt_enabled: entry.interrupt_enabled,
            tools: entry
                .tools
                .into_iter()
                .map(|t| AgentTool { tool_name: t.tool_name, webhook_url: t.webhook_url })
                .collect(),
        }
    }
}

/// Process-wide, read-only table of agent configurations, keyed by
/// `agent_id`.
pub struct AgentRegistry {
    agents: HashMap<String, AgentConfig>,
    default_agent_id: String,
}

impl AgentRegistry {
    /// The agent id used when a call's `start` event carries none.
    pub const DEFAULT_AGENT_ID: &'static str = "default";

    /// Build a registry with only the built-in default agent, for
    /// deployments with no `agents.toml`.
    pub fn with_default() -> Self {
        let mut agents = HashMap::new();
        agents.insert(
            Self::DEFAULT_AGENT_ID.to_string(),
            AgentConfig::from(AgentEntry {
                agent_id: Self::DEFAULT_AGENT_ID.to_string(),
                system_prompt: default_system_prompt(),
                greeting: default_greeting(),
                voice_id: default_voice_id(),
                model: default_model(),
                silence_threshold_sec: default_silence_threshold(),
                interrupt_enabled: true,
                tools: Vec::new(),
            }),
        );
        Self { agents, default_agent_id: Self::DEFAULT_AGENT_ID.to_string() }
    }

    /// Load `agents.toml` if present, falling back to [`Self::with_default`]
    /// (with a logged warning) on any read/parse failure.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "no agents.toml found, using built-in default agent");
            return Self::with_default();
        }

        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read agents.toml, using built-in default agent");
                return Self::with_default();
            }
        };

        let parsed: AgentFile = match toml::from_str(&contents) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to parse agents.toml, using built-in default agent");
                return Self::with_default();
            }
        };

        let mut agents: HashMap<String, AgentConfig> = parsed
            .agent
            .into_iter()
            .map(|entry| (entry.agent_id.clone(), AgentConfig::from(entry)))
            .collect();

        if agents.is_empty() {
            tracing::warn!(path = %path.display(), "agents.toml defines no agents, using built-in default agent");
            return Self::with_default();
        }

        let default_agent_id = agents
            .keys()
            .find(|id| id.as_str() == Self::DEFAULT_AGENT_ID)
            .cloned()
            .unwrap_or_else(|| agents.keys().next().cloned().unwrap());

        if !agents.contains_key(Self::DEFAULT_AGENT_ID) {
            if let Some(fallback) = agents.get(&default_agent_id).cloned() {
                agents.insert(Self::DEFAULT_AGENT_ID.to_string(), fallback);
            }
        }

        Self { agents, default_agent_id }
    }

    /// Resolve `agent_id`, falling back to the registry's default agent
    /// (protocol-mismatch policy: log and continue rather than drop the call).
    pub fn resolve(&self, agent_id: Option<&str>) -> AgentConfig {
        match agent_id {
            Some(id) if !id.is_empty() => self.agents.get(id).cloned().unwrap_or_else(|| {
                tracing::warn!(agent_id = id, "unknown agent_id on start event, using default agent");
                self.agents
                    .get(&self.default_agent_id)
                    .cloned()
                    .expect("default agent always present")
            }),
            _ => self
                .agents
                .get(&self.default_agent_id)
                .cloned()
                .expect("default agent always present"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_default_resolves_unknown_agent_to_default() {
        let registry = AgentRegistry::with_default();
        let config = registry.resolve(Some("nonexistent"));
        assert_eq!(config.agent_id, AgentRegistry::DEFAULT_AGENT_ID);
    }

    #[test]
    fn with_default_resolves_missing_agent_id_to_default() {
        let registry = AgentRegistry::with_default();
        let config = registry.resolve(None);
        assert_eq!(config.agent_id, AgentRegistry::DEFAULT_AGENT_ID);
    }

    #[test]
    fn loads_agents_from_toml() {
        let dir = std::env::temp_dir().join(format!("voice-agent-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("agents.toml");
        std::fs::write(
            &path,
            r#"
            [[agent]]
            agent_id = "sales-line"
            system_prompt = "Be a helpful sales agent."
            greeting = "Hi {{name}}, thanks for calling sales."
            voice_id = "voice-a"
            model = "qwen2.5:7b-instruct-q4_K_M"

            [[agent.tools]]
            tool_name = "check_order"
            webhook_url = "https://example.com/hooks/check_order"
            "#,
        )
        .unwrap();

        let registry = AgentRegistry::load(&path);
        let config = registry.resolve(Some("sales-line"));
        assert_eq!(config.voice_id, "voice-a");
        assert_eq!(config.tools.len(), 1);
        assert_eq!(config.tools[0].tool_name, "check_order");

        std::fs::remove_dir_all(&dir).ok();
    }
}
