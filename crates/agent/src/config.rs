//! Per-agent configuration: immutable for the
//! call's lifetime once loaded at `start`.

use voice_agent_llm::substitute_variables;
use voice_agent_tools::AgentTool;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub agent_id: String,
    pub system_prompt: String,
    pub greeting: String,
    pub voice_id: String,
    pub model: String,
    pub silence_threshold_sec: f64,
    pub interrupt_enabled: bool,
    pub tools: Vec<AgentTool>,
}

impl AgentConfig {
    /// Render the greeting with `{{name}}`-style dynamic variables substituted
    ///. Unmatched placeholders are left verbatim.
    pub fn render_greeting(&self, dynamic_variables: &[(String, String)]) -> String {
        substitute_variables(&self.greeting, dynamic_variables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AgentConfig {
        AgentConfig {
            agent_id: "agent-1".into(),
            system_prompt: "Be helpful.".into(),
            greeting: "Hello {{name}}, this is Mila.".into(),
            voice_id: "default".into(),
            model: "qwen2.5:7b-instruct-q4_K_M".into(),
            silence_threshold_sec: 0.8,
            interrupt_enabled: true,
            tools: vec![],
        }
    }

    #[test]
    fn scenario_s1_greeting_with_variables() {
        let greeting = config().render_greeting(&[("name".to_string(), "Ana".to_string())]);
        assert_eq!(greeting, "Hello Ana, this is Mila.");
    }

    #[test]
    fn missing_variable_is_left_verbatim() {
        let greeting = config().render_greeting(&[]);
        assert_eq!(greeting, "Hello {{name}}, this is Mila.");
    }
}
