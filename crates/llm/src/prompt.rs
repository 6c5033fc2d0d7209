//! Prompt composition and inline tool-marker parsing
//!.

use chrono::Utc;
use chrono_tz::America::New_York;
use regex::Regex;
use std::sync::OnceLock;

/// Everything the prompt composer needs, gathered by the caller (the
/// `voice-agent-agent` turn-commit path) from the media session and the
/// other pipeline components.
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    pub system_prompt: &'a str,
    pub call_phase: &'a str,
    pub last_intent: Option<&'a str>,
    pub dynamic_variables: &'a [(String, String)],
    pub retrieved_context: &'a str,
    pub history_formatted: &'a str,
    pub user_utterance: &'a str,
}

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful voice assistant speaking with a caller over the phone. \
     Keep responses brief and conversational.";

/// Compose the full single-string prompt in order: system prompt,
/// call-context block, date, dynamic variables, retrieved context, rolling
/// history, current utterance.
pub fn compose_prompt(ctx: &PromptContext) -> String {
    let system = if ctx.system_prompt.trim().is_empty() {
        DEFAULT_SYSTEM_PROMPT
    } else {
        ctx.system_prompt
    };

    let now_et = Utc::now().with_timezone(&New_York);
    let date_line = format!("Current date: {}", now_et.format("%A, %B %-d, %Y"));

    let call_context = format!(
        "Call context: phase={}, last_intent={}",
        ctx.call_phase,
        ctx.last_intent.unwrap_or("none")
    );

    let variables = if ctx.dynamic_variables.is_empty() {
        String::new()
    } else {
        let bullets = ctx
            .dynamic_variables
            .iter()
            .map(|(k, v)| format!("- {k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n");
        format!("Dynamic variables:\n{bullets}")
    };

    let mut sections = vec![system.to_string(), call_context, date_line];
    if !variables.is_empty() {
        sections.push(variables);
    }
    sections.push(format!("Retrieved context:\n{}", ctx.retrieved_context));
    if !ctx.history_formatted.is_empty() {
        sections.push(ctx.history_formatted.to_string());
    }
    sections.push(format!("User: {}", ctx.user_utterance));
    sections.push("Assistant:".to_string());

    sections.join("\n\n")
}

/// Substitute `{{name}}` placeholders in a greeting template with dynamic
/// variable values. Unmatched placeholders are
/// left verbatim.
pub fn substitute_variables(template: &str, variables: &[(String, String)]) -> String {
    let mut out = template.to_string();
    for (k, v) in variables {
        out = out.replace(&format!("{{{{{k}}}}}"), v);
    }
    out
}

/// One `[TOOL:..]` / `[CONFIRM_TOOL:..]` marker found in raw LLM output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedToolCall {
    pub name: String,
    pub args: Vec<String>,
    pub requires_confirmation: bool,
}

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(CONFIRM_TOOL|TOOL):([^\]]+)\]").unwrap())
}

/// Find every tool marker in `response`, and return the response with those
/// markers stripped out alongside the parsed calls — removing the marker
/// text from the raw response yields the cleaned response.
pub fn parse_tool_calls(response: &str) -> (String, Vec<ParsedToolCall>) {
    let re = marker_regex();
    let mut calls = Vec::new();
    let cleaned = re.replace_all(response, |caps: &regex::Captures| {
        let kind = &caps[1];
        let body = &caps[2];
        let mut parts = body.split(':');
        let name = parts.next().unwrap_or_default().to_string();
        let args: Vec<String> = parts.map(|s| s.to_string()).collect();
        calls.push(ParsedToolCall {
            name,
            args,
            requires_confirmation: kind == "CONFIRM_TOOL",
        });
        ""
    });

    (cleaned.trim().to_string(), calls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_variables_are_substituted() {
        let out = substitute_variables("Hello {{name}}, this is Mila.", &[("name".into(), "Ana".into())]);
        assert_eq!(out, "Hello Ana, this is Mila.");
    }

    #[test]
    fn unmatched_placeholder_is_left_verbatim() {
        let out = substitute_variables("Hi {{name}}", &[]);
        assert_eq!(out, "Hi {{name}}");
    }

    #[test]
    fn tool_marker_roundtrip_removes_marker_text() {
        let raw = "Let me transfer you. [CONFIRM_TOOL:transfer:sales]";
        let (cleaned, calls) = parse_tool_calls(raw);
        assert_eq!(cleaned, "Let me transfer you.");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "transfer");
        assert_eq!(calls[0].args, vec!["sales".to_string()]);
        assert!(calls[0].requires_confirmation);
    }

    #[test]
    fn end_call_marker_has_no_args() {
        let (cleaned, calls) = parse_tool_calls("Goodbye! [TOOL:end_call]");
        assert_eq!(cleaned, "Goodbye!");
        assert_eq!(calls[0].name, "end_call");
        assert!(calls[0].args.is_empty());
        assert!(!calls[0].requires_confirmation);
    }

    #[test]
    fn prompt_sections_appear_in_spec_order() {
        let ctx = PromptContext {
            system_prompt: "Be nice.",
            call_phase: "discovery",
            last_intent: Some("question"),
            dynamic_variables: &[("name".to_string(), "Ana".to_string())],
            retrieved_context: "Some fact.",
            history_formatted: "User: hi\nAssistant: hello",
            user_utterance: "what services do you provide",
        };
        let prompt = compose_prompt(&ctx);
        let sys_pos = prompt.find("Be nice.").unwrap();
        let ctx_pos = prompt.find("Call context").unwrap();
        let vars_pos = prompt.find("Dynamic variables").unwrap();
        let retrieved_pos = prompt.find("Retrieved context").unwrap();
        let history_pos = prompt.find("User: hi").unwrap();
        let utterance_pos = prompt.find("User: what services").unwrap();
        assert!(sys_pos < ctx_pos);
        assert!(ctx_pos < vars_pos);
        assert!(vars_pos < retrieved_pos);
        assert!(retrieved_pos < history_pos);
        assert!(history_pos < utterance_pos);
    }
}
