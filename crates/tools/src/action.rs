//! The tagged-variant tool representation.

use std::collections::HashMap;

use voice_agent_llm::ParsedToolCall;

/// Per-agent tool definitions the LLM can refer to by name
///.
#[derive(Debug, Clone)]
pub struct AgentTool {
    pub tool_name: String,
    pub webhook_url: String,
}

const TRANSFER_DEPARTMENTS: &[&str] = &["sales", "support", "technical"];

/// A parsed-and-resolved tool invocation, before it enters the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolAction {
    EndCall { reason: String },
    TransferCall { department: String },
    Webhook { name: String, url: String, params: HashMap<String, String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTool {
    pub action: ToolAction,
    pub requires_confirmation: bool,
}

/// Resolve a parsed `[TOOL:..]`/`[CONFIRM_TOOL:..]` marker into a
/// [`ToolAction`] using the built-in name rules, falling back to an
/// agent-scoped webhook tool for any other name.
pub fn resolve_tool_call(call: &ParsedToolCall, agent_tools: &[AgentTool]) -> Option<ResolvedTool> {
    if call.name == "end_call" {
        return Some(ResolvedTool {
            action: ToolAction::EndCall { reason: "tool_invoked".to_string() },
            requires_confirmation: false,
        });
    }

    if call.name == "transfer" {
        let department = call.args.first()?.to_lowercase();
        if !TRANSFER_DEPARTMENTS.contains(&department.as_str()) {
            return None;
        }
        return Some(ResolvedTool {
            action: ToolAction::TransferCall { department },
            requires_confirmation: call.requires_confirmation,
        });
    }

    let tool = agent_tools.iter().find(|t| t.tool_name == call.name)?;
    let mut params = HashMap::new();
    for (i, arg) in call.args.iter().enumerate() {
        params.insert(format!("param{}", i + 1), arg.clone());
    }
    Some(ResolvedTool {
        action: ToolAction::Webhook {
            name: call.name.clone(),
            url: tool.webhook_url.clone(),
            params,
        },
        requires_confirmation: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[&str], confirm: bool) -> ParsedToolCall {
        ParsedToolCall {
            name: name.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            requires_confirmation: confirm,
        }
    }

    #[test]
    fn end_call_never_requires_confirmation() {
        let resolved = resolve_tool_call(&call("end_call", &[], false), &[]).unwrap();
        assert_eq!(resolved.action, ToolAction::EndCall { reason: "tool_invoked".to_string() });
        assert!(!resolved.requires_confirmation);
    }

    #[test]
    fn transfer_resolves_known_department() {
        let resolved = resolve_tool_call(&call("transfer", &["sales"], true), &[]).unwrap();
        assert_eq!(resolved.action, ToolAction::TransferCall { department: "sales".into() });
        assert!(resolved.requires_confirmation);
    }

    #[test]
    fn transfer_rejects_unknown_department() {
        assert!(resolve_tool_call(&call("transfer", &["accounting"], false), &[]).is_none());
    }

    #[test]
    fn unknown_name_resolves_to_agent_webhook() {
        let tools = vec![AgentTool { tool_name: "check_order".into(), webhook_url: "https://x/y".into() }];
        let resolved = resolve_tool_call(&call("check_order", &["12345"], false), &tools).unwrap();
        match resolved.action {
            ToolAction::Webhook { name, url, params } => {
                assert_eq!(name, "check_order");
                assert_eq!(url, "https://x/y");
                assert_eq!(params.get("param1").unwrap(), "12345");
            }
            _ => panic!("expected webhook action"),
        }
    }

    #[test]
    fn unknown_name_without_registered_tool_is_unresolved() {
        assert!(resolve_tool_call(&call("mystery", &[], false), &[]).is_none());
    }
}
