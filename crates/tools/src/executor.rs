//! The tool executor and its state machine:
//! `proposed → [awaiting_confirmation] → executing → completed|failed`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use voice_agent_config::constants::timeouts;
use voice_agent_core::SessionControl;

use crate::action::ToolAction;
use crate::ToolError;

/// Telephony control-plane operations used by tool execution:
/// two operations, both treated as opaque per the distilled spec's scope.
#[async_trait]
pub trait TelephonyControl: Send + Sync {
    async fn mark_completed(&self, call_id: &str) -> Result<(), ToolError>;
    async fn dial_transfer(&self, call_id: &str, number: &str) -> Result<(), ToolError>;
}

/// A `tool.called` webhook subscriber.
#[derive(Debug, Clone)]
pub struct WebhookSubscriber {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolState {
    Proposed,
    AwaitingConfirmation,
    Executing,
    Completed,
    Failed,
}

/// A tool invocation proposed by the LLM, possibly awaiting yes/no
/// confirmation.
#[derive(Debug, Clone)]
pub struct PendingAction {
    pub action: ToolAction,
    pub state: ToolState,
    pub proposed_at: DateTime<Utc>,
}

impl PendingAction {
    pub fn new(action: ToolAction, requires_confirmation: bool) -> Self {
        let state = if requires_confirmation {
            ToolState::AwaitingConfirmation
        } else {
            ToolState::Executing
        };
        Self { action, state, proposed_at: Utc::now() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl ToolResult {
    pub fn ok(response: Option<String>) -> Self {
        Self { success: true, error: None, response }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()), response: None }
    }
}

#[derive(Serialize)]
struct WebhookRequestBody<'a> {
    tool_name: &'a str,
    parameters: &'a HashMap<String, String>,
    call_context: &'a str,
    timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
struct WebhookResponseBody {
    response: Option<String>,
}

#[derive(Serialize)]
struct ToolCalledEvent<'a> {
    event: &'a str,
    call_id: &'a str,
    tool_name: &'a str,
    outcome: &'a str,
}

pub struct ToolExecutor {
    http: reqwest::Client,
    telephony: Arc<dyn TelephonyControl>,
    session: Arc<dyn SessionControl>,
    subscribers: Vec<WebhookSubscriber>,
    department_numbers: HashMap<String, String>,
}

impl ToolExecutor {
    pub fn new(
        telephony: Arc<dyn TelephonyControl>,
        session: Arc<dyn SessionControl>,
        subscribers: Vec<WebhookSubscriber>,
        department_numbers: HashMap<String, String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            telephony,
            session,
            subscribers,
            department_numbers,
        }
    }

    /// Run a resolved, already-past-confirmation tool action to completion.
    pub async fn execute(&self, call_id: &str, action: &ToolAction) -> ToolResult {
        let result = match action {
            ToolAction::EndCall { reason } => self.execute_end_call(call_id, reason).await,
            ToolAction::TransferCall { department } => {
                self.execute_transfer(call_id, department).await
            }
            ToolAction::Webhook { name, url, params } => {
                self.execute_webhook(call_id, name, url, params).await
            }
        };

        let (name, outcome) = match action {
            ToolAction::EndCall { .. } => ("end_call", &result),
            ToolAction::TransferCall { .. } => ("transfer_call", &result),
            ToolAction::Webhook { name, .. } => (name.as_str(), &result),
        };
        metrics::counter!(
            "voice_agent_tool_executions_total",
            "tool" => name.to_string(),
            "outcome" => if outcome.success { "success" } else { "failure" }
        )
        .increment(1);
        self.fire_tool_called(call_id, name, outcome).await;
        result
    }

    async fn execute_end_call(&self, call_id: &str, reason: &str) -> ToolResult {
        tokio::time::sleep(timeouts::END_CALL_GRACE).await;
        match self.telephony.mark_completed(call_id).await {
            Ok(()) => {
                if let Err(e) = self.session.destroy(call_id, reason).await {
                    tracing::warn!(call_id, error = %e, "session destroy after end_call failed");
                }
                ToolResult::ok(None)
            }
            Err(e) => ToolResult::err(e.to_string()),
        }
    }

    async fn execute_transfer(&self, call_id: &str, department: &str) -> ToolResult {
        tokio::time::sleep(timeouts::TRANSFER_GRACE).await;

        let Some(number) = self.department_numbers.get(department) else {
            return ToolResult::err(format!("no phone number configured for department {department}"));
        };

        if let Err(e) = self.session.latch_interrupt(call_id).await {
            return ToolResult::err(e.to_string());
        }
        if let Err(e) = self.session.drain_tts_and_clear(call_id).await {
            return ToolResult::err(e.to_string());
        }
        match self.telephony.dial_transfer(call_id, number).await {
            Ok(()) => ToolResult::ok(None),
            Err(e) => ToolResult::err(e.to_string()),
        }
    }

    async fn execute_webhook(
        &self,
        call_id: &str,
        name: &str,
        url: &str,
        params: &HashMap<String, String>,
    ) -> ToolResult {
        let body = WebhookRequestBody {
            tool_name: name,
            parameters: params,
            call_context: call_id,
            timestamp: Utc::now(),
        };

        let response = self
            .http
            .post(url)
            .timeout(timeouts::WEBHOOK_HTTP)
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => match resp.json::<WebhookResponseBody>().await {
                Ok(parsed) => ToolResult::ok(parsed.response),
                Err(e) => ToolResult::err(format!("malformed webhook response: {e}")),
            },
            Ok(resp) => ToolResult::err(format!("webhook returned {}", resp.status())),
            Err(e) => ToolResult::err(format!("webhook request failed: {e}")),
        }
    }

    async fn fire_tool_called(&self, call_id: &str, tool_name: &str, result: &ToolResult) {
        if self.subscribers.is_empty() {
            return;
        }
        let event = ToolCalledEvent {
            event: "tool.called",
            call_id,
            tool_name,
            outcome: if result.success { "success" } else { "failure" },
        };
        for sub in &self.subscribers {
            if let Err(e) = self
                .http
                .post(&sub.url)
                .timeout(Duration::from_secs(5))
                .json(&event)
                .send()
                .await
            {
                tracing::warn!(url = %sub.url, error = %e, "tool.called webhook delivery failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_agent_core::Error as CoreError;

    struct FakeTelephony;
    #[async_trait]
    impl TelephonyControl for FakeTelephony {
        async fn mark_completed(&self, _call_id: &str) -> Result<(), ToolError> {
            Ok(())
        }
        async fn dial_transfer(&self, _call_id: &str, _number: &str) -> Result<(), ToolError> {
            Ok(())
        }
    }

    struct FakeSession;
    #[async_trait]
    impl SessionControl for FakeSession {
        async fn latch_interrupt(&self, _call_id: &str) -> Result<(), CoreError> {
            Ok(())
        }
        async fn drain_tts_and_clear(&self, _call_id: &str) -> Result<(), CoreError> {
            Ok(())
        }
        async fn destroy(&self, _call_id: &str, _reason: &str) -> Result<(), CoreError> {
            Ok(())
        }
    }

    fn executor() -> ToolExecutor {
        let mut departments = HashMap::new();
        departments.insert("sales".to_string(), "+15551234567".to_string());
        ToolExecutor::new(Arc::new(FakeTelephony), Arc::new(FakeSession), vec![], departments)
    }

    #[tokio::test(start_paused = true)]
    async fn end_call_completes_successfully() {
        let result = executor()
            .execute("call-1", &ToolAction::EndCall { reason: "user_goodbye".into() })
            .await;
        assert!(result.success);
    }

    #[tokio::test(start_paused = true)]
    async fn transfer_without_department_number_fails_gracefully() {
        let result = executor()
            .execute("call-1", &ToolAction::TransferCall { department: "technical".into() })
            .await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[test]
    fn pending_action_without_confirmation_skips_straight_to_executing() {
        let pending = PendingAction::new(ToolAction::EndCall { reason: "tool_invoked".into() }, false);
        assert_eq!(pending.state, ToolState::Executing);
    }

    #[test]
    fn pending_action_requiring_confirmation_awaits_it() {
        let pending = PendingAction::new(
            ToolAction::TransferCall { department: "sales".into() },
            true,
        );
        assert_eq!(pending.state, ToolState::AwaitingConfirmation);
    }
}
