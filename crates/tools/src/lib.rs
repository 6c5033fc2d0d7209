//! Tagged-variant tool executor and its state machine.

pub mod action;
pub mod executor;
pub mod telephony;

pub use action::{resolve_tool_call, AgentTool, ResolvedTool, ToolAction};
pub use executor::{
    PendingAction, TelephonyControl, ToolExecutor, ToolResult, ToolState, WebhookSubscriber,
};
pub use telephony::{TwilioConfig, TwilioTelephony};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("telephony control error: {0}")]
    Telephony(String),

    #[error("webhook error: {0}")]
    Webhook(String),
}

impl From<ToolError> for voice_agent_core::Error {
    fn from(err: ToolError) -> Self {
        voice_agent_core::Error::ToolFailure(err.to_string())
    }
}
