//! The session-control boundary the tool executor needs without depending
//! on `voice-agent-agent` directly.

use async_trait::async_trait;

use crate::error::Error;

#[async_trait]
pub trait SessionControl: Send + Sync {
    /// Set the one-shot interrupt latch.
    async fn latch_interrupt(&self, call_id: &str) -> Result<(), Error>;
    /// Drain the TTS queue and send a "clear" control frame to the gateway.
    async fn drain_tts_and_clear(&self, call_id: &str) -> Result<(), Error>;
    /// Tear down the session: cancel its tasks, finish STT, close the WS.
    /// `reason` is recorded as the conversation's `ended_reason`.
    async fn destroy(&self, call_id: &str, reason: &str) -> Result<(), Error>;
}
