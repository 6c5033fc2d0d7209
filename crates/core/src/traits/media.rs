//! The media-channel boundary the streaming TTS sink pushes frames through
//!. Kept here, like the other trait seams, so
//! `voice-agent-pipeline`'s sink doesn't need to depend on
//! `voice-agent-agent`'s concrete `MediaSession`.

use async_trait::async_trait;

use crate::audio::FRAME_BYTES;
use crate::error::Error;

/// A destination for outbound telephony audio frames, backed by a call's
/// media-channel WebSocket. Implementations own the `interrupt_requested`/
/// `stream_id` checks that gate every outbound frame; the sink calls this
/// on every frame and stops on the first refusal.
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Send one 20ms μ-law frame. Returns `Ok(false)` (not an error) when the
    /// session refused the frame because an interrupt landed or `stream_id`
    /// has moved on — the sink treats that identically to an interrupt.
    async fn send_frame(&self, frame: [u8; FRAME_BYTES]) -> Result<bool, Error>;

    /// Whether an interrupt has been latched since the sink started this turn.
    fn is_interrupted(&self) -> bool;

    /// Toggle the session's `agent_speaking` flag.
    fn set_agent_speaking(&self, speaking: bool);
}
