//! [`voice_agent_core::MediaSink`] implementation bridging the TTS sink's
//! frame-by-frame output to a session's gateway-egress channel.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;

use voice_agent_core::audio::FRAME_BYTES;
use voice_agent_core::{Error, MediaSink};

use crate::session::{GatewayFrame, MediaSession};

/// Captures the `stream_id` in force when a turn's TTS sink started, so a
/// late frame from a stale turn is refused even if a new stream has since
/// replaced it.
pub struct SessionMediaSink {
    session: Arc<MediaSession>,
    stream_id: String,
}

impl SessionMediaSink {
    pub fn new(session: Arc<MediaSession>) -> Self {
        let stream_id = session.current_stream_id();
        Self { session, stream_id }
    }
}

#[async_trait]
impl MediaSink for SessionMediaSink {
    async fn send_frame(&self, frame: [u8; FRAME_BYTES]) -> Result<bool, Error> {
        if self.session.is_interrupted() {
            return Ok(false);
        }
        if self.session.current_stream_id() != self.stream_id {
            return Ok(false);
        }
        match self.session.ws_outbound.send(GatewayFrame::Media(frame)).await {
            Ok(()) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    fn is_interrupted(&self) -> bool {
        self.session.is_interrupted()
    }

    fn set_agent_speaking(&self, speaking: bool) {
        self.session.agent_speaking.store(speaking, Ordering::Release);
    }
}
