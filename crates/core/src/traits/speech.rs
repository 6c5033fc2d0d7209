//! Cross-crate traits for the streaming speech boundary.
//!
//! These are implemented by `voice-agent-pipeline` and consumed by
//! `voice-agent-agent`, kept here so neither crate depends on the other's
//! concrete adapter types.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::mpsc;

use crate::error::Error;

/// One event emitted by a streaming ASR connection.
#[derive(Debug, Clone)]
pub enum SttEvent {
    /// Interim (non-final) transcript fragment.
    Interim { text: String },
    /// Finalized transcript fragment.
    Final { text: String },
    /// Voice-activity start.
    SpeechStarted,
    /// ASR-signalled silence after speech.
    UtteranceEnd,
    /// The connection closed or errored; STT is unusable for the rest of the call.
    Closed { reason: String },
}

/// Configuration for opening a streaming ASR connection.
#[derive(Debug, Clone)]
pub struct SttSessionConfig {
    pub model: String,
    pub fallback_model: Option<String>,
    pub sample_rate_hz: u32,
    pub encoding: &'static str,
    pub interim_results: bool,
    pub vad_events: bool,
    pub endpointing_ms: u64,
}

/// A live bidirectional connection to a streaming ASR backend: audio flows
/// in via [`send_audio`](SttConnection::send_audio), events flow out via
/// [`events`](SttConnection::events).
#[async_trait]
pub trait SttConnection: Send {
    async fn send_audio(&mut self, ulaw_frame: &[u8]) -> Result<(), Error>;
    /// Receiver of ASR events; closes when the connection drops.
    fn events(&mut self) -> &mut mpsc::Receiver<SttEvent>;
    async fn close(&mut self);
}

/// Factory for streaming ASR connections, retrying once with a fallback
/// model if the primary configuration is rejected.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn connect(&self, config: SttSessionConfig) -> Result<Box<dyn SttConnection>, Error>;
}

/// One chunk of synthesized audio: linear PCM16 at `sample_rate_hz`.
#[derive(Debug, Clone)]
pub struct TtsChunk {
    pub pcm16: Vec<u8>,
    pub sample_rate_hz: u32,
}

/// Streaming text-to-speech backend.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
    ) -> Result<BoxStream<'static, Result<TtsChunk, Error>>, Error>;
}
