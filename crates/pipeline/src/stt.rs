//! Streaming STT: a pure interim/final transcript-merge function
//!, plus a Deepgram-compatible websocket adapter.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use voice_agent_config::constants::turn as cfg;
use voice_agent_core::{
    Error as CoreError, SpeechToText, SttConnection, SttEvent, SttSessionConfig,
};

/// Accumulated transcript-buffer state fed by [`apply_event`].
#[derive(Debug, Clone, Default)]
pub struct SttBufferState {
    pub buffer: String,
    pub is_final: bool,
}

/// Merge one ASR event into the running buffer:
///
/// - `Final` text concatenates onto the existing buffer when the buffer
///   doesn't already end in terminal punctuation and the new piece is
///   longer than [`cfg::MIN_BUFFER_CHARS`]; otherwise it replaces the
///   buffer outright. Either way the buffer is marked final.
/// - `Interim` text concatenates onto a non-final buffer only when the
///   buffer doesn't already end in terminal punctuation and has grown past
///   [`cfg::MIN_BUFFER_CHARS`]; otherwise it replaces, avoiding runaway
///   duplication from ASR's own internal re-segmentation.
/// - `SpeechStarted`/`UtteranceEnd`/`Closed` don't mutate the transcript
///   buffer; the caller uses them only for timing.
pub fn apply_event(state: &mut SttBufferState, event: &SttEvent) {
    match event {
        SttEvent::Final { text } => {
            let ends_terminal = state.buffer.trim_end().ends_with(['.', '?', '!']);
            if !ends_terminal && !state.buffer.is_empty() && text.trim().len() > cfg::MIN_BUFFER_CHARS {
                if !state.buffer.ends_with(' ') && !text.starts_with(' ') {
                    state.buffer.push(' ');
                }
                state.buffer.push_str(text);
            } else {
                state.buffer = text.clone();
            }
            state.is_final = true;
        }
        SttEvent::Interim { text } => {
            if state.is_final {
                state.buffer = text.clone();
                state.is_final = false;
                return;
            }
            let ends_terminal = state
                .buffer
                .trim_end()
                .ends_with(['.', '?', '!']);
            if !ends_terminal && state.buffer.len() > cfg::MIN_BUFFER_CHARS {
                if !state.buffer.ends_with(' ') && !text.starts_with(' ') {
                    state.buffer.push(' ');
                }
                state.buffer.push_str(text);
            } else {
                state.buffer = text.clone();
            }
        }
        SttEvent::SpeechStarted | SttEvent::UtteranceEnd | SttEvent::Closed { .. } => {}
    }
}

/// Clear the buffer after a commit.
pub fn reset(state: &mut SttBufferState) {
    state.buffer.clear();
    state.is_final = false;
}

#[derive(Debug, Clone)]
pub struct DeepgramConfig {
    pub endpoint: String,
    pub api_key: String,
    pub connect_timeout: Duration,
}

/// Streaming ASR backend speaking Deepgram's websocket protocol, retrying
/// the connection once with `fallback_model` if the primary model is
/// rejected.
#[derive(Clone)]
pub struct DeepgramStt {
    config: DeepgramConfig,
}

impl DeepgramStt {
    pub fn new(config: DeepgramConfig) -> Self {
        Self { config }
    }

    fn connect_url(&self, session: &SttSessionConfig, model: &str) -> String {
        format!(
            "{}?model={model}&encoding={}&sample_rate={}&interim_results={}&vad_events={}&endpointing={}",
            self.config.endpoint,
            session.encoding,
            session.sample_rate_hz,
            session.interim_results,
            session.vad_events,
            session.endpointing_ms,
        )
    }

    async fn try_connect(
        &self,
        session: &SttSessionConfig,
        model: &str,
    ) -> Result<Box<dyn SttConnection>, CoreError> {
        let url = self.connect_url(session, model);
        let mut request = url
            .into_client_request()
            .map_err(|e| CoreError::Configuration(format!("invalid stt endpoint: {e}")))?;
        request.headers_mut().insert(
            "Authorization",
            format!("Token {}", self.config.api_key)
                .parse()
                .map_err(|_| CoreError::Configuration("invalid stt api key".to_string()))?,
        );

        let (ws, response) = tokio::time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| CoreError::TransientExternal("stt connect timed out".to_string()))?
        .map_err(|e| CoreError::TransientExternal(format!("stt connect failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CoreError::ProtocolMismatch(format!(
                "stt rejected model {model}: {}",
                response.status()
            )));
        }

        let (sink, mut stream) = ws.split();
        let (tx, rx) = mpsc::channel(128);

        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let message = match message {
                    Ok(m) => m,
                    Err(e) => {
                        let _ = tx
                            .send(SttEvent::Closed {
                                reason: e.to_string(),
                            })
                            .await;
                        return;
                    }
                };
                let Message::Text(text) = message else {
                    continue;
                };
                let Ok(frame) = serde_json::from_str::<DeepgramFrame>(&text) else {
                    continue;
                };
                let events = frame.into_events();
                for event in events {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
            let _ = tx
                .send(SttEvent::Closed {
                    reason: "stream ended".to_string(),
                })
                .await;
        });

        Ok(Box::new(DeepgramConnection { sink: Some(sink), events: rx }))
    }
}

#[async_trait]
impl SpeechToText for DeepgramStt {
    async fn connect(&self, session: SttSessionConfig) -> Result<Box<dyn SttConnection>, CoreError> {
        match self.try_connect(&session, &session.model).await {
            Ok(conn) => Ok(conn),
            Err(CoreError::ProtocolMismatch(reason)) => {
                let Some(fallback) = session.fallback_model.clone() else {
                    return Err(CoreError::ProtocolMismatch(reason));
                };
                tracing::warn!(%reason, fallback, "stt primary model rejected, retrying with fallback");
                self.try_connect(&session, &fallback).await
            }
            Err(e) => Err(e),
        }
    }
}

type WsSink = futures::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

struct DeepgramConnection {
    sink: Option<WsSink>,
    events: mpsc::Receiver<SttEvent>,
}

#[async_trait]
impl SttConnection for DeepgramConnection {
    async fn send_audio(&mut self, ulaw_frame: &[u8]) -> Result<(), CoreError> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(CoreError::SessionLifecycle("stt connection closed".to_string()));
        };
        sink.send(Message::Binary(ulaw_frame.to_vec()))
            .await
            .map_err(|e| CoreError::TransientExternal(format!("stt send failed: {e}")))
    }

    fn events(&mut self) -> &mut mpsc::Receiver<SttEvent> {
        &mut self.events
    }

    async fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            let _ = sink.send(Message::Close(None)).await;
        }
    }
}

#[derive(Deserialize)]
struct DeepgramFrame {
    #[serde(rename = "type")]
    kind: Option<String>,
    channel: Option<DeepgramChannel>,
    speech_final: Option<bool>,
}

#[derive(Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

impl DeepgramFrame {
    fn into_events(self) -> Vec<SttEvent> {
        match self.kind.as_deref() {
            Some("SpeechStarted") => vec![SttEvent::SpeechStarted],
            Some("UtteranceEnd") => vec![SttEvent::UtteranceEnd],
            _ => {
                let Some(channel) = self.channel else {
                    return vec![];
                };
                let Some(alt) = channel.alternatives.into_iter().next() else {
                    return vec![];
                };
                if alt.transcript.is_empty() {
                    return vec![];
                }
                if self.speech_final.unwrap_or(false) {
                    vec![SttEvent::Final { text: alt.transcript }]
                } else {
                    vec![SttEvent::Interim { text: alt.transcript }]
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_on_empty_buffer_sets_it_and_marks_final() {
        let mut state = SttBufferState::default();
        apply_event(&mut state, &SttEvent::Final { text: "hello there".into() });
        assert_eq!(state.buffer, "hello there");
        assert!(state.is_final);
    }

    #[test]
    fn final_concatenates_when_buffer_open_and_piece_long_enough() {
        let mut state = SttBufferState { buffer: "hel".into(), is_final: false };
        apply_event(&mut state, &SttEvent::Final { text: "lo there friend".into() });
        assert_eq!(state.buffer, "hel lo there friend");
        assert!(state.is_final);
    }

    #[test]
    fn final_replaces_when_buffer_already_ends_terminal() {
        let mut state = SttBufferState { buffer: "is that all?".into(), is_final: true };
        apply_event(&mut state, &SttEvent::Final { text: "one more thing".into() });
        assert_eq!(state.buffer, "one more thing");
        assert!(state.is_final);
    }

    #[test]
    fn final_replaces_when_new_piece_is_too_short() {
        let mut state = SttBufferState { buffer: "hello".into(), is_final: false };
        apply_event(&mut state, &SttEvent::Final { text: "hi".into() });
        assert_eq!(state.buffer, "hi");
        assert!(state.is_final);
    }

    #[test]
    fn interim_concatenates_short_fragments() {
        let mut state = SttBufferState::default();
        apply_event(&mut state, &SttEvent::Interim { text: "hello".into() });
        apply_event(&mut state, &SttEvent::Interim { text: "there friend".into() });
        assert_eq!(state.buffer, "hello there friend");
        assert!(!state.is_final);
    }

    #[test]
    fn interim_after_final_restarts_buffer() {
        let mut state = SttBufferState {
            buffer: "done.".into(),
            is_final: true,
        };
        apply_event(&mut state, &SttEvent::Interim { text: "next turn".into() });
        assert_eq!(state.buffer, "next turn");
        assert!(!state.is_final);
    }

    #[test]
    fn interim_after_terminal_punctuation_replaces_rather_than_appends() {
        let mut state = SttBufferState {
            buffer: "is that all?".into(),
            is_final: false,
        };
        apply_event(&mut state, &SttEvent::Interim { text: "actually one more thing".into() });
        assert_eq!(state.buffer, "actually one more thing");
    }

    #[test]
    fn reset_clears_buffer_and_final_flag() {
        let mut state = SttBufferState {
            buffer: "hi".into(),
            is_final: true,
        };
        reset(&mut state);
        assert_eq!(state.buffer, "");
        assert!(!state.is_final);
    }

    #[test]
    fn speech_lifecycle_events_do_not_touch_buffer() {
        let mut state = SttBufferState {
            buffer: "hi".into(),
            is_final: false,
        };
        apply_event(&mut state, &SttEvent::SpeechStarted);
        apply_event(&mut state, &SttEvent::UtteranceEnd);
        apply_event(&mut state, &SttEvent::Closed { reason: "x".into() });
        assert_eq!(state.buffer, "hi");
    }
}
