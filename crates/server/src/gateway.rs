//! The telephony media WebSocket gateway: Twilio Media Streams-compatible
//! JSON protocol. Consumes `start`/`media`/`stop`/`mark`, produces
//! `media`/`clear`/`heartbeat`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use voice_agent_agent::{GatewayFrame, MediaSession};
use voice_agent_core::SessionControl;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "event")]
#[serde(rename_all = "lowercase")]
enum StreamEvent {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },
    Start {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        start: StartMetadata,
    },
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: MediaPayload,
    },
    Mark {
        #[serde(rename = "streamSid")]
        #[allow(dead_code)]
        stream_sid: String,
    },
    Stop {
        #[serde(rename = "streamSid")]
        #[allow(dead_code)]
        stream_sid: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartMetadata {
    call_sid: String,
    #[serde(default)]
    #[allow(dead_code)]
    media_format: Option<MediaFormat>,
    /// Twilio's `<Parameter>` pass-through on the `<Stream>` verb; this is
    /// where a dialplan carries `agent_id` and any per-call dynamic
    /// variables for greeting substitution.
    #[serde(default, rename = "customParameters")]
    custom_parameters: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct MediaFormat {
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default, rename = "sampleRate")]
    sample_rate: Option<u32>,
    #[serde(default)]
    channels: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct MediaPayload {
    payload: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboundMedia<'a> {
    event: &'a str,
    stream_sid: &'a str,
    media: OutboundMediaPayload,
}

#[derive(Serialize)]
struct OutboundMediaPayload {
    payload: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboundClear<'a> {
    event: &'a str,
    stream_sid: &'a str,
}

pub async fn handle_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run(socket, state))
}

async fn run(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (ws_tx, mut ws_rx) = mpsc::channel::<GatewayFrame>(64);

    let mut call_id = String::new();
    let mut stream_sid = String::new();
    let mut session: Option<Arc<MediaSession>> = None;
    let mut barge_in_started_at: Option<Instant> = None;

    loop {
        tokio::select! {
            frame = ws_rx.recv() => {
                let Some(frame) = frame else { break };
                let outbound = match frame {
                    GatewayFrame::Media(bytes) => serde_json::to_string(&OutboundMedia {
                        event: "media",
                        stream_sid: &stream_sid,
                        media: OutboundMediaPayload { payload: BASE64.encode(bytes) },
                    }),
                    GatewayFrame::Clear => serde_json::to_string(&OutboundClear {
                        event: "clear",
                        stream_sid: &stream_sid,
                    }),
                    GatewayFrame::Heartbeat => serde_json::to_string(&serde_json::json!({
                        "event": "heartbeat",
                    })),
                };
                let Ok(text) = outbound else { continue };
                if ws_sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = ws_stream.next() => {
                let Some(incoming) = incoming else { break };
                let msg = match incoming {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };
                let event: StreamEvent = match serde_json::from_str(&msg) {
                    Ok(e) => e,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to parse media stream event");
                        continue;
                    }
                };

                match event {
                    StreamEvent::Connected { .. } => {}
                    StreamEvent::Start { stream_sid: sid, start } => {
                        stream_sid = sid.clone();
                        call_id = start.call_sid.clone();

                        let mut params = start.custom_parameters.unwrap_or_default();
                        let agent_id = params.remove("agent_id");
                        let dynamic_variables: Vec<(String, String)> = params.into_iter().collect();

                        let agent_config = state.registry.resolve(agent_id.as_deref());

                        match state
                            .manager
                            .create(call_id.clone(), agent_config, dynamic_variables, sid, ws_tx.clone())
                            .await
                        {
                            Ok(new_session) => {
                                let greet = new_session.clone();
                                tokio::spawn(async move {
                                    voice_agent_agent::speak_greeting(&greet).await;
                                });
                                session = Some(new_session);
                            }
                            Err(e) => {
                                tracing::error!(call_id, error = %e, "failed to create call session");
                                break;
                            }
                        }
                    }
                    StreamEvent::Media { media, .. } => {
                        let Some(session) = session.as_ref() else { continue };
                        let Ok(ulaw) = BASE64.decode(media.payload) else { continue };

                        let outcome = session.evaluate_barge_in(&ulaw);
                        if matches!(outcome, voice_agent_pipeline::BargeInOutcome::Interrupt) {
                            barge_in_started_at = Some(Instant::now());
                            session.latch_interrupt();
                            session.drain_tts_and_clear().await;
                            if let Some(started) = barge_in_started_at.take() {
                                metrics::histogram!("voice_agent_barge_in_to_clear_seconds")
                                    .record(started.elapsed().as_secs_f64());
                            }
                        }
                        session.forward_audio_to_stt(ulaw).await;
                    }
                    StreamEvent::Mark { .. } => {}
                    StreamEvent::Stop { .. } => break,
                }
            }
        }
    }

    if !call_id.is_empty() {
        if let Err(e) = state.manager.destroy(&call_id, "disconnect").await {
            tracing::warn!(call_id, error = %e, "session destroy on socket close failed");
        }
    }
}
