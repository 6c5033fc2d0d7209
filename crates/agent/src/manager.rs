//! `MediaSessionManager`: owns every live call's [`MediaSession`], keyed by
//! `call_id`.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use voice_agent_config::constants::timeouts;
use voice_agent_core::{Error as CoreError, SessionControl};
use voice_agent_tools::{ToolExecutor, WebhookSubscriber};

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::runtime::PipelineRuntime;
use crate::session::{GatewayFrame, MediaSession};
use crate::turn;

/// Implements [`SessionControl`] over a weak back-reference so the manager
/// can hand `Arc<dyn SessionControl>` to a [`ToolExecutor`] it owns without
/// a reference cycle.
struct ManagerHandle {
    manager: Weak<MediaSessionManager>,
}

#[async_trait]
impl SessionControl for ManagerHandle {
    async fn latch_interrupt(&self, call_id: &str) -> Result<(), CoreError> {
        let manager = self.manager.upgrade().ok_or_else(|| {
            CoreError::SessionLifecycle("session manager dropped".to_string())
        })?;
        manager.latch_interrupt(call_id).await
    }

    async fn drain_tts_and_clear(&self, call_id: &str) -> Result<(), CoreError> {
        let manager = self.manager.upgrade().ok_or_else(|| {
            CoreError::SessionLifecycle("session manager dropped".to_string())
        })?;
        manager.drain_tts_and_clear(call_id).await
    }

    async fn destroy(&self, call_id: &str, reason: &str) -> Result<(), CoreError> {
        let manager = self.manager.upgrade().ok_or_else(|| {
            CoreError::SessionLifecycle("session manager dropped".to_string())
        })?;
        manager.destroy(call_id, reason).await
    }
}

pub struct MediaSessionManager {
    sessions: RwLock<HashMap<String, Arc<MediaSession>>>,
    runtime: Arc<PipelineRuntime>,
}

impl MediaSessionManager {
    /// Build the manager together with the [`ToolExecutor`]/[`PipelineRuntime`]
    /// it needs, breaking the `ToolExecutor -> SessionControl -> manager`
    /// cycle via [`Arc::new_cyclic`].
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stt: Arc<dyn voice_agent_core::SpeechToText>,
        tts: Arc<dyn voice_agent_core::TextToSpeech>,
        llm: Arc<dyn voice_agent_core::LlmStreamer>,
        retriever: Arc<dyn voice_agent_core::Retriever>,
        store: Arc<dyn voice_agent_persistence::ConversationStore>,
        settings: Arc<voice_agent_config::Settings>,
        telephony: Arc<dyn voice_agent_tools::TelephonyControl>,
        webhook_subscribers: Vec<WebhookSubscriber>,
        department_numbers: HashMap<String, String>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let handle: Arc<dyn SessionControl> = Arc::new(ManagerHandle { manager: weak.clone() });
            let tools = Arc::new(ToolExecutor::new(telephony, handle, webhook_subscribers, department_numbers));
            let runtime = Arc::new(PipelineRuntime::new(stt, tts, llm, retriever, tools, store, settings));
            Self {
                sessions: RwLock::new(HashMap::new()),
                runtime,
            }
        })
    }

    pub fn runtime(&self) -> &Arc<PipelineRuntime> {
        &self.runtime
    }

    pub fn get(&self, call_id: &str) -> Option<Arc<MediaSession>> {
        self.sessions.read().get(call_id).cloned()
    }

    /// Create a new call's session and spawn its three long-lived tasks: the
    /// STT reader, the TTS sink, and the heartbeat ticker.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        self: &Arc<Self>,
        call_id: String,
        agent_config: AgentConfig,
        dynamic_variables: Vec<(String, String)>,
        stream_id: String,
        ws_outbound: mpsc::Sender<GatewayFrame>,
    ) -> Result<Arc<MediaSession>, AgentError> {
        if self.sessions.read().contains_key(&call_id) {
            return Err(AgentError::AlreadyExists(call_id));
        }

        let (outer_tts_tx, outer_tts_rx) = mpsc::channel(4);
        let (stt_audio_tx, stt_audio_rx) = mpsc::channel(64);

        let session = Arc::new(MediaSession::new(
            call_id.clone(),
            agent_config,
            dynamic_variables,
            stream_id,
            ws_outbound,
            outer_tts_tx,
            stt_audio_tx,
        ));

        if let Err(e) = self
            .runtime
            .store
            .start(&session.call_id, &session.agent_config.agent_id, "", &session.dynamic_variables)
            .await
        {
            tracing::warn!(call_id = %session.call_id, error = %e, "conversation store start failed");
        }

        self.sessions.write().insert(call_id.clone(), session.clone());

        session.push_handle(spawn_tts_sink(session.clone(), self.runtime.clone(), outer_tts_rx));
        session.push_handle(spawn_stt_reader(session.clone(), self.runtime.clone(), stt_audio_rx));
        session.push_handle(spawn_heartbeat(session.clone()));

        Ok(session)
    }

    pub async fn remove(&self, call_id: &str) -> Option<Arc<MediaSession>> {
        self.sessions.write().remove(call_id)
    }
}

#[async_trait]
impl SessionControl for MediaSessionManager {
    async fn latch_interrupt(&self, call_id: &str) -> Result<(), CoreError> {
        let session = self
            .get(call_id)
            .ok_or_else(|| CoreError::SessionLifecycle(format!("no such session: {call_id}")))?;
        session.latch_interrupt();
        Ok(())
    }

    async fn drain_tts_and_clear(&self, call_id: &str) -> Result<(), CoreError> {
        let session = self
            .get(call_id)
            .ok_or_else(|| CoreError::SessionLifecycle(format!("no such session: {call_id}")))?;
        session.drain_tts_and_clear().await;
        Ok(())
    }

    async fn destroy(&self, call_id: &str, reason: &str) -> Result<(), CoreError> {
        let Some(session) = self.remove(call_id).await else {
            return Ok(());
        };
        session.call_cancel.cancel();

        let handles = session.take_handles();
        let join_all = futures::future::join_all(handles);
        if tokio::time::timeout(timeouts::SESSION_TEARDOWN, join_all).await.is_err() {
            tracing::warn!(call_id, "session teardown exceeded timeout; tasks abandoned");
        }

        if let Err(e) = self.runtime.store.finish(call_id, "completed", reason).await {
            tracing::warn!(call_id, error = %e, "conversation store finish failed");
        }
        Ok(())
    }
}

fn spawn_tts_sink(
    session: Arc<MediaSession>,
    runtime: Arc<PipelineRuntime>,
    mut outer_rx: mpsc::Receiver<mpsc::Receiver<voice_agent_pipeline::TtsQueueItem>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let sink = crate::media_sink::SessionMediaSink::new(session.clone());
        loop {
            tokio::select! {
                _ = session.call_cancel.cancelled() => return,
                turn_rx = outer_rx.recv() => {
                    let Some(turn_rx) = turn_rx else { return };
                    let voice = session.agent_config.voice_id.clone();
                    let mut resampler = session.resampler_state.lock().await;
                    let result = voice_agent_pipeline::tts::run(
                        turn_rx,
                        runtime.tts.as_ref(),
                        &sink,
                        &voice,
                        &mut *resampler,
                    )
                    .await;
                    drop(resampler);
                    if let Err(e) = result {
                        metrics::counter!("voice_agent_transient_errors_total", "component" => "tts").increment(1);
                        tracing::warn!(call_id = %session.call_id, error = %e, "tts sink failed");
                    }
                }
            }
        }
    })
}

fn spawn_stt_reader(
    session: Arc<MediaSession>,
    runtime: Arc<PipelineRuntime>,
    mut audio_rx: mpsc::Receiver<Vec<u8>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let stt_config = voice_agent_core::SttSessionConfig {
            model: runtime.settings.stt.model.clone(),
            fallback_model: Some(runtime.settings.stt.fallback_model.clone()),
            sample_rate_hz: voice_agent_config::constants::audio::TELEPHONY_SAMPLE_RATE_HZ,
            encoding: "mulaw",
            interim_results: true,
            vad_events: true,
            endpointing_ms: voice_agent_config::constants::turn::utterance_end_ms(
                session.agent_config.silence_threshold_sec,
            ),
        };

        let mut conn = match runtime.stt.connect(stt_config).await {
            Ok(conn) => conn,
            Err(e) => {
                metrics::counter!("voice_agent_transient_errors_total", "component" => "stt").increment(1);
                tracing::error!(call_id = %session.call_id, error = %e, "stt connect failed");
                return;
            }
        };

        let mut tick = tokio::time::interval(std::time::Duration::from_millis(200));
        loop {
            tokio::select! {
                _ = session.call_cancel.cancelled() => {
                    conn.close().await;
                    return;
                }
                frame = audio_rx.recv() => {
                    let Some(frame) = frame else {
                        conn.close().await;
                        return;
                    };
                    if let Err(e) = conn.send_audio(&frame).await {
                        metrics::counter!("voice_agent_transient_errors_total", "component" => "stt").increment(1);
                        tracing::warn!(call_id = %session.call_id, error = %e, "stt send_audio failed");
                    }
                }
                event = conn.events().recv() => {
                    let Some(event) = event else {
                        tracing::warn!(call_id = %session.call_id, "stt event stream closed");
                        return;
                    };
                    session.on_stt_event(&event);
                    turn::maybe_commit_turn(session.clone(), runtime.clone());
                }
                _ = tick.tick() => {
                    turn::maybe_commit_turn(session.clone(), runtime.clone());
                }
            }
        }
    })
}

fn spawn_heartbeat(session: Arc<MediaSession>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(timeouts::HEARTBEAT_INTERVAL);
        loop {
            tokio::select! {
                _ = session.call_cancel.cancelled() => return,
                _ = tick.tick() => {
                    if session.ws_outbound.send(GatewayFrame::Heartbeat).await.is_err() {
                        return;
                    }
                }
            }
        }
    })
}
