//! `MediaSession`: the per-call state object. Owns everything
//! a live call's pipeline needs to coordinate streaming speech-in, barge-in
//! detection, turn-taking and TTS egress, and exposes only narrow,
//! lock-scoped accessors so no task ever holds a lock across an `.await`
//! except where the pipeline genuinely requires it (the resampler state
//! during the TTS sink's streaming loop).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use voice_agent_config::constants::{timeouts, turn as turn_cfg};
use voice_agent_core::audio::{self, FRAME_BYTES};
use voice_agent_core::{CallPhase, ConversationHistory, Intent, SttEvent};
use voice_agent_pipeline::{BargeInConfig, BargeInOutcome, BargeInState, SttBufferState, TurnInput};
use voice_agent_tools::PendingAction;

use crate::config::AgentConfig;

/// One outbound unit for the gateway writer task to frame and send
///: a media frame, a playout-clear, or a keep-alive.
#[derive(Debug, Clone)]
pub enum GatewayFrame {
    Media([u8; FRAME_BYTES]),
    Clear,
    Heartbeat,
}

pub struct MediaSession {
    pub call_id: String,
    pub agent_config: AgentConfig,
    pub dynamic_variables: Vec<(String, String)>,

    stream_id: RwLock<String>,
    conversation_history: Mutex<ConversationHistory>,
    stt_buffer: Mutex<SttBufferState>,
    last_speech_time: Mutex<Option<Instant>>,
    last_interim_time: Mutex<Option<Instant>>,
    pub(crate) agent_speaking: AtomicBool,
    pub(crate) interrupt_requested: AtomicBool,
    turn_in_progress: AtomicBool,
    turns_committed: AtomicUsize,
    call_phase: Mutex<CallPhase>,
    last_intent: Mutex<Option<Intent>>,
    pending_action: Mutex<Option<PendingAction>>,

    barge_in_config: BargeInConfig,
    barge_in_state: Mutex<BargeInState>,

    pub resampler_state: tokio::sync::Mutex<audio::ResamplerState>,

    current_turn_cancel: Mutex<Option<CancellationToken>>,
    tts_turn_tx: Mutex<Option<mpsc::Sender<voice_agent_pipeline::TtsQueueItem>>>,
    outer_tts_tx: mpsc::Sender<mpsc::Receiver<voice_agent_pipeline::TtsQueueItem>>,

    stt_audio_tx: mpsc::Sender<Vec<u8>>,
    pub(crate) ws_outbound: mpsc::Sender<GatewayFrame>,

    pub call_cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl MediaSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        call_id: String,
        agent_config: AgentConfig,
        dynamic_variables: Vec<(String, String)>,
        stream_id: String,
        ws_outbound: mpsc::Sender<GatewayFrame>,
        outer_tts_tx: mpsc::Sender<mpsc::Receiver<voice_agent_pipeline::TtsQueueItem>>,
        stt_audio_tx: mpsc::Sender<Vec<u8>>,
    ) -> Self {
        let barge_in_config = BargeInConfig::default();
        Self {
            call_id,
            agent_config,
            dynamic_variables,
            stream_id: RwLock::new(stream_id),
            conversation_history: Mutex::new(ConversationHistory::new()),
            stt_buffer: Mutex::new(SttBufferState::default()),
            last_speech_time: Mutex::new(None),
            last_interim_time: Mutex::new(None),
            agent_speaking: AtomicBool::new(false),
            interrupt_requested: AtomicBool::new(false),
            turn_in_progress: AtomicBool::new(false),
            turns_committed: AtomicUsize::new(0),
            call_phase: Mutex::new(CallPhase::CallStart),
            last_intent: Mutex::new(None),
            pending_action: Mutex::new(None),
            barge_in_config,
            barge_in_state: Mutex::new(BargeInState::default()),
            resampler_state: tokio::sync::Mutex::new(audio::ResamplerState::default()),
            current_turn_cancel: Mutex::new(None),
            tts_turn_tx: Mutex::new(None),
            outer_tts_tx,
            stt_audio_tx,
            ws_outbound,
            call_cancel: CancellationToken::new(),
            task_handles: Mutex::new(Vec::new()),
        }
    }

    pub fn current_stream_id(&self) -> String {
        self.stream_id.read().clone()
    }

    pub fn set_stream_id(&self, stream_id: String) {
        *self.stream_id.write() = stream_id;
    }

    pub(crate) fn push_handle(&self, handle: JoinHandle<()>) {
        self.task_handles.lock().push(handle);
    }

    pub(crate) fn take_handles(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut self.task_handles.lock())
    }

    /// Forward one ingress μ-law frame to the STT adapter;
    /// called from the gateway's WS-reader loop in `voice-agent-server`.
    pub async fn forward_audio_to_stt(&self, ulaw_frame: Vec<u8>) {
        let _ = self.stt_audio_tx.send(ulaw_frame).await;
    }

    /// Evaluate one ingress frame against the barge-in detector.
    pub fn evaluate_barge_in(&self, ulaw_frame: &[u8]) -> BargeInOutcome {
        let pcm = audio::ulaw_to_pcm16(ulaw_frame);
        let energy = audio::rms(&pcm);
        let mut state = self.barge_in_state.lock();
        let outcome = voice_agent_pipeline::barge_in::evaluate(
            &self.barge_in_config,
            &mut state,
            energy,
            self.agent_speaking.load(Ordering::Acquire),
            self.interrupt_requested.load(Ordering::Acquire),
            Instant::now(),
        );
        if matches!(outcome, BargeInOutcome::Interrupt) {
            metrics::counter!(
                "voice_agent_barge_ins_total",
                "agent_id" => self.agent_config.agent_id.clone()
            )
            .increment(1);
        }
        outcome
    }

    /// Apply one STT event to the session's transcript buffer and timing
    /// state. `stt_buffer` is written only from here, the STT reader task's
    /// single caller.
    pub fn on_stt_event(&self, event: &SttEvent) {
        let now = Instant::now();
        match event {
            SttEvent::Interim { .. } => {
                *self.last_interim_time.lock() = Some(now);
                *self.last_speech_time.lock() = Some(now);
            }
            SttEvent::Final { .. } => {
                *self.last_interim_time.lock() = Some(now);
                *self.last_speech_time.lock() = Some(now);
            }
            SttEvent::SpeechStarted => {}
            SttEvent::UtteranceEnd => {
                *self.last_speech_time.lock() = Some(now);
            }
            SttEvent::Closed { reason } => {
                tracing::warn!(call_id = %self.call_id, reason, "stt connection closed");
            }
        }
        let mut buffer = self.stt_buffer.lock();
        voice_agent_pipeline::stt::apply_event(&mut buffer, event);
    }

    pub fn turn_input(&self) -> TurnInput {
        let buffer = self.stt_buffer.lock();
        TurnInput {
            buffer: buffer.buffer.clone(),
            is_final: buffer.is_final,
            last_speech_time: *self.last_speech_time.lock(),
            last_interim_time: *self.last_interim_time.lock(),
            silence_threshold: turn_cfg::silence_threshold(self.agent_config.silence_threshold_sec),
        }
    }

    pub fn is_agent_speaking(&self) -> bool {
        self.agent_speaking.load(Ordering::Acquire)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt_requested.load(Ordering::Acquire)
    }

    /// Begin a turn's commit, preventing a second concurrent commit. Returns
    /// `false` if a commit is already underway.
    pub fn try_begin_turn(&self) -> bool {
        self.turn_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end_turn(&self) {
        self.turn_in_progress.store(false, Ordering::Release);
    }

    /// Take and clear the accumulated transcript buffer at turn commit
    ///.
    pub fn take_utterance(&self) -> String {
        let mut buffer = self.stt_buffer.lock();
        let text = buffer.buffer.clone();
        voice_agent_pipeline::stt::reset(&mut buffer);
        *self.last_interim_time.lock() = None;
        text
    }

    pub fn register_turn_cancel(&self, cancel: CancellationToken) {
        *self.current_turn_cancel.lock() = Some(cancel);
    }

    pub fn clear_turn_cancel(&self) {
        *self.current_turn_cancel.lock() = None;
    }

    /// Set the one-shot interrupt latch and cancel the in-flight turn's
    /// generation/shaping.
    pub fn latch_interrupt(&self) {
        let already = self.interrupt_requested.swap(true, Ordering::AcqRel);
        if already {
            return;
        }
        self.agent_speaking.store(false, Ordering::Release);
        if let Some(cancel) = self.current_turn_cancel.lock().take() {
            cancel.cancel();
        }
    }

    /// Drain the TTS queue, flush the gateway's playout buffer, and reset
    /// speech state. `interrupt_requested` is cleared only once this
    /// completes.
    pub async fn drain_tts_and_clear(&self) {
        let _ = self.ws_outbound.send(GatewayFrame::Clear).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = self.ws_outbound.send(GatewayFrame::Clear).await;

        // Dropping the sender side of the current turn's channel causes the
        // receiver the sink task is iterating to end, discarding whatever was
        // still queued.
        *self.tts_turn_tx.lock() = None;

        {
            let mut buffer = self.stt_buffer.lock();
            voice_agent_pipeline::stt::reset(&mut buffer);
        }
        *self.last_interim_time.lock() = None;
        *self.last_speech_time.lock() = Some(Instant::now());
        self.interrupt_requested.store(false, Ordering::Release);
    }

    /// Open a fresh per-turn TTS channel: the returned sender feeds the
    /// response shaper's output, the paired receiver is handed to the
    /// long-lived sink task over `outer_tts_tx`.
    pub async fn begin_turn_tts(&self) -> mpsc::Sender<voice_agent_pipeline::TtsQueueItem> {
        let (tx, rx) = mpsc::channel(timeouts::TTS_QUEUE_CAPACITY);
        *self.tts_turn_tx.lock() = Some(tx.clone());
        let _ = self.outer_tts_tx.send(rx).await;
        tx
    }

    pub fn history_snapshot(&self) -> ConversationHistory {
        self.conversation_history.lock().clone()
    }

    /// Append a committed turn to the rolling history, bounded to 10 entries
    ///.
    pub fn record_turn(&self, user: impl Into<String>, assistant: impl Into<String>) {
        self.conversation_history.lock().push(user, assistant);
        let committed = self.turns_committed.fetch_add(1, Ordering::AcqRel) + 1;
        let mut phase = self.call_phase.lock();
        *phase = phase.advance(committed);
    }

    pub fn call_phase(&self) -> CallPhase {
        *self.call_phase.lock()
    }

    pub fn set_last_intent(&self, intent: Intent) {
        *self.last_intent.lock() = Some(intent);
    }

    pub fn last_intent(&self) -> Option<Intent> {
        *self.last_intent.lock()
    }

    pub fn take_pending_action(&self) -> Option<PendingAction> {
        self.pending_action.lock().take()
    }

    pub fn set_pending_action(&self, action: PendingAction) {
        *self.pending_action.lock() = Some(action);
    }

    pub fn has_pending_action(&self) -> bool {
        self.pending_action.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> MediaSession {
        let config = AgentConfig {
            agent_id: "agent-1".into(),
            system_prompt: String::new(),
            greeting: String::new(),
            voice_id: "default".into(),
            model: "test-model".into(),
            silence_threshold_sec: 0.8,
            interrupt_enabled: true,
            tools: vec![],
        };
        let (ws_tx, _ws_rx) = mpsc::channel(8);
        let (outer_tx, _outer_rx) = mpsc::channel(8);
        let (audio_tx, _audio_rx) = mpsc::channel(8);
        MediaSession::new(
            "call-1".into(),
            config,
            vec![],
            "stream-1".into(),
            ws_tx,
            outer_tx,
            audio_tx,
        )
    }

    #[test]
    fn invariant_3_conversation_history_never_exceeds_bound() {
        let session = session();
        for i in 0..25 {
            session.record_turn(format!("u{i}"), format!("a{i}"));
        }
        assert!(session.history_snapshot().len() <= 10);
    }

    #[test]
    fn call_phase_advances_as_turns_commit() {
        let session = session();
        assert_eq!(session.call_phase(), CallPhase::CallStart);
        session.record_turn("hi", "hello");
        assert_eq!(session.call_phase(), CallPhase::Discovery);
        session.record_turn("bye", "goodbye");
        assert_eq!(session.call_phase(), CallPhase::Active);
    }

    #[test]
    fn latch_interrupt_is_idempotent_and_clears_agent_speaking() {
        let session = session();
        session.agent_speaking.store(true, Ordering::Release);
        session.latch_interrupt();
        assert!(session.is_interrupted());
        assert!(!session.is_agent_speaking());
        // A second latch while still interrupted is a no-op, not a panic.
        session.latch_interrupt();
        assert!(session.is_interrupted());
    }

    #[tokio::test]
    async fn drain_tts_and_clear_resets_interrupt_latch() {
        let session = session();
        session.latch_interrupt();
        session.drain_tts_and_clear().await;
        assert!(!session.is_interrupted());
    }

    #[test]
    fn try_begin_turn_prevents_concurrent_commits() {
        let session = session();
        assert!(session.try_begin_turn());
        assert!(!session.try_begin_turn());
        session.end_turn();
        assert!(session.try_begin_turn());
    }
}
