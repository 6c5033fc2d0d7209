//! Turn commit orchestration: decide when a caller's
//! utterance is complete, then run the goodbye fast-path, a pending-action
//! confirmation, or the full retrieve → generate → shape → speak path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use voice_agent_config::constants::{timeouts, turn as turn_cfg};
use voice_agent_core::{classify_intent, GenerateRequest, GenerationOptions, Intent};
use voice_agent_llm::{compose_prompt, parse_tool_calls, PromptContext};
use voice_agent_pipeline::turn_arbiter;
use voice_agent_tools::{resolve_tool_call, PendingAction, ToolAction, ToolState};

use crate::runtime::PipelineRuntime;
use crate::session::MediaSession;

const GOODBYE_SENTENCE: &str = "Thanks for your time. Have a great day.";
const CONFIRMATION_DECLINED_SENTENCE: &str = "Okay, no problem.";
const CONFIRMATION_UNCLEAR_SENTENCE: &str = "Sorry, was that a yes or a no?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Confirmation {
    Yes,
    No,
    Ambiguous,
}

fn classify_confirmation(text: &str) -> Confirmation {
    let lower = text.to_lowercase();
    let lower = lower.trim();
    const YES_WORDS: &[&str] = &["yes", "yeah", "yep", "sure", "go ahead", "please do", "confirm"];
    const NO_WORDS: &[&str] = &["no", "nope", "don't", "do not", "cancel", "never mind"];
    let is_yes = YES_WORDS.iter().any(|w| lower.contains(w));
    let is_no = NO_WORDS.iter().any(|w| lower.contains(w));
    match (is_yes, is_no) {
        (true, false) => Confirmation::Yes,
        (false, true) => Confirmation::No,
        _ => Confirmation::Ambiguous,
    }
}

/// Evaluate whether the current buffer should commit and, if so, spawn the
/// recheck-then-commit task. A no-op
/// if a commit is already in flight for this session.
pub fn maybe_commit_turn(session: Arc<MediaSession>, runtime: Arc<PipelineRuntime>) {
    if session.is_agent_speaking() {
        return;
    }
    if !turn_arbiter::should_commit(&session.turn_input(), Instant::now()) {
        return;
    }
    if !session.try_begin_turn() {
        return;
    }

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(turn_cfg::RECHECK_SLEEP_MS)).await;
        let still_due = turn_arbiter::should_commit(&session.turn_input(), Instant::now());
        if !still_due {
            session.end_turn();
            return;
        }
        commit_turn(&session, &runtime).await;
        session.end_turn();
    });
}

/// Commit the currently-buffered utterance.
pub async fn commit_turn(session: &Arc<MediaSession>, runtime: &Arc<PipelineRuntime>) {
    let utterance = session.take_utterance();
    if utterance.trim().is_empty() {
        return;
    }
    metrics::counter!(
        "voice_agent_turns_committed_total",
        "agent_id" => session.agent_config.agent_id.clone()
    )
    .increment(1);

    if let Some(pending) = session.take_pending_action() {
        handle_pending_confirmation(session, runtime, pending, &utterance).await;
        return;
    }

    let intent = classify_intent(&utterance);
    session.set_last_intent(intent);

    if intent == Intent::Goodbye {
        speak_one_sentence(session, GOODBYE_SENTENCE, true).await;
        persist_turn(session, runtime, &utterance, GOODBYE_SENTENCE).await;
        let result = runtime
            .tools
            .execute(&session.call_id, &ToolAction::EndCall { reason: "user_goodbye".to_string() })
            .await;
        if !result.success {
            tracing::warn!(call_id = %session.call_id, error = ?result.error, "end_call on goodbye failed");
        }
        return;
    }

    run_generation_turn(session, runtime, &utterance).await;
}

async fn handle_pending_confirmation(
    session: &Arc<MediaSession>,
    runtime: &Arc<PipelineRuntime>,
    pending: PendingAction,
    utterance: &str,
) {
    debug_assert_eq!(pending.state, ToolState::AwaitingConfirmation);

    match classify_confirmation(utterance) {
        Confirmation::Yes => {
            let result = runtime.tools.execute(&session.call_id, &pending.action).await;
            let reply = match (result.success, result.response) {
                (true, Some(response)) => response,
                (true, None) => "Done.".to_string(),
                (false, _) => "Sorry, I wasn't able to do that.".to_string(),
            };
            speak_one_sentence(session, &reply, true).await;
            persist_turn(session, runtime, utterance, &reply).await;
        }
        Confirmation::No => {
            speak_one_sentence(session, CONFIRMATION_DECLINED_SENTENCE, true).await;
            persist_turn(session, runtime, utterance, CONFIRMATION_DECLINED_SENTENCE).await;
        }
        Confirmation::Ambiguous => {
            session.set_pending_action(pending);
            speak_one_sentence(session, CONFIRMATION_UNCLEAR_SENTENCE, true).await;
            persist_turn(session, runtime, utterance, CONFIRMATION_UNCLEAR_SENTENCE).await;
        }
    }
}

async fn run_generation_turn(session: &Arc<MediaSession>, runtime: &Arc<PipelineRuntime>, utterance: &str) {
    let agent_id = &session.agent_config.agent_id;
    let top_k = runtime.settings.rag.top_k;
    let chunks = match runtime.retriever.retrieve(agent_id, utterance, top_k).await {
        Ok(chunks) => chunks,
        Err(e) => {
            metrics::counter!("voice_agent_transient_errors_total", "component" => "retrieval").increment(1);
            tracing::warn!(call_id = %session.call_id, error = %e, "retrieval failed, continuing without context");
            Vec::new()
        }
    };
    let retrieved_context = voice_agent_rag::format_context(&chunks);

    let history = session.history_snapshot();
    let history_formatted = history.format_recent_for_prompt();
    let call_phase = session.call_phase();
    let last_intent = session.last_intent();

    let prompt_ctx = PromptContext {
        system_prompt: &session.agent_config.system_prompt,
        call_phase: call_phase.as_str(),
        last_intent: last_intent.map(|i| match i {
            Intent::Goodbye => "goodbye",
            Intent::Question => "question",
        }),
        dynamic_variables: &session.dynamic_variables,
        retrieved_context: &retrieved_context,
        history_formatted: &history_formatted,
        user_utterance: utterance,
    };
    let prompt = compose_prompt(&prompt_ctx);

    let options = GenerationOptions {
        temperature: runtime.settings.llm.temperature,
        top_p: runtime.settings.llm.top_p,
        top_k: runtime.settings.llm.top_k,
        repeat_penalty: runtime.settings.llm.repeat_penalty,
        num_predict: runtime.settings.llm.num_predict,
        ..GenerationOptions::default()
    };
    let request = GenerateRequest { prompt, model: session.agent_config.model.clone(), options };

    let cancel = CancellationToken::new();
    session.register_turn_cancel(cancel.clone());

    let (tokens_tx, tokens_rx) = mpsc::channel(timeouts::TTS_TOKEN_CHANNEL_CAPACITY);
    let tts_tx = session.begin_turn_tts().await;

    let llm = runtime.llm.clone();
    let llm_cancel = cancel.clone();
    let llm_handle = tokio::spawn(async move { llm.generate_stream(request, tokens_tx, llm_cancel).await });

    let shape_result = voice_agent_pipeline::response_shaper::run(tokens_rx, tts_tx, cancel.clone()).await;
    if let Err(e) = shape_result {
        tracing::warn!(call_id = %session.call_id, error = %e, "response shaping failed");
    }

    let raw = match llm_handle.await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            metrics::counter!("voice_agent_transient_errors_total", "component" => "llm").increment(1);
            tracing::warn!(call_id = %session.call_id, error = %e, "generation failed");
            String::new()
        }
        Err(e) => {
            tracing::error!(call_id = %session.call_id, error = %e, "generation task panicked");
            String::new()
        }
    };
    session.clear_turn_cancel();

    let (cleaned, calls) = parse_tool_calls(&raw);

    if let Some(call) = calls.first() {
        if let Some(resolved) = resolve_tool_call(call, &session.agent_config.tools) {
            if resolved.requires_confirmation {
                session.set_pending_action(PendingAction::new(resolved.action, true));
            } else {
                let runtime = runtime.clone();
                let call_id = session.call_id.clone();
                tokio::spawn(async move {
                    let result = runtime.tools.execute(&call_id, &resolved.action).await;
                    if !result.success {
                        tracing::warn!(call_id, error = ?result.error, "tool execution failed");
                    }
                });
            }
        }
    }

    session.record_turn(utterance, &cleaned);
    persist_turn(session, runtime, utterance, &cleaned).await;
}

/// Speak the agent's configured greeting with dynamic variables substituted,
/// as a single TTS sentence. Called once, right after a call's session is
/// created.
pub async fn speak_greeting(session: &Arc<MediaSession>) {
    let greeting = session.agent_config.render_greeting(&session.dynamic_variables);
    speak_one_sentence(session, &greeting, true).await;
}

async fn speak_one_sentence(session: &Arc<MediaSession>, text: &str, is_last: bool) {
    let tx = session.begin_turn_tts().await;
    let _ = tx
        .send(voice_agent_pipeline::TtsQueueItem::Sentence { text: text.to_string(), is_last })
        .await;
}

async fn persist_turn(session: &Arc<MediaSession>, runtime: &Arc<PipelineRuntime>, user: &str, assistant: &str) {
    if let Err(e) = runtime.store.append_turn(&session.call_id, "user", user).await {
        tracing::warn!(call_id = %session.call_id, error = %e, "persisting user turn failed");
    }
    if let Err(e) = runtime.store.append_turn(&session.call_id, "assistant", assistant).await {
        tracing::warn!(call_id = %session.call_id, error = %e, "persisting assistant turn failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use tokio::sync::mpsc as tmpsc;

    use voice_agent_core::{
        Error as CoreError, LlmStreamer, Retriever, RetrievedChunk, SessionControl, SpeechToText,
        SttConnection, SttSessionConfig, TextToSpeech, TtsChunk,
    };
    use voice_agent_persistence::{ConversationStore, PersistenceError};
    use voice_agent_tools::{TelephonyControl, ToolError, ToolExecutor, WebhookSubscriber};

    use crate::config::AgentConfig;

    struct UnusedStt;
    #[async_trait]
    impl SpeechToText for UnusedStt {
        async fn connect(&self, _c: SttSessionConfig) -> Result<Box<dyn SttConnection>, CoreError> {
            unreachable!("goodbye fast-path never opens an stt connection")
        }
    }

    struct UnusedTts;
    #[async_trait]
    impl TextToSpeech for UnusedTts {
        async fn synthesize(
            &self,
            _text: &str,
            _voice: &str,
        ) -> Result<futures::stream::BoxStream<'static, Result<TtsChunk, CoreError>>, CoreError> {
            unreachable!("commit_turn only enqueues text, the sink task consumes it")
        }
    }

    struct UnusedLlm;
    #[async_trait]
    impl LlmStreamer for UnusedLlm {
        async fn generate_stream(
            &self,
            _r: voice_agent_core::GenerateRequest,
            _tokens: tmpsc::Sender<String>,
            _cancel: CancellationToken,
        ) -> Result<String, CoreError> {
            unreachable!("goodbye fast-path never calls the llm")
        }
    }

    struct EmptyRetriever;
    #[async_trait]
    impl Retriever for EmptyRetriever {
        async fn retrieve(&self, _a: &str, _q: &str, _k: usize) -> Result<Vec<RetrievedChunk>, CoreError> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        turns: std::sync::Mutex<Vec<(String, String)>>,
    }
    #[async_trait]
    impl ConversationStore for RecordingStore {
        async fn start(&self, _c: &str, _a: &str, _p: &str, _v: &[(String, String)]) -> Result<(), PersistenceError> {
            Ok(())
        }
        async fn append_turn(&self, _c: &str, role: &str, text: &str) -> Result<(), PersistenceError> {
            self.turns.lock().unwrap().push((role.to_string(), text.to_string()));
            Ok(())
        }
        async fn finish(&self, _c: &str, _s: &str, _r: &str) -> Result<(), PersistenceError> {
            Ok(())
        }
    }

    struct FakeTelephony {
        marked_completed: Arc<AtomicBool>,
    }
    #[async_trait]
    impl TelephonyControl for FakeTelephony {
        async fn mark_completed(&self, _call_id: &str) -> Result<(), ToolError> {
            self.marked_completed.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn dial_transfer(&self, _call_id: &str, _number: &str) -> Result<(), ToolError> {
            Ok(())
        }
    }

    struct NoopSession;
    #[async_trait]
    impl SessionControl for NoopSession {
        async fn latch_interrupt(&self, _c: &str) -> Result<(), CoreError> {
            Ok(())
        }
        async fn drain_tts_and_clear(&self, _c: &str) -> Result<(), CoreError> {
            Ok(())
        }
        async fn destroy(&self, _c: &str, _reason: &str) -> Result<(), CoreError> {
            Ok(())
        }
    }

    fn test_session() -> Arc<MediaSession> {
        let config = AgentConfig {
            agent_id: "agent-1".into(),
            system_prompt: "Be helpful.".into(),
            greeting: "Hi".into(),
            voice_id: "default".into(),
            model: "test-model".into(),
            silence_threshold_sec: 0.8,
            interrupt_enabled: true,
            tools: vec![],
        };
        let (ws_tx, _ws_rx) = tmpsc::channel(8);
        let (outer_tx, _outer_rx) = tmpsc::channel(8);
        let (audio_tx, _audio_rx) = tmpsc::channel(8);
        Arc::new(MediaSession::new(
            "call-1".into(),
            config,
            vec![],
            "stream-1".into(),
            ws_tx,
            outer_tx,
            audio_tx,
        ))
    }

    fn test_runtime(store: Arc<RecordingStore>, marked_completed: Arc<AtomicBool>) -> Arc<PipelineRuntime> {
        let telephony: Arc<dyn TelephonyControl> = Arc::new(FakeTelephony { marked_completed });
        let session_control: Arc<dyn SessionControl> = Arc::new(NoopSession);
        let tools = Arc::new(ToolExecutor::new(
            telephony,
            session_control,
            Vec::<WebhookSubscriber>::new(),
            HashMap::new(),
        ));
        Arc::new(PipelineRuntime::new(
            Arc::new(UnusedStt),
            Arc::new(UnusedTts),
            Arc::new(UnusedLlm),
            Arc::new(EmptyRetriever),
            tools,
            store,
            Arc::new(voice_agent_config::Settings::default()),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_s4_goodbye_utterance_ends_the_call() {
        let store = Arc::new(RecordingStore::default());
        let marked_completed = Arc::new(AtomicBool::new(false));
        let runtime = test_runtime(store.clone(), marked_completed.clone());
        let session = test_session();

        session.on_stt_event(&voice_agent_core::SttEvent::Final { text: "okay, goodbye".into() });

        commit_turn(&session, &runtime).await;

        assert!(marked_completed.load(Ordering::SeqCst));
        let turns = store.turns.lock().unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], ("user".to_string(), "okay, goodbye".to_string()));
        assert_eq!(turns[1].0, "assistant");
        assert_eq!(turns[1].1, GOODBYE_SENTENCE);
        assert_eq!(session.last_intent(), Some(Intent::Goodbye));
    }

    #[test]
    fn confirmation_words_classify_correctly() {
        assert_eq!(classify_confirmation("yes please"), Confirmation::Yes);
        assert_eq!(classify_confirmation("no, don't do that"), Confirmation::No);
        assert_eq!(classify_confirmation("maybe later"), Confirmation::Ambiguous);
    }
}
