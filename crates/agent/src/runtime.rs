//! `PipelineRuntime`: the process-wide, explicitly-constructed collaborators
//! every call's pipeline is built from.

use std::sync::Arc;

use voice_agent_config::Settings;
use voice_agent_core::{LlmStreamer, Retriever, SpeechToText, TextToSpeech};
use voice_agent_persistence::ConversationStore;
use voice_agent_tools::ToolExecutor;

/// Everything a [`crate::manager::MediaSessionManager`] needs to wire up a
/// call's pipeline, constructed once in `main` and shared via `Arc` across
/// every live session.
pub struct PipelineRuntime {
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
    pub llm: Arc<dyn LlmStreamer>,
    pub retriever: Arc<dyn Retriever>,
    pub tools: Arc<ToolExecutor>,
    pub store: Arc<dyn ConversationStore>,
    pub settings: Arc<Settings>,
}

impl PipelineRuntime {
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        tts: Arc<dyn TextToSpeech>,
        llm: Arc<dyn LlmStreamer>,
        retriever: Arc<dyn Retriever>,
        tools: Arc<ToolExecutor>,
        store: Arc<dyn ConversationStore>,
        settings: Arc<Settings>,
    ) -> Self {
        Self { stt, tts, llm, retriever, tools, store, settings }
    }
}
