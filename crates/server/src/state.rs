//! Shared application state handed to every Axum handler.

use std::sync::Arc;

use voice_agent_agent::{AgentRegistry, MediaSessionManager};
use voice_agent_config::Settings;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub manager: Arc<MediaSessionManager>,
    pub registry: Arc<AgentRegistry>,
}
