//! Process entry point: load configuration, wire every concrete adapter,
//! and serve the telephony media WebSocket gateway until a shutdown signal
//! arrives.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use voice_agent_agent::{AgentRegistry, MediaSessionManager};
use voice_agent_config::Settings;
use voice_agent_core::{LlmStreamer, Retriever, SpeechToText, TextToSpeech};
use voice_agent_llm::{OllamaBackend, OllamaConfig};
use voice_agent_persistence::{
    ConversationStore, InMemoryConversationStore, ScyllaClient, ScyllaConfig, ScyllaConversationStore,
};
use voice_agent_pipeline::{DeepgramConfig, DeepgramStt, ElevenLabsConfig, ElevenLabsTts};
use voice_agent_rag::{Embedder, KnowledgeRetriever, VectorStore, GLOBAL_COLLECTION};
use voice_agent_tools::{TwilioConfig, TwilioTelephony, WebhookSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Arc::new(Settings::load()?);
    init_tracing(&settings);
    voice_agent_server::metrics::init_metrics();

    tracing::info!(environment = ?settings.environment, "starting voice-agent-server");

    let stt: Arc<dyn SpeechToText> = Arc::new(DeepgramStt::new(DeepgramConfig {
        endpoint: settings.stt.endpoint.clone(),
        api_key: settings.stt.api_key.clone(),
        connect_timeout: Duration::from_secs(10),
    }));

    let tts: Arc<dyn TextToSpeech> = Arc::new(ElevenLabsTts::new(ElevenLabsConfig {
        endpoint: settings.tts.endpoint.clone(),
        api_key: settings.tts.api_key.clone(),
        timeout: Duration::from_secs(30),
    }));

    let llm: Arc<dyn LlmStreamer> = Arc::new(OllamaBackend::new(OllamaConfig {
        endpoint: settings.llm.endpoint.clone(),
        timeout: Duration::from_secs(60),
    })?);

    let retriever: Arc<dyn Retriever> = Arc::new(build_retriever(&settings).await?);

    let store: Arc<dyn ConversationStore> = build_conversation_store(&settings).await;

    let telephony = Arc::new(TwilioTelephony::new(TwilioConfig {
        account_sid: settings.telephony.account_sid.clone(),
        auth_token: settings.telephony.auth_token.clone(),
        ..TwilioConfig::default()
    }));

    // The `tool.called` webhook fan-out list is part of the opaque
    // agents/webhooks CRUD surface; none configured by default.
    let webhook_subscribers: Vec<WebhookSubscriber> = Vec::new();
    let department_numbers: HashMap<String, String> = settings.telephony.department_numbers.clone();

    let manager = MediaSessionManager::new(
        stt,
        tts,
        llm,
        retriever,
        store,
        settings.clone(),
        telephony,
        webhook_subscribers,
        department_numbers,
    );

    let registry = Arc::new(AgentRegistry::load("config/agents.toml"));

    let state = voice_agent_server::AppState { settings: settings.clone(), manager, registry };
    let app = voice_agent_server::create_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid server.host/port: {e}"))?;

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn build_retriever(settings: &Settings) -> anyhow::Result<KnowledgeRetriever> {
    let store = VectorStore::connect(&settings.rag.vector_store_endpoint)
        .map_err(|e| anyhow::anyhow!("failed to connect to vector store: {e}"))?;
    if let Err(e) = store.ensure_collection(GLOBAL_COLLECTION, voice_agent_rag::embeddings::EMBEDDING_DIM as u64).await {
        tracing::warn!(error = %e, "failed to ensure global vector collection, continuing");
    }
    Ok(KnowledgeRetriever::new(Embedder::hashing(), store))
}

async fn build_conversation_store(settings: &Settings) -> Arc<dyn ConversationStore> {
    if !settings.environment.is_strict() {
        tracing::info!("development environment: using in-memory conversation store");
        return Arc::new(InMemoryConversationStore::new());
    }

    let config = ScyllaConfig {
        hosts: settings.persistence.scylla_hosts.clone(),
        keyspace: settings.persistence.keyspace.clone(),
        replication_factor: settings.persistence.replication_factor as u8,
    };

    match ScyllaClient::connect(config).await {
        Ok(client) => {
            if let Err(e) = client.ensure_schema().await {
                tracing::error!(error = %e, "failed to ensure persistence schema, falling back to in-memory store");
                return Arc::new(InMemoryConversationStore::new());
            }
            Arc::new(ScyllaConversationStore::new(client))
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to ScyllaDB, falling back to in-memory store");
            Arc::new(InMemoryConversationStore::new())
        }
    }
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    if settings.environment.is_strict() {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
