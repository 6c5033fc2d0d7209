//! The `ConversationStore` trait: the
//! narrow conversation/call-record persistence slice the pipeline writes
//! to, with a ScyllaDB-backed implementation and an in-memory one for
//! local development and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub role: String,
    pub text: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub call_id: String,
    pub agent_id: String,
    pub phone_number: String,
    pub status: String,
    pub transcript: Vec<TranscriptTurn>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub ended_reason: Option<String>,
    pub dynamic_variables: Vec<(String, String)>,
    pub recording_url: Option<String>,
    pub metadata: serde_json::Value,
}

/// Conversation/call-record persistence.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn start(
        &self,
        call_id: &str,
        agent_id: &str,
        phone_number: &str,
        dynamic_variables: &[(String, String)],
    ) -> Result<(), PersistenceError>;

    async fn append_turn(&self, call_id: &str, role: &str, text: &str) -> Result<(), PersistenceError>;

    async fn finish(&self, call_id: &str, status: &str, ended_reason: &str) -> Result<(), PersistenceError>;
}

#[derive(Clone)]
pub struct ScyllaConversationStore {
    client: ScyllaClient,
}

impl ScyllaConversationStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    async fn load_transcript(&self, call_id: &str) -> Result<(Vec<TranscriptTurn>, DateTime<Utc>), PersistenceError> {
        let query = format!(
            "SELECT transcript_json, started_at FROM {}.conversations WHERE call_id = ?",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (call_id,))
            .await?;

        let Some(rows) = result.rows else {
            return Err(PersistenceError::NotFound(call_id.to_string()));
        };
        let Some(row) = rows.into_iter().next() else {
            return Err(PersistenceError::NotFound(call_id.to_string()));
        };
        let (transcript_json, started_at_millis): (String, i64) = row
            .into_typed()
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        let transcript: Vec<TranscriptTurn> = serde_json::from_str(&transcript_json)
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
        let started_at = DateTime::from_timestamp_millis(started_at_millis)
            .unwrap_or_else(Utc::now);
        Ok((transcript, started_at))
    }
}

#[async_trait]
impl ConversationStore for ScyllaConversationStore {
    async fn start(
        &self,
        call_id: &str,
        agent_id: &str,
        phone_number: &str,
        dynamic_variables: &[(String, String)],
    ) -> Result<(), PersistenceError> {
        let dynamic_variables_json = serde_json::to_string(dynamic_variables)
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        let query = format!(
            "INSERT INTO {}.conversations (
                call_id, agent_id, phone_number, status, transcript_json,
                started_at, dynamic_variables_json, metadata_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    call_id,
                    agent_id,
                    phone_number,
                    "active",
                    "[]",
                    Utc::now().timestamp_millis(),
                    dynamic_variables_json,
                    "{}",
                ),
            )
            .await?;

        tracing::info!(call_id, agent_id, "conversation started");
        Ok(())
    }

    async fn append_turn(&self, call_id: &str, role: &str, text: &str) -> Result<(), PersistenceError> {
        let (mut transcript, _) = self.load_transcript(call_id).await?;
        transcript.push(TranscriptTurn {
            role: role.to_string(),
            text: text.to_string(),
            at: Utc::now(),
        });
        let transcript_json = serde_json::to_string(&transcript)
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        let query = format!(
            "UPDATE {}.conversations SET transcript_json = ? WHERE call_id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(query, (transcript_json, call_id))
            .await?;

        Ok(())
    }

    async fn finish(&self, call_id: &str, status: &str, ended_reason: &str) -> Result<(), PersistenceError> {
        let (_, started_at) = self.load_transcript(call_id).await?;
        let ended_at = Utc::now();
        let duration_secs = (ended_at - started_at).num_seconds();

        let query = format!(
            "UPDATE {}.conversations SET status = ?, ended_at = ?, duration_secs = ?, ended_reason = ? \
             WHERE call_id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                query,
                (status, ended_at.timestamp_millis(), duration_secs as i32, ended_reason, call_id),
            )
            .await?;

        tracing::info!(call_id, status, ended_reason, duration_secs, "conversation finished");
        Ok(())
    }
}

/// In-memory implementation for local development and tests
///.
#[derive(Default)]
pub struct InMemoryConversationStore {
    records: Mutex<HashMap<String, ConversationRecord>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, call_id: &str) -> Option<ConversationRecord> {
        self.records.lock().unwrap().get(call_id).cloned()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn start(
        &self,
        call_id: &str,
        agent_id: &str,
        phone_number: &str,
        dynamic_variables: &[(String, String)],
    ) -> Result<(), PersistenceError> {
        let record = ConversationRecord {
            call_id: call_id.to_string(),
            agent_id: agent_id.to_string(),
            phone_number: phone_number.to_string(),
            status: "active".to_string(),
            transcript: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
            duration_secs: None,
            ended_reason: None,
            dynamic_variables: dynamic_variables.to_vec(),
            recording_url: None,
            metadata: serde_json::Value::Object(Default::default()),
        };
        self.records.lock().unwrap().insert(call_id.to_string(), record);
        Ok(())
    }

    async fn append_turn(&self, call_id: &str, role: &str, text: &str) -> Result<(), PersistenceError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(call_id)
            .ok_or_else(|| PersistenceError::NotFound(call_id.to_string()))?;
        record.transcript.push(TranscriptTurn {
            role: role.to_string(),
            text: text.to_string(),
            at: Utc::now(),
        });
        Ok(())
    }

    async fn finish(&self, call_id: &str, status: &str, ended_reason: &str) -> Result<(), PersistenceError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(call_id)
            .ok_or_else(|| PersistenceError::NotFound(call_id.to_string()))?;
        let ended_at = Utc::now();
        record.status = status.to_string();
        record.duration_secs = Some((ended_at - record.started_at).num_seconds());
        record.ended_at = Some(ended_at);
        record.ended_reason = Some(ended_reason.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_round_trips_a_call() {
        let store = InMemoryConversationStore::new();
        store
            .start("call-1", "agent-1", "+15551234567", &[("name".to_string(), "Ana".to_string())])
            .await
            .unwrap();
        store.append_turn("call-1", "user", "hi there").await.unwrap();
        store.append_turn("call-1", "assistant", "hello!").await.unwrap();
        store.finish("call-1", "completed", "caller_hangup").await.unwrap();

        let record = store.get("call-1").unwrap();
        assert_eq!(record.transcript.len(), 2);
        assert_eq!(record.status, "completed");
        assert_eq!(record.ended_reason.as_deref(), Some("caller_hangup"));
        assert!(record.duration_secs.is_some());
    }

    #[tokio::test]
    async fn append_turn_on_unknown_call_errors() {
        let store = InMemoryConversationStore::new();
        let err = store.append_turn("missing", "user", "hi").await.unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound(_)));
    }
}
