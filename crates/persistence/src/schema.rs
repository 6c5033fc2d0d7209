//! ScyllaDB schema creation for the `conversations` table. The wider agent/webhook/KB
//! schema is explicitly out of scope — this crate
//! only owns the slice the pipeline itself writes to.

use scylla::Session;

use crate::error::PersistenceError;

pub async fn create_keyspace(
    session: &Session,
    keyspace: &str,
    replication_factor: u8,
) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {keyspace} WITH replication = \
         {{'class': 'SimpleStrategy', 'replication_factor': {replication_factor}}}"
    );

    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("failed to create keyspace: {e}")))?;

    Ok(())
}

pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    let conversations_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {keyspace}.conversations (
            call_id TEXT,
            agent_id TEXT,
            phone_number TEXT,
            status TEXT,
            transcript_json TEXT,
            started_at TIMESTAMP,
            ended_at TIMESTAMP,
            duration_secs INT,
            ended_reason TEXT,
            dynamic_variables_json TEXT,
            recording_url TEXT,
            metadata_json TEXT,
            PRIMARY KEY (call_id)
        )
        "#
    );

    session
        .query_unpaged(conversations_table, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("failed to create conversations table: {e}")))?;

    tracing::info!("persistence tables created");
    Ok(())
}
