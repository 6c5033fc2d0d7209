//! Persistence-layer error type, bridged into the shared taxonomy at the
//! crate boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("scylla connection error: {0}")]
    Connection(String),

    #[error("scylla schema error: {0}")]
    Schema(String),

    #[error("scylla query error: {0}")]
    Query(String),

    #[error("invalid row data: {0}")]
    InvalidData(String),

    #[error("call not found: {0}")]
    NotFound(String),
}

impl From<scylla::transport::errors::NewSessionError> for PersistenceError {
    fn from(err: scylla::transport::errors::NewSessionError) -> Self {
        PersistenceError::Connection(err.to_string())
    }
}

impl From<scylla::transport::errors::QueryError> for PersistenceError {
    fn from(err: scylla::transport::errors::QueryError) -> Self {
        PersistenceError::Query(err.to_string())
    }
}

impl From<PersistenceError> for voice_agent_core::Error {
    fn from(err: PersistenceError) -> Self {
        voice_agent_core::Error::TransientExternal(err.to_string())
    }
}
