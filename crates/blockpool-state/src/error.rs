//! Error types for the blockpool state store.

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

/// Failures surfaced by redb or by record (de)serialization.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open state store: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("failed to encode record: {0}")]
    Serialize(String),

    #[error("failed to decode record: {0}")]
    Deserialize(String),
}
