//! Error types for metrics storage and ingest.

use pulse_proto::ProtoError;
use thiserror::Error;

/// Errors that can occur in a metrics store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred in the file backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A database query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A gauge value was NaN or infinite.
    #[error("gauge {0} is not finite")]
    NonFiniteGauge(String),

    /// The store could not be set up from its configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while accepting a delivered batch.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The payload digest did not match the shared key.
    #[error("payload digest mismatch")]
    Integrity,

    /// The payload could not be decompressed or decoded.
    #[error("invalid payload: {0}")]
    Decode(#[from] ProtoError),

    /// Applying the batch to the store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
