//! Error types for the wire protocol.

use thiserror::Error;

/// Errors that can occur while encoding, decoding or signing payloads.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Gzip compression or decompression failed.
    #[error("compression error: {0}")]
    Compression(#[from] std::io::Error),

    /// The signing key was rejected by the MAC implementation.
    #[error("invalid signing key")]
    InvalidKey,

    /// A gauge value was NaN or infinite, which JSON cannot represent.
    #[error("gauge {0} is not finite")]
    NonFinite(String),

    /// A metric type string was not recognised.
    #[error("unknown metric type: {0}")]
    UnknownKind(String),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtoError>;
