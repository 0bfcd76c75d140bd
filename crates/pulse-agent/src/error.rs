//! Error types for the pulse agent.

use pulse_proto::ProtoError;
use pulse_store::StoreError;
use thiserror::Error;

/// Errors that can occur while shipping one batch to the collector.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The request never produced a response.
    #[error("connection failed: {0}")]
    Connection(#[from] reqwest::Error),

    /// The collector answered 503; the attempt may be retried.
    #[error("collector unavailable")]
    Unavailable,

    /// The collector answered with a non-success status.
    #[error("collector returned status {0}")]
    Status(u16),

    /// The batch could not be encoded or signed.
    #[error("encoding failed: {0}")]
    Encode(#[from] ProtoError),
}

impl DeliveryError {
    /// Returns true if another attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

/// Errors that can occur in agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A metric source could not be read.
    #[error("collection failed: {0}")]
    Collection(String),

    /// The poller's store rejected an operation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A batch could not be delivered.
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    /// The agent was configured with invalid values.
    #[error("configuration error: {0}")]
    Config(String),

    /// A fan-out task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = AgentError::Collection("probe offline".to_string());
        assert_eq!(err.to_string(), "collection failed: probe offline");

        let err = AgentError::Config("rate limit must be positive".to_string());
        assert_eq!(err.to_string(), "configuration error: rate limit must be positive");

        let err = DeliveryError::Status(500);
        assert_eq!(err.to_string(), "collector returned status 500");
    }

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(DeliveryError::Unavailable.is_retryable());
        assert!(!DeliveryError::Status(500).is_retryable());
        assert!(!DeliveryError::Encode(ProtoError::InvalidKey).is_retryable());
    }

    #[test]
    fn delivery_error_wraps_into_agent_error() {
        let err: AgentError = DeliveryError::Unavailable.into();
        assert!(matches!(err, AgentError::Delivery(DeliveryError::Unavailable)));
        assert_eq!(err.to_string(), "delivery failed: collector unavailable");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AgentError>();
        assert_send_sync::<DeliveryError>();
    }
}
