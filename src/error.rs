//! Error types for pulse-link.

use thiserror::Error;

/// Errors that can occur in pulse-link operations.
#[derive(Error, Debug, Clone)]
pub enum PulseLinkError {
    /// Message content rejected before any network call (empty, over-length).
    /// Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Remote call failed in transit. Retryable; connection-level retries
    /// are governed by the backoff policy and circuit breaker.
    #[error("Network error: {0}")]
    Network(String),

    /// Remote call exceeded its per-request timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Subscription channel could not be opened or was dropped.
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Payload could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Automatic reconnection attempts are exhausted. Terminal until the
    /// caller explicitly resets the connection state.
    #[error("Connection exhausted: {0}")]
    ConnectionExhausted(String),

    /// Operation was aborted by the caller. Treated as a no-op, not a failure.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invariant violation inside the library.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PulseLinkError {
    /// Whether a reconnect/retry may succeed for this error.
    ///
    /// Validation, cancellation, and exhausted-connection errors are final;
    /// network, timeout, and subscription errors are transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PulseLinkError::Network(_)
                | PulseLinkError::Timeout(_)
                | PulseLinkError::Subscription(_)
        )
    }
}

impl From<serde_json::Error> for PulseLinkError {
    fn from(e: serde_json::Error) -> Self {
        PulseLinkError::Serialization(e.to_string())
    }
}

/// Result type for pulse-link operations.
pub type Result<T> = std::result::Result<T, PulseLinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(PulseLinkError::Network("reset".into()).is_retryable());
        assert!(PulseLinkError::Timeout("10s".into()).is_retryable());
        assert!(PulseLinkError::Subscription("closed".into()).is_retryable());
        assert!(!PulseLinkError::Validation("empty".into()).is_retryable());
        assert!(!PulseLinkError::Cancelled.is_retryable());
        assert!(!PulseLinkError::ConnectionExhausted("5 attempts".into()).is_retryable());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = PulseLinkError::Network("connection refused".into());
        assert!(err.to_string().contains("connection refused"));
    }
}
