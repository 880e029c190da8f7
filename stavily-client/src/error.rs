//! Error taxonomy for the Stavily client.

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by the Transport and Orchestrator Client layers.
///
/// `is_retryable` classifies an attempt as retryable iff it is a
/// transport-level I/O failure, or the status is 408, 429, or >= 500.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level I/O failure (DNS, connect, TLS handshake, ...).
    #[error("transport I/O error: {0}")]
    TransportIO(#[from] reqwest::Error),

    /// The orchestrator responded with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Rate limiter wait was cancelled or the bucket could not be drawn
    /// from in time.
    #[error("rate limited")]
    RateLimited,

    /// Auth provider could not attach or refresh credentials.
    #[error("authentication failure: {0}")]
    AuthFailure(String),

    /// The operation was cancelled via the shared cancellation handle.
    #[error("operation cancelled")]
    Cancelled,

    /// Response body did not conform to the expected JSON shape.
    #[error("failed to decode response: {0}")]
    DecodeError(String),
}

impl ClientError {
    /// Classifies an error as retryable per the client's retry policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::TransportIO(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            ClientError::HttpStatus { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            ClientError::RateLimited => false,
            ClientError::AuthFailure(_) => false,
            ClientError::Cancelled => false,
            ClientError::DecodeError(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_5xx_is_retryable() {
        let err = ClientError::HttpStatus {
            status: 503,
            body: String::new(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn http_404_is_not_retryable() {
        let err = ClientError::HttpStatus {
            status: 404,
            body: String::new(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn http_408_and_429_are_retryable() {
        for status in [408u16, 429u16] {
            let err = ClientError::HttpStatus {
                status,
                body: String::new(),
            };
            assert!(err.is_retryable(), "status {status} should retry");
        }
    }

    #[test]
    fn cancelled_is_never_retryable() {
        assert!(!ClientError::Cancelled.is_retryable());
    }
}
