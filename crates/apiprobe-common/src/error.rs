use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiprobeError {
    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfiguration(Vec<String>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Client error: HTTP {0}")]
    ClientError(u16),

    #[error("Server error: HTTP {0}")]
    ServerError(u16),

    #[error("Unknown service: {0}")]
    UnknownService(String),
}

impl ApiprobeError {
    /// Error for a non-success HTTP status: 5xx is a server error, anything
    /// else a client error.
    pub fn from_status(status: u16) -> Self {
        if status >= 500 {
            ApiprobeError::ServerError(status)
        } else {
            ApiprobeError::ClientError(status)
        }
    }

    /// Checks if an error is retryable.
    ///
    /// Transport failures, timeouts and 5xx responses are transient and may
    /// succeed on a later attempt. Everything else is permanent.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiprobeError::Transport(_) | ApiprobeError::Timeout(_) | ApiprobeError::ServerError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ApiprobeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable_error() {
        assert!(ApiprobeError::Transport("connection refused".to_string()).is_retryable());
        assert!(ApiprobeError::Timeout(1000).is_retryable());
        assert!(ApiprobeError::ServerError(503).is_retryable());

        assert!(!ApiprobeError::ClientError(404).is_retryable());
        assert!(!ApiprobeError::Config("bad".to_string()).is_retryable());
        assert!(!ApiprobeError::UnknownService("users".to_string()).is_retryable());
        assert!(!ApiprobeError::InvalidConfiguration(vec![]).is_retryable());
    }

    #[test]
    fn test_invalid_configuration_display_joins_errors() {
        let err = ApiprobeError::InvalidConfiguration(vec![
            "no services declared".to_string(),
            "unknown auth type".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Invalid configuration: no services declared; unknown auth type"
        );
    }

    #[test]
    fn test_from_status_splits_on_500() {
        assert!(matches!(ApiprobeError::from_status(404), ApiprobeError::ClientError(404)));
        assert!(matches!(ApiprobeError::from_status(499), ApiprobeError::ClientError(499)));
        assert!(matches!(ApiprobeError::from_status(500), ApiprobeError::ServerError(500)));
        assert_eq!(
            ApiprobeError::from_status(429).to_string(),
            "Client error: HTTP 429"
        );
    }

    #[test]
    fn test_timeout_display() {
        assert_eq!(
            ApiprobeError::Timeout(250).to_string(),
            "Request timeout after 250ms"
        );
    }
}
