use thiserror::Error;

/// Errors that can occur while talking to the school API
#[derive(Debug, Error)]
pub enum ApiError {
    /// Base URL rejected at client construction or when joining a path
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// Request did not complete within the configured timeout
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// Transport-level failure (DNS, TLS, connection reset)
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("Unexpected status {status} from {endpoint}")]
    Status {
        endpoint: &'static str,
        status: reqwest::StatusCode,
    },

    /// Response body did not match the expected shape
    #[error("Invalid response body: {0}")]
    InvalidBody(String),
}

/// Specialized result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;
