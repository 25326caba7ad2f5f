use thiserror::Error;

/// Errors raised by external service adapters.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The payment processor rejected a request.
    #[error("Payment gateway error: {0}")]
    Payment(String),

    /// Transport failure talking to an HTTP API.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A webhook signature was missing, malformed, stale or wrong.
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    /// A webhook body could not be understood.
    #[error("Malformed webhook event: {0}")]
    MalformedEvent(String),

    /// Email could not be built or delivered.
    #[error("Mail error: {0}")]
    Mail(String),

    /// Cache backend failure.
    #[error("Cache error: {0}")]
    Cache(String),

    /// The cache handle was used after being closed.
    #[error("Cache is closed")]
    CacheClosed,
}

impl From<redis::RedisError> for GatewayError {
    fn from(e: redis::RedisError) -> Self {
        GatewayError::Cache(e.to_string())
    }
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
