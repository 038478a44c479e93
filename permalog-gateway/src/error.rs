//! Gateway error types

use thiserror::Error;

/// Gateway error
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Connection-level failure (DNS, TLS, timeout)
    #[error("Gateway connection failed: {0}")]
    Connection(String),

    /// Non-success HTTP response
    #[error("Gateway returned {status}: {body}")]
    Http { status: u16, body: String },

    /// The gateway rejected the upload for lack of funds. Non-retryable.
    #[error("Payment required: {0}")]
    PaymentRequired(String),

    /// Transaction unknown to the gateway
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Malformed response body
    #[error("Gateway response error: {0}")]
    Response(String),

    /// Configuration error
    #[error("Gateway configuration error: {0}")]
    Configuration(String),
}

/// Gateway result type
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Whether a retry can possibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::PaymentRequired(_) | Self::Configuration(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Connection(e.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Response(e.to_string())
    }
}
