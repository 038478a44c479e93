//! Publisher error types

use thiserror::Error;

use permalog_core::ChainError;
use permalog_gateway::GatewayError;
use permalog_wallet::WalletError;

/// Write-path error
#[derive(Error, Debug)]
pub enum PublishError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// The batch was aborted; surviving rows stay locked and are
    /// reclaimed by cleanup.
    #[error("Batch aborted: {0}")]
    Aborted(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Publisher result type
pub type PublishResult<T> = Result<T, PublishError>;

impl From<serde_json::Error> for PublishError {
    fn from(e: serde_json::Error) -> Self {
        PublishError::Chain(ChainError::Serialization(e.to_string()))
    }
}
