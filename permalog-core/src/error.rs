//! Core error types
//!
//! Error definitions shared by the storage layer and the write path.

use thiserror::Error;

/// Chain-level error
#[derive(Error, Debug)]
pub enum ChainError {
    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Record signing failure
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Manifest missing or failed validation
    #[error("Invalid manifest for {cid}: {reason}")]
    InvalidManifest { cid: String, reason: String },

    /// Queue row not found
    #[error("Queue entry not found: {0}")]
    EntryNotFound(u64),

    /// Invalid queue state transition
    #[error("Invalid queue transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Chain head regressed or diverged from the expected value
    #[error("Chain head conflict on {key}: {reason}")]
    HeadConflict { key: String, reason: String },

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Chain result type
pub type ChainResult<T> = Result<T, ChainError>;

impl From<serde_json::Error> for ChainError {
    fn from(e: serde_json::Error) -> Self {
        ChainError::Serialization(e.to_string())
    }
}
