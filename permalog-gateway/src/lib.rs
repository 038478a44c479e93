//! Permalog gateway client
//!
//! HTTP interface to the decentralized storage gateway: posting signed
//! transactions (single records or bundle containers), querying seeding
//! status, and reading wallet balances and price quotes.
//!
//! The [`Gateway`] trait is the seam the write path depends on; tests
//! substitute scripted implementations.

mod client;
mod config;
mod error;

pub use client::GatewayClient;
pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};

use async_trait::async_trait;

/// Seeding status of a transaction as reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// The gateway has never seen the transaction
    NotFound,
    /// Accepted but not yet in a block
    Pending,
    /// In a block with at least one confirmation
    Confirmed {
        block_height: u64,
        confirmations: u32,
    },
}

impl TxStatus {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }
}

/// Storage-network gateway operations used by the write path
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Post a signed transaction body (a single record or a bundle
    /// container). `id` is the caller-derived transaction id; the
    /// gateway recomputes and checks it.
    async fn post_transaction(&self, id: &str, body: &[u8]) -> GatewayResult<()>;

    /// Query the seeding status of a transaction.
    async fn tx_status(&self, id: &str) -> GatewayResult<TxStatus>;

    /// Spendable balance of `address`, in winston.
    async fn balance_winston(&self, address: &str) -> GatewayResult<u128>;

    /// Price quote for storing `bytes` bytes, in winston.
    async fn price_winston(&self, bytes: usize) -> GatewayResult<u128>;
}
