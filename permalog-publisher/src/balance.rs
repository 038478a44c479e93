//! Balance-gated admission
//!
//! Before each tick the wallet balance is read through the gateway.
//! Below the critical threshold the tick is skipped entirely; below the
//! warning threshold processing continues with a warning. A failed
//! balance check must never block processing.

use std::sync::Arc;
use tracing::{debug, warn};

use permalog_core::constants::WINSTON_PER_AR;
use permalog_gateway::Gateway;

use crate::config::PublisherConfig;

/// Result of a balance check
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BalanceStatus {
    Ok { ar: f64 },
    /// Below the warning threshold; processing continues
    Low { ar: f64 },
    /// Below the critical threshold; the tick is skipped
    Critical { ar: f64 },
    /// The check failed; treated as OK
    Unknown,
}

impl BalanceStatus {
    pub fn blocks_processing(&self) -> bool {
        matches!(self, Self::Critical { .. })
    }

    /// Balance in AR when the check succeeded.
    pub fn ar(&self) -> Option<f64> {
        match self {
            Self::Ok { ar } | Self::Low { ar } | Self::Critical { ar } => Some(*ar),
            Self::Unknown => None,
        }
    }

    /// Status label for the health surface.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ok { .. } | Self::Unknown => "ok",
            Self::Low { .. } => "low",
            Self::Critical { .. } => "critical",
        }
    }
}

/// Wallet balance gate
pub struct BalanceGate {
    gateway: Arc<dyn Gateway>,
    address: String,
    warning_ar: f64,
    critical_ar: f64,
}

impl BalanceGate {
    pub fn new(gateway: Arc<dyn Gateway>, address: impl Into<String>, config: &PublisherConfig) -> Self {
        Self {
            gateway,
            address: address.into(),
            warning_ar: config.warning_balance_ar,
            critical_ar: config.critical_balance_ar,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Classify the current balance against the thresholds.
    pub async fn check(&self) -> BalanceStatus {
        let winston = match self.gateway.balance_winston(&self.address).await {
            Ok(winston) => winston,
            Err(e) => {
                warn!(error = %e, "Balance check failed; proceeding anyway");
                return BalanceStatus::Unknown;
            }
        };

        let ar = winston_to_ar(winston);
        debug!(balance_winston = winston as u64, balance_ar = ar, "Balance checked");

        if ar < self.critical_ar {
            BalanceStatus::Critical { ar }
        } else if ar < self.warning_ar {
            BalanceStatus::Low { ar }
        } else {
            BalanceStatus::Ok { ar }
        }
    }
}

/// Convert winston to AR.
pub fn winston_to_ar(winston: u128) -> f64 {
    winston as f64 / WINSTON_PER_AR as f64
}
