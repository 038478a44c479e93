//! Tracked bundles
//!
//! Every uploaded bundle is tracked until the network confirms it is
//! retrievable (seeded). A bundle that does not seed within the timeout
//! is marked failed and its entities are re-queued; verified and failed
//! bundles are retained for a bounded window for operator visibility.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Seeding status of a tracked bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BundleStatus {
    /// Uploaded, not yet confirmed on the network
    #[default]
    Pending,
    /// Confirmed retrievable
    Verified,
    /// Never seeded within the timeout; entities were re-queued
    Failed,
}

/// `(entity_id, cid)` pair carried by a bundle, kept for re-queueing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleItemRef {
    pub entity_id: String,
    pub cid: String,
}

/// An uploaded bundle awaiting seeding verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedBundle {
    /// Transaction id of the bundle container
    pub bundle_tx: String,
    pub items: Vec<BundleItemRef>,
    pub item_count: usize,
    pub uploaded_at: DateTime<Utc>,
    /// Number of status checks performed so far
    pub check_count: u32,
    pub status: BundleStatus,
    pub verified_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl TrackedBundle {
    pub fn new(bundle_tx: impl Into<String>, items: Vec<BundleItemRef>) -> Self {
        let item_count = items.len();
        Self {
            bundle_tx: bundle_tx.into(),
            items,
            item_count,
            uploaded_at: Utc::now(),
            check_count: 0,
            status: BundleStatus::Pending,
            verified_at: None,
            failed_at: None,
        }
    }

    /// Age of the bundle relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.uploaded_at
    }

    pub fn mark_verified(&mut self, at: DateTime<Utc>) {
        self.status = BundleStatus::Verified;
        self.verified_at = Some(at);
    }

    pub fn mark_failed(&mut self, at: DateTime<Utc>) {
        self.status = BundleStatus::Failed;
        self.failed_at = Some(at);
    }

    pub fn record_check(&mut self) {
        self.check_count += 1;
    }

    pub fn is_pending(&self) -> bool {
        self.status == BundleStatus::Pending
    }

    /// Whether the bundle left its pending state before `cutoff` and can
    /// be pruned.
    pub fn prunable(&self, cutoff: DateTime<Utc>) -> bool {
        match self.status {
            BundleStatus::Pending => false,
            BundleStatus::Verified => self.verified_at.map(|t| t < cutoff).unwrap_or(true),
            BundleStatus::Failed => self.failed_at.map(|t| t < cutoff).unwrap_or(true),
        }
    }
}

/// Verified/failed counts over a trailing window, for the health surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCounters {
    pub pending_bundles: u64,
    pub verified_last_24h: u64,
    pub failed_last_24h: u64,
}
