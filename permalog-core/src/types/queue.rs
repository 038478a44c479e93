//! Attestation request queue entries
//!
//! Rows move `pending → signing → uploading`, are deleted on success, and
//! fall back to `pending` (with `retry_count` incremented) or `failed` on
//! error. Stuck `signing`/`uploading` rows are reclaimed by cleanup, and
//! `failed` rows below the retry cap are reset daily.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::record::{Operation, Visibility};

/// Queue entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    /// Waiting to be picked up by a batch
    #[default]
    Pending,
    /// Locked by a batch that is signing it
    Signing,
    /// Signed and in flight to the network
    Uploading,
    /// Unrecoverable for this attempt; the daily retry job may reset it
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Signing => "signing",
            Self::Uploading => "uploading",
            Self::Failed => "failed",
        }
    }

    /// Whether a transition to `target` is allowed.
    pub fn can_transition_to(&self, target: QueueStatus) -> bool {
        match (self, target) {
            (Self::Pending, Self::Signing) => true,
            (Self::Signing, Self::Uploading) => true,
            (Self::Signing, Self::Pending) => true,
            (Self::Signing, Self::Failed) => true,
            (Self::Uploading, Self::Pending) => true,
            (Self::Uploading, Self::Failed) => true,
            (Self::Failed, Self::Pending) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted attestation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Row id, assigned by the queue store
    pub id: u64,
    pub entity_id: String,
    pub cid: String,
    pub op: Operation,
    pub vis: Visibility,
    /// Submission time as reported by the producer
    pub ts: DateTime<Utc>,
    pub status: QueueStatus,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn can_retry(&self, max_retries: u32) -> bool {
        self.retry_count < max_retries
    }
}

/// Producer-side request to enqueue an attestation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQueueEntry {
    pub entity_id: String,
    pub cid: String,
    pub op: Operation,
    pub vis: Visibility,
    pub ts: DateTime<Utc>,
}

impl NewQueueEntry {
    pub fn new(
        entity_id: impl Into<String>,
        cid: impl Into<String>,
        op: Operation,
        vis: Visibility,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            cid: cid.into(),
            op,
            vis,
            ts: Utc::now(),
        }
    }
}

/// Queue counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub signing: u64,
    pub uploading: u64,
    pub failed: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.signing + self.uploading + self.failed
    }

    /// Rows currently locked by a batch.
    pub fn processing(&self) -> u64 {
        self.signing + self.uploading
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert!(QueueStatus::Pending.can_transition_to(QueueStatus::Signing));
        assert!(QueueStatus::Signing.can_transition_to(QueueStatus::Uploading));
        assert!(QueueStatus::Signing.can_transition_to(QueueStatus::Pending));
        assert!(QueueStatus::Uploading.can_transition_to(QueueStatus::Failed));
        assert!(QueueStatus::Failed.can_transition_to(QueueStatus::Pending));

        // No row ever re-enters signing without going through pending.
        assert!(!QueueStatus::Failed.can_transition_to(QueueStatus::Signing));
        assert!(!QueueStatus::Uploading.can_transition_to(QueueStatus::Signing));
        assert!(!QueueStatus::Pending.can_transition_to(QueueStatus::Uploading));
    }

    #[test]
    fn test_retry_cap() {
        let entry = QueueEntry {
            id: 1,
            entity_id: "E1".to_string(),
            cid: "C1".to_string(),
            op: Operation::Update,
            vis: Visibility::Public,
            ts: Utc::now(),
            status: QueueStatus::Failed,
            retry_count: 5,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!entry.can_retry(5));
        assert!(entry.can_retry(6));
    }

    #[test]
    fn test_stats_totals() {
        let stats = QueueStats {
            pending: 3,
            signing: 2,
            uploading: 1,
            failed: 4,
        };
        assert_eq!(stats.total(), 10);
        assert_eq!(stats.processing(), 3);
    }
}
