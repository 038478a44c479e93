//! Permalog storage layer
//!
//! Storage traits for the write path and their backends: a sled-backed
//! persistent store and an in-memory store for tests and development.
//!
//! The chain-head store must behave linearizably for single-row updates;
//! the queue store must preserve `(entity_id, cid)` uniqueness on
//! re-queue; the lookup index is eventually consistent. One backend
//! struct implements all traits so a single handle can be injected
//! wherever a collaborator is needed.

pub mod memory;
pub mod sled_store;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use permalog_core::{
    ChainHead, ChainResult, IndexEntry, NewQueueEntry, QueueEntry, QueueStats, TrackedBundle,
    VerificationCounters,
};

pub use memory::MemoryStore;
pub use sled_store::SledStore;

/// Authoritative chain-head pointer store (single row per chain key)
#[async_trait]
pub trait ChainStateStore: Send + Sync {
    /// Read the head for `chain_key`; an absent row reads as genesis.
    async fn get(&self, chain_key: &str) -> ChainResult<ChainHead>;

    /// Upsert the head. The single-writer discipline of the scheduler
    /// guarantees no concurrent writers per key.
    async fn update(&self, chain_key: &str, tx: &str, cid: &str, seq: u64) -> ChainResult<()>;

    /// Operator reset back to genesis.
    async fn reset(&self, chain_key: &str) -> ChainResult<()>;
}

/// Outcome of the daily failed-row reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailedReset {
    /// Rows moved back to pending
    pub reset: u64,
    /// Rows at or over the retry cap, left in `failed`
    pub abandoned: u64,
}

/// Persistent attestation request queue
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert a request. Re-inserting an `(entity_id, cid)` pair that is
    /// already queued returns the existing row id instead of creating a
    /// duplicate.
    async fn insert(&self, entry: NewQueueEntry) -> ChainResult<u64>;

    async fn entry(&self, id: u64) -> ChainResult<Option<QueueEntry>>;

    /// Pending rows ordered by `created_at` ascending.
    async fn fetch_pending(&self, limit: usize) -> ChainResult<Vec<QueueEntry>>;

    /// Lock rows for signing.
    async fn mark_signing(&self, ids: &[u64], at: DateTime<Utc>) -> ChainResult<()>;

    /// Move signed rows to uploading.
    async fn mark_uploading(&self, ids: &[u64], at: DateTime<Utc>) -> ChainResult<()>;

    /// Delete rows whose records were committed.
    async fn delete(&self, ids: &[u64]) -> ChainResult<()>;

    /// Mark a row failed with an error message.
    async fn mark_failed(&self, id: u64, error: &str) -> ChainResult<()>;

    /// Revert a row to pending with `retry_count` incremented.
    async fn revert_to_pending(&self, id: u64, error: &str) -> ChainResult<()>;

    /// Return locked rows to pending without touching `retry_count`.
    /// Used when a batch is deferred (bundle thresholds not met, tick
    /// deadline) rather than failed.
    async fn release_to_pending(&self, ids: &[u64]) -> ChainResult<()>;

    /// Reclaim rows stuck in `signing`/`uploading` since before
    /// `threshold`. Returns the number of rows reset.
    async fn reset_stuck(&self, threshold: DateTime<Utc>) -> ChainResult<u64>;

    /// Reset failed rows below the retry cap back to pending.
    async fn reset_failed_under_limit(&self, max_retries: u32) -> ChainResult<FailedReset>;

    async fn stats(&self) -> ChainResult<QueueStats>;
}

/// External read-only map `content_id -> manifest bytes`
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn manifest(&self, cid: &str) -> ChainResult<Option<Vec<u8>>>;
}

/// Key-value lookup index written by the finalizer
#[async_trait]
pub trait LookupIndex: Send + Sync {
    async fn put(&self, key: &str, entry: &IndexEntry) -> ChainResult<()>;

    async fn lookup(&self, key: &str) -> ChainResult<Option<IndexEntry>>;
}

/// Uploaded-bundle tracking for seeding verification
#[async_trait]
pub trait BundleTracker: Send + Sync {
    async fn track(&self, bundle: TrackedBundle) -> ChainResult<()>;

    async fn bundle(&self, bundle_tx: &str) -> ChainResult<Option<TrackedBundle>>;

    /// Pending bundles uploaded more than `grace` ago.
    async fn due_for_check(
        &self,
        grace: Duration,
        now: DateTime<Utc>,
    ) -> ChainResult<Vec<TrackedBundle>>;

    async fn record_check(&self, bundle_tx: &str) -> ChainResult<()>;

    async fn mark_verified(&self, bundle_tx: &str, at: DateTime<Utc>) -> ChainResult<()>;

    async fn mark_failed(&self, bundle_tx: &str, at: DateTime<Utc>) -> ChainResult<()>;

    /// Drop verified/failed bundles older than `cutoff`. Returns the
    /// number pruned.
    async fn prune(&self, cutoff: DateTime<Utc>) -> ChainResult<u64>;

    /// Counters for the health surface.
    async fn counters(&self, now: DateTime<Utc>) -> ChainResult<VerificationCounters>;

    /// All tracked bundles, for the admin surface.
    async fn list(&self) -> ChainResult<Vec<TrackedBundle>>;
}
