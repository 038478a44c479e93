//! In-memory storage backend
//!
//! `RwLock`-guarded maps implementing every storage trait. Used by tests
//! and development; the behavior is the reference for the sled backend.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use permalog_core::{
    BundleStatus, ChainHead, ChainResult, IndexEntry, NewQueueEntry, QueueEntry, QueueStats,
    QueueStatus, TrackedBundle, VerificationCounters,
};

use crate::{BundleTracker, ChainStateStore, FailedReset, LookupIndex, ManifestSource, QueueStore};

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    heads: RwLock<HashMap<String, ChainHead>>,
    queue: RwLock<HashMap<u64, QueueEntry>>,
    /// `(entity_id, cid)` uniqueness index
    queue_uniq: RwLock<HashMap<(String, String), u64>>,
    next_id: AtomicU64,
    manifests: RwLock<HashMap<String, Vec<u8>>>,
    index: RwLock<HashMap<String, IndexEntry>>,
    bundles: RwLock<HashMap<String, TrackedBundle>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            ..Default::default()
        }
    }

    /// Seed a manifest, standing in for the external manifest store.
    pub async fn put_manifest(&self, cid: impl Into<String>, bytes: Vec<u8>) {
        self.manifests.write().await.insert(cid.into(), bytes);
    }

    async fn update_status(
        &self,
        ids: &[u64],
        status: QueueStatus,
        at: DateTime<Utc>,
    ) -> ChainResult<()> {
        let mut queue = self.queue.write().await;
        for id in ids {
            if let Some(entry) = queue.get_mut(id) {
                entry.status = status;
                entry.updated_at = at;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChainStateStore for MemoryStore {
    async fn get(&self, chain_key: &str) -> ChainResult<ChainHead> {
        let heads = self.heads.read().await;
        Ok(heads.get(chain_key).cloned().unwrap_or_else(ChainHead::genesis))
    }

    async fn update(&self, chain_key: &str, tx: &str, cid: &str, seq: u64) -> ChainResult<()> {
        let mut heads = self.heads.write().await;
        heads.insert(
            chain_key.to_string(),
            ChainHead {
                tx: Some(tx.to_string()),
                cid: Some(cid.to_string()),
                seq,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn reset(&self, chain_key: &str) -> ChainResult<()> {
        let mut heads = self.heads.write().await;
        heads.insert(chain_key.to_string(), ChainHead::genesis());
        Ok(())
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn insert(&self, entry: NewQueueEntry) -> ChainResult<u64> {
        let uniq_key = (entry.entity_id.clone(), entry.cid.clone());

        let mut uniq = self.queue_uniq.write().await;
        if let Some(existing) = uniq.get(&uniq_key) {
            return Ok(*existing);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let row = QueueEntry {
            id,
            entity_id: entry.entity_id,
            cid: entry.cid,
            op: entry.op,
            vis: entry.vis,
            ts: entry.ts,
            status: QueueStatus::Pending,
            retry_count: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        uniq.insert(uniq_key, id);
        self.queue.write().await.insert(id, row);
        Ok(id)
    }

    async fn entry(&self, id: u64) -> ChainResult<Option<QueueEntry>> {
        Ok(self.queue.read().await.get(&id).cloned())
    }

    async fn fetch_pending(&self, limit: usize) -> ChainResult<Vec<QueueEntry>> {
        let queue = self.queue.read().await;
        let mut rows: Vec<QueueEntry> = queue
            .values()
            .filter(|e| e.status == QueueStatus::Pending)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn mark_signing(&self, ids: &[u64], at: DateTime<Utc>) -> ChainResult<()> {
        self.update_status(ids, QueueStatus::Signing, at).await
    }

    async fn mark_uploading(&self, ids: &[u64], at: DateTime<Utc>) -> ChainResult<()> {
        self.update_status(ids, QueueStatus::Uploading, at).await
    }

    async fn delete(&self, ids: &[u64]) -> ChainResult<()> {
        // Same acquisition order as insert (uniq, then queue).
        let mut uniq = self.queue_uniq.write().await;
        let mut queue = self.queue.write().await;
        for id in ids {
            if let Some(entry) = queue.remove(id) {
                uniq.remove(&(entry.entity_id, entry.cid));
            }
        }
        Ok(())
    }

    async fn mark_failed(&self, id: u64, error: &str) -> ChainResult<()> {
        let mut queue = self.queue.write().await;
        if let Some(entry) = queue.get_mut(&id) {
            entry.status = QueueStatus::Failed;
            entry.error_message = Some(error.to_string());
            entry.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn revert_to_pending(&self, id: u64, error: &str) -> ChainResult<()> {
        let mut queue = self.queue.write().await;
        if let Some(entry) = queue.get_mut(&id) {
            entry.status = QueueStatus::Pending;
            entry.retry_count += 1;
            entry.error_message = Some(error.to_string());
            entry.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn release_to_pending(&self, ids: &[u64]) -> ChainResult<()> {
        self.update_status(ids, QueueStatus::Pending, Utc::now()).await
    }

    async fn reset_stuck(&self, threshold: DateTime<Utc>) -> ChainResult<u64> {
        let mut queue = self.queue.write().await;
        let mut reset = 0;
        for entry in queue.values_mut() {
            let stuck = matches!(entry.status, QueueStatus::Signing | QueueStatus::Uploading)
                && entry.updated_at < threshold;
            if stuck {
                entry.status = QueueStatus::Pending;
                entry.updated_at = Utc::now();
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn reset_failed_under_limit(&self, max_retries: u32) -> ChainResult<FailedReset> {
        let mut queue = self.queue.write().await;
        let mut outcome = FailedReset::default();
        for entry in queue.values_mut() {
            if entry.status != QueueStatus::Failed {
                continue;
            }
            if entry.retry_count < max_retries {
                entry.status = QueueStatus::Pending;
                entry.updated_at = Utc::now();
                outcome.reset += 1;
            } else {
                outcome.abandoned += 1;
            }
        }
        Ok(outcome)
    }

    async fn stats(&self) -> ChainResult<QueueStats> {
        let queue = self.queue.read().await;
        let mut stats = QueueStats::default();
        for entry in queue.values() {
            match entry.status {
                QueueStatus::Pending => stats.pending += 1,
                QueueStatus::Signing => stats.signing += 1,
                QueueStatus::Uploading => stats.uploading += 1,
                QueueStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl ManifestSource for MemoryStore {
    async fn manifest(&self, cid: &str) -> ChainResult<Option<Vec<u8>>> {
        Ok(self.manifests.read().await.get(cid).cloned())
    }
}

#[async_trait]
impl LookupIndex for MemoryStore {
    async fn put(&self, key: &str, entry: &IndexEntry) -> ChainResult<()> {
        self.index.write().await.insert(key.to_string(), entry.clone());
        Ok(())
    }

    async fn lookup(&self, key: &str) -> ChainResult<Option<IndexEntry>> {
        Ok(self.index.read().await.get(key).cloned())
    }
}

#[async_trait]
impl BundleTracker for MemoryStore {
    async fn track(&self, bundle: TrackedBundle) -> ChainResult<()> {
        self.bundles
            .write()
            .await
            .insert(bundle.bundle_tx.clone(), bundle);
        Ok(())
    }

    async fn bundle(&self, bundle_tx: &str) -> ChainResult<Option<TrackedBundle>> {
        Ok(self.bundles.read().await.get(bundle_tx).cloned())
    }

    async fn due_for_check(
        &self,
        grace: Duration,
        now: DateTime<Utc>,
    ) -> ChainResult<Vec<TrackedBundle>> {
        let bundles = self.bundles.read().await;
        Ok(bundles
            .values()
            .filter(|b| b.is_pending() && b.age(now) >= grace)
            .cloned()
            .collect())
    }

    async fn record_check(&self, bundle_tx: &str) -> ChainResult<()> {
        if let Some(bundle) = self.bundles.write().await.get_mut(bundle_tx) {
            bundle.record_check();
        }
        Ok(())
    }

    async fn mark_verified(&self, bundle_tx: &str, at: DateTime<Utc>) -> ChainResult<()> {
        if let Some(bundle) = self.bundles.write().await.get_mut(bundle_tx) {
            bundle.mark_verified(at);
        }
        Ok(())
    }

    async fn mark_failed(&self, bundle_tx: &str, at: DateTime<Utc>) -> ChainResult<()> {
        if let Some(bundle) = self.bundles.write().await.get_mut(bundle_tx) {
            bundle.mark_failed(at);
        }
        Ok(())
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> ChainResult<u64> {
        let mut bundles = self.bundles.write().await;
        let before = bundles.len();
        bundles.retain(|_, b| !b.prunable(cutoff));
        Ok((before - bundles.len()) as u64)
    }

    async fn counters(&self, now: DateTime<Utc>) -> ChainResult<VerificationCounters> {
        let bundles = self.bundles.read().await;
        let day_ago = now - Duration::hours(24);
        let mut counters = VerificationCounters::default();
        for bundle in bundles.values() {
            match bundle.status {
                BundleStatus::Pending => counters.pending_bundles += 1,
                BundleStatus::Verified => {
                    if bundle.verified_at.map(|t| t >= day_ago).unwrap_or(false) {
                        counters.verified_last_24h += 1;
                    }
                }
                BundleStatus::Failed => {
                    if bundle.failed_at.map(|t| t >= day_ago).unwrap_or(false) {
                        counters.failed_last_24h += 1;
                    }
                }
            }
        }
        Ok(counters)
    }

    async fn list(&self) -> ChainResult<Vec<TrackedBundle>> {
        Ok(self.bundles.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use permalog_core::{Operation, Visibility};

    fn request(entity: &str, cid: &str) -> NewQueueEntry {
        NewQueueEntry::new(entity, cid, Operation::Update, Visibility::Public)
    }

    #[tokio::test]
    async fn test_insert_dedups_on_entity_cid() {
        let store = MemoryStore::new();
        let a = store.insert(request("E1", "C1")).await.unwrap();
        let b = store.insert(request("E1", "C1")).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.stats().await.unwrap().pending, 1);

        // A different cid for the same entity is a new row.
        let c = store.insert(request("E1", "C2")).await.unwrap();
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_delete_frees_uniqueness_slot() {
        let store = MemoryStore::new();
        let a = store.insert(request("E1", "C1")).await.unwrap();
        store.delete(&[a]).await.unwrap();
        let b = store.insert(request("E1", "C1")).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_fetch_pending_ordered_and_limited() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .insert(request(&format!("E{}", i), &format!("C{}", i)))
                .await
                .unwrap();
        }
        let rows = store.fetch_pending(3).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn test_revert_increments_retry_count() {
        let store = MemoryStore::new();
        let id = store.insert(request("E1", "C1")).await.unwrap();
        store.mark_signing(&[id], Utc::now()).await.unwrap();
        store.revert_to_pending(id, "upload failed").await.unwrap();

        let row = store.entry(id).await.unwrap().unwrap();
        assert_eq!(row.status, QueueStatus::Pending);
        assert_eq!(row.retry_count, 1);
        assert_eq!(row.error_message.as_deref(), Some("upload failed"));
    }

    #[tokio::test]
    async fn test_reset_stuck_only_touches_old_locked_rows() {
        let store = MemoryStore::new();
        let stuck = store.insert(request("E1", "C1")).await.unwrap();
        let fresh = store.insert(request("E2", "C2")).await.unwrap();

        let old = Utc::now() - Duration::minutes(20);
        store.mark_signing(&[stuck], old).await.unwrap();
        store.mark_signing(&[fresh], Utc::now()).await.unwrap();

        let reset = store
            .reset_stuck(Utc::now() - Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(reset, 1);
        assert_eq!(
            store.entry(stuck).await.unwrap().unwrap().status,
            QueueStatus::Pending
        );
        assert_eq!(
            store.entry(fresh).await.unwrap().unwrap().status,
            QueueStatus::Signing
        );
    }

    #[tokio::test]
    async fn test_reset_failed_respects_retry_cap() {
        let store = MemoryStore::new();
        let under = store.insert(request("E1", "C1")).await.unwrap();
        let over = store.insert(request("E2", "C2")).await.unwrap();

        store.mark_signing(&[under, over], Utc::now()).await.unwrap();
        QueueStore::mark_failed(&store, under, "boom").await.unwrap();
        // Push the second row past the cap.
        for _ in 0..5 {
            store.revert_to_pending(over, "boom").await.unwrap();
        }
        QueueStore::mark_failed(&store, over, "boom").await.unwrap();

        let outcome = store.reset_failed_under_limit(5).await.unwrap();
        assert_eq!(outcome.reset, 1);
        assert_eq!(outcome.abandoned, 1);
        assert_eq!(
            store.entry(over).await.unwrap().unwrap().status,
            QueueStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_head_round_trip() {
        let store = MemoryStore::new();
        let head = store.get("head").await.unwrap();
        assert!(head.is_genesis());

        store.update("head", "TX1", "C1", 1).await.unwrap();
        let head = store.get("head").await.unwrap();
        assert_eq!(head.seq, 1);
        assert_eq!(head.tx.as_deref(), Some("TX1"));

        store.reset("head").await.unwrap();
        assert!(store.get("head").await.unwrap().is_genesis());
    }

    #[tokio::test]
    async fn test_bundle_lifecycle() {
        let store = MemoryStore::new();
        let bundle = TrackedBundle::new("BTX1", vec![]);
        store.track(bundle).await.unwrap();

        // Not due inside the grace period.
        let due = store
            .due_for_check(Duration::minutes(10), Utc::now())
            .await
            .unwrap();
        assert!(due.is_empty());

        // Due once the grace period has elapsed.
        let due = store
            .due_for_check(Duration::minutes(10), Utc::now() + Duration::minutes(11))
            .await
            .unwrap();
        assert_eq!(due.len(), 1);

        store.mark_verified("BTX1", Utc::now()).await.unwrap();
        let counters = store.counters(Utc::now()).await.unwrap();
        assert_eq!(counters.verified_last_24h, 1);
        assert_eq!(counters.pending_bundles, 0);
    }
}
