//! Sled persistent storage backend
//!
//! All traits implemented on top of sled trees, one tree per concern.
//! Rows are stored as JSON; queue row keys are big-endian ids so that
//! tree order matches insertion order.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

use permalog_core::{
    BundleStatus, ChainError, ChainHead, ChainResult, IndexEntry, NewQueueEntry, QueueEntry,
    QueueStats, QueueStatus, TrackedBundle, VerificationCounters,
};

use crate::{BundleTracker, ChainStateStore, FailedReset, LookupIndex, ManifestSource, QueueStore};

const CHAIN_TREE: &str = "chain_state";
const QUEUE_TREE: &str = "queue";
const QUEUE_UNIQ_TREE: &str = "queue_uniq";
const INDEX_TREE: &str = "lookup_index";
const BUNDLES_TREE: &str = "bundles";
const MANIFESTS_TREE: &str = "manifests";

/// Sled-backed store
#[derive(Debug, Clone)]
pub struct SledStore {
    db: sled::Db,
    chain: sled::Tree,
    queue: sled::Tree,
    queue_uniq: sled::Tree,
    index: sled::Tree,
    bundles: sled::Tree,
    manifests: sled::Tree,
}

impl SledStore {
    /// Open or create the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> ChainResult<Self> {
        let db = sled::open(path).map_err(storage_err)?;
        let chain = db.open_tree(CHAIN_TREE).map_err(storage_err)?;
        let queue = db.open_tree(QUEUE_TREE).map_err(storage_err)?;
        let queue_uniq = db.open_tree(QUEUE_UNIQ_TREE).map_err(storage_err)?;
        let index = db.open_tree(INDEX_TREE).map_err(storage_err)?;
        let bundles = db.open_tree(BUNDLES_TREE).map_err(storage_err)?;
        let manifests = db.open_tree(MANIFESTS_TREE).map_err(storage_err)?;
        Ok(Self {
            db,
            chain,
            queue,
            queue_uniq,
            index,
            bundles,
            manifests,
        })
    }

    /// Flush everything to disk.
    pub fn flush(&self) -> ChainResult<()> {
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }

    /// Seed a manifest, standing in for the external manifest store.
    pub fn put_manifest(&self, cid: &str, bytes: &[u8]) -> ChainResult<()> {
        self.manifests
            .insert(cid.as_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    fn serialize<T: Serialize>(value: &T) -> ChainResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| ChainError::Serialization(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> ChainResult<T> {
        serde_json::from_slice(bytes).map_err(|e| ChainError::Serialization(e.to_string()))
    }

    fn queue_key(id: u64) -> [u8; 8] {
        id.to_be_bytes()
    }

    fn uniq_key(entity_id: &str, cid: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(entity_id.len() + cid.len() + 1);
        key.extend_from_slice(entity_id.as_bytes());
        key.push(0);
        key.extend_from_slice(cid.as_bytes());
        key
    }

    fn load_row(&self, id: u64) -> ChainResult<Option<QueueEntry>> {
        match self.queue.get(Self::queue_key(id)).map_err(storage_err)? {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save_row(&self, row: &QueueEntry) -> ChainResult<()> {
        self.queue
            .insert(Self::queue_key(row.id), Self::serialize(row)?)
            .map_err(storage_err)?;
        Ok(())
    }

    fn mutate_row<F>(&self, id: u64, f: F) -> ChainResult<bool>
    where
        F: FnOnce(&mut QueueEntry),
    {
        match self.load_row(id)? {
            Some(mut row) => {
                f(&mut row);
                self.save_row(&row)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn all_rows(&self) -> ChainResult<Vec<QueueEntry>> {
        let mut rows = Vec::new();
        for item in self.queue.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            rows.push(Self::deserialize(&bytes)?);
        }
        Ok(rows)
    }

    fn mutate_bundle<F>(&self, bundle_tx: &str, f: F) -> ChainResult<bool>
    where
        F: FnOnce(&mut TrackedBundle),
    {
        match self.bundles.get(bundle_tx.as_bytes()).map_err(storage_err)? {
            Some(bytes) => {
                let mut bundle: TrackedBundle = Self::deserialize(&bytes)?;
                f(&mut bundle);
                self.bundles
                    .insert(bundle_tx.as_bytes(), Self::serialize(&bundle)?)
                    .map_err(storage_err)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn all_bundles(&self) -> ChainResult<Vec<TrackedBundle>> {
        let mut bundles = Vec::new();
        for item in self.bundles.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            bundles.push(Self::deserialize(&bytes)?);
        }
        Ok(bundles)
    }
}

fn storage_err<E: std::fmt::Display>(e: E) -> ChainError {
    ChainError::Storage(e.to_string())
}

#[async_trait]
impl ChainStateStore for SledStore {
    async fn get(&self, chain_key: &str) -> ChainResult<ChainHead> {
        match self.chain.get(chain_key.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Self::deserialize(&bytes),
            None => Ok(ChainHead::genesis()),
        }
    }

    async fn update(&self, chain_key: &str, tx: &str, cid: &str, seq: u64) -> ChainResult<()> {
        let head = ChainHead {
            tx: Some(tx.to_string()),
            cid: Some(cid.to_string()),
            seq,
            updated_at: Utc::now(),
        };
        self.chain
            .insert(chain_key.as_bytes(), Self::serialize(&head)?)
            .map_err(storage_err)?;
        self.chain.flush().map_err(storage_err)?;
        Ok(())
    }

    async fn reset(&self, chain_key: &str) -> ChainResult<()> {
        self.chain
            .insert(chain_key.as_bytes(), Self::serialize(&ChainHead::genesis())?)
            .map_err(storage_err)?;
        self.chain.flush().map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait]
impl QueueStore for SledStore {
    async fn insert(&self, entry: NewQueueEntry) -> ChainResult<u64> {
        let uniq_key = Self::uniq_key(&entry.entity_id, &entry.cid);
        if let Some(existing) = self.queue_uniq.get(&uniq_key).map_err(storage_err)? {
            let bytes: [u8; 8] = existing
                .as_ref()
                .try_into()
                .map_err(|_| ChainError::Storage("corrupt uniqueness index".to_string()))?;
            return Ok(u64::from_be_bytes(bytes));
        }

        let id = self.db.generate_id().map_err(storage_err)?;
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
        self.save_row(&row)?;
        self.queue_uniq
            .insert(uniq_key, id.to_be_bytes().to_vec())
            .map_err(storage_err)?;
        Ok(id)
    }

    async fn entry(&self, id: u64) -> ChainResult<Option<QueueEntry>> {
        self.load_row(id)
    }

    async fn fetch_pending(&self, limit: usize) -> ChainResult<Vec<QueueEntry>> {
        let mut rows: Vec<QueueEntry> = self
            .all_rows()?
            .into_iter()
            .filter(|e| e.status == QueueStatus::Pending)
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn mark_signing(&self, ids: &[u64], at: DateTime<Utc>) -> ChainResult<()> {
        for id in ids {
            self.mutate_row(*id, |row| {
                row.status = QueueStatus::Signing;
                row.updated_at = at;
            })?;
        }
        Ok(())
    }

    async fn mark_uploading(&self, ids: &[u64], at: DateTime<Utc>) -> ChainResult<()> {
        for id in ids {
            self.mutate_row(*id, |row| {
                row.status = QueueStatus::Uploading;
                row.updated_at = at;
            })?;
        }
        Ok(())
    }

    async fn delete(&self, ids: &[u64]) -> ChainResult<()> {
        for id in ids {
            if let Some(row) = self.load_row(*id)? {
                self.queue
                    .remove(Self::queue_key(*id))
                    .map_err(storage_err)?;
                self.queue_uniq
                    .remove(Self::uniq_key(&row.entity_id, &row.cid))
                    .map_err(storage_err)?;
            }
        }
        Ok(())
    }

    async fn mark_failed(&self, id: u64, error: &str) -> ChainResult<()> {
        self.mutate_row(id, |row| {
            row.status = QueueStatus::Failed;
            row.error_message = Some(error.to_string());
            row.updated_at = Utc::now();
        })?;
        Ok(())
    }

    async fn revert_to_pending(&self, id: u64, error: &str) -> ChainResult<()> {
        self.mutate_row(id, |row| {
            row.status = QueueStatus::Pending;
            row.retry_count += 1;
            row.error_message = Some(error.to_string());
            row.updated_at = Utc::now();
        })?;
        Ok(())
    }

    async fn release_to_pending(&self, ids: &[u64]) -> ChainResult<()> {
        for id in ids {
            self.mutate_row(*id, |row| {
                row.status = QueueStatus::Pending;
                row.updated_at = Utc::now();
            })?;
        }
        Ok(())
    }

    async fn reset_stuck(&self, threshold: DateTime<Utc>) -> ChainResult<u64> {
        let mut reset = 0;
        for row in self.all_rows()? {
            let stuck = matches!(row.status, QueueStatus::Signing | QueueStatus::Uploading)
                && row.updated_at < threshold;
            if stuck {
                self.mutate_row(row.id, |r| {
                    r.status = QueueStatus::Pending;
                    r.updated_at = Utc::now();
                })?;
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn reset_failed_under_limit(&self, max_retries: u32) -> ChainResult<FailedReset> {
        let mut outcome = FailedReset::default();
        for row in self.all_rows()? {
            if row.status != QueueStatus::Failed {
                continue;
            }
            if row.retry_count < max_retries {
                self.mutate_row(row.id, |r| {
                    r.status = QueueStatus::Pending;
                    r.updated_at = Utc::now();
                })?;
                outcome.reset += 1;
            } else {
                outcome.abandoned += 1;
            }
        }
        Ok(outcome)
    }

    async fn stats(&self) -> ChainResult<QueueStats> {
        let mut stats = QueueStats::default();
        for row in self.all_rows()? {
            match row.status {
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
impl ManifestSource for SledStore {
    async fn manifest(&self, cid: &str) -> ChainResult<Option<Vec<u8>>> {
        Ok(self
            .manifests
            .get(cid.as_bytes())
            .map_err(storage_err)?
            .map(|v| v.to_vec()))
    }
}

#[async_trait]
impl LookupIndex for SledStore {
    async fn put(&self, key: &str, entry: &IndexEntry) -> ChainResult<()> {
        self.index
            .insert(key.as_bytes(), Self::serialize(entry)?)
            .map_err(storage_err)?;
        Ok(())
    }

    async fn lookup(&self, key: &str) -> ChainResult<Option<IndexEntry>> {
        match self.index.get(key.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl BundleTracker for SledStore {
    async fn track(&self, bundle: TrackedBundle) -> ChainResult<()> {
        self.bundles
            .insert(bundle.bundle_tx.as_bytes(), Self::serialize(&bundle)?)
            .map_err(storage_err)?;
        Ok(())
    }

    async fn bundle(&self, bundle_tx: &str) -> ChainResult<Option<TrackedBundle>> {
        match self.bundles.get(bundle_tx.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn due_for_check(
        &self,
        grace: Duration,
        now: DateTime<Utc>,
    ) -> ChainResult<Vec<TrackedBundle>> {
        Ok(self
            .all_bundles()?
            .into_iter()
            .filter(|b| b.is_pending() && b.age(now) >= grace)
            .collect())
    }

    async fn record_check(&self, bundle_tx: &str) -> ChainResult<()> {
        self.mutate_bundle(bundle_tx, |b| b.record_check())?;
        Ok(())
    }

    async fn mark_verified(&self, bundle_tx: &str, at: DateTime<Utc>) -> ChainResult<()> {
        self.mutate_bundle(bundle_tx, |b| b.mark_verified(at))?;
        Ok(())
    }

    async fn mark_failed(&self, bundle_tx: &str, at: DateTime<Utc>) -> ChainResult<()> {
        self.mutate_bundle(bundle_tx, |b| b.mark_failed(at))?;
        Ok(())
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> ChainResult<u64> {
        let mut pruned = 0;
        for bundle in self.all_bundles()? {
            if bundle.prunable(cutoff) {
                self.bundles
                    .remove(bundle.bundle_tx.as_bytes())
                    .map_err(storage_err)?;
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    async fn counters(&self, now: DateTime<Utc>) -> ChainResult<VerificationCounters> {
        let day_ago = now - Duration::hours(24);
        let mut counters = VerificationCounters::default();
        for bundle in self.all_bundles()? {
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
        self.all_bundles()
    }
}
