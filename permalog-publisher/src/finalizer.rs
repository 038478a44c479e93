//! Finalizer
//!
//! Turns per-record upload outcomes into durable state: advances the
//! chain head over the longest successful prefix, writes the lookup
//! index, deletes committed queue rows, reverts the rest to pending and
//! registers uploaded bundles for seeding verification.
//!
//! The chain may only advance to the last contiguously successful
//! record: the first failure carries away every later record, whose
//! `prev_tx` now points at an id that never reached the network.

use std::sync::Arc;
use tracing::{error, info, warn};

use permalog_core::constants::MAX_BATCH_PARAMS;
use permalog_core::types::index;
use permalog_core::{BundleItemRef, ChainHead, IndexEntry, TrackedBundle};
use permalog_store::{BundleTracker, ChainStateStore, LookupIndex, QueueStore};

use crate::error::PublishResult;
use crate::retry::RetryPolicy;
use crate::signer::SignedRecord;
use crate::uploader::UploadReport;

/// Attempts per index-write chunk before giving up (the index is
/// reconstructible from the network, so failures are non-fatal).
const INDEX_WRITE_ATTEMPTS: u32 = 3;

/// Length of the leading run of successes.
pub fn longest_successful_prefix(report: &UploadReport) -> usize {
    report
        .outcomes
        .iter()
        .take_while(|outcome| outcome.success)
        .count()
}

/// Outcome of finalizing one batch
#[derive(Debug, Clone)]
pub struct FinalizeSummary {
    /// Records committed to the chain
    pub committed: usize,
    /// Rows reverted to pending
    pub reverted: usize,
    /// Head after the batch
    pub head: ChainHead,
}

/// Batch finalizer
pub struct Finalizer {
    chain: Arc<dyn ChainStateStore>,
    queue: Arc<dyn QueueStore>,
    index: Arc<dyn LookupIndex>,
    bundles: Arc<dyn BundleTracker>,
    max_retries: u32,
    policy: RetryPolicy,
}

impl Finalizer {
    pub fn new(
        chain: Arc<dyn ChainStateStore>,
        queue: Arc<dyn QueueStore>,
        index: Arc<dyn LookupIndex>,
        bundles: Arc<dyn BundleTracker>,
        max_retries: u32,
    ) -> Self {
        Self {
            chain,
            queue,
            index,
            bundles,
            max_retries,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Finalize `records` (in signing order) against `report`.
    ///
    /// `chain_key` is the chain the batch was signed against; `head` is
    /// the pre-batch head, returned unchanged when nothing committed.
    pub async fn finalize(
        &self,
        chain_key: &str,
        head: &ChainHead,
        records: &[SignedRecord],
        report: &UploadReport,
    ) -> PublishResult<FinalizeSummary> {
        let committed = longest_successful_prefix(report);
        let accepted = &records[..committed.min(records.len())];

        let new_head = if let Some(last) = accepted.last() {
            // A failed head write after a successful upload orphans the
            // uploaded records: they exist on the network but the chain
            // does not reference them. The chain itself stays
            // consistent, so this is fatal for the tick only.
            if let Err(e) = self
                .chain
                .update(chain_key, last.id(), &last.record.cid, last.record.seq)
                .await
            {
                error!(
                    chain_key,
                    tx = %last.id(),
                    seq = last.record.seq,
                    error = %e,
                    "CRITICAL: chain head update failed after successful upload"
                );
                return Err(e.into());
            }
            head.advanced(last.id(), last.record.cid.clone(), last.record.seq)
        } else {
            head.clone()
        };

        self.write_index_entries(accepted, report.bundle_tx.is_some())
            .await;

        // Committed rows leave the queue entirely.
        let committed_ids: Vec<u64> = accepted.iter().map(|r| r.entry.id).collect();
        for chunk in committed_ids.chunks(MAX_BATCH_PARAMS) {
            self.queue.delete(chunk).await?;
        }

        // Everything after the break reverts to pending and will be
        // re-signed against the new head next tick. Rows that just
        // consumed their last retry move to failed instead and wait for
        // the daily job (which leaves rows at the cap alone).
        let mut reverted = 0;
        for (record, outcome) in records.iter().zip(&report.outcomes).skip(committed) {
            let reason = outcome
                .error
                .clone()
                .unwrap_or_else(|| "batch broken by earlier upload failure".to_string());
            self.revert_row(&record.entry, &reason).await?;
            reverted += 1;
        }
        // Records the report never covered (should not happen) also
        // revert rather than stay locked.
        for record in records.iter().skip(report.outcomes.len().max(committed)) {
            self.revert_row(&record.entry, "no upload outcome recorded")
                .await?;
            reverted += 1;
        }

        if let Some(bundle_tx) = &report.bundle_tx {
            let items = accepted
                .iter()
                .map(|r| BundleItemRef {
                    entity_id: r.entry.entity_id.clone(),
                    cid: r.entry.cid.clone(),
                })
                .collect();
            self.bundles
                .track(TrackedBundle::new(bundle_tx.clone(), items))
                .await?;
        }

        info!(
            chain_key,
            committed,
            reverted,
            seq = new_head.seq,
            "Batch finalized"
        );

        Ok(FinalizeSummary {
            committed,
            reverted,
            head: new_head,
        })
    }

    /// Revert one row, tipping it into `failed` when the retry budget
    /// is spent.
    async fn revert_row(
        &self,
        entry: &permalog_core::QueueEntry,
        reason: &str,
    ) -> PublishResult<()> {
        self.queue.revert_to_pending(entry.id, reason).await?;
        if entry.retry_count + 1 >= self.max_retries {
            warn!(
                entry_id = entry.id,
                retry_count = entry.retry_count + 1,
                "Row exhausted its retries"
            );
            self.queue.mark_failed(entry.id, reason).await?;
        }
        Ok(())
    }

    /// Write `:{ver}` and `:latest` entries for each committed record,
    /// chunked, with backoff on failures (rate limits included). Index
    /// failures are logged and skipped; a later tick can rebuild the
    /// entries from the network.
    async fn write_index_entries(&self, accepted: &[SignedRecord], bundled: bool) {
        let entries: Vec<(String, IndexEntry)> = accepted
            .iter()
            .flat_map(|record| {
                let entry = IndexEntry {
                    cid: record.record.cid.clone(),
                    tx: record.id().to_string(),
                    seq: record.record.seq,
                    ts: record.record.ts,
                    bundled: bundled.then_some(true),
                };
                [
                    (
                        index::version_key(&record.record.pi, record.record.ver),
                        entry.clone(),
                    ),
                    (index::latest_key(&record.record.pi), entry),
                ]
            })
            .collect();

        for chunk in entries.chunks(MAX_BATCH_PARAMS) {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match self.write_chunk(chunk).await {
                    Ok(()) => break,
                    Err(e) if attempt < INDEX_WRITE_ATTEMPTS => {
                        warn!(attempt, error = %e, "Index write chunk failed, backing off");
                        tokio::time::sleep(self.policy.delay_for_attempt(attempt)).await;
                    }
                    Err(e) => {
                        warn!(
                            count = chunk.len(),
                            error = %e,
                            "Index write chunk dropped after retries"
                        );
                        break;
                    }
                }
            }
        }
    }

    async fn write_chunk(&self, chunk: &[(String, IndexEntry)]) -> PublishResult<()> {
        for (key, entry) in chunk {
            self.index.put(key, entry).await?;
        }
        Ok(())
    }
}
