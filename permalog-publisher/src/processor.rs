//! Queue processor
//!
//! One processing tick: lock a batch of pending rows, fetch manifests in
//! parallel, sign sequentially, upload (bundle or direct), finalize.
//! Rows whose manifest is missing are failed and skipped without
//! blocking the batch; batches that do not meet the bundle thresholds
//! are released back to pending untouched and re-signed next tick
//! against whatever head is current then (signatures are never reused
//! across ticks).

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use permalog_core::constants::{MANIFEST_MISSING_ERROR, MAX_BATCH_PARAMS};
use permalog_core::{Manifest, QueueEntry};
use permalog_gateway::Gateway;
use permalog_store::{BundleTracker, ChainStateStore, LookupIndex, ManifestSource, QueueStore};
use permalog_wallet::Wallet;
use serde::{Deserialize, Serialize};

use crate::alerting::{Alert, AlertSeverity, Alerter};
use crate::bundle;
use crate::config::{PublisherConfig, UploadMode};
use crate::error::PublishResult;
use crate::finalizer::Finalizer;
use crate::retry::RetryPolicy;
use crate::signer::{RecordSigner, SignedRecord};
use crate::uploader::Uploader;

/// Outcome of one processing tick
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessResult {
    /// Rows locked by this tick
    pub processed: usize,
    /// Records committed to the chain
    pub succeeded: usize,
    /// Rows failed or reverted with a retry consumed
    pub failed: usize,
    /// Rows released untouched (thresholds not met, deadline reached)
    pub deferred: usize,
    pub duration_ms: u64,
    /// Set when the tick was skipped entirely (e.g. critical balance)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

impl ProcessResult {
    pub fn skipped(reason: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            skipped: Some(reason.into()),
            duration_ms,
            ..Default::default()
        }
    }
}

/// The per-tick pipeline
pub struct Processor {
    config: PublisherConfig,
    queue: Arc<dyn QueueStore>,
    chain: Arc<dyn ChainStateStore>,
    manifests: Arc<dyn ManifestSource>,
    wallet: Arc<Wallet>,
    alerter: Arc<Alerter>,
    signer: RecordSigner,
    uploader: Uploader,
    finalizer: Finalizer,
}

impl Processor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PublisherConfig,
        queue: Arc<dyn QueueStore>,
        chain: Arc<dyn ChainStateStore>,
        manifests: Arc<dyn ManifestSource>,
        index: Arc<dyn LookupIndex>,
        bundles: Arc<dyn BundleTracker>,
        wallet: Arc<Wallet>,
        gateway: Arc<dyn Gateway>,
        alerter: Arc<Alerter>,
    ) -> Self {
        let signer = RecordSigner::new(wallet.clone());
        let uploader = Uploader::new(gateway, &config);
        let finalizer = Finalizer::new(
            chain.clone(),
            queue.clone(),
            index,
            bundles,
            config.max_retries,
        );
        Self {
            config,
            queue,
            chain,
            manifests,
            wallet,
            alerter,
            signer,
            uploader,
            finalizer,
        }
    }

    /// Override upload/index backoff (tests use short delays).
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.uploader = self.uploader.with_policy(policy.clone());
        self.finalizer = self.finalizer.with_policy(policy);
        self
    }

    /// Run one tick against `chain_key`.
    pub async fn process(&self, chain_key: &str) -> PublishResult<ProcessResult> {
        let started = Instant::now();
        let deadline = started + self.config.max_process_time();

        let head = self.chain.get(chain_key).await?;
        let rows = self.queue.fetch_pending(self.config.batch_size).await?;
        if rows.is_empty() {
            return Ok(ProcessResult {
                duration_ms: started.elapsed().as_millis() as u64,
                ..Default::default()
            });
        }

        let processed = rows.len();
        debug!(chain_key, count = processed, seq = head.seq, "Batch locked");

        let ids: Vec<u64> = rows.iter().map(|r| r.id).collect();
        let now = Utc::now();
        for chunk in ids.chunks(MAX_BATCH_PARAMS) {
            self.queue.mark_signing(chunk, now).await?;
        }

        // Manifests are fetched in parallel; queue order is preserved.
        let (mut with_manifest, failed_manifests) = self.resolve_manifests(rows).await?;
        let mut failed = failed_manifests;
        let mut deferred = 0;

        // The hard bundle cap splits the batch on cumulative manifest
        // bytes; the tail defers to the next tick in queue order.
        if self.config.upload_mode == UploadMode::Bundle {
            let tail = self.split_oversized(&mut with_manifest);
            deferred += self.release(&tail).await?;
        }

        if with_manifest.is_empty() {
            return Ok(ProcessResult {
                processed,
                failed,
                deferred,
                duration_ms: started.elapsed().as_millis() as u64,
                ..Default::default()
            });
        }

        let oldest_created = with_manifest
            .iter()
            .map(|(row, _)| row.created_at)
            .min()
            .expect("non-empty batch");

        // Sequential signing; a signing failure aborts the batch and
        // leaves the rows locked for cleanup to reclaim.
        let signed = match self.signer.sign_batch(&head, with_manifest) {
            Ok(signed) => signed,
            Err(e) => {
                error!(chain_key, error = %e, "Signing aborted the batch");
                return Err(e);
            }
        };

        if self.config.upload_mode == UploadMode::Bundle {
            let accumulated: usize = signed.iter().map(|r| r.size()).sum();
            let oldest_age = Utc::now() - oldest_created;
            let size_ready = accumulated >= self.config.bundle_size_threshold;
            let time_ready =
                oldest_age.num_seconds() >= self.config.bundle_time_threshold_secs as i64;
            if !size_ready && !time_ready {
                debug!(
                    accumulated,
                    oldest_age_secs = oldest_age.num_seconds(),
                    "Bundle thresholds not met, deferring batch"
                );
                deferred += self.release_signed(&signed).await?;
                return Ok(ProcessResult {
                    processed,
                    failed,
                    deferred,
                    duration_ms: started.elapsed().as_millis() as u64,
                    ..Default::default()
                });
            }
        }

        // Keep slack before the next scheduled tick; deferred work is
        // simply re-fetched.
        if Instant::now() >= deadline {
            warn!(chain_key, "Tick deadline reached before upload, deferring batch");
            deferred += self.release_signed(&signed).await?;
            return Ok(ProcessResult {
                processed,
                failed,
                deferred,
                duration_ms: started.elapsed().as_millis() as u64,
                ..Default::default()
            });
        }

        let signed_ids: Vec<u64> = signed.iter().map(|r| r.entry.id).collect();
        let now = Utc::now();
        for chunk in signed_ids.chunks(MAX_BATCH_PARAMS) {
            self.queue.mark_uploading(chunk, now).await?;
        }

        let report = match self.config.upload_mode {
            UploadMode::Bundle => {
                let items: Vec<_> = signed.iter().map(|r| r.item.clone()).collect();
                let sealed = bundle::seal_bundle(&self.wallet, &items);
                info!(
                    bundle_tx = %sealed.bundle_tx,
                    count = sealed.item_count(),
                    size = sealed.size(),
                    "Uploading bundle"
                );
                self.uploader.upload_bundle(&sealed).await
            }
            UploadMode::Direct => self.uploader.upload_direct(&signed).await,
        };

        // Payment-required is non-retryable within the tick; the daily
        // retry picks the rows up once the balance is restored.
        if report.payment_required {
            self.alerter
                .emit(
                    Alert::new(
                        AlertSeverity::Error,
                        "Upload rejected: payment required",
                        "the gateway rejected an upload for lack of funds; affected rows reverted to pending",
                    )
                    .with_field("address", self.wallet.address().to_string()),
                )
                .await;
        }

        let summary = self
            .finalizer
            .finalize(chain_key, &head, &signed, &report)
            .await?;
        failed += summary.reverted;

        Ok(ProcessResult {
            processed,
            succeeded: summary.committed,
            failed,
            deferred,
            duration_ms: started.elapsed().as_millis() as u64,
            skipped: None,
        })
    }

    /// Fetch and validate manifests; rows without a valid manifest are
    /// marked failed and skipped. Returns surviving rows in queue order
    /// and the number failed.
    async fn resolve_manifests(
        &self,
        rows: Vec<QueueEntry>,
    ) -> PublishResult<(Vec<(QueueEntry, Manifest)>, usize)> {
        let source = &self.manifests;
        let fetches = stream::iter(rows.into_iter().map(|row| async move {
            let result = source.manifest(&row.cid).await;
            (row, result)
        }))
        .buffered(self.config.concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

        let mut resolved = Vec::with_capacity(fetches.len());
        let mut failed = 0;
        for (row, result) in fetches {
            let parsed = match result {
                Ok(Some(bytes)) => Manifest::parse(&row.cid, &bytes),
                Ok(None) => Err(permalog_core::ChainError::InvalidManifest {
                    cid: row.cid.clone(),
                    reason: "not found".to_string(),
                }),
                Err(e) => Err(e),
            };
            match parsed {
                Ok(manifest) => resolved.push((row, manifest)),
                Err(e) => {
                    warn!(
                        entry_id = row.id,
                        cid = %row.cid,
                        error = %e,
                        "Manifest unavailable, failing row"
                    );
                    self.queue
                        .mark_failed(row.id, MANIFEST_MISSING_ERROR)
                        .await?;
                    failed += 1;
                }
            }
        }
        Ok((resolved, failed))
    }

    /// Split off rows past the cumulative manifest-size cap, preserving
    /// queue order.
    fn split_oversized(
        &self,
        batch: &mut Vec<(QueueEntry, Manifest)>,
    ) -> Vec<(QueueEntry, Manifest)> {
        let mut cumulative = 0usize;
        let mut keep = batch.len();
        for (i, (_, manifest)) in batch.iter().enumerate() {
            cumulative = cumulative.saturating_add(manifest.byte_len());
            if cumulative > self.config.max_bundle_size && i > 0 {
                keep = i;
                break;
            }
        }
        batch.split_off(keep)
    }

    async fn release(&self, rows: &[(QueueEntry, Manifest)]) -> PublishResult<usize> {
        let ids: Vec<u64> = rows.iter().map(|(row, _)| row.id).collect();
        for chunk in ids.chunks(MAX_BATCH_PARAMS) {
            self.queue.release_to_pending(chunk).await?;
        }
        Ok(ids.len())
    }

    async fn release_signed(&self, signed: &[SignedRecord]) -> PublishResult<usize> {
        let ids: Vec<u64> = signed.iter().map(|r| r.entry.id).collect();
        for chunk in ids.chunks(MAX_BATCH_PARAMS) {
            self.queue.release_to_pending(chunk).await?;
        }
        Ok(ids.len())
    }
}
