//! Publisher service
//!
//! Owns the write-path components and drives one tick at a time:
//! `cleanup -> balance gate -> process -> verify`. The background runner
//! in [`runner`] schedules ticks; the admin surface calls the same
//! methods synchronously.

mod runner;

pub use runner::{BackgroundRunner, RunnerHandle};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use permalog_core::constants::TEST_CHAIN_KEY;
use permalog_core::{
    BundleItemRef, ChainHead, Operation, QueueEntry, QueueStats, QueueStatus, TrackedBundle,
    VerificationCounters, Visibility,
};
use permalog_gateway::Gateway;
use permalog_store::{BundleTracker, ChainStateStore, LookupIndex, ManifestSource, QueueStore};
use permalog_wallet::Wallet;

use crate::alerting::{Alert, AlertSeverity, Alerter};
use crate::balance::{BalanceGate, BalanceStatus};
use crate::bundle;
use crate::config::PublisherConfig;
use crate::error::{PublishError, PublishResult};
use crate::processor::{ProcessResult, Processor};
use crate::retry::RetryPolicy;
use crate::signer::RecordSigner;
use crate::uploader::Uploader;
use crate::verifier::{SeedingVerifier, VerifySummary};

/// Outcome of the most recent processing tick, kept for health
#[derive(Debug, Clone)]
pub struct LastBatch {
    pub result: ProcessResult,
    pub finished_at: DateTime<Utc>,
}

/// Report returned by the admin test pipeline
#[derive(Debug, Clone, serde::Serialize)]
pub struct TestBundleReport {
    pub bundle_tx: String,
    pub record_ids: Vec<String>,
    pub count: usize,
    pub sign_ms: u64,
    pub upload_ms: u64,
    pub duration_ms: u64,
}

/// The assembled write path
pub struct PublisherService {
    config: PublisherConfig,
    queue: Arc<dyn QueueStore>,
    chain: Arc<dyn ChainStateStore>,
    bundles: Arc<dyn BundleTracker>,
    wallet: Arc<Wallet>,
    alerter: Arc<Alerter>,
    processor: Processor,
    verifier: SeedingVerifier,
    balance_gate: BalanceGate,
    uploader: Uploader,
    /// Single-writer discipline for the chain head: one tick at a time.
    tick_guard: Mutex<()>,
    last_batch: RwLock<Option<LastBatch>>,
}

impl PublisherService {
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
        let processor = Processor::new(
            config.clone(),
            queue.clone(),
            chain.clone(),
            manifests,
            index,
            bundles.clone(),
            wallet.clone(),
            gateway.clone(),
            alerter.clone(),
        );
        let verifier = SeedingVerifier::new(
            bundles.clone(),
            queue.clone(),
            gateway.clone(),
            alerter.clone(),
            &config,
        );
        let balance_gate = BalanceGate::new(gateway.clone(), wallet.address(), &config);
        let uploader = Uploader::new(gateway, &config);

        Self {
            config,
            queue,
            chain,
            bundles,
            wallet,
            alerter,
            processor,
            verifier,
            balance_gate,
            uploader,
            tick_guard: Mutex::new(()),
            last_batch: RwLock::new(None),
        }
    }

    /// Shorten backoff delays; used by tests.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.processor = self.processor.with_retry_policy(policy.clone());
        self.uploader = self.uploader.with_policy(policy);
        self
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    pub fn alerter(&self) -> &Arc<Alerter> {
        &self.alerter
    }

    pub fn wallet_address(&self) -> &str {
        self.balance_gate.address()
    }

    /// One full tick: cleanup, balance gate, queue processing, seeding
    /// verification. Concurrent callers are skipped rather than queued;
    /// their rows stay untouched for the running tick.
    pub async fn run_tick(&self) -> PublishResult<ProcessResult> {
        let started = Instant::now();
        let Ok(_guard) = self.tick_guard.try_lock() else {
            return Ok(ProcessResult::skipped(
                "another tick is running",
                started.elapsed().as_millis() as u64,
            ));
        };

        self.cleanup_stuck().await?;

        let balance = self.balance_gate.check().await;
        match balance {
            BalanceStatus::Critical { ar } => {
                self.alerter
                    .emit(
                        Alert::new(
                            AlertSeverity::Critical,
                            "Wallet balance critical",
                            format!(
                                "balance {:.4} AR is below the critical threshold {:.4} AR; processing skipped",
                                ar, self.config.critical_balance_ar
                            ),
                        )
                        .with_field("balance_ar", format!("{:.6}", ar))
                        .with_field("address", self.wallet_address().to_string()),
                    )
                    .await;
                let result =
                    ProcessResult::skipped("balance critical", started.elapsed().as_millis() as u64);
                self.remember(&result).await;
                return Ok(result);
            }
            BalanceStatus::Low { ar } => {
                self.alerter
                    .emit(
                        Alert::new(
                            AlertSeverity::Warn,
                            "Wallet balance low",
                            format!(
                                "balance {:.4} AR is below the warning threshold {:.4} AR",
                                ar, self.config.warning_balance_ar
                            ),
                        )
                        .with_field("balance_ar", format!("{:.6}", ar)),
                    )
                    .await;
            }
            _ => {}
        }

        let result = self.processor.process(&self.config.chain_key).await?;
        self.remember(&result).await;

        if let Err(e) = self.verifier.run(Utc::now()).await {
            warn!(error = %e, "Seeding verification pass failed");
        }

        Ok(result)
    }

    /// Daily maintenance: retry failed rows under the cap, then reclaim
    /// stuck rows.
    pub async fn run_daily(&self) -> PublishResult<()> {
        let outcome = self
            .queue
            .reset_failed_under_limit(self.config.max_retries)
            .await?;
        if outcome.abandoned > 0 {
            warn!(
                count = outcome.abandoned,
                max_retries = self.config.max_retries,
                "Abandoned rows at the retry cap remain in failed state"
            );
        }
        if outcome.reset > 0 {
            info!(count = outcome.reset, "Failed rows reset for retry");
        }
        self.cleanup_stuck().await?;
        Ok(())
    }

    /// Reclaim rows stuck in signing/uploading past the threshold.
    pub async fn cleanup_stuck(&self) -> PublishResult<u64> {
        let threshold =
            Utc::now() - ChronoDuration::seconds(self.config.stuck_threshold_secs as i64);
        let reset = self.queue.reset_stuck(threshold).await?;
        if reset > 0 {
            info!(count = reset, "Reclaimed stuck queue rows");
        }
        Ok(reset)
    }

    /// Run one seeding-verification pass.
    pub async fn run_verification(&self) -> PublishResult<VerifySummary> {
        self.verifier.run(Utc::now()).await
    }

    /// Exercise the full sign -> bundle -> upload -> finalize path with
    /// synthetic records against the isolated test chain key. Never
    /// touches the production head or the queue.
    pub async fn test_bundle(&self, count: usize) -> PublishResult<TestBundleReport> {
        if count == 0 || count > 100 {
            return Err(PublishError::Configuration(format!(
                "test bundle count must be between 1 and 100, got {}",
                count
            )));
        }

        let started = Instant::now();
        let run_id = Uuid::new_v4().simple().to_string();
        let head = self.chain.get(TEST_CHAIN_KEY).await?;

        let rows: Vec<_> = (0..count)
            .map(|i| {
                let now = Utc::now();
                let entry = QueueEntry {
                    id: i as u64,
                    entity_id: format!("test:{}:{}", run_id, i),
                    cid: format!("test-cid-{}-{}", run_id, i),
                    op: Operation::Update,
                    vis: Visibility::Public,
                    ts: now,
                    status: QueueStatus::Signing,
                    retry_count: 0,
                    error_message: None,
                    created_at: now,
                    updated_at: now,
                };
                let manifest = permalog_core::Manifest::parse(
                    &entry.cid,
                    format!(r#"{{"ver": 1, "test_run": "{}"}}"#, run_id).as_bytes(),
                )
                .expect("synthetic manifest is valid");
                (entry, manifest)
            })
            .collect();

        let signer = RecordSigner::new(self.wallet.clone());
        let signed = signer.sign_batch(&head, rows)?;
        let sign_ms = started.elapsed().as_millis() as u64;

        let items: Vec<_> = signed.iter().map(|r| r.item.clone()).collect();
        let sealed = bundle::seal_bundle(&self.wallet, &items);

        let upload_started = Instant::now();
        let report = self.uploader.upload_bundle(&sealed).await;
        let upload_ms = upload_started.elapsed().as_millis() as u64;

        if report.succeeded() != signed.len() {
            let reason = report
                .outcomes
                .first()
                .and_then(|o| o.error.clone())
                .unwrap_or_else(|| "upload failed".to_string());
            return Err(PublishError::Aborted(format!(
                "test bundle upload failed: {}",
                reason
            )));
        }

        let last = signed.last().expect("count >= 1");
        self.chain
            .update(TEST_CHAIN_KEY, last.id(), &last.record.cid, last.record.seq)
            .await?;

        self.bundles
            .track(TrackedBundle::new(
                sealed.bundle_tx.clone(),
                signed
                    .iter()
                    .map(|r| BundleItemRef {
                        entity_id: r.entry.entity_id.clone(),
                        cid: r.entry.cid.clone(),
                    })
                    .collect(),
            ))
            .await?;

        info!(
            bundle_tx = %sealed.bundle_tx,
            count,
            chain_key = TEST_CHAIN_KEY,
            "Test bundle committed"
        );

        Ok(TestBundleReport {
            bundle_tx: sealed.bundle_tx,
            record_ids: signed.iter().map(|r| r.id().to_string()).collect(),
            count,
            sign_ms,
            upload_ms,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Register a synthetic tracked bundle, optionally backdated, for
    /// verifier testing.
    pub async fn inject_tracked_bundle(
        &self,
        bundle_tx: &str,
        item_count: usize,
        age_secs: i64,
    ) -> PublishResult<TrackedBundle> {
        let items = (0..item_count)
            .map(|i| BundleItemRef {
                entity_id: format!("test:inject:{}", i),
                cid: format!("test-inject-cid-{}-{}", bundle_tx, i),
            })
            .collect();
        let mut bundle = TrackedBundle::new(bundle_tx, items);
        bundle.uploaded_at = Utc::now() - ChronoDuration::seconds(age_secs);
        self.bundles.track(bundle.clone()).await?;
        Ok(bundle)
    }

    pub async fn tracked_bundles(&self) -> PublishResult<Vec<TrackedBundle>> {
        Ok(self.bundles.list().await?)
    }

    // Health surface inputs.

    pub async fn head(&self) -> PublishResult<ChainHead> {
        Ok(self.chain.get(&self.config.chain_key).await?)
    }

    pub async fn queue_stats(&self) -> PublishResult<QueueStats> {
        Ok(self.queue.stats().await?)
    }

    pub async fn verification_counters(&self) -> PublishResult<VerificationCounters> {
        Ok(self.bundles.counters(Utc::now()).await?)
    }

    pub async fn balance_status(&self) -> BalanceStatus {
        self.balance_gate.check().await
    }

    pub async fn last_batch(&self) -> Option<LastBatch> {
        self.last_batch.read().await.clone()
    }

    async fn remember(&self, result: &ProcessResult) {
        *self.last_batch.write().await = Some(LastBatch {
            result: result.clone(),
            finished_at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGateway;
    use permalog_core::constants::WINSTON_PER_AR;
    use permalog_core::NewQueueEntry;
    use permalog_store::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        service: PublisherService,
    }

    impl Fixture {
        fn new(config: PublisherConfig, gateway: MockGateway) -> Self {
            let store = Arc::new(MemoryStore::new());
            let wallet = Arc::new(Wallet::from_secret_bytes(&[1u8; 32]));
            let service = PublisherService::new(
                config,
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                wallet,
                Arc::new(gateway),
                Arc::new(Alerter::new()),
            )
            .with_retry_policy(RetryPolicy::Fixed { delay_ms: 1 });
            Self { store, service }
        }

        fn eager() -> Self {
            Self::new(
                PublisherConfig {
                    bundle_size_threshold: 1,
                    ..PublisherConfig::default()
                },
                MockGateway::new(),
            )
        }

        async fn enqueue(&self, entity: &str, cid: &str) {
            self.store
                .put_manifest(cid, br#"{"ver": 1}"#.to_vec())
                .await;
            self.store
                .insert(NewQueueEntry::new(
                    entity,
                    cid,
                    Operation::Update,
                    Visibility::Public,
                ))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_tick_processes_queue_and_records_last_batch() {
        let f = Fixture::eager();
        f.enqueue("E1", "C1").await;

        let result = f.service.run_tick().await.unwrap();
        assert_eq!(result.succeeded, 1);

        let last = f.service.last_batch().await.unwrap();
        assert_eq!(last.result.succeeded, 1);
        assert_eq!(f.service.head().await.unwrap().seq, 1);
    }

    #[tokio::test]
    async fn test_critical_balance_skips_tick_and_alerts() {
        // 0.01 AR against the 0.05 AR critical threshold.
        let f = Fixture::new(
            PublisherConfig {
                bundle_size_threshold: 1,
                ..PublisherConfig::default()
            },
            MockGateway::with_balance(WINSTON_PER_AR / 100),
        );
        f.enqueue("E1", "C1").await;

        let result = f.service.run_tick().await.unwrap();
        assert_eq!(result.processed, 0);
        assert_eq!(result.succeeded, 0);
        assert_eq!(result.failed, 0);
        assert!(result.skipped.is_some());

        // Queue untouched, critical alert fired.
        assert_eq!(f.service.queue_stats().await.unwrap().pending, 1);
        let alerts = f.service.alerter().recent(10).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
    }

    #[tokio::test]
    async fn test_cleanup_reclaims_stuck_rows() {
        let f = Fixture::eager();
        f.enqueue("E1", "C1").await;
        let rows = f.store.fetch_pending(10).await.unwrap();
        // Lock the row 20 minutes in the past.
        f.store
            .mark_signing(
                &[rows[0].id],
                Utc::now() - ChronoDuration::minutes(20),
            )
            .await
            .unwrap();

        let reset = f.service.cleanup_stuck().await.unwrap();
        assert_eq!(reset, 1);
        assert_eq!(f.service.queue_stats().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_daily_reset_respects_cap_and_logs_abandoned() {
        let f = Fixture::eager();
        f.enqueue("E1", "C1").await;
        let rows = f.store.fetch_pending(10).await.unwrap();
        permalog_store::QueueStore::mark_failed(f.store.as_ref(), rows[0].id, "boom")
            .await
            .unwrap();

        f.service.run_daily().await.unwrap();
        assert_eq!(f.service.queue_stats().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_test_bundle_isolated_from_production_head() {
        let f = Fixture::eager();
        let report = f.service.test_bundle(3).await.unwrap();

        assert_eq!(report.count, 3);
        assert_eq!(report.record_ids.len(), 3);
        assert!(!report.bundle_tx.is_empty());

        // The production head never moved; the test head did.
        assert!(f.service.head().await.unwrap().is_genesis());
        let test_head = f.store.get(TEST_CHAIN_KEY).await.unwrap();
        assert_eq!(test_head.seq, 3);

        // The bundle is tracked for verification.
        assert!(f
            .store
            .bundle(&report.bundle_tx)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_test_bundle_rejects_bad_count() {
        let f = Fixture::eager();
        assert!(f.service.test_bundle(0).await.is_err());
        assert!(f.service.test_bundle(101).await.is_err());
    }

    #[tokio::test]
    async fn test_injected_bundle_visible_to_verifier() {
        let f = Fixture::eager();
        f.service
            .inject_tracked_bundle("B-test", 2, 40 * 60)
            .await
            .unwrap();

        // 40 minutes old and unknown to the gateway: the verifier fails
        // it and re-queues its items.
        let summary = f.service.run_verification().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.requeued, 2);
        assert_eq!(f.service.queue_stats().await.unwrap().pending, 2);
    }
}
