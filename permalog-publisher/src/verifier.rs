//! Seeding verifier
//!
//! An uploaded bundle is only provisionally done: the gateway may accept
//! the POST and still never propagate the data. Each tracked bundle is
//! status-checked once its grace period elapses. Confirmed bundles are
//! marked verified; bundles still absent past the seeding timeout are
//! marked failed, their entities re-inserted as fresh pending queue rows
//! (the chain self-heals by producing new records against the current
//! head), and a seeding-failure alert is fired.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use permalog_core::{NewQueueEntry, Operation, TrackedBundle, Visibility};
use permalog_gateway::Gateway;
use permalog_store::{BundleTracker, QueueStore};

use crate::alerting::{Alert, AlertSeverity, Alerter};
use crate::config::PublisherConfig;
use crate::error::PublishResult;

/// Outcome of one verification pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifySummary {
    pub checked: usize,
    pub verified: usize,
    pub failed: usize,
    /// Queue rows re-inserted from failed bundles
    pub requeued: usize,
    pub pruned: u64,
}

/// Tracked-bundle verifier
pub struct SeedingVerifier {
    bundles: Arc<dyn BundleTracker>,
    queue: Arc<dyn QueueStore>,
    gateway: Arc<dyn Gateway>,
    alerter: Arc<Alerter>,
    grace: Duration,
    timeout: Duration,
    retention: Duration,
}

impl SeedingVerifier {
    pub fn new(
        bundles: Arc<dyn BundleTracker>,
        queue: Arc<dyn QueueStore>,
        gateway: Arc<dyn Gateway>,
        alerter: Arc<Alerter>,
        config: &PublisherConfig,
    ) -> Self {
        Self {
            bundles,
            queue,
            gateway,
            alerter,
            grace: Duration::seconds(config.seed_grace_period_secs as i64),
            timeout: Duration::seconds(config.seed_timeout_secs as i64),
            retention: Duration::seconds(config.retention_window_secs as i64),
        }
    }

    /// Check every due bundle and prune expired ones.
    pub async fn run(&self, now: DateTime<Utc>) -> PublishResult<VerifySummary> {
        let due = self.bundles.due_for_check(self.grace, now).await?;
        let mut summary = VerifySummary {
            checked: due.len(),
            ..Default::default()
        };

        for bundle in due {
            let confirmed = match self.gateway.tx_status(&bundle.bundle_tx).await {
                Ok(status) => status.is_confirmed(),
                Err(e) => {
                    debug!(bundle_tx = %bundle.bundle_tx, error = %e, "Seeding status check failed");
                    false
                }
            };

            if confirmed {
                self.bundles.mark_verified(&bundle.bundle_tx, now).await?;
                info!(
                    bundle_tx = %bundle.bundle_tx,
                    count = bundle.item_count,
                    "Bundle seeding verified"
                );
                summary.verified += 1;
            } else if bundle.age(now) >= self.timeout {
                summary.requeued += self.fail_bundle(&bundle, now).await?;
                summary.failed += 1;
            } else {
                self.bundles.record_check(&bundle.bundle_tx).await?;
            }
        }

        summary.pruned = self.bundles.prune(now - self.retention).await?;
        Ok(summary)
    }

    /// Mark the bundle failed, re-queue its entities and alert.
    async fn fail_bundle(&self, bundle: &TrackedBundle, now: DateTime<Utc>) -> PublishResult<usize> {
        warn!(
            bundle_tx = %bundle.bundle_tx,
            count = bundle.item_count,
            age_secs = bundle.age(now).num_seconds(),
            "Bundle never seeded; re-queueing entities"
        );
        self.bundles.mark_failed(&bundle.bundle_tx, now).await?;

        // Insert dedups on (entity_id, cid), so entities already waiting
        // in the queue are not duplicated.
        let mut requeued = 0;
        for item in &bundle.items {
            self.queue
                .insert(NewQueueEntry::new(
                    item.entity_id.clone(),
                    item.cid.clone(),
                    Operation::Update,
                    Visibility::Public,
                ))
                .await?;
            requeued += 1;
        }

        self.alerter
            .emit(
                Alert::new(
                    AlertSeverity::Error,
                    "Bundle seeding failure",
                    format!(
                        "bundle {} never became visible within {} minutes; {} entities re-queued",
                        bundle.bundle_tx,
                        self.timeout.num_minutes(),
                        bundle.items.len()
                    ),
                )
                .with_field("bundle_tx", bundle.bundle_tx.clone())
                .with_field("item_count", bundle.item_count.to_string()),
            )
            .await;

        Ok(requeued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGateway;
    use permalog_core::{BundleItemRef, BundleStatus};
    use permalog_gateway::TxStatus;
    use permalog_store::MemoryStore;

    fn config() -> PublisherConfig {
        PublisherConfig::default()
    }

    fn verifier(
        store: Arc<MemoryStore>,
        gateway: Arc<MockGateway>,
    ) -> (SeedingVerifier, Arc<Alerter>) {
        let alerter = Arc::new(Alerter::new());
        (
            SeedingVerifier::new(store.clone(), store, gateway, alerter.clone(), &config()),
            alerter,
        )
    }

    fn tracked(tx: &str, age_mins: i64) -> TrackedBundle {
        let mut bundle = TrackedBundle::new(
            tx,
            vec![
                BundleItemRef {
                    entity_id: "E1".to_string(),
                    cid: "C1".to_string(),
                },
                BundleItemRef {
                    entity_id: "E2".to_string(),
                    cid: "C2".to_string(),
                },
            ],
        );
        bundle.uploaded_at = Utc::now() - Duration::minutes(age_mins);
        bundle
    }

    #[tokio::test]
    async fn test_confirmed_bundle_verified() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        store.track(tracked("B1", 15)).await.unwrap();
        gateway.set_status(
            "B1",
            TxStatus::Confirmed {
                block_height: 10,
                confirmations: 2,
            },
        );

        let (verifier, _) = verifier(store.clone(), gateway);
        let summary = verifier.run(Utc::now()).await.unwrap();

        assert_eq!(summary.checked, 1);
        assert_eq!(summary.verified, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(
            store.bundle("B1").await.unwrap().unwrap().status,
            BundleStatus::Verified
        );
        // No rows re-queued.
        assert_eq!(store.stats().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_young_bundle_not_checked() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        // Five minutes old, inside the 10-minute grace period.
        store.track(tracked("B1", 5)).await.unwrap();

        let (verifier, _) = verifier(store.clone(), gateway);
        let summary = verifier.run(Utc::now()).await.unwrap();
        assert_eq!(summary.checked, 0);
    }

    #[tokio::test]
    async fn test_unseeded_within_timeout_stays_pending() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        // Past grace, inside the 30-minute timeout; gateway reports
        // NotFound.
        store.track(tracked("B1", 15)).await.unwrap();

        let (verifier, _) = verifier(store.clone(), gateway);
        let summary = verifier.run(Utc::now()).await.unwrap();

        assert_eq!(summary.checked, 1);
        assert_eq!(summary.failed, 0);
        let bundle = store.bundle("B1").await.unwrap().unwrap();
        assert_eq!(bundle.status, BundleStatus::Pending);
        assert_eq!(bundle.check_count, 1);
    }

    #[tokio::test]
    async fn test_seeding_timeout_requeues_and_alerts() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        // 35 minutes old, past the 30-minute timeout.
        store.track(tracked("B1", 35)).await.unwrap();

        let (verifier, alerter) = verifier(store.clone(), gateway);
        let summary = verifier.run(Utc::now()).await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.requeued, 2);
        assert_eq!(
            store.bundle("B1").await.unwrap().unwrap().status,
            BundleStatus::Failed
        );

        // Both entities are pending exactly once.
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.pending, 2);

        let alerts = alerter.recent(10).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Error);
        assert_eq!(alerts[0].fields["bundle_tx"], "B1");
    }

    #[tokio::test]
    async fn test_requeue_dedups_against_existing_rows() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        store.track(tracked("B1", 35)).await.unwrap();

        // E1/C1 is already waiting in the queue.
        store
            .insert(NewQueueEntry::new("E1", "C1", Operation::Update, Visibility::Public))
            .await
            .unwrap();

        let (verifier, _) = verifier(store.clone(), gateway);
        verifier.run(Utc::now()).await.unwrap();

        assert_eq!(store.stats().await.unwrap().pending, 2);
    }
}
