//! Uploader
//!
//! Posts signed records to the network. Direct mode uploads every record
//! individually with bounded concurrency and per-request retry; bundle
//! mode posts the container once and then confirms the gateway actually
//! knows the transaction before reporting success, so an HTTP 200 whose
//! data never propagated ("ghost upload") is treated as a failure.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use permalog_gateway::{Gateway, GatewayError, TxStatus};

use crate::bundle::SignedBundle;
use crate::config::PublisherConfig;
use crate::retry::RetryPolicy;
use crate::signer::SignedRecord;

/// Post-upload existence checks before a bundle counts as uploaded.
const VERIFY_ATTEMPTS: u32 = 5;
const VERIFY_DELAY: Duration = Duration::from_millis(1000);

/// Per-record upload outcome, in batch order
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    /// Record id
    pub id: String,
    pub success: bool,
    pub error: Option<String>,
    pub attempts: u32,
}

/// Outcome of one upload call
#[derive(Debug, Clone)]
pub struct UploadReport {
    pub outcomes: Vec<RecordOutcome>,
    /// Set when a bundle was uploaded and confirmed to exist
    pub bundle_tx: Option<String>,
    /// At least one upload was rejected with payment-required
    pub payment_required: bool,
}

impl UploadReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }
}

/// Uploader over an injected gateway
pub struct Uploader {
    gateway: Arc<dyn Gateway>,
    concurrency: usize,
    timeout: Duration,
    max_attempts: u32,
    policy: RetryPolicy,
}

impl Uploader {
    pub fn new(gateway: Arc<dyn Gateway>, config: &PublisherConfig) -> Self {
        Self {
            gateway,
            concurrency: config.concurrency.max(1),
            timeout: config.upload_timeout(),
            max_attempts: config.max_retries.max(1),
            policy: RetryPolicy::default(),
        }
    }

    /// Override the backoff policy (tests use short delays).
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Upload each record individually. Outcomes are returned in input
    /// order regardless of completion order.
    pub async fn upload_direct(&self, records: &[SignedRecord]) -> UploadReport {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let uploads = records.iter().map(|record| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                self.post_with_retry(&record.item.id, &record.item.bytes).await
            }
        });

        let (outcomes, payment_flags): (Vec<_>, Vec<_>) =
            join_all(uploads).await.into_iter().unzip();
        UploadReport {
            outcomes,
            bundle_tx: None,
            payment_required: payment_flags.into_iter().any(|p| p),
        }
    }

    /// Upload a sealed bundle. All-or-nothing: every carried record
    /// succeeds or every one fails.
    pub async fn upload_bundle(&self, bundle: &SignedBundle) -> UploadReport {
        let result = self.post_once(&bundle.bundle_tx, &bundle.bytes).await;

        let mut payment_required = false;
        let (success, error) = match result {
            Ok(()) => match self.confirm_exists(&bundle.bundle_tx).await {
                true => (true, None),
                false => (
                    false,
                    Some("bundle accepted but never visible on gateway".to_string()),
                ),
            },
            Err(e) => {
                payment_required = matches!(e, GatewayError::PaymentRequired(_));
                (false, Some(e.to_string()))
            }
        };

        if !success {
            warn!(
                bundle_tx = %bundle.bundle_tx,
                count = bundle.item_count(),
                error = error.as_deref().unwrap_or(""),
                "Bundle upload failed"
            );
        }

        UploadReport {
            outcomes: bundle
                .item_ids
                .iter()
                .map(|id| RecordOutcome {
                    id: id.clone(),
                    success,
                    error: error.clone(),
                    attempts: 1,
                })
                .collect(),
            bundle_tx: success.then(|| bundle.bundle_tx.clone()),
            payment_required,
        }
    }

    async fn post_once(&self, id: &str, body: &[u8]) -> Result<(), GatewayError> {
        match tokio::time::timeout(self.timeout, self.gateway.post_transaction(id, body)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Connection(format!(
                "upload timed out after {:?}",
                self.timeout
            ))),
        }
    }

    /// Returns the outcome and whether the terminal error was
    /// payment-required.
    async fn post_with_retry(&self, id: &str, body: &[u8]) -> (RecordOutcome, bool) {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.post_once(id, body).await {
                Ok(()) => {
                    debug!(tx = %id, attempts, "Record uploaded");
                    return (
                        RecordOutcome {
                            id: id.to_string(),
                            success: true,
                            error: None,
                            attempts,
                        },
                        false,
                    );
                }
                Err(e) if !e.is_retryable() || attempts >= self.max_attempts => {
                    warn!(tx = %id, attempts, error = %e, "Record upload failed");
                    let payment = matches!(e, GatewayError::PaymentRequired(_));
                    return (
                        RecordOutcome {
                            id: id.to_string(),
                            success: false,
                            error: Some(e.to_string()),
                            attempts,
                        },
                        payment,
                    );
                }
                Err(e) => {
                    debug!(tx = %id, attempts, error = %e, "Record upload retrying");
                    tokio::time::sleep(self.policy.delay_for_attempt(attempts)).await;
                }
            }
        }
    }

    /// Small retry loop against the status endpoint; any status other
    /// than NotFound counts as existing.
    async fn confirm_exists(&self, id: &str) -> bool {
        for attempt in 0..VERIFY_ATTEMPTS {
            match self.gateway.tx_status(id).await {
                Ok(TxStatus::NotFound) => {}
                Ok(_) => return true,
                Err(e) => {
                    debug!(tx = %id, error = %e, "Status check failed during upload verify");
                }
            }
            if attempt + 1 < VERIFY_ATTEMPTS {
                tokio::time::sleep(VERIFY_DELAY).await;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle;
    use crate::dataitem;
    use crate::signer::RecordSigner;
    use crate::testing::MockGateway;
    use chrono::Utc;
    use permalog_core::{ChainHead, Manifest, Operation, QueueEntry, QueueStatus, Visibility};
    use permalog_wallet::Wallet;

    fn signed_records(n: usize) -> Vec<SignedRecord> {
        let rows = (0..n)
            .map(|i| {
                let entry = QueueEntry {
                    id: i as u64 + 1,
                    entity_id: format!("E{}", i),
                    cid: format!("C{}", i),
                    op: Operation::Update,
                    vis: Visibility::Public,
                    ts: Utc::now(),
                    status: QueueStatus::Signing,
                    retry_count: 0,
                    error_message: None,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                };
                let manifest = Manifest::parse(&entry.cid, br#"{"ver": 1}"#).unwrap();
                (entry, manifest)
            })
            .collect();
        RecordSigner::new(Arc::new(Wallet::from_secret_bytes(&[2u8; 32])))
            .sign_batch(&ChainHead::genesis(), rows)
            .unwrap()
    }

    fn uploader(gateway: Arc<MockGateway>) -> Uploader {
        Uploader::new(gateway, &PublisherConfig::default())
            .with_policy(RetryPolicy::Fixed { delay_ms: 1 })
    }

    #[tokio::test]
    async fn test_direct_all_succeed() {
        let gateway = Arc::new(MockGateway::new());
        let records = signed_records(3);
        let report = uploader(gateway.clone()).upload_direct(&records).await;

        assert_eq!(report.succeeded(), 3);
        assert!(report.bundle_tx.is_none());
        assert_eq!(gateway.posted_ids().len(), 3);
        // Outcomes align with input order.
        for (outcome, record) in report.outcomes.iter().zip(&records) {
            assert_eq!(outcome.id, record.id());
        }
    }

    #[tokio::test]
    async fn test_direct_retries_transient_failure() {
        let gateway = Arc::new(MockGateway::new());
        let records = signed_records(1);
        gateway.fail_next(records[0].id(), 2);

        let report = uploader(gateway.clone()).upload_direct(&records).await;
        assert!(report.outcomes[0].success);
        assert_eq!(report.outcomes[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_direct_exhausts_retries() {
        let gateway = Arc::new(MockGateway::new());
        let records = signed_records(1);
        gateway.fail_next(records[0].id(), u32::MAX);

        let report = uploader(gateway.clone()).upload_direct(&records).await;
        let outcome = &report.outcomes[0];
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, PublisherConfig::default().max_retries);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_direct_payment_required_not_retried() {
        let gateway = Arc::new(MockGateway::new());
        *gateway.payment_required.lock().unwrap() = true;
        let records = signed_records(1);

        let report = uploader(gateway.clone()).upload_direct(&records).await;
        let outcome = &report.outcomes[0];
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert!(report.payment_required);
        assert_eq!(gateway.attempts_for(records[0].id()), 1);
    }

    #[tokio::test]
    async fn test_bundle_success_after_existence_check() {
        let gateway = Arc::new(MockGateway::new());
        let wallet = Wallet::from_secret_bytes(&[2u8; 32]);
        let items: Vec<_> = signed_records(2).into_iter().map(|r| r.item).collect();
        let sealed = bundle::seal_bundle(&wallet, &items);

        let report = uploader(gateway.clone()).upload_bundle(&sealed).await;
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.bundle_tx.as_deref(), Some(sealed.bundle_tx.as_str()));
    }

    #[tokio::test]
    async fn test_bundle_ghost_upload_fails_all() {
        let gateway = Arc::new(MockGateway::new());
        let wallet = Wallet::from_secret_bytes(&[2u8; 32]);
        let item = dataitem::sign_item(&wallet, &[], b"data");
        let sealed = bundle::seal_bundle(&wallet, &[item]);

        // The gateway accepts the post but status keeps reporting
        // NotFound.
        gateway.set_status(&sealed.bundle_tx, permalog_gateway::TxStatus::NotFound);

        let report = uploader(gateway).upload_bundle(&sealed).await;
        assert_eq!(report.succeeded(), 0);
        assert!(report.bundle_tx.is_none());
        assert!(report.outcomes[0]
            .error
            .as_deref()
            .unwrap()
            .contains("never visible"));
    }

    #[tokio::test]
    async fn test_bundle_post_failure_fails_all() {
        let gateway = Arc::new(MockGateway::new());
        let wallet = Wallet::from_secret_bytes(&[2u8; 32]);
        let items: Vec<_> = signed_records(3).into_iter().map(|r| r.item).collect();
        let sealed = bundle::seal_bundle(&wallet, &items);
        gateway.fail_next(&sealed.bundle_tx, u32::MAX);

        let report = uploader(gateway).upload_bundle(&sealed).await;
        assert_eq!(report.succeeded(), 0);
        assert_eq!(report.outcomes.len(), 3);
        assert!(report.outcomes.iter().all(|o| !o.success));
    }
}
