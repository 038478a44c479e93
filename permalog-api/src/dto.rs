//! API request/response bodies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use permalog_core::{QueueStats, TrackedBundle, VerificationCounters};
use permalog_publisher::{ProcessResult, PublisherConfig, UploadMode};

/// `GET /` response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub config: ConfigSummary,
    pub chain: ChainSummary,
    pub queue: QueueSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet: Option<WalletSummary>,
    pub verification: VerificationCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_batch: Option<LastBatchSummary>,
}

#[derive(Debug, Serialize)]
pub struct ConfigSummary {
    pub batch_size: usize,
    pub upload_mode: UploadMode,
    pub bundle_size_threshold: usize,
    pub bundle_time_threshold_secs: u64,
    pub max_retries: u32,
}

impl From<&PublisherConfig> for ConfigSummary {
    fn from(config: &PublisherConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            upload_mode: config.upload_mode,
            bundle_size_threshold: config.bundle_size_threshold,
            bundle_time_threshold_secs: config.bundle_time_threshold_secs,
            max_retries: config.max_retries,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChainSummary {
    pub seq: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_tx: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueueSummary {
    pub pending: u64,
    pub processing: u64,
    pub failed: u64,
    pub total: u64,
}

impl From<QueueStats> for QueueSummary {
    fn from(stats: QueueStats) -> Self {
        Self {
            pending: stats.pending,
            processing: stats.processing(),
            failed: stats.failed,
            total: stats.total(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WalletSummary {
    pub address: String,
    pub balance_ar: f64,
    /// ok | low | critical
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct LastBatchSummary {
    #[serde(flatten)]
    pub result: ProcessResult,
    pub finished_at: DateTime<Utc>,
}

/// `POST /test-bundle` query parameters
#[derive(Debug, Deserialize)]
pub struct TestBundleParams {
    #[serde(default = "default_test_count")]
    pub count: usize,
}

fn default_test_count() -> usize {
    3
}

/// `GET /test-verify` response
#[derive(Debug, Serialize)]
pub struct TestVerifyResponse {
    pub counters: VerificationCounters,
    pub bundles: Vec<TrackedBundle>,
}

/// `POST /test-verify` body: inject a synthetic tracked bundle and
/// optionally run a verification pass immediately.
#[derive(Debug, Deserialize)]
pub struct InjectBundleRequest {
    #[serde(default)]
    pub bundle_tx: Option<String>,
    #[serde(default = "default_inject_items")]
    pub item_count: usize,
    /// Backdate the bundle by this many seconds
    #[serde(default)]
    pub age_secs: i64,
    #[serde(default)]
    pub run_verifier: bool,
}

fn default_inject_items() -> usize {
    1
}

#[derive(Debug, Serialize)]
pub struct InjectBundleResponse {
    pub bundle: TrackedBundle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify: Option<VerifyOutcome>,
}

#[derive(Debug, Serialize)]
pub struct VerifyOutcome {
    pub checked: usize,
    pub verified: usize,
    pub failed: usize,
    pub requeued: usize,
    pub pruned: u64,
}

impl From<permalog_publisher::VerifySummary> for VerifyOutcome {
    fn from(summary: permalog_publisher::VerifySummary) -> Self {
        Self {
            checked: summary.checked,
            verified: summary.verified,
            failed: summary.failed,
            requeued: summary.requeued,
            pruned: summary.pruned,
        }
    }
}
