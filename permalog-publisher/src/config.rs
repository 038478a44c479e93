//! Publisher configuration
//!
//! Thresholds and limits of the write path. Supports loading from
//! environment variables with the PERMALOG_ prefix.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// How signed records reach the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// Many records packed into one container transaction
    Bundle,
    /// Each record posted individually with bounded concurrency
    Direct,
}

impl Default for UploadMode {
    fn default() -> Self {
        Self::Bundle
    }
}

impl UploadMode {
    /// Parse from string (for environment variables)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bundle" => Some(Self::Bundle),
            "direct" => Some(Self::Direct),
            _ => None,
        }
    }
}

/// Write-path configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Upload mode
    #[serde(default)]
    pub upload_mode: UploadMode,
    /// Maximum queue rows fetched per tick
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Upload once the accumulated bundle size reaches this (bytes)
    #[serde(default = "default_bundle_size_threshold")]
    pub bundle_size_threshold: usize,
    /// Upload once the oldest queued row is this old (seconds)
    #[serde(default = "default_bundle_time_threshold")]
    pub bundle_time_threshold_secs: u64,
    /// Hard cap on a single bundle; the batch is split on cumulative
    /// manifest bytes and the tail deferred (bytes)
    #[serde(default = "default_max_bundle_size")]
    pub max_bundle_size: usize,
    /// Concurrent uploads in direct mode
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-request upload timeout (seconds)
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
    /// Upper bound on one processing tick (seconds)
    #[serde(default = "default_max_process_time")]
    pub max_process_time_secs: u64,
    /// Upload attempts per record in direct mode, and retry cap for
    /// failed queue rows
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Rows in signing/uploading older than this are reclaimed (seconds)
    #[serde(default = "default_stuck_threshold")]
    pub stuck_threshold_secs: u64,
    /// Bundles younger than this are not status-checked yet (seconds)
    #[serde(default = "default_seed_grace")]
    pub seed_grace_period_secs: u64,
    /// Bundles unseeded past this are failed and re-queued (seconds)
    #[serde(default = "default_seed_timeout")]
    pub seed_timeout_secs: u64,
    /// Verified/failed bundles are retained this long (seconds)
    #[serde(default = "default_retention_window")]
    pub retention_window_secs: u64,
    /// Skip the tick below this balance (AR)
    #[serde(default = "default_critical_balance")]
    pub critical_balance_ar: f64,
    /// Warn below this balance (AR)
    #[serde(default = "default_warning_balance")]
    pub warning_balance_ar: f64,
    /// Seconds between processing ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Chain key this publisher advances
    #[serde(default = "default_chain_key")]
    pub chain_key: String,
}

fn default_batch_size() -> usize {
    100
}
fn default_bundle_size_threshold() -> usize {
    300 * 1024
}
fn default_bundle_time_threshold() -> u64 {
    600
}
fn default_max_bundle_size() -> usize {
    10 * 1024 * 1024
}
fn default_concurrency() -> usize {
    50
}
fn default_upload_timeout() -> u64 {
    30
}
fn default_max_process_time() -> u64 {
    55
}
fn default_max_retries() -> u32 {
    5
}
fn default_stuck_threshold() -> u64 {
    600
}
fn default_seed_grace() -> u64 {
    600
}
fn default_seed_timeout() -> u64 {
    1800
}
fn default_retention_window() -> u64 {
    24 * 3600
}
fn default_critical_balance() -> f64 {
    0.05
}
fn default_warning_balance() -> f64 {
    2.0
}
fn default_tick_interval() -> u64 {
    60
}
fn default_chain_key() -> String {
    permalog_core::constants::DEFAULT_CHAIN_KEY.to_string()
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            upload_mode: UploadMode::Bundle,
            batch_size: default_batch_size(),
            bundle_size_threshold: default_bundle_size_threshold(),
            bundle_time_threshold_secs: default_bundle_time_threshold(),
            max_bundle_size: default_max_bundle_size(),
            concurrency: default_concurrency(),
            upload_timeout_secs: default_upload_timeout(),
            max_process_time_secs: default_max_process_time(),
            max_retries: default_max_retries(),
            stuck_threshold_secs: default_stuck_threshold(),
            seed_grace_period_secs: default_seed_grace(),
            seed_timeout_secs: default_seed_timeout(),
            retention_window_secs: default_retention_window(),
            critical_balance_ar: default_critical_balance(),
            warning_balance_ar: default_warning_balance(),
            tick_interval_secs: default_tick_interval(),
            chain_key: default_chain_key(),
        }
    }
}

impl PublisherConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables (all optional, defaults apply):
    /// - PERMALOG_UPLOAD_MODE: bundle | direct
    /// - PERMALOG_BATCH_SIZE
    /// - PERMALOG_BUNDLE_SIZE_THRESHOLD (bytes)
    /// - PERMALOG_BUNDLE_TIME_THRESHOLD (seconds)
    /// - PERMALOG_MAX_BUNDLE_SIZE (bytes)
    /// - PERMALOG_CONCURRENCY
    /// - PERMALOG_UPLOAD_TIMEOUT (seconds)
    /// - PERMALOG_MAX_RETRIES
    /// - PERMALOG_CRITICAL_BALANCE_AR / PERMALOG_WARNING_BALANCE_AR
    pub fn from_env() -> Self {
        fn var<T: std::str::FromStr>(name: &str, default: T) -> T {
            env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        }

        let defaults = Self::default();
        Self {
            upload_mode: env::var("PERMALOG_UPLOAD_MODE")
                .ok()
                .and_then(|s| UploadMode::from_str(&s))
                .unwrap_or_default(),
            batch_size: var("PERMALOG_BATCH_SIZE", defaults.batch_size),
            bundle_size_threshold: var(
                "PERMALOG_BUNDLE_SIZE_THRESHOLD",
                defaults.bundle_size_threshold,
            ),
            bundle_time_threshold_secs: var(
                "PERMALOG_BUNDLE_TIME_THRESHOLD",
                defaults.bundle_time_threshold_secs,
            ),
            max_bundle_size: var("PERMALOG_MAX_BUNDLE_SIZE", defaults.max_bundle_size),
            concurrency: var("PERMALOG_CONCURRENCY", defaults.concurrency),
            upload_timeout_secs: var("PERMALOG_UPLOAD_TIMEOUT", defaults.upload_timeout_secs),
            max_process_time_secs: var(
                "PERMALOG_MAX_PROCESS_TIME",
                defaults.max_process_time_secs,
            ),
            max_retries: var("PERMALOG_MAX_RETRIES", defaults.max_retries),
            stuck_threshold_secs: var("PERMALOG_STUCK_THRESHOLD", defaults.stuck_threshold_secs),
            seed_grace_period_secs: var("PERMALOG_SEED_GRACE", defaults.seed_grace_period_secs),
            seed_timeout_secs: var("PERMALOG_SEED_TIMEOUT", defaults.seed_timeout_secs),
            retention_window_secs: var(
                "PERMALOG_RETENTION_WINDOW",
                defaults.retention_window_secs,
            ),
            critical_balance_ar: var(
                "PERMALOG_CRITICAL_BALANCE_AR",
                defaults.critical_balance_ar,
            ),
            warning_balance_ar: var("PERMALOG_WARNING_BALANCE_AR", defaults.warning_balance_ar),
            tick_interval_secs: var("PERMALOG_TICK_INTERVAL", defaults.tick_interval_secs),
            chain_key: env::var("PERMALOG_CHAIN_KEY").unwrap_or(defaults.chain_key),
        }
    }

    /// Short thresholds for local development
    pub fn development() -> Self {
        Self {
            bundle_size_threshold: 4 * 1024,
            bundle_time_threshold_secs: 30,
            upload_timeout_secs: 10,
            stuck_threshold_secs: 60,
            seed_grace_period_secs: 30,
            seed_timeout_secs: 120,
            tick_interval_secs: 10,
            ..Self::default()
        }
    }

    pub fn bundle_time_threshold(&self) -> Duration {
        Duration::from_secs(self.bundle_time_threshold_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn max_process_time(&self) -> Duration {
        Duration::from_secs(self.max_process_time_secs)
    }
}
