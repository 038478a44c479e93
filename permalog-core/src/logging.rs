//! Logging conventions
//!
//! Conventions for log output across the workspace. All modules use
//! `tracing` with structured fields; the names below keep the fields
//! greppable across crates.
//!
//! # Log levels
//!
//! | Level | Usage | Examples |
//! |-------|-------|----------|
//! | ERROR | Unrecoverable errors, invariant violations | Head update failed after upload |
//! | WARN  | Recoverable issues, degraded operation | Upload retry, low balance |
//! | INFO  | Significant state changes | Batch finalized, bundle verified |
//! | DEBUG | Detailed operation flow | Phase timings, per-record outcomes |
//!
//! # Examples
//!
//! ```ignore
//! use tracing::info;
//!
//! info!(
//!     count = signed.len(),
//!     seq = head.seq,
//!     duration_ms = elapsed.as_millis() as u64,
//!     "Batch finalized"
//! );
//! ```

/// Standard log field names
pub mod fields {
    /// Entity identifier of a record
    pub const ENTITY_ID: &str = "entity_id";
    /// Content id of a record
    pub const CID: &str = "cid";
    /// Chain sequence number
    pub const SEQ: &str = "seq";
    /// Record (data item) id
    pub const TX: &str = "tx";
    /// Bundle transaction id
    pub const BUNDLE_TX: &str = "bundle_tx";
    /// Chain key
    pub const CHAIN_KEY: &str = "chain_key";
    /// Item count
    pub const COUNT: &str = "count";
    /// Duration in milliseconds
    pub const DURATION_MS: &str = "duration_ms";
    /// Error message
    pub const ERROR: &str = "error";
    /// Operation name
    pub const OPERATION: &str = "operation";
    /// Queue row id
    pub const ENTRY_ID: &str = "entry_id";
    /// Retry count
    pub const RETRY_COUNT: &str = "retry_count";
    /// Balance in winston
    pub const BALANCE_WINSTON: &str = "balance_winston";
}

/// Operation names for the `operation` field
pub mod operations {
    pub const FETCH: &str = "fetch";
    pub const SIGN: &str = "sign";
    pub const BUNDLE: &str = "bundle";
    pub const UPLOAD: &str = "upload";
    pub const FINALIZE: &str = "finalize";
    pub const VERIFY: &str = "verify";
    pub const CLEANUP: &str = "cleanup";
    pub const RETRY: &str = "retry";
    pub const BALANCE_CHECK: &str = "balance_check";
    pub const ALERT: &str = "alert";
}
