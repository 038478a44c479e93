//! Permalog core types
//!
//! Shared data model for the permalog attestation chain: the chain head,
//! queue entries, attestation record payloads, tracked bundles and the
//! lookup-index entry shape, plus the error type and protocol constants
//! used across the workspace.
//!
//! Everything here is plain data; the storage traits live in
//! `permalog-store` and the write path in `permalog-publisher`.

pub mod constants;
pub mod error;
pub mod logging;
pub mod types;

pub use error::{ChainError, ChainResult};
pub use types::bundle::{BundleItemRef, BundleStatus, TrackedBundle, VerificationCounters};
pub use types::chain::ChainHead;
pub use types::index::IndexEntry;
pub use types::manifest::Manifest;
pub use types::queue::{NewQueueEntry, QueueEntry, QueueStats, QueueStatus};
pub use types::record::{AttestationRecord, Operation, Tag, Visibility};
