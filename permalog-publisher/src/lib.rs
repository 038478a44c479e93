//! Permalog publisher
//!
//! The asynchronous write path that turns a queue of pending attestation
//! requests into a durable, gap-free on-chain sequence:
//!
//! 1. cleanup reclaims rows stuck in `signing`/`uploading`,
//! 2. the balance gate skips the tick when funds are critical,
//! 3. pending rows are locked, their manifests fetched in parallel,
//! 4. records are signed sequentially (each record id feeds the next
//!    record's `prev_tx`),
//! 5. records are uploaded as one bundle or individually with bounded
//!    concurrency,
//! 6. the finalizer advances the chain head over the longest successful
//!    prefix, writes the lookup index, deletes committed rows and
//!    re-queues the rest,
//! 7. uploaded bundles are tracked until the network confirms seeding;
//!    bundles that never seed re-queue their entities.
//!
//! Collaborators (stores, gateway, wallet, alert handlers, clock inputs)
//! are injected; tests run the whole path against in-memory stores and a
//! scripted gateway.

pub mod alerting;
pub mod balance;
pub mod bundle;
pub mod config;
pub mod dataitem;
pub mod error;
pub mod finalizer;
pub mod processor;
pub mod retry;
pub mod service;
pub mod signer;
pub mod uploader;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testing;

pub use alerting::{Alert, AlertHandler, AlertSeverity, Alerter, LogAlertHandler, WebhookAlertHandler};
pub use balance::{BalanceGate, BalanceStatus};
pub use bundle::SignedBundle;
pub use config::{PublisherConfig, UploadMode};
pub use dataitem::DataItem;
pub use error::{PublishError, PublishResult};
pub use finalizer::{longest_successful_prefix, FinalizeSummary, Finalizer};
pub use processor::{ProcessResult, Processor};
pub use retry::RetryPolicy;
pub use service::{BackgroundRunner, LastBatch, PublisherService, RunnerHandle, TestBundleReport};
pub use signer::{RecordSigner, SignedRecord};
pub use uploader::{RecordOutcome, UploadReport, Uploader};
pub use verifier::{SeedingVerifier, VerifySummary};
