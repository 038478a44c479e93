//! Lookup-index entries
//!
//! Key-value entries written by the finalizer so the read side can
//! resolve an attestation by entity and version without walking the
//! chain. The index is eventually consistent and reconstructible from
//! the network.

use serde::{Deserialize, Serialize};

use crate::constants::INDEX_KEY_PREFIX;

/// Value stored under `attest:{entity}:{ver}` and `attest:{entity}:latest`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub cid: String,
    /// Record id on the network
    pub tx: String,
    pub seq: u64,
    /// Submission time, ms since epoch
    pub ts: i64,
    /// Set when the record travelled inside a bundle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundled: Option<bool>,
}

/// Key for a specific manifest version.
pub fn version_key(entity_id: &str, ver: u64) -> String {
    format!("{}:{}:{}", INDEX_KEY_PREFIX, entity_id, ver)
}

/// Key for the latest attestation of an entity.
pub fn latest_key(entity_id: &str) -> String {
    format!("{}:{}:latest", INDEX_KEY_PREFIX, entity_id)
}
