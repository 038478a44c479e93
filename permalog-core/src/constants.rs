//! Protocol constants
//!
//! Wire-level names and limits shared by the signer, bundler and admin
//! surface. Changing any value here changes what ends up on the network;
//! treat them as part of the protocol.

/// Application name attached to every envelope (`App-Name` tag).
pub const APP_NAME: &str = "permalog";

/// Record type attached to every envelope (`Type` tag).
pub const RECORD_TYPE: &str = "attestation";

/// Content type of the record payload.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Default chain key for the production head.
pub const DEFAULT_CHAIN_KEY: &str = "head";

/// Chain key used by the admin test pipeline; never mixed with the
/// production head.
pub const TEST_CHAIN_KEY: &str = "test-head";

/// Prefix of lookup-index keys (`attest:{entity}:{ver}`).
pub const INDEX_KEY_PREFIX: &str = "attest";

/// Winston per AR (the gateway reports balances in winston).
pub const WINSTON_PER_AR: u128 = 1_000_000_000_000;

/// Maximum ids per storage statement; batch operations are chunked to
/// stay below parameter caps of the backing store.
pub const MAX_BATCH_PARAMS: usize = 50;

/// Fixed error recorded on queue rows whose manifest is missing or
/// fails validation.
pub const MANIFEST_MISSING_ERROR: &str = "manifest missing or invalid";

/// Bundle envelope tags.
pub const BUNDLE_FORMAT: &str = "binary";
pub const BUNDLE_VERSION: &str = "2.0.0";

/// ANS-104 signature type for Ed25519.
pub const SIG_TYPE_ED25519: u16 = 2;

/// Ed25519 signature and public-key sizes.
pub const ED25519_SIG_LEN: usize = 64;
pub const ED25519_PUB_LEN: usize = 32;

/// Envelope tag names.
pub mod tags {
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const APP_NAME: &str = "App-Name";
    pub const TYPE: &str = "Type";
    pub const PI: &str = "PI";
    pub const VER: &str = "Ver";
    pub const CID: &str = "CID";
    pub const OP: &str = "Op";
    pub const VIS: &str = "Vis";
    pub const SEQ: &str = "Seq";
    pub const PREV_TX: &str = "Prev-TX";
    pub const PREV_CID: &str = "Prev-CID";
    pub const BUNDLE_FORMAT: &str = "Bundle-Format";
    pub const BUNDLE_VERSION: &str = "Bundle-Version";
}
