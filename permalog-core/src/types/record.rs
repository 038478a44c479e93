//! Attestation record payload
//!
//! The JSON document committed to permanent storage for every
//! attestation, with the chain-linking fields (`prev_tx`, `prev_cid`,
//! `seq`) that make the log walkable from the network alone.

use serde::{Deserialize, Serialize};

use crate::constants::{self, tags};

/// Attestation operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// First attestation for an entity
    #[serde(rename = "C")]
    Create,
    /// Subsequent attestation
    #[serde(rename = "U")]
    Update,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "C",
            Self::Update => "U",
        }
    }

    /// Parse from the wire form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "C" => Some(Self::Create),
            "U" => Some(Self::Update),
            _ => None,
        }
    }
}

/// Record visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    #[serde(rename = "pub")]
    Public,
    #[serde(rename = "priv")]
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "pub",
            Self::Private => "priv",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pub" => Some(Self::Public),
            "priv" => Some(Self::Private),
            _ => None,
        }
    }
}

/// A name/value tag attached to the transport envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Attestation record payload
///
/// Field names are the wire format; do not rename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationRecord {
    /// Entity id
    pub pi: String,
    /// Manifest version
    pub ver: u64,
    /// Content id
    pub cid: String,
    pub op: Operation,
    pub vis: Visibility,
    /// Submission time, ms since epoch
    pub ts: i64,
    /// Previous record id, absent at genesis
    pub prev_tx: Option<String>,
    /// Previous record's content id, absent at genesis
    pub prev_cid: Option<String>,
    /// Chain sequence number, 1-based
    pub seq: u64,
    /// Embedded manifest document
    pub manifest: serde_json::Value,
}

impl AttestationRecord {
    /// Serialize the payload to its wire JSON.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Tags attached to the transport envelope for indexability.
    ///
    /// `Prev-TX` / `Prev-CID` are only attached when the record is not
    /// the genesis record.
    pub fn envelope_tags(&self) -> Vec<Tag> {
        let mut out = vec![
            Tag::new(tags::CONTENT_TYPE, constants::CONTENT_TYPE_JSON),
            Tag::new(tags::APP_NAME, constants::APP_NAME),
            Tag::new(tags::TYPE, constants::RECORD_TYPE),
            Tag::new(tags::PI, self.pi.clone()),
            Tag::new(tags::VER, self.ver.to_string()),
            Tag::new(tags::CID, self.cid.clone()),
            Tag::new(tags::OP, self.op.as_str()),
            Tag::new(tags::VIS, self.vis.as_str()),
            Tag::new(tags::SEQ, self.seq.to_string()),
        ];
        if let Some(prev_tx) = &self.prev_tx {
            out.push(Tag::new(tags::PREV_TX, prev_tx.clone()));
        }
        if let Some(prev_cid) = &self.prev_cid {
            out.push(Tag::new(tags::PREV_CID, prev_cid.clone()));
        }
        out
    }
}
