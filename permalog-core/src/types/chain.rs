//! Chain head
//!
//! The single authoritative `{tx, cid, seq}` pointer identifying the last
//! committed record of a chain. `seq` never decreases for a given key
//! except via an explicit operator reset, and `tx` changes iff `seq`
//! changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chain head pointer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    /// Last confirmed record id, `None` at genesis
    pub tx: Option<String>,
    /// Last record's content id, `None` at genesis
    pub cid: Option<String>,
    /// Monotonically non-decreasing sequence, 0 at genesis
    pub seq: u64,
    pub updated_at: DateTime<Utc>,
}

impl ChainHead {
    /// The genesis head `{None, None, 0}`.
    pub fn genesis() -> Self {
        Self {
            tx: None,
            cid: None,
            seq: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.seq == 0 && self.tx.is_none()
    }

    /// The head after committing a record at `seq` with id `tx`.
    pub fn advanced(&self, tx: impl Into<String>, cid: impl Into<String>, seq: u64) -> Self {
        Self {
            tx: Some(tx.into()),
            cid: Some(cid.into()),
            seq,
            updated_at: Utc::now(),
        }
    }
}

impl Default for ChainHead {
    fn default() -> Self {
        Self::genesis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis() {
        let head = ChainHead::genesis();
        assert!(head.is_genesis());
        assert_eq!(head.seq, 0);
        assert!(head.tx.is_none());
        assert!(head.cid.is_none());
    }

    #[test]
    fn test_advanced() {
        let head = ChainHead::genesis().advanced("TX1", "CID1", 1);
        assert!(!head.is_genesis());
        assert_eq!(head.tx.as_deref(), Some("TX1"));
        assert_eq!(head.cid.as_deref(), Some("CID1"));
        assert_eq!(head.seq, 1);
    }
}
