//! Manifest documents
//!
//! Manifests are opaque JSON supplied by an external store, embedded
//! verbatim in the attestation record. The only field the write path
//! interprets is the numeric `ver`; anything else passes through.

use serde_json::Value;

use crate::error::{ChainError, ChainResult};

/// A validated manifest
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    value: Value,
    version: u64,
    byte_len: usize,
}

impl Manifest {
    /// Parse and validate manifest bytes for `cid`.
    ///
    /// Rejects documents that are not JSON objects or whose `ver` is
    /// missing or not a non-negative integer.
    pub fn parse(cid: &str, bytes: &[u8]) -> ChainResult<Self> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| ChainError::InvalidManifest {
                cid: cid.to_string(),
                reason: format!("not valid JSON: {}", e),
            })?;

        if !value.is_object() {
            return Err(ChainError::InvalidManifest {
                cid: cid.to_string(),
                reason: "not a JSON object".to_string(),
            });
        }

        let version = value
            .get("ver")
            .and_then(Value::as_u64)
            .ok_or_else(|| ChainError::InvalidManifest {
                cid: cid.to_string(),
                reason: "missing numeric 'ver'".to_string(),
            })?;

        Ok(Self {
            value,
            version,
            byte_len: bytes.len(),
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Size of the original manifest bytes; used for bundle gating.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let m = Manifest::parse("C1", br#"{"ver": 4, "name": "thing"}"#).unwrap();
        assert_eq!(m.version(), 4);
        assert_eq!(m.byte_len(), 27);
    }

    #[test]
    fn test_missing_ver_rejected() {
        let err = Manifest::parse("C1", br#"{"name": "thing"}"#).unwrap_err();
        assert!(matches!(err, ChainError::InvalidManifest { .. }));
    }

    #[test]
    fn test_non_numeric_ver_rejected() {
        assert!(Manifest::parse("C1", br#"{"ver": "4"}"#).is_err());
        assert!(Manifest::parse("C1", br#"{"ver": -1}"#).is_err());
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(Manifest::parse("C1", b"[1,2,3]").is_err());
        assert!(Manifest::parse("C1", b"not json").is_err());
    }
}
