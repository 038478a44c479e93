//! JWK parsing
//!
//! Minimal JWK support for the wallet format the operator tooling
//! exports: an OKP key on the Ed25519 curve with base64url `d` (secret)
//! and `x` (public) parameters.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::{WalletError, WalletResult};

/// JSON Web Key, restricted to the fields the wallet needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default)]
    pub crv: Option<String>,
    /// Secret key, base64url
    #[serde(default)]
    pub d: Option<String>,
    /// Public key, base64url
    #[serde(default)]
    pub x: Option<String>,
}

impl Jwk {
    /// Extract and validate the 32-byte Ed25519 secret key.
    pub fn secret_key_bytes(&self) -> WalletResult<[u8; 32]> {
        if self.kty != "OKP" {
            return Err(WalletError::InvalidJwk(format!(
                "unsupported kty '{}', expected OKP",
                self.kty
            )));
        }
        match self.crv.as_deref() {
            Some("Ed25519") => {}
            other => {
                return Err(WalletError::InvalidJwk(format!(
                    "unsupported crv {:?}, expected Ed25519",
                    other
                )))
            }
        }

        let d = self
            .d
            .as_deref()
            .ok_or_else(|| WalletError::InvalidJwk("missing 'd' parameter".to_string()))?;
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(d)
            .map_err(|e| WalletError::InvalidJwk(format!("bad base64url in 'd': {}", e)))?;

        bytes.as_slice().try_into().map_err(|_| {
            WalletError::InvalidKey(format!("expected 32 secret bytes, got {}", bytes.len()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwk_json(d: &str) -> String {
        format!(r#"{{"kty":"OKP","crv":"Ed25519","d":"{}","x":"irrelevant"}}"#, d)
    }

    #[test]
    fn test_parse_valid_jwk() {
        let d = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode([3u8; 32]);
        let jwk: Jwk = serde_json::from_str(&jwk_json(&d)).unwrap();
        assert_eq!(jwk.secret_key_bytes().unwrap(), [3u8; 32]);
    }

    #[test]
    fn test_wrong_kty_rejected() {
        let jwk: Jwk =
            serde_json::from_str(r#"{"kty":"RSA","n":"...","e":"AQAB"}"#).unwrap();
        assert!(matches!(
            jwk.secret_key_bytes(),
            Err(WalletError::InvalidJwk(_))
        ));
    }

    #[test]
    fn test_wrong_length_rejected() {
        let d = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode([3u8; 16]);
        let jwk: Jwk = serde_json::from_str(&jwk_json(&d)).unwrap();
        assert!(matches!(
            jwk.secret_key_bytes(),
            Err(WalletError::InvalidKey(_))
        ));
    }
}
