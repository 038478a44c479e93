//! Permalog signing wallet
//!
//! Ed25519 key material loaded from a JWK (OKP / Ed25519) document, as
//! exported by the operator tooling. Signing is deterministic: the same
//! payload and key always produce the same signature, which is what lets
//! record ids be derived before anything is uploaded.

mod jwk;

pub use jwk::Jwk;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Wallet error
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Invalid JWK: {0}")]
    InvalidJwk(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Signature verification failed")]
    BadSignature,
}

pub type WalletResult<T> = Result<T, WalletError>;

/// Ed25519 signing wallet
#[derive(Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    address: String,
}

impl Wallet {
    /// Load a wallet from a JWK JSON document (`kty: OKP`, `crv: Ed25519`).
    pub fn from_jwk_json(json: &str) -> WalletResult<Self> {
        let jwk: Jwk = serde_json::from_str(json)
            .map_err(|e| WalletError::InvalidJwk(e.to_string()))?;
        let secret = jwk.secret_key_bytes()?;
        Ok(Self::from_secret_bytes(&secret))
    }

    /// Build a wallet from raw secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        let verifying_key = signing_key.verifying_key();
        let address = derive_address(&verifying_key.to_bytes());
        Self {
            signing_key,
            verifying_key,
            address,
        }
    }

    /// Generate a fresh random wallet. Test and tooling use only.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand_core::OsRng);
        let bytes = signing_key.to_bytes();
        Self::from_secret_bytes(&bytes)
    }

    /// Wallet address: base64url(SHA-256(public key)).
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Raw public key bytes (the envelope owner field).
    pub fn owner_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Sign a message. Deterministic for a given key and message.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Verify a signature produced by this wallet's key.
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> WalletResult<()> {
        let sig = Signature::from_bytes(signature);
        self.verifying_key
            .verify(message, &sig)
            .map_err(|_| WalletError::BadSignature)
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .finish()
    }
}

fn derive_address(public_key: &[u8; 32]) -> String {
    use base64::Engine;
    let digest = Sha256::digest(public_key);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}
