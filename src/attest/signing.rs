//! Signing capability and the built-in Ed25519 signer
//!
//! The `Signer` trait is the seam the attestor signs through. The Ed25519
//! implementation:
//! - wraps the predicate in an in-toto statement bound to the subject
//! - signs PAE(payloadType, canonical statement)
//! - identifies itself by the SHA-256 fingerprint of its public key

use std::io;
use std::path::Path;

use base64::Engine as _;
use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::envelope::{pae, Envelope, IN_TOTO_PAYLOAD_TYPE};
use super::statement::{Statement, SubjectMetadata};

/// Errors from signing operations
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("content is not a JSON document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("canonical encoding failed: {0}")]
    Canonicalization(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("signing backend error: {0}")]
    Backend(String),
}

/// Result type for signing operations
pub type SigningResult<T> = Result<T, SigningError>;

/// A signing capability.
///
/// Implementations must be safe to call from several threads at once.
pub trait Signer: Send + Sync {
    /// Stable identifier of the signing key
    fn key_id(&self) -> String;

    /// Sign `content` (a predicate document) bound to `subject`
    fn sign(&self, content: &[u8], subject: &SubjectMetadata) -> SigningResult<Envelope>;
}

/// Ed25519 signer producing DSSE envelopes
pub struct Ed25519Signer {
    key: SigningKey,
    key_id: String,
}

impl Ed25519Signer {
    pub fn new(key: SigningKey) -> Self {
        let key_id = compute_key_fingerprint(&key.verifying_key());
        Self { key, key_id }
    }

    /// Signer with a freshly generated key
    pub fn generate() -> Self {
        Self::new(generate_keypair())
    }

    /// Signer from a base64-encoded 32-byte secret key
    pub fn from_base64(encoded: &str) -> SigningResult<Self> {
        Ok(Self::new(decode_signing_key(encoded.trim())?))
    }

    /// Signer from a file holding a base64-encoded key
    pub fn from_key_file(path: &Path) -> SigningResult<Self> {
        let encoded = std::fs::read_to_string(path)?;
        Self::from_base64(&encoded)
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    /// Base64 encoding of the secret key, for persisting
    pub fn to_base64(&self) -> String {
        encode_signing_key(&self.key)
    }
}

impl Signer for Ed25519Signer {
    fn key_id(&self) -> String {
        self.key_id.clone()
    }

    fn sign(&self, content: &[u8], subject: &SubjectMetadata) -> SigningResult<Envelope> {
        let predicate: serde_json::Value = serde_json::from_slice(content)?;
        let statement = Statement::new(predicate, subject);
        let payload = statement
            .to_canonical_bytes()
            .map_err(SigningError::Canonicalization)?;

        let signature = self.key.sign(&pae(IN_TOTO_PAYLOAD_TYPE, &payload));

        Ok(Envelope::new(
            IN_TOTO_PAYLOAD_TYPE,
            &payload,
            self.key_id.clone(),
            &signature.to_bytes(),
        ))
    }
}

/// Compute SHA-256 fingerprint of an Ed25519 public key
pub fn compute_key_fingerprint(key: &VerifyingKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a new Ed25519 keypair
pub fn generate_keypair() -> SigningKey {
    SigningKey::generate(&mut rand::thread_rng())
}

/// Encode a signing key to base64 for storage
pub fn encode_signing_key(key: &SigningKey) -> String {
    base64::engine::general_purpose::STANDARD.encode(key.to_bytes())
}

/// Decode a signing key from base64
pub fn decode_signing_key(encoded: &str) -> SigningResult<SigningKey> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(encoded)?;
    let bytes_array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SigningError::InvalidKey("key must be 32 bytes".to_string()))?;
    Ok(SigningKey::from_bytes(&bytes_array))
}

/// Encode a verifying key to base64 for distribution
pub fn encode_verifying_key(key: &VerifyingKey) -> String {
    base64::engine::general_purpose::STANDARD.encode(key.as_bytes())
}
