//! DSSE envelope
//!
//! See: <https://github.com/secure-systems-lab/dsse/blob/master/envelope.md>

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::statement::Statement;

/// Payload type for in-toto statements
pub const IN_TOTO_PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";

/// One signature over the envelope's PAE
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeSignature {
    /// SHA-256 fingerprint of the signing public key
    pub keyid: String,

    /// Base64-encoded signature
    pub sig: String,
}

/// Signed DSSE envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub payload_type: String,

    /// Base64-encoded payload bytes
    pub payload: String,

    pub signatures: Vec<EnvelopeSignature>,
}

impl Envelope {
    /// Envelope over `payload` with a single signature
    pub fn new(payload_type: &str, payload: &[u8], keyid: String, sig: &[u8]) -> Self {
        let b64 = base64::engine::general_purpose::STANDARD;
        Self {
            payload_type: payload_type.to_string(),
            payload: b64.encode(payload),
            signatures: vec![EnvelopeSignature {
                keyid,
                sig: b64.encode(sig),
            }],
        }
    }

    /// Decoded payload bytes
    pub fn payload_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(&self.payload)
    }

    /// Decode the payload as an in-toto statement
    pub fn statement(&self) -> Result<Statement, EnvelopeDecodeError> {
        let bytes = self.payload_bytes()?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Errors decoding an envelope payload
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeDecodeError {
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not a statement: {0}")]
    Json(#[from] serde_json::Error),
}

/// DSSE pre-authentication encoding:
/// `"DSSEv1" SP len(type) SP type SP len(body) SP body`
pub fn pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let header = format!(
        "DSSEv1 {} {} {} ",
        payload_type.len(),
        payload_type,
        payload.len()
    );
    let mut out = Vec::with_capacity(header.len() + payload.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    out
}
