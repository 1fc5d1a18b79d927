//! Content digests (`<alg>:<hex>`)

use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::fs::Filesystem;

/// Digest parse errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DigestError {
    #[error("digest is empty")]
    Empty,

    #[error("malformed digest {0:?}: expected <alg>:<lowercase hex>")]
    Malformed(String),

    #[error("unsupported digest algorithm {0:?}")]
    UnsupportedAlgorithm(String),

    #[error("{algorithm} digest must be {expected} hex chars, got {actual}")]
    Length {
        algorithm: String,
        expected: usize,
        actual: usize,
    },
}

/// A content digest such as `sha256:9f86d0...`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    algorithm: String,
    hex: String,
}

fn digest_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:([a-z0-9]+):)?([a-f0-9]+)$").expect("digest pattern is valid")
    })
}

fn expected_len(algorithm: &str) -> Option<usize> {
    match algorithm {
        "sha256" => Some(64),
        "sha384" => Some(96),
        "sha512" => Some(128),
        _ => None,
    }
}

impl Digest {
    /// Parse `<alg>:<hex>`; a bare hex string is taken as sha256
    pub fn parse(raw: &str) -> Result<Self, DigestError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DigestError::Empty);
        }
        let caps = digest_pattern()
            .captures(raw)
            .ok_or_else(|| DigestError::Malformed(raw.to_string()))?;

        let algorithm = caps.get(1).map_or("sha256", |m| m.as_str()).to_string();
        let hex = caps.get(2).map_or("", |m| m.as_str()).to_string();

        let expected = expected_len(&algorithm)
            .ok_or_else(|| DigestError::UnsupportedAlgorithm(algorithm.clone()))?;
        if hex.len() != expected {
            return Err(DigestError::Length {
                algorithm,
                expected,
                actual: hex.len(),
            });
        }

        Ok(Self { algorithm, hex })
    }

    /// SHA-256 of `data`
    pub fn sha256(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self {
            algorithm: "sha256".to_string(),
            hex: hex::encode(hasher.finalize()),
        }
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Digest {
    type Error = DigestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.to_string()
    }
}

/// Digest of a written predicate file, read back through `fs`
pub fn predicate_digest(fs: &dyn Filesystem, path: &Path) -> io::Result<Digest> {
    let bytes = fs.read_file(path)?;
    Ok(Digest::sha256(&bytes))
}
