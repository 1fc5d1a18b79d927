//! Binds a written predicate to its subject and signs it

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::envelope::Envelope;
use super::signing::{Signer, SigningError};
use super::statement::SubjectMetadata;
use crate::context::{CancelReason, Context};
use crate::digest::{Digest, DigestError};
use crate::fs::{Filesystem, OsFs};
use crate::predicate::Predicate;
use crate::writer::DEFAULT_FILE_MODE;

/// Suffix replacing `.json` on the predicate file name
pub const ENVELOPE_SUFFIX: &str = ".intoto.json";

/// Attestation errors
#[derive(Debug, thiserror::Error)]
pub enum AttestError {
    #[error("attestor requires a predicate path")]
    EmptyContentPath,

    #[error("attestor requires a signer")]
    MissingSigner,

    #[error("invalid subject digest: {0}")]
    InvalidDigest(#[from] DigestError),

    #[error("failed to read predicate {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("predicate {path} is not a valid VSA predicate: {source}")]
    InvalidPredicate {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to write envelope to {path}: {source}")]
    WriteEnvelope {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("attestation aborted: {0}")]
    Cancelled(CancelReason),
}

/// A signed envelope and where it was written
#[derive(Debug, Clone)]
pub struct AttestedEnvelope {
    pub envelope: Envelope,
    pub path: PathBuf,
}

/// Signs one written predicate
pub struct Attestor {
    content_path: PathBuf,
    subject_url: String,
    digest: Digest,
    signer: Arc<dyn Signer>,
    fs: Arc<dyn Filesystem>,
    file_mode: u32,
}

impl std::fmt::Debug for Attestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attestor")
            .field("content_path", &self.content_path)
            .field("subject_url", &self.subject_url)
            .field("digest", &self.digest)
            .field("key_id", &self.signer.key_id())
            .finish()
    }
}

impl Attestor {
    /// Validate configuration up front.
    ///
    /// `subject_url` is the source repository of the subject (empty for a
    /// snapshot); `subject_digest` is `<alg>:<hex>`.
    pub fn new(
        content_path: impl Into<PathBuf>,
        subject_url: &str,
        subject_digest: &str,
        signer: Option<Arc<dyn Signer>>,
    ) -> Result<Self, AttestError> {
        let content_path = content_path.into();
        if content_path.as_os_str().is_empty() {
            return Err(AttestError::EmptyContentPath);
        }
        let signer = signer.ok_or(AttestError::MissingSigner)?;
        let digest = Digest::parse(subject_digest)?;

        Ok(Self {
            content_path,
            subject_url: subject_url.to_string(),
            digest,
            signer,
            fs: Arc::new(OsFs::new()),
            file_mode: DEFAULT_FILE_MODE,
        })
    }

    pub fn with_fs(mut self, fs: Arc<dyn Filesystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn file_mode(mut self, mode: u32) -> Self {
        self.file_mode = mode;
        self
    }

    pub fn content_path(&self) -> &Path {
        &self.content_path
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// `<dir>/vsa-<name>.intoto.json` next to the predicate
    pub fn envelope_path(&self) -> PathBuf {
        let file_name = self
            .content_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let stem = file_name.strip_suffix(".json").unwrap_or(&file_name);
        self.content_path
            .with_file_name(format!("{}{}", stem, ENVELOPE_SUFFIX))
    }

    /// Read, sign and persist. Nothing is written if the context is
    /// cancelled before signing completes.
    pub fn attest(&self, ctx: &Context) -> Result<AttestedEnvelope, AttestError> {
        ctx.check().map_err(AttestError::Cancelled)?;

        let content = self
            .fs
            .read_file(&self.content_path)
            .map_err(|source| AttestError::Read {
                path: self.content_path.clone(),
                source,
            })?;
        let predicate =
            Predicate::from_json(&content).map_err(|source| AttestError::InvalidPredicate {
                path: self.content_path.clone(),
                source,
            })?;

        let subject = SubjectMetadata {
            name: subject_name(&predicate),
            git_url: Some(self.subject_url.clone()).filter(|u| !u.is_empty()),
            digest: self.digest.clone(),
        };

        ctx.check().map_err(AttestError::Cancelled)?;
        debug!(subject = %subject.name, digest = %subject.digest, "signing VSA");
        let envelope = self.signer.sign(&content, &subject)?;
        ctx.check().map_err(AttestError::Cancelled)?;

        let json = envelope.to_json().map_err(AttestError::Encode)?;
        let path = self.envelope_path();
        self.fs
            .write_file(&path, json.as_bytes(), self.file_mode)
            .map_err(|source| AttestError::WriteEnvelope {
                path: path.clone(),
                source,
            })?;

        info!(subject = %subject.name, path = %path.display(), "VSA envelope written");
        Ok(AttestedEnvelope { envelope, path })
    }
}

/// Attest a predicate with a configured attestor
pub fn attest_vsa(ctx: &Context, attestor: &Attestor) -> Result<AttestedEnvelope, AttestError> {
    attestor.attest(ctx)
}

/// Image reference without its `@digest` pin, or the component name for
/// snapshot predicates.
fn subject_name(predicate: &Predicate) -> String {
    if predicate.image_ref.is_empty() {
        return predicate.component.name.clone();
    }
    match predicate.image_ref.split_once('@') {
        Some((repo, _)) => repo.to_string(),
        None => predicate.image_ref.clone(),
    }
}
