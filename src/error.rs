//! Pipeline error taxonomy
//!
//! Every failure is reported as a `ProcessError` naming the unit of work
//! and the stage that failed, wrapping a `VsaError` whose `kind()` gives
//! the error class.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attest::AttestError;
use crate::predicate::GenerationError;
use crate::service::{StateError, VsaUnit};
use crate::upload::UploadError;
use crate::writer::WriteError;

/// Exit code for cancelled runs
pub const EXIT_CODE_CANCELLED: i32 = 80;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Resolving the subject digest
    Lookup,
    Generate,
    Write,
    /// Digesting the written predicate (snapshot only)
    Digest,
    Attest,
    Upload,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Lookup => "lookup",
            Stage::Generate => "generate",
            Stage::Write => "write",
            Stage::Digest => "digest",
            Stage::Attest => "attest",
            Stage::Upload => "upload",
        };
        f.write_str(name)
    }
}

/// Error class, independent of the stage it surfaced in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Lookup,
    Generation,
    Serialization,
    Filesystem,
    Attestation,
    Upload,
    Cancelled,
    Internal,
}

/// Any failure inside one unit of work
#[derive(Debug, Error)]
pub enum VsaError {
    #[error("digest lookup failed: {0}")]
    Lookup(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("failed to calculate digest of {path}: {source}")]
    Digest {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Attestation(#[from] AttestError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    State(#[from] StateError),
}

impl VsaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VsaError::Lookup(_) => ErrorKind::Lookup,
            VsaError::Generation(GenerationError::Cancelled(_)) => ErrorKind::Cancelled,
            VsaError::Generation(_) => ErrorKind::Generation,
            VsaError::Write(WriteError::InvalidName(_)) => ErrorKind::Generation,
            VsaError::Write(WriteError::Serialize(_)) => ErrorKind::Serialization,
            VsaError::Write(_) => ErrorKind::Filesystem,
            VsaError::Digest { .. } => ErrorKind::Filesystem,
            VsaError::Attestation(AttestError::Cancelled(_)) => ErrorKind::Cancelled,
            VsaError::Attestation(AttestError::Read { .. })
            | VsaError::Attestation(AttestError::WriteEnvelope { .. }) => ErrorKind::Filesystem,
            VsaError::Attestation(_) => ErrorKind::Attestation,
            VsaError::Upload(UploadError::Cancelled(_)) => ErrorKind::Cancelled,
            VsaError::Upload(_) => ErrorKind::Upload,
            VsaError::State(_) => ErrorKind::Internal,
        }
    }
}

/// A unit of work failed at a stage
#[derive(Debug, Error)]
#[error("{unit}: {stage} failed: {source}")]
pub struct ProcessError {
    pub unit: VsaUnit,
    pub stage: Stage,
    #[source]
    pub source: VsaError,
}

impl ProcessError {
    pub fn new(unit: VsaUnit, stage: Stage, source: VsaError) -> Self {
        Self {
            unit,
            stage,
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Lookup => 2,
            ErrorKind::Generation => 10,
            ErrorKind::Serialization => 11,
            ErrorKind::Filesystem => 20,
            ErrorKind::Attestation => 30,
            ErrorKind::Upload => 40,
            ErrorKind::Cancelled => EXIT_CODE_CANCELLED,
            ErrorKind::Internal => 1,
        }
    }
}
