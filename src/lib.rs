//! VSA Attest - Verification Summary Attestations for policy reports
//!
//! This crate turns the result of evaluating a snapshot of container
//! images against a policy into one VSA predicate per component plus one
//! for the whole snapshot. Each predicate is written to a private temp
//! directory, wrapped in a signed in-toto envelope, and optionally
//! uploaded.

pub mod attest;
pub mod config;
pub mod context;
pub mod digest;
pub mod error;
pub mod fs;
pub mod lookup;
pub mod predicate;
pub mod service;
pub mod upload;
pub mod writer;

pub use attest::{attest_vsa, Attestor, Ed25519Signer, Envelope, Signer};
pub use config::VsaConfig;
pub use context::{CancelReason, Context};
pub use digest::Digest;
pub use error::{ErrorKind, ProcessError, Stage, VsaError};
pub use fs::{Filesystem, MemFs, OsFs};
pub use predicate::{ComponentGenerator, Predicate, PredicateGenerator, SnapshotGenerator};
pub use service::{AttestedVsa, BatchSummary, EventSink, Service};
pub use upload::{UploadKind, Uploader};
pub use writer::{generate_and_write_vsa, Writer};

pub use vsa_report::{Component, Report};
