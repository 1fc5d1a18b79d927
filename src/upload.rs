//! Pluggable envelope upload strategies
//!
//! Built-ins:
//! - `OciUploader`: registry push (not implemented yet)
//! - `RekorUploader`: transparency-log submission (not implemented yet)
//! - `NoopUploader`: upload disabled, always succeeds with an empty location
//!
//! Custom sinks implement `Uploader` or wrap a closure in `FnUploader`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::attest::Envelope;
use crate::context::{CancelReason, Context};

/// Upload errors
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("{0} upload not implemented")]
    NotImplemented(&'static str),

    /// For uploaders that poll the context during transfer
    #[error("upload aborted: {0}")]
    Cancelled(CancelReason),

    #[error("upload to {location} failed: {message}")]
    Failed { location: String, message: String },
}

impl UploadError {
    /// True for sinks that have no implementation yet, as opposed to a
    /// failure talking to a real sink.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, UploadError::NotImplemented(_))
    }
}

/// Deposits a signed envelope and returns where it landed
pub trait Uploader: Send + Sync {
    /// Short strategy name for logs
    fn name(&self) -> &str;

    fn upload(&self, ctx: &Context, envelope: &Envelope, location: &str)
        -> Result<String, UploadError>;
}

/// Push to an OCI registry alongside the image
#[derive(Debug, Clone, Copy, Default)]
pub struct OciUploader;

impl Uploader for OciUploader {
    fn name(&self) -> &str {
        "oci"
    }

    fn upload(&self, _ctx: &Context, _envelope: &Envelope, location: &str) -> Result<String, UploadError> {
        info!(location, "uploading VSA attestation to OCI registry");
        Err(UploadError::NotImplemented("OCI"))
    }
}

/// Submit to a Rekor transparency log
#[derive(Debug, Clone, Copy, Default)]
pub struct RekorUploader;

impl Uploader for RekorUploader {
    fn name(&self) -> &str {
        "rekor"
    }

    fn upload(&self, _ctx: &Context, _envelope: &Envelope, location: &str) -> Result<String, UploadError> {
        info!(location, "uploading VSA attestation to Rekor");
        Err(UploadError::NotImplemented("rekor"))
    }
}

/// Upload disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUploader;

impl Uploader for NoopUploader {
    fn name(&self) -> &str {
        "none"
    }

    fn upload(&self, _ctx: &Context, _envelope: &Envelope, location: &str) -> Result<String, UploadError> {
        info!(location, "upload type is 'none'; skipping upload");
        Ok(String::new())
    }
}

/// Adapts a closure into an `Uploader`
pub struct FnUploader<F> {
    name: String,
    f: F,
}

impl<F> FnUploader<F>
where
    F: Fn(&Context, &Envelope, &str) -> Result<String, UploadError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Uploader for FnUploader<F>
where
    F: Fn(&Context, &Envelope, &str) -> Result<String, UploadError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn upload(&self, ctx: &Context, envelope: &Envelope, location: &str) -> Result<String, UploadError> {
        (self.f)(ctx, envelope, location)
    }
}

/// Built-in strategy selector (config and CLI)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    Oci,
    Rekor,
    #[default]
    None,
}

impl UploadKind {
    pub fn uploader(&self) -> Box<dyn Uploader> {
        match self {
            UploadKind::Oci => Box::new(OciUploader),
            UploadKind::Rekor => Box::new(RekorUploader),
            UploadKind::None => Box::new(NoopUploader),
        }
    }
}

impl fmt::Display for UploadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadKind::Oci => write!(f, "oci"),
            UploadKind::Rekor => write!(f, "rekor"),
            UploadKind::None => write!(f, "none"),
        }
    }
}

impl FromStr for UploadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "oci" => Ok(UploadKind::Oci),
            "rekor" => Ok(UploadKind::Rekor),
            "none" | "" => Ok(UploadKind::None),
            other => Err(format!(
                "unknown upload type '{}' (expected oci, rekor or none)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attest::IN_TOTO_PAYLOAD_TYPE;

    fn envelope() -> Envelope {
        Envelope::new(IN_TOTO_PAYLOAD_TYPE, b"{}", "k".to_string(), &[1])
    }

    #[test]
    fn test_noop_always_empty() {
        let ctx = Context::new();
        for location in ["", "quay.io/acme/api", "snapshot"] {
            assert_eq!(NoopUploader.upload(&ctx, &envelope(), location).unwrap(), "");
        }
    }

    #[test]
    fn test_noop_ignores_cancellation() {
        let ctx = Context::new();
        ctx.cancel();
        assert_eq!(NoopUploader.upload(&ctx, &envelope(), "x").unwrap(), "");
    }

    #[test]
    fn test_stubs_not_implemented() {
        let ctx = Context::new();
        for uploader in [UploadKind::Oci.uploader(), UploadKind::Rekor.uploader()] {
            let err = uploader.upload(&ctx, &envelope(), "quay.io/acme/api").unwrap_err();
            assert!(err.is_not_implemented(), "{} should be unimplemented", uploader.name());
            assert!(err.to_string().contains("not implemented"));
        }
    }

    #[test]
    fn test_stubs_not_implemented_when_cancelled() {
        let ctx = Context::new();
        ctx.cancel();
        let stubs: [&dyn Uploader; 2] = [&OciUploader, &RekorUploader];
        for uploader in stubs {
            let err = uploader.upload(&ctx, &envelope(), "x").unwrap_err();
            assert!(err.is_not_implemented(), "{}", uploader.name());
        }
    }

    #[test]
    fn test_fn_uploader() {
        let uploader = FnUploader::new("memory", |_ctx: &Context, _env: &Envelope, loc: &str| {
            Ok(format!("mem://{}", loc))
        });
        let location = uploader.upload(&Context::new(), &envelope(), "img").unwrap();
        assert_eq!(location, "mem://img");
        assert_eq!(uploader.name(), "memory");
    }

    #[test]
    fn test_upload_kind_parse() {
        assert_eq!("OCI".parse::<UploadKind>().unwrap(), UploadKind::Oci);
        assert_eq!("rekor".parse::<UploadKind>().unwrap(), UploadKind::Rekor);
        assert_eq!("none".parse::<UploadKind>().unwrap(), UploadKind::None);
        assert!("s3".parse::<UploadKind>().is_err());
        assert_eq!(UploadKind::default(), UploadKind::None);
        assert_eq!(UploadKind::Rekor.to_string(), "rekor");
    }
}
