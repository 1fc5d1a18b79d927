//! Error types for report loading.

use std::io;
use std::path::PathBuf;

/// Errors raised while loading a report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to read report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid report JSON: {0}")]
    Json(#[from] serde_json::Error),
}
