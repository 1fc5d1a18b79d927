//! Predicate persistence
//!
//! Each call allocates its own temp directory, so concurrent writers never
//! collide. The directory is left in place for the caller.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::context::Context;
use crate::fs::{Filesystem, OsFs};
use crate::predicate::{validate_component_name, GenerationError, Predicate, PredicateGenerator};

/// Default temp directory prefix
pub const DEFAULT_TEMP_DIR_PREFIX: &str = "vsa-";

/// Default predicate file mode (owner read/write)
pub const DEFAULT_FILE_MODE: u32 = 0o600;

/// Errors from writing a predicate, one per stage
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("refusing to write VSA predicate: {0}")]
    InvalidName(#[source] GenerationError),

    #[error("failed to marshal VSA predicate: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to create temp directory: {0}")]
    TempDir(#[source] io::Error),

    #[error("failed to write VSA predicate to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Writes predicates into fresh temp directories
#[derive(Clone)]
pub struct Writer {
    fs: Arc<dyn Filesystem>,
    temp_dir_prefix: String,
    file_mode: u32,
}

impl Writer {
    /// Writer on the host filesystem with default prefix and mode
    pub fn new() -> Self {
        Self::with_fs(Arc::new(OsFs::new()))
    }

    pub fn with_fs(fs: Arc<dyn Filesystem>) -> Self {
        Self {
            fs,
            temp_dir_prefix: DEFAULT_TEMP_DIR_PREFIX.to_string(),
            file_mode: DEFAULT_FILE_MODE,
        }
    }

    pub fn temp_dir_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.temp_dir_prefix = prefix.into();
        self
    }

    pub fn file_mode(mut self, mode: u32) -> Self {
        self.file_mode = mode;
        self
    }

    /// Serialize `predicate` and write it to `<tempdir>/vsa-<name>.json`
    pub fn write_predicate(&self, predicate: &Predicate) -> Result<PathBuf, WriteError> {
        validate_component_name(&predicate.component.name).map_err(WriteError::InvalidName)?;
        let data = predicate.to_json_pretty().map_err(WriteError::Serialize)?;

        let dir = self
            .fs
            .create_temp_dir(&self.temp_dir_prefix)
            .map_err(WriteError::TempDir)?;

        let path = dir.join(predicate.file_name());
        self.fs
            .write_file(&path, &data, self.file_mode)
            .map_err(|source| WriteError::Write {
                path: path.clone(),
                source,
            })?;

        info!(
            image = %predicate.image_ref,
            path = %path.display(),
            "VSA predicate written"
        );
        Ok(path)
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors from the combined generate-and-write step
#[derive(Debug, thiserror::Error)]
pub enum GenerateWriteError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Generate a predicate and write it, returning the predicate and its path
pub fn generate_and_write_vsa(
    ctx: &Context,
    generator: &dyn PredicateGenerator,
    writer: &Writer,
) -> Result<(Predicate, PathBuf), GenerateWriteError> {
    let predicate = generator.generate_predicate(ctx)?;
    let path = writer.write_predicate(&predicate)?;
    Ok((predicate, path))
}
