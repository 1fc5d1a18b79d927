//! Effective configuration with provenance
//!
//! The merged layers are validated and decoded into a `VsaConfig`, which
//! also records every contributing source and the digest of each file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::defaults::VsaDefaults;
use super::merge::merge_layers;
use crate::context::Context;
use crate::upload::UploadKind;

/// Config file looked up when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = ".vsa/config.toml";

/// Upper bound on concurrent component workers
pub const MAX_PARALLELISM: usize = 64;

const MAX_TIMEOUT_SECONDS: u64 = 86400;

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// A contributing config source with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Merged settings as they appear in the layers
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Settings {
    temp_dir_prefix: String,
    file_mode: u32,
    upload: UploadKind,
    parallelism: usize,
    timeout_seconds: u64,
    #[serde(default)]
    signing_key_path: Option<PathBuf>,
}

/// Effective configuration
#[derive(Debug, Clone, Serialize)]
pub struct VsaConfig {
    pub temp_dir_prefix: String,
    pub file_mode: u32,
    pub upload: UploadKind,
    pub parallelism: usize,

    /// Overall timeout in seconds; 0 disables it
    pub timeout_seconds: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_key_path: Option<PathBuf>,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
}

impl VsaConfig {
    /// Build the effective config from defaults, an optional TOML file and
    /// CLI overrides. A file path that does not exist is skipped.
    pub fn build(config_path: Option<&Path>, cli_overrides: Option<Value>) -> Result<Self, ConfigError> {
        let mut layers = vec![VsaDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = config_path {
            if path.exists() {
                let (value, digest) = load_toml_file(path)?;
                layers.push(value);
                sources.push(ConfigSource {
                    origin: ConfigOrigin::File,
                    path: Some(path.to_string_lossy().to_string()),
                    digest: Some(digest),
                });
            }
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = merge_layers(layers);
        let settings: Settings = serde_json::from_value(merged)
            .map_err(|e| ConfigError::ParseError(format!("invalid configuration: {}", e)))?;
        validate(&settings)?;

        Ok(Self {
            temp_dir_prefix: settings.temp_dir_prefix,
            file_mode: settings.file_mode,
            upload: settings.upload,
            parallelism: settings.parallelism,
            timeout_seconds: settings.timeout_seconds,
            signing_key_path: settings.signing_key_path,
            sources,
        })
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds))
    }

    /// Root context carrying the configured deadline
    pub fn context(&self) -> Context {
        match self.timeout() {
            Some(timeout) => Context::with_timeout(timeout),
            None => Context::new(),
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Load and parse a TOML file, returning the value and digest
fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path).map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hex::encode(hasher.finalize());

    let contents = String::from_utf8(bytes)
        .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;
    let toml_value: toml::Value = toml::from_str(&contents)
        .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

    Ok((toml_to_json(toml_value), digest))
}

/// Convert TOML Value to JSON Value
fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    let prefix = &settings.temp_dir_prefix;
    if prefix.is_empty() || prefix.contains(['/', '\\', '\0']) {
        return Err(ConfigError::ValidationError(format!(
            "temp_dir_prefix must be a non-empty file name prefix, got {:?}",
            prefix
        )));
    }

    // The attestor reads the predicate back, so the owner needs rw
    if settings.file_mode > 0o777 || settings.file_mode & 0o600 != 0o600 {
        return Err(ConfigError::ValidationError(format!(
            "file_mode must be within 0o777 and owner read/write, got {:#o}",
            settings.file_mode
        )));
    }

    if settings.parallelism == 0 || settings.parallelism > MAX_PARALLELISM {
        return Err(ConfigError::ValidationError(format!(
            "parallelism must be in [1, {}]",
            MAX_PARALLELISM
        )));
    }

    if settings.timeout_seconds > MAX_TIMEOUT_SECONDS {
        return Err(ConfigError::ValidationError(format!(
            "timeout_seconds must be in [0, {}]",
            MAX_TIMEOUT_SECONDS
        )));
    }

    Ok(())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
