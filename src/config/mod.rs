//! Layered configuration
//!
//! Layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. Config file (.vsa/config.toml or --config)
//! 3. CLI flags

mod defaults;
mod effective;
mod merge;

pub use defaults::VsaDefaults;
pub use effective::{
    ConfigError, ConfigOrigin, ConfigSource, VsaConfig, DEFAULT_CONFIG_PATH, MAX_PARALLELISM,
};
pub use merge::{deep_merge, merge_layers};
