//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

use crate::upload::UploadKind;
use crate::writer::{DEFAULT_FILE_MODE, DEFAULT_TEMP_DIR_PREFIX};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VsaDefaults {
    /// Temp directory prefix (default: "vsa-")
    pub temp_dir_prefix: String,

    /// Predicate and envelope file mode (default: 0o600)
    pub file_mode: u32,

    /// Upload strategy (default: none)
    pub upload: UploadKind,

    /// Components processed concurrently (default: 1)
    pub parallelism: usize,

    /// Overall timeout in seconds, 0 for none (default: 0)
    pub timeout_seconds: u64,
}

impl Default for VsaDefaults {
    fn default() -> Self {
        Self {
            temp_dir_prefix: DEFAULT_TEMP_DIR_PREFIX.to_string(),
            file_mode: DEFAULT_FILE_MODE,
            upload: UploadKind::None,
            parallelism: 1,
            timeout_seconds: 0,
        }
    }
}

impl VsaDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "temp_dir_prefix": self.temp_dir_prefix,
            "file_mode": self.file_mode,
            "upload": self.upload,
            "parallelism": self.parallelism,
            "timeout_seconds": self.timeout_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = VsaDefaults::default();
        assert_eq!(defaults.temp_dir_prefix, "vsa-");
        assert_eq!(defaults.file_mode, 0o600);
        assert_eq!(defaults.upload, UploadKind::None);
        assert_eq!(defaults.parallelism, 1);
        assert_eq!(defaults.timeout_seconds, 0);
    }

    #[test]
    fn test_to_value() {
        let value = VsaDefaults::default().to_value();

        assert_eq!(value["temp_dir_prefix"], "vsa-");
        assert_eq!(value["file_mode"], 0o600);
        assert_eq!(value["upload"], "none");
        assert!(value.get("signing_key_path").is_none());
    }
}
