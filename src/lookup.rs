//! Subject lookups for `process_all_vsas`
//!
//! The git URL comes from the component's source; the image digest from
//! the `@<alg>:<hex>` pin on its image reference, or from a digest map
//! file when the image is referenced by tag.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vsa_report::Component;

use crate::digest::{Digest, DigestError};

/// Lookup errors
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("image reference {0} is not pinned by digest")]
    Unpinned(String),

    #[error("image reference {image} has an invalid digest: {source}")]
    InvalidDigest {
        image: String,
        #[source]
        source: DigestError,
    },

    #[error("no digest known for image {0}")]
    Unknown(String),

    #[error("failed to read digest map {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse digest map {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Source repository URL of a component, or empty
pub fn git_url(component: &Component) -> String {
    component.source.git_url().unwrap_or_default().to_string()
}

/// Digest pinned in the component's image reference
pub fn image_digest(component: &Component) -> Result<String, LookupError> {
    let image = &component.container_image;
    let (_, raw) = image
        .rsplit_once('@')
        .ok_or_else(|| LookupError::Unpinned(image.clone()))?;
    let digest = Digest::parse(raw).map_err(|source| LookupError::InvalidDigest {
        image: image.clone(),
        source,
    })?;
    Ok(digest.to_string())
}

/// Image reference → digest, loaded from a JSON object file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DigestMap {
    entries: BTreeMap<String, Digest>,
}

impl DigestMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, LookupError> {
        let content = std::fs::read_to_string(path).map_err(|source| LookupError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| LookupError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn insert(&mut self, image: impl Into<String>, digest: Digest) {
        self.entries.insert(image.into(), digest);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pinned digest first, then the map entry for the image reference
    pub fn resolve(&self, component: &Component) -> Result<String, LookupError> {
        match image_digest(component) {
            Ok(digest) => Ok(digest),
            Err(LookupError::Unpinned(image)) => self
                .entries
                .get(&image)
                .map(|d| d.to_string())
                .ok_or(LookupError::Unknown(image)),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vsa_report::Source;

    const HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_git_url() {
        let mut c = Component::new("a", "reg/a", true);
        assert_eq!(git_url(&c), "");
        c.source = Source::git("https://github.com/acme/a", "abc123");
        assert_eq!(git_url(&c), "https://github.com/acme/a");
    }

    #[test]
    fn test_image_digest_pinned() {
        let c = Component::new("a", format!("quay.io/acme/a@sha256:{}", HELLO), true);
        assert_eq!(image_digest(&c).unwrap(), format!("sha256:{}", HELLO));
    }

    #[test]
    fn test_image_digest_unpinned() {
        let c = Component::new("a", "quay.io/acme/a:latest", true);
        assert!(matches!(image_digest(&c), Err(LookupError::Unpinned(_))));
    }

    #[test]
    fn test_image_digest_invalid() {
        let c = Component::new("a", "quay.io/acme/a@sha256:xyz", true);
        assert!(matches!(image_digest(&c), Err(LookupError::InvalidDigest { .. })));
    }

    #[test]
    fn test_digest_map_fallback() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("digests.json");
        std::fs::write(
            &path,
            format!(r#"{{"quay.io/acme/a:latest": "sha256:{}"}}"#, HELLO),
        )
        .unwrap();

        let map = DigestMap::load(&path).unwrap();
        assert_eq!(map.len(), 1);

        let tagged = Component::new("a", "quay.io/acme/a:latest", true);
        assert_eq!(map.resolve(&tagged).unwrap(), format!("sha256:{}", HELLO));

        let unknown = Component::new("b", "quay.io/acme/b:latest", true);
        assert!(matches!(map.resolve(&unknown), Err(LookupError::Unknown(_))));

        let pinned = Component::new("c", format!("quay.io/acme/c@{}", HELLO), true);
        assert_eq!(map.resolve(&pinned).unwrap(), format!("sha256:{}", HELLO));
    }

    #[test]
    fn test_digest_map_rejects_bad_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("digests.json");
        std::fs::write(&path, r#"{"img": "md5:abcd"}"#).unwrap();
        assert!(matches!(DigestMap::load(&path), Err(LookupError::Parse { .. })));
    }
}
