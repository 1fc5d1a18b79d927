//! Evaluated components.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::result::RuleResult;

/// Git source locator for a component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitSource {
    /// Repository URL
    #[serde(default)]
    pub url: String,

    /// Commit or ref the image was built from
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub revision: String,

    /// Remaining locator keys (`context`, `dockerfileUrl`, ...)
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Where a component's image was built from.
///
/// Unknown locator kinds and unknown git keys are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitSource>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Source {
    /// Source pointing at a git repository
    pub fn git(url: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            git: Some(GitSource {
                url: url.into(),
                revision: revision.into(),
                other: Map::new(),
            }),
            other: Map::new(),
        }
    }

    /// The git URL, if this source has one
    pub fn git_url(&self) -> Option<&str> {
        self.git
            .as_ref()
            .map(|g| g.url.as_str())
            .filter(|url| !url.is_empty())
    }
}

/// A single evaluated component (container image) of a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Component name (unique within the snapshot)
    pub name: String,

    /// Full image reference, optionally pinned with `@<alg>:<hex>`
    #[serde(rename = "containerImage")]
    pub container_image: String,

    #[serde(default)]
    pub source: Source,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<RuleResult>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<RuleResult>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub successes: Vec<RuleResult>,

    /// Whether the component passed policy evaluation
    #[serde(default)]
    pub success: bool,
}

impl Component {
    /// Create a component with no rule outcomes
    pub fn new(name: impl Into<String>, container_image: impl Into<String>, success: bool) -> Self {
        Self {
            name: name.into(),
            container_image: container_image.into(),
            success,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_component() {
        let json = r#"{
            "name": "api",
            "containerImage": "quay.io/acme/api@sha256:abcd",
            "source": {"git": {"url": "https://github.com/acme/api", "revision": "main"}},
            "violations": [{"msg": "unsigned"}],
            "success": false
        }"#;
        let comp: Component = serde_json::from_str(json).unwrap();
        assert_eq!(comp.name, "api");
        assert_eq!(comp.source.git_url(), Some("https://github.com/acme/api"));
        assert_eq!(comp.violations.len(), 1);
        assert!(comp.warnings.is_empty());
        assert!(!comp.success);
    }

    #[test]
    fn test_unknown_source_kind_preserved() {
        let json = r#"{"name":"c","containerImage":"img","source":{"oci":{"ref":"x"}}}"#;
        let comp: Component = serde_json::from_str(json).unwrap();
        assert!(comp.source.git_url().is_none());
        let out = serde_json::to_value(&comp.source).unwrap();
        assert_eq!(out["oci"]["ref"], "x");
    }

    #[test]
    fn test_extra_git_keys_preserved() {
        let json = r#"{"name":"c","containerImage":"img","source":{"git":{
            "url":"https://g/api","revision":"abc","context":"./sub","dockerfileUrl":"Containerfile"}}}"#;
        let comp: Component = serde_json::from_str(json).unwrap();
        assert_eq!(comp.source.git_url(), Some("https://g/api"));
        let out = serde_json::to_value(&comp.source).unwrap();
        assert_eq!(out["git"]["context"], "./sub");
        assert_eq!(out["git"]["dockerfileUrl"], "Containerfile");
        assert_eq!(out["git"]["revision"], "abc");
    }

    #[test]
    fn test_empty_git_url_is_none() {
        let source = Source::git("", "abc");
        assert!(source.git_url().is_none());
    }
}
