//! in-toto v1 statement wrapping a VSA predicate
//!
//! See: <https://github.com/in-toto/attestation/blob/main/spec/v1/statement.md>

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::digest::Digest;

/// Statement type URI
pub const STATEMENT_TYPE: &str = "https://in-toto.io/Statement/v1";

/// Predicate type URI for verification summaries
pub const VSA_PREDICATE_TYPE: &str = "https://conforma.dev/verification_summary/v1";

/// Annotation key carrying the subject's source repository
pub const GIT_URL_ANNOTATION: &str = "gitUrl";

/// Identity of the thing being attested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectMetadata {
    /// Image reference (without digest) or snapshot name
    pub name: String,

    /// Source repository, when the subject has one
    pub git_url: Option<String>,

    pub digest: Digest,
}

/// Statement subject (resource descriptor)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub name: String,

    pub digest: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl From<&SubjectMetadata> for Subject {
    fn from(meta: &SubjectMetadata) -> Self {
        let mut digest = BTreeMap::new();
        digest.insert(meta.digest.algorithm().to_string(), meta.digest.hex().to_string());

        let mut annotations = BTreeMap::new();
        if let Some(url) = meta.git_url.as_deref().filter(|u| !u.is_empty()) {
            annotations.insert(GIT_URL_ANNOTATION.to_string(), url.to_string());
        }

        Self {
            name: meta.name.clone(),
            digest,
            annotations,
        }
    }
}

/// in-toto v1 statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(rename = "_type")]
    pub statement_type: String,

    pub subject: Vec<Subject>,

    #[serde(rename = "predicateType")]
    pub predicate_type: String,

    pub predicate: Value,
}

impl Statement {
    /// Bind a predicate document to a single subject
    pub fn new(predicate: Value, subject: &SubjectMetadata) -> Self {
        Self {
            statement_type: STATEMENT_TYPE.to_string(),
            subject: vec![Subject::from(subject)],
            predicate_type: VSA_PREDICATE_TYPE.to_string(),
            predicate,
        }
    }

    /// RFC 8785 canonical encoding; this is the signed payload
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>, String> {
        serde_json_canonicalizer::to_vec(self).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(git_url: Option<&str>) -> SubjectMetadata {
        SubjectMetadata {
            name: "quay.io/acme/api".to_string(),
            git_url: git_url.map(str::to_string),
            digest: Digest::sha256(b"image"),
        }
    }

    #[test]
    fn test_statement_shape() {
        let statement = Statement::new(json!({"validationResult": "passed"}), &meta(Some("https://git/acme")));
        let value = serde_json::to_value(&statement).unwrap();

        assert_eq!(value["_type"], STATEMENT_TYPE);
        assert_eq!(value["predicateType"], VSA_PREDICATE_TYPE);
        assert_eq!(value["subject"][0]["name"], "quay.io/acme/api");
        assert_eq!(
            value["subject"][0]["digest"]["sha256"],
            Digest::sha256(b"image").hex()
        );
        assert_eq!(value["subject"][0]["annotations"]["gitUrl"], "https://git/acme");
        assert_eq!(value["predicate"]["validationResult"], "passed");
    }

    #[test]
    fn test_empty_git_url_omits_annotations() {
        let statement = Statement::new(json!({}), &meta(Some("")));
        let value = serde_json::to_value(&statement).unwrap();
        assert!(value["subject"][0].get("annotations").is_none());
    }

    #[test]
    fn test_canonical_bytes_sorted_and_compact() {
        let statement = Statement::new(json!({"b": 1, "a": 2}), &meta(None));
        let bytes = statement.to_canonical_bytes().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("{\"_type\":"));
        assert!(text.contains("\"predicate\":{\"a\":2,\"b\":1}"));
        assert!(!text.contains('\n'));
    }
}
