//! Rule outcomes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One violation, warning or success entry from policy evaluation.
///
/// `metadata` is a sorted map, so encoding is stable regardless of the
/// order keys appeared in the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    /// Human-readable outcome message
    pub msg: String,

    /// Rule metadata (code, title, description, ...)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,

    /// Optional rule outputs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
}

impl RuleResult {
    /// Create a result with only a message
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            metadata: Map::new(),
            outputs: Vec::new(),
        }
    }

    /// Attach the rule code (`metadata.code`)
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.metadata
            .insert("code".to_string(), Value::String(code.into()));
        self
    }

    /// The rule code, if the metadata carries one
    pub fn code(&self) -> Option<&str> {
        self.metadata.get("code").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_encoding_omits_empty_fields() {
        let json = serde_json::to_string(&RuleResult::new("ok")).unwrap();
        assert_eq!(json, r#"{"msg":"ok"}"#);
    }

    #[test]
    fn test_code_accessor() {
        let result = RuleResult::new("bad signature").with_code("builtin.image.signature_check");
        assert_eq!(result.code(), Some("builtin.image.signature_check"));
        assert_eq!(RuleResult::new("x").code(), None);
    }

    #[test]
    fn test_metadata_keys_sorted() {
        let result: RuleResult = serde_json::from_str(
            r#"{"msg":"m","metadata":{"title":"t","code":"c","collections":["a"]}}"#,
        )
        .unwrap();
        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(
            json,
            r#"{"msg":"m","metadata":{"code":"c","collections":["a"],"title":"t"}}"#
        );
    }
}
