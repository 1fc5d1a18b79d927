//! VSA predicate model and generators
//!
//! The predicate is the unsigned verdict document. Its JSON field names
//! and the ordering of `ruleResults` are a compatibility contract with
//! downstream consumers.

mod generator;
mod snapshot;

pub use generator::{
    validate_component_name, ComponentGenerator, GenerationError, PredicateGenerator,
};
pub use snapshot::{SnapshotGenerator, DEFAULT_SNAPSHOT_NAME};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use vsa_report::{RuleResult, Source};

/// Identifier of the tool that produced the verdict
pub const VERIFIER: &str = "ec-cli";

/// Verdict of a policy evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationResult {
    Passed,
    Failed,
}

impl ValidationResult {
    pub fn from_success(success: bool) -> Self {
        if success {
            ValidationResult::Passed
        } else {
            ValidationResult::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationResult::Passed => "passed",
            ValidationResult::Failed => "failed",
        }
    }
}

/// The `component` bag of a predicate.
///
/// Fields are declared in lexicographic key order so the encoding matches
/// what a sorted-map encoder would produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentInfo {
    #[serde(rename = "containerImage")]
    pub container_image: String,

    pub name: String,

    pub source: Source,
}

/// Verification Summary Attestation predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Predicate {
    /// Subject image reference; empty for a snapshot predicate
    pub image_ref: String,

    pub validation_result: ValidationResult,

    /// UTC, second precision, RFC 3339
    #[serde(with = "rfc3339_seconds")]
    pub timestamp: DateTime<Utc>,

    pub verifier: String,

    /// Name of the evaluated policy; empty if unnamed
    pub policy_source: String,

    pub component: ComponentInfo,

    /// Violations, then warnings, then successes
    pub rule_results: Vec<RuleResult>,
}

impl Predicate {
    /// Deterministic indented encoding (two-space indent, fixed key order)
    pub fn to_json_pretty(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// File name the writer uses for this predicate
    pub fn file_name(&self) -> String {
        format!("vsa-{}.json", self.component.name)
    }

    pub fn passed(&self) -> bool {
        self.validation_result == ValidationResult::Passed
    }
}

/// Current instant truncated to whole seconds
pub fn now_seconds() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Concatenate rule outcome groups in the fixed order
pub(crate) fn concat_rule_results<'a>(
    violations: impl IntoIterator<Item = &'a RuleResult>,
    warnings: impl IntoIterator<Item = &'a RuleResult>,
    successes: impl IntoIterator<Item = &'a RuleResult>,
) -> Vec<RuleResult> {
    violations
        .into_iter()
        .chain(warnings)
        .chain(successes)
        .cloned()
        .collect()
}

mod rfc3339_seconds {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
