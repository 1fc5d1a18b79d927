//! Snapshot-level report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::component::Component;
use crate::error::ReportError;

/// One policy source (bundle) that was evaluated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicySource {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policy: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<String>,
}

/// Policy metadata attached to a report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Name of the evaluated policy; empty if unnamed
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<PolicySource>,
}

impl Policy {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: Vec::new(),
        }
    }
}

/// Result of evaluating a snapshot of components against a policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Overall verdict as computed by the policy engine
    #[serde(default)]
    pub success: bool,

    /// Snapshot name, if the input was a named snapshot
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub snapshot: String,

    #[serde(default)]
    pub components: Vec<Component>,

    /// Policy metadata; absent in malformed reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<Policy>,

    #[serde(
        rename = "effective-time",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub effective_time: Option<DateTime<Utc>>,
}

impl Report {
    /// Create a report with the given policy and components
    pub fn new(policy: Policy, components: Vec<Component>) -> Self {
        let success = components.iter().all(|c| c.success);
        Self {
            success,
            snapshot: String::new(),
            components,
            policy: Some(policy),
            effective_time: None,
        }
    }

    /// Parse a report from JSON
    pub fn from_json(json: &str) -> Result<Self, ReportError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a report from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ReportError> {
        let json = fs::read_to_string(path).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Find a component by name
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Policy name, or `None` if the report carries no policy
    pub fn policy_name(&self) -> Option<&str> {
        self.policy.as_ref().map(|p| p.name.as_str())
    }
}
