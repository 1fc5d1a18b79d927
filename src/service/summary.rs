//! Batch outcome aggregation
//!
//! Component failures are recorded and counted; only a snapshot failure
//! fails the batch.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AttestedVsa;
use crate::error::{ProcessError, Stage};

/// Summary schema version
pub const BATCH_SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Summary schema identifier
pub const BATCH_SUMMARY_SCHEMA_ID: &str = "vsa-attest/batch_summary@1";

/// Component outcome status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Attested,
    Skipped,
}

/// Result for one component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentOutcome {
    pub name: String,
    pub image: String,
    pub status: OutcomeStatus,

    /// Stage that failed, for skipped components
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope_path: Option<PathBuf>,

    /// Upload location (empty when upload is disabled)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl ComponentOutcome {
    pub fn attested(name: &str, image: &str, vsa: &AttestedVsa) -> Self {
        Self {
            name: name.to_string(),
            image: image.to_string(),
            status: OutcomeStatus::Attested,
            stage: None,
            error: None,
            envelope_path: Some(vsa.envelope_path.clone()),
            location: Some(vsa.location.clone()),
        }
    }

    pub fn skipped(name: &str, image: &str, err: &ProcessError) -> Self {
        Self {
            name: name.to_string(),
            image: image.to_string(),
            status: OutcomeStatus::Skipped,
            stage: Some(err.stage),
            error: Some(err.source.to_string()),
            envelope_path: None,
            location: None,
        }
    }

    pub fn is_attested(&self) -> bool {
        self.status == OutcomeStatus::Attested
    }
}

/// Result for the snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotOutcome {
    pub name: String,
    pub predicate_path: PathBuf,
    pub envelope_path: PathBuf,

    /// `sha256:<hex>` of the written predicate
    pub digest: String,

    pub passed: bool,
    pub location: String,
}

impl From<&AttestedVsa> for SnapshotOutcome {
    fn from(vsa: &AttestedVsa) -> Self {
        Self {
            name: vsa.unit.name().to_string(),
            predicate_path: vsa.predicate_path.clone(),
            envelope_path: vsa.envelope_path.clone(),
            digest: vsa.digest.to_string(),
            passed: vsa.predicate.passed(),
            location: vsa.location.clone(),
        }
    }
}

/// Outcome of `process_all_vsas`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub schema_version: u32,
    pub schema_id: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,

    /// Per-component outcomes, in report order
    pub components: Vec<ComponentOutcome>,

    pub snapshot: SnapshotOutcome,

    pub attested_count: usize,
    pub skipped_count: usize,
}

impl BatchSummary {
    /// Apply the batch policy: component outcomes are kept whatever they
    /// are, a snapshot error is returned as the batch error.
    pub fn reduce(
        run_id: impl Into<String>,
        components: Vec<ComponentOutcome>,
        snapshot: Result<AttestedVsa, ProcessError>,
    ) -> Result<Self, ProcessError> {
        let snapshot = SnapshotOutcome::from(&snapshot?);
        let attested_count = components.iter().filter(|c| c.is_attested()).count();
        let skipped_count = components.len() - attested_count;

        Ok(Self {
            schema_version: BATCH_SUMMARY_SCHEMA_VERSION,
            schema_id: BATCH_SUMMARY_SCHEMA_ID.to_string(),
            run_id: run_id.into(),
            created_at: Utc::now(),
            components,
            snapshot,
            attested_count,
            skipped_count,
        })
    }

    /// Check if every component was attested
    pub fn all_attested(&self) -> bool {
        self.skipped_count == 0
    }

    pub fn skipped(&self) -> impl Iterator<Item = &ComponentOutcome> {
        self.components.iter().filter(|c| !c.is_attested())
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        let total = self.components.len();
        if total == 0 {
            return format!(
                "Run {}: no components, snapshot {} attested",
                self.run_id, self.snapshot.name
            );
        }

        let mut parts = Vec::new();
        if self.attested_count > 0 {
            parts.push(format!("{} attested", self.attested_count));
        }
        if self.skipped_count > 0 {
            parts.push(format!("{} skipped", self.skipped_count));
        }

        format!(
            "Run {}: {} of {} components ({}), snapshot {} attested",
            self.run_id,
            self.attested_count,
            total,
            parts.join(", "),
            self.snapshot.name
        )
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
