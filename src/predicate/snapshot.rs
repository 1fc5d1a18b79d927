//! Snapshot-level predicate generation
//!
//! Aggregates every component of a report into one predicate:
//! - `imageRef` is empty (there is no single subject image)
//! - the verdict passes only if the report and every component passed
//! - rule outcomes are all violations, then all warnings, then all
//!   successes, each in component order

use chrono::{DateTime, Utc};
use tracing::debug;
use vsa_report::{Report, Source};

use super::{
    concat_rule_results, now_seconds, validate_component_name, ComponentInfo, GenerationError,
    Predicate, PredicateGenerator, ValidationResult, VERIFIER,
};
use crate::context::Context;

/// Component name used when the report does not name its snapshot
pub const DEFAULT_SNAPSHOT_NAME: &str = "snapshot";

/// Generator for the whole-snapshot predicate
pub struct SnapshotGenerator<'a> {
    report: &'a Report,
    timestamp: Option<DateTime<Utc>>,
}

impl<'a> SnapshotGenerator<'a> {
    pub fn new(report: &'a Report) -> Self {
        Self {
            report,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Name the snapshot predicate is filed under
    pub fn snapshot_name(&self) -> &str {
        if self.report.snapshot.is_empty() {
            DEFAULT_SNAPSHOT_NAME
        } else {
            &self.report.snapshot
        }
    }
}

impl PredicateGenerator for SnapshotGenerator<'_> {
    fn generate_predicate(&self, ctx: &Context) -> Result<Predicate, GenerationError> {
        ctx.check().map_err(GenerationError::Cancelled)?;

        let name = self.snapshot_name().to_string();
        validate_component_name(&name)?;
        let policy_source = self
            .report
            .policy_name()
            .ok_or(GenerationError::MissingPolicy)?
            .to_string();

        let components = &self.report.components;
        let success = self.report.success && components.iter().all(|c| c.success);

        debug!(
            snapshot = %name,
            components = components.len(),
            "generating snapshot VSA predicate"
        );

        Ok(Predicate {
            image_ref: String::new(),
            validation_result: ValidationResult::from_success(success),
            timestamp: self.timestamp.unwrap_or_else(now_seconds),
            verifier: VERIFIER.to_string(),
            policy_source,
            component: ComponentInfo {
                container_image: String::new(),
                name,
                source: Source::default(),
            },
            rule_results: concat_rule_results(
                components.iter().flat_map(|c| &c.violations),
                components.iter().flat_map(|c| &c.warnings),
                components.iter().flat_map(|c| &c.successes),
            ),
        })
    }
}
