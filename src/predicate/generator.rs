//! Component predicate generation

use chrono::{DateTime, Utc};
use tracing::debug;
use vsa_report::{Component, Report};

use super::{concat_rule_results, now_seconds, ComponentInfo, Predicate, ValidationResult, VERIFIER};
use crate::context::{CancelReason, Context};

/// Errors raised while building a predicate from a report
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("report has no policy metadata")]
    MissingPolicy,

    #[error("invalid component name {0:?}: must be a non-empty single path segment")]
    InvalidComponentName(String),

    #[error("generation aborted: {0}")]
    Cancelled(CancelReason),
}

/// Produces a predicate from evaluation data
pub trait PredicateGenerator {
    fn generate_predicate(&self, ctx: &Context) -> Result<Predicate, GenerationError>;
}

/// Reject names that would escape the writer's temp directory.
pub fn validate_component_name(name: &str) -> Result<(), GenerationError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(GenerationError::InvalidComponentName(name.to_string()));
    }
    Ok(())
}

/// Generator for a single component of a report
pub struct ComponentGenerator<'a> {
    report: &'a Report,
    component: &'a Component,
    timestamp: Option<DateTime<Utc>>,
}

impl<'a> ComponentGenerator<'a> {
    pub fn new(report: &'a Report, component: &'a Component) -> Self {
        Self {
            report,
            component,
            timestamp: None,
        }
    }

    /// Pin the predicate timestamp instead of reading the clock
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

impl PredicateGenerator for ComponentGenerator<'_> {
    fn generate_predicate(&self, ctx: &Context) -> Result<Predicate, GenerationError> {
        ctx.check().map_err(GenerationError::Cancelled)?;

        let comp = self.component;
        validate_component_name(&comp.name)?;
        let policy_source = self
            .report
            .policy_name()
            .ok_or(GenerationError::MissingPolicy)?
            .to_string();

        debug!(
            component = %comp.name,
            image = %comp.container_image,
            "generating VSA predicate"
        );

        Ok(Predicate {
            image_ref: comp.container_image.clone(),
            validation_result: ValidationResult::from_success(comp.success),
            timestamp: self.timestamp.unwrap_or_else(now_seconds),
            verifier: VERIFIER.to_string(),
            policy_source,
            component: ComponentInfo {
                container_image: comp.container_image.clone(),
                name: comp.name.clone(),
                source: comp.source.clone(),
            },
            rule_results: concat_rule_results(&comp.violations, &comp.warnings, &comp.successes),
        })
    }
}
