//! Policy evaluation report model
//!
//! Defines the `Report`/`Component` values produced by the policy engine
//! and consumed by the VSA pipeline. The JSON field names follow the
//! application snapshot report format.

pub mod component;
pub mod error;
pub mod report;
pub mod result;

pub use component::{Component, GitSource, Source};
pub use error::ReportError;
pub use report::{Policy, PolicySource, Report};
pub use result::RuleResult;
