//! Per-unit state machine
//!
//! States: PENDING → GENERATED → WRITTEN → ATTESTED → DONE
//! with FAILED reachable from any non-terminal state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Stage;

/// What a unit of work attests
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum VsaUnit {
    Component(String),
    Snapshot(String),
}

impl VsaUnit {
    pub fn name(&self) -> &str {
        match self {
            VsaUnit::Component(name) | VsaUnit::Snapshot(name) => name,
        }
    }
}

impl fmt::Display for VsaUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VsaUnit::Component(name) => write!(f, "component {}", name),
            VsaUnit::Snapshot(name) => write!(f, "snapshot {}", name),
        }
    }
}

/// Unit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VsaState {
    Pending,
    Generated,
    Written,
    Attested,
    Done,
    Failed,
}

impl VsaState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, VsaState::Done | VsaState::Failed)
    }

    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: VsaState) -> bool {
        match (self, target) {
            (VsaState::Pending, VsaState::Generated) => true,
            (VsaState::Generated, VsaState::Written) => true,
            (VsaState::Written, VsaState::Attested) => true,
            (VsaState::Attested, VsaState::Done) => true,
            (from, VsaState::Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Errors for state transitions
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: VsaState, to: VsaState },
}

/// Progress of one unit through the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VsaProgress {
    pub unit: VsaUnit,
    pub state: VsaState,

    /// Stage that failed, once FAILED
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub updated_at: DateTime<Utc>,
}

impl VsaProgress {
    pub fn new(unit: VsaUnit) -> Self {
        Self {
            unit,
            state: VsaState::Pending,
            failed_stage: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    /// Transition to a new (non-failed) state
    pub fn transition(&mut self, new_state: VsaState) -> Result<(), StateError> {
        if new_state == VsaState::Failed || !self.state.can_transition_to(new_state) {
            return Err(StateError::InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }
        self.state = new_state;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the unit failed at `stage`
    pub fn fail(&mut self, stage: Stage, error: impl Into<String>) -> Result<(), StateError> {
        if !self.state.can_transition_to(VsaState::Failed) {
            return Err(StateError::InvalidTransition {
                from: self.state,
                to: VsaState::Failed,
            });
        }
        self.state = VsaState::Failed;
        self.failed_stage = Some(stage);
        self.error = Some(error.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress() -> VsaProgress {
        VsaProgress::new(VsaUnit::Component("img1".to_string()))
    }

    #[test]
    fn test_happy_path() {
        let mut p = progress();
        for state in [
            VsaState::Generated,
            VsaState::Written,
            VsaState::Attested,
            VsaState::Done,
        ] {
            p.transition(state).unwrap();
        }
        assert!(p.is_terminal());
        assert!(p.failed_stage.is_none());
    }

    #[test]
    fn test_cannot_skip_states() {
        let mut p = progress();
        assert!(p.transition(VsaState::Written).is_err());
        assert!(p.transition(VsaState::Done).is_err());
        assert_eq!(p.state, VsaState::Pending);
    }

    #[test]
    fn test_fail_from_any_non_terminal() {
        for steps in 0..4 {
            let mut p = progress();
            let path = [VsaState::Generated, VsaState::Written, VsaState::Attested, VsaState::Done];
            for state in &path[..steps] {
                p.transition(*state).unwrap();
            }
            p.fail(Stage::Attest, "boom").unwrap();
            assert_eq!(p.state, VsaState::Failed);
            assert_eq!(p.failed_stage, Some(Stage::Attest));
            assert_eq!(p.error.as_deref(), Some("boom"));
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut p = progress();
        p.fail(Stage::Generate, "x").unwrap();
        assert!(p.fail(Stage::Write, "y").is_err());
        assert!(p.transition(VsaState::Generated).is_err());
        assert_eq!(p.failed_stage, Some(Stage::Generate));
    }

    #[test]
    fn test_transition_rejects_failed_target() {
        let mut p = progress();
        assert!(p.transition(VsaState::Failed).is_err());
    }

    #[test]
    fn test_unit_display_and_serde() {
        let unit = VsaUnit::Snapshot("release".to_string());
        assert_eq!(unit.to_string(), "snapshot release");
        assert_eq!(unit.name(), "release");
        let json = serde_json::to_value(&unit).unwrap();
        assert_eq!(json["kind"], "snapshot");
        assert_eq!(json["name"], "release");
    }
}
