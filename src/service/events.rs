//! Pipeline observer
//!
//! The service reports each stage transition to an `EventSink`. The
//! default sink logs through `tracing`; tests record events instead.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;
use tracing::{error, info};

use super::state::VsaUnit;
use crate::error::Stage;

/// A stage transition of one unit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VsaEvent {
    Generated {
        unit: VsaUnit,
        passed: bool,
    },
    Written {
        unit: VsaUnit,
        path: PathBuf,
    },
    Attested {
        unit: VsaUnit,
        envelope_path: PathBuf,
        key_id: String,
    },
    Uploaded {
        unit: VsaUnit,
        uploader: String,
        location: String,
    },
    Failed {
        unit: VsaUnit,
        stage: Stage,
        error: String,
    },
}

/// Receives pipeline events; must tolerate concurrent calls
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &VsaEvent);
}

/// Logs events with `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &VsaEvent) {
        match event {
            VsaEvent::Generated { unit, passed } => {
                info!(%unit, passed, "VSA predicate generated");
            }
            VsaEvent::Written { unit, path } => {
                info!(%unit, path = %path.display(), "VSA predicate stored");
            }
            VsaEvent::Attested {
                unit,
                envelope_path,
                key_id,
            } => {
                info!(%unit, envelope = %envelope_path.display(), key_id = %key_id, "VSA attested");
            }
            VsaEvent::Uploaded {
                unit,
                uploader,
                location,
            } => {
                info!(%unit, uploader = %uploader, location = %location, "VSA upload complete");
            }
            VsaEvent::Failed { unit, stage, error } => {
                error!(%unit, %stage, error = %error, "VSA processing failed");
            }
        }
    }
}

/// Collects events in emission order
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<VsaEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<VsaEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn failures(&self) -> Vec<VsaEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, VsaEvent::Failed { .. }))
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &VsaEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
