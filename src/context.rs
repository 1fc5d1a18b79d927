//! Cooperative cancellation and deadlines
//!
//! A `Context` is threaded through generation, attestation and upload.
//! Clones share the same cancellation state, so a signal handler holding
//! one clone can stop a pipeline running on another.
//!
//! Checks are cooperative: the pipeline polls `check()` before each stage
//! and before the signing call. In-flight file writes are not interrupted.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Why a context stopped accepting work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelReason {
    /// Explicit cancellation (caller or signal)
    Cancelled,
    /// The context deadline passed
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "context cancelled"),
            Self::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

const STATE_ACTIVE: u8 = 0;
const STATE_CANCELLED: u8 = 1;

/// Cancellation context for a pipeline run
#[derive(Debug, Clone)]
pub struct Context {
    state: Arc<AtomicU8>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that never expires on its own
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(STATE_ACTIVE)),
            deadline: None,
        }
    }

    /// A context that expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(STATE_ACTIVE)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Cancel this context and every clone of it
    pub fn cancel(&self) {
        self.state.store(STATE_CANCELLED, Ordering::SeqCst);
    }

    /// Deadline, if one was set
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Check whether work may proceed
    pub fn check(&self) -> Result<(), CancelReason> {
        if self.state.load(Ordering::SeqCst) == STATE_CANCELLED {
            return Err(CancelReason::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(CancelReason::DeadlineExceeded);
            }
        }
        Ok(())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_is_active() {
        let ctx = Context::new();
        assert!(ctx.check().is_ok());
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn test_cancel_propagates_to_clones() {
        let ctx = Context::new();
        let clone = ctx.clone();
        clone.cancel();
        assert_eq!(ctx.check(), Err(CancelReason::Cancelled));
    }

    #[test]
    fn test_deadline_exceeded() {
        let ctx = Context::with_timeout(Duration::from_millis(0));
        assert_eq!(ctx.check(), Err(CancelReason::DeadlineExceeded));
    }

    #[test]
    fn test_cancel_wins_over_deadline() {
        let ctx = Context::with_timeout(Duration::from_millis(0));
        ctx.cancel();
        assert_eq!(ctx.check(), Err(CancelReason::Cancelled));
    }
}
