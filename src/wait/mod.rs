//! Spool-switch wait state
//!
//! When a slot expects a different spool than the one loaded, the check run
//! blocks until the operator confirms the switch, cancels, or the timeout
//! runs out. The state is the only value shared between the blocked check
//! and the command handler that answers it.

use log::{debug, info};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitState {
    #[default]
    Ok,
    Waiting,
    Cancel,
}

/// How a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Resumed,
    Cancelled,
    TimedOut,
}

/// Cloneable handle to the shared wait state.
#[derive(Debug, Clone, Default)]
pub struct SpoolWait {
    inner: Arc<(Mutex<WaitState>, Condvar)>,
}

impl SpoolWait {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> WaitState {
        *self.inner.0.lock()
    }

    /// Set the state and wake any blocked check.
    pub fn set(&self, state: WaitState) {
        let (lock, cvar) = &*self.inner;
        let mut current = lock.lock();
        debug!("spool wait state {:?} -> {:?}", *current, state);
        *current = state;
        cvar.notify_all();
    }

    pub fn reset(&self) {
        self.set(WaitState::Ok);
    }

    /// Enter `Waiting`. Must be called before the operator is prompted so a
    /// fast answer is not overwritten.
    pub fn begin(&self) {
        self.set(WaitState::Waiting);
    }

    /// Block while the state is `Waiting`, at most `timeout`. A timeout
    /// too large to represent as a deadline waits for an answer only.
    /// A timeout leaves the state at `Cancel`.
    pub fn wait(&self, timeout: Duration) -> WaitOutcome {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now().checked_add(timeout);
        let mut state = lock.lock();

        while *state == WaitState::Waiting {
            match deadline {
                Some(deadline) => {
                    if cvar.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                None => cvar.wait(&mut state),
            }
        }

        match *state {
            WaitState::Ok => {
                info!("spool switch confirmed");
                WaitOutcome::Resumed
            }
            WaitState::Cancel => {
                info!("spool switch cancelled");
                WaitOutcome::Cancelled
            }
            WaitState::Waiting => {
                info!("spool switch timed out after {:?}", timeout);
                *state = WaitState::Cancel;
                WaitOutcome::TimedOut
            }
        }
    }
}
