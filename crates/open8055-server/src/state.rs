//! Small shared cells used by the acceptor, sessions and readers.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use open8055_access::AccessPolicy;
use open8055_core::RunState;
use tracing::trace;

/// Run state shared between a task and whoever supervises it.
///
/// The state only moves forward: `RUNNING`, `STOPPING`, `STOPPED`.
#[derive(Debug, Clone, Default)]
pub struct StateCell(Arc<Mutex<RunState>>);

impl StateCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> RunState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.get().is_running()
    }

    /// Move to `next`. A backward move leaves the state alone.
    ///
    /// Returns the previous state.
    pub fn advance(&self, next: RunState) -> RunState {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = *state;
        if let Ok(new) = previous.transition(next) {
            trace!(from = %previous, to = %new, "state change");
            *state = new;
        }
        previous
    }
}

/// The access policy currently in force, replaceable at runtime.
///
/// Checks work on a snapshot, so a reload never blocks behind a slow
/// users file lookup.
#[derive(Debug, Clone)]
pub struct PolicyCell(Arc<RwLock<Arc<AccessPolicy>>>);

impl PolicyCell {
    pub fn new(policy: AccessPolicy) -> Self {
        Self(Arc::new(RwLock::new(Arc::new(policy))))
    }

    pub fn current(&self) -> Arc<AccessPolicy> {
        Arc::clone(&self.0.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn replace(&self, policy: AccessPolicy) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(policy);
    }
}
