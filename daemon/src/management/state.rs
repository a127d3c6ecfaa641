use mcsm_protocol::management::instance::LifecycleState;
use std::sync::Mutex;

use super::error::TransitionError;

/// Lifecycle state guarded by the transition table.
#[derive(Debug, Default)]
pub struct StateCell {
    state: Mutex<LifecycleState>,
}

impl StateCell {
    pub fn new(initial: LifecycleState) -> Self {
        Self {
            state: Mutex::new(initial),
        }
    }

    pub fn get(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Applies `to` if the table allows it and returns the previous state.
    pub fn transition(&self, to: LifecycleState) -> Result<LifecycleState, TransitionError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let from = *state;
        if !from.can_transition_to(&to) {
            return Err(TransitionError { from, to });
        }
        *state = to;
        Ok(from)
    }

    /// Like `transition`, but only when the current state is `from`.
    pub fn transition_from(
        &self,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<LifecycleState, TransitionError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != from || !from.can_transition_to(&to) {
            return Err(TransitionError { from: *state, to });
        }
        *state = to;
        Ok(from)
    }
}
