use std::sync::{Arc, PoisonError, RwLock};

use crate::axis::state::AxisState;

/// The live axis record of one backend.
///
/// Guards are never held across an `.await`; every access is a short
/// critical section, so readers always get a whole snapshot.
#[derive(Debug, Clone)]
pub(crate) struct SharedAxis(Arc<RwLock<AxisState>>);

impl SharedAxis {
    pub fn new(state: AxisState) -> Self {
        Self(Arc::new(RwLock::new(state)))
    }

    pub fn snapshot(&self) -> AxisState {
        *self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn position(&self) -> f64 {
        self.snapshot().position
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut AxisState) -> R) -> R {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn replace(&self, state: AxisState) {
        self.update(|current| *current = state);
    }
}

/// Terminal values for an axis whose motion owner has gone away.
pub(crate) fn settle(state: &mut AxisState) {
    state.velocity = 0.0;
    state.busy = false;
    state.motion = None;
}
