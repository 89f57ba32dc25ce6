//! Single-owner arbitration for axis motion.
//!
//! Homing, moves, jogs and sample streams all have to own the axis before
//! they touch `position`. A new claimant cancels whoever holds (or is
//! waiting for) the axis, then queues on the owner lock until the previous
//! owner has actually let go. Releasing ownership settles the axis record
//! (`velocity = 0`, `busy = false`) before the next owner can start.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::shared::{settle, SharedAxis};
use crate::axis::state::{AxisState, MotionKind};
use crate::error::{AxisError, Result};

struct Ticket {
    id: Uuid,
    kind: MotionKind,
    cancel: CancellationToken,
    finished: CancellationToken,
}

/// Fires `finished` when the claimant goes away, whether it ever got to own
/// the axis or not.
struct Release(CancellationToken);

impl Drop for Release {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[derive(Clone, Default)]
pub(crate) struct MotionSlot {
    owner: Arc<tokio::sync::Mutex<()>>,
    current: Arc<Mutex<Option<Ticket>>>,
}

impl MotionSlot {
    /// Cancels the current claimant and waits to become the owner.
    ///
    /// `parent` links the new owner's cancellation to a caller token.
    /// Fails with `Cancelled`, leaving the axis untouched, when a newer
    /// claim or a stop arrives before the previous owner let go.
    pub async fn acquire(
        &self,
        axis: &SharedAxis,
        kind: MotionKind,
        parent: Option<&CancellationToken>,
    ) -> Result<MotionLease> {
        let id = Uuid::new_v4();
        let cancel = parent
            .map(CancellationToken::child_token)
            .unwrap_or_else(CancellationToken::new);
        if cancel.is_cancelled() {
            return Err(AxisError::Cancelled);
        }
        let finished = CancellationToken::new();
        let release = Release(finished.clone());

        let previous = self.lock_current().replace(Ticket {
            id,
            kind,
            cancel: cancel.clone(),
            finished,
        });
        if let Some(previous) = previous {
            debug!(motion = %previous.id, kind = ?previous.kind, superseded_by = %id, "cancelling previous motion");
            previous.cancel.cancel();
        }

        let guard = self.owner.clone().lock_owned().await;
        if cancel.is_cancelled() {
            debug!(motion = %id, ?kind, "motion cancelled before it started");
            self.clear(id);
            return Err(AxisError::Cancelled);
        }

        axis.update(|s| {
            s.busy = true;
            s.motion = Some(kind);
        });

        Ok(MotionLease {
            id,
            kind,
            cancel,
            axis: axis.clone(),
            current: self.current.clone(),
            settled: false,
            _guard: guard,
            _release: release,
        })
    }

    /// Requests cancellation of the current claimant, optionally only when
    /// it is of the given kind. Returns a token that fires once it is gone.
    pub fn cancel(&self, only: Option<MotionKind>) -> Option<CancellationToken> {
        let current = self.lock_current();
        match current.as_ref() {
            Some(ticket) if only.map_or(true, |kind| kind == ticket.kind) => {
                ticket.cancel.cancel();
                Some(ticket.finished.clone())
            }
            _ => None,
        }
    }

    /// Cancels and waits until the claimant has relinquished the axis.
    /// Returns whether anything was cancelled.
    pub async fn halt(&self, only: Option<MotionKind>) -> bool {
        match self.cancel(only) {
            Some(finished) => {
                finished.cancelled().await;
                true
            }
            None => false,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.owner.try_lock().is_ok()
    }

    fn clear(&self, id: Uuid) {
        clear_ticket(&self.current, id);
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<Ticket>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn clear_ticket(current: &Mutex<Option<Ticket>>, id: Uuid) {
    let mut current = current.lock().unwrap_or_else(PoisonError::into_inner);
    if current.as_ref().is_some_and(|ticket| ticket.id == id) {
        *current = None;
    }
}

/// Ownership of one axis for the lifetime of a motion.
///
/// Dropping the lease settles the axis record, then releases the owner lock.
pub(crate) struct MotionLease {
    id: Uuid,
    kind: MotionKind,
    cancel: CancellationToken,
    axis: SharedAxis,
    current: Arc<Mutex<Option<Ticket>>>,
    settled: bool,
    // Declaration order matters: the owner lock goes before `finished` fires.
    _guard: OwnedMutexGuard<()>,
    _release: Release,
}

impl MotionLease {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> MotionKind {
        self.kind
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Applies the final effect of the motion and settles the axis in the
    /// same critical section.
    pub fn complete(mut self, f: impl FnOnce(&mut AxisState)) {
        self.axis.update(|s| {
            f(s);
            settle(s);
        });
        self.settled = true;
    }
}

impl Drop for MotionLease {
    fn drop(&mut self) {
        if !self.settled {
            self.axis.update(settle);
        }
        clear_ticket(&self.current, self.id);
    }
}
