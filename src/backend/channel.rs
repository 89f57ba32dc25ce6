use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use super::ownership::{MotionLease, MotionSlot};
use super::shared::{settle, SharedAxis};
use super::PositionStream;
use crate::axis::limits::SoftLimits;
use crate::axis::state::{AxisState, MotionKind};
use crate::error::{AxisError, Result};

/// Where commanded positions go.
///
/// Returns the feedback position to publish for the commanded one.
pub(crate) trait PositionSink: Send + Sync + 'static {
    fn apply(&self, axis: usize, commanded: f64) -> f64;
}

/// The axis record plus its motion arbitration, shared by both backends.
#[derive(Clone)]
pub(crate) struct AxisChannel {
    index: usize,
    defaults: SoftLimits,
    state: SharedAxis,
    slot: MotionSlot,
}

impl AxisChannel {
    pub fn new(index: usize, defaults: SoftLimits) -> Self {
        Self {
            index,
            defaults,
            state: SharedAxis::new(AxisState::with_limits(defaults)),
            slot: MotionSlot::default(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> &SharedAxis {
        &self.state
    }

    /// Discards the record and starts over from the configured defaults.
    pub fn reset(&self) {
        self.state.replace(AxisState::with_limits(self.defaults));
    }

    pub fn ensure_servo(&self) -> Result<()> {
        if self.state.snapshot().servo_on {
            Ok(())
        } else {
            warn!(axis = self.index, "motion rejected: servo off");
            Err(AxisError::servo_off(self.index))
        }
    }

    pub fn ensure_within_limits(&self, target: f64) -> Result<()> {
        let limits = self.state.snapshot().soft_limits();
        match limits.violation(target) {
            None => Ok(()),
            Some((side, bound)) => {
                warn!(axis = self.index, target, %side, bound, "motion rejected: soft limit");
                Err(AxisError::LimitViolation {
                    axis: self.index,
                    target,
                    side,
                    bound,
                })
            }
        }
    }

    pub async fn claim(
        &self,
        kind: MotionKind,
        parent: Option<&CancellationToken>,
    ) -> Result<MotionLease> {
        self.slot.acquire(&self.state, kind, parent).await
    }

    /// Cancels the current motion (of `only` kind, if given) and waits for
    /// it to relinquish the axis.
    pub async fn halt(&self, only: Option<MotionKind>) -> bool {
        let halted = self.slot.halt(only).await;
        if halted {
            debug!(axis = self.index, ?only, "motion halted");
        }
        halted
    }

    /// Halts whatever runs and leaves the axis settled.
    pub async fn stop_motion(&self) {
        self.halt(None).await;
        if self.slot.is_idle() {
            self.state.update(settle);
        }
    }

    pub fn apply_soft_limit(&self, min: f64, max: f64) {
        let limits = SoftLimits::new(min, max);
        let position = self.state.update(|s| {
            s.soft_min = min;
            s.soft_max = max;
            s.position
        });
        if !limits.is_ordered() {
            warn!(axis = self.index, min, max, "soft limits are inverted");
        } else if !limits.contains(position) {
            warn!(axis = self.index, min, max, position, "current position lies outside the new soft limits");
        } else {
            info!("Soft limits [{}, {}] applied on axis {}", min, max, self.index);
        }
    }

    /// Spawns the sample loop for `lease` and returns the applied positions.
    ///
    /// The loop writes `samples` through `sink` one by one, pausing `dt`
    /// between them, and stops without further writes once the lease is
    /// cancelled or the receiver is dropped. A sample is only written once
    /// there is room to deliver it, so every applied position reaches the
    /// receiver. The lease is released by the task, whether or not anyone
    /// is reading.
    pub fn drive(
        &self,
        lease: MotionLease,
        samples: Vec<f64>,
        dt: Duration,
        sink: Arc<dyn PositionSink>,
    ) -> mpsc::Receiver<f64> {
        let (tx, rx) = mpsc::channel(1);
        let span = tracing::debug_span!("samples", axis = self.index, motion = %lease.id());
        tokio::spawn(
            feed_samples(self.state.clone(), self.index, lease, samples, dt, sink, tx)
                .instrument(span),
        );
        rx
    }

    /// Lazy stream over a spawned sample loop. The axis is claimed on
    /// first poll.
    pub fn stream(
        &self,
        samples: Vec<f64>,
        dt: Duration,
        cancel: CancellationToken,
        sink: Arc<dyn PositionSink>,
    ) -> PositionStream {
        let channel = self.clone();
        Box::pin(stream! {
            let (tx, mut rx) = mpsc::channel(1);
            tokio::spawn(async move {
                let claimed = tokio::select! {
                    claimed = channel.claim(MotionKind::Stream, Some(&cancel)) => claimed,
                    _ = tx.closed() => return,
                };
                match claimed {
                    Ok(lease) => {
                        let span = tracing::debug_span!("samples", axis = channel.index, motion = %lease.id());
                        feed_samples(channel.state.clone(), channel.index, lease, samples, dt, sink, tx)
                            .instrument(span)
                            .await;
                    }
                    Err(e) => debug!(axis = channel.index, "Stream did not start: {}", e),
                }
            });
            while let Some(position) = rx.recv().await {
                yield position;
            }
        })
    }

    /// Runs a planned profile to the end. `Err(Cancelled)` if it was cut
    /// short.
    pub async fn run_profile(
        &self,
        lease: MotionLease,
        samples: Vec<f64>,
        dt: Duration,
        sink: Arc<dyn PositionSink>,
    ) -> Result<()> {
        let total = samples.len();
        let mut applied = 0usize;
        let mut positions = self.drive(lease, samples, dt, sink);
        while positions.recv().await.is_some() {
            applied += 1;
        }
        if applied == total {
            Ok(())
        } else {
            debug!(axis = self.index, applied, total, "profile interrupted");
            Err(AxisError::Cancelled)
        }
    }

    /// Starts the background jog loop. The loop owns `lease` and gives the
    /// axis back when cancelled or when the next step would cross a soft
    /// limit; the last in-bounds position is kept, not clamped.
    pub fn spawn_jog(
        &self,
        lease: MotionLease,
        velocity: f64,
        dt: Duration,
        sink: Arc<dyn PositionSink>,
    ) {
        let state = self.state.clone();
        let axis = self.index;
        let span = tracing::info_span!("jog", axis, motion = %lease.id());

        tokio::spawn(
            async move {
                let token = lease.token().clone();
                let step = velocity * dt.as_secs_f64();
                loop {
                    if lease.is_cancelled() {
                        break;
                    }
                    let snapshot = state.snapshot();
                    let next = snapshot.position + step;
                    if let Some((side, bound)) = snapshot.soft_limits().violation(next) {
                        info!(%side, bound, position = snapshot.position, "jog halted at soft limit");
                        break;
                    }
                    let actual = sink.apply(axis, next);
                    state.update(|s| {
                        s.position = actual;
                        s.velocity = velocity;
                    });

                    tokio::select! {
                        _ = tokio::time::sleep(dt) => {}
                        _ = token.cancelled() => break,
                    }
                }
                debug!(cancelled = token.is_cancelled(), "jog loop finished");
                drop(lease);
            }
            .instrument(span),
        );
    }
}

async fn feed_samples(
    state: SharedAxis,
    axis: usize,
    lease: MotionLease,
    samples: Vec<f64>,
    dt: Duration,
    sink: Arc<dyn PositionSink>,
    tx: mpsc::Sender<f64>,
) {
    let token = lease.token().clone();
    let secs = dt.as_secs_f64();
    let total = samples.len();
    let mut previous = state.position();
    for (i, commanded) in samples.into_iter().enumerate() {
        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            permit = tx.reserve() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        if lease.is_cancelled() {
            break;
        }
        let actual = sink.apply(axis, commanded);
        let velocity = (actual - previous) / secs;
        state.update(|s| {
            s.position = actual;
            s.velocity = velocity;
        });
        previous = actual;
        permit.send(actual);

        if i + 1 < total {
            tokio::select! {
                _ = tokio::time::sleep(dt) => {}
                _ = token.cancelled() => break,
                _ = tx.closed() => break,
            }
        }
    }
    debug!(kind = ?lease.kind(), cancelled = token.is_cancelled(), "sample loop ended");
    drop(lease);
}
