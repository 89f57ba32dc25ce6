//! Timing-accurate simulated backend.
//!
//! Every delay is a real wait: homing sleeps for the configured duration and
//! motion advances one sample per tick, so observers see positions at the
//! pace a real controller would produce them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::channel::{AxisChannel, PositionSink};
use super::config::SimulatorConfig;
use super::{check_finite, check_interval, BackendKind, MotionBackend, PositionStream};
use crate::axis::movement_parameters::MovementParams;
use crate::axis::state::{AxisState, MotionKind};
use crate::error::{AxisError, Result};
use crate::trajectory::MotionProfile;

/// The simulated axis follows every command exactly.
struct Ideal;

impl PositionSink for Ideal {
    fn apply(&self, _axis: usize, commanded: f64) -> f64 {
        commanded
    }
}

pub struct SimulatorBackend {
    config: SimulatorConfig,
    open: AtomicBool,
    axes: Vec<AxisChannel>,
    sink: Arc<dyn PositionSink>,
}

impl SimulatorBackend {
    pub fn new(config: SimulatorConfig) -> Self {
        let limits = config.soft_limits();
        let axes = (0..config.axis_count.max(1))
            .map(|index| AxisChannel::new(index, limits))
            .collect();
        Self {
            config,
            open: AtomicBool::new(false),
            axes,
            sink: Arc::new(Ideal),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    fn channel(&self, axis: usize) -> Result<&AxisChannel> {
        self.axes.get(axis).ok_or(AxisError::UnknownAxis(axis))
    }

    /// The channel for a command that needs an open backend.
    fn active(&self, axis: usize) -> Result<&AxisChannel> {
        let channel = self.channel(axis)?;
        if self.open.load(Ordering::Acquire) {
            Ok(channel)
        } else {
            Err(AxisError::NotConnected)
        }
    }
}

impl Default for SimulatorBackend {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

#[async_trait::async_trait]
impl MotionBackend for SimulatorBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Simulator
    }

    fn axis_count(&self) -> usize {
        self.axes.len()
    }

    async fn open(&self) -> Result<()> {
        if !self.open.swap(true, Ordering::AcqRel) {
            for channel in &self.axes {
                channel.reset();
            }
            info!("Simulator opened with {} axes, tick {:?}", self.axes.len(), self.config.tick());
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let was_open = self.open.swap(false, Ordering::AcqRel);
        for channel in &self.axes {
            channel.stop_motion().await;
            channel.reset();
        }
        if was_open {
            info!("Simulator closed");
        }
        Ok(())
    }

    async fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn servo_on(&self, axis: usize) -> Result<()> {
        let channel = self.active(axis)?;
        channel.state().update(|s| s.servo_on = true);
        info!("Servo enabled on axis {}", axis);
        Ok(())
    }

    async fn servo_off(&self, axis: usize) -> Result<()> {
        let channel = self.active(axis)?;
        channel.state().update(|s| s.servo_on = false);
        info!("Servo disabled on axis {}", axis);
        Ok(())
    }

    async fn home(&self, axis: usize) -> Result<()> {
        let channel = self.active(axis)?;
        channel.ensure_servo()?;

        let lease = channel.claim(MotionKind::Homing, None).await?;
        info!(axis, motion = %lease.id(), "homing");
        tokio::select! {
            _ = tokio::time::sleep(self.config.home_duration()) => {}
            _ = lease.cancelled() => {
                warn!("Homing interrupted on axis {}", axis);
                return Err(AxisError::Cancelled);
            }
        }
        lease.complete(|s| {
            s.position = 0.0;
            s.homed = true;
        });
        info!("Axis {} homed", axis);
        Ok(())
    }

    async fn get_position(&self, axis: usize) -> Result<f64> {
        Ok(self.channel(axis)?.state().position())
    }

    async fn set_position(&self, axis: usize, position: f64) -> Result<()> {
        self.channel(axis)?
            .state()
            .update(|s| s.position = position);
        Ok(())
    }

    async fn get_axis_state(&self, axis: usize) -> Result<AxisState> {
        Ok(self.channel(axis)?.state().snapshot())
    }

    async fn move_abs(&self, axis: usize, target: f64, params: MovementParams) -> Result<()> {
        let channel = self.active(axis)?;
        let tick = self.config.tick();
        channel.ensure_servo()?;
        channel.ensure_within_limits(target)?;
        MotionProfile::validate(channel.state().position(), target, params, tick.as_secs_f64())?;

        let lease = channel.claim(MotionKind::Move, None).await?;
        let start = channel.state().position();
        let profile = MotionProfile::plan(start, target, params, tick.as_secs_f64())?;
        info!(
            axis,
            motion = %lease.id(),
            start,
            target,
            samples = profile.len(),
            "move accepted"
        );
        channel
            .run_profile(lease, profile.into_positions(), tick, self.sink.clone())
            .await
    }

    async fn jog(&self, axis: usize, velocity: f64) -> Result<()> {
        let channel = self.active(axis)?;
        channel.ensure_servo()?;
        check_finite("jog velocity", velocity)?;

        let lease = channel.claim(MotionKind::Jog, None).await?;
        info!(axis, motion = %lease.id(), velocity, "jog started");
        channel.spawn_jog(lease, velocity, self.config.tick(), self.sink.clone());
        Ok(())
    }

    async fn jog_stop(&self, axis: usize) -> Result<()> {
        let channel = self.channel(axis)?;
        if channel.halt(Some(MotionKind::Jog)).await {
            info!("Jog stopped on axis {}", axis);
        }
        Ok(())
    }

    async fn stop(&self, axis: usize) -> Result<()> {
        let channel = self.channel(axis)?;
        channel.stop_motion().await;
        info!(axis, "stop");
        Ok(())
    }

    async fn estop(&self, axis: usize) -> Result<()> {
        let channel = self.channel(axis)?;
        warn!("Emergency stop on axis {}", axis);
        channel.stop_motion().await;
        Ok(())
    }

    fn stream_positions(
        &self,
        axis: usize,
        samples: Vec<f64>,
        dt: Duration,
        cancel: CancellationToken,
    ) -> Result<PositionStream> {
        let channel = self.active(axis)?;
        channel.ensure_servo()?;
        check_interval(dt)?;
        samples
            .iter()
            .try_for_each(|&position| channel.ensure_within_limits(position))?;

        Ok(channel.stream(samples, dt, cancel, self.sink.clone()))
    }

    fn apply_soft_limit(&self, axis: usize, min: f64, max: f64) -> Result<()> {
        self.channel(axis)?.apply_soft_limit(min, max);
        Ok(())
    }
}
