//! Backend for a physical motion controller.
//!
//! The contract is implemented in full, but every call that would reach the
//! controller goes through [`VendorLink`], whose methods are extension points
//! for the vendor SDK. Until they are wired, the link reports the commanded
//! values back as feedback, so the backend behaves like an ideal drive
//! without timing of its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use super::channel::{AxisChannel, PositionSink};
use super::config::DeviceConfig;
use super::{check_finite, check_interval, BackendKind, MotionBackend, PositionStream};
use crate::axis::movement_parameters::MovementParams;
use crate::axis::state::{AxisState, MotionKind};
use crate::error::{AxisError, Result};
use crate::trajectory::MotionProfile;

/// Session with the controller.
///
/// Replace the bodies with vendor SDK calls. The signatures are what the
/// backend relies on; the placeholders only log and echo.
struct VendorLink {
    connected: AtomicBool,
}

impl VendorLink {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
        }
    }

    /// Extension point: open the card/bus session and load axis parameters.
    fn connect(&self) -> Result<()> {
        trace!("vendor connect (placeholder)");
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    /// Extension point: release the session.
    fn disconnect(&self) {
        trace!("vendor disconnect (placeholder)");
        self.connected.store(false, Ordering::Release);
    }

    /// Extension point: report whether the session is still alive.
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Extension point: enable or disable the drive's power stage.
    fn set_servo(&self, axis: usize, enabled: bool) -> Result<()> {
        trace!(axis, enabled, "vendor servo (placeholder)");
        Ok(())
    }

    /// Extension point: start the controller's reference search.
    fn start_homing(&self, axis: usize) -> Result<()> {
        trace!(axis, "vendor start homing (placeholder)");
        Ok(())
    }

    /// Extension point: poll the controller's home-done flag.
    fn homing_done(&self, axis: usize) -> bool {
        trace!(axis, "vendor homing status (placeholder)");
        true
    }

    /// Extension point: read the encoder position. `None` means "use the
    /// last commanded position".
    fn read_position(&self, axis: usize) -> Option<f64> {
        trace!(axis, "vendor read position (placeholder)");
        None
    }

    /// Extension point: overwrite the controller's position counter.
    fn write_position(&self, axis: usize, position: f64) {
        trace!(axis, position, "vendor write position (placeholder)");
    }

    /// Extension point: decelerated or emergency stop on the controller.
    fn halt(&self, axis: usize, emergency: bool) {
        trace!(axis, emergency, "vendor halt (placeholder)");
    }

    /// Extension point: push soft limits into the controller.
    fn set_soft_limits(&self, axis: usize, min: f64, max: f64) {
        trace!(axis, min, max, "vendor soft limits (placeholder)");
    }
}

impl PositionSink for VendorLink {
    /// Extension point: send one PT/CSP set-point and read back the actual
    /// position. Controllers with a buffered PT/PVT mode should download the
    /// whole profile instead and report progress here.
    fn apply(&self, axis: usize, commanded: f64) -> f64 {
        trace!(axis, commanded, "vendor set-point (placeholder)");
        self.read_position(axis).unwrap_or(commanded)
    }
}

pub struct DeviceBackend {
    config: DeviceConfig,
    link: Arc<VendorLink>,
    open: AtomicBool,
    axes: Vec<AxisChannel>,
}

impl DeviceBackend {
    pub fn new(config: DeviceConfig) -> Self {
        let limits = config.soft_limits();
        let axes = (0..config.axis_count.max(1))
            .map(|index| AxisChannel::new(index, limits))
            .collect();
        Self {
            config,
            link: Arc::new(VendorLink::new()),
            open: AtomicBool::new(false),
            axes,
        }
    }

    fn channel(&self, axis: usize) -> Result<&AxisChannel> {
        self.axes.get(axis).ok_or(AxisError::UnknownAxis(axis))
    }

    fn active(&self, axis: usize) -> Result<&AxisChannel> {
        let channel = self.channel(axis)?;
        if self.open.load(Ordering::Acquire) && self.link.is_connected() {
            Ok(channel)
        } else {
            Err(AxisError::NotConnected)
        }
    }

    fn sink(&self) -> Arc<dyn PositionSink> {
        self.link.clone()
    }

    /// Pulls the encoder reading into the mirror, when the link has one.
    fn sync_position(&self, channel: &AxisChannel) {
        if let Some(position) = self.link.read_position(channel.index()) {
            channel.state().update(|s| s.position = position);
        }
    }
}

#[async_trait::async_trait]
impl MotionBackend for DeviceBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Device
    }

    fn axis_count(&self) -> usize {
        self.axes.len()
    }

    async fn open(&self) -> Result<()> {
        if self.open.load(Ordering::Acquire) {
            return Ok(());
        }
        self.link.connect()?;
        for channel in &self.axes {
            channel.reset();
            let limits = channel.state().snapshot().soft_limits();
            self.link
                .set_soft_limits(channel.index(), limits.min, limits.max);
        }
        self.open.store(true, Ordering::Release);
        info!("Device opened with {} axes, cycle {:?}", self.axes.len(), self.config.cycle());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let was_open = self.open.swap(false, Ordering::AcqRel);
        for channel in &self.axes {
            self.link.halt(channel.index(), false);
            channel.stop_motion().await;
            channel.reset();
        }
        if was_open {
            self.link.disconnect();
            info!("Device closed");
        }
        Ok(())
    }

    async fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn servo_on(&self, axis: usize) -> Result<()> {
        let channel = self.active(axis)?;
        self.link.set_servo(axis, true)?;
        channel.state().update(|s| s.servo_on = true);
        info!("Servo enabled on axis {}", axis);
        Ok(())
    }

    async fn servo_off(&self, axis: usize) -> Result<()> {
        let channel = self.active(axis)?;
        self.link.set_servo(axis, false)?;
        channel.state().update(|s| s.servo_on = false);
        info!("Servo disabled on axis {}", axis);
        Ok(())
    }

    async fn home(&self, axis: usize) -> Result<()> {
        let channel = self.active(axis)?;
        channel.ensure_servo()?;

        let lease = channel.claim(MotionKind::Homing, None).await?;
        info!(axis, motion = %lease.id(), "homing");
        self.link.start_homing(axis)?;
        while !self.link.homing_done(axis) {
            tokio::select! {
                _ = tokio::time::sleep(self.config.cycle()) => {}
                _ = lease.cancelled() => {
                    self.link.halt(axis, false);
                    warn!("Homing interrupted on axis {}", axis);
                    return Err(AxisError::Cancelled);
                }
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
        let channel = self.channel(axis)?;
        self.sync_position(channel);
        Ok(channel.state().position())
    }

    async fn set_position(&self, axis: usize, position: f64) -> Result<()> {
        let channel = self.channel(axis)?;
        self.link.write_position(axis, position);
        channel.state().update(|s| s.position = position);
        Ok(())
    }

    async fn get_axis_state(&self, axis: usize) -> Result<AxisState> {
        let channel = self.channel(axis)?;
        self.sync_position(channel);
        Ok(channel.state().snapshot())
    }

    async fn move_abs(&self, axis: usize, target: f64, params: MovementParams) -> Result<()> {
        let channel = self.active(axis)?;
        let cycle = self.config.cycle();
        channel.ensure_servo()?;
        channel.ensure_within_limits(target)?;
        MotionProfile::validate(channel.state().position(), target, params, cycle.as_secs_f64())?;

        let lease = channel.claim(MotionKind::Move, None).await?;
        self.sync_position(channel);
        let start = channel.state().position();
        let profile = MotionProfile::plan(start, target, params, cycle.as_secs_f64())?;
        info!(axis, motion = %lease.id(), start, target, samples = profile.len(), "move accepted");

        let result = channel
            .run_profile(lease, profile.into_positions(), cycle, self.sink())
            .await;
        if result.is_err() {
            self.link.halt(axis, false);
        }
        result
    }

    async fn jog(&self, axis: usize, velocity: f64) -> Result<()> {
        let channel = self.active(axis)?;
        channel.ensure_servo()?;
        check_finite("jog velocity", velocity)?;

        // A velocity-mode command belongs here once the SDK is wired; the
        // set-point loop keeps soft-limit handling identical meanwhile.
        let lease = channel.claim(MotionKind::Jog, None).await?;
        info!(axis, motion = %lease.id(), velocity, "jog started");
        channel.spawn_jog(lease, velocity, self.config.cycle(), self.sink());
        Ok(())
    }

    async fn jog_stop(&self, axis: usize) -> Result<()> {
        let channel = self.channel(axis)?;
        if channel.halt(Some(MotionKind::Jog)).await {
            self.link.halt(axis, false);
            info!("Jog stopped on axis {}", axis);
        }
        Ok(())
    }

    async fn stop(&self, axis: usize) -> Result<()> {
        let channel = self.channel(axis)?;
        self.link.halt(axis, false);
        channel.stop_motion().await;
        info!(axis, "stop");
        Ok(())
    }

    async fn estop(&self, axis: usize) -> Result<()> {
        let channel = self.channel(axis)?;
        warn!("Emergency stop on axis {}", axis);
        self.link.halt(axis, true);
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

        Ok(channel.stream(samples, dt, cancel, self.sink()))
    }

    fn apply_soft_limit(&self, axis: usize, min: f64, max: f64) -> Result<()> {
        let channel = self.channel(axis)?;
        self.link.set_soft_limits(axis, min, max);
        channel.apply_soft_limit(min, max);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn fast() -> DeviceConfig {
        DeviceConfig {
            axis_count: 2,
            cycle_ms: 1,
            soft_min: -500.0,
            soft_max: 500.0,
        }
    }

    #[tokio::test]
    async fn test_link_gates_commands() {
        let backend = DeviceBackend::new(fast());
        assert!(!backend.is_open().await);
        assert_eq!(backend.servo_on(0).await, Err(AxisError::NotConnected));

        backend.open().await.unwrap();
        assert!(backend.is_open().await);
        assert_eq!(backend.axis_count(), 2);
        backend.servo_on(1).await.unwrap();
        assert!(backend.get_axis_state(1).await.unwrap().servo_on);
        assert!(!backend.get_axis_state(0).await.unwrap().servo_on);

        backend.close().await.unwrap();
        assert_eq!(backend.home(1).await, Err(AxisError::NotConnected));
    }

    #[tokio::test]
    async fn test_same_contract_as_simulator() {
        let backend = DeviceBackend::new(fast());
        backend.open().await.unwrap();
        assert_eq!(
            backend.move_abs(0, 1.0, MovementParams::default()).await,
            Err(AxisError::servo_off(0))
        );
        backend.servo_on(0).await.unwrap();

        backend.set_position(0, 3.0).await.unwrap();
        backend.home(0).await.unwrap();
        let state = backend.get_axis_state(0).await.unwrap();
        assert!(state.homed);
        assert_eq!(state.position, 0.0);

        let params = MovementParams::new(1000.0, 10000.0, 10000.0);
        assert!(matches!(
            backend.move_abs(0, 600.0, params).await,
            Err(AxisError::LimitViolation { .. })
        ));
        backend.move_abs(0, 12.0, params).await.unwrap();
        assert_eq!(backend.get_position(0).await.unwrap(), 12.0);

        let mut stream = backend
            .stream_positions(0, vec![12.5, 13.0], Duration::from_millis(1), CancellationToken::new())
            .unwrap();
        assert_eq!(stream.next().await, Some(12.5));
        assert_eq!(stream.next().await, Some(13.0));
        assert_eq!(stream.next().await, None);
        assert!(!backend.get_axis_state(0).await.unwrap().busy);
    }

    #[tokio::test]
    async fn test_estop_settles_jog() {
        let backend = DeviceBackend::new(fast());
        backend.open().await.unwrap();
        backend.servo_on(0).await.unwrap();

        backend.jog(0, 15.0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        backend.estop(0).await.unwrap();

        let state = backend.get_axis_state(0).await.unwrap();
        assert!(!state.busy);
        assert_eq!(state.velocity, 0.0);
        assert!(state.position > 0.0);
        assert!(!state.alarm);
    }
}
