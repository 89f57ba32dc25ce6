pub mod config;
pub mod device;
pub mod simulator;

mod channel;
mod ownership;
mod shared;

use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::axis::movement_parameters::MovementParams;
use crate::axis::state::AxisState;
use crate::error::{AxisError, Result};

pub use config::{DeviceConfig, SimulatorConfig};
pub use device::DeviceBackend;
pub use simulator::SimulatorBackend;

/// Positions produced by a streamed execution, in order.
pub type PositionStream = Pin<Box<dyn Stream<Item = f64> + Send>>;

/// The capability set every motion-control backend provides.
///
/// Validation failures (`NotReady`, `LimitViolation`, `InvalidParameter`,
/// `NotConnected`) are returned before any state is touched. At most one
/// motion (homing, move, jog, stream) owns an axis at a time; starting a new
/// one cancels the previous owner and waits for it to let go.
#[async_trait::async_trait]
pub trait MotionBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn axis_count(&self) -> usize;

    async fn open(&self) -> Result<()>;

    /// Cancels any in-flight motion, waits for it, then discards axis state.
    async fn close(&self) -> Result<()>;

    async fn is_open(&self) -> bool;

    async fn servo_on(&self, axis: usize) -> Result<()>;
    async fn servo_off(&self, axis: usize) -> Result<()>;

    /// Establishes the position reference; `position = 0, homed = true` on
    /// success.
    async fn home(&self, axis: usize) -> Result<()>;

    async fn get_position(&self, axis: usize) -> Result<f64>;

    /// Diagnostic override, not checked against soft limits.
    async fn set_position(&self, axis: usize, position: f64) -> Result<()>;

    /// A copy of the axis record.
    async fn get_axis_state(&self, axis: usize) -> Result<AxisState>;

    /// Plans from the current position to `target` and executes it.
    /// Returns `Err(Cancelled)` if interrupted.
    async fn move_abs(&self, axis: usize, target: f64, params: MovementParams) -> Result<()>;

    /// Relative to the position at call time.
    async fn move_rel(&self, axis: usize, delta: f64, params: MovementParams) -> Result<()> {
        let position = self.get_position(axis).await?;
        self.move_abs(axis, position + delta, params).await
    }

    /// Starts an open-ended jog and returns once it runs.
    async fn jog(&self, axis: usize, velocity: f64) -> Result<()>;

    /// Stops a running jog; does nothing otherwise.
    async fn jog_stop(&self, axis: usize) -> Result<()>;

    async fn stop(&self, axis: usize) -> Result<()>;

    async fn estop(&self, axis: usize) -> Result<()>;

    /// Executes precomputed samples, one every `dt`.
    ///
    /// The stream is lazy: it takes ownership of the axis on first poll.
    /// Each sample is written to the axis before it is yielded. The stream
    /// ends early, with no further writes, when `cancel` fires or the motion
    /// is stopped or superseded. It cannot be restarted.
    fn stream_positions(
        &self,
        axis: usize,
        samples: Vec<f64>,
        dt: Duration,
        cancel: CancellationToken,
    ) -> Result<PositionStream>;

    /// Overwrites the soft limits as given; no ordering or position checks.
    fn apply_soft_limit(&self, axis: usize, min: f64, max: f64) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Simulator,
    Device,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Simulator => write!(f, "simulator"),
            BackendKind::Device => write!(f, "device"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = AxisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulator" | "sim" | "mock" => Ok(BackendKind::Simulator),
            "device" | "native" => Ok(BackendKind::Device),
            other => Err(AxisError::InvalidParameter(format!(
                "unknown backend kind: {}",
                other
            ))),
        }
    }
}

/// Builds the backend for `kind`. The choice is made once, here.
pub fn create_backend(
    kind: BackendKind,
    simulator: &SimulatorConfig,
    device: &DeviceConfig,
) -> Arc<dyn MotionBackend> {
    match kind {
        BackendKind::Simulator => Arc::new(SimulatorBackend::new(simulator.clone())),
        BackendKind::Device => Arc::new(DeviceBackend::new(device.clone())),
    }
}

fn check_interval(dt: Duration) -> Result<()> {
    if dt.is_zero() {
        Err(AxisError::InvalidParameter(
            "sampling interval must be positive".to_string(),
        ))
    } else {
        Ok(())
    }
}

fn check_finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(AxisError::InvalidParameter(format!(
            "{} must be finite, got {}",
            name, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_kind() {
        assert_eq!("simulator".parse::<BackendKind>().unwrap(), BackendKind::Simulator);
        assert!("MockCard".parse::<BackendKind>().is_err());
        assert_eq!(" Native ".parse::<BackendKind>().unwrap(), BackendKind::Device);
        assert_eq!(BackendKind::default(), BackendKind::Simulator);
        assert_eq!(BackendKind::Device.to_string(), "device");
    }

    #[test]
    fn test_create_backend_honours_kind() {
        let sim = create_backend(
            BackendKind::Simulator,
            &SimulatorConfig::default(),
            &DeviceConfig::default(),
        );
        assert_eq!(sim.kind(), BackendKind::Simulator);
        assert_eq!(sim.axis_count(), 1);

        let device = create_backend(
            BackendKind::Device,
            &SimulatorConfig::default(),
            &DeviceConfig::default(),
        );
        assert_eq!(device.kind(), BackendKind::Device);
    }
}
