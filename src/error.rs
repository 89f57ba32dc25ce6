use thiserror::Error;

use crate::axis::limits::LimitSide;

pub type Result<T> = std::result::Result<T, AxisError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AxisError {
    /// Motion requested while the servo stage is disabled.
    #[error("Axis {axis} not ready: {reason}")]
    NotReady { axis: usize, reason: String },

    /// Requested position lies outside the configured soft limits.
    #[error("Soft limit violation on axis {axis}: {target} is beyond the {side} bound {bound}")]
    LimitViolation {
        axis: usize,
        target: f64,
        side: LimitSide,
        bound: f64,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The motion was interrupted by stop, estop, close or a newer command.
    #[error("Motion cancelled")]
    Cancelled,

    #[error("Backend is not connected")]
    NotConnected,

    #[error("Axis not found: {0}")]
    UnknownAxis(usize),
}

impl AxisError {
    pub fn servo_off(axis: usize) -> Self {
        AxisError::NotReady {
            axis,
            reason: "Servo OFF".to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AxisError::Cancelled)
    }

    /// Short machine-readable tag, useful for status messages and logs.
    pub fn code(&self) -> &'static str {
        match self {
            AxisError::NotReady { .. } => "not_ready",
            AxisError::LimitViolation { .. } => "limit_violation",
            AxisError::InvalidParameter(_) => "invalid_parameter",
            AxisError::Cancelled => "cancelled",
            AxisError::NotConnected => "not_connected",
            AxisError::UnknownAxis(_) => "unknown_axis",
        }
    }
}
