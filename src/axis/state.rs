use serde::{Deserialize, Serialize};

use super::limits::SoftLimits;

/// What currently owns the axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionKind {
    Homing,
    Move,
    Jog,
    Stream,
}

/// Coarse operational phase derived from an [`AxisState`] snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisPhase {
    ServoOff,
    Idle,
    Homing,
    Moving,
    Jogging,
    Alarm,
}

/// Operational and kinematic status of one axis.
///
/// The live record is owned by a backend; everything outside the backend
/// only ever sees copies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisState {
    pub servo_on: bool,
    pub homed: bool,
    pub busy: bool,
    pub alarm: bool,
    pub position: f64,
    pub velocity: f64,
    pub soft_min: f64,
    pub soft_max: f64,
    pub motion: Option<MotionKind>,
}

impl AxisState {
    pub fn with_limits(limits: SoftLimits) -> Self {
        Self {
            soft_min: limits.min,
            soft_max: limits.max,
            ..Self::default()
        }
    }

    pub fn soft_limits(&self) -> SoftLimits {
        SoftLimits::new(self.soft_min, self.soft_max)
    }

    pub fn phase(&self) -> AxisPhase {
        if self.alarm {
            return AxisPhase::Alarm;
        }
        match self.motion {
            Some(MotionKind::Homing) => AxisPhase::Homing,
            Some(MotionKind::Jog) => AxisPhase::Jogging,
            Some(MotionKind::Move | MotionKind::Stream) => AxisPhase::Moving,
            None if !self.servo_on => AxisPhase::ServoOff,
            None => AxisPhase::Idle,
        }
    }

    pub fn is_moving(&self) -> bool {
        self.busy
    }

    /// Ready to accept a motion command.
    pub fn is_ready(&self) -> bool {
        self.servo_on && !self.alarm
    }
}

impl Default for AxisState {
    fn default() -> Self {
        let limits = SoftLimits::default();
        Self {
            servo_on: false,
            homed: false,
            busy: false,
            alarm: false,
            position: 0.0,
            velocity: 0.0,
            soft_min: limits.min,
            soft_max: limits.max,
            motion: None,
        }
    }
}
