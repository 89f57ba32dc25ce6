use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::axis::limits::SoftLimits;
use crate::axis::movement_parameters::MovementParams;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub axis: usize,
    /// Sampling period of planned moves, in milliseconds (floored at 1).
    pub sample_period_ms: u64,
    pub params: MovementParams,
    pub jog_velocity: f64,
    pub soft_min: f64,
    pub soft_max: f64,
}

impl ExecutionConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms.max(1))
    }

    pub fn soft_limits(&self) -> SoftLimits {
        SoftLimits::new(self.soft_min, self.soft_max)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            axis: 0,
            sample_period_ms: 10,
            params: MovementParams::default(),
            jog_velocity: 10.0,
            soft_min: -500.0,
            soft_max: 500.0,
        }
    }
}
