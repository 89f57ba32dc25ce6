use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::axis::limits::SoftLimits;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub axis_count: usize,
    /// Motion cadence in milliseconds (floored at 1).
    pub tick_ms: u64,
    /// Simulated homing time in milliseconds.
    pub home_ms: u64,
    pub soft_min: f64,
    pub soft_max: f64,
}

impl SimulatorConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn home_duration(&self) -> Duration {
        Duration::from_millis(self.home_ms)
    }

    pub fn soft_limits(&self) -> SoftLimits {
        SoftLimits::new(self.soft_min, self.soft_max)
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        let limits = SoftLimits::default();
        Self {
            axis_count: 1,
            tick_ms: 10,
            home_ms: 500,
            soft_min: limits.min,
            soft_max: limits.max,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub axis_count: usize,
    /// Controller servo cycle in milliseconds (floored at 1).
    pub cycle_ms: u64,
    pub soft_min: f64,
    pub soft_max: f64,
}

impl DeviceConfig {
    pub fn cycle(&self) -> Duration {
        Duration::from_millis(self.cycle_ms.max(1))
    }

    pub fn soft_limits(&self) -> SoftLimits {
        SoftLimits::new(self.soft_min, self.soft_max)
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let limits = SoftLimits::default();
        Self {
            axis_count: 1,
            cycle_ms: 10,
            soft_min: limits.min,
            soft_max: limits.max,
        }
    }
}
