use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MotionProfile, ProfileShape};
use crate::axis::movement_parameters::MovementParams;

/// Preview of a planned move, built before anything is executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub start: f64,
    pub target: f64,
    /// Number of position samples in the plan.
    pub samples: usize,
    /// Sampling interval in seconds.
    pub dt: f64,
    pub duration: f64,
    pub shape: ProfileShape,
    pub peak_velocity: f64,
    pub params: MovementParams,
    pub planned_at: DateTime<Utc>,
}

impl PlanSummary {
    pub fn from_profile(profile: &MotionProfile) -> Self {
        Self {
            start: profile.start(),
            target: profile.target(),
            samples: profile.len(),
            dt: profile.dt(),
            duration: profile.duration(),
            shape: profile.shape(),
            peak_velocity: profile.peak_velocity(),
            params: profile.params(),
            planned_at: Utc::now(),
        }
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "start={:.3} target={:.3} samples={} dt={:.3}s vmax={} acc={} dec={}",
            self.start,
            self.target,
            self.samples,
            self.dt,
            self.params.velocity,
            self.params.acceleration,
            self.params.deceleration
        )
    }
}
