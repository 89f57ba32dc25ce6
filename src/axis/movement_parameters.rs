use serde::{Deserialize, Serialize};

/// Kinematic limits for a planned move.
///
/// Values are used by magnitude; the direction of a move always comes from
/// the start and target positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementParams {
    #[serde(default = "default_velocity")]
    pub velocity: f64,
    #[serde(default = "default_acceleration")]
    pub acceleration: f64,
    #[serde(default = "default_deceleration")]
    pub deceleration: f64,
}

fn default_velocity() -> f64 {
    80.0
}

fn default_acceleration() -> f64 {
    200.0
}

fn default_deceleration() -> f64 {
    200.0
}

impl MovementParams {
    pub fn new(velocity: f64, acceleration: f64, deceleration: f64) -> Self {
        Self {
            velocity,
            acceleration,
            deceleration,
        }
    }

    pub fn with_velocity(mut self, velocity: f64) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_acceleration(mut self, acceleration: f64) -> Self {
        self.acceleration = acceleration;
        self
    }

    pub fn with_deceleration(mut self, deceleration: f64) -> Self {
        self.deceleration = deceleration;
        self
    }

    /// Same limits with every value taken by magnitude.
    pub fn magnitudes(&self) -> Self {
        Self {
            velocity: self.velocity.abs(),
            acceleration: self.acceleration.abs(),
            deceleration: self.deceleration.abs(),
        }
    }
}

impl Default for MovementParams {
    fn default() -> Self {
        Self {
            velocity: default_velocity(),
            acceleration: default_acceleration(),
            deceleration: default_deceleration(),
        }
    }
}
