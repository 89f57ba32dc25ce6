use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitSide {
    Lower,
    Upper,
}

impl fmt::Display for LimitSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitSide::Lower => write!(f, "lower"),
            LimitSide::Upper => write!(f, "upper"),
        }
    }
}

/// Inclusive software position bounds.
///
/// No ordering is enforced here: a pair with `min > max` simply contains
/// nothing, which makes every motion command fail the limit check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoftLimits {
    pub min: f64,
    pub max: f64,
}

impl SoftLimits {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, position: f64) -> bool {
        position >= self.min && position <= self.max
    }

    /// Which bound `position` crosses, if any. The lower bound wins when both
    /// are crossed (only possible with inverted limits).
    pub fn violation(&self, position: f64) -> Option<(LimitSide, f64)> {
        if position.is_nan() || position < self.min {
            Some((LimitSide::Lower, self.min))
        } else if position > self.max {
            Some((LimitSide::Upper, self.max))
        } else {
            None
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.min <= self.max
    }
}

impl Default for SoftLimits {
    fn default() -> Self {
        Self {
            min: -1000.0,
            max: 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_are_inclusive() {
        let limits = SoftLimits::new(-500.0, 500.0);
        assert!(limits.contains(-500.0));
        assert!(limits.contains(500.0));
        assert!(!limits.contains(500.0001));
        assert_eq!(limits.violation(0.0), None);
        assert_eq!(limits.violation(600.0), Some((LimitSide::Upper, 500.0)));
        assert_eq!(limits.violation(-600.0), Some((LimitSide::Lower, -500.0)));
    }

    #[test]
    fn test_nan_is_never_inside() {
        let limits = SoftLimits::default();
        assert!(!limits.contains(f64::NAN));
        assert!(limits.violation(f64::NAN).is_some());
    }

    #[test]
    fn test_inverted_limits_contain_nothing() {
        let limits = SoftLimits::new(10.0, -10.0);
        assert!(!limits.is_ordered());
        assert!(!limits.contains(0.0));
    }
}
