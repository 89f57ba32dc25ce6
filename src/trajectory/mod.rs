//! Point-to-point trajectory planning.
//!
//! A move is shaped as a trapezoidal velocity profile (constant acceleration,
//! cruise, constant deceleration). When the distance is too short to reach
//! the velocity limit the cruise phase vanishes and the profile degenerates
//! into a triangle with a lower peak velocity.
//!
//! The planner is a pure function: it samples the profile at a fixed interval
//! and hands back absolute positions, leaving timing to whoever executes them.

pub mod summary;

use serde::{Deserialize, Serialize};

use crate::axis::movement_parameters::MovementParams;
use crate::error::{AxisError, Result};

pub use summary::PlanSummary;

/// Upper bound on the number of steps in one plan (about 2.8 hours at 1 ms).
pub const MAX_STEPS: usize = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileShape {
    /// Velocity limit reached, with a (possibly zero-length) cruise phase.
    Trapezoid,
    /// Velocity limit not reachable over the distance.
    Triangle,
}

/// A sampled motion profile. Immutable once planned.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionProfile {
    start: f64,
    target: f64,
    dt: f64,
    params: MovementParams,
    shape: ProfileShape,
    peak_velocity: f64,
    accel_time: f64,
    cruise_time: f64,
    decel_time: f64,
    samples: Vec<f64>,
}

impl MotionProfile {
    /// Plans a move from `start` to `target`, sampled every `dt` seconds.
    ///
    /// The returned profile holds `steps + 1` samples where
    /// `steps = max(1, ceil(T / dt))`; the first sample is `start` and the
    /// last one is exactly `target`.
    pub fn plan(start: f64, target: f64, params: MovementParams, dt: f64) -> Result<Self> {
        Self::validate(start, target, params, dt)?;

        let params = params.magnitudes();
        let (acc, dec) = (params.acceleration, params.deceleration);

        let distance = (target - start).abs();
        let forward = target >= start;

        let Phases {
            shape,
            peak,
            accel: ta,
            cruise: tc,
            decel: td,
        } = Phases::of(distance, params);
        let total = ta + tc + td;
        let steps = step_count(total, dt)?;
        let ramp_distance = 0.5 * acc * ta * ta;

        // Keeps float noise from stepping past the target or backwards past
        // the start.
        let bounded = |p: f64| {
            if forward {
                p.clamp(start, target)
            } else {
                p.clamp(target, start)
            }
        };

        let mut samples = Vec::with_capacity(steps + 1);
        for i in 0..=steps {
            let t = i as f64 * dt;
            let x = if t <= ta {
                0.5 * acc * t * t
            } else if t <= ta + tc {
                ramp_distance + peak * (t - ta)
            } else if t <= total {
                let t3 = t - ta - tc;
                ramp_distance + peak * tc + (peak * t3 - 0.5 * dec * t3 * t3)
            } else {
                distance
            };
            let x = x.min(distance);
            samples.push(bounded(if forward { start + x } else { start - x }));
        }
        if let Some(last) = samples.last_mut() {
            *last = target;
        }

        Ok(Self {
            start,
            target,
            dt,
            params,
            shape,
            peak_velocity: peak,
            accel_time: ta,
            cruise_time: tc,
            decel_time: td,
            samples,
        })
    }

    /// Checks planner inputs without planning.
    pub fn validate(start: f64, target: f64, params: MovementParams, dt: f64) -> Result<()> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(AxisError::InvalidParameter(format!(
                "sampling interval must be positive, got {}",
                dt
            )));
        }
        for (name, value) in [
            ("start", start),
            ("target", target),
            ("velocity", params.velocity),
            ("acceleration", params.acceleration),
            ("deceleration", params.deceleration),
        ] {
            if !value.is_finite() {
                return Err(AxisError::InvalidParameter(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }
        if params.acceleration == 0.0 || params.deceleration == 0.0 {
            return Err(AxisError::InvalidParameter(
                "acceleration and deceleration must be non-zero".to_string(),
            ));
        }

        let phases = Phases::of((target - start).abs(), params.magnitudes());
        step_count(phases.accel + phases.cruise + phases.decel, dt).map(|_| ())
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    /// Sampling interval in seconds.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn params(&self) -> MovementParams {
        self.params
    }

    pub fn shape(&self) -> ProfileShape {
        self.shape
    }

    pub fn peak_velocity(&self) -> f64 {
        self.peak_velocity
    }

    pub fn accel_time(&self) -> f64 {
        self.accel_time
    }

    pub fn cruise_time(&self) -> f64 {
        self.cruise_time
    }

    pub fn decel_time(&self) -> f64 {
        self.decel_time
    }

    /// Total profile duration `T` in seconds.
    pub fn duration(&self) -> f64 {
        self.accel_time + self.cruise_time + self.decel_time
    }

    /// Number of sampling intervals; one less than the number of samples.
    pub fn steps(&self) -> usize {
        self.samples.len().saturating_sub(1)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn positions(&self) -> &[f64] {
        &self.samples
    }

    /// `(sample_index, position)` pairs in time order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.samples.iter().copied().enumerate()
    }

    pub fn into_positions(self) -> Vec<f64> {
        self.samples
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary::from_profile(self)
    }
}

struct Phases {
    shape: ProfileShape,
    peak: f64,
    accel: f64,
    cruise: f64,
    decel: f64,
}

impl Phases {
    /// Phase durations for `distance` under non-negative `params`.
    fn of(distance: f64, params: MovementParams) -> Self {
        let (vmax, acc, dec) = (params.velocity, params.acceleration, params.deceleration);
        let accel_distance = vmax * vmax / (2.0 * acc);
        let decel_distance = vmax * vmax / (2.0 * dec);

        if distance < accel_distance + decel_distance {
            let peak = (distance * 2.0 * acc * dec / (acc + dec)).sqrt();
            Self {
                shape: ProfileShape::Triangle,
                peak,
                accel: peak / acc,
                cruise: 0.0,
                decel: peak / dec,
            }
        } else {
            let cruise_distance = distance - accel_distance - decel_distance;
            Self {
                shape: ProfileShape::Trapezoid,
                peak: vmax,
                accel: vmax / acc,
                cruise: if vmax > 0.0 { cruise_distance / vmax } else { 0.0 },
                decel: vmax / dec,
            }
        }
    }
}

fn step_count(total: f64, dt: f64) -> Result<usize> {
    let steps = (total / dt).ceil().max(1.0);
    if steps.is_finite() && steps <= MAX_STEPS as f64 {
        Ok(steps as usize)
    } else {
        Err(AxisError::InvalidParameter(format!(
            "move needs {:.3e} steps at dt={}s, limit is {}",
            steps, dt, MAX_STEPS
        )))
    }
}

/// Samples a move from `x0` to `x1` every `dt` seconds.
pub fn plan(x0: f64, x1: f64, vmax: f64, acc: f64, dec: f64, dt: f64) -> Result<Vec<f64>> {
    MotionProfile::plan(x0, x1, MovementParams::new(vmax, acc, dec), dt)
        .map(MotionProfile::into_positions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected_steps(total: f64, dt: f64) -> usize {
        ((total / dt).ceil() as usize).max(1)
    }

    #[test]
    fn test_standard_trapezoid() {
        let params = MovementParams::new(80.0, 200.0, 200.0);
        let profile = MotionProfile::plan(0.0, 100.0, params, 0.01).unwrap();

        // 80² / (2·200) = 16 on each ramp, 100 > 32.
        assert_eq!(profile.shape(), ProfileShape::Trapezoid);
        assert_eq!(profile.peak_velocity(), 80.0);
        assert!((profile.accel_time() - 0.4).abs() < 1e-12);
        assert!((profile.decel_time() - 0.4).abs() < 1e-12);
        assert!((profile.cruise_time() - 68.0 / 80.0).abs() < 1e-12);

        assert_eq!(profile.steps(), expected_steps(profile.duration(), 0.01));
        assert_eq!(profile.len(), profile.steps() + 1);
        assert_eq!(profile.positions()[0], 0.0);
        assert_eq!(*profile.positions().last().unwrap(), 100.0);
    }

    #[test]
    fn test_plan_function_matches_profile() {
        let samples = plan(0.0, 100.0, 80.0, 200.0, 200.0, 0.01).unwrap();
        let profile =
            MotionProfile::plan(0.0, 100.0, MovementParams::new(80.0, 200.0, 200.0), 0.01)
                .unwrap();
        assert_eq!(samples, profile.positions());
    }

    #[test]
    fn test_short_move_degenerates_to_triangle() {
        let profile =
            MotionProfile::plan(0.0, 10.0, MovementParams::new(80.0, 200.0, 200.0), 0.01)
                .unwrap();
        assert_eq!(profile.shape(), ProfileShape::Triangle);
        assert!(profile.peak_velocity() < 80.0);
        assert_eq!(profile.cruise_time(), 0.0);
        assert!((profile.peak_velocity() - 2000.0_f64.sqrt()).abs() < 1e-9);
        assert_eq!(*profile.positions().last().unwrap(), 10.0);
    }

    #[test]
    fn test_asymmetric_triangle() {
        let profile =
            MotionProfile::plan(0.0, 5.0, MovementParams::new(100.0, 400.0, 100.0), 0.005)
                .unwrap();
        assert_eq!(profile.shape(), ProfileShape::Triangle);
        assert!(profile.peak_velocity() < 100.0);
        // Slower deceleration takes longer.
        assert!(profile.decel_time() > profile.accel_time());
    }

    #[test]
    fn test_zero_distance() {
        let samples = plan(5.0, 5.0, 80.0, 200.0, 200.0, 0.01).unwrap();
        assert!(!samples.is_empty());
        assert!(samples.iter().all(|&p| p == 5.0));
    }

    #[test]
    fn test_reverse_move_is_non_increasing() {
        let samples = plan(10.0, 0.0, 80.0, 200.0, 200.0, 0.01).unwrap();
        assert_eq!(samples[0], 10.0);
        assert_eq!(*samples.last().unwrap(), 0.0);
        assert!(samples.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_forward_move_is_non_decreasing() {
        let samples = plan(0.0, 10.0, 80.0, 200.0, 200.0, 0.01).unwrap();
        assert!(samples.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_negative_limits_use_magnitude() {
        let signed = plan(0.0, 50.0, -80.0, -200.0, -300.0, 0.01).unwrap();
        let unsigned = plan(0.0, 50.0, 80.0, 200.0, 300.0, 0.01).unwrap();
        assert_eq!(signed, unsigned);
    }

    #[test]
    fn test_final_sample_is_exact() {
        let cases = [
            (0.1, 0.3, 1.0, 3.0, 7.0, 0.003),
            (-12.345, 98.765, 33.3, 120.0, 45.0, 0.01),
            (1e3, -1e3 + 0.1, 500.0, 1500.0, 2500.0, 0.002),
            (0.0, 1e-6, 80.0, 200.0, 200.0, 0.01),
            (7.0, 7.3, 80.0, 200.0, 200.0, 1.0),
        ];
        for (x0, x1, vmax, acc, dec, dt) in cases {
            let samples = plan(x0, x1, vmax, acc, dec, dt).unwrap();
            assert_eq!(*samples.last().unwrap(), x1, "case {:?}", (x0, x1));
            assert_eq!(samples[0], x0);
            let (lo, hi) = if x1 >= x0 { (x0, x1) } else { (x1, x0) };
            assert!(samples.iter().all(|&p| p >= lo && p <= hi));
        }
    }

    #[test]
    fn test_coarse_interval_still_has_two_samples() {
        // T is far below dt, so a single step covers the whole move.
        let samples = plan(0.0, 1.0, 80.0, 200.0, 200.0, 10.0).unwrap();
        assert_eq!(samples, vec![0.0, 1.0]);
    }

    #[test]
    fn test_rejects_non_positive_interval() {
        for dt in [0.0, -0.01, f64::NAN] {
            let err = plan(0.0, 10.0, 80.0, 200.0, 200.0, dt).unwrap_err();
            assert!(matches!(err, AxisError::InvalidParameter(_)));
        }
    }

    #[test]
    fn test_rejects_non_finite_positions() {
        let err = plan(0.0, f64::INFINITY, 80.0, 200.0, 200.0, 0.01).unwrap_err();
        assert!(matches!(err, AxisError::InvalidParameter(_)));
    }

    #[test]
    fn test_rejects_oversized_plans() {
        for (vmax, distance, dt) in [(1e-300, 1.0, 0.01), (0.001, 1000.0, 0.001)] {
            let err = plan(0.0, distance, vmax, 200.0, 200.0, dt).unwrap_err();
            assert!(matches!(err, AxisError::InvalidParameter(_)));
        }
        let err = MotionProfile::validate(0.0, 1.0, MovementParams::new(1e-300, 200.0, 200.0), 0.01)
            .unwrap_err();
        assert!(matches!(err, AxisError::InvalidParameter(_)));
        // a slow but sane move stays within the cap
        assert!(plan(0.0, 1.0, 0.01, 200.0, 200.0, 0.001).is_ok());
    }

    #[test]
    fn test_rejects_zero_ramps() {
        assert!(plan(0.0, 10.0, 80.0, 0.0, 200.0, 0.01).is_err());
        assert!(plan(0.0, 10.0, 80.0, 200.0, -0.0, 0.01).is_err());
    }

    #[test]
    fn test_iter_yields_indexed_samples() {
        let profile =
            MotionProfile::plan(0.0, 1.0, MovementParams::default(), 0.01).unwrap();
        let indexed: Vec<(usize, f64)> = profile.iter().collect();
        assert_eq!(indexed.len(), profile.len());
        assert!(indexed.iter().enumerate().all(|(i, (idx, _))| i == *idx));
    }
}
