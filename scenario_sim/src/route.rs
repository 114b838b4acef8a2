//! Seeded route generation.
//!
//! Waypoints advance along +x at a fixed spacing; each one is pushed
//! sideways by Gaussian noise drawn from a seeded ChaCha8 stream, so a
//! master seed always reproduces the same route.

use crate::error::SimError;
use nalgebra::Point3;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use scenario_core::CatmullRomSpline;

/// Generates jittered waypoint sequences.
pub struct RouteGenerator {
    /// Deterministic RNG for lateral jitter
    rng: ChaCha8Rng,

    /// Distance between consecutive waypoints along x (meters)
    spacing: f64,

    /// Standard deviation of the lateral jitter (meters)
    lateral_noise_std: f64,
}

impl RouteGenerator {
    /// Creates a generator with 15m spacing and 2m lateral jitter.
    pub fn new(rng: ChaCha8Rng) -> Self {
        Self {
            rng,
            spacing: 15.0,
            lateral_noise_std: 2.0,
        }
    }

    /// Sets the waypoint spacing.
    pub fn with_spacing(mut self, spacing: f64) -> Self {
        self.spacing = spacing;
        self
    }

    /// Sets the lateral jitter standard deviation.
    pub fn with_lateral_noise(mut self, std_dev: f64) -> Self {
        self.lateral_noise_std = std_dev;
        self
    }

    /// Draws `count` waypoints.
    ///
    /// # Errors
    /// `SimError::Config` when the lateral jitter is negative or not finite.
    pub fn waypoints(&mut self, count: usize) -> Result<Vec<Point3<f64>>, SimError> {
        if !(self.lateral_noise_std.is_finite() && self.lateral_noise_std >= 0.0) {
            return Err(SimError::config(format!(
                "lateral noise must be a finite non-negative std dev, got {}",
                self.lateral_noise_std
            )));
        }
        let normal = Normal::new(0.0, self.lateral_noise_std)
            .map_err(|e| SimError::config(format!("invalid lateral noise: {}", e)))?;

        Ok((0..count)
            .map(|i| Point3::new(i as f64 * self.spacing, normal.sample(&mut self.rng), 0.0))
            .collect())
    }

    /// Draws `count` waypoints and fits a spline through them.
    pub fn route(&mut self, count: usize) -> Result<CatmullRomSpline, SimError> {
        Ok(CatmullRomSpline::new(self.waypoints(count)?)?)
    }
}
