//! Cubic Hermite segment - the primitive the path spline is assembled from.
//!
//! Each axis is an independent polynomial in the local parameter `t`:
//!
//! ```text
//! p(t) = a·t³ + b·t² + c·t + d        t ∈ [0, 1] spans the segment
//! ```
//!
//! Arc length and maximum planar curvature are sampled once at construction
//! so that spline queries never integrate on the hot path.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Number of polyline pieces used to approximate arc length.
const LENGTH_SAMPLES: usize = 100;

/// Number of parameter samples used to search for maximum curvature.
const CURVATURE_SAMPLES: usize = 30;

/// A single cubic segment with precomputed length and curvature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HermiteCurve {
    /// Cubic coefficients, one component per axis
    a: Vector3<f64>,
    b: Vector3<f64>,
    c: Vector3<f64>,
    d: Vector3<f64>,

    /// Arc length (polyline approximation)
    length: f64,

    /// Largest |κ| of the x/y projection
    maximum_2d_curvature: f64,
}

impl HermiteCurve {
    /// Create a curve from per-axis polynomial coefficients.
    ///
    /// # Arguments
    /// * `a` - Cubic coefficients [ax, ay, az]
    /// * `b` - Quadratic coefficients
    /// * `c` - Linear coefficients
    /// * `d` - Constant terms (the start point)
    pub fn new(a: Vector3<f64>, b: Vector3<f64>, c: Vector3<f64>, d: Vector3<f64>) -> Self {
        let mut curve = Self {
            a,
            b,
            c,
            d,
            length: 0.0,
            maximum_2d_curvature: 0.0,
        };
        curve.length = curve.compute_length();
        curve.maximum_2d_curvature = curve.compute_maximum_2d_curvature();
        curve
    }

    /// Point on the curve.
    ///
    /// With `autoscale`, `s` is an arc length along this segment and is mapped
    /// to `t = s / length`. Without it, `s` is the raw parameter `t`. Values
    /// outside the segment extrapolate the polynomial.
    pub fn get_point(&self, s: f64, autoscale: bool) -> Point3<f64> {
        Point3::from(self.evaluate(self.parameter(s, autoscale)))
    }

    /// First derivative dp/dt at `s` (same `autoscale` convention as `get_point`).
    pub fn get_tangent_vector(&self, s: f64, autoscale: bool) -> Vector3<f64> {
        self.first_derivative(self.parameter(s, autoscale))
    }

    /// Signed curvature of the x/y projection at raw parameter `t`.
    ///
    /// Returns `None` where the planar speed vanishes and curvature is undefined.
    pub fn get_2d_curvature(&self, t: f64) -> Option<f64> {
        let d1 = self.first_derivative(t);
        let d2 = self.second_derivative(t);
        let speed_squared = d1.x * d1.x + d1.y * d1.y;
        if speed_squared <= f64::EPSILON {
            return None;
        }
        Some((d1.x * d2.y - d1.y * d2.x) / speed_squared.powf(1.5))
    }

    /// Arc length of the segment in meters.
    pub fn get_length(&self) -> f64 {
        self.length
    }

    /// Maximum absolute planar curvature over the segment (1/m).
    pub fn get_maximum_2d_curvature(&self) -> f64 {
        self.maximum_2d_curvature
    }

    // ========== Private Helper Methods ==========

    fn parameter(&self, s: f64, autoscale: bool) -> f64 {
        if !autoscale {
            s
        } else if self.length > 0.0 {
            s / self.length
        } else {
            0.0
        }
    }

    fn evaluate(&self, t: f64) -> Vector3<f64> {
        ((self.a * t + self.b) * t + self.c) * t + self.d
    }

    fn first_derivative(&self, t: f64) -> Vector3<f64> {
        (self.a * (3.0 * t) + self.b * 2.0) * t + self.c
    }

    fn second_derivative(&self, t: f64) -> Vector3<f64> {
        self.a * (6.0 * t) + self.b * 2.0
    }

    fn compute_length(&self) -> f64 {
        let mut length = 0.0;
        let mut previous = self.evaluate(0.0);
        for i in 1..=LENGTH_SAMPLES {
            let current = self.evaluate(i as f64 / LENGTH_SAMPLES as f64);
            length += (current - previous).norm();
            previous = current;
        }
        length
    }

    fn compute_maximum_2d_curvature(&self) -> f64 {
        (0..=CURVATURE_SAMPLES)
            .filter_map(|i| self.get_2d_curvature(i as f64 / CURVATURE_SAMPLES as f64))
            .map(f64::abs)
            .fold(0.0, f64::max)
    }
}
