//! The path geometry engine - a Catmull-Rom spline indexed by arc length.
//!
//! Built once from an ordered waypoint list and immutable afterwards, so a
//! single instance can be shared (`Arc<CatmullRomSpline>`) by every reader of
//! a tick.
//!
//! ```text
//!  p0 ──curve 0── p1 ──curve 1── p2 ── ... ── p[n-1] ──curve n-1── p[n]
//!     (quadratic)      (cubic)                          (quadratic)
//! ```

use crate::error::{ConstructionError, CurveEndpoint, Result, ScenarioError};
use crate::hermite_curve::HermiteCurve;
use nalgebra::{Point3, Vector3};

/// Continuity tolerance in units of `f64::EPSILON`, scaled by the largest
/// coordinate feeding the segment.
const CONNECTION_TOLERANCE_ULPS: f64 = 128.0;

/// Piecewise cubic spline through a waypoint sequence.
#[derive(Debug, Clone)]
pub struct CatmullRomSpline {
    /// The waypoints the spline interpolates
    control_points: Vec<Point3<f64>>,

    /// One curve per waypoint interval
    curves: Vec<HermiteCurve>,

    /// cumulative_lengths[i] = arc length at the start of curve i;
    /// the final entry is the total length
    cumulative_lengths: Vec<f64>,

    /// Total arc length
    total_length: f64,
}

impl CatmullRomSpline {
    /// Build a spline through `control_points`.
    ///
    /// # Errors
    /// * `InsufficientControlPoints` - fewer than 3 waypoints
    /// * `SplineInterpolation` - a segment does not reproduce its waypoints
    pub fn new(control_points: Vec<Point3<f64>>) -> Result<Self> {
        if control_points.len() < 3 {
            return Err(ConstructionError::InsufficientControlPoints(control_points.len()).into());
        }

        let n = control_points.len() - 1;
        let p: Vec<Vector3<f64>> = control_points.iter().map(|point| point.coords).collect();

        let curves: Vec<HermiteCurve> = (0..n)
            .map(|i| {
                let (a, b, c, d) = if i == 0 {
                    (
                        Vector3::zeros(),
                        p[0] - p[1] * 2.0 + p[2],
                        p[0] * -3.0 + p[1] * 4.0 - p[2],
                        p[0] * 2.0,
                    )
                } else if i == n - 1 {
                    (
                        Vector3::zeros(),
                        p[i - 1] - p[i] * 2.0 + p[i + 1],
                        -p[i - 1] + p[i + 1],
                        p[i] * 2.0,
                    )
                } else {
                    (
                        -p[i - 1] + p[i] * 3.0 - p[i + 1] * 3.0 + p[i + 2],
                        p[i - 1] * 2.0 - p[i] * 5.0 + p[i + 1] * 4.0 - p[i + 2],
                        -p[i - 1] + p[i + 1],
                        p[i] * 2.0,
                    )
                };
                HermiteCurve::new(a * 0.5, b * 0.5, c * 0.5, d * 0.5)
            })
            .collect();

        let mut cumulative_lengths = Vec::with_capacity(curves.len() + 1);
        let mut total_length = 0.0;
        cumulative_lengths.push(total_length);
        for curve in &curves {
            total_length += curve.get_length();
            cumulative_lengths.push(total_length);
        }

        let spline = Self {
            control_points,
            curves,
            cumulative_lengths,
            total_length,
        };
        spline.check_connection()?;
        Ok(spline)
    }

    /// Map a global arc length to (curve index, arc length within that curve).
    ///
    /// Negative `s` extrapolates from the first curve and `s` beyond the total
    /// length extrapolates from the last curve with `s - total_length`.
    pub fn get_curve_index_and_s(&self, s: f64) -> Result<(usize, f64)> {
        let last = self.curves.len() - 1;
        if s < 0.0 {
            return Ok((0, s));
        }
        if s > self.total_length {
            return Ok((last, s - self.total_length));
        }
        for (i, bounds) in self.cumulative_lengths.windows(2).enumerate() {
            let (start, end) = (bounds[0], bounds[1]);
            // The last curve is closed so that s == total_length lands on it
            if start <= s && (s < end || (i == last && s <= end)) {
                return Ok((i, s - start));
            }
        }
        Err(ScenarioError::invariant(format!(
            "failed to calculate curve index for s = {}",
            s
        )))
    }

    /// Point at arc length `s`.
    pub fn get_point(&self, s: f64) -> Result<Point3<f64>> {
        let (index, local_s) = self.get_curve_index_and_s(s)?;
        Ok(self.curves[index].get_point(local_s, true))
    }

    /// Unnormalized tangent (dp/dt of the owning curve) at arc length `s`.
    pub fn get_tangent_vector(&self, s: f64) -> Result<Vector3<f64>> {
        let (index, local_s) = self.get_curve_index_and_s(s)?;
        Ok(self.curves[index].get_tangent_vector(local_s, true))
    }

    /// Largest planar curvature of any curve (1/m).
    pub fn get_maximum_2d_curvature(&self) -> Result<f64> {
        self.curves
            .iter()
            .map(HermiteCurve::get_maximum_2d_curvature)
            .reduce(f64::max)
            .ok_or_else(|| ConstructionError::EmptySpline.into())
    }

    /// Total arc length in meters.
    pub fn get_length(&self) -> f64 {
        self.total_length
    }

    /// The curves, in path order.
    pub fn curves(&self) -> &[HermiteCurve] {
        &self.curves
    }

    /// The interpolated waypoints.
    pub fn control_points(&self) -> &[Point3<f64>] {
        &self.control_points
    }

    // ========== Private Helper Methods ==========

    /// Verify every curve starts and ends on its waypoints.
    fn check_connection(&self) -> Result<()> {
        if self.curves.is_empty() {
            return Err(ConstructionError::EmptySpline.into());
        }
        if self.control_points.len() != self.curves.len() + 1 {
            return Err(ConstructionError::CurveCountMismatch {
                control_points: self.control_points.len(),
                curves: self.curves.len(),
            }
            .into());
        }

        for (index, curve) in self.curves.iter().enumerate() {
            let tolerance = self.connection_tolerance(index);
            let start = curve.get_point(0.0, false);
            let end = curve.get_point(1.0, false);

            if !points_match(&self.control_points[index], &start, tolerance) {
                return Err(ConstructionError::SplineInterpolation {
                    index,
                    endpoint: CurveEndpoint::Start,
                }
                .into());
            }
            if !points_match(&self.control_points[index + 1], &end, tolerance) {
                return Err(ConstructionError::SplineInterpolation {
                    index,
                    endpoint: CurveEndpoint::End,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Tolerance for curve `index`, scaled by the waypoints that built it.
    fn connection_tolerance(&self, index: usize) -> f64 {
        let first = index.saturating_sub(1);
        let last = (index + 2).min(self.control_points.len() - 1);
        let scale = self.control_points[first..=last]
            .iter()
            .map(|point| point.coords.amax())
            .fold(1.0, f64::max);
        CONNECTION_TOLERANCE_ULPS * f64::EPSILON * scale
    }
}

fn points_match(expected: &Point3<f64>, actual: &Point3<f64>, tolerance: f64) -> bool {
    (expected - actual).iter().all(|delta| delta.abs() <= tolerance)
}
