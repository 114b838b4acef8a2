//! Frame and pose utilities.
//!
//! Pure functions over [`Pose`]; used by the distance conditions and by the
//! harness when it turns path tangents into entity headings.

use nalgebra::{Point3, UnitQuaternion, Vector3};
use scenario_env::Pose;

/// Pose of `to` expressed in the local frame of `from` (`from⁻¹ ∘ to`).
pub fn get_relative_pose(from: &Pose, to: &Pose) -> Pose {
    Pose::from_isometry(&(from.to_isometry().inverse() * to.to_isometry()))
}

/// Rotate `point` by the pose orientation, then translate by its position.
pub fn transform_point(pose: &Pose, point: &Point3<f64>) -> Point3<f64> {
    Point3::from(pose.orientation * point.coords + pose.position)
}

/// [`transform_point`] applied to every point, order preserved.
pub fn transform_points(pose: &Pose, points: &[Point3<f64>]) -> Vec<Point3<f64>> {
    points.iter().map(|point| transform_point(pose, point)).collect()
}

/// Map-frame `point` expressed in the local frame of `from`.
pub fn get_relative_position(from: &Pose, point: &Point3<f64>) -> Point3<f64> {
    from.to_isometry().inverse_transform_point(point)
}

/// Signed distance of `to` ahead of `from` along `from`'s heading.
pub fn longitudinal_distance(from: &Pose, to: &Pose) -> f64 {
    get_relative_pose(from, to).position.x
}

/// Signed distance of `to` to the left of `from`.
pub fn lateral_distance(from: &Pose, to: &Pose) -> f64 {
    get_relative_pose(from, to).position.y
}

/// Planar heading quaternion pointing along `direction`.
///
/// A direction with no x/y component yields the identity rotation.
pub fn yaw_from_direction(direction: &Vector3<f64>) -> UnitQuaternion<f64> {
    if direction.x == 0.0 && direction.y == 0.0 {
        return UnitQuaternion::identity();
    }
    UnitQuaternion::from_euler_angles(0.0, 0.0, direction.y.atan2(direction.x))
}
