//! Common types for the scenario environment abstraction.

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// A rigid-body pose in the map frame.
///
/// Translation in meters, orientation as a unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position [x, y, z] in meters
    pub position: Vector3<f64>,

    /// Orientation relative to the map frame
    pub orientation: UnitQuaternion<f64>,
}

impl Pose {
    /// Creates a pose from a position and orientation.
    pub fn new(position: Vector3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// The map origin with no rotation.
    pub fn identity() -> Self {
        Self::new(Vector3::zeros(), UnitQuaternion::identity())
    }

    /// Creates a planar pose: position plus heading around +z.
    pub fn from_xyz_yaw(x: f64, y: f64, z: f64, yaw: f64) -> Self {
        Self::new(
            Vector3::new(x, y, z),
            UnitQuaternion::from_euler_angles(0.0, 0.0, yaw),
        )
    }

    /// Converts to an nalgebra isometry for composition.
    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.position), self.orientation)
    }

    /// Builds a pose from an nalgebra isometry.
    pub fn from_isometry(isometry: &Isometry3<f64>) -> Self {
        Self::new(isometry.translation.vector, isometry.rotation)
    }

    /// Heading around +z in radians.
    pub fn yaw(&self) -> f64 {
        self.orientation.euler_angles().2
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Transmission state reported by the vehicle stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gear {
    #[default]
    Park,
    Reverse,
    Neutral,
    Drive,
    Low,
}

/// One timestamped status sample for a named entity.
///
/// Samples arrive from the vehicle stack asynchronously and are applied at
/// tick boundaries in timestamp order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityStatus {
    /// Entity name as declared in the scenario
    pub name: String,

    /// Simulation time the sample was taken (seconds)
    pub timestamp: f64,

    /// Map pose
    pub pose: Pose,

    /// Linear velocity in the map frame (m/s)
    pub velocity: Vector3<f64>,

    /// Current gear
    pub gear: Gear,

    /// Lifecycle-state label (e.g. "CRUISING", "ARRIVED")
    pub state: String,
}

impl EntityStatus {
    /// Creates a stationary status sample.
    pub fn new(name: impl Into<String>, timestamp: f64, pose: Pose, state: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timestamp,
            pose,
            velocity: Vector3::zeros(),
            gear: Gear::default(),
            state: state.into(),
        }
    }

    /// Sets the velocity and gear of the sample.
    pub fn with_motion(mut self, velocity: Vector3<f64>, gear: Gear) -> Self {
        self.velocity = velocity;
        self.gear = gear;
        self
    }

    /// Speed in m/s.
    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }
}

/// Identifies one event inside one maneuver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    /// Owning maneuver (arbitration scope)
    pub maneuver: String,

    /// Event name
    pub event: String,
}

impl EventKey {
    /// Creates a key from maneuver and event names.
    pub fn new(maneuver: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            maneuver: maneuver.into(),
            event: event.into(),
        }
    }
}

impl std::fmt::Display for EventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.maneuver, self.event)
    }
}

/// Why the scheduler stopped a running event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// An `overwrite` event in the same maneuver started
    Overwritten,

    /// The scenario was torn down while the event was running
    ScenarioEnd,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Overwritten => write!(f, "overwritten"),
            StopReason::ScenarioEnd => write!(f, "scenario end"),
        }
    }
}
