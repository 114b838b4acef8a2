//! Scenario Core - Event Scheduling and Path Geometry for Driving Scenarios
//!
//! This library covers the two tightly coupled pieces of a scenario engine:
//! 1. **Arbitration**: a per-tick state machine deciding which declared events
//!    start, stop or coexist (`scheduler`), driven by pluggable start
//!    conditions (`condition`)
//! 2. **Geometry**: a continuous Catmull-Rom spline indexed by arc length
//!    (`catmull_rom_spline`, `hermite_curve`) plus pose utilities
//!    (`transform`) feeding the spatial conditions
//!
//! Scenario attributes may reference typed parameters (`$name`) declared in
//! nested lexical scopes (`parameters`).
//!
//! Everything here is synchronous and deterministic; external collaborators
//! (entity states, poses, action execution) come in through the
//! `scenario_env` traits.

pub mod catmull_rom_spline;
pub mod condition;
pub mod error;
pub mod hermite_curve;
pub mod parameters;
pub mod scheduler;
pub mod transform;

// Re-export key types for convenience
pub use catmull_rom_spline::CatmullRomSpline;
pub use condition::{
    Condition, ConditionGroup, DistanceCondition, DistanceMetric, EvaluationContext, Property, PropertyRegistry,
    RelativeDistanceCondition, Rule, SimulationTimeCondition, StoryboardElementStateCondition, Trigger,
    UserDefinedValueCondition,
};
pub use error::{ConstructionError, CurveEndpoint, ErrorKind, Result, ScenarioError};
pub use hermite_curve::HermiteCurve;
pub use parameters::{ParameterDeclaration, ParameterDeclarations, ParameterType, ParameterValue, Scope};
pub use scheduler::{Event, EventScheduler, EventState, Maneuver, Priority, TickReport};
