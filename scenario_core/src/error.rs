//! Error taxonomy of the scenario core.
//!
//! Construction-time errors reject the whole scenario. Per-tick errors are
//! reported per event and never halt arbitration of sibling events.

use scenario_env::EnvError;
use thiserror::Error;

/// Which end of a spline segment failed the continuity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveEndpoint {
    Start,
    End,
}

impl std::fmt::Display for CurveEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CurveEndpoint::Start => write!(f, "start"),
            CurveEndpoint::End => write!(f, "end"),
        }
    }
}

/// Failures while building a syntax element or geometry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConstructionError {
    #[error("Insufficient control points: need at least 3, got {0}")]
    InsufficientControlPoints(usize),

    #[error("Spline interpolation error: {endpoint} point of curve {index} does not match its control point")]
    SplineInterpolation { index: usize, endpoint: CurveEndpoint },

    #[error("Number of control points ({control_points}) does not match number of curves ({curves}) + 1")]
    CurveCountMismatch { control_points: usize, curves: usize },

    #[error("Spline has no curves")]
    EmptySpline,

    #[error("Duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },
}

/// Coarse classification of a [`ScenarioError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Construction,
    Syntax,
    Lookup,
    UnsupportedFeature,
    RuntimeInvariant,
    Provider,
}

/// Errors raised by the scenario core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScenarioError {
    #[error("Construction error: {0}")]
    Construction(#[from] ConstructionError),

    /// Malformed input text (names, enumerations, literal values)
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// Well-formed name that does not resolve to anything known
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// Schema-valid value this implementation cannot execute
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Internal defect; never caused by scenario input alone
    #[error("Runtime invariant violated: {0}")]
    RuntimeInvariant(String),

    #[error("Provider error: {0}")]
    Provider(#[from] EnvError),
}

impl ScenarioError {
    /// Creates a syntax error.
    pub fn syntax(msg: impl Into<String>) -> Self {
        Self::Syntax(msg.into())
    }

    /// Creates a lookup error.
    pub fn lookup(msg: impl Into<String>) -> Self {
        Self::Lookup(msg.into())
    }

    /// Creates an unsupported-feature error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedFeature(msg.into())
    }

    /// Creates a runtime-invariant error.
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::RuntimeInvariant(msg.into())
    }

    /// Returns the error classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScenarioError::Construction(_) => ErrorKind::Construction,
            ScenarioError::Syntax(_) => ErrorKind::Syntax,
            ScenarioError::Lookup(_) => ErrorKind::Lookup,
            ScenarioError::UnsupportedFeature(_) => ErrorKind::UnsupportedFeature,
            ScenarioError::RuntimeInvariant(_) => ErrorKind::RuntimeInvariant,
            ScenarioError::Provider(_) => ErrorKind::Provider,
        }
    }
}

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, ScenarioError>;
