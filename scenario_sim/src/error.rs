//! Error types for the simulation harness.

use scenario_core::ScenarioError;
use scenario_env::EnvError;
use thiserror::Error;

/// Errors raised while building or driving a simulation session.
#[derive(Debug, Error)]
pub enum SimError {
    /// The scenario was rejected or an operation failed inside the core
    #[error("Scenario error: {0}")]
    Scenario(#[from] ScenarioError),

    /// An entity feed or provider lookup failed
    #[error("Environment error: {0}")]
    Env(#[from] EnvError),

    /// Invalid harness configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
