//! Error types for the scenario environment abstraction.

use thiserror::Error;

/// Errors reported by external collaborators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    /// No lifecycle state is known for this subject
    #[error("Unknown subject: {0}")]
    UnknownSubject(String),

    /// The entity was never spawned
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// The entity exists but no status has been fed for it yet
    #[error("Entity not reported yet: {0}")]
    NotReported(String),
}

impl EnvError {
    /// Creates an unknown-subject error.
    pub fn unknown_subject(subject: impl Into<String>) -> Self {
        Self::UnknownSubject(subject.into())
    }

    /// Creates an unknown-entity error.
    pub fn unknown_entity(entity: impl std::fmt::Display) -> Self {
        Self::UnknownEntity(entity.to_string())
    }
}
