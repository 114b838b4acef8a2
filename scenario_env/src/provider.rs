//! Read-only providers consulted while conditions are evaluated.

use crate::error::EnvError;
use crate::types::Pose;
use std::collections::{BTreeMap, HashMap};

/// Lookup of the current lifecycle-state label of a named subject.
///
/// Subjects are storyboard elements (events, maneuvers) or entities. The
/// label is opaque text; conditions compare it against scenario-supplied
/// reference values.
pub trait StateProvider {
    /// Returns the current state label of `subject`.
    ///
    /// # Returns
    /// * `Ok(label)` - The subject is known
    /// * `Err(EnvError::UnknownSubject)` - No such subject
    fn current_state(&self, subject: &str) -> Result<String, EnvError>;
}

/// Lookup of the latest map pose of a named entity.
pub trait PoseProvider {
    /// Returns the pose of `entity` as of the current tick.
    fn entity_pose(&self, entity: &str) -> Result<Pose, EnvError>;
}

impl StateProvider for HashMap<String, String> {
    fn current_state(&self, subject: &str) -> Result<String, EnvError> {
        self.get(subject)
            .cloned()
            .ok_or_else(|| EnvError::unknown_subject(subject))
    }
}

impl StateProvider for BTreeMap<String, String> {
    fn current_state(&self, subject: &str) -> Result<String, EnvError> {
        self.get(subject)
            .cloned()
            .ok_or_else(|| EnvError::unknown_subject(subject))
    }
}

impl PoseProvider for HashMap<String, Pose> {
    fn entity_pose(&self, entity: &str) -> Result<Pose, EnvError> {
        self.get(entity)
            .copied()
            .ok_or_else(|| EnvError::unknown_entity(entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_state_provider() {
        let mut states = HashMap::new();
        states.insert("vehicle".to_string(), "ARRIVED".to_string());

        assert_eq!(states.current_state("vehicle").unwrap(), "ARRIVED");
        assert_eq!(
            states.current_state("pedestrian"),
            Err(EnvError::UnknownSubject("pedestrian".to_string()))
        );
    }

    #[test]
    fn test_map_pose_provider() {
        let mut poses = HashMap::new();
        poses.insert("ego".to_string(), Pose::from_xyz_yaw(1.0, 2.0, 0.0, 0.0));

        assert_eq!(poses.entity_pose("ego").unwrap().position.y, 2.0);
        assert!(matches!(
            poses.entity_pose("npc"),
            Err(EnvError::UnknownEntity(_))
        ));
    }
}
