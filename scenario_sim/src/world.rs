//! SimWorld - entity registry and status feed.
//!
//! The world stands in for the vehicle stack: statuses are pushed with a
//! timestamp and only become visible once the session applies them at a
//! tick boundary.
//!
//! ```text
//! push_status(t=0.2) ──► pending ──apply_pending(now=0.2)──► current status
//!                                                             │
//!                        PoseProvider / StateProvider ◄───────┘
//! ```

use crate::error::SimError;
use scenario_env::{EntityStatus, EnvError, Pose, PoseProvider, StateProvider};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Highest accepted tick rate; a tick stays at least one microsecond long.
pub const MAX_TICK_RATE_HZ: u32 = 1_000_000;

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Tick rate in Hz
    pub tick_rate_hz: u32,

    /// Maximum simulation duration in seconds
    pub max_duration_secs: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            tick_rate_hz: 30,
            max_duration_secs: 30.0,
        }
    }
}

impl SimConfig {
    /// Loads a configuration from a JSON file; missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path)?;
        let config: SimConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the session cannot run with.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.tick_rate_hz == 0 || self.tick_rate_hz > MAX_TICK_RATE_HZ {
            return Err(SimError::config(format!(
                "tick_rate_hz must be in 1..={}, got {}",
                MAX_TICK_RATE_HZ, self.tick_rate_hz
            )));
        }
        if !(self.max_duration_secs.is_finite() && self.max_duration_secs > 0.0) {
            return Err(SimError::config(format!(
                "max_duration_secs must be positive and finite, got {}",
                self.max_duration_secs
            )));
        }
        Ok(())
    }

    /// Duration of one tick.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.tick_rate_hz.max(1)))
    }

    /// Maximum number of ticks the run may take.
    pub fn max_ticks(&self) -> u64 {
        (self.max_duration_secs * f64::from(self.tick_rate_hz)).ceil() as u64
    }
}

/// The SimWorld - every entity and its latest applied status.
#[derive(Debug, Default)]
pub struct SimWorld {
    /// Latest status per entity; `None` until the first feed is applied
    entities: BTreeMap<String, Option<EntityStatus>>,

    /// Statuses pushed but not yet applied
    pending: Vec<EntityStatus>,
}

impl SimWorld {
    /// Creates an empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity. It stays unreported until its first status arrives.
    pub fn spawn_entity(&mut self, name: impl Into<String>) {
        self.entities.entry(name.into()).or_insert(None);
    }

    /// Queues a status sample for a spawned entity.
    pub fn push_status(&mut self, status: EntityStatus) -> Result<(), EnvError> {
        if !self.entities.contains_key(&status.name) {
            return Err(EnvError::unknown_entity(&status.name));
        }
        self.pending.push(status);
        Ok(())
    }

    /// Applies every queued status with `timestamp <= now`, oldest first.
    ///
    /// # Returns
    /// Number of statuses applied.
    pub fn apply_pending(&mut self, now: f64) -> usize {
        // Stable sort keeps push order among equal timestamps
        self.pending.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        let split = self.pending.partition_point(|status| status.timestamp <= now);
        let due: Vec<EntityStatus> = self.pending.drain(..split).collect();
        let applied = due.len();

        for status in due {
            debug!(
                "t={:.3}s | {} -> {} at ({:.2}, {:.2})",
                status.timestamp, status.name, status.state, status.pose.position.x, status.pose.position.y
            );
            if let Some(slot) = self.entities.get_mut(&status.name) {
                *slot = Some(status);
            }
        }
        applied
    }

    /// Latest applied status of an entity.
    pub fn status(&self, name: &str) -> Option<&EntityStatus> {
        self.entities.get(name).and_then(Option::as_ref)
    }

    /// Returns true if the entity was spawned.
    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// Entity names in sorted order.
    pub fn entity_names(&self) -> Vec<&str> {
        self.entities.keys().map(String::as_str).collect()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Entities still waiting for their first status.
    pub fn unreported(&self) -> Vec<&str> {
        self.entities
            .iter()
            .filter(|(_, status)| status.is_none())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Returns true once every spawned entity has an applied status.
    pub fn all_reported(&self) -> bool {
        self.entities.values().all(Option::is_some)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    // ========== Private Helper Methods ==========

    fn reported(&self, name: &str) -> Result<&EntityStatus, EnvError> {
        match self.entities.get(name) {
            Some(Some(status)) => Ok(status),
            Some(None) => Err(EnvError::NotReported(name.to_string())),
            None => Err(EnvError::unknown_entity(name)),
        }
    }
}

impl PoseProvider for SimWorld {
    fn entity_pose(&self, entity: &str) -> Result<Pose, EnvError> {
        self.reported(entity).map(|status| status.pose)
    }
}

impl StateProvider for SimWorld {
    fn current_state(&self, subject: &str) -> Result<String, EnvError> {
        match self.reported(subject) {
            Ok(status) => Ok(status.state.clone()),
            Err(EnvError::UnknownEntity(_)) => Err(EnvError::unknown_subject(subject)),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(name: &str, timestamp: f64, x: f64, state: &str) -> EntityStatus {
        EntityStatus::new(name, timestamp, Pose::from_xyz_yaw(x, 0.0, 0.0, 0.0), state)
    }

    #[test]
    fn test_sim_config_default() {
        let config = SimConfig::default();
        assert_eq!(config.seed, 42);
        assert_eq!(config.tick_rate_hz, 30);
        assert_eq!(config.max_ticks(), 900);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sim_config_partial_json() {
        let config: SimConfig = serde_json::from_str(r#"{ "seed": 7 }"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.tick_rate_hz, 30);

        let bad = SimConfig {
            tick_rate_hz: 0,
            ..SimConfig::default()
        };
        assert!(matches!(bad.validate(), Err(SimError::Config(_))));
    }

    #[test]
    fn test_sim_config_rejects_degenerate_clock() {
        let too_fast = SimConfig {
            tick_rate_hz: 2_000_000_000,
            ..SimConfig::default()
        };
        assert!(matches!(too_fast.validate(), Err(SimError::Config(_))));

        let fastest = SimConfig {
            tick_rate_hz: MAX_TICK_RATE_HZ,
            ..SimConfig::default()
        };
        assert!(fastest.validate().is_ok());
        assert_eq!(fastest.tick_duration(), Duration::from_micros(1));

        for duration in [f64::INFINITY, f64::NAN, -1.0] {
            let bad = SimConfig {
                max_duration_secs: duration,
                ..SimConfig::default()
            };
            assert!(matches!(bad.validate(), Err(SimError::Config(_))), "{}", duration);
        }
    }

    #[test]
    fn test_apply_pending_in_timestamp_order() {
        let mut world = SimWorld::new();
        world.spawn_entity("ego");

        world.push_status(status("ego", 0.2, 2.0, "B")).unwrap();
        world.push_status(status("ego", 0.1, 1.0, "A")).unwrap();
        world.push_status(status("ego", 0.5, 5.0, "C")).unwrap();

        assert_eq!(world.apply_pending(0.3), 2);
        assert_eq!(world.current_state("ego").unwrap(), "B");
        assert_eq!(world.entity_pose("ego").unwrap().position.x, 2.0);
        assert_eq!(world.pending_count(), 1);

        assert_eq!(world.apply_pending(0.5), 1);
        assert_eq!(world.current_state("ego").unwrap(), "C");
    }

    #[test]
    fn test_unreported_and_unknown_entities() {
        let mut world = SimWorld::new();
        world.spawn_entity("ego");
        world.spawn_entity("npc");

        assert!(!world.all_reported());
        assert_eq!(world.unreported(), vec!["ego", "npc"]);
        assert_eq!(
            world.entity_pose("ego").unwrap_err(),
            EnvError::NotReported("ego".to_string())
        );
        assert_eq!(
            world.current_state("truck").unwrap_err(),
            EnvError::UnknownSubject("truck".to_string())
        );
        assert_eq!(
            world.push_status(status("truck", 0.0, 0.0, "X")).unwrap_err(),
            EnvError::UnknownEntity("truck".to_string())
        );

        world.push_status(status("ego", 0.0, 0.0, "READY")).unwrap();
        world.push_status(status("npc", 0.0, 0.0, "READY")).unwrap();
        world.apply_pending(0.0);
        assert!(world.all_reported());
    }
}
