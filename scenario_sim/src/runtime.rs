//! Reference action runtime: moves entities along paths and sets their states.
//!
//! The scheduler only tells the runtime which events start and stop. The
//! runtime executes the actions bound to each event and, like a real vehicle
//! stack, reports the outcome as timestamped entity statuses.

use crate::error::SimError;
use crate::world::SimWorld;
use nalgebra::Vector3;
use scenario_core::transform::yaw_from_direction;
use scenario_core::CatmullRomSpline;
use scenario_env::{ActionRuntime, EntityStatus, EventKey, Gear, Pose, StopReason};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// State label reported while an entity follows a path.
pub const FOLLOWING_STATE: &str = "FOLLOWING_PATH";

/// State label reported once an entity reached the end of its path.
pub const ARRIVED_STATE: &str = "ARRIVED";

/// One action an event performs while running.
#[derive(Debug, Clone)]
pub enum Action {
    /// Drive `entity` along `path` at constant `speed` (m/s)
    FollowPath {
        entity: String,
        path: Arc<CatmullRomSpline>,
        speed: f64,
    },

    /// Report a new state label for `entity`, keeping its pose
    SetState { entity: String, state: String },

    /// Do nothing for `duration` seconds
    Wait { duration: f64 },
}

impl Action {
    /// The entity this action drives, if any.
    pub fn entity(&self) -> Option<&str> {
        match self {
            Action::FollowPath { entity, .. } | Action::SetState { entity, .. } => Some(entity),
            Action::Wait { .. } => None,
        }
    }
}

/// Execution progress of one action.
#[derive(Debug, Clone)]
struct ActiveAction {
    action: Action,

    /// Arc length travelled or time waited
    progress: f64,

    done: bool,
}

impl ActiveAction {
    fn new(action: Action) -> Self {
        Self {
            action,
            progress: 0.0,
            done: false,
        }
    }
}

/// Executes the actions bound to each event.
#[derive(Debug, Default)]
pub struct PathFollowRuntime {
    /// Actions to run when an event starts
    bindings: BTreeMap<EventKey, Vec<Action>>,

    /// Actions of running events
    active: BTreeMap<EventKey, Vec<ActiveAction>>,

    /// Events whose actions all completed
    finished: BTreeSet<EventKey>,

    /// Events stopped by the scheduler, with the reason
    stopped: Vec<(EventKey, StopReason)>,
}

impl PathFollowRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the actions performed when `event` starts.
    ///
    /// An event without bound actions finishes as soon as it starts.
    pub fn bind(&mut self, event: EventKey, actions: Vec<Action>) {
        self.bindings.insert(event, actions);
    }

    /// Builder form of [`bind`](Self::bind).
    pub fn with_binding(mut self, event: EventKey, actions: Vec<Action>) -> Self {
        self.bind(event, actions);
        self
    }

    /// Events with bound actions.
    pub fn bound_events(&self) -> impl Iterator<Item = &EventKey> {
        self.bindings.keys()
    }

    /// Every entity named by a bound action.
    pub fn bound_entities(&self) -> BTreeSet<&str> {
        self.bindings
            .values()
            .flatten()
            .filter_map(Action::entity)
            .collect()
    }

    /// Advances every running action by `dt` seconds.
    ///
    /// Entity updates are pushed to `world` stamped with `now`; the world
    /// applies them at the next tick boundary.
    pub fn step(&mut self, now: f64, dt: f64, world: &mut SimWorld) -> Result<(), SimError> {
        let mut done_events = Vec::new();

        for (key, actions) in self.active.iter_mut() {
            for active in actions.iter_mut().filter(|active| !active.done) {
                Self::advance(active, now, dt, world)?;
            }
            if actions.iter().all(|active| active.done) {
                done_events.push(key.clone());
            }
        }

        for key in done_events {
            self.active.remove(&key);
            debug!("Actions of {} finished at t={:.3}s", key, now);
            self.finished.insert(key);
        }
        Ok(())
    }

    /// Events currently executing actions.
    pub fn active_events(&self) -> Vec<&EventKey> {
        self.active.keys().collect()
    }

    /// Every stop notification received so far.
    pub fn stopped(&self) -> &[(EventKey, StopReason)] {
        &self.stopped
    }

    // ========== Private Helper Methods ==========

    fn advance(active: &mut ActiveAction, now: f64, dt: f64, world: &mut SimWorld) -> Result<(), SimError> {
        match &active.action {
            Action::FollowPath { entity, path, speed } => {
                let total = path.get_length();
                let s = (active.progress + speed * dt).clamp(0.0, total);
                let arrived = s >= total;

                let point = path.get_point(s)?;
                let tangent = path.get_tangent_vector(s)?;
                let pose = Pose::new(point.coords, yaw_from_direction(&tangent));

                let status = if arrived {
                    EntityStatus::new(entity.as_str(), now, pose, ARRIVED_STATE)
                        .with_motion(Vector3::zeros(), Gear::Park)
                } else {
                    let direction = tangent.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::zeros);
                    EntityStatus::new(entity.as_str(), now, pose, FOLLOWING_STATE)
                        .with_motion(direction * *speed, Gear::Drive)
                };
                world.push_status(status)?;

                active.progress = s;
                active.done = arrived;
            }
            Action::SetState { entity, state } => {
                let pose = world
                    .status(entity)
                    .map(|status| status.pose)
                    .ok_or_else(|| scenario_env::EnvError::NotReported(entity.clone()))?;
                world.push_status(EntityStatus::new(entity.as_str(), now, pose, state.as_str()))?;
                active.done = true;
            }
            Action::Wait { duration } => {
                active.progress += dt;
                active.done = active.progress >= *duration;
            }
        }
        Ok(())
    }
}

impl ActionRuntime for PathFollowRuntime {
    fn on_start(&mut self, event: &EventKey) {
        let actions = self.bindings.get(event).cloned().unwrap_or_default();
        debug!("Runtime starting {} ({} actions)", event, actions.len());

        if actions.is_empty() {
            self.finished.insert(event.clone());
            return;
        }
        self.finished.remove(event);
        self.active
            .insert(event.clone(), actions.into_iter().map(ActiveAction::new).collect());
    }

    fn on_stop(&mut self, event: &EventKey, reason: StopReason) {
        debug!("Runtime stopping {} ({})", event, reason);
        self.active.remove(event);
        self.stopped.push((event.clone(), reason));
    }

    fn is_finished(&self, event: &EventKey) -> bool {
        self.finished.contains(event)
    }
}
