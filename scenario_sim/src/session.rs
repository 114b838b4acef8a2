//! SimSession - one scenario execution, tick by tick.
//!
//! ```text
//! tick():
//!   world.apply_pending(now)
//!   readiness gate ── Pending? ──► advance clock, return Waiting
//!   scheduler.tick(ctx{now, world, world}, runtime)
//!   runtime.step(now, dt, world)
//!   advance clock
//! ```

use crate::context::SimContext;
use crate::error::SimError;
use crate::runtime::PathFollowRuntime;
use crate::world::{SimConfig, SimWorld};
use scenario_core::{EvaluationContext, EventScheduler, ScenarioError, TickReport};
use scenario_env::{EnvError, EventKey};
use std::collections::HashSet;
use tracing::{debug, info};

/// Whether every entity has reported at least once.
///
/// Set once at construction and moved to `Ready` exactly once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Readiness {
    /// Waiting for the first status of some entity
    Pending,
    /// Every entity reported at the given simulation time (seconds)
    Ready { since: f64 },
}

/// Result of one session tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Entities are still missing; the scheduler did not run
    Waiting { unreported: Vec<String> },
    /// The scheduler ran
    Ran(TickReport),
}

/// One running scenario: clock, world, scheduler and runtime.
pub struct SimSession {
    config: SimConfig,
    context: SimContext,
    world: SimWorld,
    scheduler: EventScheduler,
    runtime: PathFollowRuntime,
    readiness: Readiness,
}

impl SimSession {
    /// Creates a session.
    ///
    /// Every name a start trigger refers to must be an event, a maneuver or
    /// a spawned entity, and every action binding must name a declared event
    /// and spawned entities; otherwise the scenario is rejected before any
    /// tick runs.
    pub fn new(
        config: SimConfig,
        world: SimWorld,
        scheduler: EventScheduler,
        runtime: PathFollowRuntime,
    ) -> Result<Self, SimError> {
        config.validate()?;
        Self::check_subjects(&world, &scheduler)?;
        Self::check_bindings(&world, &scheduler, &runtime)?;

        let readiness = if world.entity_count() == 0 {
            Readiness::Ready { since: 0.0 }
        } else {
            Readiness::Pending
        };

        Ok(Self {
            context: SimContext::new(config.seed),
            config,
            world,
            scheduler,
            runtime,
            readiness,
        })
    }

    /// Runs one tick.
    pub fn tick(&mut self) -> Result<TickOutcome, SimError> {
        let now = self.context.now_secs();
        let dt = self.config.tick_duration();
        self.world.apply_pending(now);

        if self.readiness == Readiness::Pending {
            if !self.world.all_reported() {
                let unreported = self.world.unreported().into_iter().map(str::to_string).collect();
                self.context.advance_time(dt);
                return Ok(TickOutcome::Waiting { unreported });
            }
            info!(
                "All {} entities reported at t={:.3}s; scenario starts",
                self.world.entity_count(),
                now
            );
            self.readiness = Readiness::Ready { since: now };
        }

        let ctx = EvaluationContext {
            simulation_time: now,
            states: &self.world,
            poses: &self.world,
        };
        let report = self.scheduler.tick(&ctx, &mut self.runtime);
        self.runtime.step(now, dt.as_secs_f64(), &mut self.world)?;
        self.context.advance_time(dt);

        if !report.is_quiet() {
            debug!(
                "t={:.3}s | tick {} | started={} stopped={} completed={}",
                now,
                report.tick,
                report.started.len(),
                report.stopped.len(),
                report.completed.len()
            );
        }
        Ok(TickOutcome::Ran(report))
    }

    /// Stops every running event and returns their keys.
    pub fn finish(&mut self) -> Vec<EventKey> {
        let stopped = self.scheduler.shutdown(&mut self.runtime);
        info!(
            "Session finished at t={:.3}s ({} events stopped)",
            self.context.now_secs(),
            stopped.len()
        );
        stopped
    }

    /// Returns true once every event is complete.
    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    pub fn now(&self) -> f64 {
        self.context.now_secs()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn context(&self) -> &SimContext {
        &self.context
    }

    pub fn world(&self) -> &SimWorld {
        &self.world
    }

    /// Mutable world access, for feeding entity statuses.
    pub fn world_mut(&mut self) -> &mut SimWorld {
        &mut self.world
    }

    pub fn scheduler(&self) -> &EventScheduler {
        &self.scheduler
    }

    pub fn runtime(&self) -> &PathFollowRuntime {
        &self.runtime
    }

    // ========== Private Helper Methods ==========

    fn check_subjects(world: &SimWorld, scheduler: &EventScheduler) -> Result<(), SimError> {
        let mut known: HashSet<&str> = world.entity_names().into_iter().collect();
        for maneuver in scheduler.maneuvers() {
            known.insert(maneuver.name());
            known.extend(maneuver.events().iter().map(|event| event.name()));
        }

        for maneuver in scheduler.maneuvers() {
            for event in maneuver.events() {
                if let Some(subject) = event.trigger().subjects().into_iter().find(|s| !known.contains(s)) {
                    return Err(ScenarioError::lookup(format!(
                        "event '{}' refers to unknown subject '{}'",
                        event.name(),
                        subject
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }
    fn check_bindings(
        world: &SimWorld,
        scheduler: &EventScheduler,
        runtime: &PathFollowRuntime,
    ) -> Result<(), SimError> {
        if let Some(key) = runtime.bound_events().find(|key| scheduler.event(key).is_none()) {
            return Err(ScenarioError::lookup(format!("actions are bound to unknown event {}", key)).into());
        }
        if let Some(entity) = runtime.bound_entities().into_iter().find(|entity| !world.contains(entity)) {
            return Err(EnvError::unknown_entity(entity).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenario_core::{
        Event, EventState, Maneuver, Priority, Rule, ScenarioError, Trigger, UserDefinedValueCondition,
    };
    use scenario_env::{EntityStatus, Pose};

    fn arrival_scheduler() -> EventScheduler {
        EventScheduler::new(vec![Maneuver::new(
            "m",
            vec![Event::new(
                "on_ready",
                Priority::Parallel,
                Trigger::single(UserDefinedValueCondition::new("ego.currentState", "READY", Rule::EqualTo).unwrap()),
            )],
        )])
        .unwrap()
    }

    #[test]
    fn test_waits_until_entities_report() {
        let mut world = SimWorld::new();
        world.spawn_entity("ego");
        world
            .push_status(EntityStatus::new("ego", 0.05, Pose::identity(), "READY"))
            .unwrap();

        let config = SimConfig {
            tick_rate_hz: 10,
            ..SimConfig::default()
        };
        let mut session = SimSession::new(config, world, arrival_scheduler(), PathFollowRuntime::new()).unwrap();
        assert_eq!(session.readiness(), Readiness::Pending);

        // t=0.0: the status (t=0.05) is not due yet
        assert_eq!(
            session.tick().unwrap(),
            TickOutcome::Waiting {
                unreported: vec!["ego".to_string()]
            }
        );

        // t=0.1: applied, scheduler runs
        match session.tick().unwrap() {
            TickOutcome::Ran(report) => assert_eq!(report.tick, 1),
            other => panic!("expected a scheduler tick, got {:?}", other),
        }
        assert!(matches!(session.readiness(), Readiness::Ready { .. }));
        assert_eq!(
            session.scheduler().state(&EventKey::new("m", "on_ready")),
            Some(EventState::Running)
        );
    }

    #[test]
    fn test_session_without_entities_is_ready() {
        let scheduler = EventScheduler::new(vec![Maneuver::new(
            "m",
            vec![Event::new("now", Priority::Parallel, Trigger::immediate())],
        )])
        .unwrap();
        let mut session =
            SimSession::new(SimConfig::default(), SimWorld::new(), scheduler, PathFollowRuntime::new()).unwrap();

        assert_eq!(session.readiness(), Readiness::Ready { since: 0.0 });
        session.tick().unwrap();
        session.tick().unwrap();
        assert!(session.is_finished());
    }

    #[test]
    fn test_unknown_subject_rejected() {
        let err = SimSession::new(
            SimConfig::default(),
            SimWorld::new(),
            arrival_scheduler(),
            PathFollowRuntime::new(),
        )
        .err()
        .unwrap();

        match err {
            SimError::Scenario(ScenarioError::Lookup(msg)) => assert!(msg.contains("ego")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_action_on_unspawned_entity_rejected() {
        let mut world = SimWorld::new();
        world.spawn_entity("ego");
        let runtime = PathFollowRuntime::new().with_binding(
            EventKey::new("m", "on_ready"),
            vec![crate::runtime::Action::SetState {
                entity: "ghost".to_string(),
                state: "PARKED".to_string(),
            }],
        );

        let err = SimSession::new(SimConfig::default(), world, arrival_scheduler(), runtime)
            .err()
            .unwrap();
        assert!(matches!(err, SimError::Env(EnvError::UnknownEntity(ref name)) if name == "ghost"));
    }

    #[test]
    fn test_binding_to_undeclared_event_rejected() {
        let mut world = SimWorld::new();
        world.spawn_entity("ego");
        let runtime = PathFollowRuntime::new()
            .with_binding(EventKey::new("m", "later"), vec![crate::runtime::Action::Wait { duration: 1.0 }]);

        let err = SimSession::new(SimConfig::default(), world, arrival_scheduler(), runtime)
            .err()
            .unwrap();
        match err {
            SimError::Scenario(ScenarioError::Lookup(msg)) => assert!(msg.contains("later")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_finish_stops_running_events() {
        let mut world = SimWorld::new();
        world.spawn_entity("ego");
        world
            .push_status(EntityStatus::new("ego", 0.0, Pose::identity(), "READY"))
            .unwrap();
        let key = EventKey::new("m", "on_ready");
        let runtime = PathFollowRuntime::new()
            .with_binding(key.clone(), vec![crate::runtime::Action::Wait { duration: 100.0 }]);

        let mut session = SimSession::new(SimConfig::default(), world, arrival_scheduler(), runtime).unwrap();
        session.tick().unwrap();

        assert_eq!(session.finish(), vec![key]);
        assert!(session.is_finished());
    }
}
