//! Scenario runner - builds and executes the built-in scenarios.

use crate::context::SimContext;
use crate::error::SimError;
use crate::route::RouteGenerator;
use crate::runtime::{Action, PathFollowRuntime, ARRIVED_STATE};
use crate::scenarios::ScenarioId;
use crate::session::{SimSession, TickOutcome};
use crate::world::{SimConfig, SimWorld};

use nalgebra::Point3;
use scenario_core::transform::yaw_from_direction;
use scenario_core::{
    CatmullRomSpline, ConditionGroup, DistanceMetric, Event, EventScheduler, EventState, Maneuver,
    ParameterDeclarations, Priority, RelativeDistanceCondition, Rule, Scope, TickReport, Trigger,
    UserDefinedValueCondition,
};
use scenario_env::{EntityStatus, EventKey, Pose, StopReason};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// RNG stream used for route generation.
const ROUTE_STREAM: u64 = 1;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed (including ticks spent waiting for entities)
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScenarioMetrics {
    /// Events that entered `Running`
    pub events_started: u64,

    /// Events stopped by an overwrite
    pub events_stopped: u64,

    /// Events completed by their actions
    pub events_completed: u64,

    /// Isolated trigger evaluation failures
    pub evaluation_errors: u64,

    /// Ticks spent waiting for entity feeds
    pub waiting_ticks: u64,
}

impl ScenarioMetrics {
    fn record(&mut self, report: &TickReport) {
        self.events_started += report.started.len() as u64;
        self.events_stopped += report.stopped.len() as u64;
        self.events_completed += report.completed.len() as u64;
        self.evaluation_errors += report.errors.len() as u64;
    }
}

/// Runs the built-in scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Tick rate in Hz
    tick_rate_hz: u32,

    /// Maximum duration in seconds
    max_duration_secs: f64,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        let defaults = SimConfig::default();
        Self {
            seed,
            tick_rate_hz: defaults.tick_rate_hz,
            max_duration_secs: defaults.max_duration_secs,
        }
    }

    /// Creates a runner from a loaded configuration.
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            seed: config.seed,
            tick_rate_hz: config.tick_rate_hz,
            max_duration_secs: config.max_duration_secs,
        }
    }

    /// Sets the tick rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz;
        self
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// The session configuration this runner uses.
    pub fn config(&self) -> SimConfig {
        SimConfig {
            seed: self.seed,
            tick_rate_hz: self.tick_rate_hz,
            max_duration_secs: self.max_duration_secs,
        }
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let outcome = match scenario {
            ScenarioId::PriorityArbitration => self.run_priority_arbitration(),
            ScenarioId::OverwriteTieBreak => self.run_overwrite_tie_break(),
            ScenarioId::EgoArrival => self.run_ego_arrival(),
            ScenarioId::CutIn => self.run_cut_in(),
            ScenarioId::RandomRoute => self.run_random_route(),
        };

        outcome.unwrap_or_else(|e| {
            warn!("Scenario {} aborted: {}", scenario.name(), e);
            ScenarioResult {
                scenario,
                seed: self.seed,
                passed: false,
                total_ticks: 0,
                final_time_secs: 0.0,
                failure_reason: Some(e.to_string()),
                metrics: ScenarioMetrics::default(),
            }
        })
    }

    /// SCN-001: overwrite, skip and parallel triggering on one tick.
    fn run_priority_arbitration(&self) -> Result<ScenarioResult, SimError> {
        info!("SCN-001: PriorityArbitration - A(overwrite), B(skip), C(parallel)");
        let maneuver = "arbitration";
        let scheduler = EventScheduler::new(vec![Maneuver::new(
            maneuver,
            vec![
                Event::new("A", Priority::Overwrite, Trigger::immediate()),
                Event::new("B", Priority::Skip, Trigger::immediate()),
                Event::new("C", Priority::Parallel, Trigger::immediate()),
            ],
        )])?;
        let runtime = ["A", "B", "C"].iter().fold(PathFollowRuntime::new(), |runtime, name| {
            runtime.with_binding(EventKey::new(maneuver, *name), vec![Action::Wait { duration: 0.5 }])
        });

        let mut session = SimSession::new(self.config(), SimWorld::new(), scheduler, runtime)?;
        let mut run = RunState::default();

        run.step(&mut session)?;
        let first = event_states(&session, maneuver, &["A", "B", "C"]);
        let expected = vec![EventState::Running, EventState::Idle, EventState::Running];
        if first != expected {
            run.fail(format!("first tick states {:?}, expected {:?}", first, expected));
        }

        run.drive(&mut session)?;
        if !session.is_finished() {
            run.fail("B never ran after A and C finished".to_string());
        }
        if start_count(&session, maneuver, "B") != 1 {
            run.fail("B should start exactly once".to_string());
        }

        Ok(self.result(ScenarioId::PriorityArbitration, &session, run))
    }

    /// SCN-002: two overwrite events on one tick; the later-declared wins.
    fn run_overwrite_tie_break(&self) -> Result<ScenarioResult, SimError> {
        info!("SCN-002: OverwriteTieBreak - X(overwrite) before Y(overwrite)");
        let maneuver = "tie_break";
        let scheduler = EventScheduler::new(vec![Maneuver::new(
            maneuver,
            vec![
                Event::new("X", Priority::Overwrite, Trigger::immediate()),
                Event::new("Y", Priority::Overwrite, Trigger::immediate()),
            ],
        )])?;
        let runtime = PathFollowRuntime::new()
            .with_binding(EventKey::new(maneuver, "X"), vec![Action::Wait { duration: 0.5 }])
            .with_binding(EventKey::new(maneuver, "Y"), vec![Action::Wait { duration: 0.5 }]);

        let mut session = SimSession::new(self.config(), SimWorld::new(), scheduler, runtime)?;
        let mut run = RunState::default();

        let report = run.step(&mut session)?;
        let first = event_states(&session, maneuver, &["X", "Y"]);
        if first != vec![EventState::Complete, EventState::Running] {
            run.fail(format!("first tick states {:?}, expected [Complete, Running]", first));
        }
        let overwritten = vec![(EventKey::new(maneuver, "X"), StopReason::Overwritten)];
        if report.map(|report| report.stopped) != Some(overwritten) {
            run.fail("X was not reported as overwritten".to_string());
        }

        run.drive(&mut session)?;
        if !session.is_finished() {
            run.fail("Y did not complete".to_string());
        }

        Ok(self.result(ScenarioId::OverwriteTieBreak, &session, run))
    }

    /// SCN-003: ego follows a route and parks once it reports ARRIVED.
    fn run_ego_arrival(&self) -> Result<ScenarioResult, SimError> {
        info!("SCN-003: EgoArrival - spline route + user-defined arrival condition");
        let scope = Scope::root(ParameterDeclarations::parse([
            ("goal", "string", "ARRIVED"),
            ("speed", "double", "10"),
        ])?);
        // The drive maneuver runs faster than the storyboard default
        let drive_scope = scope.child(ParameterDeclarations::parse([("speed", "double", "15")])?);

        let route = Arc::new(CatmullRomSpline::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(20.0, 0.0, 0.0),
            Point3::new(40.0, 10.0, 0.0),
            Point3::new(60.0, 10.0, 0.0),
        ])?);
        debug!(
            "Route: {:.2}m, max curvature {:.4}/m",
            route.get_length(),
            route.get_maximum_2d_curvature()?
        );

        let arrival = UserDefinedValueCondition::from_attributes(&scope, "ego.currentState", "$goal", "equalTo")?;
        let scheduler = EventScheduler::new(vec![
            Maneuver::new(
                "drive",
                vec![Event::new("follow_route", Priority::Parallel, Trigger::immediate())],
            ),
            Maneuver::new(
                "arrival",
                vec![Event::new("park", Priority::Parallel, Trigger::single(arrival))],
            ),
        ])?;
        let runtime = PathFollowRuntime::new()
            .with_binding(
                EventKey::new("drive", "follow_route"),
                vec![Action::FollowPath {
                    entity: "ego".to_string(),
                    path: Arc::clone(&route),
                    speed: drive_scope.resolve_f64("$speed")?,
                }],
            )
            .with_binding(
                EventKey::new("arrival", "park"),
                vec![Action::SetState {
                    entity: "ego".to_string(),
                    state: "PARKED".to_string(),
                }],
            );

        let mut world = SimWorld::new();
        spawn_on_route(&mut world, "ego", &route)?;

        let mut session = SimSession::new(self.config(), world, scheduler, runtime)?;
        let mut run = RunState::default();
        run.drive(&mut session)?;

        if !session.is_finished() {
            run.fail(format!("ego did not park within {:.1}s", self.max_duration_secs));
        }
        run.check_entity(&session, "ego", "PARKED", route.control_points());
        if start_count(&session, "arrival", "park") != 1 {
            run.fail("park should start exactly once".to_string());
        }

        Ok(self.result(ScenarioId::EgoArrival, &session, run))
    }

    /// SCN-004: npc merges ahead of ego; ego's drive is overwritten by a brake.
    fn run_cut_in(&self) -> Result<ScenarioResult, SimError> {
        info!("SCN-004: CutIn - relative distance trigger overwrites a running drive");
        let ego_route = Arc::new(CatmullRomSpline::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(50.0, 0.0, 0.0),
            Point3::new(100.0, 0.0, 0.0),
            Point3::new(150.0, 0.0, 0.0),
        ])?);
        let npc_route = Arc::new(CatmullRomSpline::new(vec![
            Point3::new(30.0, 3.5, 0.0),
            Point3::new(50.0, 3.5, 0.0),
            Point3::new(70.0, 0.0, 0.0),
            Point3::new(120.0, 0.0, 0.0),
        ])?);

        // Npc in ego's lane (within 1m laterally) and less than 30m ahead
        let cut_in = ConditionGroup::new(vec![
            RelativeDistanceCondition::new("ego", "npc", DistanceMetric::Lateral, Rule::LessThan, 1.0).into(),
            RelativeDistanceCondition::new("ego", "npc", DistanceMetric::Longitudinal, Rule::GreaterThan, 0.0).into(),
            RelativeDistanceCondition::new("ego", "npc", DistanceMetric::Longitudinal, Rule::LessThan, 30.0).into(),
        ])?;

        let scheduler = EventScheduler::new(vec![
            Maneuver::new(
                "ego_drive",
                vec![
                    Event::new("cruise", Priority::Parallel, Trigger::immediate()),
                    Event::new("brake", Priority::Overwrite, Trigger::new(vec![cut_in])),
                ],
            ),
            Maneuver::new(
                "npc_drive",
                vec![Event::new("merge", Priority::Parallel, Trigger::immediate())],
            ),
        ])?;
        let runtime = PathFollowRuntime::new()
            .with_binding(
                EventKey::new("ego_drive", "cruise"),
                vec![Action::FollowPath {
                    entity: "ego".to_string(),
                    path: Arc::clone(&ego_route),
                    speed: 10.0,
                }],
            )
            .with_binding(
                EventKey::new("ego_drive", "brake"),
                vec![Action::SetState {
                    entity: "ego".to_string(),
                    state: "BRAKING".to_string(),
                }],
            )
            .with_binding(
                EventKey::new("npc_drive", "merge"),
                vec![Action::FollowPath {
                    entity: "npc".to_string(),
                    path: Arc::clone(&npc_route),
                    speed: 8.0,
                }],
            );

        let mut world = SimWorld::new();
        spawn_on_route(&mut world, "ego", &ego_route)?;
        spawn_on_route(&mut world, "npc", &npc_route)?;

        let mut session = SimSession::new(self.config(), world, scheduler, runtime)?;
        let mut run = RunState::default();
        run.drive(&mut session)?;

        let cruise = EventKey::new("ego_drive", "cruise");
        if start_count(&session, "ego_drive", "brake") != 1 {
            run.fail("brake never triggered".to_string());
        }
        if !session
            .runtime()
            .stopped()
            .contains(&(cruise.clone(), StopReason::Overwritten))
        {
            run.fail(format!("{} was not overwritten by the brake", cruise));
        }
        match session.world().status("ego") {
            Some(status) if status.state == "BRAKING" => {}
            Some(status) => run.fail(format!("ego ended in state {}", status.state)),
            None => run.fail("ego never reported".to_string()),
        }

        Ok(self.result(ScenarioId::CutIn, &session, run))
    }

    /// SCN-005: ego follows a route drawn from the master seed.
    fn run_random_route(&self) -> Result<ScenarioResult, SimError> {
        info!("SCN-005: RandomRoute - seeded waypoints");
        let stream = SimContext::new(self.seed).derive_rng(ROUTE_STREAM);
        let route = Arc::new(RouteGenerator::new(stream).route(6)?);
        let curvature = route.get_maximum_2d_curvature()?;
        debug!("Random route: {:.2}m, max curvature {:.4}/m", route.get_length(), curvature);

        let arrived = UserDefinedValueCondition::new("ego.currentState", ARRIVED_STATE, Rule::EqualTo)?;
        let scheduler = EventScheduler::new(vec![
            Maneuver::new(
                "drive",
                vec![Event::new("follow_route", Priority::Parallel, Trigger::immediate())],
            ),
            Maneuver::new(
                "arrival",
                vec![Event::new("confirm", Priority::Skip, Trigger::single(arrived))],
            ),
        ])?;
        let runtime = PathFollowRuntime::new().with_binding(
            EventKey::new("drive", "follow_route"),
            vec![Action::FollowPath {
                entity: "ego".to_string(),
                path: Arc::clone(&route),
                speed: 20.0,
            }],
        );

        let mut world = SimWorld::new();
        spawn_on_route(&mut world, "ego", &route)?;

        let mut session = SimSession::new(self.config(), world, scheduler, runtime)?;
        let mut run = RunState::default();
        run.drive(&mut session)?;

        if !curvature.is_finite() {
            run.fail(format!("route curvature {} is not finite", curvature));
        }
        if !session.is_finished() {
            run.fail(format!("ego did not arrive within {:.1}s", self.max_duration_secs));
        }
        run.check_entity(&session, "ego", ARRIVED_STATE, route.control_points());

        Ok(self.result(ScenarioId::RandomRoute, &session, run))
    }

    // ========== Private Helper Methods ==========

    fn result(&self, scenario: ScenarioId, session: &SimSession, run: RunState) -> ScenarioResult {
        let passed = run.failure.is_none();
        if passed {
            info!(
                "✓ {} complete: {} ticks, {} started, {} overwritten, {} errors",
                scenario.name(),
                run.ticks,
                run.metrics.events_started,
                run.metrics.events_stopped,
                run.metrics.evaluation_errors
            );
        }

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            total_ticks: run.ticks,
            final_time_secs: session.now(),
            failure_reason: run.failure,
            metrics: run.metrics,
        }
    }
}

/// Bookkeeping for one scenario run.
#[derive(Debug, Default)]
struct RunState {
    ticks: u64,
    metrics: ScenarioMetrics,
    failure: Option<String>,
}

impl RunState {
    /// Runs one session tick and records it.
    fn step(&mut self, session: &mut SimSession) -> Result<Option<TickReport>, SimError> {
        self.ticks += 1;
        match session.tick()? {
            TickOutcome::Waiting { unreported } => {
                debug!("Waiting for {:?}", unreported);
                self.metrics.waiting_ticks += 1;
                Ok(None)
            }
            TickOutcome::Ran(report) => {
                self.metrics.record(&report);
                Ok(Some(report))
            }
        }
    }

    /// Ticks until every event is complete or the time budget is spent.
    fn drive(&mut self, session: &mut SimSession) -> Result<(), SimError> {
        let max_ticks = session.config().max_ticks();
        while !session.is_finished() && self.ticks < max_ticks {
            self.step(session)?;
        }
        Ok(())
    }

    /// Keeps the first failure only.
    fn fail(&mut self, reason: String) {
        if self.failure.is_none() {
            self.failure = Some(reason);
        }
    }

    /// The entity must end in `state`, on the last waypoint.
    fn check_entity(&mut self, session: &SimSession, entity: &str, state: &str, waypoints: &[Point3<f64>]) {
        let Some(status) = session.world().status(entity) else {
            self.fail(format!("{} never reported", entity));
            return;
        };
        if status.state != state {
            self.fail(format!("{} ended in state {}, expected {}", entity, status.state, state));
        }
        if let Some(goal) = waypoints.last() {
            let miss = (status.pose.position - goal.coords).norm();
            if miss > 1e-6 {
                self.fail(format!("{} stopped {:.3}m from its goal", entity, miss));
            }
        }
    }
}

/// Spawns `entity` and feeds its initial status at the start of `route`.
fn spawn_on_route(world: &mut SimWorld, entity: &str, route: &CatmullRomSpline) -> Result<(), SimError> {
    let start = route.get_point(0.0)?;
    let heading = yaw_from_direction(&route.get_tangent_vector(0.0)?);

    world.spawn_entity(entity);
    world.push_status(EntityStatus::new(entity, 0.0, Pose::new(start.coords, heading), "READY"))?;
    Ok(())
}

fn event_states(session: &SimSession, maneuver: &str, events: &[&str]) -> Vec<EventState> {
    events
        .iter()
        .filter_map(|event| session.scheduler().state(&EventKey::new(maneuver, *event)))
        .collect()
}

fn start_count(session: &SimSession, maneuver: &str, event: &str) -> usize {
    session
        .scheduler()
        .event(&EventKey::new(maneuver, event))
        .map_or(0, Event::start_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_builder() {
        let runner = ScenarioRunner::new(7).with_tick_rate(50).with_duration(12.0);
        let config = runner.config();

        assert_eq!(config.seed, 7);
        assert_eq!(config.tick_rate_hz, 50);
        assert_eq!(config.max_duration_secs, 12.0);
    }

    #[test]
    fn test_priority_arbitration_passes() {
        let result = ScenarioRunner::new(42).run(ScenarioId::PriorityArbitration);

        assert!(result.passed, "{:?}", result.failure_reason);
        // A and C on the first tick, B once they finished
        assert_eq!(result.metrics.events_started, 3);
        assert_eq!(result.metrics.events_stopped, 0);
    }

    #[test]
    fn test_overwrite_tie_break_passes() {
        let result = ScenarioRunner::new(42).run(ScenarioId::OverwriteTieBreak);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.events_stopped, 1);
    }

    #[test]
    fn test_too_short_run_fails() {
        let result = ScenarioRunner::new(42).with_duration(0.5).run(ScenarioId::EgoArrival);

        assert!(!result.passed);
        assert!(result.failure_reason.is_some());
    }

    #[test]
    fn test_invalid_config_aborts() {
        let result = ScenarioRunner::new(42).with_tick_rate(0).run(ScenarioId::PriorityArbitration);

        assert!(!result.passed);
        assert_eq!(result.total_ticks, 0);
    }
}
