//! End-to-end runs of the built-in scenarios and a hand-built session.

use nalgebra::Point3;
use scenario_core::{
    CatmullRomSpline, Event, EventScheduler, EventState, Maneuver, Priority, Rule, SimulationTimeCondition,
    StoryboardElementStateCondition, Trigger, UserDefinedValueCondition,
};
use scenario_env::{EntityStatus, EventKey, Pose};
use scenario_sim::scenarios::ScenarioId;
use scenario_sim::{Action, PathFollowRuntime, Readiness, ScenarioRunner, SimConfig, SimSession, SimWorld, TickOutcome};
use std::sync::Arc;

#[test]
fn test_all_scenarios_pass() {
    let runner = ScenarioRunner::new(42);

    for scenario in ScenarioId::all() {
        let result = runner.run(scenario);
        assert!(result.passed, "{} failed: {:?}", scenario, result.failure_reason);
        assert_eq!(result.metrics.evaluation_errors, 0, "{}", scenario);
    }
}

#[test]
fn test_runs_are_deterministic() {
    for scenario in ScenarioId::all() {
        let first = ScenarioRunner::new(7).run(scenario);
        let second = ScenarioRunner::new(7).run(scenario);

        assert_eq!(first.total_ticks, second.total_ticks, "{}", scenario);
        assert_eq!(first.final_time_secs, second.final_time_secs, "{}", scenario);
        assert_eq!(first.metrics, second.metrics, "{}", scenario);
    }
}

#[test]
fn test_random_route_passes_for_many_seeds() {
    for seed in 0..10 {
        let result = ScenarioRunner::new(seed).run(ScenarioId::RandomRoute);
        assert!(result.passed, "seed {}: {:?}", seed, result.failure_reason);
    }
}

#[test]
fn test_cut_in_overwrites_cruise() {
    let result = ScenarioRunner::new(42).with_tick_rate(50).run(ScenarioId::CutIn);

    assert!(result.passed, "{:?}", result.failure_reason);
    assert_eq!(result.metrics.events_stopped, 1);
}

#[test]
fn test_config_file_round_trip() {
    let path = std::env::temp_dir().join(format!("scenario_sim_config_{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "seed": 99, "tick_rate_hz": 20 }"#).unwrap();

    let config = SimConfig::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.seed, 99);
    assert_eq!(config.tick_rate_hz, 20);
    assert_eq!(config.max_duration_secs, SimConfig::default().max_duration_secs);

    let result = ScenarioRunner::from_config(&config).run(ScenarioId::EgoArrival);
    assert!(result.passed, "{:?}", result.failure_reason);
    assert_eq!(result.seed, 99);
}

#[test]
fn test_hand_built_session() {
    // Shuttle drives to the stop; a follow-up event waits on the drive event
    // completing, and a timeout guards the whole run.
    let path = Arc::new(
        CatmullRomSpline::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 2.0, 0.0),
            Point3::new(20.0, 0.0, 0.0),
        ])
        .unwrap(),
    );

    let scheduler = EventScheduler::new(vec![
        Maneuver::new(
            "shuttle",
            vec![Event::new("drive", Priority::Parallel, Trigger::immediate())],
        ),
        Maneuver::new(
            "station",
            vec![
                Event::new(
                    "open_doors",
                    Priority::Skip,
                    Trigger::single(StoryboardElementStateCondition::new("drive", EventState::Complete)),
                ),
                Event::new(
                    "announce",
                    Priority::Parallel,
                    Trigger::single(
                        UserDefinedValueCondition::new("bus.currentState", "DOORS_OPEN", Rule::EqualTo).unwrap(),
                    ),
                ),
                Event::new(
                    "timeout",
                    Priority::Overwrite,
                    Trigger::single(SimulationTimeCondition::new(Rule::GreaterThan, 1000.0)),
                ),
            ],
        ),
    ])
    .unwrap();

    let runtime = PathFollowRuntime::new()
        .with_binding(
            EventKey::new("shuttle", "drive"),
            vec![Action::FollowPath {
                entity: "bus".to_string(),
                path: Arc::clone(&path),
                speed: 10.0,
            }],
        )
        .with_binding(
            EventKey::new("station", "open_doors"),
            vec![Action::SetState {
                entity: "bus".to_string(),
                state: "DOORS_OPEN".to_string(),
            }],
        );

    let mut world = SimWorld::new();
    world.spawn_entity("bus");

    let config = SimConfig {
        tick_rate_hz: 10,
        ..SimConfig::default()
    };
    let mut session = SimSession::new(config, world, scheduler, runtime).unwrap();

    // No feed yet: the scheduler must not run
    assert!(matches!(session.tick().unwrap(), TickOutcome::Waiting { .. }));
    session
        .world_mut()
        .push_status(EntityStatus::new("bus", 0.1, Pose::identity(), "READY"))
        .unwrap();

    let mut ticks = 0;
    while session.scheduler().state(&EventKey::new("station", "announce")) != Some(EventState::Running) {
        session.tick().unwrap();
        ticks += 1;
        assert!(ticks < 100, "announce never started");
    }

    assert_eq!(session.readiness(), Readiness::Ready { since: 0.1 });
    assert_eq!(
        session.scheduler().state(&EventKey::new("shuttle", "drive")),
        Some(EventState::Complete)
    );
    assert_eq!(
        session.scheduler().state(&EventKey::new("station", "timeout")),
        Some(EventState::Idle)
    );

    let status = session.world().status("bus").unwrap();
    assert!((status.pose.position.x - 20.0).abs() < 1e-6);
    assert!(!session.is_finished());

    let stopped = session.finish();
    assert_eq!(stopped, vec![EventKey::new("station", "announce")]);
    assert!(session.is_finished());
}
