//! Event/maneuver scheduler - priority arbitration, once per tick.
//!
//! Each maneuver is an arbitration domain. Within one tick:
//!
//! ```text
//! 0. completion   Running --(runtime.is_finished)--> Complete
//! 1. triggers     Idle --(start trigger true)--> Triggered      (tick-start snapshot)
//! 2. arbitration  per maneuver, in declaration order:
//!                   overwrite: stop every other Running event, then run
//!                   skip:      run only if nothing else is Running, else back to Idle
//!                   parallel:  run
//! ```
//!
//! Arbitration is sequential, so an event sees the decisions made for the
//! events declared before it in the same pass. Two `overwrite` events that
//! trigger together therefore leave the later-declared one running.

use crate::condition::{EvaluationContext, Trigger};
use crate::error::{ConstructionError, Result, ScenarioError};
use crate::parameters::Scope;
use scenario_env::{ActionRuntime, EnvError, EventKey, StateProvider, StopReason};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// How a triggered event treats its running siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    /// Stop every other running event in the maneuver
    Overwrite,
    /// Wait until no other event in the maneuver is running
    Skip,
    /// Run alongside whatever is running
    Parallel,
}

impl FromStr for Priority {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            // "override" is the deprecated spelling of "overwrite"
            "overwrite" | "override" => Ok(Priority::Overwrite),
            "skip" => Ok(Priority::Skip),
            "parallel" => Ok(Priority::Parallel),
            _ => Err(ScenarioError::syntax(format!(
                "unexpected value '{}' specified as type Priority",
                s
            ))),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Overwrite => write!(f, "overwrite"),
            Priority::Skip => write!(f, "skip"),
            Priority::Parallel => write!(f, "parallel"),
        }
    }
}

/// Lifecycle of an event. `Complete` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    Idle,
    Triggered,
    Running,
    Complete,
}

impl EventState {
    /// Label reported through [`StateProvider`].
    pub fn name(&self) -> &'static str {
        match self {
            EventState::Idle => "idle",
            EventState::Triggered => "triggered",
            EventState::Running => "running",
            EventState::Complete => "complete",
        }
    }
}

impl std::fmt::Display for EventState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for EventState {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "idle" => Ok(EventState::Idle),
            "triggered" => Ok(EventState::Triggered),
            "running" => Ok(EventState::Running),
            "complete" => Ok(EventState::Complete),
            _ => Err(ScenarioError::syntax(format!(
                "unexpected value '{}' specified as type EventState",
                s
            ))),
        }
    }
}

/// A named, triggerable behavior with a start trigger and a priority.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    name: String,
    priority: Priority,
    trigger: Trigger,
    state: EventState,
    start_count: usize,
}

impl Event {
    pub fn new(name: impl Into<String>, priority: Priority, trigger: Trigger) -> Self {
        Self {
            name: name.into(),
            priority,
            trigger,
            state: EventState::Idle,
            start_count: 0,
        }
    }

    /// Build from raw `name`/`priority` attributes, resolving `$parameter` references.
    pub fn from_attributes(scope: &Scope<'_>, name: &str, priority: &str, trigger: Trigger) -> Result<Self> {
        let priority: Priority = scope.resolve(priority)?.parse()?;
        Ok(Self::new(scope.resolve(name)?, priority, trigger))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn state(&self) -> EventState {
        self.state
    }

    /// How many times the event entered `Running`.
    pub fn start_count(&self) -> usize {
        self.start_count
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn description(&self) -> String {
        format!(
            "{} ({}, {}) starts {}",
            self.name,
            self.priority,
            self.state,
            self.trigger.description()
        )
    }
}

/// An arbitration domain: events that compete with each other.
#[derive(Debug, Clone, PartialEq)]
pub struct Maneuver {
    name: String,
    events: Vec<Event>,
}

impl Maneuver {
    pub fn new(name: impl Into<String>, events: Vec<Event>) -> Self {
        Self {
            name: name.into(),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Complete once every event is complete, running while any event runs.
    pub fn state(&self) -> EventState {
        if self.events.iter().all(|event| event.state == EventState::Complete) {
            EventState::Complete
        } else if self.events.iter().any(|event| event.state == EventState::Running) {
            EventState::Running
        } else {
            EventState::Idle
        }
    }

    fn key(&self, index: usize) -> EventKey {
        EventKey::new(&self.name, &self.events[index].name)
    }
}

/// What happened during one call to [`EventScheduler::tick`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Tick number (1-based)
    pub tick: u64,

    /// Events that entered `Running`, in arbitration order
    pub started: Vec<EventKey>,

    /// Events stopped by the scheduler
    pub stopped: Vec<(EventKey, StopReason)>,

    /// Events whose actions finished
    pub completed: Vec<EventKey>,

    /// Trigger evaluation failures; those events stayed `Idle`
    pub errors: Vec<(EventKey, ScenarioError)>,
}

impl TickReport {
    /// True if no event changed state.
    pub fn is_quiet(&self) -> bool {
        self.started.is_empty() && self.stopped.is_empty() && self.completed.is_empty()
    }
}

/// Owns every event of a storyboard and arbitrates them once per tick.
#[derive(Debug, Clone)]
pub struct EventScheduler {
    maneuvers: Vec<Maneuver>,
    tick_count: u64,
}

impl EventScheduler {
    /// Create a scheduler over `maneuvers`.
    ///
    /// # Errors
    /// `DuplicateName` if two maneuvers, two events (anywhere in the
    /// storyboard), or an event and a maneuver share a name.
    pub fn new(maneuvers: Vec<Maneuver>) -> Result<Self> {
        let mut maneuver_names = HashSet::new();
        let mut event_names = HashSet::new();

        for maneuver in &maneuvers {
            if !maneuver_names.insert(maneuver.name.as_str()) {
                return Err(duplicate("maneuver", &maneuver.name));
            }
            for event in &maneuver.events {
                if !event_names.insert(event.name.as_str()) {
                    return Err(duplicate("event", &event.name));
                }
            }
        }

        if let Some(name) = maneuver_names.intersection(&event_names).next() {
            return Err(duplicate("storyboard element", name));
        }

        info!(
            "Scheduler ready: {} maneuvers, {} events",
            maneuvers.len(),
            event_names.len()
        );

        Ok(Self {
            maneuvers,
            tick_count: 0,
        })
    }

    /// Advance every event by one tick.
    ///
    /// # Arguments
    /// * `ctx` - This tick's time, external states and poses
    /// * `runtime` - Receives start/stop notifications and reports completion
    ///
    /// # Returns
    /// Every transition made during the tick, plus isolated evaluation errors.
    pub fn tick(&mut self, ctx: &EvaluationContext<'_>, runtime: &mut dyn ActionRuntime) -> TickReport {
        self.tick_count += 1;
        let mut report = TickReport {
            tick: self.tick_count,
            ..TickReport::default()
        };

        self.collect_completions(runtime, &mut report);
        self.evaluate_triggers(ctx, &mut report);
        for maneuver in &mut self.maneuvers {
            Self::arbitrate(maneuver, runtime, &mut report);
        }

        report
    }

    /// Push-style completion: the runtime reports a finished event directly.
    ///
    /// # Errors
    /// * `Lookup` - no such event
    /// * `RuntimeInvariant` - the event is not running
    pub fn mark_complete(&mut self, key: &EventKey) -> Result<()> {
        let event = self
            .event_mut(key)
            .ok_or_else(|| ScenarioError::lookup(format!("no event {}", key)))?;
        if event.state != EventState::Running {
            return Err(ScenarioError::invariant(format!(
                "event {} cannot complete from state {}",
                key, event.state
            )));
        }
        event.state = EventState::Complete;
        info!("Event {} complete", key);
        Ok(())
    }

    /// Stop every running event and mark everything complete.
    pub fn shutdown(&mut self, runtime: &mut dyn ActionRuntime) -> Vec<EventKey> {
        let mut stopped = Vec::new();
        for maneuver in &mut self.maneuvers {
            for index in 0..maneuver.events.len() {
                if maneuver.events[index].state == EventState::Running {
                    let key = maneuver.key(index);
                    runtime.on_stop(&key, StopReason::ScenarioEnd);
                    stopped.push(key);
                }
                maneuver.events[index].state = EventState::Complete;
            }
        }
        stopped
    }

    pub fn state(&self, key: &EventKey) -> Option<EventState> {
        self.event(key).map(Event::state)
    }

    /// Every event with its state, in declaration order.
    pub fn states(&self) -> Vec<(EventKey, EventState)> {
        self.maneuvers
            .iter()
            .flat_map(|maneuver| {
                (0..maneuver.events.len()).map(move |index| (maneuver.key(index), maneuver.events[index].state))
            })
            .collect()
    }

    pub fn event(&self, key: &EventKey) -> Option<&Event> {
        self.maneuvers
            .iter()
            .find(|maneuver| maneuver.name == key.maneuver)
            .and_then(|maneuver| maneuver.events.iter().find(|event| event.name == key.event))
    }

    pub fn maneuvers(&self) -> &[Maneuver] {
        &self.maneuvers
    }

    pub fn event_count(&self) -> usize {
        self.maneuvers.iter().map(|maneuver| maneuver.events.len()).sum()
    }

    /// True once every event is complete.
    pub fn is_finished(&self) -> bool {
        self.maneuvers
            .iter()
            .all(|maneuver| maneuver.state() == EventState::Complete)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Labels of every event and maneuver, keyed by name.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        for maneuver in &self.maneuvers {
            labels.insert(maneuver.name.clone(), maneuver.state().name().to_string());
            for event in &maneuver.events {
                labels.insert(event.name.clone(), event.state.name().to_string());
            }
        }
        labels
    }

    // ========== Private Helper Methods ==========

    fn event_mut(&mut self, key: &EventKey) -> Option<&mut Event> {
        self.maneuvers
            .iter_mut()
            .find(|maneuver| maneuver.name == key.maneuver)
            .and_then(|maneuver| maneuver.events.iter_mut().find(|event| event.name == key.event))
    }

    fn collect_completions(&mut self, runtime: &dyn ActionRuntime, report: &mut TickReport) {
        for maneuver in &mut self.maneuvers {
            for index in 0..maneuver.events.len() {
                if maneuver.events[index].state != EventState::Running {
                    continue;
                }
                let key = maneuver.key(index);
                if runtime.is_finished(&key) {
                    maneuver.events[index].state = EventState::Complete;
                    info!("Event {} complete", key);
                    report.completed.push(key);
                }
            }
        }
    }

    fn evaluate_triggers(&mut self, ctx: &EvaluationContext<'_>, report: &mut TickReport) {
        let snapshot = self.snapshot();
        let states = ChainedStates {
            snapshot: &snapshot,
            fallback: ctx.states,
        };
        let ctx = EvaluationContext {
            simulation_time: ctx.simulation_time,
            states: &states,
            poses: ctx.poses,
        };

        for maneuver in &mut self.maneuvers {
            for index in 0..maneuver.events.len() {
                if maneuver.events[index].state != EventState::Idle {
                    continue;
                }
                match maneuver.events[index].trigger.evaluate(&ctx) {
                    Ok(true) => {
                        maneuver.events[index].state = EventState::Triggered;
                        debug!(
                            "Event {} triggered: {}",
                            maneuver.key(index),
                            maneuver.events[index].trigger.description()
                        );
                    }
                    Ok(false) => {}
                    Err(e) => {
                        let key = maneuver.key(index);
                        warn!("Event {} trigger evaluation failed: {}", key, e);
                        report.errors.push((key, e));
                    }
                }
            }
        }
    }

    fn arbitrate(maneuver: &mut Maneuver, runtime: &mut dyn ActionRuntime, report: &mut TickReport) {
        for index in 0..maneuver.events.len() {
            if maneuver.events[index].state != EventState::Triggered {
                continue;
            }

            match maneuver.events[index].priority {
                Priority::Overwrite => {
                    for other in 0..maneuver.events.len() {
                        if other == index || maneuver.events[other].state != EventState::Running {
                            continue;
                        }
                        let key = maneuver.key(other);
                        maneuver.events[other].state = EventState::Complete;
                        runtime.on_stop(&key, StopReason::Overwritten);
                        info!("Event {} overwritten by {}", key, maneuver.events[index].name);
                        report.stopped.push((key, StopReason::Overwritten));
                    }
                }
                Priority::Skip => {
                    let busy = maneuver
                        .events
                        .iter()
                        .enumerate()
                        .any(|(other, event)| other != index && event.state == EventState::Running);
                    if busy {
                        maneuver.events[index].state = EventState::Idle;
                        debug!("Event {} skipped: maneuver busy", maneuver.key(index));
                        continue;
                    }
                }
                Priority::Parallel => {}
            }

            let key = maneuver.key(index);
            let event = &mut maneuver.events[index];
            event.state = EventState::Running;
            event.start_count += 1;
            runtime.on_start(&key);
            info!("Event {} started ({})", key, event.priority);
            report.started.push(key);
        }
    }
}

impl StateProvider for EventScheduler {
    fn current_state(&self, subject: &str) -> std::result::Result<String, EnvError> {
        for maneuver in &self.maneuvers {
            if maneuver.name == subject {
                return Ok(maneuver.state().name().to_string());
            }
            if let Some(event) = maneuver.events.iter().find(|event| event.name == subject) {
                return Ok(event.state.name().to_string());
            }
        }
        Err(EnvError::unknown_subject(subject))
    }
}

/// Storyboard labels first, then the external provider.
struct ChainedStates<'a> {
    snapshot: &'a BTreeMap<String, String>,
    fallback: &'a dyn StateProvider,
}

impl StateProvider for ChainedStates<'_> {
    fn current_state(&self, subject: &str) -> std::result::Result<String, EnvError> {
        match self.snapshot.get(subject) {
            Some(label) => Ok(label.clone()),
            None => self.fallback.current_state(subject),
        }
    }
}

fn duplicate(kind: &'static str, name: &str) -> ScenarioError {
    ConstructionError::DuplicateName {
        kind,
        name: name.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{
        Rule, SimulationTimeCondition, StoryboardElementStateCondition, UserDefinedValueCondition,
    };
    use crate::error::ErrorKind;
    use crate::parameters::ParameterDeclarations;
    use scenario_env::Pose;
    use std::collections::HashMap;

    /// Records notifications; events listed in `finished` report completion.
    #[derive(Default)]
    struct RecordingRuntime {
        started: Vec<EventKey>,
        stopped: Vec<(EventKey, StopReason)>,
        finished: HashSet<EventKey>,
    }

    impl ActionRuntime for RecordingRuntime {
        fn on_start(&mut self, event: &EventKey) {
            self.started.push(event.clone());
        }

        fn on_stop(&mut self, event: &EventKey, reason: StopReason) {
            self.stopped.push((event.clone(), reason));
        }

        fn is_finished(&self, event: &EventKey) -> bool {
            self.finished.contains(event)
        }
    }

    struct World {
        states: HashMap<String, String>,
        poses: HashMap<String, Pose>,
    }

    impl World {
        fn new() -> Self {
            Self {
                states: HashMap::new(),
                poses: HashMap::new(),
            }
        }

        fn ctx(&self, time: f64) -> EvaluationContext<'_> {
            EvaluationContext {
                simulation_time: time,
                states: &self.states,
                poses: &self.poses,
            }
        }
    }

    fn key(maneuver: &str, event: &str) -> EventKey {
        EventKey::new(maneuver, event)
    }

    fn at_time(name: &str, priority: Priority, time: f64) -> Event {
        Event::new(
            name,
            priority,
            Trigger::single(SimulationTimeCondition::new(Rule::GreaterOrEqual, time)),
        )
    }

    #[test]
    fn test_priority_parsing() {
        assert_eq!("overwrite".parse::<Priority>().unwrap(), Priority::Overwrite);
        assert_eq!("override".parse::<Priority>().unwrap(), Priority::Overwrite);
        assert_eq!("skip".parse::<Priority>().unwrap(), Priority::Skip);
        assert_eq!("parallel".parse::<Priority>().unwrap(), Priority::Parallel);
        assert_eq!("Parallel".parse::<Priority>().unwrap_err().kind(), ErrorKind::Syntax);
    }

    #[test]
    fn test_overwrite_skip_parallel_same_tick() {
        let world = World::new();
        let mut runtime = RecordingRuntime::default();
        let mut scheduler = EventScheduler::new(vec![Maneuver::new(
            "m",
            vec![
                Event::new("A", Priority::Overwrite, Trigger::immediate()),
                Event::new("B", Priority::Skip, Trigger::immediate()),
                Event::new("C", Priority::Parallel, Trigger::immediate()),
            ],
        )])
        .unwrap();

        let report = scheduler.tick(&world.ctx(0.0), &mut runtime);

        assert_eq!(scheduler.state(&key("m", "A")), Some(EventState::Running));
        assert_eq!(scheduler.state(&key("m", "B")), Some(EventState::Idle));
        assert_eq!(scheduler.state(&key("m", "C")), Some(EventState::Running));
        assert_eq!(report.started, vec![key("m", "A"), key("m", "C")]);
        assert!(report.stopped.is_empty());
    }

    #[test]
    fn test_later_overwrite_wins() {
        let world = World::new();
        let mut runtime = RecordingRuntime::default();
        let mut scheduler = EventScheduler::new(vec![Maneuver::new(
            "m",
            vec![
                Event::new("X", Priority::Overwrite, Trigger::immediate()),
                Event::new("Y", Priority::Overwrite, Trigger::immediate()),
            ],
        )])
        .unwrap();

        let report = scheduler.tick(&world.ctx(0.0), &mut runtime);

        assert_eq!(scheduler.state(&key("m", "X")), Some(EventState::Complete));
        assert_eq!(scheduler.state(&key("m", "Y")), Some(EventState::Running));
        assert_eq!(report.stopped, vec![(key("m", "X"), StopReason::Overwritten)]);
        assert_eq!(runtime.stopped, vec![(key("m", "X"), StopReason::Overwritten)]);
        assert_eq!(runtime.started, vec![key("m", "X"), key("m", "Y")]);
    }

    #[test]
    fn test_overwrite_stops_running_parallel_event() {
        let world = World::new();
        let mut runtime = RecordingRuntime::default();
        let mut scheduler = EventScheduler::new(vec![Maneuver::new(
            "m",
            vec![
                at_time("cruise", Priority::Parallel, 0.0),
                at_time("brake", Priority::Overwrite, 1.0),
            ],
        )])
        .unwrap();

        scheduler.tick(&world.ctx(0.0), &mut runtime);
        assert_eq!(scheduler.state(&key("m", "cruise")), Some(EventState::Running));

        let report = scheduler.tick(&world.ctx(1.0), &mut runtime);
        assert_eq!(scheduler.state(&key("m", "cruise")), Some(EventState::Complete));
        assert_eq!(scheduler.state(&key("m", "brake")), Some(EventState::Running));
        assert_eq!(report.tick, 2);
    }

    #[test]
    fn test_skip_waits_for_running_sibling() {
        let world = World::new();
        let mut runtime = RecordingRuntime::default();
        let mut scheduler = EventScheduler::new(vec![Maneuver::new(
            "m",
            vec![
                Event::new("first", Priority::Parallel, Trigger::immediate()),
                Event::new("second", Priority::Skip, Trigger::immediate()),
            ],
        )])
        .unwrap();

        scheduler.tick(&world.ctx(0.0), &mut runtime);
        assert_eq!(scheduler.state(&key("m", "second")), Some(EventState::Idle));

        // Once "first" finishes, "second" may run
        runtime.finished.insert(key("m", "first"));
        let report = scheduler.tick(&world.ctx(0.1), &mut runtime);

        assert_eq!(report.completed, vec![key("m", "first")]);
        assert_eq!(report.started, vec![key("m", "second")]);
        assert_eq!(scheduler.state(&key("m", "second")), Some(EventState::Running));
    }

    #[test]
    fn test_skip_declared_before_overwrite_is_overwritten() {
        let world = World::new();
        let mut runtime = RecordingRuntime::default();
        let mut scheduler = EventScheduler::new(vec![Maneuver::new(
            "m",
            vec![
                Event::new("B", Priority::Skip, Trigger::immediate()),
                Event::new("A", Priority::Overwrite, Trigger::immediate()),
            ],
        )])
        .unwrap();

        let report = scheduler.tick(&world.ctx(0.0), &mut runtime);

        // B saw no running sibling and started, then A replaced it
        assert_eq!(scheduler.state(&key("m", "B")), Some(EventState::Complete));
        assert_eq!(scheduler.state(&key("m", "A")), Some(EventState::Running));
        assert_eq!(report.started, vec![key("m", "B"), key("m", "A")]);
        assert_eq!(report.stopped, vec![(key("m", "B"), StopReason::Overwritten)]);
        assert_eq!(runtime.started, vec![key("m", "B"), key("m", "A")]);
    }

    #[test]
    fn test_maneuvers_are_independent() {
        let world = World::new();
        let mut runtime = RecordingRuntime::default();
        let mut scheduler = EventScheduler::new(vec![
            Maneuver::new("ego", vec![Event::new("go", Priority::Parallel, Trigger::immediate())]),
            Maneuver::new("npc", vec![Event::new("wait", Priority::Skip, Trigger::immediate())]),
        ])
        .unwrap();

        scheduler.tick(&world.ctx(0.0), &mut runtime);

        assert_eq!(scheduler.state(&key("ego", "go")), Some(EventState::Running));
        assert_eq!(scheduler.state(&key("npc", "wait")), Some(EventState::Running));
    }

    #[test]
    fn test_failing_condition_is_isolated() {
        let world = World::new();
        let mut runtime = RecordingRuntime::default();
        let broken = Event::new(
            "broken",
            Priority::Parallel,
            Trigger::single(UserDefinedValueCondition::new("ghost.currentState", "x", Rule::EqualTo).unwrap()),
        );
        let mut scheduler = EventScheduler::new(vec![Maneuver::new(
            "m",
            vec![broken, Event::new("fine", Priority::Parallel, Trigger::immediate())],
        )])
        .unwrap();

        let report = scheduler.tick(&world.ctx(0.0), &mut runtime);

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, key("m", "broken"));
        assert_eq!(report.errors[0].1.kind(), ErrorKind::Provider);
        assert_eq!(scheduler.state(&key("m", "broken")), Some(EventState::Idle));
        assert_eq!(scheduler.state(&key("m", "fine")), Some(EventState::Running));
    }

    #[test]
    fn test_storyboard_state_uses_tick_start_snapshot() {
        let world = World::new();
        let mut runtime = RecordingRuntime::default();
        let follower = Event::new(
            "follower",
            Priority::Parallel,
            Trigger::single(StoryboardElementStateCondition::new("leader", EventState::Running)),
        );
        let mut scheduler = EventScheduler::new(vec![
            Maneuver::new("a", vec![Event::new("leader", Priority::Parallel, Trigger::immediate())]),
            Maneuver::new("b", vec![follower]),
        ])
        .unwrap();

        // "leader" starts this tick; "follower" saw it idle at tick start
        scheduler.tick(&world.ctx(0.0), &mut runtime);
        assert_eq!(scheduler.state(&key("b", "follower")), Some(EventState::Idle));

        scheduler.tick(&world.ctx(0.1), &mut runtime);
        assert_eq!(scheduler.state(&key("b", "follower")), Some(EventState::Running));
    }

    #[test]
    fn test_external_states_reach_conditions() {
        let mut world = World::new();
        world.states.insert("vehicle".to_string(), "CRUISING".to_string());
        let mut runtime = RecordingRuntime::default();
        let mut scheduler = EventScheduler::new(vec![Maneuver::new(
            "m",
            vec![Event::new(
                "arrive",
                Priority::Parallel,
                Trigger::single(UserDefinedValueCondition::new("vehicle.currentState", "ARRIVED", Rule::EqualTo).unwrap()),
            )],
        )])
        .unwrap();

        scheduler.tick(&world.ctx(0.0), &mut runtime);
        assert_eq!(scheduler.state(&key("m", "arrive")), Some(EventState::Idle));

        world.states.insert("vehicle".to_string(), "ARRIVED".to_string());
        scheduler.tick(&world.ctx(0.1), &mut runtime);
        assert_eq!(scheduler.state(&key("m", "arrive")), Some(EventState::Running));
    }

    #[test]
    fn test_mark_complete_and_finish() {
        let world = World::new();
        let mut runtime = RecordingRuntime::default();
        let mut scheduler = EventScheduler::new(vec![Maneuver::new(
            "m",
            vec![Event::new("only", Priority::Parallel, Trigger::immediate())],
        )])
        .unwrap();

        assert_eq!(
            scheduler.mark_complete(&key("m", "only")).unwrap_err().kind(),
            ErrorKind::RuntimeInvariant
        );
        assert_eq!(
            scheduler.mark_complete(&key("m", "other")).unwrap_err().kind(),
            ErrorKind::Lookup
        );

        scheduler.tick(&world.ctx(0.0), &mut runtime);
        assert!(!scheduler.is_finished());
        assert_eq!(scheduler.current_state("m").unwrap(), "running");

        scheduler.mark_complete(&key("m", "only")).unwrap();
        assert!(scheduler.is_finished());
        assert_eq!(scheduler.current_state("only").unwrap(), "complete");
        assert_eq!(scheduler.current_state("m").unwrap(), "complete");
        assert_eq!(scheduler.event(&key("m", "only")).unwrap().start_count(), 1);
    }

    #[test]
    fn test_shutdown_stops_running_events() {
        let world = World::new();
        let mut runtime = RecordingRuntime::default();
        let mut scheduler = EventScheduler::new(vec![Maneuver::new(
            "m",
            vec![
                Event::new("now", Priority::Parallel, Trigger::immediate()),
                at_time("later", Priority::Parallel, 100.0),
            ],
        )])
        .unwrap();

        scheduler.tick(&world.ctx(0.0), &mut runtime);
        let stopped = scheduler.shutdown(&mut runtime);

        assert_eq!(stopped, vec![key("m", "now")]);
        assert_eq!(runtime.stopped, vec![(key("m", "now"), StopReason::ScenarioEnd)]);
        assert!(scheduler.is_finished());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let duplicate_event = EventScheduler::new(vec![
            Maneuver::new("a", vec![Event::new("e", Priority::Skip, Trigger::immediate())]),
            Maneuver::new("b", vec![Event::new("e", Priority::Skip, Trigger::immediate())]),
        ])
        .unwrap_err();
        assert_eq!(
            duplicate_event,
            ScenarioError::Construction(ConstructionError::DuplicateName {
                kind: "event",
                name: "e".to_string(),
            })
        );

        let duplicate_maneuver =
            EventScheduler::new(vec![Maneuver::new("a", Vec::new()), Maneuver::new("a", Vec::new())]).unwrap_err();
        assert_eq!(duplicate_maneuver.kind(), ErrorKind::Construction);

        let shadowing = EventScheduler::new(vec![Maneuver::new(
            "a",
            vec![Event::new("a", Priority::Skip, Trigger::immediate())],
        )])
        .unwrap_err();
        assert_eq!(shadowing.kind(), ErrorKind::Construction);
    }

    #[test]
    fn test_event_from_attributes() {
        let scope = Scope::root(ParameterDeclarations::parse([("mode", "string", "override")]).unwrap());
        let event = Event::from_attributes(&scope, "brake", "$mode", Trigger::immediate()).unwrap();

        assert_eq!(event.priority(), Priority::Overwrite);
        assert_eq!(event.state(), EventState::Idle);
        assert!(event.description().contains("immediately"));
    }

    #[test]
    fn test_states_in_declaration_order() {
        let scheduler = EventScheduler::new(vec![
            Maneuver::new("m1", vec![Event::new("a", Priority::Skip, Trigger::immediate())]),
            Maneuver::new(
                "m2",
                vec![
                    Event::new("b", Priority::Skip, Trigger::immediate()),
                    Event::new("c", Priority::Skip, Trigger::immediate()),
                ],
            ),
        ])
        .unwrap();

        let keys: Vec<_> = scheduler.states().into_iter().map(|(key, _)| key.to_string()).collect();
        assert_eq!(keys, vec!["m1/a", "m2/b", "m2/c"]);
        assert_eq!(scheduler.event_count(), 3);
        assert_eq!(scheduler.tick_count(), 0);
    }
}
