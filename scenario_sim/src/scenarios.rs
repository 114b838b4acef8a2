//! Built-in scenarios exercising arbitration, conditions and path following.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SCN-001: overwrite, skip and parallel events triggering together
    PriorityArbitration,

    /// SCN-002: two overwrite events triggering together
    OverwriteTieBreak,

    /// SCN-003: ego follows a route; arrival triggers a user-defined condition
    EgoArrival,

    /// SCN-004: npc merges in front of ego; relative distance triggers a brake
    CutIn,

    /// SCN-005: seeded random route through jittered waypoints
    RandomRoute,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::PriorityArbitration,
            ScenarioId::OverwriteTieBreak,
            ScenarioId::EgoArrival,
            ScenarioId::CutIn,
            ScenarioId::RandomRoute,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::PriorityArbitration => "priority_arbitration",
            ScenarioId::OverwriteTieBreak => "overwrite_tie_break",
            ScenarioId::EgoArrival => "ego_arrival",
            ScenarioId::CutIn => "cut_in",
            ScenarioId::RandomRoute => "random_route",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::PriorityArbitration => "A(overwrite), B(skip), C(parallel) trigger on the same tick",
            ScenarioId::OverwriteTieBreak => "X(overwrite) and Y(overwrite) trigger together; the later one wins",
            ScenarioId::EgoArrival => "Ego drives a spline route; ego.currentState == ARRIVED parks it",
            ScenarioId::CutIn => "Npc merges ahead of ego; a lateral/longitudinal gap overwrites ego's drive with a brake",
            ScenarioId::RandomRoute => "Waypoints jittered from the master seed; ego must reach the last one",
        }
    }

    /// Returns true if the scenario moves entities along paths.
    pub fn uses_geometry(&self) -> bool {
        matches!(
            self,
            ScenarioId::EgoArrival | ScenarioId::CutIn | ScenarioId::RandomRoute
        )
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "priority_arbitration" | "priority" | "scn-001" => Ok(ScenarioId::PriorityArbitration),
            "overwrite_tie_break" | "tie_break" | "scn-002" => Ok(ScenarioId::OverwriteTieBreak),
            "ego_arrival" | "arrival" | "scn-003" => Ok(ScenarioId::EgoArrival),
            "cut_in" | "cutin" | "scn-004" => Ok(ScenarioId::CutIn),
            "random_route" | "randomroute" | "scn-005" => Ok(ScenarioId::RandomRoute),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
