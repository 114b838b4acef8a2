//! The condition evaluator.
//!
//! Every condition kind shares one contract: `evaluate` against the current
//! tick's [`EvaluationContext`], and `description` for tracing. The set of
//! kinds is closed ([`Condition`]) so the scheduler can hold them by value.
//!
//! Conditions cache the last value they observed; `description()` reports it
//! so a trace line shows *why* a condition held or not.

use crate::error::{Result, ScenarioError};
use crate::parameters::Scope;
use crate::scheduler::EventState;
use crate::transform::get_relative_pose;
use nalgebra::Point3;
use scenario_env::{PoseProvider, StateProvider};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Everything a condition may consult during one tick.
pub struct EvaluationContext<'a> {
    /// Simulation time at the start of the tick (seconds)
    pub simulation_time: f64,

    /// Lifecycle labels of storyboard elements and entities
    pub states: &'a dyn StateProvider,

    /// Latest entity poses
    pub poses: &'a dyn PoseProvider,
}

// ============================================================================
// RULE
// ============================================================================

/// Comparison applied between an observed value and a reference value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rule {
    GreaterThan,
    LessThan,
    EqualTo,
    GreaterOrEqual,
    LessOrEqual,
    NotEqualTo,
}

impl Rule {
    /// Compare two numbers: `lhs <rule> rhs`.
    pub fn compare_f64(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Rule::GreaterThan => lhs > rhs,
            Rule::LessThan => lhs < rhs,
            Rule::EqualTo => (lhs - rhs).abs() <= f64::EPSILON,
            Rule::GreaterOrEqual => lhs >= rhs,
            Rule::LessOrEqual => lhs <= rhs,
            Rule::NotEqualTo => (lhs - rhs).abs() > f64::EPSILON,
        }
    }

    /// Compare two texts.
    ///
    /// Equality is always exact text equality. Ordering rules compare as
    /// numbers when both sides parse to finite values, otherwise
    /// lexicographically.
    pub fn compare_str(&self, lhs: &str, rhs: &str) -> bool {
        let ordering = match (parse_finite(lhs), parse_finite(rhs)) {
            (Some(l), Some(r)) => l.total_cmp(&r),
            _ => lhs.cmp(rhs),
        };
        match self {
            Rule::GreaterThan => ordering == Ordering::Greater,
            Rule::LessThan => ordering == Ordering::Less,
            Rule::EqualTo => lhs == rhs,
            Rule::GreaterOrEqual => ordering != Ordering::Less,
            Rule::LessOrEqual => ordering != Ordering::Greater,
            Rule::NotEqualTo => lhs != rhs,
        }
    }

    /// Attribute spelling of the rule.
    pub fn name(&self) -> &'static str {
        match self {
            Rule::GreaterThan => "greaterThan",
            Rule::LessThan => "lessThan",
            Rule::EqualTo => "equalTo",
            Rule::GreaterOrEqual => "greaterOrEqual",
            Rule::LessOrEqual => "lessOrEqual",
            Rule::NotEqualTo => "notEqualTo",
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Rule {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "greaterThan" => Ok(Rule::GreaterThan),
            "lessThan" => Ok(Rule::LessThan),
            "equalTo" => Ok(Rule::EqualTo),
            "greaterOrEqual" => Ok(Rule::GreaterOrEqual),
            "lessOrEqual" => Ok(Rule::LessOrEqual),
            "notEqualTo" => Ok(Rule::NotEqualTo),
            _ => Err(ScenarioError::syntax(format!(
                "unexpected value '{}' specified as type Rule",
                s
            ))),
        }
    }
}

// ============================================================================
// USER DEFINED VALUE CONDITION
// ============================================================================

/// A property a user-defined condition can observe on its subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    /// Lifecycle-state label from the state provider
    CurrentState,
}

impl Property {
    fn observe(&self, subject: &str, ctx: &EvaluationContext<'_>) -> Result<String> {
        match self {
            Property::CurrentState => Ok(ctx.states.current_state(subject)?),
        }
    }
}

/// Recognised property names, checked when a condition is built.
#[derive(Debug, Clone)]
pub struct PropertyRegistry {
    properties: BTreeMap<String, Property>,
}

impl PropertyRegistry {
    /// A registry with no properties.
    pub fn empty() -> Self {
        Self {
            properties: BTreeMap::new(),
        }
    }

    /// Make `name` resolvable to `property`.
    pub fn register(&mut self, name: impl Into<String>, property: Property) {
        self.properties.insert(name.into(), property);
    }

    /// Resolve a property name.
    pub fn resolve(&self, name: &str) -> Result<Property> {
        self.properties.get(name).copied().ok_or_else(|| {
            ScenarioError::lookup(format!(
                "'{}' is not a supported user-defined property (known: {})",
                name,
                self.properties.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }
}

impl Default for PropertyRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("currentState", Property::CurrentState);
        registry
    }
}

/// Wraps a value observed through an external hook: `<subject>.<property>`.
///
/// True when `observed <rule> value`.
#[derive(Debug, Clone, PartialEq)]
pub struct UserDefinedValueCondition {
    name: String,
    subject: String,
    property: Property,
    value: String,
    rule: Rule,
    last_checked_value: String,
}

impl UserDefinedValueCondition {
    /// Build against the default property registry.
    ///
    /// # Errors
    /// * `Syntax` - `name` is not `<subject>.<property>`
    /// * `Lookup` - the property is well-formed but unknown
    pub fn new(name: &str, value: &str, rule: Rule) -> Result<Self> {
        Self::with_registry(name, value, rule, &PropertyRegistry::default())
    }

    /// Build against a caller-supplied property registry.
    pub fn with_registry(name: &str, value: &str, rule: Rule, registry: &PropertyRegistry) -> Result<Self> {
        let (subject, property) = match name.split_once('.') {
            Some((subject, property)) if !subject.is_empty() && !property.is_empty() => (subject, property),
            _ => {
                return Err(ScenarioError::syntax(format!(
                    "user-defined value condition name '{}' is not of the form <subject>.<property>",
                    name
                )))
            }
        };

        Ok(Self {
            name: name.to_string(),
            subject: subject.to_string(),
            property: registry.resolve(property)?,
            value: value.to_string(),
            rule,
            last_checked_value: String::new(),
        })
    }

    /// Build from raw attributes, resolving `$parameter` references.
    pub fn from_attributes(scope: &Scope<'_>, name: &str, value: &str, rule: &str) -> Result<Self> {
        let rule: Rule = scope.resolve(rule)?.parse()?;
        Self::new(&scope.resolve(name)?, &scope.resolve(value)?, rule)
    }

    pub fn evaluate(&mut self, ctx: &EvaluationContext<'_>) -> Result<bool> {
        self.last_checked_value = self.property.observe(&self.subject, ctx)?;
        Ok(self.rule.compare_str(&self.last_checked_value, &self.value))
    }

    pub fn description(&self) -> String {
        format!(
            "Is the {} (= {}) {} {}?",
            self.name, self.last_checked_value, self.rule, self.value
        )
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn last_checked_value(&self) -> &str {
        &self.last_checked_value
    }
}

// ============================================================================
// SPATIAL / TIME / STATE CONDITIONS
// ============================================================================

/// Euclidean distance of an entity to a fixed map point.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceCondition {
    pub entity: String,
    pub position: Point3<f64>,
    pub rule: Rule,
    pub value: f64,
    last_distance: Option<f64>,
}

impl DistanceCondition {
    pub fn new(entity: impl Into<String>, position: Point3<f64>, rule: Rule, value: f64) -> Self {
        Self {
            entity: entity.into(),
            position,
            rule,
            value,
            last_distance: None,
        }
    }

    fn evaluate(&mut self, ctx: &EvaluationContext<'_>) -> Result<bool> {
        let pose = ctx.poses.entity_pose(&self.entity)?;
        let distance = (pose.position - self.position.coords).norm();
        self.last_distance = Some(distance);
        Ok(self.rule.compare_f64(distance, self.value))
    }

    fn description(&self) -> String {
        format!(
            "Is the distance of {} to ({}, {}, {}) (= {}) {} {}?",
            self.entity,
            self.position.x,
            self.position.y,
            self.position.z,
            format_last(self.last_distance),
            self.rule,
            self.value
        )
    }
}

/// How a relative distance is measured in the entity's frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    Cartesian,
    Longitudinal,
    Lateral,
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceMetric::Cartesian => write!(f, "cartesian"),
            DistanceMetric::Longitudinal => write!(f, "longitudinal"),
            DistanceMetric::Lateral => write!(f, "lateral"),
        }
    }
}

/// Distance between two entities, measured in the first entity's frame.
///
/// Longitudinal and lateral metrics are signed: positive ahead / to the left.
#[derive(Debug, Clone, PartialEq)]
pub struct RelativeDistanceCondition {
    pub entity: String,
    pub reference: String,
    pub metric: DistanceMetric,
    pub rule: Rule,
    pub value: f64,
    last_distance: Option<f64>,
}

impl RelativeDistanceCondition {
    pub fn new(
        entity: impl Into<String>,
        reference: impl Into<String>,
        metric: DistanceMetric,
        rule: Rule,
        value: f64,
    ) -> Self {
        Self {
            entity: entity.into(),
            reference: reference.into(),
            metric,
            rule,
            value,
            last_distance: None,
        }
    }

    fn evaluate(&mut self, ctx: &EvaluationContext<'_>) -> Result<bool> {
        let from = ctx.poses.entity_pose(&self.entity)?;
        let to = ctx.poses.entity_pose(&self.reference)?;
        let relative = get_relative_pose(&from, &to);
        let distance = match self.metric {
            DistanceMetric::Cartesian => relative.position.norm(),
            DistanceMetric::Longitudinal => relative.position.x,
            DistanceMetric::Lateral => relative.position.y,
        };
        self.last_distance = Some(distance);
        Ok(self.rule.compare_f64(distance, self.value))
    }

    fn description(&self) -> String {
        format!(
            "Is the {} distance from {} to {} (= {}) {} {}?",
            self.metric,
            self.entity,
            self.reference,
            format_last(self.last_distance),
            self.rule,
            self.value
        )
    }
}

/// Compares the simulation clock; scenario timeouts are expressed with it.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationTimeCondition {
    pub rule: Rule,
    pub value: f64,
    last_time: Option<f64>,
}

impl SimulationTimeCondition {
    pub fn new(rule: Rule, value: f64) -> Self {
        Self {
            rule,
            value,
            last_time: None,
        }
    }

    /// Build from raw attributes, resolving `$parameter` references.
    pub fn from_attributes(scope: &Scope<'_>, value: &str, rule: &str) -> Result<Self> {
        let rule: Rule = scope.resolve(rule)?.parse()?;
        Ok(Self::new(rule, scope.resolve_f64(value)?))
    }

    fn evaluate(&mut self, ctx: &EvaluationContext<'_>) -> Result<bool> {
        self.last_time = Some(ctx.simulation_time);
        Ok(self.rule.compare_f64(ctx.simulation_time, self.value))
    }

    fn description(&self) -> String {
        format!(
            "Is the simulation time (= {}) {} {}?",
            format_last(self.last_time),
            self.rule,
            self.value
        )
    }
}

/// True while a storyboard element is in the given lifecycle state.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryboardElementStateCondition {
    pub element: String,
    pub state: EventState,
    last_state: String,
}

impl StoryboardElementStateCondition {
    pub fn new(element: impl Into<String>, state: EventState) -> Self {
        Self {
            element: element.into(),
            state,
            last_state: String::new(),
        }
    }

    fn evaluate(&mut self, ctx: &EvaluationContext<'_>) -> Result<bool> {
        self.last_state = ctx.states.current_state(&self.element)?;
        Ok(self.last_state == self.state.name())
    }

    fn description(&self) -> String {
        format!(
            "Is the {} (= {}) in {} state?",
            self.element, self.last_state, self.state
        )
    }
}

fn parse_finite(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn format_last(value: Option<f64>) -> String {
    value.map(|v| format!("{:.3}", v)).unwrap_or_default()
}

// ============================================================================
// CONDITION / TRIGGER
// ============================================================================

/// Any condition the scheduler can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Distance(DistanceCondition),
    RelativeDistance(RelativeDistanceCondition),
    SimulationTime(SimulationTimeCondition),
    StoryboardElementState(StoryboardElementStateCondition),
    UserDefinedValue(UserDefinedValueCondition),
}

impl Condition {
    /// Evaluate against this tick's context, refreshing the cached observation.
    pub fn evaluate(&mut self, ctx: &EvaluationContext<'_>) -> Result<bool> {
        match self {
            Condition::Distance(c) => c.evaluate(ctx),
            Condition::RelativeDistance(c) => c.evaluate(ctx),
            Condition::SimulationTime(c) => c.evaluate(ctx),
            Condition::StoryboardElementState(c) => c.evaluate(ctx),
            Condition::UserDefinedValue(c) => c.evaluate(ctx),
        }
    }

    /// Human readable question, including the last observed value.
    pub fn description(&self) -> String {
        match self {
            Condition::Distance(c) => c.description(),
            Condition::RelativeDistance(c) => c.description(),
            Condition::SimulationTime(c) => c.description(),
            Condition::StoryboardElementState(c) => c.description(),
            Condition::UserDefinedValue(c) => c.description(),
        }
    }

    /// Names this condition will look up through the providers.
    pub fn subjects(&self) -> Vec<&str> {
        match self {
            Condition::Distance(c) => vec![c.entity.as_str()],
            Condition::RelativeDistance(c) => vec![c.entity.as_str(), c.reference.as_str()],
            Condition::SimulationTime(_) => Vec::new(),
            Condition::StoryboardElementState(c) => vec![c.element.as_str()],
            Condition::UserDefinedValue(c) => vec![c.subject()],
        }
    }
}

impl From<DistanceCondition> for Condition {
    fn from(condition: DistanceCondition) -> Self {
        Condition::Distance(condition)
    }
}

impl From<RelativeDistanceCondition> for Condition {
    fn from(condition: RelativeDistanceCondition) -> Self {
        Condition::RelativeDistance(condition)
    }
}

impl From<SimulationTimeCondition> for Condition {
    fn from(condition: SimulationTimeCondition) -> Self {
        Condition::SimulationTime(condition)
    }
}

impl From<StoryboardElementStateCondition> for Condition {
    fn from(condition: StoryboardElementStateCondition) -> Self {
        Condition::StoryboardElementState(condition)
    }
}

impl From<UserDefinedValueCondition> for Condition {
    fn from(condition: UserDefinedValueCondition) -> Self {
        Condition::UserDefinedValue(condition)
    }
}

/// Conjunction of conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionGroup {
    conditions: Vec<Condition>,
}

impl ConditionGroup {
    /// A group needs at least one condition.
    pub fn new(conditions: Vec<Condition>) -> Result<Self> {
        if conditions.is_empty() {
            return Err(ScenarioError::syntax("a condition group requires at least one condition"));
        }
        Ok(Self { conditions })
    }

    /// Every condition is evaluated so that each description stays current;
    /// the first error is reported after the whole group has run.
    fn evaluate(&mut self, ctx: &EvaluationContext<'_>) -> Result<bool> {
        let mut satisfied = true;
        let mut first_error = None;
        for condition in &mut self.conditions {
            match condition.evaluate(ctx) {
                Ok(value) => satisfied &= value,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(satisfied),
        }
    }

    fn description(&self) -> String {
        self.conditions
            .iter()
            .map(Condition::description)
            .collect::<Vec<_>>()
            .join(" and ")
    }
}

/// Disjunction of condition groups; the start condition of an event.
///
/// A trigger without groups is always satisfied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trigger {
    groups: Vec<ConditionGroup>,
}

impl Trigger {
    pub fn new(groups: Vec<ConditionGroup>) -> Self {
        Self { groups }
    }

    /// A trigger that fires on the first tick it is evaluated.
    pub fn immediate() -> Self {
        Self::default()
    }

    /// A trigger with a single condition.
    pub fn single(condition: impl Into<Condition>) -> Self {
        Self {
            groups: vec![ConditionGroup {
                conditions: vec![condition.into()],
            }],
        }
    }

    pub fn evaluate(&mut self, ctx: &EvaluationContext<'_>) -> Result<bool> {
        if self.groups.is_empty() {
            return Ok(true);
        }
        // All groups run before the first error surfaces
        let mut fired = false;
        let mut first_error = None;
        for group in &mut self.groups {
            match group.evaluate(ctx) {
                Ok(value) => fired |= value,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(fired),
        }
    }

    pub fn description(&self) -> String {
        if self.groups.is_empty() {
            return "immediately".to_string();
        }
        self.groups
            .iter()
            .map(|group| format!("[{}]", group.description()))
            .collect::<Vec<_>>()
            .join(" or ")
    }

    /// Every provider name referenced by any condition.
    pub fn subjects(&self) -> Vec<&str> {
        self.groups
            .iter()
            .flat_map(|group| group.conditions.iter())
            .flat_map(Condition::subjects)
            .collect()
    }
}
