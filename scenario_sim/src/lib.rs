//! Scenario Deterministic Simulation Harness
//!
//! This crate runs the scenario core in a fully controlled environment:
//! - **Time**: a virtual clock advanced one fixed tick at a time
//! - **Entities**: timestamped status feeds applied at tick boundaries
//! - **Randomness**: every stream derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          SimSession                          │
//! │  ┌──────────────┐   ┌──────────────────────────────────┐     │
//! │  │  SimContext  │   │ EventScheduler (scenario_core)   │     │
//! │  │ virtual clock│   │ triggers ─► arbitration          │     │
//! │  └──────────────┘   └──────┬────────────────────▲──────┘     │
//! │                    on_start│on_stop    states/poses          │
//! │                     ┌──────▼───────────┐   ┌────┴─────┐      │
//! │                     │PathFollowRuntime │──►│ SimWorld │      │
//! │                     │ actions          │   │ feeds    │      │
//! │                     └──────────────────┘   └──────────┘      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use scenario_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42)
//!     .with_duration(20.0)
//!     .run(ScenarioId::CutIn);
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod route;
mod runner;
mod runtime;
mod session;
mod world;
pub mod scenarios;

pub use context::SimContext;
pub use error::SimError;
pub use route::RouteGenerator;
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use runtime::{Action, PathFollowRuntime, ARRIVED_STATE, FOLLOWING_STATE};
pub use session::{Readiness, SimSession, TickOutcome};
pub use world::{SimConfig, SimWorld, MAX_TICK_RATE_HZ};
