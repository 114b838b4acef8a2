//! Scenario Environment Abstraction Layer
//!
//! This crate defines the collaborators the scenario core talks to but does
//! not own:
//! - **State**: subject name -> current lifecycle-state label (`StateProvider`)
//! - **Pose**: entity name -> current map pose (`PoseProvider`)
//! - **Actions**: start/stop notifications and completion polling (`ActionRuntime`)
//!
//! The core only ever sees these traits, so the same scheduler runs against
//! the deterministic harness in `scenario_sim` or against a bridge to a real
//! vehicle stack.
//!
//! # Example
//!
//! ```ignore
//! use scenario_env::{ActionRuntime, EventKey, StopReason};
//!
//! struct LoggingRuntime;
//!
//! impl ActionRuntime for LoggingRuntime {
//!     fn on_start(&mut self, event: &EventKey) { println!("start {}", event); }
//!     fn on_stop(&mut self, event: &EventKey, reason: StopReason) { println!("stop {} ({})", event, reason); }
//!     fn is_finished(&self, _event: &EventKey) -> bool { false }
//! }
//! ```

mod error;
mod provider;
mod runtime;
mod types;

pub use error::EnvError;
pub use provider::{PoseProvider, StateProvider};
pub use runtime::ActionRuntime;
pub use types::{EntityStatus, EventKey, Gear, Pose, StopReason};
