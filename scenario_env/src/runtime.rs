//! Action runtime abstraction driven by the event scheduler.

use crate::types::{EventKey, StopReason};

/// The component that actually executes the actions behind an event.
///
/// The scheduler owns event state and arbitration only. Every transition it
/// makes is mirrored to the runtime:
///
/// ```text
/// Scheduler                      ActionRuntime
///   |-- on_start(key) ------------->|   (Idle/Triggered -> Running)
///   |-- on_stop(key, Overwritten) ->|   (Running -> Complete by overwrite)
///   |<- is_finished(key) == true ---|   (Running -> Complete by completion)
/// ```
pub trait ActionRuntime {
    /// An event entered the running state; begin its actions.
    fn on_start(&mut self, event: &EventKey);

    /// A running event was stopped by the scheduler; abandon its actions.
    fn on_stop(&mut self, event: &EventKey, reason: StopReason);

    /// Returns true once every action of a running event has finished.
    ///
    /// Polled once per tick for each running event, before trigger evaluation.
    fn is_finished(&self, event: &EventKey) -> bool;
}
