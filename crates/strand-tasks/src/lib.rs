//! # strand-tasks
//!
//! The asynchronous task tracker pattern, used twice in the system:
//!
//! - [`TaskTracker`] — the generic shape: register a named unit of work,
//!   auto-remove it on settlement, and wait for all with a bound. Timeouts
//!   are never errors; pending units stay inspectable.
//! - [`SubagentTracker`] — the full lifecycle specialization for spawned
//!   child sessions: status transitions, at-most-once result delivery,
//!   isolated completion callbacks, and explicit truncation inference.
//! - [`BackgroundTracker`] — fire-and-forget hook executions, built on the
//!   generic tracker, drained at session boundaries.

pub mod background;
pub mod subagent;
pub mod tracker;

pub use background::BackgroundTracker;
pub use subagent::{
    CompleteOptions, FailOptions, SpawnParams, SubagentRecord, SubagentResult, SubagentStatus,
    SubagentTracker, completion_meta_for,
};
pub use tracker::TaskTracker;
