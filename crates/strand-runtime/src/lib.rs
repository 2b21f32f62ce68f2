//! # strand-runtime
//!
//! The turn execution engine: runs one user prompt to settlement against an
//! append-only event log. The engine owns causal ordering (assistant content
//! before tool events), interrupt recovery (partial content persisted, never
//! duplicated), and the error contract (the original failure always reaches
//! the caller, with a best-effort `error.agent` event for audit).
//!
//! Collaborators are ports: the model stream, tool executor, and context
//! builders are injected, so the engine knows nothing about provider wire
//! protocols or tool implementations.

pub mod compaction;
pub mod config;
pub mod content_tracker;
pub mod emitter;
pub mod engine;
pub mod errors;
pub mod hooks;
pub mod persister;
pub mod ports;
pub mod session;
pub mod subagents;
pub mod types;

pub use compaction::{SessionCompactionDeps, engine_for_session};
pub use config::{CompactionSettings, RuntimeConfig};
pub use content_tracker::{
    InterruptedContent, ToolCallRecord, ToolCallStatus, TurnContentTracker,
};
pub use emitter::{ChannelEmitter, EventEmitter, Notification, NullEmitter};
pub use engine::TurnEngine;
pub use hooks::{HookDecision, HookDispatcher, HookEvent, HookHandler, HookPoint};
pub use errors::RuntimeError;
pub use persister::EventPersister;
pub use ports::{ContextSources, ModelStream, NullSources, StreamOutcome, ToolExecutor, ToolOutcome};
pub use session::ActiveSession;
pub use subagents::{format_subagent_results, install_result_notifications, record_spawn};
pub use types::{RunContext, RunOptions, RunOutcome, RunReport, TurnReport};
