//! Collaborator ports consumed by the engine.
//!
//! The engine is deliberately ignorant of provider wire protocols and tool
//! implementations; it talks to both through these traits. Retry and backoff
//! for transient provider failures belong behind [`ModelStream`], never in
//! the engine.

use async_trait::async_trait;
use strand_core::{StopReason, TokenUsage};
use tokio_util::sync::CancellationToken;

use crate::content_tracker::{ToolCallRecord, TurnContentTracker};
use crate::errors::Result;
use crate::types::RunContext;

/// How one model stream settled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The model produced a complete response.
    Completed {
        /// Why the response ended.
        stop_reason: StopReason,
        /// API-reported usage for this response.
        usage: TokenUsage,
    },
    /// The stream was cut off before the model settled.
    Interrupted,
}

/// Model streaming collaborator.
#[async_trait]
pub trait ModelStream: Send + Sync {
    /// Stream one model turn, pushing deltas and tool-use blocks into the
    /// tracker as they arrive.
    async fn stream_turn(
        &self,
        ctx: &RunContext,
        tracker: &TurnContentTracker,
        cancel: &CancellationToken,
    ) -> Result<StreamOutcome>;
}

/// Outcome of one tool execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolOutcome {
    /// Result text.
    pub content: String,
    /// Whether the tool errored.
    pub is_error: bool,
}

/// Tool execution collaborator.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute one tool call. Failures come back as error outcomes, not
    /// `Err` — a failed tool does not fail the turn.
    async fn execute(&self, call: &ToolCallRecord, cancel: &CancellationToken) -> ToolOutcome;
}

/// Per-turn context builders (skills, todos).
#[async_trait]
pub trait ContextSources: Send + Sync {
    /// Context assembled from this run's skill references, when any applies.
    async fn skill_context(&self, skill_refs: &[String]) -> Option<String>;

    /// Current todo context, when any exists.
    async fn todo_context(&self) -> Option<String>;
}

/// Sources that contribute nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSources;

#[async_trait]
impl ContextSources for NullSources {
    async fn skill_context(&self, _skill_refs: &[String]) -> Option<String> {
        None
    }

    async fn todo_context(&self) -> Option<String> {
        None
    }
}
