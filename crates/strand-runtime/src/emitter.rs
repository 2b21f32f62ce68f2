//! Outbound notifications.
//!
//! Fire-and-forget side channel for observers (UI, logging). Never required
//! for correctness: a dropped notification changes nothing about persisted
//! state.

use serde::Serialize;
use strand_core::{StopReason, TokenUsage};
use tokio::sync::mpsc;

/// A named notification emitted by the engine.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A turn finished without tool follow-up.
    TurnComplete {
        /// Session the turn belongs to.
        session_id: String,
        /// Turn number.
        turn: u64,
        /// Final stop reason.
        stop_reason: StopReason,
    },
    /// A turn was interrupted.
    TurnInterrupted {
        /// Session the turn belongs to.
        session_id: String,
        /// Turn number.
        turn: u64,
    },
    /// A whole run settled.
    AgentComplete {
        /// Session the run belongs to.
        session_id: String,
        /// Whether the run succeeded.
        success: bool,
        /// Usage accumulated across the run.
        usage: TokenUsage,
    },
    /// Persisting an event failed outside the critical path.
    PersistenceError {
        /// Session the write belonged to.
        session_id: String,
        /// Failure description.
        error: String,
    },
    /// A subagent settled.
    SubagentSettled {
        /// Parent session.
        session_id: String,
        /// Child session.
        child_session_id: String,
        /// Whether the child succeeded.
        success: bool,
    },
    /// A hook handler was invoked.
    HookTriggered {
        /// Session the lifecycle point belongs to.
        session_id: String,
        /// Handler name.
        hook: String,
        /// Lifecycle point name.
        point: String,
    },
    /// A hook handler settled. Fail-open: errors, panics, and timeouts all
    /// still produce this notification.
    HookCompleted {
        /// Session the lifecycle point belongs to.
        session_id: String,
        /// Handler name.
        hook: String,
        /// Whether the handler blocked the action.
        blocked: bool,
    },
}

impl Notification {
    /// Notification name, matching the serde tag.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::TurnComplete { .. } => "turn_complete",
            Self::TurnInterrupted { .. } => "turn_interrupted",
            Self::AgentComplete { .. } => "agent_complete",
            Self::PersistenceError { .. } => "persistence_error",
            Self::SubagentSettled { .. } => "subagent_settled",
            Self::HookTriggered { .. } => "hook_triggered",
            Self::HookCompleted { .. } => "hook_completed",
        }
    }
}

/// Outbound notification port.
pub trait EventEmitter: Send + Sync {
    /// Deliver one notification. Must not block or fail.
    fn emit(&self, notification: Notification);
}

/// Emitter that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullEmitter;

impl EventEmitter for NullEmitter {
    fn emit(&self, _notification: Notification) {}
}

/// Emitter backed by an unbounded channel; observers consume the receiver.
#[derive(Clone, Debug)]
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelEmitter {
    /// Create an emitter and the receiver observers read from.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventEmitter for ChannelEmitter {
    fn emit(&self, notification: Notification) {
        // Receiver gone means nobody is observing; nothing to do.
        let _ = self.tx.send(notification);
    }
}
