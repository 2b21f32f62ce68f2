//! Hook dispatch over run lifecycle points.
//!
//! Handlers observe lifecycle points (tool use, compaction, session end) and
//! may block the action. Execution is fail-open: a handler that errors,
//! panics, or times out is logged and treated as `Continue`. Every handler
//! invocation produces exactly two notifications — `hook_triggered` and
//! `hook_completed` — whatever the outcome.
//!
//! Background handlers run off the critical path through a
//! [`BackgroundTracker`] and are drained at session boundaries; their
//! decisions are ignored (a detached handler cannot block).

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use strand_tasks::BackgroundTracker;

use crate::emitter::{EventEmitter, Notification};
use crate::errors::Result;

const DEFAULT_HANDLER_TIMEOUT_MS: u64 = 30_000;

/// A point in the run lifecycle that handlers can observe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookPoint {
    /// Before a tool executes.
    PreToolUse,
    /// After a tool result is persisted.
    PostToolUse,
    /// Before a compaction replaces the live view.
    PreCompact,
    /// Before a session ends.
    SessionEnd,
}

impl HookPoint {
    /// Point name, stable across releases.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreToolUse => "pre_tool_use",
            Self::PostToolUse => "post_tool_use",
            Self::PreCompact => "pre_compact",
            Self::SessionEnd => "session_end",
        }
    }
}

impl std::fmt::Display for HookPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a handler sees: the session, the point, and a point-specific payload.
#[derive(Clone, Debug)]
pub struct HookEvent {
    /// Session the lifecycle point belongs to.
    pub session_id: String,
    /// Which point fired.
    pub point: HookPoint,
    /// Point-specific detail (tool name and arguments, token counts, ...).
    pub payload: Value,
}

/// Handler verdict for a blocking dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HookDecision {
    /// Let the action proceed.
    Continue,
    /// Stop the action, with a reason surfaced to the caller.
    Block {
        /// Why the action was blocked.
        reason: String,
    },
}

impl HookDecision {
    /// Whether this decision blocks the action.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Block { .. })
    }
}

/// One registered hook.
#[async_trait]
pub trait HookHandler: Send + Sync {
    /// Handler name, used in notifications and logs.
    fn name(&self) -> &str;

    /// The lifecycle point this handler observes.
    fn point(&self) -> HookPoint;

    /// Whether the handler runs off the critical path. Background handlers
    /// cannot block.
    fn background(&self) -> bool {
        false
    }

    /// Per-invocation time budget.
    fn timeout_ms(&self) -> u64 {
        DEFAULT_HANDLER_TIMEOUT_MS
    }

    /// Observe the event and decide.
    async fn handle(&self, event: &HookEvent) -> Result<HookDecision>;
}

/// Runs registered handlers for a lifecycle point.
pub struct HookDispatcher {
    handlers: Vec<Arc<dyn HookHandler>>,
    emitter: Arc<dyn EventEmitter>,
    background: BackgroundTracker,
}

impl HookDispatcher {
    /// Create a dispatcher with no handlers.
    #[must_use]
    pub fn new(emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            handlers: Vec::new(),
            emitter,
            background: BackgroundTracker::new(),
        }
    }

    /// Register a handler. Blocking handlers run in registration order.
    pub fn register(&mut self, handler: Arc<dyn HookHandler>) {
        self.handlers.push(handler);
    }

    /// Run every handler registered for the event's point.
    ///
    /// Blocking handlers run sequentially; the first `Block` stops the
    /// chain. Background handlers are spawned and tracked, and their
    /// decisions are ignored. A handler that errors, panics, or times out
    /// counts as `Continue`.
    pub async fn dispatch(&self, event: &HookEvent) -> HookDecision {
        for handler in self
            .handlers
            .iter()
            .filter(|h| h.point() == event.point)
        {
            if handler.background() {
                self.spawn_background(Arc::clone(handler), event);
                continue;
            }

            self.emitter.emit(Notification::HookTriggered {
                session_id: event.session_id.clone(),
                hook: handler.name().to_owned(),
                point: event.point.as_str().to_owned(),
            });

            let decision = run_fail_open(handler.as_ref(), event).await;

            self.emitter.emit(Notification::HookCompleted {
                session_id: event.session_id.clone(),
                hook: handler.name().to_owned(),
                blocked: decision.is_blocked(),
            });

            if decision.is_blocked() {
                debug!(hook = handler.name(), point = %event.point, "hook blocked the action");
                return decision;
            }
        }
        HookDecision::Continue
    }

    /// Number of background handler runs still in flight.
    #[must_use]
    pub fn pending_background(&self) -> usize {
        self.background.pending_count()
    }

    /// Wait for in-flight background handlers, bounded by `timeout`.
    /// Returns `true` when everything settled.
    pub async fn drain_background(&self, timeout: Duration) -> bool {
        self.background.drain_with_timeout(timeout).await
    }

    fn spawn_background(&self, handler: Arc<dyn HookHandler>, event: &HookEvent) {
        self.emitter.emit(Notification::HookTriggered {
            session_id: event.session_id.clone(),
            hook: handler.name().to_owned(),
            point: event.point.as_str().to_owned(),
        });

        let emitter = Arc::clone(&self.emitter);
        let event = event.clone();
        self.background.spawn(async move {
            let decision = run_fail_open(handler.as_ref(), &event).await;
            emitter.emit(Notification::HookCompleted {
                session_id: event.session_id.clone(),
                hook: handler.name().to_owned(),
                blocked: decision.is_blocked(),
            });
        });
    }
}

impl std::fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookDispatcher")
            .field("handlers", &self.handlers.len())
            .field("pending_background", &self.pending_background())
            .finish()
    }
}

/// Run one handler, collapsing every failure mode to `Continue`.
async fn run_fail_open(handler: &dyn HookHandler, event: &HookEvent) -> HookDecision {
    let run = AssertUnwindSafe(handler.handle(event)).catch_unwind();
    match tokio::time::timeout(Duration::from_millis(handler.timeout_ms()), run).await {
        Ok(Ok(Ok(decision))) => decision,
        Ok(Ok(Err(error))) => {
            warn!(hook = handler.name(), %error, "hook handler failed, continuing");
            HookDecision::Continue
        }
        Ok(Err(_panic)) => {
            warn!(hook = handler.name(), "hook handler panicked, continuing");
            HookDecision::Continue
        }
        Err(_) => {
            warn!(
                hook = handler.name(),
                timeout_ms = handler.timeout_ms(),
                "hook handler timed out, continuing"
            );
            HookDecision::Continue
        }
    }
}
