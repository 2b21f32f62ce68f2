//! Subagent lifecycle tracking.
//!
//! A subagent is a child session spawned by a parent turn for a delegated
//! task. The tracker models the full lifecycle (`spawning → running →
//! completed | failed`), queues settled results for at-most-once consumption
//! by the next parent turn, and fires completion callbacks — each inside its
//! own failure boundary so one misbehaving callback cannot starve the rest
//! or corrupt tracker state.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::warn;

use strand_core::{StopReason, TokenUsage};

/// Lifecycle status of a tracked subagent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubagentStatus {
    /// Registered, child session not yet running.
    Spawning,
    /// Child session is executing.
    Running,
    /// Settled successfully.
    Completed,
    /// Settled with a failure.
    Failed,
}

impl SubagentStatus {
    /// Whether this status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Settled outcome of a subagent, delivered to the parent turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentResult {
    /// Child session ID.
    pub session_id: String,
    /// Whether the child completed successfully.
    pub success: bool,
    /// Result summary.
    pub summary: String,
    /// Full child output, when captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_output: Option<String>,
    /// Turns the child consumed.
    pub turns: u64,
    /// Child token usage.
    pub token_usage: TokenUsage,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// The child's final stop reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    /// Whether the child's output was cut off.
    pub truncated: bool,
    /// How the child completed (mirrors the stop reason vocabulary).
    #[serde(skip_serializing_if = "Option::is_none", skip_deserializing)]
    pub completion_type: Option<&'static str>,
    /// Failure description, for failed subagents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One tracked subagent.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentRecord {
    /// Child session ID.
    pub session_id: String,
    /// How the subagent was spawned.
    pub spawn_type: String,
    /// Delegated task description.
    pub task: String,
    /// Model the child runs on.
    pub model: String,
    /// Child working directory.
    pub working_directory: String,
    /// The parent's `subagent.spawned` event.
    pub spawn_event_id: String,
    /// Current lifecycle status.
    pub status: SubagentStatus,
    /// Spawn timestamp (RFC 3339).
    pub started_at: String,
    /// Settled outcome, once terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SubagentResult>,
}

/// Parameters for registering a subagent.
#[derive(Clone, Debug)]
pub struct SpawnParams {
    /// Child session ID.
    pub session_id: String,
    /// How the subagent was spawned.
    pub spawn_type: String,
    /// Delegated task description.
    pub task: String,
    /// Model the child runs on.
    pub model: String,
    /// Child working directory.
    pub working_directory: String,
    /// The parent's `subagent.spawned` event.
    pub spawn_event_id: String,
}

/// Optional completion metadata.
#[derive(Clone, Debug, Default)]
pub struct CompleteOptions {
    /// Full child output.
    pub full_output: Option<String>,
    /// The child's final stop reason.
    pub stop_reason: Option<StopReason>,
    /// Explicit truncation flag; inferred from the stop reason when absent.
    pub truncated: Option<bool>,
}

/// Optional failure metadata: what the child got through before it died.
#[derive(Clone, Debug, Default)]
pub struct FailOptions {
    /// Turns the child consumed before the failure.
    pub turns: u64,
    /// Token usage accumulated before the failure.
    pub token_usage: TokenUsage,
    /// Wall-clock duration until the failure.
    pub duration_ms: u64,
    /// Partial child output, when captured.
    pub full_output: Option<String>,
}

/// Map a stop reason to `(truncated, completion_type)`.
///
/// `max_tokens` always means truncated output, whether or not the caller
/// said so. New stop-reason vocabulary must extend this match; truncation
/// is never re-derived ad hoc at call sites.
#[must_use]
pub fn completion_meta_for(
    stop_reason: Option<StopReason>,
    explicit_truncated: Option<bool>,
) -> (bool, Option<&'static str>) {
    match stop_reason {
        Some(StopReason::MaxTokens) => (true, Some("max_tokens")),
        Some(other) => (explicit_truncated.unwrap_or(false), Some(other.as_str())),
        None => (explicit_truncated.unwrap_or(false), None),
    }
}

type ResultCallback = Box<dyn Fn(&SubagentResult) + Send + Sync>;

struct Tracked {
    record: Mutex<SubagentRecord>,
    done: Notify,
}

/// Tracks spawned subagents to completion.
pub struct SubagentTracker {
    records: DashMap<String, Arc<Tracked>>,
    pending_results: Mutex<Vec<SubagentResult>>,
    id_callbacks: DashMap<String, Vec<ResultCallback>>,
    global_callbacks: Mutex<Vec<ResultCallback>>,
    settled: Notify,
}

impl SubagentTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            pending_results: Mutex::new(Vec::new()),
            id_callbacks: DashMap::new(),
            global_callbacks: Mutex::new(Vec::new()),
            settled: Notify::new(),
        }
    }

    /// Register a subagent in `spawning` status.
    pub fn spawn(&self, params: SpawnParams) {
        let record = SubagentRecord {
            session_id: params.session_id.clone(),
            spawn_type: params.spawn_type,
            task: params.task,
            model: params.model,
            working_directory: params.working_directory,
            spawn_event_id: params.spawn_event_id,
            status: SubagentStatus::Spawning,
            started_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            result: None,
        };
        let _ = self.records.insert(
            params.session_id,
            Arc::new(Tracked {
                record: Mutex::new(record),
                done: Notify::new(),
            }),
        );
    }

    /// Transition a non-terminal subagent's status (e.g. to `running`).
    ///
    /// Returns false for unknown ids and for subagents that already settled.
    pub fn update_status(&self, session_id: &str, status: SubagentStatus) -> bool {
        let Some(tracked) = self.records.get(session_id) else {
            return false;
        };
        let mut record = tracked.record.lock();
        if record.status.is_terminal() {
            return false;
        }
        record.status = status;
        true
    }

    /// Settle a subagent successfully.
    ///
    /// Queues the result for the next parent turn, wakes waiters, and fires
    /// callbacks. Returns the result, or `None` when the id is unknown or
    /// already settled (results are delivered at most once).
    pub fn complete(
        &self,
        session_id: &str,
        summary: String,
        turns: u64,
        token_usage: TokenUsage,
        duration_ms: u64,
        opts: CompleteOptions,
    ) -> Option<SubagentResult> {
        let (truncated, completion_type) = completion_meta_for(opts.stop_reason, opts.truncated);
        self.settle(
            session_id,
            SubagentStatus::Completed,
            SubagentResult {
                session_id: session_id.to_owned(),
                success: true,
                summary,
                full_output: opts.full_output,
                turns,
                token_usage,
                duration_ms,
                stop_reason: opts.stop_reason,
                truncated,
                completion_type,
                error: None,
            },
        )
    }

    /// Settle a subagent as failed, keeping whatever metadata the child
    /// accumulated before it died.
    pub fn fail(
        &self,
        session_id: &str,
        error: String,
        opts: FailOptions,
    ) -> Option<SubagentResult> {
        self.settle(
            session_id,
            SubagentStatus::Failed,
            SubagentResult {
                session_id: session_id.to_owned(),
                success: false,
                summary: format!("Subagent failed: {error}"),
                full_output: opts.full_output,
                turns: opts.turns,
                token_usage: opts.token_usage,
                duration_ms: opts.duration_ms,
                stop_reason: Some(StopReason::Error),
                truncated: false,
                completion_type: Some("error"),
                error: Some(error),
            },
        )
    }

    fn settle(
        &self,
        session_id: &str,
        status: SubagentStatus,
        result: SubagentResult,
    ) -> Option<SubagentResult> {
        let tracked = self.records.get(session_id)?.clone();
        {
            let mut record = tracked.record.lock();
            if record.status.is_terminal() {
                return None;
            }
            record.status = status;
            record.result = Some(result.clone());
        }

        self.pending_results.lock().push(result.clone());
        tracked.done.notify_waiters();
        self.settled.notify_waiters();

        if let Some((_, callbacks)) = self.id_callbacks.remove(session_id) {
            for callback in &callbacks {
                invoke_isolated(callback, &result);
            }
        }
        for callback in self.global_callbacks.lock().iter() {
            invoke_isolated(callback, &result);
        }

        Some(result)
    }

    /// Whether a subagent has settled. Unknown ids are vacuously terminated:
    /// an id with no record can never produce a future result.
    #[must_use]
    pub fn is_terminated(&self, session_id: &str) -> bool {
        self.records
            .get(session_id)
            .is_none_or(|tracked| tracked.record.lock().status.is_terminal())
    }

    /// Current status, when the id is known.
    #[must_use]
    pub fn status(&self, session_id: &str) -> Option<SubagentStatus> {
        self.records
            .get(session_id)
            .map(|tracked| tracked.record.lock().status)
    }

    /// Snapshot of one record.
    #[must_use]
    pub fn record(&self, session_id: &str) -> Option<SubagentRecord> {
        self.records
            .get(session_id)
            .map(|tracked| tracked.record.lock().clone())
    }

    /// IDs of subagents that have not settled.
    #[must_use]
    pub fn active_ids(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|entry| !entry.record.lock().status.is_terminal())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Drain the queued results. At-most-once: a second call returns empty
    /// until something new settles.
    #[must_use]
    pub fn consume_pending_results(&self) -> Vec<SubagentResult> {
        std::mem::take(&mut *self.pending_results.lock())
    }

    /// Register a completion callback for one subagent. Fired once, on
    /// settlement; dropped unfired if the id never settles.
    pub fn on_complete(
        &self,
        session_id: &str,
        callback: impl Fn(&SubagentResult) + Send + Sync + 'static,
    ) {
        self.id_callbacks
            .entry(session_id.to_owned())
            .or_default()
            .push(Box::new(callback));
    }

    /// Register a callback fired on every settlement.
    pub fn on_any_complete(&self, callback: impl Fn(&SubagentResult) + Send + Sync + 'static) {
        self.global_callbacks.lock().push(Box::new(callback));
    }

    /// Wait for one subagent to settle.
    ///
    /// Resolves immediately — registering nothing — when the subject is
    /// already terminated (`None` for unknown ids, which have no result).
    /// Otherwise races settlement against the timeout; a timeout yields
    /// `None` and the subagent keeps running.
    pub async fn wait_for(
        &self,
        session_id: &str,
        timeout: Option<Duration>,
    ) -> Option<SubagentResult> {
        let tracked = self.records.get(session_id)?.clone();

        let notified = tracked.done.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        {
            let record = tracked.record.lock();
            if record.status.is_terminal() {
                return record.result.clone();
            }
        }

        match timeout {
            Some(timeout) => {
                if tokio::time::timeout(timeout, notified).await.is_err() {
                    return None;
                }
            }
            None => notified.await,
        }
        tracked.record.lock().result.clone()
    }

    /// Wait for every tracked subagent to settle, bounded by `timeout`.
    /// Returns `true` when all settled; `false` on timeout (never an error).
    pub async fn wait_for_all(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.active_ids().is_empty() {
                return true;
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return self.active_ids().is_empty();
                    }
                }
                None => notified.await,
            }
        }
    }
}

impl Default for SubagentTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SubagentTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubagentTracker")
            .field("tracked", &self.records.len())
            .field("active", &self.active_ids().len())
            .finish()
    }
}

/// Run one callback inside its own failure boundary.
fn invoke_isolated(callback: &ResultCallback, result: &SubagentResult) {
    if std::panic::catch_unwind(AssertUnwindSafe(|| callback(result))).is_err() {
        warn!(
            session_id = %result.session_id,
            "subagent completion callback panicked"
        );
    }
}
