//! Subagent integration.
//!
//! The tracker in `strand-tasks` is storage-agnostic; this module wires its
//! lifecycle into the parent session's event log (`subagent.spawned`,
//! `subagent.completed` / `subagent.failed`, `notification.subagent_result`)
//! and into the outbound notification channel, and formats settled results
//! for injection into the next turn's context.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use strand_events::types::EventType;
use strand_events::types::payloads::{
    SubagentCompletedPayload, SubagentFailedPayload, SubagentSpawnedPayload,
};
use strand_tasks::{SpawnParams, SubagentResult, SubagentTracker};

use crate::emitter::{EventEmitter, Notification};
use crate::errors::{Result, RuntimeError};
use crate::persister::EventPersister;

/// Persist a `subagent.spawned` event and register the child with the
/// tracker. The spawn event ID recorded on the registration is the one just
/// written, so the child's whole lifecycle is traceable from the log.
#[allow(clippy::too_many_arguments)]
pub async fn record_spawn(
    tracker: &SubagentTracker,
    persister: &EventPersister,
    session_id: &str,
    child_session_id: &str,
    spawn_type: &str,
    task: &str,
    model: &str,
    working_directory: &str,
) -> Result<()> {
    let payload = serde_json::to_value(SubagentSpawnedPayload {
        child_session_id: child_session_id.to_owned(),
        spawn_type: spawn_type.to_owned(),
        task: task.to_owned(),
        model: model.to_owned(),
    })
    .map_err(|e| RuntimeError::Persistence(e.to_string()))?;

    let event = persister
        .append(session_id, EventType::SubagentSpawned, payload)
        .await?;

    tracker.spawn(SpawnParams {
        session_id: child_session_id.to_owned(),
        spawn_type: spawn_type.to_owned(),
        task: task.to_owned(),
        model: model.to_owned(),
        working_directory: working_directory.to_owned(),
        spawn_event_id: event.id,
    });
    Ok(())
}

/// Install the global settlement callback: every completion or failure is
/// persisted to the parent session's log and surfaced as a notification.
///
/// Writes are fire-and-forget — settlements happen off the turn's critical
/// path, and the pending-results queue already guarantees delivery to the
/// next turn.
pub fn install_result_notifications(
    tracker: &SubagentTracker,
    persister: Arc<EventPersister>,
    session_id: String,
    emitter: Arc<dyn EventEmitter>,
) {
    tracker.on_any_complete(move |result| {
        debug!(
            child = %result.session_id,
            success = result.success,
            "subagent settled"
        );

        let lifecycle = if result.success {
            serde_json::to_value(SubagentCompletedPayload {
                child_session_id: result.session_id.clone(),
                summary: result.summary.clone(),
                turns: result.turns,
                token_usage: result.token_usage,
                duration_ms: result.duration_ms,
                stop_reason: result.stop_reason,
                truncated: result.truncated,
            })
        } else {
            serde_json::to_value(SubagentFailedPayload {
                child_session_id: result.session_id.clone(),
                error: result.error.clone().unwrap_or_else(|| "unknown".into()),
            })
        };
        let event_type = if result.success {
            EventType::SubagentCompleted
        } else {
            EventType::SubagentFailed
        };

        if let Ok(payload) = lifecycle {
            persister.append_fire_and_forget(&session_id, event_type, payload);
        }
        if let Ok(payload) = serde_json::to_value(result) {
            persister.append_fire_and_forget(
                &session_id,
                EventType::NotificationSubagentResult,
                json!({ "result": payload }),
            );
        }

        emitter.emit(Notification::SubagentSettled {
            session_id: session_id.clone(),
            child_session_id: result.session_id.clone(),
            success: result.success,
        });
    });
}

/// Render settled subagent results as context for the next turn.
///
/// Empty input yields `None`, never an empty string.
#[must_use]
pub fn format_subagent_results(results: &[SubagentResult]) -> Option<String> {
    if results.is_empty() {
        return None;
    }
    let mut out = String::from("Results from completed subagent tasks:\n");
    for result in results {
        let status = if result.success { "completed" } else { "failed" };
        out.push_str(&format!(
            "- [{}] {status}: {}\n",
            result.session_id, result.summary
        ));
        if result.truncated {
            out.push_str("  (output was truncated)\n");
        }
    }
    Some(out)
}
