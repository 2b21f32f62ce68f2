//! Replay: fold an ancestor chain into a session's materialized view.
//!
//! The core consistency invariant lives here: a session's visible state is
//! always a deterministic function of its event log. Reconstruction runs in
//! two passes. The first collects metadata that is immune to context resets
//! (deleted message ids, the last persisted reasoning level, durable token
//! and turn counters). The second folds the message view, honoring
//! compaction boundaries, context clears, soft deletions, and interrupted
//! turns.
//!
//! Reset policy: `compact.boundary` and `context.cleared` reset transient
//! conversational state (the message list), but never the durable counters
//! or the reasoning level. The reasoning level is session configuration,
//! not conversational content; the asymmetry is deliberate.

use std::collections::HashSet;

use strand_core::constants::{
    COMPACTION_ACK_TEXT, COMPACTION_SUMMARY_PREFIX, INTERRUPTED_TOOL_RESULT_TEXT,
};
use strand_core::{Message, ReasoningLevel, TokenUsage, UserContent, UserMessageContent};

use crate::types::{Event, EventType, TypedPayload};

/// A session's reconstructed state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionView {
    /// The live message list, provider-valid (every tool use answered).
    pub messages: Vec<Message>,
    /// Last persisted reasoning level; survives compaction.
    pub reasoning_level: Option<ReasoningLevel>,
    /// Accumulated API-reported usage; survives compaction.
    pub token_usage: TokenUsage,
    /// Total user turns, including turns hidden by compaction or deletion.
    pub turn_count: u64,
    /// Whether the most recent turn was interrupted.
    pub was_interrupted: bool,
}

/// Fold an event chain (ordered root→head) into a [`SessionView`].
///
/// Events with payloads that fail to parse are skipped with a warning
/// rather than poisoning the whole replay.
#[must_use]
pub fn reconstruct(events: &[Event]) -> SessionView {
    let metadata = collect_metadata(events);
    let messages = build_messages(events, &metadata.deleted_event_ids);

    SessionView {
        messages,
        reasoning_level: metadata.reasoning_level,
        token_usage: metadata.token_usage,
        turn_count: metadata.turn_count,
        was_interrupted: metadata.was_interrupted,
    }
}

struct Metadata {
    deleted_event_ids: HashSet<String>,
    reasoning_level: Option<ReasoningLevel>,
    token_usage: TokenUsage,
    turn_count: u64,
    was_interrupted: bool,
}

/// First pass: metadata that context resets never touch.
fn collect_metadata(events: &[Event]) -> Metadata {
    let mut deleted_event_ids = HashSet::new();
    let mut reasoning_level = None;
    let mut token_usage = TokenUsage::default();
    let mut turn_count = 0;
    let mut was_interrupted = false;

    for event in events {
        match event.event_type {
            EventType::MessageDeleted => {
                if let Ok(TypedPayload::MessageDeleted(payload)) = event.typed_payload() {
                    let _ = deleted_event_ids.insert(payload.target_event_id);
                }
            }
            EventType::ConfigReasoningLevel => {
                if let Ok(TypedPayload::ConfigReasoningLevel(payload)) = event.typed_payload() {
                    reasoning_level = Some(payload.new);
                }
            }
            EventType::MessageAssistant => {
                if let Ok(TypedPayload::MessageAssistant(payload)) = event.typed_payload() {
                    if let Some(usage) = payload.token_usage {
                        token_usage.add(&usage);
                    }
                }
            }
            EventType::MessageUser => {
                turn_count += 1;
                was_interrupted = false;
            }
            EventType::NotificationInterrupted => {
                was_interrupted = true;
            }
            _ => {}
        }
    }

    Metadata {
        deleted_event_ids,
        reasoning_level,
        token_usage,
        turn_count,
        was_interrupted,
    }
}

/// Second pass: the message view.
fn build_messages(events: &[Event], deleted: &HashSet<String>) -> Vec<Message> {
    let mut messages: Vec<Message> = Vec::new();

    for event in events {
        if deleted.contains(&event.id) {
            continue;
        }
        match event.event_type {
            EventType::MessageUser => match event.typed_payload() {
                Ok(TypedPayload::MessageUser(payload)) => {
                    push_user_message(&mut messages, payload.content);
                }
                _ => warn_skipped(event),
            },
            EventType::MessageAssistant => match event.typed_payload() {
                Ok(TypedPayload::MessageAssistant(payload)) => {
                    if payload.content.is_empty() {
                        continue;
                    }
                    messages.push(Message::Assistant {
                        content: payload.content,
                        stop_reason: payload.stop_reason,
                        usage: payload.token_usage,
                    });
                }
                _ => warn_skipped(event),
            },
            EventType::ToolResult => match event.typed_payload() {
                Ok(TypedPayload::ToolResult(payload)) => {
                    messages.push(Message::ToolResult {
                        tool_call_id: payload.tool_call_id,
                        content: payload.content,
                        is_error: payload.is_error,
                    });
                }
                _ => warn_skipped(event),
            },
            EventType::CompactBoundary | EventType::ContextCleared => {
                messages.clear();
            }
            EventType::CompactSummary => match event.typed_payload() {
                Ok(TypedPayload::CompactSummary(payload)) => {
                    messages.clear();
                    messages.push(Message::user_text(format!(
                        "{COMPACTION_SUMMARY_PREFIX}\n\n{}",
                        payload.summary
                    )));
                    messages.push(Message::assistant_text(COMPACTION_ACK_TEXT));
                    messages.extend(payload.preserved);
                }
                _ => warn_skipped(event),
            },
            _ => {}
        }
    }

    drop_orphan_tool_results(&mut messages);
    inject_missing_tool_results(&mut messages);
    messages
}

/// Append a user message, merging into a directly preceding user message so
/// the view never holds two user entries in a row.
fn push_user_message(messages: &mut Vec<Message>, content: UserMessageContent) {
    if let Some(Message::User { content: previous }) = messages.last_mut() {
        *previous = merge_user_content(previous.clone(), content);
        return;
    }
    messages.push(Message::User { content });
}

fn merge_user_content(a: UserMessageContent, b: UserMessageContent) -> UserMessageContent {
    match (a, b) {
        (UserMessageContent::Text(first), UserMessageContent::Text(second)) => {
            UserMessageContent::Text(format!("{first}\n\n{second}"))
        }
        (a, b) => {
            let mut blocks = into_blocks(a);
            blocks.extend(into_blocks(b));
            UserMessageContent::Blocks(blocks)
        }
    }
}

fn into_blocks(content: UserMessageContent) -> Vec<UserContent> {
    match content {
        UserMessageContent::Text(text) => vec![UserContent::Text { text }],
        UserMessageContent::Blocks(blocks) => blocks,
    }
}

/// Remove tool results whose originating tool use is no longer in the view
/// (e.g. the assistant message was deleted).
fn drop_orphan_tool_results(messages: &mut Vec<Message>) {
    let mut known_tool_ids: HashSet<String> = HashSet::new();
    let mut kept = Vec::with_capacity(messages.len());
    for message in messages.drain(..) {
        match &message {
            Message::Assistant { .. } => {
                for id in message.tool_use_ids() {
                    let _ = known_tool_ids.insert(id.to_owned());
                }
                kept.push(message);
            }
            Message::ToolResult { tool_call_id, .. } => {
                if known_tool_ids.contains(tool_call_id) {
                    kept.push(message);
                }
            }
            Message::User { .. } => kept.push(message),
        }
    }
    *messages = kept;
}

/// Insert synthetic error results for tool uses that never settled, so the
/// replayed view is always provider-valid.
fn inject_missing_tool_results(messages: &mut Vec<Message>) {
    let answered: HashSet<String> = messages
        .iter()
        .filter_map(|m| match m {
            Message::ToolResult { tool_call_id, .. } => Some(tool_call_id.clone()),
            Message::User { .. } | Message::Assistant { .. } => None,
        })
        .collect();

    let mut index = 0;
    while index < messages.len() {
        let missing: Vec<String> = messages[index]
            .tool_use_ids()
            .into_iter()
            .filter(|id| !answered.contains(*id))
            .map(str::to_owned)
            .collect();

        // Insert after the assistant message and any results already there.
        let mut insert_at = index + 1;
        while insert_at < messages.len()
            && matches!(messages[insert_at], Message::ToolResult { .. })
        {
            insert_at += 1;
        }
        for (offset, tool_call_id) in missing.into_iter().enumerate() {
            messages.insert(
                insert_at + offset,
                Message::ToolResult {
                    tool_call_id,
                    content: INTERRUPTED_TOOL_RESULT_TEXT.to_owned(),
                    is_error: true,
                },
            );
        }
        index += 1;
    }
}

fn warn_skipped(event: &Event) {
    tracing::warn!(
        event_id = %event.id,
        event_type = %event.event_type,
        "skipping event with malformed payload during replay"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use strand_core::AssistantContent;

    fn ev(seq: i64, event_type: EventType, payload: Value) -> Event {
        Event {
            id: format!("evt_{seq}"),
            parent_id: (seq > 0).then(|| format!("evt_{}", seq - 1)),
            session_id: "ses_test".into(),
            timestamp: "2026-01-01T00:00:00.000Z".into(),
            event_type,
            sequence: seq,
            checksum: String::new(),
            payload,
        }
    }

    fn user(seq: i64, text: &str) -> Event {
        ev(seq, EventType::MessageUser, json!({"content": text}))
    }

    fn assistant(seq: i64, text: &str) -> Event {
        ev(
            seq,
            EventType::MessageAssistant,
            json!({
                "content": [{"type": "text", "text": text}],
                "stopReason": "end_turn",
                "tokenUsage": {"inputTokens": 10, "outputTokens": 5}
            }),
        )
    }

    fn assistant_with_tool(seq: i64, tool_id: &str) -> Event {
        ev(
            seq,
            EventType::MessageAssistant,
            json!({
                "content": [
                    {"type": "text", "text": "running a tool"},
                    {"type": "tool_use", "id": tool_id, "name": "bash", "arguments": {}}
                ],
                "stopReason": "tool_use"
            }),
        )
    }

    fn tool_result(seq: i64, tool_id: &str, content: &str) -> Event {
        ev(
            seq,
            EventType::ToolResult,
            json!({"toolCallId": tool_id, "content": content}),
        )
    }

    #[test]
    fn empty_chain_gives_default_view() {
        assert_eq!(reconstruct(&[]), SessionView::default());
    }

    #[test]
    fn simple_conversation_folds_in_order() {
        let events = vec![
            ev(0, EventType::SessionStart, json!({"model": "m", "workingDirectory": "/tmp"})),
            user(1, "hello"),
            assistant(2, "hi there"),
            user(3, "thanks"),
        ];
        let view = reconstruct(&events);
        assert_eq!(view.messages.len(), 3);
        assert_eq!(view.messages[0], Message::user_text("hello"));
        assert_eq!(view.turn_count, 2);
        assert_eq!(view.token_usage.input_tokens, 10);
    }

    #[test]
    fn replay_is_deterministic() {
        let events = vec![
            user(0, "a"),
            assistant_with_tool(1, "tcl_1"),
            tool_result(2, "tcl_1", "ok"),
            ev(3, EventType::CompactBoundary, json!({})),
            ev(
                4,
                EventType::CompactSummary,
                json!({
                    "summary": "we ran a tool",
                    "preserved": [{"role": "user", "content": "a"}],
                    "tokensBefore": 100,
                    "tokensAfter": 40
                }),
            ),
            user(5, "b"),
        ];
        assert_eq!(reconstruct(&events), reconstruct(&events));
    }

    #[test]
    fn consecutive_user_messages_merge() {
        let events = vec![user(0, "first"), user(1, "second")];
        let view = reconstruct(&events);
        assert_eq!(view.messages.len(), 1);
        assert_eq!(
            view.messages[0],
            Message::user_text("first\n\nsecond")
        );
        assert_eq!(view.turn_count, 2, "merging does not undo the turn counter");
    }

    #[test]
    fn merge_with_blocks_produces_blocks() {
        let events = vec![
            user(0, "look at this"),
            ev(
                1,
                EventType::MessageUser,
                json!({"content": [{"type": "image", "data": "aGk=", "mimeType": "image/png"}]}),
            ),
        ];
        let view = reconstruct(&events);
        assert_eq!(view.messages.len(), 1);
        match &view.messages[0] {
            Message::User {
                content: UserMessageContent::Blocks(blocks),
            } => assert_eq!(blocks.len(), 2),
            other => panic!("expected merged block content, got {other:?}"),
        }
    }

    #[test]
    fn deleted_messages_are_hidden() {
        let mut events = vec![user(0, "keep"), user(1, "hide me")];
        // merging would kick in, so interleave an assistant message
        events.insert(1, assistant(2, "ok"));
        events.push(ev(
            3,
            EventType::MessageDeleted,
            json!({"targetEventId": "evt_1"}),
        ));
        let view = reconstruct(&events);
        assert_eq!(view.messages.len(), 2);
        assert!(!view
            .messages
            .iter()
            .any(|m| matches!(m, Message::User { content } if content.visible_text() == "hide me")));
        assert_eq!(view.turn_count, 2, "deletion hides content, not history");
    }

    #[test]
    fn deleting_assistant_drops_orphaned_tool_results() {
        let events = vec![
            user(0, "go"),
            assistant_with_tool(1, "tcl_1"),
            tool_result(2, "tcl_1", "output"),
            ev(3, EventType::MessageDeleted, json!({"targetEventId": "evt_1"})),
        ];
        let view = reconstruct(&events);
        assert_eq!(view.messages.len(), 1, "only the user message survives");
    }

    #[test]
    fn compact_summary_rebuilds_synthetic_pair_and_tail() {
        let events = vec![
            user(0, "old question"),
            assistant(1, "old answer"),
            ev(2, EventType::CompactBoundary, json!({})),
            ev(
                3,
                EventType::CompactSummary,
                json!({
                    "summary": "user asked an old question",
                    "preserved": [
                        {"role": "user", "content": "recent"},
                        {"role": "assistant", "content": [{"type": "text", "text": "reply"}]}
                    ],
                    "tokensBefore": 500,
                    "tokensAfter": 120
                }),
            ),
        ];
        let view = reconstruct(&events);
        assert_eq!(view.messages.len(), 4);
        match &view.messages[0] {
            Message::User { content } => {
                let text = content.visible_text();
                assert!(text.starts_with(COMPACTION_SUMMARY_PREFIX));
                assert!(text.contains("user asked an old question"));
            }
            other => panic!("expected synthetic user summary, got {other:?}"),
        }
        assert_eq!(view.messages[1], Message::assistant_text(COMPACTION_ACK_TEXT));
        assert_eq!(view.messages[2], Message::user_text("recent"));
    }

    #[test]
    fn context_cleared_resets_messages_only() {
        let events = vec![
            ev(
                0,
                EventType::ConfigReasoningLevel,
                json!({"new": "high"}),
            ),
            user(1, "before clear"),
            assistant(2, "answer"),
            ev(3, EventType::ContextCleared, json!({})),
            user(4, "after clear"),
        ];
        let view = reconstruct(&events);
        assert_eq!(view.messages.len(), 1);
        assert_eq!(view.reasoning_level, Some(ReasoningLevel::High));
        assert_eq!(view.token_usage.input_tokens, 10, "durable counters survive");
        assert_eq!(view.turn_count, 2);
    }

    #[test]
    fn reasoning_level_survives_compaction_and_is_last_wins() {
        let events = vec![
            ev(0, EventType::ConfigReasoningLevel, json!({"new": "low"})),
            user(1, "q"),
            ev(
                2,
                EventType::ConfigReasoningLevel,
                json!({"previous": "low", "new": "medium"}),
            ),
            ev(3, EventType::CompactBoundary, json!({})),
            ev(
                4,
                EventType::CompactSummary,
                json!({"summary": "s", "preserved": [], "tokensBefore": 10, "tokensAfter": 5}),
            ),
        ];
        let view = reconstruct(&events);
        assert_eq!(view.reasoning_level, Some(ReasoningLevel::Medium));
    }

    #[test]
    fn missing_tool_results_get_synthetic_errors() {
        let events = vec![user(0, "go"), assistant_with_tool(1, "tcl_lost")];
        let view = reconstruct(&events);
        assert_eq!(view.messages.len(), 3);
        assert_eq!(
            view.messages[2],
            Message::ToolResult {
                tool_call_id: "tcl_lost".into(),
                content: INTERRUPTED_TOOL_RESULT_TEXT.into(),
                is_error: true,
            }
        );
    }

    #[test]
    fn synthetic_results_insert_after_existing_ones() {
        let events = vec![
            ev(
                0,
                EventType::MessageAssistant,
                json!({
                    "content": [
                        {"type": "tool_use", "id": "tcl_a", "name": "bash", "arguments": {}},
                        {"type": "tool_use", "id": "tcl_b", "name": "bash", "arguments": {}}
                    ],
                    "stopReason": "tool_use"
                }),
            ),
            tool_result(1, "tcl_a", "finished"),
        ];
        let view = reconstruct(&events);
        assert_eq!(view.messages.len(), 3);
        match &view.messages[1] {
            Message::ToolResult { tool_call_id, is_error, .. } => {
                assert_eq!(tool_call_id, "tcl_a");
                assert!(!is_error);
            }
            other => panic!("expected real result first, got {other:?}"),
        }
        match &view.messages[2] {
            Message::ToolResult { tool_call_id, is_error, .. } => {
                assert_eq!(tool_call_id, "tcl_b");
                assert!(*is_error);
            }
            other => panic!("expected synthetic result last, got {other:?}"),
        }
    }

    #[test]
    fn interrupted_flag_clears_on_next_user_turn() {
        let interrupted = vec![
            user(0, "q"),
            ev(1, EventType::NotificationInterrupted, json!({"turn": 1})),
        ];
        assert!(reconstruct(&interrupted).was_interrupted);

        let resumed = vec![
            user(0, "q"),
            ev(1, EventType::NotificationInterrupted, json!({"turn": 1})),
            user(2, "try again"),
        ];
        assert!(!reconstruct(&resumed).was_interrupted);
    }

    #[test]
    fn empty_interrupted_assistant_content_is_skipped() {
        let events = vec![
            user(0, "q"),
            ev(
                1,
                EventType::MessageAssistant,
                json!({"content": [], "stopReason": "interrupted", "interrupted": true}),
            ),
        ];
        let view = reconstruct(&events);
        assert_eq!(view.messages.len(), 1);
    }

    #[test]
    fn malformed_payloads_are_skipped_not_fatal() {
        let events = vec![
            user(0, "fine"),
            ev(1, EventType::ToolResult, json!({"wrong": "shape"})),
            assistant(2, "still here"),
        ];
        let view = reconstruct(&events);
        assert_eq!(view.messages.len(), 2);
    }
}
