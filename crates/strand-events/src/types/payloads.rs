//! Typed payload views.
//!
//! Payloads are stored as JSON; these structs give each tag its declared
//! shape. [`TypedPayload::from_event`] dispatches on the tag. Tags whose
//! payload is empty or free-form (`stream.*`, `compact.boundary`,
//! `context.cleared`, `session.end`) stay raw.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use strand_core::{AssistantContent, Message, ReasoningLevel, StopReason, TokenUsage, UserMessageContent};

use super::event_type::EventType;
use crate::errors::Result;

/// Payload of `session.start`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartPayload {
    /// Model the session was created with.
    pub model: String,
    /// Working directory of the session.
    pub working_directory: String,
    /// Optional human-readable title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Payload of `session.fork`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionForkPayload {
    /// Session the fork branched from.
    pub forked_from_session_id: String,
    /// Event in the source chain the fork branched at.
    pub forked_from_event_id: String,
    /// Optional title for the forked session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Payload of `message.user`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageUserPayload {
    /// Prompt text or block sequence.
    pub content: UserMessageContent,
    /// Skill references attached to this turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skill_refs: Vec<String>,
    /// Spell references attached to this turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spell_refs: Vec<String>,
}

/// Payload of `message.assistant`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAssistantPayload {
    /// Response blocks.
    pub content: Vec<AssistantContent>,
    /// Why the response ended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    /// API-reported usage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    /// Turn number within the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn: Option<u64>,
    /// Whether this message is partial content from an interrupted turn.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub interrupted: bool,
}

/// Payload of `message.deleted`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeletedPayload {
    /// The message event being hidden from the reconstructed view.
    pub target_event_id: String,
}

/// Payload of `tool.call`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallPayload {
    /// Tool call ID (matches the assistant message's tool-use block).
    pub tool_call_id: String,
    /// Tool name.
    pub name: String,
    /// Tool arguments.
    pub arguments: Map<String, Value>,
}

/// Payload of `tool.result`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultPayload {
    /// Tool call this result answers.
    pub tool_call_id: String,
    /// Result text.
    pub content: String,
    /// Whether the tool errored.
    #[serde(default)]
    pub is_error: bool,
}

/// Payload of `subagent.spawned`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentSpawnedPayload {
    /// Child session ID.
    pub child_session_id: String,
    /// How the subagent was spawned.
    pub spawn_type: String,
    /// Delegated task description.
    pub task: String,
    /// Model the child runs on.
    pub model: String,
}

/// Payload of `subagent.completed`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentCompletedPayload {
    /// Child session ID.
    pub child_session_id: String,
    /// Result summary.
    pub summary: String,
    /// Turns the child consumed.
    pub turns: u64,
    /// Child token usage.
    pub token_usage: TokenUsage,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// Child's final stop reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    /// Whether the child's output was truncated.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

/// Payload of `subagent.failed`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentFailedPayload {
    /// Child session ID.
    pub child_session_id: String,
    /// Failure description.
    pub error: String,
}

/// Payload of `compact.summary`.
///
/// Carries everything replay needs to rebuild the post-compaction view
/// without consulting any other store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactSummaryPayload {
    /// Generated (or human-edited) summary text, without the wrapper prefix.
    pub summary: String,
    /// The preserved message tail, in original order.
    pub preserved: Vec<Message>,
    /// Estimated tokens before compaction.
    pub tokens_before: u64,
    /// Estimated tokens after compaction.
    pub tokens_after: u64,
}

/// Payload of `config.reasoning_level`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigReasoningLevelPayload {
    /// The level before the change, when one was persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<ReasoningLevel>,
    /// The level after the change.
    pub new: ReasoningLevel,
}

/// Payload of `error.agent`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorAgentPayload {
    /// Error description.
    pub error: String,
    /// Whether the session can continue past this error.
    pub recoverable: bool,
}

/// Payload of `notification.interrupted`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationInterruptedPayload {
    /// Turn number that was interrupted.
    pub turn: u64,
}

/// Typed view of an event payload, dispatched on the event tag.
#[derive(Clone, Debug, PartialEq)]
pub enum TypedPayload {
    /// `session.start`
    SessionStart(SessionStartPayload),
    /// `session.fork`
    SessionFork(SessionForkPayload),
    /// `message.user`
    MessageUser(MessageUserPayload),
    /// `message.assistant`
    MessageAssistant(MessageAssistantPayload),
    /// `message.deleted`
    MessageDeleted(MessageDeletedPayload),
    /// `tool.call`
    ToolCall(ToolCallPayload),
    /// `tool.result`
    ToolResult(ToolResultPayload),
    /// `subagent.spawned`
    SubagentSpawned(SubagentSpawnedPayload),
    /// `subagent.completed`
    SubagentCompleted(SubagentCompletedPayload),
    /// `subagent.failed`
    SubagentFailed(SubagentFailedPayload),
    /// `compact.summary`
    CompactSummary(CompactSummaryPayload),
    /// `config.reasoning_level`
    ConfigReasoningLevel(ConfigReasoningLevelPayload),
    /// `error.agent`
    ErrorAgent(ErrorAgentPayload),
    /// `notification.interrupted`
    NotificationInterrupted(NotificationInterruptedPayload),
    /// Tags with empty or free-form payloads.
    Raw(Value),
}

impl TypedPayload {
    /// Deserialize a payload according to its tag.
    pub fn from_event(event_type: EventType, payload: &Value) -> Result<Self> {
        let typed = match event_type {
            EventType::SessionStart => {
                Self::SessionStart(serde_json::from_value(payload.clone())?)
            }
            EventType::SessionFork => Self::SessionFork(serde_json::from_value(payload.clone())?),
            EventType::MessageUser => Self::MessageUser(serde_json::from_value(payload.clone())?),
            EventType::MessageAssistant => {
                Self::MessageAssistant(serde_json::from_value(payload.clone())?)
            }
            EventType::MessageDeleted => {
                Self::MessageDeleted(serde_json::from_value(payload.clone())?)
            }
            EventType::ToolCall => Self::ToolCall(serde_json::from_value(payload.clone())?),
            EventType::ToolResult => Self::ToolResult(serde_json::from_value(payload.clone())?),
            EventType::SubagentSpawned => {
                Self::SubagentSpawned(serde_json::from_value(payload.clone())?)
            }
            EventType::SubagentCompleted => {
                Self::SubagentCompleted(serde_json::from_value(payload.clone())?)
            }
            EventType::SubagentFailed => {
                Self::SubagentFailed(serde_json::from_value(payload.clone())?)
            }
            EventType::CompactSummary => {
                Self::CompactSummary(serde_json::from_value(payload.clone())?)
            }
            EventType::ConfigReasoningLevel => {
                Self::ConfigReasoningLevel(serde_json::from_value(payload.clone())?)
            }
            EventType::ErrorAgent => Self::ErrorAgent(serde_json::from_value(payload.clone())?),
            EventType::NotificationInterrupted => {
                Self::NotificationInterrupted(serde_json::from_value(payload.clone())?)
            }
            EventType::SessionEnd
            | EventType::CompactBoundary
            | EventType::ContextCleared
            | EventType::NotificationSubagentResult
            | EventType::StreamTurnStart
            | EventType::StreamTurnEnd => Self::Raw(payload.clone()),
        };
        Ok(typed)
    }
}
