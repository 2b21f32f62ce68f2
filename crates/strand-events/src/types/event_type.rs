//! The closed event-type tag set.
//!
//! Every persisted event carries exactly one of these tags, and the tag
//! fully determines the payload shape. New behaviors get new tags; existing
//! tags never change meaning.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::EventError;

/// Typed tag of a persisted event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Root event of a freshly created session.
    #[serde(rename = "session.start")]
    SessionStart,
    /// Session ended; no further events expected.
    #[serde(rename = "session.end")]
    SessionEnd,
    /// Root event of a forked session; `parent_id` points into the source
    /// session's chain.
    #[serde(rename = "session.fork")]
    SessionFork,

    /// A user prompt.
    #[serde(rename = "message.user")]
    MessageUser,
    /// A model response (text, thinking, tool uses).
    #[serde(rename = "message.assistant")]
    MessageAssistant,
    /// Soft deletion of an earlier message (history stays immutable).
    #[serde(rename = "message.deleted")]
    MessageDeleted,

    /// A tool invocation is about to execute.
    #[serde(rename = "tool.call")]
    ToolCall,
    /// A tool invocation settled.
    #[serde(rename = "tool.result")]
    ToolResult,

    /// A child session was spawned for a delegated task.
    #[serde(rename = "subagent.spawned")]
    SubagentSpawned,
    /// A spawned child session finished successfully.
    #[serde(rename = "subagent.completed")]
    SubagentCompleted,
    /// A spawned child session failed.
    #[serde(rename = "subagent.failed")]
    SubagentFailed,

    /// Marker written when compaction replaced the live message view.
    #[serde(rename = "compact.boundary")]
    CompactBoundary,
    /// The generated summary plus the preserved message tail.
    #[serde(rename = "compact.summary")]
    CompactSummary,
    /// The live message view was cleared without summarizing.
    #[serde(rename = "context.cleared")]
    ContextCleared,

    /// The session's reasoning level changed.
    #[serde(rename = "config.reasoning_level")]
    ConfigReasoningLevel,

    /// A turn failed with an agent-level error.
    #[serde(rename = "error.agent")]
    ErrorAgent,

    /// A turn was interrupted by the user.
    #[serde(rename = "notification.interrupted")]
    NotificationInterrupted,
    /// A subagent result is available for the next parent turn.
    #[serde(rename = "notification.subagent_result")]
    NotificationSubagentResult,

    /// A turn started streaming.
    #[serde(rename = "stream.turn_start")]
    StreamTurnStart,
    /// A turn finished streaming.
    #[serde(rename = "stream.turn_end")]
    StreamTurnEnd,
}

/// Every member of the tag set, for exhaustive iteration in migrations and
/// tests.
pub const ALL_EVENT_TYPES: &[EventType] = &[
    EventType::SessionStart,
    EventType::SessionEnd,
    EventType::SessionFork,
    EventType::MessageUser,
    EventType::MessageAssistant,
    EventType::MessageDeleted,
    EventType::ToolCall,
    EventType::ToolResult,
    EventType::SubagentSpawned,
    EventType::SubagentCompleted,
    EventType::SubagentFailed,
    EventType::CompactBoundary,
    EventType::CompactSummary,
    EventType::ContextCleared,
    EventType::ConfigReasoningLevel,
    EventType::ErrorAgent,
    EventType::NotificationInterrupted,
    EventType::NotificationSubagentResult,
    EventType::StreamTurnStart,
    EventType::StreamTurnEnd,
];

impl EventType {
    /// The wire tag for this type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionStart => "session.start",
            Self::SessionEnd => "session.end",
            Self::SessionFork => "session.fork",
            Self::MessageUser => "message.user",
            Self::MessageAssistant => "message.assistant",
            Self::MessageDeleted => "message.deleted",
            Self::ToolCall => "tool.call",
            Self::ToolResult => "tool.result",
            Self::SubagentSpawned => "subagent.spawned",
            Self::SubagentCompleted => "subagent.completed",
            Self::SubagentFailed => "subagent.failed",
            Self::CompactBoundary => "compact.boundary",
            Self::CompactSummary => "compact.summary",
            Self::ContextCleared => "context.cleared",
            Self::ConfigReasoningLevel => "config.reasoning_level",
            Self::ErrorAgent => "error.agent",
            Self::NotificationInterrupted => "notification.interrupted",
            Self::NotificationSubagentResult => "notification.subagent_result",
            Self::StreamTurnStart => "stream.turn_start",
            Self::StreamTurnEnd => "stream.turn_end",
        }
    }

    /// The domain prefix of the tag (the part before the first dot).
    #[must_use]
    pub fn domain(&self) -> &'static str {
        let tag = self.as_str();
        tag.split_once('.').map_or(tag, |(domain, _)| domain)
    }

    /// Whether this event contributes to the conversation message view.
    #[must_use]
    pub fn is_message_type(&self) -> bool {
        matches!(
            self,
            Self::MessageUser | Self::MessageAssistant | Self::ToolResult
        )
    }

    /// Whether this event marks a session lifecycle boundary.
    #[must_use]
    pub fn is_lifecycle_type(&self) -> bool {
        matches!(self, Self::SessionStart | Self::SessionEnd | Self::SessionFork)
    }

    /// Whether replay resets transient conversational state at this event.
    #[must_use]
    pub fn is_context_reset(&self) -> bool {
        matches!(self, Self::CompactBoundary | Self::ContextCleared)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_owned()))
            .map_err(|_| EventError::UnknownEventType(s.to_owned()))
    }
}
