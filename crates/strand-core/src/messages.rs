//! Conversation message types.
//!
//! Messages are the materialized view of a session's event log and the
//! input to the model streaming collaborator. Three roles: user, assistant,
//! and tool result.

use serde::{Deserialize, Serialize};

use crate::content::{AssistantContent, UserContent};
use crate::usage::{StopReason, TokenUsage};

/// Content of a user message: a bare string for plain prompts, or an
/// ordered block sequence when attachments are present.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserMessageContent {
    /// Plain text prompt.
    Text(String),
    /// Ordered text/image/document blocks.
    Blocks(Vec<UserContent>),
}

impl UserMessageContent {
    /// The concatenated visible text of this content.
    #[must_use]
    pub fn visible_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    UserContent::Text { text } => Some(text.as_str()),
                    UserContent::Image { .. } | UserContent::Document { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// One entry in a session's message list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// A user prompt.
    User {
        /// Prompt text or block sequence.
        content: UserMessageContent,
    },
    /// A model response.
    Assistant {
        /// Response blocks (text, thinking, tool uses).
        content: Vec<AssistantContent>,
        /// Why the response ended.
        #[serde(rename = "stopReason", skip_serializing_if = "Option::is_none")]
        stop_reason: Option<StopReason>,
        /// API-reported usage for this response.
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
    /// The result of one tool invocation.
    ToolResult {
        /// ID of the tool call this result answers.
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        /// Result text.
        content: String,
        /// Whether the tool errored.
        #[serde(rename = "isError", default)]
        is_error: bool,
    },
}

impl Message {
    /// Build a plain-text user message.
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::User {
            content: UserMessageContent::Text(text.into()),
        }
    }

    /// Build a text-only assistant message with no metadata.
    #[must_use]
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: vec![AssistantContent::Text { text: text.into() }],
            stop_reason: None,
            usage: None,
        }
    }

    /// IDs of tool-use blocks in this message (empty for non-assistant roles).
    #[must_use]
    pub fn tool_use_ids(&self) -> Vec<&str> {
        match self {
            Self::Assistant { content, .. } => content
                .iter()
                .filter_map(|b| match b {
                    AssistantContent::ToolUse { id, .. } => Some(id.as_str()),
                    AssistantContent::Text { .. } | AssistantContent::Thinking { .. } => None,
                })
                .collect(),
            Self::User { .. } | Self::ToolResult { .. } => Vec::new(),
        }
    }

    /// Approximate character length of the visible content, used for
    /// token estimation.
    #[must_use]
    pub fn content_len(&self) -> usize {
        match self {
            Self::User { content } => content.visible_text().len(),
            Self::Assistant { content, .. } => content
                .iter()
                .map(|b| match b {
                    AssistantContent::Text { text } => text.len(),
                    AssistantContent::Thinking { thinking, .. } => thinking.len(),
                    AssistantContent::ToolUse { arguments, .. } => {
                        serde_json::to_string(arguments).map_or(0, |s| s.len())
                    }
                })
                .sum(),
            Self::ToolResult { content, .. } => content.len(),
        }
    }
}

/// An attachment supplied with a prompt, before conversion to content blocks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Base64-encoded payload.
    pub data: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// Original file name, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl Attachment {
    /// Whether the declared MIME type is in the `image/*` family.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}
