//! Content block types.
//!
//! The primitive building blocks that appear inside messages. User and
//! assistant messages carry different block vocabularies, so the enums are
//! kept separate rather than unified under one catch-all type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Content that can appear in user messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserContent {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Image (base64-encoded).
    Image {
        /// Base64-encoded image data.
        data: String,
        /// MIME type, e.g. `image/png`.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Document (base64-encoded PDFs and other non-image attachments).
    Document {
        /// Base64-encoded document data.
        data: String,
        /// MIME type, e.g. `application/pdf`.
        #[serde(rename = "mimeType")]
        mime_type: String,
        /// Original file name, when known.
        #[serde(rename = "fileName", skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
    },
}

/// Content that can appear in assistant messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantContent {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Extended thinking.
    Thinking {
        /// The thinking text.
        thinking: String,
        /// Verification signature.
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// A tool invocation emitted by the model.
    ToolUse {
        /// Tool call ID.
        id: String,
        /// Tool name.
        name: String,
        /// Tool arguments (JSON object).
        arguments: Map<String, Value>,
    },
}

impl AssistantContent {
    /// The visible text of this block, if it has any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Thinking { .. } | Self::ToolUse { .. } => None,
        }
    }

    /// Whether this block is a tool invocation.
    #[must_use]
    pub fn is_tool_use(&self) -> bool {
        matches!(self, Self::ToolUse { .. })
    }
}

/// Content that can appear in tool result messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResultContent {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Image produced by a tool (base64-encoded).
    Image {
        /// Base64-encoded image data.
        data: String,
        /// MIME type.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}
