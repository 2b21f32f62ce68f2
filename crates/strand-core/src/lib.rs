//! # strand-core
//!
//! Foundation types shared by every Strand crate: branded IDs, content
//! blocks, conversation messages, token accounting, and the small enums
//! (stop reasons, reasoning levels) that cross crate boundaries.
//!
//! This crate has no runtime dependencies beyond serde; everything here is
//! plain data.

pub mod constants;
pub mod content;
pub mod errors;
pub mod ids;
pub mod messages;
pub mod usage;

pub use content::{AssistantContent, ToolResultContent, UserContent};
pub use errors::CoreError;
pub use ids::{EventId, SessionId, ToolCallId, WorkspaceId};
pub use messages::{Attachment, Message, UserMessageContent};
pub use usage::{ReasoningLevel, StopReason, TokenUsage};
