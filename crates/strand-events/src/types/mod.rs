//! Event types, the event row, and typed payload views.

pub mod event;
pub mod event_type;
pub mod payloads;

pub use event::Event;
pub use event_type::{ALL_EVENT_TYPES, EventType};
pub use payloads::{
    CompactSummaryPayload, ConfigReasoningLevelPayload, ErrorAgentPayload, MessageAssistantPayload,
    MessageDeletedPayload, MessageUserPayload, NotificationInterruptedPayload,
    SessionForkPayload, SessionStartPayload, SubagentCompletedPayload, SubagentFailedPayload,
    SubagentSpawnedPayload, ToolCallPayload, ToolResultPayload, TypedPayload,
};
