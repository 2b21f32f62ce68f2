//! Turn content tracking.
//!
//! The model streaming collaborator pushes deltas here as they arrive; the
//! engine reads settled content back out when it persists. Two buffers:
//! content accumulated across the whole run, and content for the current
//! turn only. The per-turn `pre_tool_flushed` flag records that the turn's
//! content already went out with an eager pre-tool `message.assistant`
//! write, so interrupt handling never persists it twice.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use strand_core::AssistantContent;

/// Execution status of one tool call within a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolCallStatus {
    /// Requested by the model, not yet started.
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error result.
    Error,
}

impl ToolCallStatus {
    /// Whether this call needs a synthetic result if the turn is interrupted.
    #[must_use]
    pub fn is_unfinished(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

/// One tool call requested by the model this turn.
#[derive(Clone, Debug)]
pub struct ToolCallRecord {
    /// Tool call ID.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Tool arguments.
    pub arguments: Map<String, Value>,
    /// Current status.
    pub status: ToolCallStatus,
}

/// Partial content recovered from an interrupted turn.
#[derive(Clone, Debug, Default)]
pub struct InterruptedContent {
    /// Unflushed assistant blocks; empty when the pre-tool flush already
    /// persisted this turn's content.
    pub assistant: Vec<AssistantContent>,
    /// Tool call IDs that never reached a terminal status, in request order.
    pub unfinished_tool_ids: Vec<String>,
}

#[derive(Default)]
struct TrackerState {
    accumulated: Vec<AssistantContent>,
    turn: Vec<AssistantContent>,
    tools: Vec<ToolCallRecord>,
    pre_tool_flushed: bool,
    text_buffer: String,
    thinking_buffer: String,
}

impl TrackerState {
    /// Settle delta buffers into blocks. Thinking settles before text,
    /// matching provider stream order.
    fn settle_buffers(&mut self) {
        if !self.thinking_buffer.is_empty() {
            let block = AssistantContent::Thinking {
                thinking: std::mem::take(&mut self.thinking_buffer),
                signature: None,
            };
            self.turn.push(block.clone());
            self.accumulated.push(block);
        }
        if !self.text_buffer.is_empty() {
            let block = AssistantContent::Text {
                text: std::mem::take(&mut self.text_buffer),
            };
            self.turn.push(block.clone());
            self.accumulated.push(block);
        }
    }
}

/// Accumulates streamed assistant content and tool call status for a run.
#[derive(Default)]
pub struct TurnContentTracker {
    state: Mutex<TrackerState>,
}

impl TurnContentTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset per-turn state. Accumulated run content is kept.
    pub fn begin_turn(&self) {
        let mut state = self.state.lock();
        state.turn.clear();
        state.tools.clear();
        state.pre_tool_flushed = false;
        state.text_buffer.clear();
        state.thinking_buffer.clear();
    }

    /// Append a text delta.
    pub fn text_delta(&self, delta: &str) {
        self.state.lock().text_buffer.push_str(delta);
    }

    /// Append a thinking delta.
    pub fn thinking_delta(&self, delta: &str) {
        self.state.lock().thinking_buffer.push_str(delta);
    }

    /// Record a complete tool-use block. Settles any buffered text or
    /// thinking first so block order matches stream order.
    pub fn tool_use(&self, id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) {
        let id = id.into();
        let name = name.into();
        let mut state = self.state.lock();
        state.settle_buffers();
        let block = AssistantContent::ToolUse {
            id: id.clone(),
            name: name.clone(),
            arguments: arguments.clone(),
        };
        state.turn.push(block.clone());
        state.accumulated.push(block);
        state.tools.push(ToolCallRecord {
            id,
            name,
            arguments,
            status: ToolCallStatus::Pending,
        });
    }

    /// Take the current turn's content for persistence and mark it flushed.
    ///
    /// After this call [`interrupted_content`](Self::interrupted_content)
    /// returns empty assistant content for the turn.
    pub fn take_turn_content(&self) -> Vec<AssistantContent> {
        let mut state = self.state.lock();
        state.settle_buffers();
        state.pre_tool_flushed = true;
        state.turn.clone()
    }

    /// Tool calls requested this turn, in request order.
    #[must_use]
    pub fn pending_tools(&self) -> Vec<ToolCallRecord> {
        self.state
            .lock()
            .tools
            .iter()
            .filter(|t| t.status == ToolCallStatus::Pending)
            .cloned()
            .collect()
    }

    /// Transition one tool call's status. Returns false for unknown IDs.
    pub fn set_tool_status(&self, id: &str, status: ToolCallStatus) -> bool {
        let mut state = self.state.lock();
        match state.tools.iter_mut().find(|t| t.id == id) {
            Some(record) => {
                record.status = status;
                true
            }
            None => false,
        }
    }

    /// Partial content for interrupt handling.
    ///
    /// Assistant blocks are returned only when the turn's content was never
    /// flushed; tool IDs cover every call that is not `Completed`/`Error`,
    /// flushed or not, since their results were never persisted.
    #[must_use]
    pub fn interrupted_content(&self) -> InterruptedContent {
        let mut state = self.state.lock();
        let assistant = if state.pre_tool_flushed {
            Vec::new()
        } else {
            state.settle_buffers();
            state.turn.clone()
        };
        let unfinished_tool_ids = state
            .tools
            .iter()
            .filter(|t| t.status.is_unfinished())
            .map(|t| t.id.clone())
            .collect();
        InterruptedContent {
            assistant,
            unfinished_tool_ids,
        }
    }

    /// Discard per-turn state after interrupt handling.
    pub fn clear_turn(&self) {
        self.begin_turn();
    }

    /// Everything streamed across the whole run.
    #[must_use]
    pub fn accumulated_content(&self) -> Vec<AssistantContent> {
        self.state.lock().accumulated.clone()
    }

    /// Whether this turn's content was already persisted by the pre-tool
    /// flush.
    #[must_use]
    pub fn pre_tool_flushed(&self) -> bool {
        self.state.lock().pre_tool_flushed
    }
}

impl std::fmt::Debug for TurnContentTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TurnContentTracker")
            .field("turn_blocks", &state.turn.len())
            .field("tools", &state.tools.len())
            .field("pre_tool_flushed", &state.pre_tool_flushed)
            .finish()
    }
}
