//! Fixed texts and estimation constants shared across crates.

/// Rough chars-per-token heuristic used for local token estimation.
pub const CHARS_PER_TOKEN: usize = 4;

/// Prefix marking the synthetic user message that wraps a compaction summary.
pub const COMPACTION_SUMMARY_PREFIX: &str = "[Context from earlier in this conversation]";

/// Fixed text of the synthetic assistant acknowledgment after compaction.
pub const COMPACTION_ACK_TEXT: &str =
    "I understand the previous context. Let me continue helping you.";

/// Result text injected for tool calls that never settled.
pub const INTERRUPTED_TOOL_RESULT_TEXT: &str = "Tool execution was interrupted.";

/// Estimate tokens for a chunk of text using the chars-per-token heuristic.
#[must_use]
pub fn estimate_tokens(text_len: usize) -> u64 {
    text_len.div_ceil(CHARS_PER_TOKEN) as u64
}
