//! Token accounting, stop reasons, and reasoning levels.

use serde::{Deserialize, Serialize};

/// Token counts reported by the model API for one response.
///
/// All fields saturate on accumulation; a session's totals are the sum of
/// per-response usage, never recomputed from text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Input (prompt) tokens.
    #[serde(default)]
    pub input_tokens: u64,
    /// Output (completion) tokens.
    #[serde(default)]
    pub output_tokens: u64,
    /// Tokens served from prompt cache.
    #[serde(default)]
    pub cache_read_tokens: u64,
    /// Tokens written to prompt cache.
    #[serde(default)]
    pub cache_creation_tokens: u64,
}

impl TokenUsage {
    /// Total tokens across all categories.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_read_tokens)
            .saturating_add(self.cache_creation_tokens)
    }

    /// Accumulate another usage record into this one (saturating).
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(other.cache_read_tokens);
        self.cache_creation_tokens = self
            .cache_creation_tokens
            .saturating_add(other.cache_creation_tokens);
    }
}

/// Why a model response ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model finished its response naturally.
    EndTurn,
    /// The model hit its output token cap; the response is truncated.
    MaxTokens,
    /// The model wants one or more tools executed.
    ToolUse,
    /// The turn was interrupted before the model settled.
    Interrupted,
    /// The turn failed.
    Error,
}

impl StopReason {
    /// The wire string for this stop reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EndTurn => "end_turn",
            Self::MaxTokens => "max_tokens",
            Self::ToolUse => "tool_use",
            Self::Interrupted => "interrupted",
            Self::Error => "error",
        }
    }
}

/// Reasoning effort level for models with configurable thinking budgets.
///
/// This is session configuration, not conversational content: it survives
/// compaction and context clearing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningLevel {
    /// No extended thinking.
    None,
    /// Small thinking budget.
    Low,
    /// Medium thinking budget.
    Medium,
    /// Large thinking budget.
    High,
}

impl ReasoningLevel {
    /// The wire string for this level.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_totals_and_accumulation() {
        let mut total = TokenUsage::default();
        total.add(&TokenUsage {
            input_tokens: 100,
            output_tokens: 50,
            cache_read_tokens: 10,
            cache_creation_tokens: 5,
        });
        total.add(&TokenUsage {
            input_tokens: 1,
            output_tokens: 2,
            ..TokenUsage::default()
        });
        assert_eq!(total.input_tokens, 101);
        assert_eq!(total.output_tokens, 52);
        assert_eq!(total.total(), 168);
    }

    #[test]
    fn usage_add_saturates() {
        let mut usage = TokenUsage {
            input_tokens: u64::MAX,
            ..TokenUsage::default()
        };
        usage.add(&TokenUsage {
            input_tokens: 1,
            ..TokenUsage::default()
        });
        assert_eq!(usage.input_tokens, u64::MAX);
    }

    #[test]
    fn usage_deserializes_with_missing_fields() {
        let usage: TokenUsage =
            serde_json::from_str(r#"{"inputTokens": 7, "outputTokens": 3}"#).unwrap();
        assert_eq!(usage.input_tokens, 7);
        assert_eq!(usage.cache_read_tokens, 0);
    }

    #[test]
    fn stop_reason_wire_strings() {
        const EXPECTED: &[(StopReason, &str)] = &[
            (StopReason::EndTurn, "end_turn"),
            (StopReason::MaxTokens, "max_tokens"),
            (StopReason::ToolUse, "tool_use"),
            (StopReason::Interrupted, "interrupted"),
            (StopReason::Error, "error"),
        ];
        for (reason, wire) in EXPECTED {
            assert_eq!(reason.as_str(), *wire);
            let json = serde_json::to_string(reason).unwrap();
            assert_eq!(json, format!("\"{wire}\""));
        }
    }

    #[test]
    fn reasoning_level_round_trips() {
        for level in [
            ReasoningLevel::None,
            ReasoningLevel::Low,
            ReasoningLevel::Medium,
            ReasoningLevel::High,
        ] {
            let json = serde_json::to_string(&level).unwrap();
            let back: ReasoningLevel = serde_json::from_str(&json).unwrap();
            assert_eq!(back, level);
        }
    }
}
