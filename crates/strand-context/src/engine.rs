//! The compaction engine.
//!
//! Splits the live message list into a summarized head and a preserved tail,
//! wraps the summary in a fixed synthetic user/assistant pair, and replaces
//! the list wholesale — the only operation permitted to do so. Persistence
//! and message storage are behind [`CompactionDeps`] so the engine itself
//! stays pure and testable.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use strand_core::Message;
use strand_core::constants::{COMPACTION_ACK_TEXT, COMPACTION_SUMMARY_PREFIX, estimate_tokens};

use crate::errors::Result;
use crate::threshold::ThresholdLevel;

/// Estimated token overhead of the two synthetic wrapper messages.
const SYNTHETIC_OVERHEAD_TOKENS: u64 = 100;

/// Engine configuration.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionConfig {
    /// Fraction of the context limit that triggers a compaction
    /// recommendation.
    pub threshold: f64,
    /// Recent turns kept verbatim (one turn is a user+assistant pair, so
    /// the preserved tail is `2 *` this many messages).
    pub preserve_recent_turns: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.70,
            preserve_recent_turns: 3,
        }
    }
}

/// Non-mutating projection of what a compaction would do.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionPreview {
    /// Estimated tokens before compaction.
    pub tokens_before: u64,
    /// Estimated tokens after compaction.
    pub tokens_after: u64,
    /// `tokens_after / tokens_before`.
    pub compression_ratio: f64,
    /// Messages that would be folded into the summary.
    pub summarized_count: usize,
    /// Messages that would be kept verbatim.
    pub preserved_count: usize,
    /// The generated summary text.
    pub summary: String,
}

/// Result of an executed compaction: the preview shape plus a success flag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionResult {
    /// The projection that was committed.
    #[serde(flatten)]
    pub preview: CompactionPreview,
    /// Always true for a returned result; failures are errors.
    pub success: bool,
}

/// What gets persisted when a compaction commits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionRecord {
    /// Summary text, without the wrapper prefix.
    pub summary: String,
    /// The preserved tail, in original order.
    pub preserved: Vec<Message>,
    /// Estimated tokens before.
    pub tokens_before: u64,
    /// Estimated tokens after.
    pub tokens_after: u64,
}

/// Summarizer collaborator: turns a message slice into narrative text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize the given messages.
    async fn summarize(&self, messages: &[Message]) -> Result<String>;
}

/// Message storage and persistence port for the engine.
#[async_trait]
pub trait CompactionDeps: Send + Sync {
    /// Snapshot of the live message list.
    fn messages(&self) -> Vec<Message>;

    /// Replace the live message list wholesale. Callers never observe an
    /// intermediate state.
    fn replace_messages(&self, messages: Vec<Message>);

    /// Durably record the compaction (boundary marker plus summary).
    async fn persist_compaction(&self, record: &CompactionRecord) -> Result<()>;

    /// Estimated tokens of the system prompt.
    fn system_prompt_tokens(&self) -> u64 {
        0
    }

    /// Estimated tokens of the tool definitions.
    fn tools_tokens(&self) -> u64 {
        0
    }
}

type NeededCallback = Box<dyn Fn() + Send + Sync>;

/// Decides when to summarize and performs the summarize-and-replace.
pub struct CompactionEngine {
    deps: Arc<dyn CompactionDeps>,
    config: CompactionConfig,
    current_tokens: AtomicU64,
    context_limit: AtomicU64,
    on_needed: Mutex<Option<NeededCallback>>,
}

impl CompactionEngine {
    /// Create an engine for a session with the given context limit.
    pub fn new(deps: Arc<dyn CompactionDeps>, config: CompactionConfig, context_limit: u64) -> Self {
        Self {
            deps,
            config,
            current_tokens: AtomicU64::new(0),
            context_limit: AtomicU64::new(context_limit.max(1)),
            on_needed: Mutex::new(None),
        }
    }

    /// Record the latest API-reported token usage for the session.
    pub fn update_usage(&self, tokens: u64) {
        self.current_tokens.store(tokens, Ordering::Relaxed);
    }

    /// Change the context limit (e.g. after a model switch).
    pub fn set_context_limit(&self, limit: u64) {
        self.context_limit.store(limit.max(1), Ordering::Relaxed);
    }

    /// Current tokens as last reported.
    #[must_use]
    pub fn current_tokens(&self) -> u64 {
        self.current_tokens.load(Ordering::Relaxed)
    }

    /// `current_tokens / context_limit`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn usage_ratio(&self) -> f64 {
        self.current_tokens() as f64 / self.context_limit.load(Ordering::Relaxed) as f64
    }

    /// The named pressure band for the current ratio.
    #[must_use]
    pub fn threshold_level(&self) -> ThresholdLevel {
        ThresholdLevel::from_ratio(self.usage_ratio())
    }

    /// Whether the configured threshold has been crossed.
    #[must_use]
    pub fn should_compact(&self) -> bool {
        self.usage_ratio() >= self.config.threshold
    }

    /// Register the compaction-needed callback. Single slot, last wins.
    pub fn on_compaction_needed(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.on_needed.lock() = Some(Box::new(callback));
    }

    /// Invoke the registered callback if the threshold is crossed. Never
    /// compacts by itself; returns whether the callback fired.
    pub fn trigger_if_needed(&self) -> bool {
        if !self.should_compact() {
            return false;
        }
        let guard = self.on_needed.lock();
        if let Some(callback) = guard.as_ref() {
            tracing::debug!(
                ratio = self.usage_ratio(),
                "context threshold crossed, notifying"
            );
            callback();
            true
        } else {
            false
        }
    }

    /// Pure projection of a compaction: summarizes, estimates, touches
    /// nothing.
    pub async fn preview(&self, summarizer: &dyn Summarizer) -> Result<CompactionPreview> {
        let messages = self.deps.messages();
        let (to_summarize, preserved) = self.split_messages(&messages);
        let summary = summarizer.summarize(to_summarize).await?;
        Ok(self.project(&messages, to_summarize, preserved, summary))
    }

    /// Execute a compaction: summarize (or take the caller's edited
    /// summary verbatim), persist the record, and atomically replace the
    /// live message list with `[summary, ack, ...preserved]`.
    pub async fn execute(
        &self,
        summarizer: &dyn Summarizer,
        edited_summary: Option<&str>,
    ) -> Result<CompactionResult> {
        let messages = self.deps.messages();
        let (to_summarize, preserved) = self.split_messages(&messages);

        let summary = match edited_summary {
            Some(text) => text.to_owned(),
            None => summarizer.summarize(to_summarize).await?,
        };

        let preview = self.project(&messages, to_summarize, preserved, summary);

        let record = CompactionRecord {
            summary: preview.summary.clone(),
            preserved: preserved.to_vec(),
            tokens_before: preview.tokens_before,
            tokens_after: preview.tokens_after,
        };
        self.deps.persist_compaction(&record).await?;

        let mut replacement = Vec::with_capacity(preserved.len() + 2);
        replacement.push(Message::user_text(format!(
            "{COMPACTION_SUMMARY_PREFIX}\n\n{}",
            preview.summary
        )));
        replacement.push(Message::assistant_text(COMPACTION_ACK_TEXT));
        replacement.extend_from_slice(preserved);
        self.deps.replace_messages(replacement);

        self.update_usage(preview.tokens_after);

        tracing::info!(
            tokens_before = preview.tokens_before,
            tokens_after = preview.tokens_after,
            summarized = preview.summarized_count,
            preserved = preview.preserved_count,
            "compaction committed"
        );

        Ok(CompactionResult {
            preview,
            success: true,
        })
    }

    /// Split into (head to summarize, tail to preserve). A preserve count
    /// of zero summarizes everything; that is a deliberate edge case.
    fn split_messages<'a>(&self, messages: &'a [Message]) -> (&'a [Message], &'a [Message]) {
        let preserve_count = self.config.preserve_recent_turns * 2;
        if preserve_count == 0 {
            return (messages, &[]);
        }
        let split_at = messages.len().saturating_sub(preserve_count);
        messages.split_at(split_at)
    }

    fn project(
        &self,
        all: &[Message],
        to_summarize: &[Message],
        preserved: &[Message],
        summary: String,
    ) -> CompactionPreview {
        let tokens_before = {
            let reported = self.current_tokens();
            if reported > 0 {
                reported
            } else {
                self.fixed_tokens() + all.iter().map(message_tokens).sum::<u64>()
            }
        };
        let tokens_after = self.fixed_tokens()
            + estimate_tokens(summary.len())
            + SYNTHETIC_OVERHEAD_TOKENS
            + preserved.iter().map(message_tokens).sum::<u64>();

        #[allow(clippy::cast_precision_loss)]
        let compression_ratio = if tokens_before == 0 {
            1.0
        } else {
            tokens_after as f64 / tokens_before as f64
        };

        CompactionPreview {
            tokens_before,
            tokens_after,
            compression_ratio,
            summarized_count: to_summarize.len(),
            preserved_count: preserved.len(),
            summary,
        }
    }

    fn fixed_tokens(&self) -> u64 {
        self.deps.system_prompt_tokens() + self.deps.tools_tokens()
    }
}

fn message_tokens(message: &Message) -> u64 {
    estimate_tokens(message.content_len())
}
