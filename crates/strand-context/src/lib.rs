//! # strand-context
//!
//! Keeps a session's live message view within a bounded token budget.
//! [`CompactionEngine`] decides when to summarize (threshold crossing),
//! previews the effect without mutating anything, and executes the
//! summarize-and-replace atomically through an injected persistence port.
//!
//! Compaction rewrites the *live view only* — the event log keeps every
//! original event for audit and undo.

pub mod engine;
pub mod errors;
pub mod threshold;

pub use engine::{
    CompactionConfig, CompactionDeps, CompactionEngine, CompactionPreview, CompactionRecord,
    CompactionResult, Summarizer,
};
pub use errors::ContextError;
pub use threshold::ThresholdLevel;
