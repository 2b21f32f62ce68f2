//! Context engine error types.

use thiserror::Error;

/// Errors raised by compaction.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The summarizer collaborator failed.
    #[error("summarizer error: {0}")]
    Summarizer(String),

    /// Persisting the compaction record failed.
    #[error("compaction persistence error: {0}")]
    Persistence(String),

    /// Compaction was requested with nothing to summarize or replace.
    #[error("nothing to compact: {0}")]
    NothingToCompact(String),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ContextError>;
