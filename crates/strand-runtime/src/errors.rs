//! Runtime error types.

use strand_core::CoreError;

/// Errors surfaced by the turn execution engine.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Prompt validation failed; no event was written.
    #[error("Validation error: {0}")]
    Validation(#[from] CoreError),

    /// The model streaming collaborator failed.
    #[error("Model error: {0}")]
    Model(String),

    /// Event persistence failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The run exceeded the configured turn bound.
    #[error("Max turns ({0}) exceeded")]
    MaxTurns(u64),

    /// Configuration could not be loaded or parsed.
    #[error("Config error: {0}")]
    Config(String),
}

impl RuntimeError {
    /// Error category string for logging and notifications.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Model(_) => "model",
            Self::Persistence(_) => "persistence",
            Self::MaxTurns(_) => "max_turns",
            Self::Config(_) => "config",
        }
    }
}

/// Convenience alias for runtime results.
pub type Result<T> = std::result::Result<T, RuntimeError>;
