//! Event log error types.

use thiserror::Error;

/// Errors raised by the event store and replay.
#[derive(Debug, Error)]
pub enum EventError {
    /// SQLite-level failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool exhausted or unavailable.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Payload could not be serialized or deserialized.
    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A referenced session does not exist.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A referenced event does not exist.
    #[error("event not found: {0}")]
    EventNotFound(String),

    /// An event type string outside the closed tag set.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// An operation that is invalid for the target event.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// What went wrong.
        message: String,
    },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, EventError>;
