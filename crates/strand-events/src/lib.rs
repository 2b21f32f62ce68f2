//! # strand-events
//!
//! The append-only, fork-capable event log: every state change in a session
//! is persisted as an immutable typed event, and a session's visible state
//! is always a deterministic function of its event chain.
//!
//! Layout:
//! - [`types`] — the closed event-type tag set, the event row, and typed
//!   payload views.
//! - [`connection`] / [`migrations`] — pooled SQLite access (WAL, foreign
//!   keys on) and the idempotent schema runner.
//! - [`store`] — the [`EventStore`]: transactional append, ancestor
//!   traversal, forking, session lifecycle.
//! - [`reconstruct`] — replay: fold an ancestor chain into a
//!   [`SessionView`](reconstruct::SessionView).

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod reconstruct;
pub mod store;
pub mod types;

pub use connection::{ConnectionConfig, ConnectionPool, new_file, new_in_memory};
pub use errors::EventError;
pub use migrations::run_migrations;
pub use reconstruct::{SessionView, reconstruct};
pub use store::{AppendRequest, EventStore, Session};
pub use types::{Event, EventType};
