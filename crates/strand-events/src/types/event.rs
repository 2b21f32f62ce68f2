//! The persisted event row.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::event_type::EventType;
use super::payloads::TypedPayload;
use crate::errors::Result;

/// One immutable row in a session's event chain.
///
/// Events are never mutated or deleted; corrections are appended as new
/// events. `parent_id` may reference an event in a *different* session when
/// the session was forked.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique, time-ordered ID (`evt_` prefix).
    pub id: String,
    /// The event this one logically follows; `None` only for a
    /// `session.start` root.
    pub parent_id: Option<String>,
    /// Owning session.
    pub session_id: String,
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
    /// Typed tag determining the payload shape.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Per-session monotonically increasing sequence number.
    pub sequence: i64,
    /// Integrity checksum over the identity fields and payload.
    pub checksum: String,
    /// Tag-determined payload.
    pub payload: Value,
}

impl Event {
    /// Compute the integrity checksum for an event's identity and payload.
    #[must_use]
    pub fn compute_checksum(
        parent_id: Option<&str>,
        session_id: &str,
        event_type: EventType,
        payload: &Value,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(parent_id.unwrap_or(""));
        hasher.update(b":");
        hasher.update(session_id);
        hasher.update(b":");
        hasher.update(event_type.as_str());
        hasher.update(b":");
        hasher.update(payload.to_string());
        format!("{:x}", hasher.finalize())
    }

    /// Whether the stored checksum matches the row contents.
    #[must_use]
    pub fn verify_checksum(&self) -> bool {
        Self::compute_checksum(
            self.parent_id.as_deref(),
            &self.session_id,
            self.event_type,
            &self.payload,
        ) == self.checksum
    }

    /// Deserialize the payload into its typed view.
    pub fn typed_payload(&self) -> Result<TypedPayload> {
        TypedPayload::from_event(self.event_type, &self.payload)
    }
}
