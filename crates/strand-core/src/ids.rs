//! Branded ID newtypes.
//!
//! Every persisted entity carries a distinct ID type wrapped around `String`
//! so a session ID can never be passed where an event ID is expected. IDs
//! generated by this crate are UUID v7 (time-ordered) with a short entity
//! prefix, e.g. `evt_0192…` for events and `ses_0192…` for sessions.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a new prefixed, time-ordered ID.
            #[must_use]
            pub fn generate() -> Self {
                Self(format!(concat!($prefix, "_{}"), Uuid::now_v7()))
            }

            /// Wrap an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Borrow the inner string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::generate()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Identifier of a persisted event.
    EventId, "evt"
}

branded_id! {
    /// Identifier of a session (a chain of events with a head pointer).
    SessionId, "ses"
}

branded_id! {
    /// Identifier of a workspace grouping related sessions.
    WorkspaceId, "wsp"
}

branded_id! {
    /// Identifier of a tool invocation within an assistant message.
    ToolCallId, "tcl"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_carry_prefix() {
        assert!(EventId::generate().as_str().starts_with("evt_"));
        assert!(SessionId::generate().as_str().starts_with("ses_"));
        assert!(WorkspaceId::generate().as_str().starts_with("wsp_"));
        assert!(ToolCallId::generate().as_str().starts_with("tcl_"));
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = EventId::generate();
        let b = EventId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn uuid_v7_ids_sort_by_creation_time() {
        // v7 encodes a millisecond timestamp in the high bits, so ids
        // generated in order compare in order (ties within the same
        // millisecond are still unique via random bits).
        let ids: Vec<EventId> = (0..8).map(|_| EventId::generate()).collect();
        let mut sorted = ids.clone();
        sorted.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(ids, sorted);
    }

    #[test]
    fn serde_is_transparent() {
        let id = SessionId::from("ses_abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ses_abc\"");
        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn deref_and_display() {
        let id = EventId::from("evt_x");
        assert_eq!(&*id, "evt_x");
        assert_eq!(id.to_string(), "evt_x");
    }
}
