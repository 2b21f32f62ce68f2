//! The event store: transactional append, ancestor traversal, forking, and
//! session lifecycle.
//!
//! Every write advances the session's head pointer inside the same
//! transaction that inserts the event, so the head always references a
//! durable row. History is never rewritten; corrections and compactions
//! only append.

use chrono::{SecondsFormat, Utc};
use rusqlite::{Row, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use strand_core::{EventId, SessionId, TokenUsage};

use crate::connection::ConnectionPool;
use crate::errors::{EventError, Result};
use crate::reconstruct::{SessionView, reconstruct};
use crate::types::{Event, EventType};

/// Ancestor chains longer than this indicate a cycle or corruption.
const MAX_CHAIN_LENGTH: u32 = 10_000;

/// A session row with its aggregate counters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session ID (`ses_` prefix).
    pub id: String,
    /// Owning workspace, when any.
    pub workspace_id: Option<String>,
    /// Frontier of the event chain.
    pub head_event_id: Option<String>,
    /// Source session, for forks.
    pub parent_session_id: Option<String>,
    /// Model the session runs on.
    pub model: String,
    /// Working directory.
    pub working_directory: String,
    /// Human-readable title.
    pub title: Option<String>,
    /// Whether the session accepts new turns.
    pub active: bool,
    /// Whether the session is archived.
    pub archived: bool,
    /// When the session ended, if it has.
    pub ended_at: Option<String>,
    /// Completed user turns.
    pub turn_count: u64,
    /// Accumulated API-reported input tokens.
    pub total_input_tokens: u64,
    /// Accumulated API-reported output tokens.
    pub total_output_tokens: u64,
    /// Accumulated cache-read tokens.
    pub total_cache_read_tokens: u64,
    /// Accumulated cache-creation tokens.
    pub total_cache_creation_tokens: u64,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
    /// Last activity timestamp (RFC 3339).
    pub last_activity_at: String,
}

impl Session {
    /// Aggregate token usage across the session.
    #[must_use]
    pub fn token_usage(&self) -> TokenUsage {
        TokenUsage {
            input_tokens: self.total_input_tokens,
            output_tokens: self.total_output_tokens,
            cache_read_tokens: self.total_cache_read_tokens,
            cache_creation_tokens: self.total_cache_creation_tokens,
        }
    }
}

/// Parameters for appending one event.
#[derive(Debug)]
pub struct AppendRequest<'a> {
    /// Target session.
    pub session_id: &'a str,
    /// Event tag.
    pub event_type: EventType,
    /// Tag-determined payload.
    pub payload: Value,
    /// Explicit parent; defaults to the session head.
    pub parent_id: Option<&'a str>,
}

/// Append-only event store over a pooled `SQLite` database.
pub struct EventStore {
    pool: ConnectionPool,
}

impl EventStore {
    /// Wrap a connection pool. The schema must already be migrated.
    #[must_use]
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Create a session and its `session.start` root event.
    ///
    /// Both writes share one transaction: a session row without a root
    /// event can never be observed, even across a crash.
    pub fn create_session(
        &self,
        model: &str,
        working_directory: &str,
        title: Option<&str>,
        workspace_id: Option<&str>,
    ) -> Result<Session> {
        let session_id = SessionId::generate();
        let now = now_rfc3339();

        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let _ = tx.execute(
            "INSERT INTO sessions (id, workspace_id, model, working_directory, title,
                                   created_at, last_activity_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![session_id.as_str(), workspace_id, model, working_directory, title, now],
        )?;
        let _ = append_in_tx(
            &tx,
            &AppendRequest {
                session_id: session_id.as_str(),
                event_type: EventType::SessionStart,
                payload: serde_json::json!({
                    "model": model,
                    "workingDirectory": working_directory,
                    "title": title,
                }),
                parent_id: None,
            },
        )?;
        tx.commit()?;

        self.get_session(session_id.as_str())
    }

    /// Append one event, durably, inside a single transaction.
    ///
    /// Resolves the parent from the session head when unspecified, assigns
    /// the next per-session sequence number, advances the head, and bumps
    /// the session's aggregate counters.
    pub fn append(&self, req: &AppendRequest<'_>) -> Result<Event> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let event = append_in_tx(&tx, req)?;
        tx.commit()?;
        Ok(event)
    }

    /// Fetch one event by ID.
    pub fn get_event(&self, event_id: &str) -> Result<Event> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT id, parent_id, session_id, event_type, sequence, timestamp, checksum, payload
             FROM events WHERE id = ?1",
            [event_id],
            row_to_event,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => EventError::EventNotFound(event_id.to_owned()),
            other => EventError::Database(other),
        })
    }

    /// Walk the parent chain from a head event back to its root, returned
    /// root→head. Crosses fork boundaries into ancestor sessions.
    pub fn get_ancestors(&self, head_event_id: &str) -> Result<Vec<Event>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "WITH RECURSIVE chain(id, parent_id, session_id, event_type, sequence,
                                  timestamp, checksum, payload, lvl) AS (
                 SELECT id, parent_id, session_id, event_type, sequence,
                        timestamp, checksum, payload, 0
                   FROM events WHERE id = ?1
                 UNION ALL
                 SELECT e.id, e.parent_id, e.session_id, e.event_type, e.sequence,
                        e.timestamp, e.checksum, e.payload, c.lvl + 1
                   FROM events e
                   JOIN chain c ON e.id = c.parent_id
                  WHERE c.lvl < ?2
             )
             SELECT id, parent_id, session_id, event_type, sequence,
                    timestamp, checksum, payload
               FROM chain ORDER BY lvl DESC",
        )?;
        let events = stmt
            .query_map(params![head_event_id, MAX_CHAIN_LENGTH], row_to_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if events.is_empty() {
            return Err(EventError::EventNotFound(head_event_id.to_owned()));
        }
        Ok(events)
    }

    /// Fork a new session from an event in an existing session.
    ///
    /// Copies no data: the new session's `session.fork` root event has
    /// `parent_id = from_event_id`, so ancestor traversal reaches back
    /// through the source chain.
    pub fn fork(&self, from_event_id: &str, title: Option<&str>) -> Result<Session> {
        let source_event = self.get_event(from_event_id)?;
        let source = self.get_session(&source_event.session_id)?;

        let session_id = SessionId::generate();
        let now = now_rfc3339();

        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let _ = tx.execute(
            "INSERT INTO sessions (id, workspace_id, parent_session_id, model,
                                   working_directory, title, created_at, last_activity_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                session_id.as_str(),
                source.workspace_id,
                source.id,
                source.model,
                source.working_directory,
                title,
                now,
            ],
        )?;
        let _ = append_in_tx(
            &tx,
            &AppendRequest {
                session_id: session_id.as_str(),
                event_type: EventType::SessionFork,
                payload: serde_json::json!({
                    "forkedFromSessionId": source.id,
                    "forkedFromEventId": from_event_id,
                    "title": title,
                }),
                parent_id: Some(from_event_id),
            },
        )?;
        tx.commit()?;

        self.get_session(session_id.as_str())
    }

    /// Soft-delete a message by appending a `message.deleted` correction.
    pub fn delete_message(&self, session_id: &str, target_event_id: &str) -> Result<Event> {
        let target = self.get_event(target_event_id)?;
        if !target.event_type.is_message_type() {
            return Err(EventError::InvalidOperation(format!(
                "cannot delete {} event {target_event_id}",
                target.event_type
            )));
        }
        self.append(&AppendRequest {
            session_id,
            event_type: EventType::MessageDeleted,
            payload: serde_json::json!({ "targetEventId": target_event_id }),
            parent_id: None,
        })
    }

    /// End a session: append `session.end` and clear the active flag.
    pub fn end_session(&self, session_id: &str) -> Result<Event> {
        let event = self.append(&AppendRequest {
            session_id,
            event_type: EventType::SessionEnd,
            payload: Value::Object(serde_json::Map::new()),
            parent_id: None,
        })?;
        let conn = self.pool.get()?;
        let _ = conn.execute(
            "UPDATE sessions SET active = 0, ended_at = ?1 WHERE id = ?2",
            params![event.timestamp, session_id],
        )?;
        Ok(event)
    }

    /// Fetch one session row.
    pub fn get_session(&self, session_id: &str) -> Result<Session> {
        let conn = self.pool.get()?;
        conn.query_row(
            &format!("{SESSION_COLUMNS} WHERE id = ?1"),
            [session_id],
            row_to_session,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                EventError::SessionNotFound(session_id.to_owned())
            }
            other => EventError::Database(other),
        })
    }

    /// List sessions, optionally filtered by workspace, newest activity first.
    pub fn list_sessions(&self, workspace_id: Option<&str>) -> Result<Vec<Session>> {
        let conn = self.pool.get()?;
        let mut sessions = Vec::new();
        match workspace_id {
            Some(workspace) => {
                let mut stmt = conn.prepare(&format!(
                    "{SESSION_COLUMNS} WHERE workspace_id = ?1 ORDER BY last_activity_at DESC"
                ))?;
                let rows = stmt.query_map([workspace], row_to_session)?;
                for row in rows {
                    sessions.push(row?);
                }
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!("{SESSION_COLUMNS} ORDER BY last_activity_at DESC"))?;
                let rows = stmt.query_map([], row_to_session)?;
                for row in rows {
                    sessions.push(row?);
                }
            }
        }
        Ok(sessions)
    }

    /// Reconstruct a session's materialized view by replaying its ancestor
    /// chain from the current head.
    pub fn reconstruct_session(&self, session_id: &str) -> Result<SessionView> {
        let session = self.get_session(session_id)?;
        let Some(head) = session.head_event_id else {
            return Ok(SessionView::default());
        };
        let events = self.get_ancestors(&head)?;
        Ok(reconstruct(&events))
    }
}

/// Append one event on an open transaction.
///
/// Resolves the parent from the session head when unspecified, assigns the
/// next per-session sequence number, advances the head, and bumps the
/// session's aggregate counters. The caller owns the commit, so multi-write
/// operations (session creation, forking) stay atomic.
fn append_in_tx(tx: &rusqlite::Connection, req: &AppendRequest<'_>) -> Result<Event> {
    let head: Option<String> = tx
        .query_row(
            "SELECT head_event_id FROM sessions WHERE id = ?1",
            [req.session_id],
            |row| row.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                EventError::SessionNotFound(req.session_id.to_owned())
            }
            other => EventError::Database(other),
        })?;

    let parent_id = req.parent_id.map(str::to_owned).or(head);
    let sequence: i64 = tx.query_row(
        "SELECT COALESCE(MAX(sequence), -1) + 1 FROM events WHERE session_id = ?1",
        [req.session_id],
        |row| row.get(0),
    )?;

    let id = EventId::generate();
    let timestamp = now_rfc3339();
    let checksum = Event::compute_checksum(
        parent_id.as_deref(),
        req.session_id,
        req.event_type,
        &req.payload,
    );

    let _ = tx.execute(
        "INSERT INTO events (id, parent_id, session_id, event_type, sequence,
                             timestamp, checksum, payload)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id.as_str(),
            parent_id,
            req.session_id,
            req.event_type.as_str(),
            sequence,
            timestamp,
            checksum,
            req.payload.to_string(),
        ],
    )?;

    let _ = tx.execute(
        "UPDATE sessions SET head_event_id = ?1, last_activity_at = ?2 WHERE id = ?3",
        params![id.as_str(), timestamp, req.session_id],
    )?;

    match req.event_type {
        EventType::MessageUser => {
            let _ = tx.execute(
                "UPDATE sessions SET turn_count = turn_count + 1 WHERE id = ?1",
                [req.session_id],
            )?;
        }
        EventType::MessageAssistant => {
            if let Some(usage) = req
                .payload
                .get("tokenUsage")
                .and_then(|u| serde_json::from_value::<TokenUsage>(u.clone()).ok())
            {
                let _ = tx.execute(
                    "UPDATE sessions SET
                         total_input_tokens = total_input_tokens + ?1,
                         total_output_tokens = total_output_tokens + ?2,
                         total_cache_read_tokens = total_cache_read_tokens + ?3,
                         total_cache_creation_tokens = total_cache_creation_tokens + ?4
                     WHERE id = ?5",
                    params![
                        i64::try_from(usage.input_tokens).unwrap_or(i64::MAX),
                        i64::try_from(usage.output_tokens).unwrap_or(i64::MAX),
                        i64::try_from(usage.cache_read_tokens).unwrap_or(i64::MAX),
                        i64::try_from(usage.cache_creation_tokens).unwrap_or(i64::MAX),
                        req.session_id,
                    ],
                )?;
            }
        }
        _ => {}
    }

    Ok(Event {
        id: id.into_inner(),
        parent_id,
        session_id: req.session_id.to_owned(),
        timestamp,
        event_type: req.event_type,
        sequence,
        checksum,
        payload: req.payload.clone(),
    })
}

const SESSION_COLUMNS: &str = "SELECT id, workspace_id, head_event_id, parent_session_id, model,
        working_directory, title, active, archived, ended_at, turn_count,
        total_input_tokens, total_output_tokens, total_cache_read_tokens,
        total_cache_creation_tokens, created_at, last_activity_at
   FROM sessions";

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<Event> {
    let type_str: String = row.get(3)?;
    let event_type: EventType = type_str.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown event type {type_str}").into(),
        )
    })?;
    let payload_str: String = row.get(7)?;
    let payload: Value = serde_json::from_str(&payload_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Event {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        session_id: row.get(2)?,
        event_type,
        sequence: row.get(4)?,
        timestamp: row.get(5)?,
        checksum: row.get(6)?,
        payload,
    })
}

#[allow(clippy::cast_sign_loss)]
fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        head_event_id: row.get(2)?,
        parent_session_id: row.get(3)?,
        model: row.get(4)?,
        working_directory: row.get(5)?,
        title: row.get(6)?,
        active: row.get::<_, i64>(7)? != 0,
        archived: row.get::<_, i64>(8)? != 0,
        ended_at: row.get(9)?,
        turn_count: row.get::<_, i64>(10)? as u64,
        total_input_tokens: row.get::<_, i64>(11)? as u64,
        total_output_tokens: row.get::<_, i64>(12)? as u64,
        total_cache_read_tokens: row.get::<_, i64>(13)? as u64,
        total_cache_creation_tokens: row.get::<_, i64>(14)? as u64,
        created_at: row.get(15)?,
        last_activity_at: row.get(16)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionConfig, new_in_memory};
    use crate::migrations::run_migrations;
    use serde_json::json;

    fn make_store() -> EventStore {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            let _ = run_migrations(&conn).unwrap();
        }
        EventStore::new(pool)
    }

    #[test]
    fn create_session_writes_start_event() {
        let store = make_store();
        let session = store
            .create_session("test-model", "/tmp/project", Some("demo"), None)
            .unwrap();

        assert!(session.id.starts_with("ses_"));
        assert!(session.active);
        let head = session.head_event_id.unwrap();
        let root = store.get_event(&head).unwrap();
        assert_eq!(root.event_type, EventType::SessionStart);
        assert!(root.parent_id.is_none());
        assert_eq!(root.sequence, 0);
        assert!(root.verify_checksum());
    }

    #[test]
    fn failed_root_event_rolls_back_the_session_row() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            let _ = run_migrations(&conn).unwrap();
            // Break the event insert while leaving the sessions table intact.
            let _ = conn.execute("DROP TABLE events", []).unwrap();
        }
        let store = EventStore::new(pool);

        assert!(store.create_session("m", "/tmp", None, None).is_err());
        assert!(
            store.list_sessions(None).unwrap().is_empty(),
            "a session must never exist without its session.start root"
        );
    }

    #[test]
    fn append_chains_from_head() {
        let store = make_store();
        let session = store.create_session("m", "/tmp", None, None).unwrap();
        let head_before = session.head_event_id.clone().unwrap();

        let event = store
            .append(&AppendRequest {
                session_id: &session.id,
                event_type: EventType::MessageUser,
                payload: json!({"content": "hi"}),
                parent_id: None,
            })
            .unwrap();

        assert_eq!(event.parent_id.as_deref(), Some(head_before.as_str()));
        assert_eq!(event.sequence, 1);

        let after = store.get_session(&session.id).unwrap();
        assert_eq!(after.head_event_id.as_deref(), Some(event.id.as_str()));
    }

    #[test]
    fn append_to_missing_session_fails() {
        let store = make_store();
        let err = store
            .append(&AppendRequest {
                session_id: "ses_missing",
                event_type: EventType::MessageUser,
                payload: json!({"content": "x"}),
                parent_id: None,
            })
            .unwrap_err();
        assert!(matches!(err, EventError::SessionNotFound(_)));
    }

    #[test]
    fn user_messages_bump_turn_count() {
        let store = make_store();
        let session = store.create_session("m", "/tmp", None, None).unwrap();
        for i in 0..3 {
            let _ = store
                .append(&AppendRequest {
                    session_id: &session.id,
                    event_type: EventType::MessageUser,
                    payload: json!({"content": format!("turn {i}")}),
                    parent_id: None,
                })
                .unwrap();
        }
        assert_eq!(store.get_session(&session.id).unwrap().turn_count, 3);
    }

    #[test]
    fn assistant_usage_accumulates_on_session() {
        let store = make_store();
        let session = store.create_session("m", "/tmp", None, None).unwrap();
        for _ in 0..2 {
            let _ = store
                .append(&AppendRequest {
                    session_id: &session.id,
                    event_type: EventType::MessageAssistant,
                    payload: json!({
                        "content": [{"type": "text", "text": "ok"}],
                        "tokenUsage": {"inputTokens": 100, "outputTokens": 20}
                    }),
                    parent_id: None,
                })
                .unwrap();
        }
        let after = store.get_session(&session.id).unwrap();
        assert_eq!(after.total_input_tokens, 200);
        assert_eq!(after.total_output_tokens, 40);
        assert_eq!(after.token_usage().total(), 240);
    }

    #[test]
    fn ancestors_ordered_root_to_head() {
        let store = make_store();
        let session = store.create_session("m", "/tmp", None, None).unwrap();
        let mut last = None;
        for i in 0..4 {
            last = Some(
                store
                    .append(&AppendRequest {
                        session_id: &session.id,
                        event_type: EventType::MessageUser,
                        payload: json!({"content": format!("{i}")}),
                        parent_id: None,
                    })
                    .unwrap(),
            );
        }

        let chain = store.get_ancestors(&last.unwrap().id).unwrap();
        assert_eq!(chain.len(), 5, "start event plus four messages");
        assert_eq!(chain[0].event_type, EventType::SessionStart);
        for pair in chain.windows(2) {
            assert_eq!(pair[1].parent_id.as_deref(), Some(pair[0].id.as_str()));
        }
    }

    #[test]
    fn ancestors_of_unknown_event_fail() {
        let store = make_store();
        assert!(matches!(
            store.get_ancestors("evt_missing").unwrap_err(),
            EventError::EventNotFound(_)
        ));
    }

    #[test]
    fn fork_reaches_back_through_source_chain() {
        let store = make_store();
        let source = store.create_session("m", "/tmp", None, None).unwrap();
        let branch_point = store
            .append(&AppendRequest {
                session_id: &source.id,
                event_type: EventType::MessageUser,
                payload: json!({"content": "shared history"}),
                parent_id: None,
            })
            .unwrap();
        // Source continues past the branch point.
        let _ = store
            .append(&AppendRequest {
                session_id: &source.id,
                event_type: EventType::MessageUser,
                payload: json!({"content": "only in source"}),
                parent_id: None,
            })
            .unwrap();

        let fork = store.fork(&branch_point.id, Some("branch")).unwrap();
        assert_eq!(fork.parent_session_id.as_deref(), Some(source.id.as_str()));
        assert_eq!(fork.model, source.model);

        let chain = store.get_ancestors(&fork.head_event_id.unwrap()).unwrap();
        assert_eq!(chain.len(), 3, "start, shared message, fork root");
        assert_eq!(chain[2].event_type, EventType::SessionFork);
        assert_eq!(chain[2].session_id, fork.id);
        assert_eq!(chain[1].id, branch_point.id);
        assert!(
            chain.iter().all(|e| {
                e.typed_payload().is_ok()
            }),
            "every ancestor payload parses"
        );
        // The post-branch source message is not visible from the fork.
        assert!(chain.iter().all(|e| e.payload["content"] != "only in source"));
    }

    #[test]
    fn delete_message_appends_correction() {
        let store = make_store();
        let session = store.create_session("m", "/tmp", None, None).unwrap();
        let target = store
            .append(&AppendRequest {
                session_id: &session.id,
                event_type: EventType::MessageUser,
                payload: json!({"content": "oops"}),
                parent_id: None,
            })
            .unwrap();

        let deletion = store.delete_message(&session.id, &target.id).unwrap();
        assert_eq!(deletion.event_type, EventType::MessageDeleted);
        assert_eq!(deletion.payload["targetEventId"], target.id);
        // Original event is still retrievable.
        assert!(store.get_event(&target.id).is_ok());
    }

    #[test]
    fn delete_rejects_non_message_events() {
        let store = make_store();
        let session = store.create_session("m", "/tmp", None, None).unwrap();
        let head = session.head_event_id.unwrap();
        let err = store.delete_message(&session.id, &head).unwrap_err();
        assert!(matches!(err, EventError::InvalidOperation(_)));
    }

    #[test]
    fn end_session_clears_active() {
        let store = make_store();
        let session = store.create_session("m", "/tmp", None, None).unwrap();
        let event = store.end_session(&session.id).unwrap();
        assert_eq!(event.event_type, EventType::SessionEnd);

        let after = store.get_session(&session.id).unwrap();
        assert!(!after.active);
        assert!(after.ended_at.is_some());
    }

    #[test]
    fn list_sessions_filters_by_workspace() {
        let store = make_store();
        let _ = store.create_session("m", "/tmp", None, Some("wsp_a")).unwrap();
        let _ = store.create_session("m", "/tmp", None, Some("wsp_a")).unwrap();
        let _ = store.create_session("m", "/tmp", None, Some("wsp_b")).unwrap();

        assert_eq!(store.list_sessions(Some("wsp_a")).unwrap().len(), 2);
        assert_eq!(store.list_sessions(None).unwrap().len(), 3);
    }
}
