//! Compaction wired to a live session and the event log.
//!
//! [`SessionCompactionDeps`] is the production implementation of the context
//! engine's persistence port: message storage is the [`ActiveSession`], and a
//! committed compaction appends the `compact.boundary` / `compact.summary`
//! pair through the persister. Replaying the chain afterwards reproduces
//! exactly the replaced live view, so a reload and a running session agree.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use strand_context::errors::{ContextError, Result as ContextResult};
use strand_context::{CompactionConfig, CompactionDeps, CompactionEngine, CompactionRecord};
use strand_core::Message;
use strand_core::constants::estimate_tokens;
use strand_events::types::{CompactSummaryPayload, EventType};

use crate::config::CompactionSettings;
use crate::persister::EventPersister;
use crate::session::ActiveSession;

/// Persistence port backed by a live session and the write worker.
pub struct SessionCompactionDeps {
    session: Arc<ActiveSession>,
    persister: Arc<EventPersister>,
    system_prompt_tokens: u64,
}

impl SessionCompactionDeps {
    /// Bind the port to a session and its persister.
    #[must_use]
    pub fn new(
        session: Arc<ActiveSession>,
        persister: Arc<EventPersister>,
        system_prompt: Option<&str>,
    ) -> Self {
        Self {
            session,
            persister,
            system_prompt_tokens: system_prompt.map_or(0, |p| estimate_tokens(p.len())),
        }
    }
}

#[async_trait]
impl CompactionDeps for SessionCompactionDeps {
    fn messages(&self) -> Vec<Message> {
        self.session.messages()
    }

    fn replace_messages(&self, messages: Vec<Message>) {
        self.session.replace_messages(messages);
    }

    /// Append the boundary marker, then the summary with the preserved tail.
    /// Both writes are awaited: a compaction only replaces the live view
    /// once its record is durable.
    async fn persist_compaction(&self, record: &CompactionRecord) -> ContextResult<()> {
        let _ = self
            .persister
            .append(
                &self.session.session_id,
                EventType::CompactBoundary,
                json!({}),
            )
            .await
            .map_err(|e| ContextError::Persistence(e.to_string()))?;

        let payload = serde_json::to_value(CompactSummaryPayload {
            summary: record.summary.clone(),
            preserved: record.preserved.clone(),
            tokens_before: record.tokens_before,
            tokens_after: record.tokens_after,
        })
        .map_err(|e| ContextError::Persistence(e.to_string()))?;
        let _ = self
            .persister
            .append(&self.session.session_id, EventType::CompactSummary, payload)
            .await
            .map_err(|e| ContextError::Persistence(e.to_string()))?;
        Ok(())
    }

    fn system_prompt_tokens(&self) -> u64 {
        self.system_prompt_tokens
    }
}

/// Build a compaction engine bound to a live session.
///
/// The engine's context limit starts at the session's; callers adjust it via
/// [`CompactionEngine::set_context_limit`] on a model switch.
#[must_use]
pub fn engine_for_session(
    session: &Arc<ActiveSession>,
    persister: &Arc<EventPersister>,
    settings: &CompactionSettings,
    system_prompt: Option<&str>,
) -> CompactionEngine {
    let deps = Arc::new(SessionCompactionDeps::new(
        Arc::clone(session),
        Arc::clone(persister),
        system_prompt,
    ));
    CompactionEngine::new(
        deps,
        CompactionConfig {
            threshold: settings.threshold,
            preserve_recent_turns: settings.preserve_recent_turns,
        },
        session.context_limit,
    )
}
