//! Runtime-only session state.
//!
//! Everything here is derived: the event log is the source of truth, and an
//! [`ActiveSession`] can always be rebuilt from a reconstructed view plus the
//! model's context limit.

use parking_lot::Mutex;
use strand_core::{Message, ReasoningLevel};
use strand_events::{Session, SessionView};

use crate::content_tracker::TurnContentTracker;

#[derive(Default)]
struct SessionState {
    messages: Vec<Message>,
    reasoning_level: Option<ReasoningLevel>,
    current_turn: u64,
    was_interrupted: bool,
    last_user_event_id: Option<String>,
}

/// In-flight state for one session being run.
pub struct ActiveSession {
    /// Session ID.
    pub session_id: String,
    /// Model the session runs on.
    pub model: String,
    /// Context window size of that model, in tokens.
    pub context_limit: u64,
    /// Streamed-content tracker for the current run.
    pub tracker: TurnContentTracker,
    state: Mutex<SessionState>,
}

impl ActiveSession {
    /// Fresh runtime state for a session with no replayed history.
    #[must_use]
    pub fn new(session_id: impl Into<String>, model: impl Into<String>, context_limit: u64) -> Self {
        Self {
            session_id: session_id.into(),
            model: model.into(),
            context_limit,
            tracker: TurnContentTracker::new(),
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Runtime state seeded from a session row and its reconstructed view.
    #[must_use]
    pub fn from_view(session: &Session, view: SessionView, context_limit: u64) -> Self {
        let active = Self::new(&session.id, &session.model, context_limit);
        {
            let mut state = active.state.lock();
            state.messages = view.messages;
            state.reasoning_level = view.reasoning_level;
            state.current_turn = view.turn_count;
            state.was_interrupted = view.was_interrupted;
        }
        active
    }

    /// Snapshot of the live message list.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().messages.clone()
    }

    /// Append one message to the live list.
    pub fn push_message(&self, message: Message) {
        self.state.lock().messages.push(message);
    }

    /// Replace the whole message list. Compaction is the only caller.
    pub fn replace_messages(&self, messages: Vec<Message>) {
        self.state.lock().messages = messages;
    }

    /// Last persisted reasoning level.
    #[must_use]
    pub fn reasoning_level(&self) -> Option<ReasoningLevel> {
        self.state.lock().reasoning_level
    }

    /// Record a persisted reasoning-level change.
    pub fn set_reasoning_level(&self, level: ReasoningLevel) {
        self.state.lock().reasoning_level = Some(level);
    }

    /// Advance to the next turn and return its number.
    pub fn begin_turn(&self) -> u64 {
        let mut state = self.state.lock();
        state.current_turn += 1;
        state.current_turn
    }

    /// Current turn number.
    #[must_use]
    pub fn current_turn(&self) -> u64 {
        self.state.lock().current_turn
    }

    /// Mark the session as interrupted.
    pub fn mark_interrupted(&self) {
        self.state.lock().was_interrupted = true;
    }

    /// Whether the most recent run was interrupted.
    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        self.state.lock().was_interrupted
    }

    /// Record the event ID of this run's user message.
    pub fn set_last_user_event_id(&self, event_id: impl Into<String>) {
        self.state.lock().last_user_event_id = Some(event_id.into());
    }

    /// Event ID of the most recent user message.
    #[must_use]
    pub fn last_user_event_id(&self) -> Option<String> {
        self.state.lock().last_user_event_id.clone()
    }
}

impl std::fmt::Debug for ActiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ActiveSession")
            .field("session_id", &self.session_id)
            .field("model", &self.model)
            .field("current_turn", &state.current_turn)
            .field("messages", &state.messages.len())
            .finish()
    }
}
