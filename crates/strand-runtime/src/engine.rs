//! Turn execution engine.
//!
//! Runs one user prompt to settlement: persists the user message, assembles
//! per-turn context from collaborator ports, streams the model, executes
//! requested tools, and converts the outcome (success, interruption, or
//! failure) into events. No retries live here — retry belongs to the model
//! streaming collaborator; this engine's only repair action is persisting
//! whatever partial state exists and surfacing the failure.
//!
//! Causal ordering invariant: the `message.assistant` event carrying a tool
//! use is durably written before that tool's `tool.call` / `tool.result`
//! events. Pre-tool content is flushed eagerly when the tool phase begins;
//! the tracker's per-turn flushed flag keeps interrupt handling from
//! persisting it twice.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use strand_context::CompactionEngine;
use strand_core::Message;
use strand_core::constants::INTERRUPTED_TOOL_RESULT_TEXT;
use strand_core::{StopReason, TokenUsage};
use strand_events::types::{
    ConfigReasoningLevelPayload, ErrorAgentPayload, EventType, MessageAssistantPayload,
    MessageUserPayload, NotificationInterruptedPayload, ToolCallPayload, ToolResultPayload,
};
use strand_tasks::SubagentTracker;

use crate::content_tracker::ToolCallStatus;
use crate::emitter::{EventEmitter, Notification};
use crate::errors::{Result, RuntimeError};
use crate::persister::EventPersister;
use crate::ports::{ContextSources, ModelStream, StreamOutcome, ToolExecutor};
use crate::session::ActiveSession;
use crate::subagents::format_subagent_results;
use crate::types::{RunContext, RunOptions, RunOutcome, RunReport, TurnReport};

/// Executes runs against one event log.
pub struct TurnEngine {
    persister: Arc<EventPersister>,
    model: Arc<dyn ModelStream>,
    tools: Arc<dyn ToolExecutor>,
    sources: Arc<dyn ContextSources>,
    emitter: Arc<dyn EventEmitter>,
    subagents: Arc<SubagentTracker>,
    compaction: Option<Arc<CompactionEngine>>,
    system_prompt: Option<String>,
    max_turns: u64,
}

impl TurnEngine {
    /// Wire the engine to its collaborators.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        persister: Arc<EventPersister>,
        model: Arc<dyn ModelStream>,
        tools: Arc<dyn ToolExecutor>,
        sources: Arc<dyn ContextSources>,
        emitter: Arc<dyn EventEmitter>,
        subagents: Arc<SubagentTracker>,
        compaction: Option<Arc<CompactionEngine>>,
        system_prompt: Option<String>,
        max_turns: u64,
    ) -> Self {
        Self {
            persister,
            model,
            tools,
            sources,
            emitter,
            subagents,
            compaction,
            system_prompt,
            max_turns,
        }
    }

    /// Run one prompt to settlement.
    ///
    /// The caller serializes prompts per session; independent sessions run
    /// fully concurrently. A thrown failure always reaches the caller even
    /// when partial state was persisted along the way.
    pub async fn run(
        &self,
        session: &ActiveSession,
        options: RunOptions,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        // Validation happens before any event is written.
        options.validate()?;

        // 1. Durability checkpoint for anything still buffered.
        self.persister.flush().await?;

        // 2. Persist the user message and track its event ID.
        let content = options.user_content();
        let user_event = self
            .persister
            .append(
                &session.session_id,
                EventType::MessageUser,
                to_payload(&MessageUserPayload {
                    content: content.clone(),
                    skill_refs: options.skill_refs.clone(),
                    spell_refs: options.spell_refs.clone(),
                })?,
            )
            .await?;
        session.set_last_user_event_id(user_event.id);
        session.push_message(Message::User { content });

        // 3. Reasoning-level change, only when it actually changes.
        if let Some(new_level) = options.reasoning_level {
            let previous = session.reasoning_level();
            if previous != Some(new_level) {
                let _ = self
                    .persister
                    .append(
                        &session.session_id,
                        EventType::ConfigReasoningLevel,
                        to_payload(&ConfigReasoningLevelPayload {
                            previous,
                            new: new_level,
                        })?,
                    )
                    .await?;
                session.set_reasoning_level(new_level);
                debug!(session_id = %session.session_id, level = new_level.as_str(), "reasoning level changed");
            }
        }

        // 4. Assemble the run context. Absent values stay absent.
        let settled = self.subagents.consume_pending_results();
        let mut ctx = RunContext {
            messages: Vec::new(),
            system_prompt: self.system_prompt.clone(),
            skill_context: self.sources.skill_context(&options.skill_refs).await,
            subagent_context: format_subagent_results(&settled),
            todo_context: self.sources.todo_context().await,
            reasoning_level: session.reasoning_level(),
        };

        // Pre-turn compaction consult: recommend, never compact inline.
        if let Some(compaction) = &self.compaction {
            let _ = compaction.trigger_if_needed();
        }

        let mut reports: Vec<TurnReport> = Vec::new();
        let mut run_usage = TokenUsage::default();

        // 5. Turn loop: stream, persist, execute tools, repeat while the
        // model keeps asking for tools.
        loop {
            let turn = session.begin_turn();
            session.tracker.begin_turn();
            ctx.messages = session.messages();

            self.persister.append_fire_and_forget(
                &session.session_id,
                EventType::StreamTurnStart,
                json!({ "turn": turn }),
            );

            let outcome = match self.model.stream_turn(&ctx, &session.tracker, cancel).await {
                Ok(outcome) => outcome,
                Err(err) => return self.fail(session, err).await,
            };

            let (stop_reason, usage) = match outcome {
                StreamOutcome::Interrupted => {
                    return self.interrupt(session, turn, reports).await;
                }
                StreamOutcome::Completed { stop_reason, usage } => (stop_reason, usage),
            };

            // Persist the full turn content (tool uses included) before any
            // tool.call event.
            let turn_content = session.tracker.take_turn_content();
            if !turn_content.is_empty() {
                let payload = to_payload(&MessageAssistantPayload {
                    content: turn_content.clone(),
                    stop_reason: Some(stop_reason),
                    token_usage: Some(usage),
                    turn: Some(turn),
                    interrupted: false,
                })?;
                if let Err(err) = self
                    .persister
                    .append(&session.session_id, EventType::MessageAssistant, payload)
                    .await
                {
                    return self.fail(session, err).await;
                }
                session.push_message(Message::Assistant {
                    content: turn_content,
                    stop_reason: Some(stop_reason),
                    usage: Some(usage),
                });
            }

            run_usage.add(&usage);
            if let Some(compaction) = &self.compaction {
                compaction.update_usage(usage.input_tokens.saturating_add(usage.output_tokens));
                let _ = compaction.trigger_if_needed();
            }

            let pending = session.tracker.pending_tools();
            reports.push(TurnReport {
                turn,
                stop_reason: Some(stop_reason),
                usage: Some(usage),
                tool_calls: pending.len(),
                interrupted: false,
            });

            if stop_reason == StopReason::ToolUse && !pending.is_empty() {
                for call in pending {
                    if cancel.is_cancelled() {
                        return self.interrupt(session, turn, reports).await;
                    }

                    if let Err(err) = self
                        .persister
                        .append(
                            &session.session_id,
                            EventType::ToolCall,
                            to_payload(&ToolCallPayload {
                                tool_call_id: call.id.clone(),
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                            })?,
                        )
                        .await
                    {
                        return self.fail(session, err).await;
                    }
                    let _ = session.tracker.set_tool_status(&call.id, ToolCallStatus::Running);

                    let outcome = self.tools.execute(&call, cancel).await;
                    let status = if outcome.is_error {
                        ToolCallStatus::Error
                    } else {
                        ToolCallStatus::Completed
                    };

                    if let Err(err) = self
                        .persister
                        .append(
                            &session.session_id,
                            EventType::ToolResult,
                            to_payload(&ToolResultPayload {
                                tool_call_id: call.id.clone(),
                                content: outcome.content.clone(),
                                is_error: outcome.is_error,
                            })?,
                        )
                        .await
                    {
                        return self.fail(session, err).await;
                    }
                    let _ = session.tracker.set_tool_status(&call.id, status);
                    session.push_message(Message::ToolResult {
                        tool_call_id: call.id,
                        content: outcome.content,
                        is_error: outcome.is_error,
                    });
                }

                self.persister.append_fire_and_forget(
                    &session.session_id,
                    EventType::StreamTurnEnd,
                    json!({ "turn": turn }),
                );

                if reports.len() as u64 >= self.max_turns {
                    return self.fail(session, RuntimeError::MaxTurns(self.max_turns)).await;
                }
                continue;
            }

            // 6. Success: flush, then notify turn completion before run
            // completion.
            self.persister.append_fire_and_forget(
                &session.session_id,
                EventType::StreamTurnEnd,
                json!({ "turn": turn }),
            );
            self.persister.flush().await?;

            self.emitter.emit(Notification::TurnComplete {
                session_id: session.session_id.clone(),
                turn,
                stop_reason,
            });
            self.emitter.emit(Notification::AgentComplete {
                session_id: session.session_id.clone(),
                success: true,
                usage: run_usage,
            });

            info!(
                session_id = %session.session_id,
                turns = reports.len(),
                stop_reason = stop_reason.as_str(),
                "run completed"
            );
            return Ok(RunReport {
                outcome: RunOutcome::Success {
                    stop_reason,
                    usage: run_usage,
                },
                turns: reports,
            });
        }
    }

    /// 7. Interrupted: persist whatever the current turn accumulated,
    /// synthesize error results for unfinished tools, record the
    /// interruption, and settle the run as interrupted (not an error).
    async fn interrupt(
        &self,
        session: &ActiveSession,
        turn: u64,
        mut reports: Vec<TurnReport>,
    ) -> Result<RunReport> {
        let partial = session.tracker.interrupted_content();

        if !partial.assistant.is_empty() {
            let payload = to_payload(&MessageAssistantPayload {
                content: partial.assistant.clone(),
                stop_reason: Some(StopReason::Interrupted),
                token_usage: None,
                turn: Some(turn),
                interrupted: true,
            })?;
            self.persist_best_effort(session, EventType::MessageAssistant, payload)
                .await;
            session.push_message(Message::Assistant {
                content: partial.assistant,
                stop_reason: Some(StopReason::Interrupted),
                usage: None,
            });
        }

        for tool_call_id in &partial.unfinished_tool_ids {
            let payload = to_payload(&ToolResultPayload {
                tool_call_id: tool_call_id.clone(),
                content: INTERRUPTED_TOOL_RESULT_TEXT.into(),
                is_error: true,
            })?;
            self.persist_best_effort(session, EventType::ToolResult, payload)
                .await;
            session.push_message(Message::ToolResult {
                tool_call_id: tool_call_id.clone(),
                content: INTERRUPTED_TOOL_RESULT_TEXT.into(),
                is_error: true,
            });
        }

        self.persist_best_effort(
            session,
            EventType::NotificationInterrupted,
            to_payload(&NotificationInterruptedPayload { turn })?,
        )
        .await;

        session.mark_interrupted();
        session.tracker.clear_turn();
        self.emitter.emit(Notification::TurnInterrupted {
            session_id: session.session_id.clone(),
            turn,
        });

        info!(session_id = %session.session_id, turn, "run interrupted");
        reports.push(TurnReport {
            turn,
            stop_reason: Some(StopReason::Interrupted),
            usage: None,
            tool_calls: 0,
            interrupted: true,
        });
        Ok(RunReport {
            outcome: RunOutcome::Interrupted,
            turns: reports,
        })
    }

    /// 8. Error: flush, best-effort persist `error.agent`, and propagate
    /// the original error. A secondary persistence failure is notified,
    /// never allowed to mask the original.
    async fn fail(&self, session: &ActiveSession, err: RuntimeError) -> Result<RunReport> {
        let _ = self.persister.flush().await;

        let payload = serde_json::to_value(ErrorAgentPayload {
            error: err.to_string(),
            recoverable: false,
        })
        .unwrap_or_else(|_| json!({ "error": err.to_string(), "recoverable": false }));

        if let Err(persist_err) = self
            .persister
            .append(&session.session_id, EventType::ErrorAgent, payload)
            .await
        {
            warn!(
                session_id = %session.session_id,
                error = %persist_err,
                "failed to persist error.agent"
            );
            self.emitter.emit(Notification::PersistenceError {
                session_id: session.session_id.clone(),
                error: persist_err.to_string(),
            });
        }

        self.emitter.emit(Notification::AgentComplete {
            session_id: session.session_id.clone(),
            success: false,
            usage: TokenUsage::default(),
        });
        Err(err)
    }

    async fn persist_best_effort(
        &self,
        session: &ActiveSession,
        event_type: EventType,
        payload: Value,
    ) {
        if let Err(err) = self
            .persister
            .append(&session.session_id, event_type, payload)
            .await
        {
            warn!(session_id = %session.session_id, ?event_type, error = %err, "persist failed");
            self.emitter.emit(Notification::PersistenceError {
                session_id: session.session_id.clone(),
                error: err.to_string(),
            });
        }
    }
}

fn to_payload<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| RuntimeError::Persistence(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Map;

    use strand_core::ReasoningLevel;
    use strand_events::{ConnectionConfig, EventStore, new_in_memory, run_migrations};
    use strand_tasks::CompleteOptions;

    use crate::content_tracker::{ToolCallRecord, TurnContentTracker};
    use crate::emitter::ChannelEmitter;
    use crate::ports::{NullSources, ToolOutcome};

    enum Script {
        Text {
            text: &'static str,
            stop: StopReason,
        },
        Tool {
            pre_text: &'static str,
            id: &'static str,
            name: &'static str,
        },
        Interrupt {
            partial: &'static str,
        },
        Fail {
            message: &'static str,
        },
    }

    struct ScriptedModel {
        script: Mutex<VecDeque<Script>>,
        seen: Mutex<Vec<RunContext>>,
    }

    impl ScriptedModel {
        fn new(script: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn usage() -> TokenUsage {
            TokenUsage {
                input_tokens: 1_000,
                output_tokens: 50,
                ..TokenUsage::default()
            }
        }
    }

    #[async_trait]
    impl ModelStream for ScriptedModel {
        async fn stream_turn(
            &self,
            ctx: &RunContext,
            tracker: &TurnContentTracker,
            _cancel: &CancellationToken,
        ) -> Result<StreamOutcome> {
            self.seen.lock().push(ctx.clone());
            match self.script.lock().pop_front().expect("script exhausted") {
                Script::Text { text, stop } => {
                    tracker.text_delta(text);
                    Ok(StreamOutcome::Completed {
                        stop_reason: stop,
                        usage: Self::usage(),
                    })
                }
                Script::Tool { pre_text, id, name } => {
                    tracker.text_delta(pre_text);
                    tracker.tool_use(id, name, Map::new());
                    Ok(StreamOutcome::Completed {
                        stop_reason: StopReason::ToolUse,
                        usage: Self::usage(),
                    })
                }
                Script::Interrupt { partial } => {
                    tracker.text_delta(partial);
                    Ok(StreamOutcome::Interrupted)
                }
                Script::Fail { message } => Err(RuntimeError::Model(message.into())),
            }
        }
    }

    struct EchoTools;

    #[async_trait]
    impl ToolExecutor for EchoTools {
        async fn execute(
            &self,
            call: &ToolCallRecord,
            _cancel: &CancellationToken,
        ) -> ToolOutcome {
            ToolOutcome {
                content: format!("{} ok", call.name),
                is_error: false,
            }
        }
    }

    struct Harness {
        store: Arc<EventStore>,
        session_id: String,
        active: ActiveSession,
        engine: TurnEngine,
        model: Arc<ScriptedModel>,
        subagents: Arc<SubagentTracker>,
        rx: tokio::sync::mpsc::UnboundedReceiver<Notification>,
    }

    fn harness(script: Vec<Script>) -> Harness {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            let _ = run_migrations(&conn).unwrap();
        }
        let store = Arc::new(EventStore::new(pool));
        let session = store.create_session("test-model", "/tmp", None, None).unwrap();

        let persister = Arc::new(EventPersister::new(Arc::clone(&store)));
        let model = ScriptedModel::new(script);
        let subagents = Arc::new(SubagentTracker::new());
        let (emitter, rx) = ChannelEmitter::channel();

        let engine = TurnEngine::new(
            persister,
            Arc::clone(&model) as Arc<dyn ModelStream>,
            Arc::new(EchoTools),
            Arc::new(NullSources),
            Arc::new(emitter),
            Arc::clone(&subagents),
            None,
            Some("You are a coding agent.".into()),
            10,
        );
        let active = ActiveSession::new(&session.id, "test-model", 200_000);

        Harness {
            store,
            session_id: session.id,
            active,
            engine,
            model,
            subagents,
            rx,
        }
    }

    fn event_types(h: &Harness) -> Vec<EventType> {
        let head = h
            .store
            .get_session(&h.session_id)
            .unwrap()
            .head_event_id
            .unwrap();
        h.store
            .get_ancestors(&head)
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Notification>) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(n) = rx.try_recv() {
            names.push(n.name());
        }
        names
    }

    #[tokio::test]
    async fn plain_text_turn_persists_in_causal_order() {
        let mut h = harness(vec![Script::Text {
            text: "Hello!",
            stop: StopReason::EndTurn,
        }]);

        let report = h
            .engine
            .run(&h.active, RunOptions::text("hi"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            event_types(&h),
            vec![
                EventType::SessionStart,
                EventType::MessageUser,
                EventType::StreamTurnStart,
                EventType::MessageAssistant,
                EventType::StreamTurnEnd,
            ]
        );
        assert_eq!(report.turns.len(), 1);
        assert!(matches!(
            report.outcome,
            RunOutcome::Success {
                stop_reason: StopReason::EndTurn,
                ..
            }
        ));
        assert_eq!(drain(&mut h.rx), vec!["turn_complete", "agent_complete"]);
    }

    #[tokio::test]
    async fn tool_turn_persists_assistant_before_tool_events() {
        let h = harness(vec![
            Script::Tool {
                pre_text: "Let me check.",
                id: "tcl_1",
                name: "read_file",
            },
            Script::Text {
                text: "It's fine.",
                stop: StopReason::EndTurn,
            },
        ]);

        let report = h
            .engine
            .run(&h.active, RunOptions::text("check it"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            event_types(&h),
            vec![
                EventType::SessionStart,
                EventType::MessageUser,
                EventType::StreamTurnStart,
                EventType::MessageAssistant,
                EventType::ToolCall,
                EventType::ToolResult,
                EventType::StreamTurnEnd,
                EventType::StreamTurnStart,
                EventType::MessageAssistant,
                EventType::StreamTurnEnd,
            ]
        );
        assert_eq!(report.turns.len(), 2);
        assert_eq!(report.turns[0].tool_calls, 1);

        // Live view mirrors the log: user, assistant+tool use, tool result,
        // final assistant.
        let messages = h.active.messages();
        assert_eq!(messages.len(), 4);
        assert!(matches!(&messages[2], Message::ToolResult { content, .. } if content == "read_file ok"));
    }

    #[tokio::test]
    async fn empty_prompt_writes_no_events() {
        let h = harness(vec![]);
        let err = h
            .engine
            .run(&h.active, RunOptions::text("   "), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.category(), "validation");
        assert_eq!(event_types(&h), vec![EventType::SessionStart]);
    }

    #[tokio::test]
    async fn reasoning_level_persists_only_on_change() {
        let h = harness(vec![
            Script::Text {
                text: "one",
                stop: StopReason::EndTurn,
            },
            Script::Text {
                text: "two",
                stop: StopReason::EndTurn,
            },
        ]);

        let options = RunOptions {
            prompt: "think hard".into(),
            reasoning_level: Some(ReasoningLevel::High),
            ..RunOptions::default()
        };
        let _ = h
            .engine
            .run(&h.active, options.clone(), &CancellationToken::new())
            .await
            .unwrap();
        let _ = h
            .engine
            .run(&h.active, options, &CancellationToken::new())
            .await
            .unwrap();

        let changes = event_types(&h)
            .into_iter()
            .filter(|t| *t == EventType::ConfigReasoningLevel)
            .count();
        assert_eq!(changes, 1, "unchanged level must not churn events");
        assert_eq!(h.active.reasoning_level(), Some(ReasoningLevel::High));
    }

    #[tokio::test]
    async fn interrupt_mid_stream_persists_partial_content() {
        let mut h = harness(vec![Script::Interrupt {
            partial: "I was about to say",
        }]);

        let report = h
            .engine
            .run(&h.active, RunOptions::text("go"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Interrupted);
        assert!(h.active.was_interrupted());

        let head = h.store.get_session(&h.session_id).unwrap().head_event_id.unwrap();
        let events = h.store.get_ancestors(&head).unwrap();
        let assistant = events
            .iter()
            .find(|e| e.event_type == EventType::MessageAssistant)
            .expect("partial assistant content must be persisted");
        assert_eq!(assistant.payload["interrupted"], true);
        assert_eq!(assistant.payload["stopReason"], "interrupted");
        assert!(
            events
                .iter()
                .any(|e| e.event_type == EventType::NotificationInterrupted)
        );
        assert!(drain(&mut h.rx).contains(&"turn_interrupted"));
    }

    #[tokio::test]
    async fn interrupt_before_tools_does_not_duplicate_content() {
        let h = harness(vec![Script::Tool {
            pre_text: "Running tools.",
            id: "tcl_1",
            name: "bash",
        }]);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = h
            .engine
            .run(&h.active, RunOptions::text("go"), &cancel)
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Interrupted);

        let types = event_types(&h);
        let assistants = types
            .iter()
            .filter(|t| **t == EventType::MessageAssistant)
            .count();
        assert_eq!(assistants, 1, "flushed pre-tool content must not repeat");

        let head = h.store.get_session(&h.session_id).unwrap().head_event_id.unwrap();
        let events = h.store.get_ancestors(&head).unwrap();
        let synthetic = events
            .iter()
            .find(|e| e.event_type == EventType::ToolResult)
            .expect("unfinished tool needs a synthetic result");
        assert_eq!(synthetic.payload["toolCallId"], "tcl_1");
        assert_eq!(synthetic.payload["isError"], true);
        assert_eq!(synthetic.payload["content"], INTERRUPTED_TOOL_RESULT_TEXT);
    }

    #[tokio::test]
    async fn model_failure_persists_error_agent_and_propagates() {
        let mut h = harness(vec![Script::Fail {
            message: "stream reset",
        }]);

        let err = h
            .engine
            .run(&h.active, RunOptions::text("go"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Model error: stream reset");

        let head = h.store.get_session(&h.session_id).unwrap().head_event_id.unwrap();
        let events = h.store.get_ancestors(&head).unwrap();
        let error_event = events
            .iter()
            .find(|e| e.event_type == EventType::ErrorAgent)
            .expect("error.agent must be persisted for audit");
        assert_eq!(error_event.payload["recoverable"], false);
        assert!(
            error_event.payload["error"]
                .as_str()
                .unwrap()
                .contains("stream reset")
        );

        let names = drain(&mut h.rx);
        assert!(names.contains(&"agent_complete"));
    }

    #[tokio::test]
    async fn subagent_results_flow_into_context_at_most_once() {
        let h = harness(vec![
            Script::Text {
                text: "noted",
                stop: StopReason::EndTurn,
            },
            Script::Text {
                text: "again",
                stop: StopReason::EndTurn,
            },
        ]);

        h.subagents.spawn(strand_tasks::SpawnParams {
            session_id: "ses_child".into(),
            spawn_type: "task".into(),
            task: "research".into(),
            model: "test-model".into(),
            working_directory: "/tmp".into(),
            spawn_event_id: "evt_spawn".into(),
        });
        let _ = h.subagents.complete(
            "ses_child",
            "research done".into(),
            1,
            TokenUsage::default(),
            100,
            CompleteOptions::default(),
        );

        let _ = h
            .engine
            .run(&h.active, RunOptions::text("first"), &CancellationToken::new())
            .await
            .unwrap();
        let _ = h
            .engine
            .run(&h.active, RunOptions::text("second"), &CancellationToken::new())
            .await
            .unwrap();

        let seen = h.model.seen.lock();
        assert!(
            seen[0]
                .subagent_context
                .as_deref()
                .unwrap()
                .contains("research done")
        );
        assert_eq!(seen[1].subagent_context, None, "results deliver at most once");
        // Absent collaborator context passes through as absent.
        assert_eq!(seen[0].skill_context, None);
        assert_eq!(seen[0].todo_context, None);
        assert_eq!(
            seen[0].system_prompt.as_deref(),
            Some("You are a coding agent.")
        );
    }

    #[tokio::test]
    async fn runaway_tool_loop_hits_max_turns() {
        let mut script = Vec::new();
        for _ in 0..12 {
            script.push(Script::Tool {
                pre_text: "looping",
                id: "tcl_x",
                name: "bash",
            });
        }
        let h = harness(script);

        let err = h
            .engine
            .run(&h.active, RunOptions::text("loop"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::MaxTurns(10)));
    }
}
