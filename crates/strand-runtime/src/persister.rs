//! Linearized event persistence.
//!
//! Every write goes through one MPSC channel to a single worker task, so
//! events for a session always thread linearly off the head regardless of
//! how many call sites race. `flush` rides the same channel as a sentinel:
//! when its reply arrives, everything enqueued before it is durable.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use strand_events::types::EventType;
use strand_events::{AppendRequest, Event, EventStore};

use crate::errors::{Result, RuntimeError};

const CHANNEL_CAPACITY: usize = 256;

enum PersistRequest {
    Append {
        session_id: String,
        event_type: EventType,
        payload: Value,
        reply: Option<oneshot::Sender<Result<Event>>>,
    },
    Flush {
        reply: oneshot::Sender<()>,
    },
}

/// MPSC-linearized write worker over the event store.
pub struct EventPersister {
    tx: mpsc::Sender<PersistRequest>,
    worker: tokio::task::JoinHandle<()>,
}

impl EventPersister {
    /// Spawn the write worker over the given store.
    #[must_use]
    pub fn new(store: Arc<EventStore>) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let worker = tokio::spawn(persist_worker(rx, store));
        Self { tx, worker }
    }

    /// Append one event and wait for durability.
    pub async fn append(
        &self,
        session_id: &str,
        event_type: EventType,
        payload: Value,
    ) -> Result<Event> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PersistRequest::Append {
                session_id: session_id.to_owned(),
                event_type,
                payload,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| self.channel_error())?;

        reply_rx
            .await
            .map_err(|_| RuntimeError::Persistence("Persist reply dropped".into()))?
    }

    /// Enqueue one event without waiting. A full channel drops the write
    /// with a warning; callers that need durability use [`append`](Self::append).
    pub fn append_fire_and_forget(&self, session_id: &str, event_type: EventType, payload: Value) {
        if let Err(e) = self.tx.try_send(PersistRequest::Append {
            session_id: session_id.to_owned(),
            event_type,
            payload,
            reply: None,
        }) {
            warn!(?event_type, error = %e, "fire-and-forget persist dropped: channel full");
        }
    }

    /// Wait until everything enqueued so far is durable.
    pub async fn flush(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PersistRequest::Flush { reply: reply_tx })
            .await
            .map_err(|_| self.channel_error())?;
        let _ = reply_rx.await;
        Ok(())
    }

    fn channel_error(&self) -> RuntimeError {
        if self.worker.is_finished() {
            RuntimeError::Persistence("Persist worker panicked or exited".into())
        } else {
            RuntimeError::Persistence("Persist channel closed".into())
        }
    }

    #[cfg(test)]
    fn abort_worker(&self) {
        self.worker.abort();
    }
}

async fn persist_worker(mut rx: mpsc::Receiver<PersistRequest>, store: Arc<EventStore>) {
    while let Some(req) = rx.recv().await {
        match req {
            PersistRequest::Flush { reply } => {
                let _ = reply.send(());
            }
            PersistRequest::Append {
                session_id,
                event_type,
                payload,
                reply,
            } => {
                let result = store
                    .append(&AppendRequest {
                        session_id: &session_id,
                        event_type,
                        payload,
                        parent_id: None,
                    })
                    .map_err(|e| RuntimeError::Persistence(e.to_string()));

                match (reply, result) {
                    (Some(reply), result) => {
                        let _ = reply.send(result);
                    }
                    (None, Err(e)) => {
                        warn!(session_id, ?event_type, error = %e, "fire-and-forget persist failed");
                    }
                    (None, Ok(_)) => {}
                }
            }
        }
    }
}
