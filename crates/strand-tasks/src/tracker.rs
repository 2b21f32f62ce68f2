//! Generic named-task tracker.
//!
//! Registers a named asynchronous unit of work, removes it from the pending
//! set when it settles (success or panic), and offers a bounded wait-for-all
//! that resolves either when everything settled or when the timeout elapsed.
//! A timeout is not an error: pending units remain pending and can be
//! inspected afterward.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use tokio::sync::Notify;
use tracing::warn;

struct Inner {
    pending: DashMap<String, ()>,
    settled: Notify,
}

/// Tracks named fire-and-forget futures until they settle.
#[derive(Clone)]
pub struct TaskTracker {
    inner: Arc<Inner>,
}

impl TaskTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: DashMap::new(),
                settled: Notify::new(),
            }),
        }
    }

    /// Spawn a future as a tracked named task.
    ///
    /// The task is removed from the pending set when it settles, panics
    /// included (a panicking task is logged, not propagated).
    pub fn track<F>(&self, name: impl Into<String>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let _ = self.inner.pending.insert(name.clone(), ());

        let inner = Arc::clone(&self.inner);
        drop(tokio::spawn(async move {
            if let Err(panic) = std::panic::AssertUnwindSafe(future).catch_unwind().await {
                let what = panic
                    .downcast_ref::<&str>()
                    .map_or_else(|| "non-string panic".to_owned(), ToString::to_string);
                warn!(task = %name, panic = %what, "tracked task panicked");
            }
            let _ = inner.pending.remove(&name);
            inner.settled.notify_waiters();
        }));
    }

    /// Number of tasks that have not settled yet.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Names of tasks that have not settled yet.
    #[must_use]
    pub fn pending_names(&self) -> Vec<String> {
        self.inner.pending.iter().map(|e| e.key().clone()).collect()
    }

    /// Wait until every tracked task settles, or until `timeout` elapses
    /// when one is given.
    ///
    /// Returns `true` when the pending set drained, `false` on timeout.
    /// Never errors; timed-out tasks keep running and stay in the set.
    pub async fn wait_for_all(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            let notified = self.inner.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.pending.is_empty() {
                return true;
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return self.inner.pending.is_empty();
                    }
                }
                None => notified.await,
            }
        }
    }
}

impl Default for TaskTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskTracker")
            .field("pending_count", &self.pending_count())
            .finish()
    }
}
