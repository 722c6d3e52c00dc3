// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-app session bookkeeping.
//!
//! Every `OpenShell` stream holds one reference on its app's session. The
//! first reference schedules an *open* op (drive the app to Live), the last
//! drop schedules a *close* op (drive it back to Rest). Overlapping intents
//! coalesce: concurrent opens share one op's completion, an open cancels an
//! outstanding close and vice versa. The mutex guards only the coalescing
//! decision; op bodies run on their own tasks and honor preemption through
//! their cancellation token.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

use cliapp_api::CliApp;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type OpResult = Result<(), String>;

/// Fan-out for an open op's progress lines. Every caller coalesced onto
/// the op subscribes, so each of their clients sees the narration.
#[derive(Clone, Default)]
pub struct ProgressSink {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<String>>>>,
}

impl ProgressSink {
    fn subscribe(&self, tx: mpsc::Sender<String>) {
        self.subscribers.lock().push(tx);
    }

    /// Deliver one progress line to every subscriber.
    pub async fn line(&self, text: &str) {
        let subscribers = self.subscribers.lock().clone();
        for subscriber in subscribers {
            let _ = subscriber.send(text.to_string()).await;
        }
    }
}

struct OpHandle {
    id: u64,
    cancel: CancellationToken,
    done: watch::Receiver<Option<OpResult>>,
    progress: ProgressSink,
}

#[derive(Default)]
struct SessionInner {
    /// Cached record; `None` while a transition is committing.
    app: Option<CliApp>,
    outgoing_open: Option<OpHandle>,
    outgoing_close: Option<OpHandle>,
}

/// Session state for one `(namespace, name)`. Cheap to clone; clones share
/// the same state.
#[derive(Clone, Default)]
pub struct AppSession {
    active: Arc<AtomicI32>,
    next_op: Arc<AtomicU64>,
    inner: Arc<Mutex<SessionInner>>,
}

impl AppSession {
    /// Current reference count, for tests and logging.
    pub fn active_count(&self) -> i32 {
        self.active.load(Ordering::SeqCst)
    }

    /// Take a reference and make sure the app is (becoming) Live.
    ///
    /// `apply` performs the remote open: patch `targetPhase` to Live and
    /// watch until the app reports Live, narrating through the sink. It
    /// runs at most once per coalesced group of callers; every caller
    /// resolves with the same published record and `progress` hears the
    /// shared op's lines.
    pub async fn open<F, Fut>(
        &self,
        progress: mpsc::Sender<String>,
        apply: F,
    ) -> Result<CliApp, String>
    where
        F: FnOnce(ProgressSink, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<CliApp, String>> + Send + 'static,
    {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;

        if active > 1 {
            // The cached record may be absent while a transition commits;
            // fall through and join the outstanding op in that case.
            if let Some(app) = self.inner.lock().app.clone() {
                return Ok(app);
            }
        }

        let mut done = self.schedule_open(progress, apply);
        wait_op(&mut done).await?;

        self.inner
            .lock()
            .app
            .clone()
            .ok_or_else(|| "app session closed while opening".to_string())
    }

    /// Drop a reference; the last one schedules the remote close.
    ///
    /// `apply` performs the remote close: patch `targetPhase` back to Rest
    /// (idempotent when already Rest).
    pub async fn close<F, Fut>(&self, apply: F) -> Result<(), String>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let active = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        if active > 0 {
            return Ok(());
        }
        if active < 0 {
            // Unbalanced close; repair the count and bail.
            self.active.fetch_add(1, Ordering::SeqCst);
            return Err("session close without a matching open".to_string());
        }

        let mut done = self.schedule_close(apply);
        wait_op(&mut done).await
    }

    fn schedule_open<F, Fut>(
        &self,
        progress: mpsc::Sender<String>,
        apply: F,
    ) -> watch::Receiver<Option<OpResult>>
    where
        F: FnOnce(ProgressSink, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<CliApp, String>> + Send + 'static,
    {
        let mut inner = self.inner.lock();

        // Coalesce onto the op already in flight; this caller still hears
        // its progress.
        if let Some(open) = &inner.outgoing_open {
            open.progress.subscribe(progress);
            return open.done.clone();
        }

        // An open preempts a pending close.
        if let Some(close) = inner.outgoing_close.take() {
            debug!("open preempts outstanding close");
            close.cancel.cancel();
        }

        let id = self.next_op.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(None);
        let sink = ProgressSink::default();
        sink.subscribe(progress);
        inner.outgoing_open = Some(OpHandle {
            id,
            cancel: cancel.clone(),
            done: rx.clone(),
            progress: sink.clone(),
        });
        drop(inner);

        let session = self.clone();
        tokio::spawn(async move {
            let result = apply(sink, cancel.clone()).await;

            let outcome = {
                let mut inner = session.inner.lock();
                // A close may have preempted this op after the apply body
                // finished; publishing then would resurrect a closed app.
                let still_current =
                    inner.outgoing_open.as_ref().is_some_and(|op| op.id == id);
                let outcome = match result {
                    Ok(app) if still_current => {
                        inner.app = Some(app);
                        Ok(())
                    }
                    Ok(_) => Err("open preempted by close".to_string()),
                    Err(err) => Err(err),
                };
                if still_current {
                    inner.outgoing_open = None;
                }
                outcome
            };

            cancel.cancel();
            let _ = tx.send(Some(outcome));
        });

        rx
    }

    fn schedule_close<F, Fut>(&self, apply: F) -> watch::Receiver<Option<OpResult>>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let mut inner = self.inner.lock();

        if let Some(close) = &inner.outgoing_close {
            return close.done.clone();
        }

        // A close preempts a pending open; its waiters fail through the
        // canceled watch.
        if let Some(open) = inner.outgoing_open.take() {
            info!("close preempts outstanding open");
            open.cancel.cancel();
        }

        inner.app = None;

        let id = self.next_op.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(None);
        inner.outgoing_close = Some(OpHandle {
            id,
            cancel: cancel.clone(),
            done: rx.clone(),
            progress: ProgressSink::default(),
        });
        drop(inner);

        let session = self.clone();
        tokio::spawn(async move {
            let result = apply(cancel.clone()).await;

            {
                let mut inner = session.inner.lock();
                if inner.outgoing_close.as_ref().is_some_and(|op| op.id == id) {
                    inner.outgoing_close = None;
                }
            }

            if let Err(err) = &result {
                warn!(error = %err, "close op failed");
            }
            cancel.cancel();
            let _ = tx.send(Some(result));
        });

        rx
    }
}

/// Wait for an op's completion signal. A sender dropped without a value
/// means the op was preempted.
async fn wait_op(done: &mut watch::Receiver<Option<OpResult>>) -> OpResult {
    loop {
        if let Some(result) = done.borrow().clone() {
            return result;
        }
        if done.changed().await.is_err() {
            return Err("session op was preempted".to_string());
        }
    }
}

/// Gate-wide map of app sessions.
#[derive(Default)]
pub struct SessionMap {
    sessions: Mutex<HashMap<(String, String), AppSession>>,
}

impl SessionMap {
    pub fn session(&self, namespace: &str, name: &str) -> AppSession {
        let key = (namespace.to_string(), name.to_string());
        self.sessions.lock().entry(key).or_default().clone()
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
