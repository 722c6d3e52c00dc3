// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cliapp_api::CliAppSpec;

use super::*;

fn fake_app(name: &str) -> CliApp {
    CliApp::new(name, CliAppSpec::default())
}

fn app_name(app: &CliApp) -> String {
    app.metadata.name.clone().unwrap_or_default()
}

/// A progress subscriber whose lines nobody reads.
fn quiet() -> mpsc::Sender<String> {
    mpsc::channel(8).0
}

#[tokio::test]
async fn open_publishes_the_app() {
    let session = AppSession::default();
    let app = session
        .open(quiet(), |_progress, _cancel| async { Ok(fake_app("kubectl")) })
        .await
        .unwrap();
    assert_eq!(app_name(&app), "kubectl");
    assert_eq!(session.active_count(), 1);
}

#[tokio::test]
async fn second_open_reuses_the_cached_app() {
    let session = AppSession::default();
    let opens = Arc::new(AtomicUsize::new(0));

    for expected_active in 1..=2 {
        let counter = Arc::clone(&opens);
        let app = session
            .open(quiet(), move |_progress, _cancel| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(fake_app("kubectl"))
            })
            .await
            .unwrap();
        assert_eq!(app_name(&app), "kubectl");
        assert_eq!(session.active_count(), expected_active);
    }

    assert_eq!(opens.load(Ordering::SeqCst), 1);
}

/// Five concurrent opens execute exactly one op, all resolve with the same
/// published record, and every caller hears the op's progress lines.
#[tokio::test]
async fn concurrent_opens_coalesce() {
    let session = AppSession::default();
    let opens = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let session = session.clone();
        let opens = Arc::clone(&opens);
        let (progress_tx, mut progress_rx) = mpsc::channel(8);
        handles.push(tokio::spawn(async move {
            let app = session
                .open(progress_tx, move |progress, _cancel| async move {
                    opens.fetch_add(1, Ordering::SeqCst);
                    // Let the other callers pile onto this op before the
                    // narration starts.
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    progress.line("preparing Pods...").await;
                    Ok(fake_app("kubectl"))
                })
                .await;
            let line = progress_rx.recv().await;
            (app, line)
        }));
    }

    for handle in handles {
        let (app, line) = handle.await.unwrap();
        assert_eq!(app_name(&app.unwrap()), "kubectl");
        assert_eq!(line.as_deref(), Some("preparing Pods..."));
    }
    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert_eq!(session.active_count(), 5);
}

#[tokio::test]
async fn open_failure_propagates_to_every_waiter() {
    let session = AppSession::default();

    let mut handles = Vec::new();
    for _ in 0..3 {
        let session = session.clone();
        handles.push(tokio::spawn(async move {
            session
                .open(quiet(), |_progress, _cancel| async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Err("remote watch closed".to_string())
                })
                .await
        }));
    }

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(err.contains("remote watch closed") || err.contains("closed while opening"));
    }
}

#[tokio::test]
async fn last_close_runs_the_close_op() {
    let session = AppSession::default();
    let closes = Arc::new(AtomicUsize::new(0));

    session.open(quiet(), |_p, _c| async { Ok(fake_app("kubectl")) }).await.unwrap();
    session.open(quiet(), |_p, _c| async { Ok(fake_app("kubectl")) }).await.unwrap();

    let counter = Arc::clone(&closes);
    session
        .close(move |_c| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();
    // One reference still held: no remote close yet.
    assert_eq!(closes.load(Ordering::SeqCst), 0);
    assert_eq!(session.active_count(), 1);

    let counter = Arc::clone(&closes);
    session
        .close(move |_c| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(session.active_count(), 0);

    // Refcount zero leaves no outstanding ops and no cached app.
    let inner = session.inner.lock();
    assert!(inner.outgoing_open.is_none());
    assert!(inner.outgoing_close.is_none());
    assert!(inner.app.is_none());
}

#[tokio::test]
async fn close_preempts_an_inflight_open() {
    let session = AppSession::default();

    let opener = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .open(quiet(), |_progress, cancel| async move {
                    // A slow open that honors preemption.
                    tokio::select! {
                        _ = cancel.cancelled() => Err("open canceled".to_string()),
                        _ = tokio::time::sleep(Duration::from_secs(5)) => {
                            Ok(fake_app("kubectl"))
                        }
                    }
                })
                .await
        })
    };

    // Give the open op a moment to get scheduled.
    tokio::time::sleep(Duration::from_millis(20)).await;

    session.close(|_c| async { Ok(()) }).await.unwrap();

    let err = opener.await.unwrap().unwrap_err();
    assert!(err.contains("canceled") || err.contains("closed while opening"));
    assert_eq!(session.active_count(), 0);
    assert!(session.inner.lock().app.is_none());
}

#[tokio::test]
async fn open_preempts_an_inflight_close() {
    let session = AppSession::default();
    session.open(quiet(), |_p, _c| async { Ok(fake_app("kubectl")) }).await.unwrap();

    let closer = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .close(|cancel| async move {
                    tokio::select! {
                        _ = cancel.cancelled() => Err("close canceled".to_string()),
                        _ = tokio::time::sleep(Duration::from_secs(5)) => Ok(()),
                    }
                })
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // A new session arrives while the close is still committing.
    let app = session.open(quiet(), |_p, _c| async { Ok(fake_app("kubectl")) }).await.unwrap();
    assert_eq!(app_name(&app), "kubectl");

    let close_result = closer.await.unwrap();
    assert!(close_result.is_err());
    assert_eq!(session.active_count(), 1);
}

#[tokio::test]
async fn unbalanced_close_is_reported() {
    let session = AppSession::default();
    let result = session.close(|_c| async { Ok(()) }).await;
    assert!(result.is_err());
    assert_eq!(session.active_count(), 0);
}

#[tokio::test]
async fn session_map_reuses_entries_per_app() {
    let map = SessionMap::default();
    let a = map.session("tools", "kubectl");
    let b = map.session("tools", "kubectl");
    let c = map.session("tools", "jq");
    assert!(Arc::ptr_eq(&a.inner, &b.inner));
    assert!(!Arc::ptr_eq(&a.inner, &c.inner));
}
