// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::*;

/// Backend that completes when told to, counting invocations.
struct FakeBackend {
    started: AtomicUsize,
    release: tokio::sync::Notify,
    outcome: parking_lot::Mutex<Result<(), String>>,
}

impl FakeBackend {
    fn new(outcome: Result<(), String>) -> Arc<Self> {
        Arc::new(Self {
            started: AtomicUsize::new(0),
            release: tokio::sync::Notify::new(),
            outcome: parking_lot::Mutex::new(outcome),
        })
    }
}

#[async_trait]
impl BuilderBackend for FakeBackend {
    async fn build(
        &self,
        _dockerfile: &str,
        _image: &str,
        cancel: CancellationToken,
    ) -> Result<(), String> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = cancel.cancelled() => Err("build canceled".to_string()),
            _ = self.release.notified() => self.outcome.lock().clone(),
        }
    }
}

fn builder(backend: Arc<FakeBackend>) -> ImageBuilder {
    ImageBuilder::new(Some(backend), "docker.io/cliapp".to_string())
}

async fn wait_done(builder: &ImageBuilder, app: &str) -> BuildStatus {
    for _ in 0..100 {
        let status = builder.test_image(app, "FROM alpine");
        if status.done {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("build never finished");
}

#[tokio::test]
async fn first_poll_launches_the_build() {
    let backend = FakeBackend::new(Ok(()));
    let builder = builder(Arc::clone(&backend));

    let status = builder.test_image("curl", "FROM alpine");
    assert_eq!(status.image, "docker.io/cliapp/curl:built");
    assert_eq!(status.error, Some(BuildError::UnderBuild));
    assert!(!status.done);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(backend.started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn polling_does_not_launch_twice() {
    let backend = FakeBackend::new(Ok(()));
    let builder = builder(Arc::clone(&backend));

    for _ in 0..5 {
        let status = builder.test_image("curl", "FROM alpine");
        assert!(!status.done);
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(backend.started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn successful_build_reports_done_with_image() {
    let backend = FakeBackend::new(Ok(()));
    let builder = builder(Arc::clone(&backend));

    builder.test_image("curl", "FROM alpine");
    tokio::time::sleep(Duration::from_millis(20)).await;
    backend.release.notify_waiters();

    let status = wait_done(&builder, "curl").await;
    assert_eq!(status.error, None);
    assert_eq!(status.image, "docker.io/cliapp/curl:built");
}

#[tokio::test]
async fn failed_build_reports_the_reason() {
    let backend = FakeBackend::new(Err("frontend rejected dockerfile".to_string()));
    let builder = builder(Arc::clone(&backend));

    builder.test_image("curl", "FROM alpine");
    tokio::time::sleep(Duration::from_millis(20)).await;
    backend.release.notify_waiters();

    let status = wait_done(&builder, "curl").await;
    assert_eq!(
        status.error,
        Some(BuildError::Failed("frontend rejected dockerfile".to_string()))
    );
}

#[tokio::test]
async fn cancel_drops_the_context_and_aborts() {
    let backend = FakeBackend::new(Ok(()));
    let builder = builder(Arc::clone(&backend));

    builder.test_image("curl", "FROM alpine");
    tokio::time::sleep(Duration::from_millis(20)).await;
    builder.cancel("curl");

    // A later poll starts over with a fresh context.
    let status = builder.test_image("curl", "FROM alpine");
    assert!(!status.done);
    assert_eq!(status.error, Some(BuildError::UnderBuild));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(backend.started.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn apps_build_independently() {
    let backend = FakeBackend::new(Ok(()));
    let builder = builder(Arc::clone(&backend));

    let curl = builder.test_image("curl", "FROM alpine");
    let jq = builder.test_image("jq", "FROM alpine");
    assert_eq!(curl.image, "docker.io/cliapp/curl:built");
    assert_eq!(jq.image, "docker.io/cliapp/jq:built");

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(backend.started.load(Ordering::SeqCst), 2);
}

#[test]
fn unconfigured_builder_reports_not_configured() {
    let builder = ImageBuilder::new(None, "docker.io/cliapp".to_string());
    assert!(!builder.configured());
}
