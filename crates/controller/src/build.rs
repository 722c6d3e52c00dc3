// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-demand image builds.
//!
//! The reconciler polls `test_image` while an app sits in `Building`. The
//! proxy keeps one build context per app, keyed by app name: the first poll
//! creates the context and launches the build on its own task, later polls
//! return the `(image, error, done)` tuple without blocking. `cancel` aborts
//! the task and drops the context so a later poll starts fresh.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Build outcome as seen by the reconciler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Sentinel: the build has not finished yet. Requeue, not a failure.
    #[error("image is under build")]
    UnderBuild,

    #[error("{0}")]
    Failed(String),
}

/// The `(image, error, done)` tuple of one app's build context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStatus {
    pub image: String,
    pub error: Option<BuildError>,
    pub done: bool,
}

/// Seam for the remote builder RPC.
#[async_trait]
pub trait BuilderBackend: Send + Sync {
    /// Build `dockerfile` (inline content or an http(s) URL) into `image`.
    /// Implementations must honor `cancel` promptly.
    async fn build(
        &self,
        dockerfile: &str,
        image: &str,
        cancel: CancellationToken,
    ) -> Result<(), String>;
}

struct BuildContext {
    image: String,
    error: Option<BuildError>,
    done: bool,
    cancel: CancellationToken,
}

/// Per-app build multiplexer. At most one build is in flight per app.
#[derive(Clone)]
pub struct ImageBuilder {
    backend: Option<Arc<dyn BuilderBackend>>,
    image_repo: String,
    contexts: Arc<Mutex<HashMap<String, BuildContext>>>,
}

impl ImageBuilder {
    pub fn new(backend: Option<Arc<dyn BuilderBackend>>, image_repo: String) -> Self {
        Self { backend, image_repo, contexts: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Whether a builder endpoint is installed at all.
    pub fn configured(&self) -> bool {
        self.backend.is_some()
    }

    /// Tag a built image will be pushed to.
    pub fn image_tag(&self, app_name: &str) -> String {
        format!("{}/{}:built", self.image_repo, app_name)
    }

    /// Current build tuple for `app_name`, creating the context and
    /// launching the build when none exists. Never blocks on the build.
    pub fn test_image(&self, app_name: &str, dockerfile: &str) -> BuildStatus {
        let mut contexts = self.contexts.lock();
        if let Some(ctx) = contexts.get(app_name) {
            return BuildStatus { image: ctx.image.clone(), error: ctx.error.clone(), done: ctx.done };
        }

        let image = self.image_tag(app_name);
        let cancel = CancellationToken::new();
        contexts.insert(
            app_name.to_string(),
            BuildContext {
                image: image.clone(),
                error: Some(BuildError::UnderBuild),
                done: false,
                cancel: cancel.clone(),
            },
        );

        let Some(backend) = self.backend.clone() else {
            // Callers check `configured` first; an unconfigured builder
            // finishes the context immediately so the error surfaces.
            let ctx = contexts.get_mut(app_name);
            if let Some(ctx) = ctx {
                ctx.done = true;
                ctx.error =
                    Some(BuildError::Failed("no image builder installed".to_string()));
            }
            return BuildStatus {
                image,
                error: Some(BuildError::Failed("no image builder installed".to_string())),
                done: true,
            };
        };

        info!(app = %app_name, image = %image, "launching image build");
        let contexts_ref = Arc::clone(&self.contexts);
        let name = app_name.to_string();
        let dockerfile = dockerfile.to_string();
        let task_image = image.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = backend.build(&dockerfile, &task_image, cancel.clone()) => result,
            };

            let mut contexts = contexts_ref.lock();
            if let Some(ctx) = contexts.get_mut(&name) {
                ctx.done = true;
                ctx.error = result.err().map(BuildError::Failed);
                match &ctx.error {
                    None => info!(app = %name, image = %task_image, "image build finished"),
                    Some(err) => warn!(app = %name, error = %err, "image build failed"),
                }
            }
        });

        BuildStatus { image, error: Some(BuildError::UnderBuild), done: false }
    }

    /// Abort any in-flight build for `app_name` and drop its context.
    pub fn cancel(&self, app_name: &str) {
        if let Some(ctx) = self.contexts.lock().remove(app_name) {
            ctx.cancel.cancel();
            info!(app = %app_name, "canceled image build");
        }
    }
}

/// Backend that drives a buildkitd endpoint through `buildctl`.
///
/// An http(s) dockerfile is handed to the dockerfile frontend as the build
/// context; inline content is written into a scratch directory used as both
/// context and dockerfile source.
pub struct BuildctlBackend {
    endpoint: String,
}

impl BuildctlBackend {
    pub fn new(endpoint: String) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl BuilderBackend for BuildctlBackend {
    async fn build(
        &self,
        dockerfile: &str,
        image: &str,
        cancel: CancellationToken,
    ) -> Result<(), String> {
        let mut cmd = tokio::process::Command::new("buildctl");
        cmd.arg("--addr")
            .arg(&self.endpoint)
            .arg("build")
            .arg("--frontend")
            .arg("dockerfile.v0")
            .arg("--output")
            .arg(format!("type=image,name={image},push=true"))
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped());

        // Keeps the scratch dir alive until buildctl exits
        let _scratch;
        if dockerfile.starts_with("http://") || dockerfile.starts_with("https://") {
            cmd.arg("--opt").arg(format!("context={dockerfile}"));
        } else {
            let dir = tempfile::tempdir()
                .map_err(|e| format!("unable to create build context dir: {e}"))?;
            std::fs::write(dir.path().join("Dockerfile"), dockerfile)
                .map_err(|e| format!("unable to write dockerfile: {e}"))?;
            cmd.arg("--local")
                .arg(format!("context={}", dir.path().display()))
                .arg("--local")
                .arg(format!("dockerfile={}", dir.path().display()));
            _scratch = dir;
        }

        let mut child = cmd.spawn().map_err(|e| format!("unable to run buildctl: {e}"))?;
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(mut pipe) = stderr {
                let _ = pipe.read_to_string(&mut buf).await;
            }
            buf
        });

        let status = tokio::select! {
            _ = cancel.cancelled() => None,
            status = child.wait() => Some(status),
        };

        match status {
            None => {
                let _ = child.kill().await;
                Err("build canceled".to_string())
            }
            Some(Err(e)) => Err(format!("unable to wait for buildctl: {e}")),
            Some(Ok(status)) if status.success() => Ok(()),
            Some(Ok(status)) => {
                let stderr = stderr_task.await.unwrap_or_default();
                let tail: String = stderr.chars().rev().take(2000).collect::<Vec<_>>()
                    .into_iter().rev().collect();
                Err(format!("buildctl exited with {status}: {}", tail.trim()))
            }
        }
    }
}

#[cfg(test)]
#[path = "build_tests.rs"]
mod tests;
