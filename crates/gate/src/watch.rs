// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote open/close bodies: target-phase patches and watch-until-Live.
//!
//! Each open op gets its own watch stream on the app record. The stream
//! ending counts as failure; a non-empty `status.error` fails the open with
//! the reconciler's message. Phase changes along the way are narrated to
//! the client as progress lines.

use std::time::Duration;

use cliapp_api::{update_spec_with_retry, CliApp, Phase, TargetPhase};
use futures_util::TryStreamExt;
use kube::api::Api;
use kube::runtime::watcher;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::session::ProgressSink;

/// Deadline wrapped around every orchestrator API call. The watch itself
/// runs on the op context instead.
const ORCHESTRATOR_DEADLINE: Duration = Duration::from_secs(5);

/// Drive the app's target phase to Live and wait until it reports Live.
pub async fn open_app(
    client: Client,
    namespace: String,
    name: String,
    progress: ProgressSink,
    cancel: CancellationToken,
) -> Result<CliApp, String> {
    let api: Api<CliApp> = Api::namespaced(client, &namespace);

    let app = tokio::time::timeout(
        ORCHESTRATOR_DEADLINE,
        update_spec_with_retry(&api, &name, |app| {
            let already_live =
                app.status.as_ref().is_some_and(|s| s.phase == Some(Phase::Live));
            if already_live || app.spec.target_phase == Some(TargetPhase::Live) {
                return false;
            }
            app.spec.target_phase = Some(TargetPhase::Live);
            true
        }),
    )
    .await
    .map_err(|_| format!("timed out updating app {namespace}/{name}"))?
    .map_err(|e| format!("unable to update app {namespace}/{name}: {e}"))?;

    if app.status.as_ref().is_some_and(|s| s.phase == Some(Phase::Live)) {
        return Ok(app);
    }

    watch_until_live(api, &namespace, &name, progress, cancel).await
}

/// Drive the app's target phase back to Rest. Idempotent when the target
/// is already Rest.
pub async fn close_app(
    client: Client,
    namespace: String,
    name: String,
    _cancel: CancellationToken,
) -> Result<(), String> {
    let api: Api<CliApp> = Api::namespaced(client, &namespace);
    debug!(app = %name, "closing app");

    tokio::time::timeout(
        ORCHESTRATOR_DEADLINE,
        update_spec_with_retry(&api, &name, |app| {
            if app.spec.target_phase == Some(TargetPhase::Rest) {
                return false;
            }
            app.spec.target_phase = Some(TargetPhase::Rest);
            true
        }),
    )
    .await
    .map_err(|_| format!("timed out updating app {namespace}/{name}"))?
    .map_err(|e| format!("unable to close app {namespace}/{name}: {e}"))?;

    Ok(())
}

/// Watch the single app record until it reports Live.
async fn watch_until_live(
    api: Api<CliApp>,
    namespace: &str,
    name: &str,
    progress: ProgressSink,
    cancel: CancellationToken,
) -> Result<CliApp, String> {
    let config = watcher::Config::default().fields(&format!("metadata.name={name}"));
    let mut stream = std::pin::pin!(watcher(api, config));

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return Err(format!("open of {namespace}/{name} canceled")),
            event = stream.try_next() => event,
        };

        match event {
            Ok(Some(watcher::Event::Apply(app) | watcher::Event::InitApply(app))) => {
                let status = app.status.clone().unwrap_or_default();
                if status.phase == Some(Phase::Live) {
                    return Ok(app);
                }
                if !status.error.is_empty() {
                    return Err(status.error);
                }
                match status.phase {
                    Some(Phase::Building) => progress.line("building image...").await,
                    Some(Phase::WaitingForSessions) => {}
                    _ => progress.line("preparing Pods...").await,
                }
            }
            Ok(Some(watcher::Event::Delete(_))) => return Err("app is deleted".to_string()),
            Ok(Some(watcher::Event::Init | watcher::Event::InitDone)) => {}
            Ok(None) => return Err("remote watch closed".to_string()),
            Err(err) => return Err(format!("watch of {namespace}/{name} failed: {err}")),
        }
    }
}
