// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The CliApp phase reconciler.
//!
//! Runs under the kube controller runtime: every change to a CliApp or to
//! one of its labeled workloads triggers one reconcile attempt. An attempt
//! reads, decides (see [`decision`]), persists the status transition, then
//! performs side effects. Failures are captured into `status.error` instead
//! of being returned, so the framework never backs off user-visible
//! problems; the next watch event retries.

pub mod claim;
pub mod decision;
mod live;
mod rest;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cliapp_api::{CliApp, Clock, Phase, TargetPhase};
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Client, Resource};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::build::ImageBuilder;
use crate::config::{ControllerConfig, DEFAULT_REQUEUE, ORCHESTRATOR_DEADLINE};
use crate::cri::ImageMetadataResolver;
use crate::probes::Metrics;
use decision::{PhaseStep, Requeue};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Validation(#[from] cliapp_api::ValidationError),

    #[error(transparent)]
    Workload(#[from] crate::workload::WorkloadError),

    #[error(transparent)]
    Fork(#[from] crate::fork::ForkError),

    #[error(transparent)]
    Metadata(#[from] crate::cri::MetadataError),

    #[error("{0}")]
    App(String),

    #[error("orchestrator call failed: {0}")]
    Api(#[from] kube::Error),

    #[error("orchestrator call timed out")]
    Deadline,

    #[error("unable to canonicalize spec: {0}")]
    Canonical(#[from] serde_json::Error),
}

/// Shared reconciler context.
pub struct Ctx<C: Clock> {
    pub client: Client,
    pub config: ControllerConfig,
    pub builder: ImageBuilder,
    pub images: Arc<dyn ImageMetadataResolver>,
    pub clock: C,
    pub metrics: Arc<Metrics>,
}

/// Wrap an orchestrator call in the standard 5-second deadline.
pub(crate) async fn with_deadline<T, F>(fut: F) -> Result<T, ReconcileError>
where
    F: Future<Output = Result<T, kube::Error>>,
{
    tokio::time::timeout(ORCHESTRATOR_DEADLINE, fut)
        .await
        .map_err(|_| ReconcileError::Deadline)?
        .map_err(ReconcileError::Api)
}

fn to_action(requeue: Requeue) -> Action {
    match requeue {
        Requeue::OnChange => Action::await_change(),
        Requeue::Immediate => Action::requeue(Duration::ZERO),
        Requeue::After(d) => Action::requeue(d),
    }
}

pub(crate) fn apps_api<C: Clock>(ctx: &Ctx<C>, namespace: &str) -> Api<CliApp> {
    Api::namespaced(ctx.client.clone(), namespace)
}

pub(crate) fn pods_api<C: Clock>(ctx: &Ctx<C>, namespace: &str) -> Api<Pod> {
    Api::namespaced(ctx.client.clone(), namespace)
}

/// List the app's labeled workloads.
pub(crate) async fn list_workloads<C: Clock>(
    ctx: &Ctx<C>,
    namespace: &str,
    app_name: &str,
) -> Result<Vec<Pod>, ReconcileError> {
    let selector = format!("{}={}", cliapp_api::APP_LABEL, app_name);
    let list = with_deadline(
        pods_api(ctx, namespace).list(&ListParams::default().labels(&selector)),
    )
    .await?;
    Ok(list.items)
}

/// How a status write treats `podName`.
pub(crate) enum PodNameWrite {
    Keep,
    Clear,
    Set(String),
}

/// Persist a phase transition. The transition timestamp is stamped from the
/// reconciler clock and `status.error` is cleared alongside every write.
pub(crate) async fn transit_phase_to<C: Clock>(
    ctx: &Ctx<C>,
    app: &CliApp,
    phase: Phase,
    pod_name: PodNameWrite,
) -> Result<(), ReconcileError> {
    let name = app.meta().name.clone().unwrap_or_default();
    let namespace = app.meta().namespace.clone().unwrap_or_default();

    let mut status = serde_json::json!({
        "phase": phase,
        "lastPhaseTransition": Time(ctx.clock.now()),
        "error": "",
    });
    match pod_name {
        PodNameWrite::Keep => {}
        PodNameWrite::Clear => {
            status["podName"] = serde_json::Value::String(String::new());
        }
        PodNameWrite::Set(pod) => {
            status["podName"] = serde_json::Value::String(pod);
        }
    }

    let from = app.status.as_ref().and_then(|s| s.phase);
    debug!(app = %name, from = ?from, to = %phase, "app phase transits");

    let patch = serde_json::json!({ "status": status });
    with_deadline(
        apps_api(ctx, &namespace)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch)),
    )
    .await?;
    Ok(())
}

/// Write `status.error`, skipping the write when the value is unchanged so
/// a failing spec settles instead of re-triggering itself forever.
async fn set_status_error<C: Clock>(ctx: &Ctx<C>, app: &CliApp, message: &str) {
    let current = app.status.as_ref().map(|s| s.error.as_str()).unwrap_or_default();
    if current == message {
        return;
    }

    let name = app.meta().name.clone().unwrap_or_default();
    let namespace = app.meta().namespace.clone().unwrap_or_default();
    let patch = serde_json::json!({ "status": { "error": message } });
    let result = with_deadline(
        apps_api(ctx, &namespace)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch)),
    )
    .await;
    if let Err(err) = result {
        warn!(app = %name, error = %err, "unable to record status error");
    }
}

/// One reconcile attempt, errors propagated.
async fn run_attempt<C: Clock>(app: &CliApp, ctx: &Ctx<C>) -> Result<Action, ReconcileError> {
    app.spec.validate()?;

    let phase = app.status.as_ref().and_then(|s| s.phase);
    let target = app.spec.target_phase.ok_or(cliapp_api::ValidationError::TargetPhaseMissing)?;

    let at_target = matches!(
        (target, phase),
        (TargetPhase::Rest, Some(Phase::Rest)) | (TargetPhase::Live, Some(Phase::Live))
    );
    if at_target {
        // Live still runs its claim pass so spec edits recycle stale pods;
        // Rest is genuinely done.
        if target == TargetPhase::Rest {
            if app.status.as_ref().is_some_and(|s| !s.error.is_empty()) {
                set_status_error(ctx, app, "").await;
            }
            return Ok(Action::await_change());
        }
    }

    match target {
        TargetPhase::Live => live::make_app_live(app, ctx).await,
        TargetPhase::Rest => rest::make_app_rest(app, ctx).await,
    }
}

/// Reconcile entry point. Always returns `Ok`: failures land in
/// `status.error` per the error-handling contract.
pub async fn reconcile<C: Clock>(
    app: Arc<CliApp>,
    ctx: Arc<Ctx<C>>,
) -> Result<Action, ReconcileError> {
    ctx.metrics.observe_reconcile();
    let name = app.meta().name.clone().unwrap_or_default();

    match run_attempt(&app, &ctx).await {
        Ok(action) => Ok(action),
        Err(err) => {
            ctx.metrics.observe_failure();
            warn!(app = %name, error = %err, "reconcile attempt failed");
            set_status_error(&ctx, &app, &err.to_string()).await;
            Ok(Action::await_change())
        }
    }
}

fn error_policy<C: Clock>(_app: Arc<CliApp>, _error: &ReconcileError, _ctx: Arc<Ctx<C>>) -> Action {
    // reconcile() never returns Err; keep the framework's hands off backoff.
    Action::requeue(DEFAULT_REQUEUE)
}

/// Execute one decided step: status write first, side effects after, except
/// for effects the new phase's meaning depends on (cancel, image record).
pub(crate) async fn execute_step<C: Clock>(
    step: PhaseStep,
    app: &CliApp,
    ctx: &Ctx<C>,
) -> Result<Action, ReconcileError> {
    let name = app.meta().name.clone().unwrap_or_default();
    let namespace = app.meta().namespace.clone().unwrap_or_default();

    match step {
        PhaseStep::Wait => Ok(Action::await_change()),
        PhaseStep::Again(requeue) => Ok(to_action(requeue)),
        PhaseStep::Fail(message) => Err(ReconcileError::App(message)),

        PhaseStep::GoLive { pod_name } => {
            let already_tracking = app.status.as_ref().is_some_and(|s| {
                s.phase == Some(Phase::Live) && s.pod_name == pod_name && s.error.is_empty()
            });
            if !already_tracking {
                transit_phase_to(ctx, app, Phase::Live, PodNameWrite::Set(pod_name)).await?;
            }
            Ok(Action::await_change())
        }

        PhaseStep::Transit { phase, clear_pod_name, effect, requeue } => {
            match &effect {
                Some(decision::Effect::CancelBuild) => ctx.builder.cancel(&name),
                Some(decision::Effect::RecordBuiltImage(image)) => {
                    live::record_built_image(ctx, &namespace, &name, image).await?;
                }
                _ => {}
            }

            let pod_name = if clear_pod_name { PodNameWrite::Clear } else { PodNameWrite::Keep };
            transit_phase_to(ctx, app, phase, pod_name).await?;

            if let Some(decision::Effect::DeleteWorkloads(pods)) = effect {
                delete_workloads(ctx, &namespace, &pods).await;
            }
            Ok(to_action(requeue))
        }

        PhaseStep::Act { effect, requeue } => {
            match effect {
                decision::Effect::StartWorkload => live::start_workload(app, ctx).await?,
                decision::Effect::DeleteWorkloads(pods) => {
                    delete_workloads(ctx, &namespace, &pods).await;
                }
                decision::Effect::CancelBuild => ctx.builder.cancel(&name),
                decision::Effect::RecordBuiltImage(image) => {
                    live::record_built_image(ctx, &namespace, &name, &image).await?;
                }
            }
            Ok(to_action(requeue))
        }

        PhaseStep::Uninstall => {
            info!(app = %name, "uninstalling app record");
            with_deadline(apps_api(ctx, &namespace).delete(&name, &DeleteParams::default()))
                .await?;
            Ok(Action::await_change())
        }
    }
}

/// Delete the named workloads, logging failures pod by pod.
pub(crate) async fn delete_workloads<C: Clock>(ctx: &Ctx<C>, namespace: &str, pods: &[String]) {
    let api = pods_api(ctx, namespace);
    for pod in pods {
        info!(pod = %pod, "deleting workload");
        match with_deadline(api.delete(pod, &DeleteParams::default())).await {
            Ok(_) => {}
            Err(err) => warn!(pod = %pod, error = %err, "unable to delete workload"),
        }
    }
}

/// Run the controller until shutdown.
pub async fn run_controller(ctx: Ctx<cliapp_api::SystemClock>) -> Result<(), kube::Error> {
    let apps = Api::<CliApp>::all(ctx.client.clone());
    let pods = Api::<Pod>::all(ctx.client.clone());
    let ctx = Arc::new(ctx);

    Controller::new(apps, watcher::Config::default())
        .owns(pods, watcher::Config::default().labels(cliapp_api::APP_LABEL))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _)) => debug!(app = %obj.name, "reconciled"),
                Err(err) => warn!(error = %err, "reconciler runtime error"),
            }
        })
        .await;

    Ok(())
}
