// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Driving an app toward Live: claim, build polling, workload start.

use cliapp_api::{
    canonical_dump, default_context_image, spec_hash, update_spec_with_retry, CliApp, Clock, Phase,
};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, PostParams};
use kube::runtime::controller::Action;
use kube::Resource;
use tracing::{info, warn};

use super::claim::{claim_outcome, partition_workloads, ClaimPartition};
use super::decision::{decide_live, LiveObserved};
use super::{
    execute_step, list_workloads, pods_api, with_deadline, Ctx, ReconcileError,
};
use crate::fork::fetch_fork_template;
use crate::workload::{base_from_image, build_manifest, random_suffix, WorkloadParams};

pub(crate) async fn make_app_live<C: Clock>(
    app: &CliApp,
    ctx: &Ctx<C>,
) -> Result<Action, ReconcileError> {
    let name = app.meta().name.clone().unwrap_or_default();
    let namespace = app.meta().namespace.clone().unwrap_or_default();
    let phase = app.status.as_ref().and_then(|s| s.phase);
    let spec = &app.spec;

    let has_image = spec.image.as_deref().is_some_and(|s| !s.is_empty());
    let mut obs = LiveObserved {
        needs_build: !has_image && spec.fork.is_none(),
        has_dockerfile: spec.dockerfile.as_deref().is_some_and(|s| !s.is_empty()),
        builder_configured: ctx.builder.configured(),
        claim: None,
        build: None,
    };

    let mut partition: Option<ClaimPartition> = None;
    match phase {
        Some(Phase::Live) | Some(Phase::Recovering) => {
            let pods = list_workloads(ctx, &namespace, &name).await?;
            let hash = spec_hash(spec)?;
            let dump = canonical_dump(spec)?;
            let part = partition_workloads(pods, &hash, &dump);
            obs.claim = Some(claim_outcome(&part));
            partition = Some(part);
        }
        Some(Phase::Building) => {
            let dockerfile = spec.dockerfile.clone().unwrap_or_default();
            obs.build = Some(ctx.builder.test_image(&name, &dockerfile));
        }
        _ => {}
    }

    let step = decide_live(phase, &obs);
    let action = execute_step(step, app, ctx).await;

    // Recycle after the status write: I4 wants at most one fresh workload,
    // and old pods are deleted asynchronously.
    if let Some(part) = partition {
        spawn_recycle(ctx, &namespace, part);
    }

    action
}

/// Fire-and-forget deletion of out-of-date workloads.
fn spawn_recycle<C: Clock>(ctx: &Ctx<C>, namespace: &str, partition: ClaimPartition) {
    if partition.recycle.is_empty() {
        return;
    }
    let api = pods_api(ctx, namespace);
    for pod in partition.recycle {
        let Some(pod_name) = pod.metadata.name else { continue };
        let api = api.clone();
        info!(pod = %pod_name, "recycling out-of-date workload");
        tokio::spawn(async move {
            if let Err(err) = api.delete(&pod_name, &Default::default()).await {
                warn!(pod = %pod_name, error = %err, "unable to recycle workload");
            }
        });
    }
}

/// Record a built image into `spec.image` with retry-on-conflict.
pub(crate) async fn record_built_image<C: Clock>(
    ctx: &Ctx<C>,
    namespace: &str,
    name: &str,
    image: &str,
) -> Result<(), ReconcileError> {
    let api = super::apps_api(ctx, namespace);
    update_spec_with_retry(&api, name, |app| {
        if app.spec.image.as_deref() == Some(image) {
            return false;
        }
        app.spec.image = Some(image.to_string());
        true
    })
    .await?;
    info!(app = %name, image = %image, "recorded built image");
    Ok(())
}

/// Build the workload manifest and submit it.
pub(crate) async fn start_workload<C: Clock>(
    app: &CliApp,
    ctx: &Ctx<C>,
) -> Result<(), ReconcileError> {
    let namespace = app.meta().namespace.clone().unwrap_or_default();
    let spec = &app.spec;

    let (base, keep_env) = match &spec.fork {
        Some(fork) => (fetch_fork_template(&ctx.client, &namespace, fork).await?, fork.with_envs),
        None => (base_from_image(spec.image.as_deref().unwrap_or_default()), true),
    };

    let shell = spec.shell.unwrap_or(ctx.config.default_shell);
    let distro = spec.distro.unwrap_or(ctx.config.default_distro);
    let context_image = ctx
        .config
        .app_context
        .clone()
        .unwrap_or_else(|| default_context_image(shell, distro));

    let target_image = base
        .spec
        .containers
        .get(base.target_container)
        .and_then(|c| c.image.clone())
        .unwrap_or_default();
    let image_meta = ctx.images.image_metadata(&target_image).await?;

    let controller_namespace = ctx.config.controller_namespace();
    let shell_context_keys = shell_context_keys(ctx, &controller_namespace).await;

    let pod = build_manifest(WorkloadParams {
        app,
        base,
        keep_env,
        shell,
        distro,
        context_image,
        image_meta,
        controller_namespace,
        shell_context_keys,
        name_suffix: random_suffix(),
    })?;

    let pod_name = pod.metadata.name.clone().unwrap_or_default();
    info!(
        pod = %pod_name,
        namespace = %namespace,
        "creating workload"
    );
    with_deadline(pods_api(ctx, &namespace).create(&PostParams::default(), &pod)).await?;
    Ok(())
}

/// Keys available in the shell-context ConfigMap. Missing map or lookup
/// failure both mean "no rc/history volumes".
async fn shell_context_keys<C: Clock>(ctx: &Ctx<C>, controller_namespace: &str) -> Vec<String> {
    let api: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), controller_namespace);
    match with_deadline(api.get_opt(cliapp_api::SHELL_CONTEXT_CONFIGMAP)).await {
        Ok(Some(cm)) => cm.data.map(|d| d.keys().cloned().collect()).unwrap_or_default(),
        Ok(None) => Vec::new(),
        Err(err) => {
            warn!(error = %err, "unable to read shell-context ConfigMap");
            Vec::new()
        }
    }
}
