// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fork resolution: derive a workload template from an existing object.
//!
//! `Kind/Name[:container]` is resolved against the cluster, the object's
//! pod template and labels are lifted out, and every probe is stripped so
//! the forked container does not get restarted underneath an interactive
//! session. Kinds are matched the way kubectl matches them: short names and
//! deprecated group suffixes are tolerated.

use std::collections::BTreeMap;

use cliapp_api::ForkSpec;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{Pod, PodSpec, PodTemplateSpec};
use kube::api::Api;
use kube::Client;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForkError {
    #[error("fork target must be in the form Kind/Name, got {0:?}")]
    BadRef(String),

    #[error("object kind {0:?} is not supported as a fork target")]
    UnsupportedKind(String),

    #[error("unable to fetch {object}: {detail}")]
    Fetch { object: String, detail: String },

    #[error("{object} has no pod template")]
    NoTemplate { object: String },

    #[error("container {container:?} doesn't exist in {object}")]
    ContainerMissing { container: String, object: String },

    #[error("{object} has more than 1 container. Specify a container name")]
    AmbiguousContainer { object: String },
}

/// A resolved fork: the target's pod template, its labels, and the index of
/// the container the app replaces.
#[derive(Debug, Clone)]
pub struct ForkTemplate {
    pub labels: BTreeMap<String, String>,
    pub spec: PodSpec,
    pub target_container: usize,
}

/// Supported fork target kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ForkKind {
    Deployment,
    StatefulSet,
    Job,
    CronJob,
    DaemonSet,
    ReplicaSet,
    Pod,
}

/// Parse `Kind/Name` into a kind and object name.
///
/// The kind segment is case-insensitive, accepts kubectl short names, and
/// tolerates group suffixes (`deployment.apps`, `deployment.extensions`).
pub(crate) fn parse_object_ref(object_ref: &str) -> Result<(ForkKind, String), ForkError> {
    let (kind, name) = object_ref
        .split_once('/')
        .ok_or_else(|| ForkError::BadRef(object_ref.to_string()))?;
    if name.is_empty() || kind.is_empty() {
        return Err(ForkError::BadRef(object_ref.to_string()));
    }

    let bare = kind.to_ascii_lowercase();
    let bare = bare.split('.').next().unwrap_or_default();

    let kind = match bare {
        "deployment" | "deployments" | "deploy" => ForkKind::Deployment,
        "statefulset" | "statefulsets" | "sts" => ForkKind::StatefulSet,
        "job" | "jobs" => ForkKind::Job,
        "cronjob" | "cronjobs" | "cj" => ForkKind::CronJob,
        "daemonset" | "daemonsets" | "ds" => ForkKind::DaemonSet,
        "replicaset" | "replicasets" | "rs" => ForkKind::ReplicaSet,
        "pod" | "pods" | "po" => ForkKind::Pod,
        _ => return Err(ForkError::UnsupportedKind(kind.to_string())),
    };
    Ok((kind, name.to_string()))
}

/// Fetch the fork target and lift out its template.
pub async fn fetch_fork_template(
    client: &Client,
    namespace: &str,
    fork: &ForkSpec,
) -> Result<ForkTemplate, ForkError> {
    let (kind, name) = parse_object_ref(&fork.object_ref)?;
    let object = format!("{}/{}", fork.object_ref, namespace);

    let fetch_err = |e: kube::Error| ForkError::Fetch {
        object: object.clone(),
        detail: e.to_string(),
    };

    let (labels, spec) = match kind {
        ForkKind::Deployment => {
            let d: Deployment = Api::namespaced(client.clone(), namespace)
                .get(&name)
                .await
                .map_err(fetch_err)?;
            template_parts(d.spec.map(|s| s.template), &object)?
        }
        ForkKind::StatefulSet => {
            let s: StatefulSet = Api::namespaced(client.clone(), namespace)
                .get(&name)
                .await
                .map_err(fetch_err)?;
            template_parts(s.spec.map(|s| s.template), &object)?
        }
        ForkKind::Job => {
            let j: Job = Api::namespaced(client.clone(), namespace)
                .get(&name)
                .await
                .map_err(fetch_err)?;
            template_parts(j.spec.map(|s| s.template), &object)?
        }
        ForkKind::CronJob => {
            let cj: CronJob = Api::namespaced(client.clone(), namespace)
                .get(&name)
                .await
                .map_err(fetch_err)?;
            let template = cj
                .spec
                .and_then(|s| s.job_template.spec)
                .map(|s| s.template);
            template_parts(template, &object)?
        }
        ForkKind::DaemonSet => {
            let ds: DaemonSet = Api::namespaced(client.clone(), namespace)
                .get(&name)
                .await
                .map_err(fetch_err)?;
            template_parts(ds.spec.map(|s| s.template), &object)?
        }
        ForkKind::ReplicaSet => {
            let rs: ReplicaSet = Api::namespaced(client.clone(), namespace)
                .get(&name)
                .await
                .map_err(fetch_err)?;
            template_parts(rs.spec.and_then(|s| s.template), &object)?
        }
        ForkKind::Pod => {
            let p: Pod = Api::namespaced(client.clone(), namespace)
                .get(&name)
                .await
                .map_err(fetch_err)?;
            let labels = p.metadata.labels.clone().unwrap_or_default();
            let spec = p.spec.ok_or_else(|| ForkError::NoTemplate { object: object.clone() })?;
            (labels, spec)
        }
    };

    resolve_template(labels, spec, fork.container.as_deref(), &object)
}

fn template_parts(
    template: Option<PodTemplateSpec>,
    object: &str,
) -> Result<(BTreeMap<String, String>, PodSpec), ForkError> {
    let template =
        template.ok_or_else(|| ForkError::NoTemplate { object: object.to_string() })?;
    let labels = template
        .metadata
        .as_ref()
        .and_then(|m| m.labels.clone())
        .unwrap_or_default();
    let spec =
        template.spec.ok_or_else(|| ForkError::NoTemplate { object: object.to_string() })?;
    Ok((labels, spec))
}

/// Strip probes and pick the target container.
pub(crate) fn resolve_template(
    labels: BTreeMap<String, String>,
    mut spec: PodSpec,
    container: Option<&str>,
    object: &str,
) -> Result<ForkTemplate, ForkError> {
    if spec.containers.is_empty() {
        return Err(ForkError::NoTemplate { object: object.to_string() });
    }

    for c in &mut spec.containers {
        c.startup_probe = None;
        c.liveness_probe = None;
        c.readiness_probe = None;
    }

    let target_container = match container.filter(|c| !c.is_empty()) {
        Some(wanted) => spec
            .containers
            .iter()
            .position(|c| c.name == wanted)
            .ok_or_else(|| ForkError::ContainerMissing {
                container: wanted.to_string(),
                object: object.to_string(),
            })?,
        None if spec.containers.len() == 1 => 0,
        None => return Err(ForkError::AmbiguousContainer { object: object.to_string() }),
    };

    Ok(ForkTemplate { labels, spec, target_container })
}

#[cfg(test)]
#[path = "fork_tests.rs"]
mod tests;
