// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workload manifest construction.
//!
//! Derives the immutable pod manifest for a CliApp: the app's rootfs is
//! mounted read-only at `/app-root` through the content-addressed image
//! driver, the primary container is swapped to the shell context image, and
//! the image's PATH/workdir are re-rooted so the tool resolves inside
//! `/app-root`. Everything here is a pure transformation over the inputs;
//! the callers do the cluster I/O.

use std::collections::BTreeMap;

use cliapp_api::{
    canonical_dump, spec_hash, CliApp, Distro, Shell, APP_CONTAINER, APP_IMAGE_VOLUME, APP_LABEL,
    APP_ROOT, SHELL_CONTEXT_CONFIGMAP, SPEC_DUMP_ANNOTATION, SPEC_HASH_ANNOTATION,
};
use k8s_openapi::api::core::v1::{
    CSIVolumeSource, Capabilities, Container, EnvVar, HostPathVolumeSource, Pod, SecurityContext,
    Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;
use thiserror::Error;

use crate::cri::ImageMetadata;
use crate::fork::ForkTemplate;

/// Content-addressed image volume driver.
pub const CSI_IMAGE_DRIVER: &str = "csi-image.warm-metal.tech";

/// ConfigMap volume driver with write-back support.
pub const CSI_CONFIGMAP_DRIVER: &str = "csi-cm.warm-metal.tech";

const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

const SUFFIX_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

#[derive(Debug, Error, PartialEq)]
pub enum WorkloadError {
    #[error("hostpath {0:?} must be an absolute path, optionally \"host:mount\" with both sides absolute")]
    InvalidHostPath(String),

    #[error("environment variable {0:?} must be in the form of \"key=value\"")]
    InvalidEnv(String),

    #[error("workload template has no containers")]
    NoContainers,

    #[error("unable to canonicalize spec: {0}")]
    Canonical(String),
}

/// Everything `build_manifest` needs, gathered by the reconciler.
pub struct WorkloadParams<'a> {
    pub app: &'a CliApp,
    /// Base template: a fork target, or [`base_from_image`] for image apps.
    pub base: ForkTemplate,
    /// Keep the base container's env list (fork `withEnvs`).
    pub keep_env: bool,
    pub shell: Shell,
    pub distro: Distro,
    /// Context image the primary container is swapped to.
    pub context_image: String,
    /// PATH/workdir metadata of the target image.
    pub image_meta: ImageMetadata,
    /// Namespace owning the shell-context ConfigMap.
    pub controller_namespace: String,
    /// Keys present in the shell-context ConfigMap.
    pub shell_context_keys: Vec<String>,
    /// Pre-drawn 5-char name suffix; see [`random_suffix`].
    pub name_suffix: String,
}

/// Single-container base template for apps that name an image directly.
pub fn base_from_image(image: &str) -> ForkTemplate {
    ForkTemplate {
        labels: BTreeMap::new(),
        spec: k8s_openapi::api::core::v1::PodSpec {
            containers: vec![Container { image: Some(image.to_string()), ..Default::default() }],
            ..Default::default()
        },
        target_container: 0,
    }
}

/// Draw the random workload name suffix.
pub fn random_suffix() -> String {
    nanoid::nanoid!(5, &SUFFIX_ALPHABET)
}

/// Parse `host[:mount]` entries; both sides must be absolute.
pub(crate) fn parse_host_paths(entries: &[String]) -> Result<Vec<(String, String)>, WorkloadError> {
    entries
        .iter()
        .map(|entry| {
            let trimmed = entry.trim();
            let (host, mount) = match trimmed.split_once(':') {
                Some((host, mount)) => (host.trim(), mount.trim()),
                None => (trimmed, trimmed),
            };
            if !host.starts_with('/') || !mount.starts_with('/') {
                return Err(WorkloadError::InvalidHostPath(entry.clone()));
            }
            Ok((host.to_string(), mount.to_string()))
        })
        .collect()
}

/// Parse `K=V` entries; the key must be non-empty. Values may contain `=`.
pub(crate) fn parse_env(entries: &[String]) -> Result<Vec<(String, String)>, WorkloadError> {
    entries
        .iter()
        .map(|entry| {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| WorkloadError::InvalidEnv(entry.clone()))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(WorkloadError::InvalidEnv(entry.clone()));
            }
            Ok((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Re-root an image path under `/app-root`.
pub(crate) fn reroot(path: &str) -> String {
    if path.starts_with('/') {
        format!("{APP_ROOT}{path}")
    } else {
        format!("{APP_ROOT}/{path}")
    }
}

/// PATH value for the workspace container: every image PATH entry
/// re-rooted, then the conventional default so context tooling stays
/// reachable.
pub(crate) fn rerooted_path_env(entries: &[String]) -> String {
    let mut parts: Vec<String> = entries.iter().map(|p| reroot(p)).collect();
    parts.push(DEFAULT_PATH.to_string());
    parts.join(":")
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar { name: name.to_string(), value: Some(value.to_string()), ..Default::default() }
}

/// Build the workload manifest for an app. Pure; nothing is submitted.
pub fn build_manifest(params: WorkloadParams<'_>) -> Result<Pod, WorkloadError> {
    let WorkloadParams {
        app,
        base,
        keep_env,
        shell,
        distro,
        context_image,
        image_meta,
        controller_namespace,
        shell_context_keys,
        name_suffix,
    } = params;

    let app_name = app.meta().name.clone().unwrap_or_default();
    let namespace = app.meta().namespace.clone().unwrap_or_default();

    let host_paths = parse_host_paths(&app.spec.host_path)?;
    let env = parse_env(&app.spec.env)?;

    let ForkTemplate { labels: base_labels, mut spec, target_container } = base;
    if spec.containers.is_empty() {
        return Err(WorkloadError::NoContainers);
    }

    let mut volumes = spec.volumes.take().unwrap_or_default();
    let mut host_mounts = Vec::with_capacity(host_paths.len());
    for (i, (host, mount)) in host_paths.iter().enumerate() {
        let volume = format!("hostpath-{i}");
        volumes.push(Volume {
            name: volume.clone(),
            host_path: Some(HostPathVolumeSource { path: host.clone(), ..Default::default() }),
            ..Default::default()
        });
        host_mounts.push(VolumeMount {
            name: volume,
            mount_path: mount.clone(),
            ..Default::default()
        });
    }

    let container = spec
        .containers
        .get_mut(target_container)
        .ok_or(WorkloadError::NoContainers)?;

    // Exchange the target image for the context image; the original image
    // is mounted at /app-root instead.
    let target_image = container.image.take().unwrap_or_default();
    container.image = Some(context_image);
    container.name = APP_CONTAINER.to_string();
    container.stdin = Some(true);

    if !keep_env {
        container.env = None;
    }

    let mut container_env = container.env.take().unwrap_or_default();
    container_env.push(env_var("APP_ROOT", APP_ROOT));
    container_env.push(env_var("DISTRO", &distro.to_string()));
    container_env.push(env_var("SHELL", &shell.to_string()));
    container_env.push(env_var("PATH", &rerooted_path_env(&image_meta.path_entries)));
    for (key, value) in &env {
        container_env.push(env_var(key, value));
    }
    container.env = Some(container_env);

    container.working_dir = Some(
        image_meta
            .working_dir
            .as_deref()
            .map(reroot)
            .unwrap_or_else(|| APP_ROOT.to_string()),
    );

    let mut mounts = container.volume_mounts.take().unwrap_or_default();
    mounts.extend(host_mounts);
    mounts.push(VolumeMount {
        name: APP_IMAGE_VOLUME.to_string(),
        mount_path: APP_ROOT.to_string(),
        ..Default::default()
    });

    volumes.push(Volume {
        name: APP_IMAGE_VOLUME.to_string(),
        csi: Some(CSIVolumeSource {
            driver: CSI_IMAGE_DRIVER.to_string(),
            volume_attributes: Some(
                [("image".to_string(), target_image)].into_iter().collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    });

    let (rc_file, history_file) = shell.context_files();
    if shell_context_keys.iter().any(|k| k == rc_file) {
        volumes.push(shell_context_volume(
            "shell-rc",
            rc_file,
            &controller_namespace,
            [("keepCurrentAlways", "true")].as_slice(),
        ));
        mounts.push(VolumeMount {
            name: "shell-rc".to_string(),
            mount_path: format!("/root/{rc_file}"),
            ..Default::default()
        });
    }
    if shell_context_keys.iter().any(|k| k == history_file) {
        volumes.push(shell_context_volume(
            "shell-history",
            history_file,
            &controller_namespace,
            [
                ("commitChangesOn", "unmount"),
                ("conflictPolicy", "override"),
                ("oversizePolicy", "truncateHeadLine"),
            ]
            .as_slice(),
        ));
        mounts.push(VolumeMount {
            name: "shell-history".to_string(),
            mount_path: format!("/root/{history_file}"),
            ..Default::default()
        });
    }

    container.volume_mounts = Some(mounts);
    ensure_sys_admin(container);
    spec.volumes = Some(volumes);

    let mut labels = base_labels;
    labels.insert(APP_LABEL.to_string(), app_name.clone());

    let annotations: BTreeMap<String, String> = [
        (
            SPEC_HASH_ANNOTATION.to_string(),
            spec_hash(&app.spec).map_err(|e| WorkloadError::Canonical(e.to_string()))?,
        ),
        (
            SPEC_DUMP_ANNOTATION.to_string(),
            canonical_dump(&app.spec).map_err(|e| WorkloadError::Canonical(e.to_string()))?,
        ),
    ]
    .into_iter()
    .collect();

    Ok(Pod {
        metadata: ObjectMeta {
            name: Some(format!("{app_name}-{name_suffix}")),
            namespace: Some(namespace),
            labels: Some(labels),
            annotations: Some(annotations),
            owner_references: Some(vec![OwnerReference {
                api_version: CliApp::api_version(&()).to_string(),
                kind: CliApp::kind(&()).to_string(),
                name: app_name,
                uid: app.meta().uid.clone().unwrap_or_default(),
                controller: Some(true),
                block_owner_deletion: Some(true),
            }]),
            ..Default::default()
        },
        spec: Some(spec),
        ..Default::default()
    })
}

fn shell_context_volume(
    name: &str,
    key: &str,
    controller_namespace: &str,
    extra: &[(&str, &str)],
) -> Volume {
    let mut attributes: BTreeMap<String, String> = [
        ("configMap".to_string(), SHELL_CONTEXT_CONFIGMAP.to_string()),
        ("namespace".to_string(), controller_namespace.to_string()),
        ("subPath".to_string(), key.to_string()),
    ]
    .into_iter()
    .collect();
    for (k, v) in extra {
        attributes.insert((*k).to_string(), (*v).to_string());
    }

    Volume {
        name: name.to_string(),
        csi: Some(CSIVolumeSource {
            driver: CSI_CONFIGMAP_DRIVER.to_string(),
            volume_attributes: Some(attributes),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn ensure_sys_admin(container: &mut Container) {
    let ctx = container.security_context.get_or_insert_with(SecurityContext::default);
    let caps = ctx.capabilities.get_or_insert_with(Capabilities::default);
    let add = caps.add.get_or_insert_with(Vec::new);
    if !add.iter().any(|c| c == "SYS_ADMIN") {
        add.push("SYS_ADMIN".to_string());
    }
}

#[cfg(test)]
#[path = "workload_tests.rs"]
mod tests;
