// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The CliApp custom resource and its validation rules.
//!
//! A CliApp names a CLI tool, where its image comes from (a registry image,
//! a dockerfile to build, or a fork of an existing cluster object), how its
//! workload is furnished (host mounts, env, shell flavor), and the phase the
//! reconciler should drive it toward.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Label that ties every workload pod back to its owning CliApp.
pub const APP_LABEL: &str = "app.cliapp.dev";

/// Primary container name in every workload pod.
pub const APP_CONTAINER: &str = "workspace";

/// Mount point of the app's rootfs inside the context image.
pub const APP_ROOT: &str = "/app-root";

/// Volume name for the content-addressed image mount.
pub const APP_IMAGE_VOLUME: &str = "app";

/// Well-known ConfigMap (in the controller namespace) that seeds shell rc
/// and history files.
pub const SHELL_CONTEXT_CONFIGMAP: &str = "shell-context";

/// Derive a workload template from an existing cluster object instead of
/// authoring one.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForkSpec {
    /// Target object in the form `Kind/Name`.
    pub object_ref: String,

    /// Container to replace. May be omitted when the target template has
    /// exactly one container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,

    /// Keep the forked container's env list. When false, the env list is
    /// cleared before app env vars are applied.
    #[serde(default)]
    pub with_envs: bool,
}

/// Desired state of a CliApp.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cliapp.dev",
    version = "v1",
    kind = "CliApp",
    namespaced,
    status = "CliAppStatus",
    shortname = "capp"
)]
#[serde(rename_all = "camelCase")]
pub struct CliAppSpec {
    /// Image the app runs. Exactly one of `image`, `dockerfile`, `fork`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Dockerfile used to build the app image on demand. Either inline
    /// content or an http(s) URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,

    /// Fork an existing cluster object's pod template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fork: Option<ForkSpec>,

    /// Executable prefix run when a client opens the app. When empty, the
    /// gate attaches to the context rootfs shell instead of the app image.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    /// Host paths mounted into the workload, each `host[:mount]` with both
    /// sides absolute. The mount point defaults to the host path.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host_path: Vec<String>,

    /// Environment variables in the form `K=V`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,

    /// Linux distro of the context image. Defaults to the controller's
    /// configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distro: Option<Distro>,

    /// Shell flavor of the context image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<Shell>,

    /// Phase the reconciler drives the app toward.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_phase: Option<TargetPhase>,

    /// Delete the CliApp record itself once it transitions out of Live.
    #[serde(default)]
    pub uninstall_unless_live: bool,
}

/// Observed state of a CliApp.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CliAppStatus {
    /// Observed lifecycle phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    /// Ready workload backing the app while Live.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pod_name: String,

    /// Timestamp of the last phase transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_phase_transition: Option<k8s_openapi::apimachinery::pkg::apis::meta::v1::Time>,

    /// Human-readable failure from the last reconcile attempt. Empty after
    /// a successful attempt.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// Lifecycle phase the reconciler can be asked to reach.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum TargetPhase {
    Rest,
    Live,
}

/// Observed lifecycle phase.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum Phase {
    Rest,
    Recovering,
    Building,
    Live,
    WaitingForSessions,
    ShuttingDown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Rest => "Rest",
            Phase::Recovering => "Recovering",
            Phase::Building => "Building",
            Phase::Live => "Live",
            Phase::WaitingForSessions => "WaitingForSessions",
            Phase::ShuttingDown => "ShuttingDown",
        };
        f.write_str(s)
    }
}

impl fmt::Display for TargetPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetPhase::Rest => f.write_str("Rest"),
            TargetPhase::Live => f.write_str("Live"),
        }
    }
}

/// Linux distro of the context image.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Distro {
    Alpine,
    Ubuntu,
}

impl fmt::Display for Distro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distro::Alpine => f.write_str("alpine"),
            Distro::Ubuntu => f.write_str("ubuntu"),
        }
    }
}

impl FromStr for Distro {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alpine" => Ok(Distro::Alpine),
            "ubuntu" => Ok(Distro::Ubuntu),
            other => Err(ValidationError::UnknownDistro(other.to_string())),
        }
    }
}

/// Shell flavor of the context image.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Shell {
    Bash,
    Zsh,
}

impl Shell {
    /// Filenames sourced from the shell-context ConfigMap: `(rc, history)`.
    pub fn context_files(&self) -> (&'static str, &'static str) {
        match self {
            Shell::Bash => (".bash_profile", ".bash_history"),
            Shell::Zsh => (".zshrc", ".zsh_history"),
        }
    }
}

impl fmt::Display for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shell::Bash => f.write_str("bash"),
            Shell::Zsh => f.write_str("zsh"),
        }
    }
}

impl FromStr for Shell {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bash" => Ok(Shell::Bash),
            "zsh" => Ok(Shell::Zsh),
            other => Err(ValidationError::UnknownShell(other.to_string())),
        }
    }
}

/// Rejections of a CliApp spec. Never retried until the spec changes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("targetPhase is not set")]
    TargetPhaseMissing,

    #[error("specify exactly one of image, dockerfile, or fork")]
    AmbiguousSource,

    #[error("specify either image, dockerfile, or fork for the app")]
    SourceMissing,

    #[error("unknown distro {0:?}: use alpine or ubuntu")]
    UnknownDistro(String),

    #[error("unknown shell {0:?}: use bash or zsh")]
    UnknownShell(String),
}

impl CliAppSpec {
    /// Validate the structural invariants of the spec: a target phase is
    /// set and a workload source is provided, with `fork` exclusive of the
    /// other two. `image` and `dockerfile` may coexist because a finished
    /// build records its tag into `spec.image`. Empty strings count as
    /// absent.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.target_phase.is_none() {
            return Err(ValidationError::TargetPhaseMissing);
        }

        let has_image = self.image.as_deref().is_some_and(|s| !s.is_empty());
        let has_dockerfile = self.dockerfile.as_deref().is_some_and(|s| !s.is_empty());
        let has_fork = self.fork.is_some();

        if !has_image && !has_dockerfile && !has_fork {
            return Err(ValidationError::SourceMissing);
        }
        if has_fork && (has_image || has_dockerfile) {
            return Err(ValidationError::AmbiguousSource);
        }
        Ok(())
    }
}

/// Context image for a shell/distro pair, `app-context-<shell>-<distro>:latest`.
pub fn default_context_image(shell: Shell, distro: Distro) -> String {
    format!("app-context-{shell}-{distro}:latest")
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;
