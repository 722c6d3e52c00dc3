// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Controller configuration.
//!
//! All knobs live in one typed record. The record can be loaded from a TOML
//! file (`--config`) and every field is overridable by a command-line flag;
//! flags win over the file, the file wins over built-in defaults.

use std::path::Path;
use std::time::Duration;

use cliapp_api::{Distro, Shell};
use serde::Deserialize;
use thiserror::Error;

/// Requeue interval used when no more specific interval applies.
pub const DEFAULT_REQUEUE: Duration = Duration::from_secs(5);

/// Deadline wrapped around every orchestrator API call.
pub const ORCHESTRATOR_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file {0}: {1}")]
    Read(String, #[source] std::io::Error),

    #[error("unable to parse config file {0}: {1}")]
    Parse(String, #[source] toml::de::Error),

    #[error(transparent)]
    Validation(#[from] cliapp_api::ValidationError),
}

/// Typed configuration record for the controller binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// Address the metrics endpoint binds to. Empty disables it.
    pub metrics_bind_address: String,

    /// Address the health probe endpoint binds to. Empty disables it.
    pub health_probe_bind_address: String,

    /// Accepted for manifest compatibility. The controller assumes a single
    /// leader; enabling this only logs a warning.
    pub leader_elect: bool,

    /// How long an app stays in WaitingForSessions before shutting down.
    pub idle_live_seconds: u64,

    /// buildkitd endpoint used to build images on demand. Unset means no
    /// builder is installed.
    pub builder_svc: Option<String>,

    /// Context image override. When set, it is used verbatim for every app
    /// instead of `app-context-<shell>-<distro>:latest`.
    pub app_context: Option<String>,

    /// Shell used when the app spec does not choose one.
    pub default_shell: Shell,

    /// Distro used when the app spec does not choose one.
    pub default_distro: Distro,

    /// Repository prefix for images built from dockerfiles.
    pub image_repo: String,

    /// Namespace the controller runs in; owns the shell-context ConfigMap.
    /// Detected from the service account when unset.
    pub namespace: Option<String>,

    /// CRI endpoint for image metadata lookups. Unset uses crictl's default.
    pub cri_endpoint: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            metrics_bind_address: ":8080".to_string(),
            health_probe_bind_address: ":8081".to_string(),
            leader_elect: false,
            idle_live_seconds: 600,
            builder_svc: None,
            app_context: None,
            default_shell: Shell::Bash,
            default_distro: Distro::Alpine,
            image_repo: "docker.io/cliapp".to_string(),
            namespace: None,
            cri_endpoint: None,
        }
    }
}

impl ControllerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.display().to_string(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(path.display().to_string(), e))
    }

    pub fn idle_live(&self) -> Duration {
        Duration::from_secs(self.idle_live_seconds)
    }

    /// Namespace the controller runs in, for shell-context lookups.
    ///
    /// Priority: explicit config, the in-cluster service account file,
    /// `cliapp-system`.
    pub fn controller_namespace(&self) -> String {
        if let Some(ns) = &self.namespace {
            return ns.clone();
        }
        std::fs::read_to_string("/var/run/secrets/kubernetes.io/serviceaccount/namespace")
            .map(|ns| ns.trim().to_string())
            .ok()
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| "cliapp-system".to_string())
    }
}

/// Normalize a kubebuilder-style bind address (`:8080`) into something
/// `TcpListener::bind` accepts.
pub fn listen_addr(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
