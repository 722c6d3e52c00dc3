// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Image metadata lookups through the local container runtime.
//!
//! The workload builder needs the target image's `PATH` and working
//! directory to re-root them under `/app-root`. The production resolver
//! shells out to `crictl inspecti`, whose verbose output carries the image
//! config under `info["info"].imageSpec.config`. The `info` value is a
//! JSON string on most runtimes and an object on some; both are accepted.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("unable to run crictl: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("image status for {image} failed: {detail}")]
    Status { image: String, detail: String },

    #[error("image status for {image} returned malformed JSON: {source}")]
    Malformed {
        image: String,
        #[source]
        source: serde_json::Error,
    },
}

/// PATH entries and workdir of an image, as reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageMetadata {
    pub working_dir: Option<String>,
    pub path_entries: Vec<String>,
}

/// Seam for the CRI image-status collaborator.
#[async_trait]
pub trait ImageMetadataResolver: Send + Sync {
    async fn image_metadata(&self, image: &str) -> Result<ImageMetadata, MetadataError>;
}

/// Resolver backed by `crictl inspecti`.
pub struct CrictlResolver {
    runtime_endpoint: Option<String>,
}

impl CrictlResolver {
    pub fn new(runtime_endpoint: Option<String>) -> Self {
        Self { runtime_endpoint }
    }
}

#[async_trait]
impl ImageMetadataResolver for CrictlResolver {
    async fn image_metadata(&self, image: &str) -> Result<ImageMetadata, MetadataError> {
        let mut cmd = tokio::process::Command::new("crictl");
        if let Some(endpoint) = &self.runtime_endpoint {
            cmd.arg("--runtime-endpoint").arg(endpoint);
        }
        cmd.arg("inspecti").arg("--output").arg("json").arg(image);

        let output = cmd.output().await.map_err(MetadataError::Spawn)?;
        if !output.status.success() {
            return Err(MetadataError::Status {
                image: image.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_image_status(&output.stdout, image)
    }
}

/// Extract `imageSpec.config.{Env, WorkingDir}` from an image-status
/// document.
pub(crate) fn parse_image_status(raw: &[u8], image: &str) -> Result<ImageMetadata, MetadataError> {
    let doc: serde_json::Value = serde_json::from_slice(raw)
        .map_err(|e| MetadataError::Malformed { image: image.to_string(), source: e })?;

    // The verbose info map nests the interesting document under "info",
    // either pre-parsed or as a JSON string.
    let info = match &doc["info"]["info"] {
        serde_json::Value::String(s) => serde_json::from_str::<serde_json::Value>(s)
            .map_err(|e| MetadataError::Malformed { image: image.to_string(), source: e })?,
        other => other.clone(),
    };

    let config = &info["imageSpec"]["config"];
    let working_dir = config["WorkingDir"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    let path_entries = config["Env"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str())
        .find_map(|kv| kv.strip_prefix("PATH="))
        .map(|path| path.split(':').filter(|p| !p.is_empty()).map(String::from).collect())
        .unwrap_or_default();

    Ok(ImageMetadata { working_dir, path_entries })
}

#[cfg(test)]
#[path = "cri_tests.rs"]
mod tests;
