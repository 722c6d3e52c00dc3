// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The claim pass: which workload keeps serving the app.
//!
//! Workloads are enumerated by app label and partitioned against the
//! current spec annotations. Pods whose `spec-hash`/`spec-dump` both match
//! are candidates; everything else (including annotation-less pods) is old
//! and gets recycled. At most one candidate survives: ties keep the first
//! by name order so concurrent reconciles settle on the same pod.

use cliapp_api::{SPEC_DUMP_ANNOTATION, SPEC_HASH_ANNOTATION};
use k8s_openapi::api::core::v1::Pod;

use super::decision::ClaimOutcome;

/// Result of partitioning the labeled fleet.
#[derive(Debug, Default)]
pub struct ClaimPartition {
    /// The single surviving candidate, if any.
    pub candidate: Option<Pod>,
    /// Pods to delete: mismatched, annotation-less, or surplus candidates.
    pub recycle: Vec<Pod>,
    /// Pods already terminating; left alone.
    pub terminating: Vec<Pod>,
}

/// Partition `pods` against the current `(spec-hash, spec-dump)` pair.
pub fn partition_workloads(pods: Vec<Pod>, hash: &str, dump: &str) -> ClaimPartition {
    let mut fresh: Vec<Pod> = Vec::new();
    let mut partition = ClaimPartition::default();

    for pod in pods {
        if pod.metadata.deletion_timestamp.is_some() {
            partition.terminating.push(pod);
            continue;
        }

        let matches = pod
            .metadata
            .annotations
            .as_ref()
            .is_some_and(|ann| {
                ann.get(SPEC_HASH_ANNOTATION).map(String::as_str) == Some(hash)
                    && ann.get(SPEC_DUMP_ANNOTATION).map(String::as_str) == Some(dump)
            });

        if matches {
            fresh.push(pod);
        } else {
            partition.recycle.push(pod);
        }
    }

    fresh.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
    let mut fresh = fresh.into_iter();
    partition.candidate = fresh.next();
    partition.recycle.extend(fresh);

    partition
}

/// Ready means the `Ready` condition reports `True`.
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions.iter().any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

/// Collapse a partition into the claim outcome the decision table consumes.
pub fn claim_outcome(partition: &ClaimPartition) -> ClaimOutcome {
    match &partition.candidate {
        Some(pod) => {
            let name = pod.metadata.name.clone().unwrap_or_default();
            if is_pod_ready(pod) {
                ClaimOutcome::Ready(name)
            } else {
                ClaimOutcome::Starting(name)
            }
        }
        None => ClaimOutcome::NoCandidate,
    }
}

#[cfg(test)]
#[path = "claim_tests.rs"]
mod tests;
