// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical spec digest.
//!
//! Every workload pod carries two annotations: a stable digest of the spec
//! that created it, and the canonical serialization of that spec. A pod
//! whose annotations no longer match the current spec is old and gets
//! recycled. The digest must be a pure function of the spec value, so the
//! dump sorts all map keys before hashing.

use crate::CliAppSpec;

/// Annotation carrying the FNV-32a digest of the canonical spec dump.
pub const SPEC_HASH_ANNOTATION: &str = "spec-hash";

/// Annotation carrying the canonical spec dump itself.
pub const SPEC_DUMP_ANNOTATION: &str = "spec-dump";

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// FNV-1a, 32-bit. The digest is part of the workload annotation format and
/// must not change.
pub fn fnv32a(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(FNV_OFFSET_BASIS, |hash, byte| (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME))
}

/// Canonical, key-sorted JSON serialization of the spec.
///
/// Round-trips through `serde_json::Value`, whose object map is backed by a
/// BTreeMap: key order in the output is independent of declaration order in
/// the input.
pub fn canonical_dump(spec: &CliAppSpec) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(spec)?;
    serde_json::to_string(&value)
}

/// Digest of the canonical dump, rendered as 8 lowercase hex digits.
pub fn spec_hash(spec: &CliAppSpec) -> Result<String, serde_json::Error> {
    let dump = canonical_dump(spec)?;
    Ok(format!("{:08x}", fnv32a(dump.as_bytes())))
}

#[cfg(test)]
#[path = "hash_tests.rs"]
mod tests;
