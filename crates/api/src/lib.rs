// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared model for the cliapp workspace.
//!
//! Defines the CliApp custom resource, its phase machine vocabulary, the
//! canonical spec digest used to detect drift between a CliApp and its
//! workloads, and small helpers (conflict-retrying spec updates, a clock
//! seam for timer tests) used by both the controller and the session gate.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod app;
mod clock;
mod hash;
mod retry;

pub use app::{
    default_context_image, CliApp, CliAppSpec, CliAppStatus, Distro, ForkSpec, Phase, Shell,
    TargetPhase, ValidationError, APP_CONTAINER, APP_IMAGE_VOLUME, APP_LABEL, APP_ROOT,
    SHELL_CONTEXT_CONFIGMAP,
};
pub use clock::{Clock, FakeClock, SystemClock};
pub use hash::{canonical_dump, fnv32a, spec_hash, SPEC_DUMP_ANNOTATION, SPEC_HASH_ANNOTATION};
pub use retry::update_spec_with_retry;
