// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! gRPC surface of the session gate.
//!
//! The `AppGate` service exposes one bidirectional stream, `OpenShell`.
//! `proto/session.proto` is the source of truth; `session.rs` holds the
//! committed tonic/prost output so building the workspace does not depend
//! on a protoc toolchain.

pub mod session;

pub use session::app_gate_client::AppGateClient;
pub use session::app_gate_server::{AppGate, AppGateServer};
pub use session::{App, StdIn, StdOut, TerminalSize};
