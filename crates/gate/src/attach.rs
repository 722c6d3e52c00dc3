// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exec attach: the TTY byte pump between the client stream and the
//! workload's `workspace` container.
//!
//! Frames from the client carry either one input chunk or a terminal size;
//! bytes from the process go back as `raw=true` frames. When the process
//! exits non-zero, the stream is failed with `Aborted` carrying the decimal
//! exit code so the client can mirror it.

use cliapp_api::{CliApp, APP_CONTAINER, APP_ROOT};
use cliapp_rpc::{StdIn, StdOut};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status as ExecStatus;
use kube::api::{Api, AttachParams, TerminalSize};
use kube::{Client, Resource};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tonic::Status;
use tracing::{debug, info, warn};

/// Attach the client stream to the app's workload and pump until the
/// remote command finishes or either side disconnects.
pub async fn attach_session(
    client: Client,
    app: &CliApp,
    args: Vec<String>,
    init_size: Option<cliapp_rpc::TerminalSize>,
    inbound: tonic::Streaming<StdIn>,
    tx: mpsc::Sender<Result<StdOut, Status>>,
) -> Result<(), Status> {
    let namespace = app.meta().namespace.clone().unwrap_or_default();
    let pod_name = app
        .status
        .as_ref()
        .map(|s| s.pod_name.clone())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Status::unavailable("app has no ready workload"))?;

    let command = session_command(&app.spec.command, args);

    let params = AttachParams::default()
        .container(APP_CONTAINER)
        .stdin(true)
        .stdout(true)
        .stderr(false)
        .tty(true);

    let pods: Api<Pod> = Api::namespaced(client, &namespace);
    info!(pod = %pod_name, namespace = %namespace, "open session to workload");

    let mut attached = pods
        .exec(&pod_name, command, &params)
        .await
        .map_err(|e| Status::unavailable(format!("can't open exec stream: {e}")))?;

    let stdin = attached
        .stdin()
        .ok_or_else(|| Status::unavailable("exec stream has no stdin"))?;
    let mut stdout = attached
        .stdout()
        .ok_or_else(|| Status::unavailable("exec stream has no stdout"))?;
    let mut size_tx = attached.terminal_size();
    let mut resize = move |size: TerminalSize| {
        if let Some(size_tx) = size_tx.as_mut() {
            let _ = size_tx.try_send(size);
        }
    };

    if let Some(size) = init_size {
        resize(TerminalSize { width: size.width as u16, height: size.height as u16 });
    }

    let status_future = attached.take_status();
    let input_task = tokio::spawn(pump_client_input(inbound, stdin, resize));

    let mut buf = vec![0u8; 4096];
    loop {
        let n = match stdout.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let frame = StdOut { output: buf[..n].to_vec(), raw: true };
        if tx.send(Ok(frame)).await.is_err() {
            debug!(pod = %pod_name, "client went away during attach");
            break;
        }
    }

    let result = match status_future {
        Some(status) => exit_status_to_result(status.await),
        None => Ok(()),
    };
    input_task.abort();
    result
}

/// Assemble the exec command line. An app command runs chrooted into its
/// own rootfs; a bare debug shell runs straight in the context image.
pub(crate) fn session_command(app_command: &[String], args: Vec<String>) -> Vec<String> {
    if app_command.is_empty() {
        return args;
    }
    ["chroot".to_string(), APP_ROOT.to_string()]
        .into_iter()
        .chain(app_command.iter().cloned())
        .chain(args)
        .collect()
}

/// Forward client frames into the process: input chunks to stdin, size
/// frames to the executor's resize channel.
async fn pump_client_input<W, F>(mut inbound: tonic::Streaming<StdIn>, mut stdin: W, mut resize: F)
where
    W: AsyncWrite + Unpin,
    F: FnMut(TerminalSize),
{
    while let Ok(Some(frame)) = inbound.message().await {
        if let Some(size) = frame.terminal_size {
            resize(TerminalSize { width: size.width as u16, height: size.height as u16 });
        }

        if frame.input.is_empty() {
            continue;
        }
        if frame.input.len() != 1 {
            warn!(chunks = frame.input.len(), "invalid input frame");
            break;
        }
        if stdin.write_all(frame.input[0].as_bytes()).await.is_err() {
            break;
        }
        let _ = stdin.flush().await;
    }
}

/// Map the exec status document to the stream outcome.
fn exit_status_to_result(status: Option<ExecStatus>) -> Result<(), Status> {
    let Some(status) = status else {
        return Ok(());
    };
    if status.status.as_deref() == Some("Success") {
        return Ok(());
    }

    if status.reason.as_deref() == Some("NonZeroExitCode") {
        let code = status
            .details
            .as_ref()
            .and_then(|d| d.causes.as_ref())
            .into_iter()
            .flatten()
            .find(|cause| cause.reason.as_deref() == Some("ExitCode"))
            .and_then(|cause| cause.message.clone());
        if let Some(code) = code {
            return Err(Status::aborted(code));
        }
    }

    Err(Status::unavailable(
        status.message.unwrap_or_else(|| "exec stream failed".to_string()),
    ))
}

#[cfg(test)]
#[path = "attach_tests.rs"]
mod tests;
