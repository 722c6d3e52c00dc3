// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The client side of an `OpenShell` stream.
//!
//! Wires local stdio to the gate: stdin chunks go up as input frames,
//! `raw=true` frames come back to the terminal verbatim, `raw=false`
//! progress lines print to the local stdout. The terminal enters raw mode
//! only once the first raw frame arrives, so a user can still interrupt a
//! slow startup; SIGWINCH re-probes the window and forwards the size.

use std::io::IsTerminal;

use cliapp_rpc::{App, AppGateClient, StdIn, StdOut, TerminalSize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::{Code, Status};

use crate::exit_error::ExitError;

/// RAII guard that puts the terminal into raw mode and restores it on drop.
struct RawTerminalGuard {
    original: nix::sys::termios::Termios,
}

impl RawTerminalGuard {
    fn new() -> Result<Self, ExitError> {
        let stdin = std::io::stdin();
        let original = nix::sys::termios::tcgetattr(&stdin)
            .map_err(|e| ExitError::new(1, format!("can't initialize terminal: {e}")))?;
        let mut raw = original.clone();
        nix::sys::termios::cfmakeraw(&mut raw);
        nix::sys::termios::tcsetattr(&stdin, nix::sys::termios::SetArg::TCSANOW, &raw)
            .map_err(|e| ExitError::new(1, format!("can't initialize terminal: {e}")))?;
        Ok(Self { original })
    }
}

impl Drop for RawTerminalGuard {
    fn drop(&mut self) {
        let stdin = std::io::stdin();
        let _ = nix::sys::termios::tcsetattr(
            &stdin,
            nix::sys::termios::SetArg::TCSANOW,
            &self.original,
        );
    }
}

fn probe_terminal_size() -> Option<TerminalSize> {
    terminal_size::terminal_size().map(|(width, height)| TerminalSize {
        width: u32::from(width.0),
        height: u32::from(height.0),
    })
}

/// Dial the candidates in order until one answers.
async fn connect(endpoints: &[String]) -> Result<AppGateClient<Channel>, ExitError> {
    for (i, endpoint) in endpoints.iter().enumerate() {
        match AppGateClient::connect(format!("http://{endpoint}")).await {
            Ok(client) => return Ok(client),
            Err(err) => {
                eprintln!("can't connect to app session gate \"{endpoint}\": {err}");
                if let Some(next) = endpoints.get(i + 1) {
                    eprintln!("Try the next endpoint {next}");
                }
            }
        }
    }
    Err(ExitError::new(1, "all remote endpoints are unavailable"))
}

/// Open a session for `namespace/name` and pump until the remote command
/// finishes. Returns the remote exit code through `ExitError`.
pub async fn exec_cli_app(
    endpoints: &[String],
    name: &str,
    namespace: &str,
    args: Vec<String>,
) -> Result<(), ExitError> {
    let mut client = connect(endpoints).await?;

    let stdout_is_terminal = std::io::stdout().is_terminal();
    let stdin_is_terminal = std::io::stdin().is_terminal();

    let (frames_tx, frames_rx) = mpsc::channel::<StdIn>(16);
    frames_tx
        .send(StdIn {
            app: Some(App { name: name.to_string(), namespace: namespace.to_string() }),
            input: args,
            terminal_size: stdout_is_terminal.then(probe_terminal_size).flatten(),
        })
        .await
        .map_err(|_| ExitError::new(1, "unable to open app session"))?;

    let mut inbound = client
        .open_shell(ReceiverStream::new(frames_rx))
        .await
        .map_err(|e| ExitError::new(1, format!("unable to open app session: {}", e.message())))?
        .into_inner();

    // stdin → input frames, one chunk per frame
    let stdin_tx = frames_tx.clone();
    let stdin_task = tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buf = [0u8; 1024];
        loop {
            let n = match stdin.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            let chunk = String::from_utf8_lossy(&buf[..n]).to_string();
            if stdin_tx.send(StdIn { input: vec![chunk], ..Default::default() }).await.is_err() {
                break;
            }
        }
    });

    let mut winch = signal(SignalKind::window_change())
        .map_err(|e| ExitError::new(1, format!("unable to watch window size: {e}")))?;

    let mut raw_guard: Option<RawTerminalGuard> = None;
    let mut stdout = tokio::io::stdout();

    let result = loop {
        tokio::select! {
            message = inbound.message() => match message {
                Ok(Some(StdOut { output, raw })) => {
                    if output.is_empty() {
                        continue;
                    }
                    if raw {
                        // The first raw frame means the remote shell is
                        // actually open; only now take over the terminal.
                        if stdin_is_terminal && raw_guard.is_none() {
                            match RawTerminalGuard::new() {
                                Ok(guard) => raw_guard = Some(guard),
                                Err(err) => break Err(err),
                            }
                        }
                        if stdout.write_all(&output).await.is_err() {
                            break Ok(());
                        }
                        let _ = stdout.flush().await;
                    } else {
                        print!("{}", String::from_utf8_lossy(&output));
                    }
                }
                Ok(None) => break Ok(()),
                Err(status) => break map_stream_error(status),
            },
            _ = winch.recv() => {
                if stdout_is_terminal {
                    if let Some(size) = probe_terminal_size() {
                        if frames_tx
                            .send(StdIn { terminal_size: Some(size), ..Default::default() })
                            .await
                            .is_err()
                        {
                            break Ok(());
                        }
                    }
                }
            }
        }
    };

    stdin_task.abort();
    drop(raw_guard);
    result
}

/// Map a terminal stream status: `Canceled` ends silently, `Aborted` with a
/// decimal payload mirrors the remote exit code, anything else reports.
fn map_stream_error(status: Status) -> Result<(), ExitError> {
    match status.code() {
        Code::Cancelled => Ok(()),
        Code::Aborted => match status.message().parse::<i32>() {
            Ok(code) => Err(ExitError::remote(code)),
            Err(_) => Err(ExitError::new(1, format!("session aborted: {}", status.message()))),
        },
        _ => Err(ExitError::new(
            1,
            format!("can't read the remote response: {}", status.message()),
        )),
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
