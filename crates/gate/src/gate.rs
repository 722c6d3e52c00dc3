// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The gRPC session gate.
//!
//! One `OpenShell` stream per interactive session. The first client frame
//! names the app; the gate takes a session reference (driving the app Live
//! if needed), attaches to the workload's exec endpoint, and pumps bytes
//! until the remote command finishes. Stream teardown releases the
//! reference, and the last release drives the app back to Rest.

use std::sync::Arc;

use cliapp_rpc::{AppGate, StdIn, StdOut};
use kube::Client;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{error, info, warn};

use crate::session::SessionMap;
use crate::{attach, watch};

/// Buffered progress lines between an open op and this stream's client.
const PROGRESS_BUFFER: usize = 8;

/// Sends progress lines to the client as non-raw frames, dimmed so they
/// stand apart from TTY output.
#[derive(Clone)]
pub struct ProgressWriter {
    tx: mpsc::Sender<Result<StdOut, Status>>,
}

impl ProgressWriter {
    pub fn new(tx: mpsc::Sender<Result<StdOut, Status>>) -> Self {
        Self { tx }
    }

    pub async fn line(&self, text: &str) {
        let styled = format!("\x1b[90m\u{276f}\u{276f} {text}\x1b[0m\n");
        let frame = StdOut { output: styled.into_bytes(), raw: false };
        if self.tx.send(Ok(frame)).await.is_err() {
            warn!("unable to send progress line back to client");
        }
    }
}

#[derive(Clone)]
pub struct TerminalGate {
    client: Client,
    sessions: Arc<SessionMap>,
}

impl TerminalGate {
    pub fn new(client: Client) -> Self {
        Self { client, sessions: Arc::new(SessionMap::default()) }
    }
}

#[tonic::async_trait]
impl AppGate for TerminalGate {
    type OpenShellStream = ReceiverStream<Result<StdOut, Status>>;

    async fn open_shell(
        &self,
        request: Request<Streaming<StdIn>>,
    ) -> Result<Response<Self::OpenShellStream>, Status> {
        let mut inbound = request.into_inner();

        let first = inbound
            .message()
            .await
            .map_err(|e| Status::unavailable(format!("can't receive from client: {e}")))?
            .ok_or_else(|| Status::unavailable("client closed the stream before opening an app"))?;

        let identity = first
            .app
            .clone()
            .ok_or_else(|| Status::invalid_argument("App is required in the first request."))?;
        if identity.name.is_empty() {
            return Err(Status::invalid_argument("App.Name is required in the first request."));
        }
        if identity.namespace.is_empty() {
            return Err(Status::invalid_argument(
                "App.Namespace is required in the first request.",
            ));
        }

        let (tx, rx) = mpsc::channel(32);
        let gate = self.clone();
        tokio::spawn(run_session(gate, identity.namespace, identity.name, first, inbound, tx));
        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

async fn run_session(
    gate: TerminalGate,
    namespace: String,
    name: String,
    first: StdIn,
    inbound: Streaming<StdIn>,
    tx: mpsc::Sender<Result<StdOut, Status>>,
) {
    info!(app = %name, namespace = %namespace, "open app");
    let session = gate.sessions.session(&namespace, &name);

    let open_result = {
        let client = gate.client.clone();
        let (ns, app_name) = (namespace.clone(), name.clone());

        // Progress lines from the (possibly shared) open op are forwarded
        // to this client as non-raw frames.
        let (progress_tx, mut progress_rx) = mpsc::channel::<String>(PROGRESS_BUFFER);
        let writer = ProgressWriter::new(tx.clone());
        tokio::spawn(async move {
            while let Some(line) = progress_rx.recv().await {
                writer.line(&line).await;
            }
        });

        session
            .open(progress_tx, move |progress, cancel| {
                watch::open_app(client, ns, app_name, progress, cancel)
            })
            .await
    };

    let outcome = match open_result {
        Ok(app) => {
            attach::attach_session(
                gate.client.clone(),
                &app,
                first.input,
                first.terminal_size,
                inbound,
                tx.clone(),
            )
            .await
        }
        Err(err) => {
            error!(app = %name, error = %err, "unable to open app");
            Err(Status::unavailable(err))
        }
    };

    if let Err(status) = outcome {
        let _ = tx.send(Err(status)).await;
    }
    drop(tx);

    // Balance the reference whether or not the attach succeeded.
    let client = gate.client.clone();
    let (ns, app_name) = (namespace.clone(), name.clone());
    if let Err(err) =
        session.close(move |cancel| watch::close_app(client, ns, app_name, cancel)).await
    {
        error!(app = %name, error = %err, "unable to close session");
    }
    info!(app = %name, namespace = %namespace, "app session closed");
}
