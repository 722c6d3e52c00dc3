// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health probe and metrics endpoints.
//!
//! Plain HTTP/1.1 responders over a TCP listener. The probe endpoint
//! answers `/healthz` and `/readyz`; the metrics endpoint renders the
//! reconcile counters in Prometheus text format. Responses are framed with
//! Content-Length and the connection closes after one exchange.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Reconcile counters surfaced on the metrics endpoint.
#[derive(Default)]
pub struct Metrics {
    reconciles: AtomicU64,
    failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe_reconcile(&self) {
        self.reconciles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn render(&self) -> String {
        format!(
            "# TYPE cliapp_reconciles_total counter\n\
             cliapp_reconciles_total {}\n\
             # TYPE cliapp_reconcile_failures_total counter\n\
             cliapp_reconcile_failures_total {}\n",
            self.reconciles.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed),
        )
    }
}

/// Serve `/healthz` and `/readyz`.
pub async fn serve_probes(addr: String) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "health probes listening");
    loop {
        let (stream, _) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(err) = respond(stream, |path| match path {
                "/healthz" | "/readyz" => Some("ok\n".to_string()),
                _ => None,
            })
            .await
            {
                debug!(error = %err, "probe connection error");
            }
        });
    }
}

/// Serve `/metrics`.
pub async fn serve_metrics(addr: String, metrics: Arc<Metrics>) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "metrics listening");
    loop {
        let (stream, _) = listener.accept().await?;
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            let result = respond(stream, |path| {
                (path == "/metrics").then(|| metrics.render())
            })
            .await;
            if let Err(err) = result {
                debug!(error = %err, "metrics connection error");
            }
        });
    }
}

/// Read one request line and answer it. `body_for` returns `None` for 404.
async fn respond<F>(mut stream: TcpStream, body_for: F) -> std::io::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let mut reader = BufReader::new(&mut stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    let path = request_line.split_whitespace().nth(1).unwrap_or("/");
    let response = match body_for(path) {
        Some(body) => format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ),
        None => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            .to_string(),
    };

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// Spawn a listener task, logging instead of failing when the bind is
/// rejected. An empty address disables the endpoint.
pub fn spawn_listeners(
    health_addr: Option<String>,
    metrics_addr: Option<String>,
    metrics: Arc<Metrics>,
) {
    if let Some(addr) = health_addr {
        tokio::spawn(async move {
            if let Err(err) = serve_probes(addr.clone()).await {
                warn!(addr = %addr, error = %err, "health probe listener stopped");
            }
        });
    }
    if let Some(addr) = metrics_addr {
        tokio::spawn(async move {
            if let Err(err) = serve_metrics(addr.clone(), metrics).await {
                warn!(addr = %addr, error = %err, "metrics listener stopped");
            }
        });
    }
}
