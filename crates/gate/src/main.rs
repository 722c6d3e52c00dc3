// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session gate binary.

use anyhow::Context;
use clap::Parser;
use cliapp_api::CliApp;
use cliapp_gate::TerminalGate;
use cliapp_rpc::AppGateServer;
use kube::api::{Api, ListParams};
use tonic::transport::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "session-gate", about = "Multiplexes terminal sessions onto CliApp workloads")]
struct Args {
    /// TCP address to listen on
    #[arg(long, default_value = ":8001")]
    addr: String,
}

fn listen_addr(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let client = kube::Client::try_default()
        .await
        .context("unable to create cluster client")?;

    // Fail fast when the gate can't see CliApps at all.
    let apps: Api<CliApp> = Api::all(client.clone());
    apps.list(&ListParams::default().limit(1))
        .await
        .context("unable to list CliApps; check RBAC for the gate")?;

    let addr = listen_addr(&args.addr)
        .parse()
        .with_context(|| format!("invalid listen address {:?}", args.addr))?;

    info!(%addr, "session gate listening");
    Server::builder()
        .add_service(AppGateServer::new(TerminalGate::new(client)))
        .serve(addr)
        .await
        .context("gate server stopped")?;
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run(Args::parse()).await {
        eprintln!("setup failed: {err:#}");
        std::process::exit(1);
    }
}
