// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CliApp controller binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use cliapp_api::SystemClock;
use cliapp_controller::build::{BuildctlBackend, ImageBuilder};
use cliapp_controller::config::{listen_addr, ControllerConfig};
use cliapp_controller::cri::CrictlResolver;
use cliapp_controller::probes::{spawn_listeners, Metrics};
use cliapp_controller::reconcile::{run_controller, Ctx};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cliapp-controller", about = "Reconciles CliApps into live workloads")]
struct Args {
    /// Address the metrics endpoint binds to. Empty disables it.
    #[arg(long)]
    metrics_bind_address: Option<String>,

    /// Address the health probe endpoint binds to. Empty disables it.
    #[arg(long)]
    health_probe_bind_address: Option<String>,

    /// Accepted for manifest compatibility; the controller runs as the
    /// sole leader.
    #[arg(long)]
    leader_elect: bool,

    /// Seconds an idle app stays up waiting for new sessions.
    #[arg(long, value_name = "seconds")]
    idle_live: Option<u64>,

    /// buildkitd endpoint used to build app images on demand.
    #[arg(long, value_name = "endpoint")]
    builder_svc: Option<String>,

    /// Context image override for every app.
    #[arg(long, value_name = "image")]
    app_context: Option<String>,

    /// Default shell: bash or zsh.
    #[arg(long, value_name = "shell")]
    default_shell: Option<String>,

    /// Default distro: alpine or ubuntu.
    #[arg(long, value_name = "distro")]
    default_distro: Option<String>,

    /// Load configuration from a TOML file; flags override file values.
    #[arg(long, value_name = "path")]
    config: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<ControllerConfig> {
        let mut config = match &self.config {
            Some(path) => ControllerConfig::load(path)?,
            None => ControllerConfig::default(),
        };

        if let Some(addr) = self.metrics_bind_address {
            config.metrics_bind_address = addr;
        }
        if let Some(addr) = self.health_probe_bind_address {
            config.health_probe_bind_address = addr;
        }
        if self.leader_elect {
            config.leader_elect = true;
        }
        if let Some(secs) = self.idle_live {
            config.idle_live_seconds = secs;
        }
        if let Some(endpoint) = self.builder_svc {
            config.builder_svc = Some(endpoint);
        }
        if let Some(image) = self.app_context {
            config.app_context = Some(image);
        }
        if let Some(shell) = self.default_shell {
            config.default_shell = shell.parse()?;
        }
        if let Some(distro) = self.default_distro {
            config.default_distro = distro.parse()?;
        }

        Ok(config)
    }
}

async fn run(config: ControllerConfig) -> anyhow::Result<()> {
    info!(
        default_shell = %config.default_shell,
        default_distro = %config.default_distro,
        idle_live_seconds = config.idle_live_seconds,
        builder = config.builder_svc.as_deref().unwrap_or("<none>"),
        "starting controller"
    );

    if config.leader_elect {
        warn!("leader election is not supported; running as the sole leader");
    }

    let metrics = Arc::new(Metrics::new());
    let health = Some(&config.health_probe_bind_address)
        .filter(|a| !a.is_empty())
        .map(|a| listen_addr(a));
    let metrics_addr = Some(&config.metrics_bind_address)
        .filter(|a| !a.is_empty())
        .map(|a| listen_addr(a));
    spawn_listeners(health, metrics_addr, Arc::clone(&metrics));

    let builder = ImageBuilder::new(
        config
            .builder_svc
            .clone()
            .map(|endpoint| Arc::new(BuildctlBackend::new(endpoint)) as _),
        config.image_repo.clone(),
    );
    let images = Arc::new(CrictlResolver::new(config.cri_endpoint.clone()));

    let client = kube::Client::try_default()
        .await
        .context("unable to create cluster client")?;

    let ctx = Ctx {
        client,
        config,
        builder,
        images,
        clock: SystemClock,
        metrics,
    };

    run_controller(ctx).await.context("controller stopped")?;
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match args.into_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err:#}");
            std::process::exit(1);
        }
    };

    if let Err(err) = run(config).await {
        eprintln!("setup failed: {err:#}");
        std::process::exit(1);
    }
}
