// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! cliapp client binary: open interactive sessions into CliApp workloads.

mod driver;
mod endpoints;
mod exit_error;

use clap::{Parser, Subcommand};

use exit_error::ExitError;

const GATE_PORT_NAME: &str = "session-gate";

#[derive(Parser, Debug)]
#[command(name = "cliapp", about = "Open interactive sessions into CliApp workloads")]
struct Cli {
    /// Namespace the session gate Service lives in
    #[arg(long, default_value = "cliapp-system", global = true)]
    gate_namespace: String,

    /// Name of the session gate Service
    #[arg(long, default_value = "cliapp-session-gate", global = true)]
    gate_service: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the app's command, forwarding extra arguments
    Run {
        /// App name
        name: String,

        /// App namespace (defaults to the current context namespace)
        #[arg(short = 'n', long)]
        namespace: Option<String>,

        /// Arguments appended to the app command
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Open a debug shell in the app's workload
    Shell {
        /// App name
        name: String,

        /// App namespace (defaults to the current context namespace)
        #[arg(short = 'n', long)]
        namespace: Option<String>,

        /// Shell binary to run
        #[arg(long, default_value = "bash")]
        shell: String,
    },
}

async fn run(cli: Cli) -> Result<(), ExitError> {
    let client = kube::Client::try_default()
        .await
        .map_err(|e| ExitError::new(1, format!("unable to create cluster client: {e}")))?;

    let (name, namespace, args) = match cli.command {
        Command::Run { name, namespace, args } => (name, namespace, args),
        Command::Shell { name, namespace, shell } => (name, namespace, vec![shell]),
    };
    let namespace = namespace.unwrap_or_else(|| client.default_namespace().to_string());

    let endpoints = endpoints::fetch_gate_endpoints(
        &client,
        &cli.gate_namespace,
        &cli.gate_service,
        GATE_PORT_NAME,
    )
    .await?;

    driver::exec_cli_app(&endpoints, &name, &namespace, args).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        if !err.message.is_empty() {
            eprintln!("{err}");
        }
        std::process::exit(err.code);
    }
}
