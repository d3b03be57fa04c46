// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod bootstrap;
mod cli;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use svar_tools::ToolServerClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = svar_config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command.unwrap_or(Commands::Serve { bind: None }) {
        Commands::ShowConfig => {
            println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
            Ok(())
        }
        Commands::CheckTools => {
            let client = bootstrap::build_tool_client(&config);
            let tools = client
                .list_tools()
                .await
                .context("external tool server unreachable")?;
            for tool in &tools {
                println!("{}\t{}", tool.name, tool.description);
            }
            println!("{} tool(s) available", tools.len());
            Ok(())
        }
        Commands::Serve { bind } => {
            let state = bootstrap::build(&config).await?;
            let bind = bind.unwrap_or_else(|| config.http.bind.clone());
            svar_gateway::serve(&bind, state).await
        }
    }
}

/// Logging goes to stderr; `RUST_LOG` wins, `--verbose` lowers the default
/// level to debug.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
