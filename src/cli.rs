// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "svar",
    version,
    about = "Multi-agent conversation dispatcher for customer-support chatbots"
)]
pub struct Cli {
    /// Explicit config file, merged over the discovered config layers
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging to stderr (RUST_LOG overrides the level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP gateway (the default when no subcommand is given)
    Serve {
        /// Bind address override, e.g. 0.0.0.0:8711
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print the merged configuration as YAML
    ShowConfig,
    /// Probe the external tool server and list its tools
    CheckTools,
}
