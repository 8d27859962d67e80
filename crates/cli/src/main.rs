//! Cluster metrics CLI
//!
//! Shows cluster-wide CPU and memory utilization, either from a running
//! cluster metrics service or by reading the cluster directly.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::usage::{self, Target};
use metrics_lib::{FallbackOrchestrator, Resource};

/// Cluster metrics CLI
#[derive(Parser)]
#[command(name = "kcm")]
#[command(author, version, about = "CLI for cluster CPU and memory utilization", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via KCM_API_URL env var)
    #[arg(long, env = "KCM_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Read the cluster directly instead of asking the service
    #[arg(long)]
    pub local: bool,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show cluster CPU utilization
    Cpu,

    /// Show cluster memory utilization
    Memory,
}

impl Commands {
    fn resource(&self) -> Resource {
        match self {
            Commands::Cpu => Resource::Cpu,
            Commands::Memory => Resource::Memory,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let target = if cli.local {
        Target::Local(FallbackOrchestrator::with_defaults())
    } else {
        Target::Remote(client::ApiClient::new(&cli.api_url)?)
    };

    usage::show_usage(&target, cli.command.resource(), cli.format).await
}
