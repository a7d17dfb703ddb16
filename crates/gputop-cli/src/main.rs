//! gputop - GPU allocation report for Kubernetes cluster snapshots

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use gputop_core::{Config, ObservabilityConfig};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::Context;
use output::OutputFormat;

/// GPU allocation report for Kubernetes cluster snapshots
#[derive(Debug, Parser)]
#[command(name = "gputop")]
#[command(about = "Show how GPU devices and GPU memory are allocated across a cluster")]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Cluster snapshot to read (YAML, or JSON with a .json extension)
    #[arg(short, long, value_name = "FILE")]
    snapshot: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable JSON output (overrides --output)
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Per-node GPU allocation with cluster totals
    Nodes {
        /// Only show these nodes
        #[arg(short, long = "node", value_name = "NAME")]
        nodes: Vec<String>,
    },

    /// Per-device GPU memory and the pods bound to each device
    Devices {
        /// Only show devices of these nodes
        #[arg(short, long = "node", value_name = "NAME")]
        nodes: Vec<String>,
    },

    /// GPU requests and allocations of training jobs
    Jobs {
        /// Only show jobs in this namespace
        #[arg(short, long)]
        namespace: Option<String>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Config::load().context("Failed to load configuration"),
    }
}

fn init_logging(observability: &ObservabilityConfig, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        observability.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "gputop={level},gputop_core={level},gputop_ledger={level}",
            level = level
        ))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if observability.is_json() {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;
    init_logging(&config.observability, cli.verbose);
    debug!("Starting gputop with arguments: {:?}", cli);

    let output_format = if cli.json {
        OutputFormat::Json
    } else {
        cli.output
    };
    let ctx = Context::new(config, cli.snapshot, output_format)?;

    match cli.command {
        Commands::Nodes { nodes } => commands::nodes::list_nodes(&ctx, &nodes).await?,
        Commands::Devices { nodes } => commands::devices::list_devices(&ctx, &nodes).await?,
        Commands::Jobs { namespace } => commands::jobs::list_jobs(&ctx, namespace).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert()
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["gputop", "--snapshot", "cluster.yaml", "nodes"]).unwrap();
        assert!(matches!(cli.command, Commands::Nodes { ref nodes } if nodes.is_empty()));
        assert_eq!(cli.snapshot, Some(PathBuf::from("cluster.yaml")));

        let cli = Cli::try_parse_from(["gputop", "devices", "--node", "a", "-n", "b"]).unwrap();
        assert!(matches!(cli.command, Commands::Devices { ref nodes } if nodes == &["a", "b"]));

        let cli = Cli::try_parse_from(["gputop", "jobs", "--namespace", "ml"]).unwrap();
        assert!(matches!(cli.command, Commands::Jobs { namespace: Some(ref ns) } if ns == "ml"));

        assert!(Cli::try_parse_from(["gputop"]).is_err());
    }

    #[test]
    fn test_output_format() {
        let cli = Cli::try_parse_from(["gputop", "--json", "nodes"]).unwrap();
        assert!(cli.json);

        let cli = Cli::try_parse_from(["gputop", "--output", "yaml", "nodes"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Yaml);
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gputop.yaml");
        std::fs::write(&path, "snapshot:\n  path: /data/cluster.yaml\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.snapshot.path, Some(PathBuf::from("/data/cluster.yaml")));
    }
}
