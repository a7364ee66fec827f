use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tracing::debug;

use crate::{
    config::{FileConfig, RunConfig, TxKind},
    error::RunError,
    orchestrator::Orchestrator,
    rpc::AlloyEndpoint,
    stats::RunSummary,
};

#[derive(Debug, Parser)]
#[command(name = "txhammer")]
#[command(
    about = "Transaction load generator - sends value transfers from one account across concurrent workers and reports confirmation latency"
)]
pub struct Args {
    /// Test duration, in seconds or as a humantime string ("90s", "5m") [default: 30]
    #[arg(short, long)]
    pub duration: Option<String>,

    /// Transaction type (legacy, eip1559, blob) [default: eip1559]
    #[arg(short = 't', long = "type")]
    pub kind: Option<TxKind>,

    /// RPC endpoint URL
    #[arg(short, long)]
    pub rpc: Option<String>,

    /// Sender private key (hex, with or without 0x prefix)
    #[arg(short = 'k', long = "key", env = "TXHAMMER_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Recipient address
    #[arg(long)]
    pub to: Option<String>,

    /// Number of concurrent workers [default: 1]
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Pause after each accepted transaction [default: 1s]
    #[arg(long)]
    pub send_interval: Option<String>,

    /// Pause after a failed send [default: 100ms]
    #[arg(long)]
    pub retry_delay: Option<String>,

    /// How long to wait for confirmations after the test ends [default: 30s]
    #[arg(long)]
    pub drain_window: Option<String>,

    /// How often to poll the node for new blocks [default: 500ms]
    #[arg(long)]
    pub block_poll_interval: Option<String>,

    /// YAML run file; flags given on the command line take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the summary as JSON instead of the text report
    #[arg(long)]
    pub json: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,
}

impl Args {
    /// Command-line values as a config layer.
    pub fn to_file_config(&self) -> FileConfig {
        FileConfig {
            rpc: self.rpc.clone(),
            private_key: self.private_key.clone(),
            to: self.to.clone(),
            kind: self.kind,
            concurrency: self.concurrency,
            duration: self.duration.clone(),
            send_interval: self.send_interval.clone(),
            retry_delay: self.retry_delay.clone(),
            drain_window: self.drain_window.clone(),
            block_poll_interval: self.block_poll_interval.clone(),
        }
    }

    /// Merges the optional run file under the command line and validates the result.
    pub fn resolve(&self) -> anyhow::Result<RunConfig> {
        let cli = self.to_file_config();
        let merged = match &self.config {
            Some(path) => cli.or(FileConfig::load(path)?),
            None => cli,
        };
        merged.resolve()
    }
}

/// Resolves `args`, connects to the node and runs the load test.
pub async fn run_load_test(args: &Args) -> Result<RunSummary, RunError> {
    let config = args.resolve().map_err(RunError::InvalidConfig)?;
    debug!(?config, "Resolved configuration");

    let endpoint = AlloyEndpoint::new(&config.rpc_url, config.block_poll_interval)
        .map_err(RunError::InvalidConfig)?;
    Orchestrator::new(Arc::new(endpoint), config).run().await
}
