// CLI - Command line for local devnets and ad-hoc chain waits

pub mod config;
pub mod runner;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Fire E2E - process orchestration and chain-event waits for Firechain nodes
#[derive(Parser, Debug)]
#[command(name = "fire-e2e")]
#[command(author = "Firechain Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "End-to-end harness for Firechain nodes")]
#[command(long_about = r#"
Start a local peered network and keep it running:
  fire-e2e devnet --roles alice,bob,charlie --print-logs

Wait for an event on a running node:
  fire-e2e wait-event --pallet Session --event NewSession --timeout 120

Wait for five finalized blocks:
  fire-e2e wait-blocks --count 5 --finalized
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Harness config file (TOML)
    #[arg(short, long, global = true, env = "FIRE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, default_value = "false")]
    pub verbose: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", env = "FIRE_LOG")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start peered nodes and keep them running until Ctrl-C
    Devnet(DevnetCmd),

    /// Delete the shared temporary directory
    Purge,

    /// Show chain, runtime and block information
    Info(EndpointArgs),

    /// Wait for a (pallet, event) pair
    WaitEvent(WaitEventCmd),

    /// Wait for new block headers
    WaitBlocks(WaitBlocksCmd),
}

#[derive(Args, Debug)]
pub struct DevnetCmd {
    /// Comma separated authority roles; the first one is the bootstrap node
    #[arg(long, default_value = "alice,bob")]
    pub roles: String,

    /// Forward node output to the log
    #[arg(long)]
    pub print_logs: bool,

    /// Node binary
    #[arg(long, env = "FIRE_NODE_BIN")]
    pub binary: Option<PathBuf>,

    /// Chain spec passed to --chain
    #[arg(long)]
    pub chain: Option<String>,

    /// Added to every rpc and p2p port
    #[arg(long)]
    pub port_offset: Option<u16>,
}

#[derive(Args, Debug, Clone)]
pub struct EndpointArgs {
    /// Node WebSocket endpoint
    #[arg(long, default_value = "ws://127.0.0.1:9944")]
    pub endpoint: String,
}

#[derive(Args, Debug)]
pub struct WaitEventCmd {
    #[command(flatten)]
    pub endpoint: EndpointArgs,

    /// Pallet name (case-insensitive)
    #[arg(long)]
    pub pallet: String,

    /// Event name (exact)
    #[arg(long)]
    pub event: String,

    /// Require a top-level payload field
    #[arg(long)]
    pub field: Option<String>,

    /// Seconds to wait
    #[arg(long, default_value = "60")]
    pub timeout: u64,
}

#[derive(Args, Debug)]
pub struct WaitBlocksCmd {
    #[command(flatten)]
    pub endpoint: EndpointArgs,

    /// Number of new blocks
    #[arg(long, default_value = "1")]
    pub count: u32,

    /// Seconds to wait
    #[arg(long, default_value = "60")]
    pub timeout: u64,

    /// Count finalized heads instead of best heads
    #[arg(long)]
    pub finalized: bool,
}
