use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mex-indexer")]
#[command(about = "Mirror a MultiChain node into a relational database", long_about = None)]
pub struct Args {
    /// Path to configuration file (optional, uses defaults if not provided)
    #[arg(short, long, env = "MEX_CONFIG")]
    pub config_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Node JSON-RPC endpoint
    #[arg(long, env = "MEX_NODE_URL")]
    pub node_url: Option<String>,

    #[arg(long, env = "MEX_NODE_USER")]
    pub node_user: Option<String>,

    #[arg(long, env = "MEX_NODE_PASSWORD", hide_env_values = true)]
    pub node_password: Option<String>,

    /// Chain name sent with every RPC request
    #[arg(long, env = "MEX_CHAIN_NAME")]
    pub chain_name: Option<String>,

    /// SQLite database path, optionally prefixed with `sqlite:`
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Number of trailing blocks checked for reorgs
    #[arg(long)]
    pub horizon: Option<u64>,

    /// Heights fetched per block listing
    #[arg(long)]
    pub batch_size: Option<u64>,

    /// Stream items fetched per page
    #[arg(long)]
    pub page_size: Option<u64>,

    /// Seconds to sleep between sync rounds
    #[arg(long)]
    pub interval_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the sync loop until interrupted (default)
    Run,
    /// Run a single sync round and exit
    SyncOnce,
    /// Enable or disable item import for a stream
    Monitor {
        stream: String,
        /// Stop monitoring instead
        #[arg(long)]
        off: bool,
    },
    /// Print local mirror counters
    Status,
    /// Print the unspent balance of an address
    Balance { address: String },
}

pub fn parse_args() -> Args {
    Args::parse()
}
