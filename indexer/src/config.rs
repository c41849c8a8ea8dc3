use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{IndexerError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node: NodeConfig,
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    /// Sent as `chain_name` with every request when set.
    pub chain_name: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Trailing blocks compared against the node each round.
    pub horizon: u64,
    /// Heights requested per `listblocks` call.
    pub batch_size: u64,
    /// Stream items requested per `liststreamitems` call.
    pub page_size: u64,
    pub interval_secs: u64,
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Config {
    /// Load configuration from file if it exists, otherwise use defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| IndexerError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Override config with CLI arguments and their environment fallbacks
    pub fn apply_cli_overrides(&mut self, args: &crate::cli::Args) {
        if let Some(url) = &args.node_url {
            self.node.url = url.clone();
        }
        if let Some(user) = &args.node_user {
            self.node.user = user.clone();
        }
        if let Some(password) = &args.node_password {
            self.node.password = password.clone();
        }
        if let Some(chain_name) = &args.chain_name {
            self.node.chain_name = Some(chain_name.clone());
        }

        if let Some(url) = &args.database_url {
            self.database.path = PathBuf::from(url.trim_start_matches("sqlite:"));
        }

        if let Some(horizon) = args.horizon {
            self.sync.horizon = horizon;
        }
        if let Some(batch_size) = args.batch_size {
            self.sync.batch_size = batch_size;
        }
        if let Some(page_size) = args.page_size {
            self.sync.page_size = page_size;
        }
        if let Some(interval) = args.interval_secs {
            self.sync.interval_secs = interval;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.node.url.is_empty() {
            return Err(IndexerError::Config("node url must not be empty".into()));
        }
        if self.sync.horizon == 0 {
            return Err(IndexerError::Config("sync horizon must be positive".into()));
        }
        if self.sync.batch_size == 0 {
            return Err(IndexerError::Config("sync batch size must be positive".into()));
        }
        if self.sync.page_size == 0 {
            return Err(IndexerError::Config("stream page size must be positive".into()));
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8374".to_string(),
            user: "multichainrpc".to_string(),
            password: String::new(),
            chain_name: None,
            timeout_secs: 30,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./mex.db"),
            max_connections: 8,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            horizon: 300,
            batch_size: 1000,
            page_size: 100,
            interval_secs: 10,
        }
    }
}
