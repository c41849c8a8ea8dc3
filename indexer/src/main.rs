//! MultiChain mirror - Main entry point

use std::sync::Arc;

use anyhow::{bail, Context};
use mex_indexer::{
    cli::{self, Args, Command},
    config::Config,
    database::{
        queries::{AddressQueries, StatusQueries, StreamQueries},
        Database,
    },
    indexer::{IndexerService, StreamIndexer},
    rpc_client::RpcClient,
};
use rpc_core::NodeApi;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::parse_args();

    init_logging(&args);

    let mut config = match &args.config_path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.apply_cli_overrides(&args);
    config.validate()?;

    info!("Database path: {}", config.database.path.display());
    let database = Database::with_max_connections(&config.database.path, config.database.max_connections)
        .await
        .context("failed to open database")?;
    database.migrate().await.context("database migration failed")?;

    match args.command.clone().unwrap_or(Command::Run) {
        Command::Status => {
            let status = StatusQueries::summary(database.pool()).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Balance { address } => match AddressQueries::balance(database.pool(), &address).await? {
            Some(balance) => println!("{}", serde_json::to_string_pretty(&balance)?),
            None => bail!("unknown address {}", address),
        },
        Command::Monitor { stream, off } => {
            let monitor = !off;
            if !StreamQueries::set_monitor(database.pool(), &stream, monitor).await? {
                // The stream may exist on the node before the first sync.
                let node = connect_node(&config)?;
                StreamIndexer::new(database.pool(), node.as_ref(), config.sync.page_size)
                    .sync_streams()
                    .await?;
                if !StreamQueries::set_monitor(database.pool(), &stream, monitor).await? {
                    bail!("unknown stream {}", stream);
                }
            }
            info!("Stream {} monitor = {}", stream, monitor);
        }
        Command::SyncOnce => {
            let node = connect_node(&config)?;
            let service = IndexerService::new(database, node, config.sync.clone());
            let stats = service.run_round().await?;
            println!("{:#?}", stats);
        }
        Command::Run => {
            let node = connect_node(&config)?;
            info!("Connecting to node at {}", config.node.url);
            let mut service = IndexerService::new(database, node, config.sync.clone());

            tokio::select! {
                _ = service.run() => {}
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!("Failed to listen for shutdown signal: {}", e);
                    }
                    info!("Shutting down");
                }
            }
        }
    }

    Ok(())
}

fn connect_node(config: &Config) -> anyhow::Result<Arc<dyn NodeApi>> {
    let client = RpcClient::new(&config.node).context("failed to create RPC client")?;
    Ok(Arc::new(client))
}

fn init_logging(args: &Args) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.log_json {
        fmt().json().with_env_filter(filter).with_target(true).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    }
}
