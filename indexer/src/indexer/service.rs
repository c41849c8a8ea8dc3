//! Main indexer service

use std::sync::Arc;

use rpc_core::NodeApi;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::database::Database;
use crate::error::Result;
use crate::indexer::{
    BackfillStats, BlockIndexer, ReorgOutcome, ReorgReconciler, StreamIndexer, TransactionIndexer,
};

/// What a single sync round did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundStats {
    pub reorg: ReorgOutcome,
    pub blocks: u64,
    pub backfill: BackfillStats,
    pub streams: usize,
    pub stream_items: u64,
}

/// Owns the store and the node handle and drives the stages in order.
///
/// Stages are rebuilt every round from the current pool so that a reconnect
/// takes effect on the next round.
pub struct IndexerService {
    database: Database,
    node: Arc<dyn NodeApi>,
    config: SyncConfig,
}

impl IndexerService {
    pub fn new(database: Database, node: Arc<dyn NodeApi>, config: SyncConfig) -> Self {
        Self { database, node, config }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Run every stage once. The first failing stage ends the round.
    pub async fn run_round(&self) -> Result<RoundStats> {
        let pool = self.database.pool();
        let node = self.node.as_ref();

        let reorg = ReorgReconciler::new(pool, node, self.config.horizon)
            .reconcile()
            .await?;

        let mut stats = RoundStats {
            reorg,
            blocks: 0,
            backfill: BackfillStats::default(),
            streams: 0,
            stream_items: 0,
        };
        if let ReorgOutcome::NodeBehind { .. } = stats.reorg {
            return Ok(stats);
        }

        stats.blocks = BlockIndexer::new(pool, node, self.config.batch_size)
            .sync()
            .await?;
        stats.backfill = TransactionIndexer::new(pool, node).sync().await?;

        let streams = StreamIndexer::new(pool, node, self.config.page_size);
        stats.streams = streams.sync_streams().await?;
        stats.stream_items = streams.sync_stream_items().await?;

        Ok(stats)
    }

    /// Run one round and absorb its failure. Storage connectivity errors
    /// trigger a reconnect attempt.
    pub async fn run_round_logged(&mut self) -> Option<RoundStats> {
        match self.run_round().await {
            Ok(stats) => Some(stats),
            Err(e) if e.is_storage_connectivity() => {
                warn!("Lost database connection: {}", e);
                if let Err(e) = self.database.reconnect().await {
                    error!("Database reconnect failed: {}", e);
                }
                None
            }
            Err(e) if e.is_node_transport() => {
                warn!("Node unavailable, retrying next round: {}", e);
                None
            }
            Err(e) if e.is_sync_invariant() => {
                error!("{}", e);
                None
            }
            Err(e) => {
                error!("Sync round failed: {:?}", e);
                None
            }
        }
    }

    /// Sync forever, sleeping between rounds.
    pub async fn run(&mut self) {
        info!(
            "Starting sync loop (horizon {}, batch {}, page {}, interval {:?})",
            self.config.horizon,
            self.config.batch_size,
            self.config.page_size,
            self.config.interval()
        );

        loop {
            if let Some(stats) = self.run_round_logged().await {
                info!(
                    blocks = stats.blocks,
                    transactions = stats.backfill.transactions,
                    stream_items = stats.stream_items,
                    "Sync round complete"
                );
            }
            sleep(self.config.interval()).await;
        }
    }
}
