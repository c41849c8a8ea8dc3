//! Chain reorganization detection and rollback

use std::collections::HashSet;

use rpc_core::{HeightRange, NodeApi};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::database::queries::BlockQueries;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReorgOutcome {
    /// Nothing stored locally, nothing to compare.
    Empty,
    /// The node reports a lower tip than the mirror; nothing was touched.
    NodeBehind { local_head: i64, node_head: u64 },
    InSync,
    RolledBack { fork_height: i64, blocks_removed: u64 },
}

/// Compares the trailing `horizon` local blocks with the node and truncates
/// the mirror at the lowest disagreeing height.
pub struct ReorgReconciler<'a> {
    pool: &'a SqlitePool,
    node: &'a dyn NodeApi,
    horizon: u64,
}

impl<'a> ReorgReconciler<'a> {
    pub fn new(pool: &'a SqlitePool, node: &'a dyn NodeApi, horizon: u64) -> Self {
        Self { pool, node, horizon }
    }

    pub async fn reconcile(&self) -> Result<ReorgOutcome> {
        info!("clean reorgs with horizon {}", self.horizon);

        let local = BlockQueries::recent_refs(self.pool, self.horizon).await?;
        let (Some(head), Some(tail)) = (local.first(), local.last()) else {
            info!("database has no block data");
            return Ok(ReorgOutcome::Empty);
        };

        let node_head = self.node.chain_height().await?;
        if head.height as u64 > node_head {
            warn!(
                "database is ahead of node ({} > {}), skipping reorg check",
                head.height, node_head
            );
            return Ok(ReorgOutcome::NodeBehind { local_head: head.height, node_head });
        }

        let window = HeightRange::new(tail.height as u64, head.height as u64);
        let authoritative: HashSet<(i64, String)> = self
            .node
            .list_blocks(window, false)
            .await?
            .into_iter()
            .map(|header| (header.height as i64, header.hash))
            .collect();

        let fork_height = local
            .iter()
            .filter(|block| !authoritative.contains(&(block.height, block.hash.clone())))
            .map(|block| block.height)
            .min();

        let Some(fork_height) = fork_height else {
            info!("no reorgs found");
            return Ok(ReorgOutcome::InSync);
        };

        info!("database reorg from height {}", fork_height);
        let blocks_removed = rollback_from(self.pool, fork_height).await?;
        info!("removed {} blocks at or above height {}", blocks_removed, fork_height);

        Ok(ReorgOutcome::RolledBack { fork_height, blocks_removed })
    }
}

/// Delete every block at or above `fork_height` together with everything
/// that hangs off it, in one database transaction.
///
/// Outputs below the fork whose spending input is removed become unspent
/// again. Returns the number of deleted blocks.
pub async fn rollback_from(pool: &SqlitePool, fork_height: i64) -> Result<u64> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE outputs SET spent = FALSE
        WHERE id IN (
            SELECT i.spends
            FROM inputs i
            JOIN transactions t ON t.id = i.transaction_id
            WHERE t.block_height >= ? AND i.spends IS NOT NULL
        )
        "#,
    )
    .bind(fork_height)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        DELETE FROM stream_item_publishers
        WHERE item_id IN (
            SELECT si.id
            FROM stream_items si
            JOIN outputs o ON o.id = si.output_id
            JOIN transactions t ON t.id = o.transaction_id
            WHERE t.block_height >= ?
        )
        "#,
    )
    .bind(fork_height)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        DELETE FROM stream_items
        WHERE output_id IN (
            SELECT o.id
            FROM outputs o
            JOIN transactions t ON t.id = o.transaction_id
            WHERE t.block_height >= ?
        )
        "#,
    )
    .bind(fork_height)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        DELETE FROM inputs
        WHERE transaction_id IN (SELECT id FROM transactions WHERE block_height >= ?)
           OR spends IN (
                SELECT o.id
                FROM outputs o
                JOIN transactions t ON t.id = o.transaction_id
                WHERE t.block_height >= ?
           )
        "#,
    )
    .bind(fork_height)
    .bind(fork_height)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        DELETE FROM outputs
        WHERE transaction_id IN (SELECT id FROM transactions WHERE block_height >= ?)
        "#,
    )
    .bind(fork_height)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM transactions WHERE block_height >= ?")
        .bind(fork_height)
        .execute(&mut *tx)
        .await?;

    let removed = sqlx::query("DELETE FROM blocks WHERE height >= ?")
        .bind(fork_height)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;
    Ok(removed)
}
