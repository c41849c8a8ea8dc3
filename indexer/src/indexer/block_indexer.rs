//! Block indexing logic

use chrono::{DateTime, Utc};
use rpc_core::{BlockHeader, HeightRange, NodeApi};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::info;

use crate::database::queries::BlockQueries;
use crate::error::{IndexerError, Result};
use crate::indexer::address_indexer::{stored_address, AddressIndexer, INSERT_CHUNK};
use crate::indexer::batch::plan_batches;
use crate::indexer::epoch_to_utc;

/// Forward-only import of block headers from the local head to the node tip.
pub struct BlockIndexer<'a> {
    pool: &'a SqlitePool,
    node: &'a dyn NodeApi,
    batch_size: u64,
}

impl<'a> BlockIndexer<'a> {
    pub fn new(pool: &'a SqlitePool, node: &'a dyn NodeApi, batch_size: u64) -> Self {
        Self { pool, node, batch_size }
    }

    /// Returns the number of imported blocks.
    pub async fn sync(&self) -> Result<u64> {
        let local_head = BlockQueries::head_height(self.pool).await?;
        let node_head = self.node.chain_height().await?;

        if let Some(local) = local_head {
            let local = local as u64;
            if local == node_head {
                info!("no new blocks to sync");
                return Ok(0);
            }
            if local > node_head {
                return Err(IndexerError::SyncInvariant(format!(
                    "database is ahead of node ({} > {})",
                    local, node_head
                )));
            }
        }

        let first = local_head.map_or(0, |h| h as u64 + 1);
        info!("sync blocks {}-{}", first, node_head);

        let mut imported = 0;
        for batch in plan_batches(first..=node_head, self.batch_size) {
            info!("sync blocks batch {}", batch);
            let headers = self.node.list_blocks(batch, true).await?;
            check_contiguous(&batch, &headers)?;
            imported += self.index_batch(&headers).await?;
        }

        info!("imported {} blocks", imported);
        Ok(imported)
    }

    async fn index_batch(&self, headers: &[BlockHeader]) -> Result<u64> {
        let rows = headers
            .iter()
            .map(|header| Ok((header, epoch_to_utc(header.time)?)))
            .collect::<Result<Vec<(&BlockHeader, DateTime<Utc>)>>>()?;

        let mut tx = self.pool.begin().await?;

        AddressIndexer::ensure(&mut *tx, headers.iter().filter_map(|h| stored_address(&h.miner))).await?;

        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO blocks (height, hash, merkle_root, miner, time, tx_count, size) ",
            );
            builder.push_values(chunk, |mut row, (header, time)| {
                row.push_bind(header.height as i64)
                    .push_bind(header.hash.clone())
                    .push_bind(header.merkle_root.clone())
                    .push_bind(stored_address(&header.miner).map(str::to_string))
                    .push_bind(*time)
                    .push_bind(header.tx_count as i64)
                    .push_bind(header.size as i64);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(rows.len() as u64)
    }
}

/// The listing must contain exactly the requested heights in order, or the
/// mirror would end up with a gap.
fn check_contiguous(batch: &HeightRange, headers: &[BlockHeader]) -> Result<()> {
    let mut expected = batch.start;
    for header in headers {
        if header.height != expected {
            return Err(IndexerError::SyncInvariant(format!(
                "node listed height {} for batch {} where {} was expected",
                header.height, batch, expected
            )));
        }
        expected += 1;
    }
    if expected != batch.end + 1 {
        return Err(IndexerError::SyncInvariant(format!(
            "node listed {} blocks for batch {}",
            headers.len(),
            batch
        )));
    }
    Ok(())
}
