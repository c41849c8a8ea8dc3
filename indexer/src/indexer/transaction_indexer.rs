//! Transaction, output and input backfill

use std::collections::{HashMap, HashSet};
use std::ops::AddAssign;

use rpc_core::{BlockDetail, NodeApi, TxIn, VERBOSITY_FULL_TX};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::database::queries::BlockQueries;
use crate::error::{IndexerError, Result};
use crate::indexer::address_indexer::{stored_address, AddressIndexer, INSERT_CHUNK};
use crate::models::BlockRef;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillStats {
    pub blocks: u64,
    pub transactions: u64,
    pub outputs: u64,
    pub inputs: u64,
    pub addresses: u64,
}

impl AddAssign for BackfillStats {
    fn add_assign(&mut self, other: Self) {
        self.blocks += other.blocks;
        self.transactions += other.transactions;
        self.outputs += other.outputs;
        self.inputs += other.inputs;
        self.addresses += other.addresses;
    }
}

struct InputRow {
    transaction_id: i64,
    spends: Option<i64>,
}

/// Fills in transactions, outputs and inputs for stored blocks that have
/// none yet. Every block is written in a single database transaction.
pub struct TransactionIndexer<'a> {
    pool: &'a SqlitePool,
    node: &'a dyn NodeApi,
}

impl<'a> TransactionIndexer<'a> {
    pub fn new(pool: &'a SqlitePool, node: &'a dyn NodeApi) -> Self {
        Self { pool, node }
    }

    pub async fn sync(&self) -> Result<BackfillStats> {
        let pending = BlockQueries::lacking_transactions(self.pool).await?;
        if pending.is_empty() {
            return Ok(BackfillStats::default());
        }
        info!("sync transactions from {} blocks", pending.len());

        let mut totals = BackfillStats::default();
        for block in &pending {
            let detail = self.node.get_block(&block.hash, VERBOSITY_FULL_TX).await?;
            let stats = self.index_block(block, &detail).await?;
            info!("imported {} transactions from block {}", stats.transactions, block.height);
            totals += stats;
        }

        info!("imported {} transactions", totals.transactions);
        info!("imported {} outputs", totals.outputs);
        info!("imported {} inputs", totals.inputs);
        info!("imported {} addresses", totals.addresses);
        Ok(totals)
    }

    /// Write all transactions of one block. Nothing is committed if any
    /// referenced output cannot be resolved.
    pub async fn index_block(&self, block: &BlockRef, detail: &BlockDetail) -> Result<BackfillStats> {
        if detail.hash != block.hash {
            return Err(IndexerError::SyncInvariant(format!(
                "node returned block {} for stored block {} at height {}",
                detail.hash, block.hash, block.height
            )));
        }
        if detail.tx.is_empty() {
            debug!("block {} has no transactions", block.height);
            return Ok(BackfillStats::default());
        }

        let mut tx = self.pool.begin().await?;
        let mut stats = BackfillStats { blocks: 1, ..Default::default() };

        stats.transactions = insert_transactions(&mut *tx, block.height, detail).await?;
        let tx_ids = transaction_ids(&mut *tx, block.height).await?;

        let addresses = detail
            .tx
            .iter()
            .flat_map(|body| body.vout.iter())
            .filter_map(|out| stored_address(&out.address));
        stats.addresses = AddressIndexer::ensure(&mut *tx, addresses).await?;

        stats.outputs = insert_outputs(&mut *tx, detail, &tx_ids).await?;

        // Outputs of this block are visible from here on, so a transaction
        // may spend an output created earlier in the same block.
        let inputs = resolve_inputs(&mut *tx, block, detail, &tx_ids).await?;
        stats.inputs = insert_inputs(&mut *tx, &inputs).await?;
        mark_spent(&mut *tx, &inputs).await?;

        tx.commit().await?;
        Ok(stats)
    }
}

async fn insert_transactions(conn: &mut SqliteConnection, height: i64, detail: &BlockDetail) -> Result<u64> {
    let rows: Vec<(usize, &str)> = detail.tx.iter().map(|body| body.txid.as_str()).enumerate().collect();

    let mut inserted = 0;
    for chunk in rows.chunks(INSERT_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO transactions (hash, block_height, idx) ");
        builder.push_values(chunk, |mut row, (idx, hash)| {
            row.push_bind(hash.to_string())
                .push_bind(height)
                .push_bind(*idx as i64);
        });
        inserted += builder.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(inserted)
}

async fn transaction_ids(conn: &mut SqliteConnection, height: i64) -> Result<HashMap<String, i64>> {
    let rows = sqlx::query_as::<_, (String, i64)>("SELECT hash, id FROM transactions WHERE block_height = ?")
        .bind(height)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().collect())
}

fn lookup_tx_id(tx_ids: &HashMap<String, i64>, txid: &str) -> Result<i64> {
    tx_ids
        .get(txid)
        .copied()
        .ok_or_else(|| IndexerError::Internal(format!("transaction {} was not inserted", txid)))
}

async fn insert_outputs(
    conn: &mut SqliteConnection,
    detail: &BlockDetail,
    tx_ids: &HashMap<String, i64>,
) -> Result<u64> {
    let mut rows = Vec::new();
    for body in &detail.tx {
        let transaction_id = lookup_tx_id(tx_ids, &body.txid)?;
        rows.extend(body.vout.iter().map(|out| (transaction_id, out)));
    }

    let mut inserted = 0;
    for chunk in rows.chunks(INSERT_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO outputs (transaction_id, out_idx, value, address) ");
        builder.push_values(chunk, |mut row, (transaction_id, out)| {
            row.push_bind(*transaction_id)
                .push_bind(out.n as i64)
                .push_bind(out.value.units())
                .push_bind(stored_address(&out.address).map(str::to_string));
        });
        inserted += builder.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(inserted)
}

async fn resolve_inputs(
    conn: &mut SqliteConnection,
    block: &BlockRef,
    detail: &BlockDetail,
    tx_ids: &HashMap<String, i64>,
) -> Result<Vec<InputRow>> {
    let mut rows = Vec::new();
    let mut claimed = HashSet::new();

    for body in &detail.tx {
        let transaction_id = lookup_tx_id(tx_ids, &body.txid)?;
        for input in &body.vin {
            let spends = match input {
                TxIn::Coinbase => None,
                TxIn::Spend { txid, vout } => {
                    let (output_id, spent) = sqlx::query_as::<_, (i64, bool)>(
                        r#"
                        SELECT o.id, o.spent
                        FROM outputs o
                        JOIN transactions t ON t.id = o.transaction_id
                        WHERE t.hash = ? AND o.out_idx = ?
                        "#,
                    )
                    .bind(txid.as_str())
                    .bind(*vout as i64)
                    .fetch_optional(&mut *conn)
                    .await?
                    .ok_or_else(|| {
                        IndexerError::SyncInvariant(format!(
                            "output {}:{} spent by {} in block {} is not imported",
                            txid, vout, body.txid, block.height
                        ))
                    })?;

                    if spent || !claimed.insert(output_id) {
                        return Err(IndexerError::SyncInvariant(format!(
                            "output {}:{} is spent twice (again by {} in block {})",
                            txid, vout, body.txid, block.height
                        )));
                    }
                    Some(output_id)
                }
            };
            rows.push(InputRow { transaction_id, spends });
        }
    }
    Ok(rows)
}

async fn insert_inputs(conn: &mut SqliteConnection, inputs: &[InputRow]) -> Result<u64> {
    let mut inserted = 0;
    for chunk in inputs.chunks(INSERT_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO inputs (transaction_id, spends, coinbase) ");
        builder.push_values(chunk, |mut row, input| {
            row.push_bind(input.transaction_id)
                .push_bind(input.spends)
                .push_bind(input.spends.is_none());
        });
        inserted += builder.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(inserted)
}

async fn mark_spent(conn: &mut SqliteConnection, inputs: &[InputRow]) -> Result<()> {
    let spent: Vec<i64> = inputs.iter().filter_map(|input| input.spends).collect();

    for chunk in spent.chunks(INSERT_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE outputs SET spent = TRUE WHERE id IN (");
        let mut ids = builder.separated(", ");
        for id in chunk {
            ids.push_bind(*id);
        }
        ids.push_unseparated(")");
        builder.build().execute(&mut *conn).await?;
    }
    Ok(())
}
