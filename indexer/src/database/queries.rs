//! Database query functions

use rpc_core::Amount;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::*;

pub struct BlockQueries;

impl BlockQueries {
    /// Height of the highest stored block, `None` on an empty mirror.
    pub async fn head_height(pool: &SqlitePool) -> Result<Option<i64>> {
        let height = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(height) FROM blocks")
            .fetch_one(pool)
            .await?;
        Ok(height)
    }

    /// The `limit` highest stored blocks, highest first.
    pub async fn recent_refs(pool: &SqlitePool, limit: u64) -> Result<Vec<BlockRef>> {
        let refs = sqlx::query_as::<_, BlockRef>(
            "SELECT height, hash FROM blocks ORDER BY height DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(pool)
        .await?;
        Ok(refs)
    }

    /// Blocks with no imported transactions yet, oldest first.
    pub async fn lacking_transactions(pool: &SqlitePool) -> Result<Vec<BlockRef>> {
        let refs = sqlx::query_as::<_, BlockRef>(
            r#"
            SELECT b.height, b.hash
            FROM blocks b
            WHERE NOT EXISTS (SELECT 1 FROM transactions t WHERE t.block_height = b.height)
            ORDER BY b.height ASC
            "#,
        )
        .fetch_all(pool)
        .await?;
        Ok(refs)
    }

    pub async fn get_by_height(pool: &SqlitePool, height: i64) -> Result<Option<BlockRow>> {
        let block = sqlx::query_as::<_, BlockRow>(
            r#"
            SELECT height, hash, merkle_root, miner, time, tx_count, size
            FROM blocks
            WHERE height = ?
            "#,
        )
        .bind(height)
        .fetch_optional(pool)
        .await?;
        Ok(block)
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM blocks")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}

pub struct OutputQueries;

impl OutputQueries {
    /// Look up an output by its natural key.
    pub async fn find(pool: &SqlitePool, tx_hash: &str, out_idx: u32) -> Result<Option<OutputRow>> {
        let output = sqlx::query_as::<_, OutputRow>(
            r#"
            SELECT o.id, t.hash AS tx_hash, o.out_idx, o.value, o.address, o.spent
            FROM outputs o
            JOIN transactions t ON t.id = o.transaction_id
            WHERE t.hash = ? AND o.out_idx = ?
            "#,
        )
        .bind(tx_hash)
        .bind(out_idx as i64)
        .fetch_optional(pool)
        .await?;
        Ok(output)
    }

    /// Outputs whose spent flag disagrees with the presence of a spending input.
    pub async fn spent_flag_mismatches(pool: &SqlitePool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM outputs o
            WHERE o.spent <> EXISTS (SELECT 1 FROM inputs i WHERE i.spends = o.id)
            "#,
        )
        .fetch_one(pool)
        .await?;
        Ok(count)
    }
}

pub struct StreamQueries;

impl StreamQueries {
    pub async fn get(pool: &SqlitePool, name: &str) -> Result<Option<StreamRow>> {
        let stream = sqlx::query_as::<_, StreamRow>(
            r#"
            SELECT name, createtxid, streamref, open, details, subscribed, synchronized,
                   items, confirmed, keys, publishers, monitor, public, description
            FROM streams
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(pool)
        .await?;
        Ok(stream)
    }

    pub async fn monitored(pool: &SqlitePool) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT name FROM streams WHERE monitor = TRUE ORDER BY name",
        )
        .fetch_all(pool)
        .await?;
        Ok(names)
    }

    /// Number of locally stored items, the resume offset for the next fetch.
    pub async fn item_count(pool: &SqlitePool, name: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM stream_items WHERE stream = ?")
            .bind(name)
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    /// Items of a stream in import order.
    pub async fn items(pool: &SqlitePool, name: &str) -> Result<Vec<StreamItemRow>> {
        let items = sqlx::query_as::<_, StreamItemRow>(
            r#"
            SELECT si.id, si.stream, t.hash AS tx_hash, o.out_idx, si.time, si.keys, si.data,
                   si.available, si.valid
            FROM stream_items si
            JOIN outputs o ON o.id = si.output_id
            JOIN transactions t ON t.id = o.transaction_id
            WHERE si.stream = ?
            ORDER BY si.id
            "#,
        )
        .bind(name)
        .fetch_all(pool)
        .await?;
        Ok(items)
    }

    pub async fn publishers(pool: &SqlitePool, item_id: i64) -> Result<Vec<String>> {
        let addresses = sqlx::query_scalar::<_, String>(
            "SELECT address FROM stream_item_publishers WHERE item_id = ? ORDER BY address",
        )
        .bind(item_id)
        .fetch_all(pool)
        .await?;
        Ok(addresses)
    }

    pub async fn creators(pool: &SqlitePool, name: &str) -> Result<Vec<String>> {
        let addresses = sqlx::query_scalar::<_, String>(
            "SELECT address FROM stream_creators WHERE stream = ? ORDER BY address",
        )
        .bind(name)
        .fetch_all(pool)
        .await?;
        Ok(addresses)
    }

    /// Flip the locally owned monitor flag. Returns false for unknown streams.
    pub async fn set_monitor(pool: &SqlitePool, name: &str, monitor: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE streams SET monitor = ? WHERE name = ?")
            .bind(monitor)
            .bind(name)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub struct AddressQueries;

impl AddressQueries {
    /// Sum of unspent output values held by `address`.
    pub async fn balance(pool: &SqlitePool, address: &str) -> Result<Option<AddressBalance>> {
        let known = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM addresses WHERE address = ?")
            .bind(address)
            .fetch_one(pool)
            .await?;
        if known == 0 {
            return Ok(None);
        }

        let (balance, utxo_count) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COALESCE(SUM(value), 0), COUNT(*)
            FROM outputs
            WHERE address = ? AND spent = FALSE
            "#,
        )
        .bind(address)
        .fetch_one(pool)
        .await?;

        Ok(Some(AddressBalance {
            address: address.to_string(),
            balance: Amount::from_units(balance),
            utxo_count,
        }))
    }
}

pub struct StatusQueries;

impl StatusQueries {
    pub async fn summary(pool: &SqlitePool) -> Result<MirrorStatus> {
        let (block_count, tx_count, output_count, unspent_count, address_count, stream_count, stream_item_count) =
            sqlx::query_as::<_, (i64, i64, i64, i64, i64, i64, i64)>(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM blocks),
                    (SELECT COUNT(*) FROM transactions),
                    (SELECT COUNT(*) FROM outputs),
                    (SELECT COUNT(*) FROM outputs WHERE spent = FALSE),
                    (SELECT COUNT(*) FROM addresses),
                    (SELECT COUNT(*) FROM streams),
                    (SELECT COUNT(*) FROM stream_items)
                "#,
            )
            .fetch_one(pool)
            .await?;

        Ok(MirrorStatus {
            head_height: BlockQueries::head_height(pool).await?,
            block_count,
            tx_count,
            output_count,
            unspent_count,
            address_count,
            stream_count,
            stream_item_count,
        })
    }
}
