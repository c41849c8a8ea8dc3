//! Stream metadata and stream item import

use std::collections::HashMap;

use rpc_core::{ChannelInfo, ChannelItem, NodeApi};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::database::queries::StreamQueries;
use crate::error::{IndexerError, Result};
use crate::indexer::address_indexer::{AddressIndexer, INSERT_CHUNK};
use crate::indexer::epoch_to_utc;

pub struct StreamIndexer<'a> {
    pool: &'a SqlitePool,
    node: &'a dyn NodeApi,
    page_size: u64,
}

impl<'a> StreamIndexer<'a> {
    pub fn new(pool: &'a SqlitePool, node: &'a dyn NodeApi, page_size: u64) -> Self {
        Self { pool, node, page_size: page_size.max(1) }
    }

    /// Upsert metadata for every stream the node knows.
    ///
    /// Node-reported columns are overwritten; `monitor`, `public` and
    /// `description` belong to the operator and are left alone.
    pub async fn sync_streams(&self) -> Result<usize> {
        let channels = self.node.list_channels("*", true).await?;

        let mut tx = self.pool.begin().await?;
        for channel in &channels {
            upsert_stream(&mut *tx, channel).await?;
        }
        tx.commit().await?;

        info!("imported {} streams", channels.len());
        Ok(channels.len())
    }

    /// Pull new confirmed items for every monitored stream.
    pub async fn sync_stream_items(&self) -> Result<u64> {
        let monitored = StreamQueries::monitored(self.pool).await?;
        let mut imported = 0;
        for name in &monitored {
            imported += self.sync_items_for(name).await?;
        }
        Ok(imported)
    }

    /// Page through the node's items for one stream starting after the
    /// locally stored ones. Stops at the first unconfirmed item.
    pub async fn sync_items_for(&self, name: &str) -> Result<u64> {
        let mut start = StreamQueries::item_count(self.pool, name).await? as u64;
        debug!("sync stream {} from item {}", name, start);

        let mut imported = 0;
        loop {
            let page = self
                .node
                .list_channel_items(name, true, self.page_size, start)
                .await?;
            let fetched = page.len();
            if fetched == 0 {
                break;
            }

            let confirmed: Vec<ChannelItem> = page
                .into_iter()
                .take_while(|item| item.confirmations > 0)
                .collect();
            let count = self.import_page(name, &confirmed).await?;
            imported += count;
            start += count;

            if confirmed.len() < fetched {
                debug!("stream {} has unconfirmed items from {}", name, start);
                break;
            }
            if (fetched as u64) < self.page_size {
                break;
            }
        }

        if imported > 0 {
            info!("imported {} items into stream {}", imported, name);
        }
        Ok(imported)
    }

    /// Store one page of items in a single database transaction. Every item
    /// must point at an output that is already mirrored.
    async fn import_page(&self, name: &str, items: &[ChannelItem]) -> Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            let output_id = sqlx::query_scalar::<_, i64>(
                r#"
                SELECT o.id
                FROM outputs o
                JOIN transactions t ON t.id = o.transaction_id
                WHERE t.hash = ? AND o.out_idx = ?
                "#,
            )
            .bind(item.txid.as_str())
            .bind(item.vout as i64)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                IndexerError::SyncInvariant(format!(
                    "stream {} item {}:{} refers to an output that is not imported",
                    name, item.txid, item.vout
                ))
            })?;

            rows.push(ItemRow {
                output_id,
                time: epoch_to_utc(item.time)?,
                keys: serde_json::to_string(&item.keys)?,
                data: serde_json::to_string(&item.data)?,
                available: item.available,
                valid: item.valid,
                publishers: &item.publishers,
            });
        }

        AddressIndexer::ensure(
            &mut *tx,
            items.iter().flat_map(|item| item.publishers.iter().map(String::as_str)),
        )
        .await?;

        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO stream_items (output_id, stream, time, keys, data, available, valid) ",
            );
            builder.push_values(chunk, |mut row, item| {
                row.push_bind(item.output_id)
                    .push_bind(name.to_string())
                    .push_bind(item.time)
                    .push_bind(item.keys.clone())
                    .push_bind(item.data.clone())
                    .push_bind(item.available)
                    .push_bind(item.valid);
            });
            builder.build().execute(&mut *tx).await?;
        }

        let item_ids = item_ids_by_output(&mut *tx, &rows).await?;
        let publishers: Vec<(i64, &str)> = rows
            .iter()
            .filter_map(|row| item_ids.get(&row.output_id).map(|id| (*id, row.publishers)))
            .flat_map(|(id, addresses)| addresses.iter().map(move |a| (id, a.as_str())))
            .filter(|(_, address)| !address.is_empty())
            .collect();

        for chunk in publishers.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT OR IGNORE INTO stream_item_publishers (item_id, address) ");
            builder.push_values(chunk, |mut row, (item_id, address)| {
                row.push_bind(*item_id).push_bind(address.to_string());
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(rows.len() as u64)
    }
}

struct ItemRow<'i> {
    output_id: i64,
    time: chrono::DateTime<chrono::Utc>,
    keys: String,
    data: String,
    available: bool,
    valid: bool,
    publishers: &'i [String],
}

async fn item_ids_by_output(conn: &mut SqliteConnection, rows: &[ItemRow<'_>]) -> Result<HashMap<i64, i64>> {
    let mut ids = HashMap::with_capacity(rows.len());
    for chunk in rows.chunks(INSERT_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT output_id, id FROM stream_items WHERE output_id IN (");
        let mut list = builder.separated(", ");
        for row in chunk {
            list.push_bind(row.output_id);
        }
        list.push_unseparated(")");
        let found = builder
            .build_query_as::<(i64, i64)>()
            .fetch_all(&mut *conn)
            .await?;
        ids.extend(found);
    }
    Ok(ids)
}

async fn upsert_stream(conn: &mut SqliteConnection, channel: &ChannelInfo) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO streams (
            name, createtxid, streamref, open, details, subscribed, synchronized,
            items, confirmed, keys, publishers
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(name) DO UPDATE SET
            createtxid = excluded.createtxid,
            streamref = excluded.streamref,
            open = excluded.open,
            details = excluded.details,
            subscribed = excluded.subscribed,
            synchronized = excluded.synchronized,
            items = excluded.items,
            confirmed = excluded.confirmed,
            keys = excluded.keys,
            publishers = excluded.publishers
        "#,
    )
    .bind(channel.name.as_str())
    .bind(channel.createtxid.as_str())
    .bind(channel.streamref.as_str())
    .bind(channel.open)
    .bind(serde_json::to_string(&channel.details)?)
    .bind(channel.subscribed)
    .bind(channel.synchronized)
    .bind(channel.items)
    .bind(channel.confirmed)
    .bind(channel.keys)
    .bind(channel.publishers)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM stream_creators WHERE stream = ?")
        .bind(channel.name.as_str())
        .execute(&mut *conn)
        .await?;

    // Creators are linked only once their address has shown up in the chain.
    for creator in &channel.creators {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO stream_creators (stream, address)
            SELECT ?, address FROM addresses WHERE address = ?
            "#,
        )
        .bind(channel.name.as_str())
        .bind(creator.as_str())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}
