//! Sync stages that keep the mirror in step with the node

pub mod address_indexer;
pub mod batch;
pub mod block_indexer;
pub mod reorg;
pub mod service;
pub mod stream_indexer;
pub mod transaction_indexer;

pub use batch::plan_batches;
pub use block_indexer::BlockIndexer;
pub use reorg::{rollback_from, ReorgOutcome, ReorgReconciler};
pub use service::{IndexerService, RoundStats};
pub use stream_indexer::StreamIndexer;
pub use transaction_indexer::{BackfillStats, TransactionIndexer};

use chrono::{DateTime, Utc};

use crate::error::{IndexerError, Result};

/// Node timestamps are epoch seconds.
pub fn epoch_to_utc(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| IndexerError::InvalidInput(format!("timestamp out of range: {}", secs)))
}
