//! Row types read back from the mirror

use chrono::{DateTime, Utc};
use rpc_core::Amount;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlockRow {
    pub height: i64,
    pub hash: String,
    pub merkle_root: String,
    pub miner: Option<String>,
    pub time: DateTime<Utc>,
    pub tx_count: i64,
    pub size: i64,
}

/// Height and hash of a stored block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, sqlx::FromRow)]
pub struct BlockRef {
    pub height: i64,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OutputRow {
    pub id: i64,
    pub tx_hash: String,
    pub out_idx: i64,
    pub value: i64,
    pub address: Option<String>,
    pub spent: bool,
}

impl OutputRow {
    pub fn amount(&self) -> Amount {
        Amount::from_units(self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StreamRow {
    pub name: String,
    pub createtxid: String,
    pub streamref: String,
    pub open: bool,
    pub details: String,
    pub subscribed: bool,
    pub synchronized: bool,
    pub items: i64,
    pub confirmed: i64,
    pub keys: i64,
    pub publishers: i64,
    pub monitor: bool,
    pub public: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StreamItemRow {
    pub id: i64,
    pub stream: String,
    pub tx_hash: String,
    pub out_idx: i64,
    pub time: DateTime<Utc>,
    /// JSON array of key strings.
    pub keys: String,
    /// JSON payload.
    pub data: String,
    pub available: bool,
    pub valid: bool,
}

impl StreamItemRow {
    pub fn key_list(&self) -> serde_json::Result<Vec<String>> {
        serde_json::from_str(&self.keys)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressBalance {
    pub address: String,
    pub balance: Amount,
    pub utxo_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MirrorStatus {
    pub head_height: Option<i64>,
    pub block_count: i64,
    pub tx_count: i64,
    pub output_count: i64,
    pub unspent_count: i64,
    pub address_count: i64,
    pub stream_count: i64,
    pub stream_item_count: i64,
}
