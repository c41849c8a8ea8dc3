//! In-memory node and temp database helpers shared by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use mex_indexer::database::Database;
use rpc_core::{
    Amount, BlockDetail, BlockHeader, ChannelInfo, ChannelItem, HeightRange, NodeApi, RpcError, TxBody, TxIn, TxOut,
};
use tempfile::TempDir;

pub const GENESIS_TIME: i64 = 1_500_000_000;

pub async fn temp_db() -> (TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(&dir.path().join("mirror.db")).await.unwrap();
    db.migrate().await.unwrap();
    (dir, db)
}

pub fn block_hash(branch: &str, height: u64) -> String {
    format!("{branch}-{height:08}")
}

pub fn coinbase_txid(branch: &str, height: u64) -> String {
    format!("cb-{branch}-{height}")
}

pub fn coinbase(txid: &str, address: &str, units: i64) -> TxBody {
    TxBody {
        txid: txid.to_string(),
        vout: vec![TxOut { n: 0, value: Amount::from_units(units), address: Some(address.to_string()) }],
        vin: vec![TxIn::Coinbase],
    }
}

pub fn spend(txid: &str, inputs: &[(&str, u32)], outputs: &[(&str, i64)]) -> TxBody {
    TxBody {
        txid: txid.to_string(),
        vin: inputs
            .iter()
            .map(|(prev, vout)| TxIn::Spend { txid: prev.to_string(), vout: *vout })
            .collect(),
        vout: outputs
            .iter()
            .enumerate()
            .map(|(n, (address, units))| TxOut {
                n: n as u32,
                value: Amount::from_units(*units),
                address: Some(address.to_string()),
            })
            .collect(),
    }
}

/// A transaction with `count` addressless outputs, used as stream item anchors.
pub fn data_tx(txid: &str, count: u32) -> TxBody {
    TxBody {
        txid: txid.to_string(),
        vout: (0..count).map(|n| TxOut { n, value: Amount::ZERO, address: None }).collect(),
        vin: Vec::new(),
    }
}

pub fn item(txid: &str, vout: u32, confirmations: u64) -> ChannelItem {
    ChannelItem {
        txid: txid.to_string(),
        vout,
        confirmations,
        time: GENESIS_TIME + vout as i64,
        keys: vec![format!("key-{vout}")],
        publishers: vec!["1Publisher".to_string()],
        data: serde_json::json!({"json": {"n": vout}}),
        available: true,
        valid: true,
    }
}

pub fn channel(name: &str) -> ChannelInfo {
    ChannelInfo {
        name: name.to_string(),
        createtxid: format!("create-{name}"),
        streamref: "5-265-47530".to_string(),
        open: true,
        details: serde_json::json!({}),
        creators: Vec::new(),
        subscribed: true,
        synchronized: true,
        items: 0,
        confirmed: 0,
        keys: 0,
        publishers: 0,
    }
}

struct MockBlock {
    header: BlockHeader,
    tx: Vec<TxBody>,
}

#[derive(Default)]
struct NodeState {
    blocks: Vec<MockBlock>,
    channels: Vec<ChannelInfo>,
    items: HashMap<String, Vec<ChannelItem>>,
    calls: HashMap<&'static str, usize>,
    offline: bool,
}

/// Node stub whose chain is built block by block from the tests.
#[derive(Default)]
pub struct MockNode {
    state: Mutex<NodeState>,
}

impl MockNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node with `count` blocks on `branch`, each holding only a coinbase.
    pub fn with_chain(branch: &str, count: u64) -> Self {
        let node = Self::new();
        node.extend(branch, count);
        node
    }

    /// Append a block at the next height and return its header.
    pub fn push_block(&self, branch: &str, tx: Vec<TxBody>) -> BlockHeader {
        let mut state = self.state.lock().unwrap();
        let height = state.blocks.len() as u64;
        let header = BlockHeader {
            height,
            hash: block_hash(branch, height),
            merkle_root: format!("merkle-{branch}-{height}"),
            miner: Some(format!("1Miner{branch}")),
            time: GENESIS_TIME + height as i64 * 15,
            tx_count: tx.len() as u64,
            size: 250 * tx.len() as u64,
        };
        state.blocks.push(MockBlock { header: header.clone(), tx });
        header
    }

    /// Overwrite the miner the node reports for the block at `height`.
    pub fn set_miner(&self, height: u64, miner: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        state.blocks[height as usize].header.miner = miner.map(str::to_string);
    }

    pub fn extend(&self, branch: &str, count: u64) {
        for _ in 0..count {
            let height = self.len();
            let miner = format!("1Miner{branch}");
            self.push_block(branch, vec![coinbase(&coinbase_txid(branch, height), &miner, 50 * 100_000_000)]);
        }
    }

    /// Keep heights below `height`.
    pub fn truncate(&self, height: u64) {
        self.state.lock().unwrap().blocks.truncate(height as usize);
    }

    /// Replace everything from `height` up with blocks of `branch`, keeping
    /// the chain length.
    pub fn fork_at(&self, height: u64, branch: &str) {
        let length = self.len();
        self.truncate(height);
        self.extend(branch, length.saturating_sub(height));
    }

    pub fn len(&self) -> u64 {
        self.state.lock().unwrap().blocks.len() as u64
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn calls(&self, method: &str) -> usize {
        self.state.lock().unwrap().calls.get(method).copied().unwrap_or(0)
    }

    pub fn add_channel(&self, info: ChannelInfo) {
        let mut state = self.state.lock().unwrap();
        state.channels.retain(|c| c.name != info.name);
        state.channels.push(info);
    }

    pub fn push_items(&self, channel: &str, items: Vec<ChannelItem>) {
        let mut state = self.state.lock().unwrap();
        state.items.entry(channel.to_string()).or_default().extend(items);
    }

    pub fn confirm_items(&self, channel: &str) {
        let mut state = self.state.lock().unwrap();
        for item in state.items.entry(channel.to_string()).or_default() {
            item.confirmations = item.confirmations.max(1);
        }
    }

    fn enter(&self, method: &'static str) -> Result<std::sync::MutexGuard<'_, NodeState>, RpcError> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(method).or_default() += 1;
        if state.offline {
            return Err(RpcError::Transport("connection refused".to_string()));
        }
        Ok(state)
    }
}

#[async_trait]
impl NodeApi for MockNode {
    async fn chain_height(&self) -> Result<u64, RpcError> {
        let state = self.enter("getblockcount")?;
        Ok((state.blocks.len() as u64).saturating_sub(1))
    }

    async fn list_blocks(&self, range: HeightRange, _verbose: bool) -> Result<Vec<BlockHeader>, RpcError> {
        let state = self.enter("listblocks")?;
        Ok(state
            .blocks
            .iter()
            .filter(|block| range.contains(block.header.height))
            .map(|block| block.header.clone())
            .collect())
    }

    async fn get_block(&self, hash: &str, _verbosity: u8) -> Result<BlockDetail, RpcError> {
        let state = self.enter("getblock")?;
        state
            .blocks
            .iter()
            .find(|block| block.header.hash == hash)
            .map(|block| BlockDetail {
                hash: block.header.hash.clone(),
                height: block.header.height,
                tx: block.tx.clone(),
            })
            .ok_or_else(|| RpcError::Rpc { code: -5, message: format!("Block not found: {hash}") })
    }

    async fn list_channels(&self, _pattern: &str, _verbose: bool) -> Result<Vec<ChannelInfo>, RpcError> {
        let state = self.enter("liststreams")?;
        Ok(state.channels.clone())
    }

    async fn list_channel_items(
        &self,
        channel: &str,
        _verbose: bool,
        count: u64,
        start: u64,
    ) -> Result<Vec<ChannelItem>, RpcError> {
        let state = self.enter("liststreamitems")?;
        let items = state.items.get(channel).map(Vec::as_slice).unwrap_or(&[]);
        Ok(items
            .iter()
            .skip(start as usize)
            .take(count as usize)
            .cloned()
            .collect())
    }
}

/// Import every block and its transactions the node currently has.
pub async fn import_chain(pool: &sqlx::SqlitePool, node: &MockNode) {
    mex_indexer::indexer::BlockIndexer::new(pool, node, 1000)
        .sync()
        .await
        .unwrap();
    mex_indexer::indexer::TransactionIndexer::new(pool, node)
        .sync()
        .await
        .unwrap();
}

pub async fn count(pool: &sqlx::SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await.unwrap()
}
