//! Node API trait definitions

use async_trait::async_trait;
use crate::model::*;

/// Read-only chain query surface of a MultiChain-style node.
///
/// Implementations must map network failures to [`RpcError::Transport`] so
/// callers can tell them apart from rejected or malformed queries.
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Height of the node's best chain tip.
    async fn chain_height(&self) -> Result<u64, RpcError>;

    /// Headers for every block in `range`, ascending. `verbose` requests
    /// merkle root and size as well.
    async fn list_blocks(&self, range: HeightRange, verbose: bool) -> Result<Vec<BlockHeader>, RpcError>;

    async fn get_block(&self, hash: &str, verbosity: u8) -> Result<BlockDetail, RpcError>;

    async fn list_channels(&self, pattern: &str, verbose: bool) -> Result<Vec<ChannelInfo>, RpcError>;

    /// Items of `channel` starting at offset `start`. An empty result means
    /// the channel tip has been reached.
    async fn list_channel_items(
        &self,
        channel: &str,
        verbose: bool,
        count: u64,
        start: u64,
    ) -> Result<Vec<ChannelItem>, RpcError>;
}
