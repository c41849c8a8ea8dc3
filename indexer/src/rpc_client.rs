//! JSON-RPC client for a MultiChain-style node over HTTP

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rpc_core::{BlockDetail, BlockHeader, ChannelInfo, ChannelItem, HeightRange, NodeApi, RpcError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::NodeConfig;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    id: u64,
    method: &'a str,
    params: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    chain_name: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

pub struct RpcClient {
    http: reqwest::Client,
    url: url::Url,
    user: String,
    password: String,
    chain_name: Option<String>,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(config: &NodeConfig) -> Result<Self, RpcError> {
        let url = url::Url::parse(&config.url)
            .map_err(|e| RpcError::Transport(format!("invalid node url {}: {}", config.url, e)))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RpcError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url,
            user: config.user.clone(),
            password: config.password.clone(),
            chain_name: config.chain_name.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let request = JsonRpcRequest {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
            chain_name: self.chain_name.as_deref(),
        };
        debug!(method, id = request.id, "rpc call");

        let response = self
            .http
            .post(self.url.clone())
            .basic_auth(&self.user, Some(&self.password))
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::Transport(format!("{} request failed: {}", method, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RpcError::Transport(format!("{} response read failed: {}", method, e)))?;

        // The node reports RPC errors with a non-2xx status and a JSON body,
        // so the body is checked before the status. A 5xx without one comes
        // from an overloaded node or a proxy in front of it.
        let envelope: JsonRpcResponse = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if status.is_server_error() => {
                return Err(RpcError::Transport(format!("{} failed with HTTP {}", method, status)));
            }
            Err(_) if !status.is_success() => {
                return Err(RpcError::Rpc {
                    code: i64::from(status.as_u16()),
                    message: format!("HTTP {} from node", status),
                });
            }
            Err(e) => return Err(RpcError::Decode(format!("{} response: {}", method, e))),
        };

        if let Some(error) = envelope.error {
            return Err(RpcError::Rpc { code: error.code, message: error.message });
        }

        serde_json::from_value(envelope.result)
            .map_err(|e| RpcError::Decode(format!("{} result: {}", method, e)))
    }
}

#[async_trait]
impl NodeApi for RpcClient {
    async fn chain_height(&self) -> Result<u64, RpcError> {
        self.call("getblockcount", json!([])).await
    }

    async fn list_blocks(&self, range: HeightRange, verbose: bool) -> Result<Vec<BlockHeader>, RpcError> {
        self.call("listblocks", json!([range.to_string(), verbose])).await
    }

    async fn get_block(&self, hash: &str, verbosity: u8) -> Result<BlockDetail, RpcError> {
        self.call("getblock", json!([hash, verbosity])).await
    }

    async fn list_channels(&self, pattern: &str, verbose: bool) -> Result<Vec<ChannelInfo>, RpcError> {
        self.call("liststreams", json!([pattern, verbose])).await
    }

    async fn list_channel_items(
        &self,
        channel: &str,
        verbose: bool,
        count: u64,
        start: u64,
    ) -> Result<Vec<ChannelItem>, RpcError> {
        self.call("liststreamitems", json!([channel, verbose, count, start])).await
    }
}
