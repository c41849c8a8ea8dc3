//! RPC data models and types
//!
//! Every node response is converted into one of these canonical shapes at
//! deserialization time. Callers never see the verbosity-dependent raw JSON.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Base units per coin (8 fractional digits).
pub const COIN: i64 = 100_000_000;

/// `getblock` verbosity that includes full transaction bodies.
pub const VERBOSITY_FULL_TX: u8 = 4;

/// RPC error type
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcError {
    /// Node unreachable, connection reset or request timed out.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The node answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The node answered but the payload could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl RpcError {
    pub fn is_transport(&self) -> bool {
        matches!(self, RpcError::Transport(_))
    }
}

/// Inclusive block height range, rendered as `"start-end"` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeightRange {
    pub start: u64,
    pub end: u64,
}

#[allow(clippy::len_without_is_empty)]
impl HeightRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "empty height range {start}-{end}");
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn contains(&self, height: u64) -> bool {
        (self.start..=self.end).contains(&height)
    }
}

impl fmt::Display for HeightRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Fixed-point coin amount in base units (1e-8).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "String")]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_units(units: i64) -> Self {
        Amount(units)
    }

    pub fn units(&self) -> i64 {
        self.0
    }
}

impl FromStr for Amount {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = BigDecimal::from_str(s.trim())
            .map_err(|e| RpcError::Decode(format!("invalid amount {s:?}: {e}")))?;
        (decimal * BigDecimal::from(COIN))
            .round(0)
            .to_i64()
            .map(Amount)
            .ok_or_else(|| RpcError::Decode(format!("amount out of range: {s}")))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let coin = COIN as u64;
        write!(f, "{sign}{}.{:08}", abs / coin, abs % coin)
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.to_string()
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawAmount {
            Number(serde_json::Number),
            Text(String),
        }

        let text = match RawAmount::deserialize(deserializer)? {
            RawAmount::Number(n) => n.to_string(),
            RawAmount::Text(s) => s,
        };
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Block header as listed by `listblocks`.
///
/// The terse listing omits `merkleroot` and `size`; they default to empty
/// values and only the verbose listing is used for import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: u64,
    pub hash: String,
    #[serde(rename = "merkleroot", default)]
    pub merkle_root: String,
    #[serde(default, deserialize_with = "non_empty")]
    pub miner: Option<String>,
    /// Epoch seconds.
    pub time: i64,
    #[serde(rename = "txcount", default)]
    pub tx_count: u64,
    #[serde(default)]
    pub size: u64,
}

/// Nodes without a miner address report an empty string.
fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}

/// Full block detail with transaction bodies.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BlockDetail {
    pub hash: String,
    #[serde(default)]
    pub height: u64,
    pub tx: Vec<TxBody>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TxBody {
    pub txid: String,
    #[serde(default)]
    pub vout: Vec<TxOut>,
    #[serde(default)]
    pub vin: Vec<TxIn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawTxOut")]
pub struct TxOut {
    pub n: u32,
    pub value: Amount,
    pub address: Option<String>,
}

#[derive(Deserialize)]
struct RawTxOut {
    n: u32,
    #[serde(default)]
    value: Option<Amount>,
    #[serde(rename = "scriptPubKey", default)]
    script_pub_key: Option<RawScriptPubKey>,
}

#[derive(Deserialize)]
struct RawScriptPubKey {
    #[serde(default)]
    addresses: Vec<String>,
}

impl From<RawTxOut> for TxOut {
    fn from(raw: RawTxOut) -> Self {
        TxOut {
            n: raw.n,
            value: raw.value.unwrap_or_default(),
            address: raw
                .script_pub_key
                .and_then(|spk| spk.addresses.into_iter().next())
                .filter(|address| !address.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawTxIn")]
pub enum TxIn {
    /// Spends output `vout` of transaction `txid`.
    Spend { txid: String, vout: u32 },
    Coinbase,
}

#[derive(Deserialize)]
struct RawTxIn {
    txid: Option<String>,
    vout: Option<u32>,
    coinbase: Option<String>,
}

impl TryFrom<RawTxIn> for TxIn {
    type Error = String;

    fn try_from(raw: RawTxIn) -> Result<Self, Self::Error> {
        match (raw.txid, raw.vout, raw.coinbase) {
            (Some(txid), Some(vout), _) => Ok(TxIn::Spend { txid, vout }),
            (None, _, Some(_)) => Ok(TxIn::Coinbase),
            (Some(txid), None, _) => Err(format!("input spending {txid} has no vout")),
            (None, _, None) => Err("input is neither a spend nor coinbase".to_string()),
        }
    }
}

/// Stream (channel) metadata as reported by `liststreams`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: String,
    #[serde(default)]
    pub createtxid: String,
    #[serde(default)]
    pub streamref: String,
    #[serde(default)]
    pub open: bool,
    #[serde(default)]
    pub details: serde_json::Value,
    #[serde(default)]
    pub creators: Vec<String>,
    #[serde(default)]
    pub subscribed: bool,
    #[serde(default)]
    pub synchronized: bool,
    #[serde(default)]
    pub items: i64,
    #[serde(default)]
    pub confirmed: i64,
    #[serde(default)]
    pub keys: i64,
    #[serde(default)]
    pub publishers: i64,
}

/// One stream item as returned by `liststreamitems`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawChannelItem")]
pub struct ChannelItem {
    pub txid: String,
    pub vout: u32,
    pub confirmations: u64,
    /// Epoch seconds.
    pub time: i64,
    pub keys: Vec<String>,
    pub publishers: Vec<String>,
    pub data: serde_json::Value,
    pub available: bool,
    pub valid: bool,
}

#[derive(Deserialize)]
struct RawChannelItem {
    txid: String,
    vout: u32,
    #[serde(default)]
    confirmations: u64,
    #[serde(default)]
    time: i64,
    keys: Option<Vec<String>>,
    key: Option<String>,
    #[serde(default)]
    publishers: Vec<String>,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default = "default_true")]
    available: bool,
    #[serde(default = "default_true")]
    valid: bool,
}

fn default_true() -> bool {
    true
}

impl From<RawChannelItem> for ChannelItem {
    fn from(raw: RawChannelItem) -> Self {
        let keys = match (raw.keys, raw.key) {
            (Some(keys), _) => keys,
            (None, Some(key)) => vec![key],
            (None, None) => Vec::new(),
        };
        ChannelItem {
            txid: raw.txid,
            vout: raw.vout,
            confirmations: raw.confirmations,
            time: raw.time,
            keys,
            publishers: raw.publishers,
            data: raw.data,
            available: raw.available,
            valid: raw.valid,
        }
    }
}
