//! Chain types exchanged with the node: block identifiers, blocks,
//! transactions, logs and filter handles.

use std::str::FromStr;

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

// ─── Quantities ───────────────────────────────────────────────────────────────

/// Hex quantity encoding (`"0x1b4"`) used for every numeric JSON-RPC field.
pub mod quantity {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    /// Parse a hex quantity, with or without the `0x` prefix.
    pub fn parse(s: &str) -> Result<u64, String> {
        let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        if digits.is_empty() {
            return Err(format!("empty quantity `{s}`"));
        }
        u64::from_str_radix(digits, 16).map_err(|e| format!("invalid quantity `{s}`: {e}"))
    }

    /// Encode `n` as a minimal hex quantity.
    pub fn encode(n: u64) -> String {
        format!("{n:#x}")
    }

    pub fn serialize<S: Serializer>(n: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&encode(*n))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        let s = String::deserialize(d)?;
        parse(&s).map_err(D::Error::custom)
    }

    /// Same encoding for fields a node may send as `null`.
    pub mod opt {
        use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(n: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
            match n {
                Some(n) => s.serialize_str(&super::encode(*n)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|s| super::parse(&s).map_err(D::Error::custom))
                .transpose()
        }
    }
}

// ─── BlockId ──────────────────────────────────────────────────────────────────

/// A block height or a symbolic tag resolved by the node at fetch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockId {
    Number(u64),
    Earliest,
    Latest,
    Pending,
}

impl BlockId {
    /// The JSON-RPC parameter for this identifier.
    pub fn to_param(&self) -> Value {
        Value::String(match self {
            Self::Number(n) => quantity::encode(*n),
            Self::Earliest => "earliest".into(),
            Self::Latest => "latest".into(),
            Self::Pending => "pending".into(),
        })
    }
}

impl From<u64> for BlockId {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Earliest => write!(f, "earliest"),
            Self::Latest => write!(f, "latest"),
            Self::Pending => write!(f, "pending"),
        }
    }
}

impl FromStr for BlockId {
    type Err = String;

    /// Accepts a tag, a `0x` hex quantity, or a decimal height.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "earliest" => Ok(Self::Earliest),
            "latest" => Ok(Self::Latest),
            "pending" => Ok(Self::Pending),
            other if other.starts_with("0x") => quantity::parse(other).map(Self::Number),
            other => other
                .parse::<u64>()
                .map(Self::Number)
                .map_err(|e| format!("invalid block identifier `{s}`: {e}")),
        }
    }
}

impl Serialize for BlockId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.to_param().serialize(s)
    }
}

impl<'de> Deserialize<'de> for BlockId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ─── Block ────────────────────────────────────────────────────────────────────

/// A block as returned by `eth_getBlockByNumber` / `eth_getBlockByHash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Block height.
    #[serde(with = "quantity")]
    pub number: u64,
    /// Block hash (`0x…`); `None` for pending blocks.
    #[serde(default)]
    pub hash: Option<String>,
    /// Parent block hash (`0x…`).
    #[serde(default)]
    pub parent_hash: Option<String>,
    /// Unix timestamp (seconds).
    #[serde(default, with = "quantity::opt")]
    pub timestamp: Option<u64>,
    /// Hashes, or full bodies when requested.
    #[serde(default)]
    pub transactions: BlockTransactions,
}

impl Block {
    /// Identity used for deduplication: a reorg yields a different hash at
    /// the same height.
    pub fn identity(&self) -> (u64, Option<&str>) {
        (self.number, self.hash.as_deref())
    }

    /// Number of transactions in the block.
    pub fn tx_count(&self) -> usize {
        match &self.transactions {
            BlockTransactions::Hashes(h) => h.len(),
            BlockTransactions::Full(t) => t.len(),
        }
    }

    /// Full transaction bodies; empty when only hashes were fetched.
    pub fn into_transactions(self) -> Vec<Transaction> {
        match self.transactions {
            BlockTransactions::Full(txs) => txs,
            BlockTransactions::Hashes(_) => Vec::new(),
        }
    }
}

/// The `transactions` field of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockTransactions {
    Hashes(Vec<String>),
    Full(Vec<Transaction>),
}

impl Default for BlockTransactions {
    fn default() -> Self {
        Self::Hashes(Vec::new())
    }
}

// ─── Transaction ──────────────────────────────────────────────────────────────

/// A transaction body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: String,
    #[serde(with = "quantity")]
    pub nonce: u64,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default, with = "quantity::opt")]
    pub block_number: Option<u64>,
    #[serde(default, with = "quantity::opt")]
    pub transaction_index: Option<u64>,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub value: U256,
    #[serde(with = "quantity")]
    pub gas: u64,
    #[serde(default)]
    pub gas_price: Option<U256>,
    #[serde(default)]
    pub input: String,
}

impl Transaction {
    /// Returns `true` if the transaction has not been mined yet.
    pub fn is_pending(&self) -> bool {
        self.block_number.is_none()
    }
}

// ─── Log ──────────────────────────────────────────────────────────────────────

/// A log entry as returned by `eth_getFilterChanges` / `eth_getFilterLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    #[serde(default, with = "quantity::opt")]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default, with = "quantity::opt")]
    pub log_index: Option<u64>,
    /// Set when the log was dropped by a reorg.
    #[serde(default)]
    pub removed: bool,
}

// ─── LogFilter ────────────────────────────────────────────────────────────────

/// Parameters for `eth_newFilter`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_block: Option<BlockId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_block: Option<BlockId>,
    /// Contract addresses (empty = all).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub address: Vec<String>,
    /// Positional topic constraints; `None` matches anything.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<Option<String>>,
}

impl LogFilter {
    /// Create a filter for a single contract address.
    pub fn address(addr: impl Into<String>) -> Self {
        Self {
            address: vec![addr.into()],
            ..Default::default()
        }
    }

    /// Constrain topic0 (event signature hash).
    pub fn topic0(mut self, topic: impl Into<String>) -> Self {
        if self.topics.is_empty() {
            self.topics.push(Some(topic.into()));
        } else {
            self.topics[0] = Some(topic.into());
        }
        self
    }

    /// Set the start block.
    pub fn from_block(mut self, block: impl Into<BlockId>) -> Self {
        self.from_block = Some(block.into());
        self
    }

    /// Set the end block.
    pub fn to_block(mut self, block: impl Into<BlockId>) -> Self {
        self.to_block = Some(block.into());
        self
    }
}

// ─── FilterId ─────────────────────────────────────────────────────────────────

/// Server-assigned filter handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterId(pub String);

impl std::fmt::Display for FilterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
