use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ticker::Ticker;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceInfo {
    pub ticker: Ticker,
    /// Balance as reported by the daemon, never scaled.
    pub balance: Decimal,
    pub address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxDirection {
    #[default]
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TxInfo {
    pub hash: String,
    pub from: Vec<String>,
    pub to: Vec<String>,
    /// Signed balance change for our wallet.
    pub amount: Decimal,
    pub total_amount: Decimal,
    pub fee: Decimal,
    pub timestamp: u64,
    pub confirmations: u64,
    pub block_height: u64,
    pub direction: TxDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxSyncState {
    pub state: String,
    pub current_block: u64,
    pub blocks_left: u64,
    pub transactions_left: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderbookEntry {
    #[serde(default)]
    pub coin: String,
    #[serde(default)]
    pub address: String,
    pub price: Decimal,
    #[serde(default)]
    pub maxvolume: Decimal,
    #[serde(default)]
    pub pubkey: String,
    #[serde(default)]
    pub age: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderbookSnapshot {
    pub base: String,
    pub rel: String,
    #[serde(default)]
    pub bids: Vec<OrderbookEntry>,
    #[serde(default)]
    pub asks: Vec<OrderbookEntry>,
}

impl OrderbookSnapshot {
    pub fn pair_key(&self) -> String {
        pair_key(&self.base, &self.rel)
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

pub fn pair_key(base: &str, rel: &str) -> String {
    format!("{base}/{rel}")
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TradeFeeInfo {
    pub coin: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MaxTakerVolumePair {
    pub base: Decimal,
    pub rel: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePair {
    pub base: Ticker,
    pub rel: Ticker,
}

impl ActivePair {
    pub fn key(&self) -> String {
        pair_key(self.base.as_str(), self.rel.as_str())
    }
}

/// The watched pair and the max taker volumes derived for it. Kept behind a
/// single lock so volumes always belong to the pair they were fetched for.
#[derive(Debug, Clone, Default)]
pub struct PairState {
    pub pair: Option<ActivePair>,
    pub max_taker_vol: MaxTakerVolumePair,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Maker,
    Taker,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub uuid: Uuid,
    pub kind: OrderKind,
    pub base: String,
    pub rel: String,
    pub price: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub created_at: u64,
}

impl OrderRecord {
    pub fn touches(&self, ticker: &str) -> bool {
        self.base == ticker || self.rel == ticker
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrdersSnapshot {
    pub maker: Vec<OrderRecord>,
    pub taker: Vec<OrderRecord>,
}

impl OrdersSnapshot {
    pub fn filtered(&self, ticker: &str) -> Self {
        Self {
            maker: self
                .maker
                .iter()
                .filter(|o| o.touches(ticker))
                .cloned()
                .collect(),
            taker: self
                .taker
                .iter()
                .filter(|o| o.touches(ticker))
                .cloned()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SwapParticipants {
    pub my_coin: String,
    pub other_coin: String,
    pub my_amount: Decimal,
    pub other_amount: Decimal,
    pub started_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapRecord {
    pub uuid: Uuid,
    /// "Maker" or "Taker", as reported by the daemon.
    pub swap_type: String,
    /// Type of the most recent swap event, `Started` when none were recorded.
    pub status: String,
    pub maker_coin: Option<String>,
    pub taker_coin: Option<String>,
    pub participants: Option<SwapParticipants>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SwapsSnapshot {
    pub swaps: Vec<SwapRecord>,
    pub total: usize,
    pub limit: usize,
}
