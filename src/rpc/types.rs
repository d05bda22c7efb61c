use anyhow::{Context as _, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::coins::ElectrumServer;
use crate::state::model::{
    OrderKind, OrderRecord, OrderbookSnapshot, OrdersSnapshot, SwapParticipants, SwapRecord,
    SwapsSnapshot, TradeFeeInfo, TxDirection, TxInfo, TxSyncState,
};

#[derive(Debug, Clone, Serialize)]
pub struct ElectrumRequest {
    pub coin: String,
    pub servers: Vec<ElectrumServer>,
    pub tx_history: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnableRequest {
    pub coin: String,
    pub urls: Vec<String>,
    pub swap_contract_address: String,
    pub tx_history: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WithdrawRequest {
    pub coin: String,
    pub to: String,
    pub amount: Decimal,
    #[serde(default)]
    pub max: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeRequest {
    pub base: String,
    pub rel: String,
    pub price: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnableAnswer {
    pub result: String,
    #[serde(default)]
    pub coin: Option<String>,
}

impl EnableAnswer {
    pub fn is_success(&self) -> bool {
        self.result == "success"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceAnswer {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub balance: Decimal,
    #[serde(default)]
    pub coin: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaxTakerVolAnswer {
    #[serde(default)]
    pub decimal: Option<Decimal>,
    #[serde(default)]
    pub numer: Option<String>,
    #[serde(default)]
    pub denom: Option<String>,
}

impl MaxTakerVolAnswer {
    pub fn value(&self) -> Result<Decimal> {
        if let Some(decimal) = self.decimal {
            return Ok(decimal);
        }
        let numer: Decimal = self
            .numer
            .as_deref()
            .context("max_taker_vol has no numer")?
            .parse()
            .context("parse numer")?;
        let denom: Decimal = self
            .denom
            .as_deref()
            .context("max_taker_vol has no denom")?
            .parse()
            .context("parse denom")?;
        numer
            .checked_div(denom)
            .context("max_taker_vol denom is zero")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxHistoryResult {
    #[serde(default)]
    pub transactions: Vec<RawTx>,
    #[serde(default)]
    pub current_block: u64,
    #[serde(default)]
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncStatus {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub additional_info: Option<SyncAdditionalInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncAdditionalInfo {
    #[serde(default)]
    pub blocks_left: Option<u64>,
    #[serde(default)]
    pub transactions_left: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTx {
    pub tx_hash: String,
    #[serde(default)]
    pub from: Vec<String>,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub my_balance_change: Decimal,
    #[serde(default)]
    pub total_amount: Decimal,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub confirmations: Option<u64>,
    #[serde(default)]
    pub block_height: u64,
    #[serde(default)]
    pub fee_details: FeeDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeeDetails {
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub total_fee: Option<Decimal>,
}

impl From<RawTx> for TxInfo {
    fn from(raw: RawTx) -> Self {
        let direction = if raw.my_balance_change.is_sign_negative() {
            TxDirection::Outgoing
        } else {
            TxDirection::Incoming
        };
        Self {
            hash: raw.tx_hash,
            from: raw.from,
            to: raw.to,
            amount: raw.my_balance_change,
            total_amount: raw.total_amount,
            fee: raw
                .fee_details
                .amount
                .or(raw.fee_details.total_fee)
                .unwrap_or_default(),
            timestamp: raw.timestamp,
            confirmations: raw.confirmations.unwrap_or(0),
            block_height: raw.block_height,
            direction,
        }
    }
}

impl TxHistoryResult {
    /// Splits the answer into sync progress and a history sorted newest first.
    /// Token histories come from the lookup service and are always complete.
    pub fn into_parts(self, is_token: bool) -> (TxSyncState, Vec<TxInfo>) {
        let info = self.sync_status.additional_info.unwrap_or_default();
        let state = if is_token {
            TxSyncState {
                state: "Finished".to_string(),
                current_block: 0,
                blocks_left: info.blocks_left.unwrap_or(0),
                transactions_left: info.transactions_left.unwrap_or(0),
            }
        } else {
            TxSyncState {
                state: self.sync_status.state,
                current_block: self.current_block,
                blocks_left: info.blocks_left.unwrap_or(0),
                transactions_left: info.transactions_left.unwrap_or(0),
            }
        };

        let mut txs: Vec<TxInfo> = self.transactions.into_iter().map(TxInfo::from).collect();
        txs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        (state, txs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeFeeAnswer {
    pub amount: Decimal,
    pub coin: String,
}

impl From<TradeFeeAnswer> for TradeFeeInfo {
    fn from(answer: TradeFeeAnswer) -> Self {
        Self {
            coin: answer.coin,
            amount: answer.amount,
        }
    }
}

pub fn orderbook_from_answer(body: &Value) -> Result<OrderbookSnapshot> {
    serde_json::from_value(body.clone()).context("decode orderbook")
}

#[derive(Debug, Clone, Deserialize)]
struct RawMyOrders {
    #[serde(default)]
    maker_orders: serde_json::Map<String, Value>,
    #[serde(default)]
    taker_orders: serde_json::Map<String, Value>,
}

/// Decodes the `result` of `my_orders`. Orders that fail to decode are
/// skipped with a warning rather than failing the whole snapshot.
pub fn orders_from_result(result: &Value) -> Result<OrdersSnapshot> {
    let raw: RawMyOrders =
        serde_json::from_value(result.clone()).context("decode my_orders result")?;

    let mut snapshot = OrdersSnapshot::default();
    for (id, order) in &raw.maker_orders {
        match decode_order(id, order, OrderKind::Maker) {
            Ok(o) => snapshot.maker.push(o),
            Err(err) => tracing::warn!(order = %id, error = %err, "skip maker order"),
        }
    }
    for (id, order) in &raw.taker_orders {
        match decode_order(id, order, OrderKind::Taker) {
            Ok(o) => snapshot.taker.push(o),
            Err(err) => tracing::warn!(order = %id, error = %err, "skip taker order"),
        }
    }
    snapshot.maker.sort_by_key(|o| std::cmp::Reverse(o.created_at));
    snapshot.taker.sort_by_key(|o| std::cmp::Reverse(o.created_at));
    Ok(snapshot)
}

fn decode_order(id: &str, order: &Value, kind: OrderKind) -> Result<OrderRecord> {
    let uuid = Uuid::parse_str(id).context("parse order uuid")?;
    let created_at = order.get("created_at").and_then(Value::as_u64).unwrap_or(0);
    let body = match kind {
        OrderKind::Maker => order,
        OrderKind::Taker => order.get("request").context("taker order has no request")?,
    };
    let base = body
        .get("base")
        .and_then(Value::as_str)
        .context("order has no base")?
        .to_string();
    let rel = body
        .get("rel")
        .and_then(Value::as_str)
        .context("order has no rel")?
        .to_string();
    let (price, volume) = match kind {
        OrderKind::Maker => (
            decimal_field(body, "price"),
            decimal_field(body, "max_base_vol").or_else(|| decimal_field(body, "available_amount")),
        ),
        OrderKind::Taker => {
            let base_amount = decimal_field(body, "base_amount");
            let rel_amount = decimal_field(body, "rel_amount");
            let price = match (base_amount, rel_amount) {
                (Some(b), Some(r)) if !b.is_zero() => r.checked_div(b),
                _ => None,
            };
            (price, base_amount)
        }
    };

    Ok(OrderRecord {
        uuid,
        kind,
        base,
        rel,
        price,
        volume,
        created_at,
    })
}

fn decimal_field(v: &Value, key: &str) -> Option<Decimal> {
    match v.get(key)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawRecentSwaps {
    #[serde(default)]
    swaps: Vec<Value>,
    #[serde(default)]
    total: usize,
    #[serde(default)]
    limit: usize,
}

pub fn swaps_from_result(result: &Value) -> Result<SwapsSnapshot> {
    let raw: RawRecentSwaps =
        serde_json::from_value(result.clone()).context("decode my_recent_swaps result")?;

    let mut swaps = Vec::with_capacity(raw.swaps.len());
    for swap in &raw.swaps {
        match decode_swap(swap) {
            Ok(s) => swaps.push(s),
            Err(err) => tracing::warn!(error = %err, "skip swap"),
        }
    }
    Ok(SwapsSnapshot {
        swaps,
        total: raw.total,
        limit: raw.limit,
    })
}

fn decode_swap(swap: &Value) -> Result<SwapRecord> {
    let uuid = swap
        .get("uuid")
        .and_then(Value::as_str)
        .context("swap has no uuid")?;
    let uuid = Uuid::parse_str(uuid).context("parse swap uuid")?;
    let status = swap
        .get("events")
        .and_then(Value::as_array)
        .and_then(|events| events.last())
        .and_then(|e| e.pointer("/event/type"))
        .and_then(Value::as_str)
        .unwrap_or("Started")
        .to_string();
    let participants = swap
        .get("my_info")
        .filter(|v| !v.is_null())
        .map(|info| -> Result<SwapParticipants> {
            Ok(SwapParticipants {
                my_coin: str_field(info, "my_coin"),
                other_coin: str_field(info, "other_coin"),
                my_amount: decimal_field(info, "my_amount").unwrap_or_default(),
                other_amount: decimal_field(info, "other_amount").unwrap_or_default(),
                started_at: info.get("started_at").and_then(Value::as_u64).unwrap_or(0),
            })
        })
        .transpose()?;

    Ok(SwapRecord {
        uuid,
        swap_type: str_field(swap, "type"),
        status,
        maker_coin: swap
            .get("maker_coin")
            .and_then(Value::as_str)
            .map(str::to_string),
        taker_coin: swap
            .get("taker_coin")
            .and_then(Value::as_str)
            .map(str::to_string),
        participants,
    })
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WithdrawAnswer {
    pub tx_hex: String,
    pub tx_hash: String,
    pub timestamp: u64,
    pub error: Option<String>,
    pub raw: Value,
}

impl WithdrawAnswer {
    pub fn from_body(body: Value) -> Self {
        Self {
            tx_hex: str_field(&body, "tx_hex"),
            tx_hash: str_field(&body, "tx_hash"),
            timestamp: body.get("timestamp").and_then(Value::as_u64).unwrap_or(0),
            error: body
                .get("error")
                .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string())),
            raw: body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BroadcastAnswer {
    pub tx_hash: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TradeAnswer {
    pub uuid: Option<Uuid>,
    pub result: Value,
}

impl TradeAnswer {
    pub fn from_result(result: Value) -> Self {
        let uuid = result
            .get("uuid")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok());
        Self { uuid, result }
    }
}

pub fn coin_params(ticker: &str) -> Value {
    serde_json::json!({ "coin": ticker })
}
