use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use dex_sync::rpc::{HTTP_OK, RawResponse, TOO_MANY_REQUESTS, Transport};
use serde_json::{Value, json};

pub const ORDER_UUID: &str = "3f6a1b8e-8c2a-4b7e-9a1d-2f5c6d7e8f90";
pub const SWAP_UUID: &str = "7d3e2c1b-0a9f-4e8d-8c7b-6a5f4e3d2c1b";
pub const TRADE_UUID: &str = "0b1c2d3e-4f50-4617-8293-a4b5c6d7e8f9";

/// Scriptable stand-in for the trading daemon. Records every method it
/// receives, batch items included.
#[derive(Default)]
pub struct MockDaemon {
    state: Mutex<MockState>,
}

#[derive(Default)]
pub struct MockState {
    pub posts: usize,
    pub calls: Vec<String>,
    pub batch_sizes: Vec<usize>,
    pub gets: Vec<String>,
    pub last_payload: Option<Value>,
    pub balances: HashMap<String, String>,
    pub fail_enable: HashSet<String>,
    pub disable_errors: HashMap<String, String>,
    pub swaps_total: usize,
    pub swap_limits: Vec<u64>,
    /// Number of upcoming posts answered with 429.
    pub rate_limited: u32,
    /// Number of upcoming version checks that fail at the transport level.
    pub version_failures: u32,
    pub withdraw_error: Option<String>,
    /// Methods answered with an error, batch items included.
    pub failing: HashSet<String>,
    /// Methods answered with a fixed body instead of the scripted one.
    pub overrides: HashMap<String, Value>,
}

impl MockDaemon {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with(f: impl FnOnce(&mut MockState)) -> Arc<Self> {
        let daemon = Self::default();
        f(&mut daemon.state.lock().expect("mock lock"));
        Arc::new(daemon)
    }

    pub fn update(&self, f: impl FnOnce(&mut MockState)) {
        f(&mut self.state.lock().expect("mock lock"));
    }

    pub fn read<R>(&self, f: impl FnOnce(&MockState) -> R) -> R {
        f(&self.state.lock().expect("mock lock"))
    }

    pub fn count(&self, method: &str) -> usize {
        self.read(|s| s.calls.iter().filter(|m| *m == method).count())
    }

    pub fn posts(&self) -> usize {
        self.read(|s| s.posts)
    }

    fn answer(state: &mut MockState, req: &Value) -> Value {
        let method = req.get("method").and_then(Value::as_str).unwrap_or_default();
        let coin = req.get("coin").and_then(Value::as_str).unwrap_or_default();
        state.calls.push(method.to_string());
        if state.failing.contains(method) {
            return json!({ "error": format!("{method} is unavailable") });
        }
        if let Some(body) = state.overrides.get(method) {
            return body.clone();
        }

        match method {
            "version" => json!({ "result": "2.1.0-mock", "datetime": "2026-01-01T00:00:00Z" }),
            "electrum" | "enable" => {
                if state.fail_enable.contains(coin) {
                    json!({ "error": format!("rpc:{coin} failed to connect to servers") })
                } else {
                    json!({
                        "result": "success",
                        "coin": coin,
                        "address": format!("addr-{coin}"),
                        "balance": "0"
                    })
                }
            }
            "my_balance" => json!({
                "coin": coin,
                "address": format!("addr-{coin}"),
                "balance": state.balances.get(coin).cloned().unwrap_or_else(|| "1".to_string()),
            }),
            "my_tx_history" => json!({
                "result": {
                    "transactions": [
                        {
                            "tx_hash": format!("{coin}-tx-old"),
                            "from": [format!("addr-{coin}")],
                            "to": ["elsewhere"],
                            "my_balance_change": "-0.5",
                            "total_amount": "0.5",
                            "timestamp": 1_700_000_000u64,
                            "confirmations": 12,
                            "block_height": 90,
                            "fee_details": { "amount": "0.0001" }
                        },
                        {
                            "tx_hash": format!("{coin}-tx-new"),
                            "from": ["elsewhere"],
                            "to": [format!("addr-{coin}")],
                            "my_balance_change": "2",
                            "total_amount": "2",
                            "timestamp": 1_700_000_500u64,
                            "confirmations": 1,
                            "block_height": 100
                        }
                    ],
                    "current_block": 100,
                    "sync_status": { "state": "Finished" }
                }
            }),
            "disable_coin" => match state.disable_errors.get(coin) {
                Some(message) => json!({ "error": message }),
                None => json!({ "result": { "coin": coin } }),
            },
            "my_orders" => json!({
                "result": {
                    "maker_orders": {
                        ORDER_UUID: {
                            "base": "KMD",
                            "rel": "BTC",
                            "price": "0.0001",
                            "max_base_vol": "5",
                            "created_at": 1_700_000_100u64
                        }
                    },
                    "taker_orders": {}
                }
            }),
            "my_recent_swaps" => {
                let limit = req.get("limit").and_then(Value::as_u64).unwrap_or_default();
                state.swap_limits.push(limit);
                json!({
                    "result": {
                        "swaps": [{
                            "uuid": SWAP_UUID,
                            "type": "Taker",
                            "maker_coin": "KMD",
                            "taker_coin": "BTC",
                            "events": [
                                { "event": { "type": "Started" } },
                                { "event": { "type": "Finished" } }
                            ]
                        }],
                        "total": state.swaps_total,
                        "limit": limit
                    }
                })
            }
            "get_trade_fee" => json!({ "result": { "coin": coin, "amount": "0.0001" } }),
            "orderbook" => {
                let base = req.get("base").and_then(Value::as_str).unwrap_or_default();
                let rel = req.get("rel").and_then(Value::as_str).unwrap_or_default();
                json!({
                    "base": base,
                    "rel": rel,
                    "bids": [],
                    "asks": [{
                        "coin": base,
                        "address": "maker-address",
                        "price": "2",
                        "maxvolume": "10",
                        "pubkey": "02aa",
                        "age": 4
                    }]
                })
            }
            "max_taker_vol" => json!({ "result": { "decimal": "0.123456789" } }),
            "withdraw" => match &state.withdraw_error {
                Some(message) => json!({ "error": message }),
                None => json!({
                    "tx_hex": "0400008085202f89",
                    "tx_hash": "b1c2d3",
                    "timestamp": 1_700_000_900u64,
                    "my_balance_change": "-1"
                }),
            },
            "send_raw_transaction" => json!({ "tx_hash": "feedbeef" }),
            "buy" | "sell" => json!({
                "result": {
                    "uuid": TRADE_UUID,
                    "base": req.get("base").cloned().unwrap_or(Value::Null),
                    "rel": req.get("rel").cloned().unwrap_or(Value::Null),
                    "method": "request"
                }
            }),
            "cancel_order" | "cancel_all_orders" => json!({ "result": "success" }),
            "kmd_rewards_info" => json!({ "result": [{ "accrued_rewards": { "Accrued": "0.01" } }] }),
            "stop" => json!({ "result": "success" }),
            other => json!({ "error": format!("unknown method {other}") }),
        }
    }
}

#[async_trait::async_trait]
impl Transport for MockDaemon {
    async fn post(&self, payload: &Value) -> Result<RawResponse> {
        let mut state = self.state.lock().expect("mock lock");
        state.posts += 1;
        state.last_payload = Some(payload.clone());
        if state.rate_limited > 0 {
            state.rate_limited -= 1;
            return Ok(RawResponse {
                status: TOO_MANY_REQUESTS,
                body: json!({ "error": "too many requests" }),
            });
        }

        let body = match payload {
            Value::Array(items) => {
                state.batch_sizes.push(items.len());
                Value::Array(items.iter().map(|req| Self::answer(&mut state, req)).collect())
            }
            req => {
                let is_version = req.get("method").and_then(Value::as_str) == Some("version");
                if is_version && state.version_failures > 0 {
                    state.version_failures -= 1;
                    anyhow::bail!("connection refused");
                }
                Self::answer(&mut state, req)
            }
        };
        Ok(RawResponse {
            status: HTTP_OK,
            body,
        })
    }

    async fn get(&self, url: &str) -> Result<RawResponse> {
        let mut state = self.state.lock().expect("mock lock");
        state.gets.push(url.to_string());
        Ok(RawResponse {
            status: HTTP_OK,
            body: json!({
                "result": {
                    "transactions": [{
                        "tx_hash": "0xabc",
                        "my_balance_change": "1.5",
                        "total_amount": "1.5",
                        "timestamp": 1_700_000_200u64
                    }],
                    "sync_status": { "state": "Finished" }
                }
            }),
        })
    }
}
