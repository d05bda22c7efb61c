use serde_json::{Value, json};

use super::Engine;
use crate::coins::CoinKind;
use crate::events::Event;
use crate::rpc::Answer;
use crate::rpc::types::{
    BalanceAnswer, MaxTakerVolAnswer, TradeFeeAnswer, TxHistoryResult, coin_params,
    orderbook_from_answer, orders_from_result, swaps_from_result,
};
use crate::state::model::BalanceInfo;
use crate::ticker::Ticker;

impl Engine {
    /// Fetches and stores the balance of `ticker`. In privacy mode an
    /// existing balance is kept as is.
    pub async fn process_balance(&self, ticker: &Ticker) {
        if self.is_privacy_mode() && self.state().balances.contains(ticker) {
            return;
        }

        let answer = match self.rpc().call("my_balance", coin_params(ticker.as_str())).await {
            Ok(answer) => answer,
            Err(err) => {
                tracing::warn!(%ticker, error = %format!("{err:#}"), "balance request failed");
                return;
            }
        };
        if !answer.is_ok() {
            tracing::warn!(%ticker, error = %answer.error_message().unwrap_or_default(), "balance rejected");
            return;
        }
        let balance: BalanceAnswer = match answer.parse() {
            Ok(balance) => balance,
            Err(err) => {
                tracing::warn!(%ticker, error = %format!("{err:#}"), "decode balance");
                return;
            }
        };
        if !self.is_enabled(ticker.as_str()) {
            tracing::debug!(%ticker, "coin disabled while fetching balance");
            return;
        }

        self.state().balances.insert_or_assign(
            ticker.clone(),
            BalanceInfo {
                ticker: ticker.clone(),
                balance: balance.balance,
                address: balance.address,
            },
        );
        self.bus().publish(Event::BalanceUpdated(ticker.clone()));
    }

    /// Replaces the history of `ticker`. Token histories come from the lookup
    /// service and are not re-fetched on periodic refreshes.
    pub async fn process_tx(&self, ticker: &Ticker, is_refresh: bool) {
        let Some(coin) = self.coin_info(ticker.as_str()) else {
            return;
        };
        let is_token = coin.kind() == CoinKind::Token;

        let answer = if is_token {
            if is_refresh {
                return;
            }
            let Ok(address) = self.address(ticker.as_str()) else {
                tracing::debug!(%ticker, "no address yet, skip token history");
                return;
            };
            let base = self.config().token_history_url.trim_end_matches('/');
            let url = if ticker == "ETH" {
                format!("{base}/eth_tx_history/{address}")
            } else {
                format!("{base}/erc_tx_history/{ticker}/{address}")
            };
            self.rpc().get(&url).await
        } else {
            let params = json!({ "coin": ticker, "limit": self.config().tx_page_limit });
            self.rpc().call("my_tx_history", params).await
        };

        let history = match answer.and_then(|a| tx_history(&a)) {
            Ok(history) => history,
            Err(err) => {
                tracing::warn!(%ticker, error = %format!("{err:#}"), "tx history failed");
                return;
            }
        };
        if !self.is_enabled(ticker.as_str()) {
            tracing::debug!(%ticker, "coin disabled while fetching tx history");
            return;
        }

        let (state, txs) = history.into_parts(is_token);
        tracing::debug!(%ticker, txs = txs.len(), state = %state.state, "tx history stored");
        self.state().transactions.insert_or_assign(ticker.clone(), txs);
        self.state().tx_state.insert_or_assign(ticker.clone(), state);
        self.bus().publish(Event::TxFetchFinished(ticker.clone()));
    }

    pub async fn process_orders(&self) {
        let orders = match self.rpc().call("my_orders", Value::Null).await {
            Ok(answer) if answer.is_ok() => answer
                .body
                .get("result")
                .ok_or_else(|| anyhow::anyhow!("my_orders answer has no result"))
                .and_then(orders_from_result),
            Ok(answer) => Err(anyhow::anyhow!(
                "my_orders rejected: {}",
                answer.error_message().unwrap_or_default()
            )),
            Err(err) => Err(err),
        };
        match orders {
            Ok(orders) => {
                self.state().orders.set(orders);
                self.bus().publish(Event::OrdersRefreshed);
            }
            Err(err) => tracing::warn!(error = %format!("{err:#}"), "orders refresh failed"),
        }
    }

    /// Requests `max(last total, minimum window)` swaps so the window keeps
    /// up with the history size.
    pub async fn process_swaps(&self) {
        let total = self.state().swaps.read(|s| s.map_or(0, |s| s.total));
        let limit = total.max(self.config().min_swaps_window);

        let swaps = match self
            .rpc()
            .call("my_recent_swaps", json!({ "limit": limit }))
            .await
        {
            Ok(answer) if answer.is_ok() => answer
                .body
                .get("result")
                .ok_or_else(|| anyhow::anyhow!("my_recent_swaps answer has no result"))
                .and_then(swaps_from_result),
            Ok(answer) => Err(anyhow::anyhow!(
                "my_recent_swaps rejected: {}",
                answer.error_message().unwrap_or_default()
            )),
            Err(err) => Err(err),
        };
        match swaps {
            Ok(swaps) => {
                tracing::debug!(limit, total = swaps.total, "swaps stored");
                self.state().swaps.set(swaps);
                self.bus().publish(Event::SwapsRefreshed);
            }
            Err(err) => tracing::warn!(limit, error = %format!("{err:#}"), "swaps refresh failed"),
        }
    }

    /// Balance and history of every enabled coin, awaited together.
    pub async fn refresh_infos(&self, is_refresh: bool) {
        let coins = self.enabled_coins();
        tracing::info!(coins = coins.len(), "fetching infos");

        let mut group = self.pool().group::<()>();
        for coin in coins {
            let engine = self.clone();
            let ticker = coin.ticker.clone();
            group.spawn("balance", async move { engine.process_balance(&ticker).await });
            let engine = self.clone();
            let ticker = coin.ticker;
            group.spawn("tx", async move { engine.process_tx(&ticker, is_refresh).await });
        }
        group.join().await;
    }

    /// One round trip for the watched pair: both trade fees, the orderbook
    /// and both max taker volumes. Each answer is applied on its own.
    pub async fn refresh_orderbook(&self, is_reset: bool) {
        if !self.is_orderbook_active() {
            tracing::debug!("orderbook view inactive, nothing to do");
            return;
        }
        let Some(pair) = self.current_pair() else {
            return;
        };
        let (base, rel) = (pair.base.as_str(), pair.rel.as_str());

        let rpc = self.rpc();
        let batch = vec![
            rpc.request("get_trade_fee", coin_params(base)),
            rpc.request("get_trade_fee", coin_params(rel)),
            rpc.request("orderbook", json!({ "base": base, "rel": rel })),
            rpc.request("max_taker_vol", coin_params(base)),
            rpc.request("max_taker_vol", coin_params(rel)),
        ];

        let answers = match rpc.call_batch(batch).await {
            Ok(answers) => answers,
            Err(err) => {
                tracing::warn!(pair = %pair.key(), error = %format!("{err:#}"), "orderbook batch failed");
                return;
            }
        };
        let [fee_base, fee_rel, book, vol_base, vol_rel] = answers.as_slice() else {
            return;
        };

        for (ticker, answer) in [(&pair.base, fee_base), (&pair.rel, fee_rel)] {
            match ok_result::<TradeFeeAnswer>(answer, "get_trade_fee") {
                Ok(fee) => self
                    .state()
                    .trade_fees
                    .insert_or_assign(ticker.clone(), fee.into()),
                Err(err) => tracing::warn!(%ticker, error = %format!("{err:#}"), "trade fee skipped"),
            }
        }

        let key = pair.key();
        match ok_answer(book, "orderbook").and_then(orderbook_from_answer) {
            Ok(snapshot) => {
                self.state().orderbooks.insert_or_assign(key.clone(), snapshot);
                self.bus().publish(Event::OrderbookRefreshed {
                    pair: key.clone(),
                    is_reset,
                });
            }
            Err(err) => tracing::warn!(pair = %key, error = %format!("{err:#}"), "orderbook skipped"),
        }

        let base_vol = ok_result::<MaxTakerVolAnswer>(vol_base, "max_taker_vol").and_then(|v| v.value());
        let rel_vol = ok_result::<MaxTakerVolAnswer>(vol_rel, "max_taker_vol").and_then(|v| v.value());
        self.state().with_pair(|state| {
            if state.pair.as_ref() != Some(&pair) {
                tracing::debug!(pair = %key, "pair changed during refresh, volumes dropped");
                return;
            }
            match base_vol {
                Ok(v) => state.max_taker_vol.base = v,
                Err(err) => tracing::warn!(ticker = %pair.base, error = %format!("{err:#}"), "max taker vol skipped"),
            }
            match rel_vol {
                Ok(v) => state.max_taker_vol.rel = v,
                Err(err) => tracing::warn!(ticker = %pair.rel, error = %format!("{err:#}"), "max taker vol skipped"),
            }
        });
    }
}

fn tx_history(answer: &Answer) -> anyhow::Result<TxHistoryResult> {
    ok_answer(answer, "tx_history")?;
    answer.result()
}

fn ok_answer<'a>(answer: &'a Answer, method: &str) -> anyhow::Result<&'a Value> {
    if answer.is_ok() {
        Ok(&answer.body)
    } else {
        anyhow::bail!(
            "{method} rejected: {}",
            answer.error_message().unwrap_or_default()
        )
    }
}

fn ok_result<T: serde::de::DeserializeOwned>(answer: &Answer, method: &str) -> anyhow::Result<T> {
    ok_answer(answer, method)?;
    answer.result()
}
