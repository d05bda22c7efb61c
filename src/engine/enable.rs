use anyhow::{Context as _, Result};
use serde_json::Value;

use super::Engine;
use crate::coins::{CoinConfig, CoinKind};
use crate::error::DexError;
use crate::events::Event;
use crate::rpc::Answer;
use crate::rpc::types::{ElectrumRequest, EnableAnswer, EnableRequest, coin_params};
use crate::ticker::Ticker;

fn enable_request(coin: &CoinConfig) -> Result<(&'static str, Value)> {
    let ticker = coin.ticker.to_string();
    match coin.kind() {
        CoinKind::Utxo => {
            let req = ElectrumRequest {
                coin: ticker,
                servers: coin.electrum_urls.clone(),
                tx_history: true,
            };
            Ok(("electrum", serde_json::to_value(req).context("encode electrum request")?))
        }
        CoinKind::Token => {
            let req = EnableRequest {
                coin: ticker,
                urls: coin.eth_nodes.clone(),
                swap_contract_address: coin.swap_contract().to_string(),
                tx_history: true,
            };
            Ok(("enable", serde_json::to_value(req).context("encode enable request")?))
        }
    }
}

fn enabled_ok(answer: &Answer) -> bool {
    answer.is_ok()
        && answer
            .parse::<EnableAnswer>()
            .is_ok_and(|a| a.is_success())
}

impl Engine {
    /// Enables one coin. A coin that is already enabled is left alone and no
    /// request is sent.
    pub async fn enable_coin(&self, ticker: &str) -> Result<(), DexError> {
        let coin = self
            .coin_info(ticker)
            .ok_or_else(|| DexError::UnknownTicker(ticker.to_string()))?;
        if coin.currently_enabled {
            return Ok(());
        }

        let (method, params) = enable_request(&coin)
            .map_err(|err| DexError::EnableFailed(format!("{ticker}: {err:#}")))?;
        let answer = match self.rpc().call(method, params).await {
            Ok(answer) => answer,
            Err(err) => {
                tracing::warn!(%ticker, method, error = %format!("{err:#}"), "enable request failed");
                return Err(DexError::EnableFailed(ticker.to_string()));
            }
        };
        if !enabled_ok(&answer) {
            tracing::warn!(
                %ticker,
                method,
                error = %answer.error_message().unwrap_or_default(),
                "daemon refused to enable coin"
            );
            return Err(DexError::EnableFailed(ticker.to_string()));
        }

        self.mark_enabled(&coin.ticker, true);
        Ok(())
    }

    fn mark_enabled(&self, ticker: &Ticker, announce_change: bool) {
        self.state()
            .coins
            .update(ticker, |coin| coin.currently_enabled = true);
        tracing::info!(%ticker, "coin enabled");

        // Token histories are looked up by address, so the balance goes first.
        let engine = self.clone();
        let t = ticker.clone();
        drop(self.pool().spawn("coin_infos", async move {
            engine.process_balance(&t).await;
            engine.process_tx(&t, false).await;
        }));

        self.bus().publish(Event::CoinEnabled(ticker.clone()));
        if announce_change {
            self.bus().publish(Event::EnabledCoinsChanged);
        }
    }

    /// Disables one coin. A coin that is not enabled is left alone.
    pub async fn disable_coin(&self, ticker: &str) -> Result<(), DexError> {
        let coin = self
            .coin_info(ticker)
            .ok_or_else(|| DexError::UnknownTicker(ticker.to_string()))?;
        if !coin.currently_enabled {
            return Ok(());
        }

        let answer = self
            .rpc()
            .call("disable_coin", coin_params(ticker))
            .await
            .map_err(|err| DexError::rpc("disable_coin", format!("{err:#}")))?;

        if let Some(message) = answer.error_message() {
            let err = classify_disable_error(ticker, &message);
            tracing::warn!(%ticker, error = %message, "daemon refused to disable coin");
            return Err(err);
        }

        self.state()
            .coins
            .update(ticker, |coin| coin.currently_enabled = false);
        self.state().balances.remove(ticker);
        self.state().transactions.remove(ticker);
        self.state().tx_state.remove(ticker);
        tracing::info!(%ticker, "coin disabled");

        self.bus().publish(Event::CoinDisabled(coin.ticker));
        Ok(())
    }

    /// Enables `tickers` with at most one batch per coin kind and returns the
    /// tickers the daemon accepted. Per-coin refusals are logged and skipped.
    pub async fn batch_enable(&self, tickers: &[Ticker], announce_change: bool) -> Vec<Ticker> {
        let mut utxo = Vec::new();
        let mut token = Vec::new();
        for ticker in tickers {
            let Some(coin) = self.coin_info(ticker.as_str()) else {
                tracing::warn!(%ticker, "skip unknown coin in batch enable");
                continue;
            };
            if coin.currently_enabled {
                continue;
            }
            match enable_request(&coin) {
                Ok((method, params)) => {
                    let request = self.rpc().request(method, params);
                    match coin.kind() {
                        CoinKind::Utxo => utxo.push((coin.ticker, request)),
                        CoinKind::Token => token.push((coin.ticker, request)),
                    }
                }
                Err(err) => {
                    tracing::warn!(%ticker, error = %format!("{err:#}"), "skip coin in batch enable")
                }
            }
        }

        let mut enabled = Vec::new();
        for (kind, batch) in [("utxo", utxo), ("token", token)] {
            if batch.is_empty() {
                continue;
            }
            let (batch_tickers, requests): (Vec<Ticker>, Vec<Value>) = batch.into_iter().unzip();
            let answers = match self.rpc().call_batch(requests).await {
                Ok(answers) => answers,
                Err(err) => {
                    tracing::warn!(kind, coins = batch_tickers.len(), error = %format!("{err:#}"), "batch enable failed");
                    continue;
                }
            };

            for (ticker, answer) in batch_tickers.into_iter().zip(answers) {
                if enabled_ok(&answer) {
                    self.mark_enabled(&ticker, announce_change);
                    enabled.push(ticker);
                } else {
                    tracing::warn!(
                        %ticker,
                        error = %answer.error_message().unwrap_or_default(),
                        "daemon refused to enable coin"
                    );
                }
            }
        }
        enabled
    }

    /// Persists `active = true` for every ticker, whatever the daemon later
    /// answers, and enables them in the background.
    pub fn enable_multiple(&self, tickers: &[Ticker]) -> Result<()> {
        let engine = self.clone();
        let batch = tickers.to_vec();
        drop(self.pool().spawn_coordinator("enable_multiple", async move {
            engine.batch_enable(&batch, true).await;
        }));
        self.persist_active(tickers, true)
    }

    /// Persists `active = false` for every ticker and disables them in the
    /// background.
    pub fn disable_multiple(&self, tickers: &[Ticker]) -> Result<()> {
        let mut group = self.pool().group::<()>();
        for ticker in tickers {
            let engine = self.clone();
            let ticker = ticker.clone();
            group.spawn("disable_coin", async move {
                if let Err(err) = engine.disable_coin(ticker.as_str()).await {
                    tracing::warn!(%ticker, error = %err, "disable coin failed");
                }
            });
        }
        drop(self.pool().spawn_coordinator("disable_multiple", group.join()));
        self.persist_active(tickers, false)
    }

    fn persist_active(&self, tickers: &[Ticker], active: bool) -> Result<()> {
        for ticker in tickers {
            self.state().coins.update(ticker, |coin| coin.active = active);
        }
        match self.wallet_file() {
            Some(file) => file
                .set_active(tickers, active)
                .context("persist active flags"),
            None => {
                tracing::warn!("no wallet attached, active flags kept in memory only");
                Ok(())
            }
        }
    }

    /// Enables every coin flagged active, then fetches orders and swaps.
    pub async fn enable_default_coins(&self) {
        let tickers: Vec<Ticker> = self
            .active_coins()
            .into_iter()
            .map(|coin| coin.ticker)
            .collect();
        let enabled = self.batch_enable(&tickers, false).await;
        tracing::info!(
            requested = tickers.len(),
            enabled = enabled.len(),
            "default coins enabled"
        );
        self.bus().publish(Event::DefaultCoinsEnabled);

        let engine = self.clone();
        drop(self.pool().spawn("orders_swaps", async move {
            engine.process_orders().await;
            engine.process_swaps().await;
        }));
    }
}

fn classify_disable_error(ticker: &str, message: &str) -> DexError {
    if message.contains("such coin") {
        DexError::DisableUnknownCoin(ticker.to_string())
    } else if message.contains("active swaps") {
        DexError::ActiveSwapUsesCoin(ticker.to_string())
    } else if message.contains("matching orders") {
        DexError::OrderMatchingForCoin(ticker.to_string())
    } else {
        DexError::rpc("disable_coin", message)
    }
}
