use rust_decimal::Decimal;
use serde_json::{Value, json};
use uuid::Uuid;

use super::Engine;
use crate::coins::CoinKind;
use crate::error::DexError;
use crate::rpc::Answer;
use crate::rpc::types::{BroadcastAnswer, TradeAnswer, TradeRequest, WithdrawAnswer, WithdrawRequest};

const TRADE_FEE_DIVISOR: Decimal = Decimal::from_parts(777, 0, 0, false, 0);
const UTXO_SHORTFALL: &str = "Not sufficient balance. Couldn't collect enough value from utxos";
const UTXO_SHORTFALL_HINT: &str = "Not enough funds to cover txfee, please reduce amount.";

impl Engine {
    async fn call_checked(&self, method: &'static str, params: Value) -> Result<Answer, DexError> {
        let answer = self
            .rpc()
            .call(method, params)
            .await
            .map_err(|err| DexError::rpc(method, format!("{err:#}")))?;
        match answer.error_message() {
            Some(message) => {
                tracing::warn!(method, error = %message, "rpc rejected");
                Err(DexError::rpc(method, message))
            }
            None => Ok(answer),
        }
    }

    /// Compares against the displayed balance.
    pub fn has_enough_funds(&self, ticker: &str, amount: Decimal) -> bool {
        self.balance(ticker).unwrap_or_default() >= amount
    }

    /// Buys `volume` of base paying in rel; `total` must be covered by the
    /// rel balance.
    pub async fn place_buy_order(
        &self,
        req: TradeRequest,
        total: Decimal,
    ) -> Result<TradeAnswer, DexError> {
        if !self.has_enough_funds(&req.rel, total) {
            return Err(DexError::InsufficientFunds(req.rel));
        }
        self.place_order("buy", req).await
    }

    /// Sells `volume` of base; `total` must be covered by the base balance.
    pub async fn place_sell_order(
        &self,
        req: TradeRequest,
        total: Decimal,
    ) -> Result<TradeAnswer, DexError> {
        if !self.has_enough_funds(&req.base, total) {
            return Err(DexError::InsufficientFunds(req.base));
        }
        self.place_order("sell", req).await
    }

    async fn place_order(&self, method: &'static str, req: TradeRequest) -> Result<TradeAnswer, DexError> {
        let params = serde_json::to_value(&req).map_err(|err| DexError::rpc(method, err.to_string()))?;
        let answer = self.call_checked(method, params).await?;
        let result = answer.body.get("result").cloned().unwrap_or(Value::Null);
        let trade = TradeAnswer::from_result(result);
        tracing::info!(method, base = %req.base, rel = %req.rel, uuid = ?trade.uuid, "order placed");
        Ok(trade)
    }

    pub async fn withdraw(&self, req: WithdrawRequest) -> Result<WithdrawAnswer, DexError> {
        let params =
            serde_json::to_value(&req).map_err(|err| DexError::rpc("withdraw", err.to_string()))?;
        let resp = self
            .rpc()
            .call("withdraw", params)
            .await
            .map_err(|err| DexError::rpc("withdraw", format!("{err:#}")))?;
        let rejected = resp.error_message();

        let mut answer = WithdrawAnswer::from_body(resp.body);
        answer.error = rejected;
        if answer.raw.to_string().contains(UTXO_SHORTFALL) {
            answer.error = Some(UTXO_SHORTFALL_HINT.to_string());
        }
        if let Some(message) = answer.error.take() {
            tracing::warn!(coin = %req.coin, error = %message, "withdraw rejected");
            return Err(DexError::rpc("withdraw", message));
        }
        Ok(answer)
    }

    /// Broadcasts a signed transaction. Token hashes are returned `0x`
    /// prefixed.
    pub async fn broadcast(&self, coin: &str, tx_hex: &str) -> Result<BroadcastAnswer, DexError> {
        let answer = self
            .call_checked(
                "send_raw_transaction",
                json!({ "coin": coin, "tx_hex": tx_hex }),
            )
            .await?;
        let mut tx_hash = answer
            .body
            .get("tx_hash")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if self
            .coin_info(coin)
            .is_some_and(|c| c.kind() == CoinKind::Token)
        {
            tx_hash = format!("0x{tx_hash}");
        }
        tracing::info!(%coin, %tx_hash, "transaction broadcast");
        Ok(BroadcastAnswer { tx_hash })
    }

    /// Withdraws the whole claimable balance to our own address and returns
    /// the withdraw answer next to the current rewards info.
    pub async fn claim_rewards(&self, ticker: &str) -> Result<Value, DexError> {
        let coin = self
            .coin_info(ticker)
            .ok_or_else(|| DexError::UnknownTicker(ticker.to_string()))?;
        if !coin.is_claimable {
            return Err(DexError::NotClaimable(ticker.to_string()));
        }
        let address = self
            .state()
            .balances
            .get(ticker)
            .map(|info| info.address)
            .ok_or_else(|| DexError::BalanceNotEnabled(ticker.to_string()))?;

        let withdraw = self
            .withdraw(WithdrawRequest {
                coin: ticker.to_string(),
                to: address,
                amount: Decimal::ZERO,
                max: true,
            })
            .await?;
        let rewards = self.call_checked("kmd_rewards_info", Value::Null).await?;

        Ok(json!({
            "withdraw_answer": withdraw.raw,
            "kmd_rewards_info": rewards.body.get("result").cloned().unwrap_or(Value::Null),
        }))
    }

    pub async fn send_rewards(&self, coin: &str, tx_hex: &str) -> Result<BroadcastAnswer, DexError> {
        self.broadcast(coin, tx_hex).await
    }

    pub async fn cancel_order(&self, uuid: Uuid) -> Result<(), DexError> {
        self.call_checked("cancel_order", json!({ "uuid": uuid }))
            .await?;
        self.refresh_orders_later();
        Ok(())
    }

    pub async fn cancel_all_orders(&self) -> Result<(), DexError> {
        self.call_checked("cancel_all_orders", json!({ "cancel_by": { "type": "All" } }))
            .await?;
        self.refresh_orders_later();
        Ok(())
    }

    pub async fn cancel_all_orders_by_ticker(&self, ticker: &str) -> Result<(), DexError> {
        self.call_checked(
            "cancel_all_orders",
            json!({ "cancel_by": { "type": "Coin", "data": { "ticker": ticker } } }),
        )
        .await?;
        self.refresh_orders_later();
        Ok(())
    }

    fn refresh_orders_later(&self) {
        let engine = self.clone();
        drop(self.pool().spawn("orders", async move {
            engine.process_orders().await;
        }));
    }

    /// Dex fee for selling `amount` (or the whole balance when `is_max`).
    pub fn trade_fee(&self, ticker: &str, amount: Decimal, is_max: bool) -> Decimal {
        let amount = if is_max {
            self.balance(ticker).unwrap_or_default()
        } else {
            amount
        };
        amount / TRADE_FEE_DIVISOR
    }

    pub fn trade_fee_str(&self, ticker: &str, amount: Decimal, is_max: bool) -> String {
        let fee = self.trade_fee(ticker, amount, is_max).round_dp(8);
        format!("{fee:.8}")
    }

    /// Adds the cached network fee of token coins to `value`.
    pub fn apply_token_fees(&self, ticker: &str, value: Decimal) -> Decimal {
        match self.coin_info(ticker) {
            Some(coin) if coin.kind() == CoinKind::Token => {
                let fee = self.trade_fixed_fee(ticker).amount;
                tracing::debug!(%ticker, %fee, "adding token fees");
                value + fee
            }
            _ => value,
        }
    }
}
