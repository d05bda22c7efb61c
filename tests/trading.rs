mod support;

use anyhow::{Context as _, Result};
use dex_sync::DexError;
use dex_sync::rpc::types::{TradeRequest, WithdrawRequest};
use rust_decimal_macros::dec;
use uuid::Uuid;

use support::daemon::{MockDaemon, ORDER_UUID, TRADE_UUID};
use support::connected_engine;

fn funded_daemon() -> std::sync::Arc<MockDaemon> {
    MockDaemon::with(|s| {
        s.balances.insert("KMD".to_string(), "10".to_string());
        s.balances.insert("BTC".to_string(), "0.1".to_string());
    })
}

fn kmd_btc(volume: rust_decimal::Decimal) -> TradeRequest {
    TradeRequest {
        base: "KMD".to_string(),
        rel: "BTC".to_string(),
        price: dec!(0.0001),
        volume,
    }
}

#[tokio::test]
async fn orders_need_enough_funds() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let daemon = funded_daemon();
    let engine = connected_engine(dir.path(), &daemon).await?;

    assert_eq!(
        engine.place_sell_order(kmd_btc(dec!(20)), dec!(20)).await,
        Err(DexError::InsufficientFunds("KMD".to_string()))
    );
    assert_eq!(daemon.count("sell"), 0);

    let trade = engine.place_buy_order(kmd_btc(dec!(5)), dec!(0.0005)).await?;
    assert_eq!(trade.uuid, Some(Uuid::parse_str(TRADE_UUID)?));
    assert_eq!(trade.result["base"], "KMD");

    assert!(engine.has_enough_funds("BTC", dec!(0.1)));
    assert!(!engine.has_enough_funds("ETH", dec!(0.1)));
    Ok(())
}

#[tokio::test]
async fn withdraw_shortfall_is_rewritten() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let daemon = MockDaemon::with(|s| {
        s.withdraw_error = Some(
            "withdraw:123] Not sufficient balance. Couldn't collect enough value from utxos [..]"
                .to_string(),
        );
    });
    let engine = connected_engine(dir.path(), &daemon).await?;

    let err = engine
        .withdraw(WithdrawRequest {
            coin: "KMD".to_string(),
            to: "RXL3YXG2ceaB6C5hfJcN4fvmLH2C34knhA".to_string(),
            amount: dec!(1),
            max: false,
        })
        .await
        .expect_err("withdraw should fail");
    assert_eq!(
        err,
        DexError::Rpc {
            method: "withdraw",
            message: "Not enough funds to cover txfee, please reduce amount.".to_string(),
        }
    );
    Ok(())
}

#[tokio::test]
async fn withdraw_then_broadcast() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let daemon = funded_daemon();
    let engine = connected_engine(dir.path(), &daemon).await?;

    let answer = engine
        .withdraw(WithdrawRequest {
            coin: "KMD".to_string(),
            to: "RXL3YXG2ceaB6C5hfJcN4fvmLH2C34knhA".to_string(),
            amount: dec!(1),
            max: false,
        })
        .await?;
    assert_eq!(answer.tx_hex, "0400008085202f89");
    assert!(answer.error.is_none());

    let sent = engine.broadcast("KMD", &answer.tx_hex).await?;
    assert_eq!(sent.tx_hash, "feedbeef");

    let sent = engine.broadcast("ETH", "f86b").await?;
    assert_eq!(sent.tx_hash, "0xfeedbeef");
    Ok(())
}

#[tokio::test]
async fn rewards_are_claimed_to_own_address() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let daemon = funded_daemon();
    let engine = connected_engine(dir.path(), &daemon).await?;

    assert_eq!(
        engine.claim_rewards("BTC").await,
        Err(DexError::NotClaimable("BTC".to_string()))
    );

    let claimed = engine.claim_rewards("KMD").await?;
    assert_eq!(claimed["withdraw_answer"]["tx_hash"], "b1c2d3");
    assert!(claimed["kmd_rewards_info"].is_array());

    let payload = daemon
        .read(|s| s.last_payload.clone())
        .context("payload recorded")?;
    assert_eq!(payload["method"], "kmd_rewards_info");
    assert_eq!(daemon.count("withdraw"), 1);
    Ok(())
}

#[tokio::test]
async fn trade_fee_is_a_fixed_share() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let daemon = funded_daemon();
    let engine = connected_engine(dir.path(), &daemon).await?;

    assert_eq!(engine.trade_fee("KMD", dec!(7.77), false), dec!(0.01));
    assert_eq!(engine.trade_fee_str("KMD", dec!(7.77), false), "0.01000000");
    assert_eq!(engine.trade_fee_str("KMD", dec!(0), true), "0.01287001");
    assert_eq!(engine.apply_token_fees("KMD", dec!(1)), dec!(1));
    Ok(())
}

#[tokio::test]
async fn cancelling_refreshes_orders() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let daemon = MockDaemon::new();
    let engine = connected_engine(dir.path(), &daemon).await?;
    assert_eq!(daemon.count("my_orders"), 1);

    engine.cancel_order(Uuid::parse_str(ORDER_UUID)?).await?;
    engine.wait_idle().await;
    assert_eq!(daemon.count("cancel_order"), 1);
    assert_eq!(daemon.count("my_orders"), 2);

    engine.cancel_all_orders_by_ticker("KMD").await?;
    engine.wait_idle().await;
    let payload = daemon
        .read(|s| s.last_payload.clone())
        .context("payload recorded")?;
    assert_eq!(payload["method"], "my_orders");
    assert_eq!(daemon.count("cancel_all_orders"), 1);

    engine.cancel_all_orders().await?;
    engine.wait_idle().await;
    assert_eq!(daemon.count("cancel_all_orders"), 2);
    assert_eq!(daemon.count("my_orders"), 4);
    Ok(())
}
