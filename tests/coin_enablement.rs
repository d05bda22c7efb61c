mod support;

use anyhow::{Context as _, Result};
use dex_sync::coins::wallet_file::WalletCoinsFile;
use dex_sync::events::Event;
use dex_sync::{DexError, Ticker};
use rust_decimal_macros::dec;
use serde_json::json;

use support::daemon::MockDaemon;
use support::wallet::{is_active, read_coins};
use support::{VERSION, WALLET, connected_engine, engine_with_wallet};

fn tickers(raw: &[&str]) -> Vec<Ticker> {
    raw.iter().copied().map(Ticker::new).collect()
}

#[tokio::test]
async fn default_coins_are_enabled_in_one_batch() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let daemon = MockDaemon::with(|s| {
        s.balances.insert("KMD".to_string(), "10".to_string());
    });
    let engine = engine_with_wallet(dir.path(), &daemon)?;
    let mut events = engine.events();

    engine.connect("rpc-password");
    assert!(engine.wait_started().await);
    engine.wait_idle().await;

    let enabled: Vec<String> = engine
        .enabled_coins()
        .into_iter()
        .map(|c| c.ticker.to_string())
        .collect();
    assert_eq!(enabled, vec!["BTC", "KMD"]);
    assert_eq!(daemon.read(|s| s.batch_sizes.clone()), vec![2]);
    assert_eq!(engine.balance("KMD")?, dec!(10));
    assert_eq!(engine.address("KMD")?, "addr-KMD");

    let history = engine.tx_history("KMD")?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].hash, "KMD-tx-new");
    assert_eq!(engine.tx_state("KMD")?.state, "Finished");

    let seen = events.drain();
    assert_eq!(seen.first(), Some(&Event::DaemonInitialized));
    assert!(seen.contains(&Event::DaemonStarted));
    assert!(seen.contains(&Event::DefaultCoinsEnabled));
    assert!(seen.contains(&Event::CoinEnabled(Ticker::new("KMD"))));
    assert!(!seen.contains(&Event::EnabledCoinsChanged));
    assert!(seen.contains(&Event::OrdersRefreshed));
    assert!(seen.contains(&Event::SwapsRefreshed));
    Ok(())
}

#[tokio::test]
async fn enable_coin_is_idempotent() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let daemon = MockDaemon::new();
    let engine = connected_engine(dir.path(), &daemon).await?;
    let mut events = engine.events();

    engine.enable_coin("ETH").await?;
    engine.enable_coin("ETH").await?;
    engine.wait_idle().await;

    assert_eq!(daemon.count("enable"), 1);
    assert!(engine.is_enabled("ETH"));
    assert_eq!(engine.balance("ETH")?, dec!(1));
    assert_eq!(
        daemon.read(|s| s.gets.clone()),
        vec![format!("{}/eth_tx_history/addr-ETH", engine.config().token_history_url)]
    );
    assert_eq!(engine.tx_state("ETH")?.state, "Finished");

    let seen = events.drain();
    let enabled = seen
        .iter()
        .filter(|e| **e == Event::CoinEnabled(Ticker::new("ETH")))
        .count();
    assert_eq!(enabled, 1);
    assert!(seen.contains(&Event::EnabledCoinsChanged));
    Ok(())
}

#[tokio::test]
async fn enable_rejections_are_reported() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let daemon = MockDaemon::with(|s| {
        s.fail_enable.insert("RICK".to_string());
    });
    let engine = connected_engine(dir.path(), &daemon).await?;

    assert_eq!(
        engine.enable_coin("DOGE").await,
        Err(DexError::UnknownTicker("DOGE".to_string()))
    );
    assert_eq!(
        engine.enable_coin("RICK").await,
        Err(DexError::EnableFailed("RICK".to_string()))
    );
    assert!(!engine.is_enabled("RICK"));
    Ok(())
}

#[tokio::test]
async fn queries_on_disabled_coins_fail() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let daemon = MockDaemon::new();
    let engine = connected_engine(dir.path(), &daemon).await?;

    assert_eq!(
        engine.balance("ETH"),
        Err(DexError::BalanceNotEnabled("ETH".to_string()))
    );
    assert_eq!(
        engine.tx_history("ETH"),
        Err(DexError::TxNotEnabled("ETH".to_string()))
    );
    assert_eq!(
        engine.address("ETH"),
        Err(DexError::UnknownTicker("ETH".to_string()))
    );
    assert!(engine.balance("ETH").unwrap_or_default().is_zero());

    assert_eq!(
        engine.balance("NEVER-LISTED"),
        Err(DexError::BalanceNotEnabled("NEVER-LISTED".to_string()))
    );
    assert!(engine.balance("NEVER-LISTED").unwrap_or_default().is_zero());
    assert!(Ticker::lookup("NEVER-LISTED").is_none());
    Ok(())
}

#[tokio::test]
async fn disable_keeps_coin_when_a_swap_uses_it() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let daemon = MockDaemon::with(|s| {
        s.disable_errors.insert(
            "KMD".to_string(),
            "There're active swaps using KMD".to_string(),
        );
        s.disable_errors.insert(
            "BTC".to_string(),
            "There're currently matching orders using BTC".to_string(),
        );
    });
    let engine = connected_engine(dir.path(), &daemon).await?;

    assert_eq!(
        engine.disable_coin("KMD").await,
        Err(DexError::ActiveSwapUsesCoin("KMD".to_string()))
    );
    assert_eq!(
        engine.disable_coin("BTC").await,
        Err(DexError::OrderMatchingForCoin("BTC".to_string()))
    );
    assert!(engine.is_enabled("KMD"));
    assert!(engine.balance("KMD").is_ok());
    Ok(())
}

#[tokio::test]
async fn disable_drops_balance_and_history() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let daemon = MockDaemon::new();
    let engine = connected_engine(dir.path(), &daemon).await?;
    let mut events = engine.events();

    engine.disable_coin("KMD").await?;
    engine.disable_coin("KMD").await?;

    assert_eq!(daemon.count("disable_coin"), 1);
    assert!(!engine.is_enabled("KMD"));
    assert!(engine.balance("KMD").is_err());
    assert!(engine.tx_history("KMD").is_err());
    assert!(engine.tx_state("KMD").is_err());
    assert_eq!(
        events.drain(),
        vec![Event::CoinDisabled(Ticker::new("KMD"))]
    );
    Ok(())
}

#[tokio::test]
async fn batch_enable_persists_active_even_for_refused_coins() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let daemon = MockDaemon::with(|s| {
        s.fail_enable.insert("RICK".to_string());
    });
    let engine = connected_engine(dir.path(), &daemon).await?;

    engine.enable_multiple(&tickers(&["ETH", "RICK"]))?;
    engine.wait_idle().await;

    assert!(engine.is_enabled("ETH"));
    assert!(!engine.is_enabled("RICK"));
    assert!(engine.coin_info("RICK").context("RICK known")?.active);

    let file = WalletCoinsFile::open(dir.path(), VERSION, None, WALLET)?;
    let coins = read_coins(file.path())?;
    assert!(is_active(&coins, "ETH"));
    assert!(is_active(&coins, "RICK"));

    let active: Vec<String> = engine
        .active_coins()
        .into_iter()
        .map(|c| c.ticker.to_string())
        .collect();
    assert_eq!(active, vec!["BTC", "ETH", "KMD", "RICK"]);
    assert_eq!(
        engine
            .enableable_coins()
            .into_iter()
            .map(|c| c.ticker.to_string())
            .collect::<Vec<_>>(),
        vec!["RICK"]
    );
    Ok(())
}

#[tokio::test]
async fn disable_multiple_clears_active_flags() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let daemon = MockDaemon::new();
    let engine = connected_engine(dir.path(), &daemon).await?;

    engine.disable_multiple(&tickers(&["KMD", "BTC"]))?;
    engine.wait_idle().await;

    assert!(engine.enabled_coins().is_empty());
    let file = WalletCoinsFile::open(dir.path(), VERSION, None, WALLET)?;
    let coins = read_coins(file.path())?;
    assert!(!is_active(&coins, "KMD"));
    assert!(!is_active(&coins, "BTC"));
    assert_eq!(daemon.count("disable_coin"), 2);
    Ok(())
}

#[tokio::test]
async fn privacy_mode_scales_displayed_balance() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let daemon = MockDaemon::with(|s| {
        s.balances.insert("KMD".to_string(), "10".to_string());
    });
    let engine = engine_with_wallet(dir.path(), &daemon)?;
    engine.set_privacy_mode(true);
    engine.connect("rpc-password");
    assert!(engine.wait_started().await);
    engine.wait_idle().await;

    assert!(engine.is_privacy_mode());
    assert_eq!(engine.balance("KMD")?, dec!(1.0));

    engine.decrease_privacy_balance("KMD", dec!(0.25))?;
    assert_eq!(engine.balance("KMD")?, dec!(0.75));

    engine.decrease_privacy_balance("KMD", dec!(5))?;
    assert!(engine.balance("KMD")?.is_zero());

    engine.refresh_infos(true).await;
    assert!(engine.balance("KMD")?.is_zero());

    engine.reset_privacy_balance("BTC")?;
    assert!(engine.balance("BTC")?.is_zero());

    engine.set_privacy_mode(false);
    engine.refresh_infos(true).await;
    assert_eq!(engine.balance("KMD")?, dec!(10));
    engine.reset_privacy_balance("KMD")?;
    engine.decrease_privacy_balance("KMD", dec!(3))?;
    assert_eq!(engine.balance("KMD")?, dec!(10));
    assert_eq!(
        engine.reset_privacy_balance("ETH"),
        Err(DexError::BalanceNotEnabled("ETH".to_string()))
    );
    Ok(())
}

#[tokio::test]
async fn missing_answer_fields_default_to_empty() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let daemon = MockDaemon::with(|s| {
        s.overrides
            .insert("my_balance".to_string(), json!({ "coin": "KMD" }));
        s.overrides.insert(
            "my_tx_history".to_string(),
            json!({
                "result": {
                    "transactions": [{ "tx_hash": "bare" }],
                    "sync_status": { "state": "InProgress" }
                }
            }),
        );
    });
    let engine = connected_engine(dir.path(), &daemon).await?;

    assert!(engine.balance("KMD")?.is_zero());
    assert_eq!(engine.address("KMD")?, "");

    let history = engine.tx_history("KMD")?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].hash, "bare");
    assert!(history[0].amount.is_zero());
    assert!(history[0].fee.is_zero());
    assert_eq!(history[0].confirmations, 0);

    let state = engine.tx_state("KMD")?;
    assert_eq!(state.state, "InProgress");
    assert_eq!(state.current_block, 0);
    assert_eq!(state.blocks_left, 0);
    assert_eq!(state.transactions_left, 0);
    Ok(())
}

#[tokio::test]
async fn token_history_is_not_refetched_on_refresh() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let daemon = MockDaemon::new();
    let engine = connected_engine(dir.path(), &daemon).await?;

    engine.enable_coin("ETH").await?;
    engine.wait_idle().await;
    assert_eq!(daemon.read(|s| s.gets.len()), 1);

    let eth = Ticker::new("ETH");
    engine.process_tx(&eth, true).await;
    engine.refresh_infos(true).await;
    assert_eq!(daemon.read(|s| s.gets.len()), 1);
    assert_eq!(engine.tx_history("ETH")?.len(), 1);

    engine.process_tx(&eth, false).await;
    assert_eq!(daemon.read(|s| s.gets.len()), 2);
    Ok(())
}
