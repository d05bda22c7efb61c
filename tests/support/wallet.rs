use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde_json::{Value, json};

/// KMD and BTC start active, ETH is an inactive token and RICK a test coin.
pub fn sample_coins() -> Value {
    json!({
        "KMD": {
            "name": "Komodo",
            "coinpaprika_id": "kmd-komodo",
            "electrum_urls": [{ "url": "electrum1.cipig.net:10001" }],
            "is_claimable": true,
            "active": true
        },
        "BTC": {
            "name": "Bitcoin",
            "coinpaprika_id": "btc-bitcoin",
            "electrum_urls": [{ "url": "electrum1.cipig.net:10000" }],
            "active": true
        },
        "ETH": {
            "name": "Ethereum",
            "coinpaprika_id": "eth-ethereum",
            "eth_nodes": ["http://eth1.cipig.net:8555"],
            "is_erc_20": true,
            "active": false
        },
        "RICK": {
            "name": "Rick",
            "coinpaprika_id": "test-coin",
            "electrum_urls": [{ "url": "electrum1.cipig.net:10017" }],
            "active": false
        }
    })
}

pub fn write_coins(dir: &Path, version: &str, wallet: &str, coins: &Value) -> Result<PathBuf> {
    let path = dir.join(format!("{version}-coins.{wallet}.json"));
    let data = serde_json::to_string_pretty(coins).context("encode coins")?;
    std::fs::write(&path, data).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

pub fn write_sample_coins(dir: &Path, version: &str, wallet: &str) -> Result<PathBuf> {
    write_coins(dir, version, wallet, &sample_coins())
}

pub fn read_coins(path: &Path) -> Result<Value> {
    let data = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&data).context("parse coins file")
}

pub fn is_active(coins: &Value, ticker: &str) -> bool {
    coins
        .get(ticker)
        .and_then(|c| c.get("active"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
