#![allow(dead_code)]

pub mod daemon;
pub mod wait;
pub mod wallet;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use dex_sync::Engine;
use dex_sync::config::EngineConfig;
use dex_sync::rpc::RetryPolicy;

use daemon::MockDaemon;

pub const WALLET: &str = "alice";
pub const VERSION: &str = "1.0";

pub fn test_config(dir: &Path) -> EngineConfig {
    let mut cfg = EngineConfig {
        config_dir: dir.to_path_buf(),
        version: VERSION.to_string(),
        liveness_interval: Duration::from_millis(10),
        liveness_attempts: 5,
        retry: RetryPolicy {
            backoff: Duration::from_millis(10),
            max_attempts: 5,
        },
        ..EngineConfig::default()
    };
    cfg.daemon.config_path = dir.join("MM2.json");
    cfg
}

/// Engine over a mock daemon with the sample wallet attached, not yet
/// connected.
pub fn engine_with_wallet(dir: &Path, daemon: &Arc<MockDaemon>) -> Result<Engine> {
    wallet::write_sample_coins(dir, VERSION, WALLET)?;
    let engine = Engine::new(test_config(dir), daemon.clone());
    engine.attach_wallet(WALLET).context("attach wallet")?;
    Ok(engine)
}

/// Connects to the mock daemon and waits until the default coins and their
/// first balances are in.
pub async fn connected_engine(dir: &Path, daemon: &Arc<MockDaemon>) -> Result<Engine> {
    let engine = engine_with_wallet(dir, daemon)?;
    engine.connect("rpc-password");
    anyhow::ensure!(engine.wait_started().await, "mock daemon did not start");
    engine.wait_idle().await;
    Ok(engine)
}
