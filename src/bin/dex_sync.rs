use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Parser as _;
use dex_sync::Engine;
use dex_sync::config::{DEFAULT_RPC_URL, EngineConfig};
use dex_sync::events::Event;
use dex_sync::fiat::{FiatConfig, FiatRateProvider};

#[derive(Debug, clap::Parser)]
struct Args {
    #[arg(long)]
    wallet: String,

    #[arg(long, env = "DEX_SYNC_PASSPHRASE", hide_env_values = true)]
    passphrase: String,

    #[arg(long, default_value = "mm2")]
    daemon_bin: PathBuf,

    #[arg(long)]
    daemon_dir: Option<PathBuf>,

    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_RPC_URL)]
    rpc_url: String,

    #[arg(long)]
    previous_version: Option<String>,

    #[arg(long, default_value_t = false)]
    privacy: bool,

    #[arg(long, default_value_t = 1000)]
    tick_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dex_sync::logging::init().ok();
    let args = Args::parse();

    let mut cfg = EngineConfig {
        rpc_url: args.rpc_url,
        config_dir: args.config_dir,
        previous_version: args.previous_version,
        ..EngineConfig::default()
    };
    cfg.daemon.binary = args.daemon_bin;
    cfg.daemon.working_dir = args.daemon_dir;

    let engine = Engine::with_http(cfg).context("create engine")?;
    let fiat = FiatRateProvider::with_http(FiatConfig::default(), engine.clone())
        .context("create fiat provider")?;
    let listener = fiat.start();
    let mut events = engine.events();

    engine
        .spawn(&args.wallet, &args.passphrase, args.privacy)
        .await
        .context("spawn daemon")?;

    let mut ticker = tokio::time::interval(Duration::from_millis(args.tick_ms.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            res = &mut shutdown => {
                res.context("listen for ctrl-c")?;
                tracing::info!("ctrl-c received, shutting down");
                break;
            }
            _ = ticker.tick() => {
                engine.tick();
            }
            event = events.recv() => match event {
                Some(Event::DefaultCoinsEnabled) => {
                    tracing::info!(coins = engine.enabled_coins().len(), "default coins enabled");
                }
                Some(Event::CoinFullyInitialized(ticker)) => {
                    let usd = fiat.price_in_fiat("USD", ticker.as_str()).unwrap_or_default();
                    tracing::info!(%ticker, usd = %usd, "coin ready");
                }
                Some(_) => {}
                None => break,
            },
        }
    }

    fiat.stop().await;
    if let Err(err) = listener.await {
        tracing::warn!(error = %err, "fiat listener join error");
    }
    engine.shutdown().await.context("shutdown engine")?;
    Ok(())
}
