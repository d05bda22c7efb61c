mod enable;
mod scheduler;
mod sync;
mod trade;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{Context as _, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub use scheduler::TickReport;

use crate::coins::CoinConfig;
use crate::coins::wallet_file::WalletCoinsFile;
use crate::config::EngineConfig;
use crate::error::DexError;
use crate::events::{Event, EventBus, Subscription};
use crate::pool::WorkerPool;
use crate::rpc::http::HttpTransport;
use crate::rpc::{RpcClient, Transport};
use crate::state::Registries;
use crate::state::model::{
    ActivePair, BalanceInfo, MaxTakerVolumePair, OrderbookSnapshot, OrdersSnapshot, SwapsSnapshot,
    TradeFeeInfo, TxInfo, TxSyncState, pair_key,
};
use crate::supervisor::{self, DaemonConfig, DaemonProcess};
use crate::ticker::Ticker;

const MAX_TAKER_VOL_DECIMALS: u32 = 8;

/// Client-side view of one trading daemon. Cheap to clone; every clone
/// shares the same registries, pool and bus.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    cfg: EngineConfig,
    rpc: RpcClient,
    bus: EventBus,
    pool: WorkerPool,
    state: Registries,
    wallet: RwLock<Option<Arc<WalletCoinsFile>>>,
    running: AtomicBool,
    orderbook_active: AtomicBool,
    balance_factor: RwLock<Decimal>,
    clocks: Mutex<Clocks>,
    daemon: tokio::sync::Mutex<Option<DaemonProcess>>,
    liveness: Mutex<Option<JoinHandle<bool>>>,
}

struct Clocks {
    orderbook: Instant,
    info: Instant,
}

impl Engine {
    /// Binds the engine to the current Tokio runtime. Panics outside of one;
    /// use [`Engine::with_runtime`] there.
    pub fn new(cfg: EngineConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_runtime(cfg, transport, Handle::current())
    }

    /// Engine whose background work runs on `runtime`. The synchronous
    /// methods (`tick`, `connect`, `set_current_orderbook`, ...) may then be
    /// called from any thread.
    pub fn with_runtime(cfg: EngineConfig, transport: Arc<dyn Transport>, runtime: Handle) -> Self {
        let rpc = RpcClient::new(transport, cfg.retry);
        let now = Instant::now();
        Self {
            inner: Arc::new(EngineInner {
                rpc,
                bus: EventBus::new(cfg.event_capacity),
                pool: WorkerPool::new(cfg.workers, runtime),
                state: Registries::default(),
                wallet: RwLock::new(None),
                running: AtomicBool::new(false),
                orderbook_active: AtomicBool::new(false),
                balance_factor: RwLock::new(Decimal::ONE),
                clocks: Mutex::new(Clocks {
                    orderbook: now,
                    info: now,
                }),
                daemon: tokio::sync::Mutex::new(None),
                liveness: Mutex::new(None),
                cfg,
            }),
        }
    }

    pub fn with_http(cfg: EngineConfig) -> Result<Self> {
        let transport = HttpTransport::new(cfg.rpc_url.clone(), cfg.rpc_timeout)
            .context("create daemon transport")?;
        Ok(Self::new(cfg, Arc::new(transport)))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.cfg
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.inner.rpc
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn events(&self) -> Subscription {
        self.inner.bus.subscribe()
    }

    pub(crate) fn state(&self) -> &Registries {
        &self.inner.state
    }

    pub(crate) fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    /// Loads the wallet's coin configuration. Every coin starts disabled.
    pub fn attach_wallet(&self, wallet: &str) -> Result<()> {
        let cfg = &self.inner.cfg;
        std::fs::create_dir_all(&cfg.config_dir)
            .with_context(|| format!("create config dir {}", cfg.config_dir.display()))?;
        let file = WalletCoinsFile::open(
            &cfg.config_dir,
            &cfg.version,
            cfg.previous_version.as_deref(),
            wallet,
        )
        .with_context(|| format!("open coins file for wallet {wallet}"))?;
        let coins = file.load().context("load wallet coins")?;

        tracing::info!(
            wallet,
            path = %file.path().display(),
            coins = coins.len(),
            "wallet coins loaded"
        );
        self.inner.state.coins.clear();
        for (ticker, coin) in coins {
            self.inner.state.coins.insert_or_assign(ticker, coin);
        }
        *self.inner.wallet.write().expect("wallet lock poisoned") = Some(Arc::new(file));
        Ok(())
    }

    pub(crate) fn wallet_file(&self) -> Option<Arc<WalletCoinsFile>> {
        self.inner.wallet.read().expect("wallet lock poisoned").clone()
    }

    pub fn set_privacy_mode(&self, enabled: bool) {
        let factor = if enabled {
            self.inner.cfg.privacy_factor
        } else {
            Decimal::ONE
        };
        tracing::debug!(%factor, "balance factor set");
        *self
            .inner
            .balance_factor
            .write()
            .expect("balance factor lock poisoned") = factor;
    }

    pub fn balance_factor(&self) -> Decimal {
        *self
            .inner
            .balance_factor
            .read()
            .expect("balance factor lock poisoned")
    }

    pub fn is_privacy_mode(&self) -> bool {
        self.balance_factor() != Decimal::ONE
    }

    /// Launches the daemon for `wallet` and starts polling it for liveness.
    /// Returns once the process is spawned; readiness is reported through
    /// `Event::DaemonStarted`.
    pub async fn spawn(&self, wallet: &str, passphrase: &str, privacy: bool) -> Result<()> {
        self.set_privacy_mode(privacy);
        self.attach_wallet(wallet)?;

        let settings = &self.inner.cfg.daemon;
        let daemon_cfg = DaemonConfig::new(settings, passphrase);
        self.inner.rpc.set_userpass(daemon_cfg.rpc_password.clone());

        let process = DaemonProcess::launch(settings, &daemon_cfg)
            .await
            .context("launch daemon")?;
        *self.inner.daemon.lock().await = Some(process);

        self.start_liveness(Some(settings.config_path.clone()));
        Ok(())
    }

    /// Targets a daemon that is already running (or started by someone
    /// else) and starts the liveness poll against it.
    pub fn connect(&self, rpc_password: &str) {
        self.inner.rpc.set_userpass(rpc_password);
        self.start_liveness(None);
    }

    fn start_liveness(&self, config_path: Option<std::path::PathBuf>) {
        let engine = self.clone();
        let handle = self.inner.pool.runtime().spawn(async move {
            let cfg = &engine.inner.cfg;
            let alive = supervisor::wait_alive(
                &engine.inner.rpc,
                cfg.liveness_interval,
                cfg.liveness_attempts,
            )
            .await;

            if let Some(path) = &config_path {
                match tokio::fs::remove_file(path).await {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = %err, "remove daemon config failed")
                    }
                }
            }

            match alive {
                Ok(_) => {
                    engine.on_daemon_ready().await;
                    true
                }
                Err(err) => {
                    tracing::error!(error = %format!("{err:#}"), "daemon did not start");
                    false
                }
            }
        });

        if let Some(previous) = self
            .inner
            .liveness
            .lock()
            .expect("liveness mutex poisoned")
            .replace(handle)
        {
            previous.abort();
        }
    }

    async fn on_daemon_ready(&self) {
        tracing::info!("daemon is initialized");
        self.inner.bus.publish(Event::DaemonInitialized);
        self.inner.running.store(true, Ordering::Release);
        self.inner.bus.publish(Event::DaemonStarted);
        self.enable_default_coins().await;
    }

    /// Waits for the pending liveness poll. Returns whether the daemon came
    /// up; false when no poll was started.
    pub async fn wait_started(&self) -> bool {
        let handle = self
            .inner
            .liveness
            .lock()
            .expect("liveness mutex poisoned")
            .take();
        match handle {
            Some(handle) => handle.await.unwrap_or(false),
            None => self.is_running(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Stops the daemon, joins the liveness poll and drains the pool.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.running.store(false, Ordering::Release);
        let timeouts = self.inner.cfg.shutdown;

        let daemon = self.inner.daemon.lock().await.take();
        let stopped = match daemon {
            Some(process) => process.shutdown(&self.inner.rpc, timeouts).await,
            None => Ok(()),
        };

        let liveness = self
            .inner
            .liveness
            .lock()
            .expect("liveness mutex poisoned")
            .take();
        if let Some(handle) = liveness
            && let Err(err) = handle.await
        {
            tracing::warn!(error = %err, "liveness task join error");
        }

        self.inner.pool.shutdown(timeouts.wait).await;
        stopped
    }

    pub async fn wait_idle(&self) {
        self.inner.pool.wait_idle().await;
    }

    pub fn all_coins(&self) -> Vec<CoinConfig> {
        self.coins_where(|_| true)
    }

    pub fn enabled_coins(&self) -> Vec<CoinConfig> {
        self.coins_where(|c| c.currently_enabled)
    }

    pub fn enableable_coins(&self) -> Vec<CoinConfig> {
        self.coins_where(|c| !c.currently_enabled)
    }

    pub fn active_coins(&self) -> Vec<CoinConfig> {
        self.coins_where(|c| c.active)
    }

    fn coins_where(&self, keep: impl Fn(&CoinConfig) -> bool) -> Vec<CoinConfig> {
        let mut out: Vec<CoinConfig> = self
            .inner
            .state
            .coins
            .values()
            .into_iter()
            .filter(|c| keep(c))
            .collect();
        out.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        out
    }

    pub fn coin_info(&self, ticker: &str) -> Option<CoinConfig> {
        self.inner.state.coins.get(ticker)
    }

    pub fn is_enabled(&self, ticker: &str) -> bool {
        self.coin_info(ticker)
            .is_some_and(|coin| coin.currently_enabled)
    }

    /// Displayed balance: the stored balance times the balance factor.
    pub fn balance(&self, ticker: &str) -> Result<Decimal, DexError> {
        let info = self
            .inner
            .state
            .balances
            .get(ticker)
            .ok_or_else(|| DexError::BalanceNotEnabled(ticker.to_string()))?;
        Ok(info.balance * self.balance_factor())
    }

    pub fn address(&self, ticker: &str) -> Result<String, DexError> {
        self.inner
            .state
            .balances
            .get(ticker)
            .map(|info| info.address)
            .ok_or_else(|| DexError::UnknownTicker(ticker.to_string()))
    }

    pub fn tx_history(&self, ticker: &str) -> Result<Vec<TxInfo>, DexError> {
        self.inner
            .state
            .transactions
            .get(ticker)
            .ok_or_else(|| DexError::TxNotEnabled(ticker.to_string()))
    }

    pub fn tx_state(&self, ticker: &str) -> Result<TxSyncState, DexError> {
        self.inner
            .state
            .tx_state
            .get(ticker)
            .ok_or_else(|| DexError::TxNotEnabled(ticker.to_string()))
    }

    pub fn current_pair(&self) -> Option<ActivePair> {
        self.inner.state.pair_state().pair
    }

    /// Snapshot for the watched pair.
    pub fn orderbook(&self) -> Result<OrderbookSnapshot, DexError> {
        let key = self
            .current_pair()
            .map(|pair| pair.key())
            .unwrap_or_default();
        self.orderbook_by_key(&key)
    }

    pub fn orderbook_for(&self, base: &str, rel: &str) -> Result<OrderbookSnapshot, DexError> {
        self.orderbook_by_key(&pair_key(base, rel))
    }

    fn orderbook_by_key(&self, key: &str) -> Result<OrderbookSnapshot, DexError> {
        let books = &self.inner.state.orderbooks;
        if books.is_empty() {
            return Err(DexError::OrderbookEmpty);
        }
        books
            .get(key)
            .ok_or_else(|| DexError::OrderbookPairNotFound(key.to_string()))
    }

    /// Max taker volumes for the watched pair, scaled by the balance factor
    /// and cut to 8 decimals.
    pub fn max_taker_vol(&self) -> MaxTakerVolumePair {
        let raw = self.inner.state.pair_state().max_taker_vol;
        let factor = self.balance_factor();
        let scale = |v: Decimal| {
            (v * factor)
                .round_dp_with_strategy(MAX_TAKER_VOL_DECIMALS, RoundingStrategy::ToZero)
        };
        MaxTakerVolumePair {
            base: scale(raw.base),
            rel: scale(raw.rel),
        }
    }

    pub fn trade_fixed_fee(&self, ticker: &str) -> TradeFeeInfo {
        self.inner
            .state
            .trade_fees
            .get(ticker)
            .unwrap_or_default()
    }

    pub fn orders(&self) -> Result<OrdersSnapshot, DexError> {
        self.inner
            .state
            .orders
            .get()
            .ok_or(DexError::OrdersNotAvailable)
    }

    pub fn orders_for(&self, ticker: &str) -> Result<OrdersSnapshot, DexError> {
        self.inner
            .state
            .orders
            .read(|orders| orders.map(|o| o.filtered(ticker)))
            .ok_or(DexError::OrdersNotAvailable)
    }

    /// One filtered view per enabled coin, in ticker order.
    pub fn orders_for_enabled(&self) -> Result<Vec<OrdersSnapshot>, DexError> {
        self.enabled_coins()
            .iter()
            .map(|coin| self.orders_for(coin.ticker.as_str()))
            .collect()
    }

    pub fn swaps(&self) -> SwapsSnapshot {
        self.inner.state.swaps.get().unwrap_or_default()
    }

    /// Privacy mode only: zeroes the displayed balance of `ticker`. Outside
    /// privacy mode the stored balance is left alone.
    pub fn reset_privacy_balance(&self, ticker: &str) -> Result<(), DexError> {
        self.edit_privacy_balance(ticker, |_, info| info.balance = Decimal::ZERO)
    }

    /// Privacy mode only: lowers the displayed balance by `amount`, never
    /// below zero.
    pub fn decrease_privacy_balance(&self, ticker: &str, amount: Decimal) -> Result<(), DexError> {
        self.edit_privacy_balance(ticker, |factor, info| {
            let shown = info.balance * factor - amount;
            info.balance = if shown.is_sign_negative() || factor.is_zero() {
                Decimal::ZERO
            } else {
                shown / factor
            };
        })
    }

    fn edit_privacy_balance(
        &self,
        ticker: &str,
        edit: impl FnOnce(Decimal, &mut BalanceInfo),
    ) -> Result<(), DexError> {
        let balances = &self.inner.state.balances;
        let Some(key) = Ticker::lookup(ticker).filter(|key| balances.contains(key)) else {
            return Err(DexError::BalanceNotEnabled(ticker.to_string()));
        };
        if !self.is_privacy_mode() {
            tracing::debug!(%ticker, "privacy mode off, balance kept");
            return Ok(());
        }
        let factor = self.balance_factor();
        if balances.update(&key, |info| edit(factor, info)) {
            self.inner.bus.publish(Event::BalanceUpdated(key));
        }
        Ok(())
    }
}
