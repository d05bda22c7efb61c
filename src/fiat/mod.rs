pub mod source;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context as _, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::coins::CoinConfig;
use crate::engine::Engine;
use crate::error::DexError;
use crate::events::Event;
use crate::pool::WorkerPool;
use crate::rpc::RetryPolicy;
use crate::rpc::http::HttpTransport;
use crate::state::model::TxInfo;
use crate::state::{Registry, Slot};
use crate::ticker::Ticker;
use source::{DEFAULT_FIAT_RATES_URL, DEFAULT_PAPRIKA_URL, PaprikaClient, RateSource};

const FIAT_DECIMALS: u32 = 2;
const SMALL_FIAT_DECIMALS: u32 = 5;
const CRYPTO_DECIMALS: u32 = 8;
const MAX_DECIMALS: u32 = 28;
const ZERO_PRICE: &str = "0.00";

/// Quotes fetched per coin from the rate source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quote {
    Usd,
    Eur,
    Btc,
    Kmd,
}

impl Quote {
    pub const ALL: [Quote; 4] = [Quote::Usd, Quote::Eur, Quote::Btc, Quote::Kmd];

    pub fn paprika_id(self) -> &'static str {
        match self {
            Quote::Usd => "usd-us-dollars",
            Quote::Eur => "eur-euro",
            Quote::Btc => "btc-bitcoin",
            Quote::Kmd => "kmd-komodo",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "USD" => Some(Quote::Usd),
            "EUR" => Some(Quote::Eur),
            "BTC" => Some(Quote::Btc),
            "KMD" => Some(Quote::Kmd),
            _ => None,
        }
    }

    /// Coin whose rate in this quote is one by definition.
    fn own_ticker(self) -> Option<&'static str> {
        match self {
            Quote::Btc => Some("BTC"),
            Quote::Kmd => Some("KMD"),
            Quote::Usd | Quote::Eur => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FiatConfig {
    pub refresh_interval: Duration,
    pub paprika_url: String,
    pub fiat_rates_url: String,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
    pub workers: usize,
    /// Real fiat currencies; amounts in these are shown with 2 decimals.
    pub fiats: Vec<String>,
    /// Everything `price_in_fiat` accepts, fiats plus crypto quotes.
    pub supported: Vec<String>,
}

impl Default for FiatConfig {
    fn default() -> Self {
        let fiats: Vec<String> = [
            "USD", "EUR", "GBP", "JPY", "CHF", "CAD", "AUD", "CNY", "KRW", "RUB", "TRY", "HKD",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();
        let mut supported = fiats.clone();
        supported.extend(["BTC".to_string(), "KMD".to_string()]);
        Self {
            refresh_interval: Duration::from_secs(120),
            paprika_url: DEFAULT_PAPRIKA_URL.to_string(),
            fiat_rates_url: DEFAULT_FIAT_RATES_URL.to_string(),
            http_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            workers: 8,
            fiats,
            supported,
        }
    }
}

/// Keeps conversion rates for the enabled coins, following the engine's
/// events.
#[derive(Clone)]
pub struct FiatRateProvider {
    inner: Arc<ProviderInner>,
}

struct ProviderInner {
    cfg: FiatConfig,
    engine: Engine,
    source: Arc<dyn RateSource>,
    pool: WorkerPool,
    rates: Registry<(Quote, Ticker), Decimal>,
    other_fiats: Slot<Value>,
    ticker_infos: Registry<Ticker, Value>,
    ticker_historical: Registry<Ticker, Value>,
    stop: watch::Sender<bool>,
    refresh_started: AtomicBool,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl FiatRateProvider {
    pub fn new(cfg: FiatConfig, engine: Engine, source: Arc<dyn RateSource>) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            inner: Arc::new(ProviderInner {
                pool: WorkerPool::new(cfg.workers, engine.pool().runtime().clone()),
                cfg,
                engine,
                source,
                rates: Registry::new(),
                other_fiats: Slot::default(),
                ticker_infos: Registry::new(),
                ticker_historical: Registry::new(),
                stop,
                refresh_started: AtomicBool::new(false),
                refresh_task: Mutex::new(None),
            }),
        }
    }

    pub fn with_http(cfg: FiatConfig, engine: Engine) -> Result<Self> {
        let transport = HttpTransport::new(cfg.paprika_url.clone(), cfg.http_timeout)
            .context("create rate source transport")?;
        let source = PaprikaClient::new(
            Arc::new(transport),
            cfg.paprika_url.clone(),
            cfg.fiat_rates_url.clone(),
            cfg.retry,
        );
        Ok(Self::new(cfg, engine, Arc::new(source)))
    }

    /// Subscribes to the engine's events. The returned task ends on `stop`.
    pub fn start(&self) -> JoinHandle<()> {
        let mut events = self.inner.engine.events();
        let mut stop = self.inner.stop.subscribe();
        let provider = self.clone();
        self.inner.pool.runtime().spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    event = events.recv() => match event {
                        Some(event) => provider.handle(event),
                        None => break,
                    },
                }
            }
            tracing::debug!("fiat provider listener stopped");
        })
    }

    pub async fn stop(&self) {
        self.inner.stop.send_replace(true);
        let task = self
            .inner
            .refresh_task
            .lock()
            .expect("refresh task mutex poisoned")
            .take();
        if let Some(task) = task
            && let Err(err) = task.await
        {
            tracing::warn!(error = %err, "fiat refresh task join error");
        }
        self.inner.pool.shutdown(Duration::from_secs(2)).await;
    }

    pub async fn wait_idle(&self) {
        self.inner.pool.wait_idle().await;
    }

    fn handle(&self, event: Event) {
        match event {
            Event::DaemonStarted => self.start_refresh_loop(),
            Event::CoinEnabled(ticker) => {
                let provider = self.clone();
                drop(self.inner.pool.spawn_coordinator("fiat_coin_enabled", async move {
                    provider.initialize_coin(ticker).await;
                }));
            }
            Event::CoinDisabled(ticker) => self.forget_coin(&ticker),
            _ => {}
        }
    }

    fn start_refresh_loop(&self) {
        if self.inner.refresh_started.swap(true, Ordering::AcqRel) {
            return;
        }
        let provider = self.clone();
        let mut stop = self.inner.stop.subscribe();
        let task = self.inner.pool.runtime().spawn(async move {
            tracing::info!("fiat refresh loop started");
            loop {
                provider.refresh_all().await;
                tokio::select! {
                    _ = tokio::time::sleep(provider.inner.cfg.refresh_interval) => {}
                    _ = stop.changed() => break,
                }
            }
        });
        *self
            .inner
            .refresh_task
            .lock()
            .expect("refresh task mutex poisoned") = Some(task);
    }

    /// Fetches the fiat table and, for every enabled coin, its infos, history
    /// and rates in all quotes.
    pub async fn refresh_all(&self) {
        let coins: Vec<Arc<CoinConfig>> = self
            .inner
            .engine
            .enabled_coins()
            .into_iter()
            .filter(|coin| !coin.is_test_coin())
            .map(Arc::new)
            .collect();
        tracing::info!(coins = coins.len(), "refreshing rate conversion");

        let mut group = self.inner.pool.group::<()>();
        let provider = self.clone();
        group.spawn("fiat_rates", async move { provider.fetch_fiat_rates().await });
        for coin in coins {
            let provider = self.clone();
            let c = coin.clone();
            group.spawn("ticker_info", async move { provider.fetch_ticker_info(&c).await });
            let provider = self.clone();
            let c = coin.clone();
            group.spawn("ticker_historical", async move {
                provider.fetch_ticker_historical(&c).await
            });
            for quote in Quote::ALL {
                if quote.own_ticker() == Some(coin.ticker.as_str()) {
                    continue;
                }
                let provider = self.clone();
                let c = coin.clone();
                group.spawn("quote", async move { provider.fetch_quote(&c, quote).await });
            }
        }
        group.join().await;
    }

    async fn initialize_coin(&self, ticker: Ticker) {
        let has_table = self
            .inner
            .other_fiats
            .read(|table| table.is_some_and(|t| t.get("rates").is_some()));
        if !has_table {
            self.fetch_fiat_rates().await;
        }

        if let Some(coin) = self.inner.engine.coin_info(ticker.as_str())
            && !coin.is_test_coin()
        {
            for quote in Quote::ALL {
                if quote.own_ticker() != Some(ticker.as_str()) {
                    self.fetch_quote(&coin, quote).await;
                }
            }
            self.fetch_ticker_info(&coin).await;
            self.fetch_ticker_historical(&coin).await;
        }
        tracing::debug!(%ticker, "coin rates initialized");
        self.inner
            .engine
            .bus()
            .publish(Event::CoinFullyInitialized(ticker));
    }

    fn forget_coin(&self, ticker: &Ticker) {
        for quote in Quote::ALL {
            self.inner.rates.remove(&(quote, ticker.clone()));
        }
        self.inner.ticker_infos.remove(ticker);
        self.inner.ticker_historical.remove(ticker);
        tracing::debug!(%ticker, "coin rates dropped");
    }

    async fn fetch_fiat_rates(&self) {
        match self.inner.source.fiat_rates().await {
            Ok(table) => self.inner.other_fiats.set(table),
            Err(err) => tracing::warn!(error = %format!("{err:#}"), "unable to fetch fiat rates"),
        }
    }

    async fn fetch_quote(&self, coin: &CoinConfig, quote: Quote) {
        let key = (quote, coin.ticker.clone());
        if coin.coinpaprika_id == quote.paprika_id() {
            self.inner.rates.insert_or_assign(key, Decimal::ONE);
            return;
        }
        match self
            .inner
            .source
            .price(&coin.coinpaprika_id, quote.paprika_id())
            .await
        {
            Ok(Some(price)) => self.inner.rates.insert_or_assign(key, price),
            Ok(None) => self.inner.rates.insert_or_assign(key, Decimal::ZERO),
            Err(err) => tracing::warn!(
                ticker = %coin.ticker,
                quote = quote.paprika_id(),
                error = %format!("{err:#}"),
                "price conversion failed"
            ),
        }
    }

    async fn fetch_ticker_info(&self, coin: &CoinConfig) {
        match self.inner.source.ticker_info(&coin.coinpaprika_id).await {
            Ok(info) => self
                .inner
                .ticker_infos
                .insert_or_assign(coin.ticker.clone(), info),
            Err(err) => {
                tracing::warn!(ticker = %coin.ticker, error = %format!("{err:#}"), "ticker info failed")
            }
        }
    }

    async fn fetch_ticker_historical(&self, coin: &CoinConfig) {
        match self.inner.source.ticker_historical(&coin.coinpaprika_id).await {
            Ok(Some(history)) => self
                .inner
                .ticker_historical
                .insert_or_assign(coin.ticker.clone(), history),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(ticker = %coin.ticker, error = %format!("{err:#}"), "ticker history failed")
            }
        }
    }

    pub fn is_fiat(&self, currency: &str) -> bool {
        self.inner.cfg.fiats.iter().any(|f| f == currency)
    }

    fn is_test_coin(&self, ticker: &str) -> bool {
        self.inner
            .engine
            .coin_info(ticker)
            .is_none_or(|coin| coin.is_test_coin())
    }

    fn stored_rate(&self, quote: Quote, ticker: &str) -> Result<Decimal, DexError> {
        Ticker::lookup(ticker)
            .and_then(|key| self.inner.rates.get(&(quote, key)))
            .ok_or_else(|| DexError::UnknownRateTicker(ticker.to_string()))
    }

    /// Price of one `ticker` in `fiat`. Currencies other than the fetched
    /// quotes go through USD and the fiat table.
    pub fn rate(&self, fiat: &str, ticker: &str) -> Result<Decimal, DexError> {
        match Quote::from_code(fiat) {
            Some(quote) if quote.own_ticker() == Some(ticker) => Ok(Decimal::ONE),
            Some(quote) => self.stored_rate(quote, ticker),
            None => {
                let usd = self.stored_rate(Quote::Usd, ticker)?;
                let factor = self
                    .inner
                    .other_fiats
                    .read(|table| table.and_then(|t| t.get("rates")?.get(fiat)).and_then(decimal_of))
                    .ok_or_else(|| DexError::InvalidFiat(fiat.to_string()))?;
                Ok(usd * factor)
            }
        }
    }

    /// `adjusted` renders 2 decimals for fiats (5 below one) and 8 otherwise,
    /// widening until a positive rate stops rounding to zero.
    pub fn rate_conversion(&self, fiat: &str, ticker: &str, adjusted: bool) -> Result<String, DexError> {
        let price = self.rate(fiat, ticker)?;
        if !adjusted {
            return Ok(price.normalize().to_string());
        }
        let mut decimals = if self.is_fiat(fiat) {
            FIAT_DECIMALS
        } else {
            CRYPTO_DECIMALS
        };
        if self.is_fiat(fiat) && price < Decimal::ONE {
            decimals = SMALL_FIAT_DECIMALS;
        }
        Ok(fixed(price, visible_decimals(price, decimals)))
    }

    /// Value of the whole `ticker` balance in `fiat`.
    pub fn price_in_fiat(&self, fiat: &str, ticker: &str) -> Result<String, DexError> {
        if !self.inner.cfg.supported.iter().any(|f| f == fiat) {
            return Err(DexError::InvalidFiat(fiat.to_string()));
        }
        if self.is_test_coin(ticker) {
            return Ok(ZERO_PRICE.to_string());
        }
        let price = self.rate(fiat, ticker)?;
        let amount = self.inner.engine.balance(ticker)?;
        Ok(self.compute_result(amount, price, fiat))
    }

    /// Portfolio value in `fiat`. Coins without a rate are skipped.
    pub fn price_in_fiat_all(&self, fiat: &str) -> Result<String, DexError> {
        if !self.inner.cfg.supported.iter().any(|f| f == fiat) {
            return Err(DexError::InvalidFiat(fiat.to_string()));
        }
        let mut total = Decimal::ZERO;
        for coin in self.inner.engine.enabled_coins() {
            if coin.is_test_coin() {
                continue;
            }
            let ticker = coin.ticker.as_str();
            let value = self
                .rate(fiat, ticker)
                .and_then(|price| Ok(price * self.inner.engine.balance(ticker)?));
            match value {
                Ok(value) => total += value,
                Err(err) => tracing::warn!(%ticker, %fiat, error = %err, "conversion skipped"),
            }
        }
        let decimals = if self.is_fiat(fiat) {
            FIAT_DECIMALS
        } else {
            CRYPTO_DECIMALS
        };
        Ok(price_text(fixed(total, decimals)))
    }

    pub fn price_from_amount(&self, currency: &str, ticker: &str, amount: Decimal) -> Result<String, DexError> {
        if self.is_test_coin(ticker) {
            return Ok(ZERO_PRICE.to_string());
        }
        let price = self.rate(currency, ticker)?;
        Ok(self.compute_result(amount, price, currency))
    }

    pub fn price_from_tx(&self, currency: &str, ticker: &str, tx: &TxInfo) -> Result<String, DexError> {
        self.price_from_amount(currency, ticker, tx.amount.abs())
    }

    /// Price of `base` in `rel` derived from their USD rates.
    pub fn cex_rates(&self, base: &str, rel: &str) -> Result<String, DexError> {
        let base_rate = self.rate("USD", base)?;
        let rel_rate = self.rate("USD", rel)?;
        if base_rate.is_zero() || rel_rate.is_zero() {
            return Ok(ZERO_PRICE.to_string());
        }
        Ok(price_text(fixed(base_rate / rel_rate, CRYPTO_DECIMALS)))
    }

    pub fn ticker_infos(&self, ticker: &str) -> Value {
        self.inner.ticker_infos.get(ticker).unwrap_or_default()
    }

    pub fn ticker_historical(&self, ticker: &str) -> Value {
        self.inner
            .ticker_historical
            .get(ticker)
            .unwrap_or_else(|| json!([]))
    }

    fn compute_result(&self, amount: Decimal, price: Decimal, currency: &str) -> String {
        let total = amount * price;
        let decimals = if self.is_fiat(currency) {
            FIAT_DECIMALS
        } else {
            CRYPTO_DECIMALS
        };
        price_text(fixed(total, visible_decimals(total, decimals)))
    }
}

/// Smallest precision, starting at `decimals`, at which a positive value does
/// not round to zero.
fn visible_decimals(value: Decimal, decimals: u32) -> u32 {
    let mut decimals = decimals;
    while value.is_sign_positive()
        && !value.is_zero()
        && round(value, decimals).is_zero()
        && decimals < MAX_DECIMALS
    {
        decimals += 1;
    }
    decimals
}

fn round(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
}

fn fixed(value: Decimal, decimals: u32) -> String {
    format!("{:.*}", decimals as usize, round(value, decimals))
}

fn trim_zeros(s: String) -> String {
    if !s.contains('.') {
        return s;
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Trims trailing zeros; a zero amount reads `0.00` like the other zero
/// answers.
fn price_text(s: String) -> String {
    let trimmed = trim_zeros(s);
    if trimmed.trim_start_matches('-').chars().all(|c| c == '0') {
        ZERO_PRICE.to_string()
    } else {
        trimmed
    }
}

fn decimal_of(v: &Value) -> Option<Decimal> {
    let raw = match v {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return None,
    };
    raw.parse()
        .ok()
        .or_else(|| Decimal::from_scientific(&raw).ok())
}
