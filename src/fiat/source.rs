use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context as _, Result};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::rpc::{HTTP_OK, RetryPolicy, Transport, with_rate_limit_retry};

pub const DEFAULT_PAPRIKA_URL: &str = "https://api.coinpaprika.com/v1";
pub const DEFAULT_FIAT_RATES_URL: &str = "https://api.openrates.io/latest?base=USD";

const HISTORICAL_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Where conversion rates come from.
#[async_trait::async_trait]
pub trait RateSource: Send + Sync {
    /// Price of one `base_id` in `quote_id`. `Ok(None)` means the source
    /// answered with an error for this pair.
    async fn price(&self, base_id: &str, quote_id: &str) -> Result<Option<Decimal>>;

    async fn ticker_info(&self, id: &str) -> Result<Value>;

    /// Recent price history, `None` when the source rejected the request.
    async fn ticker_historical(&self, id: &str) -> Result<Option<Value>>;

    /// Table of fiat rates against USD, shaped `{ "rates": { "EUR": 0.9, .. } }`.
    async fn fiat_rates(&self) -> Result<Value>;
}

pub struct PaprikaClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    fiat_rates_url: String,
    retry: RetryPolicy,
}

impl PaprikaClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: impl Into<String>,
        fiat_rates_url: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            fiat_rates_url: fiat_rates_url.into(),
            retry,
        }
    }

    async fn get(&self, url: &str) -> Result<(u16, Value)> {
        let resp = with_rate_limit_retry(&self.retry, url, || self.transport.get(url))
            .await
            .with_context(|| format!("get {url}"))?;
        Ok((resp.status, resp.body))
    }
}

#[async_trait::async_trait]
impl RateSource for PaprikaClient {
    async fn price(&self, base_id: &str, quote_id: &str) -> Result<Option<Decimal>> {
        let url = format!(
            "{}/price-converter?base_currency_id={base_id}&quote_currency_id={quote_id}&amount=1",
            self.base_url
        );
        let (status, body) = self.get(&url).await?;
        if status != HTTP_OK || body.get("error").is_some() {
            tracing::debug!(base_id, quote_id, status, "price conversion rejected");
            return Ok(None);
        }
        let price = body.get("price").context("price converter answer has no price")?;
        let price = serde_json::from_value::<Decimal>(price.clone()).context("decode price")?;
        Ok(Some(price))
    }

    async fn ticker_info(&self, id: &str) -> Result<Value> {
        let url = format!("{}/tickers/{id}?quotes=USD,EUR,BTC", self.base_url);
        let (status, body) = self.get(&url).await?;
        anyhow::ensure!(status == HTTP_OK, "ticker info for {id}: http status {status}");
        Ok(body)
    }

    async fn ticker_historical(&self, id: &str) -> Result<Option<Value>> {
        let start = SystemTime::now()
            .checked_sub(HISTORICAL_WINDOW)
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let url = format!(
            "{}/tickers/{id}/historical?start={start}&interval=2h",
            self.base_url
        );
        let (status, body) = self.get(&url).await?;
        if status != HTTP_OK || body.get("error").is_some() {
            return Ok(None);
        }
        Ok(Some(body))
    }

    async fn fiat_rates(&self) -> Result<Value> {
        let (status, body) = self.get(&self.fiat_rates_url).await?;
        anyhow::ensure!(status == HTTP_OK, "fiat rates: http status {status}");
        Ok(body)
    }
}
