use std::time::Duration;

use anyhow::{Context as _, Result};
use serde_json::Value;

use super::{RawResponse, Transport};

#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn post(&self, payload: &Value) -> Result<RawResponse> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("post {}", self.endpoint))?;
        into_raw(resp).await
    }

    async fn get(&self, url: &str) -> Result<RawResponse> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("get {url}"))?;
        into_raw(resp).await
    }
}

async fn into_raw(resp: reqwest::Response) -> Result<RawResponse> {
    let status = resp.status().as_u16();
    let text = resp.text().await.context("read response body")?;
    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
    Ok(RawResponse { status, body })
}
