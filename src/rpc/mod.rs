pub mod http;
pub mod types;

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

pub const HTTP_OK: u16 = 200;
pub const TOO_MANY_REQUESTS: u16 = 429;

#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Value,
}

/// Wire seam between the engine and the daemon (or any JSON-over-HTTP peer).
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, payload: &Value) -> Result<RawResponse>;

    async fn get(&self, url: &str) -> Result<RawResponse>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(1),
            max_attempts: 30,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{what}: still rate limited after {attempts} attempts")]
pub struct RateLimited {
    pub what: String,
    pub attempts: u32,
}

/// Re-issues `send` while the peer answers "too many requests", sleeping a
/// fixed backoff between attempts and giving up after `max_attempts`.
pub async fn with_rate_limit_retry<F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut send: F,
) -> Result<RawResponse>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RawResponse>>,
{
    let mut attempts = 0u32;
    loop {
        let resp = send().await?;
        attempts += 1;
        if resp.status != TOO_MANY_REQUESTS {
            return Ok(resp);
        }

        if attempts >= policy.max_attempts.max(1) {
            tracing::error!(what, attempts, "giving up on rate limited request");
            return Err(RateLimited {
                what: what.to_string(),
                attempts,
            }
            .into());
        }

        tracing::warn!(what, attempts, "too many requests, retrying");
        tokio::time::sleep(policy.backoff).await;
    }
}

/// One decoded reply, either a whole single-call response or one element of
/// a batch array.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub status: u16,
    pub body: Value,
}

impl Answer {
    pub fn is_ok(&self) -> bool {
        self.status == HTTP_OK && self.body.get("error").is_none()
    }

    pub fn error_message(&self) -> Option<String> {
        match self.body.get("error") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None if self.status != HTTP_OK => Some(format!("http status {}", self.status)),
            None => None,
        }
    }

    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.body.clone()).context("decode rpc answer")
    }

    pub fn result<T: DeserializeOwned>(&self) -> Result<T> {
        let result = self.body.get("result").context("rpc answer has no result")?;
        serde_json::from_value(result.clone()).context("decode rpc result")
    }

    /// Answer for a call that failed before reaching the daemon.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: 0,
            body: json!({ "error": message.into() }),
        }
    }
}

#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn Transport>,
    userpass: Arc<RwLock<String>>,
    retry: RetryPolicy,
}

impl RpcClient {
    pub fn new(transport: Arc<dyn Transport>, retry: RetryPolicy) -> Self {
        Self {
            transport,
            userpass: Arc::new(RwLock::new(String::new())),
            retry,
        }
    }

    pub fn set_userpass(&self, password: impl Into<String>) {
        *self.userpass.write().expect("userpass lock poisoned") = password.into();
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Builds a request object: `params` fields plus `method` and `userpass`.
    pub fn request(&self, method: &str, params: Value) -> Value {
        let mut obj = match params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("params".to_string(), other);
                map
            }
        };
        obj.insert("method".to_string(), Value::String(method.to_string()));
        obj.insert(
            "userpass".to_string(),
            Value::String(self.userpass.read().expect("userpass lock poisoned").clone()),
        );
        Value::Object(obj)
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Answer> {
        let payload = self.request(method, params);
        let resp = with_rate_limit_retry(&self.retry, method, || {
            self.transport.post(&payload)
        })
        .await
        .with_context(|| format!("rpc {method}"))?;

        Ok(Answer {
            status: resp.status,
            body: resp.body,
        })
    }

    /// Sends `requests` as one JSON array; the answers come back in request
    /// order.
    pub async fn call_batch(&self, requests: Vec<Value>) -> Result<Vec<Answer>> {
        let expected = requests.len();
        let payload = Value::Array(requests);
        let resp = with_rate_limit_retry(&self.retry, "batch", || self.transport.post(&payload))
            .await
            .context("rpc batch")?;

        let Value::Array(items) = resp.body else {
            anyhow::bail!(
                "batch answer is not an array (status={}): {}",
                resp.status,
                resp.body
            );
        };
        anyhow::ensure!(
            items.len() == expected,
            "batch answer length mismatch: expected={expected} got={}",
            items.len()
        );

        Ok(items
            .into_iter()
            .map(|body| Answer {
                status: resp.status,
                body,
            })
            .collect())
    }

    /// Plain HTTP GET through the same transport and retry policy.
    pub async fn get(&self, url: &str) -> Result<Answer> {
        let resp = with_rate_limit_retry(&self.retry, url, || self.transport.get(url))
            .await
            .with_context(|| format!("get {url}"))?;
        Ok(Answer {
            status: resp.status,
            body: resp.body,
        })
    }

    pub async fn version(&self) -> Result<String> {
        let answer = self.call("version", Value::Null).await?;
        anyhow::ensure!(
            answer.is_ok(),
            "version check failed: {}",
            answer.error_message().unwrap_or_default()
        );
        answer.result::<String>()
    }
}
