use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use dex_sync::events::{Event, Subscription};

pub async fn wait_for<T, F, Fut>(description: &str, timeout: Duration, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = Instant::now() + timeout;
    let mut sleep_for = Duration::from_millis(10);

    loop {
        let now = Instant::now();
        if now >= deadline {
            anyhow::bail!("timeout waiting for {description}");
        }

        if let Some(value) = f().await.with_context(|| format!("poll {description}"))? {
            return Ok(value);
        }

        tokio::time::sleep(sleep_for).await;
        sleep_for = (sleep_for * 2).min(Duration::from_millis(200));
    }
}

/// Reads events until `pred` has matched `count` of them.
pub async fn wait_events(
    events: &mut Subscription,
    timeout: Duration,
    count: usize,
    pred: impl Fn(&Event) -> bool,
) -> Result<Vec<Event>> {
    let collect = async {
        let mut seen = Vec::new();
        while seen.len() < count {
            match events.recv().await {
                Some(event) if pred(&event) => seen.push(event),
                Some(_) => {}
                None => anyhow::bail!("event bus closed"),
            }
        }
        Ok(seen)
    };
    tokio::time::timeout(timeout, collect)
        .await
        .context("timeout waiting for events")?
}
