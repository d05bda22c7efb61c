use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context as _, Result};
use serde_json::{Map, Value};

use super::CoinConfig;
use crate::ticker::Ticker;

/// Per-wallet coin configuration file, `<version>-coins.<wallet>.json`,
/// mapping ticker to `{ "active": bool, ..static fields }`.
#[derive(Debug)]
pub struct WalletCoinsFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

pub fn file_name(version: &str, wallet: &str) -> String {
    format!("{version}-coins.{wallet}.json")
}

impl WalletCoinsFile {
    /// Opens the file for `version`, first carrying over `active` flags from
    /// the `previous_version` file when one is still on disk.
    pub fn open(
        dir: &Path,
        version: &str,
        previous_version: Option<&str>,
        wallet: &str,
    ) -> Result<Self> {
        let path = dir.join(file_name(version, wallet));
        if let Some(previous) = previous_version
            && previous != version
        {
            let previous_path = dir.join(file_name(previous, wallet));
            if previous_path.exists() {
                reconcile(&previous_path, &path).with_context(|| {
                    format!("reconcile coins file from {}", previous_path.display())
                })?;
            }
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<BTreeMap<Ticker, CoinConfig>> {
        if !self.path.exists() {
            tracing::warn!(path = %self.path.display(), "wallet coins file missing");
            return Ok(BTreeMap::new());
        }

        let raw = read_json(&self.path)?;
        let mut out = BTreeMap::new();
        for (key, value) in raw {
            let mut cfg: CoinConfig = serde_json::from_value(value)
                .with_context(|| format!("decode coin config {key}"))?;
            cfg.ticker = Ticker::new(&key);
            cfg.currently_enabled = false;
            out.insert(cfg.ticker.clone(), cfg);
        }
        Ok(out)
    }

    /// Rewrites the `active` flag of `tickers`. Unknown tickers are skipped.
    pub fn set_active(&self, tickers: &[Ticker], active: bool) -> Result<()> {
        let _guard = self.write_lock.lock().expect("coins file lock poisoned");

        let mut raw = read_json(&self.path)?;
        for ticker in tickers {
            match raw.get_mut(ticker.as_str()).and_then(Value::as_object_mut) {
                Some(entry) => {
                    entry.insert("active".to_string(), Value::Bool(active));
                }
                None => tracing::warn!(%ticker, "ticker missing from wallet coins file"),
            }
        }
        write_json(&self.path, &raw)
    }
}

fn reconcile(previous: &Path, current: &Path) -> Result<()> {
    tracing::info!(
        previous = %previous.display(),
        current = %current.display(),
        "upgrading coins file with previous settings"
    );

    if !current.exists() {
        std::fs::rename(previous, current)
            .with_context(|| format!("move {} to {}", previous.display(), current.display()))?;
        return Ok(());
    }

    let old = read_json(previous)?;
    let mut new = read_json(current)?;
    for (key, value) in new.iter_mut() {
        let Some(active) = old
            .get(key)
            .and_then(|v| v.get("active"))
            .and_then(Value::as_bool)
        else {
            continue;
        };
        if let Some(entry) = value.as_object_mut() {
            entry.insert("active".to_string(), Value::Bool(active));
        }
    }
    write_json(current, &new)?;

    std::fs::remove_file(previous)
        .with_context(|| format!("remove previous coins file {}", previous.display()))?;
    Ok(())
}

fn read_json(path: &Path) -> Result<Map<String, Value>> {
    let data =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parse {}", path.display()))
}

fn write_json(path: &Path, value: &Map<String, Value>) -> Result<()> {
    let data = serde_json::to_string_pretty(value).context("encode coins file")?;
    std::fs::write(path, data).with_context(|| format!("write {}", path.display()))
}
