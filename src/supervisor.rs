use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context as _, Result};
use rand::Rng as _;
use rand::distr::Alphanumeric;
use serde::Serialize;
use serde_json::Value;
use tokio::process::{Child, Command};

use crate::config::{DaemonSettings, StopTimeouts};
use crate::rpc::RpcClient;

/// Environment variable through which the daemon finds its config file.
pub const CONF_PATH_ENV: &str = "MM_CONF_PATH";

const RPC_PASSWORD_LEN: usize = 32;

#[derive(Debug, Clone, Serialize)]
pub struct DaemonConfig {
    pub gui: String,
    pub netid: u16,
    pub passphrase: String,
    pub rpc_password: String,
}

impl DaemonConfig {
    pub fn new(settings: &DaemonSettings, passphrase: impl Into<String>) -> Self {
        Self {
            gui: settings.gui.clone(),
            netid: settings.netid,
            passphrase: passphrase.into(),
            rpc_password: generate_rpc_password(),
        }
    }
}

pub fn generate_rpc_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(RPC_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

#[derive(Debug)]
pub struct DaemonProcess {
    child: Child,
    config_path: PathBuf,
}

impl DaemonProcess {
    /// Writes the transient config and starts the daemon with its path in
    /// `MM_CONF_PATH`.
    pub async fn launch(settings: &DaemonSettings, cfg: &DaemonConfig) -> Result<Self> {
        let data = serde_json::to_vec(cfg).context("encode daemon config")?;
        tokio::fs::write(&settings.config_path, data)
            .await
            .with_context(|| format!("write daemon config {}", settings.config_path.display()))?;

        let mut cmd = Command::new(&settings.binary);
        cmd.args(&settings.args)
            .env(CONF_PATH_ENV, &settings.config_path)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &settings.working_dir {
            cmd.current_dir(dir);
        }

        tracing::debug!(
            binary = %settings.binary.display(),
            working_dir = ?settings.working_dir,
            "spawning daemon"
        );
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                remove_file_if_exists(&settings.config_path).await;
                return Err(err)
                    .with_context(|| format!("spawn daemon {}", settings.binary.display()));
            }
        };
        tracing::info!(pid = ?child.id(), "daemon spawned");

        Ok(Self {
            child,
            config_path: settings.config_path.clone(),
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub async fn remove_config(&self) {
        remove_file_if_exists(&self.config_path).await;
    }

    pub fn try_status(&mut self) -> Result<Option<ExitStatus>> {
        self.child.try_wait().context("poll daemon status")
    }

    /// Asks the daemon to stop over RPC, escalates to a kill, then waits a
    /// last time for the exit status.
    pub async fn shutdown(mut self, rpc: &RpcClient, timeouts: StopTimeouts) -> Result<()> {
        if let Some(status) = self.try_status()? {
            tracing::info!(%status, "daemon already exited");
            return Ok(());
        }

        let graceful = tokio::time::timeout(timeouts.terminate, async {
            if let Err(err) = rpc.call("stop", Value::Null).await {
                tracing::warn!(error = %format!("{err:#}"), "stop rpc failed");
            }
            self.child.wait().await
        })
        .await;
        if let Ok(status) = graceful {
            let status = status.context("wait daemon after stop")?;
            tracing::info!(%status, "daemon stopped");
            return Ok(());
        }

        tracing::warn!("daemon ignored stop request, killing");
        self.child.start_kill().context("kill daemon")?;
        if let Ok(status) = tokio::time::timeout(timeouts.kill, self.child.wait()).await {
            let status = status.context("wait daemon after kill")?;
            tracing::info!(%status, "daemon killed");
            return Ok(());
        }

        let status = tokio::time::timeout(timeouts.wait, self.child.wait())
            .await
            .context("daemon did not exit after kill")?
            .context("wait daemon")?;
        tracing::info!(%status, "daemon exited");
        Ok(())
    }
}

/// Polls the version endpoint every `interval` until it answers, giving up
/// after `attempts` failures.
pub async fn wait_alive(rpc: &RpcClient, interval: Duration, attempts: u32) -> Result<String> {
    let mut tries = 0u32;
    loop {
        match rpc.version().await {
            Ok(version) => {
                tracing::info!(%version, tries, "daemon is alive");
                return Ok(version);
            }
            Err(err) => {
                tries += 1;
                tracing::debug!(tries, error = %format!("{err:#}"), "daemon not reachable yet");
                if tries >= attempts.max(1) {
                    anyhow::bail!("daemon not reachable after {tries} attempts: {err:#}");
                }
            }
        }
        tokio::time::sleep(interval).await;
    }
}

async fn remove_file_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed daemon config"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "remove daemon config failed")
        }
    }
}
