use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::rpc::RetryPolicy;

pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:7783";
pub const DEFAULT_TOKEN_HISTORY_URL: &str = "https://komodo.live:3334/api/v1";

/// Balance factor used when the wallet is opened in privacy mode.
pub const PRIVACY_BALANCE_FACTOR: Decimal = Decimal::from_parts(1, 0, 0, false, 1);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub rpc_url: String,
    pub rpc_timeout: Duration,
    pub daemon: DaemonSettings,
    /// Directory holding the per-wallet coins files.
    pub config_dir: PathBuf,
    pub version: String,
    pub previous_version: Option<String>,
    pub orderbook_interval: Duration,
    pub info_interval: Duration,
    pub liveness_interval: Duration,
    pub liveness_attempts: u32,
    pub retry: RetryPolicy,
    pub workers: usize,
    pub tx_page_limit: u32,
    pub min_swaps_window: usize,
    pub privacy_factor: Decimal,
    pub token_history_url: String,
    pub shutdown: StopTimeouts,
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            rpc_timeout: Duration::from_secs(30),
            daemon: DaemonSettings::default(),
            config_dir: PathBuf::from("."),
            version: env!("CARGO_PKG_VERSION").to_string(),
            previous_version: None,
            orderbook_interval: Duration::from_secs(5),
            info_interval: Duration::from_secs(30),
            liveness_interval: Duration::from_secs(1),
            liveness_attempts: 30,
            retry: RetryPolicy::default(),
            workers: 8,
            tx_page_limit: 50,
            min_swaps_window: 50,
            privacy_factor: PRIVACY_BALANCE_FACTOR,
            token_history_url: DEFAULT_TOKEN_HISTORY_URL.to_string(),
            shutdown: StopTimeouts::default(),
            event_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonSettings {
    pub binary: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Where the transient daemon config is written before launch.
    pub config_path: PathBuf,
    pub netid: u16,
    pub gui: String,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("mm2"),
            args: Vec::new(),
            working_dir: None,
            config_path: std::env::temp_dir().join("MM2.json"),
            netid: 9999,
            gui: "dex-sync".to_string(),
        }
    }
}

/// Escalation used when tearing the daemon down: ask it to stop, then kill,
/// then a final wait for the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopTimeouts {
    pub terminate: Duration,
    pub kill: Duration,
    pub wait: Duration,
}

impl Default for StopTimeouts {
    fn default() -> Self {
        Self {
            terminate: Duration::from_secs(2),
            kill: Duration::from_secs(5),
            wait: Duration::from_secs(2),
        }
    }
}
