pub mod wallet_file;

use serde::{Deserialize, Serialize};

use crate::ticker::Ticker;

/// Coinpaprika id used by coins that have no market data.
pub const TEST_COIN_PAPRIKA_ID: &str = "test-coin";

const DEFAULT_ETH_SWAP_CONTRACT: &str = "0x8500AFc0bc5214728082163326C2FF0C73f4a871";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectrumServer {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_cert_verification: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinKind {
    /// Enabled through `electrum`.
    Utxo,
    /// Enabled through `enable` against eth nodes.
    Token,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinConfig {
    /// Filled from the wallet file key when the entry omits it.
    #[serde(default = "empty_ticker")]
    pub ticker: Ticker,
    #[serde(default)]
    pub name: String,
    #[serde(default = "test_coin_id")]
    pub coinpaprika_id: String,
    #[serde(default)]
    pub electrum_urls: Vec<ElectrumServer>,
    #[serde(default)]
    pub eth_nodes: Vec<String>,
    #[serde(default)]
    pub swap_contract_address: Option<String>,
    #[serde(default, alias = "is_erc_20")]
    pub is_erc20: bool,
    #[serde(default)]
    pub is_claimable: bool,
    #[serde(default)]
    pub active: bool,
    #[serde(skip)]
    pub currently_enabled: bool,
}

fn empty_ticker() -> Ticker {
    Ticker::new("")
}

fn test_coin_id() -> String {
    TEST_COIN_PAPRIKA_ID.to_string()
}

impl CoinConfig {
    pub fn kind(&self) -> CoinKind {
        if self.is_erc20 {
            CoinKind::Token
        } else {
            CoinKind::Utxo
        }
    }

    pub fn is_test_coin(&self) -> bool {
        self.coinpaprika_id == TEST_COIN_PAPRIKA_ID
    }

    pub fn swap_contract(&self) -> &str {
        self.swap_contract_address
            .as_deref()
            .unwrap_or(DEFAULT_ETH_SWAP_CONTRACT)
    }
}
