use thiserror::Error;

/// Error codes reported by the engine's query and command surface.
///
/// Query methods return `Result<T, DexError>` with `T: Default`, so a caller
/// that only wants something to render can fall back on `unwrap_or_default()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DexError {
    #[error("unknown ticker: {0}")]
    UnknownTicker(String),

    #[error("balance requested for a coin that is not enabled: {0}")]
    BalanceNotEnabled(String),

    #[error("tx history requested for a coin that is not enabled: {0}")]
    TxNotEnabled(String),

    #[error("coin could not be enabled: {0}")]
    EnableFailed(String),

    #[error("cannot disable unknown coin: {0}")]
    DisableUnknownCoin(String),

    #[error("an active swap is using {0}")]
    ActiveSwapUsesCoin(String),

    #[error("an order is matching at the moment for {0}")]
    OrderMatchingForCoin(String),

    #[error("orderbook is empty")]
    OrderbookEmpty,

    #[error("orderbook pair not found: {0}")]
    OrderbookPairNotFound(String),

    #[error("not enough funds on {0}")]
    InsufficientFunds(String),

    #[error("{method} failed: {message}")]
    Rpc {
        method: &'static str,
        message: String,
    },

    #[error("orders are not available yet")]
    OrdersNotAvailable,

    #[error("ticker is not claimable: {0}")]
    NotClaimable(String),

    #[error("unknown ticker for rate conversion: {0}")]
    UnknownRateTicker(String),

    #[error("invalid fiat for rate conversion: {0}")]
    InvalidFiat(String),
}

impl DexError {
    pub(crate) fn rpc(method: &'static str, message: impl Into<String>) -> Self {
        Self::Rpc {
            method,
            message: message.into(),
        }
    }
}
