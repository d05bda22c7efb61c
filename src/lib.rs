pub mod coins;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod fiat;
pub mod logging;
pub mod pool;
pub mod rpc;
pub mod state;
pub mod supervisor;
pub mod ticker;

pub use engine::Engine;
pub use error::DexError;
pub use ticker::Ticker;
