//! Provider Feed Adapters - Real-time Price Streaming
//!
//! One WebSocket connection per provider symbol:
//! - Binance: symbol encoded in the endpoint path, aggregate trades
//! - Tiingo: fixed endpoint, subscribe frame with API token
//! - Factory: picks the provider per symbol from configuration

mod connection;

pub mod binance;
pub mod factory;
pub mod tiingo;

pub use binance::BinanceStrategy;
pub use factory::ProviderStrategyFactory;
pub use tiingo::TiingoStrategy;
