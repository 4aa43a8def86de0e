//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Traits the use cases depend on. Adapters implement them.
//!
//! Port categories:
//! - `FeedStrategy` / `StrategyFactory`: one upstream provider connection
//! - `PriceLookup`: synchronous latest-price reads for the API layer

pub mod feed_strategy;
pub mod price_lookup;

pub use feed_strategy::{
    ConnectionState, ExitReason, FeedError, FeedStrategy, ParseError, StrategyFactory,
};
pub use price_lookup::PriceLookup;
