//! Use Cases Layer - Application Logic
//!
//! Orchestrates the domain types with the port interfaces to implement
//! the service's workflows.
//!
//! Use cases:
//! - `FeedSupervisor`: strategy lifecycle and tick relay
//! - `PriceCache`: latest price per internal symbol
//! - `Broadcaster`: per-symbol push fan-out
//! - `Shutdown`: hierarchical cancellation scopes

pub mod broadcaster;
pub mod price_cache;
pub mod shutdown;
pub mod supervisor;

pub use broadcaster::{Broadcaster, PublishOutcome, SubscriberHandle};
pub use price_cache::PriceCache;
pub use shutdown::Shutdown;
pub use supervisor::{FeedSupervisor, SupervisorReport};
