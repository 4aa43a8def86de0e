//! Price Lookup Port - Synchronous Latest-Price Query
//!
//! The API layer only needs to read prices, so it depends on this
//! trait rather than on the concrete cache.

use crate::domain::{InternalSymbol, PriceUpdate};

/// Read side of the latest-price store.
#[cfg_attr(test, mockall::automock)]
pub trait PriceLookup: Send + Sync + 'static {
    /// Latest cached price, or `None` if the symbol never ticked.
    fn latest(&self, symbol: &InternalSymbol) -> Option<PriceUpdate>;
}
