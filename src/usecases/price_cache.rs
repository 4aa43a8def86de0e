//! Price Cache - Latest Price per Internal Symbol
//!
//! Last-write-wins store written by the supervisor's relay and read by
//! the lookup endpoint. Entries are replaced as a whole, so a reader
//! never observes a half-written price.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::domain::{InternalSymbol, PriceUpdate};
use crate::ports::price_lookup::PriceLookup;

/// Concurrency-safe latest-price store.
#[derive(Debug, Default)]
pub struct PriceCache {
    prices: DashMap<InternalSymbol, PriceUpdate>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditionally overwrite the entry for `symbol`.
    ///
    /// Returns the stored value so the caller can publish exactly what
    /// readers will see.
    pub fn set(
        &self,
        symbol: InternalSymbol,
        price: Decimal,
        observed_at: DateTime<Utc>,
    ) -> PriceUpdate {
        let update = PriceUpdate::new(symbol.clone(), price, observed_at);
        self.prices.insert(symbol, update.clone());
        update
    }

    pub fn get(&self, symbol: &InternalSymbol) -> Option<PriceUpdate> {
        self.prices.get(symbol).map(|entry| entry.value().clone())
    }

    /// All cached prices, sorted by symbol.
    pub fn snapshot(&self) -> Vec<PriceUpdate> {
        let mut all: Vec<_> = self
            .prices
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        all
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl PriceLookup for PriceCache {
    fn latest(&self, symbol: &InternalSymbol) -> Option<PriceUpdate> {
        self.get(symbol)
    }
}
