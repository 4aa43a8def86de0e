//! Property-Based Tests - Symbol Mapping and Cache Invariants
//!
//! Uses `proptest` to verify that symbol resolution and the latest-price
//! cache hold their invariants across random inputs.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;

use price_feed_engine::domain::{InternalSymbol, SymbolMap};
use price_feed_engine::usecases::PriceCache;

fn symbol() -> impl Strategy<Value = String> {
    "[A-Z]{3,8}"
}

// ── Symbol Map Properties ───────────────────────────────────

proptest! {
    /// Mapped symbols resolve to their configured internal symbol.
    #[test]
    fn mapped_symbols_resolve_to_configured_value(
        mapping in prop::collection::hash_map(symbol(), symbol(), 1..20),
    ) {
        let map = SymbolMap::new(mapping.clone());
        for (provider, internal) in &mapping {
            let resolved = map.resolve(provider);
            prop_assert_eq!(resolved.as_str(), internal.as_str());
        }
    }

    /// Unmapped symbols fall back to the provider symbol unchanged.
    #[test]
    fn unmapped_symbols_fall_back_unchanged(
        mapping in prop::collection::hash_map(symbol(), symbol(), 0..10),
        unmapped in "[a-z0-9]{1,10}",
    ) {
        prop_assume!(!mapping.contains_key(&unmapped));
        let map = SymbolMap::new(mapping);
        let resolved = map.resolve(&unmapped);
        prop_assert_eq!(resolved.as_str(), unmapped.as_str());
    }

    /// Instruments are exactly the distinct internal symbols, sorted.
    #[test]
    fn instruments_are_distinct_and_sorted(
        mapping in prop::collection::hash_map(symbol(), "[A-C]{2}", 0..30),
    ) {
        let expected: Vec<String> = mapping.values().cloned().collect::<BTreeSet<_>>().into_iter().collect();
        let actual: Vec<String> = SymbolMap::new(mapping)
            .instruments()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        prop_assert_eq!(actual, expected);
    }
}

// ── Price Cache Properties ──────────────────────────────────

proptest! {
    /// After any sequence of writes, each symbol holds its last write.
    #[test]
    fn cache_holds_last_write_per_symbol(
        writes in prop::collection::vec(("[A-D]", 0i64..10_000_000, 0u32..8), 1..100),
    ) {
        let cache = PriceCache::new();
        let mut last: HashMap<String, Decimal> = HashMap::new();

        for (sym, mantissa, scale) in &writes {
            let price = Decimal::new(*mantissa, *scale);
            cache.set(InternalSymbol::new(sym), price, Utc::now());
            last.insert(sym.clone(), price);
        }

        prop_assert_eq!(cache.len(), last.len());
        for (sym, price) in &last {
            let cached = cache.get(&InternalSymbol::new(sym)).map(|u| u.price);
            prop_assert_eq!(cached, Some(*price));
        }
    }
}
