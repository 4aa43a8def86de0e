//! Instrument identifiers and the provider → internal symbol mapping.
//!
//! Every upstream provider names instruments in its own vocabulary
//! ("BTCUSDT" on Binance, "btcusd" on Tiingo). The rest of the system
//! only ever sees the canonical internal symbol produced here.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Instrument identifier in a specific provider's vocabulary.
pub type ProviderSymbol = String;

/// Canonical identifier of an instrument across the whole system.
///
/// Cheap to clone: every tick, cache entry and push message carries one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InternalSymbol(Arc<str>);

impl InternalSymbol {
    /// Wrap a symbol exactly as given.
    pub fn new(symbol: impl AsRef<str>) -> Self {
        Self(Arc::from(symbol.as_ref()))
    }

    /// Normalize client input (`"btcusd"`, `" BTCUSD "`) to the canonical form.
    pub fn normalized(symbol: &str) -> Self {
        Self::new(symbol.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InternalSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for InternalSymbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InternalSymbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Static lookup from provider symbol to internal symbol.
///
/// Built once from configuration and shared read-only by the factory,
/// the supervisor and the API layer.
#[derive(Debug, Clone, Default)]
pub struct SymbolMap {
    entries: HashMap<ProviderSymbol, InternalSymbol>,
}

impl SymbolMap {
    pub fn new(mapping: HashMap<String, String>) -> Self {
        let entries = mapping
            .into_iter()
            .map(|(provider, internal)| (provider, InternalSymbol::new(internal)))
            .collect();
        Self { entries }
    }

    /// Resolve a provider symbol, falling back to the provider symbol
    /// itself when no mapping entry exists.
    pub fn resolve(&self, provider_symbol: &str) -> InternalSymbol {
        self.entries
            .get(provider_symbol)
            .cloned()
            .unwrap_or_else(|| InternalSymbol::new(provider_symbol))
    }

    /// Configured provider symbols, sorted for deterministic start order.
    pub fn provider_symbols(&self) -> Vec<ProviderSymbol> {
        let mut symbols: Vec<_> = self.entries.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Distinct internal symbols, sorted.
    pub fn instruments(&self) -> Vec<InternalSymbol> {
        self.entries
            .values()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for SymbolMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
