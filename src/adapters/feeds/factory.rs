//! Strategy factory - one strategy per configured provider symbol.
//!
//! Shared dependencies (provider settings, the symbol map, metrics) are
//! captured once; the provider symbol is the only per-call argument.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::metrics::FeedMetrics;
use crate::config::{AppConfig, BinanceConfig, TiingoConfig};
use crate::domain::{Provider, SymbolMap};
use crate::ports::{FeedError, FeedStrategy, StrategyFactory};

use super::binance::BinanceStrategy;
use super::tiingo::TiingoStrategy;

/// Builds Binance or Tiingo strategies according to configuration.
pub struct ProviderStrategyFactory {
    default_provider: Provider,
    overrides: HashMap<String, Provider>,
    binance: BinanceConfig,
    tiingo: TiingoConfig,
    symbols: SymbolMap,
    close_timeout: Duration,
    metrics: Arc<FeedMetrics>,
}

impl ProviderStrategyFactory {
    pub fn new(config: &AppConfig, metrics: Arc<FeedMetrics>) -> Self {
        Self {
            default_provider: config.feed.provider,
            overrides: config.feed.provider_overrides.clone(),
            binance: config.binance.clone(),
            tiingo: config.tiingo.clone(),
            symbols: config.symbol_map(),
            close_timeout: Duration::from_millis(config.feed.close_timeout_ms),
            metrics,
        }
    }

    /// Provider serving `provider_symbol`.
    pub fn provider_for(&self, provider_symbol: &str) -> Provider {
        self.overrides
            .get(provider_symbol)
            .copied()
            .unwrap_or(self.default_provider)
    }
}

impl StrategyFactory for ProviderStrategyFactory {
    fn build(&self, provider_symbol: &str) -> Result<Box<dyn FeedStrategy>, FeedError> {
        let metrics = Arc::clone(&self.metrics);
        match self.provider_for(provider_symbol) {
            Provider::Binance => BinanceStrategy::new(
                &self.binance,
                &self.symbols,
                provider_symbol,
                self.close_timeout,
                metrics,
            )
            .map(|s| Box::new(s) as Box<dyn FeedStrategy>),
            Provider::Tiingo => TiingoStrategy::new(
                &self.tiingo,
                &self.symbols,
                provider_symbol,
                self.close_timeout,
                metrics,
            )
            .map(|s| Box::new(s) as Box<dyn FeedStrategy>),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn config() -> AppConfig {
        toml::from_str(
            r#"
            [feed]
            provider = "binance"
            [feed.symbols]
            BTCUSDT = "BTCUSD"
            eurusd = "EURUSD"
            [feed.provider_overrides]
            eurusd = "tiingo"
            [tiingo]
            api_token = "token"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_default_and_override_providers() {
        let factory = ProviderStrategyFactory::new(&config(), Arc::new(FeedMetrics::new().unwrap()));

        let btc = factory.build("BTCUSDT").unwrap();
        assert_eq!(btc.provider(), Provider::Binance);
        assert_eq!(btc.internal_symbol().as_str(), "BTCUSD");

        let eur = factory.build("eurusd").unwrap();
        assert_eq!(eur.provider(), Provider::Tiingo);
        assert_eq!(eur.internal_symbol().as_str(), "EURUSD");
    }

    #[test]
    fn test_build_empty_symbol_fails() {
        let factory = ProviderStrategyFactory::new(&config(), Arc::new(FeedMetrics::new().unwrap()));
        assert!(matches!(factory.build(""), Err(FeedError::Construction { .. })));
    }
}
