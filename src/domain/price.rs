//! Price events flowing from the providers to the cache and subscribers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::symbol::InternalSymbol;

/// Supported upstream market-data providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Aggregated-trade stream, one socket per symbol.
    Binance,
    /// Subscribe-then-stream socket on a fixed endpoint.
    Tiingo,
}

impl Provider {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Tiingo => "tiingo",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binance" => Ok(Self::Binance),
            "tiingo" => Ok(Self::Tiingo),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// One parsed tick, already normalized to the internal symbol.
///
/// Emitted by a feed strategy from inside its receive loop. Carries no
/// timestamp: the observation time is assigned when the cache is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceTick {
    pub provider: Provider,
    pub symbol: InternalSymbol,
    pub price: Decimal,
}

/// Latest known price of an instrument.
///
/// Immutable value: the cache replaces it as a whole on every tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub symbol: InternalSymbol,
    pub price: Decimal,
    /// Receipt time at the cache, not the upstream event time.
    #[serde(rename = "timestamp")]
    pub observed_at: DateTime<Utc>,
}

impl PriceUpdate {
    pub fn new(symbol: InternalSymbol, price: Decimal, observed_at: DateTime<Utc>) -> Self {
        Self {
            symbol,
            price,
            observed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_provider_from_str_case_insensitive() {
        assert_eq!("Binance".parse::<Provider>(), Ok(Provider::Binance));
        assert_eq!("TIINGO".parse::<Provider>(), Ok(Provider::Tiingo));
        assert!("kraken".parse::<Provider>().is_err());
    }

    #[test]
    fn test_price_update_json_shape() {
        let update = PriceUpdate::new(
            InternalSymbol::new("BTCUSD"),
            dec!(65000.50),
            DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["symbol"], "BTCUSD");
        assert_eq!(json["price"], "65000.50");
        assert_eq!(json["timestamp"], "2024-01-01T00:00:00Z");
    }
}
