//! Binance WebSocket Feed - Aggregated Trade Stream
//!
//! One socket per symbol at `{base}/{symbol}@aggTrade`. No subscribe
//! frame: the stream name in the path selects the instrument.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::instrument;

use super::connection::{validate_endpoint, FeedConnection, FrameResult, RawPrice};
use crate::adapters::metrics::FeedMetrics;
use crate::config::BinanceConfig;
use crate::domain::{InternalSymbol, PriceTick, Provider, SymbolMap};
use crate::ports::{ConnectionState, ExitReason, FeedError, FeedStrategy, ParseError};
use crate::usecases::shutdown::Shutdown;

/// Binance aggregate trade message. Only the fields we need.
#[derive(Debug, Deserialize)]
struct AggTradeMsg {
    /// Symbol.
    s: Option<String>,
    /// Price, normally a decimal string.
    p: Option<RawPrice>,
}

/// Binance aggTrade strategy for a single provider symbol.
pub struct BinanceStrategy {
    conn: FeedConnection,
}

impl BinanceStrategy {
    /// Build a strategy for `provider_symbol` (e.g. "BTCUSDT").
    pub fn new(
        config: &BinanceConfig,
        symbols: &SymbolMap,
        provider_symbol: &str,
        close_timeout: Duration,
        metrics: Arc<FeedMetrics>,
    ) -> Result<Self, FeedError> {
        let provider_symbol = provider_symbol.trim();
        if provider_symbol.is_empty() {
            return Err(FeedError::Construction {
                provider: Provider::Binance,
                symbol: provider_symbol.to_string(),
                reason: "provider symbol is empty".to_string(),
            });
        }

        let endpoint = format!(
            "{}/{}@aggTrade",
            config.ws_base_endpoint.trim_end_matches('/'),
            provider_symbol.to_lowercase()
        );
        validate_endpoint(Provider::Binance, provider_symbol, &endpoint)?;

        Ok(Self {
            conn: FeedConnection::new(
                Provider::Binance,
                provider_symbol.to_string(),
                symbols.resolve(provider_symbol),
                endpoint,
                close_timeout,
                metrics,
            ),
        })
    }

    pub fn endpoint(&self) -> &str {
        self.conn.endpoint()
    }

    /// Extract the trade price from one aggTrade frame.
    pub fn decode(text: &str) -> FrameResult {
        let msg: AggTradeMsg =
            serde_json::from_str(text).map_err(|e| ParseError::Json(e.to_string()))?;

        if msg.s.is_none() {
            return Err(ParseError::MissingField("s"));
        }
        let price = msg.p.ok_or(ParseError::MissingField("p"))?.parse()?;
        Ok(Some(price))
    }
}

#[async_trait]
impl FeedStrategy for BinanceStrategy {
    fn provider(&self) -> Provider {
        self.conn.provider()
    }

    fn provider_symbol(&self) -> &str {
        self.conn.provider_symbol()
    }

    fn internal_symbol(&self) -> &InternalSymbol {
        self.conn.internal_symbol()
    }

    fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    fn add_listener(&self, listener: mpsc::Sender<PriceTick>) {
        self.conn.add_listener(listener);
    }

    #[instrument(skip(self, shutdown), fields(symbol = %self.conn.provider_symbol()))]
    async fn start(&self, shutdown: Shutdown) -> Result<ExitReason, FeedError> {
        self.conn.run(None, Self::decode, shutdown).await
    }

    async fn stop(&self, shutdown: Shutdown) {
        self.conn.close(async move { shutdown.cancelled().await }).await;
    }
}
