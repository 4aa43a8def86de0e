//! Tiingo WebSocket Feed - Subscribe-then-Stream
//!
//! Connects to a fixed endpoint, sends one subscribe frame carrying the
//! API token and the single ticker, then streams. `messageType == "H"`
//! frames are heartbeats.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::instrument;

use super::connection::{validate_endpoint, FeedConnection, FrameResult, RawPrice};
use crate::adapters::metrics::FeedMetrics;
use crate::config::TiingoConfig;
use crate::domain::{InternalSymbol, PriceTick, Provider, SymbolMap};
use crate::ports::{ConnectionState, ExitReason, FeedError, FeedStrategy, ParseError};
use crate::usecases::shutdown::Shutdown;

/// Tiingo subscribe message.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeMsg<'a> {
    event_name: &'static str,
    authorization: &'a str,
    event_data: SubscribeData<'a>,
}

#[derive(Debug, Serialize)]
struct SubscribeData<'a> {
    tickers: [&'a str; 1],
}

/// Tiingo inbound message. Only the fields we need.
#[derive(Debug, Deserialize)]
struct TickerMsg {
    #[serde(rename = "messageType")]
    message_type: Option<String>,
    ticker: Option<String>,
    last: Option<RawPrice>,
}

/// Tiingo strategy for a single provider symbol.
pub struct TiingoStrategy {
    conn: FeedConnection,
    subscribe_frame: String,
}

impl TiingoStrategy {
    pub fn new(
        config: &TiingoConfig,
        symbols: &SymbolMap,
        provider_symbol: &str,
        close_timeout: Duration,
        metrics: Arc<FeedMetrics>,
    ) -> Result<Self, FeedError> {
        let provider_symbol = provider_symbol.trim();
        let construction = |reason: &str| FeedError::Construction {
            provider: Provider::Tiingo,
            symbol: provider_symbol.to_string(),
            reason: reason.to_string(),
        };

        if provider_symbol.is_empty() {
            return Err(construction("provider symbol is empty"));
        }
        if config.api_token.trim().is_empty() {
            return Err(construction("tiingo.api_token is not configured"));
        }
        validate_endpoint(Provider::Tiingo, provider_symbol, &config.ws_endpoint)?;

        let subscribe_frame = serde_json::to_string(&SubscribeMsg {
            event_name: "subscribe",
            authorization: &config.api_token,
            event_data: SubscribeData {
                tickers: [provider_symbol],
            },
        })
        .map_err(|e| construction(&format!("subscribe frame: {e}")))?;

        Ok(Self {
            conn: FeedConnection::new(
                Provider::Tiingo,
                provider_symbol.to_string(),
                symbols.resolve(provider_symbol),
                config.ws_endpoint.clone(),
                close_timeout,
                metrics,
            ),
            subscribe_frame,
        })
    }

    pub fn endpoint(&self) -> &str {
        self.conn.endpoint()
    }

    /// The subscribe frame sent right after the handshake.
    pub fn subscribe_frame(&self) -> &str {
        &self.subscribe_frame
    }

    /// Extract the last price from one frame; heartbeats yield `None`.
    pub fn decode(text: &str) -> FrameResult {
        let msg: TickerMsg =
            serde_json::from_str(text).map_err(|e| ParseError::Json(e.to_string()))?;

        if msg.message_type.as_deref() == Some("H") {
            return Ok(None);
        }
        if msg.ticker.is_none() {
            return Err(ParseError::MissingField("ticker"));
        }
        let price = msg.last.ok_or(ParseError::MissingField("last"))?.parse()?;
        Ok(Some(price))
    }
}

#[async_trait]
impl FeedStrategy for TiingoStrategy {
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
        self.conn
            .run(Some(self.subscribe_frame.clone()), Self::decode, shutdown)
            .await
    }

    async fn stop(&self, shutdown: Shutdown) {
        self.conn.close(async move { shutdown.cancelled().await }).await;
    }
}
