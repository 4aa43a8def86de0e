//! Shared WebSocket session for all provider strategies.
//!
//! Owns the lifecycle state machine, the listener list, the write half
//! of the socket (so `stop` can close it while the receive loop runs)
//! and the receive loop itself. Provider variants only contribute the
//! endpoint, an optional subscribe frame and a frame decoder.

use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

use crate::adapters::metrics::FeedMetrics;
use crate::domain::{InternalSymbol, PriceTick, Provider};
use crate::ports::{ConnectionState, ExitReason, FeedError, ParseError};
use crate::usecases::shutdown::Shutdown;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

/// Decoded content of one text frame: a price, or nothing (heartbeat).
pub(crate) type FrameResult = Result<Option<Decimal>, ParseError>;

/// Price field as providers send it: usually a string, sometimes a number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawPrice {
    Text(String),
    Number(serde_json::Number),
}

impl RawPrice {
    pub(crate) fn parse(&self) -> Result<Decimal, ParseError> {
        let text = match self {
            Self::Text(text) => text.trim().to_string(),
            Self::Number(number) => number.to_string(),
        };
        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map_err(|_| ParseError::InvalidPrice(text))
    }
}

/// Reject endpoints tungstenite cannot turn into a handshake request.
pub(crate) fn validate_endpoint(
    provider: Provider,
    symbol: &str,
    endpoint: &str,
) -> Result<(), FeedError> {
    endpoint
        .into_client_request()
        .map(|_| ())
        .map_err(|e| FeedError::Construction {
            provider,
            symbol: symbol.to_string(),
            reason: format!("invalid endpoint '{endpoint}': {e}"),
        })
}

const fn state_to_u8(state: ConnectionState) -> u8 {
    match state {
        ConnectionState::Created => 0,
        ConnectionState::Connecting => 1,
        ConnectionState::Streaming => 2,
        ConnectionState::Closing => 3,
        ConnectionState::Closed => 4,
    }
}

const fn state_from_u8(value: u8) -> ConnectionState {
    match value {
        0 => ConnectionState::Created,
        1 => ConnectionState::Connecting,
        2 => ConnectionState::Streaming,
        3 => ConnectionState::Closing,
        _ => ConnectionState::Closed,
    }
}

/// One upstream connection for one provider symbol.
pub(crate) struct FeedConnection {
    provider: Provider,
    provider_symbol: String,
    internal_symbol: InternalSymbol,
    endpoint: String,
    /// Bound on the cleanup close after the loop exits.
    close_timeout: Duration,
    state: AtomicU8,
    listeners: Mutex<Vec<mpsc::Sender<PriceTick>>>,
    writer: tokio::sync::Mutex<Option<WsWriter>>,
    metrics: Arc<FeedMetrics>,
}

impl FeedConnection {
    pub(crate) fn new(
        provider: Provider,
        provider_symbol: String,
        internal_symbol: InternalSymbol,
        endpoint: String,
        close_timeout: Duration,
        metrics: Arc<FeedMetrics>,
    ) -> Self {
        Self {
            provider,
            provider_symbol,
            internal_symbol,
            endpoint,
            close_timeout,
            state: AtomicU8::new(state_to_u8(ConnectionState::Created)),
            listeners: Mutex::new(Vec::new()),
            writer: tokio::sync::Mutex::new(None),
            metrics,
        }
    }

    pub(crate) const fn provider(&self) -> Provider {
        self.provider
    }

    pub(crate) fn provider_symbol(&self) -> &str {
        &self.provider_symbol
    }

    pub(crate) const fn internal_symbol(&self) -> &InternalSymbol {
        &self.internal_symbol
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) fn state(&self) -> ConnectionState {
        state_from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = state_from_u8(self.state.swap(state_to_u8(next), Ordering::AcqRel));
        if previous == next {
            return;
        }
        if next == ConnectionState::Streaming {
            self.metrics.feeds_streaming.inc();
        } else if previous == ConnectionState::Streaming {
            self.metrics.feeds_streaming.dec();
        }
        trace!(symbol = %self.provider_symbol, from = %previous, to = %next, "Connection state changed");
    }

    pub(crate) fn add_listener(&self, listener: mpsc::Sender<PriceTick>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Run the whole lifecycle: connect, optionally subscribe, stream,
    /// then close. Transport faults are logged here and reported as an
    /// `ExitReason`, never as an error.
    pub(crate) async fn run<D>(
        &self,
        subscribe_frame: Option<String>,
        decode: D,
        shutdown: Shutdown,
    ) -> Result<ExitReason, FeedError>
    where
        D: Fn(&str) -> FrameResult + Send + Sync,
    {
        let created = state_to_u8(ConnectionState::Created);
        let connecting = state_to_u8(ConnectionState::Connecting);
        if let Err(found) =
            self.state
                .compare_exchange(created, connecting, Ordering::AcqRel, Ordering::Acquire)
        {
            return Err(FeedError::InvalidState {
                expected: ConnectionState::Created,
                found: state_from_u8(found),
            });
        }

        let exit = self.stream(subscribe_frame, &decode, &shutdown).await;

        match &exit {
            ExitReason::TransportFailed(reason) => {
                self.metrics.record_transport_failure(self.provider);
                error!(
                    provider = %self.provider,
                    symbol = %self.provider_symbol,
                    error = %reason,
                    "Feed connection failed"
                );
            }
            other => info!(
                provider = %self.provider,
                symbol = %self.provider_symbol,
                reason = %other,
                "Feed receive loop exited"
            ),
        }

        self.close(tokio::time::sleep(self.close_timeout)).await;
        self.set_state(ConnectionState::Closed);
        Ok(exit)
    }

    async fn stream<D>(
        &self,
        subscribe_frame: Option<String>,
        decode: &D,
        shutdown: &Shutdown,
    ) -> ExitReason
    where
        D: Fn(&str) -> FrameResult + Send + Sync,
    {
        info!(provider = %self.provider, url = %self.endpoint, "Connecting to provider WebSocket");

        let connected = tokio::select! {
            biased;
            () = shutdown.cancelled() => return ExitReason::Cancelled,
            result = connect_async(self.endpoint.as_str()) => result,
        };

        let ws_stream = match connected {
            Ok((ws_stream, _response)) => ws_stream,
            Err(e) => {
                let err = FeedError::Connect {
                    endpoint: self.endpoint.clone(),
                    reason: e.to_string(),
                };
                return ExitReason::TransportFailed(err.to_string());
            }
        };

        let (mut write, mut read) = ws_stream.split();

        if let Some(frame) = subscribe_frame {
            debug!(provider = %self.provider, symbol = %self.provider_symbol, "Sending subscribe frame");
            if let Err(e) = write.send(Message::Text(frame)).await {
                *self.writer.lock().await = Some(write);
                return ExitReason::TransportFailed(FeedError::Send(e.to_string()).to_string());
            }
        }

        *self.writer.lock().await = Some(write);
        self.set_state(ConnectionState::Streaming);
        info!(
            provider = %self.provider,
            symbol = %self.provider_symbol,
            internal_symbol = %self.internal_symbol,
            "Provider WebSocket streaming"
        );

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!(symbol = %self.provider_symbol, "Shutdown signal received in feed");
                    return ExitReason::Cancelled;
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_frame(&text, decode).await,
                        Some(Ok(Message::Close(frame))) => {
                            debug!(symbol = %self.provider_symbol, ?frame, "Provider sent close frame");
                            self.set_state(ConnectionState::Closing);
                            return ExitReason::RemoteClosed;
                        }
                        Some(Ok(_)) => {
                            // Ping/pong are answered by tungstenite; binary frames carry no ticks.
                        }
                        Some(Err(e)) => {
                            return ExitReason::TransportFailed(
                                FeedError::Transport(e.to_string()).to_string(),
                            );
                        }
                        None => return ExitReason::RemoteClosed,
                    }
                }
            }
        }
    }

    async fn handle_frame<D>(&self, text: &str, decode: &D)
    where
        D: Fn(&str) -> FrameResult + Send + Sync,
    {
        match decode(text) {
            Ok(Some(price)) => {
                self.metrics
                    .record_tick(self.provider, self.internal_symbol.as_str());
                self.emit(PriceTick {
                    provider: self.provider,
                    symbol: self.internal_symbol.clone(),
                    price,
                })
                .await;
            }
            Ok(None) => trace!(symbol = %self.provider_symbol, "Heartbeat"),
            Err(e) => {
                self.metrics.record_discarded(self.provider);
                warn!(
                    provider = %self.provider,
                    symbol = %self.provider_symbol,
                    error = %e,
                    "Discarding malformed frame"
                );
            }
        }
    }

    /// Deliver a tick to every listener, pruning closed ones.
    async fn emit(&self, tick: PriceTick) {
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut any_closed = false;
        for listener in &listeners {
            if listener.send(tick.clone()).await.is_err() {
                any_closed = true;
            }
        }

        if any_closed {
            debug!(symbol = %self.provider_symbol, "Pruning closed price listener");
            self.listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|listener| !listener.is_closed());
        }
    }

    /// Close the socket if one is open, giving up when `bound` resolves.
    pub(crate) async fn close<F>(&self, bound: F)
    where
        F: Future<Output = ()>,
    {
        let Some(mut writer) = self.writer.lock().await.take() else {
            return;
        };

        if self.state() == ConnectionState::Streaming {
            self.set_state(ConnectionState::Closing);
        }

        tokio::select! {
            result = writer.close() => match result {
                Ok(()) => debug!(symbol = %self.provider_symbol, "WebSocket closed"),
                Err(e) => warn!(
                    provider = %self.provider,
                    symbol = %self.provider_symbol,
                    error = %FeedError::Close(e.to_string()),
                    "Error closing provider WebSocket"
                ),
            },
            () = bound => warn!(
                provider = %self.provider,
                symbol = %self.provider_symbol,
                "Close handshake abandoned"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_raw_price_text_and_number() {
        let text: RawPrice = serde_json::from_str(r#""65000.50""#).unwrap();
        let number: RawPrice = serde_json::from_str("1.0825").unwrap();
        assert_eq!(text.parse(), Ok(dec!(65000.50)));
        assert_eq!(number.parse(), Ok(dec!(1.0825)));
    }

    #[test]
    fn test_raw_price_rejects_garbage() {
        let raw: RawPrice = serde_json::from_str(r#""abc""#).unwrap();
        assert_eq!(raw.parse(), Err(ParseError::InvalidPrice("abc".to_string())));
    }

    #[test]
    fn test_validate_endpoint() {
        let ok = "wss://stream.binance.com/ws/btcusdt@aggTrade";
        assert!(validate_endpoint(Provider::Binance, "BTCUSDT", ok).is_ok());
        assert!(validate_endpoint(Provider::Binance, "BTCUSDT", "not a url").is_err());
    }
}
