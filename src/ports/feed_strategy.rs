//! Feed Strategy Port - Provider Connection Contract
//!
//! One strategy instance owns one upstream connection for one
//! (provider, provider symbol) pair. The supervisor only ever talks to
//! strategies through this trait, so new providers plug in without
//! touching the ingestion path.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::{InternalSymbol, PriceTick, Provider};
use crate::usecases::shutdown::Shutdown;

/// Lifecycle of a strategy instance.
///
/// `Created → Connecting → Streaming → (Closing) → Closed`. `Closed`
/// is terminal: an instance is never restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Created,
    Connecting,
    Streaming,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why a strategy's receive loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The cancellation signal fired.
    Cancelled,
    /// The provider closed the connection.
    RemoteClosed,
    /// Connect, read or send failed. Already logged by the strategy.
    TransportFailed(String),
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::RemoteClosed => f.write_str("remote closed"),
            Self::TransportFailed(reason) => write!(f, "transport failed: {reason}"),
        }
    }
}

/// Errors raised by feed strategies and their factory.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedError {
    /// Strategy could not be built for a symbol.
    #[error("cannot build {provider} strategy for '{symbol}': {reason}")]
    Construction {
        provider: Provider,
        symbol: String,
        reason: String,
    },

    /// WebSocket handshake failed.
    #[error("connect to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    /// Reading from an open connection failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Writing a frame (e.g. the subscribe message) failed.
    #[error("send failed: {0}")]
    Send(String),

    /// Close handshake failed or timed out.
    #[error("close failed: {0}")]
    Close(String),

    /// Operation not allowed in the current lifecycle state.
    #[error("invalid state: expected {expected}, found {found}")]
    InvalidState {
        expected: ConnectionState,
        found: ConnectionState,
    },
}

/// A malformed or incomplete tick frame. Never fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("invalid price '{0}'")]
    InvalidPrice(String),
}

/// Uniform start/stop/event contract over provider variants.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedStrategy: Send + Sync + 'static {
    fn provider(&self) -> Provider;

    fn provider_symbol(&self) -> &str;

    /// Internal symbol resolved at construction, fixed for the lifetime.
    fn internal_symbol(&self) -> &InternalSymbol;

    fn state(&self) -> ConnectionState;

    /// Register a listener for parsed ticks. Several may be registered.
    fn add_listener(&self, listener: mpsc::Sender<PriceTick>);

    /// Connect and stream until the connection closes, `shutdown` fires
    /// or a transport fault occurs. Returns only once the loop has exited
    /// and the connection has been cleaned up.
    ///
    /// `Err` only when the instance is not in `Created`.
    async fn start(&self, shutdown: Shutdown) -> Result<ExitReason, FeedError>;

    /// Request a graceful close, bounded by `shutdown`.
    ///
    /// Idempotent and safe before `start` or after it returned. Close
    /// failures are logged, not returned.
    async fn stop(&self, shutdown: Shutdown);
}

/// Builds one strategy per provider symbol.
#[cfg_attr(test, mockall::automock)]
pub trait StrategyFactory: Send + Sync + 'static {
    fn build(&self, provider_symbol: &str) -> Result<Box<dyn FeedStrategy>, FeedError>;
}
