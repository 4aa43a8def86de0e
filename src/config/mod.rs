//! Configuration Module - TOML-based Service Configuration
//!
//! Loads and validates configuration from `config.toml` with
//! environment variable overrides for secrets. Provider endpoints and
//! the symbol mapping are externalized here - nothing is hardcoded in
//! the feed adapters.

pub mod loader;

use std::collections::HashMap;

use serde::Deserialize;

use crate::domain::{Provider, SymbolMap};

/// Top-level service configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before any feed connects.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Service identity and logging.
  #[serde(default)]
  pub service: ServiceConfig,
  /// Symbol mapping and supervisor settings.
  pub feed: FeedConfig,
  /// Binance stream settings.
  #[serde(default)]
  pub binance: BinanceConfig,
  /// Tiingo stream settings.
  #[serde(default)]
  pub tiingo: TiingoConfig,
  /// Lookup and push API settings.
  #[serde(default)]
  pub api: ApiConfig,
}

impl AppConfig {
  /// Provider symbol → internal symbol lookup built from `feed.symbols`.
  pub fn symbol_map(&self) -> SymbolMap {
    SymbolMap::new(self.feed.symbols.clone())
  }
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  /// Human-readable service name.
  #[serde(default = "default_service_name")]
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Log output format.
  #[serde(default)]
  pub log_format: LogFormat,
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      name: default_service_name(),
      log_level: default_log_level(),
      log_format: LogFormat::default(),
    }
  }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
  /// One JSON object per line.
  #[default]
  Json,
  /// Human-readable, for local runs.
  Pretty,
}

/// Feed supervisor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
  /// Provider used for every symbol without an override.
  #[serde(default = "default_provider")]
  pub provider: Provider,
  /// Provider symbol → internal symbol.
  pub symbols: HashMap<String, String>,
  /// Per-symbol provider overrides, keyed by provider symbol.
  #[serde(default)]
  pub provider_overrides: HashMap<String, Provider>,
  /// Capacity of the strategy → supervisor tick channel.
  #[serde(default = "default_event_buffer")]
  pub event_buffer: usize,
  /// Bound on the cleanup close handshake (milliseconds).
  #[serde(default = "default_close_timeout")]
  pub close_timeout_ms: u64,
}

/// Binance stream configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceConfig {
  /// Base endpoint; `/{symbol}@aggTrade` is appended.
  #[serde(default = "default_binance_endpoint")]
  pub ws_base_endpoint: String,
}

impl Default for BinanceConfig {
  fn default() -> Self {
    Self {
      ws_base_endpoint: default_binance_endpoint(),
    }
  }
}

/// Tiingo stream configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TiingoConfig {
  /// Fixed WebSocket endpoint.
  #[serde(default = "default_tiingo_endpoint")]
  pub ws_endpoint: String,
  /// API token; `TIINGO_API_TOKEN` overrides it.
  #[serde(default)]
  pub api_token: String,
}

impl Default for TiingoConfig {
  fn default() -> Self {
    Self {
      ws_endpoint: default_tiingo_endpoint(),
      api_token: String::new(),
    }
  }
}

/// HTTP / WebSocket API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Listen address.
  #[serde(default = "default_bind_address")]
  pub bind_address: String,
  /// Per-subscriber push queue depth.
  #[serde(default = "default_subscriber_buffer")]
  pub subscriber_buffer: usize,
  /// Bound on graceful shutdown of feeds and server (milliseconds).
  #[serde(default = "default_shutdown_timeout")]
  pub shutdown_timeout_ms: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      bind_address: default_bind_address(),
      subscriber_buffer: default_subscriber_buffer(),
      shutdown_timeout_ms: default_shutdown_timeout(),
    }
  }
}

// Default value functions for serde

fn default_service_name() -> String {
  "price-feed".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

const fn default_provider() -> Provider {
  Provider::Binance
}

const fn default_event_buffer() -> usize {
  4096
}

const fn default_close_timeout() -> u64 {
  5_000
}

fn default_binance_endpoint() -> String {
  "wss://stream.binance.com:443/ws".to_string()
}

fn default_tiingo_endpoint() -> String {
  "wss://api.tiingo.com/iex".to_string()
}

fn default_bind_address() -> String {
  "0.0.0.0:8080".to_string()
}

const fn default_subscriber_buffer() -> usize {
  256
}

const fn default_shutdown_timeout() -> u64 {
  10_000
}
