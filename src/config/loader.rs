//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, applying environment overrides,
//! validating all parameters and providing clear error messages for
//! misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};

use super::AppConfig;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "PRICE_FEED_CONFIG";

/// Environment variable overriding `tiingo.api_token`.
pub const TIINGO_TOKEN_ENV: &str = "TIINGO_API_TOKEN";

/// Resolve the config path: first CLI argument, then `PRICE_FEED_CONFIG`,
/// then `config.toml`.
pub fn config_path(cli_arg: Option<String>) -> String {
  cli_arg
    .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
    .unwrap_or_else(|| "config.toml".to_string())
}

/// Load, override and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let mut config = parse_config(&content)?;

  if let Ok(token) = std::env::var(TIINGO_TOKEN_ENV) {
    if !token.trim().is_empty() {
      config.tiingo.api_token = token;
    }
  }

  validate_config(&config)?;
  Ok(config)
}

/// Parse configuration text without touching the environment.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  toml::from_str(content).context("Failed to parse config.toml")
}

/// Validate all configuration parameters.
///
/// Per-symbol problems a strategy can detect itself (empty provider
/// symbol, missing Tiingo token) are left to construction so one bad
/// symbol does not keep the others from streaming.
pub fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.feed.symbols.is_empty(),
    "At least one symbol must be configured in [feed.symbols]"
  );

  for (provider_symbol, internal) in &config.feed.symbols {
    anyhow::ensure!(
      provider_symbol.trim() == provider_symbol,
      "Provider symbol '{}' has surrounding whitespace",
      provider_symbol
    );
    anyhow::ensure!(
      !internal.trim().is_empty(),
      "Symbol '{}' maps to an empty internal symbol",
      provider_symbol
    );
    anyhow::ensure!(
      *internal == internal.trim().to_uppercase(),
      "Symbol '{}' maps to '{}'; internal symbols must be uppercase without whitespace",
      provider_symbol,
      internal
    );
  }

  anyhow::ensure!(
    config.feed.event_buffer > 0,
    "feed.event_buffer must be positive"
  );
  anyhow::ensure!(
    config.api.subscriber_buffer > 0,
    "api.subscriber_buffer must be positive"
  );
  anyhow::ensure!(
    !config.binance.ws_base_endpoint.is_empty(),
    "Binance WebSocket endpoint must not be empty"
  );
  anyhow::ensure!(
    !config.tiingo.ws_endpoint.is_empty(),
    "Tiingo WebSocket endpoint must not be empty"
  );
  anyhow::ensure!(
    !config.api.bind_address.is_empty(),
    "API bind address must not be empty"
  );

  Ok(())
}
