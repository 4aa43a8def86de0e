//! Price Feed Engine - Entry Point
//!
//! Initializes configuration, logging, the provider feeds and the API
//! server. Runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON or pretty structured logging)
//! 3. Create metrics registry, price cache and broadcaster
//! 4. Create the strategy factory and feed supervisor
//! 5. Spawn the API server (lookup, push hub, /live, /ready, /metrics)
//! 6. Spawn the feed supervisor
//! 7. Wait for SIGINT → graceful shutdown (not ready→cancel→close→exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};

use price_feed_engine::adapters::api::{self, ApiState, HealthState};
use price_feed_engine::adapters::feeds::ProviderStrategyFactory;
use price_feed_engine::adapters::metrics::FeedMetrics;
use price_feed_engine::config::{self, LogFormat};
use price_feed_engine::usecases::{Broadcaster, FeedSupervisor, PriceCache, Shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let path = config::loader::config_path(std::env::args().nth(1));
    let config = config::loader::load_config(&path).context("Failed to load configuration")?;

    // ── 2. Initialize structured logging ────────────────────
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.service.log_level));
    match config.service.log_format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).pretty().init(),
    }

    let symbols = config.symbol_map();
    info!(
        path = %path,
        overrides = config.feed.provider_overrides.len(),
        "Configuration loaded successfully"
    );
    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        provider = %config.feed.provider,
        symbols = symbols.len(),
        "Starting price feed engine"
    );

    // ── 3. Shared state ─────────────────────────────────────
    let root = Shutdown::new();
    let metrics = Arc::new(FeedMetrics::new().context("Failed to register metrics")?);
    let cache = Arc::new(PriceCache::new());
    let broadcaster = Arc::new(Broadcaster::new(config.api.subscriber_buffer));
    let health = Arc::new(HealthState::new(Arc::clone(&metrics)));

    // ── 4. Strategy factory + supervisor ────────────────────
    let factory = Arc::new(ProviderStrategyFactory::new(&config, Arc::clone(&metrics)));
    let supervisor = Arc::new(FeedSupervisor::new(
        factory,
        symbols.provider_symbols(),
        Arc::clone(&cache),
        Arc::clone(&broadcaster),
        Arc::clone(&metrics),
        config.feed.event_buffer,
    ));

    // ── 5. API server ───────────────────────────────────────
    let state = ApiState {
        prices: cache,
        instruments: symbols.instruments().into(),
        broadcaster,
        metrics,
        health: Arc::clone(&health),
        shutdown: root.child(),
    };
    let bind_address = config.api.bind_address.clone();
    let api_shutdown = root.child();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::serve(&bind_address, state, api_shutdown).await {
            error!(error = %e, "API server failed");
        }
    });

    // ── 6. Feed supervisor ──────────────────────────────────
    let feed_scope = root.child();
    let supervisor_ref = Arc::clone(&supervisor);
    let supervisor_handle = tokio::spawn(async move {
        let report = supervisor_ref.start(&feed_scope).await;
        if report.started == 0 {
            error!(skipped = report.skipped.len(), "No feed could be started");
        }
        report
    });

    info!("All tasks spawned - service is running");

    // ── 7. Wait for SIGINT ──────────────────────────────────
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for SIGINT, shutting down");
    } else {
        info!("SIGINT received, initiating graceful shutdown");
    }

    // 1. Readiness probe → 503
    health.mark_shutting_down();

    // 2. Close feeds, bounded by the shutdown timeout
    let timeout = Duration::from_millis(config.api.shutdown_timeout_ms);
    let deadline = Shutdown::new();
    let timer = {
        let deadline = deadline.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!("Feed close handshakes timed out");
            deadline.cancel();
        })
    };
    supervisor.stop(&deadline).await;
    timer.abort();

    // 3. Cancel everything else (API server, push sockets)
    root.cancel();

    match tokio::time::timeout(timeout, supervisor_handle).await {
        Ok(Ok(report)) => info!(
            started = report.started,
            skipped = report.skipped.len(),
            ticks = report.ticks_relayed,
            "Feed supervisor finished"
        ),
        Ok(Err(e)) => error!(error = %e, "Feed supervisor task failed"),
        Err(_) => warn!("Feed supervisor did not finish in time"),
    }

    if tokio::time::timeout(timeout, api_handle).await.is_err() {
        warn!("API server did not stop in time");
    }

    info!("Shutdown complete");
    Ok(())
}
