//! Feed Supervisor - Lifecycle Management for Provider Connections
//!
//! Builds one strategy per configured provider symbol, runs them all
//! concurrently as tokio tasks, relays every tick into the price cache
//! and then the broadcaster, and coordinates shutdown through a child
//! cancellation scope. A failed strategy is never restarted.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::metrics::FeedMetrics;
use crate::domain::{PriceTick, ProviderSymbol};
use crate::ports::{ConnectionState, ExitReason, FeedError, FeedStrategy, StrategyFactory};

use super::broadcaster::Broadcaster;
use super::price_cache::PriceCache;
use super::shutdown::Shutdown;

/// What happened during one `start` run.
#[derive(Debug, Default)]
pub struct SupervisorReport {
    /// Strategies built and launched.
    pub started: usize,
    /// Symbols that failed construction, with the reason.
    pub skipped: Vec<(ProviderSymbol, FeedError)>,
    /// How each launched strategy ended.
    pub exits: Vec<(ProviderSymbol, ExitReason)>,
    /// Ticks relayed to the cache and broadcaster.
    pub ticks_relayed: u64,
}

/// Supervises all provider feed strategies.
pub struct FeedSupervisor {
    factory: Arc<dyn StrategyFactory>,
    provider_symbols: Vec<ProviderSymbol>,
    cache: Arc<PriceCache>,
    broadcaster: Arc<Broadcaster>,
    metrics: Arc<FeedMetrics>,
    /// Capacity of the shared tick channel.
    event_buffer: usize,
    /// Strategies built by the current run.
    strategies: Mutex<Vec<Arc<dyn FeedStrategy>>>,
    /// Child scope of the current run.
    scope: Mutex<Option<Shutdown>>,
}

impl FeedSupervisor {
    pub fn new(
        factory: Arc<dyn StrategyFactory>,
        provider_symbols: Vec<ProviderSymbol>,
        cache: Arc<PriceCache>,
        broadcaster: Arc<Broadcaster>,
        metrics: Arc<FeedMetrics>,
        event_buffer: usize,
    ) -> Self {
        Self {
            factory,
            provider_symbols,
            cache,
            broadcaster,
            metrics,
            event_buffer: event_buffer.max(1),
            strategies: Mutex::new(Vec::new()),
            scope: Mutex::new(None),
        }
    }

    /// Build and run every strategy until all of them have exited.
    ///
    /// Returns once each strategy has either failed or been cancelled,
    /// whether through `shutdown` or through [`FeedSupervisor::stop`].
    #[instrument(skip(self, shutdown), fields(symbols = self.provider_symbols.len()))]
    pub async fn start(&self, shutdown: &Shutdown) -> SupervisorReport {
        let scope = shutdown.child();
        *self.scope.lock().unwrap_or_else(PoisonError::into_inner) = Some(scope.clone());

        let mut report = SupervisorReport::default();
        let (tick_tx, mut tick_rx) = mpsc::channel::<PriceTick>(self.event_buffer);

        let mut built: Vec<Arc<dyn FeedStrategy>> =
            Vec::with_capacity(self.provider_symbols.len());
        for provider_symbol in &self.provider_symbols {
            match self.factory.build(provider_symbol) {
                Ok(strategy) => {
                    strategy.add_listener(tick_tx.clone());
                    built.push(Arc::from(strategy));
                }
                Err(e) => {
                    error!(symbol = %provider_symbol, error = %e, "Error creating strategy for symbol");
                    report.skipped.push((provider_symbol.clone(), e));
                }
            }
        }
        // Only strategies hold senders now, so the relay sees every tick they emit.
        drop(tick_tx);

        self.strategies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone_from(&built);

        let mut tasks = JoinSet::new();
        for strategy in built {
            let scope = scope.clone();
            tasks.spawn(async move {
                let symbol = strategy.provider_symbol().to_string();
                let exit = match strategy.start(scope).await {
                    Ok(exit) => exit,
                    Err(e) => ExitReason::TransportFailed(e.to_string()),
                };
                (symbol, exit)
            });
        }
        report.started = tasks.len();

        info!(
            started = report.started,
            skipped = report.skipped.len(),
            "Feed tasks spawned"
        );

        if tasks.is_empty() {
            warn!("No feed strategies could be started");
            return report;
        }

        loop {
            tokio::select! {
                Some(tick) = tick_rx.recv() => {
                    self.relay(tick);
                    report.ticks_relayed += 1;
                }
                joined = tasks.join_next() => match joined {
                    Some(Ok((symbol, exit))) => {
                        debug!(symbol = %symbol, reason = %exit, "Feed task finished");
                        report.exits.push((symbol, exit));
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Feed task panicked");
                        report.exits.push((
                            "<unknown>".to_string(),
                            ExitReason::TransportFailed(e.to_string()),
                        ));
                    }
                    None => break,
                },
            }
        }

        // Ticks emitted just before the last strategy exited.
        while let Ok(tick) = tick_rx.try_recv() {
            self.relay(tick);
            report.ticks_relayed += 1;
        }

        info!(
            exited = report.exits.len(),
            ticks = report.ticks_relayed,
            "All feed tasks exited"
        );
        report
    }

    /// Cancel the current run and close every strategy concurrently,
    /// bounded by `shutdown`.
    #[instrument(skip(self, shutdown))]
    pub async fn stop(&self, shutdown: &Shutdown) {
        if let Some(scope) = self
            .scope
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            scope.cancel();
        }

        let strategies = self
            .strategies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        join_all(strategies.iter().map(|s| s.stop(shutdown.clone()))).await;
        info!(strategies = strategies.len(), "Feed strategies stopped");
    }

    /// Strategies currently streaming.
    pub fn connected_feeds(&self) -> usize {
        self.strategies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.state() == ConnectionState::Streaming)
            .count()
    }

    /// Write to the cache first, then publish what was written.
    fn relay(&self, tick: PriceTick) {
        let update = self.cache.set(tick.symbol.clone(), tick.price, Utc::now());
        let outcome = self.broadcaster.publish(&tick.symbol, &update);

        if outcome.dropped > 0 {
            self.metrics.broadcast_dropped.inc_by(outcome.dropped as u64);
        }
        debug!(
            provider = %tick.provider,
            symbol = %tick.symbol,
            price = %tick.price,
            delivered = outcome.delivered,
            "Price update relayed"
        );
    }
}
