//! Prometheus Metrics Registry - Feed Observability
//!
//! Counters and gauges for the ingestion and fan-out path. Exposed in
//! text format on `/metrics` by the API router.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::domain::Provider;

/// Centralized Prometheus metrics for the price feed.
///
/// All metrics follow the naming convention `price_feed_*`.
#[derive(Clone)]
pub struct FeedMetrics {
    /// Prometheus registry.
    registry: Registry,
    /// Ticks parsed and forwarded, by provider and internal symbol.
    pub ticks_received: IntCounterVec,
    /// Frames discarded as malformed, by provider.
    pub frames_discarded: IntCounterVec,
    /// Fatal transport failures, by provider.
    pub transport_failures: IntCounterVec,
    /// Strategies currently streaming.
    pub feeds_streaming: IntGauge,
    /// Registered push subscribers.
    pub subscribers: IntGauge,
    /// Updates dropped because a subscriber queue was full.
    pub broadcast_dropped: IntCounter,
}

impl FeedMetrics {
    /// Create and register all Prometheus metrics.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let ticks_received = IntCounterVec::new(
            Opts::new("price_feed_ticks_received_total", "Ticks parsed and forwarded"),
            &["provider", "symbol"],
        )?;

        let frames_discarded = IntCounterVec::new(
            Opts::new(
                "price_feed_frames_discarded_total",
                "Malformed frames skipped by the receive loop",
            ),
            &["provider"],
        )?;

        let transport_failures = IntCounterVec::new(
            Opts::new(
                "price_feed_transport_failures_total",
                "Connections terminated by a transport error",
            ),
            &["provider"],
        )?;

        let feeds_streaming = IntGauge::new(
            "price_feed_feeds_streaming",
            "Provider connections currently streaming",
        )?;

        let subscribers = IntGauge::new(
            "price_feed_subscribers",
            "Registered push subscribers",
        )?;

        let broadcast_dropped = IntCounter::new(
            "price_feed_broadcast_dropped_total",
            "Updates dropped because a subscriber queue was full",
        )?;

        registry.register(Box::new(ticks_received.clone()))?;
        registry.register(Box::new(frames_discarded.clone()))?;
        registry.register(Box::new(transport_failures.clone()))?;
        registry.register(Box::new(feeds_streaming.clone()))?;
        registry.register(Box::new(subscribers.clone()))?;
        registry.register(Box::new(broadcast_dropped.clone()))?;

        Ok(Self {
            registry,
            ticks_received,
            frames_discarded,
            transport_failures,
            feeds_streaming,
            subscribers,
            broadcast_dropped,
        })
    }

    pub fn record_tick(&self, provider: Provider, symbol: &str) {
        self.ticks_received
            .with_label_values(&[provider.as_str(), symbol])
            .inc();
    }

    pub fn record_discarded(&self, provider: Provider) {
        self.frames_discarded
            .with_label_values(&[provider.as_str()])
            .inc();
    }

    pub fn record_transport_failure(&self, provider: Provider) {
        self.transport_failures
            .with_label_values(&[provider.as_str()])
            .inc();
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl std::fmt::Debug for FeedMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedMetrics").finish_non_exhaustive()
    }
}
