//! Metrics Adapter
//!
//! Prometheus counters and gauges for the ingestion and fan-out path.
//! Rendered on `/metrics` by the API router.

pub mod prometheus;

pub use prometheus::FeedMetrics;
