//! Health Checks - Liveness and Readiness Probes
//!
//! `/live` answers as long as the process runs. `/ready` requires at
//! least one streaming feed and no shutdown in progress. `/metrics`
//! renders the Prometheus registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;

use super::ApiState;
use crate::adapters::metrics::FeedMetrics;

/// Shared health state polled by readiness probes.
#[derive(Debug)]
pub struct HealthState {
    shutting_down: AtomicBool,
    metrics: Arc<FeedMetrics>,
}

impl HealthState {
    pub fn new(metrics: Arc<FeedMetrics>) -> Self {
        Self {
            shutting_down: AtomicBool::new(false),
            metrics,
        }
    }

    /// Flip readiness off for the rest of the process lifetime.
    pub fn mark_shutting_down(&self) {
        self.shutting_down.store(true, Ordering::Relaxed);
    }

    /// Check if the service is ready to serve traffic.
    pub fn is_ready(&self) -> bool {
        !self.shutting_down.load(Ordering::Relaxed) && self.metrics.feeds_streaming.get() > 0
    }
}

/// Liveness probe: always returns 200 if the process is running.
pub async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness probe.
pub async fn readiness(State(state): State<ApiState>) -> impl IntoResponse {
    if state.health.is_ready() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<ApiState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
