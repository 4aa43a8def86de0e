//! HTTP / WebSocket API - Outer Surface of the Service
//!
//! One axum 0.7 router carries everything a client or orchestrator
//! talks to:
//! - `routes`: instrument list and latest-price lookup
//! - `hub`: WebSocket push hub with per-symbol subscriptions
//! - `health`: liveness, readiness and Prometheus text export

pub mod health;
pub mod hub;
pub mod routes;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tracing::{info, instrument};

use crate::adapters::metrics::FeedMetrics;
use crate::domain::InternalSymbol;
use crate::ports::PriceLookup;
use crate::usecases::broadcaster::Broadcaster;
use crate::usecases::shutdown::Shutdown;

pub use health::HealthState;

/// State shared by every handler.
#[derive(Clone)]
pub struct ApiState {
    /// Latest-price reads.
    pub prices: Arc<dyn PriceLookup>,
    /// Configured internal symbols, sorted and distinct.
    pub instruments: Arc<[InternalSymbol]>,
    /// Push fan-out.
    pub broadcaster: Arc<Broadcaster>,
    pub metrics: Arc<FeedMetrics>,
    pub health: Arc<HealthState>,
    /// Cancelled when the process shuts down; closes open hub sockets.
    pub shutdown: Shutdown,
}

/// Build the full router.
pub fn app_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/instruments", get(routes::list_instruments))
        .route("/api/instruments/:symbol", get(routes::get_price))
        .route("/ws/prices", get(hub::websocket_handler))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .route("/metrics", get(health::metrics))
        .with_state(state)
}

/// Serve the router until `shutdown` is cancelled.
#[instrument(skip(state, shutdown))]
pub async fn serve(bind_address: &str, state: ApiState, shutdown: Shutdown) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!(address = %bind_address, "API server listening");

    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("API server stopped");
    Ok(())
}
