//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies. Each sub-module groups adapters by
//! infrastructure concern.
//!
//! Adapter categories:
//! - `api`: REST lookup, WebSocket push hub and health probes (axum)
//! - `feeds`: Provider WebSocket strategies (Binance, Tiingo)
//! - `metrics`: Prometheus metrics registry

pub mod api;
pub mod feeds;
pub mod metrics;
