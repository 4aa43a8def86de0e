//! Instrument list and latest-price lookup.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::debug;

use super::ApiState;
use crate::domain::InternalSymbol;

/// `GET /api/instruments`
pub async fn list_instruments(State(state): State<ApiState>) -> Json<Vec<InternalSymbol>> {
    Json(state.instruments.to_vec())
}

/// `GET /api/instruments/:symbol`
///
/// The path symbol is uppercased before the lookup.
pub async fn get_price(State(state): State<ApiState>, Path(symbol): Path<String>) -> Response {
    let symbol = InternalSymbol::normalized(&symbol);

    match state.prices.latest(&symbol) {
        Some(update) => Json(update).into_response(),
        None => {
            debug!(symbol = %symbol, "Price lookup miss");
            (
                StatusCode::NOT_FOUND,
                format!("Price not found for symbol {symbol}"),
            )
                .into_response()
        }
    }
}
