//! Market data endpoints

use super::{api_error, ApiError};
use crate::api::server::AppState;
use crate::types::{Candle, Granularity, Quote};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

/// Default number of candles returned
const DEFAULT_CANDLE_COUNT: usize = 500;

/// Query params for candles
#[derive(Debug, Deserialize)]
pub struct CandlesQuery {
    /// M1, M5, M15, H1, H4 or D (default M1)
    pub granularity: Option<String>,
    /// Number of candles (default 500)
    pub count: Option<usize>,
}

/// Current quote; falls back to a simulated quote tagged `"source": "simulated"`
pub async fn get_quote(State(state): State<AppState>) -> Json<Quote> {
    Json(state.broker.get_current_price(&state.config.trading.instrument).await)
}

/// Recent candles, oldest first
pub async fn get_candles(
    State(state): State<AppState>,
    Query(params): Query<CandlesQuery>,
) -> Result<Json<Vec<Candle>>, ApiError> {
    let granularity = match params.granularity.as_deref() {
        Some(g) => g
            .parse::<Granularity>()
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?,
        None => Granularity::default(),
    };
    let count = params.count.unwrap_or(DEFAULT_CANDLE_COUNT);
    if count == 0 {
        return Err(api_error(StatusCode::BAD_REQUEST, "count must be positive"));
    }

    let candles = state
        .broker
        .get_candles(&state.config.trading.instrument, granularity, count)
        .await;

    Ok(Json(candles))
}
