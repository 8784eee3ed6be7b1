//! Trade API endpoints

use super::{desk_error, internal_error, ApiError};
use crate::api::server::AppState;
use crate::types::{Account, NewOrder, Trade, TradeView};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

/// Response for order placement and manual close
#[derive(Debug, Serialize)]
pub struct TradeResponse {
    pub trade: TradeView,
    pub message: String,
}

/// Snapshot polled by the dashboard
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeStatusResponse {
    pub active_trades: Vec<TradeView>,
    pub account: Option<Account>,
}

fn views(trades: &[Trade]) -> Vec<TradeView> {
    trades.iter().map(TradeView::from).collect()
}

/// Place a market order with TP1/TP2/SL management
pub async fn place_trade(
    State(state): State<AppState>,
    Json(order): Json<NewOrder>,
) -> Result<Json<TradeResponse>, ApiError> {
    let side = order.side;
    let trade = state
        .desk
        .place_order(state.owner_id(), order)
        .await
        .map_err(desk_error)?;

    Ok(Json(TradeResponse {
        trade: trade.view(),
        message: format!("{} order placed successfully", side),
    }))
}

/// All trades, newest first
pub async fn list_trades(State(state): State<AppState>) -> Result<Json<Vec<TradeView>>, ApiError> {
    let trades = state
        .desk
        .list_trades(state.owner_id())
        .await
        .map_err(desk_error)?;
    Ok(Json(views(&trades)))
}

/// Trades that are still open (including after TP1)
pub async fn list_positions(State(state): State<AppState>) -> Result<Json<Vec<TradeView>>, ApiError> {
    let trades = state
        .desk
        .active_trades(state.owner_id())
        .await
        .map_err(desk_error)?;
    Ok(Json(views(&trades)))
}

/// Close a trade now; closing an already-closed trade returns it unchanged
pub async fn close_trade(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TradeResponse>, ApiError> {
    let trade = state.desk.close_trade(id).await.map_err(desk_error)?;

    Ok(Json(TradeResponse {
        trade: trade.view(),
        message: "Trade closed successfully".to_string(),
    }))
}

/// Active trades plus the account
pub async fn trade_status(State(state): State<AppState>) -> Result<Json<TradeStatusResponse>, ApiError> {
    let owner = state.owner_id();
    let active = state
        .store
        .get_active_trades(owner)
        .await
        .map_err(|e| internal_error("Failed to fetch trade status", e))?;
    let account = state
        .store
        .get_account(owner)
        .await
        .map_err(|e| internal_error("Failed to fetch trade status", e))?;

    Ok(Json(TradeStatusResponse {
        active_trades: views(&active),
        account,
    }))
}
