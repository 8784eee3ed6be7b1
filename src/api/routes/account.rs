//! Account and metrics endpoints

use super::{internal_error, ApiError};
use crate::api::server::AppState;
use crate::services::MetricsSnapshot;
use crate::types::Account;
use axum::{extract::State, Json};

/// Account for the configured owner, reconciled with the broker when live
pub async fn get_account(State(state): State<AppState>) -> Result<Json<Account>, ApiError> {
    let account = state
        .account_sync
        .reconcile()
        .await
        .map_err(|e| internal_error("Failed to fetch account data", format!("{:#}", e)))?;
    Ok(Json(account))
}

/// Monitor and desk counters
pub async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
