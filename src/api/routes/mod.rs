//! API route handlers

pub mod account;
pub mod market_data;
pub mod trades;

use crate::services::DeskError;
use axum::{http::StatusCode, Json};
use serde::Serialize;
use tracing::error;

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

/// Handler error: status plus JSON body
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            message: message.into(),
        }),
    )
}

/// Internal failure; details go to the log, not the client
pub fn internal_error(context: &str, err: impl std::fmt::Display) -> ApiError {
    error!("{}: {}", context, err);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, context)
}

impl From<DeskError> for ErrorResponse {
    fn from(err: DeskError) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}

pub fn desk_error(err: DeskError) -> ApiError {
    let status = match &err {
        DeskError::Validation(_) => StatusCode::BAD_REQUEST,
        DeskError::NotFound(_) => StatusCode::NOT_FOUND,
        DeskError::Broker(_) => StatusCode::BAD_GATEWAY,
        DeskError::Store(e) => return internal_error("Storage error", format!("{:#}", e)),
    };
    (status, Json(err.into()))
}
