//! Broker API error differentiation
//!
//! Parses OANDA v20 error responses into structured types so callers can
//! decide between retrying, falling back to simulated data, or surfacing the
//! failure.

use serde::Deserialize;
use thiserror::Error;

/// Structured broker error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// API key or account id missing from the environment
    #[error("broker credentials not configured")]
    NotConfigured,
    /// API key rejected or account not accessible
    #[error("broker authentication failed")]
    AuthenticationFailed,
    /// Rate limited by the broker
    #[error("rate limited by broker")]
    RateLimited,
    /// Network/connection error (timeout, DNS, etc.)
    #[error("network error: {0}")]
    Network(String),
    /// Not enough margin to open the order
    #[error("insufficient margin for order")]
    InsufficientMargin,
    /// Nothing open on the instrument to close
    #[error("no open position to close")]
    NoPosition,
    /// Instrument is not tradeable right now
    #[error("market is halted")]
    MarketHalted,
    /// Order cancelled or rejected by the broker
    #[error("order rejected: {0}")]
    OrderRejected(String),
    /// Response body did not have the expected shape
    #[error("unexpected broker response: {0}")]
    Decode(String),
    /// Unknown error with status code and body
    #[error("broker API error {status}: {body}")]
    Api { status: u16, body: String },
}

/// OANDA error response format
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OandaErrorResponse {
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    reject_reason: Option<String>,
}

impl BrokerError {
    /// Parse a non-success broker response into a structured error
    pub fn from_response(status: u16, body: &str) -> Self {
        let (message, code) = match serde_json::from_str::<OandaErrorResponse>(body) {
            Ok(parsed) => (
                parsed.error_message.unwrap_or_else(|| body.to_string()),
                parsed.error_code.or(parsed.reject_reason).unwrap_or_default(),
            ),
            Err(_) => (body.to_string(), String::new()),
        };

        let text = format!("{} {}", code, message).to_lowercase();

        if status == 429 || text.contains("rate limit") || text.contains("too many requests") {
            return BrokerError::RateLimited;
        }

        if status == 401 || status == 403 || text.contains("unauthorized") || text.contains("insufficient authorization") {
            return BrokerError::AuthenticationFailed;
        }

        if text.contains("insufficient_margin") || text.contains("insufficient margin") {
            return BrokerError::InsufficientMargin;
        }

        if text.contains("closeout_position_doesnt_exist") || text.contains("position_not_found") || text.contains("does not exist") {
            return BrokerError::NoPosition;
        }

        if text.contains("market_halted") || text.contains("halted") {
            return BrokerError::MarketHalted;
        }

        if !code.is_empty() && (400..500).contains(&status) {
            return BrokerError::OrderRejected(format!("{}: {}", code, message));
        }

        BrokerError::Api {
            status,
            body: message,
        }
    }

    /// Parse a network/reqwest error
    pub fn from_network_error(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            BrokerError::Network("Request timed out".to_string())
        } else if err.is_connect() {
            BrokerError::Network("Connection failed".to_string())
        } else if err.is_decode() {
            BrokerError::Decode(err.to_string())
        } else {
            BrokerError::Network(err.to_string())
        }
    }

    /// Whether this error is retryable with exponential backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            BrokerError::RateLimited | BrokerError::Network(_) => true,
            BrokerError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Broker unreachable or refusing us, as opposed to rejecting the request itself
    pub fn is_transport(&self) -> bool {
        match self {
            BrokerError::NotConfigured
            | BrokerError::AuthenticationFailed
            | BrokerError::RateLimited
            | BrokerError::Network(_) => true,
            BrokerError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited() {
        let err = BrokerError::from_response(429, "");
        assert!(err.is_retryable());
        assert_eq!(err, BrokerError::RateLimited);
    }

    #[test]
    fn test_auth_failed() {
        let err = BrokerError::from_response(
            401,
            r#"{"errorMessage":"Insufficient authorization to perform request."}"#,
        );
        assert!(!err.is_retryable());
        assert!(err.is_transport());
        assert_eq!(err, BrokerError::AuthenticationFailed);
    }

    #[test]
    fn test_no_position() {
        let err = BrokerError::from_response(
            400,
            r#"{"errorCode":"CLOSEOUT_POSITION_DOESNT_EXIST","errorMessage":"The Position requested to be closed out does not exist"}"#,
        );
        assert_eq!(err, BrokerError::NoPosition);
        assert!(!err.is_transport());
    }

    #[test]
    fn test_insufficient_margin() {
        let err = BrokerError::from_response(
            400,
            r#"{"rejectReason":"INSUFFICIENT_MARGIN","errorMessage":"Order rejected"}"#,
        );
        assert_eq!(err, BrokerError::InsufficientMargin);
    }

    #[test]
    fn test_order_rejected_keeps_code() {
        let err = BrokerError::from_response(
            400,
            r#"{"errorCode":"STOP_LOSS_ON_FILL_PRICE_INVALID","errorMessage":"Invalid price"}"#,
        );
        assert!(matches!(err, BrokerError::OrderRejected(ref m) if m.contains("STOP_LOSS_ON_FILL_PRICE_INVALID")));
    }

    #[test]
    fn test_server_error_is_retryable() {
        let err = BrokerError::from_response(503, "Service Unavailable");
        assert!(err.is_retryable());
        assert!(matches!(err, BrokerError::Api { status: 503, .. }));
    }
}
