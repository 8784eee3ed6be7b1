//! Axum server setup and configuration

use crate::api::routes;
use crate::broker::{build_broker, Broker};
use crate::services::{AccountSync, Desk, Metrics, TradeMonitor};
use crate::store::{MemoryStore, TradeStore};
use crate::Config;
use anyhow::Result;
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub broker: Arc<dyn Broker>,
    pub store: Arc<dyn TradeStore>,
    pub desk: Arc<Desk>,
    pub monitor: Arc<TradeMonitor>,
    pub account_sync: Arc<AccountSync>,
    pub metrics: Metrics,
}

impl AppState {
    /// Build the broker selected by `config` over an in-memory store
    pub async fn new(config: Config) -> Result<Self> {
        let broker = build_broker(&config)?;
        let store: Arc<dyn TradeStore> = Arc::new(MemoryStore::new());
        let state = Self::with_services(config, broker, store);

        state
            .store
            .ensure_account(&state.config.trading.owner_id, state.config.trading.starting_balance)
            .await?;

        Ok(state)
    }

    /// Wire services around an existing broker and store
    pub fn with_services(config: Config, broker: Arc<dyn Broker>, store: Arc<dyn TradeStore>) -> Self {
        let metrics = Metrics::new();
        let desk = Desk::new(
            broker.clone(),
            store.clone(),
            config.trading.clone(),
            metrics.clone(),
        );
        let monitor = TradeMonitor::new(
            broker.clone(),
            store.clone(),
            config.trading.clone(),
            config.monitor.clone(),
            metrics.clone(),
        );
        let account_sync = AccountSync::new(broker.clone(), store.clone(), config.trading.clone());

        Self {
            config: Arc::new(config),
            broker,
            store,
            desk: Arc::new(desk),
            monitor: Arc::new(monitor),
            account_sync: Arc::new(account_sync),
            metrics,
        }
    }

    /// Owner all requests act for
    pub fn owner_id(&self) -> &str {
        &self.config.trading.owner_id
    }
}

/// Create the Axum application with all routes
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let api_routes = Router::new()
        // Market data
        .route("/market/xauusd", get(routes::market_data::get_quote))
        .route("/market/xauusd/candles", get(routes::market_data::get_candles))
        // Trades
        .route(
            "/trades",
            get(routes::trades::list_trades).post(routes::trades::place_trade),
        )
        .route("/trades/status", get(routes::trades::trade_status))
        .route("/trades/:id/close", post(routes::trades::close_trade))
        .route("/positions", get(routes::trades::list_positions))
        // Account
        .route("/account", get(routes::account::get_account))
        .route("/metrics", get(routes::account::get_metrics));

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
