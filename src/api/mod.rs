//! Web API module for the trade automator
//!
//! REST endpoints for market data, order entry, manual closes and account state.

pub mod routes;
pub mod server;

pub use server::{create_app, AppState};
