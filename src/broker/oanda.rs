//! OANDA v20 REST client
//!
//! Read paths (pricing, candles, account summary) never fail the caller: on
//! any broker error they fall back to simulated or last-known data, tagged as
//! such. Mutating paths (orders, closes, stop-loss changes) always surface
//! the error.

use super::errors::BrokerError;
use super::retry::{with_retry, RetryConfig};
use super::simulated::MarketSimulator;
use super::Broker;
use crate::config::BrokerConfig;
use crate::types::{AccountSummary, Candle, Granularity, OrderFill, PositionClose, PriceSource, Quote};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Largest candle count the broker serves per request
const MAX_CANDLES: usize = 5000;

/// Decimal places sent for XAU prices
const PRICE_DP: u32 = 3;

// ---- Wire types ------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PricingResponse {
    #[serde(default)]
    prices: Vec<OandaPrice>,
}

#[derive(Debug, Deserialize)]
struct OandaPrice {
    #[serde(default)]
    bids: Vec<PriceBucket>,
    #[serde(default)]
    asks: Vec<PriceBucket>,
}

#[derive(Debug, Deserialize)]
struct PriceBucket {
    price: String,
}

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    #[serde(default)]
    candles: Vec<OandaCandle>,
}

#[derive(Debug, Deserialize)]
struct OandaCandle {
    time: String,
    #[serde(default)]
    volume: u64,
    mid: Option<OandaOhlc>,
}

#[derive(Debug, Deserialize)]
struct OandaOhlc {
    o: String,
    h: String,
    l: String,
    c: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_create_transaction: Option<Transaction>,
    order_fill_transaction: Option<FillTransaction>,
    order_cancel_transaction: Option<CancelTransaction>,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FillTransaction {
    id: String,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    trade_opened: Option<TradeOpened>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TradeOpened {
    #[serde(rename = "tradeID")]
    trade_id: String,
}

#[derive(Debug, Deserialize)]
struct CancelTransaction {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloseResponse {
    long_order_fill_transaction: Option<FillTransaction>,
    short_order_fill_transaction: Option<FillTransaction>,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    account: OandaAccount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OandaAccount {
    balance: String,
    #[serde(rename = "unrealizedPL")]
    unrealized_pl: String,
    margin_used: String,
}

// ---- Client ----------------------------------------------------------------

/// REST client for the broker account
pub struct OandaClient {
    client: Client,
    config: BrokerConfig,
    simulator: MarketSimulator,
    retry: RetryConfig,
    last_summary: RwLock<AccountSummary>,
}

impl OandaClient {
    pub fn new(config: BrokerConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        let simulator = MarketSimulator::new(config.reference_price);

        Ok(Self {
            client,
            config,
            simulator,
            retry: RetryConfig::default(),
            last_summary: RwLock::new(AccountSummary {
                balance: Decimal::from(10_000),
                unrealized_pl: Decimal::ZERO,
                margin_used: Decimal::ZERO,
                source: PriceSource::Simulated,
            }),
        })
    }

    /// Override retry behaviour for idempotent calls
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn account_url(&self, path: &str) -> Result<String, BrokerError> {
        let account_id = self.config.account_id.as_ref().ok_or(BrokerError::NotConfigured)?;
        Ok(format!(
            "{}/v3/accounts/{}{}",
            self.config.base_url.trim_end_matches('/'),
            account_id,
            path
        ))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<T, BrokerError> {
        let api_key = self.config.api_key.as_ref().ok_or(BrokerError::NotConfigured)?;

        let mut request = self.client.request(method, url).bearer_auth(api_key);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BrokerError::from_network_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::from_response(status.as_u16(), &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BrokerError::Decode(e.to_string()))
    }

    async fn fetch_price(&self, instrument: &str) -> Result<Quote, BrokerError> {
        let url = self.account_url(&format!("/pricing?instruments={}", instrument))?;
        let response: PricingResponse = self.request(Method::GET, &url, None).await?;

        let price = response
            .prices
            .first()
            .ok_or_else(|| BrokerError::Decode(format!("no price for {}", instrument)))?;
        let bid = parse_decimal(price.bids.first().map(|b| b.price.as_str()), "bid")?;
        let ask = parse_decimal(price.asks.first().map(|a| a.price.as_str()), "ask")?;

        Ok(Quote::new(instrument, bid, ask, PriceSource::Live))
    }

    async fn fetch_candles(
        &self,
        instrument: &str,
        granularity: Granularity,
        count: usize,
    ) -> Result<Vec<Candle>, BrokerError> {
        let url = self.account_url(&format!(
            "/instruments/{}/candles?granularity={}&count={}&price=M",
            instrument, granularity, count
        ))?;
        let response: CandlesResponse = self.request(Method::GET, &url, None).await?;

        let mut candles = Vec::with_capacity(response.candles.len());
        for candle in response.candles {
            let Some(mid) = candle.mid else { continue };
            let time = DateTime::parse_from_rfc3339(&candle.time)
                .map_err(|e| BrokerError::Decode(format!("candle time {}: {}", candle.time, e)))?
                .timestamp();

            candles.push(Candle {
                time,
                open: parse_decimal(Some(&mid.o), "open")?,
                high: parse_decimal(Some(&mid.h), "high")?,
                low: parse_decimal(Some(&mid.l), "low")?,
                close: parse_decimal(Some(&mid.c), "close")?,
                volume: candle.volume,
            });
        }
        candles.sort_by_key(|c| c.time);

        Ok(candles)
    }

    async fn fetch_summary(&self) -> Result<AccountSummary, BrokerError> {
        let url = self.account_url("/summary")?;
        let response: SummaryResponse = self.request(Method::GET, &url, None).await?;
        let account = response.account;

        Ok(AccountSummary {
            balance: parse_decimal(Some(&account.balance), "balance")?,
            unrealized_pl: parse_decimal(Some(&account.unrealized_pl), "unrealizedPL")?,
            margin_used: parse_decimal(Some(&account.margin_used), "marginUsed")?,
            source: PriceSource::Live,
        })
    }

    /// Log a read-path failure; missing credentials were already reported at startup
    fn log_fallback(&self, what: &str, err: &BrokerError) {
        match err {
            BrokerError::NotConfigured => {
                debug!("[Broker] {} unavailable (no credentials), using simulated data", what)
            }
            err if err.is_transport() => {
                warn!("[Broker] Broker unreachable fetching {}: {} - using simulated data", what, err)
            }
            err => error!("[Broker] {} request rejected: {} - using simulated data", what, err),
        }
    }
}

#[async_trait]
impl Broker for OandaClient {
    fn is_live(&self) -> bool {
        self.config.is_configured()
    }

    async fn get_current_price(&self, instrument: &str) -> Quote {
        match with_retry(&self.retry, "pricing", || self.fetch_price(instrument)).await {
            Ok(quote) => quote,
            Err(e) => {
                self.log_fallback("price", &e);
                self.simulator.next_quote(instrument)
            }
        }
    }

    async fn get_candles(&self, instrument: &str, granularity: Granularity, count: usize) -> Vec<Candle> {
        let count = count.clamp(1, MAX_CANDLES);
        match with_retry(&self.retry, "candles", || self.fetch_candles(instrument, granularity, count)).await {
            Ok(candles) => candles,
            Err(e) => {
                self.log_fallback("candles", &e);
                self.simulator.candles(granularity, count)
            }
        }
    }

    async fn place_market_order(
        &self,
        instrument: &str,
        units: i64,
        take_profit: Option<Decimal>,
        stop_loss: Option<Decimal>,
    ) -> Result<OrderFill, BrokerError> {
        if units == 0 {
            return Err(BrokerError::OrderRejected("units must be non-zero".to_string()));
        }
        let url = self.account_url("/orders")?;

        let mut order = json!({
            "type": "MARKET",
            "instrument": instrument,
            "units": units.to_string(),
            "timeInForce": "FOK",
            "positionFill": "DEFAULT",
        });
        if let Some(tp) = take_profit {
            order["takeProfitOnFill"] = json!({ "price": format_price(tp), "timeInForce": "GTC" });
        }
        if let Some(sl) = stop_loss {
            order["stopLossOnFill"] = json!({ "price": format_price(sl), "timeInForce": "GTC" });
        }

        info!("[Broker] Placing market order: {} {} units", instrument, units);
        let response: OrderResponse = self
            .request(Method::POST, &url, Some(json!({ "order": order })))
            .await?;

        let Some(fill) = response.order_fill_transaction else {
            if let Some(cancel) = response.order_cancel_transaction {
                return Err(BrokerError::OrderRejected(
                    cancel.reason.unwrap_or_else(|| "order cancelled".to_string()),
                ));
            }
            let created = response
                .order_create_transaction
                .ok_or_else(|| BrokerError::Decode("order response without transactions".to_string()))?;
            return Ok(OrderFill {
                order_id: created.id,
                fill_price: None,
                paper: false,
            });
        };

        let fill_price = fill.price.as_deref().and_then(|p| Decimal::from_str(p).ok());
        let order_id = fill.trade_opened.map(|t| t.trade_id).unwrap_or(fill.id);
        info!("[Broker] Order filled: trade {} at {:?}", order_id, fill_price);

        Ok(OrderFill {
            order_id,
            fill_price,
            paper: false,
        })
    }

    async fn close_position(
        &self,
        instrument: &str,
        partial_units: Option<u64>,
    ) -> Result<PositionClose, BrokerError> {
        let url = self.account_url(&format!("/positions/{}/close", instrument))?;
        let units = partial_units
            .map(|u| u.to_string())
            .unwrap_or_else(|| "ALL".to_string());

        info!("[Broker] Closing {} position: {} units", instrument, units);
        let response: CloseResponse = self
            .request(Method::PUT, &url, Some(json!({ "units": units })))
            .await?;

        let closed_price = response
            .long_order_fill_transaction
            .or(response.short_order_fill_transaction)
            .and_then(|fill| fill.price)
            .and_then(|p| Decimal::from_str(&p).ok());

        Ok(PositionClose {
            closed_price,
            paper: false,
        })
    }

    async fn modify_stop_loss(&self, order_id: &str, new_price: Decimal) -> Result<(), BrokerError> {
        let url = self.account_url(&format!("/trades/{}/orders", order_id))?;
        let body = json!({
            "stopLoss": { "price": format_price(new_price), "timeInForce": "GTC" }
        });

        with_retry(&self.retry, "modify stop loss", || {
            self.request::<Value>(Method::PUT, &url, Some(body.clone()))
        })
        .await?;

        info!("[Broker] Stop loss for trade {} moved to {}", order_id, new_price);
        Ok(())
    }

    async fn get_account_summary(&self) -> AccountSummary {
        match with_retry(&self.retry, "account summary", || self.fetch_summary()).await {
            Ok(summary) => {
                if let Ok(mut last) = self.last_summary.write() {
                    *last = summary.clone();
                }
                summary
            }
            Err(e) => {
                self.log_fallback("account summary", &e);
                let last = match self.last_summary.read() {
                    Ok(guard) => guard.clone(),
                    Err(poisoned) => poisoned.into_inner().clone(),
                };
                AccountSummary {
                    source: PriceSource::Simulated,
                    ..last
                }
            }
        }
    }
}

fn parse_decimal(value: Option<&str>, field: &str) -> Result<Decimal, BrokerError> {
    let raw = value.ok_or_else(|| BrokerError::Decode(format!("missing {}", field)))?;
    Decimal::from_str(raw).map_err(|e| BrokerError::Decode(format!("{} '{}': {}", field, raw, e)))
}

/// Price string in the precision the broker accepts for XAU
fn format_price(price: Decimal) -> String {
    price.round_dp(PRICE_DP).normalize().to_string()
}
