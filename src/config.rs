//! Configuration management for the trade automator

use anyhow::Result;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Instrument traded by default (spot gold vs USD)
pub const DEFAULT_INSTRUMENT: &str = "XAU_USD";

/// Units per 1.0 lot for the modeled instrument
pub const DEFAULT_CONTRACT_SIZE: u64 = 100_000;

/// Automator configuration loaded from environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Broker REST credentials and market data settings
    pub broker: BrokerConfig,

    /// Owner, instrument and sizing shared by the desk and the monitor
    pub trading: TradingConfig,

    /// Trade monitor scheduling
    pub monitor: MonitorConfig,

    /// Whether orders are filled by the paper broker instead of the live API
    pub paper_trading: bool,

    /// Account reconciliation interval in seconds
    pub account_sync_interval_seconds: u64,

    /// Address the API server binds to
    pub server_addr: String,
}

/// Broker (OANDA v20) connection settings
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub api_key: Option<String>,
    pub account_id: Option<String>,
    pub base_url: String,
    /// Center of the simulated random walk used when live prices are unavailable
    pub reference_price: Decimal,
    pub request_timeout_seconds: u64,
}

impl BrokerConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://api-fxpractice.oanda.com";

    /// Live calls are only attempted with both an API key and an account id
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.account_id.is_some()
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            account_id: None,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            reference_price: Decimal::from(1987),
            request_timeout_seconds: 10,
        }
    }
}

/// Trading parameters
#[derive(Debug, Clone)]
pub struct TradingConfig {
    /// Owner whose trades are placed and monitored
    pub owner_id: String,
    pub instrument: String,
    /// Units per lot
    pub contract_size: Decimal,
    /// Balance an account is created with
    pub starting_balance: Decimal,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            owner_id: "default-user".to_string(),
            instrument: DEFAULT_INSTRUMENT.to_string(),
            contract_size: Decimal::from(DEFAULT_CONTRACT_SIZE),
            starting_balance: Decimal::from(10_000),
        }
    }
}

/// Trade monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Time between ticks
    pub interval: Duration,
    /// Whether triggers may fire on simulated quotes while the broker is live
    pub allow_simulated_triggers: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            allow_simulated_triggers: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            trading: TradingConfig::default(),
            monitor: MonitorConfig::default(),
            paper_trading: true,
            account_sync_interval_seconds: 30,
            server_addr: "0.0.0.0:5000".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Missing broker credentials are not an error: live broker calls are
    /// disabled and market data comes from the simulator.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let api_key = env::var("OANDA_API_KEY").ok().filter(|s| !s.is_empty());
        let account_id = env::var("OANDA_ACCOUNT_ID").ok().filter(|s| !s.is_empty());

        let base_url = env::var("OANDA_BASE_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| BrokerConfig::DEFAULT_BASE_URL.to_string());

        let reference_price = env::var("REFERENCE_PRICE")
            .ok()
            .and_then(|v| Decimal::from_str(&v).ok())
            .filter(|p| p.is_sign_positive() && !p.is_zero())
            .unwrap_or_else(|| Decimal::from(1987));

        let paper_trading = env::var("PAPER_TRADING")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(true); // Default to paper trading for safety

        let owner_id = env::var("TRADER_ID")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "default-user".to_string());

        let instrument = env::var("INSTRUMENT")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_INSTRUMENT.to_string());

        let contract_size = env::var("CONTRACT_SIZE")
            .ok()
            .and_then(|v| Decimal::from_str(&v).ok())
            .filter(|c| c.is_sign_positive() && !c.is_zero())
            .unwrap_or_else(|| Decimal::from(DEFAULT_CONTRACT_SIZE));

        let starting_balance = env::var("STARTING_BALANCE")
            .ok()
            .and_then(|v| Decimal::from_str(&v).ok())
            .unwrap_or_else(|| Decimal::from(10_000));

        let monitor_interval_seconds = env::var("MONITOR_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .unwrap_or(5);

        let allow_simulated_triggers = env::var("ALLOW_SIMULATED_TRIGGERS")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let account_sync_interval_seconds = env::var("ACCOUNT_SYNC_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .unwrap_or(30);

        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string());

        let broker = BrokerConfig {
            api_key,
            account_id,
            base_url,
            reference_price,
            ..BrokerConfig::default()
        };

        if !broker.is_configured() {
            warn!("OANDA credentials not found in environment - live broker calls disabled, using simulated market data");
            if !paper_trading {
                warn!("PAPER_TRADING=false without credentials: order placement and closes will fail");
            }
        }

        Ok(Self {
            broker,
            trading: TradingConfig {
                owner_id,
                instrument,
                contract_size,
                starting_balance,
            },
            monitor: MonitorConfig {
                interval: Duration::from_secs(monitor_interval_seconds),
                allow_simulated_triggers,
            },
            paper_trading,
            account_sync_interval_seconds,
            server_addr,
        })
    }

    /// Check if orders go to the live broker
    pub fn is_live(&self) -> bool {
        !self.paper_trading && self.broker.is_configured()
    }
}
