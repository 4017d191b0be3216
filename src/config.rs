// 7.0 config.rs: all settings in one place. engine params, sweeper cadence,
// oracle source, log filter. loaded from TOML, every section optional.
// 7.1 Environment picks a preset; the file then overrides fields of it.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::engine::EngineConfig;
use crate::price_feed::{HttpFeedConfig, HttpPriceFeed, MockPriceFeed, OracleError, PriceOracle};
use crate::sweeper::SweeperConfig;
use crate::types::{Bps, Leverage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleSource {
    Mock,
    Http,
}

/** 7.2: where prices come from. mock prices are USD, mock rate is local per USD */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub source: OracleSource,
    pub http: HttpFeedConfig,
    pub mock_quote_rate: Decimal,
    pub mock_prices: BTreeMap<String, Decimal>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        let mut mock_prices = BTreeMap::new();
        mock_prices.insert("bitcoin".to_string(), dec!(60000));
        mock_prices.insert("ethereum".to_string(), dec!(3000));
        mock_prices.insert("solana".to_string(), dec!(150));
        Self {
            source: OracleSource::Mock,
            http: HttpFeedConfig::default(),
            mock_quote_rate: dec!(1500),
            mock_prices,
        }
    }
}

impl OracleConfig {
    pub fn mock_feed(&self) -> MockPriceFeed {
        self.mock_prices
            .iter()
            .fold(MockPriceFeed::new(self.mock_quote_rate), |feed, (asset, price)| {
                feed.with_price(asset, *price)
            })
    }

    pub fn build(&self) -> Result<Arc<dyn PriceOracle>, OracleError> {
        match self.source {
            OracleSource::Mock => Ok(Arc::new(self.mock_feed())),
            OracleSource::Http => Ok(Arc::new(HttpPriceFeed::new(self.http.clone())?)),
        }
    }
}

/** 7.3: the complete platform configuration */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub environment: Environment,
    pub engine: EngineConfig,
    pub sweeper: SweeperConfig,
    pub oracle: OracleConfig,
    /// `tracing_subscriber::EnvFilter` directive, overridden by RUST_LOG
    pub log_filter: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            engine: EngineConfig::default(),
            sweeper: SweeperConfig::default(),
            oracle: OracleConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl PlatformConfig {
    // fast sweeps and debug logs against the mock oracle
    pub fn development() -> Self {
        let mut config = Self::default();
        config.sweeper.interval_ms = 2_000;
        config.log_filter = "debug".to_string();
        config
    }

    pub fn testnet() -> Self {
        let mut config = Self::default();
        config.environment = Environment::Testnet;
        config.engine.margin.max_leverage = leverage(dec!(20));
        config
    }

    // live prices, lower leverage ceiling, more retries under contention
    pub fn mainnet() -> Self {
        let mut config = Self::default();
        config.environment = Environment::Mainnet;
        config.engine.margin.max_leverage = leverage(dec!(50));
        config.engine.retry.max_attempts = 8;
        config.oracle.source = OracleSource::Http;
        config.sweeper.interval_ms = 5_000;
        config.log_filter = "info,curveperp_core=info".to_string();
        config
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let margin = &self.engine.margin;
        // maintenance is a fraction of posted margin, so it must sit in (0, 1)
        if margin.maintenance_margin_ratio <= Decimal::ZERO || margin.maintenance_margin_ratio >= Decimal::ONE {
            return Err(ConfigError::InvalidMargin {
                reason: "maintenance margin ratio must be between 0 and 1".to_string(),
            });
        }
        if margin.max_leverage.value() < Decimal::ONE {
            return Err(ConfigError::InvalidMargin {
                reason: "max leverage must be at least 1".to_string(),
            });
        }
        if !bps_in_range(margin.execution_fee, 1_000) {
            return Err(ConfigError::InvalidMargin {
                reason: "execution fee must be between 0 and 10%".to_string(),
            });
        }

        let curve = &self.engine.curve;
        if !bps_in_range(curve.trade_fee, 1_000) {
            return Err(ConfigError::InvalidCurve {
                reason: "trade fee must be between 0 and 10%".to_string(),
            });
        }
        if curve.dust_threshold < Decimal::ZERO {
            return Err(ConfigError::InvalidCurve {
                reason: "dust threshold must not be negative".to_string(),
            });
        }
        if curve.max_chart_points == 0 {
            return Err(ConfigError::InvalidCurve {
                reason: "chart must keep at least one point".to_string(),
            });
        }
        let tiers_ascending = curve
            .creation_fee_tiers
            .windows(2)
            .all(|w| w[0].max_market_cap < w[1].max_market_cap);
        if !tiers_ascending || curve.creation_fee_tiers.iter().any(|t| t.fee.is_negative()) {
            return Err(ConfigError::InvalidCurve {
                reason: "creation fee tiers must ascend by market cap with non-negative fees".to_string(),
            });
        }

        if self.engine.pairs.is_empty() {
            return Err(ConfigError::InvalidPair {
                reason: "at least one pair must be configured".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for pair in &self.engine.pairs {
            pair.validate().map_err(|reason| ConfigError::InvalidPair { reason })?;
            if !seen.insert(pair.symbol.to_ascii_uppercase()) {
                return Err(ConfigError::InvalidPair {
                    reason: format!("duplicate pair {}", pair.symbol),
                });
            }
        }

        let retry = &self.engine.retry;
        if retry.max_attempts == 0 || retry.base_backoff_ms > retry.max_backoff_ms {
            return Err(ConfigError::InvalidRetry {
                reason: "need at least one attempt and base backoff <= max backoff".to_string(),
            });
        }

        if self.sweeper.enabled && self.sweeper.interval_ms == 0 {
            return Err(ConfigError::InvalidSweeper {
                reason: "sweep interval must be positive".to_string(),
            });
        }
        if self.sweeper.enabled && self.sweeper.stale_after_ms <= self.sweeper.interval_ms as i64 {
            return Err(ConfigError::InvalidSweeper {
                reason: "stale_after_ms must exceed the sweep interval".to_string(),
            });
        }

        match self.oracle.source {
            OracleSource::Mock => {
                if self.oracle.mock_quote_rate <= Decimal::ZERO
                    || self.oracle.mock_prices.values().any(|p| *p <= Decimal::ZERO)
                {
                    return Err(ConfigError::InvalidOracle {
                        reason: "mock rate and prices must be positive".to_string(),
                    });
                }
            }
            OracleSource::Http => {
                if self.oracle.http.base_url.trim().is_empty() || self.oracle.http.timeout_ms == 0 {
                    return Err(ConfigError::InvalidOracle {
                        reason: "http oracle needs a base url and a timeout".to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

fn bps_in_range(bps: Bps, max: i32) -> bool {
    (0..=max).contains(&bps.value())
}

fn leverage(value: Decimal) -> Leverage {
    Leverage::new(value).unwrap_or_else(|| unreachable!())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid margin config: {reason}")]
    InvalidMargin { reason: String },

    #[error("Invalid curve config: {reason}")]
    InvalidCurve { reason: String },

    #[error("Invalid pair config: {reason}")]
    InvalidPair { reason: String },

    #[error("Invalid retry config: {reason}")]
    InvalidRetry { reason: String },

    #[error("Invalid sweeper config: {reason}")]
    InvalidSweeper { reason: String },

    #[error("Invalid oracle config: {reason}")]
    InvalidOracle { reason: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> PlatformConfig {
        match self {
            Environment::Development => PlatformConfig::development(),
            Environment::Testnet => PlatformConfig::testnet(),
            Environment::Mainnet => PlatformConfig::mainnet(),
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "testnet" => Ok(Environment::Testnet),
            "mainnet" | "prod" | "production" => Ok(Environment::Mainnet),
            other => Err(ConfigError::Parse(format!("unknown environment {}", other))),
        }
    }
}
