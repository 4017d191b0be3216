// Price Feed Integration
//
// The engine only needs two numbers from the outside world: the USD price of
// a perp's underlying asset and the rate that converts USD into the ledger
// currency. Anything that can answer both implements PriceOracle. Prices are
// always fetched outside ledger transactions.

use crate::types::Price;
use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("No price available for {0}")]
    NoPrice(String),

    #[error("Oracle request failed: {0}")]
    Transport(String),

    #[error("Malformed oracle response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// USD price of `asset_id`.
    async fn asset_price_usd(&self, asset_id: &str) -> Result<Price, OracleError>;

    /// Units of ledger currency per USD.
    async fn quote_rate(&self) -> Result<Decimal, OracleError>;
}

/// Scriptable oracle for tests and the simulator.
#[derive(Debug)]
pub struct MockPriceFeed {
    prices: Mutex<HashMap<String, Price>>,
    failing: Mutex<HashSet<String>>,
    quote_rate: Mutex<Decimal>,
    healthy: AtomicBool,
    fetches: AtomicU64,
}

impl MockPriceFeed {
    pub fn new(quote_rate: Decimal) -> Self {
        Self {
            prices: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            quote_rate: Mutex::new(quote_rate),
            healthy: AtomicBool::new(true),
            fetches: AtomicU64::new(0),
        }
    }

    pub fn with_price(self, asset_id: &str, price: Decimal) -> Self {
        self.set_price(asset_id, price);
        self
    }

    pub fn set_price(&self, asset_id: &str, price: Decimal) {
        if let (Some(price), Ok(mut prices)) = (Price::new(price), self.prices.lock()) {
            prices.insert(asset_id.to_string(), price);
        }
    }

    pub fn set_quote_rate(&self, rate: Decimal) {
        if let Ok(mut current) = self.quote_rate.lock() {
            *current = rate;
        }
    }

    /// Makes every call fail until restored.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Makes price lookups for one asset fail.
    pub fn fail_asset(&self, asset_id: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(asset_id.to_string());
        }
    }

    pub fn restore_asset(&self, asset_id: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.remove(asset_id);
        }
    }

    /// Number of asset price lookups served or refused so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    fn check_healthy(&self) -> Result<(), OracleError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(OracleError::Transport("mock feed offline".to_string()))
        }
    }
}

#[async_trait]
impl PriceOracle for MockPriceFeed {
    async fn asset_price_usd(&self, asset_id: &str) -> Result<Price, OracleError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_healthy()?;
        let failing = self
            .failing
            .lock()
            .map(|f| f.contains(asset_id))
            .unwrap_or(true);
        if failing {
            return Err(OracleError::NoPrice(asset_id.to_string()));
        }
        self.prices
            .lock()
            .ok()
            .and_then(|prices| prices.get(asset_id).copied())
            .ok_or_else(|| OracleError::NoPrice(asset_id.to_string()))
    }

    async fn quote_rate(&self) -> Result<Decimal, OracleError> {
        self.check_healthy()?;
        self.quote_rate
            .lock()
            .map(|rate| *rate)
            .map_err(|_| OracleError::Transport("rate lock poisoned".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpFeedConfig {
    /// Base URL of a CoinGecko-compatible API
    pub base_url: String,
    /// Asset whose price in `quote_currency` is the USD conversion rate
    pub rate_asset: String,
    pub quote_currency: String,
    pub timeout_ms: u64,
    /// How long a fetched price may be reused
    pub cache_ttl_ms: u64,
}

impl Default for HttpFeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            rate_asset: "tether".to_string(),
            quote_currency: "ngn".to_string(),
            timeout_ms: 5_000,
            cache_ttl_ms: 10_000,
        }
    }
}

/// Oracle backed by a `simple/price` JSON endpoint.
pub struct HttpPriceFeed {
    client: reqwest::Client,
    config: HttpFeedConfig,
    cache: Mutex<HashMap<(String, String), (Instant, Decimal)>>,
}

impl HttpPriceFeed {
    pub fn new(config: HttpFeedConfig) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            config,
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn cached(&self, key: &(String, String)) -> Option<Decimal> {
        let ttl = Duration::from_millis(self.config.cache_ttl_ms);
        let cache = self.cache.lock().ok()?;
        let hit = cache
            .get(key)
            .filter(|(at, _)| at.elapsed() < ttl)
            .map(|(_, value)| *value);
        hit
    }

    async fn simple_price(&self, id: &str, vs: &str) -> Result<Decimal, OracleError> {
        let key = (id.to_string(), vs.to_string());
        if let Some(value) = self.cached(&key) {
            return Ok(value);
        }

        let url = format!("{}/simple/price", self.config.base_url.trim_end_matches('/'));
        let body: serde_json::Value = self
            .client
            .get(&url)
            .query(&[("ids", id), ("vs_currencies", vs)])
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| OracleError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| OracleError::Malformed(e.to_string()))?;

        let value = parse_simple_price(&body, id, vs)?;
        debug!(asset = id, vs, %value, "oracle price fetched");

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, (Instant::now(), value));
        }
        Ok(value)
    }
}

/// Pulls `body[id][vs]` out of a `simple/price` response.
pub fn parse_simple_price(body: &serde_json::Value, id: &str, vs: &str) -> Result<Decimal, OracleError> {
    let raw = body
        .get(id)
        .and_then(|asset| asset.get(vs))
        .ok_or_else(|| OracleError::NoPrice(id.to_string()))?;
    let value = raw
        .as_f64()
        .and_then(Decimal::from_f64)
        .ok_or_else(|| OracleError::Malformed(format!("{}.{} is not a number", id, vs)))?;
    if value <= Decimal::ZERO {
        return Err(OracleError::Malformed(format!("{}.{} is not positive", id, vs)));
    }
    Ok(value)
}

#[async_trait]
impl PriceOracle for HttpPriceFeed {
    async fn asset_price_usd(&self, asset_id: &str) -> Result<Price, OracleError> {
        let value = self.simple_price(asset_id, "usd").await?;
        Price::new(value).ok_or_else(|| OracleError::NoPrice(asset_id.to_string()))
    }

    async fn quote_rate(&self) -> Result<Decimal, OracleError> {
        let rate_asset = self.config.rate_asset.clone();
        let quote_currency = self.config.quote_currency.clone();
        self.simple_price(&rate_asset, &quote_currency).await
    }
}
