//! Engine configuration options.

use crate::curve::CurveParams;
use crate::ledger::RetryPolicy;
use crate::margin::MarginParams;
use crate::market::{MarketError, PairConfig};
use crate::types::AccountId;
use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fees paid by this account land in the admin bucket.
    pub operator_account: AccountId,
    pub curve: CurveParams,
    pub margin: MarginParams,
    pub pairs: Vec<PairConfig>,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operator_account: AccountId(1),
            curve: CurveParams::default(),
            margin: MarginParams::default(),
            pairs: vec![PairConfig::btc_usd(), PairConfig::eth_usd(), PairConfig::sol_usd()],
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn pair(&self, symbol: &str) -> Result<&PairConfig, MarketError> {
        self.pairs
            .iter()
            .find(|p| p.symbol.eq_ignore_ascii_case(symbol))
            .ok_or_else(|| MarketError::UnknownPair(symbol.to_string()))
    }
}
