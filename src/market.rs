//! Perpetual pair configuration.
//!
//! A pair maps a tradable symbol onto an oracle asset key and fixes the
//! contract size, the lot granularity and the house spread. Spread is quoted
//! in USD: entries pay half of it, exits pay a quarter.

use crate::types::{checked, Overflow, Price, Side};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairConfig {
    /// Symbol callers trade (e.g. "BTCUSD")
    pub symbol: String,
    /// Oracle asset key (e.g. "bitcoin")
    pub asset_id: String,
    /// Units of the asset per lot
    pub contract_multiplier: Decimal,
    /// Full spread in USD
    pub spread: Decimal,
    /// Lot granularity
    pub lot_step: Decimal,
    pub min_lots: Decimal,
}

impl PairConfig {
    pub fn btc_usd() -> Self {
        Self {
            symbol: "BTCUSD".to_string(),
            asset_id: "bitcoin".to_string(),
            contract_multiplier: dec!(0.01),
            spread: dec!(20),
            lot_step: dec!(0.01),
            min_lots: dec!(0.01),
        }
    }

    pub fn eth_usd() -> Self {
        Self {
            symbol: "ETHUSD".to_string(),
            asset_id: "ethereum".to_string(),
            contract_multiplier: dec!(0.1),
            spread: dec!(2),
            lot_step: dec!(0.01),
            min_lots: dec!(0.01),
        }
    }

    pub fn sol_usd() -> Self {
        Self {
            symbol: "SOLUSD".to_string(),
            asset_id: "solana".to_string(),
            contract_multiplier: Decimal::ONE,
            spread: dec!(0.2),
            lot_step: dec!(0.01),
            min_lots: dec!(0.01),
        }
    }

    pub fn half_spread(&self) -> Decimal {
        self.spread / dec!(2)
    }

    pub fn closing_spread(&self) -> Decimal {
        self.half_spread() / dec!(2)
    }

    /// Oracle price plus half the spread for longs, minus it for shorts.
    pub fn entry_price(&self, oracle: Price, side: Side) -> Result<Price, MarketError> {
        let shift = checked(self.half_spread().checked_mul(side.sign()), "entry_price")?;
        let raw = checked(oracle.value().checked_add(shift), "entry_price")?;
        Price::new(raw).ok_or(MarketError::SpreadExceedsPrice { oracle, spread: self.spread })
    }

    /// Oracle price minus the closing spread for longs, plus it for shorts.
    pub fn exit_price(&self, oracle: Price, side: Side) -> Result<Price, MarketError> {
        let shift = checked(self.closing_spread().checked_mul(side.sign()), "exit_price")?;
        let raw = checked(oracle.value().checked_sub(shift), "exit_price")?;
        Price::new(raw).ok_or(MarketError::SpreadExceedsPrice { oracle, spread: self.spread })
    }

    /// Rounds `lots` down to the lot step and enforces the minimum.
    pub fn round_lots(&self, lots: Decimal) -> Result<Decimal, MarketError> {
        let steps = checked(lots.checked_div(self.lot_step), "lot_steps")?.floor();
        let stepped = checked(steps.checked_mul(self.lot_step), "lots")?;
        if stepped < self.min_lots {
            return Err(MarketError::PositionTooSmall {
                lots,
                minimum: self.min_lots,
            });
        }
        Ok(stepped.normalize())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.trim().is_empty() || self.asset_id.trim().is_empty() {
            return Err("pair symbol and asset id must be set".to_string());
        }
        if self.contract_multiplier <= Decimal::ZERO {
            return Err(format!("{}: contract multiplier must be positive", self.symbol));
        }
        if self.spread < Decimal::ZERO {
            return Err(format!("{}: spread must not be negative", self.symbol));
        }
        if self.lot_step <= Decimal::ZERO || self.min_lots < self.lot_step {
            return Err(format!("{}: lot step must be positive and <= min lots", self.symbol));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketError {
    #[error("Unknown pair {0}")]
    UnknownPair(String),

    #[error("Position of {lots} lots is below the minimum {minimum}")]
    PositionTooSmall { lots: Decimal, minimum: Decimal },

    #[error("Spread {spread} swamps oracle price {oracle}")]
    SpreadExceedsPrice { oracle: Price, spread: Decimal },

    #[error(transparent)]
    Overflow(#[from] Overflow),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_and_exit_spread() {
        let pair = PairConfig::btc_usd();
        let oracle = Price::new_unchecked(dec!(60000));

        assert_eq!(pair.entry_price(oracle, Side::Long).unwrap().value(), dec!(60010));
        assert_eq!(pair.entry_price(oracle, Side::Short).unwrap().value(), dec!(59990));
        assert_eq!(pair.exit_price(oracle, Side::Long).unwrap().value(), dec!(59995));
        assert_eq!(pair.exit_price(oracle, Side::Short).unwrap().value(), dec!(60005));
    }

    #[test]
    fn lots_round_down_to_step() {
        let pair = PairConfig::btc_usd();
        assert_eq!(pair.round_lots(dec!(1.239)).unwrap(), dec!(1.23));
        assert!(matches!(
            pair.round_lots(dec!(0.009)),
            Err(MarketError::PositionTooSmall { .. })
        ));
    }

    #[test]
    fn short_entry_cannot_go_negative() {
        let pair = PairConfig {
            spread: dec!(10),
            ..PairConfig::sol_usd()
        };
        let oracle = Price::new_unchecked(dec!(4));
        assert!(pair.entry_price(oracle, Side::Short).is_err());
    }

    #[test]
    fn presets_are_valid() {
        for pair in [PairConfig::btc_usd(), PairConfig::eth_usd(), PairConfig::sol_usd()] {
            assert!(pair.validate().is_ok());
        }
    }
}
