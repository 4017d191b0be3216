// 4.0: perpetual position records. prices are USD, collateral and pnl are in
// the ledger currency. a position leaves Open exactly once and never returns.
// 4.1 is pnl and payout, 4.2 the status transitions.

use crate::types::{checked, AccountId, Leverage, Overflow, PositionId, Price, Quote, Side, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Closed,
    Liquidated,
}

impl PositionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PositionStatus::Open)
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionStatus::Open => write!(f, "open"),
            PositionStatus::Closed => write!(f, "closed"),
            PositionStatus::Liquidated => write!(f, "liquidated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerpPosition {
    pub id: PositionId,
    pub account_id: AccountId,
    pub pair: String,
    pub asset_id: String,
    pub side: Side,
    pub leverage: Leverage,
    pub lots: Decimal,
    pub contract_multiplier: Decimal,
    pub collateral: Quote,
    pub fee: Quote,
    pub entry_price: Price,
    /// Fixed at open.
    pub liquidation_price: Price,
    pub quote_rate: Decimal,
    pub status: PositionStatus,
    pub exit_price: Option<Price>,
    pub realized_pnl: Option<Quote>,
    pub opened_at: Timestamp,
    pub closed_at: Option<Timestamp>,
}

/// Outcome of settling an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub realized_pnl: Quote,
    pub payout: Quote,
}

impl PerpPosition {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    pub fn size(&self) -> Result<Decimal, PositionError> {
        Ok(checked(self.lots.checked_mul(self.contract_multiplier), "size")?)
    }

    // 4.1: signed move times size, in USD
    pub fn pnl_usd(&self, exit_price: Price) -> Result<Decimal, PositionError> {
        let moved = checked(exit_price.value().checked_sub(self.entry_price.value()), "price_move")?;
        let signed = checked(moved.checked_mul(self.side.sign()), "price_move")?;
        Ok(checked(signed.checked_mul(self.size()?), "pnl_usd")?)
    }

    pub fn pnl_local(&self, exit_price: Price, quote_rate: Decimal) -> Result<Quote, PositionError> {
        let usd = self.pnl_usd(exit_price)?;
        Ok(Quote::new(checked(usd.checked_mul(quote_rate), "pnl_local")?))
    }

    /// Collateral plus pnl, floored at zero.
    pub fn payout(&self, pnl: Quote) -> Result<Quote, PositionError> {
        let gross = checked(self.collateral.checked_add(pnl), "payout")?;
        Ok(if gross.is_negative() { Quote::zero() } else { gross })
    }

    // 4.2: open -> closed
    pub fn close(
        &mut self,
        exit_price: Price,
        quote_rate: Decimal,
        timestamp: Timestamp,
    ) -> Result<Settlement, PositionError> {
        self.ensure_open()?;
        let realized_pnl = self.pnl_local(exit_price, quote_rate)?;
        let payout = self.payout(realized_pnl)?;

        self.status = PositionStatus::Closed;
        self.exit_price = Some(exit_price);
        self.realized_pnl = Some(realized_pnl);
        self.closed_at = Some(timestamp);

        Ok(Settlement {
            realized_pnl,
            payout,
        })
    }

    // 4.2: open -> liquidated. collateral is forfeited, nothing is paid out
    pub fn liquidate(&mut self, oracle: Price, timestamp: Timestamp) -> Result<Settlement, PositionError> {
        self.ensure_open()?;
        let realized_pnl = self.collateral.negate();

        self.status = PositionStatus::Liquidated;
        self.exit_price = Some(oracle);
        self.realized_pnl = Some(realized_pnl);
        self.closed_at = Some(timestamp);

        Ok(Settlement {
            realized_pnl,
            payout: Quote::zero(),
        })
    }

    fn ensure_open(&self) -> Result<(), PositionError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(PositionError::NotOpen {
                id: self.id,
                status: self.status,
            })
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.lots <= Decimal::ZERO {
            return Err(format!("position {} has non-positive lots", self.id));
        }
        if self.contract_multiplier <= Decimal::ZERO {
            return Err(format!("position {} has non-positive multiplier", self.id));
        }
        if self.collateral.is_negative() {
            return Err(format!("position {} has negative collateral", self.id));
        }
        if self.quote_rate <= Decimal::ZERO {
            return Err(format!("position {} has non-positive quote rate", self.id));
        }
        let wrong_side = match self.side {
            Side::Long => self.liquidation_price.value() > self.entry_price.value(),
            Side::Short => self.liquidation_price.value() < self.entry_price.value(),
        };
        if wrong_side {
            return Err(format!(
                "position {} liquidation price {} on the wrong side of entry {}",
                self.id, self.liquidation_price, self.entry_price
            ));
        }
        if self.status.is_terminal() && (self.realized_pnl.is_none() || self.closed_at.is_none()) {
            return Err(format!("position {} is {} without settlement", self.id, self.status));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    #[error("Position {id} is not open ({status})")]
    NotOpen { id: PositionId, status: PositionStatus },

    #[error(transparent)]
    Overflow(#[from] Overflow),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn open_long() -> PerpPosition {
        PerpPosition {
            id: PositionId::generate(),
            account_id: AccountId(7),
            pair: "BTCUSD".to_string(),
            asset_id: "bitcoin".to_string(),
            side: Side::Long,
            leverage: Leverage::new(dec!(10)).unwrap(),
            lots: dec!(10),
            contract_multiplier: dec!(0.01),
            collateral: Quote::new(dec!(750000)),
            fee: Quote::new(dec!(7500)),
            entry_price: Price::new_unchecked(dec!(50000)),
            liquidation_price: Price::new_unchecked(dec!(47500)),
            quote_rate: dec!(1500),
            status: PositionStatus::Open,
            exit_price: None,
            realized_pnl: None,
            opened_at: Timestamp::from_millis(0),
            closed_at: None,
        }
    }

    #[test]
    fn long_pnl_and_close() {
        let mut position = open_long();
        // +1000 USD on 0.1 BTC = +100 USD, at 1500 = 150000 local
        let settlement = position
            .close(Price::new_unchecked(dec!(51000)), dec!(1500), Timestamp::from_millis(5))
            .unwrap();

        assert_eq!(settlement.realized_pnl.value(), dec!(150000));
        assert_eq!(settlement.payout.value(), dec!(900000));
        assert_eq!(position.status, PositionStatus::Closed);
        assert!(position.validate().is_ok());
    }

    #[test]
    fn short_pnl_sign() {
        let mut position = open_long();
        position.side = Side::Short;
        position.liquidation_price = Price::new_unchecked(dec!(52500));
        assert_eq!(position.pnl_usd(Price::new_unchecked(dec!(49000))).unwrap(), dec!(100));
    }

    #[test]
    fn runaway_exit_price_fails_without_settling() {
        let mut position = open_long();
        position.lots = dec!(1_000_000_000_000);
        let err = position
            .close(Price::new_unchecked(Decimal::MAX), Decimal::MAX, Timestamp::from_millis(5))
            .unwrap_err();
        assert!(matches!(err, PositionError::Overflow(_)));
        assert!(position.is_open());
        assert_eq!(position.realized_pnl, None);
    }

    #[test]
    fn payout_never_negative() {
        let mut position = open_long();
        let settlement = position
            .close(Price::new_unchecked(dec!(30000)), dec!(1500), Timestamp::from_millis(5))
            .unwrap();
        assert!(settlement.realized_pnl.is_negative());
        assert_eq!(settlement.payout, Quote::zero());
    }

    #[test]
    fn liquidate_forfeits_collateral() {
        let mut position = open_long();
        let settlement = position
            .liquidate(Price::new_unchecked(dec!(47000)), Timestamp::from_millis(9))
            .unwrap();
        assert_eq!(settlement.realized_pnl.value(), dec!(-750000));
        assert_eq!(settlement.payout, Quote::zero());
        assert_eq!(position.status, PositionStatus::Liquidated);
        assert_eq!(position.exit_price, Some(Price::new_unchecked(dec!(47000))));
    }

    #[test]
    fn terminal_states_are_final() {
        let mut position = open_long();
        position
            .liquidate(Price::new_unchecked(dec!(47000)), Timestamp::from_millis(9))
            .unwrap();

        let err = position
            .close(Price::new_unchecked(dec!(60000)), dec!(1500), Timestamp::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, PositionError::NotOpen { status: PositionStatus::Liquidated, .. }));

        assert!(position
            .liquidate(Price::new_unchecked(dec!(40000)), Timestamp::from_millis(11))
            .is_err());
        assert_eq!(position.status, PositionStatus::Liquidated);
    }

    #[test]
    fn validate_rejects_inverted_liquidation_price() {
        let mut position = open_long();
        position.liquidation_price = Price::new_unchecked(dec!(51000));
        assert!(position.validate().is_err());
    }
}
