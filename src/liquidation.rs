//! Liquidation price and breach checks.
//!
//! A position is liquidated once the oracle price crosses its liquidation
//! price: at or below it for longs, at or above it for shorts. The whole
//! posted collateral is forfeited; there is no partial liquidation and no
//! insurance fund.

use crate::types::{Leverage, Price, Side};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Floor for computed liquidation prices.
const MIN_LIQUIDATION_PRICE: Decimal = dec!(0.0001);

/// Maintenance margin as a fraction of notional: `imf * maintenance_ratio`.
pub fn maintenance_margin_fraction(leverage: Leverage, maintenance_ratio: Decimal) -> Decimal {
    leverage.initial_margin_fraction() * maintenance_ratio
}

/// Calculates the price at which a position gets liquidated.
///
/// Long: `entry * (1 - imf + mmf)`. Short: `entry * (1 + imf - mmf)`.
pub fn calculate_liquidation_price(
    entry_price: Price,
    leverage: Leverage,
    side: Side,
    maintenance_margin_fraction: Decimal,
) -> Price {
    let imf = leverage.initial_margin_fraction();

    let liq_price = match side {
        Side::Long => entry_price.value() * (Decimal::ONE - imf + maintenance_margin_fraction),
        Side::Short => entry_price.value() * (Decimal::ONE + imf - maintenance_margin_fraction),
    };

    Price::new_unchecked(liq_price.max(MIN_LIQUIDATION_PRICE))
}

/// True when `oracle` has crossed `liquidation_price` for `side`.
pub fn is_breached(side: Side, oracle: Price, liquidation_price: Price) -> bool {
    match side {
        Side::Long => oracle.value() <= liquidation_price.value(),
        Side::Short => oracle.value() >= liquidation_price.value(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidationStatus {
    Safe {
        /// Distance from oracle to liquidation price, as a percent of oracle.
        buffer_percent: Decimal,
    },
    Breached,
}

/// Breach check plus how far the oracle still is from the trigger. A buffer
/// too large to represent saturates at `Decimal::MAX`.
pub fn evaluate_liquidation(side: Side, oracle: Price, liquidation_price: Price) -> LiquidationStatus {
    if is_breached(side, oracle, liquidation_price) {
        return LiquidationStatus::Breached;
    }
    let distance = (oracle.value() - liquidation_price.value()).abs();
    let buffer_percent = distance
        .checked_div(oracle.value())
        .and_then(|fraction| fraction.checked_mul(dec!(100)))
        .unwrap_or(Decimal::MAX);
    LiquidationStatus::Safe { buffer_percent }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lev(x: Decimal) -> Leverage {
        Leverage::new(x).unwrap()
    }

    #[test]
    fn liquidation_price_long() {
        let entry = Price::new_unchecked(dec!(50000));
        let leverage = lev(dec!(10));
        let mmf = maintenance_margin_fraction(leverage, dec!(0.5));

        let liq_price = calculate_liquidation_price(entry, leverage, Side::Long, mmf);

        // 10% IM, 5% MM: a 5% adverse move liquidates
        assert_eq!(liq_price.value(), dec!(47500));
    }

    #[test]
    fn liquidation_price_short() {
        let entry = Price::new_unchecked(dec!(50000));
        let leverage = lev(dec!(10));
        let mmf = maintenance_margin_fraction(leverage, dec!(0.5));

        let liq_price = calculate_liquidation_price(entry, leverage, Side::Short, mmf);

        assert_eq!(liq_price.value(), dec!(52500));
    }

    #[test]
    fn twenty_x_long_at_1000() {
        let entry = Price::new_unchecked(dec!(1000));
        let leverage = lev(dec!(20));
        let mmf = maintenance_margin_fraction(leverage, dec!(0.5));

        let liq_price = calculate_liquidation_price(entry, leverage, Side::Long, mmf);
        assert_eq!(liq_price.value(), dec!(975));
        assert!(is_breached(Side::Long, Price::new_unchecked(dec!(970)), liq_price));
        assert!(is_breached(Side::Long, Price::new_unchecked(dec!(975)), liq_price));
        assert!(!is_breached(Side::Long, Price::new_unchecked(dec!(976)), liq_price));
    }

    #[test]
    fn short_breach_is_upward() {
        let liq = Price::new_unchecked(dec!(1025));
        assert!(is_breached(Side::Short, Price::new_unchecked(dec!(1025)), liq));
        assert!(!is_breached(Side::Short, Price::new_unchecked(dec!(1000)), liq));
    }

    #[test]
    fn higher_leverage_moves_liquidation_closer() {
        let entry = Price::new_unchecked(dec!(50000));
        let at = |x| {
            let l = lev(x);
            calculate_liquidation_price(entry, l, Side::Long, maintenance_margin_fraction(l, dec!(0.5)))
        };
        assert!(at(dec!(5)).value() < at(dec!(20)).value());
        assert!(at(dec!(20)).value() < at(dec!(100)).value());
        assert!(at(dec!(100)).value() < entry.value());
    }

    #[test]
    fn status_reports_buffer() {
        let liq = Price::new_unchecked(dec!(900));
        let status = evaluate_liquidation(Side::Long, Price::new_unchecked(dec!(1000)), liq);
        assert_eq!(status, LiquidationStatus::Safe { buffer_percent: dec!(10) });

        let status = evaluate_liquidation(Side::Long, Price::new_unchecked(dec!(899)), liq);
        assert_eq!(status, LiquidationStatus::Breached);

        let far_short = Price::new_unchecked(dec!(1000));
        let status = evaluate_liquidation(Side::Short, Price::new_unchecked(dec!(0.0000000000000000000000000001)), far_short);
        assert_eq!(status, LiquidationStatus::Safe { buffer_percent: Decimal::MAX });
    }
}
