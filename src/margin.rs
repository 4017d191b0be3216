//! Margin sizing for perpetual positions.
//!
//! Position value is `entry * lots * contract_multiplier`. Required margin is
//! that value divided by the (clamped) leverage, and the execution fee is a
//! flat fraction of the value. Both are debited together at open.
//!
//! Maintenance is expressed as a fraction of the posted margin: a position is
//! liquidated once its equity falls to `maintenance_margin_ratio * margin`.

use crate::market::{MarketError, PairConfig};
use crate::types::{checked, Bps, Leverage, Price, Quote};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarginParams {
    pub max_leverage: Leverage,
    pub maintenance_margin_ratio: Decimal,
    pub execution_fee: Bps,
}

impl Default for MarginParams {
    fn default() -> Self {
        Self {
            max_leverage: Leverage::new(dec!(100)).unwrap_or_else(|| unreachable!()),
            maintenance_margin_ratio: dec!(0.5),
            execution_fee: Bps::new(10),
        }
    }
}

/// Margin and fee for a sized position. Values are in USD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarginRequirement {
    pub lots: Decimal,
    pub position_value: Decimal,
    pub initial: Decimal,
    pub maintenance: Decimal,
    pub fee: Decimal,
    pub effective_leverage: Leverage,
}

pub fn notional_value(lots: Decimal, price: Price, pair: &PairConfig) -> Result<Decimal, MarketError> {
    let per_lot = checked(price.value().checked_mul(pair.contract_multiplier), "lot_value")?;
    Ok(checked(lots.checked_mul(per_lot), "notional")?)
}

pub fn effective_leverage(requested: Leverage, params: &MarginParams) -> Leverage {
    requested.clamp_to(params.max_leverage)
}

/// Largest lot count (rounded down to the pair's step) that `collateral_usd`
/// can carry at `leverage`.
pub fn size_position(
    collateral_usd: Decimal,
    entry_price: Price,
    leverage: Leverage,
    pair: &PairConfig,
) -> Result<Decimal, MarketError> {
    let per_lot = checked(entry_price.value().checked_mul(pair.contract_multiplier), "lot_value")?;
    let buying_power = checked(collateral_usd.checked_mul(leverage.value()), "buying_power")?;
    let raw = checked(buying_power.checked_div(per_lot), "lots")?;
    pair.round_lots(raw)
}

pub fn calculate_margin_requirement(
    lots: Decimal,
    entry_price: Price,
    requested_leverage: Leverage,
    pair: &PairConfig,
    params: &MarginParams,
) -> Result<MarginRequirement, MarketError> {
    let effective_leverage = effective_leverage(requested_leverage, params);
    let position_value = notional_value(lots, entry_price, pair)?;
    let initial = checked(
        position_value.checked_div(effective_leverage.value()),
        "initial_margin",
    )?;
    let maintenance = checked(initial.checked_mul(params.maintenance_margin_ratio), "maintenance_margin")?;
    let fee = checked(position_value.checked_mul(params.execution_fee.as_fraction()), "execution_fee")?;

    Ok(MarginRequirement {
        lots,
        position_value,
        initial,
        maintenance,
        fee,
        effective_leverage,
    })
}

/// Converts a USD amount into the ledger currency.
pub fn to_local(usd: Decimal, quote_rate: Decimal) -> Result<Quote, MarketError> {
    Ok(Quote::new(checked(usd.checked_mul(quote_rate), "to_local")?))
}

/// Converts a ledger-currency amount into USD.
pub fn to_usd(local: Quote, quote_rate: Decimal) -> Result<Decimal, MarketError> {
    if quote_rate.is_zero() {
        return Ok(Decimal::ZERO);
    }
    Ok(checked(local.value().checked_div(quote_rate), "to_usd")?)
}
