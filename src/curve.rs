//! Constant-product bonding curve pricing.
//!
//! A ticker's curve is the pair `(market_cap, supply)` with
//! `price = market_cap / supply`. Each trade holds `k = market_cap * supply`
//! fixed for its own duration: buys push reserve into `market_cap` and pull
//! tokens out of `supply`, sells do the reverse.
//!
//! Every intermediate goes through checked arithmetic. An unrepresentable
//! value aborts the quote with [`CurveError::PricingCorruption`] so nothing
//! downstream can persist a poisoned curve.

use crate::types::{Bps, Quote, Timestamp};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveParams {
    pub trade_fee: Bps,
    /// Holdings below this are treated as empty.
    pub dust_threshold: Decimal,
    pub max_chart_points: usize,
    pub creation_fee_tiers: Vec<CreationFeeTier>,
}

impl Default for CurveParams {
    fn default() -> Self {
        Self {
            trade_fee: Bps::new(20),
            dust_threshold: dec!(0.000001),
            max_chart_points: 200,
            creation_fee_tiers: vec![
                CreationFeeTier {
                    max_market_cap: Quote::new(dec!(100_000)),
                    fee: Quote::new(dec!(1_000)),
                },
                CreationFeeTier {
                    max_market_cap: Quote::new(dec!(500_000)),
                    fee: Quote::new(dec!(2_500)),
                },
                CreationFeeTier {
                    max_market_cap: Quote::new(dec!(1_000_000)),
                    fee: Quote::new(dec!(5_000)),
                },
                CreationFeeTier {
                    max_market_cap: Quote::new(dec!(10_000_000)),
                    fee: Quote::new(dec!(10_000)),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreationFeeTier {
    pub max_market_cap: Quote,
    pub fee: Quote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveState {
    pub market_cap: Decimal,
    pub supply: Decimal,
}

impl CurveState {
    pub fn new(market_cap: Decimal, supply: Decimal) -> Result<Self, CurveError> {
        if market_cap <= Decimal::ZERO || supply <= Decimal::ZERO {
            return Err(CurveError::InvalidCurve { market_cap, supply });
        }
        Ok(Self { market_cap, supply })
    }

    /// `market_cap / supply`. A quotient too small to represent rounds to
    /// zero and is rejected along with any other non-positive result.
    pub fn price(&self) -> Result<Decimal, CurveError> {
        let price = guard(self.market_cap.checked_div(self.supply), "price")?;
        if price <= Decimal::ZERO {
            return Err(CurveError::PricingCorruption("price"));
        }
        Ok(price)
    }

    pub fn k(&self) -> Result<Decimal, CurveError> {
        guard(self.market_cap.checked_mul(self.supply), "k")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyQuote {
    pub ngn_amount: Quote,
    pub fee: Quote,
    pub ngn_for_curve: Quote,
    pub tokens_out: Decimal,
    pub price_before: Decimal,
    pub price_after: Decimal,
    /// Cost per token including the fee. Used as this trade's cost basis.
    pub avg_price: Decimal,
    pub after: CurveState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellQuote {
    pub token_amount: Decimal,
    pub ngn_before_fee: Quote,
    pub fee: Quote,
    pub ngn_to_user: Quote,
    pub price_before: Decimal,
    pub price_after: Decimal,
    pub after: CurveState,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CurveError {
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    #[error("Invalid curve state: market cap {market_cap}, supply {supply}")]
    InvalidCurve { market_cap: Decimal, supply: Decimal },

    #[error("Trade yields no tokens")]
    ZeroOutput,

    #[error("Sale proceeds would be negative: {0}")]
    NegativeProceeds(Decimal),

    #[error("Pricing corruption while computing {0}")]
    PricingCorruption(&'static str),
}

fn guard(value: Option<Decimal>, what: &'static str) -> Result<Decimal, CurveError> {
    value.ok_or(CurveError::PricingCorruption(what))
}

pub fn trade_fee(amount: Decimal, params: &CurveParams) -> Result<Decimal, CurveError> {
    guard(amount.checked_mul(params.trade_fee.as_fraction()), "fee")
}

/// Prices a buy of `ngn_amount` (fee inclusive) against the current curve.
pub fn quote_buy(
    state: &CurveState,
    ngn_amount: Decimal,
    params: &CurveParams,
) -> Result<BuyQuote, CurveError> {
    if ngn_amount <= Decimal::ZERO {
        return Err(CurveError::InvalidAmount(ngn_amount));
    }

    let k = state.k()?;
    let price_before = state.price()?;

    let fee = trade_fee(ngn_amount, params)?;
    let ngn_for_curve = guard(ngn_amount.checked_sub(fee), "ngn_for_curve")?;
    let new_market_cap = guard(state.market_cap.checked_add(ngn_for_curve), "new_market_cap")?;
    let new_supply = guard(k.checked_div(new_market_cap), "new_supply")?;
    let tokens_out = guard(state.supply.checked_sub(new_supply), "tokens_out")?;

    if tokens_out <= Decimal::ZERO || new_supply <= Decimal::ZERO {
        return Err(CurveError::ZeroOutput);
    }

    let after = CurveState {
        market_cap: new_market_cap,
        supply: new_supply,
    };
    let price_after = after.price()?;
    let avg_price = guard(ngn_amount.checked_div(tokens_out), "avg_price")?;

    Ok(BuyQuote {
        ngn_amount: Quote::new(ngn_amount),
        fee: Quote::new(fee),
        ngn_for_curve: Quote::new(ngn_for_curve),
        tokens_out,
        price_before,
        price_after,
        avg_price,
        after,
    })
}

/// Prices a sale of `token_amount` back into the curve.
pub fn quote_sell(
    state: &CurveState,
    token_amount: Decimal,
    params: &CurveParams,
) -> Result<SellQuote, CurveError> {
    if token_amount <= Decimal::ZERO {
        return Err(CurveError::InvalidAmount(token_amount));
    }

    let k = state.k()?;
    let price_before = state.price()?;

    let new_supply = guard(state.supply.checked_add(token_amount), "new_supply")?;
    let new_market_cap = guard(k.checked_div(new_supply), "new_market_cap")?;
    let ngn_before_fee = guard(state.market_cap.checked_sub(new_market_cap), "ngn_out")?;
    let fee = trade_fee(ngn_before_fee, params)?;
    let ngn_to_user = guard(ngn_before_fee.checked_sub(fee), "ngn_to_user")?;

    if ngn_to_user < Decimal::ZERO {
        return Err(CurveError::NegativeProceeds(ngn_to_user));
    }
    if new_market_cap <= Decimal::ZERO {
        return Err(CurveError::PricingCorruption("new_market_cap"));
    }

    let after = CurveState {
        market_cap: new_market_cap,
        supply: new_supply,
    };
    let price_after = after.price()?;

    Ok(SellQuote {
        token_amount,
        ngn_before_fee: Quote::new(ngn_before_fee),
        fee: Quote::new(fee),
        ngn_to_user: Quote::new(ngn_to_user),
        price_before,
        price_after,
        after,
    })
}

/// Fee charged to list a new ticker, chosen by its opening market cap.
pub fn creation_fee(initial_market_cap: Quote, params: &CurveParams) -> Quote {
    for tier in &params.creation_fee_tiers {
        if initial_market_cap.value() <= tier.max_market_cap.value() {
            return tier.fee;
        }
    }
    params
        .creation_fee_tiers
        .last()
        .map(|t| t.fee)
        .unwrap_or_else(Quote::zero)
}

/// `0.7 * ln(1 + volume) + 0.3 * momentum`, where falling prices count half.
pub fn trending_score(volume_24h: Decimal, price_change_24h: Decimal) -> Result<Decimal, CurveError> {
    let base = guard(Decimal::ONE.checked_add(volume_24h.max(Decimal::ZERO)), "volume")?;
    let ln_volume = guard(base.checked_ln(), "ln_volume")?;
    let momentum = if price_change_24h > Decimal::ZERO {
        price_change_24h
    } else {
        price_change_24h / dec!(2)
    };
    guard(
        (dec!(0.7) * ln_volume).checked_add(dec!(0.3) * momentum),
        "trending_score",
    )
}

/// Percent change of `price_now` against `reference`.
pub fn price_change_pct(reference: Decimal, price_now: Decimal) -> Result<Decimal, CurveError> {
    if reference <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }
    let delta = guard(price_now.checked_sub(reference), "price_delta")?;
    let ratio = guard(delta.checked_div(reference), "price_ratio")?;
    guard(ratio.checked_mul(dec!(100)), "price_change")
}

/// Window the 24h change is measured against.
pub fn day_ago(now: Timestamp) -> Timestamp {
    now.minus_millis(Timestamp::DAY_MS)
}
