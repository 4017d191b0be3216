//! Perpetual position open and close.
//!
//! Oracle prices are fetched before the transaction starts. Everything that
//! depends on stored state (balance, status) is checked inside it.

use super::core::{require_account, Engine};
use super::results::{CloseResult, EngineError, OpenResult, PositionPreview};
use crate::events::{Activity, ActivityDetail, ActivityKind, PerpAction};
use crate::ledger::{RecordKey, Txn};
use crate::liquidation::{calculate_liquidation_price, is_breached, maintenance_margin_fraction};
use crate::margin::{calculate_margin_requirement, effective_leverage, size_position, to_local, to_usd};
use crate::market::{MarketError, PairConfig};
use crate::position::{PerpPosition, PositionStatus};
use crate::stats::StatsDelta;
use crate::types::{checked, AccountId, Leverage, PositionId, Price, Quote, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPositionRequest {
    pub pair: String,
    /// Ledger-currency collateral the caller wants to commit.
    pub collateral: Decimal,
    pub leverage: Decimal,
    pub side: Side,
}

pub(super) fn perp_detail(position: &PerpPosition, price: Price, realized_pnl: Option<Quote>) -> ActivityDetail {
    ActivityDetail::Perp(PerpAction {
        position_id: position.id,
        pair: position.pair.clone(),
        side: position.side,
        lots: position.lots,
        leverage: position.leverage.value(),
        price: price.value(),
        realized_pnl,
    })
}

pub(super) fn require_position(
    txn: &mut Txn<'_>,
    account_id: AccountId,
    position_id: PositionId,
) -> Result<PerpPosition, EngineError> {
    txn.get(RecordKey::Position(account_id, position_id))?
        .ok_or(EngineError::PositionNotFound(position_id))
}

/// Sizes a position against `oracle` and `quote_rate`. Pure.
pub fn build_preview(
    pair: &PairConfig,
    request: &OpenPositionRequest,
    oracle: Price,
    quote_rate: Decimal,
    engine_margin: &crate::margin::MarginParams,
) -> Result<PositionPreview, EngineError> {
    if request.collateral <= Decimal::ZERO {
        return Err(EngineError::InvalidAmount(format!(
            "collateral must be positive, got {}",
            request.collateral
        )));
    }
    if quote_rate <= Decimal::ZERO {
        return Err(EngineError::InvalidAmount(format!("quote rate must be positive, got {}", quote_rate)));
    }
    let requested = Leverage::new(request.leverage)
        .ok_or_else(|| EngineError::InvalidAmount(format!("leverage must be >= 1, got {}", request.leverage)))?;
    let leverage = effective_leverage(requested, engine_margin);

    let entry_price = pair.entry_price(oracle, request.side)?;
    let collateral_usd = to_usd(Quote::new(request.collateral), quote_rate)?;
    let lots = size_position(collateral_usd, entry_price, leverage, pair)?;
    let requirement = calculate_margin_requirement(lots, entry_price, leverage, pair, engine_margin)?;

    let mmf = maintenance_margin_fraction(leverage, engine_margin.maintenance_margin_ratio);
    let liquidation_price = calculate_liquidation_price(entry_price, leverage, request.side, mmf);

    let margin = to_local(requirement.initial, quote_rate)?;
    let fee = to_local(requirement.fee, quote_rate)?;
    let total_debit = checked(margin.checked_add(fee), "total_debit").map_err(MarketError::from)?;

    Ok(PositionPreview {
        pair: pair.symbol.clone(),
        side: request.side,
        oracle_price: oracle,
        entry_price,
        liquidation_price,
        lots,
        effective_leverage: leverage,
        position_value_usd: requirement.position_value,
        margin,
        fee,
        total_debit,
        quote_rate,
        instantly_liquidated: is_breached(request.side, oracle, liquidation_price),
    })
}

impl Engine {
    /// Sizes a position at the current oracle price without writing anything.
    pub async fn preview_position(&self, request: &OpenPositionRequest) -> Result<PositionPreview, EngineError> {
        let pair = self.config.pair(&request.pair)?;
        let oracle = self.oracle.asset_price_usd(&pair.asset_id).await?;
        let quote_rate = self.oracle.quote_rate().await?;
        build_preview(pair, request, oracle, quote_rate, &self.config.margin)
    }

    pub async fn open_position(&self, caller: AccountId, request: OpenPositionRequest) -> Result<OpenResult, EngineError> {
        let preview = self.preview_position(&request).await?;
        let pair = self.config.pair(&request.pair)?;
        let position_id = PositionId::generate();
        let now = self.time();
        let bucket = self.fee_bucket(caller);

        let (result, _) = self
            .transact("open_position", |txn| {
                let mut account = require_account(txn, caller)?;
                account.debit(preview.total_debit)?;

                let mut position = PerpPosition {
                    id: position_id,
                    account_id: caller,
                    pair: pair.symbol.clone(),
                    asset_id: pair.asset_id.clone(),
                    side: preview.side,
                    leverage: preview.effective_leverage,
                    lots: preview.lots,
                    contract_multiplier: pair.contract_multiplier,
                    collateral: preview.margin,
                    fee: preview.fee,
                    entry_price: preview.entry_price,
                    liquidation_price: preview.liquidation_price,
                    quote_rate: preview.quote_rate,
                    status: PositionStatus::Open,
                    exit_price: None,
                    realized_pnl: None,
                    opened_at: now,
                    closed_at: None,
                };

                txn.put(&Activity::new(
                    caller,
                    ActivityKind::PerpOpen,
                    now,
                    preview.margin,
                    preview.fee,
                    perp_detail(&position, preview.entry_price, None),
                ))?;

                if preview.instantly_liquidated {
                    let settlement = position.liquidate(preview.oracle_price, now)?;
                    txn.merge_stats(StatsDelta::liquidation());
                    txn.put(&Activity::new(
                        caller,
                        ActivityKind::Liquidation,
                        now,
                        position.collateral,
                        Quote::zero(),
                        perp_detail(&position, preview.oracle_price, Some(settlement.realized_pnl)),
                    ))?;
                }

                txn.put(&position)?;
                txn.put(&account)?;
                txn.merge_stats(StatsDelta::fee(preview.fee, bucket));

                Ok(OpenResult {
                    is_liquidated: !position.is_open(),
                    position,
                    debited: preview.total_debit,
                    new_balance: account.balance,
                })
            })
            .await?;

        if result.is_liquidated {
            warn!(
                account = %caller,
                position = %position_id,
                oracle = %preview.oracle_price,
                liquidation_price = %preview.liquidation_price,
                "position liquidated at open"
            );
        } else {
            info!(
                account = %caller,
                position = %position_id,
                pair = %pair.symbol,
                side = %preview.side,
                lots = %preview.lots,
                entry = %preview.entry_price,
                liquidation_price = %preview.liquidation_price,
                "position opened"
            );
        }
        Ok(result)
    }

    pub async fn close_position(&self, caller: AccountId, position_id: PositionId) -> Result<CloseResult, EngineError> {
        let snapshot = self
            .get_position(caller, position_id)?
            .ok_or(EngineError::PositionNotFound(position_id))?;
        if !snapshot.is_open() {
            return Err(crate::position::PositionError::NotOpen {
                id: position_id,
                status: snapshot.status,
            }
            .into());
        }

        let pair = self.config.pair(&snapshot.pair)?;
        let oracle = self.oracle.asset_price_usd(&snapshot.asset_id).await?;
        let quote_rate = self.oracle.quote_rate().await?;
        let exit_price = pair.exit_price(oracle, snapshot.side)?;
        let now = self.time();

        let (result, _) = self
            .transact("close_position", |txn| {
                let mut position = require_position(txn, caller, position_id)?;
                let mut account = require_account(txn, caller)?;

                let settlement = position.close(exit_price, quote_rate, now)?;
                account.credit(settlement.payout)?;

                txn.put(&position)?;
                txn.put(&account)?;
                txn.put(&Activity::new(
                    caller,
                    ActivityKind::PerpClose,
                    now,
                    settlement.payout,
                    Quote::zero(),
                    perp_detail(&position, exit_price, Some(settlement.realized_pnl)),
                ))?;

                Ok(CloseResult {
                    position_id,
                    exit_price,
                    realized_pnl: settlement.realized_pnl,
                    payout: settlement.payout,
                    new_balance: account.balance,
                })
            })
            .await?;

        info!(
            account = %caller,
            position = %position_id,
            exit = %exit_price,
            pnl = %result.realized_pnl,
            payout = %result.payout,
            "position closed"
        );
        Ok(result)
    }
}
