//! Liquidation detection and execution.

use super::core::Engine;
use super::positions::{perp_detail, require_position};
use super::results::{EngineError, LiquidationResult};
use crate::events::{Activity, ActivityKind};
use crate::ledger::{Record, TxnError};
use crate::liquidation::{evaluate_liquidation, is_breached, LiquidationStatus};
use crate::position::PerpPosition;
use crate::stats::StatsDelta;
use crate::sweeper::{SweepOutcome, SweepReport};
use crate::types::{AccountId, PositionId, Price, Quote};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Clears the in-flight flag when a sweep ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Engine {
    /// Liquidates the position if, at the current oracle price, it has crossed
    /// its liquidation price. A position that is already closed or still safe
    /// is left alone and reported with `liquidated: false`.
    pub async fn force_liquidate(&self, account_id: AccountId, position_id: PositionId) -> Result<LiquidationResult, EngineError> {
        let snapshot = self
            .get_position(account_id, position_id)?
            .ok_or(EngineError::PositionNotFound(position_id))?;
        if !snapshot.is_open() {
            debug!(position = %position_id, status = %snapshot.status, "force liquidate on closed position");
            return Ok(LiquidationResult {
                account_id,
                position_id,
                liquidated: false,
                oracle_price: None,
                liquidation_price: snapshot.liquidation_price,
                buffer_percent: None,
            });
        }
        let oracle = self.oracle.asset_price_usd(&snapshot.asset_id).await?;
        self.liquidate_at(account_id, position_id, oracle).await
    }

    /// Single-position sweep: same as [`Engine::force_liquidate`] but skips the
    /// transaction entirely when the oracle shows no breach.
    pub async fn check_position(&self, account_id: AccountId, position_id: PositionId) -> Result<LiquidationResult, EngineError> {
        let snapshot = self
            .get_position(account_id, position_id)?
            .ok_or(EngineError::PositionNotFound(position_id))?;
        let idle = |oracle_price: Option<Price>, buffer_percent: Option<Decimal>| LiquidationResult {
            account_id,
            position_id,
            liquidated: false,
            oracle_price,
            liquidation_price: snapshot.liquidation_price,
            buffer_percent,
        };
        if !snapshot.is_open() {
            return Ok(idle(None, None));
        }

        let price = self.oracle.asset_price_usd(&snapshot.asset_id).await?;
        match evaluate_liquidation(snapshot.side, price, snapshot.liquidation_price) {
            LiquidationStatus::Breached => self.liquidate_at(account_id, position_id, price).await,
            LiquidationStatus::Safe { buffer_percent } => {
                debug!(position = %position_id, %price, %buffer_percent, "position safe");
                Ok(idle(Some(price), Some(buffer_percent)))
            }
        }
    }

    /// Re-checks status and breach against `oracle` inside the transaction.
    pub(super) async fn liquidate_at(
        &self,
        account_id: AccountId,
        position_id: PositionId,
        oracle: Price,
    ) -> Result<LiquidationResult, EngineError> {
        let now = self.time();

        let (result, _) = self
            .transact("force_liquidate", |txn| {
                let mut position = require_position(txn, account_id, position_id)?;
                let liquidation_price = position.liquidation_price;
                let status = evaluate_liquidation(position.side, oracle, liquidation_price);
                if !position.is_open() || status != LiquidationStatus::Breached {
                    let buffer_percent = match status {
                        LiquidationStatus::Safe { buffer_percent } if position.is_open() => Some(buffer_percent),
                        _ => None,
                    };
                    return Ok(LiquidationResult {
                        account_id,
                        position_id,
                        liquidated: false,
                        oracle_price: Some(oracle),
                        liquidation_price,
                        buffer_percent,
                    });
                }

                let settlement = position.liquidate(oracle, now)?;
                txn.put(&position)?;
                txn.merge_stats(StatsDelta::liquidation());
                txn.put(&Activity::new(
                    account_id,
                    ActivityKind::Liquidation,
                    now,
                    position.collateral,
                    Quote::zero(),
                    perp_detail(&position, oracle, Some(settlement.realized_pnl)),
                ))?;

                Ok(LiquidationResult {
                    account_id,
                    position_id,
                    liquidated: true,
                    oracle_price: Some(oracle),
                    liquidation_price,
                    buffer_percent: None,
                })
            })
            .await?;

        if result.liquidated {
            warn!(
                account = %account_id,
                position = %position_id,
                oracle = %oracle,
                liquidation_price = %result.liquidation_price,
                "position liquidated"
            );
        }
        Ok(result)
    }

    /// Scans every open position, pricing each distinct asset once, and
    /// liquidates the breached ones. Returns `Skipped` when another sweep is
    /// still running.
    pub async fn sweep_all(&self) -> Result<SweepOutcome, EngineError> {
        if self
            .sweep_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("sweep already in flight, skipping");
            return Ok(SweepOutcome::Skipped);
        }
        let _guard = InFlight(&self.sweep_in_flight);

        let mut report = SweepReport::default();
        let stored = self.store.open_positions().map_err(TxnError::from)?;

        let mut positions = Vec::with_capacity(stored.len());
        for (key, doc) in stored {
            match PerpPosition::decode(key, &doc) {
                Ok(position) => positions.push(position),
                Err(e) => {
                    warn!(%key, error = %e, "skipping undecodable position");
                    report.errors += 1;
                }
            }
        }
        report.scanned = positions.len();

        let assets: BTreeSet<&str> = positions.iter().map(|p| p.asset_id.as_str()).collect();
        let mut prices: BTreeMap<&str, Price> = BTreeMap::new();
        for asset in assets {
            match self.oracle.asset_price_usd(asset).await {
                Ok(price) => {
                    prices.insert(asset, price);
                    report.assets_priced += 1;
                }
                Err(e) => {
                    warn!(asset, error = %e, "no oracle price, skipping asset this sweep");
                    report.assets_skipped += 1;
                }
            }
        }

        for position in &positions {
            let Some(&price) = prices.get(position.asset_id.as_str()) else {
                continue;
            };
            if !is_breached(position.side, price, position.liquidation_price) {
                continue;
            }
            match self.liquidate_at(position.account_id, position.id, price).await {
                Ok(result) if result.liquidated => report.liquidated += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(position = %position.id, error = %e, "liquidation failed");
                    report.errors += 1;
                }
            }
        }

        let now = self.time();
        self.transact("sweep_heartbeat", |txn| {
            txn.merge_stats(StatsDelta::heartbeat(now));
            Ok(())
        })
        .await?;
        report.finished_at = Some(now);

        if report.liquidated > 0 || report.assets_skipped > 0 || report.errors > 0 {
            info!(
                scanned = report.scanned,
                liquidated = report.liquidated,
                assets_skipped = report.assets_skipped,
                errors = report.errors,
                "sweep finished"
            );
        } else {
            debug!(scanned = report.scanned, "sweep finished");
        }
        Ok(SweepOutcome::Completed(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineConfig, OpenPositionRequest};
    use crate::ledger::MemoryLedger;
    use crate::price_feed::MockPriceFeed;
    use crate::types::Side;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    async fn setup() -> (Engine, Arc<MockPriceFeed>, PositionId) {
        let feed = Arc::new(MockPriceFeed::new(dec!(1500)).with_price("bitcoin", dec!(49990)));
        let engine = Engine::new(EngineConfig::default(), Arc::new(MemoryLedger::new()), feed.clone());
        engine.deposit(AccountId(3), dec!(10_000_000)).await.unwrap();
        let opened = engine
            .open_position(
                AccountId(3),
                OpenPositionRequest {
                    pair: "BTCUSD".to_string(),
                    collateral: dec!(1_500_000),
                    leverage: dec!(10),
                    side: Side::Long,
                },
            )
            .await
            .unwrap();
        // entry 50000, liquidation 47500
        assert_eq!(opened.position.liquidation_price.value(), dec!(47500));
        (engine, feed, opened.position.id)
    }

    #[tokio::test]
    async fn safe_position_is_left_alone() {
        let (engine, feed, id) = setup().await;
        feed.set_price("bitcoin", dec!(47600));

        let result = engine.force_liquidate(AccountId(3), id).await.unwrap();
        assert!(!result.liquidated);
        assert!(engine.get_position(AccountId(3), id).unwrap().unwrap().is_open());
    }

    #[tokio::test]
    async fn breached_position_is_liquidated_once() {
        let (engine, feed, id) = setup().await;
        let balance_before = engine.get_account(AccountId(3)).unwrap().unwrap().balance;
        feed.set_price("bitcoin", dec!(47500));

        let first = engine.force_liquidate(AccountId(3), id).await.unwrap();
        assert!(first.liquidated);
        let second = engine.force_liquidate(AccountId(3), id).await.unwrap();
        assert!(!second.liquidated);

        let position = engine.get_position(AccountId(3), id).unwrap().unwrap();
        assert_eq!(position.realized_pnl, Some(position.collateral.negate()));
        assert_eq!(engine.get_account(AccountId(3)).unwrap().unwrap().balance, balance_before);
        assert_eq!(engine.stats().unwrap().perp_liquidations, 1);
    }

    #[tokio::test]
    async fn check_position_reports_buffer_without_writing() {
        let (engine, _feed, id) = setup().await;
        let result = engine.check_position(AccountId(3), id).await.unwrap();
        assert!(!result.liquidated);
        assert_eq!(result.oracle_price, Some(Price::new_unchecked(dec!(49990))));
        // (49990 - 47500) / 49990
        assert_eq!(result.buffer_percent, Some(dec!(2490) / dec!(49990) * dec!(100)));
        assert!(engine.get_position(AccountId(3), id).unwrap().unwrap().is_open());
        assert_eq!(engine.stats().unwrap().perp_liquidations, 0);
    }

    #[tokio::test]
    async fn re_entrant_sweep_is_skipped() {
        let (engine, _feed, _) = setup().await;
        engine.sweep_in_flight.store(true, Ordering::SeqCst);
        assert!(matches!(engine.sweep_all().await.unwrap(), SweepOutcome::Skipped));

        engine.sweep_in_flight.store(false, Ordering::SeqCst);
        assert!(matches!(engine.sweep_all().await.unwrap(), SweepOutcome::Completed(_)));
        assert!(!engine.sweep_in_flight.load(Ordering::SeqCst));
    }
}
