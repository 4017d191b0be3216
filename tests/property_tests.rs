//! Property-based tests for the curve and margin math.
//!
//! These tests verify invariants hold under random inputs.

use curveperp_core::curve::{quote_buy, quote_sell};
use curveperp_core::liquidation::{calculate_liquidation_price, is_breached, maintenance_margin_fraction};
use curveperp_core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;

// Strategies for generating test data
fn market_cap_strategy() -> impl Strategy<Value = Decimal> {
    (10_000i64..100_000_000i64).prop_map(Decimal::from)
}

fn supply_strategy() -> impl Strategy<Value = Decimal> {
    (1_000_000i64..10_000_000_000i64).prop_map(Decimal::from)
}

fn spend_strategy() -> impl Strategy<Value = Decimal> {
    (100i64..5_000_000i64).prop_map(|x| Decimal::new(x, 2)) // 1.00 to 50,000.00
}

fn price_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|x| Decimal::new(x, 2)) // $0.01 to $100,000
}

fn leverage_strategy() -> impl Strategy<Value = Decimal> {
    (1u32..=100u32).prop_map(Decimal::from)
}

fn side_strategy() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Long), Just(Side::Short)]
}

fn relative_gap(a: Decimal, b: Decimal) -> Decimal {
    ((a - b) / b).abs()
}

proptest! {
    /// A buy keeps market_cap * supply fixed
    #[test]
    fn buy_preserves_k(
        market_cap in market_cap_strategy(),
        supply in supply_strategy(),
        spend in spend_strategy(),
    ) {
        let state = CurveState::new(market_cap, supply).unwrap();
        let quote = quote_buy(&state, spend, &CurveParams::default()).unwrap();
        prop_assert!(relative_gap(quote.after.k().unwrap(), state.k().unwrap()) < dec!(0.000000000001));
    }

    /// Buys pull supply down and push price up; sells do the reverse
    #[test]
    fn trades_move_price_in_trade_direction(
        market_cap in market_cap_strategy(),
        supply in supply_strategy(),
        spend in spend_strategy(),
    ) {
        let params = CurveParams::default();
        let state = CurveState::new(market_cap, supply).unwrap();

        let buy = quote_buy(&state, spend, &params).unwrap();
        prop_assert!(buy.after.supply < state.supply);
        prop_assert!(buy.price_after > buy.price_before);
        prop_assert_eq!(buy.ngn_for_curve.checked_add(buy.fee), Some(buy.ngn_amount));

        let sell = quote_sell(&buy.after, buy.tokens_out, &params).unwrap();
        prop_assert!(sell.after.supply > buy.after.supply);
        prop_assert!(sell.price_after < sell.price_before);
    }

    /// Buying then selling everything loses roughly two trade fees, never gains
    #[test]
    fn round_trip_loses_two_fees(
        market_cap in market_cap_strategy(),
        supply in supply_strategy(),
        spend in spend_strategy(),
    ) {
        let params = CurveParams::default();
        let state = CurveState::new(market_cap, supply).unwrap();

        let buy = quote_buy(&state, spend, &params).unwrap();
        let sell = quote_sell(&buy.after, buy.tokens_out, &params).unwrap();

        let shortfall = (spend - sell.ngn_to_user.value()) / spend;
        prop_assert!(shortfall >= dec!(0.003), "shortfall {} below two fees", shortfall);
        prop_assert!(shortfall <= dec!(0.005), "shortfall {} above two fees", shortfall);
    }

    /// Liquidation price sits on the losing side of entry
    #[test]
    fn liquidation_price_direction(
        entry in price_strategy(),
        leverage in leverage_strategy(),
        side in side_strategy(),
    ) {
        let entry_price = Price::new_unchecked(entry);
        let lev = Leverage::new(leverage).unwrap();
        let mmf = maintenance_margin_fraction(lev, dec!(0.5));
        let liq = calculate_liquidation_price(entry_price, lev, side, mmf);

        match side {
            Side::Long => prop_assert!(liq.value() < entry),
            Side::Short => prop_assert!(liq.value() > entry),
        }
        prop_assert!(!is_breached(side, entry_price, liq), "fresh position breached at its own entry");
    }

    /// More leverage never moves the liquidation price further from entry
    #[test]
    fn higher_leverage_tightens_liquidation(
        entry in price_strategy(),
        low in 1u32..=50u32,
        extra in 1u32..=50u32,
        side in side_strategy(),
    ) {
        let entry_price = Price::new_unchecked(entry);
        let lev_low = Leverage::new(Decimal::from(low)).unwrap();
        let lev_high = Leverage::new(Decimal::from(low + extra)).unwrap();

        let liq_low = calculate_liquidation_price(entry_price, lev_low, side, maintenance_margin_fraction(lev_low, dec!(0.5)));
        let liq_high = calculate_liquidation_price(entry_price, lev_high, side, maintenance_margin_fraction(lev_high, dec!(0.5)));

        let gap_low = (entry - liq_low.value()).abs();
        let gap_high = (entry - liq_high.value()).abs();
        prop_assert!(gap_high <= gap_low);
    }

    /// Balance never goes negative whatever mix of credits and debits is applied
    #[test]
    fn balance_never_negative(ops in prop::collection::vec((any::<bool>(), 1i64..1_000_000i64), 1..50)) {
        let mut account = Account::new(AccountId(1), Timestamp::from_millis(0));
        for (is_credit, cents) in ops {
            let amount = Quote::new(Decimal::new(cents, 2));
            if is_credit {
                account.credit(amount).unwrap();
            } else {
                let before = account.balance;
                if account.debit(amount).is_err() {
                    prop_assert_eq!(account.balance, before);
                }
            }
            prop_assert!(!account.balance.is_negative());
        }
    }

    /// Payout is collateral plus pnl, floored at zero
    #[test]
    fn payout_never_negative(collateral in 1i64..10_000_000i64, pnl in -20_000_000i64..20_000_000i64) {
        let position = sample_position(Quote::new(Decimal::from(collateral)));
        let payout = position.payout(Quote::new(Decimal::from(pnl))).unwrap();
        prop_assert!(!payout.is_negative());
        if collateral + pnl >= 0 {
            prop_assert_eq!(payout.value(), Decimal::from(collateral + pnl));
        }
    }
}

/// One step a trader can take against a live engine.
#[derive(Debug, Clone)]
enum Op {
    Deposit(i64),
    Withdraw(i64),
    Buy(i64),
    SellPercent(u32),
    Open { collateral: i64, leverage: u32, side: Side },
    Close(usize),
    ForceLiquidate(usize),
    SetSolPrice(i64),
    Sweep,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1_000i64..2_000_000i64).prop_map(Op::Deposit),
        (1_000i64..2_000_000i64).prop_map(Op::Withdraw),
        (100i64..500_000i64).prop_map(Op::Buy),
        (1u32..=100u32).prop_map(Op::SellPercent),
        (10_000i64..1_000_000i64, 1u32..=100u32, side_strategy())
            .prop_map(|(collateral, leverage, side)| Op::Open { collateral, leverage, side }),
        (0usize..8).prop_map(Op::Close),
        (0usize..8).prop_map(Op::ForceLiquidate),
        // $10.00 to $300.00
        (1_000i64..30_000i64).prop_map(Op::SetSolPrice),
        Just(Op::Sweep),
    ]
}

type Settled = (PositionStatus, Option<Price>, Option<Quote>);

async fn run_ops(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let trader = AccountId(2);
    let feed = Arc::new(MockPriceFeed::new(dec!(1500)).with_price("solana", dec!(150)));
    let engine = Engine::new(EngineConfig::default(), Arc::new(MemoryLedger::new()), feed.clone());

    engine.deposit(AccountId(1), dec!(10_000)).await.unwrap();
    let ticker_id = engine
        .create_ticker(
            AccountId(1),
            CreateTickerRequest {
                name: "Kano Cotton".to_string(),
                symbol: "KNC".to_string(),
                icon: None,
                initial_market_cap: dec!(100_000),
                initial_supply: dec!(1_000_000_000),
                initial_buy: None,
            },
        )
        .await
        .unwrap()
        .ticker_id;
    engine.deposit(trader, dec!(100_000)).await.unwrap();

    let mut opened: Vec<(PositionId, Price)> = Vec::new();
    let mut settled: HashMap<PositionId, Settled> = HashMap::new();

    for op in ops {
        match op {
            Op::Deposit(amount) => {
                let _ = engine.deposit(trader, Decimal::from(amount)).await;
            }
            Op::Withdraw(amount) => {
                let _ = engine.withdraw(trader, Decimal::from(amount)).await;
            }
            Op::Buy(amount) => {
                let _ = engine.buy(trader, ticker_id, Decimal::from(amount)).await;
            }
            Op::SellPercent(pct) => {
                let held: Decimal = engine
                    .holdings(trader, ticker_id)
                    .unwrap()
                    .iter()
                    .map(|h| h.amount)
                    .sum();
                let amount = held * Decimal::from(pct) / dec!(100);
                if amount > Decimal::ZERO {
                    let _ = engine.sell(trader, ticker_id, amount).await;
                }
            }
            Op::Open { collateral, leverage, side } => {
                let request = OpenPositionRequest {
                    pair: "SOLUSD".to_string(),
                    collateral: Decimal::from(collateral),
                    leverage: Decimal::from(leverage),
                    side,
                };
                if let Ok(result) = engine.open_position(trader, request).await {
                    opened.push((result.position.id, result.position.liquidation_price));
                }
            }
            Op::Close(i) => {
                if let Some((id, _)) = opened.get(i % opened.len().max(1)) {
                    let _ = engine.close_position(trader, *id).await;
                }
            }
            Op::ForceLiquidate(i) => {
                if let Some((id, _)) = opened.get(i % opened.len().max(1)) {
                    let _ = engine.force_liquidate(trader, *id).await;
                }
            }
            Op::SetSolPrice(cents) => feed.set_price("solana", Decimal::new(cents, 2)),
            Op::Sweep => {
                engine.sweep_all().await.unwrap();
            }
        }

        let account = engine.get_account(trader).unwrap().unwrap();
        prop_assert!(!account.balance.is_negative(), "balance went negative: {}", account.balance);

        for (id, liquidation_price) in &opened {
            let position = engine.get_position(trader, *id).unwrap().unwrap();
            prop_assert_eq!(position.liquidation_price, *liquidation_price);
            if position.status.is_terminal() {
                let now = (position.status, position.exit_price, position.realized_pnl);
                match settled.get(id) {
                    Some(first) => prop_assert_eq!(first, &now),
                    None => {
                        settled.insert(*id, now);
                    }
                }
            }
        }
    }

    let stats = engine.stats().unwrap();
    prop_assert!(stats.validate().is_ok());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Across any mix of engine operations the balance stays non-negative,
    /// stored liquidation prices never move, and settled positions never
    /// change their outcome.
    #[test]
    fn engine_sequences_preserve_account_and_position_invariants(
        ops in prop::collection::vec(op_strategy(), 1..40),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(run_ops(ops))?;
    }
}

fn sample_position(collateral: Quote) -> PerpPosition {
    PerpPosition {
        id: PositionId::generate(),
        account_id: AccountId(1),
        pair: "BTCUSD".to_string(),
        asset_id: "bitcoin".to_string(),
        side: Side::Long,
        leverage: Leverage::new(dec!(10)).unwrap(),
        lots: dec!(1),
        contract_multiplier: dec!(0.01),
        collateral,
        fee: Quote::zero(),
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
