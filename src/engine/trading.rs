//! Ticker trading along the bonding curve.
//!
//! Each op reads the ticker inside its transaction and prices against that
//! fresh curve, so `k` always comes from the version being committed over.

use super::core::{require_account, Engine};
use super::results::{BuyResult, CreateResult, EngineError, SellResult};
use crate::account::{consolidate_buy, draw_down};
use crate::curve::{self, BuyQuote, CurveState, SellQuote};
use crate::events::{Activity, ActivityDetail, ActivityKind, TickerTrade};
use crate::ledger::{RecordKey, Txn};
use crate::stats::StatsDelta;
use crate::ticker::Ticker;
use crate::types::{AccountId, Quote, TickerId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTickerRequest {
    pub name: String,
    pub symbol: String,
    pub icon: Option<String>,
    pub initial_market_cap: Decimal,
    pub initial_supply: Decimal,
    /// Ledger-currency amount to buy at the fresh curve, fee inclusive.
    #[serde(default)]
    pub initial_buy: Option<Decimal>,
}

fn require_ticker(txn: &mut Txn<'_>, ticker_id: TickerId) -> Result<Ticker, EngineError> {
    txn.get(RecordKey::Ticker(ticker_id))?
        .ok_or(EngineError::TickerNotFound(ticker_id))
}

fn trade_detail(ticker: &Ticker, token_amount: Decimal, price_per_token: Decimal) -> ActivityDetail {
    ActivityDetail::Ticker(TickerTrade {
        ticker_id: ticker.id,
        ticker_name: ticker.name.clone(),
        ticker_symbol: ticker.symbol.clone(),
        ticker_icon: ticker.icon.clone(),
        token_amount,
        price_per_token,
    })
}

impl Engine {
    pub async fn buy(&self, caller: AccountId, ticker_id: TickerId, ngn_amount: Decimal) -> Result<BuyResult, EngineError> {
        if ngn_amount <= Decimal::ZERO {
            return Err(curve::CurveError::InvalidAmount(ngn_amount).into());
        }
        let params = &self.config.curve;
        let bucket = self.fee_bucket(caller);
        let now = self.time();

        let (result, attempts) = self
            .transact("buy", |txn| {
                let mut account = require_account(txn, caller)?;
                let mut ticker = require_ticker(txn, ticker_id)?;

                let quote = curve::quote_buy(&ticker.curve(), ngn_amount, params)?;
                account.debit(quote.ngn_amount)?;
                ticker.apply_trade(quote.after, quote.ngn_amount, now, params)?;

                let holdings = txn.holdings(caller, ticker_id)?;
                let merged = consolidate_buy(holdings, caller, ticker_id, quote.tokens_out, quote.avg_price, now);
                for dup in &merged.merged_away {
                    txn.delete(RecordKey::Holding(caller, ticker_id, *dup));
                }

                txn.put(&merged.primary)?;
                txn.put(&account)?;
                txn.put(&ticker)?;
                txn.merge_stats(StatsDelta::fee(quote.fee, bucket));
                txn.put(&Activity::new(
                    caller,
                    ActivityKind::Buy,
                    now,
                    quote.ngn_for_curve,
                    quote.fee,
                    trade_detail(&ticker, quote.tokens_out, quote.avg_price),
                ))?;

                Ok(BuyResult {
                    ticker_id,
                    tokens_out: quote.tokens_out,
                    fee: quote.fee,
                    price_per_token: quote.avg_price,
                    new_price: quote.price_after,
                    new_balance: account.balance,
                    attempts: 0,
                })
            })
            .await?;

        info!(
            account = %caller,
            ticker = %ticker_id,
            amount = %ngn_amount,
            tokens = %result.tokens_out,
            price = %result.new_price,
            "buy"
        );
        Ok(BuyResult { attempts, ..result })
    }

    pub async fn sell(&self, caller: AccountId, ticker_id: TickerId, token_amount: Decimal) -> Result<SellResult, EngineError> {
        if token_amount <= Decimal::ZERO {
            return Err(curve::CurveError::InvalidAmount(token_amount).into());
        }
        let params = &self.config.curve;
        let bucket = self.fee_bucket(caller);
        let now = self.time();

        let (result, attempts) = self
            .transact("sell", |txn| {
                let mut account = require_account(txn, caller)?;
                let mut ticker = require_ticker(txn, ticker_id)?;
                let holdings = txn.holdings(caller, ticker_id)?;

                let held: Decimal = holdings.iter().map(|h| h.amount).sum();
                let drawdown = draw_down(holdings, token_amount, params.dust_threshold, now)?;
                let sold = token_amount.min(held);

                let quote = curve::quote_sell(&ticker.curve(), sold, params)?;
                account.credit(quote.ngn_to_user)?;
                ticker.apply_trade(quote.after, quote.ngn_before_fee, now, params)?;

                for holding in &drawdown.updated {
                    txn.put(holding)?;
                }
                for id in &drawdown.removed {
                    txn.delete(RecordKey::Holding(caller, ticker_id, *id));
                }
                txn.put(&account)?;
                txn.put(&ticker)?;
                txn.merge_stats(StatsDelta::fee(quote.fee, bucket));

                let unit_price = quote
                    .ngn_before_fee
                    .value()
                    .checked_div(sold)
                    .ok_or(curve::CurveError::PricingCorruption("unit_price"))?;
                txn.put(&Activity::new(
                    caller,
                    ActivityKind::Sell,
                    now,
                    quote.ngn_to_user,
                    quote.fee,
                    trade_detail(&ticker, sold, unit_price),
                ))?;

                Ok(SellResult {
                    ticker_id,
                    tokens_sold: sold,
                    proceeds: quote.ngn_to_user,
                    fee: quote.fee,
                    new_price: quote.price_after,
                    new_balance: account.balance,
                    attempts: 0,
                })
            })
            .await?;

        info!(
            account = %caller,
            ticker = %ticker_id,
            tokens = %result.tokens_sold,
            proceeds = %result.proceeds,
            price = %result.new_price,
            "sell"
        );
        Ok(SellResult { attempts, ..result })
    }

    /// Lists a new ticker, charging the tiered creation fee and optionally
    /// buying into the fresh curve in the same transaction.
    pub async fn create_ticker(&self, caller: AccountId, request: CreateTickerRequest) -> Result<CreateResult, EngineError> {
        let name = request.name.trim().to_string();
        let symbol = request.symbol.trim().to_uppercase();
        if name.is_empty() || symbol.is_empty() {
            return Err(EngineError::InvalidInput("ticker name and symbol are required".to_string()));
        }
        let initial_buy = match request.initial_buy {
            Some(amount) if amount < Decimal::ZERO => {
                return Err(curve::CurveError::InvalidAmount(amount).into());
            }
            Some(amount) if amount > Decimal::ZERO => Some(amount),
            _ => None,
        };

        let params = &self.config.curve;
        let opening = CurveState::new(request.initial_market_cap, request.initial_supply)?;
        let creation_fee = curve::creation_fee(Quote::new(request.initial_market_cap), params);
        let opening_buy = initial_buy
            .map(|amount| curve::quote_buy(&opening, amount, params))
            .transpose()?;
        let buy_cost = opening_buy.as_ref().map(|q| q.ngn_amount).unwrap_or_else(Quote::zero);
        let buy_fee = opening_buy.as_ref().map(|q| q.fee).unwrap_or_else(Quote::zero);
        let total_cost = creation_fee
            .checked_add(buy_cost)
            .ok_or(curve::CurveError::PricingCorruption("creation_cost"))?;
        let total_fee = creation_fee
            .checked_add(buy_fee)
            .ok_or(curve::CurveError::PricingCorruption("creation_fees"))?;

        let bucket = self.fee_bucket(caller);
        let ticker_id = TickerId::generate();
        let now = self.time();

        let (result, _) = self
            .transact("create_ticker", |txn| {
                let mut account = require_account(txn, caller)?;
                account.debit(total_cost)?;

                let mut ticker = Ticker::new(
                    ticker_id,
                    name.clone(),
                    symbol.clone(),
                    request.icon.clone(),
                    caller,
                    opening,
                    now,
                )?;
                // the id is fresh, but reading it makes a concurrent writer visible
                if txn.get::<Ticker>(RecordKey::Ticker(ticker_id))?.is_some() {
                    return Err(EngineError::InvalidInput(format!("ticker {} already exists", ticker_id)));
                }

                let (tokens_out, unit_price, net) = match &opening_buy {
                    Some(quote) => {
                        ticker.apply_trade(quote.after, quote.ngn_amount, now, params)?;
                        let merged = consolidate_buy(Vec::new(), caller, ticker_id, quote.tokens_out, quote.avg_price, now);
                        txn.put(&merged.primary)?;
                        (quote.tokens_out, quote.avg_price, quote.ngn_for_curve)
                    }
                    None => (Decimal::ZERO, ticker.price, Quote::zero()),
                };

                txn.put(&ticker)?;
                txn.put(&account)?;
                txn.merge_stats(StatsDelta::fee(creation_fee, bucket));
                if opening_buy.is_some() {
                    txn.merge_stats(StatsDelta::fee(buy_fee, bucket));
                }
                txn.put(&Activity::new(
                    caller,
                    ActivityKind::Create,
                    now,
                    net,
                    total_fee,
                    trade_detail(&ticker, tokens_out, unit_price),
                ))?;

                Ok(CreateResult {
                    ticker_id,
                    creation_fee,
                    tokens_out,
                    price: ticker.price,
                    new_balance: account.balance,
                })
            })
            .await?;

        info!(
            account = %caller,
            ticker = %ticker_id,
            symbol = %symbol,
            fee = %creation_fee,
            tokens = %result.tokens_out,
            "ticker created"
        );
        Ok(result)
    }

    /// Prices a buy against the stored curve without writing anything.
    pub fn quote_buy(&self, ticker_id: TickerId, ngn_amount: Decimal) -> Result<BuyQuote, EngineError> {
        let ticker = self.get_ticker(ticker_id)?.ok_or(EngineError::TickerNotFound(ticker_id))?;
        Ok(curve::quote_buy(&ticker.curve(), ngn_amount, &self.config.curve)?)
    }

    /// Prices a sale against the stored curve without writing anything.
    pub fn quote_sell(&self, ticker_id: TickerId, token_amount: Decimal) -> Result<SellQuote, EngineError> {
        let ticker = self.get_ticker(ticker_id)?.ok_or(EngineError::TickerNotFound(ticker_id))?;
        Ok(curve::quote_sell(&ticker.curve(), token_amount, &self.config.curve)?)
    }

    /// What `amount` tokens would fetch if sold now, after fees.
    pub fn holding_value(&self, ticker_id: TickerId, amount: Decimal) -> Result<Quote, EngineError> {
        if amount <= Decimal::ZERO {
            return Ok(Quote::zero());
        }
        Ok(self.quote_sell(ticker_id, amount)?.ngn_to_user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::ledger::MemoryLedger;
    use crate::price_feed::MockPriceFeed;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    async fn engine_with_ticker() -> (Engine, TickerId) {
        let engine = Engine::new(
            EngineConfig::default(),
            Arc::new(MemoryLedger::new()),
            Arc::new(MockPriceFeed::new(dec!(1500))),
        );
        engine.deposit(AccountId(2), dec!(1_000_000)).await.unwrap();
        let created = engine
            .create_ticker(
                AccountId(2),
                CreateTickerRequest {
                    name: "Naira Moon".to_string(),
                    symbol: "nmoon".to_string(),
                    icon: None,
                    initial_market_cap: dec!(100_000),
                    initial_supply: dec!(1_000_000_000),
                    initial_buy: None,
                },
            )
            .await
            .unwrap();
        (engine, created.ticker_id)
    }

    #[tokio::test]
    async fn create_without_buy_only_charges_fee() {
        let (engine, ticker_id) = engine_with_ticker().await;

        let account = engine.get_account(AccountId(2)).unwrap().unwrap();
        assert_eq!(account.balance.value(), dec!(999_000));

        let ticker = engine.get_ticker(ticker_id).unwrap().unwrap();
        assert_eq!(ticker.symbol, "NMOON");
        assert_eq!(ticker.chart_data.len(), 1);
        assert!(engine.holdings(AccountId(2), ticker_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn buy_then_sell_everything() {
        let (engine, ticker_id) = engine_with_ticker().await;

        let bought = engine.buy(AccountId(2), ticker_id, dec!(10_000)).await.unwrap();
        assert_eq!(bought.fee.value(), dec!(20));

        let sold = engine.sell(AccountId(2), ticker_id, bought.tokens_out).await.unwrap();
        assert!(sold.proceeds.value() < dec!(10_000));
        assert!(engine.holdings(AccountId(2), ticker_id).unwrap().is_empty());

        let ticker = engine.get_ticker(ticker_id).unwrap().unwrap();
        assert_eq!(ticker.chart_data.len(), 3);
    }

    #[tokio::test]
    async fn quotes_do_not_write() {
        let (engine, ticker_id) = engine_with_ticker().await;
        let before = engine.get_ticker(ticker_id).unwrap().unwrap();

        let quote = engine.quote_buy(ticker_id, dec!(5000)).unwrap();
        assert!(quote.tokens_out > Decimal::ZERO);
        assert_eq!(engine.get_ticker(ticker_id).unwrap().unwrap(), before);
        assert_eq!(engine.holding_value(ticker_id, Decimal::ZERO).unwrap(), Quote::zero());
    }

    #[tokio::test]
    async fn unknown_ticker() {
        let (engine, _) = engine_with_ticker().await;
        let missing = TickerId::generate();
        assert!(matches!(
            engine.buy(AccountId(2), missing, dec!(10)).await,
            Err(EngineError::TickerNotFound(_))
        ));
    }
}
