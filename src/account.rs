//! Account balances and token holdings.
//!
//! An account owns one scalar balance in the ledger currency. Token holdings
//! live in separate records keyed per (account, ticker). Older data can carry
//! several holding records for the same ticker; a buy folds them into one
//! primary record inside the same transaction.

use crate::types::{AccountId, HoldingId, Quote, TickerId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub balance: Quote,
    pub total_deposited: Quote,
    pub total_withdrawn: Quote,
    pub created_at: Timestamp,
}

impl Account {
    pub fn new(id: AccountId, timestamp: Timestamp) -> Self {
        Self {
            id,
            balance: Quote::zero(),
            total_deposited: Quote::zero(),
            total_withdrawn: Quote::zero(),
            created_at: timestamp,
        }
    }

    pub fn deposit(&mut self, amount: Quote) -> Result<(), AccountError> {
        let total = grow(self.total_deposited, amount)?;
        self.credit(amount)?;
        self.total_deposited = total;
        Ok(())
    }

    pub fn withdraw(&mut self, amount: Quote) -> Result<(), AccountError> {
        let total = grow(self.total_withdrawn, amount)?;
        self.debit(amount)?;
        self.total_withdrawn = total;
        Ok(())
    }

    pub fn debit(&mut self, amount: Quote) -> Result<(), AccountError> {
        let insufficient = AccountError::InsufficientBalance {
            requested: amount,
            available: self.balance,
        };
        if amount.value() > self.balance.value() {
            return Err(insufficient);
        }
        self.balance = self.balance.checked_sub(amount).ok_or(insufficient)?;
        Ok(())
    }

    pub fn credit(&mut self, amount: Quote) -> Result<(), AccountError> {
        self.balance = grow(self.balance, amount)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.balance.is_negative() {
            return Err(format!("negative balance {}", self.balance));
        }
        Ok(())
    }
}

fn grow(current: Quote, amount: Quote) -> Result<Quote, AccountError> {
    current
        .checked_add(amount)
        .ok_or(AccountError::BalanceOverflow { balance: current, amount })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub id: HoldingId,
    pub account_id: AccountId,
    pub ticker_id: TickerId,
    pub amount: Decimal,
    pub avg_buy_price: Decimal,
    pub updated_at: Timestamp,
}

impl Holding {
    pub fn new(account_id: AccountId, ticker_id: TickerId, timestamp: Timestamp) -> Self {
        Self {
            id: HoldingId::generate(),
            account_id,
            ticker_id,
            amount: Decimal::ZERO,
            avg_buy_price: Decimal::ZERO,
            updated_at: timestamp,
        }
    }

    pub fn cost_basis(&self) -> Decimal {
        self.amount * self.avg_buy_price
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.amount < Decimal::ZERO {
            return Err(format!("negative holding amount {}", self.amount));
        }
        if self.avg_buy_price < Decimal::ZERO {
            return Err(format!("negative cost basis {}", self.avg_buy_price));
        }
        Ok(())
    }
}

/// Result of folding duplicate holdings and adding a fill.
#[derive(Debug, Clone)]
pub struct Consolidation {
    pub primary: Holding,
    pub merged_away: Vec<HoldingId>,
}

/// Folds every holding into the first one (or a fresh record when empty) and
/// adds `tokens` bought at `unit_price`. Cost basis is the weighted average.
pub fn consolidate_buy(
    mut holdings: Vec<Holding>,
    account_id: AccountId,
    ticker_id: TickerId,
    tokens: Decimal,
    unit_price: Decimal,
    timestamp: Timestamp,
) -> Consolidation {
    holdings.sort_by_key(|h| h.id);
    let mut iter = holdings.into_iter();
    let mut primary = iter
        .next()
        .unwrap_or_else(|| Holding::new(account_id, ticker_id, timestamp));

    let mut total_amount = primary.amount;
    let mut total_cost = primary.cost_basis();
    let mut merged_away = Vec::new();

    for dup in iter {
        total_amount += dup.amount;
        total_cost += dup.cost_basis();
        merged_away.push(dup.id);
    }

    total_amount += tokens;
    total_cost += tokens * unit_price;

    primary.amount = total_amount;
    primary.avg_buy_price = if total_amount > Decimal::ZERO {
        total_cost / total_amount
    } else {
        Decimal::ZERO
    };
    primary.updated_at = timestamp;

    Consolidation {
        primary,
        merged_away,
    }
}

#[derive(Debug, Clone, Default)]
pub struct Drawdown {
    pub updated: Vec<Holding>,
    pub removed: Vec<HoldingId>,
}

/// Takes `amount` tokens out of the holdings in id order. Records that
/// end below `dust` are removed. Requests that exceed the total by at most
/// `dust` are clamped to the total.
pub fn draw_down(
    mut holdings: Vec<Holding>,
    amount: Decimal,
    dust: Decimal,
    timestamp: Timestamp,
) -> Result<Drawdown, AccountError> {
    let held: Decimal = holdings.iter().map(|h| h.amount).sum();
    if amount > held + dust {
        return Err(AccountError::InsufficientHoldings {
            requested: amount,
            available: held,
        });
    }

    holdings.sort_by_key(|h| h.id);
    let mut remaining = amount.min(held);
    let mut out = Drawdown::default();

    for mut holding in holdings {
        if remaining <= Decimal::ZERO {
            break;
        }
        let take = remaining.min(holding.amount);
        holding.amount -= take;
        remaining -= take;
        holding.updated_at = timestamp;

        if holding.amount < dust {
            out.removed.push(holding.id);
        } else {
            out.updated.push(holding);
        }
    }

    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Quote, available: Quote },

    #[error("Insufficient holdings: requested {requested}, available {available}")]
    InsufficientHoldings { requested: Decimal, available: Decimal },

    #[error("Crediting {amount} to {balance} overflows the balance")]
    BalanceOverflow { balance: Quote, amount: Quote },
}
