//! Cash in and out of the ledger.

use super::core::{require_account, Engine};
use super::results::{BalanceResult, EngineError};
use crate::account::Account;
use crate::events::{Activity, ActivityKind};
use crate::ledger::RecordKey;
use crate::types::{AccountId, Quote};
use rust_decimal::Decimal;
use tracing::info;

fn positive(amount: Decimal) -> Result<Quote, EngineError> {
    if amount <= Decimal::ZERO {
        return Err(EngineError::InvalidAmount(format!("amount must be positive, got {}", amount)));
    }
    Ok(Quote::new(amount))
}

impl Engine {
    /// Credits `amount` to the account, opening it on first deposit.
    pub async fn deposit(&self, account_id: AccountId, amount: Decimal) -> Result<BalanceResult, EngineError> {
        let amount = positive(amount)?;
        let now = self.time();

        let (new_balance, _) = self
            .transact("deposit", |txn| {
                let mut account = txn
                    .get::<Account>(RecordKey::Account(account_id))?
                    .unwrap_or_else(|| Account::new(account_id, now));
                account.deposit(amount)?;
                txn.put(&account)?;
                txn.put(&Activity::cash(account_id, ActivityKind::Deposit, now, amount))?;
                Ok(account.balance)
            })
            .await?;

        info!(account = %account_id, %amount, %new_balance, "deposit");
        Ok(BalanceResult {
            account_id,
            amount,
            new_balance,
        })
    }

    pub async fn withdraw(&self, account_id: AccountId, amount: Decimal) -> Result<BalanceResult, EngineError> {
        let amount = positive(amount)?;
        let now = self.time();

        let (new_balance, _) = self
            .transact("withdraw", |txn| {
                let mut account = require_account(txn, account_id)?;
                account.withdraw(amount)?;
                txn.put(&account)?;
                txn.put(&Activity::cash(account_id, ActivityKind::Withdrawal, now, amount))?;
                Ok(account.balance)
            })
            .await?;

        info!(account = %account_id, %amount, %new_balance, "withdrawal");
        Ok(BalanceResult {
            account_id,
            amount,
            new_balance,
        })
    }
}
