// 8.0 engine/core.rs: the engine front. owns handles to the ledger, the oracle
// and the clock. every mutating op is one ledger transaction.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::account::{Account, Holding};
use crate::events::Activity;
use crate::ledger::{self, run_transaction, LedgerStore, RecordKey, Txn};
use crate::position::PerpPosition;
use crate::price_feed::PriceOracle;
use crate::stats::{FeeBucket, FeeStats};
use crate::ticker::Ticker;
use crate::types::{AccountId, Clock, PositionId, SystemClock, TickerId, Timestamp};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::debug;

/** 8.1: main engine struct. cheap to clone, all clones share state */
#[derive(Clone)]
pub struct Engine {
    pub(super) config: Arc<EngineConfig>,
    pub(super) store: Arc<dyn LedgerStore>,
    pub(super) oracle: Arc<dyn PriceOracle>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) sweep_in_flight: Arc<AtomicBool>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("operator_account", &self.config.operator_account)
            .field("pairs", &self.config.pairs.len())
            .finish()
    }
}

impl Engine {
    pub fn new(config: EngineConfig, store: Arc<dyn LedgerStore>, oracle: Arc<dyn PriceOracle>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            oracle,
            clock: Arc::new(SystemClock),
            sweep_in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn LedgerStore {
        self.store.as_ref()
    }

    pub fn time(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn get_account(&self, account_id: AccountId) -> Result<Option<Account>, EngineError> {
        Ok(ledger::load(self.store(), RecordKey::Account(account_id))?)
    }

    pub fn get_ticker(&self, ticker_id: TickerId) -> Result<Option<Ticker>, EngineError> {
        Ok(ledger::load(self.store(), RecordKey::Ticker(ticker_id))?)
    }

    pub fn get_position(&self, account_id: AccountId, position_id: PositionId) -> Result<Option<PerpPosition>, EngineError> {
        Ok(ledger::load(self.store(), RecordKey::Position(account_id, position_id))?)
    }

    pub fn positions(&self, account_id: AccountId) -> Result<Vec<PerpPosition>, EngineError> {
        let stored = self.store.positions_for(account_id).map_err(ledger::TxnError::from)?;
        Ok(ledger::load_all(stored)?)
    }

    pub fn holdings(&self, account_id: AccountId, ticker_id: TickerId) -> Result<Vec<Holding>, EngineError> {
        let stored = self
            .store
            .holdings_for(account_id, ticker_id)
            .map_err(ledger::TxnError::from)?;
        Ok(ledger::load_all(stored)?)
    }

    /// Activity history, oldest first.
    pub fn activities(&self, account_id: AccountId) -> Result<Vec<Activity>, EngineError> {
        let stored = self.store.activities_for(account_id).map_err(ledger::TxnError::from)?;
        let mut out: Vec<Activity> = ledger::load_all(stored)?;
        out.sort_by_key(|a| (a.timestamp, a.id));
        Ok(out)
    }

    pub fn stats(&self) -> Result<FeeStats, EngineError> {
        Ok(ledger::load(self.store(), RecordKey::Stats)?.unwrap_or_default())
    }

    pub(super) fn fee_bucket(&self, caller: AccountId) -> FeeBucket {
        FeeBucket::for_caller(caller, self.config.operator_account)
    }

    /// Runs `body` as one retried ledger transaction and returns its value.
    pub(super) async fn transact<T, F>(&self, op: &'static str, body: F) -> Result<(T, u32), EngineError>
    where
        F: FnMut(&mut Txn<'_>) -> Result<T, EngineError>,
    {
        let committed = run_transaction(self.store.as_ref(), &self.config.retry, body).await?;
        if committed.attempts > 1 {
            debug!(op, attempts = committed.attempts, "committed after retry");
        }
        Ok((committed.value, committed.attempts))
    }
}

/// Reads an account inside `txn`, failing when it does not exist.
pub(super) fn require_account(txn: &mut Txn<'_>, account_id: AccountId) -> Result<Account, EngineError> {
    txn.get(RecordKey::Account(account_id))?
        .ok_or(EngineError::AccountNotFound(account_id))
}
