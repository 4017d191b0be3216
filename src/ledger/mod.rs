//! Versioned document ledger with optimistic transactions.
//!
//! Every record is a JSON document carrying a version that bumps on each
//! write. A [`Txn`] remembers the version of everything it reads and stages
//! [`Effect`]s; the resulting [`ChangeSet`] is applied by the store in one
//! step only if none of those versions moved. [`run_transaction`] retries
//! the whole body on conflict under an explicit [`RetryPolicy`].

mod error;
mod memory;
mod record;
mod txn;

pub use error::{DecodeError, StoreError, TxnError};
pub use memory::MemoryLedger;
pub use record::{load, load_all, Record, RecordKey};
pub use txn::{run_transaction, Committed, RetryPolicy, Txn};

use crate::stats::StatsDelta;
use crate::types::{AccountId, TickerId};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub version: u64,
    pub doc: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Put { key: RecordKey, doc: Value },
    Delete(RecordKey),
    MergeStats(StatsDelta),
}

/// Everything a transaction read (with the version it saw, `None` for a
/// missing record) and everything it wants to write.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub reads: Vec<(RecordKey, Option<u64>)>,
    pub effects: Vec<Effect>,
}

impl ChangeSet {
    pub fn is_read_only(&self) -> bool {
        self.effects.is_empty()
    }
}

/// Storage port. Reads are point-in-time; `commit` is all-or-nothing.
pub trait LedgerStore: Send + Sync {
    fn get(&self, key: &RecordKey) -> Result<Option<Versioned>, StoreError>;

    /// Holding records for one (account, ticker) pair.
    fn holdings_for(&self, account: AccountId, ticker: TickerId) -> Result<Vec<(RecordKey, Versioned)>, StoreError>;

    /// Every position whose status is open, across all accounts.
    fn open_positions(&self) -> Result<Vec<(RecordKey, Versioned)>, StoreError>;

    fn positions_for(&self, account: AccountId) -> Result<Vec<(RecordKey, Versioned)>, StoreError>;

    fn activities_for(&self, account: AccountId) -> Result<Vec<(RecordKey, Versioned)>, StoreError>;

    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError>;
}
