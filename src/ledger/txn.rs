use super::{ChangeSet, Effect, LedgerStore, Record, RecordKey, StoreError, TxnError};
use crate::account::Holding;
use crate::stats::StatsDelta;
use crate::types::{AccountId, TickerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 10,
            max_backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`: base doubled per failed attempt, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        let ms = self.base_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed<T> {
    pub value: T,
    pub attempts: u32,
}

/// One optimistic attempt. Reads record the version they saw; writes are
/// staged and only reach the store through [`Txn::into_changes`].
pub struct Txn<'a> {
    store: &'a dyn LedgerStore,
    reads: BTreeMap<RecordKey, Option<u64>>,
    effects: Vec<Effect>,
}

impl<'a> Txn<'a> {
    pub fn new(store: &'a dyn LedgerStore) -> Self {
        Self {
            store,
            reads: BTreeMap::new(),
            effects: Vec::new(),
        }
    }

    pub fn get<T: Record>(&mut self, key: RecordKey) -> Result<Option<T>, TxnError> {
        let stored = self.store.get(&key)?;
        self.reads.entry(key).or_insert(stored.as_ref().map(|s| s.version));
        match stored {
            Some(stored) => Ok(Some(T::decode(key, &stored)?)),
            None => Ok(None),
        }
    }

    /// Every holding for (account, ticker), each registered as a read.
    pub fn holdings(&mut self, account: AccountId, ticker: TickerId) -> Result<Vec<Holding>, TxnError> {
        let stored = self.store.holdings_for(account, ticker)?;
        let mut out = Vec::with_capacity(stored.len());
        for (key, doc) in stored {
            self.reads.entry(key).or_insert(Some(doc.version));
            out.push(Holding::decode(key, &doc)?);
        }
        Ok(out)
    }

    /// Stages a write. A record that fails its own `validate` aborts the
    /// transaction here, so it can never be committed and later fail to decode.
    pub fn put<T: Record>(&mut self, record: &T) -> Result<(), TxnError> {
        let key = record.key();
        record.validate().map_err(|reason| TxnError::Invalid {
            kind: T::KIND,
            key,
            reason,
        })?;
        let doc = record.encode()?;
        self.effects.push(Effect::Put { key, doc });
        Ok(())
    }

    pub fn delete(&mut self, key: RecordKey) {
        self.effects.push(Effect::Delete(key));
    }

    pub fn merge_stats(&mut self, delta: StatsDelta) {
        self.effects.push(Effect::MergeStats(delta));
    }

    pub fn into_changes(self) -> ChangeSet {
        ChangeSet {
            reads: self.reads.into_iter().collect(),
            effects: self.effects,
        }
    }
}

/// Runs `body` against a fresh [`Txn`] and commits, retrying on version
/// conflicts with exponential backoff. Errors returned by `body` abort
/// immediately and are never retried.
pub async fn run_transaction<T, E, F>(
    store: &dyn LedgerStore,
    policy: &RetryPolicy,
    mut body: F,
) -> Result<Committed<T>, E>
where
    F: FnMut(&mut Txn<'_>) -> Result<T, E>,
    E: From<TxnError>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        let mut txn = Txn::new(store);
        let value = body(&mut txn)?;
        let changes = txn.into_changes();

        if changes.is_read_only() {
            return Ok(Committed { value, attempts });
        }

        match store.commit(changes) {
            Ok(()) => return Ok(Committed { value, attempts }),
            Err(StoreError::Conflict { key }) => {
                if attempts >= max_attempts {
                    warn!(%key, attempts, "transaction retries exhausted");
                    return Err(TxnError::RetriesExhausted { attempts }.into());
                }
                let delay = policy.backoff(attempts);
                debug!(%key, attempts, delay_ms = delay.as_millis() as u64, "conflict, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(TxnError::Store(e).into()),
        }
    }
}
