use super::{ChangeSet, Effect, LedgerStore, Record, RecordKey, StoreError, Versioned};
use crate::stats::FeeStats;
use crate::types::{AccountId, TickerId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// In-process ledger. One lock covers validation and apply of a change set.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<BTreeMap<RecordKey, Versioned>>,
    commits: AtomicU64,
    conflicts: AtomicU64,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    pub fn conflict_count(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrites a raw document, bumping its version. Bypasses validation;
    /// used to seed fixtures and to simulate foreign writers.
    pub fn put_raw(&self, key: RecordKey, doc: serde_json::Value) -> Result<(), StoreError> {
        let mut records = self.lock()?;
        let version = records.get(&key).map(|v| v.version + 1).unwrap_or(1);
        records.insert(key, Versioned { version, doc });
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<RecordKey, Versioned>>, StoreError> {
        self.records.lock().map_err(|_| StoreError::Poisoned)
    }

    fn collect<F>(&self, mut keep: F) -> Result<Vec<(RecordKey, Versioned)>, StoreError>
    where
        F: FnMut(&RecordKey, &Versioned) -> bool,
    {
        let records = self.lock()?;
        Ok(records
            .iter()
            .filter(|(k, v)| keep(k, v))
            .map(|(k, v)| (*k, v.clone()))
            .collect())
    }
}

fn merge_stats(
    records: &mut BTreeMap<RecordKey, Versioned>,
    delta: &crate::stats::StatsDelta,
) -> Result<(), StoreError> {
    let key = RecordKey::Stats;
    let (mut stats, version) = match records.get(&key) {
        Some(stored) => {
            let stats = FeeStats::decode(key, stored).map_err(|e| StoreError::Corrupt {
                key,
                reason: e.reason,
            })?;
            (stats, stored.version)
        }
        None => (FeeStats::default(), 0),
    };
    stats.apply(delta).map_err(|e| StoreError::Rejected {
        key,
        reason: e.to_string(),
    })?;
    let doc = serde_json::to_value(&stats).map_err(|e| StoreError::Corrupt {
        key,
        reason: e.to_string(),
    })?;
    records.insert(key, Versioned { version: version + 1, doc });
    Ok(())
}

impl LedgerStore for MemoryLedger {
    fn get(&self, key: &RecordKey) -> Result<Option<Versioned>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn holdings_for(&self, account: AccountId, ticker: TickerId) -> Result<Vec<(RecordKey, Versioned)>, StoreError> {
        self.collect(|key, _| matches!(key, RecordKey::Holding(a, t, _) if *a == account && *t == ticker))
    }

    fn open_positions(&self) -> Result<Vec<(RecordKey, Versioned)>, StoreError> {
        self.collect(|key, stored| {
            matches!(key, RecordKey::Position(..))
                && stored.doc.get("status").and_then(|s| s.as_str()) == Some("open")
        })
    }

    fn positions_for(&self, account: AccountId) -> Result<Vec<(RecordKey, Versioned)>, StoreError> {
        self.collect(|key, _| matches!(key, RecordKey::Position(a, _) if *a == account))
    }

    fn activities_for(&self, account: AccountId) -> Result<Vec<(RecordKey, Versioned)>, StoreError> {
        self.collect(|key, _| matches!(key, RecordKey::Activity(a, _) if *a == account))
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        let mut records = self.lock()?;

        for (key, seen) in &changes.reads {
            let current = records.get(key).map(|v| v.version);
            if current != *seen {
                self.conflicts.fetch_add(1, Ordering::Relaxed);
                debug!(%key, ?seen, ?current, "commit rejected");
                return Err(StoreError::Conflict { key: *key });
            }
        }

        // Stats merges are validated against a scratch copy first so a corrupt
        // stats record cannot leave the change set half applied.
        let stats_deltas: Vec<_> = changes
            .effects
            .iter()
            .filter_map(|e| match e {
                Effect::MergeStats(delta) => Some(delta),
                _ => None,
            })
            .collect();
        if !stats_deltas.is_empty() {
            let mut scratch = BTreeMap::new();
            if let Some(stored) = records.get(&RecordKey::Stats) {
                scratch.insert(RecordKey::Stats, stored.clone());
            }
            for delta in &stats_deltas {
                merge_stats(&mut scratch, delta)?;
            }
            if let Some(merged) = scratch.remove(&RecordKey::Stats) {
                records.insert(RecordKey::Stats, merged);
            }
        }

        for effect in changes.effects {
            match effect {
                Effect::Put { key, doc } => {
                    let version = records.get(&key).map(|v| v.version + 1).unwrap_or(1);
                    records.insert(key, Versioned { version, doc });
                }
                Effect::Delete(key) => {
                    records.remove(&key);
                }
                Effect::MergeStats(_) => {}
            }
        }

        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use crate::stats::{FeeBucket, StatsDelta};
    use crate::types::{Quote, Timestamp};
    use rust_decimal_macros::dec;

    fn account_doc(balance: rust_decimal::Decimal) -> serde_json::Value {
        let mut account = Account::new(AccountId(1), Timestamp::from_millis(0));
        account.deposit(Quote::new(balance)).unwrap();
        serde_json::to_value(account).unwrap()
    }

    #[test]
    fn stale_read_is_rejected_and_nothing_applies() {
        let ledger = MemoryLedger::new();
        let key = RecordKey::Account(AccountId(1));
        ledger.put_raw(key, account_doc(dec!(100))).unwrap();

        let seen = ledger.get(&key).unwrap().unwrap().version;
        ledger.put_raw(key, account_doc(dec!(200))).unwrap();

        let changes = ChangeSet {
            reads: vec![(key, Some(seen))],
            effects: vec![
                Effect::Put { key, doc: account_doc(dec!(50)) },
                Effect::MergeStats(StatsDelta::fee(Quote::new(dec!(1)), FeeBucket::User)),
            ],
        };
        assert!(matches!(ledger.commit(changes), Err(StoreError::Conflict { .. })));
        assert_eq!(ledger.conflict_count(), 1);

        let stored = ledger.get(&key).unwrap().unwrap();
        let account: Account = serde_json::from_value(stored.doc).unwrap();
        assert_eq!(account.balance.value(), dec!(200));
        assert!(ledger.get(&RecordKey::Stats).unwrap().is_none());
    }

    #[test]
    fn missing_record_read_conflicts_with_creation() {
        let ledger = MemoryLedger::new();
        let key = RecordKey::Account(AccountId(9));

        ledger.put_raw(key, account_doc(dec!(1))).unwrap();
        let changes = ChangeSet {
            reads: vec![(key, None)],
            effects: vec![Effect::Put { key, doc: account_doc(dec!(2)) }],
        };
        assert!(ledger.commit(changes).is_err());
    }

    #[test]
    fn versions_bump_and_deletes_apply() {
        let ledger = MemoryLedger::new();
        let key = RecordKey::Account(AccountId(1));

        let put = ChangeSet {
            reads: vec![(key, None)],
            effects: vec![Effect::Put { key, doc: account_doc(dec!(5)) }],
        };
        ledger.commit(put).unwrap();
        assert_eq!(ledger.get(&key).unwrap().unwrap().version, 1);

        let delete = ChangeSet {
            reads: vec![(key, Some(1))],
            effects: vec![Effect::Delete(key)],
        };
        ledger.commit(delete).unwrap();
        assert!(ledger.get(&key).unwrap().is_none());
        assert_eq!(ledger.commit_count(), 2);
    }

    #[test]
    fn stats_merges_accumulate() {
        let ledger = MemoryLedger::new();
        for _ in 0..3 {
            ledger
                .commit(ChangeSet {
                    reads: Vec::new(),
                    effects: vec![Effect::MergeStats(StatsDelta::liquidation())],
                })
                .unwrap();
        }
        let stored = ledger.get(&RecordKey::Stats).unwrap().unwrap();
        assert_eq!(stored.doc["perp_liquidations"], serde_json::json!(3));
    }

    #[test]
    fn overflowing_fee_merge_rejects_whole_change_set() {
        let ledger = MemoryLedger::new();
        let fee = |amount| Effect::MergeStats(StatsDelta::fee(Quote::new(amount), FeeBucket::User));
        ledger
            .commit(ChangeSet {
                reads: Vec::new(),
                effects: vec![fee(rust_decimal::Decimal::MAX)],
            })
            .unwrap();

        let key = RecordKey::Account(AccountId(4));
        let changes = ChangeSet {
            reads: vec![(key, None)],
            effects: vec![Effect::Put { key, doc: account_doc(dec!(10)) }, fee(dec!(1))],
        };
        assert!(matches!(ledger.commit(changes), Err(StoreError::Rejected { .. })));
        assert!(ledger.get(&key).unwrap().is_none());

        // the lock is still healthy
        let stored = ledger.get(&RecordKey::Stats).unwrap().unwrap();
        assert_eq!(stored.version, 1);
    }
}
