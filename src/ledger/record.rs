use super::{DecodeError, LedgerStore, TxnError, Versioned};
use crate::account::{Account, Holding};
use crate::events::Activity;
use crate::position::PerpPosition;
use crate::stats::FeeStats;
use crate::ticker::Ticker;
use crate::types::{AccountId, ActivityId, HoldingId, PositionId, TickerId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// Address of a stored document. Holdings, positions and activities are
/// scoped under their account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKey {
    Account(AccountId),
    Ticker(TickerId),
    Holding(AccountId, TickerId, HoldingId),
    Position(AccountId, PositionId),
    Activity(AccountId, ActivityId),
    Stats,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Account(a) => write!(f, "accounts/{}", a),
            RecordKey::Ticker(t) => write!(f, "tickers/{}", t),
            RecordKey::Holding(a, t, h) => write!(f, "accounts/{}/holdings/{}/{}", a, t, h),
            RecordKey::Position(a, p) => write!(f, "accounts/{}/positions/{}", a, p),
            RecordKey::Activity(a, e) => write!(f, "accounts/{}/activity/{}", a, e),
            RecordKey::Stats => write!(f, "stats/fees"),
        }
    }
}

/// A typed document. Decoding always runs `validate`, so a record that
/// breaks its own invariants never reaches business logic.
pub trait Record: Serialize + DeserializeOwned + Send {
    const KIND: &'static str;

    fn key(&self) -> RecordKey;

    fn validate(&self) -> Result<(), String>;

    fn decode(key: RecordKey, stored: &Versioned) -> Result<Self, DecodeError> {
        let record: Self = serde_json::from_value(stored.doc.clone()).map_err(|e| DecodeError {
            kind: Self::KIND,
            key,
            reason: e.to_string(),
        })?;
        record.validate().map_err(|reason| DecodeError {
            kind: Self::KIND,
            key,
            reason,
        })?;
        Ok(record)
    }

    fn encode(&self) -> Result<serde_json::Value, TxnError> {
        serde_json::to_value(self).map_err(|e| TxnError::Encode {
            kind: Self::KIND,
            reason: e.to_string(),
        })
    }
}

impl Record for Account {
    const KIND: &'static str = "account";

    fn key(&self) -> RecordKey {
        RecordKey::Account(self.id)
    }

    fn validate(&self) -> Result<(), String> {
        Account::validate(self)
    }
}

impl Record for Ticker {
    const KIND: &'static str = "ticker";

    fn key(&self) -> RecordKey {
        RecordKey::Ticker(self.id)
    }

    fn validate(&self) -> Result<(), String> {
        Ticker::validate(self)
    }
}

impl Record for Holding {
    const KIND: &'static str = "holding";

    fn key(&self) -> RecordKey {
        RecordKey::Holding(self.account_id, self.ticker_id, self.id)
    }

    fn validate(&self) -> Result<(), String> {
        Holding::validate(self)
    }
}

impl Record for PerpPosition {
    const KIND: &'static str = "position";

    fn key(&self) -> RecordKey {
        RecordKey::Position(self.account_id, self.id)
    }

    fn validate(&self) -> Result<(), String> {
        PerpPosition::validate(self)
    }
}

impl Record for Activity {
    const KIND: &'static str = "activity";

    fn key(&self) -> RecordKey {
        RecordKey::Activity(self.account_id, self.id)
    }

    fn validate(&self) -> Result<(), String> {
        if self.value.is_negative() || self.fee.is_negative() {
            return Err(format!("activity {} has negative amounts", self.id));
        }
        Ok(())
    }
}

impl Record for FeeStats {
    const KIND: &'static str = "stats";

    fn key(&self) -> RecordKey {
        RecordKey::Stats
    }

    fn validate(&self) -> Result<(), String> {
        FeeStats::validate(self)
    }
}

/// Reads one record outside any transaction.
pub fn load<T: Record>(store: &dyn LedgerStore, key: RecordKey) -> Result<Option<T>, TxnError> {
    match store.get(&key)? {
        Some(stored) => Ok(Some(T::decode(key, &stored)?)),
        None => Ok(None),
    }
}

/// Decodes a batch of stored documents of one kind.
pub fn load_all<T: Record>(stored: Vec<(RecordKey, Versioned)>) -> Result<Vec<T>, TxnError> {
    stored
        .iter()
        .map(|(key, doc)| T::decode(*key, doc).map_err(TxnError::from))
        .collect()
}
