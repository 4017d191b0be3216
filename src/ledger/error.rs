use super::RecordKey;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Version conflict on {key}")]
    Conflict { key: RecordKey },

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Corrupt stored document at {key}: {reason}")]
    Corrupt { key: RecordKey, reason: String },

    #[error("Merge into {key} rejected: {reason}")]
    Rejected { key: RecordKey, reason: String },
}

/// A stored document that failed to deserialize or broke a record invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to decode {kind} at {key}: {reason}")]
pub struct DecodeError {
    pub kind: &'static str,
    pub key: RecordKey,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxnError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Failed to encode {kind}: {reason}")]
    Encode { kind: &'static str, reason: String },

    #[error("Refusing to write invalid {kind} at {key}: {reason}")]
    Invalid {
        kind: &'static str,
        key: RecordKey,
        reason: String,
    },

    #[error("Transaction gave up after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}
