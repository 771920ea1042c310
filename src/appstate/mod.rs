//! App-state sync cryptography.
//!
//! Each synced collection is an unordered set of mutations fingerprinted by an
//! [`LtHash`]. Mutation values are sealed with AES-CBC and HMAC-SHA256 under keys
//! expanded from a shared sync key, and the server binds every snapshot and patch to
//! the resulting hash with a MAC.

mod integrity;
mod keys;
mod lthash;
mod mutation;
mod state;

pub use integrity::{collection_mac, IntegrityVerifier, SyncPatch, SyncResponse, SyncSnapshot};
pub use keys::MutationKeys;
pub use lthash::{LtHash, LT_HASH_SIZE};
pub use mutation::{DecryptedMutation, EncryptedMutation, Mutation};
pub use state::CollectionState;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::CipherError;
use crate::store::StoreError;

/// Errors raised while sealing, opening or verifying app state.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Value MAC mismatch")]
    ValueMacMismatch,
    #[error("Index MAC mismatch")]
    IndexMacMismatch,
    #[error("Snapshot MAC mismatch")]
    SnapshotMacMismatch,
    #[error("Patch MAC mismatch")]
    PatchMacMismatch,
    #[error("missing app state key {0}")]
    MissingKey(String),
    #[error("mutation keys have been closed")]
    KeysClosed,
    #[error("failed to decrypt mutation: {0}")]
    Cipher(#[from] CipherError),
    #[error("failed to decode mutation: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("invalid mutation index: {0}")]
    Index(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// True for failures that mean the synced state was tampered with.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            SyncError::ValueMacMismatch
                | SyncError::IndexMacMismatch
                | SyncError::SnapshotMacMismatch
                | SyncError::PatchMacMismatch
        )
    }
}

/// Mutation operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Set,
    Remove,
}

impl Operation {
    /// Wire value of the operation.
    pub fn as_i32(&self) -> i32 {
        match self {
            Operation::Set => 0,
            Operation::Remove => 1,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Operation::Set),
            1 => Some(Operation::Remove),
            _ => None,
        }
    }

    /// Leading byte of the value MAC input.
    pub fn mac_byte(&self) -> u8 {
        self.as_i32() as u8 + 1
    }
}

/// Synced collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionName {
    CriticalBlock,
    CriticalUnblockLow,
    RegularHigh,
    Regular,
    RegularLow,
}

impl CollectionName {
    pub const ALL: [CollectionName; 5] = [
        CollectionName::CriticalBlock,
        CollectionName::CriticalUnblockLow,
        CollectionName::RegularHigh,
        CollectionName::Regular,
        CollectionName::RegularLow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionName::CriticalBlock => "critical_block",
            CollectionName::CriticalUnblockLow => "critical_unblock_low",
            CollectionName::RegularHigh => "regular_high",
            CollectionName::Regular => "regular",
            CollectionName::RegularLow => "regular_low",
        }
    }
}

impl std::fmt::Display for CollectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CollectionName {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CollectionName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| SyncError::InvalidArgument(format!("unknown collection: {}", s)))
    }
}
