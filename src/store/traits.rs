//! Store traits for app-state sync data.
//!
//! Sync keys arrive out of band (key share messages) and are looked up by id when a
//! snapshot or patch names them. Collection states are persisted between syncs.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::appstate::{CollectionName, CollectionState};

/// Error type for store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    DatabaseError(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A shared app-state sync key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct AppStateSyncKey {
    #[zeroize(skip)]
    #[serde(with = "hex_bytes")]
    pub key_id: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub key_data: Vec<u8>,
    #[zeroize(skip)]
    pub timestamp: i64,
}

impl AppStateSyncKey {
    pub fn new(key_id: impl Into<Vec<u8>>, key_data: impl Into<Vec<u8>>, timestamp: i64) -> Self {
        Self {
            key_id: key_id.into(),
            key_data: key_data.into(),
            timestamp,
        }
    }
}

impl std::fmt::Debug for AppStateSyncKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppStateSyncKey")
            .field("key_id", &hex::encode(&self.key_id))
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

/// Sync key store.
pub trait AppStateKeyStore: Send + Sync {
    /// Store a key, replacing any key with the same id.
    fn put_app_state_key(&self, key: AppStateSyncKey) -> StoreResult<()>;

    /// Find a key by id.
    fn find_app_state_key(&self, key_id: &[u8]) -> StoreResult<Option<AppStateSyncKey>>;
}

/// Per-collection sync state.
pub trait CollectionStateStore: Send + Sync {
    fn get_collection_state(&self, name: CollectionName) -> StoreResult<Option<CollectionState>>;

    fn put_collection_state(&self, name: CollectionName, state: &CollectionState) -> StoreResult<()>;
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}
