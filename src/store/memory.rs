//! In-memory store implementation for development and testing.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::appstate::{CollectionName, CollectionState};
use crate::store::{AppStateKeyStore, AppStateSyncKey, CollectionStateStore, StoreError, StoreResult};

fn poisoned<T>(_: T) -> StoreError {
    StoreError::DatabaseError("lock poisoned".to_string())
}

/// In-memory implementation of all store traits.
pub struct MemoryStore {
    keys: RwLock<HashMap<Vec<u8>, AppStateSyncKey>>,
    collections: RwLock<HashMap<CollectionName, CollectionState>>,
}

impl MemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AppStateKeyStore for MemoryStore {
    fn put_app_state_key(&self, key: AppStateSyncKey) -> StoreResult<()> {
        let mut keys = self.keys.write().map_err(poisoned)?;
        keys.insert(key.key_id.clone(), key);
        Ok(())
    }

    fn find_app_state_key(&self, key_id: &[u8]) -> StoreResult<Option<AppStateSyncKey>> {
        let keys = self.keys.read().map_err(poisoned)?;
        Ok(keys.get(key_id).cloned())
    }
}

impl CollectionStateStore for MemoryStore {
    fn get_collection_state(&self, name: CollectionName) -> StoreResult<Option<CollectionState>> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections.get(&name).cloned())
    }

    fn put_collection_state(&self, name: CollectionName, state: &CollectionState) -> StoreResult<()> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        collections.insert(name, state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_keys() {
        let store = MemoryStore::new();
        store.put_app_state_key(AppStateSyncKey::new(vec![1], vec![7u8; 32], 100)).unwrap();
        store.put_app_state_key(AppStateSyncKey::new(vec![2], vec![8u8; 32], 200)).unwrap();

        let found = store.find_app_state_key(&[1]).unwrap().unwrap();
        assert_eq!(found.key_data, vec![7u8; 32]);
        assert!(store.find_app_state_key(&[3]).unwrap().is_none());

        store.put_app_state_key(AppStateSyncKey::new(vec![1], vec![9u8; 32], 300)).unwrap();
        assert_eq!(store.find_app_state_key(&[1]).unwrap().unwrap().key_data, vec![9u8; 32]);
    }

    #[test]
    fn test_memory_store_collections() {
        let store = MemoryStore::new();
        let mut state = CollectionState::new();
        state.version = 4;

        store.put_collection_state(CollectionName::Regular, &state).unwrap();
        assert_eq!(store.get_collection_state(CollectionName::Regular).unwrap(), Some(state.clone()));
        assert_eq!(store.get_collection_state(CollectionName::RegularLow).unwrap(), None);

        state.version = 9;
        store.put_collection_state(CollectionName::Regular, &state).unwrap();
        assert_eq!(store.get_collection_state(CollectionName::Regular).unwrap().unwrap().version, 9);
    }

    #[test]
    fn test_sync_key_debug_hides_data() {
        let key = AppStateSyncKey::new(vec![0xAB], vec![0x11u8; 32], 1);
        let debug = format!("{:?}", key);
        assert!(debug.contains("ab"));
        assert!(!debug.contains("1111"));
    }
}
