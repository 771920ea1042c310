use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::debug;
use serde::{Deserialize, Serialize};

use super::{DecryptedMutation, LtHash, Operation, SyncError};

/// Local view of one collection: its version, LT-Hash and the live value MAC per index.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CollectionState {
    pub version: u64,
    pub hash: LtHash,
    /// base64 index MAC to base64 value MAC.
    #[serde(default)]
    index_value_macs: BTreeMap<String, String>,
}

impl CollectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value MAC currently stored for an index.
    pub fn value_mac(&self, index_mac: &[u8]) -> Option<Vec<u8>> {
        self.index_value_macs
            .get(&STANDARD.encode(index_mac))
            .and_then(|mac| STANDARD.decode(mac).ok())
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.index_value_macs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_value_macs.is_empty()
    }

    /// Apply a batch of authentic mutations and move to `version`.
    ///
    /// An index that already has a value contributes `index_mac || previous value_mac`
    /// to the removals. SET then adds `index_mac || value_mac`. A REMOVE for an index
    /// with no stored value removes its own element.
    pub fn apply(&mut self, mutations: &[DecryptedMutation], version: u64) -> Result<(), SyncError> {
        let mut macs = self.index_value_macs.clone();
        let mut removes = Vec::new();
        let mut adds = Vec::new();

        for mutation in mutations {
            let key = STANDARD.encode(&mutation.index_mac);
            let previous = macs
                .remove(&key)
                .map(|mac| STANDARD.decode(mac))
                .transpose()
                .map_err(|err| SyncError::InvalidArgument(format!("stored value MAC: {}", err)))?;

            match (mutation.operation, previous) {
                (_, Some(previous)) => {
                    removes.push([mutation.index_mac.as_slice(), previous.as_slice()].concat());
                }
                (Operation::Remove, None) => removes.push(mutation.hash_element()),
                (Operation::Set, None) => {}
            }
            if mutation.operation == Operation::Set {
                adds.push(mutation.hash_element());
                macs.insert(key, STANDARD.encode(&mutation.value_mac));
            }
        }

        let mut hash = self.hash.clone();
        hash.subtract_then_add(&removes, &adds)?;
        debug!(
            "collection moved {} -> {}: {} removed, {} added",
            self.version,
            version,
            removes.len(),
            adds.len()
        );
        self.hash = hash;
        self.index_value_macs = macs;
        self.version = version;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::SyncActionValue;

    fn mutation(operation: Operation, index_mac: u8, value_mac: u8) -> DecryptedMutation {
        DecryptedMutation {
            operation,
            index: vec!["pin_v1".to_string(), format!("{}@s.whatsapp.net", index_mac)],
            value: SyncActionValue::default(),
            version: 5,
            index_mac: vec![index_mac; 32],
            value_mac: vec![value_mac; 32],
        }
    }

    #[test]
    fn test_set_adds_element() {
        let mut state = CollectionState::new();
        let set = mutation(Operation::Set, 1, 2);
        state.apply(std::slice::from_ref(&set), 3).unwrap();

        let mut expected = LtHash::new();
        expected.add(&set.hash_element()).unwrap();
        assert_eq!(state.hash, expected);
        assert_eq!(state.version, 3);
        assert_eq!(state.value_mac(&[1; 32]), Some(vec![2; 32]));
    }

    #[test]
    fn test_overwrite_replaces_previous_value() {
        let mut state = CollectionState::new();
        state.apply(&[mutation(Operation::Set, 1, 2)], 1).unwrap();
        let newer = mutation(Operation::Set, 1, 9);
        state.apply(std::slice::from_ref(&newer), 2).unwrap();

        let mut expected = LtHash::new();
        expected.add(&newer.hash_element()).unwrap();
        assert_eq!(state.hash, expected);
        assert_eq!(state.len(), 1);
        assert_eq!(state.value_mac(&[1; 32]), Some(vec![9; 32]));
    }

    #[test]
    fn test_remove_returns_to_empty() {
        let mut state = CollectionState::new();
        state
            .apply(&[mutation(Operation::Set, 1, 2), mutation(Operation::Set, 3, 4)], 1)
            .unwrap();
        state
            .apply(&[mutation(Operation::Remove, 1, 77), mutation(Operation::Remove, 3, 88)], 2)
            .unwrap();
        assert_eq!(state.hash, LtHash::new());
        assert!(state.is_empty());
    }

    #[test]
    fn test_remove_without_history_uses_own_element() {
        let mut state = CollectionState::new();
        let set = mutation(Operation::Set, 5, 6);
        let mut hash = LtHash::new();
        hash.add(&set.hash_element()).unwrap();
        state.hash = hash;

        state.apply(&[mutation(Operation::Remove, 5, 6)], 7).unwrap();
        assert_eq!(state.hash, LtHash::new());
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut state = CollectionState::new();
        state.apply(&[mutation(Operation::Set, 1, 2)], 1).unwrap();
        let json = serde_json::to_string(&state).unwrap();
        let parsed: CollectionState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }
}
