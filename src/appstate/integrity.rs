//! Snapshot and patch MAC verification.
//!
//! The server MACs `version (u64 BE) || collection name || LT-Hash` after every snapshot
//! and patch. Recomputing it over the locally accumulated hash proves that both sides
//! applied the same set of mutations.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use hmac::Mac;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::{CollectionName, CollectionState, DecryptedMutation, EncryptedMutation, LtHash, MutationKeys, SyncError};
use crate::config::WireConfig;
use crate::crypto::HmacSha256;
use crate::store::{AppStateKeyStore, CollectionStateStore};

fn collection_hmac(key: &[u8], version: u64, name: CollectionName, hash: &LtHash) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(&version.to_be_bytes());
    mac.update(name.as_str().as_bytes());
    mac.update(hash.as_bytes());
    mac
}

/// MAC binding a collection version to its LT-Hash.
pub fn collection_mac(key: &[u8], version: u64, name: CollectionName, hash: &LtHash) -> [u8; 32] {
    collection_hmac(key, version, name, hash).finalize().into_bytes().into()
}

/// Full state of a collection at `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    pub version: u64,
    #[serde(with = "hex")]
    pub key_id: Vec<u8>,
    #[serde(with = "hex")]
    pub mac: Vec<u8>,
    pub mutations: Vec<EncryptedMutation>,
}

/// Mutations moving a collection to `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPatch {
    pub version: u64,
    #[serde(with = "hex")]
    pub key_id: Vec<u8>,
    #[serde(with = "hex")]
    pub mac: Vec<u8>,
    pub mutations: Vec<EncryptedMutation>,
}

/// One collection's worth of a sync reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub collection: CollectionName,
    #[serde(default)]
    pub snapshot: Option<SyncSnapshot>,
    #[serde(default)]
    pub patches: Vec<SyncPatch>,
}

#[derive(Debug, Clone, Copy)]
enum MacKind {
    Snapshot,
    Patch,
}

/// Verifies server MACs with keys looked up in a key store.
pub struct IntegrityVerifier<'a, S: ?Sized> {
    store: &'a S,
    check_patch_macs: bool,
}

impl<'a, S: AppStateKeyStore + ?Sized> IntegrityVerifier<'a, S> {
    pub fn new(store: &'a S, config: &WireConfig) -> Self {
        Self::with_mac_checks(store, config.check_patch_macs)
    }

    /// With `check_patch_macs` off, snapshot and patch MACs are not checked.
    /// Mutation MACs always are.
    pub fn with_mac_checks(store: &'a S, check_patch_macs: bool) -> Self {
        Self {
            store,
            check_patch_macs,
        }
    }

    /// Expand the sync key stored under `key_id`.
    pub fn keys(&self, key_id: &[u8]) -> Result<MutationKeys, SyncError> {
        let key = self
            .store
            .find_app_state_key(key_id)?
            .ok_or_else(|| SyncError::MissingKey(hex::encode(key_id)))?;
        MutationKeys::derive(&key.key_data)
    }

    pub fn verify_snapshot(
        &self,
        name: CollectionName,
        version: u64,
        hash: &LtHash,
        key_id: &[u8],
        mac: &[u8],
    ) -> Result<(), SyncError> {
        self.verify(MacKind::Snapshot, name, version, hash, key_id, mac)
    }

    pub fn verify_patch(
        &self,
        name: CollectionName,
        version: u64,
        hash: &LtHash,
        key_id: &[u8],
        mac: &[u8],
    ) -> Result<(), SyncError> {
        self.verify(MacKind::Patch, name, version, hash, key_id, mac)
    }

    fn verify(
        &self,
        kind: MacKind,
        name: CollectionName,
        version: u64,
        hash: &LtHash,
        key_id: &[u8],
        mac: &[u8],
    ) -> Result<(), SyncError> {
        if !self.check_patch_macs {
            debug!("skipping {:?} MAC check for {} v{}", kind, name, version);
            return Ok(());
        }
        let keys = self.keys(key_id)?;
        let key = match kind {
            MacKind::Snapshot => keys.snapshot_mac_key()?,
            MacKind::Patch => keys.patch_mac_key()?,
        };
        if collection_hmac(key, version, name, hash).verify_slice(mac).is_ok() {
            return Ok(());
        }
        warn!("{:?} MAC mismatch for {} v{}", kind, name, version);
        Err(match kind {
            MacKind::Snapshot => SyncError::SnapshotMacMismatch,
            MacKind::Patch => SyncError::PatchMacMismatch,
        })
    }

    /// Open every mutation, expanding each referenced key once.
    pub fn open_all(&self, mutations: &[EncryptedMutation]) -> Result<Vec<DecryptedMutation>, SyncError> {
        let mut cache: HashMap<Vec<u8>, MutationKeys> = HashMap::new();
        let mut opened = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            let keys = match cache.entry(mutation.key_id.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(self.keys(&mutation.key_id)?),
            };
            opened.push(DecryptedMutation::open(mutation, keys)?);
        }
        Ok(opened)
    }

    /// Apply a snapshot and its patches to `state`, verifying each step.
    ///
    /// `state` is only updated when every mutation and MAC checks out. Patches at or
    /// below the current version are skipped. Returns the mutations that were applied.
    pub fn apply_response(
        &self,
        state: &mut CollectionState,
        response: &SyncResponse,
    ) -> Result<Vec<DecryptedMutation>, SyncError> {
        let name = response.collection;
        let mut working = state.clone();
        let mut applied = Vec::new();

        if let Some(snapshot) = &response.snapshot {
            working = CollectionState::new();
            let opened = self.open_all(&snapshot.mutations)?;
            working.apply(&opened, snapshot.version)?;
            self.verify_snapshot(name, snapshot.version, &working.hash, &snapshot.key_id, &snapshot.mac)?;
            applied.extend(opened);
        }

        for patch in &response.patches {
            if patch.version <= working.version {
                debug!("skipping {} patch v{}, already at v{}", name, patch.version, working.version);
                continue;
            }
            let opened = self.open_all(&patch.mutations)?;
            working.apply(&opened, patch.version)?;
            self.verify_patch(name, patch.version, &working.hash, &patch.key_id, &patch.mac)?;
            applied.extend(opened);
        }

        debug!("{} synced to v{} with {} mutations", name, working.version, applied.len());
        *state = working;
        Ok(applied)
    }
}

impl<'a, S: AppStateKeyStore + CollectionStateStore + ?Sized> IntegrityVerifier<'a, S> {
    /// Apply `response` to the collection state kept in the store.
    ///
    /// The stored state is replaced only when the whole response verifies.
    pub fn sync(&self, response: &SyncResponse) -> Result<Vec<DecryptedMutation>, SyncError> {
        let name = response.collection;
        let mut state = self.store.get_collection_state(name)?.unwrap_or_default();
        let applied = self.apply_response(&mut state, response)?;
        self.store.put_collection_state(name, &state)?;
        info!("{} stored at v{}", name, state.version);
        Ok(applied)
    }
}
