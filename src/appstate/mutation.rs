//! Sealing and opening of individual mutations.
//!
//! The value blob is `iv || AES-256-CBC(SyncActionData) || value_mac`. The index MAC
//! travels next to the blob and identifies the mutated entry.

use hmac::Mac;
use log::warn;
use prost::Message;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use super::{MutationKeys, Operation, SyncError};
use crate::crypto::{aes_cbc, HmacSha256};
use crate::proto::{SyncActionData, SyncActionValue};

const IV_LENGTH: usize = 16;
const MAC_LENGTH: usize = 32;
const MAX_PADDING: usize = 64;
const VALUE_MAC_VERSION: [u8; 4] = [0, 0, 0, 2];

fn value_hmac(key: &[u8], operation: Operation, iv: &[u8], ciphertext: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(&[operation.mac_byte()]);
    mac.update(&VALUE_MAC_VERSION);
    mac.update(iv);
    mac.update(ciphertext);
    mac
}

fn index_hmac(key: &[u8], index: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(index);
    mac
}

/// A mutation in plaintext, before sealing.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub operation: Operation,
    /// Index path, e.g. `["star", chat, message id, from me, participant]`.
    pub index: Vec<String>,
    pub value: SyncActionValue,
    pub version: i32,
}

impl Mutation {
    pub fn new(operation: Operation, index: Vec<String>, value: SyncActionValue, version: i32) -> Self {
        Self {
            operation,
            index,
            value,
            version,
        }
    }

    /// The index as it is MACed: a compact JSON array.
    pub fn index_bytes(&self) -> Result<Vec<u8>, SyncError> {
        Ok(serde_json::to_vec(&self.index)?)
    }
}

/// A sealed mutation as it is sent to or received from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMutation {
    pub operation: Operation,
    #[serde(with = "hex")]
    pub key_id: Vec<u8>,
    #[serde(with = "hex")]
    pub index_mac: Vec<u8>,
    #[serde(with = "hex")]
    pub value_blob: Vec<u8>,
}

impl EncryptedMutation {
    /// Seal `mutation` with fresh padding and a fresh IV.
    pub fn seal(mutation: &Mutation, keys: &MutationKeys, key_id: &[u8]) -> Result<Self, SyncError> {
        let mut rng = rand::thread_rng();
        let index = mutation.index_bytes()?;

        let mut padding = vec![0u8; rng.gen_range(1..=MAX_PADDING)];
        rng.fill_bytes(&mut padding);
        let record = SyncActionData {
            index: Some(index.clone()),
            value: Some(mutation.value.clone()),
            padding: Some(padding),
            version: Some(mutation.version),
        };

        let mut iv = [0u8; IV_LENGTH];
        rng.fill_bytes(&mut iv);
        let ciphertext = aes_cbc::encrypt(keys.value_encryption_key()?, &iv, &record.encode_to_vec())?;
        let mac = value_hmac(keys.value_mac_key()?, mutation.operation, &iv, &ciphertext)
            .finalize()
            .into_bytes();

        let mut value_blob = Vec::with_capacity(IV_LENGTH + ciphertext.len() + MAC_LENGTH);
        value_blob.extend_from_slice(&iv);
        value_blob.extend_from_slice(&ciphertext);
        value_blob.extend_from_slice(&mac);

        Ok(Self {
            operation: mutation.operation,
            key_id: key_id.to_vec(),
            index_mac: index_hmac(keys.index_key()?, &index).finalize().into_bytes().to_vec(),
            value_blob,
        })
    }

    /// Trailing value MAC of the blob.
    pub fn value_mac(&self) -> Result<&[u8], SyncError> {
        if self.value_blob.len() < IV_LENGTH + MAC_LENGTH {
            return Err(SyncError::InvalidArgument(format!(
                "value blob of {} bytes is too short",
                self.value_blob.len()
            )));
        }
        Ok(&self.value_blob[self.value_blob.len() - MAC_LENGTH..])
    }
}

/// A mutation whose MACs are known to be authentic.
#[derive(Debug, Clone, PartialEq)]
pub struct DecryptedMutation {
    pub operation: Operation,
    pub index: Vec<String>,
    pub value: SyncActionValue,
    pub version: i32,
    pub index_mac: Vec<u8>,
    pub value_mac: Vec<u8>,
}

impl DecryptedMutation {
    /// Verify and decrypt a mutation received from the server.
    ///
    /// The value MAC is checked before anything is decrypted and the index MAC after.
    pub fn open(encrypted: &EncryptedMutation, keys: &MutationKeys) -> Result<Self, SyncError> {
        let mac = encrypted.value_mac()?;
        let blob = &encrypted.value_blob;
        let (iv, rest) = blob.split_at(IV_LENGTH);
        let ciphertext = &rest[..rest.len() - MAC_LENGTH];

        if value_hmac(keys.value_mac_key()?, encrypted.operation, iv, ciphertext)
            .verify_slice(mac)
            .is_err()
        {
            warn!("mutation value MAC mismatch");
            return Err(SyncError::ValueMacMismatch);
        }

        let plaintext = aes_cbc::decrypt(keys.value_encryption_key()?, iv, ciphertext)?;
        let record = SyncActionData::decode(&plaintext[..])?;
        let index = record.index.unwrap_or_default();

        if index_hmac(keys.index_key()?, &index)
            .verify_slice(&encrypted.index_mac)
            .is_err()
        {
            warn!("mutation index MAC mismatch");
            return Err(SyncError::IndexMacMismatch);
        }

        Ok(Self {
            operation: encrypted.operation,
            index: serde_json::from_slice(&index)?,
            value: record.value.unwrap_or_default(),
            version: record.version.unwrap_or_default(),
            index_mac: encrypted.index_mac.clone(),
            value_mac: mac.to_vec(),
        })
    }

    /// Pair a locally created mutation with the MACs produced when it was sealed.
    pub fn trusted(mutation: Mutation, sealed: &EncryptedMutation) -> Result<Self, SyncError> {
        Ok(Self {
            value_mac: sealed.value_mac()?.to_vec(),
            index_mac: sealed.index_mac.clone(),
            operation: mutation.operation,
            index: mutation.index,
            value: mutation.value,
            version: mutation.version,
        })
    }

    /// LT-Hash element of this mutation: `index_mac || value_mac`.
    pub fn hash_element(&self) -> Vec<u8> {
        [self.index_mac.as_slice(), self.value_mac.as_slice()].concat()
    }
}
