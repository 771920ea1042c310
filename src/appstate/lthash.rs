//! LT-Hash: a fixed-width additive accumulator over byte elements.
//!
//! Every position holds a value in `0..127`. An element is broadcast cyclically over the
//! 128 positions and added or subtracted modulo 127, so the digest of a set does not
//! depend on the order its members were added in, and removing an element undoes adding it.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::SyncError;

pub const LT_HASH_SIZE: usize = 128;
const MODULUS: u16 = 127;

#[derive(Clone, PartialEq, Eq)]
pub struct LtHash {
    state: [u8; LT_HASH_SIZE],
}

impl LtHash {
    /// Hash of the empty set.
    pub fn new() -> Self {
        Self {
            state: [0; LT_HASH_SIZE],
        }
    }

    /// Load a stored digest. Bytes are reduced modulo 127.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        if bytes.len() != LT_HASH_SIZE {
            return Err(SyncError::InvalidArgument(format!(
                "LT-Hash must be {} bytes, got {}",
                LT_HASH_SIZE,
                bytes.len()
            )));
        }
        let mut hash = Self::new();
        for (slot, &byte) in hash.state.iter_mut().zip(bytes) {
            *slot = (byte as u16 % MODULUS) as u8;
        }
        Ok(hash)
    }

    pub fn as_bytes(&self) -> &[u8; LT_HASH_SIZE] {
        &self.state
    }

    pub fn add(&mut self, element: &[u8]) -> Result<(), SyncError> {
        self.apply(element, |slot, value| (slot + value) % MODULUS)
    }

    pub fn remove(&mut self, element: &[u8]) -> Result<(), SyncError> {
        self.apply(element, |slot, value| (slot + MODULUS - value) % MODULUS)
    }

    /// Apply every removal, then every addition.
    pub fn subtract_then_add<R, A>(&mut self, removes: R, adds: A) -> Result<(), SyncError>
    where
        R: IntoIterator,
        R::Item: AsRef<[u8]>,
        A: IntoIterator,
        A::Item: AsRef<[u8]>,
    {
        for element in removes {
            self.remove(element.as_ref())?;
        }
        for element in adds {
            self.add(element.as_ref())?;
        }
        Ok(())
    }

    fn apply(&mut self, element: &[u8], op: impl Fn(u16, u16) -> u16) -> Result<(), SyncError> {
        if element.is_empty() {
            return Err(SyncError::InvalidArgument("LT-Hash element is empty".to_string()));
        }
        for (i, slot) in self.state.iter_mut().enumerate() {
            let value = element[i % element.len()] as u16 % MODULUS;
            *slot = op(*slot as u16, value) as u8;
        }
        Ok(())
    }
}

impl Default for LtHash {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LtHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LtHash({})", hex::encode(self.state))
    }
}

impl Serialize for LtHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(self.state))
    }
}

impl<'de> Deserialize<'de> for LtHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = STANDARD.decode(text).map_err(serde::de::Error::custom)?;
        LtHash::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}
