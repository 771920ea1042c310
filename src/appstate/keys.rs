use zeroize::{Zeroize, ZeroizeOnDrop};

use super::SyncError;
use crate::crypto::Hkdf;

const SYNC_KEY_LENGTH: usize = 32;
const MUTATION_KEYS_INFO: &[u8] = b"WhatsApp Mutation Keys";

/// The five keys expanded from one app-state sync key.
///
/// Key material is wiped by [`MutationKeys::close`] and on drop. Accessors fail once the
/// keys are closed.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MutationKeys {
    index: [u8; 32],
    value_encryption: [u8; 32],
    value_mac: [u8; 32],
    snapshot_mac: [u8; 32],
    patch_mac: [u8; 32],
    #[zeroize(skip)]
    closed: bool,
}

impl MutationKeys {
    pub fn derive(sync_key: &[u8]) -> Result<Self, SyncError> {
        if sync_key.len() != SYNC_KEY_LENGTH {
            return Err(SyncError::InvalidArgument(format!(
                "sync key must be {} bytes, got {}",
                SYNC_KEY_LENGTH,
                sync_key.len()
            )));
        }
        let mut expanded: [u8; 160] = Hkdf::derive_array(sync_key, MUTATION_KEYS_INFO);
        let mut keys = Self {
            index: [0; 32],
            value_encryption: [0; 32],
            value_mac: [0; 32],
            snapshot_mac: [0; 32],
            patch_mac: [0; 32],
            closed: false,
        };
        keys.index.copy_from_slice(&expanded[..32]);
        keys.value_encryption.copy_from_slice(&expanded[32..64]);
        keys.value_mac.copy_from_slice(&expanded[64..96]);
        keys.snapshot_mac.copy_from_slice(&expanded[96..128]);
        keys.patch_mac.copy_from_slice(&expanded[128..]);
        expanded.zeroize();
        Ok(keys)
    }

    fn get<'a>(&'a self, key: &'a [u8; 32]) -> Result<&'a [u8; 32], SyncError> {
        if self.closed {
            return Err(SyncError::KeysClosed);
        }
        Ok(key)
    }

    pub fn index_key(&self) -> Result<&[u8; 32], SyncError> {
        self.get(&self.index)
    }

    pub fn value_encryption_key(&self) -> Result<&[u8; 32], SyncError> {
        self.get(&self.value_encryption)
    }

    pub fn value_mac_key(&self) -> Result<&[u8; 32], SyncError> {
        self.get(&self.value_mac)
    }

    pub fn snapshot_mac_key(&self) -> Result<&[u8; 32], SyncError> {
        self.get(&self.snapshot_mac)
    }

    pub fn patch_mac_key(&self) -> Result<&[u8; 32], SyncError> {
        self.get(&self.patch_mac)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Wipe the keys. Safe to call more than once.
    pub fn close(&mut self) {
        self.zeroize();
        self.closed = true;
    }
}

impl std::fmt::Debug for MutationKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationKeys")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_vector() {
        let keys = MutationKeys::derive(&[7u8; 32]).unwrap();
        assert_eq!(
            hex::encode(keys.index_key().unwrap()),
            "a3c20564c4744dc336223b76a374ac369fb1bc2062969b26bd0104cba5149e7a"
        );
        assert_eq!(
            hex::encode(keys.value_encryption_key().unwrap()),
            "28f9ac3865f5c0d77441c361c8eb0c40435487e1fca973df3828cbe320faa07f"
        );
        assert_eq!(
            hex::encode(keys.value_mac_key().unwrap()),
            "e2b9c9aaebb04ac52b5c04c449a8af48945e63af3e4b8e2b3f8266753675bc3e"
        );
        assert_eq!(
            hex::encode(keys.snapshot_mac_key().unwrap()),
            "c49519c1aa1718c8f1c1f14c546fb2dedfcc58cace2b5fba9de15f9c084bd04b"
        );
        assert_eq!(
            hex::encode(keys.patch_mac_key().unwrap()),
            "3b9efe15c717b5da8b85c45200bb6ce8af59c72d62f4c203909c53749b54cd04"
        );
    }

    #[test]
    fn test_sync_key_length() {
        assert!(matches!(MutationKeys::derive(&[7u8; 31]), Err(SyncError::InvalidArgument(_))));
        assert!(matches!(MutationKeys::derive(&[7u8; 33]), Err(SyncError::InvalidArgument(_))));
    }

    #[test]
    fn test_close_wipes_and_blocks() {
        let mut keys = MutationKeys::derive(&[7u8; 32]).unwrap();
        keys.close();
        keys.close();
        assert!(keys.is_closed());
        assert!(matches!(keys.index_key(), Err(SyncError::KeysClosed)));
        assert_eq!(keys.patch_mac, [0u8; 32]);
    }
}
