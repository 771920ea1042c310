use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{MediaError, MEDIA_KEY_LENGTH};
use crate::crypto::Hkdf;

const EXPANDED_SIZE: usize = 112;

/// Key schedule of one attachment.
///
/// The 112 expanded bytes split into `iv | cipher_key | mac_key | ref_key`. Only the
/// first 80 take part in encryption; `ref_key` is exposed for callers that need it.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MediaKeys {
    iv: [u8; 16],
    cipher_key: [u8; 32],
    mac_key: [u8; 32],
    ref_key: [u8; 32],
}

impl MediaKeys {
    /// Expand `media_key` with the kind's info string.
    pub fn derive(media_key: &[u8], key_name: &str) -> Result<Self, MediaError> {
        if media_key.len() != MEDIA_KEY_LENGTH {
            return Err(MediaError::InvalidArgument(format!(
                "media key must be {} bytes, got {}",
                MEDIA_KEY_LENGTH,
                media_key.len()
            )));
        }
        let mut expanded: [u8; EXPANDED_SIZE] = Hkdf::derive_array(media_key, key_name.as_bytes());
        let mut keys = Self {
            iv: [0; 16],
            cipher_key: [0; 32],
            mac_key: [0; 32],
            ref_key: [0; 32],
        };
        keys.iv.copy_from_slice(&expanded[..16]);
        keys.cipher_key.copy_from_slice(&expanded[16..48]);
        keys.mac_key.copy_from_slice(&expanded[48..80]);
        keys.ref_key.copy_from_slice(&expanded[80..]);
        expanded.zeroize();
        Ok(keys)
    }

    pub fn iv(&self) -> &[u8; 16] {
        &self.iv
    }

    pub fn cipher_key(&self) -> &[u8; 32] {
        &self.cipher_key
    }

    pub fn mac_key(&self) -> &[u8; 32] {
        &self.mac_key
    }

    pub fn ref_key(&self) -> &[u8; 32] {
        &self.ref_key
    }
}

impl std::fmt::Debug for MediaKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaKeys").finish_non_exhaustive()
    }
}
