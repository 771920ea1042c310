//! HKDF-SHA256 (RFC 5869).
//!
//! Media keys and app-state mutation keys are both expanded from a 32-byte secret with
//! an empty salt and a fixed info string.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

type HmacSha256 = Hmac<Sha256>;

/// Largest output HKDF-SHA256 can produce.
pub const MAX_OUTPUT: usize = 255 * 32;

/// HKDF-SHA256 key derivation.
pub struct Hkdf {
    prk: [u8; 32],
}

impl Hkdf {
    /// Extract a pseudo-random key. A missing salt is 32 zero bytes.
    pub fn new(salt: Option<&[u8]>, ikm: &[u8]) -> Self {
        let salt = salt.unwrap_or(&[0u8; 32]);
        let mut mac = HmacSha256::new_from_slice(salt).expect("HMAC can take key of any size");
        mac.update(ikm);
        Self {
            prk: mac.finalize().into_bytes().into(),
        }
    }

    /// Expand to `length` bytes. Lengths above [`MAX_OUTPUT`] are truncated to it.
    pub fn expand(&self, info: &[u8], length: usize) -> Vec<u8> {
        let length = length.min(MAX_OUTPUT);
        let mut output = Vec::with_capacity(length);
        let mut block: Vec<u8> = Vec::new();
        let mut counter = 1u8;

        while output.len() < length {
            let mut mac = HmacSha256::new_from_slice(&self.prk).expect("HMAC can take key of any size");
            mac.update(&block);
            mac.update(info);
            mac.update(&[counter]);
            block.zeroize();
            block = mac.finalize().into_bytes().to_vec();

            let to_copy = (length - output.len()).min(block.len());
            output.extend_from_slice(&block[..to_copy]);
            counter = counter.wrapping_add(1);
        }
        block.zeroize();
        output
    }

    /// Extract and expand in one call.
    pub fn derive(salt: Option<&[u8]>, ikm: &[u8], info: &[u8], length: usize) -> Vec<u8> {
        Self::new(salt, ikm).expand(info, length)
    }

    /// Extract with the zero salt and expand into a fixed-size array.
    pub fn derive_array<const N: usize>(ikm: &[u8], info: &[u8]) -> [u8; N] {
        let mut expanded = Self::derive(None, ikm, info, N);
        let mut output = [0u8; N];
        output.copy_from_slice(&expanded);
        expanded.zeroize();
        output
    }
}

impl Drop for Hkdf {
    fn drop(&mut self) {
        self.prk.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc5869_case_1() {
        let ikm = [0x0b; 22];
        let salt: Vec<u8> = (0x00..=0x0c).collect();
        let info: Vec<u8> = (0xf0..=0xf9).collect();

        let output = Hkdf::derive(Some(&salt), &ikm, &info, 42);
        assert_eq!(
            hex::encode(output),
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865"
        );
    }

    #[test]
    fn test_zero_salt_matches_missing_salt() {
        let ikm = b"input key material";
        assert_eq!(
            Hkdf::derive(None, ikm, b"info", 80),
            Hkdf::derive(Some(&[0u8; 32]), ikm, b"info", 80)
        );
    }

    #[test]
    fn test_derive_array_is_prefix_stable() {
        let long: [u8; 160] = Hkdf::derive_array(&[7u8; 32], b"WhatsApp Mutation Keys");
        let short: [u8; 32] = Hkdf::derive_array(&[7u8; 32], b"WhatsApp Mutation Keys");
        assert_eq!(&long[..32], &short);
    }
}
