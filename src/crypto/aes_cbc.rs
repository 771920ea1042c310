//! AES-256-CBC with PKCS#7 padding, one-shot and streaming.
//!
//! The streaming halves work on arbitrary chunk sizes. The decryptor holds back the
//! last full block until [`CbcDecryptor::finish`] so padding can be stripped.

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use thiserror::Error;
use zeroize::Zeroize;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub const BLOCK_SIZE: usize = 16;
pub const KEY_SIZE: usize = 32;

/// Errors raised by the CBC helpers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    #[error("invalid key or IV length")]
    InvalidLength,
    #[error("invalid PKCS#7 padding")]
    BadPadding,
    #[error("ciphertext of {0} bytes is not a positive multiple of the block size")]
    TruncatedBlock(usize),
}

/// Encrypt `plaintext` in one call.
pub fn encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    let cipher = Aes256CbcEnc::new_from_slices(key, iv).map_err(|_| CipherError::InvalidLength)?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Decrypt `ciphertext` in one call.
pub fn decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CipherError::TruncatedBlock(ciphertext.len()));
    }
    let cipher = Aes256CbcDec::new_from_slices(key, iv).map_err(|_| CipherError::InvalidLength)?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CipherError::BadPadding)
}

/// Streaming CBC encryptor.
pub struct CbcEncryptor {
    cipher: Aes256CbcEnc,
    carry: Vec<u8>,
}

impl CbcEncryptor {
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self, CipherError> {
        Ok(Self {
            cipher: Aes256CbcEnc::new_from_slices(key, iv).map_err(|_| CipherError::InvalidLength)?,
            carry: Vec::with_capacity(BLOCK_SIZE),
        })
    }

    /// Encrypt every complete block of `carry + input`, appending to `output`.
    pub fn update(&mut self, input: &[u8], output: &mut Vec<u8>) {
        self.carry.extend_from_slice(input);
        let full = self.carry.len() - self.carry.len() % BLOCK_SIZE;
        for block in self.carry[..full].chunks_exact_mut(BLOCK_SIZE) {
            self.cipher.encrypt_block_mut(GenericArray::from_mut_slice(block));
            output.extend_from_slice(block);
        }
        self.carry.drain(..full);
    }

    /// Pad and encrypt the remaining bytes.
    pub fn finish(mut self, output: &mut Vec<u8>) {
        let pad = BLOCK_SIZE - self.carry.len();
        self.carry.resize(BLOCK_SIZE, pad as u8);
        self.cipher
            .encrypt_block_mut(GenericArray::from_mut_slice(&mut self.carry));
        output.extend_from_slice(&self.carry);
        self.carry.zeroize();
    }
}

/// Streaming CBC decryptor.
pub struct CbcDecryptor {
    cipher: Aes256CbcDec,
    carry: Vec<u8>,
    held: Option<[u8; BLOCK_SIZE]>,
    total: usize,
}

impl CbcDecryptor {
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self, CipherError> {
        Ok(Self {
            cipher: Aes256CbcDec::new_from_slices(key, iv).map_err(|_| CipherError::InvalidLength)?,
            carry: Vec::with_capacity(BLOCK_SIZE),
            held: None,
            total: 0,
        })
    }

    /// Decrypt every complete block, appending all but the most recent one to `output`.
    pub fn update(&mut self, input: &[u8], output: &mut Vec<u8>) {
        self.total += input.len();
        self.carry.extend_from_slice(input);
        let full = self.carry.len() - self.carry.len() % BLOCK_SIZE;
        for chunk in self.carry[..full].chunks_exact(BLOCK_SIZE) {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(chunk);
            self.cipher
                .decrypt_block_mut(GenericArray::from_mut_slice(&mut block));
            if let Some(previous) = self.held.replace(block) {
                output.extend_from_slice(&previous);
            }
        }
        self.carry.drain(..full);
    }

    /// Strip the padding from the held block and append what is left.
    pub fn finish(mut self, output: &mut Vec<u8>) -> Result<(), CipherError> {
        if !self.carry.is_empty() {
            return Err(CipherError::TruncatedBlock(self.total));
        }
        let mut last = self.held.take().ok_or(CipherError::TruncatedBlock(self.total))?;
        let pad = last[BLOCK_SIZE - 1] as usize;
        let valid = (1..=BLOCK_SIZE).contains(&pad)
            && last[BLOCK_SIZE - pad..].iter().all(|&b| b as usize == pad);
        if valid {
            output.extend_from_slice(&last[..BLOCK_SIZE - pad]);
        }
        last.zeroize();
        if valid {
            Ok(())
        } else {
            Err(CipherError::BadPadding)
        }
    }
}

impl Drop for CbcDecryptor {
    fn drop(&mut self) {
        self.carry.zeroize();
        if let Some(block) = self.held.as_mut() {
            block.zeroize();
        }
    }
}
