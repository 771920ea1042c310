//! Crate-level error.

use thiserror::Error;

use crate::appstate::SyncError;
use crate::binary::{BufferError, DecodeError, EncodeError};
use crate::config::ConfigError;
use crate::crypto::CipherError;
use crate::media::MediaError;
use crate::store::StoreError;
use crate::types::ParseJidError;

/// Any error raised by this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Jid(#[from] ParseJidError),
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// True when the input was corrupted or tampered with.
    pub fn is_integrity(&self) -> bool {
        match self {
            Error::Media(err) => err.is_integrity(),
            Error::Sync(err) => err.is_integrity(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_classification() {
        assert!(Error::from(MediaError::MacMismatch).is_integrity());
        assert!(Error::from(SyncError::PatchMacMismatch).is_integrity());
        assert!(!Error::from(MediaError::UnexpectedEndOfStream(1)).is_integrity());
        assert!(!Error::from(DecodeError::EmptyNode).is_integrity());
    }

    #[test]
    fn test_messages_pass_through() {
        let err = Error::from(MediaError::PlaintextHashMismatch);
        assert_eq!(err.to_string(), "Plaintext SHA256 hash doesn't match the expected value");
    }
}
