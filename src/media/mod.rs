//! Streaming media cipher pipeline.
//!
//! Attachments travel as `AES-256-CBC(plaintext) || HMAC-SHA256(iv || ciphertext)[..10]`.
//! The IV, cipher key and MAC key are expanded from a per-attachment 32-byte media key.
//! [`MediaDownloadReader`] verifies and decrypts a body incrementally and
//! [`MediaUploadReader`] produces one along with the descriptor fields.

mod descriptor;
mod download;
pub mod http;
mod keys;
mod upload;

pub use descriptor::{MediaDescriptor, MediaProvider, MediaProviderMut};
pub use download::{decrypt_media, MediaDownloadReader, Progress, Stage};
pub use keys::MediaKeys;
pub use upload::{encrypt_media, MediaUpload, MediaUploadReader};

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::CipherError;

/// Length of the truncated HMAC appended to encrypted media.
pub const MAC_LENGTH: usize = 10;
/// Default chunk size for both pipelines.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;
/// Length of a media key.
pub const MEDIA_KEY_LENGTH: usize = 32;

/// Errors raised by the media pipelines.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Media key and key name must both be present or both be absent")]
    KeyMismatch,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Unexpected end of stream: expected {0} more bytes")]
    UnexpectedEndOfStream(u64),
    #[error("Ciphertext SHA256 hash doesn't match the expected value")]
    CiphertextHashMismatch,
    #[error("Media MAC doesn't match the expected value")]
    MacMismatch,
    #[error("Plaintext SHA256 hash doesn't match the expected value")]
    PlaintextHashMismatch,
    #[error("failed to decrypt media: {0}")]
    Cipher(#[from] CipherError),
    #[error("failed to inflate media: {0}")]
    Decompression(String),
    #[error("media stream is closed")]
    Closed,
    #[error("media stream already failed")]
    Poisoned,
    #[error("media request failed: {0}")]
    Http(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl MediaError {
    /// True for failures that mean the payload was corrupted or tampered with.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            MediaError::CiphertextHashMismatch
                | MediaError::MacMismatch
                | MediaError::PlaintextHashMismatch
                | MediaError::Cipher(_)
        )
    }
}

impl From<MediaError> for io::Error {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Io(err) => err,
            MediaError::UnexpectedEndOfStream(_) => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            err if err.is_integrity() => io::Error::new(io::ErrorKind::InvalidData, err),
            MediaError::InvalidArgument(_) | MediaError::KeyMismatch => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            err => io::Error::other(err),
        }
    }
}

/// Attachment kinds and their key schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    History,
    AppState,
    LinkThumbnail,
    /// Channel media, served unencrypted.
    Newsletter,
}

impl MediaKind {
    pub const ALL: [MediaKind; 9] = [
        MediaKind::Image,
        MediaKind::Video,
        MediaKind::Audio,
        MediaKind::Document,
        MediaKind::Sticker,
        MediaKind::History,
        MediaKind::AppState,
        MediaKind::LinkThumbnail,
        MediaKind::Newsletter,
    ];

    /// HKDF info string, or `None` for unencrypted kinds.
    pub fn key_name(&self) -> Option<&'static str> {
        match self {
            MediaKind::Image | MediaKind::Sticker => Some("WhatsApp Image Keys"),
            MediaKind::Video => Some("WhatsApp Video Keys"),
            MediaKind::Audio => Some("WhatsApp Audio Keys"),
            MediaKind::Document => Some("WhatsApp Document Keys"),
            MediaKind::History => Some("WhatsApp History Keys"),
            MediaKind::AppState => Some("WhatsApp App State Keys"),
            MediaKind::LinkThumbnail => Some("WhatsApp Link Thumbnail Keys"),
            MediaKind::Newsletter => None,
        }
    }

    /// Whether the plaintext is a zlib stream.
    pub fn is_inflatable(&self) -> bool {
        matches!(self, MediaKind::History)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
            MediaKind::Sticker => "sticker",
            MediaKind::History => "history",
            MediaKind::AppState => "app_state",
            MediaKind::LinkThumbnail => "link_thumbnail",
            MediaKind::Newsletter => "newsletter",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MediaKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| MediaError::InvalidArgument(format!("unknown media kind: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_parse_back() {
        for kind in MediaKind::ALL {
            assert_eq!(kind.as_str().parse::<MediaKind>().unwrap(), kind);
        }
        assert!("gif".parse::<MediaKind>().is_err());
    }

    #[test]
    fn test_sticker_shares_image_keys() {
        assert_eq!(MediaKind::Sticker.key_name(), MediaKind::Image.key_name());
        assert_eq!(MediaKind::Newsletter.key_name(), None);
        assert!(MediaKind::History.is_inflatable());
        assert!(!MediaKind::Image.is_inflatable());
    }

    #[test]
    fn test_io_error_kinds() {
        let err: io::Error = MediaError::UnexpectedEndOfStream(3).into();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        let err: io::Error = MediaError::MacMismatch.into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(
            MediaError::UnexpectedEndOfStream(4).to_string(),
            "Unexpected end of stream: expected 4 more bytes"
        );
    }
}
