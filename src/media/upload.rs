//! Upload direction: optionally deflate, then encrypt and MAC a media stream.

use std::io::{self, Read};

use chrono::Utc;
use flate2::read::ZlibEncoder;
use flate2::Compression;
use hmac::Mac;
use log::debug;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::descriptor::{base64_bytes, base64_opt};
use super::{
    MediaError, MediaKeys, MediaKind, MediaProviderMut, DEFAULT_BUFFER_SIZE, MAC_LENGTH,
    MEDIA_KEY_LENGTH,
};
use crate::crypto::aes_cbc::BLOCK_SIZE;
use crate::crypto::{CbcEncryptor, HmacSha256};

/// Artifacts of a finished upload, copied into the message's media fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaUpload {
    pub kind: MediaKind,
    /// SHA-256 of the bytes that were encrypted.
    #[serde(with = "base64_bytes")]
    pub file_sha256: Vec<u8>,
    /// SHA-256 of `ciphertext || mac`. Absent for unencrypted kinds.
    #[serde(default, with = "base64_opt", skip_serializing_if = "Option::is_none")]
    pub file_enc_sha256: Option<Vec<u8>>,
    #[serde(default, with = "base64_opt", skip_serializing_if = "Option::is_none")]
    pub media_key: Option<Vec<u8>>,
    /// Length of the bytes that were encrypted. For deflated kinds this is the
    /// compressed length, matching `file_sha256`.
    pub file_length: u64,
    pub key_timestamp: i64,
}

impl MediaUpload {
    /// Copy the artifacts into a descriptor. URL and direct path come from the upload server.
    pub fn apply_to<P: MediaProviderMut + ?Sized>(&self, provider: &mut P) {
        provider.set_media_key(self.media_key.clone());
        provider.set_media_key_timestamp(self.media_key.as_ref().map(|_| self.key_timestamp));
        provider.set_media_sha256(Some(self.file_sha256.clone()));
        provider.set_media_enc_sha256(self.file_enc_sha256.clone());
        provider.set_media_size(Some(self.file_length));
    }
}

enum Source<R> {
    Plain(R),
    Deflate(ZlibEncoder<R>),
}

impl<R: Read> Read for Source<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::Plain(reader) => reader.read(buf),
            Source::Deflate(encoder) => encoder.read(buf),
        }
    }
}

struct Encryption {
    cipher: Option<CbcEncryptor>,
    mac: HmacSha256,
    digest: Sha256,
}

/// Reader producing the upload body `ciphertext || mac` from a plaintext source.
pub struct MediaUploadReader<R> {
    kind: MediaKind,
    source: Source<R>,
    file_length: u64,
    media_key: Option<[u8; MEDIA_KEY_LENGTH]>,
    encryption: Option<Encryption>,
    file_digest: Sha256,
    enc_sha256: Option<Vec<u8>>,
    chunk: Vec<u8>,
    window: Vec<u8>,
    window_pos: usize,
    finished: bool,
}

impl<R: Read> MediaUploadReader<R> {
    /// Encrypt with a fresh random media key when `kind` is an encrypted kind.
    pub fn new(source: R, kind: MediaKind) -> Result<Self, MediaError> {
        Self::with_buffer_size(source, kind, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(source: R, kind: MediaKind, buffer_size: usize) -> Result<Self, MediaError> {
        let media_key = kind.key_name().map(|_| {
            let mut key = [0u8; MEDIA_KEY_LENGTH];
            rand::thread_rng().fill_bytes(&mut key);
            key
        });
        Self::build(source, kind, media_key, buffer_size)
    }

    pub fn with_media_key(source: R, kind: MediaKind, media_key: [u8; MEDIA_KEY_LENGTH]) -> Result<Self, MediaError> {
        Self::build(source, kind, Some(media_key), DEFAULT_BUFFER_SIZE)
    }

    pub fn build(
        source: R,
        kind: MediaKind,
        media_key: Option<[u8; MEDIA_KEY_LENGTH]>,
        buffer_size: usize,
    ) -> Result<Self, MediaError> {
        if buffer_size == 0 {
            return Err(MediaError::InvalidArgument("buffer size must be positive".to_string()));
        }

        let encryption = match (media_key.as_ref(), kind.key_name()) {
            (Some(media_key), Some(key_name)) => {
                let keys = MediaKeys::derive(media_key, key_name)?;
                let mut mac =
                    HmacSha256::new_from_slice(keys.mac_key()).expect("HMAC can take key of any size");
                mac.update(keys.iv());
                Some(Encryption {
                    cipher: Some(CbcEncryptor::new(keys.cipher_key(), keys.iv())?),
                    mac,
                    digest: Sha256::new(),
                })
            }
            (None, None) => None,
            _ => return Err(MediaError::KeyMismatch),
        };

        let source = if kind.is_inflatable() {
            Source::Deflate(ZlibEncoder::new(source, Compression::default()))
        } else {
            Source::Plain(source)
        };

        debug!("media upload: kind={}, encrypted={}", kind, encryption.is_some());
        Ok(Self {
            kind,
            source,
            file_length: 0,
            media_key,
            encryption,
            file_digest: Sha256::new(),
            enc_sha256: None,
            chunk: vec![0; buffer_size],
            window: Vec::with_capacity(buffer_size + BLOCK_SIZE + MAC_LENGTH),
            window_pos: 0,
            finished: false,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Read upload body bytes into `buf`. Returns 0 once the MAC has been emitted.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, MediaError> {
        while self.window_pos >= self.window.len() && !self.finished {
            self.fill()?;
        }
        let available = &self.window[self.window_pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.window_pos += n;
        Ok(n)
    }

    /// Collect the artifacts. The body must have been read to the end.
    pub fn finish(self) -> Result<MediaUpload, MediaError> {
        if !self.finished {
            return Err(MediaError::InvalidArgument(
                "upload body has not been read to the end".to_string(),
            ));
        }
        Ok(MediaUpload {
            kind: self.kind,
            file_sha256: self.file_digest.finalize().to_vec(),
            file_enc_sha256: self.enc_sha256,
            media_key: self.media_key.map(|key| key.to_vec()),
            file_length: self.file_length,
            key_timestamp: Utc::now().timestamp(),
        })
    }

    fn fill(&mut self) -> Result<(), MediaError> {
        let n = loop {
            match self.source.read(&mut self.chunk) {
                Ok(n) => break n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        };
        self.window.clear();
        self.window_pos = 0;

        if n == 0 {
            self.finish_body();
            return Ok(());
        }

        let data = &self.chunk[..n];
        self.file_length += n as u64;
        self.file_digest.update(data);
        match self.encryption.as_mut() {
            Some(encryption) => {
                if let Some(cipher) = encryption.cipher.as_mut() {
                    cipher.update(data, &mut self.window);
                }
                encryption.mac.update(&self.window);
                encryption.digest.update(&self.window);
            }
            None => self.window.extend_from_slice(data),
        }
        Ok(())
    }

    fn finish_body(&mut self) {
        self.finished = true;
        let Some(encryption) = self.encryption.take() else {
            debug!("media upload finished, {} bytes", self.file_length);
            return;
        };
        let Encryption {
            cipher,
            mut mac,
            mut digest,
        } = encryption;
        if let Some(cipher) = cipher {
            cipher.finish(&mut self.window);
        }
        mac.update(&self.window);
        let tag = mac.finalize().into_bytes();
        self.window.extend_from_slice(&tag[..MAC_LENGTH]);
        digest.update(&self.window);
        self.enc_sha256 = Some(digest.finalize().to_vec());
        debug!("media upload finished");
    }
}

impl<R: Read> Read for MediaUploadReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_into(buf).map_err(io::Error::from)
    }
}

/// Encrypt a whole file held in memory. Returns the upload body and its artifacts.
pub fn encrypt_media(plaintext: &[u8], kind: MediaKind) -> Result<(Vec<u8>, MediaUpload), MediaError> {
    let mut reader = MediaUploadReader::new(plaintext, kind)?;
    let mut body = Vec::with_capacity(plaintext.len() + BLOCK_SIZE + MAC_LENGTH);
    let mut buf = [0u8; DEFAULT_BUFFER_SIZE];
    loop {
        match reader.read_into(&mut buf)? {
            0 => break,
            n => body.extend_from_slice(&buf[..n]),
        }
    }
    Ok((body, reader.finish()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{decrypt_media, MediaDescriptor};

    #[test]
    fn test_fixed_vector() {
        let mut key = [0u8; 32];
        for (i, byte) in key.iter_mut().enumerate() {
            *byte = i as u8;
        }
        let mut reader =
            MediaUploadReader::with_media_key(&b"hello media pipeline"[..], MediaKind::Image, key).unwrap();
        let mut body = Vec::new();
        reader.read_to_end(&mut body).unwrap();
        assert_eq!(
            hex::encode(&body),
            "4e18c11166f94b32c4943afeb6ac65b1af939e95083ff07ebed44111768cf8f33a91d997f7070db809e3"
        );

        let upload = reader.finish().unwrap();
        assert_eq!(
            hex::encode(&upload.file_sha256),
            "4cf5b5fbab753e2017bb153ddf794feeb776f60939f6a38ae2c129bfb32f2b77"
        );
        assert_eq!(
            hex::encode(upload.file_enc_sha256.as_ref().unwrap()),
            "32a812875f01e49ef1b500f7bd49f3fc1945d1b50a82cfd495349809746dd910"
        );
        assert_eq!(upload.file_length, 20);
        assert_eq!(upload.media_key.as_deref(), Some(&key[..]));
    }

    #[test]
    fn test_small_chunks_match_one_shot() {
        let plaintext: Vec<u8> = (0..5_000u32).map(|i| (i * 31) as u8).collect();
        let key = [3u8; 32];

        let mut whole = MediaUploadReader::with_media_key(&plaintext[..], MediaKind::Video, key).unwrap();
        let mut expected = Vec::new();
        whole.read_to_end(&mut expected).unwrap();

        let mut chunked =
            MediaUploadReader::build(&plaintext[..], MediaKind::Video, Some(key), 13).unwrap();
        let mut body = Vec::new();
        let mut buf = [0u8; 5];
        loop {
            match chunked.read_into(&mut buf).unwrap() {
                0 => break,
                n => body.extend_from_slice(&buf[..n]),
            }
        }
        assert_eq!(body, expected);
        assert_eq!(body.len(), (plaintext.len() / 16 + 1) * 16 + MAC_LENGTH);
    }

    #[test]
    fn test_descriptor_roundtrip() {
        let plaintext = b"a voice note".repeat(300);
        let (body, upload) = encrypt_media(&plaintext, MediaKind::Audio).unwrap();
        assert_eq!(upload.media_key.as_ref().map(Vec::len), Some(32));
        assert!(upload.key_timestamp > 0);

        let mut descriptor = MediaDescriptor::new(MediaKind::Audio);
        upload.apply_to(&mut descriptor);
        assert_eq!(descriptor.file_length, Some(plaintext.len() as u64));
        assert_eq!(descriptor.media_key_timestamp, Some(upload.key_timestamp));
        assert_eq!(decrypt_media(&body, &descriptor).unwrap(), plaintext);
    }

    #[test]
    fn test_history_is_deflated_before_encryption() {
        let history = b"message history ".repeat(1_000);
        let (body, upload) = encrypt_media(&history, MediaKind::History).unwrap();
        assert!(body.len() < history.len() / 4);

        let media_key = upload.media_key.clone().unwrap();
        let keys = MediaKeys::derive(&media_key, MediaKind::History.key_name().unwrap()).unwrap();
        let deflated =
            crate::crypto::aes_cbc::decrypt(keys.cipher_key(), keys.iv(), &body[..body.len() - MAC_LENGTH]).unwrap();
        assert_eq!(upload.file_length, deflated.len() as u64);
        assert_eq!(upload.file_sha256, Sha256::digest(&deflated).to_vec());

        let mut inflated = Vec::new();
        flate2::read::ZlibDecoder::new(&deflated[..]).read_to_end(&mut inflated).unwrap();
        assert_eq!(inflated, history);
    }

    #[test]
    fn test_unencrypted_kind() {
        let (body, upload) = encrypt_media(b"public channel photo", MediaKind::Newsletter).unwrap();
        assert_eq!(body, b"public channel photo");
        assert_eq!(upload.media_key, None);
        assert_eq!(upload.file_enc_sha256, None);
        assert_eq!(upload.file_sha256, Sha256::digest(b"public channel photo").to_vec());

        assert!(matches!(
            MediaUploadReader::with_media_key(&b""[..], MediaKind::Newsletter, [0u8; 32]),
            Err(MediaError::KeyMismatch)
        ));
    }

    #[test]
    fn test_finish_requires_full_read() {
        let reader = MediaUploadReader::new(&b"unread"[..], MediaKind::Image).unwrap();
        assert!(matches!(reader.finish(), Err(MediaError::InvalidArgument(_))));
    }

    #[test]
    fn test_empty_source() {
        let (body, upload) = encrypt_media(b"", MediaKind::Document).unwrap();
        assert_eq!(body.len(), BLOCK_SIZE + MAC_LENGTH);
        assert_eq!(upload.file_length, 0);
    }
}
