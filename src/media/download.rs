//! Download direction: verify, decrypt and optionally inflate a media body.
//!
//! The reader pulls at most one chunk at a time from the source. The ciphertext digest
//! and the MAC are fed incrementally, but every integrity check is decided only once the
//! last byte has been consumed, in a fixed order: ciphertext SHA-256, MAC, padding,
//! plaintext SHA-256.

use std::io::{self, Read};

use flate2::{Decompress, FlushDecompress, Status};
use hmac::Mac;
use log::{debug, trace, warn};
use sha2::{Digest, Sha256};

use super::{MediaError, MediaKeys, MediaProvider, DEFAULT_BUFFER_SIZE, MAC_LENGTH};
use crate::crypto::aes_cbc::BLOCK_SIZE;
use crate::crypto::{CbcDecryptor, CipherError, HmacSha256};

/// Pipeline stage. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    ReadData,
    ReadMac,
    ValidateAll,
    Done,
}

/// What the stage transition looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Body bytes not yet pulled from the source.
    pub remaining: u64,
    pub encrypted: bool,
    /// All trailing MAC bytes have been read.
    pub mac_complete: bool,
    /// The inflater can still produce output.
    pub inflate_pending: bool,
}

impl Stage {
    /// Stage to move to after the work of `self` has run.
    pub fn next(self, progress: &Progress) -> Stage {
        match self {
            Stage::ReadData if progress.remaining > 0 => Stage::ReadData,
            Stage::ReadData if progress.encrypted => Stage::ReadMac,
            Stage::ReadData | Stage::ReadMac => {
                let trailer_done = progress.mac_complete || !progress.encrypted;
                if trailer_done && !progress.inflate_pending {
                    Stage::ValidateAll
                } else {
                    self
                }
            }
            Stage::ValidateAll | Stage::Done => Stage::Done,
        }
    }
}

struct Decryption {
    cipher: Option<CbcDecryptor>,
    mac: HmacSha256,
    ciphertext_digest: Option<Sha256>,
    trailer: [u8; MAC_LENGTH],
    trailer_len: usize,
}

/// zlib inflater fed with whole plaintext chunks and drained into bounded windows.
struct Inflater {
    stream: Decompress,
    input: Vec<u8>,
    consumed: usize,
    output_full: bool,
    finished: bool,
    failed: Option<String>,
}

impl Inflater {
    fn new() -> Self {
        Self {
            stream: Decompress::new(true),
            input: Vec::new(),
            consumed: 0,
            output_full: false,
            finished: false,
            failed: None,
        }
    }

    fn push(&mut self, data: &[u8]) {
        if self.finished || self.failed.is_some() {
            return;
        }
        self.input.drain(..self.consumed);
        self.consumed = 0;
        self.input.extend_from_slice(data);
    }

    fn is_pending(&self) -> bool {
        !self.finished
            && self.failed.is_none()
            && (self.consumed < self.input.len() || self.output_full)
    }

    /// Replace `window` with the next inflated bytes. Failures are kept until validation.
    fn inflate(&mut self, window: &mut Vec<u8>, capacity: usize) {
        window.clear();
        window.reserve(capacity);
        let before = self.stream.total_in();
        let status = self.stream.decompress_vec(
            &self.input[self.consumed..],
            window,
            FlushDecompress::None,
        );
        let used = (self.stream.total_in() - before) as usize;
        self.consumed += used;
        self.output_full = window.len() == window.capacity();

        match status {
            Ok(Status::StreamEnd) => {
                self.finished = true;
                self.output_full = false;
            }
            Ok(_) if used == 0 && window.is_empty() => {
                self.output_full = false;
                if self.consumed < self.input.len() {
                    self.failed = Some("inflater made no progress".to_string());
                }
            }
            Ok(_) => {}
            Err(err) => {
                warn!("media inflate failed: {}", err);
                self.failed = Some(err.to_string());
                window.clear();
            }
        }
        trace!("inflated {} bytes from {} input bytes", window.len(), used);
    }
}

/// Pull-based reader over an encrypted or plain media body.
pub struct MediaDownloadReader<R> {
    source: Option<R>,
    stage: Stage,
    remaining: u64,
    buffer_size: usize,
    decryption: Option<Decryption>,
    plaintext_digest: Option<Sha256>,
    expected_sha256: Option<Vec<u8>>,
    expected_enc_sha256: Option<Vec<u8>>,
    inflater: Option<Inflater>,
    chunk: Vec<u8>,
    window: Vec<u8>,
    window_pos: usize,
    data_finished: bool,
    padding_error: Option<CipherError>,
    failed: bool,
}

impl<R: Read> MediaDownloadReader<R> {
    /// `payload_length` is the full body length, including the trailing MAC when encrypted.
    pub fn new<P: MediaProvider + ?Sized>(
        source: R,
        payload_length: u64,
        provider: &P,
    ) -> Result<Self, MediaError> {
        Self::with_buffer_size(source, payload_length, provider, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size<P: MediaProvider + ?Sized>(
        source: R,
        payload_length: u64,
        provider: &P,
        buffer_size: usize,
    ) -> Result<Self, MediaError> {
        if buffer_size == 0 {
            return Err(MediaError::InvalidArgument("buffer size must be positive".to_string()));
        }

        let decryption = match (provider.media_key(), provider.media_key_name()) {
            (Some(media_key), Some(key_name)) => {
                let keys = MediaKeys::derive(media_key, key_name)?;
                let mut mac =
                    HmacSha256::new_from_slice(keys.mac_key()).expect("HMAC can take key of any size");
                mac.update(keys.iv());
                Some(Decryption {
                    cipher: Some(CbcDecryptor::new(keys.cipher_key(), keys.iv())?),
                    mac,
                    ciphertext_digest: provider.media_enc_sha256().map(|_| Sha256::new()),
                    trailer: [0; MAC_LENGTH],
                    trailer_len: 0,
                })
            }
            (None, None) => None,
            _ => return Err(MediaError::KeyMismatch),
        };

        let remaining = match decryption {
            Some(_) => payload_length.checked_sub(MAC_LENGTH as u64).ok_or_else(|| {
                MediaError::InvalidArgument(format!(
                    "encrypted payload of {} bytes is shorter than its MAC",
                    payload_length
                ))
            })?,
            None => payload_length,
        };

        debug!(
            "media download: {} body bytes, encrypted={}, inflate={}",
            remaining,
            decryption.is_some(),
            provider.is_inflatable()
        );

        Ok(Self {
            source: Some(source),
            stage: Stage::ReadData,
            remaining,
            buffer_size,
            decryption,
            plaintext_digest: provider.media_sha256().map(|_| Sha256::new()),
            expected_sha256: provider.media_sha256().map(<[u8]>::to_vec),
            expected_enc_sha256: provider.media_enc_sha256().map(<[u8]>::to_vec),
            inflater: provider.is_inflatable().then(Inflater::new),
            chunk: vec![0; buffer_size],
            window: Vec::with_capacity(buffer_size + BLOCK_SIZE),
            window_pos: 0,
            data_finished: false,
            padding_error: None,
            failed: false,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    /// Read decrypted bytes into `buf`. Returns 0 once the stream is verified and drained.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, MediaError> {
        if self.source.is_none() {
            return Err(MediaError::Closed);
        }
        if self.failed {
            return Err(MediaError::Poisoned);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        if let Err(err) = self.pump() {
            self.failed = true;
            return Err(err);
        }

        let available = &self.window[self.window_pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.window_pos += n;
        Ok(n)
    }

    /// Read a single byte, `None` at the end of a verified stream.
    pub fn read_byte(&mut self) -> Result<Option<u8>, MediaError> {
        let mut byte = [0u8; 1];
        match self.read_into(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Release the source and the inflater. Safe to call more than once.
    pub fn close(&mut self) {
        if self.source.take().is_some() {
            debug!("media download closed at {:?}", self.stage);
        }
        self.inflater = None;
        self.decryption = None;
        self.window.clear();
        self.window_pos = 0;
    }

    fn progress(&self) -> Progress {
        Progress {
            remaining: self.remaining,
            encrypted: self.decryption.is_some(),
            mac_complete: self
                .decryption
                .as_ref()
                .map_or(true, |d| d.trailer_len == MAC_LENGTH),
            inflate_pending: self.inflater.as_ref().map_or(false, Inflater::is_pending),
        }
    }

    fn pump(&mut self) -> Result<(), MediaError> {
        loop {
            if self.window_pos < self.window.len() || self.stage == Stage::Done {
                return Ok(());
            }
            if let Some(inflater) = self.inflater.as_mut() {
                if inflater.is_pending() {
                    inflater.inflate(&mut self.window, self.buffer_size);
                    self.window_pos = 0;
                    continue;
                }
            }

            match self.stage {
                Stage::ReadData if self.remaining > 0 => self.read_data()?,
                Stage::ReadData => self.finish_data(),
                Stage::ReadMac => self.read_mac()?,
                Stage::ValidateAll => self.validate()?,
                Stage::Done => {}
            }

            let next = self.stage.next(&self.progress());
            if next != self.stage {
                debug!("media download: {:?} -> {:?}", self.stage, next);
                self.stage = next;
            }
        }
    }

    fn read_data(&mut self) -> Result<(), MediaError> {
        let want = (self.buffer_size as u64).min(self.remaining) as usize;
        let source = self.source.as_mut().ok_or(MediaError::Closed)?;
        read_full(source, &mut self.chunk[..want], self.remaining)?;
        self.remaining -= want as u64;
        trace!("read {} media bytes, {} left", want, self.remaining);

        let plaintext = match self.decryption.as_mut() {
            Some(decryption) => {
                let chunk = &self.chunk[..want];
                if let Some(digest) = decryption.ciphertext_digest.as_mut() {
                    digest.update(chunk);
                }
                decryption.mac.update(chunk);
                let mut plaintext = Vec::with_capacity(want + BLOCK_SIZE);
                if let Some(cipher) = decryption.cipher.as_mut() {
                    cipher.update(chunk, &mut plaintext);
                }
                plaintext
            }
            None => self.chunk[..want].to_vec(),
        };
        self.emit(&plaintext);

        if self.remaining == 0 {
            self.finish_data();
        }
        Ok(())
    }

    /// Flush the final cipher block. A padding failure waits until the MAC has been checked.
    fn finish_data(&mut self) {
        if self.data_finished {
            return;
        }
        self.data_finished = true;

        let mut tail = Vec::with_capacity(BLOCK_SIZE);
        if let Some(cipher) = self.decryption.as_mut().and_then(|d| d.cipher.take()) {
            if let Err(err) = cipher.finish(&mut tail) {
                debug!("media padding check failed, deferred until validation");
                self.padding_error = Some(err);
            }
        }
        self.emit(&tail);
    }

    fn emit(&mut self, plaintext: &[u8]) {
        if plaintext.is_empty() {
            return;
        }
        if let Some(digest) = self.plaintext_digest.as_mut() {
            digest.update(plaintext);
        }
        match self.inflater.as_mut() {
            Some(inflater) => inflater.push(plaintext),
            None => {
                self.window.drain(..self.window_pos);
                self.window_pos = 0;
                self.window.extend_from_slice(plaintext);
            }
        }
    }

    fn read_mac(&mut self) -> Result<(), MediaError> {
        let source = self.source.as_mut().ok_or(MediaError::Closed)?;
        let Some(decryption) = self.decryption.as_mut() else {
            return Ok(());
        };
        let start = decryption.trailer_len;
        if start == MAC_LENGTH {
            return Ok(());
        }
        read_full(source, &mut decryption.trailer[start..], (MAC_LENGTH - start) as u64)?;
        decryption.trailer_len = MAC_LENGTH;
        if let Some(digest) = decryption.ciphertext_digest.as_mut() {
            digest.update(decryption.trailer);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<(), MediaError> {
        if let Some(decryption) = self.decryption.take() {
            let Decryption {
                mac,
                ciphertext_digest,
                trailer,
                ..
            } = decryption;

            if let (Some(digest), Some(expected)) = (ciphertext_digest, self.expected_enc_sha256.as_deref()) {
                if digest.finalize().as_slice() != expected {
                    warn!("media ciphertext digest mismatch");
                    return Err(MediaError::CiphertextHashMismatch);
                }
            }
            if mac.verify_truncated_left(&trailer).is_err() {
                warn!("media MAC mismatch");
                return Err(MediaError::MacMismatch);
            }
        }

        if let Some(err) = self.padding_error.take() {
            warn!("media padding is invalid");
            return Err(err.into());
        }

        if let (Some(digest), Some(expected)) = (self.plaintext_digest.take(), self.expected_sha256.as_deref()) {
            if digest.finalize().as_slice() != expected {
                warn!("media plaintext digest mismatch");
                return Err(MediaError::PlaintextHashMismatch);
            }
        }

        if let Some(inflater) = self.inflater.take() {
            if let Some(reason) = inflater.failed {
                return Err(MediaError::Decompression(reason));
            }
            if !inflater.finished {
                return Err(MediaError::Decompression(
                    "compressed stream ended before completion".to_string(),
                ));
            }
        }

        debug!("media download verified");
        Ok(())
    }
}

impl<R: Read> Read for MediaDownloadReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_into(buf).map_err(io::Error::from)
    }
}

fn read_full<R: Read>(source: &mut R, buf: &mut [u8], outstanding: u64) -> Result<(), MediaError> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => return Err(MediaError::UnexpectedEndOfStream(outstanding - filled as u64)),
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Decrypt and verify a whole body held in memory.
pub fn decrypt_media<P: MediaProvider + ?Sized>(body: &[u8], provider: &P) -> Result<Vec<u8>, MediaError> {
    let mut reader = MediaDownloadReader::new(body, body.len() as u64, provider)?;
    let mut output = Vec::with_capacity(body.len());
    let mut buf = [0u8; DEFAULT_BUFFER_SIZE];
    loop {
        match reader.read_into(&mut buf)? {
            0 => break,
            n => output.extend_from_slice(&buf[..n]),
        }
    }
    reader.close();
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaDescriptor, MediaKind, MediaUploadReader};

    const BLOB: &str = "4e18c11166f94b32c4943afeb6ac65b1af939e95083ff07ebed44111768cf8f33a91d997f7070db809e3";
    const FILE_SHA256: &str = "4cf5b5fbab753e2017bb153ddf794feeb776f60939f6a38ae2c129bfb32f2b77";
    const FILE_ENC_SHA256: &str = "32a812875f01e49ef1b500f7bd49f3fc1945d1b50a82cfd495349809746dd910";

    fn fixed_descriptor() -> MediaDescriptor {
        MediaDescriptor::new(MediaKind::Image)
            .with_media_key((0u8..32).collect::<Vec<u8>>())
            .with_file_sha256(hex::decode(FILE_SHA256).unwrap())
            .with_file_enc_sha256(hex::decode(FILE_ENC_SHA256).unwrap())
    }

    fn sealed(plaintext: &[u8], kind: MediaKind) -> (Vec<u8>, MediaDescriptor) {
        let mut reader = MediaUploadReader::with_media_key(plaintext, kind, [5u8; 32]).unwrap();
        let mut body = Vec::new();
        reader.read_to_end(&mut body).unwrap();
        let mut descriptor = MediaDescriptor::new(kind);
        reader.finish().unwrap().apply_to(&mut descriptor);
        (body, descriptor)
    }

    #[test]
    fn test_fixed_vector() {
        let body = hex::decode(BLOB).unwrap();
        let plaintext = decrypt_media(&body, &fixed_descriptor()).unwrap();
        assert_eq!(plaintext, b"hello media pipeline");
    }

    #[test]
    fn test_small_buffers_and_single_bytes() {
        let body = hex::decode(BLOB).unwrap();
        let descriptor = fixed_descriptor();
        let mut reader =
            MediaDownloadReader::with_buffer_size(&body[..], body.len() as u64, &descriptor, 7).unwrap();
        let mut plaintext = Vec::new();
        while let Some(byte) = reader.read_byte().unwrap() {
            plaintext.push(byte);
        }
        assert_eq!(plaintext, b"hello media pipeline");
        assert!(reader.is_done());
        assert_eq!(reader.read_byte().unwrap(), None);
        assert_eq!(reader.read_into(&mut [0u8; 8]).unwrap(), 0);
    }

    #[test]
    fn test_ciphertext_tamper_reports_mac() {
        let mut body = hex::decode(BLOB).unwrap();
        body[3] ^= 0x01;
        let descriptor = MediaDescriptor::new(MediaKind::Image).with_media_key((0u8..32).collect::<Vec<u8>>());
        assert!(matches!(decrypt_media(&body, &descriptor), Err(MediaError::MacMismatch)));
    }

    #[test]
    fn test_ciphertext_digest_checked_first() {
        let mut body = hex::decode(BLOB).unwrap();
        body[3] ^= 0x01;
        let err = decrypt_media(&body, &fixed_descriptor()).unwrap_err();
        assert!(matches!(err, MediaError::CiphertextHashMismatch));
        assert_eq!(err.to_string(), "Ciphertext SHA256 hash doesn't match the expected value");
    }

    #[test]
    fn test_mac_tamper() {
        let mut body = hex::decode(BLOB).unwrap();
        let last = body.len() - 1;
        body[last] ^= 0x80;
        let descriptor = MediaDescriptor::new(MediaKind::Image).with_media_key((0u8..32).collect::<Vec<u8>>());
        assert!(matches!(decrypt_media(&body, &descriptor), Err(MediaError::MacMismatch)));
    }

    #[test]
    fn test_plaintext_digest_fails_only_at_the_end() {
        let plaintext: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let (body, mut descriptor) = sealed(&plaintext, MediaKind::Document);
        descriptor.file_sha256 = Some(vec![0u8; 32]);

        let mut reader = MediaDownloadReader::new(&body[..], body.len() as u64, &descriptor).unwrap();
        let mut buf = [0u8; 4096];
        let mut delivered = 0;
        let err = loop {
            match reader.read_into(&mut buf) {
                Ok(0) => panic!("stream ended without validation failure"),
                Ok(n) => delivered += n,
                Err(err) => break err,
            }
        };
        assert!(delivered > 0);
        assert!(matches!(err, MediaError::PlaintextHashMismatch));
        assert!(matches!(reader.read_into(&mut buf), Err(MediaError::Poisoned)));
    }

    #[test]
    fn test_short_source() {
        let body = hex::decode(BLOB).unwrap();
        let descriptor = fixed_descriptor();
        let mut reader =
            MediaDownloadReader::new(&body[..], body.len() as u64 + 16, &descriptor).unwrap();
        let mut out = Vec::new();
        let err = loop {
            let mut buf = [0u8; 64];
            match reader.read_into(&mut buf) {
                Ok(0) => panic!("short source must fail"),
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(err) => break err,
            }
        };
        assert!(matches!(err, MediaError::UnexpectedEndOfStream(_)));
    }

    fn decrypt_with_length(body: &[u8], declared: u64, descriptor: &MediaDescriptor) -> Result<Vec<u8>, MediaError> {
        let mut reader = MediaDownloadReader::new(body, declared, descriptor)?;
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            match reader.read_into(&mut buf)? {
                0 => return Ok(out),
                n => out.extend_from_slice(&buf[..n]),
            }
        }
    }

    #[test]
    fn test_declared_length_too_short() {
        let body = hex::decode(BLOB).unwrap();
        let descriptor = fixed_descriptor();
        for cut in [1u64, 17] {
            let declared = body.len() as u64 - cut;
            assert!(
                matches!(
                    decrypt_with_length(&body, declared, &descriptor),
                    Err(MediaError::CiphertextHashMismatch)
                ),
                "declared length shortened by {cut}"
            );
        }
    }

    #[test]
    fn test_declared_length_too_long() {
        let body = hex::decode(BLOB).unwrap();
        assert!(matches!(
            decrypt_with_length(&body, body.len() as u64 + 1, &fixed_descriptor()),
            Err(MediaError::UnexpectedEndOfStream(_))
        ));
    }

    #[test]
    fn test_key_and_key_name_go_together() {
        let keyless_image = MediaDescriptor::new(MediaKind::Image);
        let err = MediaDownloadReader::new(&[][..], 0, &keyless_image).err().unwrap();
        assert!(matches!(err, MediaError::KeyMismatch));
        assert_eq!(err.to_string(), "Media key and key name must both be present or both be absent");

        let keyed_newsletter = MediaDescriptor::new(MediaKind::Newsletter).with_media_key(vec![1u8; 32]);
        assert!(matches!(
            MediaDownloadReader::new(&[][..], 0, &keyed_newsletter),
            Err(MediaError::KeyMismatch)
        ));
    }

    #[test]
    fn test_encrypted_payload_shorter_than_mac() {
        let body = [0u8; 9];
        assert!(matches!(
            decrypt_media(&body, &fixed_descriptor()),
            Err(MediaError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_plain_mode() {
        let body = b"channel media bytes".to_vec();
        let digest = Sha256::digest(&body).to_vec();
        let descriptor = MediaDescriptor::new(MediaKind::Newsletter).with_file_sha256(digest);
        assert_eq!(decrypt_media(&body, &descriptor).unwrap(), body);

        let wrong = MediaDescriptor::new(MediaKind::Newsletter).with_file_sha256(vec![0u8; 32]);
        assert!(matches!(
            decrypt_media(&body, &wrong),
            Err(MediaError::PlaintextHashMismatch)
        ));
    }

    #[test]
    fn test_inflated_history_blob() {
        let history: Vec<u8> = b"{\"conversations\":[]}".repeat(2_000);
        let (body, descriptor) = sealed(&history, MediaKind::History);
        assert!(body.len() < history.len() / 4);

        let mut reader =
            MediaDownloadReader::with_buffer_size(&body[..], body.len() as u64, &descriptor, 512).unwrap();
        let mut inflated = Vec::new();
        reader.read_to_end(&mut inflated).unwrap();
        assert_eq!(inflated, history);
    }

    struct PlainZlib;

    impl MediaProvider for PlainZlib {
        fn media_kind(&self) -> MediaKind {
            MediaKind::Newsletter
        }
        fn media_url(&self) -> Option<&str> {
            None
        }
        fn media_direct_path(&self) -> Option<&str> {
            None
        }
        fn media_key(&self) -> Option<&[u8]> {
            None
        }
        fn media_key_timestamp(&self) -> Option<i64> {
            None
        }
        fn media_sha256(&self) -> Option<&[u8]> {
            None
        }
        fn media_enc_sha256(&self) -> Option<&[u8]> {
            None
        }
        fn media_size(&self) -> Option<u64> {
            None
        }
        fn is_inflatable(&self) -> bool {
            true
        }
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut stream = Vec::new();
        flate2::read::ZlibEncoder::new(data, flate2::Compression::default())
            .read_to_end(&mut stream)
            .unwrap();
        stream
    }

    #[test]
    fn test_plain_inflate() {
        let data = b"abcdefgh".repeat(100);
        assert_eq!(decrypt_media(&zlib(&data), &PlainZlib).unwrap(), data);
    }

    #[test]
    fn test_truncated_zlib_fails_at_validation() {
        let data = b"abcdefgh".repeat(100);
        let mut stream = zlib(&data);
        stream.truncate(stream.len() - 6);
        assert!(matches!(
            decrypt_media(&stream, &PlainZlib),
            Err(MediaError::Decompression(_))
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let body = hex::decode(BLOB).unwrap();
        let descriptor = fixed_descriptor();
        let mut reader = MediaDownloadReader::new(&body[..], body.len() as u64, &descriptor).unwrap();
        assert!(reader.read_byte().unwrap().is_some());
        reader.close();
        reader.close();
        assert!(matches!(reader.read_byte(), Err(MediaError::Closed)));
    }

    #[test]
    fn test_stage_transitions() {
        let base = Progress {
            remaining: 10,
            encrypted: true,
            mac_complete: false,
            inflate_pending: false,
        };
        assert_eq!(Stage::ReadData.next(&base), Stage::ReadData);

        let drained = Progress { remaining: 0, ..base };
        assert_eq!(Stage::ReadData.next(&drained), Stage::ReadMac);
        assert_eq!(Stage::ReadMac.next(&drained), Stage::ReadMac);

        let mac_read = Progress { mac_complete: true, ..drained };
        assert_eq!(Stage::ReadMac.next(&mac_read), Stage::ValidateAll);
        let inflating = Progress { inflate_pending: true, ..mac_read };
        assert_eq!(Stage::ReadMac.next(&inflating), Stage::ReadMac);

        let plain = Progress { encrypted: false, ..drained };
        assert_eq!(Stage::ReadData.next(&plain), Stage::ValidateAll);
        assert_eq!(Stage::ValidateAll.next(&plain), Stage::Done);
        assert_eq!(Stage::Done.next(&base), Stage::Done);

        for stage in [Stage::ReadData, Stage::ReadMac, Stage::ValidateAll, Stage::Done] {
            for progress in [base, drained, mac_read, inflating, plain] {
                assert!(stage.next(&progress) >= stage);
            }
        }
    }
}
