//! Cryptographic primitives shared by the media pipeline and app-state sync.

pub mod aes_cbc;
mod hkdf;

pub use aes_cbc::{CbcDecryptor, CbcEncryptor, CipherError};
pub use hkdf::Hkdf;

use hmac::Hmac;
use sha2::Sha256;

/// HMAC-SHA256. MAC checks go through `Mac::verify_slice` and `Mac::verify_truncated_left`.
pub type HmacSha256 = Hmac<Sha256>;
