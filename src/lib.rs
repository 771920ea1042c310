//! wa-wire: wire formats of the WhatsApp Web protocol.
//!
//! ## Modules
//!
//! - `binary` - token-compacted binary node codec and stanza envelope
//! - `types` - JIDs and known servers
//! - `crypto` - HKDF, AES-CBC and HMAC helpers
//! - `media` - streaming media encryption and verified decryption
//! - `appstate` - app-state mutation sealing, LT-Hash and MAC verification
//! - `proto` - protobuf records carried inside mutations
//! - `store` - sync key and collection state storage
//! - `config` - configuration management

pub mod appstate;
pub mod binary;
pub mod config;
pub mod crypto;
pub mod error;
pub mod media;
pub mod proto;
pub mod store;
pub mod types;

pub use appstate::{
    CollectionName, CollectionState, DecryptedMutation, EncryptedMutation, IntegrityVerifier, LtHash, Mutation,
    MutationKeys, Operation, SyncError,
};
pub use binary::{decode, decode_stanza, encode, encode_stanza, unpack_stanza, AttrValue, Node, NodeContent};
pub use config::{ConfigError, WireConfig};
pub use error::{Error, Result};
pub use media::{
    decrypt_media, encrypt_media, MediaDescriptor, MediaDownloadReader, MediaError, MediaKind, MediaProvider,
    MediaUpload, MediaUploadReader,
};
pub use store::{AppStateKeyStore, AppStateSyncKey, MemoryStore};
pub use types::{Jid, Server};
