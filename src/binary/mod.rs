//! Binary node format.
//!
//! Nodes are serialised as token-compacted lists, optionally deflated behind a one
//! byte stanza flag.

pub mod buffer;
pub mod decoder;
pub mod encoder;
pub mod node;
pub mod stanza;
pub mod tag;
pub mod token;

pub use buffer::{Buffer, BufferError, Endianness};
pub use decoder::{decode, DecodeError, Decoder};
pub use encoder::{encode, EncodeError, Encoder};
pub use node::*;
pub use stanza::{decode_stanza, encode_stanza, encode_stanza_compressed, unpack_stanza};
