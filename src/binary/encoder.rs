//! Binary encoder for the node format.
//!
//! Strings are compacted through the token dictionaries, nibble packing for numeric
//! and upper-case hex strings, and length-prefixed raw bytes otherwise.

use thiserror::Error;

use super::buffer::Buffer;
use super::node::{AttrValue, Node, NodeContent};
use super::tag;
use super::token;
use crate::types::{Jid, Server};

/// Errors raised while encoding a node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("list of {0} entries does not fit in a 16-bit size")]
    ListTooLarge(usize),
    #[error("binary value of {0} bytes does not fit in a 32-bit length")]
    BinaryTooLarge(usize),
    #[error("failed to deflate stanza: {0}")]
    Compression(String),
    #[error("device JID {0} is not on s.whatsapp.net")]
    UnsupportedJid(String),
}

pub type EncodeResult<T> = Result<T, EncodeError>;

/// Encode a node to its binary form (without the stanza flag byte).
pub fn encode(node: &Node) -> EncodeResult<Vec<u8>> {
    let mut encoder = Encoder::new();
    encoder.write_node(node)?;
    Ok(encoder.into_bytes())
}

fn pack_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'-' => Some(10),
        b'.' => Some(11),
        _ => None,
    }
}

fn pack_hex(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Binary encoder for nodes. One instance per encode call.
#[derive(Debug, Default)]
pub struct Encoder {
    buffer: Buffer,
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            buffer: Buffer::network(),
        }
    }

    /// Bytes written so far.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.into_bytes()
    }

    /// Write a node and, recursively, its children.
    pub fn write_node(&mut self, node: &Node) -> EncodeResult<()> {
        if node.is_empty_list() {
            self.buffer.write_u8(tag::LIST_8);
            self.buffer.write_u8(0);
            return Ok(());
        }

        self.write_list_start(node.wire_size())?;
        self.write_string(&node.tag)?;
        for (key, value) in &node.attrs {
            self.write_string(key)?;
            self.write_attr_value(value)?;
        }
        match &node.content {
            NodeContent::None => {}
            NodeContent::Text(text) => self.write_string(text)?,
            NodeContent::Bytes(bytes) => self.write_binary(bytes)?,
            NodeContent::Jid(jid) => self.write_jid(jid)?,
            NodeContent::Children(children) => {
                self.write_list_start(children.len())?;
                for child in children {
                    self.write_node(child)?;
                }
            }
        }
        Ok(())
    }

    fn write_attr_value(&mut self, value: &AttrValue) -> EncodeResult<()> {
        match value {
            AttrValue::Text(text) => self.write_string(text),
            AttrValue::Bytes(bytes) => self.write_binary(bytes),
            AttrValue::Jid(jid) => self.write_jid(jid),
        }
    }

    fn write_list_start(&mut self, size: usize) -> EncodeResult<()> {
        if size < 256 {
            self.buffer.write_u8(tag::LIST_8);
            self.buffer.write_u8(size as u8);
        } else if size < 65_536 {
            self.buffer.write_u8(tag::LIST_16);
            self.buffer.write_u16(size as u16);
        } else {
            return Err(EncodeError::ListTooLarge(size));
        }
        Ok(())
    }

    /// Write a string using the most compact representation available.
    pub fn write_string(&mut self, value: &str) -> EncodeResult<()> {
        if value.is_empty() {
            self.buffer.write_u8(tag::BINARY_8);
            self.buffer.write_u8(0);
            return Ok(());
        }
        if let Some(token) = token::encode_token(value) {
            self.buffer.write_bytes(&token);
            return Ok(());
        }
        let bytes = value.as_bytes();
        if bytes.len() < tag::PACKED_MAX {
            if bytes.iter().all(|&c| pack_nibble(c).is_some()) {
                self.write_packed(tag::NIBBLE_8, bytes, pack_nibble);
                return Ok(());
            }
            if bytes.iter().all(|&c| pack_hex(c).is_some()) {
                self.write_packed(tag::HEX_8, bytes, pack_hex);
                return Ok(());
            }
        }
        self.write_binary(bytes)
    }

    /// Two characters per byte, high nibble first. An odd length sets the top bit of the
    /// length byte and pads the final low nibble with 0xF.
    fn write_packed(&mut self, packed_tag: u8, bytes: &[u8], pack: fn(u8) -> Option<u8>) {
        let odd = bytes.len() % 2 == 1;
        let pairs = bytes.len().div_ceil(2) as u8;
        self.buffer.write_u8(packed_tag);
        self.buffer.write_u8(if odd { pairs | 0x80 } else { pairs });
        for chunk in bytes.chunks(2) {
            // Callers only pass bytes that already passed `pack`.
            let high = pack(chunk[0]).unwrap_or(0x0F);
            let low = chunk.get(1).and_then(|&c| pack(c)).unwrap_or(0x0F);
            self.buffer.write_u8(high << 4 | low);
        }
    }

    fn write_binary(&mut self, bytes: &[u8]) -> EncodeResult<()> {
        let len = bytes.len();
        if len < 256 {
            self.buffer.write_u8(tag::BINARY_8);
            self.buffer.write_u8(len as u8);
        } else if len < tag::BINARY_20_MAX {
            self.buffer.write_u8(tag::BINARY_20);
            self.buffer.write_u8(((len >> 16) & 0x0F) as u8);
            self.buffer.write_u8((len >> 8) as u8);
            self.buffer.write_u8(len as u8);
        } else {
            let len = u32::try_from(len).map_err(|_| EncodeError::BinaryTooLarge(len))?;
            self.buffer.write_u8(tag::BINARY_32);
            self.buffer.write_u32(len);
        }
        self.buffer.write_bytes(bytes);
        Ok(())
    }

    fn write_jid(&mut self, jid: &Jid) -> EncodeResult<()> {
        if jid.is_ad() {
            if jid.server != Server::User {
                return Err(EncodeError::UnsupportedJid(jid.to_string()));
            }
            self.buffer.write_u8(tag::AD_JID);
            self.buffer.write_u8(jid.agent);
            self.buffer.write_u8(jid.device);
            return self.write_string(jid.user().unwrap_or_default());
        }

        self.buffer.write_u8(tag::JID_PAIR);
        match jid.user() {
            Some(user) => self.write_string(user)?,
            None => self.buffer.write_u8(tag::LIST_EMPTY),
        }
        self.write_string(jid.server.as_str())
    }
}
