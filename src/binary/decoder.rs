//! Binary decoder for the node format.

use thiserror::Error;

use super::buffer::{Buffer, BufferError};
use super::node::{AttrValue, Attrs, Node, NodeContent};
use super::tag;
use super::token;
use crate::types::{Jid, Server};

/// Errors raised while decoding a node or unpacking a stanza.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error("cannot decode node with empty body")]
    EmptyNode,
    #[error("unknown single-byte token {0}")]
    UnknownToken(u8),
    #[error("unknown double-byte token {index} in dictionary {dictionary}")]
    UnknownDoubleToken { dictionary: usize, index: u8 },
    #[error("invalid nibble {nibble:#x} in packed string with tag {tag}")]
    InvalidNibble { tag: u8, nibble: u8 },
    #[error("invalid packed string length byte {0:#x}")]
    InvalidPackedLength(u8),
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("expected {expected}, got {found}")]
    UnexpectedValue {
        expected: &'static str,
        found: &'static str,
    },
    #[error("{0} leftover bytes after decoding")]
    TrailingBytes(usize),
    #[error("failed to inflate stanza: {0}")]
    Decompression(String),
    #[error("nodes nested deeper than {0} levels")]
    TooDeep(usize),
}

/// Deepest node nesting accepted from the wire.
pub const MAX_DEPTH: usize = 256;

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Decode binary data (without the stanza flag byte) into a node.
pub fn decode(data: &[u8]) -> DecodeResult<Node> {
    let mut decoder = Decoder::new(data.to_vec());
    let node = decoder.read_node()?;
    match decoder.remaining() {
        0 => Ok(node),
        leftover => Err(DecodeError::TrailingBytes(leftover)),
    }
}

/// A generic value read from the wire before it is placed into a node.
#[derive(Debug)]
enum Value {
    Null,
    Text(String),
    Bytes(Vec<u8>),
    Jid(Jid),
    List(Vec<Node>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Jid(_) => "jid",
            Value::List(_) => "list",
        }
    }
}

fn unpack_nibble(value: u8) -> Option<char> {
    match value {
        0..=9 => Some((b'0' + value) as char),
        10 => Some('-'),
        11 => Some('.'),
        _ => None,
    }
}

fn unpack_hex(value: u8) -> Option<char> {
    match value {
        0..=9 => Some((b'0' + value) as char),
        10..=15 => Some((b'A' + value - 10) as char),
        _ => None,
    }
}

/// Binary decoder for nodes. One instance per decode call.
#[derive(Debug)]
pub struct Decoder {
    buffer: Buffer,
    depth: usize,
}

impl Decoder {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            buffer: Buffer::wrap(data),
            depth: 0,
        }
    }

    /// Bytes left after the last read.
    pub fn remaining(&self) -> usize {
        self.buffer.remaining()
    }

    /// Read one node and, recursively, its children.
    pub fn read_node(&mut self) -> DecodeResult<Node> {
        if self.depth >= MAX_DEPTH {
            return Err(DecodeError::TooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        let node = self.read_node_body();
        self.depth -= 1;
        node
    }

    fn read_node_body(&mut self) -> DecodeResult<Node> {
        let list_tag = self.buffer.read_u8()?;
        let size = match list_tag {
            tag::LIST_EMPTY => return Ok(Node::empty_list()),
            tag::LIST_8 => match self.buffer.read_u8()? {
                0 => return Ok(Node::empty_list()),
                size => size as usize,
            },
            _ => self.buffer.read_u16()? as usize,
        };
        if size == 0 {
            return Err(DecodeError::EmptyNode);
        }

        let tag = self.read_string()?;
        let mut attrs = Attrs::new();
        for _ in 0..(size - 1) / 2 {
            let key = self.read_string()?;
            let value = match self.read_value(true)? {
                Value::Null => continue,
                Value::Text(text) => AttrValue::Text(text),
                Value::Bytes(bytes) => AttrValue::Bytes(bytes),
                Value::Jid(jid) => AttrValue::Jid(jid),
                other => {
                    return Err(DecodeError::UnexpectedValue {
                        expected: "attribute value",
                        found: other.kind(),
                    })
                }
            };
            attrs.insert(key, value);
        }

        let content = if size % 2 == 1 {
            NodeContent::None
        } else {
            match self.read_value(false)? {
                Value::Null => NodeContent::None,
                Value::Text(text) => NodeContent::Text(text),
                Value::Bytes(bytes) => NodeContent::Bytes(bytes),
                Value::Jid(jid) => NodeContent::Text(jid.to_string()),
                Value::List(children) => NodeContent::Children(children),
            }
        };

        Ok(Node {
            tag,
            attrs,
            content,
        })
    }

    fn read_string(&mut self) -> DecodeResult<String> {
        match self.read_value(true)? {
            Value::Text(text) => Ok(text),
            Value::Bytes(_) => Err(DecodeError::InvalidUtf8),
            other => Err(DecodeError::UnexpectedValue {
                expected: "string",
                found: other.kind(),
            }),
        }
    }

    fn read_value(&mut self, parse_as_text: bool) -> DecodeResult<Value> {
        let value_tag = self.buffer.read_u8()?;
        match value_tag {
            tag::LIST_EMPTY => Ok(Value::Null),
            tag::AD_JID => self.read_ad_jid().map(Value::Jid),
            tag::LIST_8 => {
                let size = self.buffer.read_u8()? as usize;
                self.read_list(size).map(Value::List)
            }
            tag::LIST_16 => {
                let size = self.buffer.read_u16()? as usize;
                self.read_list(size).map(Value::List)
            }
            tag::JID_PAIR => self.read_jid_pair().map(Value::Jid),
            tag::HEX_8 => self.read_packed(tag::HEX_8, unpack_hex).map(Value::Text),
            tag::NIBBLE_8 => self.read_packed(tag::NIBBLE_8, unpack_nibble).map(Value::Text),
            tag::BINARY_8 => {
                let len = self.buffer.read_u8()? as usize;
                self.read_binary(len, parse_as_text)
            }
            tag::BINARY_20 => {
                let len = ((self.buffer.read_u8()? as usize & 0x0F) << 16)
                    | (self.buffer.read_u8()? as usize) << 8
                    | self.buffer.read_u8()? as usize;
                self.read_binary(len, parse_as_text)
            }
            tag::BINARY_32 => {
                let len = self.buffer.read_u32()? as usize;
                self.read_binary(len, parse_as_text)
            }
            other => self.read_token(other).map(|token| Value::Text(token.to_string())),
        }
    }

    fn read_token(&mut self, value: u8) -> DecodeResult<&'static str> {
        if let Some(dictionary) = tag::dictionary_of(value) {
            let index = self.buffer.read_u8()?;
            return token::double_byte_token(dictionary, index)
                .ok_or(DecodeError::UnknownDoubleToken { dictionary, index });
        }
        token::single_byte_token(value).ok_or(DecodeError::UnknownToken(value))
    }

    fn read_list(&mut self, size: usize) -> DecodeResult<Vec<Node>> {
        (0..size).map(|_| self.read_node()).collect()
    }

    fn read_binary(&mut self, len: usize, parse_as_text: bool) -> DecodeResult<Value> {
        let bytes = self.buffer.read_bytes(len)?;
        if !parse_as_text {
            return Ok(Value::Bytes(bytes));
        }
        Ok(match String::from_utf8(bytes) {
            Ok(text) => Value::Text(text),
            Err(err) => Value::Bytes(err.into_bytes()),
        })
    }

    fn read_packed(&mut self, packed_tag: u8, unpack: fn(u8) -> Option<char>) -> DecodeResult<String> {
        let header = self.buffer.read_u8()?;
        let odd = header >> 7 == 1;
        let pairs = (header & 0x7F) as usize;
        if odd && pairs == 0 {
            return Err(DecodeError::InvalidPackedLength(header));
        }

        let mut text = String::with_capacity(pairs * 2);
        for i in 0..pairs {
            let byte = self.buffer.read_u8()?;
            let last_half = odd && i == pairs - 1;
            for (nibble, used) in [(byte >> 4, true), (byte & 0x0F, !last_half)] {
                if !used {
                    continue;
                }
                let c = unpack(nibble).ok_or(DecodeError::InvalidNibble {
                    tag: packed_tag,
                    nibble,
                })?;
                text.push(c);
            }
        }
        Ok(text)
    }

    fn read_jid_pair(&mut self) -> DecodeResult<Jid> {
        let user = match self.read_value(true)? {
            Value::Null => None,
            Value::Text(user) => Some(user),
            other => {
                return Err(DecodeError::UnexpectedValue {
                    expected: "jid user",
                    found: other.kind(),
                })
            }
        };
        let server = self.read_string()?;
        Ok(Jid {
            user,
            server: Server::from(server.as_str()),
            device: 0,
            agent: 0,
        })
    }

    fn read_ad_jid(&mut self) -> DecodeResult<Jid> {
        let agent = self.buffer.read_u8()?;
        let device = self.buffer.read_u8()?;
        let user = self.read_string()?;
        Ok(Jid::new_ad(user, agent, device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::encoder::encode;

    #[test]
    fn test_roundtrip_attrs_and_children() {
        let node = Node::new("iq")
            .with_attr("id", "3EB0A9B1C2D3")
            .with_attr("type", "set")
            .with_attr("to", Jid::of_server(Server::User))
            .with_attr("participant", Jid::new_ad("391234567890", 0, 7))
            .with_attr("notify", "Some Name ✓")
            .with_children(vec![
                Node::new("query").with_attr("t", "1712345678"),
                Node::new("enc")
                    .with_attr("v", "2")
                    .with_content(NodeContent::Bytes(vec![0, 159, 255, 1, 2])),
                Node::empty_list(),
                Node::new("list").with_children(Vec::new()),
            ]);

        let encoded = encode(&node).unwrap();
        assert_eq!(decode(&encoded).unwrap(), node);
    }

    #[test]
    fn test_roundtrip_token_and_packed_content() {
        for content in ["available", "read-self", "1234-56.78", "DEADBEEF", ""] {
            let node = Node::new("item").with_content(NodeContent::Text(content.to_string()));
            let decoded = decode(&encode(&node).unwrap()).unwrap();
            if content.is_empty() {
                assert_eq!(decoded.content, NodeContent::Bytes(Vec::new()));
            } else {
                assert_eq!(decoded, node, "content {content:?}");
            }
        }
    }

    #[test]
    fn test_raw_text_content_decodes_as_bytes() {
        let node = Node::new("body").with_content(NodeContent::Text("hello world".into()));
        let decoded = decode(&encode(&node).unwrap()).unwrap();
        assert_eq!(decoded.bytes(), Some(&b"hello world"[..]));
    }

    #[test]
    fn test_jid_content_is_stringified() {
        let node = Node::new("item").with_content(NodeContent::Jid(Jid::new("123", Server::Group)));
        let decoded = decode(&encode(&node).unwrap()).unwrap();
        assert_eq!(decoded.content, NodeContent::Text("123@g.us".to_string()));
    }

    #[test]
    fn test_long_strings_roundtrip() {
        let long = "z".repeat(70_000);
        let node = Node::new("blob")
            .with_attr("data", long.as_str())
            .with_attr("digits", "9".repeat(200).as_str());
        assert_eq!(decode(&encode(&node).unwrap()).unwrap(), node);
    }

    #[test]
    fn test_empty_list_decoding() {
        assert_eq!(decode(&[tag::LIST_8, 0]).unwrap(), Node::empty_list());
        assert_eq!(decode(&[tag::LIST_EMPTY]).unwrap(), Node::empty_list());
        assert_eq!(decode(&[tag::LIST_16, 0, 0]), Err(DecodeError::EmptyNode));
    }

    #[test]
    fn test_null_attribute_is_dropped() {
        let iq = token::single_byte_value("iq").unwrap();
        let id = token::single_byte_value("id").unwrap();
        let node = decode(&[tag::LIST_8, 3, iq, id, tag::LIST_EMPTY]).unwrap();
        assert_eq!(node, Node::new("iq"));
    }

    #[test]
    fn test_truncated_input() {
        let encoded = encode(&Node::new("iq").with_attr("id", "abcdef-long-id")).unwrap();
        for cut in 1..encoded.len() {
            assert!(decode(&encoded[..cut]).is_err(), "prefix of {cut} bytes decoded");
        }
    }

    #[test]
    fn test_unknown_tokens() {
        assert_eq!(decode(&[tag::LIST_8, 1, 240]), Err(DecodeError::UnknownToken(240)));
        assert_eq!(
            decode(&[tag::LIST_8, 1, tag::DICTIONARY_3, 250]),
            Err(DecodeError::UnknownDoubleToken {
                dictionary: 3,
                index: 250
            })
        );
    }

    #[test]
    fn test_invalid_nibble() {
        assert_eq!(
            decode(&[tag::LIST_8, 1, tag::NIBBLE_8, 0x01, 0xC1]),
            Err(DecodeError::InvalidNibble {
                tag: tag::NIBBLE_8,
                nibble: 0x0C
            })
        );
    }

    fn nested_frame(levels: usize) -> Vec<u8> {
        let iq = token::single_byte_value("iq").unwrap();
        let mut frame = Vec::with_capacity(levels * 5 + 3);
        for _ in 0..levels {
            frame.extend_from_slice(&[tag::LIST_8, 2, iq, tag::LIST_8, 1]);
        }
        frame.extend_from_slice(&[tag::LIST_8, 1, iq]);
        frame
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        assert_eq!(decode(&nested_frame(200_000)), Err(DecodeError::TooDeep(MAX_DEPTH)));
        assert_eq!(decode(&nested_frame(MAX_DEPTH)), Err(DecodeError::TooDeep(MAX_DEPTH)));

        let mut node = decode(&nested_frame(MAX_DEPTH - 1)).unwrap();
        let mut levels = 0;
        while let Some(child) = node.children().first().cloned() {
            node = child;
            levels += 1;
        }
        assert_eq!(levels, MAX_DEPTH - 1);
    }

    #[test]
    fn test_truncated_list_16_header() {
        let iq = token::single_byte_value("iq").unwrap();
        assert!(matches!(decode(&[tag::LIST_16]), Err(DecodeError::Buffer(_))));
        assert!(matches!(decode(&[tag::LIST_16, 0]), Err(DecodeError::Buffer(_))));
        assert!(matches!(
            decode(&[tag::LIST_8, 2, iq, tag::LIST_16, 0]),
            Err(DecodeError::Buffer(_))
        ));
    }

    #[test]
    fn test_trailing_bytes() {
        let mut encoded = encode(&Node::new("iq")).unwrap();
        encoded.push(0);
        assert_eq!(decode(&encoded), Err(DecodeError::TrailingBytes(1)));
    }
}
