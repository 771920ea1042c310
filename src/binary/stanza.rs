//! Stanza envelope: one flag byte in front of the encoded node.
//!
//! Bit 2 of the flag marks a zlib-deflated payload.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use log::{debug, trace};

use super::buffer::BufferError;
use super::decoder::{decode, DecodeError, DecodeResult};
use super::encoder::{encode, EncodeError};
use super::node::Node;

/// Flag bit marking a compressed payload.
pub const COMPRESSED_FLAG: u8 = 2;
/// Initial size of the inflate scratch buffer.
pub const DEFAULT_INFLATE_CAPACITY: usize = 2048;

/// Encode a node and prepend the uncompressed flag byte.
pub fn encode_stanza(node: &Node) -> Result<Vec<u8>, EncodeError> {
    let payload = encode(node)?;
    let mut stanza = Vec::with_capacity(payload.len() + 1);
    stanza.push(0);
    stanza.extend_from_slice(&payload);
    Ok(stanza)
}

/// Encode a node and deflate it behind the compressed flag byte.
pub fn encode_stanza_compressed(node: &Node) -> Result<Vec<u8>, EncodeError> {
    let payload = encode(node)?;
    let mut encoder = ZlibEncoder::new(vec![COMPRESSED_FLAG], Compression::default());
    encoder
        .write_all(&payload)
        .map_err(|err| EncodeError::Compression(err.to_string()))?;
    encoder
        .finish()
        .map_err(|err| EncodeError::Compression(err.to_string()))
}

/// Strip the flag byte, inflating the payload when it is compressed.
pub fn unpack_stanza(data: &[u8]) -> DecodeResult<Vec<u8>> {
    unpack_stanza_with_capacity(data, DEFAULT_INFLATE_CAPACITY)
}

/// [`unpack_stanza`] with an explicit initial scratch size.
pub fn unpack_stanza_with_capacity(data: &[u8], capacity: usize) -> DecodeResult<Vec<u8>> {
    let (&flag, payload) = data.split_first().ok_or(BufferError::UnexpectedEnd {
        wanted: 1,
        available: 0,
    })?;
    if flag & COMPRESSED_FLAG == 0 {
        return Ok(payload.to_vec());
    }
    inflate(payload, capacity)
}

/// Unpack and decode a stanza.
pub fn decode_stanza(data: &[u8]) -> DecodeResult<Node> {
    decode(&unpack_stanza(data)?)
}

fn inflate(payload: &[u8], capacity: usize) -> DecodeResult<Vec<u8>> {
    let mut inflater = Decompress::new(true);
    let mut output = Vec::with_capacity(capacity.max(1));
    loop {
        let consumed = inflater.total_in() as usize;
        let status = inflater
            .decompress_vec(&payload[consumed..], &mut output, FlushDecompress::Finish)
            .map_err(|err| DecodeError::Decompression(err.to_string()))?;
        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError if output.len() == output.capacity() => {
                trace!("growing stanza inflate buffer past {} bytes", output.capacity());
                output.reserve(output.capacity());
            }
            Status::Ok | Status::BufError => {
                return Err(DecodeError::Decompression(
                    "deflate stream ended before completion".to_string(),
                ))
            }
        }
    }
    debug!("inflated stanza from {} to {} bytes", payload.len(), output.len());
    Ok(output)
}
