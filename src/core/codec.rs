//! Frame encoding and decoding.
//!
//! [`encode_request`] and [`decode_payload`] translate between a logical
//! request (header fields plus a payload object) and wire bytes.
//! [`PacketCodec`] frames whole packets over a byte stream with
//! `tokio_util::codec`, for peers that want to speak the same wire format.

use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::config::{HEADER_SIZE, MAX_DECOMPRESSED_SIZE};
use crate::core::packet::{FrameHeader, Packet};
use crate::core::serialization::{self, Payload};
use crate::error::{ProtocolError, Result};
use crate::utils::compression;

/// Encode one request frame.
///
/// The payload is serialized to MessagePack and sent uncompressed.
///
/// # Errors
/// - `ProtocolError::EncodeError` if the payload cannot be serialized
/// - `ProtocolError::OversizedPacket` if it does not fit the 24-bit length field
pub fn encode_request<T: Serialize + ?Sized>(
    version: u8,
    command: u16,
    sequence: u8,
    opcode: u16,
    payload: &T,
) -> Result<Vec<u8>> {
    let packet = Packet {
        version,
        command,
        sequence,
        opcode,
        payload: serialization::to_vec(payload)?,
    };
    packet.to_bytes()
}

/// Decode the payload section of an inbound frame.
///
/// An empty payload is `None`. Otherwise the bytes are tried as an LZ4 block
/// first and as plain MessagePack second; a failed decompression only
/// selects the plain path.
pub fn decode_payload(bytes: &[u8]) -> Result<Option<Payload>> {
    if bytes.is_empty() {
        return Ok(None);
    }

    let (data, decompressed) = compression::maybe_decompress(bytes, MAX_DECOMPRESSED_SIZE);
    if decompressed {
        match serialization::from_slice(&data) {
            Ok(value) => return Ok(Some(value)),
            Err(e) => trace!(error = %e, "Decompressed bytes are not a payload, using raw bytes"),
        }
    }

    serialization::from_slice(bytes).map(Some)
}

/// Decode a frame given its 10 header bytes and the payload bytes read after it.
///
/// Payload bytes beyond the declared length are ignored.
pub fn decode_frame(header: &[u8], payload: &[u8]) -> Result<(FrameHeader, Option<Payload>)> {
    let header = FrameHeader::from_bytes(header)?;
    let len = header.payload_len();

    if payload.len() < len {
        return Err(ProtocolError::DecodeError(format!(
            "Frame declares {len} payload bytes but only {} are present",
            payload.len()
        )));
    }

    Ok((header, decode_payload(&payload[..len])?))
}

/// Tokio codec framing whole [`Packet`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = FrameHeader::from_bytes(&src[..HEADER_SIZE])?;
        let total = HEADER_SIZE + header.payload_len();

        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(header.payload_len());
        Ok(Some(Packet::from_parts(header, payload.to_vec())))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<()> {
        let header = item.header()?;
        dst.reserve(HEADER_SIZE + item.payload.len());
        dst.put_slice(&header.to_bytes());
        dst.put_slice(&item.payload);
        Ok(())
    }
}
