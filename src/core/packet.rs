//! Frame header and raw packet layout.
//!
//! ```text
//! [Version(1)] [Command(2)] [Seq(1)] [Opcode(2)] [Length(4)] [Payload(N)]
//! ```
//!
//! All integers are big-endian. Only the low 24 bits of the length field are
//! significant; the top byte is ignored on read and always written as zero.

use crate::config::{HEADER_SIZE, MAX_PAYLOAD_SIZE, PAYLOAD_LENGTH_MASK};
use crate::error::{ProtocolError, Result};

/// Decoded fixed-size frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub command: u16,
    pub sequence: u8,
    pub opcode: u16,
    /// Payload length, already masked to 24 bits
    pub payload_len: u32,
}

impl FrameHeader {
    /// Parse the first `HEADER_SIZE` bytes of `buf`
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(ProtocolError::InvalidHeader);
        }

        let raw_len = u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]);

        Ok(Self {
            version: buf[0],
            command: u16::from_be_bytes([buf[1], buf[2]]),
            sequence: buf[3],
            opcode: u16::from_be_bytes([buf[4], buf[5]]),
            payload_len: raw_len & PAYLOAD_LENGTH_MASK,
        })
    }

    /// Serialize the header; the length field's top byte is always zero
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0] = self.version;
        out[1..3].copy_from_slice(&self.command.to_be_bytes());
        out[3] = self.sequence;
        out[4..6].copy_from_slice(&self.opcode.to_be_bytes());
        out[6..10].copy_from_slice(&(self.payload_len & PAYLOAD_LENGTH_MASK).to_be_bytes());
        out
    }

    /// Payload length as a buffer size
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload_len as usize
    }
}

/// One frame with an opaque payload (serialized, possibly compressed)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub version: u8,
    pub command: u16,
    pub sequence: u8,
    pub opcode: u16,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Header describing this packet, with the length taken from the payload
    ///
    /// # Errors
    /// Returns `ProtocolError::OversizedPacket` if the payload does not fit in 24 bits
    pub fn header(&self) -> Result<FrameHeader> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::OversizedPacket(self.payload.len()));
        }

        Ok(FrameHeader {
            version: self.version,
            command: self.command,
            sequence: self.sequence,
            opcode: self.opcode,
            payload_len: self.payload.len() as u32,
        })
    }

    /// Serialize header and payload into one contiguous buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let header = self.header()?;
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Parse one complete frame from `buf`
    ///
    /// Bytes past the declared payload length are ignored.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let header = FrameHeader::from_bytes(buf)?;
        let end = HEADER_SIZE + header.payload_len();

        if buf.len() < end {
            return Err(ProtocolError::InvalidHeader);
        }

        Ok(Self::from_parts(header, buf[HEADER_SIZE..end].to_vec()))
    }

    /// Assemble a packet from an already parsed header and its payload
    pub fn from_parts(header: FrameHeader, payload: Vec<u8>) -> Self {
        Self {
            version: header.version,
            command: header.command,
            sequence: header.sequence,
            opcode: header.opcode,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_header_layout() {
        let header = FrameHeader {
            version: 10,
            command: 0x0102,
            sequence: 7,
            opcode: 0x0304,
            payload_len: 0x000A_0B0C,
        };
        assert_eq!(
            header.to_bytes(),
            [10, 0x01, 0x02, 7, 0x03, 0x04, 0x00, 0x0A, 0x0B, 0x0C]
        );
        assert_eq!(FrameHeader::from_bytes(&header.to_bytes()).unwrap(), header);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_length_top_byte_ignored_on_read() {
        let bytes = [10, 0, 0, 1, 0, 6, 0xFF, 0x00, 0x00, 0x05];
        let header = FrameHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.payload_len, 5);
    }

    #[test]
    fn test_length_top_byte_zeroed_on_write() {
        let header = FrameHeader {
            version: 1,
            command: 0,
            sequence: 0,
            opcode: 0,
            payload_len: 0xFF12_3456,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes[6], 0);
        assert_eq!(&bytes[7..10], &[0x12, 0x34, 0x56]);
    }

    #[test]
    fn test_truncated_header_rejected() {
        assert!(matches!(
            FrameHeader::from_bytes(&[10, 0, 0, 1]),
            Err(ProtocolError::InvalidHeader)
        ));
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let packet = Packet {
            version: 10,
            command: 0,
            sequence: 1,
            opcode: 1,
            payload: vec![0u8; MAX_PAYLOAD_SIZE + 1],
        };
        assert!(matches!(
            packet.to_bytes(),
            Err(ProtocolError::OversizedPacket(n)) if n == MAX_PAYLOAD_SIZE + 1
        ));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_packet_ignores_trailing_bytes() {
        let packet = Packet {
            version: 10,
            command: 0,
            sequence: 3,
            opcode: 6,
            payload: vec![1, 2, 3],
        };
        let mut bytes = packet.to_bytes().unwrap();
        bytes.extend_from_slice(&[9, 9]);
        assert_eq!(Packet::from_bytes(&bytes).unwrap(), packet);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_short_payload_rejected() {
        let packet = Packet {
            version: 10,
            command: 0,
            sequence: 3,
            opcode: 6,
            payload: vec![1, 2, 3],
        };
        let bytes = packet.to_bytes().unwrap();
        assert!(matches!(
            Packet::from_bytes(&bytes[..bytes.len() - 1]),
            Err(ProtocolError::InvalidHeader)
        ));
    }
}
