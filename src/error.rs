//! # Error Types
//!
//! Error handling for the packet client.
//!
//! This module defines all error variants that can occur while talking to the
//! remote peer, from low-level I/O failures up to correlation conflicts.
//!
//! ## Error Categories
//! - **Connection Errors**: DNS, TCP connect, TLS handshake and write failures
//! - **Lifecycle Errors**: sending while not connected, requests invalidated by shutdown
//! - **Codec Errors**: malformed frames, oversized payloads, serialization failures
//! - **Correlation Errors**: a sequence number that is still waiting for its response
//!
//! All errors implement `std::error::Error` for interoperability.
//!
//! ## Example Usage
//! ```rust
//! use tls_packet_client::error::{ProtocolError, Result};
//!
//! fn check_live(live: bool) -> Result<()> {
//!     if !live {
//!         return Err(ProtocolError::NotConnected);
//!     }
//!     Ok(())
//! }
//!
//! assert!(matches!(check_live(false), Err(ProtocolError::NotConnected)));
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_NOT_CONNECTED: &str = "Socket not connected";
    pub const ERR_CONNECT_TIMEOUT: &str = "Timed out while connecting";

    /// Protocol validation errors
    pub const ERR_INVALID_HEADER: &str = "Invalid frame header";
    pub const ERR_OVERSIZED_PACKET: &str = "Payload exceeds 24-bit length field";
    pub const ERR_TRAILING_BYTES: &str = "Trailing bytes after payload value";

    /// Compression errors
    pub const ERR_DECOMPRESSION_FAILED: &str = "Decompression failed";

    /// TLS errors
    pub const ERR_INVALID_SERVER_NAME: &str = "Invalid server name";
    pub const ERR_PINNED_CERT_MISMATCH: &str = "Pinned certificate hash mismatch";
}

/// ProtocolError is the primary error type for all client operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Socket not connected")]
    NotConnected,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Encode error: {0}")]
    EncodeError(String),

    #[error("Sequence number {0} already has a pending request")]
    DuplicateSequence(u8),

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Decompression failed")]
    DecompressionFailure,

    #[error("Invalid frame header")]
    InvalidHeader,

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Timeout occurred")]
    Timeout,
}

impl From<rmp_serde::encode::Error> for ProtocolError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        ProtocolError::EncodeError(err.to_string())
    }
}

impl From<rmpv::decode::Error> for ProtocolError {
    fn from(err: rmpv::decode::Error) -> Self {
        ProtocolError::DecodeError(err.to_string())
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(ProtocolError::NotConnected.to_string(), "Socket not connected");
        assert_eq!(ProtocolError::ConnectionClosed.to_string(), "Connection closed");
        assert_eq!(
            ProtocolError::DuplicateSequence(7).to_string(),
            "Sequence number 7 already has a pending request"
        );
    }

    #[test]
    fn test_io_conversion() {
        let err: ProtocolError = io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(err, ProtocolError::Io(_)));
    }
}
