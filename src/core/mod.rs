//! # Core Protocol Components
//!
//! Frame layout, payload serialization, and the codec that ties them together.
//!
//! ## Components
//! - **Packet**: fixed 10-byte header plus opaque payload
//! - **Serialization**: MessagePack payload trees
//! - **Codec**: request encoding, response decoding, and a Tokio framing codec
//!
//! ## Wire Format
//! ```text
//! [Version(1)] [Command(2)] [Seq(1)] [Opcode(2)] [Length(4)] [Payload(N)]
//! ```
//!
//! ## Limits
//! - Payload length is a 24-bit value (max 16 MiB - 1); larger payloads are rejected
//! - Compressed inbound payloads may expand to at most 99 999 bytes

pub mod codec;
pub mod packet;
pub mod serialization;
