//! # TLS Packet Client
//!
//! Async client for a length-prefixed binary protocol carried over a single
//! persistent TLS stream.
//!
//! Every frame is a 10-byte big-endian header followed by a MessagePack
//! payload. Inbound payloads may arrive LZ4 block-compressed. Requests and
//! responses are paired by a 1-byte sequence number, so up to 256 requests
//! can be in flight on one connection at a time.
//!
//! ## Layers
//! - [`core`]: header layout, payload serialization, frame codec
//! - [`transport`]: TCP + TLS stream split into reader and writer halves
//! - [`protocol`]: pending request table, receive loop, keepalive loop
//! - [`service`]: the [`Connection`] applications use
//! - [`config`], [`error`], [`utils`]: configuration, error types, logging,
//!   metrics and timeouts
//!
//! ## Example
//! ```no_run
//! use std::collections::HashMap;
//! use tls_packet_client::{ClientConfig, Connection};
//!
//! # async fn run() -> tls_packet_client::Result<()> {
//! let conn = Connection::connect(ClientConfig::new("gateway.example.com", 443)).await?;
//! let reply = conn.send(6, &HashMap::<String, String>::new()).await?;
//! println!("{reply:?}");
//! conn.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use config::{ClientConfig, LoggingConfig, NetworkConfig, TlsOptions};
pub use crate::core::codec::PacketCodec;
pub use crate::core::packet::{FrameHeader, Packet};
pub use crate::core::serialization::Payload;
pub use error::{ProtocolError, Result};
pub use service::Connection;
pub use utils::MetricsSnapshot;
