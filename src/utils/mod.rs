//! # Utility Modules
//!
//! Supporting utilities for compression, logging, metrics and timing.
//!
//! ## Components
//! - **Compression**: LZ4 block decompression with an output bound and raw fallback
//! - **Logging**: `tracing-subscriber` setup from [`crate::config::LoggingConfig`]
//! - **Metrics**: per-connection atomic counters
//! - **Timeout**: async deadline wrappers mapping to `ProtocolError::Timeout`

pub mod compression;
pub mod logging;
pub mod metrics;
pub mod timeout;

pub use metrics::{Metrics, MetricsSnapshot};
