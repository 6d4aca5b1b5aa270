//! # Protocol Layer
//!
//! Request/response correlation and the two background tasks that keep a
//! connection running.
//!
//! ## Components
//! - **Correlator**: pending request table keyed by the 1-byte sequence number
//! - **Session**: live flag, sequence counter and the shared send path
//! - **Receiver**: reads and demultiplexes inbound frames
//! - **Keepalive**: periodic ping on the normal send path

pub mod correlator;
pub mod keepalive;
pub mod receiver;
pub mod session;

pub use correlator::{PendingRequests, PendingResponse};
pub use session::Session;
