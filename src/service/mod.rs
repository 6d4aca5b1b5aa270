//! # Client Service
//!
//! The caller-facing [`Connection`]: connect, send, close.

pub mod connection;

pub use connection::Connection;
