//! Async timeout helpers shared by the connection and its background tasks.

use std::future::Future;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Default timeout for establishing the TCP + TLS session
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between keepalive pings
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Upper bound on the orderly TLS shutdown during `close()`
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Pause applied by the receive loop after a frame fails to decode
pub const RECV_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Run a fallible future with a deadline, mapping expiry to `ProtocolError::Timeout`.
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}

/// Like [`with_timeout_error`], but with an optional deadline.
pub async fn maybe_with_timeout<F, T>(fut: F, duration: Option<Duration>) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match duration {
        Some(d) => with_timeout_error(fut, d).await,
        None => fut.await,
    }
}
