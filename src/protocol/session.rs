//! State shared between the caller-facing connection and its background tasks.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, trace};

use crate::config::ClientConfig;
use crate::core::codec;
use crate::core::serialization::Payload;
use crate::error::{ProtocolError, Result};
use crate::protocol::correlator::PendingRequests;
use crate::transport::TransportWriter;
use crate::utils::timeout::maybe_with_timeout;
use crate::utils::Metrics;

/// One live session over one transport
pub struct Session {
    config: ClientConfig,
    live: AtomicBool,
    sequence: AtomicU8,
    pending: PendingRequests,
    writer: TransportWriter,
    metrics: Metrics,
}

impl Session {
    /// A new session is live until [`mark_closed`](Self::mark_closed) is called
    pub fn new(config: ClientConfig, writer: TransportWriter) -> Self {
        Self {
            config,
            live: AtomicBool::new(true),
            sequence: AtomicU8::new(0),
            pending: PendingRequests::new(),
            writer,
            metrics: Metrics::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Mark the session not live. Returns `true` for the call that did it.
    pub fn mark_closed(&self) -> bool {
        self.live.swap(false, Ordering::AcqRel)
    }

    /// Advance the counter and return the new value. The first request uses 1.
    fn next_sequence(&self) -> u8 {
        self.sequence.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Send one request and wait for the response with the same sequence number.
    ///
    /// # Errors
    /// - `ProtocolError::NotConnected` if the session is not live
    /// - `ProtocolError::DuplicateSequence` if the next sequence number is still pending
    /// - `ProtocolError::ConnectionClosed` if shutdown happens before the frame
    ///   is written or before the response arrives
    /// - `ProtocolError::Timeout` if `timeout` expires first
    /// - `ProtocolError::EncodeError`, `OversizedPacket` or `ConnectionError` from encode and write
    pub async fn request<T: Serialize + ?Sized>(
        &self,
        opcode: u16,
        payload: &T,
        timeout: Option<Duration>,
    ) -> Result<Option<Payload>> {
        if !self.is_live() {
            return Err(ProtocolError::NotConnected);
        }

        let sequence = self.next_sequence();
        let frame = codec::encode_request(
            self.config.protocol_version,
            self.config.command,
            sequence,
            opcode,
            payload,
        )?;

        let response = match self.pending.register(sequence) {
            Ok(slot) => slot,
            Err(e @ ProtocolError::DuplicateSequence(_)) => {
                self.metrics.duplicate_sequence();
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        // A failed write drops the slot and releases the sequence number
        let len = frame.len();
        if let Err(e) = self.writer.write_all(frame).await {
            if !self.is_live() {
                return Err(ProtocolError::ConnectionClosed);
            }
            return Err(e);
        }
        self.metrics.frame_sent(len as u64);
        trace!(seq = sequence, opcode, bytes = len, "Request sent");

        maybe_with_timeout(response, timeout).await
    }

    /// Stop the write loop. Returns without waiting for it.
    pub fn close_transport(&self) {
        self.writer.close();
    }

    /// Fail every waiting request with `ConnectionClosed`
    pub fn cancel_pending(&self) {
        let cancelled = self.pending.cancel_all();
        if cancelled > 0 {
            info!(cancelled, "Cancelled pending requests");
            self.metrics.requests_cancelled(cancelled as u64);
        } else {
            debug!("No pending requests to cancel");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport;
    use std::sync::Arc;

    const SHUTDOWN: Duration = Duration::from_millis(100);

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_sequence_starts_at_one_and_wraps() {
        let (client, _server) = tokio::io::duplex(64);
        let (_reader, writer, _write_loop) = transport::split(client, SHUTDOWN);
        let session = Session::new(ClientConfig::default(), writer);

        assert_eq!(session.next_sequence(), 1);
        for _ in 0..254 {
            session.next_sequence();
        }
        assert_eq!(session.next_sequence(), 0);
        assert_eq!(session.next_sequence(), 1);
    }

    #[tokio::test]
    async fn test_request_after_close_is_not_connected() {
        let (client, _server) = tokio::io::duplex(64);
        let (_reader, writer, _write_loop) = transport::split(client, SHUTDOWN);
        let session = Session::new(ClientConfig::default(), writer);

        assert!(session.mark_closed());
        assert!(!session.mark_closed());

        let result = session.request(6, &Payload::Map(Vec::new()), None).await;
        assert!(matches!(result, Err(ProtocolError::NotConnected)));
    }

    #[tokio::test]
    async fn test_failed_write_releases_sequence() {
        let (client, _server) = tokio::io::duplex(64);
        let (_reader, writer, write_loop) = transport::split(client, SHUTDOWN);
        let session = Session::new(ClientConfig::default(), writer);
        tokio::spawn(write_loop.run());

        session.close_transport();
        let result = session.request(6, &Payload::Map(Vec::new()), None).await;
        assert!(matches!(result, Err(ProtocolError::ConnectionError(_))));
        assert!(session.pending().is_empty());
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_stuck_write_fails_closed_on_shutdown() {
        let (client, _server) = tokio::io::duplex(64);
        let (_reader, writer, write_loop) = transport::split(client, SHUTDOWN);
        let session = Arc::new(Session::new(ClientConfig::default(), writer));
        let write_task = tokio::spawn(write_loop.run());

        let sender = tokio::spawn({
            let session = session.clone();
            async move { session.request(6, &"x".repeat(4096), None).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.pending().len(), 1);

        session.mark_closed();
        session.close_transport();

        let result = tokio::time::timeout(Duration::from_secs(1), sender)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
        assert!(session.pending().is_empty());
        tokio::time::timeout(Duration::from_secs(1), write_task)
            .await
            .unwrap()
            .unwrap();
    }
}
