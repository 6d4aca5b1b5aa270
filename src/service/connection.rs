//! Client connection facade.
//!
//! A [`Connection`] owns one transport and the three tasks that run it: the
//! receive loop, the keepalive loop and the write loop. Closing stops all
//! three and fails every request still waiting.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::core::serialization::Payload;
use crate::error::{ProtocolError, Result};
use crate::protocol::{keepalive, receiver, Session};
use crate::transport::{self, Stream, TransportReader, TransportWriter, WriteLoop};
use crate::utils::MetricsSnapshot;

/// Client connection to a packet service
///
/// Any number of tasks may call [`send`](Self::send) concurrently through a
/// shared reference; responses are matched to callers by sequence number.
///
/// # Example
/// ```ignore
/// let config = ClientConfig::new("gateway.example.com", 443);
/// let conn = Connection::connect(config).await?;
/// let reply = conn.send(6, &HashMap::<String, String>::new()).await?;
/// conn.close().await;
/// ```
pub struct Connection {
    session: Arc<Session>,
    workers: Mutex<Option<Workers>>,
}

/// Background tasks owned by one connection
struct Workers {
    receiver: JoinHandle<()>,
    keepalive: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Workers {
    /// Abort the read side, then give the write loop `grace` to finish its
    /// shutdown before aborting it too.
    async fn stop(self, grace: Duration) {
        self.keepalive.abort();
        self.receiver.abort();

        let mut writer = self.writer;
        let finished = tokio::time::timeout(grace, &mut writer).await;
        let writer = match finished {
            Ok(result) => result,
            Err(_) => {
                warn!("Write loop did not stop in time, aborting");
                writer.abort();
                writer.await
            }
        };

        for (name, result) in [
            ("keepalive", self.keepalive.await),
            ("receiver", self.receiver.await),
            ("writer", writer),
        ] {
            match result {
                Ok(()) => debug!(task = name, "Task finished"),
                Err(e) if e.is_cancelled() => debug!(task = name, "Task cancelled"),
                Err(e) => warn!(task = name, error = %e, "Task panicked"),
            }
        }
    }

    fn abort(&self) {
        self.keepalive.abort();
        self.receiver.abort();
        self.writer.abort();
    }
}

impl Connection {
    /// Open the TLS session and start the receive and keepalive tasks.
    ///
    /// # Errors
    /// - `ProtocolError::ConfigError` if `config` does not validate
    /// - `ProtocolError::ConnectionError` on connect or handshake failure
    #[instrument(skip(config), fields(address = %config.address()))]
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(ProtocolError::ConfigError(errors.join("; ")));
        }

        let (reader, writer, write_loop) = transport::open(&config).await?;
        Ok(Self::start(reader, writer, write_loop, config))
    }

    /// Run a connection over an already established stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_stream<S: Stream>(stream: S, config: ClientConfig) -> Self {
        let (reader, writer, write_loop) = transport::split(stream, config.shutdown_timeout);
        Self::start(reader, writer, write_loop, config)
    }

    fn start(
        reader: TransportReader,
        writer: TransportWriter,
        write_loop: WriteLoop,
        config: ClientConfig,
    ) -> Self {
        let session = Arc::new(Session::new(config, writer));

        let workers = Workers {
            receiver: tokio::spawn(receiver::run(reader, session.clone())),
            keepalive: tokio::spawn(keepalive::run(session.clone())),
            writer: tokio::spawn(write_loop.run()),
        };

        info!("Connection established");
        Self {
            session,
            workers: Mutex::new(Some(workers)),
        }
    }

    /// Send a request and wait for its response.
    ///
    /// Returns `None` when the response carried no payload. Waits for as long
    /// as `request_timeout` allows, or until the connection closes if unset.
    ///
    /// # Errors
    /// - `ProtocolError::NotConnected` if the connection is closed
    /// - `ProtocolError::ConnectionClosed` if it closes while waiting
    /// - `ProtocolError::DuplicateSequence` if 256 requests are already in flight
    /// - `ProtocolError::OversizedPacket` if the payload exceeds 24 bits of length
    /// - `ProtocolError::Timeout` if `request_timeout` expires
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        opcode: u16,
        payload: &T,
    ) -> Result<Option<Payload>> {
        let timeout = self.session.config().request_timeout;
        self.session.request(opcode, payload, timeout).await
    }

    /// Like [`send`](Self::send) with an explicit deadline for this request.
    ///
    /// On expiry the sequence number is released and a late response is dropped.
    pub async fn send_with_timeout<T: Serialize + ?Sized>(
        &self,
        opcode: u16,
        payload: &T,
        timeout: Duration,
    ) -> Result<Option<Payload>> {
        self.session.request(opcode, payload, Some(timeout)).await
    }

    /// Shut the connection down. Safe to call more than once.
    ///
    /// Every request still waiting fails with `ConnectionClosed` and later
    /// sends fail with `NotConnected`. Returns within about
    /// `shutdown_timeout` even if the peer has stopped reading.
    pub async fn close(&self) {
        let first = self.session.mark_closed();

        self.session.close_transport();

        let workers = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(workers) = workers {
            // The write loop bounds its own shutdown; the margin covers scheduling
            let grace = self.session.config().shutdown_timeout + Duration::from_millis(100);
            workers.stop(grace).await;
        }

        self.session.cancel_pending();

        if first {
            info!("Connection closed");
            self.session.metrics().log_metrics();
        }
    }

    /// Whether requests can currently be sent
    pub fn is_connected(&self) -> bool {
        self.session.is_live()
    }

    /// Number of requests waiting for a response
    pub fn pending_requests(&self) -> usize {
        self.session.pending().len()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.session.metrics().snapshot()
    }

    pub fn config(&self) -> &ClientConfig {
        self.session.config()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let workers = self
            .workers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(workers) = workers {
            self.session.mark_closed();
            self.session.close_transport();
            workers.abort();
            self.session.cancel_pending();
        }
    }
}
