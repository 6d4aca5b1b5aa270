//! # Transport Layer
//!
//! Owns the single TLS stream to the remote peer.
//!
//! The stream is split into a [`TransportReader`], owned exclusively by the
//! receive loop, and a [`TransportWriter`], shared by every sender. The write
//! half itself belongs to a [`WriteLoop`] task. Senders hand it whole frames
//! over a channel, so frames never interleave and a caller that gives up
//! waiting cannot leave half a frame on the wire.
//!
//! ## Responsibilities
//! - TCP connect and TLS handshake with the configured trust policy
//! - `read_exact` that reports orderly peer shutdown as a short read
//! - Queued writes of whole frames
//! - Idempotent orderly shutdown, bounded even when a write is stuck

pub mod tls;

use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_rustls::TlsConnector;
use tracing::{debug, info, instrument, trace};

use crate::config::ClientConfig;
use crate::error::{constants, ProtocolError, Result};
use crate::utils::timeout::with_timeout_error;

/// Frames that may wait for the write loop before senders are held back
pub const WRITE_QUEUE_CAPACITY: usize = 256;

/// Byte stream the transport can run over
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

type BoxedStream = Box<dyn Stream>;

/// Open a TCP connection and perform the TLS handshake.
///
/// # Errors
/// Returns `ProtocolError::ConnectionError` on DNS, connect or handshake
/// failure, including the connect timeout expiring.
#[instrument(skip(config), fields(address = %config.address()))]
pub async fn open(config: &ClientConfig) -> Result<(TransportReader, TransportWriter, WriteLoop)> {
    let tls_config = config.tls_client_config()?;
    let connector = TlsConnector::from(Arc::new(tls_config.load_client_config()?));
    let domain = tls_config.server_name()?;
    let address = config.address();

    let tls_stream = with_timeout_error(
        async {
            let tcp = TcpStream::connect(&address)
                .await
                .map_err(|e| ProtocolError::ConnectionError(format!("{address}: {e}")))?;
            tcp.set_nodelay(true)?;

            connector
                .connect(domain, tcp)
                .await
                .map_err(|e| ProtocolError::ConnectionError(format!("TLS handshake failed: {e}")))
        },
        config.connect_timeout,
    )
    .await
    .map_err(|e| match e {
        ProtocolError::Timeout => {
            ProtocolError::ConnectionError(constants::ERR_CONNECT_TIMEOUT.to_string())
        }
        ProtocolError::Io(e) => ProtocolError::ConnectionError(e.to_string()),
        other => other,
    })?;

    info!("TLS session established");
    Ok(split(tls_stream, config.shutdown_timeout))
}

/// Split any byte stream into transport halves.
///
/// Nothing is written until the returned [`WriteLoop`] is run, normally on
/// its own task. `shutdown_timeout` bounds the orderly shutdown of the write
/// half once the loop is told to stop.
pub fn split<S: Stream>(stream: S, shutdown_timeout: Duration) -> (TransportReader, TransportWriter, WriteLoop) {
    let boxed: BoxedStream = Box::new(stream);
    let (reader, writer) = tokio::io::split(boxed);
    let (tx, rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    (
        TransportReader { inner: reader },
        TransportWriter {
            tx,
            shutdown: Mutex::new(Some(shutdown_tx)),
        },
        WriteLoop {
            rx,
            shutdown: shutdown_rx,
            inner: writer,
            shutdown_timeout,
        },
    )
}

fn closed() -> ProtocolError {
    ProtocolError::ConnectionError(constants::ERR_CONNECTION_CLOSED.into())
}

/// Read side of the transport
pub struct TransportReader {
    inner: ReadHalf<BoxedStream>,
}

impl TransportReader {
    /// Read exactly `n` bytes.
    ///
    /// Returns fewer than `n` bytes only when the peer closed the stream;
    /// never returns more than `n`.
    pub async fn read_exact(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        let mut filled = 0;

        while filled < n {
            let read = self.inner.read(&mut buf[filled..]).await?;
            if read == 0 {
                trace!(expected = n, received = filled, "Peer closed stream");
                break;
            }
            filled += read;
        }

        buf.truncate(filled);
        Ok(buf)
    }
}

/// One encoded frame and where to report the outcome of writing it
struct OutboundFrame {
    bytes: Vec<u8>,
    written: oneshot::Sender<Result<()>>,
}

/// Write side of the transport, shared by all senders
pub struct TransportWriter {
    tx: mpsc::Sender<OutboundFrame>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl TransportWriter {
    /// Queue one whole frame and wait until it has been written and flushed.
    ///
    /// Once queued the frame is always written in full, even if this future
    /// is dropped first.
    ///
    /// # Errors
    /// `ProtocolError::ConnectionError` if the socket fails or was closed
    /// before the frame went out.
    pub async fn write_all(&self, bytes: Vec<u8>) -> Result<()> {
        if self.is_closed() {
            return Err(closed());
        }

        let (written, outcome) = oneshot::channel();
        self.tx
            .send(OutboundFrame { bytes, written })
            .await
            .map_err(|_| closed())?;

        outcome.await.unwrap_or_else(|_| Err(closed()))
    }

    /// Tell the write loop to shut the stream down. Safe to call more than once.
    ///
    /// Returns immediately. A write in progress is abandoned and frames still
    /// queued fail with `ConnectionError`.
    pub fn close(&self) {
        let signal = self
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(signal) = signal {
            let _ = signal.send(());
        }
    }

    /// Whether `close` has been called or the write loop has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
            || self
                .shutdown
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_none()
    }
}

/// Task that owns the write half and writes queued frames in order
pub struct WriteLoop {
    rx: mpsc::Receiver<OutboundFrame>,
    shutdown: oneshot::Receiver<()>,
    inner: WriteHalf<BoxedStream>,
    shutdown_timeout: Duration,
}

impl WriteLoop {
    /// Write frames until the writer is closed, dropped or the socket fails,
    /// then shut the stream down within the shutdown timeout.
    pub async fn run(mut self) {
        debug!("Write loop started");

        loop {
            let frame = tokio::select! {
                biased;
                _ = &mut self.shutdown => break,
                frame = self.rx.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            let result = tokio::select! {
                biased;
                _ = &mut self.shutdown => {
                    debug!(bytes = frame.bytes.len(), "Write abandoned by shutdown");
                    break;
                }
                result = write_frame(&mut self.inner, &frame.bytes) => result,
            };

            let failed = result.is_err();
            let _ = frame.written.send(result);
            if failed {
                break;
            }
        }

        // Refuse new frames and fail the ones already queued
        self.rx.close();
        while let Ok(frame) = self.rx.try_recv() {
            drop(frame);
        }

        let inner = &mut self.inner;
        let result = with_timeout_error(
            async { inner.shutdown().await.map_err(ProtocolError::from) },
            self.shutdown_timeout,
        )
        .await;
        if let Err(e) = result {
            debug!(error = %e, "Ignoring error during transport shutdown");
        }

        debug!("Write loop stopped");
    }
}

async fn write_frame(writer: &mut WriteHalf<BoxedStream>, bytes: &[u8]) -> Result<()> {
    writer
        .write_all(bytes)
        .await
        .map_err(|e| ProtocolError::ConnectionError(format!("write failed: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| ProtocolError::ConnectionError(format!("flush failed: {e}")))?;
    trace!(bytes = bytes.len(), "Frame written");
    Ok(())
}
