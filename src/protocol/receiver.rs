//! Receive loop.
//!
//! Reads frames for the lifetime of the connection and hands each decoded
//! payload to the pending request with the same sequence number. A frame
//! that fails to decode is logged and counted, and the loop carries on after
//! a short pause. Only end of stream or a read error stops it, and stopping
//! fails every request still waiting.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::config::HEADER_SIZE;
use crate::core::codec;
use crate::core::packet::FrameHeader;
use crate::error::Result;
use crate::protocol::session::Session;
use crate::transport::TransportReader;

/// Run until the peer closes the stream or a read fails.
pub async fn run(mut reader: TransportReader, session: Arc<Session>) {
    debug!("Receive loop started");

    loop {
        let (header, body) = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("Peer closed the connection");
                break;
            }
            Err(e) => {
                if session.is_live() {
                    warn!(error = %e, "Receive failed, stopping");
                } else {
                    debug!(error = %e, "Receive interrupted by shutdown");
                }
                break;
            }
        };

        session
            .metrics()
            .frame_received((HEADER_SIZE + body.len()) as u64);

        match codec::decode_payload(&body) {
            Ok(payload) => {
                trace!(
                    seq = header.sequence,
                    opcode = header.opcode,
                    bytes = body.len(),
                    "Frame received"
                );
                if !session.pending().resolve(header.sequence, payload) {
                    session.metrics().unmatched_response();
                }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    seq = header.sequence,
                    opcode = header.opcode,
                    "Dropping frame that failed to decode"
                );
                session.metrics().decode_error();
                tokio::time::sleep(session.config().recv_error_backoff).await;
            }
        }
    }

    session.mark_closed();
    session.cancel_pending();
    debug!("Receive loop stopped");
}

/// Read one header and its body.
///
/// `Ok(None)` means the stream ended, whether before the header or part way
/// through a frame.
async fn read_frame(reader: &mut TransportReader) -> Result<Option<(FrameHeader, Vec<u8>)>> {
    let header_bytes = reader.read_exact(HEADER_SIZE).await?;
    if header_bytes.len() < HEADER_SIZE {
        if !header_bytes.is_empty() {
            debug!(received = header_bytes.len(), "Stream ended inside a frame header");
        }
        return Ok(None);
    }

    let header = FrameHeader::from_bytes(&header_bytes)?;
    let len = header.payload_len();

    let body = reader.read_exact(len).await?;
    if body.len() < len {
        debug!(expected = len, received = body.len(), "Stream ended inside a frame body");
        return Ok(None);
    }

    Ok(Some((header, body)))
}
