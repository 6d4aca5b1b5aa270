//! Keepalive ping loop.
//!
//! Sends an empty request with the ping opcode once per interval through the
//! normal send path, so the peer never sees the connection go idle. The
//! response is discarded and failures are only logged.

use std::sync::Arc;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::core::serialization::Payload;
use crate::protocol::session::Session;

/// Run until the session stops being live.
///
/// The first ping goes out one full interval after the loop starts. A zero
/// interval disables pings.
pub async fn run(session: Arc<Session>) {
    let period = session.config().ping_interval;
    let opcode = session.config().ping_opcode;

    if period.is_zero() {
        debug!("Keepalive disabled");
        return;
    }

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(interval_ms = period.as_millis() as u64, "Keepalive loop started");

    loop {
        ticker.tick().await;
        if !session.is_live() {
            break;
        }

        // Never wait longer than one interval for the peer to answer
        match session
            .request(opcode, &Payload::Map(Vec::new()), Some(period))
            .await
        {
            Ok(_) => {
                session.metrics().ping_sent();
                debug!("Keepalive acknowledged");
            }
            Err(e) => {
                if !session.is_live() {
                    break;
                }
                session.metrics().ping_failed();
                warn!(error = %e, "Keepalive ping failed");
            }
        }
    }

    debug!("Keepalive loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientConfig, HEADER_SIZE};
    use crate::core::packet::FrameHeader;
    use crate::transport;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_sends_ping_frames() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (_reader, writer, write_loop) = transport::split(client, Duration::from_millis(100));
        let config = ClientConfig::default().with_ping_interval(Duration::from_millis(20));
        let session = Arc::new(Session::new(config, writer));
        tokio::spawn(write_loop.run());

        let task = tokio::spawn(run(session.clone()));

        let mut header = [0u8; HEADER_SIZE];
        server.read_exact(&mut header).await.unwrap();
        let header = FrameHeader::from_bytes(&header).unwrap();
        assert_eq!(header.version, 10);
        assert_eq!(header.opcode, 1);
        assert_eq!(header.sequence, 1);
        assert_eq!(header.payload_len(), 1);

        let mut body = [0u8; 1];
        server.read_exact(&mut body).await.unwrap();
        assert_eq!(body, [0x80]);

        session.mark_closed();
        task.await.unwrap();
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_unanswered_ping_is_counted() {
        let (client, _server) = tokio::io::duplex(1024);
        let (_reader, writer, write_loop) = transport::split(client, Duration::from_millis(100));
        let config = ClientConfig::default().with_ping_interval(Duration::from_millis(10));
        let session = Arc::new(Session::new(config, writer));
        tokio::spawn(write_loop.run());

        let task = tokio::spawn(run(session.clone()));
        tokio::time::sleep(Duration::from_millis(80)).await;
        session.mark_closed();
        task.await.unwrap();

        let snapshot = session.metrics().snapshot();
        assert!(snapshot.pings_failed >= 1);
        assert_eq!(snapshot.pings_sent, 0);
    }
}
