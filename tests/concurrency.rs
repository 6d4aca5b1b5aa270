#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tls_packet_client::core::serialization::lookup;
use tls_packet_client::{ClientConfig, Connection, Packet, PacketCodec, Payload, ProtocolError};
use tokio::task::JoinSet;
use tokio_util::codec::Framed;

fn request_body(id: u32) -> BTreeMap<&'static str, u32> {
    let mut body = BTreeMap::new();
    body.insert("id", id);
    body
}

/// Fire `count` concurrent sends at a peer that waits for all of them and
/// then answers in a scrambled order, echoing each request's payload.
async fn run_scrambled(count: usize) {
    let (client, server) = tokio::io::duplex(1024 * 1024);
    let conn = Arc::new(Connection::from_stream(client, ClientConfig::default()));

    let peer = tokio::spawn(async move {
        let mut framed = Framed::new(server, PacketCodec);
        let mut requests = Vec::with_capacity(count);
        while requests.len() < count {
            match framed.next().await {
                Some(Ok(packet)) => requests.push(packet),
                _ => return,
            }
        }

        requests.reverse();
        for pair in requests.chunks_mut(2) {
            pair.reverse();
        }

        for request in requests {
            framed.send(request).await.unwrap();
        }
        // Hold the stream open until the client closes
        while framed.next().await.is_some() {}
    });

    let mut tasks = JoinSet::new();
    for id in 0..count as u32 {
        let conn = conn.clone();
        tasks.spawn(async move {
            let reply = conn.send(6, &request_body(id)).await.unwrap().unwrap();
            assert_eq!(lookup(&reply, "id"), Some(&Payload::from(id)));
        });
    }

    let joined = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(res) = tasks.join_next().await {
            res.unwrap();
        }
    })
    .await;
    assert!(joined.is_ok(), "sends with {count} in flight did not complete");

    assert_eq!(conn.pending_requests(), 0);
    assert_eq!(conn.metrics().frames_received, count as u64);

    conn.close().await;
    peer.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sends_get_their_own_responses() {
    for count in [1, 2, 17, 128, 255] {
        run_scrambled(count).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sequence_space_exhaustion_is_reported() {
    let (client, server) = tokio::io::duplex(1024 * 1024);
    let conn = Arc::new(Connection::from_stream(client, ClientConfig::default()));

    // Swallow requests without answering
    let _peer = tokio::spawn(async move {
        let mut framed = Framed::new(server, PacketCodec);
        while let Some(Ok(_)) = framed.next().await {}
    });

    let mut tasks = JoinSet::new();
    for id in 0..256u32 {
        let conn = conn.clone();
        tasks.spawn(async move { conn.send(6, &request_body(id)).await });
    }

    tokio::time::timeout(Duration::from_secs(5), async {
        while conn.pending_requests() < 256 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("not every request became pending");

    let overflow = conn.send(6, &request_body(256)).await;
    assert!(matches!(overflow, Err(ProtocolError::DuplicateSequence(1))));
    assert_eq!(conn.metrics().duplicate_sequences, 1);
    assert_eq!(conn.pending_requests(), 256);

    conn.close().await;

    let mut cancelled = 0;
    while let Some(res) = tasks.join_next().await {
        if matches!(res.unwrap(), Err(ProtocolError::ConnectionClosed)) {
            cancelled += 1;
        }
    }
    assert_eq!(cancelled, 256);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn late_response_after_timeout_is_dropped() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let conn = Connection::from_stream(client, ClientConfig::default());

    let peer = tokio::spawn(async move {
        let mut framed = Framed::new(server, PacketCodec);
        let mut answered = 0;
        while let Some(Ok(request)) = framed.next().await {
            if request.sequence == 1 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            let reply = Packet {
                payload: Vec::new(),
                ..request
            };
            framed.send(reply).await.unwrap();
            answered += 1;
        }
        answered
    });

    let first = conn
        .send_with_timeout(6, &request_body(1), Duration::from_millis(20))
        .await;
    assert!(matches!(first, Err(ProtocolError::Timeout)));

    // Sequence 2 is answered after the stale reply for sequence 1
    assert_eq!(conn.send(6, &request_body(2)).await.unwrap(), None);
    assert_eq!(conn.metrics().unmatched_responses, 1);

    conn.close().await;
    assert_eq!(peer.await.unwrap(), 2);
}
