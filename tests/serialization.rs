//! Integration tests for payload serialization
//!
//! Outgoing payloads are encoded with field names; inbound payloads decode
//! into a dynamic tree with lenient map-key handling.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use serde::Serialize;
use tls_packet_client::core::codec::decode_payload;
use tls_packet_client::core::serialization::{from_slice, lookup, to_vec};
use tls_packet_client::{Payload, ProtocolError};

#[derive(Serialize)]
struct StartAuth<'a> {
    r#type: &'a str,
    version: u32,
}

#[test]
fn test_structs_encode_as_named_maps() {
    let bytes = to_vec(&StartAuth {
        r#type: "START_AUTH",
        version: 3,
    })
    .unwrap();

    let value = from_slice(&bytes).unwrap();
    assert_eq!(lookup(&value, "type").and_then(|v| v.as_str()), Some("START_AUTH"));
    assert_eq!(lookup(&value, "version").and_then(|v| v.as_u64()), Some(3));
}

#[test]
fn test_duplicate_keys_last_write_wins() {
    // {"a": 1, "b": 2, "a": 3}
    let bytes = [0x83, 0xa1, b'a', 0x01, 0xa1, b'b', 0x02, 0xa1, b'a', 0x03];
    let value = from_slice(&bytes).unwrap();

    assert_eq!(
        value,
        Payload::Map(vec![
            (Payload::from("a"), Payload::from(3u8)),
            (Payload::from("b"), Payload::from(2u8)),
        ])
    );
}

#[test]
fn test_nested_duplicate_keys_collapse() {
    // {"outer": {"k": true, "k": false}}
    let bytes = [
        0x81, 0xa5, b'o', b'u', b't', b'e', b'r', 0x82, 0xa1, b'k', 0xc3, 0xa1, b'k', 0xc2,
    ];
    let value = from_slice(&bytes).unwrap();
    let inner = lookup(&value, "outer").unwrap();

    assert_eq!(inner.as_map().map(Vec::len), Some(1));
    assert_eq!(lookup(inner, "k"), Some(&Payload::Boolean(false)));
}

#[test]
fn test_non_string_keys_accepted() {
    // {1: "one", "two": 2}
    let bytes = [0x82, 0x01, 0xa3, b'o', b'n', b'e', 0xa3, b't', b'w', b'o', 0x02];
    let value = from_slice(&bytes).unwrap();

    let map = value.as_map().unwrap();
    assert_eq!(map[0], (Payload::from(1u8), Payload::from("one")));
    assert_eq!(lookup(&value, "two"), Some(&Payload::from(2u8)));
}

#[test]
fn test_trailing_bytes_rejected() {
    let result = from_slice(&[0x80, 0x00]);
    assert!(matches!(result, Err(ProtocolError::DecodeError(_))));
}

#[test]
fn test_lookup_on_non_map_is_none() {
    assert_eq!(lookup(&Payload::from(5u8), "a"), None);
    assert_eq!(lookup(&Payload::Map(Vec::new()), "a"), None);
}

#[test]
fn test_decode_payload_scalar() {
    assert_eq!(decode_payload(&[0xc0]).unwrap(), Some(Payload::Nil));
    assert_eq!(decode_payload(&[0x2a]).unwrap(), Some(Payload::from(42u8)));
}
