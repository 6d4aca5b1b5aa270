//! # Payload Serialization
//!
//! Payloads are MessagePack documents. Outgoing payloads are any `Serialize`
//! type, encoded with `rmp_serde::to_vec_named` so that structs become maps
//! keyed by field name. Inbound payloads are decoded into a dynamic
//! [`Payload`] tree because responses carry no schema the client knows about.
//!
//! ## Map keys
//! - Non-string keys (integers, binaries, ...) are accepted.
//! - Duplicate keys never fail decoding. The last value wins and the entry
//!   keeps the position of the key's first occurrence.
//!
//! ## Usage
//! ```
//! use tls_packet_client::core::serialization::{from_slice, lookup, to_vec};
//! use std::collections::BTreeMap;
//!
//! let mut req = BTreeMap::new();
//! req.insert("type", "START_AUTH");
//! let bytes = to_vec(&req).unwrap();
//! let value = from_slice(&bytes).unwrap();
//! assert_eq!(lookup(&value, "type").and_then(|v| v.as_str()), Some("START_AUTH"));
//! ```

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{constants, ProtocolError, Result};

/// Decoded payload tree
pub type Payload = rmpv::Value;

/// Serialize any value to MessagePack, structs as maps
pub fn to_vec<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(value)?)
}

/// Deserialize exactly one MessagePack value spanning all of `bytes`
pub fn from_slice(bytes: &[u8]) -> Result<Payload> {
    let mut cursor = bytes;
    let value = rmpv::decode::read_value(&mut cursor)?;

    if !cursor.is_empty() {
        return Err(ProtocolError::DecodeError(format!(
            "{} ({} bytes)",
            constants::ERR_TRAILING_BYTES,
            cursor.len()
        )));
    }

    Ok(collapse_duplicate_keys(value))
}

/// Look up a string key in a map payload
///
/// Returns `None` when `value` is not a map or has no such key.
pub fn lookup<'a>(value: &'a Payload, key: &str) -> Option<&'a Payload> {
    value
        .as_map()?
        .iter()
        .find(|(k, _)| k.as_str() == Some(key))
        .map(|(_, v)| v)
}

/// Apply the last-write-wins policy to every map in the tree
fn collapse_duplicate_keys(value: Payload) -> Payload {
    match value {
        Payload::Map(entries) => {
            let mut out: Vec<(Payload, Payload)> = Vec::with_capacity(entries.len());
            // Keys are indexed by their encoded bytes since `Payload` is not `Hash`
            let mut index: HashMap<Vec<u8>, usize> = HashMap::with_capacity(entries.len());
            for (key, val) in entries {
                let val = collapse_duplicate_keys(val);
                let mut encoded = Vec::new();
                if rmpv::encode::write_value(&mut encoded, &key).is_err() {
                    out.push((key, val));
                    continue;
                }
                match index.get(&encoded) {
                    Some(&at) => out[at].1 = val,
                    None => {
                        index.insert(encoded, out.len());
                        out.push((key, val));
                    }
                }
            }
            Payload::Map(out)
        }
        Payload::Array(items) => {
            Payload::Array(items.into_iter().map(collapse_duplicate_keys).collect())
        }
        other => other,
    }
}
