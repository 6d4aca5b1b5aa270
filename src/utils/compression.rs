//! LZ4 block compression for frame payloads.
//!
//! Payloads travel as raw LZ4 blocks without a size prefix, and the wire
//! format carries no flag saying whether a payload is compressed at all.
//! Inbound payloads are therefore decompressed on a best-effort basis: a
//! payload that is not a valid block is passed through untouched.

use std::borrow::Cow;

use crate::error::{ProtocolError, Result};

/// Compress `data` into a raw LZ4 block (no size prefix)
pub fn compress(data: &[u8]) -> Vec<u8> {
    lz4_flex::block::compress(data)
}

/// Decompress a raw LZ4 block whose output must fit in `max_size` bytes
///
/// # Errors
/// Returns `ProtocolError::DecompressionFailure` if the block is malformed
/// or expands past `max_size`.
pub fn decompress(data: &[u8], max_size: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; max_size];
    let written = lz4_flex::block::decompress_into(data, &mut out)
        .map_err(|_| ProtocolError::DecompressionFailure)?;
    out.truncate(written);
    Ok(out)
}

/// Decompress `data` if it is a valid block, otherwise hand it back unchanged.
///
/// The flag reports whether decompression was applied.
pub fn maybe_decompress(data: &[u8], max_size: usize) -> (Cow<'_, [u8]>, bool) {
    match decompress(data, max_size) {
        Ok(out) => (Cow::Owned(out), true),
        Err(_) => (Cow::Borrowed(data), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_DECOMPRESSED_SIZE;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_lz4_block_roundtrip() {
        let original = b"Hello, World! Hello, World! Hello, World! This is a block.";
        let compressed = compress(original);
        let decompressed = decompress(&compressed, MAX_DECOMPRESSED_SIZE).unwrap();
        assert_eq!(original.as_slice(), decompressed.as_slice());
    }

    #[test]
    fn test_output_bound_enforced() {
        let original = vec![7u8; 4096];
        let compressed = compress(&original);
        let result = decompress(&compressed, 1024);
        assert!(
            matches!(result, Err(ProtocolError::DecompressionFailure)),
            "Should reject output larger than the bound"
        );
    }

    #[test]
    fn test_malformed_block_rejected() {
        // Token asks for 8 literals but none follow
        let result = decompress(&[0x80], MAX_DECOMPRESSED_SIZE);
        assert!(result.is_err());
    }

    #[test]
    fn test_maybe_decompress_falls_back_to_raw() {
        // msgpack for {"payload": {"ok": true}}: the match offset points before the output start
        let raw = b"\x81\xa7payload\x81\xa2ok\xc3";
        let (out, decompressed) = maybe_decompress(raw, MAX_DECOMPRESSED_SIZE);
        assert!(!decompressed);
        assert_eq!(out.as_ref(), raw.as_slice());
    }

    #[test]
    fn test_maybe_decompress_uses_block() {
        let original = vec![42u8; 2048];
        let compressed = compress(&original);
        let (out, decompressed) = maybe_decompress(&compressed, MAX_DECOMPRESSED_SIZE);
        assert!(decompressed);
        assert_eq!(out.as_ref(), original.as_slice());
    }
}
