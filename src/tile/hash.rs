//! Content hashing for encoded tiles.
//!
//! The hash of a tile's final encoded bytes is its public identifier and the
//! suffix of its storage key. It is a pure function of the bytes, which is
//! what lets the gateway serve a hash-addressed tile as immutable.

use sha2::{Digest, Sha256};

/// Length of a content hash in hex characters.
pub const CONTENT_HASH_LEN: usize = 64;

/// Compute the SHA-256 of `data` as 64 lowercase hex characters.
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Check that `s` has the exact shape produced by [`content_hash`].
///
/// Uppercase hex is rejected so that one tile has exactly one URL.
pub fn is_content_hash(s: &str) -> bool {
    s.len() == CONTENT_HASH_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
