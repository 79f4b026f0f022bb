//! Hashing Utilities

use sha2::{Digest, Sha256};

/// Width of every content-derived identifier in bytes
pub const ID_LEN: usize = 16;

/// SHA-256 of `content`, truncated to the identifier width
pub fn truncated_digest(content: &[u8]) -> [u8; ID_LEN] {
    let digest = Sha256::digest(content);
    let mut out = [0u8; ID_LEN];
    out.copy_from_slice(&digest[..ID_LEN]);
    out
}

/// Hex-encoded truncated SHA-256 of a string
pub fn content_hash(content: &str) -> String {
    hex::encode(truncated_digest(content.as_bytes()))
}
