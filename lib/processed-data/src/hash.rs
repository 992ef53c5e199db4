//! Value hashing.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

/// SHA-256 of `value`, base64 encoded. The raw value is never stored.
#[must_use]
pub fn hash_value(value: &str) -> String {
    STANDARD.encode(Sha256::digest(value.as_bytes()))
}
