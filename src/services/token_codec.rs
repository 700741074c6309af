// src/services/token_codec.rs
//! Single-use secrets for emailed links.
//!
//! The raw secret only ever travels to the user; the database keeps the
//! SHA-256 digest. Secrets carry 256 bits of OS entropy, so the digest needs no
//! salt.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

pub const SECRET_BYTES: usize = 32;

/// 64 lowercase hex characters from the OS CSPRNG.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Lowercase hex SHA-256 of the secret.
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Compares without short-circuiting on the first differing byte.
pub fn constant_time_equals(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
