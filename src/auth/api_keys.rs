//! Personal API keys
//!
//! Only the SHA-256 of a key is stored. The first characters double as a
//! non-secret lookup prefix so verification hashes against a handful of rows.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

pub const API_KEY_BYTES: usize = 32;
pub const API_KEY_PREFIX_LEN: usize = 8;

/// A freshly generated key. `plain` is shown to the user exactly once.
#[derive(Debug, Clone)]
pub struct GeneratedApiKey {
    pub plain: String,
    pub hash: String,
    pub prefix: String,
}

pub fn generate_api_key() -> GeneratedApiKey {
    let mut bytes = [0u8; API_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let plain = URL_SAFE_NO_PAD.encode(bytes);

    GeneratedApiKey {
        hash: hash_api_key(&plain),
        prefix: api_key_prefix(&plain),
        plain,
    }
}

pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

pub fn api_key_prefix(key: &str) -> String {
    key.chars().take(API_KEY_PREFIX_LEN).collect()
}

/// Constant-time comparison of a presented key against a stored hash
pub fn verify_api_key(key: &str, stored_hash: &str) -> bool {
    let computed = hash_api_key(key);
    if computed.len() != stored_hash.len() {
        return false;
    }
    computed
        .bytes()
        .zip(stored_hash.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
