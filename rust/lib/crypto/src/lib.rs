//! Crypto primitives for PII at rest: authenticated encryption (randomized
//! and deterministic), keyed corporation-domain digests, password hashing
//! and random code/password generation.
//!
//! Every primitive sits behind a trait so the service receives its backends
//! through its constructor.

pub mod aes;
pub mod corp_id;
pub mod error;
pub mod password;
pub mod random;
pub mod traits;

pub use aes::AesGcmEncryption;
pub use corp_id::HmacCorpId;
pub use error::CryptoError;
pub use password::Argon2Hasher;
pub use random::{random_bytes, random_password, DigitCode};
pub use traits::{CorpIdDeriver, Encryption, PasswordHasher, RandomCode};

/// Length in bytes of every key accepted by this crate.
pub const KEY_LEN: usize = 32;

/// Decode a hex key and check its length.
pub fn decode_key(hex_key: &str) -> Result<Vec<u8>, CryptoError> {
    let key = hex::decode(hex_key.trim()).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKey(format!(
            "expected {KEY_LEN} bytes, got {}",
            key.len()
        )));
    }
    Ok(key)
}
