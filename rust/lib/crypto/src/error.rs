use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("encryption failed")]
    Encrypt,

    /// Wrong key, tampered ciphertext or truncated input.
    #[error("decryption failed")]
    Decrypt,

    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("password hash error: {0}")]
    Hash(String),
}
