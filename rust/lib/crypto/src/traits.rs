use crate::error::CryptoError;

/// Symmetric authenticated encryption for PII at rest.
pub trait Encryption: Send + Sync {
    /// Randomized encryption: the same input yields a different ciphertext
    /// on every call.
    fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Deterministic encryption: the same input always yields the same
    /// ciphertext, so the result can be matched in a WHERE clause.
    fn encrypt_deterministic(&self, plain: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt output of either `encrypt` or `encrypt_deterministic`.
    fn decrypt(&self, cipher: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn encrypt_str(&self, plain: &str) -> Result<String, CryptoError> {
        Ok(hex::encode(self.encrypt(plain.as_bytes())?))
    }

    fn encrypt_str_deterministic(&self, plain: &str) -> Result<String, CryptoError> {
        Ok(hex::encode(self.encrypt_deterministic(plain.as_bytes())?))
    }

    fn decrypt_str(&self, cipher_hex: &str) -> Result<String, CryptoError> {
        let raw = hex::decode(cipher_hex).map_err(|e| CryptoError::Malformed(e.to_string()))?;
        String::from_utf8(self.decrypt(&raw)?).map_err(|e| CryptoError::Malformed(e.to_string()))
    }
}

/// Derives the corpID tag of an email domain.
pub trait CorpIdDeriver: Send + Sync {
    fn corp_id(&self, domain: &str) -> String;
}

/// Salted password hashing.
pub trait PasswordHasher: Send + Sync {
    /// Hash to a self-describing PHC string.
    fn hash(&self, password: &str) -> Result<String, CryptoError>;

    /// Check a password against a stored PHC string. Unparseable hashes
    /// never verify.
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// One-time code generator for user-facing entry.
pub trait RandomCode: Send + Sync {
    fn new_code(&self) -> String;

    /// Whether `code` has the generator's shape. Used to reject garbage
    /// before touching the store.
    fn is_valid(&self, code: &str) -> bool;
}
