use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::corp_id::KeyedMac;
use crate::error::CryptoError;
use crate::traits::Encryption;
use crate::KEY_LEN;

const NONCE_LEN: usize = 12;

/// AES-256-GCM encryption keyed from a single master key.
///
/// Ciphertext layout is `nonce (12 bytes) || sealed`. Randomized mode draws
/// the nonce from the OS RNG. Deterministic mode uses a synthetic nonce
/// HMAC-SHA256(nonce_key, plaintext)[..12], so equal plaintexts produce equal
/// ciphertexts and distinct plaintexts never share a nonce.
pub struct AesGcmEncryption {
    cipher: Aes256Gcm,
    nonce_mac: KeyedMac,
}

impl AesGcmEncryption {
    /// Build from a 32-byte master key. The cipher key and the nonce key are
    /// derived from it with distinct labels.
    pub fn new(master_key: &[u8]) -> Result<Self, CryptoError> {
        if master_key.len() != KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "encryption key must be {KEY_LEN} bytes"
            )));
        }
        let kdf = KeyedMac::new(master_key)?;
        let enc_key = kdf.digest(b"clasign/pii-encryption");
        let nonce_key = kdf.digest(b"clasign/pii-nonce");

        let cipher = Aes256Gcm::new_from_slice(&enc_key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self {
            cipher,
            nonce_mac: KeyedMac::new(&nonce_key)?,
        })
    }

    fn seal(&self, nonce_bytes: [u8; NONCE_LEN], plain: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Nonce::from_slice(&nonce_bytes);
        let sealed = self
            .cipher
            .encrypt(nonce, plain)
            .map_err(|_| CryptoError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(out)
    }
}

impl Encryption for AesGcmEncryption {
    fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        self.seal(nonce, plain)
    }

    fn encrypt_deterministic(&self, plain: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let digest = self.nonce_mac.digest(plain);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&digest[..NONCE_LEN]);
        self.seal(nonce, plain)
    }

    fn decrypt(&self, cipher: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if cipher.len() < NONCE_LEN {
            return Err(CryptoError::Malformed("ciphertext too short".into()));
        }
        let (nonce_raw, sealed) = cipher.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_raw), sealed)
            .map_err(|_| CryptoError::Decrypt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc() -> AesGcmEncryption {
        AesGcmEncryption::new(&[42u8; 32]).unwrap()
    }

    #[test]
    fn randomized_round_trip() {
        let e = enc();
        for plain in [&b""[..], b"a@corp.com", &[0u8, 255, 1, 254][..]] {
            let c1 = e.encrypt(plain).unwrap();
            let c2 = e.encrypt(plain).unwrap();
            assert_ne!(c1, c2);
            assert_eq!(e.decrypt(&c1).unwrap(), plain);
            assert_eq!(e.decrypt(&c2).unwrap(), plain);
        }
    }

    #[test]
    fn deterministic_is_stable_and_decrypts() {
        let e = enc();
        let c1 = e.encrypt_deterministic(b"a@corp.com").unwrap();
        let c2 = e.encrypt_deterministic(b"a@corp.com").unwrap();
        let other = e.encrypt_deterministic(b"b@corp.com").unwrap();
        assert_eq!(c1, c2);
        assert_ne!(c1, other);
        assert_ne!(c1[..NONCE_LEN], other[..NONCE_LEN]);
        assert_eq!(e.decrypt(&c1).unwrap(), b"a@corp.com");
    }

    #[test]
    fn str_helpers_round_trip() {
        let e = enc();
        let hex = e.encrypt_str_deterministic("alice@corp.com").unwrap();
        assert_eq!(e.decrypt_str(&hex).unwrap(), "alice@corp.com");
        assert_eq!(hex, e.encrypt_str_deterministic("alice@corp.com").unwrap());
        let hex = e.encrypt_str("Alice").unwrap();
        assert_eq!(e.decrypt_str(&hex).unwrap(), "Alice");
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let e = enc();
        let mut c = e.encrypt(b"secret").unwrap();
        let last = c.len() - 1;
        c[last] ^= 1;
        assert!(matches!(e.decrypt(&c), Err(CryptoError::Decrypt)));
    }

    #[test]
    fn wrong_key_fails() {
        let c = enc().encrypt(b"secret").unwrap();
        let other = AesGcmEncryption::new(&[1u8; 32]).unwrap();
        assert!(other.decrypt(&c).is_err());
    }

    #[test]
    fn short_input_is_malformed() {
        assert!(matches!(enc().decrypt(b"abc"), Err(CryptoError::Malformed(_))));
        assert!(enc().decrypt_str("zz").is_err());
    }

    #[test]
    fn rejects_bad_key_length() {
        assert!(matches!(
            AesGcmEncryption::new(&[0u8; 16]),
            Err(CryptoError::InvalidKey(_))
        ));
    }
}
