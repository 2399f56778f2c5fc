use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};

use crate::traits::RandomCode;

/// Fixed-length decimal codes drawn from the OS RNG.
pub struct DigitCode {
    len: usize,
}

impl DigitCode {
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl Default for DigitCode {
    fn default() -> Self {
        Self::new(6)
    }
}

impl RandomCode for DigitCode {
    fn new_code(&self) -> String {
        (0..self.len)
            .map(|_| char::from(b'0' + OsRng.gen_range(0..10u8)))
            .collect()
    }

    fn is_valid(&self, code: &str) -> bool {
        code.len() == self.len && code.bytes().all(|b| b.is_ascii_digit())
    }
}

/// Alphanumeric password of `len` characters from the OS RNG.
pub fn random_password(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// `n` random bytes from the OS RNG.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    OsRng.fill_bytes(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_six_digits() {
        let g = DigitCode::default();
        for _ in 0..100 {
            let code = g.new_code();
            assert_eq!(code.len(), 6);
            assert!(g.is_valid(&code));
        }
    }

    #[test]
    fn is_valid_rejects_bad_shapes() {
        let g = DigitCode::default();
        for bad in ["", "12345", "1234567", "12a456", " 12345", "１２３４５６"] {
            assert!(!g.is_valid(bad), "{bad:?}");
        }
    }

    #[test]
    fn passwords_are_alphanumeric() {
        let p = random_password(12);
        assert_eq!(p.len(), 12);
        assert!(p.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(random_password(12), p);
    }

    #[test]
    fn random_bytes_len() {
        assert_eq!(random_bytes(16).len(), 16);
        assert_ne!(random_bytes(16), random_bytes(16));
    }
}
