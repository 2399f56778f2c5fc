use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::CryptoError;
use crate::traits::CorpIdDeriver;
use crate::KEY_LEN;

type HmacSha256 = Hmac<Sha256>;

/// corpID tags are the first 16 bytes of the HMAC, hex encoded.
const CORP_ID_LEN: usize = 16;

/// Keyed HMAC-SHA256 whose key schedule is computed once and cloned per use.
#[derive(Clone)]
pub(crate) struct KeyedMac {
    mac: HmacSha256,
}

impl KeyedMac {
    pub(crate) fn new(key: &[u8]) -> Result<Self, CryptoError> {
        let mac = HmacSha256::new_from_slice(key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { mac })
    }

    pub(crate) fn digest(&self, data: &[u8]) -> [u8; 32] {
        let mut mac = self.mac.clone();
        mac.update(data);
        let mut out = [0u8; 32];
        out.copy_from_slice(&mac.finalize().into_bytes());
        out
    }
}

/// HmacCorpId derives corpID = hex(HMAC-SHA256(key, lowercase(domain))[..16]).
///
/// Without the key, a tag reveals nothing about the domain beyond equality
/// with other tags.
pub struct HmacCorpId {
    mac: KeyedMac,
}

impl HmacCorpId {
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "corp id key must be {KEY_LEN} bytes"
            )));
        }
        Ok(Self {
            mac: KeyedMac::new(key)?,
        })
    }
}

impl CorpIdDeriver for HmacCorpId {
    fn corp_id(&self, domain: &str) -> String {
        let digest = self.mac.digest(domain.trim().to_ascii_lowercase().as_bytes());
        hex::encode(&digest[..CORP_ID_LEN])
    }
}
