//! "Key seen within TTL" limiter backed by the KV store.
//!
//! Each key stores its expiry (unix seconds, big-endian i64). Expired
//! entries count as absent and are removed lazily.

use std::sync::Arc;

use tracing::debug;

use clasign_kv::KVStore;

use crate::clock::Clock;
use crate::service::SigningError;

const PREFIX: &str = "limit:";

pub struct Limiter {
    kv: Arc<dyn KVStore>,
    clock: Arc<dyn Clock>,
}

fn decode_expiry(raw: &[u8]) -> Option<i64> {
    raw.try_into().ok().map(i64::from_be_bytes)
}

impl Limiter {
    pub fn new(kv: Arc<dyn KVStore>, clock: Arc<dyn Clock>) -> Self {
        Self { kv, clock }
    }

    fn key(key: &str) -> String {
        format!("{PREFIX}{key}")
    }

    fn expiry_after(&self, ttl: u64) -> i64 {
        self.clock
            .now()
            .saturating_add(i64::try_from(ttl).unwrap_or(i64::MAX))
    }

    /// Mark `key` as seen for `ttl` seconds.
    pub fn add(&self, key: &str, ttl: u64) -> Result<(), SigningError> {
        let expiry = self.expiry_after(ttl);
        self.kv.set(&Self::key(key), &expiry.to_be_bytes())?;
        Ok(())
    }

    /// True when `key` has not been seen within its TTL.
    pub fn is_allowed(&self, key: &str) -> Result<bool, SigningError> {
        let full = Self::key(key);
        let Some(raw) = self.kv.get(&full)? else {
            return Ok(true);
        };
        match decode_expiry(&raw) {
            Some(expiry) if expiry > self.clock.now() => Ok(false),
            _ => {
                self.kv.delete(&full)?;
                Ok(true)
            }
        }
    }

    /// Atomically check and mark `key`. Returns false if it was seen within
    /// its TTL, otherwise records it for `ttl` seconds and returns true.
    pub fn try_acquire(&self, key: &str, ttl: u64) -> Result<bool, SigningError> {
        if ttl == 0 {
            return Ok(true);
        }
        let now = self.clock.now();
        let expiry = self.expiry_after(ttl);
        let mut acquired = false;
        self.kv.update(&Self::key(key), &mut |current| {
            match current.and_then(decode_expiry) {
                Some(existing) if existing > now => Some(existing.to_be_bytes().to_vec()),
                _ => {
                    acquired = true;
                    Some(expiry.to_be_bytes().to_vec())
                }
            }
        })?;
        Ok(acquired)
    }

    /// Forget `key`, as if it had never been seen.
    pub fn release(&self, key: &str) -> Result<(), SigningError> {
        self.kv.delete(&Self::key(key))?;
        debug!(key, "limiter key released");
        Ok(())
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, SigningError> {
        let now = self.clock.now();
        let mut removed = 0;
        for (key, raw) in self.kv.scan(PREFIX)? {
            if decode_expiry(&raw).is_none_or(|expiry| expiry <= now) {
                self.kv.delete(&key)?;
                removed += 1;
            }
        }
        debug!(removed, "limiter purge");
        Ok(removed)
    }
}
