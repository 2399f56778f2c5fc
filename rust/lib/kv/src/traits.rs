use crate::error::KVError;

/// Mapping applied by `KVStore::update`: receives the current value (if any)
/// and returns the value to store, or `None` to remove the key.
pub type UpdateFn<'a> = &'a mut dyn FnMut(Option<&[u8]>) -> Option<Vec<u8>>;

/// KVStore provides a flat key-value storage interface.
///
/// Keys follow a namespaced convention: `limit:vc:signup:<digest>`, etc.
pub trait KVStore: Send + Sync {
    /// Get the value for a key. Returns None if the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError>;

    /// Set a key-value pair.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), KVError>;

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), KVError>;

    /// Scan all keys matching a prefix. Returns sorted (key, value) pairs.
    fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, KVError>;

    /// Atomically read, transform and write back one key. No other writer
    /// can interleave between the read and the write. Returns the stored
    /// value after the update.
    fn update(&self, key: &str, f: UpdateFn<'_>) -> Result<Option<Vec<u8>>, KVError>;
}
