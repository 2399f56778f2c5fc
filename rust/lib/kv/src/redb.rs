use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::KVError;
use crate::traits::{KVStore, UpdateFn};

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

fn storage(e: impl std::fmt::Display) -> KVError {
    KVError::Storage(e.to_string())
}

/// RedbStore is a KVStore implementation backed by redb, a pure-Rust
/// embedded key-value database. redb serializes write transactions, which
/// is what makes `update` atomic.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create a redb database at the given path.
    pub fn open(path: &Path) -> Result<Self, KVError> {
        let db = Database::create(path).map_err(storage)?;

        // Ensure the table exists by doing a write transaction.
        let write_txn = db.begin_write().map_err(storage)?;
        {
            let _table = write_txn.open_table(TABLE).map_err(storage)?;
        }
        write_txn.commit().map_err(storage)?;

        Ok(Self { db })
    }
}

impl KVStore for RedbStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError> {
        let read_txn = self.db.begin_read().map_err(storage)?;
        let table = read_txn.open_table(TABLE).map_err(storage)?;

        let value = table.get(key).map_err(storage)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), KVError> {
        let write_txn = self.db.begin_write().map_err(storage)?;
        {
            let mut table = write_txn.open_table(TABLE).map_err(storage)?;
            table.insert(key, value).map_err(storage)?;
        }
        write_txn.commit().map_err(storage)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), KVError> {
        let write_txn = self.db.begin_write().map_err(storage)?;
        {
            let mut table = write_txn.open_table(TABLE).map_err(storage)?;
            table.remove(key).map_err(storage)?;
        }
        write_txn.commit().map_err(storage)?;
        Ok(())
    }

    fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, KVError> {
        let read_txn = self.db.begin_read().map_err(storage)?;
        let table = read_txn.open_table(TABLE).map_err(storage)?;

        let mut results = Vec::new();
        for entry in table.range(prefix..).map_err(storage)? {
            let (key, value) = entry.map_err(storage)?;
            let key = key.value().to_string();
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key, value.value().to_vec()));
        }

        Ok(results)
    }

    fn update(&self, key: &str, f: UpdateFn<'_>) -> Result<Option<Vec<u8>>, KVError> {
        let write_txn = self.db.begin_write().map_err(storage)?;
        let next = {
            let mut table = write_txn.open_table(TABLE).map_err(storage)?;
            let current = table
                .get(key)
                .map_err(storage)?
                .map(|v| v.value().to_vec());
            let next = f(current.as_deref());
            match &next {
                Some(value) => {
                    table.insert(key, value.as_slice()).map_err(storage)?;
                }
                None if current.is_some() => {
                    table.remove(key).map_err(storage)?;
                }
                None => {}
            }
            next
        };
        write_txn.commit().map_err(storage)?;
        Ok(next)
    }
}
