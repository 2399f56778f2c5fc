use std::path::PathBuf;

/// Store locations shared by the signing service and its tooling.
///
/// Each binary fills these from its own configuration source, then passes
/// them to storage layer initialization.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    /// Root directory for all persisted state.
    pub data_dir: Option<PathBuf>,

    /// Path to the redb database file (limiter state).
    /// Defaults to `{data_dir}/limiter.redb` if not specified.
    pub db_path: Option<PathBuf>,

    /// Path to the SQLite database file (links, signings, managers, codes).
    /// Defaults to `{data_dir}/signing.sqlite` if not specified.
    pub sqlite_path: Option<PathBuf>,

    /// Directory for blob storage (signed corporate PDFs).
    /// Defaults to `{data_dir}/blobs/` if not specified.
    pub blob_dir: Option<PathBuf>,
}

impl ServiceConfig {
    /// Resolve the redb database path, falling back to `{data_dir}/limiter.redb`.
    pub fn resolve_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.resolve_data_subpath("limiter.redb"))
    }

    /// Resolve the SQLite database path, falling back to `{data_dir}/signing.sqlite`.
    pub fn resolve_sqlite_path(&self) -> PathBuf {
        self.sqlite_path
            .clone()
            .unwrap_or_else(|| self.resolve_data_subpath("signing.sqlite"))
    }

    /// Resolve the blob storage directory.
    pub fn resolve_blob_dir(&self) -> PathBuf {
        self.blob_dir
            .clone()
            .unwrap_or_else(|| self.resolve_data_subpath("blobs"))
    }

    fn resolve_data_subpath(&self, name: &str) -> PathBuf {
        self.data_dir
            .as_ref()
            .map(|d| d.join(name))
            .unwrap_or_else(|| PathBuf::from(name))
    }
}
