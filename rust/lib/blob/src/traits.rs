use crate::error::BlobError;

/// BlobStore is the object-store collaborator used for signed PDF documents.
///
/// Paths are `/`-separated relative keys such as
/// `corp-pdf/<link_id>/<corp_id>_<signing_id>.pdf`.
pub trait BlobStore: Send + Sync {
    /// Store bytes at `path`, replacing any existing object.
    fn write(&self, path: &str, data: &[u8]) -> Result<(), BlobError>;

    /// Read the object at `path`. Missing objects are `BlobError::NotFound`.
    fn read(&self, path: &str) -> Result<Vec<u8>, BlobError>;

    /// Check whether an object exists at `path`.
    fn exists(&self, path: &str) -> Result<bool, BlobError>;

    /// Remove the object at `path`. Removing a missing object is not an error.
    fn delete(&self, path: &str) -> Result<(), BlobError>;
}
