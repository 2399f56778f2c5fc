use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::BlobError;
use crate::traits::BlobStore;

/// FileStore is a BlobStore implementation backed by the local filesystem.
///
/// Paths map onto files under `base_dir`:
///   `corp-pdf/l1/abc_s1.pdf` → `{base_dir}/corp-pdf/l1/abc_s1.pdf`
///
/// Parent directories are created on `write`. Writes go to a temporary
/// sibling first and are renamed into place.
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Create a new FileStore rooted at `base_dir`, creating the directory
    /// if needed.
    pub fn open(base_dir: &Path) -> Result<Self, BlobError> {
        fs::create_dir_all(base_dir).map_err(|e| BlobError::Io(e.to_string()))?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
        })
    }

    /// Map a blob path to a file path. Every component must be a plain name;
    /// empty, `.` and `..` components are rejected so a path can never
    /// escape `base_dir`.
    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        if path.is_empty() || path.contains('\\') {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        let mut resolved = self.base_dir.clone();
        for part in path.split('/') {
            if part.is_empty() || part == "." || part == ".." {
                return Err(BlobError::InvalidPath(path.to_string()));
            }
            resolved.push(part);
        }
        Ok(resolved)
    }
}

impl BlobStore for FileStore {
    fn write(&self, path: &str, data: &[u8]) -> Result<(), BlobError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| BlobError::Io(e.to_string()))?;
        }
        let tmp = target.with_extension("tmp");
        fs::write(&tmp, data).map_err(|e| BlobError::Io(e.to_string()))?;
        fs::rename(&tmp, &target).map_err(|e| BlobError::Io(e.to_string()))?;
        debug!(path, bytes = data.len(), "blob written");
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        let target = self.resolve(path)?;
        fs::read(&target).map_err(|e| match e.kind() {
            ErrorKind::NotFound => BlobError::NotFound(path.to_string()),
            _ => BlobError::Io(e.to_string()),
        })
    }

    fn exists(&self, path: &str) -> Result<bool, BlobError> {
        Ok(self.resolve(path)?.is_file())
    }

    fn delete(&self, path: &str) -> Result<(), BlobError> {
        let target = self.resolve(path)?;
        match fs::remove_file(&target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BlobError::Io(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let s = FileStore::open(dir.path()).unwrap();
        (dir, s)
    }

    #[test]
    fn write_read_exists_delete() {
        let (_dir, s) = store();
        let path = "corp-pdf/l1/abc_s1.pdf";
        assert!(!s.exists(path).unwrap());

        s.write(path, b"%PDF-1.4").unwrap();
        assert!(s.exists(path).unwrap());
        assert_eq!(s.read(path).unwrap(), b"%PDF-1.4");

        s.write(path, b"%PDF-1.7").unwrap();
        assert_eq!(s.read(path).unwrap(), b"%PDF-1.7");

        s.delete(path).unwrap();
        assert!(!s.exists(path).unwrap());
        s.delete(path).unwrap();
    }

    #[test]
    fn read_missing_is_not_found() {
        let (_dir, s) = store();
        assert!(matches!(s.read("nope.pdf"), Err(BlobError::NotFound(_))));
    }

    #[test]
    fn rejects_escaping_paths() {
        let (_dir, s) = store();
        for bad in ["", "/etc/passwd", "../x", "a/../../x", "a//b", "./a", "a\\b"] {
            assert!(
                matches!(s.write(bad, b"x"), Err(BlobError::InvalidPath(_))),
                "accepted {bad:?}"
            );
        }
    }
}
