//! File persistence used by every stage of the issuance pipeline.
//!
//! Components never touch `std::fs` directly; they go through [`FileStore`] so the
//! existence checks, deletes and writes of one run all share a single policy:
//!
//! - **Restrictive permissions**: 0600 (owner read/write only) on Unix
//! - **Atomic writes**: data lands in a temporary file in the target directory
//!   and is renamed into place, so a reader never sees a half-written PEM file
//! - **Directory creation**: parent directories are created on demand
//!
//! Overwrite is still delete-then-write at the pipeline level. A crash between the
//! delete and the rename leaves no artifact at that path.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{CertError, Result};

/// Persistence capability consumed by the key store, CSR issuer and signer.
pub trait FileStore {
    fn exists(&self, path: &Path) -> bool;

    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write `data` to `path`, replacing any existing file.
    fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    fn delete(&self, path: &Path) -> Result<()>;

    /// Make sure the parent directory of `path` exists.
    fn ensure_dir(&self, path: &Path) -> Result<()>;
}

/// Local-disk [`FileStore`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskStore;

impl DiskStore {
    pub fn new() -> Self {
        DiskStore
    }
}

impl FileStore for DiskStore {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| CertError::file_io("failed to read file", path, e))
    }

    fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let dir = parent_dir(path);
        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|e| CertError::file_io("failed to create file", path, e))?;
        tmp.write_all(data)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| CertError::file_io("failed to write file", path, e))?;

        // Set restrictive permissions (Unix only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))
                .map_err(|e| CertError::file_io("failed to set permissions", path, e))?;
        }

        tmp.persist(path)
            .map_err(|e| CertError::file_io("failed to write file", path, e.error))?;
        debug!(path = %path.display(), bytes = data.len(), "file written");
        Ok(())
    }

    fn delete(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).map_err(|e| CertError::file_io("failed to delete file", path, e))
    }

    fn ensure_dir(&self, path: &Path) -> Result<()> {
        let dir = parent_dir(path);
        if dir.exists() {
            return Ok(());
        }
        warn!(dir = %dir.display(), "directory does not exist, creating");
        fs::create_dir_all(dir)
            .map_err(|e| CertError::file_io("failed to create directory", dir, e))?;
        info!(dir = %dir.display(), "directory created");
        Ok(())
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, IoFailure};
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_file_with_owner_only_permissions() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/key.pem");
        let store = DiskStore::new();

        store.ensure_dir(&path).unwrap();
        store.write(&path, b"data").unwrap();

        assert!(store.exists(&path));
        assert_eq!(store.read(&path).unwrap(), b"data");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_write_replaces_existing_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cert.pem");
        let store = DiskStore::new();

        store.write(&path, b"first").unwrap();
        store.write(&path, b"second").unwrap();
        assert_eq!(store.read(&path).unwrap(), b"second");
    }

    #[test]
    fn test_missing_file_reports_not_found() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("absent.pem");
        let store = DiskStore::new();

        let err = store.read(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileIo);
        assert!(matches!(
            err,
            CertError::FileIo {
                failure: IoFailure::NotFound,
                ..
            }
        ));

        let err = store.delete(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileIo);
    }
}
