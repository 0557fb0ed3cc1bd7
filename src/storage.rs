//! Write-once artifact storage
//!
//! Keys, certificates and CRLs are persisted once and read many times. The
//! [`ArtifactStore`] trait is the only way issuance touches persistence, so the
//! pipeline and the chain resolver can run against [`MemoryArtifactStore`] in
//! tests and against [`FileArtifactStore`] in production.

use crate::error::{PkiError, Result};
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// Owner read/write, group read
const ARTIFACT_FILE_MODE: u32 = 0o640;

/// Persistence capability for issuance artifacts
pub trait ArtifactStore: Send + Sync {
    /// Read an artifact. Absent artifacts yield [`PkiError::NotFound`].
    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Persist `data` unless `path` already exists, in which case
    /// [`PkiError::AlreadyExists`] is returned and nothing is written.
    fn write_if_absent(&self, path: &Path, data: &[u8]) -> Result<()>;

    fn exists(&self, path: &Path) -> Result<bool>;
}

/// Artifacts stored as files below a base directory
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    base_dir: PathBuf,
}

impl FileArtifactStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn full_path(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }
}

impl ArtifactStore for FileArtifactStore {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let full = self.full_path(path);
        fs::read(&full).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PkiError::NotFound(full.display().to_string()),
            _ => PkiError::Io(e),
        })
    }

    fn write_if_absent(&self, path: &Path, data: &[u8]) -> Result<()> {
        let full = self.full_path(path);
        let parent = match full.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;
        if full.exists() {
            return Err(PkiError::AlreadyExists(full.display().to_string()));
        }

        // Staged in the target directory, published without clobbering
        let mut staged = NamedTempFile::new_in(&parent)?;
        staged.write_all(data)?;
        staged.as_file().sync_all()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(staged.path(), fs::Permissions::from_mode(ARTIFACT_FILE_MODE))?;
        }

        staged.persist_noclobber(&full).map_err(|e| match e.error.kind() {
            ErrorKind::AlreadyExists => PkiError::AlreadyExists(full.display().to_string()),
            _ => PkiError::Io(e.error),
        })?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        match fs::metadata(self.full_path(path)) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PkiError::Io(e)),
        }
    }
}

/// In-memory artifact store. Data is lost on drop.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace or create an artifact unconditionally. Used to stage corrupt or
    /// pre-existing content.
    pub fn put(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        self.lock().insert(path.into(), data.into());
    }

    pub fn remove(&self, path: &Path) -> Option<Vec<u8>> {
        self.lock().remove(path)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Vec<u8>>> {
        // A poisoned map is still a consistent map: every mutation is a single insert/remove
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.lock()
            .get(path)
            .cloned()
            .ok_or_else(|| PkiError::NotFound(path.display().to_string()))
    }

    fn write_if_absent(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut files = self.lock();
        if files.contains_key(path) {
            return Err(PkiError::AlreadyExists(path.display().to_string()));
        }
        files.insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.lock().contains_key(path))
    }
}
