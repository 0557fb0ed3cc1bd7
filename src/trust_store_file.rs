//! JSON-file backed trust store
//!
//! The whole store is one JSON document. Every mutation rewrites it into a
//! temporary file in the same directory and renames it over the old one, so a
//! crash or a concurrent reader sees either the previous or the next state.

use crate::error::{PkiError, Result};
use crate::trust_store::{TrustEntry, TrustLists, TrustStore};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockWriteGuard};
use tempfile::NamedTempFile;
use tracing::{debug, info};

#[derive(Debug)]
pub struct FileTrustStore {
    path: PathBuf,
    inner: RwLock<TrustLists>,
}

impl FileTrustStore {
    /// Open the store at `path`, starting empty when the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let lists = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                PkiError::Store(format!("Failed to parse trust store {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => TrustLists::default(),
            Err(e) => return Err(PkiError::Io(e)),
        };
        debug!(path = %path.display(), lists = lists.lists.len(), "Opened trust store");

        Ok(Self {
            path,
            inner: RwLock::new(lists),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy of the current state, persist it, then publish it
    fn update<T>(&self, change: impl FnOnce(&mut TrustLists) -> Result<T>) -> Result<T> {
        let mut guard = self.write()?;
        let mut next = guard.clone();
        let out = change(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(out)
    }

    fn persist(&self, lists: &TrustLists) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let json = serde_json::to_vec_pretty(lists)?;
        let mut temp = NamedTempFile::new_in(&dir)?;
        temp.write_all(&json)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path)
            .map_err(|e| PkiError::Store(format!("Failed to replace {}: {}", self.path.display(), e)))?;
        Ok(())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, TrustLists>> {
        self.inner
            .write()
            .map_err(|_| PkiError::Store("Trust store lock poisoned".to_string()))
    }

    fn snapshot(&self) -> Result<TrustLists> {
        self.inner
            .read()
            .map(|lists| lists.clone())
            .map_err(|_| PkiError::Store("Trust store lock poisoned".to_string()))
    }
}

impl TrustStore for FileTrustStore {
    fn last_refresh(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.snapshot()?.last_refresh())
    }

    fn delete_entries(&self, list: &str) -> Result<usize> {
        self.update(|lists| Ok(lists.delete(list)))
    }

    fn insert_entries(&self, list: &str, entries: &[TrustEntry]) -> Result<()> {
        self.update(|lists| lists.insert(list, entries, Utc::now()))
    }

    fn replace_entries(&self, list: &str, entries: Vec<TrustEntry>) -> Result<()> {
        let count = entries.len();
        self.update(|lists| lists.replace(list, entries, Utc::now()))?;
        debug!(list, count, path = %self.path.display(), "Persisted trust list");
        Ok(())
    }

    fn entries(&self, list: &str) -> Result<Vec<TrustEntry>> {
        Ok(self.snapshot()?.entries(list))
    }

    fn find_by_ski(&self, ski: &str) -> Result<Option<TrustEntry>> {
        Ok(self.snapshot()?.find_by_ski(ski))
    }

    fn clear_external(&self) -> Result<usize> {
        let removed = self.update(|lists| Ok(lists.clear_external()))?;
        info!(removed, "Cleared external trust lists");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust_store::tests::entry;

    #[test]
    fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/trust_list.json");

        let store = FileTrustStore::open(&path).unwrap();
        store
            .replace_entries("tl12", vec![entry("tl12", "Anchor", "AA", "0102")])
            .unwrap();
        let refreshed = store.last_refresh().unwrap();
        drop(store);

        let reopened = FileTrustStore::open(&path).unwrap();
        assert_eq!(reopened.entries("tl12").unwrap()[0].name, "Anchor");
        assert_eq!(reopened.last_refresh().unwrap(), refreshed);
        assert!(reopened.find_by_ski("0102").unwrap().is_some());
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTrustStore::open(dir.path().join("absent.json")).unwrap();
        assert_eq!(store.last_refresh().unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trust.json");
        fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(FileTrustStore::open(&path), Err(PkiError::Store(_))));
    }

    #[test]
    fn test_rejected_change_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trust.json");
        let store = FileTrustStore::open(&path).unwrap();
        store
            .replace_entries("tl12", vec![entry("tl12", "Keep", "01", "")])
            .unwrap();

        assert!(store
            .replace_entries("tl12", vec![entry("other", "Bad", "02", "")])
            .is_err());
        assert_eq!(store.entries("tl12").unwrap()[0].name, "Keep");
        assert_eq!(FileTrustStore::open(&path).unwrap().entries("tl12").unwrap().len(), 1);
    }
}
