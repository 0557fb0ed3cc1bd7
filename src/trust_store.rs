//! Trust-store repository
//!
//! Mirrored trust anchors are grouped by list identifier. Each list remembers
//! when it was last written; the oldest of those timestamps is the store's
//! "last refresh", which drives the syncer's staleness check.
//!
//! Readers must never observe a list halfway through a refresh, so
//! [`TrustStore::replace_entries`] is a single atomic operation in every
//! implementation.

use crate::error::{PkiError, Result};
use crate::trust_list_registry::LOCAL_LIST;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// One trusted certificate mirrored from a trust list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustEntry {
    /// Identifier of the list the entry came from
    pub list: String,
    /// Subject common name
    pub name: String,
    /// Upper-case hex SHA-1 of the certificate DER
    pub aki: String,
    /// Upper-case hex of the embedded SubjectKeyIdentifier, empty when absent
    pub ski: String,
}

/// Repository contract used by the syncer and by signature verification
pub trait TrustStore: Send + Sync + fmt::Debug {
    /// Oldest write time across all mirrored lists, `None` when nothing is stored
    fn last_refresh(&self) -> Result<Option<DateTime<Utc>>>;

    /// Remove every entry of `list`, returning how many were removed
    fn delete_entries(&self, list: &str) -> Result<usize>;

    /// Append entries to `list`
    fn insert_entries(&self, list: &str, entries: &[TrustEntry]) -> Result<()>;

    /// Atomically swap the content of `list` for `entries`
    fn replace_entries(&self, list: &str, entries: Vec<TrustEntry>) -> Result<()>;

    fn entries(&self, list: &str) -> Result<Vec<TrustEntry>>;

    /// First anchor whose SubjectKeyIdentifier equals `ski` (hex, any case)
    fn find_by_ski(&self, ski: &str) -> Result<Option<TrustEntry>>;

    /// Drop every list except the local one, returning the number of removed entries
    fn clear_external(&self) -> Result<usize>;
}

/// Rows of one list with the time they were written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ListRows {
    pub refreshed_at: DateTime<Utc>,
    pub entries: Vec<TrustEntry>,
}

/// Plain data behind every store implementation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct TrustLists {
    pub lists: BTreeMap<String, ListRows>,
}

impl TrustLists {
    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.lists
            .iter()
            .filter(|(id, rows)| id.as_str() != LOCAL_LIST && !rows.entries.is_empty())
            .map(|(_, rows)| rows.refreshed_at)
            .min()
    }

    pub fn delete(&mut self, list: &str) -> usize {
        self.lists
            .remove(list)
            .map(|rows| rows.entries.len())
            .unwrap_or(0)
    }

    pub fn insert(&mut self, list: &str, entries: &[TrustEntry], now: DateTime<Utc>) -> Result<()> {
        check_list_field(list, entries)?;
        let rows = self.lists.entry(list.to_string()).or_insert_with(|| ListRows {
            refreshed_at: now,
            entries: Vec::new(),
        });
        if rows.entries.is_empty() {
            rows.refreshed_at = now;
        }
        rows.entries.extend_from_slice(entries);
        Ok(())
    }

    pub fn replace(&mut self, list: &str, entries: Vec<TrustEntry>, now: DateTime<Utc>) -> Result<()> {
        check_list_field(list, &entries)?;
        self.lists.insert(
            list.to_string(),
            ListRows {
                refreshed_at: now,
                entries,
            },
        );
        Ok(())
    }

    pub fn entries(&self, list: &str) -> Vec<TrustEntry> {
        self.lists
            .get(list)
            .map(|rows| rows.entries.clone())
            .unwrap_or_default()
    }

    pub fn find_by_ski(&self, ski: &str) -> Option<TrustEntry> {
        if ski.is_empty() {
            return None;
        }
        self.lists
            .values()
            .flat_map(|rows| rows.entries.iter())
            .find(|entry| entry.ski.eq_ignore_ascii_case(ski))
            .cloned()
    }

    pub fn clear_external(&mut self) -> usize {
        let mut removed = 0;
        self.lists.retain(|id, rows| {
            let keep = id == LOCAL_LIST;
            if !keep {
                removed += rows.entries.len();
            }
            keep
        });
        removed
    }
}

fn check_list_field(list: &str, entries: &[TrustEntry]) -> Result<()> {
    match entries.iter().find(|entry| entry.list != list) {
        Some(entry) => Err(PkiError::Store(format!(
            "Entry {} belongs to list {}, not {}",
            entry.aki, entry.list, list
        ))),
        None => Ok(()),
    }
}

/// Trust store held in memory for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryTrustStore {
    inner: RwLock<TrustLists>,
}

impl MemoryTrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `entries` with an explicit timestamp
    pub fn seed(&self, list: &str, entries: Vec<TrustEntry>, refreshed_at: DateTime<Utc>) -> Result<()> {
        self.write()?.replace(list, entries, refreshed_at)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, TrustLists>> {
        self.inner
            .read()
            .map_err(|_| PkiError::Store("Trust store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, TrustLists>> {
        self.inner
            .write()
            .map_err(|_| PkiError::Store("Trust store lock poisoned".to_string()))
    }
}

impl TrustStore for MemoryTrustStore {
    fn last_refresh(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.read()?.last_refresh())
    }

    fn delete_entries(&self, list: &str) -> Result<usize> {
        let removed = self.write()?.delete(list);
        debug!(list, removed, "Deleted trust entries");
        Ok(removed)
    }

    fn insert_entries(&self, list: &str, entries: &[TrustEntry]) -> Result<()> {
        self.write()?.insert(list, entries, Utc::now())?;
        debug!(list, inserted = entries.len(), "Inserted trust entries");
        Ok(())
    }

    fn replace_entries(&self, list: &str, entries: Vec<TrustEntry>) -> Result<()> {
        let count = entries.len();
        self.write()?.replace(list, entries, Utc::now())?;
        debug!(list, count, "Replaced trust entries");
        Ok(())
    }

    fn entries(&self, list: &str) -> Result<Vec<TrustEntry>> {
        Ok(self.read()?.entries(list))
    }

    fn find_by_ski(&self, ski: &str) -> Result<Option<TrustEntry>> {
        Ok(self.read()?.find_by_ski(ski))
    }

    fn clear_external(&self) -> Result<usize> {
        let removed = self.write()?.clear_external();
        info!(removed, "Cleared external trust lists");
        Ok(removed)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    pub(crate) fn entry(list: &str, name: &str, aki: &str, ski: &str) -> TrustEntry {
        TrustEntry {
            list: list.to_string(),
            name: name.to_string(),
            aki: aki.to_string(),
            ski: ski.to_string(),
        }
    }

    #[test]
    fn test_empty_store_has_no_refresh() {
        let store = MemoryTrustStore::new();
        assert_eq!(store.last_refresh().unwrap(), None);
        assert!(store.entries("tl12").unwrap().is_empty());
    }

    #[test]
    fn test_last_refresh_is_oldest_list() {
        let store = MemoryTrustStore::new();
        let older = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let newer = older + Duration::days(3);
        store.seed("tl12", vec![entry("tl12", "A", "AA", "01")], newer).unwrap();
        store.seed("eutl12", vec![entry("eutl12", "B", "BB", "02")], older).unwrap();

        assert_eq!(store.last_refresh().unwrap(), Some(older));
    }

    #[test]
    fn test_local_list_does_not_count_as_refresh() {
        let store = MemoryTrustStore::new();
        let at = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        store.seed(LOCAL_LIST, vec![entry(LOCAL_LIST, "L", "CC", "03")], at).unwrap();
        assert_eq!(store.last_refresh().unwrap(), None);
    }

    #[test]
    fn test_replace_swaps_list_content() {
        let store = MemoryTrustStore::new();
        store
            .insert_entries("tl12", &[entry("tl12", "Old", "01", ""), entry("tl12", "Old2", "02", "")])
            .unwrap();
        store
            .replace_entries("tl12", vec![entry("tl12", "New", "03", "")])
            .unwrap();

        let entries = store.entries("tl12").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "New");
    }

    #[test]
    fn test_entry_for_other_list_is_rejected() {
        let store = MemoryTrustStore::new();
        let err = store
            .replace_entries("tl12", vec![entry("eutl12", "X", "01", "")])
            .unwrap_err();
        assert!(matches!(err, PkiError::Store(_)));
    }

    #[test]
    fn test_delete_then_insert() {
        let store = MemoryTrustStore::new();
        store.insert_entries("tl12", &[entry("tl12", "A", "01", "")]).unwrap();
        assert_eq!(store.delete_entries("tl12").unwrap(), 1);
        assert_eq!(store.delete_entries("tl12").unwrap(), 0);
        store.insert_entries("tl12", &[entry("tl12", "B", "02", "")]).unwrap();
        assert_eq!(store.entries("tl12").unwrap()[0].name, "B");
    }

    #[test]
    fn test_find_by_ski_ignores_case_and_empty() {
        let store = MemoryTrustStore::new();
        store
            .insert_entries("tl12", &[entry("tl12", "NoSki", "01", ""), entry("tl12", "Anchor", "02", "ABCDEF")])
            .unwrap();

        assert_eq!(store.find_by_ski("abcdef").unwrap().unwrap().name, "Anchor");
        assert!(store.find_by_ski("").unwrap().is_none());
        assert!(store.find_by_ski("FFFF").unwrap().is_none());
    }

    #[test]
    fn test_clear_external_keeps_local() {
        let store = MemoryTrustStore::new();
        store.insert_entries("tl12", &[entry("tl12", "A", "01", "")]).unwrap();
        store.insert_entries("eutl12", &[entry("eutl12", "B", "02", "")]).unwrap();
        store.insert_entries(LOCAL_LIST, &[entry(LOCAL_LIST, "C", "03", "")]).unwrap();

        assert_eq!(store.clear_external().unwrap(), 2);
        assert!(store.entries("tl12").unwrap().is_empty());
        assert_eq!(store.entries(LOCAL_LIST).unwrap().len(), 1);
    }
}
