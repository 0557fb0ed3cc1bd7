//! Trust-list synchronization
//!
//! One update:
//!
//! 1. skip entirely when the store was refreshed less than
//!    `update_frequency` days ago
//! 2. resolve every configured list id (unknown id aborts before any fetch)
//! 3. per list: fetch the container, extract `SecuritySettings.xml`, stage it
//!    in the scratch directory, parse it and atomically replace the list
//!
//! Updates never overlap; a second caller waits for the running one.

use crate::configs::TrustConfig;
use crate::container::{self, SECURITY_SETTINGS_FILE};
use crate::error::{PkiError, Result};
use crate::fetch::TrustListFetcher;
use crate::security_settings;
use crate::trust_list_registry::{TrustListRegistry, TrustListSource};
use crate::trust_store::TrustStore;
use chrono::{DateTime, Utc};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Result of one [`TrustListSyncer::update`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The store is fresh enough; nothing was fetched
    Skipped { days_elapsed: i64 },
    /// Every configured list was refreshed, in order
    Refreshed(Vec<ListReport>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListReport {
    pub list: String,
    pub imported: usize,
    pub skipped: usize,
}

/// Whole days between two instants, truncated toward zero
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_hours() / 24
}

pub struct TrustListSyncer {
    registry: Arc<TrustListRegistry>,
    store: Arc<dyn TrustStore>,
    fetcher: Arc<dyn TrustListFetcher>,
    scratch_dir: PathBuf,
    running: Mutex<()>,
}

impl TrustListSyncer {
    pub fn new(
        registry: Arc<TrustListRegistry>,
        store: Arc<dyn TrustStore>,
        fetcher: Arc<dyn TrustListFetcher>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            store,
            fetcher,
            scratch_dir: scratch_dir.into(),
            running: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn TrustStore> {
        &self.store
    }

    pub fn update(&self, config: &TrustConfig) -> Result<SyncOutcome> {
        self.update_at(config, Utc::now())
    }

    /// Run an update as if the current time were `now`
    pub fn update_at(&self, config: &TrustConfig, now: DateTime<Utc>) -> Result<SyncOutcome> {
        let _running = self
            .running
            .lock()
            .map_err(|_| PkiError::Store("Trust list update lock poisoned".to_string()))?;

        if let Some(last) = self.store.last_refresh()? {
            let days_elapsed = days_between(last, now);
            if days_elapsed < config.update_frequency {
                debug!(
                    days_elapsed,
                    update_frequency = config.update_frequency,
                    "Trust lists are fresh, skipping update"
                );
                return Ok(SyncOutcome::Skipped { days_elapsed });
            }
        }

        let sources = config
            .list
            .iter()
            .map(|id| self.registry.resolve(id))
            .collect::<Result<Vec<&TrustListSource>>>()?;

        info!(lists = sources.len(), "Updating trusted certificate lists");
        let mut reports = Vec::with_capacity(sources.len());
        for source in sources {
            reports.push(self.sync_list(source)?);
        }
        Ok(SyncOutcome::Refreshed(reports))
    }

    fn sync_list(&self, source: &TrustListSource) -> Result<ListReport> {
        debug!(list = %source.id, url = %source.url, "Fetching trust list");
        let payload = self.fetcher.fetch(&source.url)?;
        let xml = container::extract_embedded_file(&payload, SECURITY_SETTINGS_FILE)?;
        let xml = self.stage(&xml)?;

        let settings = security_settings::parse(&xml)?;
        let parsed = security_settings::to_entries(&source.id, &settings)?;
        let report = ListReport {
            list: source.id.clone(),
            imported: parsed.entries.len(),
            skipped: parsed.skipped,
        };

        self.store.replace_entries(&source.id, parsed.entries)?;
        info!(
            list = %source.id,
            name = %source.name,
            imported = report.imported,
            skipped = report.skipped,
            duplicates = parsed.duplicates,
            "Trust list updated"
        );
        Ok(report)
    }

    /// Write the extracted document to a scratch file and read it back. The
    /// file is removed when this returns.
    fn stage(&self, xml: &[u8]) -> Result<Vec<u8>> {
        fs::create_dir_all(&self.scratch_dir)?;
        let mut scratch = tempfile::Builder::new()
            .prefix("SecuritySettings")
            .suffix(".xml")
            .tempfile_in(&self.scratch_dir)?;
        scratch.write_all(xml)?;
        scratch.flush()?;
        Ok(fs::read(scratch.path())?)
    }
}

impl std::fmt::Debug for TrustListSyncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustListSyncer")
            .field("lists", &self.registry.ids().collect::<Vec<_>>())
            .field("store", &self.store)
            .field("scratch_dir", &self.scratch_dir)
            .finish()
    }
}
