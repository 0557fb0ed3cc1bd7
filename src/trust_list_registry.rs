use crate::error::{PkiError, Result};
use serde::{Deserialize, Serialize};

/// A remote trust list the syncer can mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustListSource {
    pub id: String,
    pub name: String,
    pub url: String,
}

impl TrustListSource {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Identifier of the list holding locally imported anchors. Never fetched and
/// never cleared by [`crate::trust_store::TrustStore::clear_external`].
pub const LOCAL_LIST: &str = "local";

/// Known trust-list sources keyed by identifier. Built once at startup, then
/// shared read-only.
#[derive(Debug, Clone, Default)]
pub struct TrustListRegistry {
    sources: Vec<TrustListSource>,
}

impl TrustListRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The Adobe-hosted European and Adobe Approved trust lists
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.sources.push(TrustListSource::new(
            "eutl12",
            "Europe",
            "https://trustlist.adobe.com/eutl12.acrobatsecuritysettings",
        ));
        registry.sources.push(TrustListSource::new(
            "tl12",
            "Adobe",
            "https://trustlist.adobe.com/tl12.acrobatsecuritysettings",
        ));
        registry
    }

    /// Add or replace a source. The URL must be absolute http(s).
    pub fn register(&mut self, source: TrustListSource) -> Result<()> {
        if source.id.is_empty() || source.id == LOCAL_LIST {
            return Err(PkiError::Config(format!(
                "Invalid trust list identifier: {:?}",
                source.id
            )));
        }
        let parsed = url::Url::parse(&source.url)
            .map_err(|e| PkiError::Config(format!("Invalid trust list URL {}: {}", source.url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PkiError::Config(format!(
                "Unsupported trust list URL scheme: {}",
                parsed.scheme()
            )));
        }

        match self.sources.iter_mut().find(|s| s.id == source.id) {
            Some(existing) => *existing = source,
            None => self.sources.push(source),
        }
        Ok(())
    }

    pub fn resolve(&self, id: &str) -> Result<&TrustListSource> {
        self.sources
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| PkiError::Config(format!("Unknown trust list: {}", id)))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.id.as_str())
    }
}
