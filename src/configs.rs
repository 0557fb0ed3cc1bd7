//! Application configuration
//!
//! One TOML file drives both halves of the tool. Every field has a serde
//! default, so an empty or missing file yields a working configuration:
//!
//! - `[artifacts]`: output directory and file names
//! - `[ca.root]`, `[ca.intermediate]`, `[ca.leaf]`: subject fields and validity
//! - `[crl]`: CRL validity
//! - `[trust]`: which lists to mirror, how often, and where to keep them

use crate::certificate_issuer::SubjectName;
use crate::trust_list_registry::TrustListSource;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub artifacts: ArtifactPaths,
    #[serde(default)]
    pub ca: CaProfiles,
    #[serde(default)]
    pub crl: CrlConfig,
    #[serde(default)]
    pub trust: TrustConfig,
}

/// Locations of the persisted issuance artifacts. File names are relative to
/// `directory`.
#[derive(Debug, Deserialize, Clone)]
pub struct ArtifactPaths {
    #[serde(default = "default_artifact_dir")]
    pub directory: PathBuf,
    #[serde(default = "default_root_key")]
    pub root_key: PathBuf,
    #[serde(default = "default_root_cert")]
    pub root_cert: PathBuf,
    #[serde(default = "default_root_crl")]
    pub root_crl: PathBuf,
    #[serde(default = "default_intermediate_key")]
    pub intermediate_key: PathBuf,
    #[serde(default = "default_intermediate_cert")]
    pub intermediate_cert: PathBuf,
    #[serde(default = "default_leaf_key")]
    pub leaf_key: PathBuf,
    #[serde(default = "default_leaf_cert")]
    pub leaf_cert: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            directory: default_artifact_dir(),
            root_key: default_root_key(),
            root_cert: default_root_cert(),
            root_crl: default_root_crl(),
            intermediate_key: default_intermediate_key(),
            intermediate_cert: default_intermediate_cert(),
            leaf_key: default_leaf_key(),
            leaf_cert: default_leaf_cert(),
        }
    }
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("ca")
}

fn default_root_key() -> PathBuf {
    PathBuf::from("ca-key.pem")
}

fn default_root_cert() -> PathBuf {
    PathBuf::from("ca-cert.pem")
}

fn default_root_crl() -> PathBuf {
    PathBuf::from("ca-crl.pem")
}

fn default_intermediate_key() -> PathBuf {
    PathBuf::from("ca-intermediate-key.pem")
}

fn default_intermediate_cert() -> PathBuf {
    PathBuf::from("ca-intermediate-cert.pem")
}

fn default_leaf_key() -> PathBuf {
    PathBuf::from("user-key.pem")
}

fn default_leaf_cert() -> PathBuf {
    PathBuf::from("user-cert.pem")
}

/// Subject and lifetime of each level of the hierarchy
#[derive(Debug, Deserialize, Clone)]
pub struct CaProfiles {
    #[serde(default = "default_root_profile")]
    pub root: CertificateProfile,
    #[serde(default = "default_intermediate_profile")]
    pub intermediate: CertificateProfile,
    #[serde(default = "default_leaf_profile")]
    pub leaf: CertificateProfile,
}

impl Default for CaProfiles {
    fn default() -> Self {
        Self {
            root: default_root_profile(),
            intermediate: default_intermediate_profile(),
            leaf: default_leaf_profile(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CertificateProfile {
    pub common_name: String,
    #[serde(default = "default_organization")]
    pub organization: Option<String>,
    #[serde(default)]
    pub organizational_unit: Option<String>,
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default = "default_country")]
    pub country: Option<String>,
    pub validity_days: u32,
    /// Only consulted for the intermediate level
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl CertificateProfile {
    pub fn subject(&self) -> SubjectName {
        SubjectName {
            common_name: self.common_name.clone(),
            organization: self.organization.clone(),
            organizational_unit: self.organizational_unit.clone(),
            locality: self.locality.clone(),
            state: self.state.clone(),
            country: self.country.clone(),
        }
    }

    fn with(common_name: &str, validity_days: u32) -> Self {
        Self {
            common_name: common_name.to_string(),
            organization: default_organization(),
            organizational_unit: None,
            locality: None,
            state: None,
            country: default_country(),
            validity_days,
            enabled: true,
        }
    }
}

fn default_organization() -> Option<String> {
    Some("docsign".to_string())
}

fn default_country() -> Option<String> {
    Some("US".to_string())
}

fn default_enabled() -> bool {
    true
}

fn default_root_profile() -> CertificateProfile {
    CertificateProfile::with("docsign Root CA", 7305) // 20 years
}

fn default_intermediate_profile() -> CertificateProfile {
    CertificateProfile::with("docsign Sub-CA", 3652) // 10 years
}

fn default_leaf_profile() -> CertificateProfile {
    CertificateProfile::with("docsign", 7)
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrlConfig {
    #[serde(default = "default_crl_validity")]
    pub validity_days: u32,
}

impl Default for CrlConfig {
    fn default() -> Self {
        Self {
            validity_days: default_crl_validity(),
        }
    }
}

fn default_crl_validity() -> u32 {
    7305
}

/// Trust-list synchronization settings
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct TrustConfig {
    /// Identifiers of the lists to mirror, processed in order
    #[serde(default = "default_trust_lists")]
    pub list: Vec<String>,
    /// Minimum age in days of the last refresh before the network is used again
    #[serde(default = "default_update_frequency", alias = "update-frequency-days")]
    pub update_frequency: i64,
    /// Period of the background refresh trigger
    #[serde(default = "default_refresh_interval_hours")]
    pub refresh_interval_hours: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    /// Where the extracted SecuritySettings.xml is staged while parsing
    #[serde(default = "std::env::temp_dir")]
    pub scratch_dir: PathBuf,
    /// Extra registry entries on top of the built-in lists
    #[serde(default)]
    pub sources: Vec<TrustListSource>,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            list: default_trust_lists(),
            update_frequency: default_update_frequency(),
            refresh_interval_hours: default_refresh_interval_hours(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            store_path: default_store_path(),
            scratch_dir: std::env::temp_dir(),
            sources: Vec::new(),
        }
    }
}

fn default_trust_lists() -> Vec<String> {
    vec!["eutl12".to_string(), "tl12".to_string()]
}

fn default_update_frequency() -> i64 {
    1
}

fn default_refresh_interval_hours() -> u64 {
    12
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/trust_list.json")
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(config_str).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to built-in defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}
