//! docsign-pki - certificate hierarchy and trust lists for document signing
//!
//! Two independent halves share one error type and one configuration file.
//!
//! # Issuance
//!
//! Bootstraps a local CA hierarchy and the signing certificate used to seal
//! documents:
//!
//! ```text
//! Root CA (self-signed, keyCertSign | cRLSign) ── root CRL
//!   └── Intermediate CA (optional, signed by Root)
//!       └── Leaf certificate (digitalSignature, signed by the nearest CA)
//! ```
//!
//! All keys are EC P-256, all signatures ECDSA-SHA256. Key identifiers are the
//! SHA-1 of the SubjectPublicKeyInfo, and every child's AuthorityKeyIdentifier
//! equals its signer's SubjectKeyIdentifier. Artifacts are written once through
//! an [`storage::ArtifactStore`] and never overwritten.
//!
//! ```no_run
//! use docsign_pki::configs::AppConfig;
//! use docsign_pki::issuance::IssuancePipeline;
//! use docsign_pki::storage::FileArtifactStore;
//! use std::sync::Arc;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = AppConfig::load_or_default("config.toml")?;
//! let store = Arc::new(FileArtifactStore::new(&config.artifacts.directory));
//! let report = IssuancePipeline::new(store, config.artifacts, config.ca, config.crl).run()?;
//! println!("Leaf signed by {:?}", report.leaf_signer);
//! # Ok(())
//! # }
//! ```
//!
//! # Trust-list synchronization
//!
//! Mirrors the Adobe-hosted trust lists (EUTL, AATL) into a local
//! [`trust_store::TrustStore`]. Each list is a PDF container with an embedded
//! `SecuritySettings.xml`; every trusted identity becomes one
//! [`trust_store::TrustEntry`]. Updates are skipped while the store is younger
//! than the configured number of days, and a [`refresh_scheduler`] re-runs them
//! in the background.
//!
//! ```no_run
//! use docsign_pki::configs::TrustConfig;
//! use docsign_pki::fetch::HttpFetcher;
//! use docsign_pki::trust_list_registry::TrustListRegistry;
//! use docsign_pki::trust_list_syncer::TrustListSyncer;
//! use docsign_pki::trust_store::MemoryTrustStore;
//! use std::sync::Arc;
//!
//! # fn example() -> docsign_pki::Result<()> {
//! let config = TrustConfig::default();
//! let syncer = TrustListSyncer::new(
//!     Arc::new(TrustListRegistry::with_defaults()),
//!     Arc::new(MemoryTrustStore::new()),
//!     Arc::new(HttpFetcher::new(config.fetch_timeout_secs)?),
//!     std::env::temp_dir(),
//! );
//! let outcome = syncer.update(&config)?;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```
//!
//! # Module Overview
//!
//! - [`key_material`], [`key_identifier`]: key generation, PEM, SKI/AKI derivation
//! - [`certificate`], [`certificate_issuer`]: X.509 wrapper and template-driven issuance
//! - [`chain_resolver`]: signer lookup with intermediate → root fallback
//! - [`crl_issuer`]: X.509 v2 CRL generation
//! - [`issuance`]: the end-to-end bootstrap pipeline
//! - [`trust_list_registry`], [`fetch`], [`container`], [`security_settings`]:
//!   where trust lists live and how they are decoded
//! - [`trust_store`], [`trust_store_file`]: repository of mirrored anchors
//! - [`trust_list_syncer`], [`refresh_scheduler`]: update logic and its timer

pub mod certificate;
pub mod certificate_issuer;
pub mod chain_resolver;
pub mod configs;
pub mod container;
pub mod crl_issuer;
pub mod error;
pub mod fetch;
pub mod issuance;
pub mod key_identifier;
pub mod key_material;
pub mod refresh_scheduler;
pub mod security_settings;
pub mod storage;
pub mod trust_list_registry;
pub mod trust_list_syncer;
pub mod trust_store;
pub mod trust_store_file;

pub use error::{PkiError, Result};
