//! Error taxonomy shared by issuance and trust-list synchronization.

use thiserror::Error;

/// Errors raised by the PKI core
#[derive(Error, Debug)]
pub enum PkiError {
    /// Target artifact already holds content; issuance refuses to overwrite it
    #[error("Artifact already exists: {0}")]
    AlreadyExists(String),

    /// Expected key, certificate or file is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unknown trust list, signing key / certificate mismatch, invalid template
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key generation, signing or encoding failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Malformed certificate, key, XML or base64
    #[error("Parse error: {0}")]
    Parse(String),

    /// Fetch timeout, non-2xx status or container extraction failure
    #[error("Network error: {0}")]
    Network(String),

    /// Trust-store repository failure
    #[error("Trust store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PkiError {
    /// True when the error means "the artifact is absent", the only condition
    /// under which chain resolution may fall back to a weaker candidate.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PkiError::NotFound(_))
    }
}

impl From<serde_json::Error> for PkiError {
    fn from(err: serde_json::Error) -> Self {
        PkiError::Store(format!("Serialization error: {}", err))
    }
}

/// Result alias using [`PkiError`]
pub type Result<T> = std::result::Result<T, PkiError>;
