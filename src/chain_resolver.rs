//! Signing-pair resolution with ordered fallback
//!
//! A new certificate is signed by the CA nearest to the leaf that is actually
//! present. Candidates are probed in order; each probe yields a [`Resolution`]:
//!
//! - `Found`    → stop, sign with this pair
//! - `NotFound` → the artifact is absent, try the next candidate
//! - `Error`    → the artifact exists but is unusable, abort
//!
//! A corrupt intermediate never silently degrades to the root.

use crate::certificate::Certificate;
use crate::configs::ArtifactPaths;
use crate::error::{PkiError, Result};
use crate::key_material::KeyPair;
use crate::storage::ArtifactStore;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainLevel {
    Root,
    Intermediate,
}

/// Level of the certificate about to be issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueLevel {
    Intermediate,
    Leaf,
}

/// One place a signing key and certificate may live
#[derive(Debug, Clone)]
pub struct Candidate {
    pub level: ChainLevel,
    pub key_path: PathBuf,
    pub cert_path: PathBuf,
}

/// A loaded CA key with its certificate
#[derive(Debug, Clone)]
pub struct SigningPair {
    pub level: ChainLevel,
    pub key: KeyPair,
    pub certificate: Certificate,
}

#[derive(Debug)]
pub enum Resolution {
    Found(SigningPair),
    NotFound,
    Error(PkiError),
}

/// Candidates for signing a certificate at `level`, nearest-to-leaf first
pub fn candidates_for(paths: &ArtifactPaths, level: IssueLevel) -> Vec<Candidate> {
    let root = Candidate {
        level: ChainLevel::Root,
        key_path: paths.root_key.clone(),
        cert_path: paths.root_cert.clone(),
    };
    match level {
        IssueLevel::Intermediate => vec![root],
        IssueLevel::Leaf => vec![
            Candidate {
                level: ChainLevel::Intermediate,
                key_path: paths.intermediate_key.clone(),
                cert_path: paths.intermediate_cert.clone(),
            },
            root,
        ],
    }
}

/// Try to load both halves of one candidate
pub fn probe(store: &dyn ArtifactStore, candidate: &Candidate) -> Resolution {
    let key = match store.read(&candidate.key_path) {
        Ok(pem) => String::from_utf8(pem)
            .map_err(|e| PkiError::Parse(format!("Private key is not UTF-8 PEM: {}", e)))
            .and_then(|text| KeyPair::decode(&text)),
        Err(e) => Err(e),
    };
    let certificate = store
        .read(&candidate.cert_path)
        .and_then(|pem| Certificate::from_pem(&pem));

    match (key, certificate) {
        (Ok(key), Ok(certificate)) => Resolution::Found(SigningPair {
            level: candidate.level,
            key,
            certificate,
        }),
        // Corruption on either side wins over absence on the other
        (Err(e), _) | (_, Err(e)) if !e.is_not_found() => Resolution::Error(e),
        _ => Resolution::NotFound,
    }
}

/// Fold probe results in order. Consumes the iterator lazily, so nothing past
/// the first `Found` or `Error` is evaluated.
pub fn select<I>(resolutions: I) -> Result<SigningPair>
where
    I: IntoIterator<Item = Resolution>,
{
    for resolution in resolutions {
        match resolution {
            Resolution::Found(pair) => return Ok(pair),
            Resolution::NotFound => continue,
            Resolution::Error(e) => return Err(e),
        }
    }
    Err(PkiError::NotFound(
        "No signing key/certificate pair available".to_string(),
    ))
}

pub fn resolve(store: &dyn ArtifactStore, candidates: &[Candidate]) -> Result<SigningPair> {
    let pair = select(candidates.iter().map(|candidate| {
        let resolution = probe(store, candidate);
        debug!(
            level = ?candidate.level,
            key = %candidate.key_path.display(),
            found = matches!(resolution, Resolution::Found(_)),
            "Probed signing candidate"
        );
        resolution
    }))?;
    Ok(pair)
}
