//! X.509 certificate wrapper
//!
//! Thin layer over [`openssl::x509::X509`] exposing the identifiers the
//! hierarchy is linked by.

use crate::error::{PkiError, Result};
use openssl::nid::Nid;
use openssl::pkey::{PKey, Public};
use openssl::x509::{X509, X509Ref};

/// A signed X.509 certificate. Created once by the issuer, persisted as PEM
/// and read back by path when it is needed as a parent.
#[derive(Clone)]
pub struct Certificate {
    x509: X509,
}

impl Certificate {
    pub fn from_x509(x509: X509) -> Self {
        Self { x509 }
    }

    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let x509 = X509::from_pem(pem)
            .map_err(|e| PkiError::Parse(format!("Failed to parse certificate PEM: {}", e)))?;
        Ok(Self { x509 })
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        let x509 = X509::from_der(der)
            .map_err(|e| PkiError::Parse(format!("Failed to parse certificate DER: {}", e)))?;
        Ok(Self { x509 })
    }

    pub fn to_pem(&self) -> Result<Vec<u8>> {
        self.x509
            .to_pem()
            .map_err(|e| PkiError::Crypto(format!("Failed to encode certificate: {}", e)))
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.x509
            .to_der()
            .map_err(|e| PkiError::Crypto(format!("Failed to encode certificate: {}", e)))
    }

    pub fn x509(&self) -> &X509Ref {
        &self.x509
    }

    pub fn public_key(&self) -> Result<PKey<Public>> {
        self.x509
            .public_key()
            .map_err(|e| PkiError::Parse(format!("Failed to read certificate public key: {}", e)))
    }

    /// Embedded SubjectKeyIdentifier, if the certificate carries one
    pub fn subject_key_id(&self) -> Option<Vec<u8>> {
        self.x509.subject_key_id().map(|id| id.as_slice().to_vec())
    }

    /// Embedded AuthorityKeyIdentifier (keyIdentifier field), if present
    pub fn authority_key_id(&self) -> Option<Vec<u8>> {
        self.x509.authority_key_id().map(|id| id.as_slice().to_vec())
    }

    pub fn common_name(&self) -> Option<String> {
        self.x509
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .and_then(|entry| entry.data().as_utf8().ok())
            .map(|s| s.to_string())
    }

    pub fn subject_der(&self) -> Result<Vec<u8>> {
        self.x509
            .subject_name()
            .to_der()
            .map_err(|e| PkiError::Crypto(format!("Failed to encode subject name: {}", e)))
    }

    pub fn issuer_der(&self) -> Result<Vec<u8>> {
        self.x509
            .issuer_name()
            .to_der()
            .map_err(|e| PkiError::Crypto(format!("Failed to encode issuer name: {}", e)))
    }

    /// Whether the signature on this certificate verifies under `signer`'s key
    pub fn is_signed_by(&self, signer: &Certificate) -> Result<bool> {
        let key = signer.public_key()?;
        self.x509
            .verify(&key)
            .map_err(|e| PkiError::Crypto(format!("Failed to verify signature: {}", e)))
    }
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.common_name())
            .field("subject_key_id", &self.subject_key_id().map(hex::encode_upper))
            .finish()
    }
}
