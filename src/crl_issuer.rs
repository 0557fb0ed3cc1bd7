//! Certificate revocation list issuance
//!
//! The openssl crate can parse and verify CRLs but cannot build them. The
//! TBSCertList is assembled from `x509-cert` types, encoded with `der`, signed
//! with the CA key through [`openssl::sign::Signer`] and re-parsed by
//! [`X509Crl`] before it is handed back.

use crate::certificate::Certificate;
use crate::error::{PkiError, Result};
use crate::key_material::KeyPair;
use chrono::{DateTime, Utc};
use der::asn1::{Any, BitString, GeneralizedTime, ObjectIdentifier, OctetString, Uint, UtcTime};
use der::oid::AssociatedOid;
use der::pem::LineEnding;
use der::{Decode, Encode};
use openssl::hash::MessageDigest;
use openssl::pkey::Id;
use openssl::sign::Signer;
use openssl::x509::X509Crl;
use spki::AlgorithmIdentifierOwned;
use std::time::Duration;
use tracing::debug;
use x509_cert::crl::{CertificateList, RevokedCert, TbsCertList};
use x509_cert::ext::pkix::{AuthorityKeyIdentifier, CrlNumber};
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Time;
use x509_cert::Version;

const PEM_LABEL: &str = "X509 CRL";
const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");

/// One entry of the revokedCertificates list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokedCertificate {
    /// Big-endian serial number of the revoked certificate
    pub serial: Vec<u8>,
    pub revoked_at: DateTime<Utc>,
}

/// A signed X.509 v2 CRL
#[derive(Debug, Clone)]
pub struct RevocationList {
    der: Vec<u8>,
    pub this_update: DateTime<Utc>,
    pub next_update: DateTime<Utc>,
    pub crl_number: u64,
    pub revoked: Vec<RevokedCertificate>,
}

impl RevocationList {
    pub fn to_der(&self) -> &[u8] {
        &self.der
    }

    pub fn to_pem(&self) -> Result<Vec<u8>> {
        der::pem::encode_string(PEM_LABEL, LineEnding::LF, &self.der)
            .map(String::into_bytes)
            .map_err(|e| PkiError::Crypto(format!("Failed to encode CRL as PEM: {}", e)))
    }

    /// Parse the encoded list back through openssl
    pub fn to_x509_crl(&self) -> Result<X509Crl> {
        X509Crl::from_der(&self.der)
            .map_err(|e| PkiError::Parse(format!("Failed to parse CRL: {}", e)))
    }
}

/// Issue a CRL for `ca_cert`, signed by `ca_key`, valid until `next_update`
pub fn issue_crl(
    ca_key: &KeyPair,
    ca_cert: &Certificate,
    revoked: &[RevokedCertificate],
    next_update: DateTime<Utc>,
) -> Result<RevocationList> {
    issue_crl_at(ca_key, ca_cert, revoked, Utc::now(), next_update)
}

pub(crate) fn issue_crl_at(
    ca_key: &KeyPair,
    ca_cert: &Certificate,
    revoked: &[RevokedCertificate],
    this_update: DateTime<Utc>,
    next_update: DateTime<Utc>,
) -> Result<RevocationList> {
    if !ca_key.matches_certificate(ca_cert)? {
        return Err(PkiError::Config(format!(
            "CRL signing key does not match CA certificate {:?}",
            ca_cert.common_name()
        )));
    }
    if next_update <= this_update {
        return Err(PkiError::Config(format!(
            "CRL nextUpdate {} is not after thisUpdate {}",
            next_update, this_update
        )));
    }

    let algorithm = signature_algorithm(ca_key)?;
    // The CA subject is the issuer of every CRL it signs
    let issuer = Name::from_der(&ca_cert.subject_der()?)
        .map_err(|e| PkiError::Parse(format!("Failed to decode CA subject: {}", e)))?;
    let authority_key_id = match ca_cert.subject_key_id() {
        Some(id) => id,
        None => crate::key_identifier::derive(ca_key.pkey())?.to_vec(),
    };
    let crl_number = this_update.timestamp().max(0) as u64;

    let revoked_certificates = revoked
        .iter()
        .map(|entry| {
            Ok(RevokedCert {
                serial_number: serial_number(&entry.serial)?,
                revocation_date: asn1_time(&entry.revoked_at)?,
                crl_entry_extensions: None,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let tbs_cert_list = TbsCertList {
        version: Version::V2,
        signature: algorithm.clone(),
        issuer,
        this_update: asn1_time(&this_update)?,
        next_update: Some(asn1_time(&next_update)?),
        // An empty revokedCertificates list is omitted, not encoded as an empty SEQUENCE
        revoked_certificates: (!revoked_certificates.is_empty()).then_some(revoked_certificates),
        crl_extensions: Some(vec![
            extension(
                AuthorityKeyIdentifier::OID,
                crate::key_identifier::authority_extension_value(&authority_key_id)?,
            )?,
            extension(
                CrlNumber::OID,
                CrlNumber(
                    Uint::new(serial_number(&crl_number.to_be_bytes())?.as_bytes())
                        .map_err(encoding_error)?,
                )
                    .to_der()
                    .map_err(encoding_error)?,
            )?,
        ]),
    };
    let tbs = tbs_cert_list.to_der().map_err(encoding_error)?;

    let mut signer = Signer::new(MessageDigest::sha256(), ca_key.pkey())
        .map_err(|e| PkiError::Crypto(format!("Failed to create CRL signer: {}", e)))?;
    let signature = signer
        .sign_oneshot_to_vec(&tbs)
        .map_err(|e| PkiError::Crypto(format!("Failed to sign CRL: {}", e)))?;

    let crl_der = CertificateList {
        tbs_cert_list,
        signature_algorithm: algorithm,
        signature: BitString::from_bytes(&signature).map_err(encoding_error)?,
    }
    .to_der()
    .map_err(encoding_error)?;
    X509Crl::from_der(&crl_der)
        .map_err(|e| PkiError::Crypto(format!("Generated CRL does not parse: {}", e)))?;

    debug!(
        issuer = ?ca_cert.common_name(),
        revoked = revoked.len(),
        crl_number,
        "Issued revocation list"
    );

    Ok(RevocationList {
        der: crl_der,
        this_update,
        next_update,
        crl_number,
        revoked: revoked.to_vec(),
    })
}

/// AlgorithmIdentifier matching the CA key type
fn signature_algorithm(key: &KeyPair) -> Result<AlgorithmIdentifierOwned> {
    match key.pkey().id() {
        Id::EC => Ok(AlgorithmIdentifierOwned {
            oid: ECDSA_WITH_SHA256,
            parameters: None,
        }),
        Id::RSA => Ok(AlgorithmIdentifierOwned {
            oid: SHA256_WITH_RSA,
            parameters: Some(Any::null()),
        }),
        other => Err(PkiError::Config(format!(
            "Unsupported CRL signing key type: {:?}",
            other
        ))),
    }
}

/// RFC 5280 time: UTCTime through 2049, GeneralizedTime afterwards
fn asn1_time(at: &DateTime<Utc>) -> Result<Time> {
    let secs = u64::try_from(at.timestamp())
        .map_err(|_| PkiError::Config(format!("CRL time {} precedes the Unix epoch", at)))?;
    let date_time =
        der::DateTime::from_unix_duration(Duration::from_secs(secs)).map_err(encoding_error)?;
    if date_time.year() < 2050 {
        Ok(Time::UtcTime(
            UtcTime::from_date_time(date_time).map_err(encoding_error)?,
        ))
    } else {
        Ok(Time::GeneralTime(GeneralizedTime::from_date_time(date_time)))
    }
}

fn serial_number(magnitude: &[u8]) -> Result<SerialNumber> {
    let first = magnitude.iter().position(|b| *b != 0).unwrap_or(magnitude.len());
    let trimmed = if first == magnitude.len() { &[0u8][..] } else { &magnitude[first..] };
    SerialNumber::new(trimmed)
        .map_err(|e| PkiError::Config(format!("Invalid serial number: {}", e)))
}

fn extension(oid: ObjectIdentifier, value: Vec<u8>) -> Result<Extension> {
    Ok(Extension {
        extn_id: oid,
        critical: false,
        extn_value: OctetString::new(value).map_err(encoding_error)?,
    })
}

fn encoding_error(e: der::Error) -> PkiError {
    PkiError::Crypto(format!("Failed to encode CRL: {}", e))
}
