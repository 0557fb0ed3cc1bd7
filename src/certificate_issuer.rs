//! Certificate issuance from a declarative template
//!
//! One entry point, [`issue`], covers every level of the hierarchy:
//!
//! ```text
//! Root CA          parent = None            → self-signed, no AKI
//!   └── Intermediate  parent = Some(root)   → AKI = root SKI
//!       └── Leaf      parent = Some(inter)  → AKI = intermediate SKI
//! ```
//!
//! The template decides the CA flag, key usage and validity window; nothing is
//! defaulted. SubjectKeyIdentifier is derived from the subject key unless the
//! template supplies one.

use crate::certificate::Certificate;
use crate::error::{PkiError, Result};
use crate::key_identifier;
use crate::key_material::KeyPair;
use chrono::{DateTime, Utc};
use der::asn1::ObjectIdentifier;
use der::oid::AssociatedOid;
use openssl::asn1::{Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::{X509Extension, X509Name, X509};
use std::ops::BitOr;
use x509_cert::ext::pkix::{AuthorityKeyIdentifier, SubjectKeyIdentifier};

const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
const SERIAL_BITS: i32 = 128;

/// Distinguished name fields of a certificate subject
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectName {
    pub common_name: String,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub locality: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

impl SubjectName {
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            ..Self::default()
        }
    }

    pub fn organization(mut self, org: impl Into<String>) -> Self {
        self.organization = Some(org.into());
        self
    }

    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    fn to_x509_name(&self) -> Result<X509Name> {
        let mut name_builder = X509Name::builder()
            .map_err(|e| PkiError::Crypto(format!("Failed to create name builder: {}", e)))?;

        // Country first, matching the usual C/O/OU/L/ST/CN ordering
        let fields = [
            (Nid::COUNTRYNAME, self.country.as_deref()),
            (Nid::ORGANIZATIONNAME, self.organization.as_deref()),
            (Nid::ORGANIZATIONALUNITNAME, self.organizational_unit.as_deref()),
            (Nid::LOCALITYNAME, self.locality.as_deref()),
            (Nid::STATEORPROVINCENAME, self.state.as_deref()),
            (Nid::COMMONNAME, Some(self.common_name.as_str())),
        ];
        for (nid, value) in fields {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                name_builder
                    .append_entry_by_nid(nid, value)
                    .map_err(|e| {
                        PkiError::Config(format!("Failed to set {:?} = {}: {}", nid, value, e))
                    })?;
            }
        }
        Ok(name_builder.build())
    }
}

/// X.509 KeyUsage bitset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyUsageSet(u16);

impl KeyUsageSet {
    pub const DIGITAL_SIGNATURE: Self = Self(1 << 0);
    pub const CONTENT_COMMITMENT: Self = Self(1 << 1);
    pub const KEY_ENCIPHERMENT: Self = Self(1 << 2);
    pub const DATA_ENCIPHERMENT: Self = Self(1 << 3);
    pub const KEY_AGREEMENT: Self = Self(1 << 4);
    pub const KEY_CERT_SIGN: Self = Self(1 << 5);
    pub const CRL_SIGN: Self = Self(1 << 6);

    /// Bits only a CA may carry
    pub const CA_ONLY: Self = Self(Self::KEY_CERT_SIGN.0 | Self::CRL_SIGN.0);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Parse the names used in configuration files
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names.into_iter().try_fold(Self::empty(), |acc, name| {
            let bit = match name.as_ref() {
                "digital-signature" => Self::DIGITAL_SIGNATURE,
                "content-commitment" | "non-repudiation" => Self::CONTENT_COMMITMENT,
                "key-encipherment" => Self::KEY_ENCIPHERMENT,
                "data-encipherment" => Self::DATA_ENCIPHERMENT,
                "key-agreement" => Self::KEY_AGREEMENT,
                "cert-sign" => Self::KEY_CERT_SIGN,
                "crl-sign" => Self::CRL_SIGN,
                other => {
                    return Err(PkiError::Config(format!("Unknown key usage '{}'", other)));
                }
            };
            Ok(acc | bit)
        })
    }

    fn to_extension(self) -> Result<X509Extension> {
        let mut ku = KeyUsage::new();
        ku.critical();
        if self.contains(Self::DIGITAL_SIGNATURE) {
            ku.digital_signature();
        }
        if self.contains(Self::CONTENT_COMMITMENT) {
            ku.non_repudiation();
        }
        if self.contains(Self::KEY_ENCIPHERMENT) {
            ku.key_encipherment();
        }
        if self.contains(Self::DATA_ENCIPHERMENT) {
            ku.data_encipherment();
        }
        if self.contains(Self::KEY_AGREEMENT) {
            ku.key_agreement();
        }
        if self.contains(Self::KEY_CERT_SIGN) {
            ku.key_cert_sign();
        }
        if self.contains(Self::CRL_SIGN) {
            ku.crl_sign();
        }
        ku.build()
            .map_err(|e| PkiError::Crypto(format!("Failed to build KeyUsage: {}", e)))
    }
}

impl BitOr for KeyUsageSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Declarative description of one certificate to issue
#[derive(Debug, Clone)]
pub struct CertificateTemplate {
    pub subject: SubjectName,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub is_ca: bool,
    pub key_usage: KeyUsageSet,
    pub parent: Option<Certificate>,
    pub parent_private_key: Option<KeyPair>,
    pub authority_key_id: Option<Vec<u8>>,
    pub subject_key_id: Option<Vec<u8>>,
}

impl CertificateTemplate {
    /// Template with no parent and no explicit key identifiers
    pub fn new(
        subject: SubjectName,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
        is_ca: bool,
        key_usage: KeyUsageSet,
    ) -> Self {
        Self {
            subject,
            not_before,
            not_after,
            is_ca,
            key_usage,
            parent: None,
            parent_private_key: None,
            authority_key_id: None,
            subject_key_id: None,
        }
    }

    /// Chain this template under `parent`, signed by `parent_key`
    pub fn signed_by(mut self, parent: Certificate, parent_key: KeyPair) -> Self {
        self.parent = Some(parent);
        self.parent_private_key = Some(parent_key);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.subject.common_name.is_empty() {
            return Err(PkiError::Config("Subject common name is empty".to_string()));
        }
        if self.not_after <= self.not_before {
            return Err(PkiError::Config(format!(
                "Validity window is empty: not_before {} is not before not_after {}",
                self.not_before, self.not_after
            )));
        }
        if !self.is_ca && self.key_usage.intersects(KeyUsageSet::CA_ONLY) {
            return Err(PkiError::Config(
                "Key usage cert-sign/crl-sign requires a CA certificate".to_string(),
            ));
        }
        Ok(())
    }
}

/// Build and sign one certificate for `subject_key` from `template`
pub fn issue(template: CertificateTemplate, subject_key: &KeyPair) -> Result<Certificate> {
    template.validate()?;

    let subject_name = template.subject.to_x509_name()?;

    // Resolve who signs: the subject itself (root) or the parent CA
    let (signing_key, authority_key_id) = match &template.parent {
        None => (subject_key, None),
        Some(parent) => {
            let parent_key = template.parent_private_key.as_ref().ok_or_else(|| {
                PkiError::Config("Parent certificate given without its private key".to_string())
            })?;
            if !parent_key.matches_certificate(parent)? {
                return Err(PkiError::Config(format!(
                    "Signing key does not match parent certificate {:?}",
                    parent.common_name()
                )));
            }
            let aki = match (&template.authority_key_id, parent.subject_key_id()) {
                (Some(explicit), _) => explicit.clone(),
                (None, Some(parent_ski)) => parent_ski,
                (None, None) => key_identifier::derive(parent_key.pkey())?.to_vec(),
            };
            (parent_key, Some(aki))
        }
    };

    let subject_key_id = match &template.subject_key_id {
        Some(explicit) => explicit.clone(),
        None => key_identifier::derive(subject_key.pkey())?.to_vec(),
    };

    let mut builder =
        X509::builder().map_err(|e| PkiError::Crypto(format!("Failed to create X509 builder: {}", e)))?;

    builder
        .set_version(X509_VERSION_3)
        .map_err(|e| PkiError::Crypto(format!("Failed to set version: {}", e)))?;

    // Random 128-bit serial number
    let serial = (|| {
        let mut serial = BigNum::new()?;
        serial.rand(SERIAL_BITS, MsbOption::MAYBE_ZERO, false)?;
        serial.to_asn1_integer()
    })()
    .map_err(|e| PkiError::Crypto(format!("Failed to generate serial number: {}", e)))?;
    builder
        .set_serial_number(&serial)
        .map_err(|e| PkiError::Crypto(format!("Failed to set serial number: {}", e)))?;

    builder
        .set_subject_name(&subject_name)
        .map_err(|e| PkiError::Crypto(format!("Failed to set subject: {}", e)))?;
    match &template.parent {
        Some(parent) => builder.set_issuer_name(parent.x509().subject_name()),
        None => builder.set_issuer_name(&subject_name),
    }
    .map_err(|e| PkiError::Crypto(format!("Failed to set issuer: {}", e)))?;

    let not_before = Asn1Time::from_unix(template.not_before.timestamp())
        .map_err(|e| PkiError::Crypto(format!("Failed to create not_before: {}", e)))?;
    builder
        .set_not_before(&not_before)
        .map_err(|e| PkiError::Crypto(format!("Failed to set not_before: {}", e)))?;
    let not_after = Asn1Time::from_unix(template.not_after.timestamp())
        .map_err(|e| PkiError::Crypto(format!("Failed to create not_after: {}", e)))?;
    builder
        .set_not_after(&not_after)
        .map_err(|e| PkiError::Crypto(format!("Failed to set not_after: {}", e)))?;

    builder
        .set_pubkey(subject_key.pkey())
        .map_err(|e| PkiError::Crypto(format!("Failed to set public key: {}", e)))?;

    let mut bc = BasicConstraints::new();
    bc.critical();
    if template.is_ca {
        bc.ca();
    }
    let bc = bc
        .build()
        .map_err(|e| PkiError::Crypto(format!("Failed to build BasicConstraints: {}", e)))?;
    builder
        .append_extension(bc)
        .map_err(|e| PkiError::Crypto(format!("Failed to add BasicConstraints: {}", e)))?;

    if !template.key_usage.is_empty() {
        builder
            .append_extension(template.key_usage.to_extension()?)
            .map_err(|e| PkiError::Crypto(format!("Failed to add KeyUsage: {}", e)))?;
    }

    let ski = raw_extension(
        SubjectKeyIdentifier::OID,
        &key_identifier::subject_extension_value(&subject_key_id)?,
    )?;
    builder
        .append_extension(ski)
        .map_err(|e| PkiError::Crypto(format!("Failed to add SubjectKeyIdentifier: {}", e)))?;

    if let Some(aki) = authority_key_id {
        let aki = raw_extension(
            AuthorityKeyIdentifier::OID,
            &key_identifier::authority_extension_value(&aki)?,
        )?;
        builder
            .append_extension(aki)
            .map_err(|e| PkiError::Crypto(format!("Failed to add AuthorityKeyIdentifier: {}", e)))?;
    }

    builder
        .sign(signing_key.pkey(), MessageDigest::sha256())
        .map_err(|e| PkiError::Crypto(format!("Failed to sign certificate: {}", e)))?;

    Ok(Certificate::from_x509(builder.build()))
}

fn raw_extension(oid: ObjectIdentifier, value: &[u8]) -> Result<X509Extension> {
    let object = Asn1Object::from_str(&oid.to_string())
        .map_err(|e| PkiError::Crypto(format!("Failed to create OID {}: {}", oid, e)))?;
    let contents = Asn1OctetString::new_from_bytes(value)
        .map_err(|e| PkiError::Crypto(format!("Failed to wrap extension value: {}", e)))?;
    X509Extension::new_from_der(&object, false, &contents)
        .map_err(|e| PkiError::Crypto(format!("Failed to build extension {}: {}", oid, e)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;

    pub(crate) fn root_template(cn: &str) -> CertificateTemplate {
        let now = Utc::now();
        CertificateTemplate::new(
            SubjectName::new(cn).organization("docsign").country("US"),
            now,
            now + Duration::days(365),
            true,
            KeyUsageSet::KEY_CERT_SIGN | KeyUsageSet::CRL_SIGN,
        )
    }

    pub(crate) fn leaf_template(cn: &str) -> CertificateTemplate {
        let now = Utc::now();
        CertificateTemplate::new(
            SubjectName::new(cn),
            now,
            now + Duration::days(7),
            false,
            KeyUsageSet::DIGITAL_SIGNATURE,
        )
    }

    #[test]
    fn test_root_is_self_signed() {
        let key = KeyPair::generate().unwrap();
        let root = issue(root_template("Root CA"), &key).unwrap();

        assert_eq!(root.subject_der().unwrap(), root.issuer_der().unwrap());
        assert!(root.is_signed_by(&root).unwrap());
        assert_eq!(
            root.subject_key_id().unwrap(),
            key_identifier::derive(key.pkey()).unwrap().to_vec()
        );
        assert!(root.authority_key_id().is_none());
    }

    #[test]
    fn test_child_links_to_parent() {
        let root_key = KeyPair::generate().unwrap();
        let root = issue(root_template("Root CA"), &root_key).unwrap();

        let child_key = KeyPair::generate().unwrap();
        let child = issue(
            root_template("Sub CA").signed_by(root.clone(), root_key.clone()),
            &child_key,
        )
        .unwrap();

        assert_eq!(child.issuer_der().unwrap(), root.subject_der().unwrap());
        assert_eq!(child.authority_key_id(), root.subject_key_id());
        assert!(child.is_signed_by(&root).unwrap());
        assert!(!child.is_signed_by(&child).unwrap());
    }

    #[test]
    fn test_explicit_identifiers_are_kept() {
        let key = KeyPair::generate().unwrap();
        let mut template = root_template("Root CA");
        template.subject_key_id = Some(vec![7u8; 20]);
        let cert = issue(template, &key).unwrap();
        assert_eq!(cert.subject_key_id(), Some(vec![7u8; 20]));
    }

    #[test]
    fn test_mismatched_parent_key_is_config_error() {
        let root_key = KeyPair::generate().unwrap();
        let root = issue(root_template("Root CA"), &root_key).unwrap();
        let stranger = KeyPair::generate().unwrap();

        let err = issue(
            leaf_template("leaf").signed_by(root, stranger),
            &KeyPair::generate().unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, PkiError::Config(_)));
    }

    #[test]
    fn test_parent_without_key_is_config_error() {
        let root_key = KeyPair::generate().unwrap();
        let root = issue(root_template("Root CA"), &root_key).unwrap();
        let mut template = leaf_template("leaf");
        template.parent = Some(root);

        let err = issue(template, &KeyPair::generate().unwrap()).unwrap_err();
        assert!(matches!(err, PkiError::Config(_)));
    }

    #[test]
    fn test_ca_only_usage_on_leaf_is_rejected() {
        let mut template = leaf_template("leaf");
        template.key_usage = KeyUsageSet::DIGITAL_SIGNATURE | KeyUsageSet::KEY_CERT_SIGN;
        let err = issue(template, &KeyPair::generate().unwrap()).unwrap_err();
        assert!(matches!(err, PkiError::Config(_)));
    }

    #[test]
    fn test_empty_validity_window_is_rejected() {
        let mut template = leaf_template("leaf");
        template.not_after = template.not_before;
        let err = issue(template, &KeyPair::generate().unwrap()).unwrap_err();
        assert!(matches!(err, PkiError::Config(_)));
    }

    #[test]
    fn test_key_usage_from_names() {
        let usage = KeyUsageSet::from_names(["cert-sign", "crl-sign"]).unwrap();
        assert_eq!(usage, KeyUsageSet::CA_ONLY);
        assert!(KeyUsageSet::from_names(["teleport"]).is_err());
    }
}
