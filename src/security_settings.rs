//! `SecuritySettings.xml` parsing
//!
//! The document lists trusted identities, each carrying one base64 DER
//! certificate:
//!
//! ```xml
//! <SecuritySettings>
//!   <TrustedIdentities>
//!     <Identity>
//!       <ImportAction>1</ImportAction>
//!       <Certificate>MIIB...</Certificate>
//!     </Identity>
//!   </TrustedIdentities>
//! </SecuritySettings>
//! ```
//!
//! A certificate that is not valid base64 aborts the whole list. A certificate
//! that decodes but does not parse as X.509 is skipped.

use crate::certificate::Certificate;
use crate::error::{PkiError, Result};
use crate::trust_store::TrustEntry;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
pub struct SecuritySettings {
    #[serde(rename = "TrustedIdentities", default)]
    pub trusted_identities: TrustedIdentities,
}

#[derive(Debug, Default, Deserialize)]
pub struct TrustedIdentities {
    #[serde(rename = "Identity", default)]
    pub identities: Vec<Identity>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Identity {
    #[serde(rename = "ImportAction", default)]
    pub import_action: Option<i32>,
    #[serde(rename = "Certificate", default)]
    pub certificate: String,
}

/// Entries produced from one document
#[derive(Debug, Default)]
pub struct ParsedList {
    pub entries: Vec<TrustEntry>,
    /// Identities whose certificate did not parse
    pub skipped: usize,
    /// Identities repeating a certificate already seen in this document
    pub duplicates: usize,
}

/// Deserialize the XML document after a cheap shape check
pub fn parse(xml: &[u8]) -> Result<SecuritySettings> {
    let text = std::str::from_utf8(xml)
        .map_err(|e| PkiError::Parse(format!("SecuritySettings is not UTF-8: {}", e)))?;
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    if trimmed.is_empty() {
        return Err(PkiError::Parse("SecuritySettings is empty".to_string()));
    }
    if !trimmed.starts_with('<') {
        let preview: String = trimmed.chars().take(50).collect();
        return Err(PkiError::Parse(format!(
            "SecuritySettings does not look like XML (starts with {:?})",
            preview
        )));
    }

    quick_xml::de::from_str(trimmed)
        .map_err(|e| PkiError::Parse(format!("Failed to decode SecuritySettings XML: {}", e)))
}

/// Turn every identity into a [`TrustEntry`] tagged with `list`
pub fn to_entries(list: &str, settings: &SecuritySettings) -> Result<ParsedList> {
    let mut parsed = ParsedList::default();
    let mut seen = HashSet::new();

    for identity in &settings.trusted_identities.identities {
        let der = decode_certificate(&identity.certificate)?;
        let certificate = match Certificate::from_der(&der) {
            Ok(certificate) => certificate,
            Err(e) => {
                debug!(list, error = %e, "Skipping unparseable trusted identity");
                parsed.skipped += 1;
                continue;
            }
        };

        let aki = hex::encode_upper(openssl::sha::sha1(&der));
        if !seen.insert(aki.clone()) {
            parsed.duplicates += 1;
            continue;
        }

        parsed.entries.push(TrustEntry {
            list: list.to_string(),
            name: certificate.common_name().unwrap_or_default(),
            aki,
            ski: certificate
                .subject_key_id()
                .map(hex::encode_upper)
                .unwrap_or_default(),
        });
    }

    Ok(parsed)
}

/// Base64 with embedded line breaks and indentation
fn decode_certificate(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| PkiError::Parse(format!("Failed to decode certificate: {}", e)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::certificate_issuer::{self, tests::root_template};
    use crate::key_material::KeyPair;

    /// Base64 DER of a freshly issued self-signed certificate, wrapped at 64 columns
    pub(crate) fn encoded_certificate(cn: &str) -> (String, Certificate) {
        let key = KeyPair::generate().unwrap();
        let cert = certificate_issuer::issue(root_template(cn), &key).unwrap();
        let b64 = STANDARD.encode(cert.to_der().unwrap());
        let wrapped = b64
            .as_bytes()
            .chunks(64)
            .map(|c| String::from_utf8(c.to_vec()).unwrap())
            .collect::<Vec<_>>()
            .join("\n        ");
        (wrapped, cert)
    }

    pub(crate) fn settings_xml(certificates: &[String]) -> Vec<u8> {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<SecuritySettings>\n  <TrustedIdentities>\n");
        for certificate in certificates {
            xml.push_str("    <Identity>\n      <ImportAction>1</ImportAction>\n      <Certificate>\n        ");
            xml.push_str(certificate);
            xml.push_str("\n      </Certificate>\n    </Identity>\n");
        }
        xml.push_str("  </TrustedIdentities>\n</SecuritySettings>\n");
        xml.into_bytes()
    }

    #[test]
    fn test_entries_from_valid_certificates() {
        let (first, cert) = encoded_certificate("Anchor One");
        let (second, _) = encoded_certificate("Anchor Two");
        let settings = parse(&settings_xml(&[first, second])).unwrap();
        assert_eq!(settings.trusted_identities.identities[0].import_action, Some(1));

        let parsed = to_entries("tl12", &settings).unwrap();
        assert_eq!(parsed.entries.len(), 2);
        assert_eq!(parsed.skipped, 0);

        let entry = &parsed.entries[0];
        assert_eq!(entry.list, "tl12");
        assert_eq!(entry.name, "Anchor One");
        assert_eq!(entry.aki, hex::encode_upper(openssl::sha::sha1(&cert.to_der().unwrap())));
        assert_eq!(entry.ski, hex::encode_upper(cert.subject_key_id().unwrap()));
        assert_eq!(entry.aki, entry.aki.to_uppercase());
    }

    #[test]
    fn test_malformed_certificate_is_skipped() {
        let (good, _) = encoded_certificate("Good");
        let garbage = STANDARD.encode(b"definitely not DER");
        let parsed = to_entries("eutl12", &parse(&settings_xml(&[garbage, good])).unwrap()).unwrap();

        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.skipped, 1);
        assert_eq!(parsed.entries[0].name, "Good");
    }

    #[test]
    fn test_bad_base64_aborts() {
        let (good, _) = encoded_certificate("Good");
        let settings = parse(&settings_xml(&[good, "%%%not-base64%%%".to_string()])).unwrap();
        assert!(matches!(to_entries("tl12", &settings), Err(PkiError::Parse(_))));
    }

    #[test]
    fn test_duplicate_certificates_stored_once() {
        let (cert, _) = encoded_certificate("Twice");
        let parsed = to_entries("tl12", &parse(&settings_xml(&[cert.clone(), cert])).unwrap()).unwrap();
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.duplicates, 1);
    }

    #[test]
    fn test_non_xml_rejected() {
        assert!(matches!(parse(b""), Err(PkiError::Parse(_))));
        assert!(matches!(parse(b"%PDF-1.7 binary"), Err(PkiError::Parse(_))));
    }

    #[test]
    fn test_empty_identity_list() {
        let settings = parse(b"<SecuritySettings><TrustedIdentities/></SecuritySettings>").unwrap();
        let parsed = to_entries("tl12", &settings).unwrap();
        assert!(parsed.entries.is_empty());
    }
}
