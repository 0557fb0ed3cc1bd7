//! Subject / Authority Key Identifier derivation
//!
//! The identifier is the SHA-1 digest of the key's SubjectPublicKeyInfo DER.
//! The same key always yields the same 20 bytes, which is what links a child's
//! AuthorityKeyIdentifier to its signer's SubjectKeyIdentifier.

use crate::error::{PkiError, Result};
use der::asn1::OctetString;
use der::Encode;
use openssl::pkey::{HasPublic, PKeyRef};
use x509_cert::ext::pkix::{AuthorityKeyIdentifier, SubjectKeyIdentifier};

pub const KEY_IDENTIFIER_LEN: usize = 20;

pub fn derive<T: HasPublic>(public_key: &PKeyRef<T>) -> Result<[u8; KEY_IDENTIFIER_LEN]> {
    let spki = public_key
        .public_key_to_der()
        .map_err(|e| PkiError::Crypto(format!("Failed to encode public key: {}", e)))?;
    Ok(openssl::sha::sha1(&spki))
}

/// Upper-case hex rendering used by the trust store
pub fn derive_hex<T: HasPublic>(public_key: &PKeyRef<T>) -> Result<String> {
    Ok(hex::encode_upper(derive(public_key)?))
}

/// DER extnValue of a SubjectKeyIdentifier extension
pub fn subject_extension_value(key_id: &[u8]) -> Result<Vec<u8>> {
    let octets = OctetString::new(key_id.to_vec()).map_err(encoding_error)?;
    SubjectKeyIdentifier(octets).to_der().map_err(encoding_error)
}

/// DER extnValue of an AuthorityKeyIdentifier carrying only `keyIdentifier`
pub fn authority_extension_value(key_id: &[u8]) -> Result<Vec<u8>> {
    let octets = OctetString::new(key_id.to_vec()).map_err(encoding_error)?;
    AuthorityKeyIdentifier {
        key_identifier: Some(octets),
        authority_cert_issuer: None,
        authority_cert_serial_number: None,
    }
    .to_der()
    .map_err(encoding_error)
}

fn encoding_error(e: der::Error) -> PkiError {
    PkiError::Crypto(format!("Failed to encode key identifier: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_material::KeyPair;

    #[test]
    fn test_derive_is_deterministic() {
        let pair = KeyPair::generate().unwrap();
        let first = derive(pair.pkey()).unwrap();
        for _ in 0..5 {
            assert_eq!(derive(pair.pkey()).unwrap(), first);
        }
    }

    #[test]
    fn test_derive_survives_pem_round_trip() {
        let pair = KeyPair::generate().unwrap();
        let pem = pair.encode().unwrap();
        let reloaded = KeyPair::decode(secrecy::ExposeSecret::expose_secret(&pem)).unwrap();
        assert_eq!(derive(pair.pkey()).unwrap(), derive(reloaded.pkey()).unwrap());
    }

    #[test]
    fn test_distinct_keys_distinct_identifiers() {
        let a = KeyPair::generate().unwrap();
        let b = KeyPair::generate().unwrap();
        assert_ne!(derive(a.pkey()).unwrap(), derive(b.pkey()).unwrap());
    }

    #[test]
    fn test_hex_is_upper_case() {
        let pair = KeyPair::generate().unwrap();
        let hex = derive_hex(pair.pkey()).unwrap();
        assert_eq!(hex.len(), KEY_IDENTIFIER_LEN * 2);
        assert_eq!(hex, hex.to_uppercase());
    }

    #[test]
    fn test_authority_extension_value_decodes() {
        use der::Decode;

        let value = authority_extension_value(&[0xAB; KEY_IDENTIFIER_LEN]).unwrap();
        // SEQUENCE { [0] IMPLICIT OCTET STRING }
        assert_eq!(&value[..4], &[0x30, 0x16, 0x80, 0x14]);

        let decoded = AuthorityKeyIdentifier::from_der(&value).unwrap();
        assert_eq!(
            decoded.key_identifier.unwrap().as_bytes(),
            &[0xAB; KEY_IDENTIFIER_LEN]
        );
        assert!(decoded.authority_cert_issuer.is_none());
    }

    #[test]
    fn test_subject_extension_value_is_octet_string() {
        let value = subject_extension_value(&[0x01; KEY_IDENTIFIER_LEN]).unwrap();
        assert_eq!(&value[..2], &[0x04, 0x14]);
        assert_eq!(&value[2..], &[0x01; KEY_IDENTIFIER_LEN]);
    }
}
