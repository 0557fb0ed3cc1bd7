//! Embedded-file extraction from PDF trust-list containers
//!
//! Acrobat security-settings files are PDF documents that carry the real
//! payload as an attachment in the catalog's `/Names /EmbeddedFiles` name tree.

use crate::error::{PkiError, Result};
use flate2::read::ZlibDecoder;
use lopdf::{Dictionary, Document, Object};
use std::io::Read;
use tracing::debug;

/// Name of the attachment holding the trusted identities
pub const SECURITY_SETTINGS_FILE: &str = "SecuritySettings.xml";

/// Upper bound on name-tree depth; real trees are one or two levels
const MAX_TREE_DEPTH: usize = 16;

/// Return the content of the embedded file called `name`
pub fn extract_embedded_file(data: &[u8], name: &str) -> Result<Vec<u8>> {
    let doc = Document::load_mem(data)
        .map_err(|e| PkiError::Network(format!("Trust list is not a readable PDF: {}", e)))?;

    let root = doc
        .trailer
        .get(b"Root")
        .map_err(|_| missing("document catalog"))?;
    let catalog = as_dict(&doc, root).ok_or_else(|| missing("document catalog"))?;
    let names = catalog
        .get(b"Names")
        .ok()
        .and_then(|obj| as_dict(&doc, obj))
        .ok_or_else(|| missing("/Names dictionary"))?;
    let tree = names
        .get(b"EmbeddedFiles")
        .ok()
        .and_then(|obj| as_dict(&doc, obj))
        .ok_or_else(|| missing("/EmbeddedFiles name tree"))?;

    let filespec = find_in_name_tree(&doc, tree, name, 0)
        .ok_or_else(|| missing(&format!("embedded file {}", name)))?;
    let content = embedded_stream_content(&doc, filespec)?;
    debug!(file = name, bytes = content.len(), "Extracted embedded file");
    Ok(content)
}

fn missing(what: &str) -> PkiError {
    PkiError::Network(format!("Trust list container has no {}", what))
}

/// Follow one level of indirection
fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn as_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, obj)? {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

/// Walk a name-tree node: leaf `/Names [key value ...]` pairs, then `/Kids`
fn find_in_name_tree<'a>(
    doc: &'a Document,
    node: &'a Dictionary,
    name: &str,
    depth: usize,
) -> Option<&'a Dictionary> {
    if depth > MAX_TREE_DEPTH {
        return None;
    }

    if let Some(Object::Array(pairs)) = node.get(b"Names").ok().and_then(|o| resolve(doc, o)) {
        for pair in pairs.chunks(2) {
            if let [key, value] = pair {
                let matches = match resolve(doc, key) {
                    Some(Object::String(bytes, _)) => decode_pdf_text(bytes) == name,
                    _ => false,
                };
                if matches {
                    return as_dict(doc, value);
                }
            }
        }
    }

    if let Some(Object::Array(kids)) = node.get(b"Kids").ok().and_then(|o| resolve(doc, o)) {
        for kid in kids {
            if let Some(found) = as_dict(doc, kid).and_then(|k| find_in_name_tree(doc, k, name, depth + 1)) {
                return Some(found);
            }
        }
    }

    None
}

/// Bytes of the stream referenced by a file specification's `/EF /F`
fn embedded_stream_content(doc: &Document, filespec: &Dictionary) -> Result<Vec<u8>> {
    let ef = filespec
        .get(b"EF")
        .ok()
        .and_then(|o| as_dict(doc, o))
        .ok_or_else(|| missing("/EF entry in file specification"))?;
    let file = ef
        .get(b"F")
        .or_else(|_| ef.get(b"UF"))
        .map_err(|_| missing("/EF /F stream"))?;
    let stream = match resolve(doc, file) {
        Some(Object::Stream(stream)) => stream,
        _ => return Err(missing("embedded file stream")),
    };

    let content = if stream.dict.has(b"Filter") {
        stream
            .decompressed_content()
            .map_err(|e| PkiError::Network(format!("Failed to decompress embedded file: {}", e)))?
    } else {
        unfiltered_content(&stream.content)
    };
    if content.is_empty() {
        return Err(missing("data in the embedded file stream"));
    }
    Ok(content)
}

/// Undo encodings some producers apply without declaring a `/Filter`:
/// a `<hex>` wrapper, or zlib compression of a payload that should be XML.
fn unfiltered_content(raw: &[u8]) -> Vec<u8> {
    let content = decode_hex_wrapped(raw).unwrap_or_else(|| raw.to_vec());
    if content.starts_with(b"<") {
        return content;
    }

    let mut inflated = Vec::new();
    match ZlibDecoder::new(content.as_slice()).read_to_end(&mut inflated) {
        Ok(_) if inflated.starts_with(b"<") => {
            debug!(bytes = inflated.len(), "Inflated unfiltered embedded stream");
            inflated
        }
        _ => content,
    }
}

/// `<48656C6C6F>` style content, whitespace allowed between digits
fn decode_hex_wrapped(raw: &[u8]) -> Option<Vec<u8>> {
    let body = raw.strip_prefix(b"<")?.strip_suffix(b">")?;
    if body.is_empty()
        || !body
            .iter()
            .all(|b| b.is_ascii_hexdigit() || b.is_ascii_whitespace())
    {
        return None;
    }
    let digits: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    hex::decode(digits).ok()
}

/// PDF text strings are PDFDocEncoding or UTF-16BE with a byte-order mark
fn decode_pdf_text(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::{dictionary, ObjectId, Stream};

    /// A minimal PDF whose name tree holds `files` directly under `/Names`
    pub(crate) fn pdf_with_embedded(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let mut pairs = Vec::new();
        for (name, data) in files {
            let stream_id = doc.add_object(Stream::new(
                dictionary! { "Type" => "EmbeddedFile" },
                data.to_vec(),
            ));
            let filespec_id = doc.add_object(dictionary! {
                "Type" => "Filespec",
                "F" => Object::string_literal(*name),
                "EF" => dictionary! { "F" => stream_id },
            });
            pairs.push(Object::string_literal(*name));
            pairs.push(filespec_id.into());
        }
        let tree_id = doc.add_object(dictionary! { "Names" => pairs });
        finish(doc, tree_id)
    }

    fn finish(mut doc: Document, tree_id: ObjectId) -> Vec<u8> {
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Names" => dictionary! { "EmbeddedFiles" => tree_id },
        });
        doc.trailer.set("Root", catalog_id);
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    #[test]
    fn test_extracts_named_attachment() {
        let pdf = pdf_with_embedded(&[
            ("readme.txt", b"hello"),
            (SECURITY_SETTINGS_FILE, b"<SecuritySettings/>"),
        ]);
        let content = extract_embedded_file(&pdf, SECURITY_SETTINGS_FILE).unwrap();
        assert_eq!(content, b"<SecuritySettings/>");
    }

    #[test]
    fn test_walks_kids() {
        let mut doc = Document::with_version("1.7");
        let stream_id = doc.add_object(Stream::new(dictionary! {}, b"<x/>".to_vec()));
        let filespec_id = doc.add_object(dictionary! {
            "F" => Object::string_literal(SECURITY_SETTINGS_FILE),
            "EF" => dictionary! { "F" => stream_id },
        });
        let leaf_id = doc.add_object(dictionary! {
            "Names" => vec![Object::string_literal(SECURITY_SETTINGS_FILE), filespec_id.into()],
        });
        let other_leaf = doc.add_object(dictionary! { "Names" => Vec::<Object>::new() });
        let root_id = doc.add_object(dictionary! {
            "Kids" => vec![Object::Reference(other_leaf), Object::Reference(leaf_id)],
        });

        let pdf = finish(doc, root_id);
        assert_eq!(extract_embedded_file(&pdf, SECURITY_SETTINGS_FILE).unwrap(), b"<x/>");
    }

    #[test]
    fn test_missing_attachment_is_network_error() {
        let pdf = pdf_with_embedded(&[("other.xml", b"<x/>")]);
        assert!(matches!(
            extract_embedded_file(&pdf, SECURITY_SETTINGS_FILE),
            Err(PkiError::Network(_))
        ));
    }

    #[test]
    fn test_not_a_pdf_is_network_error() {
        assert!(matches!(
            extract_embedded_file(b"<html>maintenance</html>", SECURITY_SETTINGS_FILE),
            Err(PkiError::Network(_))
        ));
    }

    #[test]
    fn test_unfiltered_zlib_stream_is_inflated() {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        let xml = b"<?xml version=\"1.0\"?><SecuritySettings/>";
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(xml).unwrap();
        let compressed = encoder.finish().unwrap();

        let pdf = pdf_with_embedded(&[(SECURITY_SETTINGS_FILE, compressed.as_slice())]);
        assert_eq!(extract_embedded_file(&pdf, SECURITY_SETTINGS_FILE).unwrap(), xml);
    }

    #[test]
    fn test_hex_wrapped_stream_is_decoded() {
        let xml = b"<SecuritySettings/>";
        let wrapped = format!("<{}\n{}>", hex::encode_upper(&xml[..8]), hex::encode(&xml[8..]));

        let pdf = pdf_with_embedded(&[(SECURITY_SETTINGS_FILE, wrapped.as_bytes())]);
        assert_eq!(extract_embedded_file(&pdf, SECURITY_SETTINGS_FILE).unwrap(), xml);
    }

    #[test]
    fn test_plain_xml_is_not_mistaken_for_hex() {
        assert_eq!(unfiltered_content(b"<abc/>"), b"<abc/>");
        assert_eq!(unfiltered_content(b"not xml"), b"not xml");
    }

    #[test]
    fn test_empty_stream_is_network_error() {
        let pdf = pdf_with_embedded(&[(SECURITY_SETTINGS_FILE, b"")]);
        assert!(matches!(
            extract_embedded_file(&pdf, SECURITY_SETTINGS_FILE),
            Err(PkiError::Network(_))
        ));
    }

    #[test]
    fn test_utf16_names_decode() {
        assert_eq!(decode_pdf_text(&[0xFE, 0xFF, 0x00, 0x41, 0x00, 0x42]), "AB");
        assert_eq!(decode_pdf_text(b"plain"), "plain");
    }
}
