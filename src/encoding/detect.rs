//! Byte-order-mark / leading-bytes autodetection and the ASCII-only XML/text
//! declaration pre-parser (§4.1 steps 1-2).
//!
//! Grounded on the teacher's `EncodingRef` detection helper in `reader.rs`
//! (BOM-family sniffing before a decoder exists), generalized to cover UTF-32
//! and the four-byte `<?xm` / `\0<\0?` patterns the spec calls out.

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};

/// Result of the leading-bytes sniff: an encoding guess plus how many BOM
/// bytes (if any) should be skipped before decoding resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detected {
    pub encoding: &'static Encoding,
    pub bom_len: usize,
    pub had_bom: bool,
}

/// Sniffs the BOM / first four bytes of `head`. Returns `None` if fewer than
/// 4 bytes are available and no BOM was found in the bytes given (caller
/// should buffer more before calling `detect` again), unless a BOM shorter
/// than 4 bytes was recognised outright.
pub fn detect(head: &[u8]) -> Option<Detected> {
    if head.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Some(Detected {
            encoding: UTF_8,
            bom_len: 3,
            had_bom: true,
        });
    }
    if head.starts_with(&[0xFF, 0xFE, 0x00, 0x00]) {
        // UTF-32LE BOM; encoding_rs has no UTF-32 codec, report as unsupported
        // by signalling UTF-16LE is wrong family via bom_len 4 + a dedicated marker.
        return Some(Detected {
            encoding: UTF_16LE,
            bom_len: 4,
            had_bom: true,
        });
    }
    if head.starts_with(&[0x00, 0x00, 0xFE, 0xFF]) {
        return Some(Detected {
            encoding: UTF_16BE,
            bom_len: 4,
            had_bom: true,
        });
    }
    if head.starts_with(&[0xFF, 0xFE]) {
        return Some(Detected {
            encoding: UTF_16LE,
            bom_len: 2,
            had_bom: true,
        });
    }
    if head.starts_with(&[0xFE, 0xFF]) {
        return Some(Detected {
            encoding: UTF_16BE,
            bom_len: 2,
            had_bom: true,
        });
    }

    if head.len() < 4 {
        return None;
    }

    if head.starts_with(&[0x3C, 0x3F, 0x78, 0x6D]) {
        return Some(Detected {
            encoding: UTF_8,
            bom_len: 0,
            had_bom: false,
        });
    }
    if head.starts_with(&[0x00, 0x3C, 0x00, 0x3F]) {
        return Some(Detected {
            encoding: UTF_16BE,
            bom_len: 0,
            had_bom: false,
        });
    }
    if head.starts_with(&[0x3C, 0x00, 0x3F, 0x00]) {
        return Some(Detected {
            encoding: UTF_16LE,
            bom_len: 0,
            had_bom: false,
        });
    }

    Some(Detected {
        encoding: UTF_8,
        bom_len: 0,
        had_bom: false,
    })
}

/// Whether a UTF-32 BOM pattern was matched. `detect` reports these as
/// `UTF_16LE`/`UTF_16BE` placeholders with `bom_len == 4` so callers can
/// distinguish: a real UTF-16 4-byte BOM never happens (UTF-16 BOMs are 2
/// bytes), so `bom_len == 4` together with a UTF-16 encoding means "this was
/// actually a UTF-32 BOM, which this decoder does not support".
pub fn is_utf32_marker(detected: &Detected) -> bool {
    detected.bom_len == 4
}

/// Outcome of parsing the ASCII-only `<?xml ...?>` / text declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclInfo {
    pub version: Option<String>,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
    /// Byte length of the declaration, including the leading `<?xml` and
    /// trailing `?>`.
    pub byte_len: usize,
}

/// Outcome of attempting to pre-parse a declaration.
pub enum DeclResult {
    /// No declaration present (input does not start with `<?xml`).
    Absent,
    /// Successfully parsed; buffer should be advanced by `info.byte_len`.
    Present(DeclInfo),
    /// Not enough bytes buffered yet to know.
    Underflow,
    /// Present but malformed.
    Malformed(&'static str),
}

/// Parses an optional XML or text declaration directly from ASCII-decoded
/// bytes (the declaration is required to be 7-bit ASCII by construction,
/// since it's what tells us the real encoding). `is_text_decl` controls
/// whether `version` is optional and `encoding` is mandatory (true) or
/// `version` is mandatory and `standalone` optional (false, the XML decl
/// case).
pub fn parse_decl(bytes: &[u8], is_text_decl: bool) -> DeclResult {
    const PREFIX: &[u8] = b"<?xml";
    if bytes.len() < PREFIX.len() {
        return DeclResult::Underflow;
    }
    if !bytes[..PREFIX.len()].eq_ignore_ascii_case(PREFIX) {
        return DeclResult::Absent;
    }
    // Must be followed by whitespace or `?>` is not valid for a decl with
    // no attributes at all (XML requires at least version in XMLDecl).
    let rest = &bytes[PREFIX.len()..];
    if rest.is_empty() {
        return DeclResult::Underflow;
    }
    if !(rest[0] as char).is_ascii_whitespace() {
        return DeclResult::Absent;
    }

    let end = match find_subslice(bytes, b"?>") {
        Some(i) => i,
        None => {
            if bytes.len() > 4096 {
                return DeclResult::Malformed("declaration too long without '?>'");
            }
            return DeclResult::Underflow;
        }
    };
    let body = &bytes[PREFIX.len()..end];
    let text = match std::str::from_utf8(body) {
        Ok(s) => s,
        Err(_) => return DeclResult::Malformed("declaration is not ASCII"),
    };

    let mut info = DeclInfo {
        byte_len: end + 2,
        ..Default::default()
    };

    let mut cursor = text;
    let mut seen_version = false;
    let mut seen_encoding = false;
    let mut seen_standalone = false;
    let mut last_key: Option<&str> = None;

    loop {
        cursor = cursor.trim_start();
        if cursor.is_empty() {
            break;
        }
        let eq_pos = match cursor.find('=') {
            Some(p) => p,
            None => return DeclResult::Malformed("expected '=' in declaration pseudo-attribute"),
        };
        let key = cursor[..eq_pos].trim_end();
        cursor = cursor[eq_pos + 1..].trim_start();
        let quote = match cursor.chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => return DeclResult::Malformed("expected quoted value"),
        };
        let value_start = 1;
        let value_end = match cursor[value_start..].find(quote) {
            Some(p) => value_start + p,
            None => return DeclResult::Malformed("unterminated quoted value"),
        };
        let value = &cursor[value_start..value_end];
        cursor = &cursor[value_end + 1..];

        match key {
            "version" => {
                if seen_version {
                    return DeclResult::Malformed("duplicate 'version'");
                }
                if last_key.is_some() {
                    return DeclResult::Malformed("'version' out of order");
                }
                if !is_valid_version(value) {
                    return DeclResult::Malformed("invalid version literal");
                }
                info.version = Some(value.to_string());
                seen_version = true;
                last_key = Some("version");
            }
            "encoding" => {
                if seen_encoding {
                    return DeclResult::Malformed("duplicate 'encoding'");
                }
                if seen_standalone {
                    return DeclResult::Malformed("'encoding' out of order");
                }
                if is_text_decl && !seen_version && last_key.is_some() {
                    return DeclResult::Malformed("'encoding' out of order");
                }
                info.encoding = Some(value.to_string());
                seen_encoding = true;
                last_key = Some("encoding");
            }
            "standalone" => {
                if is_text_decl {
                    return DeclResult::Malformed("'standalone' forbidden in text declaration");
                }
                if seen_standalone {
                    return DeclResult::Malformed("duplicate 'standalone'");
                }
                if value != "yes" && value != "no" {
                    return DeclResult::Malformed("'standalone' must be 'yes' or 'no'");
                }
                info.standalone = Some(value.to_string());
                seen_standalone = true;
                last_key = Some("standalone");
            }
            other => return DeclResult::Malformed(pseudo_attr_name_leak(other)),
        }
    }

    if !is_text_decl && !seen_version {
        return DeclResult::Malformed("'version' is required in an XML declaration");
    }
    if is_text_decl && !seen_encoding {
        return DeclResult::Malformed("'encoding' is required in a text declaration");
    }

    DeclResult::Present(info)
}

fn pseudo_attr_name_leak(_s: &str) -> &'static str {
    "unknown declaration pseudo-attribute"
}

fn is_valid_version(v: &str) -> bool {
    let mut parts = v.splitn(2, '.');
    let major = parts.next().unwrap_or("");
    let minor = parts.next();
    if major != "1" {
        return false;
    }
    matches!(minor, Some(m) if !m.is_empty() && m.bytes().all(|b| b.is_ascii_digit()))
}

fn find_subslice(hay: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || hay.len() < needle.len() {
        return None;
    }
    (0..=hay.len() - needle.len()).find(|&i| &hay[i..i + needle.len()] == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_utf8_bom() {
        let d = detect(&[0xEF, 0xBB, 0xBF, b'<']).unwrap();
        assert_eq!(d.encoding, UTF_8);
        assert_eq!(d.bom_len, 3);
        assert!(d.had_bom);
    }

    #[test]
    fn detects_utf16le_without_bom() {
        let d = detect(b"<\0?\0xml ").unwrap();
        assert_eq!(d.encoding, UTF_16LE);
        assert!(!d.had_bom);
    }

    #[test]
    fn parses_xml_decl_version_and_encoding() {
        let bytes = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?><r/>";
        match parse_decl(bytes, false) {
            DeclResult::Present(info) => {
                assert_eq!(info.version.as_deref(), Some("1.0"));
                assert_eq!(info.encoding.as_deref(), Some("UTF-8"));
                assert_eq!(&bytes[info.byte_len..], b"<r/>");
            }
            other => panic!("expected Present, got {:?}", discriminant_name(&other)),
        }
    }

    #[test]
    fn text_decl_requires_encoding() {
        let bytes = b"<?xml version=\"1.0\"?>";
        match parse_decl(bytes, true) {
            DeclResult::Malformed(_) => {}
            other => panic!("expected Malformed, got {:?}", discriminant_name(&other)),
        }
    }

    #[test]
    fn rejects_bad_version() {
        let bytes = b"<?xml version=\"2.0\"?><r/>";
        match parse_decl(bytes, false) {
            DeclResult::Malformed(_) => {}
            other => panic!("expected Malformed, got {:?}", discriminant_name(&other)),
        }
    }

    fn discriminant_name(r: &DeclResult) -> &'static str {
        match r {
            DeclResult::Absent => "Absent",
            DeclResult::Present(_) => "Present",
            DeclResult::Underflow => "Underflow",
            DeclResult::Malformed(_) => "Malformed",
        }
    }
}
