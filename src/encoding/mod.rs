//! Encoding autodetection and incremental decoding to UTF-16 code units (§4.1).

mod detect;

pub use detect::{detect, parse_decl, DeclInfo, DeclResult, Detected};

use encoding_rs::{Encoding, UTF_8};

use crate::errors::{Error, ErrorKind, Locator};

/// How the current encoding was determined, mirroring the teacher's
/// `EncodingRef` state machine (`Implicit` → `BomDetected`/`Explicit` →
/// `XmlDetected`) so later stages (a declared `encoding="..."`) can refine
/// an implicit guess but never override an explicit one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingSource {
    Implicit,
    BomDetected,
    Explicit,
    XmlDetected,
}

impl EncodingSource {
    fn can_be_refined(self) -> bool {
        matches!(self, EncodingSource::Implicit | EncodingSource::BomDetected)
    }
}

/// Converts a byte stream into UTF-16 code units, autodetecting the source
/// encoding from BOM/leading bytes and the XML/text declaration, per §4.1.
///
/// The decoder buffers bytes until it has resolved an encoding (it needs to
/// see past any declaration first), then drives an `encoding_rs::Decoder`
/// incrementally: bytes decode to a UTF-8 scratch `String`, which is then
/// re-encoded with `str::encode_utf16` into the code units the rest of the
/// pipeline consumes. This keeps surrogate-pair handling exact without a
/// hand-rolled per-encoding table.
pub struct Decoder {
    encoding: &'static Encoding,
    source: EncodingSource,
    inner: encoding_rs::Decoder,
    /// Bytes buffered before an encoding has been resolved.
    pending: Vec<u8>,
    resolved: bool,
    /// Set once a declaration has been consumed, so we don't try twice.
    decl_consumed: bool,
    is_text_decl: bool,
    scratch: String,
    locator: Locator,
    declared_version: Option<String>,
    declared_standalone: Option<String>,
}

impl Decoder {
    /// `is_text_decl` selects XML declaration (`version` required,
    /// `standalone` allowed) vs. text declaration (`encoding` required,
    /// `standalone` forbidden) parsing rules for the leading declaration.
    pub fn new(is_text_decl: bool) -> Self {
        Self {
            encoding: UTF_8,
            source: EncodingSource::Implicit,
            inner: UTF_8.new_decoder_without_bom_handling(),
            pending: Vec::new(),
            resolved: false,
            decl_consumed: false,
            is_text_decl,
            scratch: String::new(),
            locator: Locator::new(),
            declared_version: None,
            declared_standalone: None,
        }
    }

    /// Locks the encoding, bypassing BOM/declaration autodetection. Used
    /// when a caller already knows the encoding (e.g. parsing a Rust `&str`,
    /// which is always valid UTF-8).
    pub fn with_explicit_encoding(encoding: &'static Encoding) -> Self {
        Self {
            encoding,
            source: EncodingSource::Explicit,
            inner: encoding.new_decoder_without_bom_handling(),
            pending: Vec::new(),
            resolved: true,
            decl_consumed: true,
            is_text_decl: false,
            scratch: String::new(),
            locator: Locator::new(),
            declared_version: None,
            declared_standalone: None,
        }
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// The `version` pseudo-attribute of the declaration this decoder
    /// consumed, if any (absent for a text declaration's caller, which
    /// doesn't carry a version).
    pub fn declared_version(&self) -> Option<&str> {
        self.declared_version.as_deref()
    }

    pub fn declared_standalone(&self) -> Option<&str> {
        self.declared_standalone.as_deref()
    }

    /// Feeds a chunk of bytes, returning the newly available UTF-16 code
    /// units. May return an empty vector if more bytes are needed before an
    /// encoding can be resolved.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<u16>, Error> {
        self.pending.extend_from_slice(bytes);
        if !self.resolved && !self.try_resolve()? {
            return Ok(Vec::new());
        }

        if !self.decl_consumed {
            if !self.try_consume_decl()? {
                return Ok(Vec::new());
            }
        }

        self.drain_pending(false)
    }

    /// Flushes any buffered bytes at end-of-input. Fails if bytes remain
    /// that do not form a complete codepoint.
    pub fn close(&mut self) -> Result<Vec<u16>, Error> {
        if !self.resolved {
            // Not enough bytes ever arrived to sniff 4 leading bytes; treat
            // whatever is pending as UTF-8 per the "defaults to UTF-8
            // tentatively" fallback.
            self.resolved = true;
        }
        if !self.decl_consumed {
            self.decl_consumed = true;
        }
        let units = self.drain_pending(true)?;
        if !self.pending.is_empty() {
            return Err(Error::fatal(ErrorKind::TruncatedEncoding, self.locator.clone()));
        }
        Ok(units)
    }

    fn try_resolve(&mut self) -> Result<bool, Error> {
        let detected = match detect::detect(&self.pending) {
            Some(d) => d,
            None => return Ok(false),
        };
        if detect::is_utf32_marker(&detected) {
            return Err(Error::fatal(
                ErrorKind::UnsupportedEncoding("UTF-32".to_string()),
                self.locator.clone(),
            ));
        }
        self.encoding = detected.encoding;
        self.source = if detected.had_bom {
            EncodingSource::BomDetected
        } else {
            EncodingSource::Implicit
        };
        self.inner = self.encoding.new_decoder_without_bom_handling();
        self.pending.drain(0..detected.bom_len);
        self.resolved = true;
        Ok(true)
    }

    /// Attempts to pre-parse the declaration directly from buffered bytes.
    /// Only meaningful once an encoding has been tentatively resolved from
    /// the BOM/leading-bytes step; a declared `encoding=` may still refine
    /// it (or conflict with it fatally).
    fn try_consume_decl(&mut self) -> Result<bool, Error> {
        // The declaration parser wants ASCII-shaped bytes; for UTF-16
        // candidates we must first strip the interleaved NUL bytes enough
        // to recognise ASCII structure. We approximate by decoding the
        // buffered prefix through the detected encoding into UTF-8 text and
        // re-deriving a byte length mapping is unnecessary here because we
        // only need to *detect* `encoding="..."`; actual content decoding
        // happens uniformly below via `drain_pending`.
        let ascii_view: Vec<u8> = if self.encoding == UTF_8 {
            self.pending.clone()
        } else {
            // UTF-16: every other byte is the low/high half of an ASCII
            // codepoint; reconstruct a one-byte-per-char ASCII view for the
            // declaration scan only.
            decode_ascii_from_utf16(&self.pending, self.encoding)
        };

        match detect::parse_decl(&ascii_view, self.is_text_decl) {
            DeclResult::Absent => {
                self.decl_consumed = true;
                Ok(true)
            }
            DeclResult::Underflow => Ok(false),
            DeclResult::Malformed(msg) => Err(Error::fatal(
                ErrorKind::InvalidVersion(msg.to_string()),
                self.locator.clone(),
            )),
            DeclResult::Present(info) => {
                if let Some(v) = &info.version {
                    if !self.is_text_decl && is_invalid_version(v) {
                        return Err(Error::fatal(
                            ErrorKind::InvalidVersion(v.clone()),
                            self.locator.clone(),
                        ));
                    }
                }
                self.declared_version = info.version.clone();
                self.declared_standalone = info.standalone.clone();
                if let Some(name) = &info.encoding {
                    self.apply_declared_encoding(name)?;
                }
                let byte_len = if self.encoding == UTF_8 {
                    info.byte_len
                } else {
                    info.byte_len * 2
                };
                self.pending.drain(0..byte_len.min(self.pending.len()));
                self.decl_consumed = true;
                Ok(true)
            }
        }
    }

    fn apply_declared_encoding(&mut self, name: &str) -> Result<(), Error> {
        let declared = Encoding::for_label(name.as_bytes()).ok_or_else(|| {
            Error::fatal(
                ErrorKind::UnsupportedEncoding(name.to_string()),
                self.locator.clone(),
            )
        })?;

        if !self.source.can_be_refined() {
            // Explicit or already-xml-detected: a second, contradicting
            // declaration is a mismatch.
            if declared != self.encoding {
                return Err(Error::fatal(
                    ErrorKind::EncodingMismatch {
                        declared: name.to_string(),
                        detected: self.encoding.name().to_string(),
                    },
                    self.locator.clone(),
                ));
            }
            return Ok(());
        }

        let detected_family_is_utf16 = self.encoding == encoding_rs::UTF_16LE
            || self.encoding == encoding_rs::UTF_16BE;
        let declared_family_is_utf16 =
            declared == encoding_rs::UTF_16LE || declared == encoding_rs::UTF_16BE;

        if self.source == EncodingSource::BomDetected
            && detected_family_is_utf16
            && !declared_family_is_utf16
        {
            return Err(Error::fatal(
                ErrorKind::EncodingMismatch {
                    declared: name.to_string(),
                    detected: self.encoding.name().to_string(),
                },
                self.locator.clone(),
            ));
        }

        // A BOM already commits to byte order; only switch encodings within
        // the same endianness family, or from a no-BOM tentative UTF-8 guess.
        if self.source == EncodingSource::BomDetected && detected_family_is_utf16 {
            self.encoding = if self.encoding == encoding_rs::UTF_16LE {
                encoding_rs::UTF_16LE
            } else {
                encoding_rs::UTF_16BE
            };
        } else {
            self.encoding = declared;
        }
        self.inner = self.encoding.new_decoder_without_bom_handling();
        self.source = EncodingSource::XmlDetected;
        Ok(())
    }

    fn drain_pending(&mut self, last: bool) -> Result<Vec<u16>, Error> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }
        self.scratch.clear();
        let (result, consumed, _had_errors) =
            self.inner.decode_to_string(&self.pending, &mut self.scratch, last);
        self.pending.drain(0..consumed);
        match result {
            encoding_rs::CoderResult::InputEmpty | encoding_rs::CoderResult::OutputFull => {
                Ok(self.scratch.encode_utf16().collect())
            }
        }
    }
}

/// Reconstructs a one-byte-per-character ASCII view from a UTF-16 buffer for
/// the sole purpose of scanning a declaration with the byte-level grammar in
/// [`detect::parse_decl`]. Any non-ASCII code unit stops the view (the
/// declaration is required to be entirely ASCII).
fn decode_ascii_from_utf16(bytes: &[u8], encoding: &'static Encoding) -> Vec<u8> {
    let little_endian = encoding == encoding_rs::UTF_16LE;
    let mut out = Vec::with_capacity(bytes.len() / 2);
    let mut i = 0;
    while i + 1 < bytes.len() {
        let unit = if little_endian {
            u16::from_le_bytes([bytes[i], bytes[i + 1]])
        } else {
            u16::from_be_bytes([bytes[i], bytes[i + 1]])
        };
        if unit > 0x7F {
            break;
        }
        out.push(unit as u8);
        i += 2;
    }
    out
}

fn is_invalid_version(v: &str) -> bool {
    let mut parts = v.splitn(2, '.');
    let major = parts.next().unwrap_or("");
    let minor = parts.next();
    !(major == "1" && matches!(minor, Some(m) if !m.is_empty() && m.bytes().all(|b| b.is_ascii_digit())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_utf8_with_no_declaration() {
        let mut dec = Decoder::new(false);
        let mut units = dec.feed(b"<r/>").unwrap();
        units.extend(dec.close().unwrap());
        assert_eq!(String::from_utf16(&units).unwrap(), "<r/>");
    }

    #[test]
    fn resolves_encoding_from_xml_declaration() {
        let mut dec = Decoder::new(false);
        let input = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?><r/>";
        let mut units = dec.feed(input).unwrap();
        units.extend(dec.close().unwrap());
        assert_eq!(String::from_utf16(&units).unwrap(), "<r/>");
        assert_eq!(dec.encoding().name(), "UTF-8");
    }

    #[test]
    fn split_chunk_across_declaration_boundary_still_decodes() {
        let mut dec = Decoder::new(false);
        let input = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?><root>hi</root>";
        let mut units = Vec::new();
        for chunk in input.chunks(3) {
            units.extend(dec.feed(chunk).unwrap());
        }
        units.extend(dec.close().unwrap());
        assert_eq!(
            String::from_utf16(&units).unwrap(),
            "<root>hi</root>"
        );
    }

    #[test]
    fn utf16_bom_plus_matching_declaration() {
        let mut dec = Decoder::new(false);
        let text = "<?xml version=\"1.0\" encoding=\"UTF-16\"?><r/>";
        let mut bytes = vec![0xFFu8, 0xFE];
        for u in text.encode_utf16() {
            bytes.extend_from_slice(&u.to_le_bytes());
        }
        let mut units = dec.feed(&bytes).unwrap();
        units.extend(dec.close().unwrap());
        assert_eq!(String::from_utf16(&units).unwrap(), "<r/>");
    }

    #[test]
    fn conflicting_declared_encoding_is_fatal() {
        let mut dec = Decoder::new(false);
        let text = "<?xml version=\"1.0\" encoding=\"UTF-8\"?><r/>";
        let mut bytes = vec![0xFFu8, 0xFE];
        for u in text.encode_utf16() {
            bytes.extend_from_slice(&u.to_le_bytes());
        }
        let err = dec.feed(&bytes);
        assert!(err.is_err());
    }
}
