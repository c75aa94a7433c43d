//! [`CharClass`]: the classifier feeding the two-level state table (§4.2).

/// The class a single (already line-normalised) character falls into for
/// table lookup purposes. Punctuation that participates in lexical
/// transitions gets its own class; everything else collapses to `Other`
/// (ordinary content/name characters handled by the greedy accumulators).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharClass {
    NameStart,
    NameContinuation,
    Digit,
    HexDigit,
    Whitespace,
    Lt,
    Gt,
    Slash,
    Bang,
    Question,
    Amp,
    Hash,
    Semicolon,
    Eq,
    Apos,
    Quote,
    Dash,
    LBracket,
    RBracket,
    Percent,
    Colon,
    Pipe,
    Comma,
    Star,
    Plus,
    /// A character that is invalid in this document (not `Char`, or a
    /// `RestrictedChar` when restricted chars are disallowed here).
    Invalid,
    Other,
}

/// Classifies one UTF-16 code unit. `xml11` selects the XML 1.1 `Char`
/// production (which additionally allows most C0/C1 controls as
/// `RestrictedChar`); `allow_restricted` lets a caller permit
/// `RestrictedChar` even outside XML 1.1 proper, per the entity-replacement
/// override described in §4.2.
pub fn classify(unit: u16, xml11: bool, allow_restricted: bool) -> CharClass {
    if !is_valid_char(unit, xml11, allow_restricted) {
        return CharClass::Invalid;
    }
    match unit {
        0x3C => CharClass::Lt,
        0x3E => CharClass::Gt,
        0x2F => CharClass::Slash,
        0x21 => CharClass::Bang,
        0x3F => CharClass::Question,
        0x26 => CharClass::Amp,
        0x23 => CharClass::Hash,
        0x3B => CharClass::Semicolon,
        0x3D => CharClass::Eq,
        0x27 => CharClass::Apos,
        0x22 => CharClass::Quote,
        0x2D => CharClass::Dash,
        0x5B => CharClass::LBracket,
        0x5D => CharClass::RBracket,
        0x25 => CharClass::Percent,
        0x3A => CharClass::Colon,
        0x7C => CharClass::Pipe,
        0x2C => CharClass::Comma,
        0x2A => CharClass::Star,
        0x2B => CharClass::Plus,
        0x09 | 0x0A | 0x0D | 0x20 => CharClass::Whitespace,
        0x30..=0x39 => CharClass::Digit,
        _ if is_hex_digit(unit) => CharClass::HexDigit,
        _ if is_name_start(unit) => CharClass::NameStart,
        _ if is_name_char(unit) => CharClass::NameContinuation,
        _ => CharClass::Other,
    }
}

fn is_hex_digit(u: u16) -> bool {
    matches!(u, 0x30..=0x39 | 0x41..=0x46 | 0x61..=0x66)
}

/// `NameStartChar` production (simplified to the BMP-representable ranges
/// most documents use; full astral-plane name characters arrive as
/// surrogate pairs and are treated as `NameContinuation` continuations of
/// an already-open name by the accumulator, matching how the teacher's
/// byte-oriented scanner treats multi-byte UTF-8 sequences opaquely).
pub fn is_name_start(u: u16) -> bool {
    matches!(u, 0x3A | 0x41..=0x5A | 0x5F | 0x61..=0x7A
        | 0xC0..=0xD6 | 0xD8..=0xF6 | 0xF8..=0x2FF | 0x370..=0x37D
        | 0x37F..=0x1FFF | 0x200C..=0x200D | 0x2070..=0x218F
        | 0x2C00..=0x2FEF | 0x3001..=0xD7FF | 0xF900..=0xFDCF
        | 0xFDF0..=0xFFFD | 0xD800..=0xDBFF)
}

/// `NameChar` production: `NameStartChar` plus digits, `-`, `.`, and the
/// combining/extender ranges.
pub fn is_name_char(u: u16) -> bool {
    is_name_start(u)
        || matches!(u, 0x2D | 0x2E | 0x30..=0x39 | 0xB7 | 0x0300..=0x036F | 0x203F..=0x2040
            | 0xDC00..=0xDFFF)
}

/// `Char` / `RestrictedChar` productions (XML 1.0 §2.2 / XML 1.1 §2.2).
fn is_valid_char(u: u16, xml11: bool, allow_restricted: bool) -> bool {
    if xml11 || allow_restricted {
        match u {
            0x0000 => false,
            0x0001..=0x001F => matches!(u, 0x09 | 0x0A | 0x0D) || xml11 || allow_restricted,
            0x007F..=0x0084 => xml11 || allow_restricted,
            0x0086..=0x009F => xml11 || allow_restricted,
            0xFFFE | 0xFFFF => false,
            0xD800..=0xDFFF => true, // surrogate halves validated as pairs upstream
            _ => true,
        }
    } else {
        matches!(u, 0x09 | 0x0A | 0x0D | 0x20..=0xD7FF | 0xE000..=0xFFFD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_punctuation() {
        assert_eq!(classify('<' as u16, false, false), CharClass::Lt);
        assert_eq!(classify('&' as u16, false, false), CharClass::Amp);
        assert_eq!(classify(' ' as u16, false, false), CharClass::Whitespace);
    }

    #[test]
    fn rejects_null_and_unassigned_noncharacters() {
        assert_eq!(classify(0x0000, false, false), CharClass::Invalid);
        assert_eq!(classify(0xFFFE, true, false), CharClass::Invalid);
    }

    #[test]
    fn xml11_allows_restricted_c0_controls() {
        assert_ne!(classify(0x0001, true, false), CharClass::Invalid);
        assert_eq!(classify(0x0001, false, false), CharClass::Invalid);
    }

    #[test]
    fn hex_digit_takes_priority_over_name_start() {
        assert_eq!(classify('A' as u16, false, false), CharClass::HexDigit);
        assert_eq!(classify('G' as u16, false, false), CharClass::NameStart);
    }
}
