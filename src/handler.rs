//! Handler capability set (§6 "Event consumer contract"): the parser speaks
//! to its caller only through these traits, each independently optional.
//!
//! Grounded on `other_examples/837206a7_Mingun-quick-xml__src-reader-resolver.rs.rs`'s
//! trait-object-based resolver contract, generalized from "one resolver
//! trait" to the full `{content, dtd, lexical, error}` capability split §9
//! describes, each with a default no-op body so a caller only overrides what
//! it cares about.

use crate::attributes::AttributeList;
use crate::errors::{Locator, XmlError};

/// Structural document events: elements, character data, processing
/// instructions, prefix mappings, skipped entities.
pub trait ContentHandler {
    fn set_document_locator(&mut self, _locator: &Locator) {}
    fn start_document(&mut self) {}
    fn end_document(&mut self) {}

    fn start_prefix_mapping(&mut self, _prefix: &str, _uri: &str) {}
    fn end_prefix_mapping(&mut self, _prefix: &str) {}

    fn start_element(&mut self, _uri: Option<&str>, _local_name: &str, _qname: &str, _attrs: &AttributeList) {}
    fn end_element(&mut self, _uri: Option<&str>, _local_name: &str, _qname: &str) {}

    fn characters(&mut self, _chars: &str) {}
    fn ignorable_whitespace(&mut self, _chars: &str) {}

    fn processing_instruction(&mut self, _target: &str, _data: &str) {}

    /// An entity reference was not expanded (no declaration, or expansion
    /// was suppressed by configuration).
    fn skipped_entity(&mut self, _name: &str) {}
}

/// DTD-declaration events, independent of the lexical/comment stream.
pub trait DtdHandler {
    fn notation_decl(&mut self, _name: &str, _public_id: Option<&str>, _system_id: Option<&str>) {}
    fn unparsed_entity_decl(
        &mut self,
        _name: &str,
        _public_id: Option<&str>,
        _system_id: Option<&str>,
        _notation_name: &str,
    ) {
    }
}

/// Lexical events a content-tree consumer usually doesn't need: comments,
/// CDATA section boundaries, entity boundaries, the DTD's extent.
pub trait LexicalHandler {
    fn start_dtd(&mut self, _name: &str, _public_id: Option<&str>, _system_id: Option<&str>) {}
    fn end_dtd(&mut self) {}

    fn start_entity(&mut self, _name: &str) {}
    fn end_entity(&mut self, _name: &str) {}

    fn start_cdata(&mut self) {}
    fn end_cdata(&mut self) {}

    fn comment(&mut self, _chars: &str) {}
}

/// Error reporting. `error`/`warning` return to let the parser continue;
/// `fatal_error` is informational only — the parser always stops after a
/// fatal well-formedness violation regardless of what this returns.
pub trait ErrorHandler {
    fn warning(&mut self, _error: &XmlError) {}
    fn error(&mut self, _error: &XmlError) {}
    fn fatal_error(&mut self, _error: &XmlError) {}
}

/// No-op implementations of every handler trait, for callers that only want
/// a subset (e.g. `content` but not `lexical`).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

impl ContentHandler for NullHandler {}
impl DtdHandler for NullHandler {}
impl LexicalHandler for NullHandler {}
impl ErrorHandler for NullHandler {}

/// The bundle of handler capabilities a parser is given for one parse.
/// Mirrors §9's "capability set `{content, dtd, lexical, error, resolver}`"
/// — the resolver itself lives in [`crate::entity::EntityResolver`], since it
/// has a different call shape (returns a byte stream, can fail with I/O
/// errors) from the callback traits here.
pub struct Handlers<'a> {
    pub content: &'a mut dyn ContentHandler,
    pub dtd: &'a mut dyn DtdHandler,
    pub lexical: &'a mut dyn LexicalHandler,
    pub error: &'a mut dyn ErrorHandler,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        started: Vec<String>,
    }

    impl ContentHandler for Recorder {
        fn start_element(&mut self, _uri: Option<&str>, local_name: &str, _qname: &str, _attrs: &AttributeList) {
            self.started.push(local_name.to_string());
        }
    }

    #[test]
    fn unoverridden_methods_are_no_ops() {
        let mut h = NullHandler;
        h.start_document();
        h.characters("text");
        h.end_document();
    }

    #[test]
    fn overridden_methods_run() {
        let mut r = Recorder::default();
        let attrs = AttributeList::new();
        r.start_element(None, "root", "root", &attrs);
        assert_eq!(r.started, vec!["root".to_string()]);
    }
}
