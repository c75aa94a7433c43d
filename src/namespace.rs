//! Namespace resolution (§4.3 "Namespace resolution"): a stack of flat
//! prefix→URI frames, one per open element, with `xmlns`/`xmlns:prefix`
//! interception.
//!
//! Grounded on the teacher's `NamespacedParser` (`reader/parser.rs`), which
//! wraps a base parser via `delegate!` and tracks a `ns_resolver` alongside
//! a `pending_pop` count of namespace frames to retire on the next
//! `read_event`; the frame/stack shape here is the same idea generalized to
//! push-mode dispatch (frames pop explicitly on `endElement` rather than on
//! the next `read_event` call).

use std::rc::Rc;

pub const XML_URI: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_URI: &str = "http://www.w3.org/2000/xmlns/";

#[derive(Debug, Default)]
struct Frame {
    bindings: Vec<(Rc<str>, Rc<str>)>,
    default_uri: Option<Rc<str>>,
}

/// A stack of namespace scopes, one pushed per open element.
#[derive(Debug, Default)]
pub struct NamespaceStack {
    frames: Vec<Frame>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceError {
    UnboundPrefix(String),
    ReservedPrefix(String),
    EmptyNonDefaultUri(String),
}

impl NamespaceStack {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn push_scope(&mut self) {
        self.frames.push(Frame::default());
    }

    pub fn pop_scope(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Intercepts an `xmlns`/`xmlns:prefix` attribute, binding it in the
    /// current (top) frame. `xml11` relaxes the "non-empty" rule: XML 1.1
    /// allows undeclaring a prefix binding with an empty URI.
    pub fn declare(&mut self, prefix: Option<&str>, uri: &str, xml11: bool) -> Result<(), NamespaceError> {
        match prefix {
            None => {
                let frame = self.frames.last_mut().expect("declare called without an open scope");
                frame.default_uri = if uri.is_empty() { None } else { Some(Rc::from(uri)) };
                Ok(())
            }
            Some("xml") => {
                if uri == XML_URI {
                    Ok(())
                } else {
                    Err(NamespaceError::ReservedPrefix("xml".to_string()))
                }
            }
            Some("xmlns") => Err(NamespaceError::ReservedPrefix("xmlns".to_string())),
            Some(p) => {
                if uri.is_empty() && !xml11 {
                    return Err(NamespaceError::EmptyNonDefaultUri(p.to_string()));
                }
                let frame = self.frames.last_mut().expect("declare called without an open scope");
                if uri.is_empty() {
                    frame.bindings.retain(|(k, _)| &**k != p);
                } else {
                    frame.bindings.push((Rc::from(p), Rc::from(uri)));
                }
                Ok(())
            }
        }
    }

    /// Resolves a prefix to its currently bound URI, searching from the
    /// innermost (top) frame outward.
    pub fn resolve_prefix(&self, prefix: &str) -> Option<Rc<str>> {
        if prefix == "xml" {
            return Some(Rc::from(XML_URI));
        }
        if prefix == "xmlns" {
            return Some(Rc::from(XMLNS_URI));
        }
        for frame in self.frames.iter().rev() {
            if let Some((_, uri)) = frame.bindings.iter().rev().find(|(p, _)| &**p == prefix) {
                return Some(Rc::clone(uri));
            }
        }
        None
    }

    pub fn resolve_default(&self) -> Option<Rc<str>> {
        self.frames.iter().rev().find_map(|f| f.default_uri.clone())
    }

    /// `processName`: splits a raw qualified name on its first colon and
    /// resolves the prefix (or the default namespace, for element names
    /// only — callers pass `is_attribute` to suppress default-namespace
    /// application per the WFC/NSC rule that unprefixed attributes are
    /// never put in any namespace).
    pub fn process_name(&self, qname: &str, is_attribute: bool) -> Result<(Option<Rc<str>>, Rc<str>), NamespaceError> {
        match qname.find(':') {
            Some(idx) => {
                let prefix = &qname[..idx];
                let local = &qname[idx + 1..];
                match self.resolve_prefix(prefix) {
                    Some(uri) => Ok((Some(uri), Rc::from(local))),
                    None => Err(NamespaceError::UnboundPrefix(prefix.to_string())),
                }
            }
            None => {
                if is_attribute {
                    Ok((None, Rc::from(qname)))
                } else {
                    Ok((self.resolve_default(), Rc::from(qname)))
                }
            }
        }
    }

    /// Declared prefix bindings in the current (top) frame, in declaration
    /// order — used to drive `startPrefixMapping` calls, and in reverse for
    /// `endPrefixMapping`.
    pub fn current_frame_bindings(&self) -> &[(Rc<str>, Rc<str>)] {
        self.frames.last().map(|f| f.bindings.as_slice()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_prefix_declared_in_enclosing_scope() {
        let mut ns = NamespaceStack::new();
        ns.push_scope();
        ns.declare(Some("p"), "urn:example", false).unwrap();
        ns.push_scope();
        assert_eq!(ns.resolve_prefix("p").as_deref(), Some("urn:example"));
    }

    #[test]
    fn unbound_prefix_is_an_error() {
        let ns = NamespaceStack::new();
        assert_eq!(
            ns.process_name("p:local", false),
            Err(NamespaceError::UnboundPrefix("p".to_string()))
        );
    }

    #[test]
    fn default_namespace_does_not_apply_to_attributes() {
        let mut ns = NamespaceStack::new();
        ns.push_scope();
        ns.declare(None, "urn:default", false).unwrap();
        let (uri, local) = ns.process_name("attr", true).unwrap();
        assert_eq!(uri, None);
        assert_eq!(&*local, "attr");
    }

    #[test]
    fn xml_prefix_is_reserved_to_its_fixed_uri() {
        let mut ns = NamespaceStack::new();
        ns.push_scope();
        assert!(ns.declare(Some("xml"), "urn:wrong", false).is_err());
        assert!(ns.declare(Some("xml"), XML_URI, false).is_ok());
    }
}
