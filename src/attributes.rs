//! The attribute list (§4.3 "Attribute handling"): a flat, insertion-ordered
//! container with lazy value normalisation.

use std::rc::Rc;

/// How an attribute value normalises, driven by its declared type (or `CDATA`
/// when there is no declaration, i.e. no DTD or an undeclared attribute).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    CData,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    Notation,
    Enumeration,
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub uri: Option<Rc<str>>,
    pub local_name: Rc<str>,
    pub qname: Rc<str>,
    pub attr_type: AttributeType,
    raw_value: String,
    normalized: Option<String>,
    /// `false` for a value injected from a DTD default rather than typed by
    /// the document author.
    pub specified: bool,
}

impl Attribute {
    /// The value, normalising lazily on first access per the type rules in
    /// §4.3: whitespace collapses to a single space always, and for
    /// non-CDATA types the result is additionally trimmed and internal runs
    /// of spaces are collapsed to one.
    pub fn value(&mut self) -> &str {
        if self.normalized.is_none() {
            self.normalized = Some(normalize(&self.raw_value, self.attr_type));
        }
        self.normalized.as_deref().unwrap()
    }

    pub fn raw_value(&self) -> &str {
        &self.raw_value
    }
}

fn normalize(raw: &str, ty: AttributeType) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\n' | '\t' | '\r' => out.push(' '),
            other => out.push(other),
        }
    }
    if ty == AttributeType::CData {
        return out;
    }
    let collapsed: String = out.split(' ').filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");
    collapsed
}

/// Flat, insertion-ordered attribute container. Duplicate detection is on
/// `(uri, localName)` when namespace processing is on, or on `qname`
/// otherwise — callers pass whichever key applies via `namespaces_enabled`.
#[derive(Debug, Default)]
pub struct AttributeList {
    items: Vec<Attribute>,
}

impl AttributeList {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.items.iter()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Attribute> {
        self.items.get_mut(index)
    }

    /// Finds an existing attribute with the given namespace key, per
    /// whichever duplicate-detection rule is active.
    pub fn find_duplicate(&self, uri: Option<&str>, local_name: &str, qname: &str, namespaces_enabled: bool) -> Option<usize> {
        self.items.iter().position(|a| {
            if namespaces_enabled {
                a.uri.as_deref() == uri && &*a.local_name == local_name
            } else {
                &*a.qname == qname
            }
        })
    }

    pub fn push(
        &mut self,
        uri: Option<Rc<str>>,
        local_name: Rc<str>,
        qname: Rc<str>,
        attr_type: AttributeType,
        raw_value: String,
        specified: bool,
    ) {
        self.items.push(Attribute {
            uri,
            local_name,
            qname,
            attr_type,
            raw_value,
            normalized: None,
            specified,
        });
    }

    /// Forces every attribute's lazy normalisation to run up front. Called
    /// just before `start_element` dispatch, since `ContentHandler` takes the
    /// list by shared reference and `Attribute::value` otherwise needs `&mut
    /// self` to memoise on first read.
    pub fn normalize_all(&mut self) {
        for attr in &mut self.items {
            attr.value();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cdata_normalisation_only_maps_whitespace_to_spaces() {
        assert_eq!(normalize("a\tb\nc", AttributeType::CData), "a b c");
    }

    #[test]
    fn non_cdata_normalisation_collapses_runs_and_trims() {
        assert_eq!(normalize("  a   b  ", AttributeType::NmTokens), "a b");
    }

    #[test]
    fn duplicate_detection_uses_uri_and_local_name_when_namespaces_enabled() {
        let mut list = AttributeList::new();
        list.push(Some(Rc::from("urn:x")), Rc::from("a"), Rc::from("p:a"), AttributeType::CData, "1".into(), true);
        assert!(list.find_duplicate(Some("urn:x"), "a", "q:a", true).is_some());
        assert!(list.find_duplicate(Some("urn:x"), "a", "q:a", false).is_none());
    }
}
