//! Entity declarations and the entity stack (§3 `EntityDeclaration`/
//! `EntityStackEntry`, §4.3 "Entity expansion in content", §4.4 "Parameter
//! entity expansion").
//!
//! The predefined-entity table and the `EntityResolver` contract are
//! grounded on `other_examples/837206a7_Mingun-quick-xml__src-reader-resolver.rs.rs`'s
//! `EntityResolver`/`ReplacementText`/`PredefinedEntityResolver`, generalized
//! from that crate's pull-reader return-a-byte-stream shape to this push
//! parser's "resolver hands back an open reader plus the resolved
//! identifiers" shape (§6 "Entity resolver contract").

use std::collections::HashMap;
use std::io::Read;
use std::rc::Rc;

use crate::errors::{Error, ErrorKind, Locator};

/// One piece of an entity's replacement text: literal characters, or an
/// unexpanded reference to another entity (parameter references are kept
/// unexpanded in stored replacement text per §4.4's "lazy PE expansion"
/// rule, to support chains like `%a;` -> `%b;` -> external `%c;`).
#[derive(Debug, Clone)]
pub enum ReplacementPiece {
    Text(Rc<str>),
    GeneralEntity(Rc<str>),
    ParameterEntity(Rc<str>),
}

#[derive(Debug, Clone)]
pub struct ExternalId {
    pub public_id: Option<Rc<str>>,
    pub system_id: Rc<str>,
}

#[derive(Debug, Clone)]
pub struct EntityDeclaration {
    pub name: Rc<str>,
    pub is_parameter: bool,
    /// Non-empty iff this is an internal entity (invariant: exactly one of
    /// `replacement_text`/`external_id` is populated).
    pub replacement_text: Vec<ReplacementPiece>,
    pub external_id: Option<ExternalId>,
    pub notation_name: Option<Rc<str>>,
    /// Whether the stored replacement text was built (directly or
    /// transitively) from character references, which changes how content
    /// expansion treats it (§4.3 "If the declaration's flag says it was
    /// built from character references, emit ... as character data without
    /// re-tokenising").
    pub contains_character_references: bool,
    pub contains_restricted_char_from_char_ref: bool,
    pub declaration_base_uri: Option<Rc<str>>,
}

impl EntityDeclaration {
    pub fn is_external(&self) -> bool {
        self.external_id.is_some()
    }

    pub fn is_unparsed(&self) -> bool {
        self.notation_name.is_some()
    }

    /// Whether content expansion can skip re-tokenising and dispatch the
    /// replacement text directly as character data (the "bypass" flag):
    /// true when the text contains no unexpanded entity references at all.
    pub fn bypass_eligible(&self) -> bool {
        self.replacement_text
            .iter()
            .all(|p| matches!(p, ReplacementPiece::Text(_)))
    }
}

/// Predefined entities never need a declaration: `&lt; &gt; &amp; &apos;
/// &quot;`. The tokenizer already expands these before the content parser
/// sees them (`Token::PredefEntityRef`); this table exists for completeness
/// and for handlers/validators that need to resolve a name independent of
/// tokenizer state.
pub fn predefined_replacement(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "apos" => Some('\''),
        "quot" => Some('"'),
        _ => None,
    }
}

/// One entry in the entity expansion stack; the bottom entry is always the
/// document entity itself. See §3 `EntityStackEntry`.
#[derive(Debug, Clone)]
pub struct EntityStackEntry {
    pub entity_name: Option<Rc<str>>,
    pub is_parameter_entity: bool,
    pub system_id: Option<Rc<str>>,
    pub public_id: Option<Rc<str>>,
    pub xml11: bool,
    pub entity_expansion_depth: usize,
    pub content_model_depth_at_entry: usize,
}

/// Tracks the live entity-expansion stack and the two recursion-detection
/// keys (entity name, and resolved systemId for external entities).
#[derive(Debug, Default)]
pub struct EntityStack {
    entries: Vec<EntityStackEntry>,
    active_names: HashMap<Rc<str>, usize>,
    active_system_ids: HashMap<Rc<str>, usize>,
}

impl EntityStack {
    pub fn new(document_entry: EntityStackEntry) -> Self {
        let mut s = Self::default();
        s.entries.push(document_entry);
        s
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn top(&self) -> &EntityStackEntry {
        self.entries.last().expect("entity stack is never empty")
    }

    /// Updates the bottom (document) entry's `xml11` flag. Used once the
    /// document's own declaration has been parsed, which happens after the
    /// document entry was constructed.
    pub fn set_document_xml11(&mut self, xml11: bool) {
        if let Some(bottom) = self.entries.first_mut() {
            bottom.xml11 = xml11;
        }
    }

    /// Pushes a new entity onto the stack, failing with `RecursiveEntity` if
    /// the name or resolved systemId is already active.
    pub fn push(&mut self, entry: EntityStackEntry, locator: &Locator) -> Result<(), Error> {
        if let Some(name) = &entry.entity_name {
            if self.active_names.contains_key(name) {
                return Err(Error::fatal(
                    ErrorKind::RecursiveEntity(name.to_string()),
                    locator.clone(),
                ));
            }
        }
        if let Some(sid) = &entry.system_id {
            if self.active_system_ids.contains_key(sid) {
                return Err(Error::fatal(
                    ErrorKind::RecursiveEntity(sid.to_string()),
                    locator.clone(),
                ));
            }
        }
        let depth = self.entries.len();
        if let Some(name) = &entry.entity_name {
            self.active_names.insert(Rc::clone(name), depth);
        }
        if let Some(sid) = &entry.system_id {
            self.active_system_ids.insert(Rc::clone(sid), depth);
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<EntityStackEntry> {
        let entry = self.entries.pop()?;
        if let Some(name) = &entry.entity_name {
            self.active_names.remove(name);
        }
        if let Some(sid) = &entry.system_id {
            self.active_system_ids.remove(sid);
        }
        Some(entry)
    }
}

/// The byte stream and resolved identifiers an [`EntityResolver`] hands back
/// for an external entity reference (§6 "Entity resolver contract").
pub struct ResolvedEntity {
    pub public_id: Option<String>,
    pub system_id: String,
    pub stream: Box<dyn Read>,
}

/// Resolves external general/parameter entities and the external DTD
/// subset to a byte stream. `None` means "use system default resolution"
/// (open `system_id` as a local file or URL), matching the teacher-adjacent
/// resolver's `None`-means-unresolved convention.
pub trait EntityResolver {
    fn resolve_entity(
        &self,
        name: Option<&str>,
        public_id: Option<&str>,
        system_id: &str,
        base_uri: Option<&str>,
    ) -> std::io::Result<Option<ResolvedEntity>>;
}

/// The default resolver: always defers to system default resolution.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEntityResolver;

impl EntityResolver for DefaultEntityResolver {
    fn resolve_entity(
        &self,
        _name: Option<&str>,
        _public_id: Option<&str>,
        _system_id: &str,
        _base_uri: Option<&str>,
    ) -> std::io::Result<Option<ResolvedEntity>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, system_id: Option<&str>) -> EntityStackEntry {
        EntityStackEntry {
            entity_name: Some(Rc::from(name)),
            is_parameter_entity: false,
            system_id: system_id.map(Rc::from),
            public_id: None,
            xml11: false,
            entity_expansion_depth: 0,
            content_model_depth_at_entry: 0,
        }
    }

    #[test]
    fn detects_direct_recursion_by_name() {
        let doc = EntityStackEntry {
            entity_name: None,
            is_parameter_entity: false,
            system_id: None,
            public_id: None,
            xml11: false,
            entity_expansion_depth: 0,
            content_model_depth_at_entry: 0,
        };
        let mut stack = EntityStack::new(doc);
        let locator = Locator::new();
        stack.push(entry("a", None), &locator).unwrap();
        let err = stack.push(entry("a", None), &locator);
        assert!(err.is_err());
    }

    #[test]
    fn detects_recursion_by_resolved_system_id_even_with_different_names() {
        let doc = EntityStackEntry {
            entity_name: None,
            is_parameter_entity: false,
            system_id: None,
            public_id: None,
            xml11: false,
            entity_expansion_depth: 0,
            content_model_depth_at_entry: 0,
        };
        let mut stack = EntityStack::new(doc);
        let locator = Locator::new();
        stack.push(entry("a", Some("file:///shared.ent")), &locator).unwrap();
        let err = stack.push(entry("b", Some("file:///shared.ent")), &locator);
        assert!(err.is_err());
    }

    #[test]
    fn pop_frees_the_name_for_reuse() {
        let doc = EntityStackEntry {
            entity_name: None,
            is_parameter_entity: false,
            system_id: None,
            public_id: None,
            xml11: false,
            entity_expansion_depth: 0,
            content_model_depth_at_entry: 0,
        };
        let mut stack = EntityStack::new(doc);
        let locator = Locator::new();
        stack.push(entry("a", None), &locator).unwrap();
        stack.pop();
        assert!(stack.push(entry("a", None), &locator).is_ok());
    }
}
