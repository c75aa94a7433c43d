//! Declaration tables and the per-markup-declaration token-driven builders
//! (§4.4 "Sub-parsers ... all pushdown FSMs fed one token at a time").

use std::collections::HashMap;
use std::rc::Rc;

use crate::content_model::{ContentModel, Particle};
use crate::entity::{EntityDeclaration, ExternalId, ReplacementPiece};
use crate::errors::{Error, ErrorKind, Locator};
use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeMode {
    Required,
    Implied,
    Fixed,
    Default,
}

#[derive(Debug, Clone)]
pub struct AttributeDeclaration {
    pub name: Rc<str>,
    pub type_name: Rc<str>,
    pub enumeration: Vec<Rc<str>>,
    pub mode: AttributeMode,
    pub default_value: Option<Rc<str>>,
    pub from_external_subset: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementContentType {
    Empty,
    Any,
    Mixed,
    Element,
}

#[derive(Debug, Clone)]
pub struct ElementDeclaration {
    pub name: Rc<str>,
    pub content_type: ElementContentType,
    pub content_model: Option<ContentModel>,
}

#[derive(Debug, Clone)]
pub struct NotationDeclaration {
    pub name: Rc<str>,
    pub public_id: Option<Rc<str>>,
    pub system_id: Option<Rc<str>>,
}

/// The registered declaration tables a [`super::DtdParser`] builds up over
/// the internal and (if present) external subset.
#[derive(Debug, Default)]
pub struct DeclarationTables {
    pub elements: HashMap<Rc<str>, ElementDeclaration>,
    pub attlists: HashMap<Rc<str>, Vec<AttributeDeclaration>>,
    pub general_entities: HashMap<Rc<str>, EntityDeclaration>,
    pub parameter_entities: HashMap<Rc<str>, EntityDeclaration>,
    pub notations: HashMap<Rc<str>, NotationDeclaration>,
}

impl DeclarationTables {
    /// First-declaration-binding: returns `true` if this is the first time
    /// `name` has been declared as an element type (later duplicates are a
    /// validity error per VC *Unique Element Type Declaration*).
    pub fn register_element(&mut self, decl: ElementDeclaration) -> bool {
        if self.elements.contains_key(&decl.name) {
            return false;
        }
        self.elements.insert(Rc::clone(&decl.name), decl);
        true
    }

    pub fn register_attribute(&mut self, element: Rc<str>, attr: AttributeDeclaration) -> bool {
        let list = self.attlists.entry(element).or_default();
        if list.iter().any(|a| a.name == attr.name) {
            return false;
        }
        list.push(attr);
        true
    }

    pub fn register_general_entity(&mut self, decl: EntityDeclaration) -> bool {
        if self.general_entities.contains_key(&decl.name) {
            return false;
        }
        self.general_entities.insert(Rc::clone(&decl.name), decl);
        true
    }

    pub fn register_parameter_entity(&mut self, decl: EntityDeclaration) -> bool {
        if self.parameter_entities.contains_key(&decl.name) {
            return false;
        }
        self.parameter_entities.insert(Rc::clone(&decl.name), decl);
        true
    }

    pub fn register_notation(&mut self, decl: NotationDeclaration) -> bool {
        if self.notations.contains_key(&decl.name) {
            return false;
        }
        self.notations.insert(Rc::clone(&decl.name), decl);
        true
    }
}

/// Result of feeding one token to a declaration sub-parser.
pub enum StepResult {
    Continue,
    Complete,
}

/// `<!ELEMENT Name contentspec>` — builds an [`ElementDeclaration`].
/// Simplified content-model grammar: `EMPTY`, `ANY`, `(#PCDATA)`,
/// `(#PCDATA|a|b)*`, or a sequence/choice group with `,`/`|` and trailing
/// `?`/`*`/`+`, one token at a time, tracked with an explicit group stack.
pub struct ElementDeclBuilder {
    name: Option<Rc<str>>,
    content_type: Option<ElementContentType>,
    mixed_names: Vec<Rc<str>>,
    group_stack: Vec<GroupBuilder>,
    pending_name: Option<Rc<str>>,
    saw_pcdata: bool,
}

struct GroupBuilder {
    is_choice: Option<bool>,
    items: Vec<Particle>,
}

impl ElementDeclBuilder {
    pub fn new() -> Self {
        Self {
            name: None,
            content_type: None,
            mixed_names: Vec::new(),
            group_stack: Vec::new(),
            pending_name: None,
            saw_pcdata: false,
        }
    }

    pub fn step(&mut self, token: &Token, text: impl Fn() -> String, locator: &Locator) -> Result<StepResult, Error> {
        if self.name.is_none() {
            if let Token::Name(_) = token {
                self.name = Some(Rc::from(text().as_str()));
                return Ok(StepResult::Continue);
            }
            return Ok(StepResult::Continue);
        }
        match token {
            Token::Name(_) if self.content_type.is_none() => {
                let t = text();
                match t.as_str() {
                    "EMPTY" => self.content_type = Some(ElementContentType::Empty),
                    "ANY" => self.content_type = Some(ElementContentType::Any),
                    _ => {
                        return Err(Error::fatal(
                            ErrorKind::MalformedDeclaration("ELEMENT"),
                            locator.clone(),
                        ))
                    }
                }
                Ok(StepResult::Continue)
            }
            Token::Hash => {
                self.saw_pcdata = true;
                Ok(StepResult::Continue)
            }
            Token::Name(_) => {
                self.pending_name = Some(Rc::from(text().as_str()));
                Ok(StepResult::Continue)
            }
            Token::LBracket => {
                // Reuses the tokenizer's generic bracket tokens; `(` is
                // lexed as part of markup-name scanning in this simplified
                // grammar, so group open/close ride on LBracket/RBracket.
                self.group_stack.push(GroupBuilder { is_choice: None, items: Vec::new() });
                Ok(StepResult::Continue)
            }
            Token::Pipe => {
                self.flush_pending_name_into_group(true)?;
                Ok(StepResult::Continue)
            }
            Token::Comma => {
                self.flush_pending_name_into_group(false)?;
                Ok(StepResult::Continue)
            }
            Token::RBracket => {
                self.flush_pending_name_into_group(false)?;
                if let Some(group) = self.group_stack.pop() {
                    let particle = if group.is_choice == Some(true) {
                        Particle::Choice(group.items)
                    } else {
                        Particle::Seq(group.items)
                    };
                    if self.group_stack.is_empty() {
                        self.content_type = Some(if self.saw_pcdata {
                            ElementContentType::Mixed
                        } else {
                            ElementContentType::Element
                        });
                        self.group_stack.push(GroupBuilder { is_choice: None, items: vec![particle] });
                    } else {
                        self.group_stack.last_mut().unwrap().items.push(particle);
                    }
                }
                Ok(StepResult::Continue)
            }
            Token::Star | Token::Plus | Token::Query => {
                self.apply_occurrence(token);
                Ok(StepResult::Continue)
            }
            Token::Gt => Ok(StepResult::Complete),
            Token::S(_) => Ok(StepResult::Continue),
            _ => Ok(StepResult::Continue),
        }
    }

    fn flush_pending_name_into_group(&mut self, is_choice: bool) -> Result<(), Error> {
        if let Some(name) = self.pending_name.take() {
            if self.saw_pcdata {
                self.mixed_names.push(Rc::clone(&name));
            }
            if let Some(group) = self.group_stack.last_mut() {
                group.is_choice = Some(group.is_choice.unwrap_or(is_choice));
                group.items.push(Particle::Name(name));
            }
        } else if let Some(group) = self.group_stack.last_mut() {
            group.is_choice = Some(group.is_choice.unwrap_or(is_choice));
        }
        Ok(())
    }

    fn apply_occurrence(&mut self, token: &Token) {
        if let Some(group) = self.group_stack.last_mut() {
            if let Some(last) = group.items.pop() {
                let wrapped = match token {
                    Token::Star => Particle::Star(Box::new(last)),
                    Token::Plus => Particle::Plus(Box::new(last)),
                    _ => Particle::Opt(Box::new(last)),
                };
                group.items.push(wrapped);
            }
        }
    }

    pub fn finish(mut self, locator: &Locator) -> Result<ElementDeclaration, Error> {
        let name = self.name.ok_or_else(|| {
            Error::fatal(ErrorKind::MalformedDeclaration("ELEMENT"), locator.clone())
        })?;
        let content_type = self.content_type.unwrap_or(ElementContentType::Any);
        let content_model = match content_type {
            ElementContentType::Empty => Some(ContentModel::Empty),
            ElementContentType::Any => Some(ContentModel::Any),
            ElementContentType::Mixed => Some(ContentModel::Mixed(self.mixed_names)),
            ElementContentType::Element => self
                .group_stack
                .pop()
                .map(|g| ContentModel::Element(Rc::new(Particle::Seq(g.items)))),
        };
        Ok(ElementDeclaration { name, content_type, content_model })
    }
}

/// `<!ATTLIST Name (AttDef)*>` — builds a list of [`AttributeDeclaration`]s
/// for one element.
pub struct AttlistDeclBuilder {
    pub element_name: Option<Rc<str>>,
    pending_attr_name: Option<Rc<str>>,
    pending_type: Option<Rc<str>>,
    pending_enum: Vec<Rc<str>>,
    in_enum: bool,
    completed: Vec<AttributeDeclaration>,
    awaiting_default_value: bool,
    next_mode: Option<AttributeMode>,
}

impl AttlistDeclBuilder {
    pub fn new() -> Self {
        Self {
            element_name: None,
            pending_attr_name: None,
            pending_type: None,
            pending_enum: Vec::new(),
            in_enum: false,
            completed: Vec::new(),
            awaiting_default_value: false,
            next_mode: None,
        }
    }

    pub fn step(&mut self, token: &Token, text: impl Fn() -> String, locator: &Locator) -> Result<StepResult, Error> {
        if self.element_name.is_none() {
            if let Token::Name(_) = token {
                self.element_name = Some(Rc::from(text().as_str()));
            }
            return Ok(StepResult::Continue);
        }
        match token {
            Token::Name(_) if self.pending_attr_name.is_none() => {
                self.pending_attr_name = Some(Rc::from(text().as_str()));
            }
            Token::KwCData => self.pending_type = Some(Rc::from("CDATA")),
            Token::KwId => self.pending_type = Some(Rc::from("ID")),
            Token::KwIdref => self.pending_type = Some(Rc::from("IDREF")),
            Token::KwIdrefs => self.pending_type = Some(Rc::from("IDREFS")),
            Token::KwEntity => self.pending_type = Some(Rc::from("ENTITY")),
            Token::KwEntities => self.pending_type = Some(Rc::from("ENTITIES")),
            Token::KwNmtoken => self.pending_type = Some(Rc::from("NMTOKEN")),
            Token::KwNmtokens => self.pending_type = Some(Rc::from("NMTOKENS")),
            Token::KwNotation => self.pending_type = Some(Rc::from("NOTATION")),
            Token::LBracket => {
                self.in_enum = true;
                self.pending_type.get_or_insert_with(|| Rc::from("ENUMERATION"));
            }
            Token::RBracket => self.in_enum = false,
            Token::Name(_) if self.in_enum => self.pending_enum.push(Rc::from(text().as_str())),
            Token::Pipe => {}
            Token::KwRequired => self.next_mode = Some(AttributeMode::Required),
            Token::KwImplied => self.next_mode = Some(AttributeMode::Implied),
            Token::KwFixed => {
                self.next_mode = Some(AttributeMode::Fixed);
                self.awaiting_default_value = true;
            }
            Token::Quote | Token::Apos => {
                self.awaiting_default_value = true;
            }
            Token::CData(_) if self.awaiting_default_value => {
                self.finish_attribute(Some(Rc::from(text().as_str())));
            }
            Token::Gt => {
                self.finish_pending_attribute_if_any();
                return Ok(StepResult::Complete);
            }
            _ => {}
        }
        if matches!(token, Token::Quote | Token::Apos) && self.pending_type.is_some() && !self.awaiting_default_value {
            self.finish_attribute(None);
        }
        let _ = locator;
        Ok(StepResult::Continue)
    }

    fn finish_pending_attribute_if_any(&mut self) {
        if self.pending_attr_name.is_some() {
            self.finish_attribute(None);
        }
    }

    fn finish_attribute(&mut self, default_value: Option<Rc<str>>) {
        let name = match self.pending_attr_name.take() {
            Some(n) => n,
            None => return,
        };
        let type_name = self.pending_type.take().unwrap_or_else(|| Rc::from("CDATA"));
        let mode = self.next_mode.take().unwrap_or(if default_value.is_some() {
            AttributeMode::Default
        } else {
            AttributeMode::Implied
        });
        self.completed.push(AttributeDeclaration {
            name,
            type_name,
            enumeration: std::mem::take(&mut self.pending_enum),
            mode,
            default_value,
            from_external_subset: false,
        });
        self.awaiting_default_value = false;
    }

    pub fn finish(self) -> (Rc<str>, Vec<AttributeDeclaration>) {
        (self.element_name.unwrap_or_else(|| Rc::from("")), self.completed)
    }
}

/// `<!ENTITY [%] Name (EntityValue | ExternalID NDataDecl?)>`.
pub struct EntityDeclBuilder {
    is_parameter: bool,
    seen_percent: bool,
    name: Option<Rc<str>>,
    value: Vec<ReplacementPiece>,
    system_id: Option<Rc<str>>,
    public_id: Option<Rc<str>>,
    notation_name: Option<Rc<str>>,
    expect_system_id: bool,
    expect_public_id: bool,
    seen_external_id: bool,
    saw_char_ref: bool,
}

impl EntityDeclBuilder {
    pub fn new() -> Self {
        Self {
            is_parameter: false,
            seen_percent: false,
            name: None,
            value: Vec::new(),
            system_id: None,
            public_id: None,
            notation_name: None,
            expect_system_id: false,
            expect_public_id: false,
            seen_external_id: false,
            saw_char_ref: false,
        }
    }

    pub fn step(&mut self, token: &Token, text: impl Fn() -> String, locator: &Locator) -> Result<StepResult, Error> {
        match token {
            Token::Percent if self.name.is_none() => {
                self.seen_percent = true;
                self.is_parameter = true;
            }
            Token::Name(_) if self.name.is_none() => {
                self.name = Some(Rc::from(text().as_str()));
            }
            Token::KwSystem => self.expect_system_id = true,
            Token::KwPublic => self.expect_public_id = true,
            Token::KwNData if self.name.is_some() => {}
            Token::Name(_) if self.notation_name.is_none() && self.seen_external_id && self.system_id.is_some() => {
                self.notation_name = Some(Rc::from(text().as_str()));
            }
            Token::CData(_) | Token::PredefEntityRef(_) | Token::CharEntityRef(_) => {
                if self.expect_system_id {
                    self.system_id = Some(Rc::from(text().as_str()));
                    self.expect_system_id = false;
                    self.seen_external_id = true;
                } else if self.expect_public_id {
                    self.public_id = Some(Rc::from(text().as_str()));
                    self.expect_public_id = false;
                } else {
                    if matches!(token, Token::PredefEntityRef(_) | Token::CharEntityRef(_)) {
                        self.saw_char_ref = true;
                    }
                    self.value.push(ReplacementPiece::Text(Rc::from(text().as_str())));
                }
            }
            Token::GeneralEntityRef(_) => {
                self.value.push(ReplacementPiece::GeneralEntity(Rc::from(text().as_str())));
            }
            Token::ParameterEntityRef(_) => {
                self.value.push(ReplacementPiece::ParameterEntity(Rc::from(text().as_str())));
            }
            Token::Gt => return Ok(StepResult::Complete),
            _ => {}
        }
        let _ = locator;
        Ok(StepResult::Continue)
    }

    pub fn finish(self, base_uri: Option<Rc<str>>, locator: &Locator) -> Result<EntityDeclaration, Error> {
        let name = self.name.ok_or_else(|| {
            Error::fatal(ErrorKind::MalformedDeclaration("ENTITY"), locator.clone())
        })?;
        let external_id = self.system_id.map(|system_id| ExternalId { public_id: self.public_id, system_id });
        let contains_char_refs = self.saw_char_ref;
        Ok(EntityDeclaration {
            name,
            is_parameter: self.is_parameter,
            replacement_text: self.value,
            external_id,
            notation_name: self.notation_name,
            contains_character_references: contains_char_refs,
            contains_restricted_char_from_char_ref: false,
            declaration_base_uri: base_uri,
        })
    }
}

/// `<!NOTATION Name (ExternalID | PublicID)>`.
pub struct NotationDeclBuilder {
    name: Option<Rc<str>>,
    public_id: Option<Rc<str>>,
    system_id: Option<Rc<str>>,
    expect_system_id: bool,
    expect_public_id: bool,
}

impl NotationDeclBuilder {
    pub fn new() -> Self {
        Self {
            name: None,
            public_id: None,
            system_id: None,
            expect_system_id: false,
            expect_public_id: false,
        }
    }

    pub fn step(&mut self, token: &Token, text: impl Fn() -> String, _locator: &Locator) -> Result<StepResult, Error> {
        match token {
            Token::Name(_) if self.name.is_none() => self.name = Some(Rc::from(text().as_str())),
            Token::KwSystem => self.expect_system_id = true,
            Token::KwPublic => self.expect_public_id = true,
            Token::CData(_) | Token::PredefEntityRef(_) | Token::CharEntityRef(_) => {
                if self.expect_system_id {
                    self.system_id = Some(Rc::from(text().as_str()));
                    self.expect_system_id = false;
                } else if self.expect_public_id {
                    self.public_id = Some(Rc::from(text().as_str()));
                    self.expect_public_id = false;
                }
            }
            Token::Gt => return Ok(StepResult::Complete),
            _ => {}
        }
        Ok(StepResult::Continue)
    }

    pub fn finish(self, locator: &Locator) -> Result<NotationDeclaration, Error> {
        let name = self.name.ok_or_else(|| {
            Error::fatal(ErrorKind::MalformedDeclaration("NOTATION"), locator.clone())
        })?;
        Ok(NotationDeclaration { name, public_id: self.public_id, system_id: self.system_id })
    }
}
