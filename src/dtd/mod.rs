//! The DTD parser (§4.4): consumes DOCTYPE-interior tokens, builds the
//! declaration tables, and manages parameter-entity expansion including
//! forward references.
//!
//! Grounded on `other_examples/cbf9899e_tafia-quick-xml__src-parser-dtd.rs.rs`'s
//! `DtdParser` enum-of-states with a `feed`/`switch` pair returning
//! `Option<(bytes, consumed)>` — generalized here from a skip-only scanner
//! (that crate doesn't validate DTDs) into a token-driven declaration
//! builder: `receive` plays the role of that crate's `feed`, `dispatch_new_markup`
//! the role of `switch`, and each markup kind gets a real sub-parser instead
//! of "skip to the next unescaped `>`".

pub mod conditional;
pub mod declarations;

use std::collections::HashSet;
use std::rc::Rc;

use crate::errors::{Error, ErrorKind, Locator};
use crate::token::Token;
use conditional::{ConditionalKind, ConditionalStack};
use declarations::{
    AttlistDeclBuilder, DeclarationTables, ElementDeclBuilder, EntityDeclBuilder, NotationDeclBuilder, StepResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DtdState {
    Initial,
    AfterName,
    InExternalId,
    InInternalSubset,
    AfterInternalSubset,
    InElementDecl,
    InAttlistDecl,
    InEntityDecl,
    InNotationDecl,
    InConditionalKeyword,
    InConditionalBody,
    Done,
}

enum ActiveBuilder {
    None,
    Element(ElementDeclBuilder),
    Attlist(AttlistDeclBuilder),
    Entity(EntityDeclBuilder),
    Notation(NotationDeclBuilder),
}

/// Outcome of feeding one token to the DTD parser.
pub enum DtdEvent {
    /// Nothing externally observable happened yet.
    None,
    /// A markup declaration completed and was registered (or rejected as a
    /// duplicate, per first-declaration-binding).
    DeclarationComplete,
    /// The internal subset's `]` was seen; caller should proceed to load an
    /// external subset if one was referenced, then feed its tokens here too.
    InternalSubsetEnded,
    /// The `<!DOCTYPE ...>` declaration is fully parsed.
    Finished { root_name: Rc<str>, public_id: Option<Rc<str>>, system_id: Option<Rc<str>> },
}

pub struct DtdParser {
    state: DtdState,
    in_external_subset: bool,
    root_name: Option<Rc<str>>,
    expect_system_id: bool,
    expect_public_id: bool,
    public_id: Option<Rc<str>>,
    system_id: Option<Rc<str>>,
    builder: ActiveBuilder,
    pub tables: DeclarationTables,
    conditional: ConditionalStack,
    conditional_keyword: Option<String>,
    /// Names referenced by a parameter-entity reference in the external
    /// subset that were not yet declared when referenced (forward
    /// references, §4.4). Non-empty means we are in buffering mode.
    unresolved_parameter_entities: HashSet<Rc<str>>,
    buffered_tokens: Vec<(Token, String)>,
    parameter_entity_depth: usize,
}

impl DtdParser {
    pub fn new() -> Self {
        Self {
            state: DtdState::Initial,
            in_external_subset: false,
            root_name: None,
            expect_system_id: false,
            expect_public_id: false,
            public_id: None,
            system_id: None,
            builder: ActiveBuilder::None,
            tables: DeclarationTables::default(),
            conditional: ConditionalStack::new(),
            conditional_keyword: None,
            unresolved_parameter_entities: HashSet::new(),
            buffered_tokens: Vec::new(),
            parameter_entity_depth: 0,
        }
    }

    pub fn begin_external_subset(&mut self) {
        self.in_external_subset = true;
        self.state = DtdState::InInternalSubset;
    }

    pub fn has_unresolved_parameter_entities(&self) -> bool {
        !self.unresolved_parameter_entities.is_empty()
    }

    /// The `PUBLIC` identifier named by the `<!DOCTYPE ... PUBLIC "..." "...">`
    /// external ID, if any.
    pub fn public_id(&self) -> Option<Rc<str>> {
        self.public_id.clone()
    }

    /// The `SYSTEM`/`PUBLIC` system identifier naming the external subset,
    /// if the DOCTYPE declared one.
    pub fn system_id(&self) -> Option<Rc<str>> {
        self.system_id.clone()
    }

    /// Called when a parameter-entity declaration is registered, to check
    /// whether a pending forward reference is now resolved and, if the set
    /// becomes empty, whether buffered tokens should be replayed.
    pub fn note_parameter_entity_declared(&mut self, name: &str) -> Vec<(Token, String)> {
        self.unresolved_parameter_entities.remove(name);
        if self.unresolved_parameter_entities.is_empty() && !self.buffered_tokens.is_empty() {
            std::mem::take(&mut self.buffered_tokens)
        } else {
            Vec::new()
        }
    }

    /// Records a parameter-entity reference that targets an undeclared
    /// entity, entering buffering mode (external subset only, per §4.4).
    pub fn begin_forward_reference(&mut self, name: Rc<str>) {
        self.unresolved_parameter_entities.insert(name);
    }

    pub fn is_buffering(&self) -> bool {
        !self.unresolved_parameter_entities.is_empty()
    }

    pub fn finish_external_subset(&mut self, locator: &Locator) -> Result<(), Error> {
        if !self.unresolved_parameter_entities.is_empty() {
            let names: Vec<String> = self.unresolved_parameter_entities.iter().map(|s| s.to_string()).collect();
            return Err(Error::fatal(
                ErrorKind::UndefinedParameterEntity(names.join(", ")),
                locator.clone(),
            ));
        }
        Ok(())
    }

    /// Feeds one token. `text` lazily materializes the token's window as a
    /// string (only called when a builder actually needs the data, mirroring
    /// the "don't retain until needed" policy used throughout this crate).
    pub fn receive(&mut self, token: Token, text: impl Fn() -> String, locator: &Locator) -> Result<DtdEvent, Error> {
        if self.is_buffering() {
            self.buffered_tokens.push((token.clone(), text()));
            return Ok(DtdEvent::None);
        }
        self.receive_inner(token, text, locator)
    }

    fn receive_inner(&mut self, token: Token, text: impl Fn() -> String, locator: &Locator) -> Result<DtdEvent, Error> {
        match self.state {
            DtdState::Initial => {
                if let Token::Name(_) = token {
                    self.root_name = Some(Rc::from(text().as_str()));
                    self.state = DtdState::AfterName;
                }
                Ok(DtdEvent::None)
            }
            DtdState::AfterName => match token {
                Token::KwSystem => {
                    self.expect_system_id = true;
                    self.state = DtdState::InExternalId;
                    Ok(DtdEvent::None)
                }
                Token::KwPublic => {
                    self.expect_public_id = true;
                    self.state = DtdState::InExternalId;
                    Ok(DtdEvent::None)
                }
                Token::LBracket => {
                    self.state = DtdState::InInternalSubset;
                    Ok(DtdEvent::None)
                }
                Token::Gt => self.finish(locator),
                _ => Ok(DtdEvent::None),
            },
            DtdState::InExternalId => match token {
                Token::CData(_) | Token::PredefEntityRef(_) | Token::CharEntityRef(_) => {
                    if self.expect_system_id {
                        self.system_id = Some(Rc::from(text().as_str()));
                        self.expect_system_id = false;
                    } else if self.expect_public_id {
                        self.public_id = Some(Rc::from(text().as_str()));
                        self.expect_public_id = false;
                        self.expect_system_id = true;
                    }
                    Ok(DtdEvent::None)
                }
                Token::LBracket => {
                    self.state = DtdState::InInternalSubset;
                    Ok(DtdEvent::None)
                }
                Token::Gt => self.finish(locator),
                _ => Ok(DtdEvent::None),
            },
            DtdState::InInternalSubset => self.receive_markup_dispatch(token, text, locator),
            DtdState::AfterInternalSubset => match token {
                Token::Gt => self.finish(locator),
                _ => Ok(DtdEvent::None),
            },
            DtdState::InElementDecl => self.drive_element(token, text, locator),
            DtdState::InAttlistDecl => self.drive_attlist(token, text, locator),
            DtdState::InEntityDecl => self.drive_entity(token, text, locator),
            DtdState::InNotationDecl => self.drive_notation(token, text, locator),
            DtdState::InConditionalKeyword => self.drive_conditional_keyword(token, text, locator),
            DtdState::InConditionalBody => self.drive_conditional_body(token, locator),
            DtdState::Done => Ok(DtdEvent::None),
        }
    }

    fn receive_markup_dispatch(
        &mut self,
        token: Token,
        text: impl Fn() -> String,
        locator: &Locator,
    ) -> Result<DtdEvent, Error> {
        match token {
            Token::RBracket => {
                self.state = DtdState::AfterInternalSubset;
                Ok(DtdEvent::InternalSubsetEnded)
            }
            Token::DoctypeStart => Ok(DtdEvent::None),
            Token::CommentStart | Token::PiStart => Ok(DtdEvent::None),
            Token::CommentEnd | Token::PiEnd => Ok(DtdEvent::None),
            Token::CondSectStart => {
                self.state = DtdState::InConditionalKeyword;
                self.conditional_keyword = None;
                Ok(DtdEvent::None)
            }
            Token::Name(_) => {
                let t = text();
                match t.as_str() {
                    "ELEMENT" => {
                        self.builder = ActiveBuilder::Element(ElementDeclBuilder::new());
                        self.state = DtdState::InElementDecl;
                    }
                    "ATTLIST" => {
                        self.builder = ActiveBuilder::Attlist(AttlistDeclBuilder::new());
                        self.state = DtdState::InAttlistDecl;
                    }
                    "ENTITY" => {
                        self.builder = ActiveBuilder::Entity(EntityDeclBuilder::new());
                        self.state = DtdState::InEntityDecl;
                    }
                    "NOTATION" => {
                        self.builder = ActiveBuilder::Notation(NotationDeclBuilder::new());
                        self.state = DtdState::InNotationDecl;
                    }
                    _ => {
                        return Err(Error::fatal(
                            ErrorKind::MalformedDeclaration("unknown markup declaration"),
                            locator.clone(),
                        ))
                    }
                }
                Ok(DtdEvent::None)
            }
            Token::ParameterEntityRef(_) => {
                if !self.in_external_subset {
                    return Err(Error::fatal(ErrorKind::PeInInternalSubsetDeclaration, locator.clone()));
                }
                let name: Rc<str> = Rc::from(text().as_str());
                if !self.tables.parameter_entities.contains_key(&name) {
                    self.begin_forward_reference(name);
                }
                Ok(DtdEvent::None)
            }
            Token::S(_) => Ok(DtdEvent::None),
            _ => Ok(DtdEvent::None),
        }
    }

    fn drive_element(&mut self, token: Token, text: impl Fn() -> String, locator: &Locator) -> Result<DtdEvent, Error> {
        let builder = match &mut self.builder {
            ActiveBuilder::Element(b) => b,
            _ => unreachable!("state/builder mismatch"),
        };
        match builder.step(&token, text, locator)? {
            StepResult::Continue => Ok(DtdEvent::None),
            StepResult::Complete => {
                let builder = std::mem::replace(&mut self.builder, ActiveBuilder::None);
                let decl = match builder {
                    ActiveBuilder::Element(b) => b.finish(locator)?,
                    _ => unreachable!(),
                };
                let registered = self.tables.register_element(decl.clone());
                self.state = self.post_declaration_state();
                if registered {
                    Ok(DtdEvent::DeclarationComplete)
                } else {
                    Err(Error::recoverable(
                        ErrorKind::DuplicateElementDeclaration(decl.name.to_string()),
                        locator.clone(),
                    ))
                }
            }
        }
    }

    fn drive_attlist(&mut self, token: Token, text: impl Fn() -> String, locator: &Locator) -> Result<DtdEvent, Error> {
        let builder = match &mut self.builder {
            ActiveBuilder::Attlist(b) => b,
            _ => unreachable!("state/builder mismatch"),
        };
        match builder.step(&token, text, locator)? {
            StepResult::Continue => Ok(DtdEvent::None),
            StepResult::Complete => {
                let builder = std::mem::replace(&mut self.builder, ActiveBuilder::None);
                let (element, attrs) = match builder {
                    ActiveBuilder::Attlist(b) => b.finish(),
                    _ => unreachable!(),
                };
                for attr in attrs {
                    self.tables.register_attribute(Rc::clone(&element), attr);
                }
                self.state = self.post_declaration_state();
                Ok(DtdEvent::DeclarationComplete)
            }
        }
    }

    fn drive_entity(&mut self, token: Token, text: impl Fn() -> String, locator: &Locator) -> Result<DtdEvent, Error> {
        let builder = match &mut self.builder {
            ActiveBuilder::Entity(b) => b,
            _ => unreachable!("state/builder mismatch"),
        };
        match builder.step(&token, text, locator)? {
            StepResult::Continue => Ok(DtdEvent::None),
            StepResult::Complete => {
                let builder = std::mem::replace(&mut self.builder, ActiveBuilder::None);
                let decl = match builder {
                    ActiveBuilder::Entity(b) => b.finish(None, locator)?,
                    _ => unreachable!(),
                };
                let is_parameter = decl.is_parameter;
                let name = Rc::clone(&decl.name);
                let registered = if is_parameter {
                    self.tables.register_parameter_entity(decl)
                } else {
                    self.tables.register_general_entity(decl)
                };
                self.state = self.post_declaration_state();
                if registered && is_parameter {
                    // Markup declarations buffered while this entity's name was
                    // an outstanding forward reference (§4.4) get replayed now,
                    // through the same dispatch they would have taken live.
                    let replay = self.note_parameter_entity_declared(&name);
                    for (tok, s) in replay {
                        self.receive_inner(tok, move || s.clone(), locator)?;
                    }
                }
                Ok(DtdEvent::DeclarationComplete)
            }
        }
    }

    fn drive_notation(&mut self, token: Token, text: impl Fn() -> String, locator: &Locator) -> Result<DtdEvent, Error> {
        let builder = match &mut self.builder {
            ActiveBuilder::Notation(b) => b,
            _ => unreachable!("state/builder mismatch"),
        };
        match builder.step(&token, text, locator)? {
            StepResult::Continue => Ok(DtdEvent::None),
            StepResult::Complete => {
                let builder = std::mem::replace(&mut self.builder, ActiveBuilder::None);
                let decl = match builder {
                    ActiveBuilder::Notation(b) => b.finish(locator)?,
                    _ => unreachable!(),
                };
                self.tables.register_notation(decl);
                self.state = self.post_declaration_state();
                Ok(DtdEvent::DeclarationComplete)
            }
        }
    }

    fn drive_conditional_keyword(&mut self, token: Token, text: impl Fn() -> String, locator: &Locator) -> Result<DtdEvent, Error> {
        match token {
            Token::Name(_) => {
                self.conditional_keyword = Some(text());
                Ok(DtdEvent::None)
            }
            Token::LBracket => {
                let kind = match self.conditional_keyword.as_deref() {
                    Some("INCLUDE") => ConditionalKind::Include,
                    Some("IGNORE") => ConditionalKind::Ignore,
                    _ => {
                        return Err(Error::fatal(
                            ErrorKind::MalformedDeclaration("conditional section keyword"),
                            locator.clone(),
                        ))
                    }
                };
                self.conditional.push(kind, self.parameter_entity_depth);
                self.state = if kind == ConditionalKind::Ignore {
                    DtdState::InConditionalBody
                } else {
                    DtdState::InInternalSubset
                };
                Ok(DtdEvent::None)
            }
            Token::S(_) => Ok(DtdEvent::None),
            _ => Ok(DtdEvent::None),
        }
    }

    fn drive_conditional_body(&mut self, token: Token, locator: &Locator) -> Result<DtdEvent, Error> {
        match token {
            Token::CondSectStart => {
                self.conditional.enter_nested_while_ignoring();
                Ok(DtdEvent::None)
            }
            Token::CondSectEnd => {
                if self.conditional.exit_nested_while_ignoring() {
                    let frame = self.conditional.pop();
                    if let Some(frame) = frame {
                        if frame.pe_depth_at_open != self.parameter_entity_depth {
                            return Err(Error::recoverable(ErrorKind::ConditionalSectionPeNesting, locator.clone()));
                        }
                    }
                    self.state = DtdState::InInternalSubset;
                }
                Ok(DtdEvent::None)
            }
            _ => Ok(DtdEvent::None),
        }
    }

    fn post_declaration_state(&self) -> DtdState {
        if self.conditional.depth() > 0 {
            DtdState::InInternalSubset
        } else {
            DtdState::InInternalSubset
        }
    }

    fn finish(&mut self, locator: &Locator) -> Result<DtdEvent, Error> {
        self.state = DtdState::Done;
        let root_name = self.root_name.clone().ok_or_else(|| {
            Error::fatal(ErrorKind::MalformedDeclaration("DOCTYPE"), locator.clone())
        })?;
        Ok(DtdEvent::Finished {
            root_name,
            public_id: self.public_id.clone(),
            system_id: self.system_id.clone(),
        })
    }
}

impl Default for DtdParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Locator {
        Locator::new()
    }

    #[test]
    fn parses_minimal_internal_subset_element_decl() {
        let mut dtd = DtdParser::new();
        dtd.receive(Token::Name(crate::char_buffer::CharWindow::new(0, 4)), || "root".to_string(), &loc()).unwrap();
        dtd.receive(Token::LBracket, || "[".to_string(), &loc()).unwrap();
        assert!(matches!(dtd.state, DtdState::InInternalSubset));

        dtd.receive(Token::Name(crate::char_buffer::CharWindow::new(0, 7)), || "ELEMENT".to_string(), &loc()).unwrap();
        dtd.receive(Token::S(crate::char_buffer::CharWindow::new(0, 1)), || " ".to_string(), &loc()).unwrap();
        dtd.receive(Token::Name(crate::char_buffer::CharWindow::new(0, 4)), || "root".to_string(), &loc()).unwrap();
        dtd.receive(Token::S(crate::char_buffer::CharWindow::new(0, 1)), || " ".to_string(), &loc()).unwrap();
        dtd.receive(Token::Name(crate::char_buffer::CharWindow::new(0, 3)), || "ANY".to_string(), &loc()).unwrap();
        let ev = dtd.receive(Token::Gt, || ">".to_string(), &loc()).unwrap();
        assert!(matches!(ev, DtdEvent::DeclarationComplete));
        assert!(dtd.tables.elements.contains_key("root"));
    }

    #[test]
    fn forward_parameter_entity_reference_buffers_until_resolved() {
        let mut dtd = DtdParser::new();
        dtd.begin_external_subset();
        dtd.receive(Token::ParameterEntityRef(crate::char_buffer::CharWindow::new(0, 3)), || "pe1".to_string(), &loc())
            .unwrap();
        assert!(dtd.is_buffering());
        let replay = dtd.note_parameter_entity_declared("pe1");
        assert!(!dtd.is_buffering());
        assert!(replay.is_empty());
    }
}
