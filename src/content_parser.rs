//! The content parser (§4.3): drives element/attribute/namespace processing,
//! entity expansion in content and in attribute values, and delegates
//! DOCTYPE-interior tokens to [`crate::dtd::DtdParser`]. This is the
//! component the top-level [`crate::parser::Parser`] feeds every token to.
//!
//! Grounded on the teacher's `NamespacedParser` (`reader/parser.rs`) for the
//! namespace-stack-per-element-scope shape, and on
//! `other_examples/837206a7_Mingun-quick-xml__src-reader-resolver.rs.rs` for
//! the entity-expansion-as-nested-reader idea, generalized here to push-mode
//! dispatch over the handler capability set in [`crate::handler`].

use std::collections::HashSet;
use std::io::Read;
use std::rc::Rc;

use crate::attributes::{AttributeList, AttributeType};
use crate::config::ParserConfig;
use crate::content_model::{ContentModel, ValidationContext, ValidationOutcome};
use crate::dtd::declarations::{AttributeDeclaration, AttributeMode, ElementContentType};
use crate::dtd::{DtdEvent, DtdParser};
use crate::entity::{EntityDeclaration, EntityResolver, EntityStack, EntityStackEntry, ReplacementPiece};
use crate::errors::{Error, ErrorKind, Locator, Severity, XmlError};
use crate::handler::Handlers;
use crate::intern::InternPool;
use crate::namespace::NamespaceStack;
use crate::pool::{ElementContextPool, ElementValidationContext, StringBuilderPool};
use crate::qname::{QName, QNamePool};
use crate::token::Token;
use crate::tokenizer::states::TokenizerState;
use crate::tokenizer::Tokenizer;

/// Where the parser currently is in the grammar, tracked purely from the
/// token stream itself (mirrors `DtdParser`'s own state-from-tokens design
/// rather than relying on the tokenizer's `TokenizerState`, which the content
/// parser never needs to read directly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Prolog,
    Doctype,
    Misc,
    ExpectStartName,
    ExpectEndName,
    InStartTag,
    InAttrName,
    AfterAttrName,
    InAttrValue,
    InEndTagTrailer,
    InContent,
    Epilog,
}

/// What the current bracketed run of `CData` tokens feeds into: ordinary
/// content/attribute text, or the body of a comment/PI waiting to be
/// reported through the lexical handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextSink {
    None,
    Comment,
    PiTarget,
    PiData,
}

struct PendingAttr {
    qname: Rc<str>,
    value: String,
}

struct OpenElement {
    raw_qname: Rc<str>,
    qname: QName,
    validation: Option<ElementValidationContext>,
    entity_depth_at_open: usize,
}

/// Drives element/attribute/namespace/entity processing over one document.
/// Owns the namespace stack, entity stack, interning/pool machinery, and the
/// (optional) `DtdParser` for the document's DOCTYPE, and talks to the
/// caller only through [`Handlers`].
pub struct ContentParser<'r> {
    config: ParserConfig,
    resolver: &'r dyn EntityResolver,
    xml11: bool,
    base_uri: Option<Rc<str>>,

    interner: InternPool,
    qnames: QNamePool,
    strings: StringBuilderPool,
    element_contexts: ElementContextPool,

    namespaces: NamespaceStack,
    entities: EntityStack,
    dtd: Option<DtdParser>,
    external_subset_loaded: bool,
    reported_notations: HashSet<Rc<str>>,
    reported_unparsed_entities: HashSet<Rc<str>>,

    element_stack: Vec<OpenElement>,
    ids_seen: HashSet<Rc<str>>,
    pending_idrefs: Vec<(Rc<str>, Locator)>,

    phase: Phase,
    text_buf: String,
    text_sink: TextSink,
    pi_target: String,

    pending_attrs: Vec<PendingAttr>,
    current_attr_qname: Option<Rc<str>>,
    current_attr_value: String,
    current_element_qname_pending: Option<String>,
    current_end_name: String,

    locator: Locator,
    started_document: bool,
    fatal: bool,
}

impl<'r> ContentParser<'r> {
    pub fn new(config: ParserConfig, resolver: &'r dyn EntityResolver, xml11: bool) -> Self {
        let document_entry = EntityStackEntry {
            entity_name: None,
            is_parameter_entity: false,
            system_id: None,
            public_id: None,
            xml11,
            entity_expansion_depth: 0,
            content_model_depth_at_entry: 0,
        };
        Self {
            config,
            resolver,
            xml11,
            base_uri: None,
            interner: InternPool::new(),
            qnames: QNamePool::new(),
            strings: StringBuilderPool::new(),
            element_contexts: ElementContextPool::new(),
            namespaces: NamespaceStack::new(),
            entities: EntityStack::new(document_entry),
            dtd: None,
            external_subset_loaded: false,
            reported_notations: HashSet::new(),
            reported_unparsed_entities: HashSet::new(),
            element_stack: Vec::new(),
            ids_seen: HashSet::new(),
            pending_idrefs: Vec::new(),
            phase: Phase::Prolog,
            text_buf: String::new(),
            text_sink: TextSink::None,
            pi_target: String::new(),
            pending_attrs: Vec::new(),
            current_attr_qname: None,
            current_attr_value: String::new(),
            current_element_qname_pending: None,
            current_end_name: String::new(),
            locator: Locator::new(),
            started_document: false,
            fatal: false,
        }
    }

    pub fn set_base_uri(&mut self, base_uri: Option<Rc<str>>) {
        self.base_uri = base_uri;
    }

    /// Switches the document entity's XML version after the fact, once the
    /// top-level driver has seen the declaration's `version` pseudo-attribute.
    /// Only affects the document entity's own record on the entity stack;
    /// each external parsed entity tracks its own version independently
    /// (§9 Open Question 2).
    pub fn set_xml11(&mut self, xml11: bool) {
        self.xml11 = xml11;
        self.entities.set_document_xml11(xml11);
    }

    /// Interns a name through the pool when `string_interning` is enabled,
    /// otherwise allocates a plain `Rc<str>` each time.
    fn intern_name(&mut self, s: &str) -> Rc<str> {
        if self.config.string_interning {
            self.interner.intern(s)
        } else {
            Rc::from(s)
        }
    }

    pub fn start_document(&mut self, handlers: &mut Handlers<'_>) {
        if !self.started_document {
            handlers.content.set_document_locator(&self.locator);
            handlers.content.start_document();
            self.started_document = true;
        }
    }

    /// Call once after the tokenizer (and, if present, the DTD parser) have
    /// both reached end of input.
    pub fn end_document(&mut self, handlers: &mut Handlers<'_>) -> Result<(), Error> {
        self.flush_text(handlers)?;
        if !self.element_stack.is_empty() {
            return Err(Error::fatal(
                ErrorKind::UnterminatedConstruct("element"),
                self.locator.clone(),
            ));
        }
        if self.config.validation_enabled {
            for (idref, locator) in &self.pending_idrefs {
                if !self.ids_seen.contains(idref) {
                    self.report_recoverable(handlers, ErrorKind::DanglingIdref(idref.to_string()), locator.clone());
                }
            }
        }
        handlers.content.end_document();
        Ok(())
    }

    fn report_recoverable(&mut self, handlers: &mut Handlers<'_>, kind: ErrorKind, locator: Locator) {
        handlers.error.error(&XmlError { kind, severity: Severity::Recoverable, locator });
    }

    fn report_warning(&mut self, handlers: &mut Handlers<'_>, kind: ErrorKind, locator: Locator) {
        handlers.error.warning(&XmlError { kind, severity: Severity::Warning, locator });
    }

    fn fail(&mut self, handlers: &mut Handlers<'_>, err: Error) -> Error {
        self.fatal = true;
        if let Error::Xml(x) = &err {
            handlers.error.fatal_error(x);
        }
        err
    }

    /// Feeds one token from the main tokenizer or a nested one (entity
    /// expansion, external DTD subset). `text` lazily materializes the
    /// token's window, mirroring `DtdParser::receive`'s convention.
    pub fn receive(
        &mut self,
        token: Token,
        text: impl Fn() -> String,
        locator: &Locator,
        handlers: &mut Handlers<'_>,
    ) -> Result<(), Error> {
        self.locator = locator.clone();
        if self.fatal {
            return Ok(());
        }
        self.receive_inner(token, text, locator, handlers).map_err(|e| self.fail(handlers, e))
    }

    fn receive_inner(
        &mut self,
        token: Token,
        text: impl Fn() -> String,
        locator: &Locator,
        handlers: &mut Handlers<'_>,
    ) -> Result<(), Error> {
        // Comments and processing instructions can appear almost anywhere
        // (prolog, content, epilog, inside the DTD) and are handled
        // uniformly before the phase-specific dispatch below.
        match token {
            Token::CommentStart => {
                self.flush_text(handlers)?;
                self.text_sink = TextSink::Comment;
                self.text_buf.clear();
                return Ok(());
            }
            Token::CommentEnd => {
                let comment = std::mem::take(&mut self.text_buf);
                self.text_sink = TextSink::None;
                handlers.lexical.comment(&comment);
                return Ok(());
            }
            Token::PiStart => {
                self.flush_text(handlers)?;
                self.text_sink = TextSink::PiTarget;
                self.pi_target.clear();
                self.text_buf.clear();
                return Ok(());
            }
            Token::PiEnd => {
                let target = std::mem::take(&mut self.pi_target);
                let data = std::mem::take(&mut self.text_buf);
                self.text_sink = TextSink::None;
                if target.eq_ignore_ascii_case("xml") {
                    // A text/XML declaration re-sniffed as a PI by a nested
                    // tokenizer (e.g. inside an external entity) carries no
                    // separate event of its own.
                    return Ok(());
                }
                handlers.content.processing_instruction(&target, data.trim());
                return Ok(());
            }
            Token::Name(w) if self.text_sink == TextSink::PiTarget => {
                self.pi_target = text();
                let _ = w;
                self.text_sink = TextSink::PiData;
                return Ok(());
            }
            Token::CData(_) if self.text_sink == TextSink::Comment || self.text_sink == TextSink::PiData => {
                self.text_buf.push_str(&text());
                return Ok(());
            }
            _ => {}
        }

        if self.phase == Phase::Doctype {
            return self.receive_in_doctype(token, text, locator, handlers);
        }

        match self.phase {
            Phase::Prolog | Phase::Misc | Phase::Epilog => self.receive_outside_element(token),
            Phase::ExpectStartName | Phase::ExpectEndName => self.receive_tag_name(token, text),
            Phase::InStartTag | Phase::InAttrName | Phase::AfterAttrName | Phase::InAttrValue => {
                self.receive_in_start_tag(token, text, locator, handlers)
            }
            Phase::InEndTagTrailer => self.receive_end_tag_trailer(token, handlers),
            Phase::InContent => self.receive_in_content(token, text, locator, handlers),
            Phase::Doctype => unreachable!(),
        }
    }

    fn receive_outside_element(&mut self, token: Token) -> Result<(), Error> {
        match token {
            Token::DoctypeStart => {
                self.dtd = Some(DtdParser::new());
                self.phase = Phase::Doctype;
            }
            Token::Lt => self.phase = Phase::ExpectStartName,
            Token::S(_) => {}
            _ => {}
        }
        Ok(())
    }

    fn receive_tag_name(&mut self, token: Token, text: impl Fn() -> String) -> Result<(), Error> {
        match token {
            Token::Name(_) => {
                let raw = text();
                if self.phase == Phase::ExpectStartName {
                    self.current_attr_qname = None;
                    self.pending_attrs.clear();
                    self.current_element_qname_pending = Some(raw);
                    self.phase = Phase::InStartTag;
                } else {
                    self.current_end_name = raw;
                    self.phase = Phase::InEndTagTrailer;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn receive_end_tag_trailer(&mut self, token: Token, handlers: &mut Handlers<'_>) -> Result<(), Error> {
        match token {
            Token::S(_) => Ok(()),
            Token::Gt | Token::SlashGt => self.close_current_element(handlers),
            _ => Ok(()),
        }
    }

    fn receive_in_start_tag(
        &mut self,
        token: Token,
        text: impl Fn() -> String,
        locator: &Locator,
        handlers: &mut Handlers<'_>,
    ) -> Result<(), Error> {
        match self.phase {
            Phase::InStartTag => match token {
                Token::Name(_) => {
                    self.current_attr_qname = Some(self.intern_name(&text()));
                    self.current_attr_value.clear();
                    self.phase = Phase::InAttrName;
                }
                Token::S(_) => {}
                Token::Gt => self.open_current_element(false, locator, handlers),
                Token::SlashGt => self.open_current_element(true, locator, handlers),
                _ => Ok(()),
            },
            Phase::InAttrName => match token {
                Token::Eq => {
                    self.phase = Phase::AfterAttrName;
                    Ok(())
                }
                Token::S(_) => Ok(()),
                _ => Ok(()),
            },
            Phase::AfterAttrName => match token {
                Token::Apos | Token::Quote => {
                    self.phase = Phase::InAttrValue;
                    Ok(())
                }
                Token::S(_) => Ok(()),
                _ => Ok(()),
            },
            Phase::InAttrValue => match token {
                Token::CData(_) | Token::PredefEntityRef(_) | Token::CharEntityRef(_) => {
                    self.current_attr_value.push_str(&text());
                    Ok(())
                }
                Token::GeneralEntityRef(_) => {
                    let name = text();
                    let expanded = self.expand_entity_as_text(&name, locator)?;
                    self.current_attr_value.push_str(&expanded);
                    Ok(())
                }
                Token::Apos | Token::Quote => {
                    let qname = self.current_attr_qname.take().unwrap();
                    let value = std::mem::take(&mut self.current_attr_value);
                    self.pending_attrs.push(PendingAttr { qname, value });
                    self.phase = Phase::InStartTag;
                    Ok(())
                }
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }

    // --- element open/close -------------------------------------------------

    fn open_current_element(
        &mut self,
        self_closing: bool,
        locator: &Locator,
        handlers: &mut Handlers<'_>,
    ) -> Result<(), Error> {
        self.flush_text(handlers)?;
        let raw_qname_str = self.current_element_qname_pending.take().unwrap_or_default();
        let raw_qname = self.intern_name(&raw_qname_str);

        self.namespaces.push_scope();

        // First pass: bind xmlns/xmlns:prefix declarations so they are in
        // effect for every attribute of this same start tag.
        for attr in &self.pending_attrs {
            let (prefix, uri) = split_xmlns(&attr.qname);
            if let Some(prefix) = prefix {
                self.namespaces
                    .declare(prefix, &attr.value, self.xml11)
                    .map_err(|e| Error::fatal(ErrorKind::InvalidNamespaceDeclaration(format!("{:?}", e)), locator.clone()))?;
            }
        }

        let (element_uri, element_local) = self
            .namespaces
            .process_name(&raw_qname, false)
            .map_err(|e| Error::fatal(ErrorKind::UnboundPrefix(format!("{:?}", e)), locator.clone()))?;

        for (prefix, uri) in self.namespaces.current_frame_bindings().to_vec() {
            handlers.content.start_prefix_mapping(&prefix, &uri);
        }

        let attr_decls = self
            .dtd
            .as_ref()
            .and_then(|d| d.tables.attlists.get(&raw_qname))
            .cloned();

        let mut attrs = AttributeList::new();
        let pending = std::mem::take(&mut self.pending_attrs);
        for attr in &pending {
            let (xmlns_prefix, _) = split_xmlns(&attr.qname);
            let is_xmlns = xmlns_prefix.is_some() || &*attr.qname == "xmlns";
            if is_xmlns {
                if self.config.namespace_prefixes_enabled {
                    attrs.push(
                        Some(Rc::from(crate::namespace::XMLNS_URI)),
                        self.intern_name(xmlns_prefix.unwrap_or("xmlns")),
                        Rc::clone(&attr.qname),
                        AttributeType::CData,
                        attr.value.clone(),
                        true,
                    );
                }
                continue;
            }
            let (uri, local) = self
                .namespaces
                .process_name(&attr.qname, true)
                .map_err(|e| Error::fatal(ErrorKind::UnboundPrefix(format!("{:?}", e)), locator.clone()))?;

            if attrs
                .find_duplicate(uri.as_deref(), &local, &attr.qname, self.config.namespaces_enabled)
                .is_some()
            {
                return Err(Error::fatal(ErrorKind::DuplicateAttribute(attr.qname.to_string()), locator.clone()));
            }

            let decl = attr_decls.as_ref().and_then(|list| list.iter().find(|d| &*d.name == &*attr.qname));
            let attr_type = decl.map(attribute_type_of).unwrap_or(AttributeType::CData);

            attrs.push(uri, local, Rc::clone(&attr.qname), attr_type, attr.value.clone(), true);

            if attr_type == AttributeType::Id {
                let id_value: Rc<str> = Rc::from(attr.value.trim());
                if !self.ids_seen.insert(Rc::clone(&id_value)) {
                    self.report_recoverable(handlers, ErrorKind::DuplicateId(id_value.to_string()), locator.clone());
                }
            } else if attr_type == AttributeType::IdRef {
                self.pending_idrefs.push((Rc::from(attr.value.trim()), locator.clone()));
            } else if attr_type == AttributeType::IdRefs {
                for part in attr.value.split_whitespace() {
                    self.pending_idrefs.push((Rc::from(part), locator.clone()));
                }
            }
        }

        // Apply DTD default/fixed attribute values not specified in the
        // instance (VC Attribute Default Legal, §4.3).
        if let Some(decls) = &attr_decls {
            for decl in decls {
                let already = pending.iter().any(|a| &*a.qname == &*decl.name);
                if already {
                    continue;
                }
                if let Some(default) = &decl.default_value {
                    if decl.mode == AttributeMode::Required {
                        self.report_recoverable(
                            handlers,
                            ErrorKind::AttributeTypeMismatch {
                                attribute: decl.name.to_string(),
                                detail: "required but not specified".into(),
                            },
                            locator.clone(),
                        );
                        continue;
                    }
                    let (uri, local) = self
                        .namespaces
                        .process_name(&decl.name, true)
                        .map_err(|e| Error::fatal(ErrorKind::UnboundPrefix(format!("{:?}", e)), locator.clone()))?;
                    attrs.push(uri, local, Rc::clone(&decl.name), attribute_type_of(decl), default.to_string(), false);
                } else if decl.mode == AttributeMode::Required {
                    self.report_recoverable(
                        handlers,
                        ErrorKind::AttributeTypeMismatch {
                            attribute: decl.name.to_string(),
                            detail: "required but not specified".into(),
                        },
                        locator.clone(),
                    );
                }
            }
        }

        attrs.normalize_all();

        let qname = self.qnames.acquire(element_uri, element_local, Rc::clone(&raw_qname));

        let element_decl = self.dtd.as_ref().and_then(|d| d.tables.elements.get(&raw_qname)).cloned();
        let validation = if self.config.validation_enabled {
            match &element_decl {
                Some(decl) => Some(self.element_contexts.acquire(
                    raw_qname.to_string(),
                    decl.content_model.clone().map(|_| ValidationContext::new(model_of(decl))),
                    self.entities.depth(),
                )),
                None => {
                    self.report_recoverable(handlers, ErrorKind::ElementNotDeclared(raw_qname.to_string()), locator.clone());
                    None
                }
            }
        } else {
            None
        };

        if let Some(parent) = self.element_stack.last_mut() {
            if let Some(ctx) = &mut parent.validation {
                if let Some(v) = &mut ctx.validator {
                    if let ValidationOutcome::ContentModelViolation(detail) = v.accept_child(&raw_qname) {
                        self.report_recoverable(
                            handlers,
                            ErrorKind::ContentModelViolation { element: parent.raw_qname.to_string(), detail },
                            locator.clone(),
                        );
                    }
                }
            }
        }

        handlers
            .content
            .start_element(qname.uri.as_deref(), &qname.local_name, &qname.qname, &attrs);

        self.element_stack.push(OpenElement {
            raw_qname,
            qname,
            validation,
            entity_depth_at_open: self.entities.depth(),
        });

        self.phase = Phase::InContent;
        if self_closing {
            self.close_current_element(handlers)?;
        }
        Ok(())
    }

    fn close_current_element(&mut self, handlers: &mut Handlers<'_>) -> Result<(), Error> {
        self.flush_text(handlers)?;
        let open = self.element_stack.pop().ok_or_else(|| {
            Error::fatal(ErrorKind::TagMismatch { start: String::new(), end: self.current_end_name.clone() }, self.locator.clone())
        })?;

        if !self.current_end_name.is_empty() && self.current_end_name != *open.raw_qname {
            return Err(Error::fatal(
                ErrorKind::TagMismatch { start: open.raw_qname.to_string(), end: self.current_end_name.clone() },
                self.locator.clone(),
            ));
        }
        self.current_end_name.clear();

        if open.entity_depth_at_open != self.entities.depth() {
            return Err(Error::fatal(
                ErrorKind::UnclosedEntityElement(open.raw_qname.to_string()),
                self.locator.clone(),
            ));
        }

        if let Some(ctx) = &open.validation {
            if let Some(v) = &ctx.validator {
                if let ValidationOutcome::ContentModelViolation(detail) = v.finish() {
                    self.report_recoverable(
                        handlers,
                        ErrorKind::ContentModelViolation { element: open.raw_qname.to_string(), detail },
                        self.locator.clone(),
                    );
                }
            }
        }

        handlers
            .content
            .end_element(open.qname.uri.as_deref(), &open.qname.local_name, &open.qname.qname);

        for (prefix, _) in self.namespaces.current_frame_bindings().iter().rev() {
            handlers.content.end_prefix_mapping(prefix);
        }
        self.namespaces.pop_scope();

        self.qnames.release(open.qname);
        if let Some(ctx) = open.validation {
            self.element_contexts.release(ctx);
        }

        self.phase = if self.element_stack.is_empty() { Phase::Epilog } else { Phase::InContent };
        Ok(())
    }

    // --- content -------------------------------------------------------------

    fn receive_in_content(
        &mut self,
        token: Token,
        text: impl Fn() -> String,
        locator: &Locator,
        handlers: &mut Handlers<'_>,
    ) -> Result<(), Error> {
        match token {
            Token::CData(_) => {
                self.text_buf.push_str(&text());
                Ok(())
            }
            Token::PredefEntityRef(_) | Token::CharEntityRef(_) => {
                self.text_buf.push_str(&text());
                Ok(())
            }
            Token::GeneralEntityRef(_) => {
                let name = text();
                self.expand_entity_in_content(name, locator.clone(), handlers)
            }
            Token::CDataStart => {
                self.flush_text(handlers)?;
                handlers.lexical.start_cdata();
                Ok(())
            }
            Token::CDataEnd => {
                self.flush_text(handlers)?;
                handlers.lexical.end_cdata();
                Ok(())
            }
            Token::Lt => {
                self.phase = Phase::ExpectStartName;
                Ok(())
            }
            Token::LtSlash => {
                self.current_end_name.clear();
                self.phase = Phase::ExpectEndName;
                Ok(())
            }
            Token::S(_) => {
                self.text_buf.push_str(&text());
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn flush_text(&mut self, handlers: &mut Handlers<'_>) -> Result<(), Error> {
        if self.text_buf.is_empty() {
            return Ok(());
        }
        let text = std::mem::take(&mut self.text_buf);
        if let Some(open) = self.element_stack.last_mut() {
            if let Some(ctx) = &mut open.validation {
                if let Some(v) = &mut ctx.validator {
                    match v.accept_text(&text) {
                        ValidationOutcome::IgnorableWhitespace => {
                            handlers.content.ignorable_whitespace(&text);
                            return Ok(());
                        }
                        ValidationOutcome::ContentModelViolation(_) => {
                            // Reported when the element closes, against the
                            // full accumulated sequence; just dispatch here.
                        }
                        ValidationOutcome::Ok => {}
                    }
                }
            }
        }
        handlers.content.characters(&text);
        Ok(())
    }

    // --- DOCTYPE ---------------------------------------------------------

    fn receive_in_doctype(
        &mut self,
        token: Token,
        text: impl Fn() -> String,
        locator: &Locator,
        handlers: &mut Handlers<'_>,
    ) -> Result<(), Error> {
        let event = {
            let dtd = self.dtd.as_mut().expect("phase is Doctype");
            dtd.receive(token, text, locator)?
        };
        match event {
            DtdEvent::None => {}
            DtdEvent::DeclarationComplete => self.report_new_dtd_declarations(handlers),
            DtdEvent::InternalSubsetEnded => {
                self.maybe_load_external_subset(locator, handlers)?;
            }
            DtdEvent::Finished { root_name, public_id, system_id } => {
                self.maybe_load_external_subset(locator, handlers)?;
                self.report_new_dtd_declarations(handlers);
                handlers.lexical.start_dtd(&root_name, public_id.as_deref(), system_id.as_deref());
                handlers.lexical.end_dtd();
                self.phase = Phase::Misc;
            }
        }
        Ok(())
    }

    fn report_new_dtd_declarations(&mut self, handlers: &mut Handlers<'_>) {
        let dtd = match &self.dtd {
            Some(d) => d,
            None => return,
        };
        for (name, notation) in &dtd.tables.notations {
            if self.reported_notations.insert(Rc::clone(name)) {
                handlers.dtd.notation_decl(name, notation.public_id.as_deref(), notation.system_id.as_deref());
            }
        }
        for (name, decl) in &dtd.tables.general_entities {
            if let Some(notation) = &decl.notation_name {
                if self.reported_unparsed_entities.insert(Rc::clone(name)) {
                    let (public_id, system_id) = decl
                        .external_id
                        .as_ref()
                        .map(|e| (e.public_id.as_deref(), Some(e.system_id.as_ref())))
                        .unwrap_or((None, None));
                    handlers.dtd.unparsed_entity_decl(name, public_id, system_id, notation);
                }
            }
        }
    }

    fn maybe_load_external_subset(&mut self, locator: &Locator, handlers: &mut Handlers<'_>) -> Result<(), Error> {
        if self.external_subset_loaded {
            return Ok(());
        }
        let (public_id, system_id) = {
            let dtd = self.dtd.as_ref().unwrap();
            (dtd_public_id(dtd), dtd_system_id(dtd))
        };
        let system_id = match system_id {
            Some(s) => s,
            None => return Ok(()),
        };
        self.external_subset_loaded = true;
        if !self.config.resolve_dtd_uris_enabled || !self.config.external_parameter_entities_enabled {
            return Ok(());
        }

        let resolved = self
            .resolver
            .resolve_entity(None, public_id.as_deref(), &system_id, self.base_uri.as_deref())
            .map_err(Error::from)?;
        let mut stream = match resolved {
            Some(r) => r.stream,
            None => return Ok(()),
        };
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).map_err(Error::from)?;

        let mut decoder = crate::encoding::Decoder::new(true);
        let mut units = decoder.feed(&bytes)?;
        units.extend(decoder.close()?);

        self.dtd.as_mut().unwrap().begin_external_subset();
        let mut tok = Tokenizer::new(TokenizerState::DoctypeInternal, self.xml11, false);
        let events = tok.feed(&units)?;
        self.drain_external_subset_events(&tok, events, locator, handlers)?;
        let events2 = tok.close()?;
        self.drain_external_subset_events(&tok, events2, locator, handlers)?;

        self.dtd.as_mut().unwrap().finish_external_subset(locator)?;
        Ok(())
    }

    fn drain_external_subset_events(
        &mut self,
        tok: &Tokenizer,
        events: Vec<crate::tokenizer::TokenEvent>,
        locator: &Locator,
        handlers: &mut Handlers<'_>,
    ) -> Result<(), Error> {
        for event in events {
            if let crate::tokenizer::TokenEvent::Token(t) = event {
                let w = t.window();
                let dtd = self.dtd.as_mut().unwrap();
                let ev = dtd.receive(t, || w.map(|w| tok.text(w)).unwrap_or_default(), locator)?;
                match ev {
                    DtdEvent::DeclarationComplete => self.report_new_dtd_declarations(handlers),
                    DtdEvent::None | DtdEvent::InternalSubsetEnded | DtdEvent::Finished { .. } => {}
                }
            }
        }
        Ok(())
    }

    // --- entity expansion -----------------------------------------------

    fn lookup_general_entity(&self, name: &str) -> Option<EntityDeclaration> {
        self.dtd.as_ref().and_then(|d| d.tables.general_entities.get(name).cloned())
    }

    fn expand_entity_in_content(&mut self, name: String, locator: Locator, handlers: &mut Handlers<'_>) -> Result<(), Error> {
        let decl = match self.lookup_general_entity(&name) {
            Some(d) => d,
            None => {
                if let Some(ch) = crate::entity::predefined_replacement(&name) {
                    self.text_buf.push(ch);
                    return Ok(());
                }
                return Err(Error::fatal(ErrorKind::UndefinedEntity(name), locator));
            }
        };
        if decl.is_unparsed() {
            return Err(Error::fatal(
                ErrorKind::Other(format!("reference to unparsed entity '{}' is not allowed here", name)),
                locator,
            ));
        }
        if decl.bypass_eligible() {
            for piece in &decl.replacement_text {
                if let ReplacementPiece::Text(t) = piece {
                    self.text_buf.push_str(t);
                }
            }
            return Ok(());
        }
        self.flush_text(handlers)?;
        handlers.lexical.start_entity(&name);
        if decl.is_external() {
            if !self.config.external_general_entities_enabled {
                handlers.content.skipped_entity(&name);
            } else {
                self.expand_external_entity_in_content(&decl, &name, locator.clone(), handlers)?;
            }
        } else {
            self.expand_internal_entity_in_content(&decl, &name, locator.clone(), handlers)?;
        }
        handlers.lexical.end_entity(&name);
        Ok(())
    }

    fn expand_internal_entity_in_content(
        &mut self,
        decl: &EntityDeclaration,
        name: &str,
        locator: Locator,
        handlers: &mut Handlers<'_>,
    ) -> Result<(), Error> {
        let reconstructed = reconstruct_general_replacement(decl);
        let name_rc = self.intern_name(name);
        let entry = EntityStackEntry {
            entity_name: Some(name_rc),
            is_parameter_entity: false,
            system_id: None,
            public_id: None,
            xml11: self.xml11,
            entity_expansion_depth: self.entities.depth(),
            content_model_depth_at_entry: self.element_stack.len(),
        };
        let element_count_before = self.element_stack.len();
        self.entities.push(entry, &locator)?;

        let mut tok = Tokenizer::new(TokenizerState::Content, self.xml11, false);
        let units: Vec<u16> = reconstructed.encode_utf16().collect();
        let events = tok.feed(&units)?;
        self.drain_nested_events(&tok, events, &locator, handlers)?;
        let events2 = tok.close()?;
        self.drain_nested_events(&tok, events2, &locator, handlers)?;

        self.entities.pop();
        if self.element_stack.len() != element_count_before {
            return Err(Error::fatal(ErrorKind::UnclosedEntityElement(name.to_string()), locator));
        }
        Ok(())
    }

    fn expand_external_entity_in_content(
        &mut self,
        decl: &EntityDeclaration,
        name: &str,
        locator: Locator,
        handlers: &mut Handlers<'_>,
    ) -> Result<(), Error> {
        let ext = decl.external_id.as_ref().expect("is_external checked by caller");
        let resolved = self
            .resolver
            .resolve_entity(Some(name), ext.public_id.as_deref(), &ext.system_id, self.base_uri.as_deref())
            .map_err(Error::from)?;
        let mut stream = match resolved {
            Some(r) => r.stream,
            None => {
                return Err(Error::fatal(
                    ErrorKind::Other(format!("could not resolve external entity '{}'", name)),
                    locator,
                ))
            }
        };
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).map_err(Error::from)?;

        let mut decoder = crate::encoding::Decoder::new(true);
        let mut units = decoder.feed(&bytes)?;
        units.extend(decoder.close()?);
        let nested_xml11 = decoder.declared_version().map(|v| v.starts_with("1.1")).unwrap_or(self.xml11);

        let name_rc = self.intern_name(name);
        let entry = EntityStackEntry {
            entity_name: Some(name_rc),
            is_parameter_entity: false,
            system_id: Some(Rc::from(ext.system_id.as_ref())),
            public_id: ext.public_id.clone(),
            xml11: nested_xml11,
            entity_expansion_depth: self.entities.depth(),
            content_model_depth_at_entry: self.element_stack.len(),
        };
        let element_count_before = self.element_stack.len();
        self.entities.push(entry, &locator)?;

        let mut tok = Tokenizer::new(TokenizerState::Content, nested_xml11, false);
        let events = tok.feed(&units)?;
        self.drain_nested_events(&tok, events, &locator, handlers)?;
        let events2 = tok.close()?;
        self.drain_nested_events(&tok, events2, &locator, handlers)?;

        self.entities.pop();
        if self.element_stack.len() != element_count_before {
            return Err(Error::fatal(ErrorKind::UnclosedEntityElement(name.to_string()), locator));
        }
        Ok(())
    }

    fn drain_nested_events(
        &mut self,
        tok: &Tokenizer,
        events: Vec<crate::tokenizer::TokenEvent>,
        locator: &Locator,
        handlers: &mut Handlers<'_>,
    ) -> Result<(), Error> {
        for event in events {
            if let crate::tokenizer::TokenEvent::Token(t) = event {
                let w = t.window();
                self.receive_inner(t, || w.map(|w| tok.text(w)).unwrap_or_default(), locator, handlers)?;
            }
        }
        Ok(())
    }

    /// Recursively expands a general entity to plain text, for use inside an
    /// attribute value. External and unparsed entities are rejected (WFC No
    /// External Entity References in attribute values).
    fn expand_entity_as_text(&mut self, name: &str, locator: &Locator) -> Result<String, Error> {
        let decl = self
            .lookup_general_entity(name)
            .or_else(|| crate::entity::predefined_replacement(name).map(|c| synthetic_char_decl(c)))
            .ok_or_else(|| Error::fatal(ErrorKind::UndefinedEntity(name.to_string()), locator.clone()))?;
        if decl.is_external() {
            return Err(Error::fatal(
                ErrorKind::Other(format!("external entity '{}' not allowed in attribute value", name)),
                locator.clone(),
            ));
        }
        if decl.is_unparsed() {
            return Err(Error::fatal(
                ErrorKind::Other(format!("unparsed entity '{}' not allowed in attribute value", name)),
                locator.clone(),
            ));
        }
        let name_rc = self.intern_name(name);
        let entry = EntityStackEntry {
            entity_name: Some(name_rc),
            is_parameter_entity: false,
            system_id: None,
            public_id: None,
            xml11: self.xml11,
            entity_expansion_depth: self.entities.depth(),
            content_model_depth_at_entry: self.element_stack.len(),
        };
        self.entities.push(entry, locator)?;
        let mut out = self.strings.acquire();
        for piece in &decl.replacement_text {
            match piece {
                ReplacementPiece::Text(t) => out.push_str(t),
                ReplacementPiece::GeneralEntity(n) => {
                    let expanded = self.expand_entity_as_text(n, locator)?;
                    out.push_str(&expanded);
                }
                ReplacementPiece::ParameterEntity(_) => {
                    return Err(Error::fatal(
                        ErrorKind::Other("parameter entity reference not allowed in general entity value".into()),
                        locator.clone(),
                    ))
                }
            }
        }
        self.entities.pop();
        let result = out.clone();
        self.strings.release(out);
        Ok(result)
    }

    // (fields below are only touched through the helpers above; declared
    // here so the struct literal in `new` stays exhaustive)
}

/// Extra state that doesn't belong in the main struct literal's logical
/// grouping above but is still part of `ContentParser`: the pending
/// element-name and end-tag-name strings, tracked outside `Phase` because
/// `Phase` itself carries no payload.
impl<'r> ContentParser<'r> {}

fn split_xmlns(qname: &str) -> (Option<&str>, ()) {
    if qname == "xmlns" {
        (None, ())
    } else if let Some(rest) = qname.strip_prefix("xmlns:") {
        (Some(rest), ())
    } else {
        (None, ())
    }
}

fn attribute_type_of(decl: &AttributeDeclaration) -> AttributeType {
    match decl.type_name.as_ref() {
        "ID" => AttributeType::Id,
        "IDREF" => AttributeType::IdRef,
        "IDREFS" => AttributeType::IdRefs,
        "ENTITY" => AttributeType::Entity,
        "ENTITIES" => AttributeType::Entities,
        "NMTOKEN" => AttributeType::NmToken,
        "NMTOKENS" => AttributeType::NmTokens,
        "NOTATION" => AttributeType::Notation,
        "ENUMERATION" => AttributeType::Enumeration,
        _ => AttributeType::CData,
    }
}

fn model_of(decl: &crate::dtd::declarations::ElementDeclaration) -> ContentModel {
    match decl.content_type {
        ElementContentType::Empty => ContentModel::Empty,
        ElementContentType::Any => ContentModel::Any,
        _ => decl.content_model.clone().unwrap_or(ContentModel::Any),
    }
}

fn dtd_public_id(dtd: &DtdParser) -> Option<Rc<str>> {
    dtd.public_id()
}

fn dtd_system_id(dtd: &DtdParser) -> Option<Rc<str>> {
    dtd.system_id()
}

/// Rebuilds a general entity's replacement text as literal source, so it can
/// be re-tokenized through a nested `Tokenizer` the same way the document's
/// own markup is: `Text` pieces verbatim, nested general-entity references
/// re-escaped as `&name;`.
fn reconstruct_general_replacement(decl: &EntityDeclaration) -> String {
    let mut out = String::new();
    for piece in &decl.replacement_text {
        match piece {
            ReplacementPiece::Text(t) => out.push_str(t),
            ReplacementPiece::GeneralEntity(n) => {
                out.push('&');
                out.push_str(n);
                out.push(';');
            }
            ReplacementPiece::ParameterEntity(_) => {
                // Parameter-entity references cannot appear in a general
                // entity's value; nothing to reconstruct.
            }
        }
    }
    out
}

fn synthetic_char_decl(c: char) -> EntityDeclaration {
    EntityDeclaration {
        name: Rc::from(""),
        is_parameter: false,
        replacement_text: vec![ReplacementPiece::Text(Rc::from(c.to_string().as_str()))],
        external_id: None,
        notation_name: None,
        contains_character_references: false,
        contains_restricted_char_from_char_ref: false,
        declaration_base_uri: None,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::handler::{ContentHandler, ErrorHandler, LexicalHandler, NullHandler};
    use crate::parser::Parser;
    use crate::{Handlers, XmlError};

    /// A single recorded event, in the order the handler saw it, so tests can
    /// assert on the full start/end sequencing rather than just presence.
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        StartPrefix(String, String),
        EndPrefix(String),
        Start(Option<String>, String, String, Vec<(String, String)>),
        End(Option<String>, String, String),
        Chars(String),
        StartCData,
        EndCData,
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<Event>,
        errors: Vec<String>,
    }

    /// Both `ContentHandler` and `LexicalHandler` need their own `&mut`, so
    /// event order across the two capabilities is kept in one shared
    /// `Recorder` behind a `RefCell` rather than two independent vectors.
    struct Shared(Rc<RefCell<Recorder>>);

    impl ContentHandler for Shared {
        fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) {
            self.0.borrow_mut().events.push(Event::StartPrefix(prefix.to_string(), uri.to_string()));
        }

        fn end_prefix_mapping(&mut self, prefix: &str) {
            self.0.borrow_mut().events.push(Event::EndPrefix(prefix.to_string()));
        }

        fn start_element(
            &mut self,
            uri: Option<&str>,
            local_name: &str,
            qname: &str,
            attrs: &crate::attributes::AttributeList,
        ) {
            let mut attr_pairs: Vec<(String, String)> = attrs
                .iter()
                .map(|a| (a.qname.to_string(), a.raw_value().to_string()))
                .collect();
            attr_pairs.sort();
            self.0.borrow_mut().events.push(Event::Start(
                uri.map(str::to_string),
                local_name.to_string(),
                qname.to_string(),
                attr_pairs,
            ));
        }

        fn end_element(&mut self, uri: Option<&str>, local_name: &str, qname: &str) {
            self.0.borrow_mut().events.push(Event::End(
                uri.map(str::to_string),
                local_name.to_string(),
                qname.to_string(),
            ));
        }

        fn characters(&mut self, chars: &str) {
            let mut rec = self.0.borrow_mut();
            match rec.events.last_mut() {
                Some(Event::Chars(s)) => s.push_str(chars),
                _ => rec.events.push(Event::Chars(chars.to_string())),
            }
        }
    }

    impl LexicalHandler for Shared {
        fn start_cdata(&mut self) {
            self.0.borrow_mut().events.push(Event::StartCData);
        }

        fn end_cdata(&mut self) {
            self.0.borrow_mut().events.push(Event::EndCData);
        }
    }

    impl ErrorHandler for Shared {
        fn fatal_error(&mut self, error: &XmlError) {
            self.0.borrow_mut().errors.push(error.to_string());
        }

        fn error(&mut self, error: &XmlError) {
            self.0.borrow_mut().errors.push(error.to_string());
        }
    }

    fn run(input: &str) -> Recorder {
        let parser = Parser::default();
        let shared = Rc::new(RefCell::new(Recorder::default()));
        let mut content = Shared(Rc::clone(&shared));
        let mut dtd = NullHandler;
        let mut lexical = Shared(Rc::clone(&shared));
        let mut error = Shared(Rc::clone(&shared));
        let mut handlers = Handlers {
            content: &mut content,
            dtd: &mut dtd,
            lexical: &mut lexical,
            error: &mut error,
        };
        let result = parser.parse_str(input, &mut handlers);
        drop(handlers);
        drop(content);
        drop(lexical);
        drop(error);
        let mut out = Rc::try_unwrap(shared).ok().expect("no outstanding borrows").into_inner();
        if let Err(e) = result {
            out.errors.push(e.to_string());
        }
        out
    }

    #[test]
    fn attribute_value_closes_on_its_own_quote() {
        // Regression test for the tokenizer bug where `drive_plain_cdata`
        // stopped only on `<`/`&`, so an attribute value swallowed its own
        // closing quote (and everything after it).
        let r = run(r#"<a x="1" y='2'>text</a>"#);
        assert!(r.errors.is_empty(), "unexpected errors: {:?}", r.errors);
        assert_eq!(
            r.events[0],
            Event::Start(
                None,
                "a".to_string(),
                "a".to_string(),
                vec![("x".to_string(), "1".to_string()), ("y".to_string(), "2".to_string())],
            )
        );
        assert_eq!(r.events[1], Event::Chars("text".to_string()));
        assert_eq!(r.events[2], Event::End(None, "a".to_string(), "a".to_string()));
    }

    #[test]
    fn attribute_value_with_ampersand_escape_and_trailing_siblings() {
        // A later sibling element only shows up at all if the attribute value
        // closed correctly instead of consuming the rest of the document.
        let r = run(r#"<a x="1&amp;2"><b/></a>"#);
        assert!(r.errors.is_empty(), "unexpected errors: {:?}", r.errors);
        assert_eq!(
            r.events[0],
            Event::Start(None, "a".to_string(), "a".to_string(), vec![("x".to_string(), "1&2".to_string())])
        );
        assert_eq!(r.events[1], Event::Start(None, "b".to_string(), "b".to_string(), vec![]));
        assert_eq!(r.events[2], Event::End(None, "b".to_string(), "b".to_string()));
        assert_eq!(r.events[3], Event::End(None, "a".to_string(), "a".to_string()));
    }

    #[test]
    fn namespace_prefix_binds_and_unbinds_around_element_scope() {
        // §8 scenario 6: a prefixed child under a namespace declared on its
        // parent reports the resolved URI and the matching prefix mapping
        // events, in declaration/undeclaration order.
        let r = run(r#"<r xmlns:p="urn:x"><p:c a="1"/></r>"#);
        assert!(r.errors.is_empty(), "unexpected errors: {:?}", r.errors);
        assert_eq!(
            r.events,
            vec![
                Event::StartPrefix("p".to_string(), "urn:x".to_string()),
                Event::Start(None, "r".to_string(), "r".to_string(), vec![]),
                Event::Start(
                    Some("urn:x".to_string()),
                    "c".to_string(),
                    "p:c".to_string(),
                    vec![("a".to_string(), "1".to_string())],
                ),
                Event::End(Some("urn:x".to_string()), "c".to_string(), "p:c".to_string()),
                Event::End(None, "r".to_string(), "r".to_string()),
                Event::EndPrefix("p".to_string()),
            ]
        );
    }

    #[test]
    fn default_namespace_applies_to_unprefixed_children_only() {
        let r = run(r#"<r xmlns="urn:default"><c/></r>"#);
        assert!(r.errors.is_empty(), "unexpected errors: {:?}", r.errors);
        assert_eq!(
            r.events[0],
            Event::Start(Some("urn:default".to_string()), "r".to_string(), "r".to_string(), vec![])
        );
        assert_eq!(
            r.events[1],
            Event::Start(Some("urn:default".to_string()), "c".to_string(), "c".to_string(), vec![])
        );
    }

    #[test]
    fn cdata_section_is_reported_as_literal_characters() {
        // Regression test for the tokenizer bug where `verify_literal` was
        // called with the cursor already past the leading `[`, so every
        // CDATA section's literal check failed.
        let r = run("<a><![CDATA[<not-a-tag> & stuff]]></a>");
        assert!(r.errors.is_empty(), "unexpected errors: {:?}", r.errors);
        assert_eq!(r.events[0], Event::Start(None, "a".to_string(), "a".to_string(), vec![]));
        assert_eq!(r.events[1], Event::StartCData);
        assert_eq!(r.events[2], Event::Chars("<not-a-tag> & stuff".to_string()));
        assert_eq!(r.events[3], Event::EndCData);
        assert_eq!(r.events[4], Event::End(None, "a".to_string(), "a".to_string()));
    }

    #[test]
    fn cdata_section_adjacent_to_plain_text_merges_in_document_order() {
        let r = run("<a>before<![CDATA[middle]]>after</a>");
        assert!(r.errors.is_empty(), "unexpected errors: {:?}", r.errors);
        let chars: Vec<&str> = r
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Chars(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(chars, vec!["before", "middle", "after"]);
    }
}
