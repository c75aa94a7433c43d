//! The top-level [`Parser`] (§2 "Data flow"): wires the [`Decoder`] into the
//! [`Tokenizer`] into the [`ContentParser`] and drives one parse from a byte
//! stream (or a `&str`) to completion, tracking the document locator as it
//! goes.
//!
//! Grounded on the teacher's `Reader<R, P>` (`reader.rs`), which owns a
//! `BufRead` plus a `Parser` and exposes `from_reader`/`from_str`/`builder()`
//! constructors; generalized here from "owns one `BufRead`, emits pulled
//! `Event`s" to "owns the whole decode→tokenize→parse pipeline, pushes
//! events to a [`Handlers`] bundle".

use std::io::Read;
use std::rc::Rc;

use crate::config::{ParserConfig, ParserConfigBuilder};
use crate::content_parser::ContentParser;
use crate::encoding::Decoder;
use crate::entity::{DefaultEntityResolver, EntityResolver};
use crate::errors::{Error, Locator};
use crate::handler::Handlers;
use crate::tokenizer::states::TokenizerState;
use crate::tokenizer::{Tokenizer, TokenEvent};

/// Drives one parse of a byte stream. Short-lived: construct one, call
/// `parse_reader`/`parse_str` once, discard it. Reuse across documents goes
/// through [`ParserBuilder`] rebuilding a fresh `Parser`, matching the
/// teacher's "builder produces independent readers" convention rather than
/// offering in-place `reset()` on a long-lived instance — the "resetting a
/// parser clears mutable state but preserves pools" note in §9 applies
/// within a single `ContentParser`'s pools, not across separately
/// constructed top-level parses.
pub struct Parser<'r> {
    config: ParserConfig,
    resolver: &'r dyn EntityResolver,
    base_uri: Option<Rc<str>>,
}

impl Default for Parser<'static> {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

impl Parser<'static> {
    /// A parser using the default resolver (system-default resolution for
    /// every external entity and DTD subset).
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            resolver: &DefaultEntityResolver,
            base_uri: None,
        }
    }

    pub fn builder() -> ParserBuilder {
        ParserBuilder::new()
    }
}

impl<'r> Parser<'r> {
    pub fn with_resolver(config: ParserConfig, resolver: &'r dyn EntityResolver) -> Self {
        Self {
            config,
            resolver,
            base_uri: None,
        }
    }

    pub fn set_base_uri(&mut self, base_uri: impl Into<Rc<str>>) {
        self.base_uri = Some(base_uri.into());
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parses a complete in-memory string. A Rust `&str` is guaranteed valid
    /// UTF-8 already, but its bytes still go through the normal §4.1
    /// autodetection path (which correctly settles on UTF-8 from the `<?xm`
    /// leading-byte pattern or the absence of any declaration) so that a
    /// `version="1.1"` XML declaration is still honoured.
    pub fn parse_str(&self, input: &str, handlers: &mut Handlers<'_>) -> Result<(), Error> {
        self.run(input.as_bytes(), handlers)
    }

    /// Parses bytes read incrementally from `reader`, in 8 KiB chunks, so
    /// that chunk-boundary splitting of multi-byte characters, tokens, and
    /// declarations is exercised the same way a streaming caller would (§8
    /// "Byte chunk boundary").
    pub fn parse_reader<R: Read>(&self, mut reader: R, handlers: &mut Handlers<'_>) -> Result<(), Error> {
        let mut driver = self.start()?;
        let mut buf = [0u8; 8192];
        loop {
            let n = reader.read(&mut buf).map_err(Error::from)?;
            if n == 0 {
                break;
            }
            driver.feed(&buf[..n], handlers)?;
        }
        driver.finish(handlers)
    }

    fn run(&self, bytes: &[u8], handlers: &mut Handlers<'_>) -> Result<(), Error> {
        let mut driver = self.start()?;
        driver.feed(bytes, handlers)?;
        driver.finish(handlers)
    }

    fn start(&self) -> Result<ParseDriver<'r>, Error> {
        Ok(ParseDriver {
            decoder: Decoder::new(false),
            tokenizer: Tokenizer::new(TokenizerState::PrologBeforeDoctype, false, false),
            content: ContentParser::new(self.config, self.resolver, false),
            base_uri: self.base_uri.clone(),
            locator: Locator::new(),
            started: false,
            base_uri_set: false,
            xml11_applied: false,
        })
    }
}

/// The mutable pipeline state for one in-progress parse; kept separate from
/// [`Parser`] so that `Parser` itself stays an immutable, reusable
/// configuration (mirroring the teacher's immutable `ParserBuilder` vs.
/// mutable `Reader` split).
struct ParseDriver<'r> {
    decoder: Decoder,
    tokenizer: Tokenizer,
    content: ContentParser<'r>,
    base_uri: Option<Rc<str>>,
    locator: Locator,
    started: bool,
    base_uri_set: bool,
    xml11_applied: bool,
}

impl<'r> ParseDriver<'r> {
    fn feed(&mut self, bytes: &[u8], handlers: &mut Handlers<'_>) -> Result<(), Error> {
        let units = self.decoder.feed(bytes)?;
        if !self.base_uri_set {
            if let Some(base) = &self.base_uri {
                self.content.set_base_uri(Some(base.clone()));
            }
            self.base_uri_set = true;
        }
        if !self.xml11_applied && self.decoder.declared_version().is_some() {
            let xml11 = self.decoder.declared_version().unwrap().starts_with("1.1");
            self.tokenizer.set_xml11(xml11);
            self.content.set_xml11(xml11);
            self.xml11_applied = true;
        }
        if units.is_empty() {
            return Ok(());
        }
        self.advance_locator(&units);
        if !self.started {
            self.content.start_document(handlers);
            self.started = true;
        }
        let events = self.tokenizer.feed(&units)?;
        self.dispatch(events, handlers)
    }

    fn finish(mut self, handlers: &mut Handlers<'_>) -> Result<(), Error> {
        let units = self.decoder.close()?;
        if !units.is_empty() {
            self.advance_locator(&units);
            if !self.started {
                self.content.start_document(handlers);
                self.started = true;
            }
            let events = self.tokenizer.feed(&units)?;
            self.dispatch(events, handlers)?;
        }
        if !self.started {
            // Empty input: still emit a matched start/end pair rather than
            // silently doing nothing, and let `close()` below report the
            // "unterminated" diagnosis for whatever state that leaves us in.
            self.content.start_document(handlers);
            self.started = true;
        }
        let events = self.tokenizer.close()?;
        self.dispatch(events, handlers)?;
        self.content.end_document(handlers)
    }

    fn dispatch(&mut self, events: Vec<TokenEvent>, handlers: &mut Handlers<'_>) -> Result<(), Error> {
        for event in events {
            match event {
                TokenEvent::Token(token) => {
                    let window = token.window();
                    let tokenizer = &self.tokenizer;
                    let locator = self.locator.clone();
                    self.content.receive(
                        token,
                        || window.map(|w| tokenizer.text(w)).unwrap_or_default(),
                        &locator,
                        handlers,
                    )?;
                }
                TokenEvent::StateChanged(_) => {}
            }
        }
        Ok(())
    }

    /// Advances the running line/column locator by scanning the newly
    /// decoded code units for line breaks. The tokenizer itself has already
    /// normalized `\r\n`/`\r` to `\n` by the time tokens are emitted, but
    /// these raw units are pre-normalization, so a lone `\r` is counted as a
    /// line break here too.
    fn advance_locator(&mut self, units: &[u16]) {
        let mut i = 0;
        while i < units.len() {
            match units[i] {
                0x0A => {
                    self.locator.line += 1;
                    self.locator.column = 1;
                }
                0x0D => {
                    self.locator.line += 1;
                    self.locator.column = 1;
                    if units.get(i + 1) == Some(&0x0A) {
                        i += 1;
                    }
                }
                _ => self.locator.column += 1,
            }
            i += 1;
        }
    }
}

/// Chainable configuration for [`Parser`], mirroring the teacher's
/// `ParserBuilder`/`ReaderBuilder` split — this one wraps
/// [`ParserConfigBuilder`] and adds the pieces that live outside
/// [`ParserConfig`] (the entity resolver, the base URI).
#[derive(Default)]
pub struct ParserBuilder {
    inner: ParserConfigBuilder,
}

impl ParserBuilder {
    pub fn new() -> Self {
        Self {
            inner: ParserConfigBuilder::new(),
        }
    }

    pub fn namespaces(mut self, enabled: bool) -> Self {
        self.inner = self.inner.namespaces(enabled);
        self
    }

    pub fn namespace_prefixes(mut self, enabled: bool) -> Self {
        self.inner = self.inner.namespace_prefixes(enabled);
        self
    }

    pub fn validation(mut self, enabled: bool) -> Self {
        self.inner = self.inner.validation(enabled);
        self
    }

    pub fn external_general_entities(mut self, enabled: bool) -> Self {
        self.inner = self.inner.external_general_entities(enabled);
        self
    }

    pub fn external_parameter_entities(mut self, enabled: bool) -> Self {
        self.inner = self.inner.external_parameter_entities(enabled);
        self
    }

    pub fn resolve_dtd_uris(mut self, enabled: bool) -> Self {
        self.inner = self.inner.resolve_dtd_uris(enabled);
        self
    }

    pub fn string_interning(mut self, enabled: bool) -> Self {
        self.inner = self.inner.string_interning(enabled);
        self
    }

    pub fn build(self) -> Parser<'static> {
        Parser::new(self.inner.build())
    }

    pub fn build_with_resolver<'r>(self, resolver: &'r dyn EntityResolver) -> Parser<'r> {
        Parser::with_resolver(self.inner.build(), resolver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{ContentHandler, ErrorHandler, LexicalHandler, NullHandler};

    #[derive(Default)]
    struct Recorder {
        opened: Vec<String>,
        closed: Vec<String>,
        text: String,
        errors: Vec<String>,
    }

    impl ContentHandler for Recorder {
        fn start_element(
            &mut self,
            _uri: Option<&str>,
            local_name: &str,
            _qname: &str,
            _attrs: &crate::attributes::AttributeList,
        ) {
            self.opened.push(local_name.to_string());
        }

        fn end_element(&mut self, _uri: Option<&str>, local_name: &str, _qname: &str) {
            self.closed.push(local_name.to_string());
        }

        fn characters(&mut self, chars: &str) {
            self.text.push_str(chars);
        }
    }

    impl ErrorHandler for Recorder {
        fn fatal_error(&mut self, error: &crate::errors::XmlError) {
            self.errors.push(error.to_string());
        }
    }

    fn run(input: &str) -> Recorder {
        let parser = Parser::default();
        let mut content = Recorder::default();
        let mut dtd = NullHandler;
        let mut lexical = NullHandler;
        let mut error = Recorder::default();
        let mut handlers = Handlers {
            content: &mut content,
            dtd: &mut dtd,
            lexical: &mut lexical,
            error: &mut error,
        };
        let result = parser.parse_str(input, &mut handlers);
        let mut out = content;
        out.errors = error.errors;
        if let Err(e) = result {
            out.errors.push(e.to_string());
        }
        out
    }

    #[test]
    fn parses_simple_document() {
        let r = run("<?xml version=\"1.0\"?><a><b/>x</a>");
        assert_eq!(r.opened, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(r.closed, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(r.text, "x");
        assert!(r.errors.is_empty(), "unexpected errors: {:?}", r.errors);
    }

    #[test]
    fn mismatched_end_tag_is_fatal() {
        let r = run("<a><b></a>");
        assert!(!r.errors.is_empty());
    }

    #[test]
    fn internal_entity_expands_in_content() {
        let r = run("<!DOCTYPE r [<!ENTITY x \"hi\"><!ELEMENT r (#PCDATA)>]><r>&x;!</r>");
        assert_eq!(r.text, "hi!");
        assert!(r.errors.is_empty(), "unexpected errors: {:?}", r.errors);
    }

    #[test]
    fn builder_configures_validation() {
        let parser = Parser::builder().validation(true).build();
        assert!(parser.config().validation_enabled);
    }

    #[test]
    fn feed_via_reader_splits_across_chunk_boundaries() {
        let input = "<?xml version=\"1.0\"?><root>hello world</root>";
        let parser = Parser::default();
        let mut content = Recorder::default();
        let mut dtd = NullHandler;
        let mut lexical = NullHandler;
        let mut error = Recorder::default();
        let mut handlers = Handlers {
            content: &mut content,
            dtd: &mut dtd,
            lexical: &mut lexical,
            error: &mut error,
        };
        parser
            .parse_reader(input.as_bytes(), &mut handlers)
            .expect("well-formed input parses");
        assert_eq!(content.text, "hello world");
    }
}
