//! The table-driven tokenizer (§4.2): converts character code units into a
//! stream of [`Token`]s plus top-level state-change notifications, over a
//! two-level (`TokenizerState` x `MiniState`) state space classified by
//! [`CharClass`].
//!
//! Grounded on the teacher's `Reader::read_until_open`/`read_until_close`
//! scanning loop (`reader.rs`) and `BangType`/`ReadElementState`'s
//! "recognise a lead-in, then verify the rest of a literal" convention, and
//! on `other_examples/60c53ed8_servo-html5ever__xml5ever-src-tokenizer-states.rs.rs`'s
//! state-enum shape for the mini-state set. The conceptual flat
//! `table[state][mini * |CharClass| + class]` array from §4.2 is realised as
//! the `step` match below rather than a literal array — see the note in
//! `table.rs`. `memchr` (kept from the teacher's dependency stack) does not
//! apply here: it scans byte slices, and this buffer holds `u16` code units,
//! so accumulation runs use plain iteration instead.

pub mod charclass;
pub mod states;
pub mod table;

use crate::char_buffer::{CharWindow, CharacterBuffer};
use crate::errors::{Error, ErrorKind, Locator};
use crate::token::Token;
use charclass::{classify, CharClass};
use states::{MiniState, TokenizerState};

/// Either a lexical token or a top-level-state-change notification. A
/// consumer needs both: tokens carry the document's content, and state
/// changes tell it which starting state to hand a nested tokenizer when
/// expanding an entity at the current cursor (§4.2 "Post-emit state
/// callback").
#[derive(Debug, Clone)]
pub enum TokenEvent {
    Token(Token),
    StateChanged(TokenizerState),
}

const PREDEFINED: [(&str, char); 5] = [
    ("lt", '<'),
    ("gt", '>'),
    ("amp", '&'),
    ("apos", '\''),
    ("quot", '"'),
];

pub struct Tokenizer {
    buffer: CharacterBuffer,
    state: TokenizerState,
    mini: MiniState,
    xml11: bool,
    allow_restricted: bool,
    locator: Locator,
    /// Counts consecutive `-` seen while scanning for a comment's closing
    /// `-->`, and consecutive `]` while scanning for CDATA's `]]>`.
    run_count: u8,
    /// State to return to once the comment currently being scanned closes;
    /// comments can appear both in content and inside a DOCTYPE.
    comment_return: Option<TokenizerState>,
}

impl Tokenizer {
    pub fn new(initial_state: TokenizerState, xml11: bool, allow_restricted: bool) -> Self {
        Self {
            buffer: CharacterBuffer::new(),
            state: initial_state,
            mini: MiniState::Ready,
            xml11,
            allow_restricted,
            locator: Locator::new(),
            run_count: 0,
            comment_return: None,
        }
    }

    pub fn state(&self) -> TokenizerState {
        self.state
    }

    /// Switches the XML-version-dependent `Char`/`RestrictedChar` classes
    /// used from this point on. Called once a document or text declaration
    /// has named `version="1.1"`, which must happen before any character
    /// past the declaration is classified.
    pub fn set_xml11(&mut self, xml11: bool) {
        self.xml11 = xml11;
    }

    pub fn buffer(&self) -> &CharacterBuffer {
        &self.buffer
    }

    /// Materializes a token's data as an owned string. Callers that need to
    /// retain a token past the next `feed` must go through this rather than
    /// holding the raw window.
    pub fn text(&self, window: CharWindow) -> String {
        self.buffer.to_string_lossy(window)
    }

    pub fn feed(&mut self, units: &[u16]) -> Result<Vec<TokenEvent>, Error> {
        self.buffer.extend(units);
        let mut out = Vec::new();
        self.run(&mut out)?;
        let compact_to = self.buffer.mark_at().min(self.buffer.position());
        self.buffer.compact(compact_to);
        Ok(out)
    }

    pub fn close(&mut self) -> Result<Vec<TokenEvent>, Error> {
        let mut out = Vec::new();
        self.run(&mut out)?;
        if !self.state.is_terminal() || self.mini != MiniState::Ready {
            return Err(Error::fatal(
                ErrorKind::UnterminatedConstruct(self.unterminated_what()),
                self.locator.clone(),
            ));
        }
        Ok(out)
    }

    fn unterminated_what(&self) -> &'static str {
        match self.state {
            TokenizerState::Comment => "comment",
            TokenizerState::CDataSection => "CDATA section",
            TokenizerState::PiTarget | TokenizerState::PiData => "processing instruction",
            TokenizerState::Doctype | TokenizerState::DoctypeInternal => "DOCTYPE declaration",
            TokenizerState::ElementName | TokenizerState::ElementAttrs => "element",
            _ => "document",
        }
    }

    fn emit(&self, out: &mut Vec<TokenEvent>, token: Token) {
        out.push(TokenEvent::Token(token));
    }

    fn change_state(&mut self, out: &mut Vec<TokenEvent>, next: TokenizerState) {
        self.state = next;
        out.push(TokenEvent::StateChanged(next));
    }

    fn class_at_cursor(&self) -> Option<CharClass> {
        self.buffer
            .peek()
            .map(|u| classify(u, self.xml11, self.allow_restricted))
    }

    fn run(&mut self, out: &mut Vec<TokenEvent>) -> Result<(), Error> {
        loop {
            if self.mini.is_greedy() {
                if !self.drive_greedy(out)? {
                    return Ok(());
                }
                continue;
            }
            let class = match self.class_at_cursor() {
                Some(c) => c,
                None => return Ok(()),
            };
            if class == CharClass::Invalid {
                return Err(Error::fatal(
                    ErrorKind::InvalidChar(self.buffer.peek().unwrap_or(0) as u32),
                    self.locator.clone(),
                ));
            }
            self.step(out, class)?;
        }
    }

    /// Advances a greedy mini-state by consuming its run, emitting the
    /// accumulated token once the run ends. Returns `Ok(false)` if input ran
    /// out mid-run (caller should wait for more `feed`).
    fn drive_greedy(&mut self, out: &mut Vec<TokenEvent>) -> Result<bool, Error> {
        match self.mini {
            MiniState::AccumulatingWhitespace => {
                self.consume_while(|c| c == CharClass::Whitespace)?;
                if self.class_at_cursor().is_none() {
                    return Ok(false);
                }
                let w = self.buffer.window_from_mark();
                self.emit(out, Token::S(w));
                self.mini = MiniState::Ready;
                Ok(true)
            }
            MiniState::AccumulatingName | MiniState::AccumulatingMarkupName => {
                self.consume_while(|c| {
                    matches!(c, CharClass::NameStart | CharClass::NameContinuation | CharClass::Digit | CharClass::HexDigit)
                })?;
                if self.class_at_cursor().is_none() {
                    return Ok(false);
                }
                let w = self.buffer.window_from_mark();
                if self.mini == MiniState::AccumulatingMarkupName {
                    if let Some(tok) = keyword_token(&self.buffer.to_string_lossy(w)) {
                        self.emit(out, tok);
                        self.mini = MiniState::Ready;
                        return Ok(true);
                    }
                }
                self.emit(out, Token::Name(w));
                self.mini = MiniState::Ready;
                Ok(true)
            }
            MiniState::AccumulatingEntityName => {
                self.consume_while(|c| {
                    matches!(c, CharClass::NameStart | CharClass::NameContinuation | CharClass::Digit | CharClass::HexDigit)
                })?;
                match self.class_at_cursor() {
                    Some(CharClass::Semicolon) => {
                        let w = self.buffer.window_from_mark();
                        let name = self.buffer.to_string_lossy(w);
                        self.buffer.advance(); // consume ';'
                        if let Some((_, ch)) = PREDEFINED.iter().find(|(n, _)| *n == name) {
                            let decoded = self.push_decoded_char(*ch);
                            self.emit(out, Token::PredefEntityRef(decoded));
                        } else {
                            self.emit(out, Token::GeneralEntityRef(w));
                        }
                        self.mini = MiniState::Ready;
                        Ok(true)
                    }
                    Some(_) => Err(Error::fatal(
                        ErrorKind::LexicalError("entity reference missing ';'"),
                        self.locator.clone(),
                    )),
                    None => Ok(false),
                }
            }
            MiniState::AccumulatingParamEntityName => {
                self.consume_while(|c| {
                    matches!(c, CharClass::NameStart | CharClass::NameContinuation | CharClass::Digit | CharClass::HexDigit)
                })?;
                match self.class_at_cursor() {
                    Some(CharClass::Semicolon) => {
                        let w = self.buffer.window_from_mark();
                        self.buffer.advance();
                        self.emit(out, Token::ParameterEntityRef(w));
                        self.mini = MiniState::Ready;
                        Ok(true)
                    }
                    Some(_) => Err(Error::fatal(
                        ErrorKind::LexicalError("parameter entity reference missing ';'"),
                        self.locator.clone(),
                    )),
                    None => Ok(false),
                }
            }
            MiniState::AccumulatingCharRefDec | MiniState::AccumulatingCharRefHex => {
                let hex = self.mini == MiniState::AccumulatingCharRefHex;
                self.consume_while(|c| {
                    if hex {
                        matches!(c, CharClass::Digit | CharClass::HexDigit)
                    } else {
                        c == CharClass::Digit
                    }
                })?;
                match self.class_at_cursor() {
                    Some(CharClass::Semicolon) => {
                        let w = self.buffer.window_from_mark();
                        let digits = self.buffer.to_string_lossy(w);
                        self.buffer.advance();
                        let radix = if hex { 16 } else { 10 };
                        let codepoint = u32::from_str_radix(&digits, radix).map_err(|_| {
                            Error::fatal(
                                ErrorKind::LexicalError("malformed character reference"),
                                self.locator.clone(),
                            )
                        })?;
                        let ch = char::from_u32(codepoint).ok_or_else(|| {
                            Error::fatal(ErrorKind::InvalidChar(codepoint), self.locator.clone())
                        })?;
                        if !self.xml11 && !is_valid_char10(ch) {
                            return Err(Error::fatal(
                                ErrorKind::InvalidChar(codepoint),
                                self.locator.clone(),
                            ));
                        }
                        let decoded = self.push_decoded_char(ch);
                        self.emit(out, Token::CharEntityRef(decoded));
                        self.mini = MiniState::Ready;
                        Ok(true)
                    }
                    Some(_) => Err(Error::fatal(
                        ErrorKind::LexicalError("character reference missing ';'"),
                        self.locator.clone(),
                    )),
                    None => Ok(false),
                }
            }
            MiniState::AccumulatingCData => {
                match self.state {
                    TokenizerState::CDataSection => self.drive_cdata_body(out),
                    TokenizerState::Comment => self.drive_comment_body(out),
                    TokenizerState::PiData => self.drive_pi_data(out),
                    _ => self.drive_plain_cdata(out),
                }
            }
            _ => unreachable!("non-greedy mini-state routed to drive_greedy"),
        }
    }

    /// Consumes characters from the buffer while `pred` holds, without
    /// emitting anything; stops at EOF-of-buffer or a non-matching class.
    fn consume_while(&mut self, pred: impl Fn(CharClass) -> bool) -> Result<(), Error> {
        while let Some(u) = self.buffer.peek() {
            let class = classify(u, self.xml11, self.allow_restricted);
            if class == CharClass::Invalid {
                return Err(Error::fatal(ErrorKind::InvalidChar(u as u32), self.locator.clone()));
            }
            if !pred(class) {
                break;
            }
            self.buffer.advance();
        }
        Ok(())
    }

    /// Stops at `<` or `&`, the two characters that always interrupt
    /// character data, plus — in an attribute value — the quote delimiting
    /// it (`'` for `AttrValueApos`, `"` for `AttrValueQuot`); otherwise an
    /// attribute value would swallow its own closing quote and everything
    /// after it.
    fn drive_plain_cdata(&mut self, out: &mut Vec<TokenEvent>) -> Result<bool, Error> {
        let delimiter = match self.state {
            TokenizerState::AttrValueApos => Some(CharClass::Apos),
            TokenizerState::AttrValueQuot => Some(CharClass::Quote),
            _ => None,
        };
        loop {
            match self.buffer.peek() {
                None => return Ok(false),
                Some(u) => {
                    let class = classify(u, self.xml11, self.allow_restricted);
                    if class == CharClass::Invalid {
                        return Err(Error::fatal(ErrorKind::InvalidChar(u as u32), self.locator.clone()));
                    }
                    if matches!(class, CharClass::Lt | CharClass::Amp) || Some(class) == delimiter {
                        if self.buffer.position() > self.buffer.mark_at() {
                            let w = self.buffer.window_from_mark();
                            self.emit(out, Token::CData(w));
                        }
                        self.mini = MiniState::Ready;
                        return Ok(true);
                    }
                    self.buffer.advance();
                }
            }
        }
    }

    fn drive_cdata_body(&mut self, out: &mut Vec<TokenEvent>) -> Result<bool, Error> {
        loop {
            match self.buffer.peek() {
                None => return Ok(false),
                Some(u) => {
                    let class = classify(u, self.xml11, self.allow_restricted);
                    if class == CharClass::Invalid {
                        return Err(Error::fatal(ErrorKind::InvalidChar(u as u32), self.locator.clone()));
                    }
                    if class == CharClass::RBracket {
                        self.run_count += 1;
                        self.buffer.advance();
                        if self.run_count >= 2 {
                            if let Some(next) = self.buffer.peek() {
                                if classify(next, self.xml11, self.allow_restricted) == CharClass::Gt {
                                    let end = self.buffer.position() - 2;
                                    let w = self.buffer.window(self.buffer.mark_at(), end);
                                    if !w.is_empty() {
                                        self.emit(out, Token::CData(w));
                                    }
                                    self.buffer.advance();
                                    self.emit(out, Token::CDataEnd);
                                    self.run_count = 0;
                                    self.mini = MiniState::Ready;
                                    self.change_state(out, TokenizerState::Content);
                                    return Ok(true);
                                }
                            } else {
                                self.buffer.set_position(self.buffer.position() - 1);
                                return Ok(false);
                            }
                        }
                        continue;
                    }
                    self.run_count = 0;
                    self.buffer.advance();
                }
            }
        }
    }

    fn drive_comment_body(&mut self, out: &mut Vec<TokenEvent>) -> Result<bool, Error> {
        loop {
            match self.buffer.peek() {
                None => return Ok(false),
                Some(u) => {
                    let class = classify(u, self.xml11, self.allow_restricted);
                    if class == CharClass::Invalid {
                        return Err(Error::fatal(ErrorKind::InvalidChar(u as u32), self.locator.clone()));
                    }
                    if class == CharClass::Dash {
                        self.run_count += 1;
                        self.buffer.advance();
                        if self.run_count >= 2 {
                            match self.buffer.peek() {
                                Some(next) if classify(next, self.xml11, self.allow_restricted) == CharClass::Gt => {
                                    let end = self.buffer.position() - 2;
                                    let w = self.buffer.window(self.buffer.mark_at(), end);
                                    if !w.is_empty() {
                                        self.emit(out, Token::CData(w));
                                    }
                                    self.buffer.advance();
                                    self.emit(out, Token::CommentEnd);
                                    self.run_count = 0;
                                    self.mini = MiniState::Ready;
                                    self.change_state(out, self.pending_return_state());
                                    return Ok(true);
                                }
                                Some(_) => {
                                    return Err(Error::fatal(
                                        ErrorKind::LexicalError("'--' not allowed inside a comment"),
                                        self.locator.clone(),
                                    ));
                                }
                                None => {
                                    self.buffer.set_position(self.buffer.position() - 1);
                                    return Ok(false);
                                }
                            }
                        }
                        continue;
                    }
                    self.run_count = 0;
                    self.buffer.advance();
                }
            }
        }
    }

    /// PI data runs until `?>`; a lone `?` not immediately followed by `>` is
    /// just data and the scan continues (unlike comments, where `--` is
    /// always illegal, `?` alone is unremarkable inside PI data).
    fn drive_pi_data(&mut self, out: &mut Vec<TokenEvent>) -> Result<bool, Error> {
        loop {
            match self.buffer.peek() {
                None => return Ok(false),
                Some(u) => {
                    let class = classify(u, self.xml11, self.allow_restricted);
                    if class == CharClass::Invalid {
                        return Err(Error::fatal(ErrorKind::InvalidChar(u as u32), self.locator.clone()));
                    }
                    if class == CharClass::Question {
                        self.buffer.advance();
                        match self.buffer.peek() {
                            Some(next) if classify(next, self.xml11, self.allow_restricted) == CharClass::Gt => {
                                let end = self.buffer.position() - 1;
                                let w = self.buffer.window(self.buffer.mark_at(), end);
                                if !w.is_empty() {
                                    self.emit(out, Token::CData(w));
                                }
                                self.buffer.advance();
                                self.emit(out, Token::PiEnd);
                                self.mini = MiniState::Ready;
                                self.change_state(out, TokenizerState::Content);
                                return Ok(true);
                            }
                            Some(_) => continue,
                            None => {
                                self.buffer.set_position(self.buffer.position() - 1);
                                return Ok(false);
                            }
                        }
                    }
                    self.buffer.advance();
                }
            }
        }
    }

    /// Comments may appear in content or inside a DOCTYPE; remember which by
    /// stashing the enclosing state isn't needed beyond content/doctype
    /// since that's the only ambiguity this tokenizer resolves here — the
    /// caller's state before entering `Comment` decided nothing else about
    /// lexing, so we default back to `Content`. DTD-interior comments are
    /// only reachable from `DoctypeInternal`/`Doctype`, tracked via
    /// `comment_return`.
    fn pending_return_state(&self) -> TokenizerState {
        self.comment_return.unwrap_or(TokenizerState::Content)
    }

    fn push_decoded_char(&mut self, ch: char) -> CharWindow {
        let start = self.buffer.len();
        let mut buf = [0u16; 2];
        let units = ch.encode_utf16(&mut buf);
        self.buffer.extend(units);
        CharWindow::new(start, units.len())
    }

    fn step(&mut self, out: &mut Vec<TokenEvent>, class: CharClass) -> Result<(), Error> {
        use MiniState::*;
        use TokenizerState as S;

        match (self.state, self.mini) {
            (S::PrologBeforeDoctype, Ready) | (S::PrologAfterDoctype, Ready) | (S::Content, Ready) => {
                match class {
                    CharClass::Whitespace if self.state != S::Content => {
                        self.buffer.mark();
                        self.mini = AccumulatingWhitespace;
                    }
                    CharClass::Lt => {
                        self.buffer.advance();
                        self.mini = SeenLt;
                    }
                    CharClass::Amp if self.state == S::Content => {
                        self.buffer.advance();
                        self.mini = SeenAmp;
                    }
                    _ if self.state == S::Content => {
                        self.buffer.mark();
                        self.mini = AccumulatingCData;
                    }
                    _ => {
                        return Err(Error::fatal(
                            ErrorKind::LexicalError("unexpected character in prolog"),
                            self.locator.clone(),
                        ))
                    }
                }
            }

            (_, SeenLt) => match class {
                CharClass::Slash => {
                    self.buffer.advance();
                    self.emit(out, Token::LtSlash);
                    self.mini = Ready;
                    self.change_state(out, S::ElementName);
                }
                CharClass::Bang => {
                    self.buffer.advance();
                    self.mini = SeenLtBang;
                }
                CharClass::Question => {
                    self.buffer.advance();
                    self.emit(out, Token::PiStart);
                    self.mini = Ready;
                    self.change_state(out, S::PiTarget);
                }
                CharClass::NameStart => {
                    self.emit(out, Token::Lt);
                    self.mini = Ready;
                    self.change_state(out, S::ElementName);
                }
                _ => {
                    return Err(Error::fatal(
                        ErrorKind::LexicalError("'<' not followed by a valid construct"),
                        self.locator.clone(),
                    ))
                }
            },

            (_, SeenLtBang) => match class {
                CharClass::Dash => {
                    self.buffer.advance();
                    self.mini = SeenLtBangDash;
                }
                CharClass::LBracket if self.state == S::Content => {
                    self.verify_literal("[CDATA[")?;
                    self.emit(out, Token::CDataStart);
                    self.mini = AccumulatingCData;
                    self.buffer.mark();
                    self.change_state(out, S::CDataSection);
                }
                CharClass::NameStart if self.state == S::PrologBeforeDoctype => {
                    self.verify_literal("DOCTYPE")?;
                    self.emit(out, Token::DoctypeStart);
                    self.mini = Ready;
                    self.change_state(out, S::Doctype);
                }
                CharClass::LBracket if matches!(self.state, S::Doctype | S::DoctypeInternal) => {
                    self.buffer.advance();
                    self.emit(out, Token::CondSectStart);
                    self.mini = Ready;
                    self.change_state(out, S::ConditionalSectionKeyword);
                }
                _ => {
                    return Err(Error::fatal(
                        ErrorKind::LexicalError("'<!' not followed by a valid construct"),
                        self.locator.clone(),
                    ))
                }
            },

            (_, SeenLtBangDash) => match class {
                CharClass::Dash => {
                    self.buffer.advance();
                    self.emit(out, Token::CommentStart);
                    self.comment_return = Some(self.state);
                    self.mini = AccumulatingCData;
                    self.buffer.mark();
                    self.run_count = 0;
                    self.change_state(out, S::Comment);
                }
                _ => {
                    return Err(Error::fatal(
                        ErrorKind::LexicalError("expected second '-' starting a comment"),
                        self.locator.clone(),
                    ))
                }
            },

            // A bare NameStart only makes sense as the very first character of
            // the target; by the time the greedy name run yields control back
            // here the target is already recorded, so NameStart can't recur.
            // Whitespace after the target begins the data portion (scanned
            // entirely by `drive_pi_data`, which also absorbs a trailing lone
            // `?`); an immediate `?` with no separating whitespace means the
            // instruction has no data and must close right here.
            (S::PiTarget, Ready) => match class {
                CharClass::NameStart => {
                    self.buffer.mark();
                    self.mini = AccumulatingName;
                }
                CharClass::Whitespace => {
                    self.buffer.advance();
                    self.change_state(out, S::PiData);
                }
                CharClass::Question => {
                    self.buffer.advance();
                    self.mini = SeenQuery;
                }
                _ => {
                    return Err(Error::fatal(
                        ErrorKind::LexicalError("expected processing-instruction target name"),
                        self.locator.clone(),
                    ))
                }
            },

            (S::PiTarget, SeenQuery) => match class {
                CharClass::Gt => {
                    self.buffer.advance();
                    self.emit(out, Token::PiEnd);
                    self.mini = Ready;
                    self.change_state(out, S::Content);
                }
                _ => {
                    return Err(Error::fatal(
                        ErrorKind::LexicalError("expected '>' closing processing instruction"),
                        self.locator.clone(),
                    ))
                }
            },

            (S::PiData, Ready) => {
                self.buffer.mark();
                self.mini = AccumulatingCData;
            }

            (S::ElementName, Ready) => match class {
                CharClass::NameStart => {
                    self.buffer.mark();
                    self.mini = AccumulatingName;
                }
                CharClass::Whitespace => {
                    self.buffer.mark();
                    self.buffer.advance();
                    let w = self.buffer.window_from_mark();
                    self.emit(out, Token::S(w));
                    self.change_state(out, S::ElementAttrs);
                }
                CharClass::Slash => {
                    self.buffer.advance();
                    self.mini = SeenSlash;
                }
                CharClass::Gt => {
                    self.buffer.advance();
                    self.emit(out, Token::Gt);
                    self.change_state(out, S::Content);
                }
                _ => {
                    return Err(Error::fatal(
                        ErrorKind::LexicalError("unexpected character in element/end-tag name"),
                        self.locator.clone(),
                    ))
                }
            },

            (S::ElementAttrs, Ready) => match class {
                CharClass::Whitespace => {
                    self.buffer.advance();
                }
                CharClass::NameStart => {
                    self.buffer.mark();
                    self.mini = AccumulatingName;
                }
                CharClass::Eq => {
                    self.buffer.advance();
                    self.emit(out, Token::Eq);
                }
                CharClass::Apos => {
                    self.buffer.advance();
                    self.emit(out, Token::Apos);
                    self.buffer.mark();
                    self.mini = AccumulatingCData;
                    self.change_state(out, S::AttrValueApos);
                }
                CharClass::Quote => {
                    self.buffer.advance();
                    self.emit(out, Token::Quote);
                    self.buffer.mark();
                    self.mini = AccumulatingCData;
                    self.change_state(out, S::AttrValueQuot);
                }
                CharClass::Slash => {
                    self.buffer.advance();
                    self.mini = SeenSlash;
                }
                CharClass::Gt => {
                    self.buffer.advance();
                    self.emit(out, Token::Gt);
                    self.change_state(out, S::Content);
                }
                _ => {
                    return Err(Error::fatal(
                        ErrorKind::LexicalError("unexpected character in start-tag attributes"),
                        self.locator.clone(),
                    ))
                }
            },

            (_, SeenSlash) => match class {
                CharClass::Gt => {
                    self.buffer.advance();
                    self.emit(out, Token::SlashGt);
                    self.mini = Ready;
                    self.change_state(out, S::Content);
                }
                _ => {
                    return Err(Error::fatal(
                        ErrorKind::LexicalError("expected '>' after '/'"),
                        self.locator.clone(),
                    ))
                }
            },

            (S::AttrValueApos, Ready) | (S::AttrValueQuot, Ready) => {
                let closing = if self.state == S::AttrValueApos {
                    CharClass::Apos
                } else {
                    CharClass::Quote
                };
                match class {
                    c if c == closing => {
                        self.buffer.advance();
                        self.emit(
                            out,
                            if closing == CharClass::Apos {
                                Token::Apos
                            } else {
                                Token::Quote
                            },
                        );
                        self.change_state(out, S::ElementAttrs);
                    }
                    CharClass::Amp => {
                        self.buffer.advance();
                        self.mini = SeenAmp;
                    }
                    _ => {
                        self.buffer.mark();
                        self.mini = AccumulatingCData;
                    }
                }
            }

            (_, SeenAmp) => match class {
                CharClass::Hash => {
                    self.buffer.advance();
                    self.mini = SeenAmpHash;
                }
                CharClass::NameStart => {
                    self.buffer.mark();
                    self.mini = AccumulatingEntityName;
                }
                _ => {
                    return Err(Error::fatal(
                        ErrorKind::LexicalError("'&' not followed by a valid entity/character reference"),
                        self.locator.clone(),
                    ))
                }
            },

            (_, SeenAmpHash) => match class {
                CharClass::Digit => {
                    self.buffer.mark();
                    self.mini = AccumulatingCharRefDec;
                }
                _ if matches!(self.buffer.peek(), Some(u) if u == 'x' as u16 || u == 'X' as u16) => {
                    self.buffer.advance();
                    self.mini = SeenAmpHashX;
                }
                _ => {
                    return Err(Error::fatal(
                        ErrorKind::LexicalError("'&#' not followed by a digit or 'x'"),
                        self.locator.clone(),
                    ))
                }
            },

            (_, SeenAmpHashX) => match class {
                CharClass::Digit | CharClass::HexDigit => {
                    self.buffer.mark();
                    self.mini = AccumulatingCharRefHex;
                }
                _ => {
                    return Err(Error::fatal(
                        ErrorKind::LexicalError("'&#x' not followed by a hex digit"),
                        self.locator.clone(),
                    ))
                }
            },

            (S::Doctype, Ready) | (S::DoctypeInternal, Ready) => match class {
                CharClass::Whitespace => {
                    self.buffer.mark();
                    self.mini = AccumulatingWhitespace;
                }
                CharClass::NameStart => {
                    self.buffer.mark();
                    self.mini = AccumulatingMarkupName;
                }
                CharClass::LBracket => {
                    self.buffer.advance();
                    self.emit(out, Token::LBracket);
                    self.change_state(out, S::DoctypeInternal);
                }
                CharClass::RBracket => {
                    self.buffer.advance();
                    self.mini = SeenCloseBracket;
                }
                CharClass::Lt => {
                    self.buffer.advance();
                    self.mini = SeenLt;
                }
                CharClass::Percent => {
                    self.buffer.advance();
                    self.mini = SeenPercent;
                }
                CharClass::Apos => {
                    self.buffer.advance();
                    self.emit(out, Token::Apos);
                    self.buffer.mark();
                    self.mini = AccumulatingCData;
                    self.change_state(out, if self.state == S::Doctype {
                        S::DoctypeQuotedApos
                    } else {
                        S::DoctypeInternalQuotedApos
                    });
                }
                CharClass::Quote => {
                    self.buffer.advance();
                    self.emit(out, Token::Quote);
                    self.buffer.mark();
                    self.mini = AccumulatingCData;
                    self.change_state(out, if self.state == S::Doctype {
                        S::DoctypeQuotedQuot
                    } else {
                        S::DoctypeInternalQuotedQuot
                    });
                }
                CharClass::Gt => {
                    self.buffer.advance();
                    self.emit(out, Token::Gt);
                    self.change_state(out, S::PrologAfterDoctype);
                }
                _ => {
                    return Err(Error::fatal(
                        ErrorKind::LexicalError("unexpected character in DOCTYPE"),
                        self.locator.clone(),
                    ))
                }
            },

            (_, SeenPercent) => match class {
                CharClass::NameStart => {
                    self.buffer.mark();
                    self.mini = AccumulatingParamEntityName;
                }
                _ => {
                    return Err(Error::fatal(
                        ErrorKind::LexicalError("'%' not followed by a parameter-entity name"),
                        self.locator.clone(),
                    ))
                }
            },

            // Distinguishes a lone `]` closing the internal subset from the
            // `]]>` that closes a conditional section: one char of
            // lookahead beyond what a greedy accumulator would give us.
            (_, SeenCloseBracket) => match class {
                CharClass::RBracket => {
                    self.buffer.advance();
                    self.mini = SeenCloseBracketCloseBracket;
                }
                _ => {
                    self.emit(out, Token::RBracket);
                    self.mini = Ready;
                }
            },

            (_, SeenCloseBracketCloseBracket) => match class {
                CharClass::Gt => {
                    self.buffer.advance();
                    self.emit(out, Token::CondSectEnd);
                    self.mini = Ready;
                }
                _ => {
                    return Err(Error::fatal(
                        ErrorKind::LexicalError("']]' not followed by '>' closing conditional section"),
                        self.locator.clone(),
                    ))
                }
            },

            (S::DoctypeQuotedApos, Ready)
            | (S::DoctypeQuotedQuot, Ready)
            | (S::DoctypeInternalQuotedApos, Ready)
            | (S::DoctypeInternalQuotedQuot, Ready) => {
                let (closing, ret) = match self.state {
                    S::DoctypeQuotedApos => (CharClass::Apos, S::Doctype),
                    S::DoctypeQuotedQuot => (CharClass::Quote, S::Doctype),
                    S::DoctypeInternalQuotedApos => (CharClass::Apos, S::DoctypeInternal),
                    _ => (CharClass::Quote, S::DoctypeInternal),
                };
                if class == closing {
                    self.buffer.advance();
                    self.emit(
                        out,
                        if closing == CharClass::Apos {
                            Token::Apos
                        } else {
                            Token::Quote
                        },
                    );
                    self.change_state(out, ret);
                } else {
                    self.buffer.mark();
                    self.mini = AccumulatingCData;
                }
            }

            (S::ConditionalSectionKeyword, Ready) => match class {
                CharClass::Whitespace => {
                    self.buffer.mark();
                    self.mini = AccumulatingWhitespace;
                }
                CharClass::NameStart => {
                    self.buffer.mark();
                    self.mini = AccumulatingMarkupName;
                }
                CharClass::Percent => {
                    self.buffer.advance();
                    self.mini = SeenPercent;
                }
                CharClass::LBracket => {
                    self.buffer.advance();
                    self.emit(out, Token::LBracket);
                    self.change_state(out, S::DoctypeInternal);
                }
                _ => {
                    return Err(Error::fatal(
                        ErrorKind::LexicalError("unexpected character starting a conditional section"),
                        self.locator.clone(),
                    ))
                }
            },

            other => {
                return Err(Error::fatal(
                    ErrorKind::LexicalError(state_mini_description(other.0, other.1)),
                    self.locator.clone(),
                ))
            }
        }
        Ok(())
    }

    fn verify_literal(&mut self, literal: &'static str) -> Result<(), Error> {
        for expected in literal.chars() {
            match self.buffer.peek() {
                Some(u) if u == expected as u16 => self.buffer.advance(),
                Some(_) => {
                    return Err(Error::fatal(
                        ErrorKind::MismatchedLiteral { expected: literal },
                        self.locator.clone(),
                    ))
                }
                None => {
                    return Err(Error::fatal(
                        ErrorKind::MismatchedLiteral { expected: literal },
                        self.locator.clone(),
                    ))
                }
            }
        }
        Ok(())
    }

}

fn state_mini_description(state: TokenizerState, mini: MiniState) -> &'static str {
    let _ = (state, mini);
    "unsupported state/mini-state combination"
}

fn is_valid_char10(ch: char) -> bool {
    matches!(ch as u32, 0x09 | 0x0A | 0x0D | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x10000..=0x10FFFF)
}

fn keyword_token(s: &str) -> Option<Token> {
    Some(match s {
        "SYSTEM" => Token::KwSystem,
        "PUBLIC" => Token::KwPublic,
        "NDATA" => Token::KwNData,
        "INCLUDE" => Token::KwInclude,
        "IGNORE" => Token::KwIgnore,
        "CDATA" => Token::KwCData,
        "ID" => Token::KwId,
        "IDREF" => Token::KwIdref,
        "IDREFS" => Token::KwIdrefs,
        "ENTITY" => Token::KwEntity,
        "ENTITIES" => Token::KwEntities,
        "NMTOKEN" => Token::KwNmtoken,
        "NMTOKENS" => Token::KwNmtokens,
        "NOTATION" => Token::KwNotation,
        "REQUIRED" => Token::KwRequired,
        "IMPLIED" => Token::KwImplied,
        "FIXED" => Token::KwFixed,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_str(t: &mut Tokenizer, s: &str) -> Vec<TokenEvent> {
        let units: Vec<u16> = s.encode_utf16().collect();
        t.feed(&units).unwrap()
    }

    #[test]
    fn tokenizes_simple_element() {
        let mut t = Tokenizer::new(TokenizerState::Content, false, false);
        let events = feed_str(&mut t, "<a>hi</a>");
        let toks: Vec<_> = events
            .into_iter()
            .filter_map(|e| match e {
                TokenEvent::Token(tok) => Some(tok),
                _ => None,
            })
            .collect();
        assert!(matches!(toks[0], Token::Lt));
        assert!(matches!(toks[1], Token::Name(_)));
        assert!(matches!(toks[2], Token::Gt));
        assert!(matches!(toks[3], Token::CData(_)));
        assert!(matches!(toks[4], Token::LtSlash));
    }

    #[test]
    fn decodes_predefined_and_numeric_entities() {
        let mut t = Tokenizer::new(TokenizerState::Content, false, false);
        let events = feed_str(&mut t, "&lt;&#65;");
        let mut saw_predef = false;
        let mut saw_numeric = false;
        for e in events {
            if let TokenEvent::Token(Token::PredefEntityRef(w)) = e {
                assert_eq!(t.text(w), "<");
                saw_predef = true;
            }
            if let TokenEvent::Token(Token::CharEntityRef(w)) = e {
                assert_eq!(t.text(w), "A");
                saw_numeric = true;
            }
        }
        assert!(saw_predef && saw_numeric);
    }

    #[test]
    fn recognises_comment_and_cdata() {
        let mut t = Tokenizer::new(TokenizerState::Content, false, false);
        let events = feed_str(&mut t, "<!--hi--><![CDATA[x]]>");
        let toks: Vec<_> = events
            .into_iter()
            .filter_map(|e| match e {
                TokenEvent::Token(tok) => Some(tok),
                _ => None,
            })
            .collect();
        assert!(matches!(toks[0], Token::CommentStart));
        assert!(matches!(toks[2], Token::CommentEnd));
        assert!(matches!(toks[3], Token::CDataStart));
        assert!(matches!(toks[5], Token::CDataEnd));
    }

    #[test]
    fn close_on_unterminated_comment_is_fatal() {
        let mut t = Tokenizer::new(TokenizerState::Content, false, false);
        feed_str(&mut t, "<!--never closed");
        assert!(t.close().is_err());
    }
}
