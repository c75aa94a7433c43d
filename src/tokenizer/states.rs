//! [`TokenizerState`] (top-level context) and [`MiniState`] (inner state),
//! the two closed enumerations the transition table is indexed by (§4.2).

/// The top-level lexical context. A nested tokenizer constructed for entity
/// expansion is given one of these as its starting state, matching whatever
/// context the enclosing parser was in at the reference site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenizerState {
    PrologBeforeDoctype,
    PrologAfterDoctype,
    Content,
    ElementName,
    ElementAttrs,
    AttrValueApos,
    AttrValueQuot,
    Doctype,
    DoctypeInternal,
    DoctypeQuotedApos,
    DoctypeQuotedQuot,
    DoctypeInternalQuotedApos,
    DoctypeInternalQuotedQuot,
    ConditionalSectionKeyword,
    ConditionalSectionInclude,
    ConditionalSectionIgnore,
    Comment,
    CDataSection,
    PiTarget,
    PiData,
    Closed,
}

impl TokenizerState {
    /// States in which `close()` may legitimately succeed: between
    /// constructs, never mid-tag/mid-comment/mid-CDATA/mid-PI/mid-DOCTYPE.
    /// `Content` counts because the tokenizer alone cannot distinguish
    /// "between top-level document items" from "between children of the
    /// open root element" — that distinction belongs to the content
    /// parser's element stack, which independently rejects a premature
    /// `close()` while elements remain open. `DoctypeInternal` counts
    /// because an external DTD subset has no closing delimiter of its own —
    /// a nested tokenizer parsing one is started in this state and simply
    /// runs out of input at end of stream, between two markup declarations.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TokenizerState::Closed
                | TokenizerState::Content
                | TokenizerState::PrologBeforeDoctype
                | TokenizerState::PrologAfterDoctype
                | TokenizerState::DoctypeInternal
        )
    }
}

/// The inner state, reset to `Ready` on most top-level transitions but
/// preserved across a greedy accumulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MiniState {
    Ready,
    SeenLt,
    SeenLtBang,
    SeenLtBangDash,
    SeenLtBangOpenBracket,
    SeenLtBangLetter,
    SeenAmp,
    SeenAmpHash,
    SeenAmpHashX,
    SeenPercent,
    SeenDash,
    SeenDashDash,
    SeenCloseBracket,
    SeenCloseBracketCloseBracket,
    SeenQuery,
    SeenSlash,
    AccumulatingName,
    AccumulatingWhitespace,
    AccumulatingCData,
    AccumulatingEntityName,
    AccumulatingParamEntityName,
    AccumulatingCharRefDec,
    AccumulatingCharRefHex,
    AccumulatingMarkupName,
}

impl MiniState {
    /// Greedy states stay put, consuming matching `CharClass` inputs without
    /// a fresh table lookup per character, until a stop character ends the
    /// run (§4.2 step 4).
    pub fn is_greedy(self) -> bool {
        matches!(
            self,
            MiniState::AccumulatingName
                | MiniState::AccumulatingWhitespace
                | MiniState::AccumulatingCData
                | MiniState::AccumulatingEntityName
                | MiniState::AccumulatingParamEntityName
                | MiniState::AccumulatingCharRefDec
                | MiniState::AccumulatingCharRefHex
                | MiniState::AccumulatingMarkupName
        )
    }
}
