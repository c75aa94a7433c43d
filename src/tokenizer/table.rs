//! The [`Transition`] record shape and the literal sequences the tokenizer
//! verifies after a multi-character lead-in (`<!--`, `<![CDATA[`, `<!DOCTYPE`,
//! keyword fragments inside conditional sections). Grounded on the teacher's
//! `BangType`/`ReadElementState` (`reader.rs`), which used the same
//! "recognise a few leading bytes, then verify the rest of a literal"
//! convention for `<!--`, `<![CDATA[`, and `<!DOCTYPE`.
//!
//! The conceptual table described in §4.2 (`table[state][mini * |CharClass|
//! + class]`) is realised here as the `step` match in `tokenizer::mod`
//! rather than a literal flat array: the state space is sparse enough (most
//! `(state, mini, class)` triples are unreachable) that a literal array
//! would be mostly `None` entries, and the match form is what the rest of
//! this codebase's state machines use. The semantics — lookup by
//! `(TokenizerState, MiniState, CharClass)`, yielding an optional ordered
//! emit list, a mini-state update, and an optional top-level state change —
//! are unchanged.

use crate::token::Token;
use crate::tokenizer::states::{MiniState, TokenizerState};

/// The effect of consuming one character (or, for a greedy mini-state, one
/// run of characters) from a given `(TokenizerState, MiniState)` pair.
#[derive(Debug, Clone, Default)]
pub struct Transition {
    pub next_mini_state: Option<MiniState>,
    pub emit: Vec<Token>,
    pub state_to_change_to: Option<TokenizerState>,
    /// A literal that must be verified and consumed verbatim before the
    /// transition completes (e.g. `OCTYPE` after recognising `<!D`).
    pub sequence_to_consume: Option<&'static str>,
}

impl Transition {
    pub fn to_mini(mini: MiniState) -> Self {
        Self {
            next_mini_state: Some(mini),
            ..Default::default()
        }
    }

    pub fn emitting(mini: MiniState, tokens: Vec<Token>) -> Self {
        Self {
            next_mini_state: Some(mini),
            emit: tokens,
            ..Default::default()
        }
    }

    pub fn entering(mini: MiniState, state: TokenizerState, tokens: Vec<Token>) -> Self {
        Self {
            next_mini_state: Some(mini),
            emit: tokens,
            state_to_change_to: Some(state),
            sequence_to_consume: None,
        }
    }

    pub fn with_literal(mut self, literal: &'static str) -> Self {
        self.sequence_to_consume = Some(literal);
        self
    }
}
