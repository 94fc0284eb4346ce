//! Shared vocabulary between the lexer and the parser: source positions,
//! the token enum and the fixity attributes an identifier can carry.

use serde::Serialize;
use std::fmt::Display;

/// A nonnegative byte offset into the source that produced a token or AST
/// node. `SYNTHETIC` marks nodes that were not written by the user (e.g.
/// ones invented by the simplifier).
pub type Position = i64;

pub const SYNTHETIC: Position = -1;

/// Tagged token vocabulary, per spec §3 "Tokens".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Token {
    Keyword { text: String, position: Position },
    /// Decimal integer literal with no leading zero, usable as a record label.
    Numeric { text: String, value: i64, position: Position },
    IntegerConstant { text: String, value: i64, position: Position },
    RealConstant { text: String, value: f64, position: Position },
    WordConstant { text: String, value: i64, position: Position },
    CharacterConstant { text: String, value: char, position: Position },
    StringConstant { text: String, value: String, position: Position },
    AlphanumericIdentifier { text: String, op_prefixed: bool, position: Position },
    SymbolicIdentifier { text: String, op_prefixed: bool, position: Position },
    TypeVariable { text: String, position: Position },
    EqualityTypeVariable { text: String, position: Position },
    Star { position: Position },
    Equals { position: Position },
    LongIdentifier {
        qualifiers: Vec<String>,
        /// Text of the final component; `final_is_symbolic` says whether it
        /// was scanned from the symbolic character class.
        final_text: String,
        final_is_symbolic: bool,
        position: Position,
    },
}

impl Token {
    pub fn position(&self) -> Position {
        match self {
            Token::Keyword { position, .. }
            | Token::Numeric { position, .. }
            | Token::IntegerConstant { position, .. }
            | Token::RealConstant { position, .. }
            | Token::WordConstant { position, .. }
            | Token::CharacterConstant { position, .. }
            | Token::StringConstant { position, .. }
            | Token::AlphanumericIdentifier { position, .. }
            | Token::SymbolicIdentifier { position, .. }
            | Token::TypeVariable { position, .. }
            | Token::EqualityTypeVariable { position, .. }
            | Token::Star { position }
            | Token::Equals { position }
            | Token::LongIdentifier { position, .. } => *position,
        }
    }

    /// The literal source text this token was lexed from (sans quotes/escape
    /// processing), used by the §8 re-serialization invariant.
    pub fn text(&self) -> String {
        match self {
            Token::Keyword { text, .. }
            | Token::Numeric { text, .. }
            | Token::IntegerConstant { text, .. }
            | Token::RealConstant { text, .. }
            | Token::WordConstant { text, .. }
            | Token::AlphanumericIdentifier { text, .. }
            | Token::SymbolicIdentifier { text, .. }
            | Token::TypeVariable { text, .. }
            | Token::EqualityTypeVariable { text, .. } => text.clone(),
            Token::CharacterConstant { text, .. } => text.clone(),
            Token::StringConstant { text, .. } => text.clone(),
            Token::Star { .. } => "*".to_string(),
            Token::Equals { .. } => "=".to_string(),
            Token::LongIdentifier {
                qualifiers,
                final_text,
                ..
            } => {
                let mut out = String::new();
                for q in qualifiers {
                    out.push_str(q);
                    out.push('.');
                }
                out.push_str(final_text);
                out
            }
        }
    }

    /// Whether this token was written with an explicit `op` prefix,
    /// forcing a non-infix occurrence (spec §4.2).
    pub fn is_op_prefixed(&self) -> bool {
        matches!(
            self,
            Token::AlphanumericIdentifier { op_prefixed: true, .. }
                | Token::SymbolicIdentifier { op_prefixed: true, .. }
        )
    }

    /// The identifier text if this token denotes an (unqualified) value
    /// identifier, for fixity lookup.
    pub fn identifier_text(&self) -> Option<&str> {
        match self {
            Token::AlphanumericIdentifier { text, .. } => Some(text),
            Token::SymbolicIdentifier { text, .. } => Some(text),
            Token::Star { .. } => Some("*"),
            Token::Equals { .. } => Some("="),
            _ => None,
        }
    }
}

/// Associativity of an infix identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Associativity {
    Left,
    Right,
}

/// An identifier's fixity: its binary-operator precedence and
/// associativity, or none if it parses only by application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Fixity {
    pub precedence: u8,
    pub associativity: Associativity,
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text())
    }
}
