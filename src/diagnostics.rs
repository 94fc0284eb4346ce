//! Unified error/warning taxonomy (spec §7), one struct per phase mirroring
//! the teacher's `TypeError`/`ParseError`/`LexError` idiom (`Display` +
//! `std::error::Error`, each carrying a `Position`), gathered behind one
//! `Diagnostic` enum so `interpret` has a single error type to return.

use std::fmt::Display;

use serde::Serialize;

use crate::lexer::LexFailure;
use crate::token::Position;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParserError {
    pub message: String,
    pub position: Position,
}

impl Display for ParserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (at byte {})", self.message, self.position)
    }
}
impl std::error::Error for ParserError {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ElaborationErrorKind {
    TypeMismatch,
    OccursCheck,
    UnboundIdentifier,
    UnboundConstructor,
    EqualityRequired,
    UnguardedTypeVariable,
    ArityMismatch,
    RecordLabelMismatch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElaborationError {
    pub kind: ElaborationErrorKind,
    pub message: String,
    pub position: Position,
}

impl Display for ElaborationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?}: {} (at byte {})",
            self.kind, self.message, self.position
        )
    }
}
impl std::error::Error for ElaborationError {}

/// A non-recoverable runtime violation outside the exception mechanism:
/// rebind of a protected identifier, or an invariant breach.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationError {
    pub message: String,
    pub position: Position,
}

impl Display for EvaluationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (at byte {})", self.message, self.position)
    }
}
impl std::error::Error for EvaluationError {}

/// A construct the interpreter deliberately refuses, e.g. `withtype`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureDisabledError {
    pub feature: String,
    pub message: String,
    pub position: Position,
}

impl Display for FeatureDisabledError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "feature '{}' is disabled: {} (at byte {})",
            self.feature, self.message, self.position
        )
    }
}
impl std::error::Error for FeatureDisabledError {}

/// Should be impossible; only ever constructed by an invariant check that
/// would otherwise be an `unreachable!()`, so embedding this crate never
/// triggers a panic/unwind from a malformed (but not hostile) program.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InternalError {
    pub message: String,
}

impl Display for InternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "internal interpreter error: {}", self.message)
    }
}
impl std::error::Error for InternalError {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Diagnostic {
    Lexer(crate::lexer::LexError),
    Incomplete(crate::lexer::IncompleteError),
    Parser(ParserError),
    Elaboration(ElaborationError),
    Evaluation(EvaluationError),
    FeatureDisabled(FeatureDisabledError),
    Internal(InternalError),
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::Lexer(e) => e.fmt(f),
            Diagnostic::Incomplete(e) => e.fmt(f),
            Diagnostic::Parser(e) => e.fmt(f),
            Diagnostic::Elaboration(e) => e.fmt(f),
            Diagnostic::Evaluation(e) => e.fmt(f),
            Diagnostic::FeatureDisabled(e) => e.fmt(f),
            Diagnostic::Internal(e) => e.fmt(f),
        }
    }
}
impl std::error::Error for Diagnostic {}

impl From<LexFailure> for Diagnostic {
    fn from(value: LexFailure) -> Self {
        match value {
            LexFailure::Lex(e) => Diagnostic::Lexer(e),
            LexFailure::Incomplete(e) => Diagnostic::Incomplete(e),
        }
    }
}
impl From<ParserError> for Diagnostic {
    fn from(value: ParserError) -> Self {
        Diagnostic::Parser(value)
    }
}
impl From<ElaborationError> for Diagnostic {
    fn from(value: ElaborationError) -> Self {
        Diagnostic::Elaboration(value)
    }
}
impl From<EvaluationError> for Diagnostic {
    fn from(value: EvaluationError) -> Self {
        Diagnostic::Evaluation(value)
    }
}
impl From<FeatureDisabledError> for Diagnostic {
    fn from(value: FeatureDisabledError) -> Self {
        Diagnostic::FeatureDisabled(value)
    }
}
impl From<InternalError> for Diagnostic {
    fn from(value: InternalError) -> Self {
        Diagnostic::Internal(value)
    }
}

/// Non-fatal, collected and returned alongside the new state (spec §6).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    pub message: String,
    pub position: Position,
}

/// What `simplify` can fail with: every simplification failure in this
/// language is framed, per spec §4.2/§4.3, either as a parser-level
/// grammar violation (mismatched `fun` clause arities) or as an explicit
/// feature refusal (`withtype`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SimplifyFailure {
    Parser(ParserError),
    FeatureDisabled(FeatureDisabledError),
}

impl From<SimplifyFailure> for Diagnostic {
    fn from(value: SimplifyFailure) -> Self {
        match value {
            SimplifyFailure::Parser(e) => Diagnostic::Parser(e),
            SimplifyFailure::FeatureDisabled(e) => Diagnostic::FeatureDisabled(e),
        }
    }
}
