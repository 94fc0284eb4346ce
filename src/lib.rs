//! `sml_repl_core`: lexer, parser, Hindley-Milner elaborator, and evaluator
//! for an interactive Standard ML dialect.
//!
//! The crate exposes three entry points a host (REPL, browser worker,
//! language-server-style editor integration) drives directly:
//! [`initial_state`], [`interpret`], and [`State::pretty_print`]. Everything
//! else is pipeline machinery the host need not touch.

mod ast;
mod builtins;
mod core_ast;
mod diagnostics;
mod elaborate;
mod eval;
mod fixity;
mod lexer;
mod limits;
mod parser;
mod simplify;
mod state;
mod token;
mod types;
mod value;

pub use diagnostics::{
    Diagnostic, ElaborationError, ElaborationErrorKind, EvaluationError, FeatureDisabledError,
    InternalError, ParserError, Warning,
};
pub use lexer::{IncompleteError, LexError, LexerOptions};
pub use state::{RebindStatus, State, TypeInfo};
pub use token::Position;
pub use types::{Type, TypeScheme};
pub use value::Value;

use lexer::Lexer;

/// Toggles accepted by [`interpret`] (spec §6 `interpret(source, state,
/// options)`). Every field defaults to `false`: this interpreter's base
/// dialect is the SML '97 core described by the rest of this crate, and
/// each toggle only ever *relaxes* it.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterpretOptions {
    /// Accept Successor ML surface extensions. Not implemented; reserved
    /// for host-level feature negotiation, per spec §9 Open Question (i).
    pub allow_successor_ml: bool,
    /// Accept `Vector`/`Array` literal syntax. Not implemented: no
    /// `Vector`/`Array` type or operations exist in this crate.
    pub allow_vector: bool,
    /// Skip elaboration; evaluate straight off the simplified core AST.
    pub disable_elaboration: bool,
    /// Skip evaluation; stop after elaboration succeeds.
    pub disable_evaluation: bool,
    /// Reserved for stricter diagnostics (e.g. warnings promoted to
    /// errors). Not yet consulted by any phase.
    pub strict_mode: bool,
    /// Allow non-ASCII characters in string/character literals and
    /// identifiers.
    pub allow_unicode: bool,
    /// Allow non-ASCII characters in type variable names.
    pub allow_unicode_type_variables: bool,
}

/// The result of one [`interpret`] call (spec §6). On error, `state` is the
/// state the caller passed in, unchanged (spec §7's "state returned on
/// error equals the state before the chunk").
#[derive(Debug, Clone)]
pub struct InterpretResult {
    pub state: State,
    pub evaluation_errored: bool,
    pub error: Option<Diagnostic>,
    pub warnings: Vec<Warning>,
}

/// Builds the primordial `State` every fresh session starts from (spec §6
/// `getInitialState()`).
pub fn initial_state() -> State {
    builtins::initial_state()
}

/// Lexes, parses, simplifies, elaborates, and evaluates one chunk of source
/// against `state`, per the pipeline of spec §2.
///
/// The whole chunk runs against a scratch child frame pushed off `state`
/// (fixity table included, via [`State::push_child`]); that frame is only
/// merged back into `state` via [`State::commit_into`] once lexing,
/// parsing, simplification, elaboration, and evaluation have all
/// succeeded. A chunk that fails at any phase is simply discarded along
/// with its scratch frame, so `state` itself never observes a partial
/// binding, datatype, exception, or fixity change from a failed chunk
/// (spec §5 "Ordering guarantees", §7 "state returned on error equals the
/// state before the chunk").
pub fn interpret(source: &str, state: &State, options: &InterpretOptions) -> InterpretResult {
    let lexer_options = LexerOptions {
        allow_unicode: options.allow_unicode,
    };
    let tokens = match Lexer::lex(source, lexer_options) {
        Ok(tokens) => tokens,
        Err(failure) => {
            return InterpretResult {
                state: state.clone(),
                evaluation_errored: false,
                error: Some(failure.into()),
                warnings: vec![],
            }
        }
    };

    let scratch = state.push_child();

    let (parsed, fixity_after) = parser::parse(tokens, scratch.fixity());
    let declarations = match parsed {
        Ok(declarations) => declarations,
        Err(failure) => {
            return InterpretResult {
                state: state.clone(),
                evaluation_errored: false,
                error: Some(failure.into()),
                warnings: vec![],
            }
        }
    };

    let mut core_decls = Vec::with_capacity(declarations.len());
    for decl in &declarations {
        match simplify::simplify_declaration(decl) {
            Ok(core) => core_decls.push(core),
            Err(failure) => {
                return InterpretResult {
                    state: state.clone(),
                    evaluation_errored: false,
                    error: Some(failure.into()),
                    warnings: vec![],
                }
            }
        }
    }

    scratch.set_fixity_table(fixity_after);

    let mut warnings = vec![];
    if !options.disable_elaboration {
        for core in &core_decls {
            if let Err(error) = elaborate::elaborate_declaration(&scratch, core, &mut warnings) {
                return InterpretResult {
                    state: state.clone(),
                    evaluation_errored: false,
                    error: Some(error.into()),
                    warnings: vec![],
                };
            }
        }
    }

    if options.disable_evaluation {
        scratch.commit_into(state);
        return InterpretResult {
            state: state.clone(),
            evaluation_errored: false,
            error: None,
            warnings,
        };
    }

    let mut evaluation_errored = false;
    for core in &core_decls {
        match eval::evaluate_declaration(&scratch, core) {
            Ok((_, threw)) => {
                if threw {
                    evaluation_errored = true;
                    break;
                }
            }
            Err(error) => {
                return InterpretResult {
                    state: state.clone(),
                    evaluation_errored: false,
                    error: Some(error.into()),
                    warnings: vec![],
                }
            }
        }
    }

    // An unhandled exception reaching the top level is reported to the
    // caller without updating state (spec §4.5): none of this chunk's
    // bindings, not even those from declarations before the one that
    // raised, are merged back.
    if !evaluation_errored {
        scratch.commit_into(state);
    }
    InterpretResult {
        state: state.clone(),
        evaluation_errored,
        error: None,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic_binds_it() {
        let state = initial_state();
        let result = interpret("val x = 4*7+3;", &state, &InterpretOptions::default());
        assert!(result.error.is_none());
        assert_eq!(state.lookup_value("x"), Some(Value::Integer(31)));
    }

    #[test]
    fn test_recursive_factorial_and_overflow() {
        let state = initial_state();
        let program = "val rec fac = fn n => if n<1 then 1 else n*fac(n-1); fac 10;";
        let result = interpret(program, &state, &InterpretOptions::default());
        assert!(result.error.is_none());
        assert_eq!(state.lookup_value("it"), Some(Value::Integer(3628800)));

        let overflow = interpret("fac 14;", &state, &InterpretOptions::default());
        assert!(overflow.error.is_none());
        assert!(overflow.evaluation_errored);
    }

    #[test]
    fn test_failed_chunk_leaves_state_untouched() {
        let state = initial_state();
        interpret("val x = 1;", &state, &InterpretOptions::default());
        let before = state.lookup_value("x");
        let result = interpret("val x = ", &state, &InterpretOptions::default());
        assert!(result.error.is_some());
        assert_eq!(state.lookup_value("x"), before);
    }

    #[test]
    fn test_colliding_fixity_associativity_is_a_parser_error() {
        let state = initial_state();
        let result = interpret(
            "infix 5 ++; infixr 5 **; 1 ++ 2 ** 3;",
            &state,
            &InterpretOptions::default(),
        );
        assert!(matches!(result.error, Some(Diagnostic::Parser(_))));
    }

    #[test]
    fn test_rebinding_true_is_an_evaluation_error() {
        let state = initial_state();
        let result = interpret("fun true x = x;", &state, &InterpretOptions::default());
        assert!(matches!(result.error, Some(Diagnostic::Evaluation(_))));
    }

    #[test]
    fn test_earlier_declaration_in_a_failing_chunk_is_not_committed() {
        let state = initial_state();
        let result = interpret(
            "val x = 1; fun true y = y;",
            &state,
            &InterpretOptions::default(),
        );
        assert!(matches!(result.error, Some(Diagnostic::Evaluation(_))));
        assert_eq!(state.lookup_value("x"), None);
    }

    #[test]
    fn test_fixity_change_in_a_failing_chunk_is_not_committed() {
        let state = initial_state();
        let result = interpret(
            "infix 5 ++; fun ++ x = x;",
            &state,
            &InterpretOptions::default(),
        );
        assert!(result.error.is_some());
        let reparsed = interpret("1 ++ 2;", &state, &InterpretOptions::default());
        assert!(matches!(reparsed.error, Some(Diagnostic::Parser(_))));
    }
}
