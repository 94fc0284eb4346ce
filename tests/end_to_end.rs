//! Exercises the interpreter through its public API the way a host would:
//! submit chunks, inspect the returned `State`/`InterpretResult`. Mirrors
//! the six concrete scenarios and the list round-trip laws.

use pretty_assertions::assert_eq;

use sml_repl_core::{initial_state, interpret, Diagnostic, InterpretOptions, Value};

fn run(state: &sml_repl_core::State, source: &str) -> sml_repl_core::InterpretResult {
    interpret(source, state, &InterpretOptions::default())
}

#[test]
fn scenario_1_arithmetic() {
    let state = initial_state();
    let result = run(&state, "val x = 4*7+3;");
    assert!(result.error.is_none());
    assert_eq!(state.lookup_value("x"), Some(Value::Integer(31)));
}

#[test]
fn scenario_2_recursive_factorial_then_overflow() {
    let state = initial_state();
    let result = run(
        &state,
        "val rec fac = fn n => if n<1 then 1 else n*fac(n-1); fac 10;",
    );
    assert!(result.error.is_none());
    assert_eq!(state.lookup_value("it"), Some(Value::Integer(3628800)));

    // An unhandled exception at top level is reported without updating
    // state, so "it" keeps the value from the previous successful chunk.
    let overflowed = run(&state, "fac 14;");
    assert!(overflowed.error.is_none());
    assert!(overflowed.evaluation_errored);
    assert_eq!(state.lookup_value("it"), Some(Value::Integer(3628800)));
}

#[test]
fn scenario_3_tuple_swap() {
    let state = initial_state();
    let result = run(&state, "fun swap (x,y) = (y,x); swap (3, true);");
    assert!(result.error.is_none());
    assert_eq!(
        state.lookup_value("it"),
        Some(Value::tuple(vec![Value::Bool(true), Value::Integer(3)]))
    );
}

#[test]
fn scenario_4_tree_size() {
    let state = initial_state();
    let program = "datatype 'a tree = Leaf | Node of 'a tree * 'a * 'a tree; \
         fun size Leaf = 0 | size (Node(l,_,r)) = 1 + size l + size r; \
         size (Node(Leaf, 1, Node(Leaf,2,Leaf)));";
    let result = run(&state, program);
    assert!(result.error.is_none());
    assert_eq!(state.lookup_value("it"), Some(Value::Integer(2)));
}

#[test]
fn scenario_5_exception_with_handle() {
    let state = initial_state();
    let result = run(
        &state,
        "exception Bad of int; (raise Bad 7) handle Bad n => n;",
    );
    assert!(result.error.is_none());
    assert!(!result.evaluation_errored);
    assert_eq!(state.lookup_value("it"), Some(Value::Integer(7)));
}

#[test]
fn scenario_6_fixity_associativity() {
    let state = initial_state();
    let result = run(&state, "infix 5 ++; fun a ++ b = a+b+1; 2 ++ 3 ++ 4;");
    assert!(result.error.is_none());
    assert_eq!(state.lookup_value("it"), Some(Value::Integer(11)));

    let redefined = run(&state, "infixr 5 ++; 2 ++ 3 ++ 4;");
    assert!(redefined.error.is_none());
    assert_eq!(state.lookup_value("it"), Some(Value::Integer(11)));

    let colliding = run(&state, "infix 5 ++; infixr 5 **; 1 ++ 2 ** 3;");
    assert!(matches!(colliding.error, Some(Diagnostic::Parser(_))));
}

#[test]
fn round_trip_rev_and_append_length() {
    let state = initial_state();
    let prelude = "fun rev nil = nil | rev (x::xs) = rev xs @ [x]; \
         fun len nil = 0 | len (x::xs) = 1 + len xs;";
    assert!(run(&state, prelude).error.is_none());

    let result = run(&state, "rev (rev [1,2,3]) = [1,2,3];");
    assert!(result.error.is_none());
    assert_eq!(state.lookup_value("it"), Some(Value::Bool(true)));

    let result = run(
        &state,
        "len ([1,2,3] @ [4,5]) = len [1,2,3] + len [4,5];",
    );
    assert!(result.error.is_none());
    assert_eq!(state.lookup_value("it"), Some(Value::Bool(true)));
}

#[test]
fn round_trip_foldl_equals_foldr_of_rev_for_associative_op() {
    let state = initial_state();
    let prelude = "fun rev nil = nil | rev (x::xs) = rev xs @ [x]; \
         fun foldl f z nil = z | foldl f z (x::xs) = foldl f (f(x,z)) xs; \
         fun foldr f z nil = z | foldr f z (x::xs) = f(x, foldr f z xs); \
         fun add (x,y) = x+y;";
    assert!(run(&state, prelude).error.is_none());

    let result = run(
        &state,
        "foldl add 0 [1,2,3,4,5] = foldr add 0 (rev [1,2,3,4,5]);",
    );
    assert!(result.error.is_none());
    assert_eq!(state.lookup_value("it"), Some(Value::Bool(true)));
}

#[test]
fn rebind_protection_rejects_builtin_constructors() {
    let state = initial_state();
    for source in [
        "fun true x = x;",
        "fun false x = x;",
        "fun nil x = x;",
        "fun ref x = x;",
        "exception true;",
        "datatype d = true;",
    ] {
        let result = run(&state, source);
        assert!(
            matches!(result.error, Some(Diagnostic::Evaluation(_))),
            "expected '{source}' to raise an EvaluationError, got {:?}",
            result.error
        );
    }
}

#[test]
fn failed_chunk_does_not_mutate_state() {
    let state = initial_state();
    assert!(run(&state, "val x = 1;").error.is_none());
    let before = state.lookup_value("x");

    let failed = run(&state, "val x = true andalso 1;");
    assert!(failed.error.is_some());
    assert_eq!(state.lookup_value("x"), before);
}

#[test]
fn non_exhaustive_match_raises_a_warning() {
    let state = initial_state();
    let result = run(
        &state,
        "datatype t = A | B | C; fun f A = 1 | f B = 2;",
    );
    assert!(result.error.is_none());
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].message.contains('C'));
}

#[test]
fn exhaustive_match_raises_no_warning() {
    let state = initial_state();
    let result = run(
        &state,
        "datatype t = A | B; fun f A = 1 | f B = 2;",
    );
    assert!(result.error.is_none());
    assert!(result.warnings.is_empty());
}

#[test]
fn function_composition_operator() {
    let state = initial_state();
    let prelude = "fun succ n = n + 1; fun double n = n * 2;";
    assert!(run(&state, prelude).error.is_none());

    let result = run(&state, "(succ o double) 5;");
    assert!(result.error.is_none());
    assert_eq!(state.lookup_value("it"), Some(Value::Integer(11)));
}
