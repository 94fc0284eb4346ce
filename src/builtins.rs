//! The primordial `State` (spec §6 `getInitialState()`): built-in types,
//! exceptions, value constructors and functions, grounded on the
//! teacher's `typechecker/mod.rs` prelude-seeding and generalized to the
//! full built-in surface spec §3/§6 name.

use std::rc::Rc;

use crate::eval::{apply, builtin_exception_id, checked_add, checked_div, checked_mod, checked_mul, checked_sub};
use crate::state::{RebindStatus, State, TypeInfo};
use crate::token::SYNTHETIC;
use crate::types::{Type, TypeScheme, TypeVarFactory};
use crate::value::Value;

fn field(value: &Value, label: &str) -> Value {
    match value {
        Value::Record(fields) => fields
            .get(label)
            .cloned()
            .unwrap_or_else(|| panic!("built-in applied to malformed tuple: missing '{label}'")),
        other => panic!("built-in applied to non-tuple argument: {other}"),
    }
}

/// Walks a built-in `nil`/`::` value into a `Vec`, used by `@`.
fn list_to_vec(value: &Value) -> Vec<Value> {
    let mut items = vec![];
    let mut current = value.clone();
    loop {
        match current {
            Value::ConstructedValue { ref name, payload: None, .. } if name == "nil" => break,
            Value::ConstructedValue { ref name, payload: Some(ref pair), .. } if name == "::" => {
                let head = field(pair, "1");
                let tail = field(pair, "2");
                items.push(head);
                current = tail;
            }
            other => panic!("expected list, got {other}"),
        }
    }
    items
}

fn vec_to_list(items: Vec<Value>, tail: Value) -> Value {
    let mut acc = tail;
    for item in items.into_iter().rev() {
        acc = Value::ConstructedValue {
            name: "::".to_string(),
            payload: Some(Box::new(Value::tuple(vec![item, acc]))),
            id: 101,
        };
    }
    acc
}

/// Applies a first-class function from within a built-in (`o`'s
/// composition). A genuine "not applicable" failure can only happen if
/// elaboration was disabled on a malformed program, so this panics like
/// every other shape-mismatch in this file rather than widening
/// `HostCallback`'s signature for a case that type-checking rules out.
fn apply_or_panic(state: &State, function: Value, argument: Value) -> (Value, bool) {
    apply(state, function, argument, SYNTHETIC).unwrap_or_else(|e| panic!("{e}"))
}

fn int_pair(value: &Value) -> (i64, i64) {
    let a = match field(value, "1") {
        Value::Integer(n) => n,
        other => panic!("expected int, got {other}"),
    };
    let b = match field(value, "2") {
        Value::Integer(n) => n,
        other => panic!("expected int, got {other}"),
    };
    (a, b)
}

fn bind_function(
    state: &State,
    name: &str,
    ty: Type,
    callback: impl Fn(Value) -> (Value, bool) + 'static,
) {
    state.bind_value_type(name, TypeScheme::monomorphic(ty));
    state
        .bind_value_unchecked(
            name,
            Value::PredefinedFunction {
                name: name.to_string(),
                callback: Rc::new(callback),
            },
        );
}

fn bind_constructor(state: &State, name: &str, value: Value, ty: TypeScheme, protect: bool) {
    state.bind_value_type(name, ty);
    state.bind_value_unchecked(name, value);
    state.mark_constructor(name);
    if protect {
        state.set_rebind_status(name, RebindStatus::Never);
    }
}

fn int_arith(state: &State, name: &str, op: fn(i64, i64, crate::token::Position) -> (Value, bool)) {
    bind_function(
        state,
        name,
        Type::Function(
            Box::new(Type::tuple(vec![Type::con0("int"), Type::con0("int")])),
            Box::new(Type::con0("int")),
        ),
        move |arg| {
            let (a, b) = int_pair(&arg);
            op(a, b, SYNTHETIC)
        },
    );
}

fn order_compare<T: PartialOrd>(a: T, b: T, op: fn(std::cmp::Ordering) -> bool) -> Value {
    Value::Bool(op(a.partial_cmp(&b).expect("unordered comparison")))
}

/// Builds the primordial environment every `interpret` call starts from
/// when the embedder does not thread an existing `State` through (spec §6).
pub fn initial_state() -> State {
    let state = State::root(Rc::new(TypeVarFactory::new()));

    for (name, arity) in [("int", 0), ("real", 0), ("char", 0), ("string", 0), ("word", 0), ("exn", 0)] {
        state.bind_type_info(name, TypeInfo { arity, constructors: vec![] });
    }
    state.bind_type_info("bool", TypeInfo { arity: 0, constructors: vec!["true".to_string(), "false".to_string()] });
    state.bind_type_info("order", TypeInfo { arity: 0, constructors: vec!["LESS".to_string(), "EQUAL".to_string(), "GREATER".to_string()] });
    state.bind_type_info("list", TypeInfo { arity: 1, constructors: vec!["nil".to_string(), "::".to_string()] });
    state.bind_type_info("option", TypeInfo { arity: 1, constructors: vec!["NONE".to_string(), "SOME".to_string()] });
    state.bind_type_info("ref", TypeInfo { arity: 1, constructors: vec!["ref".to_string()] });

    bind_builtin_exceptions(&state);
    bind_builtin_constructors(&state);
    bind_arithmetic(&state);
    bind_comparisons(&state);
    bind_misc(&state);
    bind_list_and_compose(&state);

    state
}

fn bind_builtin_exceptions(state: &State) {
    for name in ["Bind", "Match", "Div", "Overflow", "Chr", "Size", "Subscript", "Empty", "Domain"] {
        state.bind_exception_type(name, None);
        bind_constructor(
            state,
            name,
            Value::ExceptionValue { name: name.to_string(), payload: None, id: builtin_exception_id(name) },
            TypeScheme::monomorphic(Type::con0("exn")),
            false,
        );
    }
}

fn bind_builtin_constructors(state: &State) {
    bind_constructor(
        state,
        "true",
        Value::Bool(true),
        TypeScheme::monomorphic(Type::con0("bool")),
        true,
    );
    bind_constructor(
        state,
        "false",
        Value::Bool(false),
        TypeScheme::monomorphic(Type::con0("bool")),
        true,
    );

    let list_elem = state.type_vars().fresh(false);
    let list_id = match &list_elem {
        Type::Variable(v) => v.id(),
        _ => unreachable!(),
    };
    let list_ty = Type::Constructor { name: "list".to_string(), args: vec![list_elem.clone()] };
    bind_constructor(
        state,
        "nil",
        Value::ConstructedValue { name: "nil".to_string(), payload: None, id: 100 },
        TypeScheme { quantified: vec![list_id], body: list_ty.clone() },
        true,
    );
    let cons_ty = Type::Function(
        Box::new(Type::tuple(vec![list_elem.clone(), list_ty.clone()])),
        Box::new(list_ty.clone()),
    );
    bind_constructor(
        state,
        "::",
        Value::ValueConstructor { name: "::".to_string(), arity: 2, id: 101 },
        TypeScheme { quantified: vec![list_id], body: cons_ty },
        true,
    );

    let opt_elem = state.type_vars().fresh(false);
    let opt_id = match &opt_elem {
        Type::Variable(v) => v.id(),
        _ => unreachable!(),
    };
    let opt_ty = Type::Constructor { name: "option".to_string(), args: vec![opt_elem.clone()] };
    bind_constructor(
        state,
        "NONE",
        Value::ConstructedValue { name: "NONE".to_string(), payload: None, id: 102 },
        TypeScheme { quantified: vec![opt_id], body: opt_ty.clone() },
        false,
    );
    bind_constructor(
        state,
        "SOME",
        Value::ValueConstructor { name: "SOME".to_string(), arity: 1, id: 103 },
        TypeScheme { quantified: vec![opt_id], body: Type::Function(Box::new(opt_elem), Box::new(opt_ty)) },
        false,
    );

    let order_ty = Type::con0("order");
    for (name, id) in [("LESS", 104u64), ("EQUAL", 105), ("GREATER", 106)] {
        bind_constructor(
            state,
            name,
            Value::ConstructedValue { name: name.to_string(), payload: None, id },
            TypeScheme::monomorphic(order_ty.clone()),
            false,
        );
    }

    let ref_elem = state.type_vars().fresh(false);
    let ref_id = match &ref_elem {
        Type::Variable(v) => v.id(),
        _ => unreachable!(),
    };
    let ref_ty = Type::Constructor { name: "ref".to_string(), args: vec![ref_elem.clone()] };
    bind_constructor(
        state,
        "ref",
        Value::ValueConstructor { name: "ref".to_string(), arity: 1, id: 107 },
        TypeScheme { quantified: vec![ref_id], body: Type::Function(Box::new(ref_elem), Box::new(ref_ty)) },
        true,
    );
}

fn bind_arithmetic(state: &State) {
    int_arith(state, "+", |a, b, p| checked_add(a, b, p));
    int_arith(state, "-", |a, b, p| checked_sub(a, b, p));
    int_arith(state, "*", |a, b, p| checked_mul(a, b, p));
    int_arith(state, "div", |a, b, p| checked_div(a, b, p));
    int_arith(state, "mod", |a, b, p| checked_mod(a, b, p));

    bind_function(
        state,
        "~",
        Type::Function(Box::new(Type::con0("int")), Box::new(Type::con0("int"))),
        |arg| match arg {
            Value::Integer(n) => checked_sub(0, n, SYNTHETIC),
            other => panic!("expected int, got {other}"),
        },
    );

    bind_function(
        state,
        "/",
        Type::Function(
            Box::new(Type::tuple(vec![Type::con0("real"), Type::con0("real")])),
            Box::new(Type::con0("real")),
        ),
        |arg| {
            let a = match field(&arg, "1") {
                Value::Real(r) => r,
                other => panic!("expected real, got {other}"),
            };
            let b = match field(&arg, "2") {
                Value::Real(r) => r,
                other => panic!("expected real, got {other}"),
            };
            (Value::Real(a / b), false)
        },
    );
}

fn bind_comparisons(state: &State) {
    let elem = state.type_vars().fresh(true);
    let elem_id = match &elem {
        Type::Variable(v) => v.id(),
        _ => unreachable!(),
    };
    let eq_ty = Type::Function(
        Box::new(Type::tuple(vec![elem.clone(), elem])),
        Box::new(Type::con0("bool")),
    );
    bind_function_scheme(
        state,
        "=",
        TypeScheme { quantified: vec![elem_id], body: eq_ty.clone() },
        |arg| {
            let a = field(&arg, "1");
            let b = field(&arg, "2");
            (Value::Bool(a.structural_eq(&b)), false)
        },
    );
    bind_function_scheme(
        state,
        "<>",
        TypeScheme { quantified: vec![elem_id], body: eq_ty },
        |arg| {
            let a = field(&arg, "1");
            let b = field(&arg, "2");
            (Value::Bool(!a.structural_eq(&b)), false)
        },
    );

    for (name, op): (&str, fn(std::cmp::Ordering) -> bool) in [
        ("<", (|o: std::cmp::Ordering| o.is_lt()) as fn(std::cmp::Ordering) -> bool),
        ("<=", |o| o.is_le()),
        (">", |o| o.is_gt()),
        (">=", |o| o.is_ge()),
    ] {
        bind_function(
            state,
            name,
            Type::Function(
                Box::new(Type::tuple(vec![Type::con0("int"), Type::con0("int")])),
                Box::new(Type::con0("bool")),
            ),
            move |arg| {
                let (a, b) = int_pair(&arg);
                (order_compare(a, b, op), false)
            },
        );
    }
}

fn bind_function_scheme(
    state: &State,
    name: &str,
    scheme: TypeScheme,
    callback: impl Fn(Value) -> (Value, bool) + 'static,
) {
    state.bind_value_type(name, scheme);
    state.bind_value_unchecked(
        name,
        Value::PredefinedFunction { name: name.to_string(), callback: Rc::new(callback) },
    );
}

fn bind_misc(state: &State) {
    bind_function(
        state,
        "^",
        Type::Function(
            Box::new(Type::tuple(vec![Type::con0("string"), Type::con0("string")])),
            Box::new(Type::con0("string")),
        ),
        |arg| {
            let a = match field(&arg, "1") {
                Value::String(s) => s,
                other => panic!("expected string, got {other}"),
            };
            let b = match field(&arg, "2") {
                Value::String(s) => s,
                other => panic!("expected string, got {other}"),
            };
            (Value::String(a + &b), false)
        },
    );

    bind_function(
        state,
        "chr",
        Type::Function(Box::new(Type::con0("int")), Box::new(Type::con0("char"))),
        |arg| match arg {
            Value::Integer(n) if (0..=255).contains(&n) => {
                (Value::Char(n as u8 as char), false)
            }
            Value::Integer(_) => (
                Value::ExceptionValue { name: "Chr".to_string(), payload: None, id: builtin_exception_id("Chr") },
                true,
            ),
            other => panic!("expected int, got {other}"),
        },
    );

    bind_function(
        state,
        "ord",
        Type::Function(Box::new(Type::con0("char")), Box::new(Type::con0("int"))),
        |arg| match arg {
            Value::Char(c) => (Value::Integer(c as i64), false),
            other => panic!("expected char, got {other}"),
        },
    );

    bind_function(
        state,
        "size",
        Type::Function(Box::new(Type::con0("string")), Box::new(Type::con0("int"))),
        |arg| match arg {
            Value::String(s) => (Value::Integer(s.chars().count() as i64), false),
            other => panic!("expected string, got {other}"),
        },
    );

    bind_function(
        state,
        "print",
        Type::Function(Box::new(Type::con0("string")), Box::new(Type::unit())),
        |arg| {
            if let Value::String(s) = &arg {
                log::info!(target: "sml_repl_core::print", "{s}");
            }
            (Value::unit(), false)
        },
    );
}

fn bind_list_and_compose(state: &State) {
    let elem = state.type_vars().fresh(false);
    let elem_id = match &elem {
        Type::Variable(v) => v.id(),
        _ => unreachable!(),
    };
    let list_ty = Type::Constructor { name: "list".to_string(), args: vec![elem.clone()] };
    let append_ty = Type::Function(
        Box::new(Type::tuple(vec![list_ty.clone(), list_ty.clone()])),
        Box::new(list_ty),
    );
    bind_function_scheme(
        state,
        "@",
        TypeScheme { quantified: vec![elem_id], body: append_ty },
        |arg| {
            let left = field(&arg, "1");
            let right = field(&arg, "2");
            (vec_to_list(list_to_vec(&left), right), false)
        },
    );

    let a = state.type_vars().fresh(false);
    let b = state.type_vars().fresh(false);
    let c = state.type_vars().fresh(false);
    let var_id = |t: &Type| match t {
        Type::Variable(v) => v.id(),
        _ => unreachable!(),
    };
    let ids = vec![var_id(&a), var_id(&b), var_id(&c)];
    let f_ty = Type::Function(Box::new(b.clone()), Box::new(c.clone()));
    let g_ty = Type::Function(Box::new(a.clone()), Box::new(b));
    let compose_ty = Type::Function(
        Box::new(Type::tuple(vec![f_ty, g_ty])),
        Box::new(Type::Function(Box::new(a), Box::new(c))),
    );
    let composing_state = state.clone();
    bind_function_scheme(
        state,
        "o",
        TypeScheme { quantified: ids, body: compose_ty },
        move |arg| {
            let f = field(&arg, "1");
            let g = field(&arg, "2");
            let state = composing_state.clone();
            let composed = move |x: Value| {
                let (gx, threw) = apply_or_panic(&state, g.clone(), x);
                if threw {
                    return (gx, true);
                }
                apply_or_panic(&state, f.clone(), gx)
            };
            (
                Value::PredefinedFunction { name: "o".to_string(), callback: Rc::new(composed) },
                false,
            )
        },
    );
}
