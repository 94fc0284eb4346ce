//! Tree-walking evaluator over the core calculus (spec §4.5). Grounded on
//! the teacher's `interpreter/mod.rs` `run_*` dispatch shape, generalized
//! from a flat scope stack to the shared `State` frames, full pattern
//! matching, and exception propagation.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::core_ast::{qualified_name, CoreDecl, CoreExpr, CoreMatch, CorePat};
use crate::diagnostics::EvaluationError;
use crate::limits::in_int_range;
use crate::state::State;
use crate::token::Position;
use crate::value::{FunctionValue, RecursiveBinding, Value};

type Result<T> = std::result::Result<T, EvaluationError>;

fn err(message: impl Into<String>, position: Position) -> EvaluationError {
    EvaluationError {
        message: message.into(),
        position,
    }
}

/// `(value, threw)`: the uniform result of evaluating an expression. When
/// `threw` is true, `value` is always an `ExceptionValue`.
pub type Outcome = (Value, bool);

fn ok(value: Value) -> Outcome {
    (value, false)
}

fn raised(value: Value) -> Outcome {
    (value, true)
}

fn raise_builtin(name: &str, _position: Position) -> Outcome {
    raised(Value::ExceptionValue {
        name: name.to_string(),
        payload: None,
        id: builtin_exception_id(name),
    })
}

/// Built-in exceptions get fixed ids so pattern matching against them
/// works regardless of which `State` frame constructed the value.
pub(crate) fn builtin_exception_id(name: &str) -> u64 {
    match name {
        "Bind" => 0,
        "Match" => 1,
        "Div" => 2,
        "Overflow" => 3,
        "Chr" => 4,
        "Size" => 5,
        "Subscript" => 6,
        "Empty" => 7,
        "Domain" => 8,
        _ => u64::MAX,
    }
}

pub fn evaluate_declaration(state: &State, decl: &CoreDecl) -> Result<Outcome> {
    match decl {
        CoreDecl::Val {
            pattern, value, ..
        } => {
            let (v, threw) = evaluate_expr(state, value)?;
            if threw {
                return Ok(raised(v));
            }
            match bind_pattern(state, pattern, &v) {
                Some(bindings) => {
                    install_bindings(state, bindings)?;
                    Ok(ok(v))
                }
                None => Ok(raise_builtin("Bind", pattern.position())),
            }
        }
        CoreDecl::ValRec { bindings, position } => {
            let group: Rc<Vec<RecursiveBinding>> = Rc::new(
                bindings
                    .iter()
                    .map(|(name, expr)| match expr {
                        CoreExpr::Fn {
                            parameter,
                            parameter_position,
                            body,
                            ..
                        } => Ok(RecursiveBinding {
                            name: name.clone(),
                            parameter: parameter.clone(),
                            parameter_position: *parameter_position,
                            body: Rc::new((**body).clone()),
                        }),
                        _ => Err(err("val rec binding is not a lambda", *position)),
                    })
                    .collect::<Result<Vec<_>>>()?,
            );
            for binding in group.iter() {
                let closure = Value::Function(FunctionValue {
                    name: binding.name.clone(),
                    captured: state.clone(),
                    group: group.clone(),
                });
                bind_value_checked(state, &binding.name, closure)?;
            }
            Ok(ok(Value::unit()))
        }
        CoreDecl::Type { .. } => Ok(ok(Value::unit())),
        CoreDecl::Datatype { datatypes, .. } => {
            for dt in datatypes {
                for (cname, arg) in &dt.constructors {
                    let id = state.next_id();
                    let value = match arg {
                        None => Value::ConstructedValue {
                            name: cname.clone(),
                            payload: None,
                            id,
                        },
                        Some(_) => Value::ValueConstructor {
                            name: cname.clone(),
                            arity: 1,
                            id,
                        },
                    };
                    bind_value_checked(state, cname, value)?;
                }
            }
            Ok(ok(Value::unit()))
        }
        CoreDecl::Abstype {
            datatypes, body, ..
        } => {
            evaluate_declaration(
                state,
                &CoreDecl::Datatype {
                    datatypes: datatypes.clone(),
                    position: decl.position(),
                },
            )?;
            evaluate_decl_list(state, body)
        }
        CoreDecl::Exception { bindings, .. } => {
            for binding in bindings {
                match binding {
                    crate::ast::ExceptionBinding::New { name, argument } => {
                        let id = state.next_id();
                        let value = match argument {
                            None => Value::ExceptionValue {
                                name: name.clone(),
                                payload: None,
                                id,
                            },
                            Some(_) => Value::ExceptionConstructor {
                                name: name.clone(),
                                arity: 1,
                                id,
                            },
                        };
                        bind_value_checked(state, name, value)?;
                    }
                    crate::ast::ExceptionBinding::Alias {
                        name,
                        source_qualifiers,
                        source_name,
                    } => {
                        let source = qualified_name(source_qualifiers, source_name);
                        let value = state.lookup_value(&source).ok_or_else(|| {
                            err(format!("unbound exception '{source}'"), decl.position())
                        })?;
                        bind_value_checked(state, name, value)?;
                    }
                }
            }
            Ok(ok(Value::unit()))
        }
        CoreDecl::Open { .. } => Ok(ok(Value::unit())),
        CoreDecl::Local { local, body, .. } => {
            let inner = state.push_child();
            for d in local {
                let (v, threw) = evaluate_declaration(&inner, d)?;
                if threw {
                    return Ok(raised(v));
                }
            }
            let body_inner = inner.push_child();
            evaluate_decl_list(&body_inner, body).map(|(v, threw)| {
                if threw {
                    (v, threw)
                } else {
                    copy_bindings_into(&body_inner, state);
                    (v, threw)
                }
            })
        }
        CoreDecl::Sequence { declarations, .. } => evaluate_decl_list(state, declarations),
        CoreDecl::Expression { expr, .. } => {
            let (v, threw) = evaluate_expr(state, expr)?;
            if !threw {
                bind_value_checked(state, "it", v.clone())?;
            }
            Ok((v, threw))
        }
        CoreDecl::Empty => Ok(ok(Value::unit())),
    }
}

fn evaluate_decl_list(state: &State, decls: &[CoreDecl]) -> Result<Outcome> {
    let mut last = ok(Value::unit());
    for d in decls {
        last = evaluate_declaration(state, d)?;
        if last.1 {
            return Ok(last);
        }
    }
    Ok(last)
}

/// `local D1 in D2 end` detaches the `D1` frame from the parent chain
/// (spec I3) but `D2`'s bindings still need to end up visible to whoever
/// asked for `state`'s bindings; we copy them by value into the frame the
/// caller actually holds since no further lookups should need the
/// detached intermediate frame once this declaration has finished.
fn copy_bindings_into(from: &State, into: &State) {
    for name in from.own_value_names() {
        if let Some(value) = from.lookup_value(&name) {
            into.bind_value_unchecked(&name, value);
        }
        if let Some(scheme) = from.lookup_value_type(&name) {
            into.bind_value_type(&name, scheme);
        }
    }
}

fn bind_value_checked(state: &State, name: &str, value: Value) -> Result<()> {
    state
        .bind_value(name, value)
        .map_err(|message| err(message, crate::token::SYNTHETIC))
}

fn install_bindings(state: &State, bindings: Vec<(String, Value)>) -> Result<()> {
    for (name, value) in bindings {
        bind_value_checked(state, &name, value)?;
    }
    Ok(())
}

fn evaluate_expr(state: &State, expr: &CoreExpr) -> Result<Outcome> {
    match expr {
        CoreExpr::Constant(c, _) => Ok(ok(constant_value(c))),
        CoreExpr::Identifier {
            qualifiers, name, ..
        } => {
            let full = qualified_name(qualifiers, name);
            state
                .lookup_value(&full)
                .map(ok)
                .ok_or_else(|| err(format!("unbound identifier '{full}'"), expr.position()))
        }
        CoreExpr::Fn {
            parameter,
            parameter_position,
            body,
            ..
        } => {
            let group = Rc::new(vec![RecursiveBinding {
                name: "__self__".to_string(),
                parameter: parameter.clone(),
                parameter_position: *parameter_position,
                body: Rc::new((**body).clone()),
            }]);
            Ok(ok(Value::Function(FunctionValue {
                name: "__self__".to_string(),
                captured: state.clone(),
                group,
            })))
        }
        CoreExpr::Application {
            function, argument, ..
        } => {
            let (f, threw) = evaluate_expr(state, function)?;
            if threw {
                return Ok(raised(f));
            }
            let (a, threw) = evaluate_expr(state, argument)?;
            if threw {
                return Ok(raised(a));
            }
            apply(state, f, a, expr.position())
        }
        CoreExpr::Record { fields, .. } => {
            let mut map = BTreeMap::new();
            for (label, e) in fields {
                let (v, threw) = evaluate_expr(state, e)?;
                if threw {
                    return Ok(raised(v));
                }
                map.insert(label.clone(), v);
            }
            Ok(ok(Value::Record(map)))
        }
        CoreExpr::Case {
            scrutinee, arms, ..
        } => {
            let (v, threw) = evaluate_expr(state, scrutinee)?;
            if threw {
                return Ok(raised(v));
            }
            run_match(state, arms, &v, "Match", expr.position())
        }
        CoreExpr::Raise { exception, .. } => {
            let (v, threw) = evaluate_expr(state, exception)?;
            if threw {
                return Ok(raised(v));
            }
            Ok(raised(v))
        }
        CoreExpr::Handle { expr: inner, arms, .. } => {
            let (v, threw) = evaluate_expr(state, inner)?;
            if !threw {
                return Ok(ok(v));
            }
            match try_match(state, arms, &v)? {
                Some(outcome) => Ok(outcome),
                None => Ok(raised(v)),
            }
        }
        CoreExpr::Typed { inner, .. } => evaluate_expr(state, inner),
        CoreExpr::Let {
            declarations, body, ..
        } => {
            let inner = state.push_child();
            for d in declarations {
                let (v, threw) = evaluate_declaration(&inner, d)?;
                if threw {
                    return Ok(raised(v));
                }
            }
            evaluate_expr(&inner, body)
        }
    }
}

fn run_match(
    state: &State,
    arms: &CoreMatch,
    scrutinee: &Value,
    unhandled_exception: &str,
    position: Position,
) -> Result<Outcome> {
    match try_match(state, arms, scrutinee)? {
        Some(outcome) => Ok(outcome),
        None => Ok(raise_builtin(unhandled_exception, position)),
    }
}

fn try_match(state: &State, arms: &CoreMatch, scrutinee: &Value) -> Result<Option<Outcome>> {
    for (pattern, body) in arms {
        if let Some(bindings) = bind_pattern(state, pattern, scrutinee) {
            let inner = state.push_child();
            install_bindings(&inner, bindings)?;
            return Ok(Some(evaluate_expr(&inner, body)?));
        }
    }
    Ok(None)
}

/// Attempts to match `value` against `pattern`, returning the bindings it
/// introduces, or `None` on a failed match (spec §4.5 "Pattern matching
/// semantics").
fn bind_pattern(state: &State, pattern: &CorePat, value: &Value) -> Option<Vec<(String, Value)>> {
    match pattern {
        CorePat::Wildcard(_) => Some(vec![]),
        CorePat::Constant(c, _) => {
            if constant_value(c).structural_eq(value) {
                Some(vec![])
            } else {
                None
            }
        }
        CorePat::Identifier {
            qualifiers, name, ..
        } => {
            let full = qualified_name(qualifiers, name);
            if state.is_constructor(&full) {
                match value {
                    Value::ConstructedValue { name: vn, .. } if vn == &full => Some(vec![]),
                    Value::ExceptionValue { name: vn, .. } if vn == &full => Some(vec![]),
                    Value::Bool(b) if full == "true" && *b => Some(vec![]),
                    Value::Bool(b) if full == "false" && !*b => Some(vec![]),
                    _ => None,
                }
            } else {
                Some(vec![(name.clone(), value.clone())])
            }
        }
        CorePat::Applied {
            qualifiers,
            name,
            argument,
            ..
        } => {
            let full = qualified_name(qualifiers, name);
            match value {
                Value::ConstructedValue {
                    name: vn,
                    payload: Some(payload),
                    ..
                } if vn == &full => bind_pattern(state, argument, payload),
                Value::ExceptionValue {
                    name: vn,
                    payload: Some(payload),
                    ..
                } if vn == &full => bind_pattern(state, argument, payload),
                _ => None,
            }
        }
        CorePat::Record {
            fields, complete, ..
        } => {
            let Value::Record(values) = value else {
                return None;
            };
            if *complete && values.len() != fields.len() {
                return None;
            }
            let mut bindings = vec![];
            for (label, sub_pattern) in fields {
                let sub_value = values.get(label)?;
                bindings.extend(bind_pattern(state, sub_pattern, sub_value)?);
            }
            Some(bindings)
        }
        CorePat::Typed { inner, .. } => bind_pattern(state, inner, value),
        CorePat::Layered { name, pattern, .. } => {
            let mut bindings = bind_pattern(state, pattern, value)?;
            bindings.push((name.clone(), value.clone()));
            Some(bindings)
        }
    }
}

pub(crate) fn apply(state: &State, function: Value, argument: Value, position: Position) -> Result<Outcome> {
    match function {
        Value::Function(closure) => apply_closure(closure, argument),
        Value::PredefinedFunction { callback, .. } => Ok(callback(argument)),
        Value::ValueConstructor { name, id, .. } => Ok(ok(Value::ConstructedValue {
            name,
            payload: Some(Box::new(argument)),
            id,
        })),
        Value::ExceptionConstructor { name, id, .. } => Ok(ok(Value::ExceptionValue {
            name,
            payload: Some(Box::new(argument)),
            id,
        })),
        other => {
            let _ = state;
            Err(err(format!("value '{other}' is not applicable"), position))
        }
    }
}

/// Applies a closure by re-adjoining its whole recursive group into a
/// fresh child frame (spec §9 "cyclic closure graphs", option (a)), then
/// evaluating the named member's body with the parameter bound.
fn apply_closure(closure: FunctionValue, argument: Value) -> Result<Outcome> {
    let frame = closure.captured.push_child();
    for member in closure.group.iter() {
        let sibling = Value::Function(FunctionValue {
            name: member.name.clone(),
            captured: closure.captured.clone(),
            group: closure.group.clone(),
        });
        frame.bind_value_unchecked(&member.name, sibling);
    }
    let binding = closure.own_binding().ok_or_else(|| {
        err(
            format!("closure '{}' is not a member of its own recursive group", closure.name),
            crate::token::SYNTHETIC,
        )
    })?;
    frame.bind_value_unchecked(&binding.parameter, argument);
    evaluate_expr(&frame, &binding.body)
}

fn constant_value(c: &crate::ast::Constant) -> Value {
    use crate::ast::Constant as C;
    match c {
        C::Int(n) => Value::Integer(*n),
        C::Word(n) => Value::Word(*n),
        C::Real(r) => Value::Real(*r),
        C::Char(c) => Value::Char(*c),
        C::String(s) => Value::String(s.clone()),
    }
}

/// Integer arithmetic with overflow/div-by-zero checks (spec §4.5
/// "Arithmetic").
pub fn checked_add(a: i64, b: i64, position: Position) -> Outcome {
    arith(a.checked_add(b), position)
}
pub fn checked_sub(a: i64, b: i64, position: Position) -> Outcome {
    arith(a.checked_sub(b), position)
}
pub fn checked_mul(a: i64, b: i64, position: Position) -> Outcome {
    arith(a.checked_mul(b), position)
}

fn arith(result: Option<i64>, position: Position) -> Outcome {
    match result {
        Some(n) if in_int_range(n) => ok(Value::Integer(n)),
        _ => raise_builtin("Overflow", position),
    }
}

pub fn checked_div(a: i64, b: i64, position: Position) -> Outcome {
    if b == 0 {
        return raise_builtin("Div", position);
    }
    let q = a.div_euclid(b);
    if !in_int_range(q) {
        return raise_builtin("Overflow", position);
    }
    ok(Value::Integer(q))
}

pub fn checked_mod(a: i64, b: i64, position: Position) -> Outcome {
    if b == 0 {
        return raise_builtin("Div", position);
    }
    ok(Value::Integer(a.rem_euclid(b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Constant;
    use crate::core_ast::{CoreExpr, CorePat};
    use crate::types::TypeVarFactory;
    use std::rc::Rc as StdRc;

    fn root() -> State {
        State::root(StdRc::new(TypeVarFactory::new()))
    }

    #[test]
    fn test_eval_constant() {
        let state = root();
        let (v, threw) = evaluate_expr(&state, &CoreExpr::Constant(Constant::Int(4), 0)).unwrap();
        assert!(!threw);
        assert_eq!(v, Value::Integer(4));
    }

    #[test]
    fn test_case_raises_match_on_no_arms() {
        let state = root();
        let expr = CoreExpr::Case {
            scrutinee: Box::new(CoreExpr::Constant(Constant::Int(1), 0)),
            arms: vec![(CorePat::Constant(Constant::Int(2), 0), CoreExpr::Constant(Constant::Int(0), 0))],
            position: 0,
        };
        let (v, threw) = evaluate_expr(&state, &expr).unwrap();
        assert!(threw);
        assert!(matches!(v, Value::ExceptionValue { name, .. } if name == "Match"));
    }

    #[test]
    fn test_recursive_closure_can_call_itself() {
        let state = root();
        // val rec loop = fn n => case n of 0 => 0 | _ => loop (n - 1)
        // simplified: just verify closure application mechanics directly.
        let body = CoreExpr::Identifier {
            qualifiers: vec![],
            name: "n".to_string(),
            position: 0,
        };
        let decl = CoreDecl::ValRec {
            bindings: vec![(
                "f".to_string(),
                CoreExpr::Fn {
                    parameter: "n".to_string(),
                    parameter_position: 0,
                    body: Box::new(body),
                    position: 0,
                },
            )],
            position: 0,
        };
        let (_, threw) = evaluate_declaration(&state, &decl).unwrap();
        assert!(!threw);
        let f = state.lookup_value("f").unwrap();
        let (result, threw) = apply(&state, f, Value::Integer(9), 0).unwrap();
        assert!(!threw);
        assert_eq!(result, Value::Integer(9));
    }

    #[test]
    fn test_div_by_zero_raises_div() {
        let (_, threw) = checked_div(1, 0, 0);
        assert!(threw);
    }

    #[test]
    fn test_overflow_detected() {
        let (_, threw) = checked_add(crate::limits::MAXINT, 1, 0);
        assert!(threw);
    }
}
