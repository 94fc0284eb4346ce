//! Surface AST → core calculus lowering (spec §4.3). Pure: takes no
//! `State` and cannot fail because of anything but a grammar-shaped defect
//! (clause arity mismatch) or an explicitly refused feature.

use crate::ast::{Constant, Declaration, ExceptionBinding, FunctionDef, PatExpr, ValBinding};
use crate::core_ast::{CoreDecl, CoreExpr, CoreMatch, CorePat};
use crate::diagnostics::{ParserError, SimplifyFailure};
use crate::token::Position;

type Result<T> = std::result::Result<T, SimplifyFailure>;

fn parser_error(message: impl Into<String>, position: Position) -> SimplifyFailure {
    SimplifyFailure::Parser(ParserError {
        message: message.into(),
        position,
    })
}

pub fn simplify_declaration(decl: &Declaration) -> Result<CoreDecl> {
    let position = decl.position();
    let lowered = match decl {
        Declaration::Val {
            recursive: false,
            bindings,
            ..
        } => {
            let mut decls = vec![];
            for binding in bindings {
                decls.push(CoreDecl::Val {
                    pattern: lower_pat(&binding.pattern)?,
                    value: lower_expr(&binding.value)?,
                    position: binding.value.position(),
                });
            }
            if decls.len() == 1 {
                decls.into_iter().next().unwrap()
            } else {
                CoreDecl::Sequence {
                    declarations: decls,
                    position,
                }
            }
        }
        Declaration::Val {
            recursive: true,
            bindings,
            ..
        } => CoreDecl::ValRec {
            bindings: lower_rec_bindings(bindings)?,
            position,
        },
        Declaration::Fun { functions, .. } => CoreDecl::ValRec {
            bindings: functions
                .iter()
                .map(lower_function_def)
                .collect::<Result<Vec<_>>>()?,
            position,
        },
        Declaration::Type {
            name,
            parameters,
            definition,
            ..
        } => CoreDecl::Type {
            name: name.clone(),
            parameters: parameters.clone(),
            definition: definition.clone(),
            position,
        },
        Declaration::Datatype { datatypes, .. } => CoreDecl::Datatype {
            datatypes: datatypes.clone(),
            position,
        },
        Declaration::Abstype {
            datatypes, body, ..
        } => CoreDecl::Abstype {
            datatypes: datatypes.clone(),
            body: lower_decl_list(body)?,
            position,
        },
        Declaration::Exception { bindings, .. } => CoreDecl::Exception {
            bindings: bindings.clone(),
            position,
        },
        Declaration::Open { structures, .. } => CoreDecl::Open {
            structures: structures.clone(),
            position,
        },
        Declaration::Local { local, body, .. } => CoreDecl::Local {
            local: lower_decl_list(local)?,
            body: lower_decl_list(body)?,
            position,
        },
        // Fixity declarations take effect on the parser's live table as
        // they are parsed; there is nothing left for the core calculus to
        // represent once parsing has finished.
        Declaration::Infix { .. } | Declaration::Infixr { .. } | Declaration::Nonfix { .. } => {
            CoreDecl::Empty
        }
        Declaration::Sequence { declarations, .. } => CoreDecl::Sequence {
            declarations: lower_decl_list(declarations)?,
            position,
        },
        Declaration::Expression { expr, .. } => CoreDecl::Expression {
            expr: lower_expr(expr)?,
            position,
        },
        Declaration::Empty => CoreDecl::Empty,
    };
    Ok(lowered)
}

fn lower_decl_list(decls: &[Declaration]) -> Result<Vec<CoreDecl>> {
    decls.iter().map(simplify_declaration).collect()
}

fn lower_rec_bindings(bindings: &[ValBinding]) -> Result<Vec<(String, CoreExpr)>> {
    bindings
        .iter()
        .map(|binding| {
            let name = match &binding.pattern {
                PatExpr::Identifier { name, .. } => name.clone(),
                other => {
                    return Err(parser_error(
                        "val rec requires a variable on the left of '='",
                        other.position(),
                    ))
                }
            };
            let value = lower_expr(&binding.value)?;
            if !matches!(value, CoreExpr::Fn { .. }) {
                return Err(parser_error(
                    "val rec requires a lambda on the right of '='",
                    binding.value.position(),
                ));
            }
            Ok((name, value))
        })
        .collect()
}

/// `fun f x1 ... xn = e | ...` → `fn __arg1 => ... => case (...) of ...`.
fn lower_function_def(def: &FunctionDef) -> Result<(String, CoreExpr)> {
    let arity = def.clauses[0].arguments.len();
    for clause in &def.clauses {
        if clause.arguments.len() != arity {
            return Err(parser_error(
                format!(
                    "clause of '{}' has {} argument(s), expected {}",
                    def.name,
                    clause.arguments.len(),
                    arity
                ),
                def.position,
            ));
        }
    }

    let arg_names: Vec<String> = (0..arity)
        .map(|i| format!("__arg{}_{}", i, def.position))
        .collect();

    let mut arms: CoreMatch = vec![];
    for clause in &def.clauses {
        let pattern = if arity == 1 {
            lower_pat(&clause.arguments[0])?
        } else {
            let fields = clause
                .arguments
                .iter()
                .enumerate()
                .map(|(i, p)| Ok(((i + 1).to_string(), lower_pat(p)?)))
                .collect::<Result<Vec<_>>>()?;
            CorePat::Record {
                fields,
                complete: true,
                position: def.position,
            }
        };
        let mut body = lower_expr(&clause.body)?;
        if let Some(ty) = &clause.result_type {
            body = CoreExpr::Typed {
                inner: Box::new(body),
                ty: ty.clone(),
                position: ty.position(),
            };
        }
        arms.push((pattern, body));
    }

    let scrutinee = if arity == 1 {
        CoreExpr::Identifier {
            qualifiers: vec![],
            name: arg_names[0].clone(),
            position: def.position,
        }
    } else {
        CoreExpr::Record {
            fields: arg_names
                .iter()
                .enumerate()
                .map(|(i, n)| {
                    (
                        (i + 1).to_string(),
                        CoreExpr::Identifier {
                            qualifiers: vec![],
                            name: n.clone(),
                            position: def.position,
                        },
                    )
                })
                .collect(),
            position: def.position,
        }
    };

    let mut body = CoreExpr::Case {
        scrutinee: Box::new(scrutinee),
        arms,
        position: def.position,
    };
    for name in arg_names.into_iter().rev() {
        body = CoreExpr::Fn {
            parameter: name,
            parameter_position: def.position,
            body: Box::new(body),
            position: def.position,
        };
    }
    Ok((def.name.clone(), body))
}

fn lower_expr(expr: &PatExpr) -> Result<CoreExpr> {
    let position = expr.position();
    let lowered = match expr {
        PatExpr::Wildcard { .. } => {
            return Err(parser_error(
                "'_' is only valid in a pattern, not an expression",
                position,
            ))
        }
        PatExpr::Constant { value, .. } => CoreExpr::Constant(value.clone(), position),
        PatExpr::Identifier {
            qualifiers,
            name,
            ..
        } => CoreExpr::Identifier {
            qualifiers: qualifiers.clone(),
            name: name.clone(),
            position,
        },
        PatExpr::Tuple { elements, .. } => lower_tuple_expr(elements, position)?,
        PatExpr::List { elements, .. } => lower_list_expr(elements, position)?,
        PatExpr::Record { fields, .. } => CoreExpr::Record {
            fields: fields
                .iter()
                .map(|(label, value)| Ok((label.clone(), lower_expr(value)?)))
                .collect::<Result<Vec<_>>>()?,
            position,
        },
        PatExpr::Application {
            function, argument, ..
        } => CoreExpr::Application {
            function: Box::new(lower_expr(function)?),
            argument: Box::new(lower_expr(argument)?),
            position,
        },
        PatExpr::Typed { inner, ty, .. } => CoreExpr::Typed {
            inner: Box::new(lower_expr(inner)?),
            ty: ty.clone(),
            position,
        },
        PatExpr::Layered { .. } => {
            return Err(parser_error(
                "'as' patterns are only valid in a pattern, not an expression",
                position,
            ))
        }
        PatExpr::Fn { arms, .. } => {
            let parameter = format!("__arg_fn_{position}");
            CoreExpr::Fn {
                body: Box::new(CoreExpr::Case {
                    scrutinee: Box::new(CoreExpr::Identifier {
                        qualifiers: vec![],
                        name: parameter.clone(),
                        position,
                    }),
                    arms: lower_match(arms)?,
                    position,
                }),
                parameter,
                parameter_position: position,
                position,
            }
        }
        PatExpr::Case {
            scrutinee, arms, ..
        } => CoreExpr::Case {
            scrutinee: Box::new(lower_expr(scrutinee)?),
            arms: lower_match(arms)?,
            position,
        },
        PatExpr::Let {
            declarations, body, ..
        } => CoreExpr::Let {
            declarations: lower_decl_list(declarations)?,
            body: Box::new(lower_expr(body)?),
            position,
        },
        PatExpr::Handle { expr, arms, .. } => CoreExpr::Handle {
            expr: Box::new(lower_expr(expr)?),
            arms: lower_match(arms)?,
            position,
        },
        PatExpr::Raise { expr, .. } => CoreExpr::Raise {
            exception: Box::new(lower_expr(expr)?),
            position,
        },
        PatExpr::If {
            condition,
            then_branch,
            else_branch,
            ..
        } => CoreExpr::Case {
            scrutinee: Box::new(lower_expr(condition)?),
            arms: vec![
                (bool_pat(true, position), lower_expr(then_branch)?),
                (bool_pat(false, position), lower_expr(else_branch)?),
            ],
            position,
        },
        PatExpr::While {
            condition, body, ..
        } => return lower_while(condition, body, position),
        PatExpr::AndAlso { left, right, .. } => CoreExpr::Case {
            scrutinee: Box::new(lower_expr(left)?),
            arms: vec![
                (bool_pat(true, position), lower_expr(right)?),
                (bool_pat(false, position), bool_expr(false, position)),
            ],
            position,
        },
        PatExpr::OrElse { left, right, .. } => CoreExpr::Case {
            scrutinee: Box::new(lower_expr(left)?),
            arms: vec![
                (bool_pat(true, position), bool_expr(true, position)),
                (bool_pat(false, position), lower_expr(right)?),
            ],
            position,
        },
        PatExpr::Sequence { elements, .. } => return lower_sequence(elements, position),
    };
    Ok(lowered)
}

fn lower_sequence(elements: &[PatExpr], position: Position) -> Result<CoreExpr> {
    let mut iter = elements.iter().rev();
    let last = iter
        .next()
        .ok_or_else(|| parser_error("empty sequence expression", position))?;
    let mut acc = lower_expr(last)?;
    for element in iter {
        let lowered = lower_expr(element)?;
        let inner_position = element.position();
        acc = CoreExpr::Case {
            scrutinee: Box::new(lowered),
            arms: vec![(CorePat::Wildcard(inner_position), acc)],
            position: inner_position,
        };
    }
    Ok(acc)
}

fn lower_while(condition: &PatExpr, body: &PatExpr, position: Position) -> Result<CoreExpr> {
    let loop_name = format!("__loop_{position}");
    let loop_ref = || CoreExpr::Identifier {
        qualifiers: vec![],
        name: loop_name.clone(),
        position,
    };
    let call_loop = CoreExpr::Application {
        function: Box::new(loop_ref()),
        argument: Box::new(CoreExpr::Record {
            fields: vec![],
            position,
        }),
        position,
    };
    let body_then_recurse = CoreExpr::Case {
        scrutinee: Box::new(lower_expr(body)?),
        arms: vec![(CorePat::Wildcard(position), call_loop.clone())],
        position,
    };
    let loop_body = CoreExpr::Case {
        scrutinee: Box::new(lower_expr(condition)?),
        arms: vec![
            (bool_pat(true, position), body_then_recurse),
            (
                bool_pat(false, position),
                CoreExpr::Record {
                    fields: vec![],
                    position,
                },
            ),
        ],
        position,
    };
    let loop_fn = CoreExpr::Fn {
        parameter: format!("__unit_{position}"),
        parameter_position: position,
        body: Box::new(loop_body),
        position,
    };
    Ok(CoreExpr::Let {
        declarations: vec![CoreDecl::ValRec {
            bindings: vec![(loop_name, loop_fn)],
            position,
        }],
        body: Box::new(call_loop),
        position,
    })
}

fn lower_tuple_expr(elements: &[PatExpr], position: Position) -> Result<CoreExpr> {
    Ok(CoreExpr::Record {
        fields: elements
            .iter()
            .enumerate()
            .map(|(i, e)| Ok(((i + 1).to_string(), lower_expr(e)?)))
            .collect::<Result<Vec<_>>>()?,
        position,
    })
}

fn lower_list_expr(elements: &[PatExpr], position: Position) -> Result<CoreExpr> {
    let mut acc = CoreExpr::Identifier {
        qualifiers: vec![],
        name: "nil".to_string(),
        position,
    };
    for element in elements.iter().rev() {
        let head = lower_expr(element)?;
        let pair = CoreExpr::Record {
            fields: vec![("1".to_string(), head), ("2".to_string(), acc)],
            position,
        };
        acc = CoreExpr::Application {
            function: Box::new(CoreExpr::Identifier {
                qualifiers: vec![],
                name: "::".to_string(),
                position,
            }),
            argument: Box::new(pair),
            position,
        };
    }
    Ok(acc)
}

fn lower_match(arms: &[crate::ast::MatchArm]) -> Result<CoreMatch> {
    arms.iter()
        .map(|arm| Ok((lower_pat(&arm.pattern)?, lower_expr(&arm.body)?)))
        .collect()
}

fn lower_pat(pat: &PatExpr) -> Result<CorePat> {
    let position = pat.position();
    let lowered = match pat {
        PatExpr::Wildcard { .. } => CorePat::Wildcard(position),
        PatExpr::Constant { value, .. } => CorePat::Constant(value.clone(), position),
        PatExpr::Identifier {
            qualifiers,
            name,
            ..
        } => CorePat::Identifier {
            qualifiers: qualifiers.clone(),
            name: name.clone(),
            position,
        },
        PatExpr::Tuple { elements, .. } => CorePat::Record {
            fields: elements
                .iter()
                .enumerate()
                .map(|(i, p)| Ok(((i + 1).to_string(), lower_pat(p)?)))
                .collect::<Result<Vec<_>>>()?,
            complete: true,
            position,
        },
        PatExpr::List { elements, .. } => lower_list_pat(elements, position)?,
        PatExpr::Record {
            fields, complete, ..
        } => CorePat::Record {
            fields: fields
                .iter()
                .map(|(label, p)| Ok((label.clone(), lower_pat(p)?)))
                .collect::<Result<Vec<_>>>()?,
            complete: *complete,
            position,
        },
        PatExpr::Application {
            function, argument, ..
        } => {
            let (qualifiers, name) = match function.as_ref() {
                PatExpr::Identifier {
                    qualifiers, name, ..
                } => (qualifiers.clone(), name.clone()),
                other => {
                    return Err(parser_error(
                        "only a constructor name may be applied in a pattern",
                        other.position(),
                    ))
                }
            };
            CorePat::Applied {
                qualifiers,
                name,
                argument: Box::new(lower_pat(argument)?),
                position,
            }
        }
        PatExpr::Typed { inner, ty, .. } => CorePat::Typed {
            inner: Box::new(lower_pat(inner)?),
            ty: ty.clone(),
            position,
        },
        PatExpr::Layered {
            name, ty, pattern, ..
        } => CorePat::Layered {
            name: name.clone(),
            ty: ty.clone(),
            pattern: Box::new(lower_pat(pattern)?),
            position,
        },
        other => {
            return Err(parser_error(
                "this expression form cannot be used as a pattern",
                other.position(),
            ))
        }
    };
    Ok(lowered)
}

fn lower_list_pat(elements: &[PatExpr], position: Position) -> Result<CorePat> {
    let mut acc = CorePat::Identifier {
        qualifiers: vec![],
        name: "nil".to_string(),
        position,
    };
    for element in elements.iter().rev() {
        let head = lower_pat(element)?;
        let pair = CorePat::Record {
            fields: vec![("1".to_string(), head), ("2".to_string(), acc)],
            complete: true,
            position,
        };
        acc = CorePat::Applied {
            qualifiers: vec![],
            name: "::".to_string(),
            argument: Box::new(pair),
            position,
        };
    }
    Ok(acc)
}

fn bool_pat(value: bool, position: Position) -> CorePat {
    CorePat::Identifier {
        qualifiers: vec![],
        name: value.to_string(),
        position,
    }
}

fn bool_expr(value: bool, position: Position) -> CoreExpr {
    CoreExpr::Identifier {
        qualifiers: vec![],
        name: value.to_string(),
        position,
    }
}

/// `withtype` is parsed (so the host gets an accurate position) but
/// always rejected here, per spec §4.3 / §9 Open Question (ii).
pub fn reject_withtype(position: Position) -> SimplifyFailure {
    SimplifyFailure::FeatureDisabled(crate::diagnostics::FeatureDisabledError {
        feature: "withtype".to_string(),
        message: "withtype clauses are not implemented".to_string(),
        position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Constant as C, Declaration, MatchArm, PatExpr as P, ValBinding};

    fn id(name: &str) -> P {
        P::unqualified_identifier(name, 0)
    }

    #[test]
    fn test_if_lowers_to_case_on_bool() {
        let expr = P::If {
            condition: Box::new(id("b")),
            then_branch: Box::new(P::Constant {
                value: C::Int(1),
                position: 0,
            }),
            else_branch: Box::new(P::Constant {
                value: C::Int(2),
                position: 0,
            }),
            position: 0,
        };
        let core = lower_expr(&expr).unwrap();
        match core {
            CoreExpr::Case { arms, .. } => assert_eq!(arms.len(), 2),
            other => panic!("expected Case, got {other:?}"),
        }
    }

    #[test]
    fn test_tuple_lowers_to_labeled_record() {
        let expr = P::Tuple {
            elements: vec![id("a"), id("b")],
            position: 0,
        };
        match lower_expr(&expr).unwrap() {
            CoreExpr::Record { fields, .. } => {
                assert_eq!(fields[0].0, "1");
                assert_eq!(fields[1].0, "2");
            }
            other => panic!("expected Record, got {other:?}"),
        }
    }

    #[test]
    fn test_list_lowers_to_cons_chain() {
        let expr = P::List {
            elements: vec![
                P::Constant {
                    value: C::Int(1),
                    position: 0,
                },
                P::Constant {
                    value: C::Int(2),
                    position: 0,
                },
            ],
            position: 0,
        };
        match lower_expr(&expr).unwrap() {
            CoreExpr::Application { function, .. } => match *function {
                CoreExpr::Identifier { name, .. } => assert_eq!(name, "::"),
                other => panic!("expected '::' identifier, got {other:?}"),
            },
            other => panic!("expected Application, got {other:?}"),
        }
    }

    #[test]
    fn test_val_rec_requires_lambda() {
        let decl = Declaration::Val {
            recursive: true,
            bindings: vec![ValBinding {
                pattern: id("x"),
                value: P::Constant {
                    value: C::Int(1),
                    position: 0,
                },
            }],
            position: 0,
        };
        assert!(simplify_declaration(&decl).is_err());
    }

    #[test]
    fn test_case_match_preserved() {
        let expr = P::Case {
            scrutinee: Box::new(id("x")),
            arms: vec![MatchArm {
                pattern: P::Wildcard { position: 0 },
                body: id("y"),
            }],
            position: 0,
        };
        assert!(lower_expr(&expr).is_ok());
    }
}
