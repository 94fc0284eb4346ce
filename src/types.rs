//! Static types, type schemes, and Robinson-style unification (spec §4.4).
//!
//! Grounded on the teacher's `typechecker/types.rs` "does this Type accept
//! this Type" idiom, generalized from a closed lattice of concrete types to
//! full unification over type variables (`TypeVariable` nodes hold an
//! `Rc<RefCell<Substitution>>` cell rather than being resolved up front).

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Display;
use std::rc::Rc;

use serde::Serialize;

use crate::diagnostics::{ElaborationError, ElaborationErrorKind};
use crate::token::Position;

#[derive(Debug, Clone, PartialEq)]
enum Substitution {
    Unbound { id: u64, equality: bool },
    Bound(Type),
}

#[derive(Debug, Clone)]
pub struct TypeVar(Rc<RefCell<Substitution>>);

impl TypeVar {
    pub fn id(&self) -> u64 {
        match &*self.0.borrow() {
            Substitution::Unbound { id, .. } => *id,
            Substitution::Bound(t) => match t {
                Type::Variable(v) => v.id(),
                _ => u64::MAX,
            },
        }
    }

    pub fn is_equality(&self) -> bool {
        match &*self.0.borrow() {
            Substitution::Unbound { equality, .. } => *equality,
            Substitution::Bound(t) => t.admits_equality_unresolved(),
        }
    }

    pub fn resolve(&self) -> Option<Type> {
        match &*self.0.borrow() {
            Substitution::Unbound { .. } => None,
            Substitution::Bound(t) => Some(t.clone()),
        }
    }

    fn bind(&self, ty: Type) {
        *self.0.borrow_mut() = Substitution::Bound(ty);
    }
}

impl PartialEq for TypeVar {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Generates fresh, distinct type variables; one instance is shared across
/// a whole elaboration run (held by `State`).
#[derive(Debug, Default)]
pub struct TypeVarFactory {
    next: RefCell<u64>,
}

impl TypeVarFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&self, equality: bool) -> Type {
        let mut next = self.next.borrow_mut();
        let id = *next;
        *next += 1;
        Type::Variable(TypeVar(Rc::new(RefCell::new(Substitution::Unbound {
            id,
            equality,
        }))))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Variable(TypeVar),
    /// A named nullary or applied type constructor (`int`, `'a list`,
    /// `('a,'b) tree`); `args.is_empty()` for a nullary type.
    Constructor { name: String, args: Vec<Type> },
    Function(Box<Type>, Box<Type>),
    /// `complete = false` marks an open row, legal only while elaborating
    /// a `{l=p, ...}` pattern.
    Record {
        fields: BTreeMap<String, Type>,
        complete: bool,
    },
}

impl Type {
    pub fn tuple(elements: Vec<Type>) -> Type {
        let fields = elements
            .into_iter()
            .enumerate()
            .map(|(i, t)| ((i + 1).to_string(), t))
            .collect();
        Type::Record {
            fields,
            complete: true,
        }
    }

    pub fn unit() -> Type {
        Type::Record {
            fields: BTreeMap::new(),
            complete: true,
        }
    }

    pub fn con0(name: &str) -> Type {
        Type::Constructor {
            name: name.to_string(),
            args: vec![],
        }
    }

    pub fn resolved(&self) -> Type {
        match self {
            Type::Variable(v) => match v.resolve() {
                Some(inner) => inner.resolved(),
                None => self.clone(),
            },
            other => other.clone(),
        }
    }

    fn admits_equality_unresolved(&self) -> bool {
        match self.resolved() {
            Type::Variable(v) => v.is_equality(),
            Type::Function(_, _) => false,
            Type::Constructor { name, args } => match name.as_str() {
                "int" | "word" | "bool" | "char" | "string" => true,
                "real" => false,
                _ => args.iter().all(|a| a.admits_equality_unresolved()),
            },
            Type::Record { fields, .. } => fields.values().all(|t| t.admits_equality_unresolved()),
        }
    }

    pub fn free_vars(&self) -> HashSet<u64> {
        let mut out = HashSet::new();
        self.collect_free_vars(&mut out);
        out
    }

    fn collect_free_vars(&self, out: &mut HashSet<u64>) {
        match self.resolved() {
            Type::Variable(v) => {
                out.insert(v.id());
            }
            Type::Function(a, b) => {
                a.collect_free_vars(out);
                b.collect_free_vars(out);
            }
            Type::Constructor { args, .. } => {
                for a in args {
                    a.collect_free_vars(out);
                }
            }
            Type::Record { fields, .. } => {
                for t in fields.values() {
                    t.collect_free_vars(out);
                }
            }
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.resolved() {
            Type::Variable(v) => write!(f, "'{}t{}", if v.is_equality() { "'" } else { "" }, v.id()),
            Type::Function(a, b) => write!(f, "({} -> {})", a, b),
            Type::Constructor { name, args } => {
                if args.is_empty() {
                    write!(f, "{name}")
                } else if args.len() == 1 {
                    write!(f, "{} {name}", args[0])
                } else {
                    let parts: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                    write!(f, "({}) {name}", parts.join(", "))
                }
            }
            Type::Record { fields, complete } => {
                let is_tuple = !fields.is_empty()
                    && fields
                        .keys()
                        .enumerate()
                        .all(|(i, k)| k == &(i + 1).to_string());
                if is_tuple {
                    let parts: Vec<String> = fields.values().map(|t| t.to_string()).collect();
                    write!(f, "({})", parts.join(" * "))
                } else {
                    let parts: Vec<String> =
                        fields.iter().map(|(l, t)| format!("{l}: {t}")).collect();
                    write!(
                        f,
                        "{{{}{}}}",
                        parts.join(", "),
                        if complete { "" } else { ", ...}" }
                    )
                }
            }
        }
    }
}

/// `∀ tvs. τ`: a generalized binding, instantiated afresh on every lookup.
#[derive(Debug, Clone)]
pub struct TypeScheme {
    pub quantified: Vec<u64>,
    pub body: Type,
}

impl TypeScheme {
    pub fn monomorphic(ty: Type) -> TypeScheme {
        TypeScheme {
            quantified: vec![],
            body: ty,
        }
    }

    pub fn instantiate(&self, factory: &TypeVarFactory) -> Type {
        if self.quantified.is_empty() {
            return self.body.clone();
        }
        let mapping: BTreeMap<u64, Type> = self
            .quantified
            .iter()
            .map(|&id| (id, factory.fresh(false)))
            .collect();
        substitute(&self.body, &mapping)
    }
}

fn substitute(ty: &Type, mapping: &BTreeMap<u64, Type>) -> Type {
    match ty.resolved() {
        Type::Variable(v) => mapping.get(&v.id()).cloned().unwrap_or(Type::Variable(v)),
        Type::Function(a, b) => Type::Function(
            Box::new(substitute(&a, mapping)),
            Box::new(substitute(&b, mapping)),
        ),
        Type::Constructor { name, args } => Type::Constructor {
            name,
            args: args.iter().map(|a| substitute(a, mapping)).collect(),
        },
        Type::Record { fields, complete } => Type::Record {
            fields: fields
                .into_iter()
                .map(|(l, t)| (l, substitute(&t, mapping)))
                .collect(),
            complete,
        },
    }
}

/// Unifies `a` and `b` in place (mutating whichever type variables need
/// binding), or reports the mismatch at `position`.
pub fn unify(a: &Type, b: &Type, position: Position) -> Result<(), ElaborationError> {
    let (ra, rb) = (a.resolved(), b.resolved());
    match (&ra, &rb) {
        (Type::Variable(v1), Type::Variable(v2)) if v1 == v2 => Ok(()),
        (Type::Variable(v), _) => bind_var(v, &rb, position),
        (_, Type::Variable(v)) => bind_var(v, &ra, position),
        (Type::Function(a1, b1), Type::Function(a2, b2)) => {
            unify(a1, a2, position)?;
            unify(b1, b2, position)
        }
        (
            Type::Constructor { name: n1, args: a1 },
            Type::Constructor { name: n2, args: a2 },
        ) => {
            if n1 != n2 || a1.len() != a2.len() {
                return Err(mismatch(&ra, &rb, position));
            }
            for (x, y) in a1.iter().zip(a2.iter()) {
                unify(x, y, position)?;
            }
            Ok(())
        }
        (
            Type::Record {
                fields: f1,
                complete: c1,
            },
            Type::Record {
                fields: f2,
                complete: c2,
            },
        ) => unify_records(f1, *c1, f2, *c2, position),
        _ => Err(mismatch(&ra, &rb, position)),
    }
}

fn unify_records(
    f1: &BTreeMap<String, Type>,
    c1: bool,
    f2: &BTreeMap<String, Type>,
    c2: bool,
    position: Position,
) -> Result<(), ElaborationError> {
    if c1 && c2 {
        let labels1: HashSet<&String> = f1.keys().collect();
        let labels2: HashSet<&String> = f2.keys().collect();
        if labels1 != labels2 {
            return Err(ElaborationError {
                kind: ElaborationErrorKind::RecordLabelMismatch,
                message: format!(
                    "record labels {:?} do not match {:?}",
                    labels1, labels2
                ),
                position,
            });
        }
        for (label, t1) in f1 {
            unify(t1, &f2[label], position)?;
        }
        Ok(())
    } else {
        for (label, t1) in f1 {
            if let Some(t2) = f2.get(label) {
                unify(t1, t2, position)?;
            }
        }
        for (label, t2) in f2 {
            if let Some(t1) = f1.get(label) {
                unify(t1, t2, position)?;
            }
        }
        Ok(())
    }
}

fn bind_var(v: &TypeVar, ty: &Type, position: Position) -> Result<(), ElaborationError> {
    if let Type::Variable(other) = ty {
        if other == v {
            return Ok(());
        }
    }
    if ty.free_vars().contains(&v.id()) {
        return Err(ElaborationError {
            kind: ElaborationErrorKind::OccursCheck,
            message: format!("type variable occurs within the type it would be bound to: {ty}"),
            position,
        });
    }
    if v.is_equality() && !ty.admits_equality_unresolved() {
        return Err(ElaborationError {
            kind: ElaborationErrorKind::EqualityRequired,
            message: format!("{ty} does not admit equality"),
            position,
        });
    }
    v.bind(ty.clone());
    Ok(())
}

fn mismatch(a: &Type, b: &Type, position: Position) -> ElaborationError {
    ElaborationError {
        kind: ElaborationErrorKind::TypeMismatch,
        message: format!("cannot unify {a} with {b}"),
        position,
    }
}

impl Serialize for Type {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unify_function_types() {
        let factory = TypeVarFactory::new();
        let a = Type::Function(
            Box::new(factory.fresh(false)),
            Box::new(Type::con0("int")),
        );
        let b = Type::Function(Box::new(Type::con0("bool")), Box::new(Type::con0("int")));
        assert!(unify(&a, &b, 0).is_ok());
        if let Type::Function(dom, _) = a {
            assert_eq!(dom.resolved(), Type::con0("bool"));
        }
    }

    #[test]
    fn test_occurs_check_fails() {
        let factory = TypeVarFactory::new();
        let v = factory.fresh(false);
        let list_of_v = Type::Constructor {
            name: "list".to_string(),
            args: vec![v.clone()],
        };
        assert!(unify(&v, &list_of_v, 0).is_err());
    }

    #[test]
    fn test_equality_variable_rejects_function_type() {
        let factory = TypeVarFactory::new();
        let eq_var = factory.fresh(true);
        let fun = Type::Function(Box::new(Type::con0("int")), Box::new(Type::con0("int")));
        assert!(unify(&eq_var, &fun, 0).is_err());
    }

    #[test]
    fn test_scheme_instantiation_is_fresh_each_time() {
        let factory = TypeVarFactory::new();
        let v = factory.fresh(false);
        let id = if let Type::Variable(ref tv) = v { tv.id() } else { unreachable!() };
        let scheme = TypeScheme {
            quantified: vec![id],
            body: Type::Function(Box::new(v.clone()), Box::new(v)),
        };
        let t1 = scheme.instantiate(&factory);
        let t2 = scheme.instantiate(&factory);
        assert_ne!(t1, t2);
    }
}
