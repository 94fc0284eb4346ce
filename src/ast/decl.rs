//! Top-level and nested declaration forms.

use crate::ast::expr::PatExpr;
use crate::ast::ty::Ty;
use crate::token::Position;

#[derive(Debug, Clone, PartialEq)]
pub struct ValBinding {
    pub pattern: PatExpr,
    pub value: PatExpr,
}

/// One `and`-joined function, with its (possibly multiple) clauses. All
/// clauses must agree on arity; `simplify` checks that and lowers this to
/// `val rec name = fn ... => case ... of <clauses>`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionClause {
    pub arguments: Vec<PatExpr>,
    pub result_type: Option<Ty>,
    pub body: PatExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub clauses: Vec<FunctionClause>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatatypeDef {
    pub name: String,
    pub parameters: Vec<String>,
    /// Constructor name and optional argument type, in declaration order
    /// (the order fixes each constructor's runtime `id` disambiguator).
    pub constructors: Vec<(String, Option<Ty>)>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExceptionBinding {
    New {
        name: String,
        argument: Option<Ty>,
    },
    /// `exception X = Y`: copies `Y`'s type and runtime id.
    Alias {
        name: String,
        source_qualifiers: Vec<String>,
        source_name: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Val {
        recursive: bool,
        bindings: Vec<ValBinding>,
        position: Position,
    },
    Fun {
        functions: Vec<FunctionDef>,
        position: Position,
    },
    Type {
        name: String,
        parameters: Vec<String>,
        definition: Ty,
        position: Position,
    },
    Datatype {
        datatypes: Vec<DatatypeDef>,
        position: Position,
    },
    /// `withtype` is rejected before this node is built; see
    /// `FeatureDisabledError` in `diagnostics`.
    Abstype {
        datatypes: Vec<DatatypeDef>,
        body: Vec<Declaration>,
        position: Position,
    },
    Exception {
        bindings: Vec<ExceptionBinding>,
        position: Position,
    },
    Open {
        structures: Vec<Vec<String>>,
        position: Position,
    },
    Local {
        local: Vec<Declaration>,
        body: Vec<Declaration>,
        position: Position,
    },
    Infix {
        precedence: u8,
        identifiers: Vec<String>,
        position: Position,
    },
    Infixr {
        precedence: u8,
        identifiers: Vec<String>,
        position: Position,
    },
    Nonfix {
        identifiers: Vec<String>,
        position: Position,
    },
    /// `d1; d2; ...` at top level or inside `let`.
    Sequence {
        declarations: Vec<Declaration>,
        position: Position,
    },
    /// A bare top-level expression is sugar for `val it = e`.
    Expression {
        expr: PatExpr,
        position: Position,
    },
    Empty,
}

impl Declaration {
    pub fn position(&self) -> Position {
        match self {
            Declaration::Val { position, .. }
            | Declaration::Fun { position, .. }
            | Declaration::Type { position, .. }
            | Declaration::Datatype { position, .. }
            | Declaration::Abstype { position, .. }
            | Declaration::Exception { position, .. }
            | Declaration::Open { position, .. }
            | Declaration::Local { position, .. }
            | Declaration::Infix { position, .. }
            | Declaration::Infixr { position, .. }
            | Declaration::Nonfix { position, .. }
            | Declaration::Sequence { position, .. }
            | Declaration::Expression { position, .. } => *position,
            Declaration::Empty => crate::token::SYNTHETIC,
        }
    }
}
