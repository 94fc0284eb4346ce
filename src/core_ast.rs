//! The core calculus that `simplify` lowers surface syntax into: `fn`,
//! `val`/`val rec`, application, record construction, `case`, `raise`,
//! `handle`, typed expressions (spec §2 step 4, §9 "dynamic dispatch over
//! AST nodes" — one tagged enum, one recursive walk per phase).
//!
//! Whether a bare identifier pattern binds a fresh variable or matches a
//! nullary constructor is *not* decided here; `simplify` never consults
//! `State` (spec §4.3), so that disambiguation is left to the elaborator
//! and evaluator, which do have the environment in hand.

use crate::ast::{Constant, DatatypeDef, ExceptionBinding, Ty};
use crate::token::Position;

/// Long identifiers are looked up as one flat dotted key (`Math.pi` is
/// literally the key `"Math.pi"`), per the Non-goal "a module system
/// beyond flat long-identifier qualification": there is no structure
/// environment to walk, only a single flat namespace.
pub fn qualified_name(qualifiers: &[String], name: &str) -> String {
    if qualifiers.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", qualifiers.join("."), name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CorePat {
    Wildcard(Position),
    Constant(Constant, Position),
    Identifier {
        qualifiers: Vec<String>,
        name: String,
        position: Position,
    },
    /// An identifier applied to an argument pattern; this can only be a
    /// constructor application, since plain variable patterns are nullary.
    Applied {
        qualifiers: Vec<String>,
        name: String,
        argument: Box<CorePat>,
        position: Position,
    },
    Record {
        fields: Vec<(String, CorePat)>,
        complete: bool,
        position: Position,
    },
    Typed {
        inner: Box<CorePat>,
        ty: Ty,
        position: Position,
    },
    Layered {
        name: String,
        ty: Option<Ty>,
        pattern: Box<CorePat>,
        position: Position,
    },
}

impl CorePat {
    pub fn position(&self) -> Position {
        match self {
            CorePat::Wildcard(p) => *p,
            CorePat::Constant(_, p) => *p,
            CorePat::Identifier { position, .. }
            | CorePat::Applied { position, .. }
            | CorePat::Record { position, .. }
            | CorePat::Typed { position, .. }
            | CorePat::Layered { position, .. } => *position,
        }
    }
}

pub type CoreMatch = Vec<(CorePat, CoreExpr)>;

#[derive(Debug, Clone, PartialEq)]
pub enum CoreExpr {
    Constant(Constant, Position),
    Identifier {
        qualifiers: Vec<String>,
        name: String,
        position: Position,
    },
    Fn {
        parameter: String,
        parameter_position: Position,
        body: Box<CoreExpr>,
        position: Position,
    },
    Application {
        function: Box<CoreExpr>,
        argument: Box<CoreExpr>,
        position: Position,
    },
    Record {
        fields: Vec<(String, CoreExpr)>,
        position: Position,
    },
    Case {
        scrutinee: Box<CoreExpr>,
        arms: CoreMatch,
        position: Position,
    },
    Raise {
        exception: Box<CoreExpr>,
        position: Position,
    },
    Handle {
        expr: Box<CoreExpr>,
        arms: CoreMatch,
        position: Position,
    },
    Typed {
        inner: Box<CoreExpr>,
        ty: Ty,
        position: Position,
    },
    Let {
        declarations: Vec<CoreDecl>,
        body: Box<CoreExpr>,
        position: Position,
    },
}

impl CoreExpr {
    pub fn position(&self) -> Position {
        match self {
            CoreExpr::Constant(_, p) => *p,
            CoreExpr::Identifier { position, .. }
            | CoreExpr::Fn { position, .. }
            | CoreExpr::Application { position, .. }
            | CoreExpr::Record { position, .. }
            | CoreExpr::Case { position, .. }
            | CoreExpr::Raise { position, .. }
            | CoreExpr::Handle { position, .. }
            | CoreExpr::Typed { position, .. }
            | CoreExpr::Let { position, .. } => *position,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoreDecl {
    Val {
        pattern: CorePat,
        value: CoreExpr,
        position: Position,
    },
    /// A mutually recursive group: every bound name must have a `Fn` RHS
    /// (spec §4.3's `fun` lowering guarantees this; a bare surface
    /// `val rec x = e` with non-function `e` is a `ParserError` earlier).
    ValRec {
        bindings: Vec<(String, CoreExpr)>,
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
    Abstype {
        datatypes: Vec<DatatypeDef>,
        body: Vec<CoreDecl>,
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
        local: Vec<CoreDecl>,
        body: Vec<CoreDecl>,
        position: Position,
    },
    Sequence {
        declarations: Vec<CoreDecl>,
        position: Position,
    },
    /// A bare expression, evaluated and bound to `it`.
    Expression {
        expr: CoreExpr,
        position: Position,
    },
    Empty,
}

impl CoreDecl {
    pub fn position(&self) -> Position {
        match self {
            CoreDecl::Val { position, .. }
            | CoreDecl::ValRec { position, .. }
            | CoreDecl::Type { position, .. }
            | CoreDecl::Datatype { position, .. }
            | CoreDecl::Abstype { position, .. }
            | CoreDecl::Exception { position, .. }
            | CoreDecl::Open { position, .. }
            | CoreDecl::Local { position, .. }
            | CoreDecl::Sequence { position, .. }
            | CoreDecl::Expression { position, .. } => *position,
            CoreDecl::Empty => crate::token::SYNTHETIC,
        }
    }
}
