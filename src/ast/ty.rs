//! Surface type expressions, as written in `val x : ty`, constructor
//! argument positions, and `:>` annotations.

use crate::token::Position;

#[derive(Debug, Clone, PartialEq)]
pub enum Ty {
    Var {
        name: String,
        position: Position,
    },
    EqualityVar {
        name: String,
        position: Position,
    },
    /// A type constructor applied to zero or more arguments, possibly
    /// long-identifier-qualified (`Math.t`, `'a list`, `int`).
    Constructor {
        qualifiers: Vec<String>,
        name: String,
        arguments: Vec<Ty>,
        position: Position,
    },
    Function {
        domain: Box<Ty>,
        codomain: Box<Ty>,
        position: Position,
    },
    /// Sugar for a record type with labels `1..n`; kept distinct in the
    /// surface AST so pretty-printing can tell tuples from records, but
    /// `simplify` erases the distinction.
    Tuple {
        elements: Vec<Ty>,
        position: Position,
    },
    Record {
        fields: Vec<(String, Ty)>,
        complete: bool,
        position: Position,
    },
}

impl Ty {
    pub fn position(&self) -> Position {
        match self {
            Ty::Var { position, .. }
            | Ty::EqualityVar { position, .. }
            | Ty::Constructor { position, .. }
            | Ty::Function { position, .. }
            | Ty::Tuple { position, .. }
            | Ty::Record { position, .. } => *position,
        }
    }
}
