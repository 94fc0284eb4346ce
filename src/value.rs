//! Runtime values (spec §3 "Values (dynamic)"). Tuples are records with
//! labels `1..n`; lists are the built-in `nil`/`::` datatype, represented
//! like any other constructed value rather than as a native Rust `Vec`.

use std::collections::BTreeMap;
use std::fmt::{Debug, Display};
use std::rc::Rc;

use serde::{Serialize, Serializer};

use crate::core_ast::CoreExpr;
use crate::state::State;
use crate::token::Position;

/// One member of a mutually recursive function group. Applying a
/// `FunctionValue` re-adjoins the whole group into a fresh child frame
/// (spec §9 "cyclic closure graphs", option (a): the group is a plain
/// data table carried by the closure, not a reference cycle).
#[derive(Clone)]
pub struct RecursiveBinding {
    pub name: String,
    pub parameter: String,
    pub parameter_position: Position,
    pub body: Rc<CoreExpr>,
}

#[derive(Clone)]
pub struct FunctionValue {
    /// Which member of `group` this closure currently denotes.
    pub name: String,
    pub captured: State,
    pub group: Rc<Vec<RecursiveBinding>>,
}

impl FunctionValue {
    /// `None` only if a `FunctionValue` were ever built with a `name` not
    /// present in its own `group`, which every constructor in `eval.rs`
    /// avoids by construction.
    pub fn own_binding(&self) -> Option<&RecursiveBinding> {
        self.group.iter().find(|b| b.name == self.name)
    }
}

pub type HostCallback = Rc<dyn Fn(Value) -> (Value, bool)>;

#[derive(Clone)]
pub enum Value {
    Integer(i64),
    Word(i64),
    Real(f64),
    Bool(bool),
    Char(char),
    String(String),
    Record(BTreeMap<String, Value>),
    Function(FunctionValue),
    PredefinedFunction {
        name: String,
        callback: HostCallback,
    },
    /// An unapplied constructor treated as a first-class function, e.g.
    /// `val f = SOME`.
    ValueConstructor {
        name: String,
        arity: usize,
        id: u64,
    },
    ConstructedValue {
        name: String,
        payload: Option<Box<Value>>,
        id: u64,
    },
    ExceptionConstructor {
        name: String,
        arity: usize,
        id: u64,
    },
    ExceptionValue {
        name: String,
        payload: Option<Box<Value>>,
        id: u64,
    },
}

impl Value {
    pub fn unit() -> Value {
        Value::Record(BTreeMap::new())
    }

    pub fn tuple(elements: Vec<Value>) -> Value {
        Value::Record(
            elements
                .into_iter()
                .enumerate()
                .map(|(i, v)| ((i + 1).to_string(), v))
                .collect(),
        )
    }

    /// Structural equality per spec §4.5: reals compare bit-equal, and
    /// functions are never reached here because the elaborator rejects
    /// `=` at a function type before evaluation runs.
    pub fn structural_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Word(a), Value::Word(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a.to_bits() == b.to_bits(),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.structural_eq(w)))
            }
            (
                Value::ConstructedValue {
                    name: n1,
                    payload: p1,
                    id: i1,
                },
                Value::ConstructedValue {
                    name: n2,
                    payload: p2,
                    id: i2,
                },
            ) => n1 == n2 && i1 == i2 && option_box_eq(p1, p2),
            (
                Value::ExceptionValue {
                    name: n1,
                    payload: p1,
                    id: i1,
                },
                Value::ExceptionValue {
                    name: n2,
                    payload: p2,
                    id: i2,
                },
            ) => n1 == n2 && i1 == i2 && option_box_eq(p1, p2),
            _ => false,
        }
    }
}

fn option_box_eq(a: &Option<Box<Value>>, b: &Option<Box<Value>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.structural_eq(b),
        _ => false,
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.structural_eq(other)
    }
}

fn is_tuple_record(fields: &BTreeMap<String, Value>) -> bool {
    !fields.is_empty()
        && fields
            .keys()
            .enumerate()
            .all(|(i, k)| k == &(i + 1).to_string())
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            Value::Word(n) => write!(f, "0w{n}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Char(c) => write!(f, "#\"{c}\""),
            Value::String(s) => write!(f, "\"{}\"", s.escape_default()),
            Value::Record(fields) => {
                if fields.is_empty() {
                    return write!(f, "()");
                }
                if is_tuple_record(fields) {
                    let parts: Vec<String> = fields.values().map(|v| v.to_string()).collect();
                    write!(f, "({})", parts.join(", "))
                } else {
                    let parts: Vec<String> =
                        fields.iter().map(|(l, v)| format!("{l} = {v}")).collect();
                    write!(f, "{{{}}}", parts.join(", "))
                }
            }
            Value::Function(_) | Value::PredefinedFunction { .. } => write!(f, "fn"),
            Value::ValueConstructor { name, .. } | Value::ExceptionConstructor { name, .. } => {
                write!(f, "{name}")
            }
            Value::ConstructedValue { name, payload, .. }
            | Value::ExceptionValue { name, payload, .. } => match payload {
                Some(value) => write!(f, "{name} {value}"),
                None => write!(f, "{name}"),
            },
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_prints_parens() {
        let v = Value::tuple(vec![Value::Integer(1), Value::Bool(true)]);
        assert_eq!(v.to_string(), "(1, true)");
    }

    #[test]
    fn test_real_structural_eq_is_bitwise() {
        assert!(Value::Real(0.0).structural_eq(&Value::Real(0.0)));
        assert!(!Value::Real(f64::NAN).structural_eq(&Value::Real(1.0)));
    }

    #[test]
    fn test_constructed_value_display() {
        let some_one = Value::ConstructedValue {
            name: "SOME".to_string(),
            payload: Some(Box::new(Value::Integer(1))),
            id: 0,
        };
        assert_eq!(some_one.to_string(), "SOME 1");
    }
}
