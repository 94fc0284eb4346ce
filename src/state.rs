//! The shared, parent-linked environment threaded through every phase
//! (spec §3 "State"). Grounded on the teacher's `typechecker/typescope.rs`
//! `Rc<RefCell<ScopeFrame>>` stack, reshaped from a `Vec`-backed stack into
//! a parent-pointer chain: pushing a child frame returns a fresh `Rc`
//! whose parent points at the frame it was pushed from, so a closure that
//! captured an old frame keeps seeing exactly what it captured even after
//! later top-level declarations add sibling frames (spec §5, §9).

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::ast::Ty;
use crate::fixity::FixityTable;
use crate::types::{Type, TypeScheme, TypeVarFactory};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebindStatus {
    Allowed,
    Never,
}

/// Static information recorded for a `datatype` type constructor.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub arity: usize,
    pub constructors: Vec<String>,
}

#[derive(Debug)]
struct Frame {
    parent: Option<State>,
    generation: u64,
    type_vars: Rc<TypeVarFactory>,
    id_counter: Rc<RefCell<u64>>,
    static_values: RefCell<HashMap<String, TypeScheme>>,
    static_types: RefCell<HashMap<String, TypeInfo>>,
    type_synonyms: RefCell<HashMap<String, (Vec<String>, Ty)>>,
    static_exceptions: RefCell<HashMap<String, Option<Type>>>,
    dynamic_values: RefCell<HashMap<String, Value>>,
    rebind_status: RefCell<HashMap<String, RebindStatus>>,
    /// Flat names (plain or dotted) known to denote a value or exception
    /// constructor rather than a variable, consulted by both the
    /// elaborator and the evaluator when a bare identifier shows up in
    /// pattern position (spec §4.3's "disambiguated by context").
    constructors: RefCell<HashSet<String>>,
    fixity: RefCell<FixityTable>,
}

/// A reference-counted handle to one scope frame. Cheap to clone; cloning
/// shares the frame, it does not copy it (spec I2's "shared ownership").
#[derive(Debug, Clone)]
pub struct State(Rc<Frame>);

impl State {
    pub fn root(type_var_factory: Rc<TypeVarFactory>) -> State {
        State(Rc::new(Frame {
            parent: None,
            generation: 0,
            type_vars: type_var_factory,
            id_counter: Rc::new(RefCell::new(0)),
            static_values: RefCell::new(HashMap::new()),
            static_types: RefCell::new(HashMap::new()),
            type_synonyms: RefCell::new(HashMap::new()),
            static_exceptions: RefCell::new(HashMap::new()),
            dynamic_values: RefCell::new(HashMap::new()),
            rebind_status: RefCell::new(HashMap::new()),
            constructors: RefCell::new(HashSet::new()),
            fixity: RefCell::new(FixityTable::with_builtins()),
        }))
    }

    /// Pushes a fresh, empty child frame. All subsequent bindings go here
    /// until another `push_child` is called.
    pub fn push_child(&self) -> State {
        State(Rc::new(Frame {
            parent: Some(self.clone()),
            generation: self.0.generation + 1,
            type_vars: self.0.type_vars.clone(),
            id_counter: self.0.id_counter.clone(),
            static_values: RefCell::new(HashMap::new()),
            static_types: RefCell::new(HashMap::new()),
            type_synonyms: RefCell::new(HashMap::new()),
            static_exceptions: RefCell::new(HashMap::new()),
            dynamic_values: RefCell::new(HashMap::new()),
            rebind_status: RefCell::new(HashMap::new()),
            constructors: RefCell::new(HashSet::new()),
            fixity: RefCell::new(self.0.fixity.borrow().clone()),
        }))
    }

    pub fn generation(&self) -> u64 {
        self.0.generation
    }

    pub fn type_vars(&self) -> &Rc<TypeVarFactory> {
        &self.0.type_vars
    }

    /// The next runtime id disambiguating a constructor from others of the
    /// same name across different `datatype`/`exception` declarations.
    pub fn next_id(&self) -> u64 {
        let mut counter = self.0.id_counter.borrow_mut();
        let id = *counter;
        *counter += 1;
        id
    }

    pub fn parent(&self) -> Option<&State> {
        self.0.parent.as_ref()
    }

    fn lookup<T: Clone>(
        &self,
        accessor: impl Fn(&Frame) -> Option<T>,
    ) -> Option<T> {
        let mut frame = self;
        loop {
            if let Some(found) = accessor(&frame.0) {
                return Some(found);
            }
            match frame.0.parent.as_ref() {
                Some(parent) => frame = parent,
                None => return None,
            }
        }
    }

    pub fn lookup_value_type(&self, name: &str) -> Option<TypeScheme> {
        self.lookup(|f| {
            f.static_values
                .borrow()
                .get(name)
                .map(|s| TypeScheme {
                    quantified: s.quantified.clone(),
                    body: s.body.clone(),
                })
        })
    }

    pub fn bind_value_type(&self, name: &str, scheme: TypeScheme) {
        self.0
            .static_values
            .borrow_mut()
            .insert(name.to_string(), scheme);
    }

    pub fn lookup_type_info(&self, name: &str) -> Option<TypeInfo> {
        self.lookup(|f| f.static_types.borrow().get(name).cloned())
    }

    pub fn bind_type_info(&self, name: &str, info: TypeInfo) {
        self.0.static_types.borrow_mut().insert(name.to_string(), info);
    }

    pub fn lookup_type_synonym(&self, name: &str) -> Option<(Vec<String>, Ty)> {
        self.lookup(|f| f.type_synonyms.borrow().get(name).cloned())
    }

    pub fn bind_type_synonym(&self, name: &str, parameters: Vec<String>, definition: Ty) {
        self.0
            .type_synonyms
            .borrow_mut()
            .insert(name.to_string(), (parameters, definition));
    }

    pub fn lookup_exception_type(&self, name: &str) -> Option<Option<Type>> {
        self.lookup(|f| f.static_exceptions.borrow().get(name).cloned())
    }

    pub fn bind_exception_type(&self, name: &str, argument: Option<Type>) {
        self.0
            .static_exceptions
            .borrow_mut()
            .insert(name.to_string(), argument);
    }

    pub fn lookup_value(&self, name: &str) -> Option<Value> {
        self.lookup(|f| f.dynamic_values.borrow().get(name).cloned())
    }

    /// Names bound directly in this frame, not its ancestors. Used to copy
    /// a detached `local` body frame's bindings into the frame that
    /// survives it (spec I3).
    pub fn own_value_names(&self) -> Vec<String> {
        self.0.dynamic_values.borrow().keys().cloned().collect()
    }

    pub fn rebind_status(&self, name: &str) -> RebindStatus {
        self.lookup(|f| f.rebind_status.borrow().get(name).copied())
            .unwrap_or(RebindStatus::Allowed)
    }

    pub fn mark_constructor(&self, name: &str) {
        self.0.constructors.borrow_mut().insert(name.to_string());
    }

    pub fn is_constructor(&self, name: &str) -> bool {
        self.lookup(|f| f.constructors.borrow().contains(name).then_some(true))
            .unwrap_or(false)
    }

    pub fn set_rebind_status(&self, name: &str, status: RebindStatus) {
        self.0
            .rebind_status
            .borrow_mut()
            .insert(name.to_string(), status);
    }

    /// Binds `name` in the current (innermost) frame. Returns an error
    /// message if `name` carries `Never` rebind status anywhere in the
    /// visible chain; the caller turns that into an `EvaluationError`.
    pub fn bind_value(&self, name: &str, value: Value) -> Result<(), String> {
        if self.rebind_status(name) == RebindStatus::Never {
            return Err(format!("'{name}' is a protected identifier and cannot be rebound"));
        }
        self.0
            .dynamic_values
            .borrow_mut()
            .insert(name.to_string(), value);
        Ok(())
    }

    /// Used only to install the recursive-group's own bindings into the
    /// frame it was defined in; bypasses rebind protection since the
    /// elaborator has already checked it once for the declaration as a
    /// whole.
    pub fn bind_value_unchecked(&self, name: &str, value: Value) {
        self.0
            .dynamic_values
            .borrow_mut()
            .insert(name.to_string(), value);
    }

    pub fn fixity(&self) -> FixityTable {
        self.0.fixity.borrow().clone()
    }

    pub fn set_fixity_table(&self, table: FixityTable) {
        *self.0.fixity.borrow_mut() = table;
    }

    /// Copies everything bound directly in this frame (not inherited from
    /// a parent) into `target`, including this frame's fixity table.
    ///
    /// `interpret` runs a whole chunk against a scratch child frame and
    /// only calls this once lexing, parsing, simplification, elaboration,
    /// and evaluation have all succeeded, so a chunk that fails partway
    /// through never leaves any of its effects — bindings or fixity
    /// changes alike — visible in the caller's frame (spec §5, §7).
    pub fn commit_into(&self, target: &State) {
        for (name, scheme) in self.0.static_values.borrow().iter() {
            target.bind_value_type(
                name,
                TypeScheme {
                    quantified: scheme.quantified.clone(),
                    body: scheme.body.clone(),
                },
            );
        }
        for (name, info) in self.0.static_types.borrow().iter() {
            target.bind_type_info(name, info.clone());
        }
        for (name, (params, definition)) in self.0.type_synonyms.borrow().iter() {
            target.bind_type_synonym(name, params.clone(), definition.clone());
        }
        for (name, argument) in self.0.static_exceptions.borrow().iter() {
            target.bind_exception_type(name, argument.clone());
        }
        for name in self.0.constructors.borrow().iter() {
            target.mark_constructor(name);
        }
        for (name, status) in self.0.rebind_status.borrow().iter() {
            target.set_rebind_status(name, *status);
        }
        for (name, value) in self.0.dynamic_values.borrow().iter() {
            target.bind_value_unchecked(name, value.clone());
        }
        target.set_fixity_table(self.fixity());
    }

    /// Renders bindings introduced since frame generation `since`, one per
    /// line, per the `state.toString` entry point of spec §6.
    pub fn pretty_print(&self, since_generation: u64) -> String {
        let mut frames = vec![];
        let mut current = Some(self.clone());
        while let Some(frame) = current {
            if frame.generation() <= since_generation {
                break;
            }
            frames.push(frame.clone());
            current = frame.parent().cloned();
        }
        frames.reverse();

        let mut out = String::new();
        for frame in frames {
            let values = frame.0.dynamic_values.borrow();
            let mut names: Vec<&String> = values.keys().collect();
            names.sort();
            for name in names {
                let value = &values[name];
                let ty = frame
                    .lookup_value_type(name)
                    .map(|s| s.body.to_string())
                    .unwrap_or_else(|| "?".to_string());
                out.push_str(&format!("val {name} : {ty} = {value}\n"));
            }
        }
        out
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeVarFactory;
    use crate::value::Value;
    use std::rc::Rc;

    #[test]
    fn test_child_shadows_but_parent_still_visible_through_own_handle() {
        let root = State::root(Rc::new(TypeVarFactory::new()));
        root.bind_value("x", Value::Integer(1)).unwrap();
        let child = root.push_child();
        child.bind_value("x", Value::Integer(2)).unwrap();
        assert_eq!(child.lookup_value("x"), Some(Value::Integer(2)));
        assert_eq!(root.lookup_value("x"), Some(Value::Integer(1)));
    }

    #[test]
    fn test_rebind_protection() {
        let root = State::root(Rc::new(TypeVarFactory::new()));
        root.set_rebind_status("true", RebindStatus::Never);
        root.bind_value_unchecked("true", Value::Bool(true));
        let child = root.push_child();
        assert!(child.bind_value("true", Value::Bool(false)).is_err());
    }

    #[test]
    fn test_sealed_frame_not_mutated_by_sibling() {
        let root = State::root(Rc::new(TypeVarFactory::new()));
        let first = root.push_child();
        first.bind_value("a", Value::Integer(1)).unwrap();
        let second = root.push_child();
        second.bind_value("b", Value::Integer(2)).unwrap();
        assert_eq!(first.lookup_value("b"), None);
        assert_eq!(second.lookup_value("a"), None);
    }
}
