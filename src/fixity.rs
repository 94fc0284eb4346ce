//! The fixity table consulted by the parser while folding application
//! chains into binary-operator trees (spec §4.2).

use std::collections::HashMap;

use crate::token::{Associativity, Fixity};

/// One scope's worth of fixity declarations. `Parser` keeps a stack of
/// these, pushing a fresh copy on entering `let`/`local`/a sequence of
/// declarations and popping it back off on exit, which is how `infix`
/// declared inside a `let` stops being visible outside it.
#[derive(Debug, Clone, Default)]
pub struct FixityTable {
    entries: HashMap<String, Fixity>,
}

impl FixityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, identifier: &str) -> Option<Fixity> {
        self.entries.get(identifier).copied()
    }

    pub fn is_infix(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    pub fn set_infix(&mut self, identifier: &str, precedence: u8, associativity: Associativity) {
        self.entries.insert(
            identifier.to_string(),
            Fixity {
                precedence,
                associativity,
            },
        );
    }

    pub fn set_nonfix(&mut self, identifier: &str) {
        self.entries.remove(identifier);
    }

    /// Seeds the built-in operator fixities named in spec §6.
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        use Associativity::*;
        table.set_infix("::", 5, Right);
        table.set_infix("@", 5, Right);
        table.set_infix("*", 7, Left);
        table.set_infix("/", 7, Left);
        table.set_infix("div", 7, Left);
        table.set_infix("mod", 7, Left);
        table.set_infix("+", 6, Left);
        table.set_infix("-", 6, Left);
        table.set_infix("^", 6, Left);
        table.set_infix("=", 4, Left);
        table.set_infix("<>", 4, Left);
        table.set_infix("<", 4, Left);
        table.set_infix("<=", 4, Left);
        table.set_infix(">", 4, Left);
        table.set_infix(">=", 4, Left);
        table.set_infix("o", 3, Left);
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_seeded() {
        let table = FixityTable::with_builtins();
        assert!(table.is_infix("+"));
        assert_eq!(table.get("::").unwrap().associativity, Associativity::Right);
    }

    #[test]
    fn test_nonfix_removes_entry() {
        let mut table = FixityTable::with_builtins();
        table.set_nonfix("+");
        assert!(!table.is_infix("+"));
    }
}
