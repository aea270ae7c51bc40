//! Scope (spec §3.1, §4.2): a mapping from names to bindings. Implemented as
//! an immutable persistent map (`im::HashMap`) threaded by value, matching
//! the "immutable persistent map threaded through a reader monad"
//! alternative spec §9 calls out — entering/leaving a scope is then the
//! cheap, structural-sharing clone `im` is built for, rather than explicit
//! push/pop bookkeeping.

use crate::name::Name;
use crate::types::Type;
use im::HashMap as ImHashMap;

/// What kind of thing a name was bound as — used only for diagnostics and
/// for a handful of passes that care (e.g. a loop index may not be
/// consumed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    FunParam,
    Let,
    LoopIndex,
    MemBlock,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopeEntry {
    pub kind: BindingKind,
    pub ty: Type,
}

/// A persistent scope: extending it (`Scope::extend`) never mutates the
/// parent, matching the Builder contract "the scope passed to a sub-action
/// is a pure extension of the caller's; on return, the caller's scope is
/// unchanged" (§4.2).
#[derive(Debug, Clone, Default)]
pub struct Scope {
    entries: ImHashMap<Name, ScopeEntry>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: Name, kind: BindingKind, ty: Type) -> Self {
        let mut entries = self.entries.clone();
        entries.insert(name, ScopeEntry { kind, ty });
        Self { entries }
    }

    pub fn extend(&self, other: impl IntoIterator<Item = (Name, ScopeEntry)>) -> Self {
        let mut entries = self.entries.clone();
        for (n, e) in other {
            entries.insert(n, e);
        }
        Self { entries }
    }

    pub fn get(&self, name: Name) -> Option<&ScopeEntry> {
        self.entries.get(&name)
    }

    pub fn lookup_type(&self, name: Name) -> Option<&Type> {
        self.entries.get(&name).map(|e| &e.ty)
    }

    pub fn contains(&self, name: Name) -> bool {
        self.entries.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::NameSource;
    use crate::types::{PrimType, Type};

    #[test]
    fn extend_does_not_mutate_parent() {
        let mut src = NameSource::new();
        let x = src.fresh("x");
        let base = Scope::new().insert(x, BindingKind::Let, Type::Prim(PrimType::Bool));
        let y = src.fresh("y");
        let extended = base.insert(y, BindingKind::Let, Type::Prim(PrimType::Bool));
        assert!(!base.contains(y), "caller's scope unaffected by sub-action's extension");
        assert!(extended.contains(y));
        assert!(extended.contains(x));
    }
}
