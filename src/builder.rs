//! Builder / scope monad (component C3): threads a [`NameSource`] and a
//! [`Scope`] through IR construction, collecting emitted bindings. This is
//! the one engine every pass (simplifier, kernel extraction, explicit
//! allocations, ImpGen) runs inside.

use crate::decoration::Decoration;
use crate::ir::{Certs, Exp, Pattern, PatElem, Stm, SubExp};
use crate::name::{Name, NameSource};
use crate::scope::{BindingKind, Scope, ScopeEntry};
use crate::types::Type;

/// A builder for one representation `(Op, Dec)`. Holds the name source by
/// mutable reference (the source is process-external and outlives any one
/// builder invocation, same as the teacher threading one `Interpreter`
/// through many helper calls) and the bindings accumulated so far at the
/// current nesting level.
pub struct Builder<'a, Op, Dec> {
    names: &'a mut NameSource,
    scope: Scope,
    stms: Vec<Stm<Op, Dec>>,
}

impl<'a, Op, Dec: Decoration> Builder<'a, Op, Dec> {
    pub fn new(names: &'a mut NameSource, scope: Scope) -> Self {
        Self { names, scope, stms: Vec::new() }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// `newName(tag)`: allocate a fresh name via the threaded source.
    pub fn new_name(&mut self, tag: impl Into<String>) -> Name {
        self.names.fresh(tag)
    }

    /// `lookupType(name) -> Type`. Fatal (per §4.2: "lookups on unbound
    /// names are fatal") if the name isn't in scope — callers that need a
    /// recoverable lookup should check `scope().contains` first.
    pub fn lookup_type(&self, name: Name) -> &Type {
        self.scope
            .lookup_type(name)
            .unwrap_or_else(|| panic!("internal invariant violation: unbound name {name} in Builder::lookup_type"))
    }

    /// `addStm(stm)`: emit a binding into the current level, and bring its
    /// pattern into scope so subsequent emissions can refer to it.
    pub fn add_stm(&mut self, stm: Stm<Op, Dec>) {
        for elem in &stm.pattern.elems {
            self.scope = self.scope.insert(elem.name, BindingKind::Let, elem.dec.type_of().clone());
        }
        self.stms.push(stm);
    }

    /// `collectStms(m) -> (result, [stm])`: run `m`, returning what it
    /// produced together with exactly the statements it emitted, in
    /// emission order, removed from the outer stream.
    pub fn collect_stms<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> (T, Vec<Stm<Op, Dec>>) {
        let outer = std::mem::take(&mut self.stms);
        let result = f(self);
        let collected = std::mem::replace(&mut self.stms, outer);
        (result, collected)
    }

    /// `localScope(env, m)`: run `m` against a scope extended with `env`;
    /// the caller's scope is restored afterwards regardless of what `m`
    /// bound internally.
    pub fn local_scope<T>(&mut self, env: impl IntoIterator<Item = (Name, ScopeEntry)>, f: impl FnOnce(&mut Self) -> T) -> T {
        let outer_scope = self.scope.clone();
        self.scope = self.scope.extend(env);
        let result = f(self);
        self.scope = outer_scope;
        result
    }

    /// `letSubExp(desc, exp) -> SubExp`: bind `exp` at type `ty` and return
    /// a reference to it, except when `exp` is already a bare sub-expression
    /// — then it's the identity and no binding is emitted (§4.2).
    pub fn let_sub_exp(&mut self, desc: impl Into<String>, ty: Type, exp: Exp<Op, Dec>) -> SubExp {
        if let Exp::SubExp(se) = exp {
            return se;
        }
        let name = self.let_bind(desc, ty, exp);
        SubExp::Var(name)
    }

    /// `letExp(desc, exp) -> Name`: bind `exp`, which must produce exactly
    /// one value, under a fresh name at type `ty`.
    pub fn let_exp(&mut self, desc: impl Into<String>, ty: Type, exp: Exp<Op, Dec>) -> Name {
        self.let_bind(desc, ty, exp)
    }

    fn let_bind(&mut self, desc: impl Into<String>, ty: Type, exp: Exp<Op, Dec>) -> Name {
        let name = self.new_name(desc);
        let dec = Dec::from_type(ty);
        self.add_stm(Stm {
            pattern: Pattern { elems: vec![PatElem { name, dec }] },
            certs: Certs::default(),
            exp,
        });
        name
    }

    /// Bind a pattern with multiple results (e.g. an `If` whose arms return
    /// a tuple), for callers that already have a fully-formed `Pattern`.
    pub fn let_pattern(&mut self, pattern: Pattern<Dec>, exp: Exp<Op, Dec>) {
        self.add_stm(Stm { pattern, certs: Certs::default(), exp });
    }

    /// Finish building at this level, returning every statement emitted so
    /// far (used at the top of a pass to extract a finished `Body`).
    pub fn finish(self) -> Vec<Stm<Op, Dec>> {
        self.stms
    }
}
