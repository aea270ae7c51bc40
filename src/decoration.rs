//! The `Decoration` trait lets [`crate::builder::Builder`] stay generic
//! across IR levels: each level's per-binding decoration knows how to wrap a
//! plain [`Type`] (for scalar/default bindings) and how to hand one back out
//! (for `Builder::lookup_type`).

use crate::ir::mem::MemDec;
use crate::types::Type;

pub trait Decoration: Clone {
    fn from_type(ty: Type) -> Self;
    fn type_of(&self) -> &Type;
}

impl Decoration for Type {
    fn from_type(ty: Type) -> Self {
        ty
    }
    fn type_of(&self) -> &Type {
        self
    }
}

impl Decoration for MemDec {
    fn from_type(ty: Type) -> Self {
        MemDec::scalar(ty)
    }
    fn type_of(&self) -> &Type {
        &self.ty
    }
}
