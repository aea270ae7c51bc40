//! Shared fixtures for the scenario/property tests under `tests/`. Not a
//! test binary itself (no `#[test]`s here) — each `tests/*.rs` file pulls
//! this in with `mod support;`, the same split the teacher uses between
//! `tests/common/mod.rs` helpers and its per-concern `tests/*.rs` files.

#![allow(dead_code)]

use nestc::ir::mem::{MemDec, MemOp};
use nestc::ir::soacs::Dec as SoacsDec;
use nestc::ir::{Body, Exp, LoopForm};
use nestc::name::Name;
use nestc::types::{ArrayType, FloatWidth, IntWidth, PrimType, Shape, Type, Uniqueness};
use std::collections::HashSet;

pub fn i32_ty() -> Type {
    Type::Prim(PrimType::Signed(IntWidth::W32))
}

pub fn i64_ty() -> Type {
    Type::Prim(PrimType::Signed(IntWidth::W64))
}

pub fn f32_ty() -> Type {
    Type::Prim(PrimType::Float(FloatWidth::W32))
}

pub fn bool_ty() -> Type {
    Type::Prim(PrimType::Bool)
}

/// A 1-D `[n]i32` array type, nonunique (the common case for a SOAC input).
pub fn i32_array(len: u64) -> Type {
    let shape = Shape(vec![nestc::types::DimSize::Const(len)]);
    Type::Array(ArrayType { elem: PrimType::Signed(IntWidth::W32), shape, uniqueness: Uniqueness::Nonunique })
}

/// Walk a generic `Body` and collect every name *bound* anywhere inside it
/// (pattern elements, loop/branch params, nested bodies) — the traversal
/// `globallyUnique` (spec §8 property 1) needs, generic over IR level since
/// `Body<Op, Dec>` is one skeleton (C2) at every level.
pub fn collect_bound_names<Op, Dec>(body: &Body<Op, Dec>, out: &mut Vec<Name>)
where
    Op: CollectOpNames,
{
    for stm in &body.stms {
        for elem in &stm.pattern.elems {
            out.push(elem.name);
        }
        match &stm.exp {
            Exp::Op(op) => op.collect_names(out),
            Exp::If { then_body, else_body, .. } => {
                collect_bound_names(then_body, out);
                collect_bound_names(else_body, out);
            }
            Exp::DoLoop { merge, form, body } => {
                for (p, _) in merge {
                    out.push(p.name);
                }
                if let LoopForm::For { index, .. } = form {
                    out.push(*index);
                }
                collect_bound_names(body, out);
            }
            Exp::SubExp(_) | Exp::BasicOp(_) => {}
        }
    }
}

/// Operation-specific nested-name collection: every IR-level `Op` enum
/// nests further bodies/lambdas that themselves bind names (a SOAC's
/// lambda params, a kernel's thread index, ...). Each level implements this
/// once so `collect_bound_names` stays generic.
pub trait CollectOpNames {
    fn collect_names(&self, out: &mut Vec<Name>);
}

impl CollectOpNames for nestc::ir::soacs::SoacOp {
    fn collect_names(&self, out: &mut Vec<Name>) {
        use nestc::ir::soacs::SoacOp::*;
        let collect_lambda = |l: &nestc::ir::Lambda<nestc::ir::soacs::SoacOp, SoacsDec>, out: &mut Vec<Name>| {
            for p in &l.params {
                out.push(p.name);
            }
            collect_bound_names(&l.body, out);
        };
        match self {
            Map { lambda, .. } | Reduce { lambda, .. } | Scan { lambda, .. } | Filter { lambda, .. } | Stream { lambda, .. } => {
                collect_lambda(lambda, out)
            }
            Redomap { reduce_lambda, map_lambda, .. } => {
                collect_lambda(reduce_lambda, out);
                collect_lambda(map_lambda, out);
            }
        }
    }
}

impl CollectOpNames for nestc::ir::kernels::KernelOp {
    fn collect_names(&self, out: &mut Vec<Name>) {
        use nestc::ir::kernels::KernelOp::*;
        match self {
            Soac(s) => s.collect_names(out),
            Kernel(k) => {
                out.push(k.thread_index);
                for nest in &k.nest {
                    out.push(nest.thread_index);
                    for elem in &nest.pattern.elems {
                        out.push(elem.name);
                    }
                }
                collect_bound_names(&k.body, out);
            }
            ReduceKernel(rk) => {
                collect_bound_names(&rk.per_thread_body, out);
                collect_bound_names(&rk.cross_thread_body, out);
            }
        }
    }
}

impl CollectOpNames for MemOp {
    fn collect_names(&self, out: &mut Vec<Name>) {
        if let MemOp::Kernel(k) = self {
            k.collect_names(out);
        }
    }
}

/// Assert every name returned by [`collect_bound_names`] is distinct — the
/// direct rendering of spec §8 property 1, `globallyUnique(pi(P))`.
pub fn assert_globally_unique(names: &[Name]) {
    let mut seen = HashSet::new();
    for n in names {
        assert!(seen.insert(*n), "name {n} bound more than once — global-uniqueness invariant violated");
    }
}

/// `true` iff every array-typed `MemDec` in the body carries a memory
/// binding — spec §8 property 4, "after explicitAllocations every array
/// binding has a memory annotation".
pub fn all_arrays_have_memory(body: &Body<MemOp, MemDec>) -> bool {
    body.stms.iter().all(|stm| {
        stm.pattern.elems.iter().all(|e| !e.dec.ty.is_array() || e.dec.mem.is_some())
            && match &stm.exp {
                Exp::If { then_body, else_body, .. } => {
                    all_arrays_have_memory(then_body) && all_arrays_have_memory(else_body)
                }
                Exp::DoLoop { body, .. } => all_arrays_have_memory(body),
                Exp::Op(MemOp::Kernel(nestc::ir::kernels::KernelOp::Kernel(k))) => {
                    // A kernel's own body stays at the Kernels (unannotated)
                    // level (see `expand_alloc` module doc) — only the
                    // outer MemBody containing the kernel statement itself
                    // is in scope for this check.
                    let _ = k;
                    true
                }
                _ => true,
            }
    })
}
