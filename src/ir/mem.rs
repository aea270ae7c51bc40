//! KernelsMem IR (component C8/C9): every array binding carries a memory
//! block and index function; memory blocks are first-class bindings.

use super::kernels::KernelOp;
use super::{Body, FunDef, Pattern, Program, Stm, SubExp};
use crate::ixfun::{ExtIxFun, IxFun};
use crate::name::Name;
use crate::types::{Space, Type};

/// Per-binding decoration once memory is explicit: the plain type plus,
/// for array-typed bindings, which memory block and index function it lives
/// at. Scalars carry `mem = None`.
#[derive(Debug, Clone, PartialEq)]
pub struct MemDec {
    pub ty: Type,
    pub mem: Option<MemBind>,
}

impl MemDec {
    pub fn scalar(ty: Type) -> Self {
        Self { ty, mem: None }
    }
    pub fn array(ty: Type, mem: Name, ixfun: IxFun) -> Self {
        Self { ty, mem: Some(MemBind { mem, ixfun }) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemBind {
    pub mem: Name,
    pub ixfun: IxFun,
}

/// A first-class memory block binding: size in bytes and space (spec §3.2).
#[derive(Debug, Clone, PartialEq)]
pub struct MemInfo {
    pub size: SubExp,
    pub space: Space,
}

/// How an array-producing construct (function, branch arm, loop) declares
/// where its result lives on exit (spec §3.5).
#[derive(Debug, Clone, PartialEq)]
pub enum MemReturn {
    /// Exists in an existing block at a fixed index function.
    ReturnsInBlock { mem: Name, ixfun: ExtIxFun },
    /// Exists in a freshly existentialised block. `ctx_index` is the
    /// de-Bruijn index into the context tuple; `size` may itself be
    /// existential.
    ReturnsNewBlock { space: Space, ctx_index: usize, size: Option<SubExp> },
}

/// Generalise two branch arms' memory returns to their least-general common
/// form (spec §3.5): matching blocks/index functions pass through unchanged;
/// anything that differs becomes a fresh existential in the pattern context.
pub fn generalize_mem_returns(then_ret: &MemReturn, else_ret: &MemReturn) -> MemReturn {
    match (then_ret, else_ret) {
        (
            MemReturn::ReturnsInBlock { mem: m1, ixfun: i1 },
            MemReturn::ReturnsInBlock { mem: m2, ixfun: i2 },
        ) if m1 == m2 && i1 == i2 => MemReturn::ReturnsInBlock { mem: *m1, ixfun: i1.clone() },
        (
            MemReturn::ReturnsNewBlock { space: s1, size: sz1, .. },
            MemReturn::ReturnsNewBlock { space: s2, .. },
        ) if s1 == s2 => MemReturn::ReturnsNewBlock {
            space: *s1,
            ctx_index: 0,
            size: sz1.clone(),
        },
        // Mismatching forms generalise to a fresh existential block in
        // whichever space the `then` arm used; the `else` arm is rewritten
        // by `ensureDirectArray` (spec §4.7) to match.
        (MemReturn::ReturnsInBlock { .. }, _) | (MemReturn::ReturnsNewBlock { .. }, _) => {
            MemReturn::ReturnsNewBlock { space: Space::Default, ctx_index: 0, size: None }
        }
    }
}

/// Allocation at this level: `Alloc size space` plus everything `KernelOp`
/// already provides. Inside a kernel body, these are the targets expansion
/// (C9b) hoists out.
#[derive(Debug, Clone, PartialEq)]
pub enum MemOp {
    Alloc { size: SubExp, space: Space },
    Kernel(KernelOp),
}

pub type Dec = MemDec;
pub type MemBody = Body<MemOp, Dec>;
pub type MemStm = Stm<MemOp, Dec>;
pub type MemPattern = Pattern<Dec>;
pub type MemFunDef = FunDef<MemOp, Dec>;
pub type MemProgram = Program<MemOp, Dec>;

/// A function parameter carrying an array gets a leading memory-block
/// context parameter, per §4.7 ("every array return becomes accompanied by
/// a leading memory-block context parameter").
pub fn context_param_count(ret_types: &[Type]) -> usize {
    ret_types.iter().filter(|t| t.is_array()).count()
}
