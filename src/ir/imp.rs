//! ImpCode (component C10): the imperative IR emitted by [`crate::impgen`].
//! Unlike every earlier level this is not a let-binding tree — it is a
//! sequence of statements over scalar variables and named memory blocks,
//! the form a concrete C/OpenCL/CUDA emitter (out of scope, §1) would walk
//! directly.

use crate::ixfun::IxFun;
use crate::name::Name;
use crate::types::{PrimType, Space};
use std::fmt;

/// A scalar expression inside ImpCode: constants, variable reads, and
/// binary/unary arithmetic, matching the vocabulary needed to compute index
/// function offsets and loop bounds.
#[derive(Debug, Clone, PartialEq)]
pub enum ImpExp {
    ConstI64(i64),
    ConstF32(f32),
    ConstF64(f64),
    ConstBool(bool),
    Var(Name),
    BinOp(crate::ir::BinOp, Box<ImpExp>, Box<ImpExp>),
    UnOp(crate::ir::UnOp, Box<ImpExp>),
}

impl fmt::Display for ImpExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImpExp::ConstI64(v) => write!(f, "{v}"),
            ImpExp::ConstF32(v) => write!(f, "{v}f32"),
            ImpExp::ConstF64(v) => write!(f, "{v}f64"),
            ImpExp::ConstBool(v) => write!(f, "{v}"),
            ImpExp::Var(n) => write!(f, "{n}"),
            ImpExp::BinOp(op, a, b) => write!(f, "({a} {op:?} {b})"),
            ImpExp::UnOp(op, a) => write!(f, "({op:?} {a})"),
        }
    }
}

/// An opaque, backend-specific operation — the one place ImpCode defers to
/// a pluggable backend (spec §4.9, §6): a kernel launch. The ImpGen core
/// never branches on what's inside; it just records that a launch happens
/// here with these parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelLaunch {
    pub kernel_name: Name,
    pub num_threads: ImpExp,
    pub args: Vec<Name>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    DeclareScalar { name: Name, ty: PrimType },
    DeclareMem { name: Name, space: Space },
    Allocate { mem: Name, size: ImpExp, space: Space },
    SetScalar { target: Name, value: ImpExp },
    Write { mem: Name, offset: ImpExp, ty: PrimType, space: Space, value: ImpExp },
    Index { target: Name, mem: Name, offset: ImpExp, ty: PrimType, space: Space },
    /// Bulk copy of `n_bytes` between two (mem, byte-offset) pairs, emitted
    /// whenever both sides are `linearWithOffset` (§4.9).
    Copy {
        dst_mem: Name,
        dst_offset: ImpExp,
        src_mem: Name,
        src_offset: ImpExp,
        n_bytes: ImpExp,
    },
    For { index: Name, bound: ImpExp, body: Vec<Stmt> },
    While { cond: Name, body: Vec<Stmt> },
    If { cond: ImpExp, then_branch: Vec<Stmt>, else_branch: Vec<Stmt> },
    /// Backend-opaque operation; see [`KernelLaunch`].
    Op(KernelLaunch),
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::DeclareScalar { name, ty } => write!(f, "decl {name}: {ty}"),
            Stmt::DeclareMem { name, space } => write!(f, "decl {name}: mem[{space}]"),
            Stmt::Allocate { mem, size, space } => write!(f, "{mem} = alloc({size}, {space})"),
            Stmt::SetScalar { target, value } => write!(f, "{target} = {value}"),
            Stmt::Write { mem, offset, value, .. } => write!(f, "{mem}[{offset}] = {value}"),
            Stmt::Index { target, mem, offset, .. } => write!(f, "{target} = {mem}[{offset}]"),
            Stmt::Copy { dst_mem, dst_offset, src_mem, src_offset, n_bytes } => {
                write!(f, "copy({dst_mem}+{dst_offset}, {src_mem}+{src_offset}, {n_bytes} bytes)")
            }
            Stmt::For { index, bound, body } => write!(f, "for {index} < {bound} {{ {} stmts }}", body.len()),
            Stmt::While { cond, body } => write!(f, "while {cond} {{ {} stmts }}", body.len()),
            Stmt::If { cond, .. } => write!(f, "if {cond} {{ .. }}"),
            Stmt::Op(launch) => write!(f, "launch {} <{} threads>", launch.kernel_name, launch.num_threads),
        }
    }
}

/// A compiled function: its ImpCode statement body plus declared parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpFunction {
    pub name: Name,
    pub params: Vec<Name>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImpProgram {
    pub functions: Vec<ImpFunction>,
}

/// Memory-block layout info ImpGen needs at a use site: which space it's in
/// and (if known) a closed-form index function, used to decide between a
/// bulk `Copy` and an elementwise loop nest (§4.9).
#[derive(Debug, Clone, PartialEq)]
pub struct MemLayout {
    pub space: Space,
    pub ixfun: IxFun,
}
