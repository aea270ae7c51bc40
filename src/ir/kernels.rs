//! Kernels IR (component C6/C7): adds a flat SPMD `Kernel` and a two-level
//! `ReduceKernel` on top of whatever SOACs survived extraction (spec §3.3:
//! "High-level SOACs that survived extraction coexist as potential further
//! targets").

use super::soacs::SoacOp;
use super::{Body, Certs, FunDef, Lambda, Pattern, Program, Stm, SubExp};
use crate::name::Name;
use crate::types::Type;

pub type Dec = Type;

/// One input an SPMD kernel reads: the per-thread lambda parameter it's
/// bound to, and the array it's read from.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelInput {
    pub param: Name,
    pub array: Name,
    pub ty: Type,
}

/// How a kernel's per-thread result becomes the pattern's array output.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelResult {
    /// Each thread writes one element at its own index — a plain
    /// `[num_threads]`-shaped output (what distribution naturally produces).
    ThreadsReturn,
    /// Threads belonging to the same outer group write consecutive ranges,
    /// concatenated along `axis` — this is what loop interchange over a
    /// nested nest produces.
    ConcatReturn { axis: usize },
}

/// A single frame of a distributed map nest (spec §4.5: "kernel nest": an
/// ordered sequence of `MapNesting` frames). The outermost frame is the
/// top-level map that kernel extraction started from.
#[derive(Debug, Clone, PartialEq)]
pub struct MapNesting {
    pub pattern: Pattern<Dec>,
    pub width: SubExp,
    pub thread_index: Name,
    pub params: Vec<KernelInput>,
}

/// A flat SPMD loop: `num_threads` threads indexed `0..num_threads`,
/// produced by flattening a `MapNesting` stack into one combined range
/// (spec §4.5: "lowered to a single flat `Kernel` with a combined
/// thread-index range equal to the product of widths").
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    pub nest: Vec<MapNesting>,
    pub thread_index: Name,
    pub num_threads: SubExp,
    pub inputs: Vec<KernelInput>,
    pub bounds_cert: Certs,
    pub body: Body<KernelOp, Dec>,
    pub returns: Vec<(Type, KernelResult)>,
}

impl Kernel {
    /// Combined iteration space: the product of every nesting level's width,
    /// as the spec's flattening step requires.
    pub fn thread_space_rank(&self) -> usize {
        self.nest.len().max(1)
    }
}

/// The two-stage lowering of `reduce`/`redomap` (component C7).
#[derive(Debug, Clone, PartialEq)]
pub struct ReduceKernel {
    pub num_chunks: SubExp,
    pub group_size: SubExp,
    pub op: Lambda<SoacOp, Dec>,
    /// Stage 1: per-thread sequential fold over `per_thread` consecutive
    /// elements, producing one partial result per thread into fresh storage.
    pub per_thread_body: Body<KernelOp, Dec>,
    /// Stage 2: workgroup-count-1 reduction of the `num_threads` partials.
    pub cross_thread_body: Body<KernelOp, Dec>,
    pub input: Name,
    pub input_len: SubExp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum KernelOp {
    Soac(SoacOp),
    Kernel(Box<Kernel>),
    ReduceKernel(Box<ReduceKernel>),
}

pub type KernelsLambda = Lambda<KernelOp, Dec>;
pub type KernelsBody = Body<KernelOp, Dec>;
pub type KernelsStm = Stm<KernelOp, Dec>;
pub type KernelsPattern = Pattern<Dec>;
pub type KernelsFunDef = FunDef<KernelOp, Dec>;
pub type KernelsProgram = Program<KernelOp, Dec>;
