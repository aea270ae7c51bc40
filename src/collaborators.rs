//! Boundary types for the systems spec §1/§6 names as explicitly out of
//! scope: the surface parser/lexer, the front-end type checker, the
//! interpreter-as-oracle, the concrete C/OpenCL/CUDA emitters, the
//! test-harness driver, and the CLI `Action` dispatch. None of these are
//! implemented here — this module exists so the pipeline is demonstrably
//! pluggable at the seams §6 describes, the same way the teacher exposes
//! `EcalAccess`/`PanicReceivers`-style traits at *its* plug-in boundaries
//! (`fuel-vm/src/interpreter/ecal.rs`) rather than hard-wiring one
//! implementation.
//!
//! Everything in this module is a trait or a plain data boundary type; none
//! of it performs IO or owns pipeline state.

use crate::error::PipelineError;
use crate::ir::imp::ImpProgram;
use crate::ir::kernels::KernelsProgram;
use crate::ir::mem::MemProgram;
use crate::types::Space;
use std::fmt;

/// Which IR level a pipeline consumer expects its input lowered to (§6:
/// "Each backend action declares the IR level it expects"). `SoacsMem` would
/// be the level a CPU backend working straight off `explicit_alloc`'s output
/// wants (no coalescing/expansion needed without a GPU); `KernelsMem` is the
/// level after C9 has run, the level any GPU action needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrLevel {
    SoacsMem,
    KernelsMem,
}

/// The program handed to an [`Action`], already lowered to whatever level it
/// declared it needs. Out of scope: the emitted-program CLI and the
/// interpreter oracle both consume one of these in the full system; this
/// core only needs to describe the shape of the handoff.
pub enum ActionInput {
    Kernels(KernelsProgram),
    Mem(MemProgram),
    Imp(ImpProgram),
}

/// `{ name, description, run: Program -> IOEffect }` (§6). The core never
/// implements an `Action` itself — `print`, `metrics`, `emit-impcode`,
/// `emit-c`, `emit-opencl`, `emit-cuda` are all external collaborators; this
/// trait is the seam a thin CLI dispatches through.
pub trait Action {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// The IR level this action expects; the driver must not call `run`
    /// until the pipeline has been lowered that far.
    fn expects(&self) -> IrLevel;
    fn run(&self, input: ActionInput) -> Result<(), PipelineError>;
}

/// The operations table ImpGen (C10) is parameterised over for any space
/// other than the host default (§4.9, §6: "Backends register their own. The
/// ImpGen core accepts this record and never branches on the tag itself.").
/// A concrete backend (OpenCL, CUDA — both out of scope here) implements
/// this once per device space it supports.
pub trait DeviceOps {
    /// Emit whatever the backend needs to realise a kernel launch; opaque to
    /// the core, which only records that a launch happened
    /// ([`crate::ir::imp::KernelLaunch`]).
    fn compile_launch(&mut self, launch: &crate::ir::imp::KernelLaunch) -> Result<(), PipelineError>;
    fn write_scalar(&mut self, mem: crate::name::Name, offset: i64, value: crate::ir::PrimValue) -> Result<(), PipelineError>;
    fn read_scalar(&mut self, mem: crate::name::Name, offset: i64) -> Result<crate::ir::PrimValue, PipelineError>;
    fn allocate(&mut self, size_bytes: i64, space: Space) -> Result<crate::name::Name, PipelineError>;
    fn copy(&mut self, dst: crate::name::Name, dst_off: i64, src: crate::name::Name, src_off: i64, n_bytes: i64) -> Result<(), PipelineError>;
    /// Backend-side type name for a memory block in this space, used only
    /// for pretty-printing/diagnostics.
    fn memory_type_name(&self, space: Space) -> &'static str;
}

/// A sink for front-end diagnostics (parse errors, surface type errors) the
/// core never produces but must be able to report alongside its own (§7:
/// "Front-end errors abort compilation before any middle-end pass begins").
/// Kept as a trait rather than a concrete logger so a CLI, a language
/// server, and a test harness can each supply their own.
pub trait Diagnostic: fmt::Display {
    fn span(&self) -> Option<crate::error::SourceSpan>;
}

impl Diagnostic for crate::error::CompileError {
    fn span(&self) -> Option<crate::error::SourceSpan> {
        None
    }
}
