//! `nestc`: the middle-end IR tower for a statically-typed, purely
//! functional, data-parallel array language.
//!
//! This crate is a library, not a compiler binary — it has no `main` and no
//! surface-syntax front end. It picks up the pipeline at a typed SOACS
//! program (component C2/C5) and lowers it, stage by stage, through the
//! representations spec §2 lays out:
//!
//! ```text
//! SOACS  --[kernel_extract]-->  Kernels  --[explicit_alloc]-->  KernelsMem
//!        --[coalesce, expand_alloc]-->  KernelsMem  --[impgen]-->  ImpCode
//! ```
//!
//! Every stage is a plain function over [`ir::Program`]/[`ir::Body`]
//! generic in its operation and decoration types; there is no driver loop
//! in this crate; callers (the CLI `Action` dispatch, or a test harness)
//! sequence the stages themselves, exactly as the out-of-scope collaborators
//! in [`collaborators`] describe.

pub mod blocked_reduce;
pub mod builder;
pub mod coalesce;
pub mod collaborators;
pub mod config;
pub mod decoration;
pub mod error;
pub mod expand_alloc;
pub mod explicit_alloc;
pub mod impgen;
pub mod ir;
pub mod ixfun;
pub mod kernel_extract;
pub mod name;
pub mod scope;
pub mod simplify;
pub mod subst;
pub mod types;
pub mod usage;

pub use config::PipelineConfig;
pub use error::{CompileError, InternalError, PipelineError};
pub use name::NameSource;
