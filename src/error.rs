//! Error taxonomy (spec §7), modeled on the teacher's `InterpreterError` /
//! `RuntimeError` split: recoverable, protocol-level failures are distinct
//! from bugs the pipeline itself should never produce.

use crate::name::Name;
use std::fmt;
use thiserror::Error;

/// A source location, when one is available. The surface parser/lexer is out
/// of scope (§1); this core only carries spans it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSpan {
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Closed error taxonomy for compilation failures that are not bugs in the
/// compiler itself — mirrors the teacher's `VmValidationError` enum, one
/// variant per condition §7 names.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("type error: {0}")]
    Type(#[from] TypeError),

    #[error("aliasing error: {0}")]
    Aliasing(#[from] AliasingError),

    #[error("shape error: {0}")]
    Shape(#[from] ShapeError),

    #[error("distribution error: {0}")]
    Distribution(#[from] DistributionError),

    /// Front-end/parse errors are surfaced as opaque strings (§7: "external;
    /// surfaced through the core as opaque strings").
    #[error("parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum TypeError {
    #[error("mismatched types: expected {expected}, got {got}")]
    Mismatch { expected: String, got: String },
    #[error("uniqueness violation on {0}: value already consumed")]
    UniquenessViolation(Name),
    #[error("pattern shape mismatch: pattern has {pat_len} elements, expression returns {exp_len}")]
    PatternShapeMismatch { pat_len: usize, exp_len: usize },
    #[error("unknown name {0}")]
    UnknownName(Name),
    #[error("dimension size for {0} is not integral")]
    NonIntegralDimension(Name),
}

#[derive(Debug, Error)]
pub enum AliasingError {
    #[error("use of {0} after it was consumed")]
    UseAfterConsume(Name),
    #[error("unique return of {name} aliases parameter {param}")]
    UniqueReturnAliasesParam { name: Name, param: Name },
    #[error("loop return {0} aliases a name bound outside the loop")]
    LoopReturnAliasesOutsideName(Name),
}

#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("size of {0} is not statically solvable at allocation time")]
    NotStaticallySolvable(Name),
    #[error("allocation inside a kernel has a size that depends on a kernel-bound name ({0}); cannot be hoisted (spec open question, §4.8/§9)")]
    KernelBoundAllocationSize(Name),
}

#[derive(Debug, Error)]
pub enum DistributionError {
    #[error("unbalanced lambda could not be sequentialised: {0}")]
    UnbalancedLambda(String),
    #[error("in-place update aliased inside kernel nest; distribution aborted, nest closed")]
    AliasedUpdateInNest,
}

/// A pass discovered an IR shape that should be impossible under the
/// invariants of the representation it received. This is always a compiler
/// bug, never a user-triggerable condition — analogous to the teacher's
/// `RuntimeError::Halt`.
#[derive(Debug, Error)]
#[error("internal invariant violation in pass `{pass}`: {message}\noffending node:\n{offending_node}")]
pub struct InternalError {
    pub pass: &'static str,
    pub message: String,
    pub offending_node: String,
}

/// Raise an [`InternalError`] with the pretty-printed offending node, per
/// §7 ("includes the offending expression pretty-printed"). Panics under
/// `debug_assertions` (as the teacher's own internal invariants do via
/// `debug_assert!`) so test runs fail loudly and immediately; otherwise
/// returns the error for the caller to propagate.
#[macro_export]
macro_rules! ice {
    ($pass:expr, $node:expr, $($msg:tt)*) => {{
        let message = format!($($msg)*);
        let offending_node = format!("{}", $node);
        if cfg!(debug_assertions) {
            panic!(
                "internal invariant violation in pass `{}`: {}\noffending node:\n{}",
                $pass, message, offending_node
            );
        }
        #[allow(unreachable_code)]
        return Err($crate::error::InternalError {
            pass: $pass,
            message,
            offending_node,
        }
        .into());
    }};
}

/// The local "rule declined to fire" sentinel from §7
/// ("cannotSimplify ... recovered locally"). Never allocates, never escapes a
/// single rule-application call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decline;

pub type SimplifyResult<T> = Result<T, Decline>;

/// Top-level error a pipeline stage can return; a middle-end error aborts the
/// pass and bubbles to the driver with no partial IR emitted (§7).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Internal(#[from] InternalError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_from_type_error() {
        let e: CompileError = TypeError::UnknownName(crate::name::NameSource::new().fresh("x")).into();
        assert!(matches!(e, CompileError::Type(_)));
    }
}
