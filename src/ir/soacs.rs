//! SOACS IR (component C5): high-level parallel array combinators. Let-bound
//! names at this level carry only a [`Type`] — no memory decoration yet.

use super::{Body, FunDef, Lambda, Pattern, Program, Stm, SubExp};
use crate::types::Type;

/// At this level every binding's decoration is just its type.
pub type Dec = Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commutativity {
    Commutative,
    Noncommutative,
}

/// The accumulator-chunking form a `Stream` runs its lambda over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOrder {
    /// Sequential: the lambda sees the whole array as one chunk.
    Sequential,
    /// Chunked: the lambda runs once per chunk and folds a carried
    /// accumulator, the form §4.5 rule 4 unfolds against the full width.
    Chunked,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SoacOp {
    Map {
        width: SubExp,
        lambda: Lambda<SoacOp, Dec>,
        inputs: Vec<SubExp>,
    },
    Reduce {
        width: SubExp,
        comm: Commutativity,
        lambda: Lambda<SoacOp, Dec>,
        nes: Vec<SubExp>,
        inputs: Vec<SubExp>,
    },
    Scan {
        width: SubExp,
        lambda: Lambda<SoacOp, Dec>,
        nes: Vec<SubExp>,
        inputs: Vec<SubExp>,
    },
    Filter {
        width: SubExp,
        lambda: Lambda<SoacOp, Dec>,
        inputs: Vec<SubExp>,
    },
    /// A fused map+reduce: the lambda's results are split into `map_ret`
    /// pass-through outputs and the remainder folded with `nes`/reduce
    /// semantics, avoiding materialising the intermediate map result.
    Redomap {
        width: SubExp,
        comm: Commutativity,
        reduce_lambda: Lambda<SoacOp, Dec>,
        map_lambda: Lambda<SoacOp, Dec>,
        nes: Vec<SubExp>,
        inputs: Vec<SubExp>,
    },
    Stream {
        width: SubExp,
        order: StreamOrder,
        lambda: Lambda<SoacOp, Dec>,
        accs: Vec<SubExp>,
        inputs: Vec<SubExp>,
    },
}

impl SoacOp {
    /// The array width (outer dimension) this SOAC iterates over.
    pub fn width(&self) -> SubExp {
        match self {
            SoacOp::Map { width, .. }
            | SoacOp::Reduce { width, .. }
            | SoacOp::Scan { width, .. }
            | SoacOp::Filter { width, .. }
            | SoacOp::Redomap { width, .. }
            | SoacOp::Stream { width, .. } => *width,
        }
    }

    pub fn inputs(&self) -> &[SubExp] {
        match self {
            SoacOp::Map { inputs, .. }
            | SoacOp::Reduce { inputs, .. }
            | SoacOp::Scan { inputs, .. }
            | SoacOp::Filter { inputs, .. }
            | SoacOp::Redomap { inputs, .. }
            | SoacOp::Stream { inputs, .. } => inputs,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            SoacOp::Map { .. } => "map",
            SoacOp::Reduce { .. } => "reduce",
            SoacOp::Scan { .. } => "scan",
            SoacOp::Filter { .. } => "filter",
            SoacOp::Redomap { .. } => "redomap",
            SoacOp::Stream { .. } => "stream",
        }
    }
}

pub type SoacsLambda = Lambda<SoacOp, Dec>;
pub type SoacsBody = Body<SoacOp, Dec>;
pub type SoacsStm = Stm<SoacOp, Dec>;
pub type SoacsPattern = Pattern<Dec>;
pub type SoacsFunDef = FunDef<SoacOp, Dec>;
pub type SoacsProgram = Program<SoacOp, Dec>;
