//! Blocked (two-stage) reduction lowering (component C7): a `reduce` is
//! replaced by a per-thread sequential fold over a contiguous chunk,
//! followed by a second fold of the per-thread partials down to one value —
//! the same associative operator run at two granularities (spec §4.6).
//!
//! Both stages are themselves expressed as a (now small, trivially
//! sequential) `SoacOp::Reduce` over the same lambda: the operator never
//! needs to be re-expressed as a free-standing callable, since this IR has
//! no such thing — a SOAC's lambda only ever appears inlined into a SOAC.

use crate::config::PipelineConfig;
use crate::ir::kernels::{KernelOp, KernelsBody, KernelsStm, ReduceKernel};
use crate::ir::soacs::{Commutativity, SoacOp, SoacsLambda};
use crate::ir::{BasicOp, BinOp, Certs, Exp, PatElem, Pattern, PrimValue, SubExp};
use crate::name::NameSource;
use crate::types::{IntWidth, PrimType, Type};
use tracing::debug;

/// Walk a Kernels-level body, replacing every single-input `Reduce` with its
/// two-stage [`ReduceKernel`] lowering. Recurses into kernel bodies,
/// branches, and loops so a reduce nested inside a distributed map nest is
/// also lowered.
pub fn lower_reduces_body(body: &KernelsBody, names: &mut NameSource, config: &PipelineConfig) -> KernelsBody {
    KernelsBody {
        stms: body.stms.iter().map(|stm| lower_stm(stm, names, config)).collect(),
        result: body.result.clone(),
    }
}

fn lower_stm(stm: &KernelsStm, names: &mut NameSource, config: &PipelineConfig) -> KernelsStm {
    let pattern = stm.pattern.clone();
    let certs = stm.certs.clone();
    match &stm.exp {
        Exp::Op(KernelOp::Soac(SoacOp::Reduce { width, comm, lambda, nes, inputs })) if inputs.len() == 1 => {
            let rk = build_reduce_kernel(*width, *comm, lambda, nes, inputs[0], names, config);
            KernelsStm { pattern, certs, exp: Exp::Op(KernelOp::ReduceKernel(Box::new(rk))) }
        }
        Exp::Op(KernelOp::Kernel(k)) => {
            let mut k = k.clone();
            k.body = lower_reduces_body(&k.body, names, config);
            KernelsStm { pattern, certs, exp: Exp::Op(KernelOp::Kernel(k)) }
        }
        Exp::If { cond, then_body, else_body } => KernelsStm {
            pattern,
            certs,
            exp: Exp::If {
                cond: *cond,
                then_body: Box::new(lower_reduces_body(then_body, names, config)),
                else_body: Box::new(lower_reduces_body(else_body, names, config)),
            },
        },
        Exp::DoLoop { merge, form, body } => KernelsStm {
            pattern,
            certs,
            exp: Exp::DoLoop { merge: merge.clone(), form: form.clone(), body: Box::new(lower_reduces_body(body, names, config)) },
        },
        other => KernelsStm { pattern, certs, exp: other.clone() },
    }
}

fn i64_ty() -> Type {
    Type::Prim(PrimType::Signed(IntWidth::W64))
}

fn build_reduce_kernel(
    width: SubExp,
    comm: Commutativity,
    lambda: &SoacsLambda,
    nes: &[SubExp],
    input: SubExp,
    names: &mut NameSource,
    config: &PipelineConfig,
) -> ReduceKernel {
    let input_name = input
        .as_name()
        .unwrap_or_else(|| panic!("internal invariant violation: reduce input must be an array name, got a literal"));
    let num_chunks = SubExp::Constant(PrimValue::I64(config.default_num_chunks as i64));
    let group_size = SubExp::Constant(PrimValue::I64(config.default_group_size as i64));
    let ret_ty = lambda.ret_types[0].clone();

    // Stage 1: thread-local width (`width / num_chunks`, floor) is computed
    // symbolically here; ImpGen resolves it to a concrete division once
    // `num_chunks` and `width` are both known scalars (§4.9).
    let per_thread_width = names.fresh("per_thread_width");
    let per_thread_out = names.fresh("partial");
    let per_thread_body = KernelsBody {
        stms: vec![
            KernelsStm {
                pattern: Pattern { elems: vec![PatElem { name: per_thread_width, dec: i64_ty() }] },
                certs: Certs::default(),
                exp: Exp::BasicOp(BasicOp::BinOp(BinOp::UDiv, width, num_chunks)),
            },
            KernelsStm {
                pattern: Pattern { elems: vec![PatElem { name: per_thread_out, dec: ret_ty.clone() }] },
                certs: Certs::default(),
                exp: Exp::Op(KernelOp::Soac(SoacOp::Reduce {
                    width: SubExp::Var(per_thread_width),
                    comm,
                    lambda: lambda.clone(),
                    nes: nes.to_vec(),
                    inputs: vec![SubExp::Var(input_name)],
                })),
            },
        ],
        result: vec![SubExp::Var(per_thread_out)],
    };

    // Stage 2: fold the `num_chunks` per-thread partials, gathered by the
    // kernel launch into `partials_arr` the same way a kernel's `inputs`
    // bind array names without an explicit declaring statement in-body.
    let partials_arr = names.fresh("partials_arr");
    let cross_out = names.fresh("reduced");
    let cross_thread_body = KernelsBody {
        stms: vec![KernelsStm {
            pattern: Pattern { elems: vec![PatElem { name: cross_out, dec: ret_ty }] },
            certs: Certs::default(),
            exp: Exp::Op(KernelOp::Soac(SoacOp::Reduce {
                width: num_chunks,
                comm,
                lambda: lambda.clone(),
                nes: nes.to_vec(),
                inputs: vec![SubExp::Var(partials_arr)],
            })),
        }],
        result: vec![SubExp::Var(cross_out)],
    };

    debug!(num_chunks = ?num_chunks, group_size = ?group_size, "blocked reduction lowered to two stages");

    ReduceKernel {
        num_chunks,
        group_size,
        op: lambda.clone(),
        per_thread_body,
        cross_thread_body,
        input: input_name,
        input_len: width,
    }
}
