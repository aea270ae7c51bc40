//! Coalescing (component C9a): rewrite a kernel's thread-indexed outputs so
//! the per-thread write pattern is contiguous in the fastest-moving index,
//! restoring the original layout afterwards with an explicit copy (spec
//! §4.8, "Coalesce").
//!
//! This pass only ever touches the *outer* binding a kernel's result is
//! pattern-matched into — the kernel's own internals stay at the Kernels
//! (not memory-annotated) level, the same self-referential boundary
//! [`crate::kernel_extract`] and [`crate::blocked_reduce`] already rely on.

use crate::config::PipelineConfig;
use crate::explicit_alloc::{MemBody, MemStm};
use crate::ir::kernels::{KernelOp, KernelResult};
use crate::ir::mem::{MemDec, MemOp};
use crate::ir::{BasicOp, Certs, Exp, PatElem, Pattern, PrimValue, SubExp};
use crate::ixfun::IxFun;
use crate::name::NameSource;
use crate::types::{DimSize, Space};
use tracing::debug;

pub fn coalesce_body(body: &MemBody, names: &mut NameSource, config: &PipelineConfig) -> MemBody {
    let mut out = Vec::new();
    for stm in &body.stms {
        coalesce_stm(stm, names, config, &mut out);
    }
    MemBody { stms: out, result: body.result.clone() }
}

fn coalesce_stm(stm: &MemStm, names: &mut NameSource, config: &PipelineConfig, out: &mut Vec<MemStm>) {
    match &stm.exp {
        Exp::Op(MemOp::Kernel(KernelOp::Kernel(kernel))) => {
            let mut rewritten_elems = Vec::new();
            let mut writebacks = Vec::new();
            for (i, elem) in stm.pattern.elems.iter().enumerate() {
                let wants_coalesce = matches!(kernel.returns.get(i), Some((_, KernelResult::ThreadsReturn))) && elem.dec.ty.rank() >= 2;
                if !wants_coalesce {
                    rewritten_elems.push(elem.clone());
                    continue;
                }
                let shape = static_shape(&elem.dec);
                let (transposed_mem, transposed_ixfun) = fresh_transposed_block(&shape, &elem.dec, names, config.default_space, out);
                let staging = names.fresh("coalesced");
                rewritten_elems.push(PatElem { name: staging, dec: MemDec::array(elem.dec.ty.clone(), transposed_mem, transposed_ixfun) });
                writebacks.push((elem.name, staging, elem.dec.clone()));
            }
            out.push(MemStm {
                pattern: Pattern { elems: rewritten_elems },
                certs: stm.certs.clone(),
                exp: Exp::Op(MemOp::Kernel(KernelOp::Kernel(kernel.clone()))),
            });
            for (dest, staging, dest_dec) in writebacks {
                debug!(dest = %dest, "appending writeback copy to restore coalesced kernel output's original layout");
                out.push(MemStm {
                    pattern: Pattern { elems: vec![PatElem { name: dest, dec: dest_dec }] },
                    certs: Certs::default(),
                    exp: Exp::BasicOp(BasicOp::Copy(staging)),
                });
            }
        }
        Exp::If { cond, then_body, else_body } => out.push(MemStm {
            pattern: stm.pattern.clone(),
            certs: stm.certs.clone(),
            exp: Exp::If {
                cond: *cond,
                then_body: Box::new(coalesce_body(then_body, names, config)),
                else_body: Box::new(coalesce_body(else_body, names, config)),
            },
        }),
        Exp::DoLoop { merge, form, body } => out.push(MemStm {
            pattern: stm.pattern.clone(),
            certs: stm.certs.clone(),
            exp: Exp::DoLoop { merge: merge.clone(), form: form.clone(), body: Box::new(coalesce_body(body, names, config)) },
        }),
        _ => out.push(stm.clone()),
    }
}

fn static_shape(dec: &MemDec) -> Vec<i64> {
    dec.ty
        .as_array()
        .expect("coalescing only ever runs on array-typed pattern elements")
        .shape
        .0
        .iter()
        .map(|d| match d {
            DimSize::Const(n) => *n as i64,
            _ => panic!("internal invariant violation: a kernel's concrete output shape must be fully static by the time coalescing runs"),
        })
        .collect()
}

/// `permute(iota(permuted_shape), inverse_perm)` where `perm = [1..rank-1, 0]`
/// (spec §4.8): the outer axis becomes the fastest-moving one, so threads
/// writing consecutive outer indices land on consecutive memory addresses.
fn fresh_transposed_block(shape: &[i64], dec: &MemDec, names: &mut NameSource, space: Space, out: &mut Vec<MemStm>) -> (crate::name::Name, IxFun) {
    let rank = shape.len();
    let perm: Vec<usize> = (1..rank).chain(std::iter::once(0)).collect();
    let permuted_shape: Vec<i64> = perm.iter().map(|&i| shape[i]).collect();
    let inverse_perm = inverse_permutation(&perm);
    let ixfun = IxFun::iota(&permuted_shape).permute(&inverse_perm);

    let elem_size = dec.ty.as_array().unwrap().elem.size_bytes() as i64;
    let total_elems: i64 = shape.iter().product();
    let size = SubExp::Constant(PrimValue::I64((total_elems * elem_size).max(1)));
    let mem = names.fresh("mem_coalesce");
    out.push(MemStm {
        pattern: Pattern { elems: vec![PatElem { name: mem, dec: MemDec::scalar(crate::types::Type::Tuple(vec![])) }] },
        certs: Certs::default(),
        exp: Exp::Op(MemOp::Alloc { size, space }),
    });
    (mem, ixfun)
}

fn inverse_permutation(perm: &[usize]) -> Vec<usize> {
    let mut inv = vec![0usize; perm.len()];
    for (i, &p) in perm.iter().enumerate() {
        inv[p] = i;
    }
    inv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::kernels::{Kernel, MapNesting};
    use crate::types::{ArrayType, PrimType, Shape, Type, Uniqueness};

    fn arr2(outer: u64, inner: u64) -> Type {
        Type::Array(ArrayType {
            elem: PrimType::Signed(crate::types::IntWidth::W32),
            shape: Shape(vec![DimSize::Const(outer), DimSize::Const(inner)]),
            uniqueness: Uniqueness::Nonunique,
        })
    }

    #[test]
    fn threads_return_2d_output_is_transposed_and_written_back() {
        let mut names = NameSource::new();
        let thread_index = names.fresh("tid");
        let out_name = names.fresh("kernel_out");
        let kernel = Kernel {
            nest: vec![MapNesting {
                pattern: Pattern { elems: vec![] },
                width: SubExp::Constant(PrimValue::I64(4)),
                thread_index,
                params: vec![],
            }],
            thread_index,
            num_threads: SubExp::Constant(PrimValue::I64(4)),
            inputs: vec![],
            bounds_cert: Certs::default(),
            body: crate::ir::Body::new(vec![]),
            returns: vec![(arr2(4, 8), KernelResult::ThreadsReturn)],
        };
        let stm: MemStm = crate::ir::Stm {
            pattern: Pattern { elems: vec![PatElem { name: out_name, dec: MemDec::array(arr2(4, 8), names.fresh("mem0"), IxFun::iota(&[4, 8])) }] },
            certs: Certs::default(),
            exp: Exp::Op(MemOp::Kernel(KernelOp::Kernel(Box::new(kernel)))),
        };
        let body = MemBody { stms: vec![stm], result: vec![SubExp::Var(out_name)] };
        let config = PipelineConfig::default();
        let coalesced = coalesce_body(&body, &mut names, &config);

        // alloc (transposed block) + rewritten kernel stm + writeback copy
        assert_eq!(coalesced.stms.len(), 3);
        assert!(matches!(coalesced.stms[0].exp, Exp::Op(MemOp::Alloc { .. })));
        assert!(matches!(coalesced.stms[1].exp, Exp::Op(MemOp::Kernel(KernelOp::Kernel(_)))));
        match &coalesced.stms[2].exp {
            Exp::BasicOp(BasicOp::Copy(_)) => {}
            other => panic!("expected a writeback copy, got {other:?}"),
        }
        assert_eq!(coalesced.stms[2].pattern.elems[0].name, out_name, "writeback must land on the original output name");
    }
}
