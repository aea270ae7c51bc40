//! Allocation expansion (component C9b): hoist loop-invariant allocations
//! out of `DoLoop` bodies by multiplying their size by the iteration count
//! and rebasing every index function that referred to the original block
//! (spec §4.8, "Expand").
//!
//! The spec frames this pass over *kernel*-body-local allocations (size free
//! w.r.t. the kernel's own parameters). In this IR, a kernel's internals
//! never carry memory decoration in the first place — [`crate::ir::kernels`]
//! fixes `Kernel::body`/`ReduceKernel::per_thread_body` at the Kernels
//! (`Dec = Type`) level regardless of what wraps them, mirroring how a
//! SOAC's lambda always stays at the SOACS level. There is no `Alloc`
//! statement inside a kernel body for this pass to find. The same hoist is
//! still meaningful one level up: a `DoLoop` whose body re-allocates the
//! same loop-invariant block on every iteration is expanded the same way,
//! with the loop's trip count standing in for `num_threads` and the loop
//! variable standing in for `thread_index`.

use crate::explicit_alloc::{MemBody, MemStm};
use crate::ir::mem::{MemBind, MemDec, MemOp};
use crate::ir::{BasicOp, BinOp, Certs, Exp, LoopForm, PatElem, Pattern, SubExp};
use crate::name::{Name, NameSource};
use crate::types::{IntWidth, PrimType, Type};
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub fn expand_allocations_body(body: &MemBody, names: &mut NameSource) -> MemBody {
    let mut out = Vec::new();
    for stm in &body.stms {
        expand_stm(stm, names, &mut out);
    }
    MemBody { stms: out, result: body.result.clone() }
}

fn expand_stm(stm: &MemStm, names: &mut NameSource, out: &mut Vec<MemStm>) {
    match &stm.exp {
        Exp::DoLoop { merge, form: LoopForm::For { index, bound }, body } => {
            let invariant = find_invariant_allocs(body, *index);
            if invariant.is_empty() {
                out.push(MemStm {
                    pattern: stm.pattern.clone(),
                    certs: stm.certs.clone(),
                    exp: Exp::DoLoop {
                        merge: merge.clone(),
                        form: LoopForm::For { index: *index, bound: *bound },
                        body: Box::new(expand_allocations_body(body, names)),
                    },
                });
                return;
            }

            let mut rebase: HashMap<Name, Name> = HashMap::new();
            let mut remaining = Vec::new();
            for inner in &body.stms {
                let orig_mem = inner.pattern.elems.first().map(|e| e.name);
                match (&inner.exp, orig_mem) {
                    (Exp::Op(MemOp::Alloc { size, space }), Some(mem_name)) if invariant.contains(&mem_name) => {
                        let product = names.fresh("hoisted_size");
                        out.push(MemStm {
                            pattern: Pattern { elems: vec![PatElem { name: product, dec: MemDec::scalar(i64_ty()) }] },
                            certs: Certs::default(),
                            exp: Exp::BasicOp(BasicOp::BinOp(BinOp::Mul, *size, *bound)),
                        });
                        let hoisted_mem = names.fresh("mem_expanded");
                        out.push(MemStm {
                            pattern: Pattern { elems: vec![PatElem { name: hoisted_mem, dec: MemDec::scalar(Type::Tuple(vec![])) }] },
                            certs: inner.certs.clone(),
                            exp: Exp::Op(MemOp::Alloc { size: SubExp::Var(product), space: *space }),
                        });
                        debug!(orig = %mem_name, hoisted = %hoisted_mem, "hoisted loop-invariant allocation out of DoLoop body");
                        rebase.insert(mem_name, hoisted_mem);
                    }
                    _ => remaining.push(rebase_stm(inner, &rebase, *index)),
                }
            }

            let rebased_pattern = Pattern {
                elems: stm.pattern.elems.iter().map(|e| PatElem { name: e.name, dec: rebase_dec(&e.dec, &rebase, *index) }).collect(),
            };
            let inner_body = expand_allocations_body(&MemBody { stms: remaining, result: body.result.clone() }, names);
            out.push(MemStm {
                pattern: rebased_pattern,
                certs: stm.certs.clone(),
                exp: Exp::DoLoop { merge: merge.clone(), form: LoopForm::For { index: *index, bound: *bound }, body: Box::new(inner_body) },
            });
        }
        Exp::DoLoop { merge, form, body } => out.push(MemStm {
            pattern: stm.pattern.clone(),
            certs: stm.certs.clone(),
            exp: Exp::DoLoop { merge: merge.clone(), form: form.clone(), body: Box::new(expand_allocations_body(body, names)) },
        }),
        Exp::If { cond, then_body, else_body } => out.push(MemStm {
            pattern: stm.pattern.clone(),
            certs: stm.certs.clone(),
            exp: Exp::If {
                cond: *cond,
                then_body: Box::new(expand_allocations_body(then_body, names)),
                else_body: Box::new(expand_allocations_body(else_body, names)),
            },
        }),
        _ => out.push(stm.clone()),
    }
}

fn rebase_dec(dec: &MemDec, rebase: &HashMap<Name, Name>, thread_var: Name) -> MemDec {
    match &dec.mem {
        Some(MemBind { mem, ixfun }) if rebase.contains_key(mem) => {
            let new_base = rebase[mem];
            let stride: i64 = ixfun.shape().iter().product::<i64>().max(1);
            MemDec { ty: dec.ty.clone(), mem: Some(MemBind { mem: new_base, ixfun: ixfun.rebase(stride, thread_var) }) }
        }
        _ => dec.clone(),
    }
}

fn rebase_stm(stm: &MemStm, rebase: &HashMap<Name, Name>, thread_var: Name) -> MemStm {
    if rebase.is_empty() {
        return stm.clone();
    }
    MemStm {
        pattern: Pattern { elems: stm.pattern.elems.iter().map(|e| PatElem { name: e.name, dec: rebase_dec(&e.dec, rebase, thread_var) }).collect() },
        certs: stm.certs.clone(),
        exp: stm.exp.clone(),
    }
}

/// An `Alloc`'s size is loop-invariant iff it doesn't mention the loop
/// variable — a conservative syntactic check, since the multiply-out
/// transform is only sound when the size is closed w.r.t. the iteration
/// (spec §4.8: "an allocation whose size depends on a kernel-bound name is
/// rejected", generalised here to the loop-bound name).
fn find_invariant_allocs(body: &MemBody, index: Name) -> HashSet<Name> {
    let mut out = HashSet::new();
    for stm in &body.stms {
        if let (Some(elem), Exp::Op(MemOp::Alloc { size, .. })) = (stm.pattern.elems.first(), &stm.exp) {
            if !matches!(size, SubExp::Var(n) if *n == index) {
                out.insert(elem.name);
            }
        }
    }
    out
}

fn i64_ty() -> Type {
    Type::Prim(PrimType::Signed(IntWidth::W64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Param, PrimValue, Stm};
    use crate::ixfun::IxFun;

    #[test]
    fn loop_invariant_alloc_is_hoisted_and_rebased() {
        let mut names = NameSource::new();
        let index = names.fresh("i");
        let merge_param = names.fresh("acc");
        let mem = names.fresh("mem_in_loop");
        let scratch = names.fresh("scratch");
        let size = SubExp::Constant(PrimValue::I64(64));
        let loop_body = MemBody {
            stms: vec![
                Stm {
                    pattern: Pattern { elems: vec![PatElem { name: mem, dec: MemDec::scalar(Type::Tuple(vec![])) }] },
                    certs: Certs::default(),
                    exp: Exp::Op(MemOp::Alloc { size, space: crate::types::Space::Default }),
                },
                Stm {
                    pattern: Pattern { elems: vec![PatElem { name: scratch, dec: MemDec::array(i64_ty(), mem, IxFun::iota(&[8])) }] },
                    certs: Certs::default(),
                    exp: Exp::SubExp(SubExp::Var(merge_param)),
                },
            ],
            result: vec![SubExp::Var(merge_param)],
        };
        let loop_out = names.fresh("loop_out");
        let stm: MemStm = Stm {
            pattern: Pattern { elems: vec![PatElem { name: loop_out, dec: MemDec::scalar(i64_ty()) }] },
            certs: Certs::default(),
            exp: Exp::DoLoop {
                merge: vec![(Param { name: merge_param, dec: MemDec::scalar(i64_ty()) }, SubExp::Constant(PrimValue::I64(0)))],
                form: LoopForm::For { index, bound: SubExp::Constant(PrimValue::I64(10)) },
                body: Box::new(loop_body),
            },
        };
        let body = MemBody { stms: vec![stm], result: vec![SubExp::Var(loop_out)] };
        let expanded = expand_allocations_body(&body, &mut names);

        // hoisted_size mul + hoisted alloc, then the (rewritten) DoLoop
        assert_eq!(expanded.stms.len(), 3);
        assert!(matches!(expanded.stms[0].exp, Exp::BasicOp(BasicOp::BinOp(BinOp::Mul, ..))));
        assert!(matches!(expanded.stms[1].exp, Exp::Op(MemOp::Alloc { .. })));
        match &expanded.stms[2].exp {
            Exp::DoLoop { body, .. } => {
                // the in-loop alloc is gone, leaving just the passthrough statement
                assert_eq!(body.stms.len(), 1);
                let rebased = body.stms[0].pattern.elems[0].dec.mem.as_ref().expect("scratch keeps a mem bind");
                assert_ne!(rebased.mem, mem, "rebased bind must point at the hoisted block, not the original");
            }
            other => panic!("expected a DoLoop, got {other:?}"),
        }
    }
}
