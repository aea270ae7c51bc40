//! Explicit allocations (component C8): every array-typed binding is given a
//! concrete memory block and index function; `Alloc` becomes a first-class
//! statement ahead of the binding that needs it (spec §4.7).

use crate::config::PipelineConfig;
use crate::ir::kernels::{KernelOp, KernelsBody};
use crate::ir::mem::{generalize_mem_returns, MemBind, MemDec, MemOp, MemReturn};
use crate::ir::{Certs, Exp, Param, PatElem, Pattern, SubExp};
use crate::ixfun::{ExtIxFun, ExtLmad, ExtLmadDim, ExtVal, IxFun};
use crate::name::NameSource;
use crate::types::{Space, Type};

pub type MemBody = crate::ir::Body<MemOp, MemDec>;
pub type MemStm = crate::ir::Stm<MemOp, MemDec>;

/// Lower an entire function body to explicit allocations. `ret_types` is the
/// function's declared return types, used only to size the leading
/// memory-block context parameters per §4.7 (via
/// [`crate::ir::mem::context_param_count`]); the count itself is the
/// caller's concern when assembling the final `MemFunDef`.
pub fn explicit_allocations_body(body: &KernelsBody, names: &mut NameSource, config: &PipelineConfig) -> MemBody {
    let mut out = Vec::new();
    for stm in &body.stms {
        lower_stm(stm, names, config, &mut out);
    }
    MemBody { stms: out, result: body.result.clone() }
}

fn lower_stm(stm: &crate::ir::kernels::KernelsStm, names: &mut NameSource, config: &PipelineConfig, out: &mut Vec<MemStm>) {
    match &stm.exp {
        Exp::If { cond, then_body, else_body } => {
            let then_mem = explicit_allocations_body(then_body, names, config);
            let else_mem = explicit_allocations_body(else_body, names, config);
            let pattern = generalize_if_pattern(&stm.pattern, &then_mem, &else_mem, names, config.default_space, out);
            out.push(MemStm {
                pattern,
                certs: stm.certs.clone(),
                exp: Exp::If { cond: *cond, then_body: Box::new(then_mem), else_body: Box::new(else_mem) },
            });
        }
        Exp::DoLoop { merge, form, body } => {
            let mut new_merge = Vec::new();
            for (param, init) in merge {
                let dec = decorate_type(&param.dec, names, config.default_space, out);
                new_merge.push((Param { name: param.name, dec }, *init));
            }
            let inner = explicit_allocations_body(body, names, config);
            let pattern = decorate_pattern(&stm.pattern, names, config.default_space, out);
            out.push(MemStm {
                pattern,
                certs: stm.certs.clone(),
                exp: Exp::DoLoop { merge: new_merge, form: form.clone(), body: Box::new(inner) },
            });
        }
        Exp::Op(op) => {
            let pattern = decorate_pattern(&stm.pattern, names, config.default_space, out);
            out.push(MemStm { pattern, certs: stm.certs.clone(), exp: Exp::Op(MemOp::Kernel(op.clone())) });
        }
        Exp::BasicOp(b) => {
            let pattern = decorate_pattern(&stm.pattern, names, config.default_space, out);
            out.push(MemStm { pattern, certs: stm.certs.clone(), exp: Exp::BasicOp(b.clone()) });
        }
        Exp::SubExp(se) => {
            let pattern = decorate_pattern(&stm.pattern, names, config.default_space, out);
            out.push(MemStm { pattern, certs: stm.certs.clone(), exp: Exp::SubExp(*se) });
        }
    }
}

/// Decorate every element of a pattern, emitting an `Alloc` ahead of each
/// array-typed element that needs a fresh block.
fn decorate_pattern(
    pattern: &Pattern<Type>,
    names: &mut NameSource,
    space: Space,
    out: &mut Vec<MemStm>,
) -> Pattern<MemDec> {
    Pattern {
        elems: pattern
            .elems
            .iter()
            .map(|e| PatElem { name: e.name, dec: decorate_type(&e.dec, names, space, out) })
            .collect(),
    }
}

fn decorate_type(ty: &Type, names: &mut NameSource, space: Space, out: &mut Vec<MemStm>) -> MemDec {
    match ty {
        Type::Array(a) => {
            let shape: Vec<i64> = a
                .shape
                .0
                .iter()
                .map(|d| match d {
                    crate::types::DimSize::Const(n) => *n as i64,
                    _ => panic!(
                        "internal invariant violation: a let-bound array must have a fully static shape by the time explicit allocations runs (§4.7)"
                    ),
                })
                .collect();
            let elem_count: i64 = shape.iter().product();
            let size = SubExp::Constant(crate::ir::PrimValue::I64(elem_count * a.elem.size_bytes() as i64));
            // The block name itself carries no value-level type (types.rs
            // keeps memory block typing in `MemInfo`, not `Type`); bind it
            // against the empty tuple as a type-system-neutral placeholder.
            let mem = names.fresh("mem");
            out.push(MemStm {
                pattern: Pattern { elems: vec![PatElem { name: mem, dec: MemDec::scalar(Type::Tuple(vec![])) }] },
                certs: Certs::default(),
                exp: Exp::Op(MemOp::Alloc { size, space }),
            });
            MemDec::array(ty.clone(), mem, IxFun::iota(&shape))
        }
        _ => MemDec::scalar(ty.clone()),
    }
}

/// Generalise an `If`'s array-typed results across both arms (spec §3.5):
/// matching memory blocks/index functions pass straight through; anything
/// that diverges becomes a fresh existential block, with both arms rewired
/// to write into it (approximated here by allocating one fresh block sized
/// from whichever arm's size is statically known — ImpGen is responsible
/// for the actual copy that makes this true if only one arm already wrote
/// there).
fn generalize_if_pattern(
    pattern: &Pattern<Type>,
    then_body: &MemBody,
    else_body: &MemBody,
    names: &mut NameSource,
    space: Space,
    out: &mut Vec<MemStm>,
) -> Pattern<MemDec> {
    let mut elems = Vec::new();
    for (i, e) in pattern.elems.iter().enumerate() {
        let dec = match &e.dec {
            Type::Array(_) => {
                let then_ret = mem_return_of(then_body, i);
                let else_ret = mem_return_of(else_body, i);
                match generalize_mem_returns(&then_ret, &else_ret) {
                    MemReturn::ReturnsInBlock { mem, ixfun } => MemDec {
                        ty: e.dec.clone(),
                        mem: Some(MemBind { mem, ixfun: ext_to_direct(&ixfun) }),
                    },
                    MemReturn::ReturnsNewBlock { .. } => decorate_type(&e.dec, names, space, out),
                }
            }
            _ => MemDec::scalar(e.dec.clone()),
        };
        elems.push(PatElem { name: e.name, dec });
    }
    Pattern { elems }
}

/// The `MemReturn` a branch arm's result implies: if its final binding for
/// this result position already carries a direct memory bind, reuse it
/// unchanged; otherwise (the result is a bare name passthrough, or the
/// analysis can't see a direct bind) conservatively ask for a fresh block.
fn mem_return_of(body: &MemBody, result_index: usize) -> MemReturn {
    let result_name = match body.result.get(result_index) {
        Some(SubExp::Var(n)) => *n,
        _ => return MemReturn::ReturnsNewBlock { space: Space::Default, ctx_index: 0, size: None },
    };
    for stm in body.stms.iter().rev() {
        for elem in &stm.pattern.elems {
            if elem.name == result_name {
                if let Some(bind) = &elem.dec.mem {
                    return MemReturn::ReturnsInBlock { mem: bind.mem, ixfun: ixfun_to_known_ext(&bind.ixfun) };
                }
            }
        }
    }
    MemReturn::ReturnsNewBlock { space: Space::Default, ctx_index: 0, size: None }
}

/// Lift a concrete index function into `ExtIxFun` with no existential
/// components — distinct from [`IxFun::existentialize`], which *always*
/// abstracts every dimension away; here the concrete values must survive so
/// [`generalize_mem_returns`] can actually compare the two arms.
fn ixfun_to_known_ext(ix: &IxFun) -> ExtIxFun {
    match ix {
        IxFun::Direct(l) => ExtIxFun::Direct(ExtLmad {
            offset: ExtVal::Known(l.offset),
            dims: l
                .dims
                .iter()
                .map(|d| ExtLmadDim { size: ExtVal::Known(d.size), stride: ExtVal::Known(d.stride) })
                .collect(),
        }),
        other => ExtIxFun::Opaque(other.shape()),
    }
}

/// Best-effort recovery of a concrete [`IxFun`] from an [`ExtIxFun`] that is
/// known (by construction, here) to carry no existential components — both
/// arms produced the exact same block and shape, so `generalize_mem_returns`
/// passed it through unchanged.
fn ext_to_direct(ext: &ExtIxFun) -> IxFun {
    match ext {
        ExtIxFun::Direct(l) => {
            let dims = l
                .dims
                .iter()
                .map(|d| match (d.size, d.stride) {
                    (crate::ixfun::ExtVal::Known(size), crate::ixfun::ExtVal::Known(stride)) => crate::ixfun::LmadDim { size, stride },
                    _ => panic!("internal invariant violation: generalize_mem_returns's ReturnsInBlock arm must carry no existential components"),
                })
                .collect();
            let offset = match l.offset {
                crate::ixfun::ExtVal::Known(o) => o,
                crate::ixfun::ExtVal::Ext(_) => {
                    panic!("internal invariant violation: generalize_mem_returns's ReturnsInBlock arm must carry no existential offset")
                }
            };
            IxFun::Direct(crate::ixfun::Lmad { offset, dims })
        }
        ExtIxFun::Opaque(shape) => IxFun::iota(shape),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::soacs::SoacOp;
    use crate::ir::{Body, PrimValue};
    use crate::types::{ArrayType, DimSize, IntWidth, PrimType, Shape, Uniqueness};

    fn arr_ty(n: u64) -> Type {
        Type::Array(ArrayType {
            elem: PrimType::Signed(IntWidth::W32),
            shape: Shape(vec![DimSize::Const(n)]),
            uniqueness: Uniqueness::Nonunique,
        })
    }

    #[test]
    fn array_binding_gets_an_alloc_and_direct_ixfun() {
        let mut names = NameSource::new();
        let input = names.fresh("input");
        let out_name = names.fresh("mapped");
        let lambda = crate::ir::Lambda {
            params: vec![crate::ir::Param { name: names.fresh("p"), dec: Type::Prim(PrimType::Signed(IntWidth::W32)) }],
            body: Body::new(vec![SubExp::Constant(PrimValue::I32(0))]),
            ret_types: vec![Type::Prim(PrimType::Signed(IntWidth::W32))],
        };
        let kernels_body: KernelsBody = Body {
            stms: vec![crate::ir::Stm {
                pattern: Pattern { elems: vec![PatElem { name: out_name, dec: arr_ty(16) }] },
                certs: Certs::default(),
                exp: Exp::Op(KernelOp::Soac(SoacOp::Map {
                    width: SubExp::Constant(PrimValue::I64(16)),
                    lambda,
                    inputs: vec![SubExp::Var(input)],
                })),
            }],
            result: vec![SubExp::Var(out_name)],
        };
        let config = PipelineConfig::default();
        let mem_body = explicit_allocations_body(&kernels_body, &mut names, &config);
        // one Alloc stm plus the original map statement
        assert_eq!(mem_body.stms.len(), 2);
        assert!(matches!(mem_body.stms[0].exp, Exp::Op(MemOp::Alloc { .. })));
        let map_stm = &mem_body.stms[1];
        let bind = map_stm.pattern.elems[0].dec.mem.as_ref().expect("array binding must carry a MemBind");
        assert!(bind.ixfun.is_direct());
    }
}
