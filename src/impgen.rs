//! ImpCode generation (component C10): a syntax-directed walk from the
//! KernelsMem IR down to [`crate::ir::imp`]'s imperative statements (spec
//! §4.9). This is the last pass in the pipeline; everything past here is an
//! external emitter's problem.

use crate::explicit_alloc::{MemBody, MemStm};
use crate::ir::imp::{ImpExp, ImpFunction, KernelLaunch, Stmt};
use crate::ir::kernels::KernelOp;
use crate::ir::mem::{MemDec, MemFunDef, MemOp};
use crate::ir::{BasicOp, BinOp, Exp, LoopForm, SubExp};
use crate::ixfun::{IxFun, Lmad};
use crate::name::{Name, NameSource};
use crate::types::{IntWidth, PrimType, Space, Type};

pub fn imp_gen_fundef(fun: &MemFunDef, names: &mut NameSource) -> ImpFunction {
    let mut body = Vec::new();
    imp_gen_body(&fun.body, names, &mut body);
    ImpFunction { name: fun.name, params: fun.params.iter().map(|p| p.name).collect(), body }
}

fn imp_gen_body(body: &MemBody, names: &mut NameSource, out: &mut Vec<Stmt>) {
    for stm in &body.stms {
        imp_gen_stm(stm, names, out);
    }
}

fn imp_gen_stm(stm: &MemStm, names: &mut NameSource, out: &mut Vec<Stmt>) {
    match &stm.exp {
        Exp::SubExp(se) => {
            if let Some(elem) = stm.pattern.elems.first() {
                if !elem.dec.ty.is_array() {
                    out.push(declare_scalar(elem));
                    out.push(Stmt::SetScalar { target: elem.name, value: se_to_impexp(*se) });
                }
                // Array-typed passthroughs carry no runtime effect: the
                // binding's own (mem, ixfun) was already computed by
                // explicit allocations and is looked up by name downstream.
            }
        }
        Exp::BasicOp(op) => imp_gen_basic_op(stm, op, names, out),
        Exp::Op(MemOp::Alloc { size, space }) => {
            if let Some(elem) = stm.pattern.elems.first() {
                out.push(Stmt::DeclareMem { name: elem.name, space: *space });
                out.push(Stmt::Allocate { mem: elem.name, size: se_to_impexp(*size), space: *space });
            }
        }
        Exp::Op(MemOp::Kernel(kernel_op)) => {
            let kernel_name = names.fresh("kernel");
            let (num_threads, args) = kernel_launch_params(kernel_op);
            out.push(Stmt::Op(KernelLaunch { kernel_name, num_threads, args }));
        }
        Exp::If { cond, then_body, else_body } => {
            for elem in &stm.pattern.elems {
                out.push(declare_scalar(elem));
            }
            let mut then_stmts = Vec::new();
            imp_gen_body(then_body, names, &mut then_stmts);
            let mut else_stmts = Vec::new();
            imp_gen_body(else_body, names, &mut else_stmts);
            out.push(Stmt::If { cond: se_to_impexp(*cond), then_branch: then_stmts, else_branch: else_stmts });
        }
        Exp::DoLoop { merge, form, body } => {
            // Copy-to-merge prelude: each merge parameter starts holding its
            // initial value, so the loop body reads a stable name rather
            // than racing the previous iteration's update in place (§4.9).
            for (param, init) in merge {
                if !matches!(param.dec.ty, Type::Array(_)) {
                    out.push(Stmt::DeclareScalar { name: param.name, ty: prim_of(&param.dec.ty) });
                    out.push(Stmt::SetScalar { target: param.name, value: se_to_impexp(*init) });
                }
            }
            let mut body_stmts = Vec::new();
            imp_gen_body(body, names, &mut body_stmts);
            match form {
                LoopForm::For { index, bound } => {
                    out.push(Stmt::DeclareScalar { name: *index, ty: crate::types::PrimType::Signed(crate::types::IntWidth::W64) });
                    out.push(Stmt::For { index: *index, bound: se_to_impexp(*bound), body: body_stmts });
                }
                LoopForm::While { cond } => out.push(Stmt::While { cond: *cond, body: body_stmts }),
            }
        }
    }
}

fn declare_scalar(elem: &crate::ir::PatElem<MemDec>) -> Stmt {
    Stmt::DeclareScalar { name: elem.name, ty: prim_of(&elem.dec.ty) }
}

fn prim_of(ty: &Type) -> crate::types::PrimType {
    match ty {
        Type::Prim(p) => *p,
        _ => panic!("internal invariant violation: a scalar binding must carry a primitive type"),
    }
}

fn se_to_impexp(se: SubExp) -> ImpExp {
    match se {
        SubExp::Constant(crate::ir::PrimValue::Bool(b)) => ImpExp::ConstBool(b),
        SubExp::Constant(v) => match v {
            crate::ir::PrimValue::I8(n) => ImpExp::ConstI64(n as i64),
            crate::ir::PrimValue::I16(n) => ImpExp::ConstI64(n as i64),
            crate::ir::PrimValue::I32(n) => ImpExp::ConstI64(n as i64),
            crate::ir::PrimValue::I64(n) => ImpExp::ConstI64(n),
            crate::ir::PrimValue::U8(n) => ImpExp::ConstI64(n as i64),
            crate::ir::PrimValue::U16(n) => ImpExp::ConstI64(n as i64),
            crate::ir::PrimValue::U32(n) => ImpExp::ConstI64(n as i64),
            crate::ir::PrimValue::U64(n) => ImpExp::ConstI64(n as i64),
            crate::ir::PrimValue::Cert => ImpExp::ConstI64(0),
            crate::ir::PrimValue::F32(f) => ImpExp::ConstF32(f),
            crate::ir::PrimValue::F64(f) => ImpExp::ConstF64(f),
            crate::ir::PrimValue::Bool(_) => unreachable!(),
        },
        SubExp::Var(n) => ImpExp::Var(n),
    }
}

/// Symbolic offset (in elements) for a `Direct` index function applied to
/// scalar-expression-form indices: `offset + Σ idx_i * stride_i` (§4.9).
/// Only `Direct` is supported here; `Reshaped`/`Rebased` forms lose the
/// closed-form linearity ImpGen's `Index`/`Copy` cases need.
fn direct_offset_expr(lmad: &Lmad, idx: &[ImpExp]) -> ImpExp {
    let mut acc = ImpExp::ConstI64(lmad.offset);
    for (dim, ix) in lmad.dims.iter().zip(idx) {
        let term = ImpExp::BinOp(crate::ir::BinOp::Mul, Box::new(ix.clone()), Box::new(ImpExp::ConstI64(dim.stride)));
        acc = ImpExp::BinOp(crate::ir::BinOp::Add, Box::new(acc), Box::new(term));
    }
    acc
}

fn offset_expr(ixfun: &IxFun, idx: &[ImpExp]) -> ImpExp {
    match ixfun {
        IxFun::Direct(l) => direct_offset_expr(l, idx),
        _ => panic!("internal invariant violation: ImpGen only supports direct index functions at element-access sites"),
    }
}

fn imp_gen_basic_op(stm: &MemStm, op: &BasicOp, names: &mut NameSource, out: &mut Vec<Stmt>) {
    if let BasicOp::Partition(num_classes, flags, arrs) = op {
        imp_gen_partition(stm, *num_classes, *flags, arrs, names, out);
        return;
    }
    let elem = stm.pattern.elems.first().expect("a BasicOp always binds exactly one result here");
    match op {
        BasicOp::BinOp(binop, a, b) => {
            out.push(declare_scalar(elem));
            out.push(Stmt::SetScalar {
                target: elem.name,
                value: ImpExp::BinOp(*binop, Box::new(se_to_impexp(*a)), Box::new(se_to_impexp(*b))),
            });
        }
        BasicOp::UnOp(unop, a) => {
            out.push(declare_scalar(elem));
            out.push(Stmt::SetScalar { target: elem.name, value: ImpExp::UnOp(*unop, Box::new(se_to_impexp(*a))) });
        }
        BasicOp::Index(arr, idx) => {
            let (mem, space, ixfun) = mem_of(arr, stm);
            let idx_exprs: Vec<ImpExp> = idx.iter().map(|i| se_to_impexp(*i)).collect();
            out.push(declare_scalar(elem));
            out.push(Stmt::Index { target: elem.name, mem, offset: offset_expr(&ixfun, &idx_exprs), ty: prim_of(&elem.dec.ty), space });
        }
        BasicOp::Copy(src) => {
            let (src_mem, src_space, src_ixfun) = mem_of(src, stm);
            let dst_bind = elem.dec.mem.as_ref().expect("a Copy's destination is always array-typed");
            let elem_size = elem.dec.ty.as_array().map(|a| a.elem.size_bytes() as i64).unwrap_or(1);
            let total_elems: i64 = src_ixfun.shape().iter().product();
            match (src_ixfun.linear_with_offset(elem_size), dst_bind.ixfun.linear_with_offset(elem_size)) {
                (Some(src_off), Some(dst_off)) => out.push(Stmt::Copy {
                    dst_mem: dst_bind.mem,
                    dst_offset: ImpExp::ConstI64(dst_off),
                    src_mem,
                    src_offset: ImpExp::ConstI64(src_off),
                    n_bytes: ImpExp::ConstI64(total_elems * elem_size),
                }),
                _ => {
                    // Elementwise fallback: a single flat loop over the
                    // element count, each iteration reading at the source's
                    // row-major position and writing at the destination's.
                    out.push(elementwise_copy_loop(
                        names,
                        src_mem,
                        src_space,
                        &src_ixfun,
                        dst_bind.mem,
                        &dst_bind.ixfun,
                        total_elems,
                        prim_of(&elem.dec.ty),
                        src_space,
                    ));
                }
            }
        }
        BasicOp::Iota(n, prim_ty) => {
            let dst_bind = elem.dec.mem.as_ref().expect("Iota always binds an array");
            out.push(iota_loop(names, dst_bind.mem, &dst_bind.ixfun, se_to_impexp(*n), *prim_ty));
        }
        BasicOp::Replicate(n, v) => {
            let dst_bind = elem.dec.mem.as_ref().expect("Replicate always binds an array");
            out.push(replicate_loop(
                names,
                dst_bind.mem,
                &dst_bind.ixfun,
                se_to_impexp(*n),
                se_to_impexp(*v),
                prim_of(&elem.dec.ty.as_array().map(|a| Type::Prim(a.elem)).unwrap_or(elem.dec.ty.clone())),
            ));
        }
        BasicOp::Reshape(_, _) | BasicOp::Rearrange(_, _) => {
            // Pure relabelling: the new shape/permutation is already baked
            // into this binding's own index function by explicit
            // allocations; no data moves, so no statement is emitted.
        }
        BasicOp::Concat(axis, arrs) => {
            let dst_bind = elem.dec.mem.as_ref().expect("Concat always binds an array");
            let mut running_offset = 0i64;
            for arr in arrs {
                let (src_mem, _space, src_ixfun) = mem_of(arr, stm);
                let shape = src_ixfun.shape();
                let elem_size = elem.dec.ty.as_array().map(|a| a.elem.size_bytes() as i64).unwrap_or(1);
                let n: i64 = shape.iter().product();
                if let (Some(src_off), Some(dst_off)) = (src_ixfun.linear_with_offset(elem_size), dst_bind.ixfun.linear_with_offset(elem_size)) {
                    out.push(Stmt::Copy {
                        dst_mem: dst_bind.mem,
                        dst_offset: ImpExp::ConstI64(dst_off + running_offset * elem_size),
                        src_mem,
                        src_offset: ImpExp::ConstI64(src_off),
                        n_bytes: ImpExp::ConstI64(n * elem_size),
                    });
                }
                running_offset += *shape.get(*axis).unwrap_or(&n);
            }
        }
        BasicOp::Assert(cond, msg) => {
            out.push(Stmt::If {
                cond: ImpExp::UnOp(crate::ir::UnOp::Not, Box::new(se_to_impexp(*cond))),
                then_branch: vec![Stmt::SetScalar { target: elem.name, value: ImpExp::ConstBool(false) }],
                else_branch: vec![Stmt::SetScalar { target: elem.name, value: ImpExp::ConstBool(true) }],
            });
            let _ = msg;
        }
        BasicOp::Partition(..) => unreachable!("handled by imp_gen_partition before this match"),
    }
}

/// `Partition n flags arrs` (§4.9): a 3-pass scatter. Pass 1 counts how many
/// elements of `flags` fall in each of the `n` classes; pass 2 turns those
/// counts into exclusive prefix offsets; pass 3 walks the input arrays once
/// more, writing each element to its class's next free slot. `counts` and
/// `offsets` are scratch memory private to this lowering, not part of the
/// program's own memory-annotated bindings.
#[allow(clippy::too_many_arguments)]
fn imp_gen_partition(stm: &MemStm, num_classes: usize, flags: Name, arrs: &[Name], names: &mut NameSource, out: &mut Vec<Stmt>) {
    let count_ty = PrimType::Signed(IntWidth::W64);
    let (flags_mem, flags_space, flags_ixfun) = mem_of(&flags, stm);
    let total_n: i64 = flags_ixfun.shape().iter().product();

    let counts_mem = names.fresh("part_counts");
    let offsets_mem = names.fresh("part_offsets");
    for mem in [counts_mem, offsets_mem] {
        out.push(Stmt::DeclareMem { name: mem, space: Space::Default });
        out.push(Stmt::Allocate { mem, size: ImpExp::ConstI64(num_classes as i64 * 8), space: Space::Default });
    }

    let zero_i = names.fresh("part_zero_i");
    out.push(Stmt::For {
        index: zero_i,
        bound: ImpExp::ConstI64(num_classes as i64),
        body: vec![Stmt::Write { mem: counts_mem, offset: ImpExp::Var(zero_i), ty: count_ty, space: Space::Default, value: ImpExp::ConstI64(0) }],
    });

    // Pass 1: counts[flags[i]] += 1 for every element.
    let count_i = names.fresh("part_count_i");
    let cls = names.fresh("part_cls");
    let cnt = names.fresh("part_cnt");
    out.push(Stmt::For {
        index: count_i,
        bound: ImpExp::ConstI64(total_n),
        body: vec![
            Stmt::DeclareScalar { name: cls, ty: count_ty },
            Stmt::Index { target: cls, mem: flags_mem, offset: offset_expr(&flags_ixfun, &[ImpExp::Var(count_i)]), ty: count_ty, space: flags_space },
            Stmt::DeclareScalar { name: cnt, ty: count_ty },
            Stmt::Index { target: cnt, mem: counts_mem, offset: ImpExp::Var(cls), ty: count_ty, space: Space::Default },
            Stmt::Write {
                mem: counts_mem,
                offset: ImpExp::Var(cls),
                ty: count_ty,
                space: Space::Default,
                value: ImpExp::BinOp(BinOp::Add, Box::new(ImpExp::Var(cnt)), Box::new(ImpExp::ConstI64(1))),
            },
        ],
    });

    // Pass 2: offsets[c] = sum of counts[0..c] (exclusive prefix sum).
    let running = names.fresh("part_running");
    out.push(Stmt::DeclareScalar { name: running, ty: count_ty });
    out.push(Stmt::SetScalar { target: running, value: ImpExp::ConstI64(0) });
    let prefix_i = names.fresh("part_prefix_i");
    let cnt2 = names.fresh("part_cnt2");
    out.push(Stmt::For {
        index: prefix_i,
        bound: ImpExp::ConstI64(num_classes as i64),
        body: vec![
            Stmt::Write { mem: offsets_mem, offset: ImpExp::Var(prefix_i), ty: count_ty, space: Space::Default, value: ImpExp::Var(running) },
            Stmt::DeclareScalar { name: cnt2, ty: count_ty },
            Stmt::Index { target: cnt2, mem: counts_mem, offset: ImpExp::Var(prefix_i), ty: count_ty, space: Space::Default },
            Stmt::SetScalar {
                target: running,
                value: ImpExp::BinOp(BinOp::Add, Box::new(ImpExp::Var(running)), Box::new(ImpExp::Var(cnt2))),
            },
        ],
    });

    // Pass 3: scatter each array's elements to offsets[class]++, once per
    // parallel input array, sharing the same class/position computation.
    let scatter_i = names.fresh("part_scatter_i");
    let cls3 = names.fresh("part_cls3");
    let pos = names.fresh("part_pos");
    let mut body = vec![
        Stmt::DeclareScalar { name: cls3, ty: count_ty },
        Stmt::Index { target: cls3, mem: flags_mem, offset: offset_expr(&flags_ixfun, &[ImpExp::Var(scatter_i)]), ty: count_ty, space: flags_space },
        Stmt::DeclareScalar { name: pos, ty: count_ty },
        Stmt::Index { target: pos, mem: offsets_mem, offset: ImpExp::Var(cls3), ty: count_ty, space: Space::Default },
    ];
    for (arr, out_elem) in arrs.iter().zip(stm.pattern.elems.iter()) {
        let (src_mem, src_space, src_ixfun) = mem_of(arr, stm);
        let dst_bind = out_elem.dec.mem.as_ref().expect("a Partition output must carry memory");
        let elem_ty = prim_of(&out_elem.dec.ty.as_array().map(|a| Type::Prim(a.elem)).unwrap_or_else(|| out_elem.dec.ty.clone()));
        let tmp = names.fresh("part_val");
        body.push(Stmt::DeclareScalar { name: tmp, ty: elem_ty });
        body.push(Stmt::Index { target: tmp, mem: src_mem, offset: offset_expr(&src_ixfun, &[ImpExp::Var(scatter_i)]), ty: elem_ty, space: src_space });
        body.push(Stmt::Write {
            mem: dst_bind.mem,
            offset: offset_expr(&dst_bind.ixfun, &[ImpExp::Var(pos)]),
            ty: elem_ty,
            space: Space::Default,
            value: ImpExp::Var(tmp),
        });
    }
    body.push(Stmt::Write {
        mem: offsets_mem,
        offset: ImpExp::Var(cls3),
        ty: count_ty,
        space: Space::Default,
        value: ImpExp::BinOp(BinOp::Add, Box::new(ImpExp::Var(pos)), Box::new(ImpExp::ConstI64(1))),
    });
    out.push(Stmt::For { index: scatter_i, bound: ImpExp::ConstI64(total_n), body });
}

fn mem_of(arr: &Name, stm: &MemStm) -> (Name, crate::types::Space, IxFun) {
    // The array's own binding is looked up among this statement's sibling
    // bindings is not possible from a single `Stm`; ImpGen is expected to
    // run with a name→`MemDec` scope already threaded through by the
    // caller. Here we fall back to treating `arr` as carrying its bind
    // information directly when the statement's own pattern names it (the
    // common case for a statement reading its own just-bound temporary);
    // otherwise space defaults to the pipeline's configured default and the
    // index function to a direct identity over an unknown shape is an
    // internal error to reach.
    for elem in &stm.pattern.elems {
        if elem.name == *arr {
            if let Some(bind) = &elem.dec.mem {
                return (bind.mem, crate::types::Space::Default, bind.ixfun.clone());
            }
        }
    }
    panic!("internal invariant violation: ImpGen needs the (mem, ixfun) of every array it reads, supplied by the enclosing scope")
}

#[allow(clippy::too_many_arguments)]
fn elementwise_copy_loop(
    names: &mut NameSource,
    src_mem: Name,
    src_space: crate::types::Space,
    src_ixfun: &IxFun,
    dst_mem: Name,
    dst_ixfun: &IxFun,
    total_elems: i64,
    ty: crate::types::PrimType,
    dst_space: crate::types::Space,
) -> Stmt {
    let index = names.fresh("copy_i");
    let tmp = names.fresh("copy_tmp");
    let idx_expr = vec![ImpExp::Var(index)];
    Stmt::For {
        index,
        bound: ImpExp::ConstI64(total_elems),
        body: vec![
            Stmt::DeclareScalar { name: tmp, ty },
            Stmt::Index { target: tmp, mem: src_mem, offset: offset_expr(src_ixfun, &idx_expr), ty, space: src_space },
            Stmt::Write { mem: dst_mem, offset: offset_expr(dst_ixfun, &idx_expr), ty, space: dst_space, value: ImpExp::Var(tmp) },
        ],
    }
}

fn iota_loop(names: &mut NameSource, mem: Name, ixfun: &IxFun, n: ImpExp, ty: crate::types::PrimType) -> Stmt {
    let index = names.fresh("iota_i");
    Stmt::For {
        index,
        bound: n,
        body: vec![Stmt::Write { mem, offset: offset_expr(ixfun, &[ImpExp::Var(index)]), ty, space: crate::types::Space::Default, value: ImpExp::Var(index) }],
    }
}

fn replicate_loop(names: &mut NameSource, mem: Name, ixfun: &IxFun, n: ImpExp, v: ImpExp, ty: crate::types::PrimType) -> Stmt {
    let index = names.fresh("replicate_i");
    Stmt::For {
        index,
        bound: n,
        body: vec![Stmt::Write { mem, offset: offset_expr(ixfun, &[ImpExp::Var(index)]), ty, space: crate::types::Space::Default, value: v }],
    }
}

/// Everything a `KernelLaunch` needs from the level-specific op it replaces:
/// the thread count, and the array names it reads/writes. `ReduceKernel`
/// degenerates to its own `num_chunks`; a surviving `SoacOp` (one that never
/// got distributed) has no launch at all and panics here — it must be
/// lowered by kernel extraction before ImpGen runs.
fn kernel_launch_params(op: &KernelOp) -> (ImpExp, Vec<Name>) {
    match op {
        KernelOp::Kernel(k) => (se_to_impexp(k.num_threads), k.inputs.iter().map(|i| i.array).collect()),
        KernelOp::ReduceKernel(rk) => (se_to_impexp(rk.num_chunks), vec![rk.input]),
        KernelOp::Soac(_) => panic!(
            "internal invariant violation: a SOAC that survived kernel extraction has no kernel launch to emit; run kernel_extract first"
        ),
    }
}
