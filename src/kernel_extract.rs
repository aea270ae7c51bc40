//! Kernel extraction (component C6): distributes map nests from the SOACS
//! level into flat SPMD [`Kernel`](crate::ir::kernels::Kernel)s at the
//! Kernels level. A map whose lambda body fails the balance predicate is
//! left un-distributed — it survives verbatim as a [`KernelOp::Soac`], one
//! of the "potential further targets" `ir::kernels` documents coexisting
//! with kernels (spec §4.5).

use crate::error::DistributionError;
use crate::ir::kernels::{Kernel, KernelInput, KernelOp, KernelResult, MapNesting, KernelsBody, KernelsFunDef, KernelsStm};
use crate::ir::soacs::{SoacOp, SoacsBody, SoacsFunDef, SoacsLambda, SoacsPattern, SoacsStm};
use crate::ir::{BasicOp, BinOp, Body, Certs, Exp, LoopForm, Param, PatElem, Pattern, SubExp};
use crate::name::NameSource;
use crate::types::{IntWidth, PrimType, Type};
use crate::usage::usage_of_body;
use tracing::debug;

fn i64_ty() -> Type {
    Type::Prim(PrimType::Signed(IntWidth::W64))
}

/// Lower a whole function: every top-level and nested `Map` is attempted for
/// distribution; everything else is lifted into `KernelOp::Soac` unchanged.
pub fn extract_kernels_fundef(fun: &SoacsFunDef, names: &mut NameSource) -> KernelsFunDef {
    KernelsFunDef {
        name: fun.name,
        params: fun.params.clone(),
        ret_types: fun.ret_types.clone(),
        body: extract_kernels_body(&fun.body, names),
    }
}

pub fn extract_kernels_body(body: &SoacsBody, names: &mut NameSource) -> KernelsBody {
    KernelsBody {
        stms: body.stms.iter().flat_map(|stm| extract_stm(stm, names)).collect(),
        result: body.result.clone(),
    }
}

/// Unlike every other conversion in this module, a distributed map may need
/// to emit sibling statements ahead of the `Kernel` itself (the combined
/// `num_threads = width_0 * width_1 * ...` product for a flattened nest of
/// rank > 1), so this returns a small prefix instead of a single statement.
fn extract_stm(stm: &SoacsStm, names: &mut NameSource) -> Vec<KernelsStm> {
    let pattern = stm.pattern.clone();
    let certs = stm.certs.clone();
    match &stm.exp {
        Exp::Op(SoacOp::Map { width, lambda, inputs }) => {
            if let Some((mut prefix_stms, new_stm)) = try_loop_interchange(&pattern, *width, lambda, inputs, names) {
                debug!("loop interchange applied: sequential loop now wraps a flattenable two-level map nest");
                let mut out: Vec<KernelsStm> = prefix_stms.drain(..).flat_map(|s| extract_stm(&s, names)).collect();
                out.extend(extract_stm(&new_stm, names));
                return out;
            }
            match try_distribute_map(&pattern, *width, lambda, inputs, names) {
                Ok((mut prefix, kernel)) => {
                    prefix.push(KernelsStm { pattern, certs, exp: Exp::Op(KernelOp::Kernel(Box::new(kernel))) });
                    prefix
                }
                Err(e) => {
                    debug!(error = %e, "map distribution declined, leaving the SOAC in place");
                    vec![KernelsStm {
                        pattern,
                        certs,
                        exp: Exp::Op(KernelOp::Soac(SoacOp::Map {
                            width: *width,
                            lambda: lambda.clone(),
                            inputs: inputs.clone(),
                        })),
                    }]
                }
            }
        }
        Exp::Op(op) => vec![KernelsStm { pattern, certs, exp: Exp::Op(KernelOp::Soac(op.clone())) }],
        Exp::SubExp(se) => vec![KernelsStm { pattern, certs, exp: Exp::SubExp(*se) }],
        Exp::BasicOp(b) => vec![KernelsStm { pattern, certs, exp: Exp::BasicOp(b.clone()) }],
        Exp::If { cond, then_body, else_body } => vec![KernelsStm {
            pattern,
            certs,
            exp: Exp::If {
                cond: *cond,
                then_body: Box::new(extract_kernels_body(then_body, names)),
                else_body: Box::new(extract_kernels_body(else_body, names)),
            },
        }],
        Exp::DoLoop { merge, form, body } => vec![KernelsStm {
            pattern,
            certs,
            exp: Exp::DoLoop {
                merge: merge.clone(),
                form: form.clone(),
                body: Box::new(extract_kernels_body(body, names)),
            },
        }],
    }
}

/// The balance predicate (§4.5): a lambda may run directly inside a flat
/// kernel thread only if every nested construct's trip count is statically
/// tied to the outer nest — in particular no `While` loop (unconditionally
/// unbalanced, since its trip count is data-dependent) anywhere inside.
fn is_balanced(lambda: &SoacsLambda) -> bool {
    fn body_is_balanced(body: &SoacsBody) -> bool {
        body.stms.iter().all(|stm| match &stm.exp {
            Exp::Op(SoacOp::Map { lambda, .. } | SoacOp::Reduce { lambda, .. } | SoacOp::Scan { lambda, .. }) => {
                body_is_balanced(&lambda.body)
            }
            Exp::Op(_) => false,
            Exp::DoLoop { form: LoopForm::While { .. }, .. } => false,
            Exp::DoLoop { body, .. } => body_is_balanced(body),
            Exp::If { then_body, else_body, .. } => body_is_balanced(then_body) && body_is_balanced(else_body),
            Exp::SubExp(_) | Exp::BasicOp(_) => true,
        })
    }
    body_is_balanced(&lambda.body)
}

fn build_kernel_inputs(lambda: &SoacsLambda, inputs: &[SubExp]) -> Vec<KernelInput> {
    lambda
        .params
        .iter()
        .zip(inputs)
        .map(|(p, arr)| KernelInput {
            param: p.name,
            array: arr
                .as_name()
                .unwrap_or_else(|| panic!("internal invariant violation: map input must be an array name, got a literal")),
            ty: p.dec.clone(),
        })
        .collect()
}

/// Recognise the shape spec §4.5 step 1 distributes: a map body whose
/// *result* is produced by a further balanced `Map` binding. Unlike a strict
/// single-statement body, other bindings in `body` are tolerated as long as
/// they are plain scalar/array ops (not themselves a further SOAC, which
/// would need its own nest level) and don't read the nested map's own
/// output — those siblings ride along, re-homed into whatever body ends up
/// innermost once flattening bottoms out, instead of silently blocking
/// distribution the way a body with more than one statement used to (the gap
/// a map body interleaving a nested map with sibling bindings used to fall
/// into, landing in a non-flattened innermost kernel).
fn sole_nested_balanced_map(body: &SoacsBody) -> Option<(SubExp, SoacsLambda, Vec<SubExp>, Pattern<Type>, Vec<SoacsStm>)> {
    let idx = body.stms.iter().position(|stm| {
        let produced: Vec<SubExp> = stm.pattern.elems.iter().map(|pe: &PatElem<Type>| SubExp::Var(pe.name)).collect();
        produced == body.result
            && matches!(&stm.exp, Exp::Op(SoacOp::Map { lambda, .. })
                if is_balanced(lambda) && !is_loop_interchange_candidate(lambda))
    })?;
    let candidate = &body.stms[idx];
    let Exp::Op(SoacOp::Map { width, lambda, inputs }) = &candidate.exp else {
        unreachable!("position() above only matches Exp::Op(SoacOp::Map { .. })");
    };

    let mut siblings = Vec::with_capacity(body.stms.len() - 1);
    for (i, stm) in body.stms.iter().enumerate() {
        if i == idx {
            continue;
        }
        if !matches!(&stm.exp, Exp::BasicOp(_) | Exp::SubExp(_)) {
            return None;
        }
        let probe: SoacsBody = Body { stms: vec![stm.clone()], result: vec![] };
        if candidate.pattern.elems.iter().any(|pe| usage_of_body(&probe).is_used(pe.name)) {
            return None;
        }
        siblings.push(stm.clone());
    }
    Some((*width, lambda.clone(), inputs.clone(), candidate.pattern.clone(), siblings))
}

/// Run a body that didn't match any of the distributable shapes above
/// through ordinary (non-flattening) extraction, with any sibling bindings
/// accumulated from enclosing levels spliced in ahead of it.
fn fallback_with_siblings(
    body: &SoacsBody,
    ret_types: &[Type],
    names: &mut NameSource,
    pending_siblings: &mut Vec<SoacsStm>,
) -> (KernelsBody, Vec<Type>) {
    let inner = extract_kernels_body(body, names);
    let mut prefix: Vec<KernelsStm> = pending_siblings.drain(..).flat_map(|s| extract_stm(&s, names)).collect();
    prefix.extend(inner.stms);
    (KernelsBody { stms: prefix, result: inner.result }, ret_types.to_vec())
}

/// Walk one level of a (possibly further-nested) map body, extending `nest`
/// with one [`MapNesting`] frame per further-nested balanced map found
/// (spec §4.5 step 1: "recurse into it with `targets` extended by the
/// current level; the nested map's body becomes a deeper kernel level"). A
/// `reduce`/`scan` that ends up as the body's sole producer (step 2's "emit
/// the reduce/scan at the outer nest") already falls out of the same
/// machinery: it isn't a `Map`, so it simply becomes the terminal per-thread
/// statement of whatever nest has been built so far, siblings included.
/// Returns the fully flattened innermost body plus the per-thread return
/// types at that innermost level.
fn distribute_body(
    body: &SoacsBody,
    ret_types: &[Type],
    names: &mut NameSource,
    nest: &mut Vec<MapNesting>,
    pending_siblings: &mut Vec<SoacsStm>,
) -> (KernelsBody, Vec<Type>) {
    match sole_nested_balanced_map(body) {
        Some((width, lambda, inputs, pattern, mut siblings)) if nest.len() < MAX_NEST_DEPTH => {
            pending_siblings.append(&mut siblings);
            let thread_index = names.fresh("thread_ix");
            let kernel_inputs = build_kernel_inputs(&lambda, &inputs);
            nest.push(MapNesting { pattern, width, thread_index, params: kernel_inputs });
            distribute_body(&lambda.body, &lambda.ret_types, names, nest, pending_siblings)
        }
        _ => fallback_with_siblings(body, ret_types, names, pending_siblings),
    }
}

/// Recognise, structurally only (no preconditions beyond shape checked yet),
/// whether `lambda`'s body produces its result via a counted `DoLoop`. Used
/// by [`sole_nested_balanced_map`] to decline recursing into such a map as a
/// further nest level — leaving it for `extract_stm` to offer to
/// [`try_loop_interchange`] directly instead, where it can replace the map
/// outright rather than surviving nested inside it.
fn is_loop_interchange_candidate(lambda: &SoacsLambda) -> bool {
    lambda.body.stms.iter().any(|stm| {
        let produced: Vec<SubExp> = stm.pattern.elems.iter().map(|pe: &PatElem<Type>| SubExp::Var(pe.name)).collect();
        produced == lambda.body.result && matches!(&stm.exp, Exp::DoLoop { form: LoopForm::For { .. }, .. })
    })
}

/// Spec §4.5 step 3 (`DoLoop` loop interchange): when a map's body produces
/// its result via a sequential loop whose own body is solely a further
/// balanced map, replace the map with the loop — now the outer construct —
/// wrapping a perfectly-nested two-level map (the original map's width, then
/// the loop body's nested map) that `extract_stm`'s ordinary map
/// distribution can flatten like any other nest, instead of leaving the loop
/// distributed per-thread with its nested map merely sequentialised inside
/// it.
///
/// Recognised only in a bounded, provably sound shape: the loop's only
/// companion statement is the `replicate(n, v)` defining its own merge-
/// initial value, with `v` invariant across the map's own threads (so the
/// flattened, combined-width initial value is just a wider replicate of the
/// same `v`), and the merge accumulator is never read inside the nested map
/// (no state genuinely threaded from one loop trip's nested map into the
/// next — only the "recompute from scratch each trip, keep the final trip's
/// result" shape). Anything more general is declined; a full account of
/// arbitrary accumulator reads or additional sibling bindings remains
/// future work.
fn try_loop_interchange(
    pattern: &SoacsPattern,
    width: SubExp,
    lambda: &SoacsLambda,
    inputs: &[SubExp],
    names: &mut NameSource,
) -> Option<(Vec<SoacsStm>, SoacsStm)> {
    if lambda.body.stms.len() != 2 {
        return None;
    }
    let loop_idx = lambda.body.stms.iter().position(|stm| {
        let produced: Vec<SubExp> = stm.pattern.elems.iter().map(|pe: &PatElem<Type>| SubExp::Var(pe.name)).collect();
        produced == lambda.body.result && matches!(&stm.exp, Exp::DoLoop { form: LoopForm::For { .. }, .. })
    })?;
    let loop_stm = &lambda.body.stms[loop_idx];
    let Exp::DoLoop { merge, form: LoopForm::For { index, bound }, body: inner_body } = &loop_stm.exp else {
        unreachable!("position() above only matches a `For`-form DoLoop");
    };
    let [(m_param, m_init)] = &merge[..] else {
        return None;
    };
    let rep_name = m_init.as_name()?;

    let rep_stm = &lambda.body.stms[1 - loop_idx];
    let [rep_elem] = &rep_stm.pattern.elems[..] else {
        return None;
    };
    let Exp::BasicOp(BasicOp::Replicate(rep_n, rep_v)) = &rep_stm.exp else {
        return None;
    };
    if rep_elem.name != rep_name {
        return None;
    }
    let (rep_n, rep_v) = (*rep_n, *rep_v);
    let outer_param_names: Vec<_> = lambda.params.iter().map(|p| p.name).collect();
    if matches!(rep_v, SubExp::Var(v) if outer_param_names.contains(&v)) {
        return None;
    }

    let [inner_stm] = &inner_body.stms[..] else {
        return None;
    };
    let Exp::Op(SoacOp::Map { lambda: inner_lambda, .. }) = &inner_stm.exp else {
        return None;
    };
    if !is_balanced(inner_lambda) {
        return None;
    }
    let [inner_elem] = &inner_stm.pattern.elems[..] else {
        return None;
    };
    let inner_map_out = inner_elem.name;
    if inner_body.result != vec![SubExp::Var(inner_map_out)] {
        return None;
    }

    let probe: SoacsBody = Body { stms: vec![inner_stm.clone()], result: vec![] };
    if usage_of_body(&probe).is_used(m_param.name) {
        return None;
    }

    let combined_lambda = SoacsLambda {
        params: lambda.params.clone(),
        body: SoacsBody { stms: vec![inner_stm.clone()], result: vec![SubExp::Var(inner_map_out)] },
        ret_types: vec![m_param.dec.clone()],
    };
    let flat_map_out = names.fresh("interchanged_map_out");
    let flat_map_stm = SoacsStm {
        pattern: Pattern { elems: vec![PatElem { name: flat_map_out, dec: m_param.dec.clone() }] },
        certs: Certs::default(),
        exp: Exp::Op(SoacOp::Map { width, lambda: combined_lambda, inputs: inputs.to_vec() }),
    };

    let flat_len = names.fresh("interchanged_len");
    let flat_len_stm = SoacsStm {
        pattern: Pattern { elems: vec![PatElem { name: flat_len, dec: i64_ty() }] },
        certs: Certs::default(),
        exp: Exp::BasicOp(BasicOp::BinOp(BinOp::Mul, width, rep_n)),
    };
    let new_init_name = names.fresh("interchanged_init");
    let new_init_stm = SoacsStm {
        pattern: Pattern { elems: vec![PatElem { name: new_init_name, dec: m_param.dec.clone() }] },
        certs: Certs::default(),
        exp: Exp::BasicOp(BasicOp::Replicate(SubExp::Var(flat_len), rep_v)),
    };

    let new_merge_param = Param { name: names.fresh("interchanged_acc"), dec: m_param.dec.clone() };
    let new_loop_stm = SoacsStm {
        pattern: pattern.clone(),
        certs: Certs::default(),
        exp: Exp::DoLoop {
            merge: vec![(new_merge_param, SubExp::Var(new_init_name))],
            form: LoopForm::For { index: *index, bound: *bound },
            body: Box::new(SoacsBody { stms: vec![flat_map_stm], result: vec![SubExp::Var(flat_map_out)] }),
        },
    };

    Some((vec![flat_len_stm, new_init_stm], new_loop_stm))
}

/// A bound on flattening depth, not a feature of the spec itself — purely a
/// defensive backstop against a pathological input with unbounded nesting
/// (the spec's own "product of widths" flattening has no stated bound).
const MAX_NEST_DEPTH: usize = 32;

/// Emit the statements computing `num_threads = widths[0] * widths[1] * ...`
/// for a flattened multi-level nest. A single-level nest needs no
/// multiplication: its lone width *is* `num_threads`.
fn combined_num_threads(nest: &[MapNesting], names: &mut NameSource) -> (Vec<KernelsStm>, SubExp) {
    let mut widths = nest.iter().map(|frame| frame.width);
    let mut acc = widths.next().expect("a kernel nest always has at least one frame");
    let mut prefix = Vec::new();
    for w in widths {
        let out = names.fresh("num_threads");
        prefix.push(KernelsStm {
            pattern: Pattern { elems: vec![PatElem { name: out, dec: i64_ty() }] },
            certs: Certs::default(),
            exp: Exp::BasicOp(BasicOp::BinOp(BinOp::Mul, acc, w)),
        });
        acc = SubExp::Var(out);
    }
    (prefix, acc)
}

/// Attempt to distribute a (possibly nested) `Map` into a flat [`Kernel`].
/// Declines (returns [`DistributionError::UnbalancedLambda`]) rather than
/// guessing when the outermost body isn't statically balanced; the caller
/// falls back to leaving the `Map` in place. On success, also returns any
/// prefix statements (the combined thread-count product, for nest depth > 1)
/// that must be emitted immediately before the kernel statement itself.
fn try_distribute_map(
    pattern: &SoacsPattern,
    width: SubExp,
    lambda: &SoacsLambda,
    inputs: &[SubExp],
    names: &mut NameSource,
) -> Result<(Vec<KernelsStm>, Kernel), DistributionError> {
    if !is_balanced(lambda) {
        return Err(DistributionError::UnbalancedLambda(format!(
            "map of width {width} has a nested construct whose trip count is not statically tied to the outer nest"
        )));
    }

    let thread_index = names.fresh("thread_ix");
    let kernel_inputs = build_kernel_inputs(lambda, inputs);

    let mut nest = vec![MapNesting { pattern: pattern.clone(), width, thread_index, params: kernel_inputs.clone() }];
    let mut pending_siblings = Vec::new();

    let (per_thread_body, ret_types) =
        distribute_body(&lambda.body, &lambda.ret_types, names, &mut nest, &mut pending_siblings);
    let returns: Vec<(Type, KernelResult)> = ret_types.iter().map(|t| (t.clone(), KernelResult::ThreadsReturn)).collect();
    let (prefix, num_threads) = combined_num_threads(&nest, names);

    Ok((
        prefix,
        Kernel {
            nest,
            thread_index,
            num_threads,
            inputs: kernel_inputs,
            bounds_cert: Certs::default(),
            body: per_thread_body,
            returns,
        },
    ))
}
