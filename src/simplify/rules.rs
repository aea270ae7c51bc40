//! The concrete rewrite rules of §4.4. Each rule is a plain function;
//! [`run_one_pass`] drives all of them across a body once, returning how
//! many fired so callers can detect a fixpoint.

use crate::ir::soacs::{Commutativity, Dec, SoacOp};
use crate::ir::{BasicOp, BinOp, Body, Exp, PatElem, Pattern, PrimValue, Stm, SubExp};
use crate::name::{Name, NameSource};
use crate::types::Type;
use crate::usage::usage_of_body;
use crate::subst::subst_body;
use std::collections::HashMap;
use tracing::debug;

type SoacsBody = Body<SoacOp, Dec>;
type SoacsStm = Stm<SoacOp, Dec>;

/// Run every rule once across `body`'s top-level statement list, returning
/// the number of individual rewrites that fired. The driver in
/// `simplify::simplify_body` calls this repeatedly to a fixpoint.
pub fn run_one_pass(body: &mut SoacsBody, _names: &mut NameSource) -> usize {
    let mut fired = 0;

    // Collect `Replicate` definitions visible in this body, for
    // remove-replicate-map: global uniqueness means each name has at most
    // one definition, so a flat map over the current statement list is
    // exactly the def-use information the rule needs.
    let replicate_defs: HashMap<Name, (SubExp, SubExp)> = body
        .stms
        .iter()
        .filter_map(|s| match (&s.pattern.elems[..], &s.exp) {
            ([elem], Exp::BasicOp(BasicOp::Replicate(n, v))) => Some((elem.name, (*n, *v))),
            _ => None,
        })
        .collect();

    // Same idea for `Iota` definitions: closed-form-reduce must confirm its
    // input really is an `iota`, not just guess from the width alone.
    let iota_defs: HashMap<Name, SubExp> = body
        .stms
        .iter()
        .filter_map(|s| match (&s.pattern.elems[..], &s.exp) {
            ([elem], Exp::BasicOp(BasicOp::Iota(n, _))) => Some((elem.name, *n)),
            _ => None,
        })
        .collect();

    for stm in body.stms.iter_mut() {
        match &mut stm.exp {
            Exp::Op(SoacOp::Map { lambda, inputs, .. }) => {
                fired += remove_unused_map_input(lambda, inputs);
                fired += remove_replicate_map(lambda, inputs, &replicate_defs);
            }
            Exp::Op(SoacOp::Reduce { comm, lambda, nes, inputs, width }) => {
                if let Some(closed_form) = try_closed_form_reduce(*comm, lambda, nes, inputs, *width, &iota_defs) {
                    debug!(value = %closed_form, "closed-form-reduce fired, replacing reduce with its closed form");
                    stm.exp = Exp::SubExp(closed_form);
                    fired += 1;
                }
            }
            _ => {}
        }
    }

    let mut i = 0;
    while i < body.stms.len() {
        if matches!(body.stms[i].exp, Exp::Op(SoacOp::Map { .. })) {
            fired += lift_identity_map(body, i);
        }
        i += 1;
    }

    fired += remove_unnecessary_copies(body);
    fired += dead_code_elimination(body);

    fired
}

/// *remove-unused-map-input*: drop any map input whose corresponding
/// parameter is unused in the body (§4.4).
fn remove_unused_map_input(lambda: &mut crate::ir::Lambda<SoacOp, Dec>, inputs: &mut Vec<SubExp>) -> usize {
    let usage = usage_of_body(&lambda.body);
    let keep: Vec<bool> = lambda.params.iter().map(|p| usage.is_used(p.name)).collect();
    if keep.iter().all(|k| *k) {
        return 0;
    }
    let mut new_params = Vec::new();
    let mut new_inputs = Vec::new();
    let mut removed = 0;
    for (i, k) in keep.iter().enumerate() {
        if *k {
            new_params.push(lambda.params[i].clone());
            new_inputs.push(inputs[i]);
        } else {
            removed += 1;
        }
    }
    lambda.params = new_params;
    *inputs = new_inputs;
    if removed > 0 {
        debug!(removed, "remove-unused-map-input fired");
    }
    removed
}

/// *remove-replicate-map*: when an input array is `replicate n v`, lift `v`
/// into the lambda as a constant and drop the input (§4.4).
fn remove_replicate_map(
    lambda: &mut crate::ir::Lambda<SoacOp, Dec>,
    inputs: &mut Vec<SubExp>,
    replicate_defs: &HashMap<Name, (SubExp, SubExp)>,
) -> usize {
    let mut fired = 0;
    let mut i = 0;
    while i < inputs.len() {
        let replicate_value = match inputs[i].as_name().and_then(|n| replicate_defs.get(&n)) {
            Some((_n, v)) => *v,
            None => {
                i += 1;
                continue;
            }
        };
        let param_name = lambda.params[i].name;
        subst_body(&mut lambda.body, param_name, replicate_value);
        lambda.params.remove(i);
        inputs.remove(i);
        fired += 1;
        debug!(param = %param_name, "remove-replicate-map fired");
        // do not advance `i`: the vectors shifted left
    }
    fired
}

/// *closed-form-reduce* / *redomap*: a `reduce (+) 0 (iota n)` has the
/// closed form `n*(n-1)/2`, computable without the fold when `n` is a
/// compile-time constant. Declines (returns `None`) for anything else — in
/// particular, `inputs[0]` must actually be bound to an `iota` (not merely
/// an array of the right width); the general case is left to the downstream
/// lowering, which is always correct, just not closed-form.
fn try_closed_form_reduce(
    comm: Commutativity,
    lambda: &crate::ir::Lambda<SoacOp, Dec>,
    nes: &[SubExp],
    inputs: &[SubExp],
    width: SubExp,
    iota_defs: &HashMap<Name, SubExp>,
) -> Option<SubExp> {
    if comm != Commutativity::Commutative {
        return None;
    }
    let is_plain_add = matches!(
        &lambda.body.stms[..],
        [Stm { exp: Exp::BasicOp(BasicOp::BinOp(BinOp::Add, _, _)), .. }]
    ) && lambda.params.len() == 2;
    if !is_plain_add || nes.len() != 1 || inputs.len() != 1 {
        return None;
    }
    let ne_is_zero = matches!(nes[0], SubExp::Constant(PrimValue::I64(0)) | SubExp::Constant(PrimValue::I32(0)));
    if !ne_is_zero {
        return None;
    }
    // The input must actually be a name bound to `iota n'` with `n'` equal
    // to this reduce's width — not just any array of that width.
    let input_name = inputs[0].as_name()?;
    let iota_n = *iota_defs.get(&input_name)?;
    if iota_n != width {
        return None;
    }
    let n = match width {
        SubExp::Constant(PrimValue::I64(n)) => n,
        SubExp::Constant(PrimValue::I32(n)) => n as i64,
        _ => return None,
    };
    let sum = n * (n - 1) / 2;
    Some(SubExp::Constant(PrimValue::I64(sum)))
}

/// *removeUnnecessaryCopy*: `copy x -> x` when `x` is primitive-typed or has
/// no subsequent use after the copy (§4.4).
fn remove_unnecessary_copies(body: &mut SoacsBody) -> usize {
    let mut fired = 0;
    let mut i = 0;
    while i < body.stms.len() {
        let (copied_name, src) = match (&body.stms[i].pattern.elems[..], &body.stms[i].exp) {
            ([elem], Exp::BasicOp(BasicOp::Copy(src))) => (elem.name, *src),
            _ => {
                i += 1;
                continue;
            }
        };
        let elem_ty = body.stms[i].pattern.elems[0].dec.clone();
        let is_primitive = matches!(elem_ty, Type::Prim(_));
        let src_used_later = if is_primitive {
            false
        } else {
            let rest = Body::<SoacOp, Dec> {
                stms: body.stms[i + 1..].to_vec(),
                result: body.result.clone(),
            };
            usage_of_body(&rest).is_used(src)
        };
        if is_primitive || !src_used_later {
            body.stms.remove(i);
            subst_body(body, copied_name, SubExp::Var(src));
            fired += 1;
            debug!(%copied_name, "removeUnnecessaryCopy fired");
            // restart the scan: substitution may have created new
            // opportunities earlier in the (now shorter) list.
            continue;
        }
        i += 1;
    }
    fired
}

/// Bottom-up dead-code elimination: a statement all of whose pattern
/// outputs are unused is deleted; `Map`s with *some* dead outputs have those
/// outputs pruned instead (partial dead-map, §4.4).
fn dead_code_elimination(body: &mut SoacsBody) -> usize {
    let mut fired = 0;
    loop {
        let usage = usage_of_body(body);
        let mut changed = false;
        let mut i = 0;
        while i < body.stms.len() {
            if has_side_effect(&body.stms[i].exp) {
                i += 1;
                continue;
            }
            let all_dead = body.stms[i].pattern.elems.iter().all(|e| !usage.is_used(e.name));
            if all_dead {
                body.stms.remove(i);
                fired += 1;
                changed = true;
                debug!("dead-map/dead-stm fired (all outputs unused)");
                continue;
            }
            let stm = &mut body.stms[i];
            let keep: Vec<bool> = stm.pattern.elems.iter().map(|e| usage.is_used(e.name)).collect();
            if keep.iter().any(|k| !*k) && keep.iter().any(|k| *k) {
                if let Exp::Op(SoacOp::Map { lambda, .. }) = &mut stm.exp {
                    prune_map_outputs(&mut stm.pattern, lambda, &keep);
                    fired += 1;
                    changed = true;
                    debug!("partial dead-map output pruning fired");
                }
            }
            i += 1;
        }
        if !changed {
            break;
        }
    }
    fired
}

fn has_side_effect(exp: &Exp<SoacOp, Dec>) -> bool {
    matches!(exp, Exp::BasicOp(BasicOp::Assert(_, _)))
}

fn prune_map_outputs(pattern: &mut Pattern<Dec>, lambda: &mut crate::ir::Lambda<SoacOp, Dec>, keep: &[bool]) {
    let mut new_elems = Vec::new();
    let mut new_results = Vec::new();
    let mut new_rets = Vec::new();
    for (i, k) in keep.iter().enumerate() {
        if *k {
            new_elems.push(pattern.elems[i].clone());
            new_results.push(lambda.body.result[i]);
            new_rets.push(lambda.ret_types[i].clone());
        }
    }
    pattern.elems = new_elems;
    lambda.body.result = new_results;
    lambda.ret_types = new_rets;
}

/// *lift-identity-map*: if a lambda's k-th result is a variable free in the
/// enclosing scope (not one of the lambda's own parameters), replace that
/// output with `replicate outersize v` outside the map and shrink the map's
/// arity. (The "result is literally its own k-th parameter" half of this
/// rule degenerates to the input array itself and is handled by ordinary
/// copy-propagation once the map's other outputs make it a partial map;
/// this function covers the free-variable case, which is the one that
/// actually needs a new binding.)
pub fn lift_identity_map(body: &mut SoacsBody, stm_index: usize) -> usize {
    let param_names: Vec<Name> = match &body.stms[stm_index].exp {
        Exp::Op(SoacOp::Map { lambda, .. }) => lambda.params.iter().map(|p| p.name).collect(),
        _ => return 0,
    };
    let width = match &body.stms[stm_index].exp {
        Exp::Op(SoacOp::Map { width, .. }) => *width,
        _ => return 0,
    };
    let free_result_idx = match &body.stms[stm_index].exp {
        Exp::Op(SoacOp::Map { lambda, .. }) => lambda.body.result.iter().position(|r| match r {
            SubExp::Var(n) => !param_names.contains(n) && !lambda.body.stms.iter().any(|s| s.pattern.elems.iter().any(|e| e.name == *n)),
            SubExp::Constant(_) => false,
        }),
        _ => None,
    };
    let Some(k) = free_result_idx else { return 0 };
    let v = match &body.stms[stm_index].exp {
        Exp::Op(SoacOp::Map { lambda, .. }) => lambda.body.result[k],
        _ => unreachable!(),
    };
    let out_name = body.stms[stm_index].pattern.elems[k].name;
    let out_ty = body.stms[stm_index].pattern.elems[k].dec.clone();

    let replicate_stm: SoacsStm = Stm {
        pattern: Pattern { elems: vec![PatElem { name: out_name, dec: out_ty }] },
        certs: Default::default(),
        exp: Exp::BasicOp(BasicOp::Replicate(width, v)),
    };

    let stm = &mut body.stms[stm_index];
    if let Exp::Op(SoacOp::Map { lambda, .. }) = &mut stm.exp {
        let keep: Vec<bool> = (0..lambda.body.result.len()).map(|i| i != k).collect();
        let mut pattern_rest = Pattern {
            elems: stm
                .pattern
                .elems
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != k)
                .map(|(_, e)| e.clone())
                .collect(),
        };
        prune_map_outputs(&mut pattern_rest, lambda, &keep);
        stm.pattern = pattern_rest;
    }
    body.stms.insert(stm_index, replicate_stm);
    debug!(%out_name, "lift-identity-map fired (free-variable case)");
    1
}
