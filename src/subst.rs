//! Name substitution over the SOACS tree. Safe only because of the
//! global-uniqueness invariant (spec §3.1): a name is bound exactly once, so
//! substituting every occurrence of it as a *use* can never capture a
//! binder introduced later.

use crate::ir::soacs::{Dec, SoacOp};
use crate::ir::{Body, Exp, LoopForm, Stm, SubExp};
use crate::name::Name;

fn subst_se(se: SubExp, from: Name, to: SubExp) -> SubExp {
    match se {
        SubExp::Var(n) if n == from => to,
        other => other,
    }
}

fn subst_many(ses: &mut [SubExp], from: Name, to: SubExp) {
    for se in ses.iter_mut() {
        *se = subst_se(*se, from, to);
    }
}

/// Replace every use of `from` with `to` throughout a SOACS body: statement
/// expressions, nested lambda bodies, branch/loop conditions, and the final
/// result tuple.
pub fn subst_body(body: &mut Body<SoacOp, Dec>, from: Name, to: SubExp) {
    for stm in &mut body.stms {
        subst_stm(stm, from, to);
    }
    subst_many(&mut body.result, from, to);
}

fn subst_stm(stm: &mut Stm<SoacOp, Dec>, from: Name, to: SubExp) {
    for c in &mut stm.certs.0 {
        if *c == from {
            if let SubExp::Var(n) = to {
                *c = n;
            }
        }
    }
    match &mut stm.exp {
        Exp::SubExp(se) => *se = subst_se(*se, from, to),
        Exp::BasicOp(op) => subst_basic_op(op, from, to),
        Exp::Op(op) => subst_soac(op, from, to),
        Exp::If { cond, then_body, else_body } => {
            *cond = subst_se(*cond, from, to);
            subst_body(then_body, from, to);
            subst_body(else_body, from, to);
        }
        Exp::DoLoop { merge, form, body } => {
            for (_, init) in merge.iter_mut() {
                *init = subst_se(*init, from, to);
            }
            if let LoopForm::For { bound, .. } = form {
                *bound = subst_se(*bound, from, to);
            }
            subst_body(body, from, to);
        }
    }
}

fn subst_basic_op(op: &mut crate::ir::BasicOp, from: Name, to: SubExp) {
    use crate::ir::BasicOp::*;
    match op {
        BinOp(_, a, b) => {
            *a = subst_se(*a, from, to);
            *b = subst_se(*b, from, to);
        }
        UnOp(_, a) => *a = subst_se(*a, from, to),
        Index(arr, idx) => {
            if *arr == from {
                if let SubExp::Var(n) = to {
                    *arr = n;
                }
            }
            subst_many(idx, from, to);
        }
        Iota(n, _) => *n = subst_se(*n, from, to),
        Replicate(n, v) => {
            *n = subst_se(*n, from, to);
            *v = subst_se(*v, from, to);
        }
        Reshape(dims, arr) => {
            subst_many(dims, from, to);
            if *arr == from {
                if let SubExp::Var(n) = to {
                    *arr = n;
                }
            }
        }
        Rearrange(_, arr) | Copy(arr) => {
            if *arr == from {
                if let SubExp::Var(n) = to {
                    *arr = n;
                }
            }
        }
        Concat(_, arrs) => {
            for a in arrs.iter_mut() {
                if *a == from {
                    if let SubExp::Var(n) = to {
                        *a = n;
                    }
                }
            }
        }
        Assert(c, _) => *c = subst_se(*c, from, to),
        Partition(_, flags, arrs) => {
            if *flags == from {
                if let SubExp::Var(n) = to {
                    *flags = n;
                }
            }
            for a in arrs.iter_mut() {
                if *a == from {
                    if let SubExp::Var(n) = to {
                        *a = n;
                    }
                }
            }
        }
    }
}

fn subst_lambda(lambda: &mut crate::ir::Lambda<SoacOp, Dec>, from: Name, to: SubExp) {
    subst_body(&mut lambda.body, from, to);
}

fn subst_soac(op: &mut SoacOp, from: Name, to: SubExp) {
    match op {
        SoacOp::Map { width, lambda, inputs } => {
            *width = subst_se(*width, from, to);
            subst_many(inputs, from, to);
            subst_lambda(lambda, from, to);
        }
        SoacOp::Reduce { width, lambda, nes, inputs, .. } | SoacOp::Scan { width, lambda, nes, inputs, .. } => {
            *width = subst_se(*width, from, to);
            subst_many(nes, from, to);
            subst_many(inputs, from, to);
            subst_lambda(lambda, from, to);
        }
        SoacOp::Filter { width, lambda, inputs } => {
            *width = subst_se(*width, from, to);
            subst_many(inputs, from, to);
            subst_lambda(lambda, from, to);
        }
        SoacOp::Redomap { width, reduce_lambda, map_lambda, nes, inputs, .. } => {
            *width = subst_se(*width, from, to);
            subst_many(nes, from, to);
            subst_many(inputs, from, to);
            subst_lambda(reduce_lambda, from, to);
            subst_lambda(map_lambda, from, to);
        }
        SoacOp::Stream { width, lambda, accs, inputs, .. } => {
            *width = subst_se(*width, from, to);
            subst_many(accs, from, to);
            subst_many(inputs, from, to);
            subst_lambda(lambda, from, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BasicOp, BinOp, Certs, Lambda, Param, PatElem, Pattern, PrimValue};
    use crate::name::NameSource;
    use crate::types::{IntWidth, PrimType, Type};

    fn i32_ty() -> Type {
        Type::Prim(PrimType::Signed(IntWidth::W32))
    }

    /// Substituting the input of a `Map` must reach into the SOAC's own
    /// field, not just statement expressions generically.
    #[test]
    fn subst_reaches_into_soac_inputs() {
        let mut names = NameSource::new();
        let old_arr = names.fresh("old_arr");
        let new_arr = names.fresh("new_arr");
        let p = names.fresh("p");
        let map_out = names.fresh("map_out");

        let lambda: Lambda<SoacOp, Dec> = Lambda {
            params: vec![Param { name: p, dec: i32_ty() }],
            body: Body::new(vec![SubExp::Var(p)]),
            ret_types: vec![i32_ty()],
        };
        let mut body: Body<SoacOp, Dec> = Body {
            stms: vec![Stm {
                pattern: Pattern { elems: vec![PatElem { name: map_out, dec: i32_ty() }] },
                certs: Certs::default(),
                exp: Exp::Op(SoacOp::Map {
                    width: SubExp::Constant(PrimValue::I64(4)),
                    lambda,
                    inputs: vec![SubExp::Var(old_arr)],
                }),
            }],
            result: vec![SubExp::Var(map_out)],
        };

        subst_body(&mut body, old_arr, SubExp::Var(new_arr));

        match &body.stms[0].exp {
            Exp::Op(SoacOp::Map { inputs, .. }) => assert_eq!(inputs[0], SubExp::Var(new_arr)),
            other => panic!("expected Map, got {other:?}"),
        }
    }

    /// Substitution must thread through nested `If` branches and into the
    /// final result tuple, and must leave unrelated names untouched.
    #[test]
    fn subst_reaches_into_if_branches_and_result() {
        let mut names = NameSource::new();
        let cond = names.fresh("cond");
        let old = names.fresh("old");
        let new = names.fresh("new");
        let unrelated = names.fresh("unrelated");
        let y = names.fresh("y");

        let mut body: Body<SoacOp, Dec> = Body {
            stms: vec![Stm {
                pattern: Pattern { elems: vec![PatElem { name: y, dec: i32_ty() }] },
                certs: Certs::default(),
                exp: Exp::If {
                    cond: SubExp::Var(cond),
                    then_body: Box::new(Body::new(vec![SubExp::Var(old)])),
                    else_body: Box::new(Body::new(vec![SubExp::Var(unrelated)])),
                },
            }],
            result: vec![SubExp::Var(old)],
        };

        subst_body(&mut body, old, SubExp::Var(new));

        match &body.stms[0].exp {
            Exp::If { then_body, else_body, .. } => {
                assert_eq!(then_body.result, vec![SubExp::Var(new)]);
                assert_eq!(else_body.result, vec![SubExp::Var(unrelated)], "unrelated names are untouched");
            }
            other => panic!("expected If, got {other:?}"),
        }
        assert_eq!(body.result, vec![SubExp::Var(new)]);
    }

    /// A `BinOp` with both operands equal to `from` must have both replaced
    /// — substitution isn't short-circuited after the first match.
    #[test]
    fn subst_replaces_every_occurrence_in_a_binop() {
        let mut names = NameSource::new();
        let x = names.fresh("x");
        let y = names.fresh("y");
        let out = names.fresh("out");

        let mut body: Body<SoacOp, Dec> = Body {
            stms: vec![Stm {
                pattern: Pattern { elems: vec![PatElem { name: out, dec: i32_ty() }] },
                certs: Certs::default(),
                exp: Exp::BasicOp(BasicOp::BinOp(BinOp::Add, SubExp::Var(x), SubExp::Var(x))),
            }],
            result: vec![SubExp::Var(out)],
        };

        subst_body(&mut body, x, SubExp::Var(y));

        match &body.stms[0].exp {
            Exp::BasicOp(BasicOp::BinOp(_, a, b)) => {
                assert_eq!(*a, SubExp::Var(y));
                assert_eq!(*b, SubExp::Var(y));
            }
            other => panic!("expected BinOp, got {other:?}"),
        }
    }
}
