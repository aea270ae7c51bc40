//! SOACS simplifier (component C5): rewrite rules that fire within the
//! Builder monad, driven to a fixpoint. Termination is guaranteed by the
//! iteration cap derived from the initial binding count (spec §9); hitting
//! the cap without reaching a fixpoint is treated as a buggy rule and fails
//! loudly rather than looping forever.

pub mod rules;

use crate::config::PipelineConfig;
use crate::ir::soacs::SoacsBody;
use crate::name::NameSource;
use tracing::{debug, warn};

/// Simplify a body to a fixpoint (or until the iteration cap is hit).
/// Returns the number of rule applications that fired, mostly useful for
/// tests asserting idempotence (spec §8 property 7).
pub fn simplify_body(body: &mut SoacsBody, names: &mut NameSource, config: &PipelineConfig) -> usize {
    let cap = config.simplify_iteration_cap(body.stms.len());
    let mut total_fired = 0;
    for iter in 0..cap {
        let fired = rules::run_one_pass(body, names);
        if fired == 0 {
            debug!(iterations = iter + 1, "simplifier reached a fixpoint");
            return total_fired;
        }
        total_fired += fired;
    }
    warn!(cap, "simplifier did not reach a fixpoint within the iteration cap — a rule is likely non-terminating");
    total_fired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::soacs::{Dec, SoacOp, SoacsLambda};
    use crate::ir::{BasicOp, Body, Exp, Param, PatElem, Pattern, Stm, SubExp, Certs, PrimValue};
    use crate::types::{IntWidth, PrimType, Type};

    fn i32_ty() -> Type {
        Type::Prim(PrimType::Signed(IntWidth::W32))
    }

    /// *dead-map*: a map whose only output is unused is deleted entirely.
    #[test]
    fn dead_map_is_removed() {
        let mut names = NameSource::new();
        let arr = names.fresh("arr");
        let p = names.fresh("p");
        let map_out = names.fresh("map_out");
        let lambda = SoacsLambda {
            params: vec![Param { name: p, dec: i32_ty() }],
            body: Body::new(vec![SubExp::Var(p)]),
            ret_types: vec![i32_ty()],
        };
        let map_stm: Stm<SoacOp, Dec> = Stm {
            pattern: Pattern { elems: vec![PatElem { name: map_out, dec: i32_ty() }] },
            certs: Certs::default(),
            exp: Exp::Op(SoacOp::Map {
                width: SubExp::Constant(PrimValue::I64(4)),
                lambda,
                inputs: vec![SubExp::Var(arr)],
            }),
        };
        let mut body: SoacsBody = Body {
            stms: vec![map_stm],
            result: vec![SubExp::Constant(PrimValue::Bool(true))],
        };
        let config = PipelineConfig::default();
        simplify_body(&mut body, &mut names, &config);
        assert!(body.stms.is_empty(), "unused map should be deleted");
    }

    /// *removeUnnecessaryCopy*: dropping a copy whose source has no later
    /// use, with the later reference substituted back to the source.
    #[test]
    fn unnecessary_copy_is_removed() {
        let mut names = NameSource::new();
        let src = names.fresh("src");
        let copied = names.fresh("copied");
        let copy_stm: Stm<SoacOp, Dec> = Stm {
            pattern: Pattern { elems: vec![PatElem { name: copied, dec: i32_ty() }] },
            certs: Certs::default(),
            exp: Exp::BasicOp(BasicOp::Copy(src)),
        };
        let mut body: SoacsBody = Body {
            stms: vec![copy_stm],
            result: vec![SubExp::Var(copied)],
        };
        let config = PipelineConfig::default();
        simplify_body(&mut body, &mut names, &config);
        assert!(body.stms.is_empty());
        assert_eq!(body.result, vec![SubExp::Var(src)]);
    }
}
