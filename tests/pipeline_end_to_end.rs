//! End-to-end pipeline scenarios grounded in spec §8's literal example
//! programs. This crate has no interpreter (spec §1: "out of scope ...
//! the interpreter used only as an oracle for testing"), so these tests
//! cannot compare executed outputs; instead they drive each §8 scenario's
//! SOACS program through the real pipeline stages (kernel extraction,
//! blocked reduction, explicit allocations, allocation expansion, coalesce)
//! and check the structural invariants of spec §8 properties 1 and 4 hold
//! at every stage boundary, plus the scenario-specific shape each program
//! is expected to take once lowered.

mod support;

use nestc::blocked_reduce::lower_reduces_body;
use nestc::coalesce::coalesce_body;
use nestc::config::PipelineConfig;
use nestc::expand_alloc::expand_allocations_body;
use nestc::explicit_alloc::explicit_allocations_body;
use nestc::ir::kernels::KernelOp;
use nestc::ir::soacs::{Commutativity, Dec as SoacsDec, SoacOp, SoacsBody, SoacsLambda};
use nestc::ir::{BasicOp, BinOp, Body, Certs, Exp, Param, PatElem, Pattern, PrimValue, Stm, SubExp};
use nestc::kernel_extract::extract_kernels_body;
use nestc::name::NameSource;
use nestc::simplify::simplify_body;
use support::{all_arrays_have_memory, assert_globally_unique, collect_bound_names, i32_array, i32_ty};

/// `reduce (+) 0i32 [1i32, 2i32, 3i32, 4i32]` (spec §8 *reduce-sum*): the
/// array-level `Reduce` should survive kernel extraction as a `Soac`, then
/// get lowered to a two-stage [`nestc::ir::kernels::ReduceKernel`] by
/// blocked reduction (C7), and finally carry full memory annotations after
/// explicit allocations (C8).
#[test]
fn reduce_sum_lowers_to_a_two_stage_reduce_kernel() {
    let mut names = NameSource::new();
    let arr = names.fresh("arr");
    let a = names.fresh("a");
    let b = names.fresh("b");
    let sum = names.fresh("sum");
    let reduce_out = names.fresh("reduce_out");

    let op_lambda: SoacsLambda = nestc::ir::Lambda {
        params: vec![Param { name: a, dec: i32_ty() }, Param { name: b, dec: i32_ty() }],
        body: {
            let mut body = Body::new(vec![SubExp::Var(sum)]);
            body.stms.push(Stm {
                pattern: Pattern { elems: vec![PatElem { name: sum, dec: i32_ty() }] },
                certs: Certs::default(),
                exp: Exp::BasicOp(BasicOp::BinOp(BinOp::Add, SubExp::Var(a), SubExp::Var(b))),
            });
            body
        },
        ret_types: vec![i32_ty()],
    };
    let reduce_stm: Stm<SoacOp, SoacsDec> = Stm {
        pattern: Pattern { elems: vec![PatElem { name: reduce_out, dec: i32_ty() }] },
        certs: Certs::default(),
        exp: Exp::Op(SoacOp::Reduce {
            width: SubExp::Constant(PrimValue::I64(4)),
            comm: Commutativity::Commutative,
            lambda: op_lambda,
            nes: vec![SubExp::Constant(PrimValue::I32(0))],
            inputs: vec![SubExp::Var(arr)],
        }),
    };
    let body: SoacsBody = Body { stms: vec![reduce_stm], result: vec![SubExp::Var(reduce_out)] };

    let kernels_body = extract_kernels_body(&body, &mut names);
    let config = PipelineConfig::default();
    let reduced = lower_reduces_body(&kernels_body, &mut names, &config);
    assert!(
        matches!(reduced.stms[0].exp, Exp::Op(KernelOp::ReduceKernel(_))),
        "a single-input reduce must lower to a ReduceKernel"
    );

    let mem_body = explicit_allocations_body(&reduced, &mut names, &config);
    assert!(all_arrays_have_memory(&mem_body), "every array binding must carry memory after explicitAllocations (§8 property 4)");

    let mut bound = Vec::new();
    collect_bound_names(&mem_body, &mut bound);
    assert_globally_unique(&bound);
}

/// `scan (+) 0i32 [1i32, 2i32, 3i32]` (spec §8 *scan-plus*): `Scan` is not
/// one of the SOACs kernel extraction or blocked reduction know how to
/// distribute (only `Map` and single-input `Reduce` are), so it must survive
/// verbatim as a `KernelOp::Soac(Scan)` and still pick up a complete memory
/// annotation once lowered past explicit allocations.
#[test]
fn scan_plus_survives_extraction_and_gets_memory_annotated() {
    let mut names = NameSource::new();
    let arr = names.fresh("arr");
    let a = names.fresh("a");
    let b = names.fresh("b");
    let sum = names.fresh("sum");
    let scan_out = names.fresh("scan_out");

    let op_lambda: SoacsLambda = nestc::ir::Lambda {
        params: vec![Param { name: a, dec: i32_ty() }, Param { name: b, dec: i32_ty() }],
        body: {
            let mut body = Body::new(vec![SubExp::Var(sum)]);
            body.stms.push(Stm {
                pattern: Pattern { elems: vec![PatElem { name: sum, dec: i32_ty() }] },
                certs: Certs::default(),
                exp: Exp::BasicOp(BasicOp::BinOp(BinOp::Add, SubExp::Var(a), SubExp::Var(b))),
            });
            body
        },
        ret_types: vec![i32_ty()],
    };
    let scan_stm: Stm<SoacOp, SoacsDec> = Stm {
        pattern: Pattern { elems: vec![PatElem { name: scan_out, dec: i32_array(3) }] },
        certs: Certs::default(),
        exp: Exp::Op(SoacOp::Scan {
            width: SubExp::Constant(PrimValue::I64(3)),
            lambda: op_lambda,
            nes: vec![SubExp::Constant(PrimValue::I32(0))],
            inputs: vec![SubExp::Var(arr)],
        }),
    };
    let body: SoacsBody = Body { stms: vec![scan_stm], result: vec![SubExp::Var(scan_out)] };

    let kernels_body = extract_kernels_body(&body, &mut names);
    assert!(
        matches!(kernels_body.stms[0].exp, Exp::Op(KernelOp::Soac(SoacOp::Scan { .. }))),
        "scan is not a distribution target and must survive verbatim"
    );

    let config = PipelineConfig::default();
    let mem_body = explicit_allocations_body(&kernels_body, &mut names, &config);
    assert!(all_arrays_have_memory(&mem_body));
    assert!(
        mem_body.stms.last().unwrap().pattern.elems[0].dec.mem.is_some(),
        "the scan's array output must get a concrete memory block (the Alloc emitted ahead of it is a separate, earlier statement)"
    );
}

/// `filter (\x -> x % 2i32 == 0i32) [1i32, 2i32, 3i32, 4i32]` (spec §8
/// *filter-even*): like scan, filter is not a kernel-extraction target, and
/// must still come out the other end of explicit allocations fully
/// annotated, with global uniqueness preserved end to end.
#[test]
fn filter_even_survives_extraction_and_gets_memory_annotated() {
    let mut names = NameSource::new();
    let arr = names.fresh("arr");
    let x = names.fresh("x");
    let rem = names.fresh("rem");
    let keep = names.fresh("keep");
    let filter_out = names.fresh("filter_out");

    let pred_lambda: SoacsLambda = nestc::ir::Lambda {
        params: vec![Param { name: x, dec: i32_ty() }],
        body: Body {
            stms: vec![
                Stm {
                    pattern: Pattern { elems: vec![PatElem { name: rem, dec: i32_ty() }] },
                    certs: Certs::default(),
                    exp: Exp::BasicOp(BasicOp::BinOp(BinOp::SMod, SubExp::Var(x), SubExp::Constant(PrimValue::I32(2)))),
                },
                Stm {
                    pattern: Pattern { elems: vec![PatElem { name: keep, dec: nestc::types::Type::Prim(nestc::types::PrimType::Bool) }] },
                    certs: Certs::default(),
                    exp: Exp::BasicOp(BasicOp::BinOp(BinOp::Eq, SubExp::Var(rem), SubExp::Constant(PrimValue::I32(0)))),
                },
            ],
            result: vec![SubExp::Var(keep)],
        },
        ret_types: vec![nestc::types::Type::Prim(nestc::types::PrimType::Bool)],
    };
    let filter_stm: Stm<SoacOp, SoacsDec> = Stm {
        pattern: Pattern { elems: vec![PatElem { name: filter_out, dec: i32_array(4) }] },
        certs: Certs::default(),
        exp: Exp::Op(SoacOp::Filter {
            width: SubExp::Constant(PrimValue::I64(4)),
            lambda: pred_lambda,
            inputs: vec![SubExp::Var(arr)],
        }),
    };
    let body: SoacsBody = Body { stms: vec![filter_stm], result: vec![SubExp::Var(filter_out)] };

    let kernels_body = extract_kernels_body(&body, &mut names);
    assert!(matches!(kernels_body.stms[0].exp, Exp::Op(KernelOp::Soac(SoacOp::Filter { .. }))));

    let config = PipelineConfig::default();
    let mem_body = explicit_allocations_body(&kernels_body, &mut names, &config);
    let expanded = expand_allocations_body(&mem_body, &mut names);
    let coalesced = coalesce_body(&expanded, &mut names, &config);
    assert!(all_arrays_have_memory(&coalesced));

    let mut bound = Vec::new();
    collect_bound_names(&coalesced, &mut bound);
    assert_globally_unique(&bound);
}

/// `map (\x -> x) arr` (spec §8 *map-id*): distributes cleanly into a flat
/// kernel (the lambda body is trivially balanced — no nested constructs at
/// all) since the identity-on-its-own-parameter case is left to ordinary
/// copy-propagation rather than `lift_identity_map` (see that function's
/// doc comment — only the free-variable case rewrites the map itself).
/// `simplify_body` must not crash or mis-fire on it, and the map must still
/// distribute into a `Kernel` once run through extraction.
#[test]
fn map_identity_distributes_into_a_kernel() {
    let mut names = NameSource::new();
    let arr = names.fresh("arr");
    let p = names.fresh("p");
    let map_out = names.fresh("map_out");
    let lambda: SoacsLambda = nestc::ir::Lambda {
        params: vec![Param { name: p, dec: i32_ty() }],
        body: Body::new(vec![SubExp::Var(p)]),
        ret_types: vec![i32_ty()],
    };
    let map_stm: Stm<SoacOp, SoacsDec> = Stm {
        pattern: Pattern { elems: vec![PatElem { name: map_out, dec: i32_ty() }] },
        certs: Certs::default(),
        exp: Exp::Op(SoacOp::Map { width: SubExp::Constant(PrimValue::I64(3)), lambda, inputs: vec![SubExp::Var(arr)] }),
    };
    let mut body: SoacsBody = Body { stms: vec![map_stm], result: vec![SubExp::Var(map_out)] };

    let config = PipelineConfig::default();
    simplify_body(&mut body, &mut names, &config);
    assert_eq!(body.stms.len(), 1, "identity-on-parameter map is left to copy-propagation, not lift-identity-map");

    let kernels_body = extract_kernels_body(&body, &mut names);
    assert!(matches!(kernels_body.stms[0].exp, Exp::Op(KernelOp::Kernel(_))), "a trivially balanced map must distribute");
}
