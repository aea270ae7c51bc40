//! Property tests for the index-function algebra (component C4), covering
//! spec §8 property 9 ("index-function round-trip") and the `isDirect`/
//! `linearWithOffset` guarantees §3.4 and §4.3 describe.

use nestc::ixfun::{DimIndex, IxFun};
use quickcheck_macros::quickcheck;

/// Evaluate `ixfun` at every multi-index of `shape` in row-major order.
fn all_offsets(ixfun: &IxFun, shape: &[i64]) -> Vec<i64> {
    fn go(shape: &[i64], prefix: &mut Vec<i64>, ixfun: &IxFun, out: &mut Vec<i64>) {
        if prefix.len() == shape.len() {
            out.push(ixfun.index(prefix).expect("rank matches shape"));
            return;
        }
        let axis = prefix.len();
        for i in 0..shape[axis] {
            prefix.push(i);
            go(shape, prefix, ixfun, out);
            prefix.pop();
        }
    }
    let mut out = Vec::new();
    go(shape, &mut Vec::new(), ixfun, &mut out);
    out
}

/// For `iota(shape)` the visiting order *is* row-major, so walking every
/// multi-index in row-major order must reproduce `0..n` exactly, not just as
/// a permutation — the strongest form of property 9 for the direct case.
#[quickcheck]
fn iota_round_trip_is_identity_permutation(dims: Vec<u8>) -> bool {
    let shape: Vec<i64> = dims.into_iter().take(4).map(|d| (d % 5) as i64 + 1).collect();
    if shape.is_empty() {
        return true;
    }
    let ixfun = IxFun::iota(&shape);
    let n: i64 = shape.iter().product();
    let offsets = all_offsets(&ixfun, &shape);
    offsets == (0..n).collect::<Vec<_>>()
}

/// Permuting an index function and then visiting the *permuted* shape in
/// row-major order must still produce a permutation of `0..n` — distinct
/// offsets covering the full range — for any permutation (property 9 for a
/// non-direct-in-the-new-axis-order case).
#[quickcheck]
fn permute_preserves_bijection(dims: Vec<u8>) -> bool {
    let shape: Vec<i64> = dims.into_iter().take(3).map(|d| (d % 4) as i64 + 1).collect();
    if shape.len() < 2 {
        return true;
    }
    let rank = shape.len();
    let perm: Vec<usize> = (0..rank).rev().collect();
    let permuted_shape: Vec<i64> = perm.iter().map(|&i| shape[i]).collect();

    let ixfun = IxFun::iota(&shape).permute(&perm);
    let n: i64 = shape.iter().product();
    let mut offsets = all_offsets(&ixfun, &permuted_shape);
    offsets.sort_unstable();
    offsets == (0..n).collect::<Vec<_>>()
}

/// `isDirect` must imply the identity permutation (spec §3.4 property 9,
/// second clause) for `iota` itself and for a double-permute that
/// round-trips back to the original axis order (the literal
/// `transpose(transpose(x))` scenario from spec §8).
#[test]
fn transpose_roundtrip_is_direct_and_identity() {
    let shape = [2i64, 3];
    let transposed_once = IxFun::iota(&shape).permute(&[1, 0]);
    assert!(!transposed_once.is_direct(), "a single transpose of a non-square shape changes row-major order");

    let transposed_twice = transposed_once.permute(&[1, 0]);
    assert!(transposed_twice.is_direct(), "isDirect implies identity permutation after round-tripping the transpose");
    assert_eq!(transposed_twice, IxFun::iota(&shape));

    let offsets = all_offsets(&transposed_twice, &shape);
    let n: i64 = shape.iter().product();
    assert_eq!(offsets, (0..n).collect::<Vec<_>>());
}

/// `linearWithOffset` must return `Just k` for any `iota` with a constant
/// `offset_index` applied and `Nothing` once a permutation breaks row-major
/// order on a non-trivial shape (spec §4.3).
#[quickcheck]
fn linear_with_offset_roundtrip(dims: Vec<u8>, shift: i8) -> bool {
    let shape: Vec<i64> = dims.into_iter().take(3).map(|d| (d % 4) as i64 + 1).collect();
    if shape.is_empty() {
        return true;
    }
    let elem_size = 4;
    let base = IxFun::iota(&shape);
    let shifted = base.offset_index(shift as i64);
    shifted.linear_with_offset(elem_size) == Some(shift as i64 * elem_size)
}

#[test]
fn slice_drops_fixed_axes_from_rank() {
    let ixfun = IxFun::iota(&[4, 5, 6]);
    let sliced = ixfun.slice(&[
        DimIndex::Fix(1),
        DimIndex::Slice { offset: 0, length: 5, stride: 1 },
        DimIndex::Fix(2),
    ]);
    assert_eq!(sliced.rank(), 1, "fixed axes drop from the resulting rank (spec §4.3)");
}

#[test]
fn least_general_generalization_matches_identical_trees() {
    let a = IxFun::iota(&[4, 4]);
    let b = IxFun::iota(&[4, 4]);
    let (_ext, substs) = IxFun::least_general_generalization(&a, &b)
        .expect("two structurally identical index functions must generalise");
    assert!(substs.is_empty(), "no substitution obligations when the two trees are already equal");
}
