//! Index function algebra (component C4): a symbolic mapping from a
//! multi-dimensional array index to a linear byte/element offset within a
//! memory block.
//!
//! Built from the primitive `iota(shape)` (row-major identity) by
//! composition of `permute`, `slice`, `reshape`, `offset_index`, `rebase`
//! (spec §3.4). Equality is structural (§3.4, §9): two functions computing
//! the same map but built differently compare unequal, and the conservative
//! policy is to treat them as distinct rather than attempt semantic
//! equivalence.

use crate::ir::SubExp;
use crate::name::Name;
use std::fmt;

/// An affine index expression: `a * var + b`, or a plain constant/variable.
/// This is the symbolic "leaf" the index function's strides and offsets are
/// built from; the algebra never needs more than affine combinations of
/// loop/thread variables (spec §4.3's design-level algorithms only ever
/// multiply by constant strides and add constant/variable offsets).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AffineExp {
    Const(i64),
    Var(Name),
    Scale(i64, Box<AffineExp>),
    Add(Box<AffineExp>, Box<AffineExp>),
}

impl AffineExp {
    pub fn constant(c: i64) -> Self {
        AffineExp::Const(c)
    }
    pub fn var(n: Name) -> Self {
        AffineExp::Var(n)
    }
    pub fn scale(self, k: i64) -> Self {
        match self {
            AffineExp::Const(c) => AffineExp::Const(c * k),
            other => AffineExp::Scale(k, Box::new(other)),
        }
    }
    pub fn add(self, other: Self) -> Self {
        match (&self, &other) {
            (AffineExp::Const(a), AffineExp::Const(b)) => AffineExp::Const(a + b),
            _ => AffineExp::Add(Box::new(self), Box::new(other)),
        }
    }
    /// Fold to a constant if every free variable has been eliminated.
    pub fn as_const(&self) -> Option<i64> {
        match self {
            AffineExp::Const(c) => Some(*c),
            AffineExp::Var(_) => None,
            AffineExp::Scale(k, e) => e.as_const().map(|c| c * k),
            AffineExp::Add(a, b) => Some(a.as_const()? + b.as_const()?),
        }
    }

    pub fn substitute(&self, name: Name, with: &AffineExp) -> AffineExp {
        match self {
            AffineExp::Const(c) => AffineExp::Const(*c),
            AffineExp::Var(n) if *n == name => with.clone(),
            AffineExp::Var(n) => AffineExp::Var(*n),
            AffineExp::Scale(k, e) => e.substitute(name, with).scale(*k),
            AffineExp::Add(a, b) => a.substitute(name, with).add(b.substitute(name, with)),
        }
    }
}

impl fmt::Display for AffineExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AffineExp::Const(c) => write!(f, "{c}"),
            AffineExp::Var(n) => write!(f, "{n}"),
            AffineExp::Scale(k, e) => write!(f, "{k}*{e}"),
            AffineExp::Add(a, b) => write!(f, "({a} + {b})"),
        }
    }
}

/// One dimension of a direct (row-major) index function: its size and the
/// stride (in elements) a unit step along this axis moves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LmadDim {
    pub size: i64,
    pub stride: i64,
}

/// A linear-memory-access-descriptor: strided axes plus a constant/affine
/// base offset. This is the "direct" representation `iota` produces and
/// that `permute`/`slice`/`rebase` keep in closed form whenever possible;
/// `reshape` of a non-direct function drops out of this representation (see
/// [`IxFun::Reshaped`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Lmad {
    pub offset: i64,
    pub dims: Vec<LmadDim>,
}

impl Lmad {
    pub fn iota(shape: &[i64]) -> Self {
        let mut stride = 1i64;
        let mut dims = vec![LmadDim { size: 0, stride: 0 }; shape.len()];
        for i in (0..shape.len()).rev() {
            dims[i] = LmadDim { size: shape[i], stride };
            stride *= shape[i];
        }
        Lmad { offset: 0, dims }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn index(&self, idx: &[i64]) -> i64 {
        debug_assert_eq!(idx.len(), self.dims.len());
        self.offset
            + idx
                .iter()
                .zip(&self.dims)
                .map(|(i, d)| i * d.stride)
                .sum::<i64>()
    }

    /// `true` iff strides are exactly what row-major order over `dims`
    /// would produce with zero offset — the "identity" case §3.4 calls
    /// `isDirect`.
    pub fn is_direct(&self) -> bool {
        self.offset == 0 && self == &Lmad::iota(&self.dims.iter().map(|d| d.size).collect::<Vec<_>>())
    }

    pub fn permute(&self, perm: &[usize]) -> Lmad {
        debug_assert_eq!(perm.len(), self.dims.len());
        Lmad {
            offset: self.offset,
            dims: perm.iter().map(|&i| self.dims[i].clone()).collect(),
        }
    }

    /// Restrict each axis by `DimFix` (a fixed index) or `DimSlice`
    /// (offset/length/stride); fixed axes drop from the resulting rank
    /// (spec §4.3: "fixed axes drop from the resulting rank").
    pub fn slice(&self, slices: &[DimIndex]) -> Lmad {
        debug_assert_eq!(slices.len(), self.dims.len());
        let mut offset = self.offset;
        let mut dims = Vec::new();
        for (d, s) in self.dims.iter().zip(slices) {
            match *s {
                DimIndex::Fix(i) => {
                    offset += i * d.stride;
                }
                DimIndex::Slice { offset: o, length, stride } => {
                    offset += o * d.stride;
                    dims.push(LmadDim { size: length, stride: d.stride * stride });
                }
            }
        }
        Lmad { offset, dims }
    }

    /// `Just c` iff row-major + constant offset: strides are exactly what
    /// `iota` of this shape (in this axis order) would produce (spec §4.3).
    pub fn linear_with_offset(&self, elem_size: i64) -> Option<i64> {
        let shape: Vec<i64> = self.dims.iter().map(|d| d.size).collect();
        let direct = Lmad::iota(&shape);
        if self.dims == direct.dims {
            Some(self.offset * elem_size)
        } else {
            None
        }
    }
}

/// Axis descriptor for [`Lmad::slice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimIndex {
    Fix(i64),
    Slice { offset: i64, length: i64, stride: i64 },
}

/// An index function. Most operations stay within [`Lmad`] (direct, affine,
/// closed form); `reshape` of a non-direct function escapes to `Reshaped`,
/// which records the new shape but is never `linear_with_offset` (spec
/// §4.3: "otherwise introduce an affine reshape node whose linearity is
/// lost").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IxFun {
    Direct(Lmad),
    /// A reshape applied to a non-direct base; linearity is permanently lost
    /// for this node, even if the new shape happens to match the old one.
    Reshaped { base: Box<IxFun>, new_shape: Vec<i64> },
    /// `rebase(new_base, old)`: re-express `old`'s offsets against a new
    /// backing allocation, used by allocation expansion (C9).
    Rebased { base: Box<IxFun>, new_base_stride: i64, thread_var: Name },
}

impl IxFun {
    pub fn iota(shape: &[i64]) -> Self {
        IxFun::Direct(Lmad::iota(shape))
    }

    pub fn rank(&self) -> usize {
        match self {
            IxFun::Direct(l) => l.rank(),
            IxFun::Reshaped { new_shape, .. } => new_shape.len(),
            IxFun::Rebased { base, .. } => base.rank(),
        }
    }

    pub fn shape(&self) -> Vec<i64> {
        match self {
            IxFun::Direct(l) => l.dims.iter().map(|d| d.size).collect(),
            IxFun::Reshaped { new_shape, .. } => new_shape.clone(),
            IxFun::Rebased { base, .. } => base.shape(),
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, IxFun::Direct(l) if l.is_direct())
    }

    pub fn permute(&self, perm: &[usize]) -> IxFun {
        match self {
            IxFun::Direct(l) => IxFun::Direct(l.permute(perm)),
            other => {
                // Permuting a non-direct function is itself expressed as a
                // reshape-preserving permutation: we keep it symbolic by
                // wrapping, since our Reshaped/Rebased forms don't carry
                // per-axis strides to permute directly.
                IxFun::Reshaped {
                    base: Box::new(other.clone()),
                    new_shape: {
                        let s = other.shape();
                        perm.iter().map(|&i| s[i]).collect()
                    },
                }
            }
        }
    }

    pub fn slice(&self, slices: &[DimIndex]) -> IxFun {
        match self {
            IxFun::Direct(l) => IxFun::Direct(l.slice(slices)),
            other => {
                let mut new_shape = Vec::new();
                for (s, old) in slices.iter().zip(other.shape()) {
                    if let DimIndex::Slice { length, .. } = s {
                        new_shape.push(*length);
                    }
                    let _ = old;
                }
                IxFun::Reshaped { base: Box::new(other.clone()), new_shape }
            }
        }
    }

    /// `reshape`: if direct, replace the shape outright; otherwise the
    /// function becomes (further) `Reshaped` and loses linearity (§4.3).
    pub fn reshape(&self, new_shape: &[i64]) -> IxFun {
        match self {
            IxFun::Direct(l) if l.is_direct() => IxFun::Direct(Lmad::iota(new_shape)),
            other => IxFun::Reshaped {
                base: Box::new(other.clone()),
                new_shape: new_shape.to_vec(),
            },
        }
    }

    pub fn offset_index(&self, by: i64) -> IxFun {
        match self {
            IxFun::Direct(l) => IxFun::Direct(Lmad { offset: l.offset + by, dims: l.dims.clone() }),
            other => other.clone(),
        }
    }

    /// Rebase against a new backing block whose elements are `new_base_stride`
    /// elements apart per unit of `thread_var` (component C9's allocation
    /// expansion: `rebase(newBase(old_base(ixfun)), ixfun)`).
    pub fn rebase(&self, new_base_stride: i64, thread_var: Name) -> IxFun {
        IxFun::Rebased {
            base: Box::new(self.clone()),
            new_base_stride,
            thread_var,
        }
    }

    /// `Just c` iff row-major + constant offset (§4.3); any `Reshaped` or
    /// `Rebased` node makes this `None` since those forms do not in general
    /// preserve a single linear stride pattern.
    pub fn linear_with_offset(&self, elem_size: i64) -> Option<i64> {
        match self {
            IxFun::Direct(l) => l.linear_with_offset(elem_size),
            _ => None,
        }
    }

    /// Evaluate the offset (in elements) for a concrete multi-index. Only
    /// defined for `Direct`; `Reshaped`/`Rebased` forms carry enough
    /// information for code generation (ImpGen composes them symbolically)
    /// but aren't meant to be evaluated directly against integers here.
    pub fn index(&self, idx: &[i64]) -> Option<i64> {
        match self {
            IxFun::Direct(l) => Some(l.index(idx)),
            _ => None,
        }
    }

    pub fn existentialize(&self, ctx_base: usize) -> (ExtIxFun, Vec<SubExp>) {
        match self {
            IxFun::Direct(l) => {
                let mut substs = Vec::new();
                let ext = ExtLmad {
                    offset: ExtVal::Known(l.offset),
                    dims: l
                        .dims
                        .iter()
                        .map(|d| {
                            substs.push(SubExp::Constant(crate::ir::PrimValue::I64(d.size)));
                            let idx = ctx_base + substs.len() - 1;
                            ExtLmadDim { size: ExtVal::Ext(idx), stride: ExtVal::Known(d.stride) }
                        })
                        .collect(),
                };
                (ExtIxFun::Direct(ext), substs)
            }
            other => (ExtIxFun::Opaque(other.shape()), Vec::new()),
        }
    }

    /// Position-wise anti-unification of two index-function trees (spec
    /// §4.3). Returns `None` if the top-level constructors diverge at any
    /// position; otherwise a generalised `ExtIxFun` plus, for every
    /// divergent leaf, the pair of concrete sub-expressions each side would
    /// need substituted back in.
    pub fn least_general_generalization(a: &IxFun, b: &IxFun) -> Option<(ExtIxFun, Vec<(i64, i64)>)> {
        match (a, b) {
            (IxFun::Direct(la), IxFun::Direct(lb)) if la.dims.len() == lb.dims.len() => {
                let mut substs = Vec::new();
                let mut dims = Vec::new();
                for (da, db) in la.dims.iter().zip(&lb.dims) {
                    if da.size == db.size && da.stride == db.stride {
                        dims.push(ExtLmadDim { size: ExtVal::Known(da.size), stride: ExtVal::Known(da.stride) });
                    } else if da.stride == db.stride {
                        substs.push((da.size, db.size));
                        dims.push(ExtLmadDim { size: ExtVal::Ext(substs.len() - 1), stride: ExtVal::Known(da.stride) });
                    } else {
                        return None;
                    }
                }
                let offset = if la.offset == lb.offset {
                    ExtVal::Known(la.offset)
                } else {
                    substs.push((la.offset, lb.offset));
                    ExtVal::Ext(substs.len() - 1)
                };
                Some((ExtIxFun::Direct(ExtLmad { offset, dims }), substs))
            }
            _ => None,
        }
    }
}

impl fmt::Display for IxFun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IxFun::Direct(l) => write!(f, "Lmad{{offset={}, dims={:?}}}", l.offset, l.dims),
            IxFun::Reshaped { base, new_shape } => write!(f, "Reshaped({base}, {new_shape:?})"),
            IxFun::Rebased { base, new_base_stride, thread_var } => {
                write!(f, "Rebased({base}, stride={new_base_stride}, thread={thread_var})")
            }
        }
    }
}

/// Either a known constant or an existential slot, used inside
/// [`ExtIxFun`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtVal {
    Known(i64),
    Ext(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtLmadDim {
    pub size: ExtVal,
    pub stride: ExtVal,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtLmad {
    pub offset: ExtVal,
    pub dims: Vec<ExtLmadDim>,
}

/// An index function with some components replaced by existential tags —
/// the form a branch's memory-return generalisation (§3.5) or
/// `existentialize` (§4.3) produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExtIxFun {
    Direct(ExtLmad),
    /// A non-direct function existentialized only at the shape; used as a
    /// conservative fallback when the underlying form isn't a plain `Lmad`.
    Opaque(Vec<i64>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx_product(shape: &[i64]) -> Vec<Vec<i64>> {
        fn go(shape: &[i64], acc: &mut Vec<i64>, out: &mut Vec<Vec<i64>>) {
            if acc.len() == shape.len() {
                out.push(acc.clone());
                return;
            }
            let axis = acc.len();
            for i in 0..shape[axis] {
                acc.push(i);
                go(shape, acc, out);
                acc.pop();
            }
        }
        let mut out = Vec::new();
        go(shape, &mut Vec::new(), &mut out);
        out
    }

    /// Property 9: evaluating an injective `ixfun` over every multi-index of
    /// `shape` yields a permutation of `0..prod(shape)`.
    fn is_permutation_of_range(mut offsets: Vec<i64>, n: i64) -> bool {
        offsets.sort();
        offsets == (0..n).collect::<Vec<_>>()
    }

    #[test]
    fn iota_is_direct_and_identity() {
        let shape = [2i64, 3];
        let l = IxFun::iota(&shape);
        assert!(l.is_direct());
        let offsets: Vec<i64> = idx_product(&shape).iter().map(|idx| l.index(idx).unwrap()).collect();
        assert!(is_permutation_of_range(offsets.clone(), 6));
        assert_eq!(offsets, (0..6).collect::<Vec<_>>(), "isDirect implies identity permutation");
    }

    #[test]
    fn permute_is_still_a_permutation() {
        let shape = [2i64, 3];
        let base = IxFun::iota(&shape);
        let permuted = base.permute(&[1, 0]);
        let new_shape = [3i64, 2];
        let offsets: Vec<i64> = idx_product(&new_shape).iter().map(|idx| permuted.index(idx).unwrap()).collect();
        assert!(is_permutation_of_range(offsets, 6));
    }

    #[test]
    fn linear_with_offset_detects_direct() {
        let l = IxFun::iota(&[4i64, 5]);
        assert_eq!(l.linear_with_offset(1), Some(0));
        let sliced = l.slice(&[
            DimIndex::Fix(1),
            DimIndex::Slice { offset: 0, length: 5, stride: 1 },
        ]);
        assert_eq!(sliced.linear_with_offset(1), Some(5));
    }

    #[test]
    fn reshape_of_nondirect_loses_linearity() {
        let base = IxFun::iota(&[4i64, 4]);
        let sliced = base.slice(&[
            DimIndex::Slice { offset: 1, length: 2, stride: 1 },
            DimIndex::Slice { offset: 0, length: 4, stride: 1 },
        ]);
        assert!(sliced.linear_with_offset(1).is_none() || sliced.is_direct());
        let reshaped = sliced.reshape(&[8]);
        assert!(reshaped.linear_with_offset(1).is_none());
    }

    #[test]
    fn lgg_matching_dims_pass_through() {
        let a = IxFun::Direct(Lmad::iota(&[4, 4]));
        let b = IxFun::Direct(Lmad::iota(&[4, 4]));
        let (ext, substs) = IxFun::least_general_generalization(&a, &b).unwrap();
        assert!(substs.is_empty());
        match ext {
            ExtIxFun::Direct(l) => assert!(l.dims.iter().all(|d| matches!(d.size, ExtVal::Known(_)))),
            _ => panic!("expected direct"),
        }
    }

    #[test]
    fn lgg_diverging_dims_become_existential() {
        let a = IxFun::Direct(Lmad::iota(&[4, 4]));
        let b = IxFun::Direct(Lmad::iota(&[4, 8]));
        let (ext, substs) = IxFun::least_general_generalization(&a, &b).unwrap();
        assert_eq!(substs, vec![(4, 8)]);
        match ext {
            ExtIxFun::Direct(l) => assert!(matches!(l.dims[1].size, ExtVal::Ext(0))),
            _ => panic!("expected direct"),
        }
    }

    #[test]
    fn lgg_different_rank_is_none() {
        let a = IxFun::Direct(Lmad::iota(&[4]));
        let b = IxFun::Direct(Lmad::iota(&[4, 4]));
        assert!(IxFun::least_general_generalization(&a, &b).is_none());
    }
}
