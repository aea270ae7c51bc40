//! Generic IR (component C2): the AST skeleton shared by every
//! representation. Each IR level is a distinct type alias over this skeleton,
//! parameterised by `Op` (the level-specific operations: SOACs, kernels,
//! ...) and `Dec` (the per-binding decoration: just a [`Type`] for SOACS,
//! `(Type, MemBind)` once memory is explicit). This is the "ownership
//! preserving conversion function between levels, not inheritance" approach
//! from spec §9's design notes, rendered as Rust generics instead of the
//! source's single threaded type-level "lore" parameter.

pub mod imp;
pub mod kernels;
pub mod mem;
pub mod soacs;

use crate::name::Name;
use crate::types::{PrimType, Type};
use std::fmt;

/// A zero-byte certificate token, or a known-good literal value. Scalars are
/// represented directly; arrays are always referred to by name (spec §3.2,
/// §3.6: arrays live in bindings, never as inline literals).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrimValue {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    /// The single certificate witness value: "checks passed".
    Cert,
}

impl PrimValue {
    pub fn type_of(self) -> PrimType {
        use crate::types::{FloatWidth::*, IntWidth::*};
        match self {
            PrimValue::I8(_) => PrimType::Signed(W8),
            PrimValue::I16(_) => PrimType::Signed(W16),
            PrimValue::I32(_) => PrimType::Signed(W32),
            PrimValue::I64(_) => PrimType::Signed(W64),
            PrimValue::U8(_) => PrimType::Unsigned(W8),
            PrimValue::U16(_) => PrimType::Unsigned(W16),
            PrimValue::U32(_) => PrimType::Unsigned(W32),
            PrimValue::U64(_) => PrimType::Unsigned(W64),
            PrimValue::F32(_) => PrimType::Float(W32),
            PrimValue::F64(_) => PrimType::Float(W64),
            PrimValue::Bool(_) => PrimType::Bool,
            PrimValue::Cert => PrimType::Cert,
        }
    }
}

impl fmt::Display for PrimValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimValue::I8(v) => write!(f, "{v}i8"),
            PrimValue::I16(v) => write!(f, "{v}i16"),
            PrimValue::I32(v) => write!(f, "{v}i32"),
            PrimValue::I64(v) => write!(f, "{v}i64"),
            PrimValue::U8(v) => write!(f, "{v}u8"),
            PrimValue::U16(v) => write!(f, "{v}u16"),
            PrimValue::U32(v) => write!(f, "{v}u32"),
            PrimValue::U64(v) => write!(f, "{v}u64"),
            PrimValue::F32(v) => write!(f, "{v}f32"),
            PrimValue::F64(v) => write!(f, "{v}f64"),
            PrimValue::Bool(v) => write!(f, "{v}"),
            PrimValue::Cert => write!(f, "<cert>"),
        }
    }
}

/// A reference to a scalar value: either a literal or a bound name. Arrays
/// are always named (never literal) — the one place a literal array-ish
/// value appears is as a `BasicOp::Replicate`/`Iota` expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubExp {
    Constant(PrimValue),
    Var(Name),
}

impl SubExp {
    pub fn as_name(self) -> Option<Name> {
        match self {
            SubExp::Var(n) => Some(n),
            SubExp::Constant(_) => None,
        }
    }
}

impl fmt::Display for SubExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubExp::Constant(v) => write!(f, "{v}"),
            SubExp::Var(n) => write!(f, "{n}"),
        }
    }
}

/// Certificates witnessing that bounds/shape checks already passed, threaded
/// so a later pass may hoist the actual check (glossary: "Certificate").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Certs(pub Vec<Name>);

impl fmt::Display for Certs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        write!(f, "<")?;
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{c}")?;
        }
        write!(f, ">")
    }
}

/// Binary/unary scalar primitive ops; the downstream C/OpenCL compiler is
/// trusted to optimise at this grain (§1 non-goals), so this is just the
/// closed set ImpGen (C10) and the simplifier's closed-form rules need names
/// for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SMod,
    UMod,
    And,
    Or,
    Xor,
    Eq,
    Lt,
    Le,
}

impl BinOp {
    /// `true` for the associative, commutative ops the closed-form
    /// reduce/redomap rule (§4.4) is allowed to fire on.
    pub fn is_associative(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Mul | BinOp::And | BinOp::Or | BinOp::Xor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum UnOp {
    Neg,
    Not,
    Abs,
}

/// Operations present at every IR level: reads/writes against arrays that
/// don't themselves introduce parallelism. `Op` (the type parameter on
/// [`Stm`]) carries everything level-specific on top of these.
#[derive(Debug, Clone, PartialEq)]
pub enum BasicOp {
    BinOp(BinOp, SubExp, SubExp),
    UnOp(UnOp, SubExp),
    /// Read a single element at a multi-dimensional index.
    Index(Name, Vec<SubExp>),
    /// Row-major identity array `0..n`.
    Iota(SubExp, PrimType),
    /// `n` copies of a scalar.
    Replicate(SubExp, SubExp),
    Reshape(Vec<SubExp>, Name),
    /// Axis permutation (`permute` in the index-function algebra sense).
    Rearrange(Vec<usize>, Name),
    Concat(usize, Vec<Name>),
    Copy(Name),
    /// `Assert cond msg` lowers to a certificate production.
    Assert(SubExp, String),
    /// Bucket every element of `arrs` (parallel arrays, same length) into
    /// `num_classes` contiguous runs according to `flags` (spec §4.9:
    /// "compute per-class sizes ... compute prefix offsets ... write each
    /// element to `offsets[class]++`").
    Partition(usize, Name, Vec<Name>),
}

impl fmt::Display for BasicOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BasicOp::BinOp(op, a, b) => write!(f, "{op:?} {a} {b}"),
            BasicOp::UnOp(op, a) => write!(f, "{op:?} {a}"),
            BasicOp::Index(arr, idx) => {
                write!(f, "{arr}[")?;
                for (i, ix) in idx.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{ix}")?;
                }
                write!(f, "]")
            }
            BasicOp::Iota(n, t) => write!(f, "iota({n}, {t})"),
            BasicOp::Replicate(n, v) => write!(f, "replicate({n}, {v})"),
            BasicOp::Reshape(dims, arr) => write!(f, "reshape({dims:?}, {arr})"),
            BasicOp::Rearrange(perm, arr) => write!(f, "rearrange({perm:?}, {arr})"),
            BasicOp::Concat(axis, arrs) => write!(f, "concat@{axis}({arrs:?})"),
            BasicOp::Copy(arr) => write!(f, "copy({arr})"),
            BasicOp::Assert(c, msg) => write!(f, "assert({c}, {msg:?})"),
            BasicOp::Partition(n, flags, arrs) => write!(f, "partition@{n}({flags}, {arrs:?})"),
        }
    }
}

/// A function or loop-body parameter: a name plus its decoration.
#[derive(Debug, Clone, PartialEq)]
pub struct Param<Dec> {
    pub name: Name,
    pub dec: Dec,
}

/// One element of a `let` pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct PatElem<Dec> {
    pub name: Name,
    pub dec: Dec,
}

/// The left-hand side of a `let`: an ordered list of bound names, each
/// carrying this level's decoration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pattern<Dec> {
    pub elems: Vec<PatElem<Dec>>,
}

impl<Dec> Pattern<Dec> {
    pub fn names(&self) -> impl Iterator<Item = Name> + '_ {
        self.elems.iter().map(|e| e.name)
    }
    pub fn len(&self) -> usize {
        self.elems.len()
    }
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }
}

/// Loop form: a counted `for` loop or a `while` over a condition variable.
/// Per §4.5's balance predicate, any `WhileLoop` is unconditionally
/// unbalanced.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopForm {
    For { index: Name, bound: SubExp },
    While { cond: Name },
}

/// A right-hand side at any IR level.
#[derive(Debug, Clone, PartialEq)]
pub enum Exp<Op, Dec> {
    SubExp(SubExp),
    BasicOp(BasicOp),
    /// Level-specific operation (a SOAC, a kernel, an allocation, ...).
    Op(Op),
    If {
        cond: SubExp,
        then_body: Box<Body<Op, Dec>>,
        else_body: Box<Body<Op, Dec>>,
    },
    DoLoop {
        merge: Vec<(Param<Dec>, SubExp)>,
        form: LoopForm,
        body: Box<Body<Op, Dec>>,
    },
}

/// One `let pattern = exp` binding, with its certificates.
#[derive(Debug, Clone, PartialEq)]
pub struct Stm<Op, Dec> {
    pub pattern: Pattern<Dec>,
    pub certs: Certs,
    pub exp: Exp<Op, Dec>,
}

/// An ordered sequence of bindings plus a tuple result.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Body<Op, Dec> {
    pub stms: Vec<Stm<Op, Dec>>,
    pub result: Vec<SubExp>,
}

impl<Op, Dec> Body<Op, Dec> {
    pub fn new(result: Vec<SubExp>) -> Self {
        Self { stms: Vec::new(), result }
    }
}

/// A top-level function declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FunDef<Op, Dec> {
    pub name: Name,
    pub params: Vec<Param<Dec>>,
    pub ret_types: Vec<Type>,
    pub body: Body<Op, Dec>,
}

/// A whole program at one IR level.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program<Op, Dec> {
    pub funs: Vec<FunDef<Op, Dec>>,
}

/// A lambda: parameters, body, and declared return types — used by every
/// SOAC and by the fold function passed to blocked reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda<Op, Dec> {
    pub params: Vec<Param<Dec>>,
    pub body: Body<Op, Dec>,
    pub ret_types: Vec<Type>,
}
