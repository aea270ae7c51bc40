//! Type and shape vocabulary shared by every IR level (spec §3.2).

use crate::name::Name;
use std::fmt;

/// Signed/unsigned integer widths and float widths the core understands.
/// Scalar-instruction-level optimisation over these is out of scope (§1); the
/// core only needs them for layout (element size) and pretty-printing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum IntWidth {
    #[strum(serialize = "8")]
    W8,
    #[strum(serialize = "16")]
    W16,
    #[strum(serialize = "32")]
    W32,
    #[strum(serialize = "64")]
    W64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum FloatWidth {
    #[strum(serialize = "32")]
    W32,
    #[strum(serialize = "64")]
    W64,
}

/// A primitive (unboxed, constant-size) type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimType {
    Signed(IntWidth),
    Unsigned(IntWidth),
    Float(FloatWidth),
    Bool,
    /// Zero-byte certificate token (spec glossary: "Certificate").
    Cert,
}

impl PrimType {
    /// Byte size on the host; `Cert` occupies zero bytes and is never stored.
    pub const fn size_bytes(self) -> u64 {
        match self {
            PrimType::Signed(w) | PrimType::Unsigned(w) => match w {
                IntWidth::W8 => 1,
                IntWidth::W16 => 2,
                IntWidth::W32 => 4,
                IntWidth::W64 => 8,
            },
            PrimType::Float(w) => match w {
                FloatWidth::W32 => 4,
                FloatWidth::W64 => 8,
            },
            PrimType::Bool => 1,
            PrimType::Cert => 0,
        }
    }
}

impl fmt::Display for PrimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimType::Signed(w) => write!(f, "i{w}"),
            PrimType::Unsigned(w) => write!(f, "u{w}"),
            PrimType::Float(w) => write!(f, "f{w}"),
            PrimType::Bool => write!(f, "bool"),
            PrimType::Cert => write!(f, "cert"),
        }
    }
}

/// Whether an array value may be used destructively (in-place) at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Uniqueness {
    Unique,
    Nonunique,
}

/// A single array dimension. Only in return-type position may it be an
/// existential tag (`Ext`), per spec §3.2.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DimSize {
    Const(u64),
    Var(Name),
    /// De-Bruijn index into the enclosing construct's existential context
    /// tuple (branches, loops, function returns).
    Ext(usize),
}

impl fmt::Display for DimSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimSize::Const(n) => write!(f, "{n}"),
            DimSize::Var(n) => write!(f, "{n}"),
            DimSize::Ext(i) => write!(f, "?{i}"),
        }
    }
}

/// An ordered sequence of dimension sizes, outermost first (row-major).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(pub Vec<DimSize>);

impl Shape {
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn scalar() -> Self {
        Shape(Vec::new())
    }

    /// `true` when every dimension is a compile-time constant, which is the
    /// case required to compute a byte size at allocation time (§4.7).
    pub fn is_fully_static(&self) -> bool {
        self.0.iter().all(|d| matches!(d, DimSize::Const(_)))
    }

    /// Product of all dimensions, if every one is a known constant.
    pub fn static_element_count(&self) -> Option<u64> {
        self.0
            .iter()
            .map(|d| match d {
                DimSize::Const(n) => Some(*n),
                _ => None,
            })
            .try_fold(1u64, |acc, d| d.map(|d| acc * d))
    }

    /// `true` iff any dimension refers to an existential tag — only legal in
    /// return-type position (§3.2, §4.7: "a plain let-binding with an
    /// existential array shape is an internal error").
    pub fn has_existential(&self) -> bool {
        self.0.iter().any(|d| matches!(d, DimSize::Ext(_)))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in &self.0 {
            write!(f, "[{d}]")?;
        }
        Ok(())
    }
}

/// Where a memory block lives (spec §3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Space {
    Default,
    Device,
    Local,
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Space::Default => write!(f, "default"),
            Space::Device => write!(f, "device"),
            Space::Local => write!(f, "local"),
        }
    }
}

/// Element type + shape + uniqueness of an array binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayType {
    pub elem: PrimType,
    pub shape: Shape,
    pub uniqueness: Uniqueness,
}

/// A type at any IR level (memory block types live alongside these, see
/// `mem::MemInfo`, since only array/tuple/prim values flow through bindings).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Prim(PrimType),
    Array(ArrayType),
    /// Tuples never nest inside arrays at runtime (§3.2): an "array of
    /// tuples" is statically decomposed into a tuple of arrays before this
    /// representation, so `Tuple` here only ever contains `Prim`/`Array`.
    Tuple(Vec<Type>),
}

impl Type {
    pub fn rank(&self) -> usize {
        match self {
            Type::Array(a) => a.shape.rank(),
            _ => 0,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }

    pub fn as_array(&self) -> Option<&ArrayType> {
        match self {
            Type::Array(a) => Some(a),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Prim(p) => write!(f, "{p}"),
            Type::Array(a) => write!(f, "{}{}", a.shape, a.elem),
            Type::Tuple(ts) => {
                write!(f, "{{")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_element_count() {
        let shape = Shape(vec![DimSize::Const(3), DimSize::Const(4)]);
        assert_eq!(shape.static_element_count(), Some(12));
    }

    #[test]
    fn existential_shape_detected() {
        let shape = Shape(vec![DimSize::Ext(0), DimSize::Const(4)]);
        assert!(shape.has_existential());
        assert_eq!(shape.static_element_count(), None);
    }

    #[test]
    fn cert_is_zero_sized() {
        assert_eq!(PrimType::Cert.size_bytes(), 0);
    }
}
