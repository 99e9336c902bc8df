//! Type system for the kiln IR.

use crate::arena::{Handle, UniqueArena};
use crate::global::{BuiltIn, Interpolation};

/// Width of a scalar type in bytes.
pub type Bytes = u8;

/// The kind of a scalar type.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum ScalarKind {
    /// Boolean, stored as a 32-bit word (`0` or [`TRUE`](crate::TRUE)).
    Bool,
    /// Signed integer.
    Sint,
    /// Unsigned integer.
    Uint,
    /// Floating point.
    Float,
}

/// A scalar type: kind + byte width.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Scalar {
    pub kind: ScalarKind,
    pub width: Bytes,
}

impl Scalar {
    pub const BOOL: Self = Self {
        kind: ScalarKind::Bool,
        width: 4,
    };
    pub const I32: Self = Self {
        kind: ScalarKind::Sint,
        width: 4,
    };
    pub const U32: Self = Self {
        kind: ScalarKind::Uint,
        width: 4,
    };
    pub const F32: Self = Self {
        kind: ScalarKind::Float,
        width: 4,
    };
}

/// Number of components in a vector.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum VectorSize {
    /// 2 components.
    Bi = 2,
    /// 3 components.
    Tri = 3,
    /// 4 components.
    Quad = 4,
}

impl VectorSize {
    /// Converts a component count to a vector size, if it is 2, 3 or 4.
    pub fn from_components(count: u32) -> Option<Self> {
        match count {
            2 => Some(Self::Bi),
            3 => Some(Self::Tri),
            4 => Some(Self::Quad),
            _ => None,
        }
    }
}

/// Dimensionality of a sampled image.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum SamplerDim {
    D1,
    D2,
    D3,
    Cube,
    Rect,
    Buffer,
    /// Multisampled 2D.
    Ms,
}

impl SamplerDim {
    /// Number of coordinate components needed to address the image,
    /// excluding the array layer.
    pub fn coordinate_components(self) -> u32 {
        match self {
            Self::D1 | Self::Buffer => 1,
            Self::D2 | Self::Rect | Self::Ms => 2,
            Self::D3 | Self::Cube => 3,
        }
    }
}

/// A member of a struct type, with the per-field interface metadata that
/// member decorations carry.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct StructMember {
    pub name: Option<String>,
    pub ty: Handle<Type>,
    pub offset: Option<u32>,
    pub location: Option<u32>,
    pub component: Option<u32>,
    pub interpolation: Option<Interpolation>,
    pub centroid: bool,
    pub sample: bool,
    pub builtin: Option<BuiltIn>,
}

impl StructMember {
    pub fn new(ty: Handle<Type>) -> Self {
        Self {
            name: None,
            ty,
            offset: None,
            location: None,
            component: None,
            interpolation: None,
            centroid: false,
            sample: false,
            builtin: None,
        }
    }
}

/// A named type.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Type {
    pub name: Option<String>,
    pub inner: TypeInner,
}

impl Type {
    /// An anonymous type.
    pub fn anonymous(inner: TypeInner) -> Self {
        Self { name: None, inner }
    }
}

/// The concrete shape of a type.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum TypeInner {
    /// The empty result type of functions.
    Void,
    /// A single scalar value.
    Scalar(Scalar),
    /// A vector of scalars.
    Vector { size: VectorSize, scalar: Scalar },
    /// A matrix of column vectors.
    Matrix {
        columns: VectorSize,
        rows: VectorSize,
        scalar: Scalar,
    },
    /// A fixed-size array.
    Array { base: Handle<Type>, len: u32 },
    /// A struct type.
    Struct { members: Vec<StructMember> },
    /// A function signature.
    Function {
        result: Handle<Type>,
        params: Vec<Handle<Type>>,
    },
    /// A combined image and sampler.
    Sampler {
        dim: SamplerDim,
        shadow: bool,
        arrayed: bool,
        result: ScalarKind,
    },
}

impl TypeInner {
    /// Returns `true` for the types that fit in one SSA register.
    pub fn is_vector_or_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::Vector { .. })
    }

    /// Number of components of a scalar (1) or vector type.
    pub fn components(&self) -> Option<u32> {
        match *self {
            Self::Scalar(_) => Some(1),
            Self::Vector { size, .. } => Some(size as u32),
            _ => None,
        }
    }

    /// The scalar every component of a scalar, vector or matrix is made of.
    pub fn scalar(&self) -> Option<Scalar> {
        match *self {
            Self::Scalar(scalar) | Self::Vector { scalar, .. } | Self::Matrix { scalar, .. } => {
                Some(scalar)
            }
            _ => None,
        }
    }

    /// Number of children a composite value of this type has: array
    /// elements, struct members, or matrix columns.
    pub fn child_count(&self) -> Option<u32> {
        match *self {
            Self::Array { len, .. } => Some(len),
            Self::Struct { ref members } => Some(members.len() as u32),
            Self::Matrix { columns, .. } => Some(columns as u32),
            _ => None,
        }
    }
}

/// Inserts the scalar or vector type with `components` lanes of `scalar`.
///
/// Returns `None` for component counts outside `1..=4`.
pub fn vector_type(
    types: &mut UniqueArena<Type>,
    scalar: Scalar,
    components: u32,
) -> Option<Handle<Type>> {
    let inner = match components {
        1 => TypeInner::Scalar(scalar),
        n => TypeInner::Vector {
            size: VectorSize::from_components(n)?,
            scalar,
        },
    };
    Some(types.insert(Type::anonymous(inner)))
}

/// Inserts the matrix type with the given shape, or the column vector type
/// when `columns == 1`.
pub fn matrix_type(
    types: &mut UniqueArena<Type>,
    scalar: Scalar,
    columns: u32,
    rows: u32,
) -> Option<Handle<Type>> {
    if columns == 1 {
        return vector_type(types, scalar, rows);
    }
    let inner = TypeInner::Matrix {
        columns: VectorSize::from_components(columns)?,
        rows: VectorSize::from_components(rows)?,
        scalar,
    };
    Some(types.insert(Type::anonymous(inner)))
}

/// Returns the type of child `index` of a composite type: the element of an
/// array, a struct member, the column of a matrix or the component of a
/// vector.
pub fn child_type(
    types: &mut UniqueArena<Type>,
    ty: Handle<Type>,
    index: u32,
) -> Option<Handle<Type>> {
    match types[ty].inner {
        TypeInner::Array { base, .. } => Some(base),
        TypeInner::Struct { ref members } => Some(members.get(index as usize)?.ty),
        TypeInner::Matrix { rows, scalar, .. } => vector_type(types, scalar, rows as u32),
        TypeInner::Vector { scalar, .. } => vector_type(types, scalar, 1),
        _ => None,
    }
}
