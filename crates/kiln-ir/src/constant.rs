//! Constant trees.

use crate::arena::{Arena, Handle};
use crate::types::Type;

/// A constant value whose shape mirrors its type.
///
/// Scalars, vectors and matrices are flat numeric aggregates: their lanes are
/// stored as raw 32-bit patterns, matrices column-major. Arrays and structs
/// are nested and keep one child constant per element or member.
#[derive(Clone, Debug, PartialEq)]
pub struct Constant {
    pub name: Option<String>,
    pub ty: Handle<Type>,
    pub value: ConstantValue,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConstantValue {
    /// Raw bit patterns of every lane.
    Flat(Vec<u32>),
    /// One child per array element or struct member.
    Composite(Vec<Handle<Constant>>),
}

impl Constant {
    /// Returns the flat lanes, or `None` for nested constants.
    pub fn bits(&self) -> Option<&[u32]> {
        match self.value {
            ConstantValue::Flat(ref bits) => Some(bits),
            ConstantValue::Composite(_) => None,
        }
    }

    /// Number of direct children of a nested constant; flat constants have none.
    pub fn child_count(&self) -> usize {
        match self.value {
            ConstantValue::Flat(_) => 0,
            ConstantValue::Composite(ref children) => children.len(),
        }
    }
}

/// Counts the flat leaves of a constant tree.
pub fn count_leaves(constants: &Arena<Constant>, handle: Handle<Constant>) -> usize {
    match constants[handle].value {
        ConstantValue::Flat(_) => 1,
        ConstantValue::Composite(ref children) => children
            .iter()
            .map(|&child| count_leaves(constants, child))
            .sum(),
    }
}
