//! Deref chains: storage locations rooted at a variable.

use crate::arena::Handle;
use crate::global::Variable;
use crate::instr::Instruction;

/// An array index, either known at translation time or computed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArrayIndex {
    Direct(u32),
    /// Index held in the first lane of an SSA value.
    Indirect(Handle<Instruction>),
}

/// One step of a deref chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DerefLink {
    /// Array element or matrix column.
    Array(ArrayIndex),
    /// Struct member.
    Struct(u32),
}

/// A chain of links rooted at a variable, identifying a storage location.
///
/// Chains are immutable values: extending one produces a new chain and
/// leaves the original untouched.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Deref {
    pub var: Handle<Variable>,
    pub path: Vec<DerefLink>,
}

impl Deref {
    /// The whole variable.
    pub fn var(var: Handle<Variable>) -> Self {
        Self {
            var,
            path: Vec::new(),
        }
    }

    /// Returns a copy of this chain with `link` appended.
    pub fn with(&self, link: DerefLink) -> Self {
        let mut path = Vec::with_capacity(self.path.len() + 1);
        path.extend_from_slice(&self.path);
        path.push(link);
        Self {
            var: self.var,
            path,
        }
    }

    /// Shorthand for a direct array link.
    pub fn element(&self, index: u32) -> Self {
        self.with(DerefLink::Array(ArrayIndex::Direct(index)))
    }

    /// Shorthand for a struct link.
    pub fn member(&self, index: u32) -> Self {
        self.with(DerefLink::Struct(index))
    }

    /// SSA values this chain reads.
    pub fn indirect_sources(&self) -> impl Iterator<Item = Handle<Instruction>> + '_ {
        self.path.iter().filter_map(|link| match *link {
            DerefLink::Array(ArrayIndex::Indirect(index)) => Some(index),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extending_leaves_the_base_untouched() {
        let base = Deref::var(Handle::from_index(3));
        let field = base.member(1);
        let elem = field.element(2);
        assert!(base.path.is_empty());
        assert_eq!(field.path, vec![DerefLink::Struct(1)]);
        assert_eq!(
            elem.path,
            vec![
                DerefLink::Struct(1),
                DerefLink::Array(ArrayIndex::Direct(2))
            ]
        );
        assert_eq!(elem.var, base.var);
    }

    #[test]
    fn indirect_sources_are_reported() {
        let index = Handle::from_index(5);
        let chain = Deref::var(Handle::from_index(0))
            .element(1)
            .with(DerefLink::Array(ArrayIndex::Indirect(index)));
        assert_eq!(chain.indirect_sources().collect::<Vec<_>>(), vec![index]);
    }
}
