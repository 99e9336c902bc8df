//! The value table: one slot per SPIR-V id.

use std::fmt;

use kiln_ir::{ArrayIndex, Constant, Deref, Handle, Type};

use crate::ParseError;
use crate::cfg::{SpvBlock, SpvFunction};
use crate::decoration::Decoration;
use crate::ssa::SsaValue;

/// What an id has been defined as.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ValueKind {
    Undefined,
    Type,
    Constant,
    Ssa,
    Deref,
    Function,
    Block,
    ExtensionImport,
    DecorationGroup,
    String,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Undefined => "undefined value",
            Self::Type => "type",
            Self::Constant => "constant",
            Self::Ssa => "SSA value",
            Self::Deref => "pointer",
            Self::Function => "function",
            Self::Block => "block",
            Self::ExtensionImport => "extended instruction set",
            Self::DecorationGroup => "decoration group",
            Self::String => "string",
        };
        f.write_str(name)
    }
}

/// Pointer types keep their pointee's IR type; this records what the IR
/// type alone cannot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct PointerInfo {
    pub pointee: u32,
    pub storage: spirv::StorageClass,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct TypeValue {
    pub ty: Handle<Type>,
    pub pointer: Option<PointerInfo>,
}

/// A single vector lane selected past the end of a deref chain.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Lane {
    pub index: ArrayIndex,
    /// Type of the vector the lane belongs to.
    pub vector: Handle<Type>,
}

/// A storage location: a deref chain plus the type stored there.
#[derive(Clone, Debug)]
pub(crate) struct DerefValue {
    pub deref: Deref,
    pub ty: Handle<Type>,
    pub lane: Option<Lane>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum ExtSet {
    Glsl450,
    Unknown(String),
}

#[derive(Clone, Debug)]
pub(crate) enum Value {
    Type(TypeValue),
    Constant(Handle<Constant>),
    Ssa(Handle<SsaValue>),
    Deref(DerefValue),
    Function(Handle<SpvFunction>),
    Block(Handle<SpvBlock>),
    ExtensionImport(ExtSet),
    DecorationGroup,
    String(String),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Type(_) => ValueKind::Type,
            Self::Constant(_) => ValueKind::Constant,
            Self::Ssa(_) => ValueKind::Ssa,
            Self::Deref(_) => ValueKind::Deref,
            Self::Function(_) => ValueKind::Function,
            Self::Block(_) => ValueKind::Block,
            Self::ExtensionImport(_) => ValueKind::ExtensionImport,
            Self::DecorationGroup => ValueKind::DecorationGroup,
            Self::String(_) => ValueKind::String,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    value: Option<Value>,
    name: Option<String>,
    member_names: Vec<(u32, String)>,
    decorations: Vec<Decoration>,
}

/// Flat table indexed by id, sized by the header bound.
#[derive(Debug)]
pub(crate) struct ValueTable {
    slots: Vec<Slot>,
}

impl ValueTable {
    pub fn new(bound: u32) -> Self {
        let mut slots = Vec::new();
        slots.resize_with(bound as usize, Slot::default);
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    fn out_of_bounds(&self, id: u32) -> ParseError {
        ParseError::IdOutOfBounds {
            id,
            bound: self.slots.len() as u32,
        }
    }

    fn slot(&self, id: u32) -> Result<&Slot, ParseError> {
        self.slots
            .get(id as usize)
            .ok_or_else(|| self.out_of_bounds(id))
    }

    fn slot_mut(&mut self, id: u32) -> Result<&mut Slot, ParseError> {
        let err = self.out_of_bounds(id);
        self.slots.get_mut(id as usize).ok_or(err)
    }

    /// Assigns `id` its one and only value.
    pub fn push(&mut self, id: u32, value: Value) -> Result<(), ParseError> {
        let slot = self.slot_mut(id)?;
        if slot.value.is_some() {
            return Err(ParseError::IdRedefined(id));
        }
        slot.value = Some(value);
        Ok(())
    }

    pub fn get_untyped(&self, id: u32) -> Result<&Value, ParseError> {
        self.slot(id)?
            .value
            .as_ref()
            .ok_or(ParseError::UndefinedId(id))
    }

    /// Returns the value of `id`, which must be of kind `expected`.
    pub fn get(&self, id: u32, expected: ValueKind) -> Result<&Value, ParseError> {
        let value = self.get_untyped(id)?;
        if value.kind() != expected {
            return Err(ParseError::WrongKind {
                id,
                expected,
                found: value.kind(),
            });
        }
        Ok(value)
    }

    pub fn kind(&self, id: u32) -> Result<ValueKind, ParseError> {
        Ok(self
            .slot(id)?
            .value
            .as_ref()
            .map_or(ValueKind::Undefined, Value::kind))
    }

    pub fn type_value(&self, id: u32) -> Result<TypeValue, ParseError> {
        match *self.get(id, ValueKind::Type)? {
            Value::Type(ty) => Ok(ty),
            ref other => Err(wrong_kind(id, ValueKind::Type, other)),
        }
    }

    pub fn ty(&self, id: u32) -> Result<Handle<Type>, ParseError> {
        Ok(self.type_value(id)?.ty)
    }

    pub fn constant(&self, id: u32) -> Result<Handle<Constant>, ParseError> {
        match *self.get(id, ValueKind::Constant)? {
            Value::Constant(c) => Ok(c),
            ref other => Err(wrong_kind(id, ValueKind::Constant, other)),
        }
    }

    /// Returns the constant `id` holds, or `None` for any other kind.
    pub fn try_constant(&self, id: u32) -> Result<Option<Handle<Constant>>, ParseError> {
        Ok(match *self.get_untyped(id)? {
            Value::Constant(c) => Some(c),
            _ => None,
        })
    }

    pub fn deref(&self, id: u32) -> Result<&DerefValue, ParseError> {
        match *self.get(id, ValueKind::Deref)? {
            Value::Deref(ref d) => Ok(d),
            ref other => Err(wrong_kind(id, ValueKind::Deref, other)),
        }
    }

    pub fn block(&self, id: u32) -> Result<Handle<SpvBlock>, ParseError> {
        match *self.get(id, ValueKind::Block)? {
            Value::Block(b) => Ok(b),
            ref other => Err(wrong_kind(id, ValueKind::Block, other)),
        }
    }

    pub fn function(&self, id: u32) -> Result<Handle<SpvFunction>, ParseError> {
        match *self.get(id, ValueKind::Function)? {
            Value::Function(f) => Ok(f),
            ref other => Err(wrong_kind(id, ValueKind::Function, other)),
        }
    }

    pub fn ext_set(&self, id: u32) -> Result<&ExtSet, ParseError> {
        match *self.get(id, ValueKind::ExtensionImport)? {
            Value::ExtensionImport(ref set) => Ok(set),
            ref other => Err(wrong_kind(id, ValueKind::ExtensionImport, other)),
        }
    }

    // --- debug names ---

    pub fn set_name(&mut self, id: u32, name: String) -> Result<(), ParseError> {
        self.slot_mut(id)?.name = Some(name);
        Ok(())
    }

    pub fn name(&self, id: u32) -> Option<String> {
        self.slots.get(id as usize)?.name.clone()
    }

    pub fn set_member_name(&mut self, id: u32, member: u32, name: String) -> Result<(), ParseError> {
        self.slot_mut(id)?.member_names.push((member, name));
        Ok(())
    }

    pub fn member_name(&self, id: u32, member: u32) -> Option<String> {
        self.slots
            .get(id as usize)?
            .member_names
            .iter()
            .rev()
            .find(|(m, _)| *m == member)
            .map(|(_, name)| name.clone())
    }

    // --- decorations ---

    pub fn decorate(&mut self, id: u32, decoration: Decoration) -> Result<(), ParseError> {
        self.slot_mut(id)?.decorations.push(decoration);
        Ok(())
    }

    /// Decorations recorded directly on `id`, groups unexpanded.
    pub fn raw_decorations(&self, id: u32) -> Result<&[Decoration], ParseError> {
        Ok(&self.slot(id)?.decorations)
    }
}

fn wrong_kind(id: u32, expected: ValueKind, found: &Value) -> ParseError {
    ParseError::WrongKind {
        id,
        expected,
        found: found.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_sized_by_bound() {
        let table = ValueTable::new(10);
        assert_eq!(table.len(), 10);
        assert!(matches!(
            table.get_untyped(10),
            Err(ParseError::IdOutOfBounds { id: 10, bound: 10 })
        ));
    }

    #[test]
    fn values_are_assigned_once() {
        let mut table = ValueTable::new(4);
        table.push(2, Value::DecorationGroup).unwrap();
        assert!(matches!(
            table.push(2, Value::DecorationGroup),
            Err(ParseError::IdRedefined(2))
        ));
        assert_eq!(table.kind(2).unwrap(), ValueKind::DecorationGroup);
        assert_eq!(table.kind(3).unwrap(), ValueKind::Undefined);
    }

    #[test]
    fn wrong_kind_and_undefined_are_reported() {
        let mut table = ValueTable::new(4);
        table.push(1, Value::String("file.glsl".into())).unwrap();
        assert!(matches!(
            table.ty(1),
            Err(ParseError::WrongKind {
                id: 1,
                expected: ValueKind::Type,
                found: ValueKind::String
            })
        ));
        assert!(matches!(table.ty(3), Err(ParseError::UndefinedId(3))));
    }

    #[test]
    fn names_may_precede_definitions() {
        let mut table = ValueTable::new(4);
        table.set_name(3, "color".into()).unwrap();
        table.set_member_name(3, 1, "alpha".into()).unwrap();
        assert_eq!(table.name(3).as_deref(), Some("color"));
        assert_eq!(table.member_name(3, 1).as_deref(), Some("alpha"));
        assert_eq!(table.member_name(3, 0), None);
        assert!(table.set_name(9, "x".into()).is_err());
    }
}
