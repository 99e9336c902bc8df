//! SSA value trees.
//!
//! Registers hold at most one vector, so a composite value is a tree whose
//! leaves are SSA definitions: one per scalar or vector, one per matrix
//! column, recursing through arrays and structs.

use kiln_ir::{
    AluOp, AluSrc, Constant, ConstantValue, Cursor, Handle, Instruction, Type, TypeInner,
    child_type,
};

use crate::ParseError;
use crate::translate::Translator;
use crate::value::Value;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum SsaNode {
    Leaf(Handle<Instruction>),
    Elems(Vec<Handle<SsaValue>>),
}

#[derive(Clone, Debug)]
pub(crate) struct SsaValue {
    pub ty: Handle<Type>,
    pub node: SsaNode,
    /// The transpose of a matrix, once computed.
    pub transposed: Option<Handle<SsaValue>>,
}

impl SsaValue {
    pub fn leaf(ty: Handle<Type>, def: Handle<Instruction>) -> Self {
        Self {
            ty,
            node: SsaNode::Leaf(def),
            transposed: None,
        }
    }

    pub fn elems(ty: Handle<Type>, elems: Vec<Handle<SsaValue>>) -> Self {
        Self {
            ty,
            node: SsaNode::Elems(elems),
            transposed: None,
        }
    }
}

impl Translator<'_> {
    pub(crate) fn emit(&mut self, at: Cursor, instr: Instruction) -> Handle<Instruction> {
        self.module.insert(at, instr)
    }

    /// Emits a per-component ALU op over `srcs`, replicating the last lane of
    /// narrower sources.
    pub(crate) fn alu(
        &mut self,
        at: Cursor,
        op: AluOp,
        srcs: &[Handle<Instruction>],
        components: u32,
    ) -> Handle<Instruction> {
        let srcs = srcs
            .iter()
            .map(|&src| AluSrc::fit(src, self.def_components(at, src)))
            .collect();
        self.emit(
            at,
            Instruction::Alu {
                op,
                srcs,
                components,
            },
        )
    }

    /// Emits an ALU op with explicit sources.
    pub(crate) fn alu_with(
        &mut self,
        at: Cursor,
        op: AluOp,
        srcs: Vec<AluSrc>,
        components: u32,
    ) -> Handle<Instruction> {
        self.emit(
            at,
            Instruction::Alu {
                op,
                srcs,
                components,
            },
        )
    }

    /// Lanes defined by `def`.
    pub(crate) fn def_components(&self, at: Cursor, def: Handle<Instruction>) -> u32 {
        self.module.functions[at.function].instructions[def].components()
    }

    pub(crate) fn load_const(&mut self, at: Cursor, bits: Vec<u32>) -> Handle<Instruction> {
        self.emit(at, Instruction::LoadConst { bits })
    }

    /// Copies lane `lane` of `def` into a scalar.
    pub(crate) fn extract_lane(
        &mut self,
        at: Cursor,
        def: Handle<Instruction>,
        lane: u32,
    ) -> Handle<Instruction> {
        self.alu_with(at, AluOp::Imov, vec![AluSrc::lane(def, lane as u8)], 1)
    }

    /// Builds a vector from `(def, lane)` pairs.
    pub(crate) fn gather(
        &mut self,
        at: Cursor,
        lanes: &[(Handle<Instruction>, u32)],
    ) -> Handle<Instruction> {
        let srcs = lanes
            .iter()
            .map(|&(def, lane)| AluSrc::lane(def, lane as u8))
            .collect();
        let components = lanes.len() as u32;
        self.alu_with(at, AluOp::vec(components), srcs, components)
    }

    // --- type queries ---

    pub(crate) fn inner(&self, ty: Handle<Type>) -> &TypeInner {
        &self.module.types[ty].inner
    }

    /// Lane count of a scalar or vector type.
    pub(crate) fn components(&self, ty: Handle<Type>) -> Result<u32, ParseError> {
        self.inner(ty).components().ok_or_else(|| {
            ParseError::Lowering(format!("type {ty:?} is not a scalar or vector"))
        })
    }

    pub(crate) fn child_type(&mut self, ty: Handle<Type>, index: u32) -> Result<Handle<Type>, ParseError> {
        child_type(&mut self.module.types, ty, index)
            .ok_or_else(|| ParseError::Lowering(format!("type {ty:?} has no child {index}")))
    }

    // --- trees ---

    pub(crate) fn push_ssa(&mut self, id: u32, value: SsaValue) -> Result<(), ParseError> {
        let handle = self.ssa.append(value);
        self.values.push(id, Value::Ssa(handle))
    }

    pub(crate) fn push_leaf(
        &mut self,
        id: u32,
        ty: Handle<Type>,
        def: Handle<Instruction>,
    ) -> Result<(), ParseError> {
        self.push_ssa(id, SsaValue::leaf(ty, def))
    }

    /// Builds a tree of type `ty` whose leaves come from `make(components)`.
    pub(crate) fn tree_of_type(
        &mut self,
        ty: Handle<Type>,
        make: &mut dyn FnMut(&mut Self, u32) -> Handle<Instruction>,
    ) -> Result<Handle<SsaValue>, ParseError> {
        if let Some(components) = self.inner(ty).components() {
            let def = make(self, components);
            return Ok(self.ssa.append(SsaValue::leaf(ty, def)));
        }
        let count = self.inner(ty).child_count().ok_or_else(|| {
            ParseError::Lowering(format!("type {ty:?} cannot hold an SSA value"))
        })?;
        let mut elems = Vec::with_capacity(count as usize);
        for i in 0..count {
            let child = self.child_type(ty, i)?;
            elems.push(self.tree_of_type(child, make)?);
        }
        Ok(self.ssa.append(SsaValue::elems(ty, elems)))
    }

    /// Leaf definitions of a tree in order.
    pub(crate) fn leaves(&self, value: Handle<SsaValue>) -> Vec<Handle<Instruction>> {
        let mut out = Vec::new();
        self.collect_leaves(value, &mut out);
        out
    }

    fn collect_leaves(&self, value: Handle<SsaValue>, out: &mut Vec<Handle<Instruction>>) {
        match self.ssa[value].node {
            SsaNode::Leaf(def) => out.push(def),
            SsaNode::Elems(ref elems) => {
                for &elem in elems {
                    self.collect_leaves(elem, out);
                }
            }
        }
    }

    /// The definition of a scalar or vector value.
    pub(crate) fn leaf_def(&self, value: Handle<SsaValue>) -> Result<Handle<Instruction>, ParseError> {
        match self.ssa[value].node {
            SsaNode::Leaf(def) => Ok(def),
            SsaNode::Elems(_) => Err(ParseError::Lowering(
                "expected a scalar or vector value".into(),
            )),
        }
    }

    pub(crate) fn children(&self, value: Handle<SsaValue>) -> Result<&[Handle<SsaValue>], ParseError> {
        match self.ssa[value].node {
            SsaNode::Elems(ref elems) => Ok(elems),
            SsaNode::Leaf(_) => Err(ParseError::Lowering(
                "expected a composite value".into(),
            )),
        }
    }

    // --- operands ---

    /// The SSA tree of operand `id`. Constants are materialized at `at`.
    pub(crate) fn ssa_value(&mut self, id: u32, at: Cursor) -> Result<Handle<SsaValue>, ParseError> {
        match *self.values.get_untyped(id)? {
            Value::Ssa(handle) => Ok(handle),
            Value::Constant(constant) => self.constant_tree(constant, at),
            ref other => Err(ParseError::WrongKind {
                id,
                expected: crate::ValueKind::Ssa,
                found: other.kind(),
            }),
        }
    }

    /// The definition of scalar or vector operand `id`.
    pub(crate) fn ssa_def(&mut self, id: u32, at: Cursor) -> Result<Handle<Instruction>, ParseError> {
        let value = self.ssa_value(id, at)?;
        self.leaf_def(value)
    }

    /// Emits `LoadConst`s for a constant tree.
    pub(crate) fn constant_tree(
        &mut self,
        constant: Handle<Constant>,
        at: Cursor,
    ) -> Result<Handle<SsaValue>, ParseError> {
        let Constant { ty, ref value, .. } = self.module.constants[constant];
        match *value {
            ConstantValue::Flat(ref bits) => {
                let bits = bits.clone();
                if let TypeInner::Matrix { columns, rows, .. } = *self.inner(ty) {
                    let column_ty = self.child_type(ty, 0)?;
                    let columns = bits
                        .chunks(rows as usize)
                        .take(columns as usize)
                        .map(|column| column.to_vec())
                        .collect::<Vec<_>>();
                    let mut elems = Vec::with_capacity(columns.len());
                    for column in columns {
                        let def = self.load_const(at, column);
                        elems.push(self.ssa.append(SsaValue::leaf(column_ty, def)));
                    }
                    return Ok(self.ssa.append(SsaValue::elems(ty, elems)));
                }
                let def = self.load_const(at, bits);
                Ok(self.ssa.append(SsaValue::leaf(ty, def)))
            }
            ConstantValue::Composite(ref children) => {
                let children = children.clone();
                let mut elems = Vec::with_capacity(children.len());
                for child in children {
                    elems.push(self.constant_tree(child, at)?);
                }
                Ok(self.ssa.append(SsaValue::elems(ty, elems)))
            }
        }
    }

    /// `OpUndef` inside a function.
    pub(crate) fn body_undef(
        &mut self,
        instr: &crate::words::Instruction<'_>,
        at: Cursor,
    ) -> Result<(), ParseError> {
        let ty = self.values.ty(instr.operand(0)?)?;
        let tree = self.tree_of_type(ty, &mut |t, components| {
            t.emit(at, Instruction::Undef { components })
        })?;
        self.values.push(instr.operand(1)?, Value::Ssa(tree))
    }
}
