//! Composite construction, extraction and insertion over SSA trees.

use kiln_ir::{AluOp, AluSrc, Cursor, Handle, Instruction};
use spirv::Op;

use crate::ParseError;
use crate::ssa::{SsaNode, SsaValue};
use crate::translate::Translator;
use crate::value::Value;
use crate::words;

/// Shuffle component selecting an undefined lane.
const UNDEF_COMPONENT: u32 = 0xFFFF_FFFF;

impl Translator<'_> {
    pub(crate) fn handle_composite(
        &mut self,
        instr: &words::Instruction<'_>,
        at: Cursor,
    ) -> Result<(), ParseError> {
        let ty = self.values.ty(instr.operand(0)?)?;
        let id = instr.operand(1)?;
        let tree = match instr.op {
            Op::CompositeConstruct => self.construct(instr, ty, at)?,
            Op::CompositeExtract => {
                let composite = self.ssa_value(instr.operand(2)?, at)?;
                self.extract(composite, instr.operands_from(3), ty, at)?
            }
            Op::CompositeInsert => {
                let object = self.ssa_value(instr.operand(2)?, at)?;
                let composite = self.ssa_value(instr.operand(3)?, at)?;
                self.insert(composite, object, instr.operands_from(4), at)?
            }
            Op::VectorShuffle => {
                let a = self.ssa_def(instr.operand(2)?, at)?;
                let b = self.ssa_def(instr.operand(3)?, at)?;
                let def = self.shuffle(a, b, instr.operands_from(4), at)?;
                self.ssa.append(SsaValue::leaf(ty, def))
            }
            Op::VectorExtractDynamic => {
                let vector = self.ssa_def(instr.operand(2)?, at)?;
                let index = self.ssa_def(instr.operand(3)?, at)?;
                let components = self.def_components(at, vector);
                let def = self.extract_dynamic(at, vector, components, index);
                self.ssa.append(SsaValue::leaf(ty, def))
            }
            Op::VectorInsertDynamic => {
                let vector = self.ssa_def(instr.operand(2)?, at)?;
                let value = self.ssa_def(instr.operand(3)?, at)?;
                let index = self.ssa_def(instr.operand(4)?, at)?;
                let components = self.def_components(at, vector);
                let def = self.insert_dynamic(at, vector, components, value, index);
                self.ssa.append(SsaValue::leaf(ty, def))
            }
            Op::CopyObject => {
                let value = self.ssa_value(instr.operand(2)?, at)?;
                self.composite_copy(value)
            }
            op => return Err(ParseError::UnsupportedOpcode(op)),
        };
        self.values.push(id, Value::Ssa(tree))
    }

    fn construct(
        &mut self,
        instr: &words::Instruction<'_>,
        ty: Handle<kiln_ir::Type>,
        at: Cursor,
    ) -> Result<Handle<SsaValue>, ParseError> {
        let constituents = instr.operands_from(2);
        if let Some(components) = self.inner(ty).components() {
            let mut lanes = Vec::with_capacity(components as usize);
            for &c in constituents {
                let def = self.ssa_def(c, at)?;
                let width = self.def_components(at, def);
                lanes.extend((0..width).map(|lane| (def, lane)));
            }
            if lanes.len() != components as usize {
                return Err(ParseError::InvalidOperands(instr.op));
            }
            let def = self.gather(at, &lanes);
            return Ok(self.ssa.append(SsaValue::leaf(ty, def)));
        }

        if self.inner(ty).child_count() != Some(constituents.len() as u32) {
            return Err(ParseError::InvalidOperands(instr.op));
        }
        let elems = constituents
            .iter()
            .map(|&c| self.ssa_value(c, at))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.ssa.append(SsaValue::elems(ty, elems)))
    }

    fn extract(
        &mut self,
        composite: Handle<SsaValue>,
        indices: &[u32],
        ty: Handle<kiln_ir::Type>,
        at: Cursor,
    ) -> Result<Handle<SsaValue>, ParseError> {
        let mut current = composite;
        for (depth, &index) in indices.iter().enumerate() {
            match self.ssa[current].node {
                SsaNode::Elems(ref elems) => {
                    current = *elems.get(index as usize).ok_or_else(|| {
                        ParseError::Lowering(format!("composite index {index} out of range"))
                    })?;
                }
                SsaNode::Leaf(def) => {
                    if depth + 1 != indices.len() || index >= self.def_components(at, def) {
                        return Err(ParseError::Lowering(format!(
                            "component index {index} out of range"
                        )));
                    }
                    let lane = self.extract_lane(at, def, index);
                    return Ok(self.ssa.append(SsaValue::leaf(ty, lane)));
                }
            }
        }
        Ok(current)
    }

    /// A copy of `composite` with the element at `indices` replaced.
    fn insert(
        &mut self,
        composite: Handle<SsaValue>,
        object: Handle<SsaValue>,
        indices: &[u32],
        at: Cursor,
    ) -> Result<Handle<SsaValue>, ParseError> {
        let Some((&index, rest)) = indices.split_first() else {
            return Ok(object);
        };
        let ty = self.ssa[composite].ty;
        match self.ssa[composite].node {
            SsaNode::Elems(ref elems) => {
                let mut elems = elems.clone();
                let slot = elems.get_mut(index as usize).ok_or_else(|| {
                    ParseError::Lowering(format!("composite index {index} out of range"))
                })?;
                let child = *slot;
                *slot = self.insert(child, object, rest, at)?;
                Ok(self.ssa.append(SsaValue::elems(ty, elems)))
            }
            SsaNode::Leaf(def) => {
                let components = self.def_components(at, def);
                if !rest.is_empty() || index >= components {
                    return Err(ParseError::Lowering(format!(
                        "component index {index} out of range"
                    )));
                }
                let value = self.leaf_def(object)?;
                let lanes: Vec<_> = (0..components)
                    .map(|c| if c == index { (value, 0) } else { (def, c) })
                    .collect();
                let def = self.gather(at, &lanes);
                Ok(self.ssa.append(SsaValue::leaf(ty, def)))
            }
        }
    }

    fn shuffle(
        &mut self,
        a: Handle<Instruction>,
        b: Handle<Instruction>,
        components: &[u32],
        at: Cursor,
    ) -> Result<Handle<Instruction>, ParseError> {
        let width_a = self.def_components(at, a);
        let width_b = self.def_components(at, b);
        let mut undef = None;
        let mut lanes = Vec::with_capacity(components.len());
        for &c in components {
            let lane = if c == UNDEF_COMPONENT {
                let def = *undef
                    .get_or_insert_with(|| self.emit(at, Instruction::Undef { components: 1 }));
                (def, 0)
            } else if c < width_a {
                (a, c)
            } else if c - width_a < width_b {
                (b, c - width_a)
            } else {
                return Err(ParseError::InvalidOperands(Op::VectorShuffle));
            };
            lanes.push(lane);
        }
        if lanes.is_empty() || lanes.len() > 4 {
            return Err(ParseError::InvalidOperands(Op::VectorShuffle));
        }
        Ok(self.gather(at, &lanes))
    }

    /// Selects lane `index` of `vector` with a chain of selects.
    pub(crate) fn extract_dynamic(
        &mut self,
        at: Cursor,
        vector: Handle<Instruction>,
        components: u32,
        index: Handle<Instruction>,
    ) -> Handle<Instruction> {
        let mut result = self.extract_lane(at, vector, 0);
        for lane in 1..components {
            let k = self.load_const(at, vec![lane]);
            let hit = self.alu(at, AluOp::Ieq, &[index, k], 1);
            result = self.alu_with(
                at,
                AluOp::Bcsel,
                vec![
                    AluSrc::new(hit),
                    AluSrc::lane(vector, lane as u8),
                    AluSrc::new(result),
                ],
                1,
            );
        }
        result
    }

    /// `vector` with lane `index` replaced by `value`.
    pub(crate) fn insert_dynamic(
        &mut self,
        at: Cursor,
        vector: Handle<Instruction>,
        components: u32,
        value: Handle<Instruction>,
        index: Handle<Instruction>,
    ) -> Handle<Instruction> {
        let mut lanes = Vec::with_capacity(components as usize);
        for lane in 0..components {
            let k = self.load_const(at, vec![lane]);
            let hit = self.alu(at, AluOp::Ieq, &[index, k], 1);
            let def = self.alu_with(
                at,
                AluOp::Bcsel,
                vec![
                    AluSrc::new(hit),
                    AluSrc::lane(value, 0),
                    AluSrc::lane(vector, lane as u8),
                ],
                1,
            );
            lanes.push((def, 0));
        }
        self.gather(at, &lanes)
    }

    /// A new tree over the same leaf definitions.
    pub(crate) fn composite_copy(&mut self, value: Handle<SsaValue>) -> Handle<SsaValue> {
        let ty = self.ssa[value].ty;
        let node = match self.ssa[value].node {
            SsaNode::Leaf(def) => SsaNode::Leaf(def),
            SsaNode::Elems(ref elems) => {
                let elems = elems.clone();
                SsaNode::Elems(elems.into_iter().map(|e| self.composite_copy(e)).collect())
            }
        };
        self.ssa.append(SsaValue {
            ty,
            node,
            transposed: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use kiln_ir::{CfList, Function, Scalar, vector_type};

    use super::*;
    use crate::Options;

    fn scratch() -> (Vec<u32>, Cursor) {
        (vec![0; 5], Cursor::end_of(Handle::from_index(0), CfList::Body))
    }

    fn setup(words: &[u32]) -> Translator<'_> {
        let mut ctx = Translator::new(words, 16, Options::default());
        ctx.module.functions.append(Function::new(None));
        ctx
    }

    #[test]
    fn copy_shares_leaves() {
        let (words, at) = scratch();
        let mut ctx = setup(&words);
        let f32_ty = vector_type(&mut ctx.module.types, Scalar::F32, 1).unwrap();
        let a = ctx.load_const(at, vec![1]);
        let b = ctx.load_const(at, vec![2]);
        let la = ctx.ssa.append(SsaValue::leaf(f32_ty, a));
        let lb = ctx.ssa.append(SsaValue::leaf(f32_ty, b));
        let pair = ctx.ssa.append(SsaValue::elems(f32_ty, vec![la, lb]));

        let count = ctx.module.functions[at.function].instructions.len();
        let once = ctx.composite_copy(pair);
        let twice = ctx.composite_copy(once);
        assert_ne!(once, pair);
        assert_eq!(ctx.leaves(once), vec![a, b]);
        assert_eq!(ctx.leaves(twice), ctx.leaves(once));
        assert_eq!(ctx.module.functions[at.function].instructions.len(), count);
    }

    #[test]
    fn dynamic_extract_selects_every_lane() {
        let (words, at) = scratch();
        let mut ctx = setup(&words);
        let vector = ctx.load_const(at, vec![10, 20, 30]);
        let index = ctx.load_const(at, vec![2]);
        let def = ctx.extract_dynamic(at, vector, 3, index);
        let func = &ctx.module.functions[at.function];
        let Instruction::Alu { op, ref srcs, .. } = func.instructions[def] else {
            panic!("expected an ALU op");
        };
        assert_eq!(op, AluOp::Bcsel);
        assert_eq!(srcs[1], AluSrc::lane(vector, 2));
    }

    #[test]
    fn shuffle_lanes_span_both_vectors() {
        let (words, at) = scratch();
        let mut ctx = setup(&words);
        let a = ctx.load_const(at, vec![1, 2]);
        let b = ctx.load_const(at, vec![3, 4]);
        let def = ctx.shuffle(a, b, &[3, 0, UNDEF_COMPONENT], at).unwrap();
        let func = &ctx.module.functions[at.function];
        let Instruction::Alu {
            op,
            ref srcs,
            components,
        } = func.instructions[def]
        else {
            panic!("expected an ALU op");
        };
        assert_eq!((op, components), (AluOp::Vec3, 3));
        assert_eq!(srcs[0], AluSrc::lane(b, 1));
        assert_eq!(srcs[1], AluSrc::lane(a, 0));
        assert_eq!(
            func.instructions[srcs[2].value],
            Instruction::Undef { components: 1 }
        );
        assert!(ctx.shuffle(a, b, &[4], at).is_err());
    }
}
