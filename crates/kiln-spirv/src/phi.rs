//! Phi placeholders and their second-pass resolution.
//!
//! A phi's sources may be defined in blocks the body walk has not reached
//! yet, so the walk only allocates the phi. Once the whole function exists
//! and predecessors are known, the raw instructions are walked again and
//! every phi is wired to the value available along each incoming edge.

use std::collections::HashMap;

use kiln_ir::{Cursor, Handle, Instruction, PhiSource, Position, Type};
use spirv::Op;

use crate::ParseError;
use crate::cfg::{SpvBlock, SpvFunction};
use crate::ssa::SsaValue;
use crate::translate::Translator;
use crate::value::Value;
use crate::words::{self, walk};

/// `(value, parent block)` operand pairs of an `OpPhi`.
fn incoming(instr: &words::Instruction<'_>) -> Result<Vec<(u32, u32)>, ParseError> {
    let pairs = instr.operands_from(2);
    if pairs.is_empty() || pairs.len() % 2 != 0 {
        return Err(ParseError::InvalidOperands(instr.op));
    }
    Ok(pairs.chunks_exact(2).map(|p| (p[0], p[1])).collect())
}

impl Translator<'_> {
    /// First pass: allocates the phi, or aliases its value when the block
    /// continues its only predecessor's IR block.
    pub(crate) fn phi_placeholder(
        &mut self,
        instr: &words::Instruction<'_>,
        at: Cursor,
    ) -> Result<(), ParseError> {
        let ty = self.values.ty(instr.operand(0)?)?;
        let id = instr.operand(1)?;
        let incoming = incoming(instr)?;

        if let Some(pred) = self.linear_pred {
            let label = self.blocks[pred].label;
            let (value, _) = incoming
                .iter()
                .copied()
                .find(|&(_, parent)| parent == label)
                .ok_or_else(|| {
                    ParseError::Lowering(format!("phi %{id} has no value for block %{label}"))
                })?;
            let tree = self.ssa_value(value, at)?;
            return self.values.push(id, Value::Ssa(tree));
        }

        let tree = self.tree_of_type(ty, &mut |t, components| {
            t.emit(
                at,
                Instruction::Phi {
                    srcs: Vec::new(),
                    components,
                },
            )
        })?;
        self.values.push(id, Value::Ssa(tree))?;
        self.pending_phis.insert(id, tree);
        Ok(())
    }

    /// Second pass over `func`.
    pub(crate) fn resolve_phis(&mut self, func: Handle<SpvFunction>) -> Result<(), ParseError> {
        let SpvFunction { start, end, ir, .. } = self.functions[func];
        let words = self.words;

        let mut phis = Vec::new();
        let mut current = None;
        walk(words, start, end, |instr| {
            match instr.op {
                Op::Label => current = Some(self.values.block(instr.operand(0)?)?),
                Op::Phi => {
                    let block = current.ok_or(ParseError::RegionMismatch {
                        offset: instr.offset,
                    })?;
                    phis.push((block, instr));
                }
                _ => {}
            }
            Ok(true)
        })?;

        for (block, instr) in phis {
            let id = instr.operand(1)?;
            let Some(tree) = self.pending_phis.remove(&id) else {
                continue;
            };
            let ty = self.values.ty(instr.operand(0)?)?;
            let incoming = incoming(&instr)?;
            let target = self.blocks[block].ir_start.ok_or_else(|| {
                ParseError::Lowering(format!("phi %{id} is in a block that was never reached"))
            })?;
            log::debug!("resolving phi %{id}");

            let mut memo = HashMap::new();
            let preds = self.module.functions[ir].blocks[target].predecessors.clone();
            for pred in preds {
                let source = self.source_at(ir, pred, &incoming, ty, &mut memo)?;
                self.add_phi_sources(ir, tree, pred, source);
            }
        }
        Ok(())
    }

    /// The value of the phi operands available at the end of `pred`.
    fn source_at(
        &mut self,
        function: Handle<kiln_ir::Function>,
        pred: Handle<kiln_ir::Block>,
        incoming: &[(u32, u32)],
        ty: Handle<Type>,
        memo: &mut HashMap<Handle<kiln_ir::Block>, Handle<SsaValue>>,
    ) -> Result<Handle<SsaValue>, ParseError> {
        if let Some(&spv) = self.end_blocks.get(&pred) {
            if let Some(value) = self.listed_value(spv, incoming) {
                return self.ssa_value(value, Cursor::before_jump(function, pred));
            }
        }
        if let Some(&known) = memo.get(&pred) {
            return Ok(known);
        }

        let at = Cursor {
            function,
            position: Position::BlockStart(pred),
        };
        let phi = self.tree_of_type(ty, &mut |t, components| {
            t.emit(
                at,
                Instruction::Phi {
                    srcs: Vec::new(),
                    components,
                },
            )
        })?;
        memo.insert(pred, phi);

        let preds = self.module.functions[function].blocks[pred]
            .predecessors
            .clone();
        if preds.is_empty() {
            return Err(ParseError::Lowering(
                "phi operand is not available on every incoming edge".into(),
            ));
        }
        for outer in preds {
            let source = self.source_at(function, outer, incoming, ty, memo)?;
            self.add_phi_sources(function, phi, outer, source);
        }
        Ok(phi)
    }

    fn listed_value(&self, block: Handle<SpvBlock>, incoming: &[(u32, u32)]) -> Option<u32> {
        let label = self.blocks[block].label;
        incoming
            .iter()
            .find(|&&(_, parent)| parent == label)
            .map(|&(value, _)| value)
    }

    /// Adds `source` as the value of every leaf of `phi` along `pred`.
    fn add_phi_sources(
        &mut self,
        function: Handle<kiln_ir::Function>,
        phi: Handle<SsaValue>,
        pred: Handle<kiln_ir::Block>,
        source: Handle<SsaValue>,
    ) {
        let dests = self.leaves(phi);
        let values = self.leaves(source);
        let instructions = &mut self.module.functions[function].instructions;
        for (dest, value) in dests.into_iter().zip(values) {
            if let Instruction::Phi { ref mut srcs, .. } = instructions[dest] {
                srcs.push(PhiSource { pred, value });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use kiln_ir::{CfNode, Jump};

    use crate::assembler::Assembler;
    use crate::parse;

    use super::*;

    /// `x = c ? 1 : 2` through a selection merge with a phi.
    #[test]
    fn merge_phi_has_one_source_per_arm() {
        let mut asm = Assembler::new();
        let void = asm.type_void();
        let bool_ty = asm.type_bool();
        let int = asm.type_int(32, true);
        let fn_ty = asm.type_function(void, &[]);
        let cond = asm.constant_bool(bool_ty, true);
        let one = asm.constant(int, 1);
        let two = asm.constant(int, 2);
        asm.function(void, fn_ty);
        let (entry, then_label, merge, x) = (asm.id(), asm.id(), asm.id(), asm.id());
        asm.label(entry);
        asm.selection_merge(merge);
        asm.branch_conditional(cond, then_label, merge);
        asm.label(then_label);
        asm.branch(merge);
        asm.label(merge);
        asm.phi(int, x, &[(one, then_label), (two, entry)]);
        asm.ret();
        asm.function_end();
        let words = asm.finish();

        let module = parse(&words).unwrap();
        let (_, func) = module.functions.iter().next().unwrap();
        let merge_block = func.tail_block(kiln_ir::CfList::Body);
        let phi = func.blocks[merge_block].instructions[0];
        let Instruction::Phi { ref srcs, .. } = func.instructions[phi] else {
            panic!("expected a phi, got {:?}", func.instructions[phi]);
        };
        assert_eq!(srcs.len(), 2);
        let node = func
            .body
            .iter()
            .find_map(|n| match *n {
                CfNode::If(h) => Some(h),
                _ => None,
            })
            .unwrap();
        let then_first = func.first_block(kiln_ir::CfList::Then(node));
        let else_first = func.first_block(kiln_ir::CfList::Else(node));
        let from_then = srcs.iter().find(|s| s.pred == then_first).unwrap();
        let from_else = srcs.iter().find(|s| s.pred == else_first).unwrap();
        assert_eq!(
            func.instructions[from_then.value],
            Instruction::LoadConst { bits: vec![1] }
        );
        assert_eq!(
            func.instructions[from_else.value],
            Instruction::LoadConst { bits: vec![2] }
        );
        assert_eq!(func.block_jump(merge_block), Some(Jump::Return));
    }

    #[test]
    fn phi_after_plain_branch_aliases_its_value() {
        let mut asm = Assembler::new();
        let void = asm.type_void();
        let int = asm.type_int(32, true);
        let fn_ty = asm.type_function(void, &[]);
        let seven = asm.constant(int, 7);
        asm.function(void, fn_ty);
        let (entry, next, x) = (asm.id(), asm.id(), asm.id());
        asm.label(entry);
        asm.branch(next);
        asm.label(next);
        asm.phi(int, x, &[(seven, entry)]);
        asm.ret();
        asm.function_end();
        let words = asm.finish();

        let module = parse(&words).unwrap();
        let (_, func) = module.functions.iter().next().unwrap();
        assert_eq!(func.blocks.len(), 1);
        assert!(!func.instructions.iter().any(|(_, i)| i.is_phi()));
    }

    #[test]
    fn phi_pairs_must_be_complete() {
        let mut asm = Assembler::new();
        let void = asm.type_void();
        let int = asm.type_int(32, true);
        let fn_ty = asm.type_function(void, &[]);
        let seven = asm.constant(int, 7);
        asm.function(void, fn_ty);
        let (entry, next, x) = (asm.id(), asm.id(), asm.id());
        asm.label(entry);
        asm.branch(next);
        asm.label(next);
        asm.emit(Op::Phi, &[int, x, seven]);
        asm.ret();
        asm.function_end();
        let words = asm.finish();
        assert!(matches!(
            parse(&words),
            Err(ParseError::InvalidOperands(Op::Phi))
        ));
    }
}
