//! Control-flow reconstruction.
//!
//! The prepass registers every function and block without emitting IR. The
//! body walk then rebuilds structured control flow from the merge
//! annotations, recursing into loop bodies and selection arms.

use std::collections::HashSet;

use kiln_ir::{
    CfList, Cursor, Deref, Function, Handle, Instruction, Jump, TypeInner, Variable, VariableMode,
};
use spirv::Op;

use crate::ParseError;
use crate::translate::Translator;
use crate::value::Value;
use crate::words::{self, walk};

/// The merge annotation of a block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Merge {
    None,
    Selection { merge: u32 },
    Loop { merge: u32, cont: u32 },
}

#[derive(Clone, Debug)]
pub(crate) struct SpvBlock {
    pub label: u32,
    pub function: Handle<SpvFunction>,
    /// First word after `OpLabel`.
    pub start: usize,
    /// Offset of the merge instruction, or of the branch when there is none.
    pub body_end: usize,
    /// Offset of the terminating instruction.
    pub branch: usize,
    pub merge: Merge,
    /// IR block the body was emitted into, once walked.
    pub ir_start: Option<Handle<kiln_ir::Block>>,
}

#[derive(Clone, Debug)]
pub(crate) struct SpvFunction {
    pub id: u32,
    /// First word after `OpFunction`.
    pub start: usize,
    /// Offset of `OpFunctionEnd`.
    pub end: usize,
    pub entry: Option<Handle<SpvBlock>>,
    pub ir: Handle<Function>,
}

/// Open function and block while scanning.
#[derive(Default)]
struct Prepass {
    function: Option<Handle<SpvFunction>>,
    block: Option<Handle<SpvBlock>>,
}

/// Where branches out of the region being walked go.
#[derive(Clone, Copy, Debug, Default)]
struct Scope {
    brk: Option<Handle<SpvBlock>>,
    cont: Option<Handle<SpvBlock>>,
    end: Option<Handle<SpvBlock>>,
}

// ---------------------------------------------------------------------------
// Prepass
// ---------------------------------------------------------------------------

impl Translator<'_> {
    /// Registers the functions and blocks in `words[start..end]`.
    pub(crate) fn prepass(&mut self, start: usize, end: usize) -> Result<(), ParseError> {
        let words = self.words;
        let mut state = Prepass::default();
        walk(words, start, end, |instr| {
            self.prepass_instr(&instr, &mut state)?;
            Ok(true)
        })?;
        if state.function.is_some() {
            return Err(ParseError::RegionMismatch { offset: end });
        }
        Ok(())
    }

    fn prepass_instr(
        &mut self,
        instr: &words::Instruction<'_>,
        state: &mut Prepass,
    ) -> Result<(), ParseError> {
        let offset = instr.offset;
        match instr.op {
            Op::Function => {
                if state.function.is_some() {
                    return Err(ParseError::RegionMismatch { offset });
                }
                let result = self.values.ty(instr.operand(0)?)?;
                let id = instr.operand(1)?;
                self.values.ty(instr.operand(3)?)?;

                let mut function = Function::new(self.values.name(id));
                if !matches!(self.module.types[result].inner, TypeInner::Void) {
                    function.result = Some(result);
                }
                let ir = self.module.functions.append(function);
                let handle = self.functions.append(SpvFunction {
                    id,
                    start: offset + instr.word_count(),
                    end: offset,
                    entry: None,
                    ir,
                });
                self.values.push(id, Value::Function(handle))?;
                state.function = Some(handle);
            }
            Op::FunctionParameter => {
                return Err(ParseError::Unsupported("function parameters".into()));
            }
            Op::FunctionEnd => {
                let function = state
                    .function
                    .take()
                    .ok_or(ParseError::RegionMismatch { offset })?;
                if state.block.is_some() {
                    return Err(ParseError::RegionMismatch { offset });
                }
                self.functions[function].end = offset;
            }
            Op::Label => {
                let function = state
                    .function
                    .ok_or(ParseError::RegionMismatch { offset })?;
                if state.block.is_some() {
                    return Err(ParseError::RegionMismatch { offset });
                }
                let label = instr.operand(0)?;
                let block = self.blocks.append(SpvBlock {
                    label,
                    function,
                    start: offset + instr.word_count(),
                    body_end: offset,
                    branch: offset,
                    merge: Merge::None,
                    ir_start: None,
                });
                self.values.push(label, Value::Block(block))?;
                self.functions[function].entry.get_or_insert(block);
                state.block = Some(block);
            }
            Op::SelectionMerge | Op::LoopMerge => {
                let block = state.block.ok_or(ParseError::RegionMismatch { offset })?;
                let merge = instr.operand(0)?;
                self.blocks[block].merge = match instr.op {
                    Op::LoopMerge => Merge::Loop {
                        merge,
                        cont: instr.operand(1)?,
                    },
                    _ => Merge::Selection { merge },
                };
                self.blocks[block].body_end = offset;
            }
            Op::Branch
            | Op::BranchConditional
            | Op::Switch
            | Op::Return
            | Op::ReturnValue
            | Op::Kill
            | Op::Unreachable => {
                let block = state
                    .block
                    .take()
                    .ok_or(ParseError::RegionMismatch { offset })?;
                let info = &mut self.blocks[block];
                if info.merge == Merge::None {
                    info.body_end = offset;
                }
                info.branch = offset;
            }
            op => {
                if state.function.is_none() {
                    return Err(ParseError::UnsupportedOpcode(op));
                }
                if state.block.is_none() {
                    return Err(ParseError::RegionMismatch { offset });
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Body walk
// ---------------------------------------------------------------------------

impl Translator<'_> {
    /// Emits the IR body of `func` and resolves its phis.
    pub(crate) fn emit_function(&mut self, func: Handle<SpvFunction>) -> Result<(), ParseError> {
        let SpvFunction { id, entry, ir, .. } = self.functions[func];
        let entry = entry.ok_or_else(|| {
            ParseError::Lowering(format!("function %{id} has no blocks"))
        })?;
        log::info!(
            "translating function %{id} ({})",
            self.module.functions[ir].name.as_deref().unwrap_or("<anonymous>")
        );

        self.end_blocks.clear();
        self.pending_phis.clear();
        self.linear_pred = None;

        if let Some(result) = self.module.functions[ir].result {
            let var = Variable::new(Some("return_value".into()), result, VariableMode::Local);
            let var = self.module.add_variable(var, Some(ir));
            self.module.functions[ir].return_var = Some(var);
        }

        self.walk_blocks(ir, CfList::Body, entry, Scope::default())?;
        self.module.functions[ir].compute_cfg();
        self.resolve_phis(func)
    }

    /// Walks from `first` until the region ends, emitting into `list`.
    fn walk_blocks(
        &mut self,
        function: Handle<Function>,
        list: CfList,
        first: Handle<SpvBlock>,
        scope: Scope,
    ) -> Result<(), ParseError> {
        let mut block = first;
        let mut linear = None;
        let mut visited = HashSet::new();
        loop {
            if Some(block) == scope.end {
                return Ok(());
            }
            if !visited.insert(block) {
                return Err(ParseError::Lowering(format!(
                    "block %{} is reached again without a loop merge",
                    self.blocks[block].label
                )));
            }
            let SpvBlock {
                start,
                body_end,
                branch,
                merge,
                ..
            } = self.blocks[block];

            if let Merge::Loop { merge, cont } = merge {
                if Some(block) != scope.cont {
                    log::trace!(
                        "loop at %{}: merge %{merge}, continue construct %{cont}",
                        self.blocks[block].label
                    );
                    let node = self.module.functions[function].insert_loop(list);
                    let body = Scope {
                        brk: Some(self.values.block(merge)?),
                        cont: Some(block),
                        end: None,
                    };
                    self.walk_blocks(function, CfList::Loop(node), block, body)?;
                    block = self.values.block(merge)?;
                    linear = None;
                    continue;
                }
            }

            let tail = self.module.functions[function].tail_block(list);
            self.blocks[block].ir_start = Some(tail);
            self.linear_pred = linear;
            let at = Cursor::end_of(function, list);
            let words = self.words;
            walk(words, start, body_end, |instr| {
                self.handle_body(&instr, at)?;
                Ok(true)
            })?;
            self.linear_pred = None;
            let tail = self.module.functions[function].tail_block(list);
            self.end_blocks.insert(tail, block);

            let terminator = walk_one(words, branch)?;
            match terminator.op {
                Op::Branch => {
                    let target = self.values.block(terminator.operand(0)?)?;
                    match self.follow(function, list, scope, target) {
                        Some(next) => {
                            linear = Some(block);
                            block = next;
                        }
                        None => return Ok(()),
                    }
                }
                Op::BranchConditional => {
                    let cond = self.ssa_def(terminator.operand(0)?, at)?;
                    let then_block = self.values.block(terminator.operand(1)?)?;
                    let else_block = self.values.block(terminator.operand(2)?)?;
                    let jumps = |target: Handle<SpvBlock>| {
                        (Some(target) == scope.brk || Some(target) == scope.cont)
                            .then_some(target)
                    };

                    let func = &mut self.module.functions[function];
                    let node = func.insert_if(list, cond);
                    let then_first = func.first_block(CfList::Then(node));
                    let else_first = func.first_block(CfList::Else(node));
                    self.end_blocks.insert(then_first, block);
                    self.end_blocks.insert(else_first, block);

                    let taken = match (jumps(then_block), jumps(else_block)) {
                        (Some(target), _) => Some((CfList::Then(node), target, else_block)),
                        (None, Some(target)) => Some((CfList::Else(node), target, then_block)),
                        (None, None) => None,
                    };
                    if let Some((arm, target, other)) = taken {
                        let jump = if Some(target) == scope.brk {
                            Jump::Break
                        } else {
                            Jump::Continue
                        };
                        self.module
                            .insert(Cursor::end_of(function, arm), Instruction::Jump(jump));
                        match self.follow(function, list, scope, other) {
                            Some(next) => {
                                linear = None;
                                block = next;
                                continue;
                            }
                            None => return Ok(()),
                        }
                    }

                    let Merge::Selection { merge } = merge else {
                        return Err(ParseError::MissingSelectionMerge(self.blocks[block].label));
                    };
                    let merge = self.values.block(merge)?;
                    let arms = Scope {
                        end: Some(merge),
                        ..scope
                    };
                    self.walk_blocks(function, CfList::Then(node), then_block, arms)?;
                    self.walk_blocks(function, CfList::Else(node), else_block, arms)?;
                    match self.follow(function, list, scope, merge) {
                        Some(next) => {
                            linear = None;
                            block = next;
                        }
                        None => return Ok(()),
                    }
                }
                Op::Return => {
                    self.module.insert(at, Instruction::Jump(Jump::Return));
                    return Ok(());
                }
                Op::ReturnValue => {
                    let var = self.module.functions[function].return_var.ok_or_else(|| {
                        ParseError::Lowering("value returned from a void function".into())
                    })?;
                    let value = self.ssa_value(terminator.operand(0)?, at)?;
                    self.store_tree(&Deref::var(var), value, at)?;
                    self.module.insert(at, Instruction::Jump(Jump::Return));
                    return Ok(());
                }
                Op::Kill => {
                    self.module.insert(at, Instruction::Discard);
                    return Ok(());
                }
                op => return Err(ParseError::UnsupportedOpcode(op)),
            }
        }
    }

    /// Emits the jump for a branch to `target` leaving the region, or
    /// returns the block the walk continues at.
    fn follow(
        &mut self,
        function: Handle<Function>,
        list: CfList,
        scope: Scope,
        target: Handle<SpvBlock>,
    ) -> Option<Handle<SpvBlock>> {
        let jump = if Some(target) == scope.end {
            return None;
        } else if Some(target) == scope.brk {
            Jump::Break
        } else if Some(target) == scope.cont {
            Jump::Continue
        } else {
            return Some(target);
        };
        self.module
            .insert(Cursor::end_of(function, list), Instruction::Jump(jump));
        None
    }
}

/// Decodes the single instruction at `offset`.
fn walk_one(words: &[u32], offset: usize) -> Result<words::Instruction<'_>, ParseError> {
    let mut found = None;
    walk(words, offset, words.len(), |instr| {
        found = Some(instr);
        Ok(false)
    })?;
    found.ok_or(ParseError::RegionMismatch { offset })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::Assembler;
    use crate::{Options, parse};

    fn cfg_of(words: &[u32]) -> Translator<'_> {
        let mut ctx = Translator::new(words, words[3], Options::default());
        let body = walk(words, crate::HEADER_WORDS, words.len(), |instr| {
            ctx.handle_preamble(&instr)
        })
        .unwrap();
        ctx.prepass(body, words.len()).unwrap();
        ctx
    }

    #[test]
    fn prepass_registers_blocks_and_merges() {
        let mut asm = Assembler::new();
        let void = asm.type_void();
        let bool_ty = asm.type_bool();
        let fn_ty = asm.type_function(void, &[]);
        let cond = asm.constant_bool(bool_ty, true);
        let main = asm.function(void, fn_ty);
        let (entry, then_label, merge) = (asm.id(), asm.id(), asm.id());
        asm.label(entry);
        asm.selection_merge(merge);
        asm.branch_conditional(cond, then_label, merge);
        asm.label(then_label);
        asm.branch(merge);
        asm.label(merge);
        asm.ret();
        asm.function_end();
        let words = asm.finish();

        let ctx = cfg_of(&words);
        let func = ctx.values.function(main).unwrap();
        let entry_block = ctx.values.block(entry).unwrap();
        assert_eq!(ctx.functions[func].entry, Some(entry_block));
        assert_eq!(ctx.blocks.len(), 3);
        assert_eq!(ctx.blocks[entry_block].merge, Merge::Selection { merge });
        let info = &ctx.blocks[entry_block];
        assert!(info.body_end < info.branch);
    }

    #[test]
    fn unterminated_block_is_rejected() {
        let mut asm = Assembler::new();
        let void = asm.type_void();
        let fn_ty = asm.type_function(void, &[]);
        asm.function(void, fn_ty);
        let label = asm.id();
        asm.label(label);
        asm.function_end();
        let words = asm.finish();
        assert!(matches!(
            parse(&words),
            Err(ParseError::RegionMismatch { .. })
        ));
    }

    #[test]
    fn missing_function_end_is_rejected() {
        let mut asm = Assembler::new();
        let void = asm.type_void();
        let fn_ty = asm.type_function(void, &[]);
        asm.function(void, fn_ty);
        let label = asm.id();
        asm.label(label);
        asm.ret();
        let words = asm.finish();
        assert!(matches!(
            parse(&words),
            Err(ParseError::RegionMismatch { .. })
        ));
    }

    #[test]
    fn two_sided_branch_needs_selection_merge() {
        let mut asm = Assembler::new();
        let void = asm.type_void();
        let bool_ty = asm.type_bool();
        let fn_ty = asm.type_function(void, &[]);
        let cond = asm.constant_bool(bool_ty, false);
        asm.function(void, fn_ty);
        let (entry, a, b) = (asm.id(), asm.id(), asm.id());
        asm.label(entry);
        asm.branch_conditional(cond, a, b);
        asm.label(a);
        asm.ret();
        asm.label(b);
        asm.ret();
        asm.function_end();
        let words = asm.finish();
        assert!(matches!(
            parse(&words),
            Err(ParseError::MissingSelectionMerge(label)) if label == entry
        ));
    }

    #[test]
    fn switch_is_unsupported() {
        let mut asm = Assembler::new();
        let void = asm.type_void();
        let int = asm.type_int(32, true);
        let fn_ty = asm.type_function(void, &[]);
        let zero = asm.constant(int, 0);
        asm.function(void, fn_ty);
        let (entry, exit) = (asm.id(), asm.id());
        asm.label(entry);
        asm.selection_merge(exit);
        asm.emit(Op::Switch, &[zero, exit]);
        asm.label(exit);
        asm.ret();
        asm.function_end();
        let words = asm.finish();
        assert!(matches!(
            parse(&words),
            Err(ParseError::UnsupportedOpcode(Op::Switch))
        ));
    }

    #[test]
    fn kill_emits_discard() {
        let mut asm = Assembler::new();
        let void = asm.type_void();
        let fn_ty = asm.type_function(void, &[]);
        asm.function(void, fn_ty);
        let entry = asm.id();
        asm.label(entry);
        asm.kill();
        asm.function_end();
        let words = asm.finish();

        let module = parse(&words).unwrap();
        let (_, func) = module.functions.iter().next().unwrap();
        let block = func.entry_block();
        let last = *func.blocks[block].instructions.last().unwrap();
        assert_eq!(func.instructions[last], Instruction::Discard);
    }

    #[test]
    fn branch_cycle_without_loop_merge_is_rejected() {
        let mut asm = Assembler::new();
        let void = asm.type_void();
        let fn_ty = asm.type_function(void, &[]);
        asm.function(void, fn_ty);
        let (entry, spin) = (asm.id(), asm.id());
        asm.label(entry);
        asm.branch(spin);
        asm.label(spin);
        asm.branch(spin);
        asm.function_end();
        let words = asm.finish();
        assert!(matches!(parse(&words), Err(ParseError::Lowering(_))));
    }
}
