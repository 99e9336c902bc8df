//! Structural validation.
//!
//! Checks the invariants the frontend promises and logs a warning for each
//! problem found. Never modifies the module.

use crate::arena::Handle;
use crate::cf::{Block, CfNode};
use crate::func::Function;
use crate::instr::{Instruction, Jump};
use crate::{IrError, Module};

/// Validates `module`, returning the first problem found.
///
/// Block predecessor lists must be current ([`Function::compute_cfg`]).
pub fn validate(module: &Module) -> Result<(), IrError> {
    let mut problems = Vec::new();

    for (_, var) in module.variables.iter() {
        if !bounded(var.ty.index(), module.types.len(), "type", &mut problems) {
            continue;
        }
        if let Some(init) = var.init {
            bounded(init.index(), module.constants.len(), "constant", &mut problems);
        }
    }

    for ep in &module.entry_points {
        if !module.functions.contains(ep.function) {
            problems.push(IrError::MissingEntryFunction(ep.name.clone()));
        }
    }

    for (_, func) in module.functions.iter() {
        validate_function(module, func, &mut problems);
    }

    for problem in &problems {
        log::warn!("{problem}");
    }
    match problems.into_iter().next() {
        Some(first) => Err(first),
        None => Ok(()),
    }
}

fn bounded(index: usize, size: usize, what: &'static str, problems: &mut Vec<IrError>) -> bool {
    if index < size {
        return true;
    }
    problems.push(IrError::BadHandle { what, index, size });
    false
}

fn validate_function(module: &Module, func: &Function, problems: &mut Vec<IrError>) {
    let name = func.name.as_deref().unwrap_or("<unnamed>");

    for (_, instr) in func.instructions.iter() {
        for source in instr.sources() {
            bounded(
                source.index(),
                func.instructions.len(),
                "instruction",
                problems,
            );
        }
        let derefs = match *instr {
            Instruction::LoadVar { ref deref, .. } | Instruction::StoreVar { ref deref, .. } => {
                vec![deref]
            }
            Instruction::CopyVar { ref dst, ref src } => vec![dst, src],
            Instruction::Texture(ref tex) => vec![&tex.sampler],
            _ => Vec::new(),
        };
        for deref in derefs {
            bounded(
                deref.var.index(),
                module.variables.len(),
                "variable",
                problems,
            );
        }
    }

    validate_list(func, name, &func.body, false, problems);
}

fn validate_list(
    func: &Function,
    name: &str,
    list: &[CfNode],
    in_loop: bool,
    problems: &mut Vec<IrError>,
) {
    for node in list {
        match *node {
            CfNode::Block(block) => validate_block(func, name, block, in_loop, problems),
            CfNode::If(h) => {
                let arms = &func.ifs[h];
                validate_list(func, name, &arms.then_body, in_loop, problems);
                validate_list(func, name, &arms.else_body, in_loop, problems);
            }
            CfNode::Loop(h) => validate_list(func, name, &func.loops[h].body, true, problems),
        }
    }
}

fn validate_block(
    func: &Function,
    name: &str,
    handle: Handle<Block>,
    in_loop: bool,
    problems: &mut Vec<IrError>,
) {
    let block = &func.blocks[handle];
    let mut seen_non_phi = false;
    for (i, &h) in block.instructions.iter().enumerate() {
        let Some(instr) = func.instructions.try_get(h) else {
            continue;
        };
        match *instr {
            Instruction::Phi { ref srcs, .. } => {
                if seen_non_phi {
                    problems.push(IrError::PhiNotLeading {
                        function: name.to_string(),
                        block: handle.index(),
                    });
                }
                if srcs.len() != block.predecessors.len() {
                    problems.push(IrError::PhiSourceMismatch {
                        function: name.to_string(),
                        block: handle.index(),
                        sources: srcs.len(),
                        predecessors: block.predecessors.len(),
                    });
                }
            }
            Instruction::Jump(jump) => {
                seen_non_phi = true;
                if i + 1 != block.instructions.len() {
                    problems.push(IrError::JumpNotLast {
                        function: name.to_string(),
                        block: handle.index(),
                    });
                }
                if matches!(jump, Jump::Break | Jump::Continue) && !in_loop {
                    problems.push(IrError::JumpOutsideLoop {
                        function: name.to_string(),
                        block: handle.index(),
                    });
                }
            }
            _ => seen_non_phi = true,
        }
    }
}
