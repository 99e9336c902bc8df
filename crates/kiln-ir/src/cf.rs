//! Structured control flow.
//!
//! A function body is a list of [`CfNode`]s. Every list starts and ends with
//! a [`Block`]; inserting an `If` or `Loop` node always appends a fresh block
//! after it, so there is always a block to continue emitting into.

use crate::arena::Handle;
use crate::func::Function;
use crate::instr::Instruction;

/// A basic block: straight-line instructions plus the edges computed by
/// [`Function::compute_cfg`].
#[derive(Clone, Debug, Default)]
pub struct Block {
    pub instructions: Vec<Handle<Instruction>>,
    pub predecessors: Vec<Handle<Block>>,
    pub successors: Vec<Handle<Block>>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CfNode {
    Block(Handle<Block>),
    If(Handle<IfNode>),
    Loop(Handle<LoopNode>),
}

/// A two-armed conditional. Both arms exist even when one is empty.
#[derive(Clone, Debug)]
pub struct IfNode {
    pub condition: Handle<Instruction>,
    pub then_body: Vec<CfNode>,
    pub else_body: Vec<CfNode>,
}

/// An infinite loop, left through `Break` or `Return`. Falling off the end of
/// the body, or `Continue`, goes back to the first block.
#[derive(Clone, Debug)]
pub struct LoopNode {
    pub body: Vec<CfNode>,
}

/// Names one control-flow list of a function.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CfList {
    /// The function body.
    Body,
    Then(Handle<IfNode>),
    Else(Handle<IfNode>),
    Loop(Handle<LoopNode>),
}

/// Where to put the next instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Position {
    /// Append to the last block of a list.
    End(CfList),
    /// Insert into a block before its jump, or at its end if it has none.
    BeforeJump(Handle<Block>),
    /// Insert ahead of everything already in a block.
    BlockStart(Handle<Block>),
}

/// An insertion point inside a specific function.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Cursor {
    pub function: Handle<Function>,
    pub position: Position,
}

impl Cursor {
    pub fn end_of(function: Handle<Function>, list: CfList) -> Self {
        Self {
            function,
            position: Position::End(list),
        }
    }

    pub fn before_jump(function: Handle<Function>, block: Handle<Block>) -> Self {
        Self {
            function,
            position: Position::BeforeJump(block),
        }
    }
}
