//! Functions, their control-flow builder operations, and entry points.

use crate::arena::{Arena, Handle};
use crate::cf::{Block, CfList, CfNode, IfNode, LoopNode, Position};
use crate::global::Variable;
use crate::instr::{Instruction, Jump};
use crate::types::Type;

/// Pipeline stage of an entry point.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ShaderStage {
    Vertex,
    TessControl,
    TessEval,
    Geometry,
    Fragment,
    Compute,
}

/// An entry point into the module.
#[derive(Clone, Debug)]
pub struct EntryPoint {
    pub name: String,
    pub stage: ShaderStage,
    pub function: Handle<Function>,
}

/// A function: instruction and control-flow arenas plus the body list.
#[derive(Clone, Debug)]
pub struct Function {
    pub name: Option<String>,
    /// Return type; `None` for void.
    pub result: Option<Handle<Type>>,
    /// Function-local variables (stored in the module's variable arena).
    pub locals: Vec<Handle<Variable>>,
    /// Local variable holding the returned value of a non-void function.
    pub return_var: Option<Handle<Variable>>,
    pub instructions: Arena<Instruction>,
    pub blocks: Arena<Block>,
    pub ifs: Arena<IfNode>,
    pub loops: Arena<LoopNode>,
    pub body: Vec<CfNode>,
}

impl Function {
    /// Creates a function whose body is one empty block.
    pub fn new(name: Option<String>) -> Self {
        let mut blocks = Arena::new();
        let entry = blocks.append(Block::default());
        Self {
            name,
            result: None,
            locals: Vec::new(),
            return_var: None,
            instructions: Arena::new(),
            blocks,
            ifs: Arena::new(),
            loops: Arena::new(),
            body: vec![CfNode::Block(entry)],
        }
    }

    /// The block control enters the function through.
    pub fn entry_block(&self) -> Handle<Block> {
        self.first_block(CfList::Body)
    }

    pub fn list(&self, list: CfList) -> &[CfNode] {
        match list {
            CfList::Body => &self.body,
            CfList::Then(h) => &self.ifs[h].then_body,
            CfList::Else(h) => &self.ifs[h].else_body,
            CfList::Loop(h) => &self.loops[h].body,
        }
    }

    fn list_mut(&mut self, list: CfList) -> &mut Vec<CfNode> {
        match list {
            CfList::Body => &mut self.body,
            CfList::Then(h) => &mut self.ifs[h].then_body,
            CfList::Else(h) => &mut self.ifs[h].else_body,
            CfList::Loop(h) => &mut self.loops[h].body,
        }
    }

    /// The block instructions appended to `list` go to.
    pub fn tail_block(&self, list: CfList) -> Handle<Block> {
        match self.list(list).last() {
            Some(&CfNode::Block(block)) => block,
            _ => unreachable!("control-flow list {list:?} does not end in a block"),
        }
    }

    pub fn first_block(&self, list: CfList) -> Handle<Block> {
        match self.list(list).first() {
            Some(&CfNode::Block(block)) => block,
            _ => unreachable!("control-flow list {list:?} does not start with a block"),
        }
    }

    /// Returns the jump ending `block`, if any.
    pub fn block_jump(&self, block: Handle<Block>) -> Option<Jump> {
        let last = *self.blocks[block].instructions.last()?;
        self.instructions[last].as_jump()
    }

    /// Allocates `instr` and places it at `position`.
    pub fn insert(&mut self, position: Position, instr: Instruction) -> Handle<Instruction> {
        let block = match position {
            Position::End(list) => self.tail_block(list),
            Position::BeforeJump(block) | Position::BlockStart(block) => block,
        };
        let has_jump = self.block_jump(block).is_some();
        let handle = self.instructions.append(instr);
        let instructions = &mut self.blocks[block].instructions;
        match position {
            Position::End(_) => instructions.push(handle),
            Position::BeforeJump(_) => {
                let at = instructions.len() - usize::from(has_jump);
                instructions.insert(at, handle);
            }
            Position::BlockStart(_) => instructions.insert(0, handle),
        }
        handle
    }

    fn new_list(&mut self) -> Vec<CfNode> {
        vec![CfNode::Block(self.blocks.append(Block::default()))]
    }

    /// Appends an `If` node to `list`, followed by a fresh block.
    pub fn insert_if(&mut self, list: CfList, condition: Handle<Instruction>) -> Handle<IfNode> {
        let then_body = self.new_list();
        let else_body = self.new_list();
        let node = self.ifs.append(IfNode {
            condition,
            then_body,
            else_body,
        });
        let after = self.blocks.append(Block::default());
        let target = self.list_mut(list);
        target.push(CfNode::If(node));
        target.push(CfNode::Block(after));
        node
    }

    /// Appends a `Loop` node to `list`, followed by a fresh block.
    pub fn insert_loop(&mut self, list: CfList) -> Handle<LoopNode> {
        let body = self.new_list();
        let node = self.loops.append(LoopNode { body });
        let after = self.blocks.append(Block::default());
        let target = self.list_mut(list);
        target.push(CfNode::Loop(node));
        target.push(CfNode::Block(after));
        node
    }

    /// Blocks in structured order: the order a reader of the body sees them.
    pub fn blocks_in_order(&self) -> Vec<Handle<Block>> {
        let mut out = Vec::with_capacity(self.blocks.len());
        self.collect_blocks(&self.body, &mut out);
        out
    }

    fn collect_blocks(&self, list: &[CfNode], out: &mut Vec<Handle<Block>>) {
        for node in list {
            match *node {
                CfNode::Block(block) => out.push(block),
                CfNode::If(h) => {
                    self.collect_blocks(&self.ifs[h].then_body, out);
                    self.collect_blocks(&self.ifs[h].else_body, out);
                }
                CfNode::Loop(h) => self.collect_blocks(&self.loops[h].body, out),
            }
        }
    }

    /// Recomputes the successor and predecessor lists of every block.
    pub fn compute_cfg(&mut self) {
        let mut edges = Vec::new();
        self.collect_edges(&self.body, &[], None, &mut edges);
        for (_, block) in self.blocks.iter_mut() {
            block.predecessors.clear();
            block.successors.clear();
        }
        for (from, to) in edges {
            if !self.blocks[from].successors.contains(&to) {
                self.blocks[from].successors.push(to);
            }
            if !self.blocks[to].predecessors.contains(&from) {
                self.blocks[to].predecessors.push(from);
            }
        }
    }

    /// Blocks control enters `node` through.
    fn node_entries(&self, node: CfNode) -> Vec<Handle<Block>> {
        match node {
            CfNode::Block(block) => vec![block],
            CfNode::If(h) => vec![
                self.first_block(CfList::Then(h)),
                self.first_block(CfList::Else(h)),
            ],
            CfNode::Loop(h) => vec![self.first_block(CfList::Loop(h))],
        }
    }

    /// `follow` is where control goes after the last node of `list`;
    /// `innermost_loop` is `(loop head, blocks after the loop)`.
    fn collect_edges(
        &self,
        list: &[CfNode],
        follow: &[Handle<Block>],
        innermost_loop: Option<(Handle<Block>, &[Handle<Block>])>,
        edges: &mut Vec<(Handle<Block>, Handle<Block>)>,
    ) {
        for (i, &node) in list.iter().enumerate() {
            let next = match list.get(i + 1) {
                Some(&next) => self.node_entries(next),
                None => follow.to_vec(),
            };
            match node {
                CfNode::Block(block) => {
                    let targets = match self.block_jump(block) {
                        Some(Jump::Break) => innermost_loop
                            .map(|(_, after)| after.to_vec())
                            .unwrap_or_default(),
                        Some(Jump::Continue) => innermost_loop
                            .map(|(head, _)| vec![head])
                            .unwrap_or_default(),
                        Some(Jump::Return) => Vec::new(),
                        None => next.clone(),
                    };
                    edges.extend(targets.into_iter().map(|to| (block, to)));
                }
                CfNode::If(h) => {
                    let arms = &self.ifs[h];
                    self.collect_edges(&arms.then_body, &next, innermost_loop, edges);
                    self.collect_edges(&arms.else_body, &next, innermost_loop, edges);
                }
                CfNode::Loop(h) => {
                    let head = self.first_block(CfList::Loop(h));
                    self.collect_edges(
                        &self.loops[h].body,
                        &[head],
                        Some((head, next.as_slice())),
                        edges,
                    );
                }
            }
        }
    }
}
