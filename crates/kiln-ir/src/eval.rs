//! Reference evaluator.
//!
//! Interprets one function over a flat memory model so translated shaders
//! can be checked numerically. Memory holds one four-lane slot per variable
//! and resolved index path; unwritten slots read as zero. Derivatives and
//! texture results evaluate to zero.

use std::collections::HashMap;

use crate::arena::Handle;
use crate::cf::{Block, CfNode};
use crate::constant::ConstantValue;
use crate::deref::{ArrayIndex, Deref, DerefLink};
use crate::func::Function;
use crate::global::Variable;
use crate::instr::{AluOp, AluSrc, Instruction, Jump, TRUE};
use crate::types::TypeInner;
use crate::{Constant, Module};

/// The four lanes of a register or memory slot.
pub type Lanes = [u32; 4];

const DEFAULT_STEP_LIMIT: usize = 100_000;

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("block step limit of {0} exceeded")]
    StepLimit(usize),
    #[error("%{0} read before it was defined")]
    Undefined(usize),
    #[error("phi %{instr} has no source for predecessor {pred:?}")]
    MissingPhiSource { instr: usize, pred: Option<usize> },
    #[error("{0} executed outside of a loop")]
    StrayJump(Jump),
}

enum Flow {
    Next,
    Break,
    Continue,
    Return,
}

struct Frame<'m> {
    func: &'m Function,
    values: HashMap<Handle<Instruction>, Lanes>,
    prev: Option<Handle<Block>>,
    steps: usize,
}

impl Frame<'_> {
    fn value(&self, handle: Handle<Instruction>) -> Result<Lanes, EvalError> {
        self.values
            .get(&handle)
            .copied()
            .ok_or(EvalError::Undefined(handle.index()))
    }

    fn src(&self, src: &AluSrc) -> Result<Lanes, EvalError> {
        let value = self.value(src.value)?;
        Ok(src.swizzle.map(|lane| value[usize::from(lane & 3)]))
    }
}

/// Interprets functions of one module against a shared memory.
pub struct Evaluator<'m> {
    module: &'m Module,
    memory: HashMap<(Handle<Variable>, Vec<u32>), Lanes>,
    step_limit: usize,
    discarded: bool,
}

impl<'m> Evaluator<'m> {
    /// Creates an evaluator with every variable initializer applied.
    pub fn new(module: &'m Module) -> Self {
        let mut eval = Self {
            module,
            memory: HashMap::new(),
            step_limit: DEFAULT_STEP_LIMIT,
            discarded: false,
        };
        for (handle, var) in module.variables.iter() {
            if let Some(init) = var.init {
                eval.write_constant(handle, &mut Vec::new(), init);
            }
        }
        eval
    }

    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    fn write_constant(&mut self, var: Handle<Variable>, path: &mut Vec<u32>, handle: Handle<Constant>) {
        let constant = &self.module.constants[handle];
        match constant.value {
            ConstantValue::Flat(ref bits) => match self.module.types[constant.ty].inner {
                TypeInner::Matrix { columns, rows, .. } => {
                    let rows = rows as usize;
                    for column in 0..columns as usize {
                        let start = (column * rows).min(bits.len());
                        let end = (start + rows).min(bits.len());
                        path.push(column as u32);
                        self.write(var, path, &bits[start..end]);
                        path.pop();
                    }
                }
                _ => self.write(var, path, bits),
            },
            ConstantValue::Composite(ref children) => {
                for (i, &child) in children.iter().enumerate() {
                    path.push(i as u32);
                    self.write_constant(var, path, child);
                    path.pop();
                }
            }
        }
    }

    /// Writes up to four lanes into the slot at `path`.
    pub fn write(&mut self, var: Handle<Variable>, path: &[u32], lanes: &[u32]) {
        let mut slot = [0; 4];
        for (dst, &src) in slot.iter_mut().zip(lanes) {
            *dst = src;
        }
        self.memory.insert((var, path.to_vec()), slot);
    }

    pub fn write_f32(&mut self, var: Handle<Variable>, path: &[u32], lanes: &[f32]) {
        let bits: Vec<u32> = lanes.iter().map(|v| v.to_bits()).collect();
        self.write(var, path, &bits);
    }

    /// Reads the slot at `path`; unwritten slots are zero.
    pub fn read(&self, var: Handle<Variable>, path: &[u32]) -> Lanes {
        self.memory
            .get(&(var, path.to_vec()))
            .copied()
            .unwrap_or_default()
    }

    pub fn read_f32(&self, var: Handle<Variable>, path: &[u32]) -> [f32; 4] {
        self.read(var, path).map(f32::from_bits)
    }

    /// Returns `true` once a `Discard` has executed.
    pub fn discarded(&self) -> bool {
        self.discarded
    }

    /// Runs `function` to completion.
    pub fn run(&mut self, function: Handle<Function>) -> Result<(), EvalError> {
        let module = self.module;
        let mut frame = Frame {
            func: &module.functions[function],
            values: HashMap::new(),
            prev: None,
            steps: 0,
        };
        let func = frame.func;
        match self.exec_list(&mut frame, &func.body)? {
            Flow::Break => Err(EvalError::StrayJump(Jump::Break)),
            Flow::Continue => Err(EvalError::StrayJump(Jump::Continue)),
            Flow::Next | Flow::Return => Ok(()),
        }
    }

    fn exec_list(&mut self, frame: &mut Frame<'m>, list: &'m [CfNode]) -> Result<Flow, EvalError> {
        let func = frame.func;
        for node in list {
            let flow = match *node {
                CfNode::Block(block) => self.exec_block(frame, block)?,
                CfNode::If(h) => {
                    let node = &func.ifs[h];
                    let arm = if frame.value(node.condition)?[0] != 0 {
                        &node.then_body
                    } else {
                        &node.else_body
                    };
                    self.exec_list(frame, arm)?
                }
                CfNode::Loop(h) => loop {
                    match self.exec_list(frame, &func.loops[h].body)? {
                        Flow::Break => break Flow::Next,
                        Flow::Return => break Flow::Return,
                        Flow::Next | Flow::Continue => {}
                    }
                },
            };
            if !matches!(flow, Flow::Next) {
                return Ok(flow);
            }
        }
        Ok(Flow::Next)
    }

    fn exec_block(&mut self, frame: &mut Frame<'m>, block: Handle<Block>) -> Result<Flow, EvalError> {
        frame.steps += 1;
        if frame.steps > self.step_limit {
            return Err(EvalError::StepLimit(self.step_limit));
        }
        let func = frame.func;
        let instructions = &func.blocks[block].instructions;

        // Phis read their sources together, as of the edge just taken.
        let mut incoming = Vec::new();
        for &h in instructions {
            let Instruction::Phi { ref srcs, .. } = func.instructions[h] else {
                break;
            };
            let src = srcs
                .iter()
                .find(|src| Some(src.pred) == frame.prev)
                .ok_or(EvalError::MissingPhiSource {
                    instr: h.index(),
                    pred: frame.prev.map(Handle::index),
                })?;
            incoming.push((h, frame.value(src.value)?));
        }
        frame.values.extend(incoming);

        let mut flow = Flow::Next;
        for &h in instructions {
            let value = match func.instructions[h] {
                Instruction::Phi { .. } => continue,
                Instruction::Jump(jump) => {
                    flow = match jump {
                        Jump::Break => Flow::Break,
                        Jump::Continue => Flow::Continue,
                        Jump::Return => Flow::Return,
                    };
                    break;
                }
                Instruction::Discard => {
                    self.discarded = true;
                    flow = Flow::Return;
                    break;
                }
                Instruction::LoadConst { ref bits } => {
                    let mut lanes = [0; 4];
                    for (dst, &src) in lanes.iter_mut().zip(bits) {
                        *dst = src;
                    }
                    lanes
                }
                Instruction::Undef { .. } | Instruction::Texture(_) => [0; 4],
                Instruction::Alu {
                    op,
                    ref srcs,
                    components,
                } => {
                    let inputs = srcs
                        .iter()
                        .map(|src| frame.src(src))
                        .collect::<Result<Vec<_>, _>>()?;
                    alu(op, &inputs, components)
                }
                Instruction::LoadVar { ref deref, .. } => {
                    let path = resolve(frame, deref)?;
                    self.read(deref.var, &path)
                }
                Instruction::StoreVar {
                    ref deref,
                    value,
                    writemask,
                } => {
                    let path = resolve(frame, deref)?;
                    let value = frame.value(value)?;
                    let mut slot = self.read(deref.var, &path);
                    for (lane, dst) in slot.iter_mut().enumerate() {
                        if writemask & (1 << lane) != 0 {
                            *dst = value[lane];
                        }
                    }
                    self.memory.insert((deref.var, path), slot);
                    continue;
                }
                Instruction::CopyVar { ref dst, ref src } => {
                    let src_path = resolve(frame, src)?;
                    let dst_path = resolve(frame, dst)?;
                    let slot = self.read(src.var, &src_path);
                    self.memory.insert((dst.var, dst_path), slot);
                    continue;
                }
            };
            frame.values.insert(h, value);
        }
        frame.prev = Some(block);
        Ok(flow)
    }
}

fn resolve(frame: &Frame<'_>, deref: &Deref) -> Result<Vec<u32>, EvalError> {
    deref
        .path
        .iter()
        .map(|link| match *link {
            DerefLink::Array(ArrayIndex::Direct(i)) | DerefLink::Struct(i) => Ok(i),
            DerefLink::Array(ArrayIndex::Indirect(h)) => Ok(frame.value(h)?[0]),
        })
        .collect()
}

fn f(bits: u32) -> f32 {
    f32::from_bits(bits)
}

fn b(value: bool) -> u32 {
    if value { TRUE } else { 0 }
}

fn alu(op: AluOp, inputs: &[Lanes], components: u32) -> Lanes {
    let input = |i: usize| inputs.get(i).copied().unwrap_or_default();
    let mut out = [0; 4];
    if let Some(width) = op.input_width() {
        let width = width as usize;
        let (x, y) = (input(0), input(1));
        match op {
            AluOp::Vec2 | AluOp::Vec3 | AluOp::Vec4 => {
                for (dst, src) in out.iter_mut().zip(inputs) {
                    *dst = src[0];
                }
            }
            AluOp::Fdot2 | AluOp::Fdot3 | AluOp::Fdot4 => {
                let dot: f32 = (0..width).map(|i| f(x[i]) * f(y[i])).sum();
                out[0] = dot.to_bits();
            }
            AluOp::Bany2 | AluOp::Bany3 | AluOp::Bany4 => {
                out[0] = b(x[..width].iter().any(|&v| v != 0));
            }
            _ => out[0] = b(x[..width].iter().all(|&v| v != 0)),
        }
        return out;
    }
    let (x, y, z) = (input(0), input(1), input(2));
    for c in 0..components.min(4) as usize {
        out[c] = lane(op, x[c], y[c], z[c]);
    }
    out
}

fn lane(op: AluOp, a: u32, b_: u32, c: u32) -> u32 {
    use AluOp::*;
    let (fa, fb, fc) = (f(a), f(b_), f(c));
    let (ia, ib) = (a as i32, b_ as i32);
    match op {
        Fmov | Imov => a,
        Fneg => (-fa).to_bits(),
        Ineg => a.wrapping_neg(),
        Inot => !a,
        Fabs => fa.abs().to_bits(),
        Iabs => ia.wrapping_abs() as u32,
        Fsign => {
            let sign = if fa > 0.0 {
                1.0
            } else if fa < 0.0 {
                -1.0
            } else {
                0.0f32
            };
            sign.to_bits()
        }
        Isign => ia.signum() as u32,
        Fadd => (fa + fb).to_bits(),
        Iadd => a.wrapping_add(b_),
        Fsub => (fa - fb).to_bits(),
        Isub => a.wrapping_sub(b_),
        Fmul => (fa * fb).to_bits(),
        Imul => a.wrapping_mul(b_),
        Fdiv => (fa / fb).to_bits(),
        Idiv => ia.checked_div(ib).unwrap_or(0) as u32,
        Udiv => a.checked_div(b_).unwrap_or(0),
        Umod => a.checked_rem(b_).unwrap_or(0),
        Fmod => (fa - fb * (fa / fb).floor()).to_bits(),
        Flt => b(fa < fb),
        Fge => b(fa >= fb),
        Feq => b(fa == fb),
        Fne => b(fa != fb),
        Ilt => b(ia < ib),
        Ige => b(ia >= ib),
        Ult => b(a < b_),
        Uge => b(a >= b_),
        Ieq => b(a == b_),
        Ine => b(a != b_),
        Iand => a & b_,
        Ior => a | b_,
        Ixor => a ^ b_,
        Ishl => a.wrapping_shl(b_ & 31),
        Ishr => (ia >> (b_ & 31)) as u32,
        Ushr => a >> (b_ & 31),
        F2i => fa as i32 as u32,
        F2u => fa as u32,
        I2f => (ia as f32).to_bits(),
        U2f => (a as f32).to_bits(),
        Bcsel => {
            if a != 0 {
                b_
            } else {
                c
            }
        }
        Fddx | Fddy | FddxFine | FddyFine | FddxCoarse | FddyCoarse => 0,
        Ffloor => fa.floor().to_bits(),
        Fceil => fa.ceil().to_bits(),
        Ffract => (fa - fa.floor()).to_bits(),
        Ftrunc => fa.trunc().to_bits(),
        FroundEven => fa.round_ties_even().to_bits(),
        Fsqrt => fa.sqrt().to_bits(),
        Frsq => (1.0 / fa.sqrt()).to_bits(),
        Fexp2 => fa.exp2().to_bits(),
        Flog2 => fa.log2().to_bits(),
        Fsin => fa.sin().to_bits(),
        Fcos => fa.cos().to_bits(),
        Fpow => fa.powf(fb).to_bits(),
        Fmin => fa.min(fb).to_bits(),
        Fmax => fa.max(fb).to_bits(),
        Imin => ia.min(ib) as u32,
        Imax => ia.max(ib) as u32,
        Umin => a.min(b_),
        Umax => a.max(b_),
        Flrp => (fa * (1.0 - fc) + fb * fc).to_bits(),
        Ffma => fa.mul_add(fb, fc).to_bits(),
        Fdot2 | Fdot3 | Fdot4 | Bany2 | Bany3 | Bany4 | Ball2 | Ball3 | Ball4 | Vec2 | Vec3
        | Vec4 => unreachable!("{op} has fixed-width inputs"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cf::{CfList, Position};
    use crate::instr::PhiSource;
    use crate::{Scalar, Type, VariableMode};

    fn konst(func: &mut Function, list: CfList, bits: u32) -> Handle<Instruction> {
        func.insert(Position::End(list), Instruction::LoadConst { bits: vec![bits] })
    }

    #[test]
    fn alu_lanes() {
        let one = 1.0f32.to_bits();
        let two = 2.0f32.to_bits();
        assert_eq!(lane(AluOp::Fadd, one, two, 0), 3.0f32.to_bits());
        assert_eq!(lane(AluOp::Flt, one, two, 0), TRUE);
        assert_eq!(lane(AluOp::Ilt, (-1i32) as u32, 0, 0), TRUE);
        assert_eq!(lane(AluOp::Ult, (-1i32) as u32, 0, 0), 0);
        assert_eq!(lane(AluOp::Umod, 7, 0, 0), 0);
        assert_eq!(lane(AluOp::Bcsel, 0, 5, 9), 9);
    }

    #[test]
    fn fixed_width_ops() {
        let v = [1.0f32, 2.0, 3.0, 4.0].map(f32::to_bits);
        let dot = alu(AluOp::Fdot3, &[v, v], 1);
        assert_eq!(f32::from_bits(dot[0]), 14.0);
        let any = alu(AluOp::Bany2, &[[0, TRUE, 0, 0]], 1);
        assert_eq!(any[0], TRUE);
        let all = alu(AluOp::Ball3, &[[TRUE, TRUE, 0, 0]], 1);
        assert_eq!(all[0], 0);
        let vec = alu(AluOp::Vec3, &[[7, 0, 0, 0], [8, 0, 0, 0], [9, 0, 0, 0]], 3);
        assert_eq!(vec, [7, 8, 9, 0]);
    }

    #[test]
    fn counting_loop_runs_to_completion() {
        let mut module = Module::default();
        let u32_ty = module.types.insert(Type::anonymous(TypeInner::Scalar(Scalar::U32)));
        let out = module.add_variable(
            Variable::new(Some("out".into()), u32_ty, VariableMode::ShaderOut),
            None,
        );

        let mut func = Function::new(Some("main".into()));
        let zero = konst(&mut func, CfList::Body, 0);
        let lp = func.insert_loop(CfList::Body);
        let body = CfList::Loop(lp);
        let head = func.first_block(body);
        let phi = func.insert(
            Position::BlockStart(head),
            Instruction::Phi {
                srcs: Vec::new(),
                components: 1,
            },
        );
        let limit = konst(&mut func, body, 4);
        let keep_going = func.insert(
            Position::End(body),
            Instruction::Alu {
                op: AluOp::Ult,
                srcs: vec![AluSrc::new(phi), AluSrc::new(limit)],
                components: 1,
            },
        );
        let node = func.insert_if(body, keep_going);
        func.insert(Position::End(CfList::Else(node)), Instruction::Jump(Jump::Break));
        let one = konst(&mut func, body, 1);
        let next = func.insert(
            Position::End(body),
            Instruction::Alu {
                op: AluOp::Iadd,
                srcs: vec![AluSrc::new(phi), AluSrc::new(one)],
                components: 1,
            },
        );
        let latch = func.tail_block(body);
        func.insert(Position::End(body), Instruction::Jump(Jump::Continue));
        func.insert(
            Position::End(CfList::Body),
            Instruction::StoreVar {
                deref: Deref::var(out),
                value: phi,
                writemask: 1,
            },
        );
        let entry = func.entry_block();
        if let Instruction::Phi { ref mut srcs, .. } = func.instructions[phi] {
            srcs.push(PhiSource {
                pred: entry,
                value: zero,
            });
            srcs.push(PhiSource {
                pred: latch,
                value: next,
            });
        }
        func.compute_cfg();
        let main = module.functions.append(func);

        let mut eval = Evaluator::new(&module);
        eval.run(main).unwrap();
        assert_eq!(eval.read(out, &[])[0], 4);
    }

    #[test]
    fn runaway_loop_hits_step_limit() {
        let mut module = Module::default();
        let mut func = Function::new(None);
        func.insert_loop(CfList::Body);
        let main = module.functions.append(func);
        let mut eval = Evaluator::new(&module).with_step_limit(16);
        assert!(matches!(eval.run(main), Err(EvalError::StepLimit(16))));
    }
}
