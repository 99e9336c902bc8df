//! Table-driven arithmetic, logic and conversion opcodes.

use kiln_ir::{AluOp, Cursor, Handle, Instruction};
use spirv::Op;

use crate::translate::Translator;
use crate::words;
use crate::{FwidthExpansion, ParseError};

/// How an opcode lowers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Lowering {
    /// One IR op; `swap` exchanges the first two sources.
    Op { op: AluOp, swap: bool },
    /// Dot product; the op depends on the vector width.
    Dot,
    Any,
    All,
    /// `a != a`.
    IsNan,
    /// `|dx(p)| + |dy(p)|`, or `|dx(p)| + |dx(p)|` in the legacy expansion.
    Fwidth { dx: AluOp, dy: AluOp },
}

const fn op(op: AluOp) -> Lowering {
    Lowering::Op { op, swap: false }
}

const fn swapped(op: AluOp) -> Lowering {
    Lowering::Op { op, swap: true }
}

fn lowering(opcode: Op) -> Option<Lowering> {
    use AluOp::*;
    Some(match opcode {
        Op::SNegate => op(Ineg),
        Op::FNegate => op(Fneg),
        Op::Not | Op::LogicalNot => op(Inot),
        Op::IAdd => op(Iadd),
        Op::FAdd => op(Fadd),
        Op::ISub => op(Isub),
        Op::FSub => op(Fsub),
        Op::IMul => op(Imul),
        Op::FMul | Op::VectorTimesScalar => op(Fmul),
        Op::UDiv => op(Udiv),
        Op::SDiv => op(Idiv),
        Op::FDiv => op(Fdiv),
        // signed variants share the unsigned op
        Op::UMod | Op::SRem | Op::SMod => op(Umod),
        Op::FRem | Op::FMod => op(Fmod),
        Op::ShiftRightLogical => op(Ushr),
        Op::ShiftRightArithmetic => op(Ishr),
        Op::ShiftLeftLogical => op(Ishl),
        Op::BitwiseOr | Op::LogicalOr => op(Ior),
        Op::BitwiseXor => op(Ixor),
        Op::BitwiseAnd | Op::LogicalAnd => op(Iand),
        Op::LogicalEqual | Op::IEqual => op(Ieq),
        Op::LogicalNotEqual | Op::INotEqual => op(Ine),
        Op::ULessThan => op(Ult),
        Op::SLessThan => op(Ilt),
        Op::UGreaterThan => swapped(Ult),
        Op::SGreaterThan => swapped(Ilt),
        Op::UGreaterThanEqual => op(Uge),
        Op::SGreaterThanEqual => op(Ige),
        Op::ULessThanEqual => swapped(Uge),
        Op::SLessThanEqual => swapped(Ige),
        Op::FOrdEqual | Op::FUnordEqual => op(Feq),
        Op::FOrdNotEqual | Op::FUnordNotEqual => op(Fne),
        Op::FOrdLessThan | Op::FUnordLessThan => op(Flt),
        Op::FOrdGreaterThan | Op::FUnordGreaterThan => swapped(Flt),
        Op::FOrdLessThanEqual | Op::FUnordLessThanEqual => swapped(Fge),
        Op::FOrdGreaterThanEqual | Op::FUnordGreaterThanEqual => op(Fge),
        Op::ConvertFToU => op(F2u),
        Op::ConvertFToS => op(F2i),
        Op::ConvertSToF => op(I2f),
        Op::ConvertUToF => op(U2f),
        Op::UConvert | Op::SConvert | Op::FConvert | Op::Bitcast => op(Imov),
        Op::Select => op(Bcsel),
        Op::DPdx => op(Fddx),
        Op::DPdy => op(Fddy),
        Op::DPdxFine => op(FddxFine),
        Op::DPdyFine => op(FddyFine),
        Op::DPdxCoarse => op(FddxCoarse),
        Op::DPdyCoarse => op(FddyCoarse),
        Op::Fwidth => Lowering::Fwidth { dx: Fddx, dy: Fddy },
        Op::FwidthFine => Lowering::Fwidth {
            dx: FddxFine,
            dy: FddyFine,
        },
        Op::FwidthCoarse => Lowering::Fwidth {
            dx: FddxCoarse,
            dy: FddyCoarse,
        },
        Op::Dot => Lowering::Dot,
        Op::Any => Lowering::Any,
        Op::All => Lowering::All,
        Op::IsNan => Lowering::IsNan,
        _ => return None,
    })
}

pub(crate) fn is_alu(opcode: Op) -> bool {
    lowering(opcode).is_some()
}

/// Reduction op over `width` lanes; a single lane is a move.
fn by_width(width: u32, ops: [AluOp; 3]) -> AluOp {
    match width {
        2 => ops[0],
        3 => ops[1],
        4 => ops[2],
        _ => AluOp::Imov,
    }
}

impl Translator<'_> {
    pub(crate) fn handle_alu(
        &mut self,
        instr: &words::Instruction<'_>,
        at: Cursor,
    ) -> Result<(), ParseError> {
        let lowering = lowering(instr.op).ok_or(ParseError::UnsupportedOpcode(instr.op))?;
        let ty = self.values.ty(instr.operand(0)?)?;
        let id = instr.operand(1)?;
        let components = self.components(ty)?;
        let mut srcs = instr
            .operands_from(2)
            .iter()
            .map(|&src| self.ssa_def(src, at))
            .collect::<Result<Vec<_>, _>>()?;

        let arity = match lowering {
            Lowering::Op { op, .. } => op.num_inputs(),
            Lowering::Dot => 2,
            _ => 1,
        };
        if srcs.len() != arity {
            return Err(ParseError::InvalidOperands(instr.op));
        }

        let def = match lowering {
            Lowering::Op { op, swap } => {
                if swap {
                    srcs.swap(0, 1);
                }
                self.alu(at, op, &srcs, components)
            }
            Lowering::Dot => {
                let width = self.def_components(at, srcs[0]);
                let op = match width {
                    1 => AluOp::Fmul,
                    n => by_width(n, [AluOp::Fdot2, AluOp::Fdot3, AluOp::Fdot4]),
                };
                self.alu(at, op, &srcs, 1)
            }
            Lowering::Any | Lowering::All => {
                let width = self.def_components(at, srcs[0]);
                let ops = if lowering == Lowering::Any {
                    [AluOp::Bany2, AluOp::Bany3, AluOp::Bany4]
                } else {
                    [AluOp::Ball2, AluOp::Ball3, AluOp::Ball4]
                };
                self.alu(at, by_width(width, ops), &srcs, 1)
            }
            Lowering::IsNan => self.alu(at, AluOp::Fne, &[srcs[0], srcs[0]], components),
            Lowering::Fwidth { dx, dy } => self.fwidth(at, srcs[0], dx, dy, components),
        };
        self.push_leaf(id, ty, def)
    }

    fn fwidth(
        &mut self,
        at: Cursor,
        p: Handle<Instruction>,
        dx: AluOp,
        dy: AluOp,
        components: u32,
    ) -> Handle<Instruction> {
        let second = match self.options.fwidth {
            FwidthExpansion::Legacy => dx,
            FwidthExpansion::Derivatives => dy,
        };
        let a = self.alu(at, dx, &[p], components);
        let b = self.alu(at, second, &[p], components);
        let a = self.alu(at, AluOp::Fabs, &[a], components);
        let b = self.alu(at, AluOp::Fabs, &[b], components);
        self.alu(at, AluOp::Fadd, &[a, b], components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greater_family_swaps() {
        assert_eq!(lowering(Op::SGreaterThan), Some(swapped(AluOp::Ilt)));
        assert_eq!(lowering(Op::FOrdLessThanEqual), Some(swapped(AluOp::Fge)));
        assert_eq!(lowering(Op::UGreaterThanEqual), Some(op(AluOp::Uge)));
        assert_eq!(lowering(Op::FOrdLessThan), Some(op(AluOp::Flt)));
    }

    #[test]
    fn signed_modulo_collapses_to_unsigned() {
        for opcode in [Op::UMod, Op::SRem, Op::SMod] {
            assert_eq!(lowering(opcode), Some(op(AluOp::Umod)));
        }
    }

    #[test]
    fn reductions_select_by_width() {
        let any = [AluOp::Bany2, AluOp::Bany3, AluOp::Bany4];
        assert_eq!(by_width(1, any), AluOp::Imov);
        assert_eq!(by_width(3, any), AluOp::Bany3);
        assert_eq!(by_width(4, any), AluOp::Bany4);
    }

    #[test]
    fn non_alu_opcodes() {
        assert!(!is_alu(Op::Load));
        assert!(!is_alu(Op::CompositeExtract));
        assert!(is_alu(Op::Fwidth));
        assert!(is_alu(Op::Dot));
    }
}
