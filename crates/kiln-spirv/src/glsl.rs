//! `GLSL.std.450` extended instructions.

use std::f32::consts::PI;

use kiln_ir::{AluOp, Cursor, Handle, Instruction};
use spirv::{GLOp, Op};

use crate::ParseError;
use crate::translate::Translator;
use crate::value::ExtSet;
use crate::words;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Lowering {
    Op(AluOp),
    /// Multiplication by a constant.
    Scale(f32),
    /// `min(max(x, lo), hi)`.
    Clamp { min: AluOp, max: AluOp },
    Length,
    Distance,
    Normalize,
}

const fn op(op: AluOp) -> Lowering {
    Lowering::Op(op)
}

fn lowering(instruction: GLOp) -> Option<Lowering> {
    use AluOp::*;
    Some(match instruction {
        GLOp::Round | GLOp::RoundEven => op(FroundEven),
        GLOp::Trunc => op(Ftrunc),
        GLOp::FAbs => op(Fabs),
        GLOp::SAbs => op(Iabs),
        GLOp::FSign => op(Fsign),
        GLOp::SSign => op(Isign),
        GLOp::Floor => op(Ffloor),
        GLOp::Ceil => op(Fceil),
        GLOp::Fract => op(Ffract),
        GLOp::Radians => Lowering::Scale(PI / 180.0),
        GLOp::Degrees => Lowering::Scale(180.0 / PI),
        GLOp::Sin => op(Fsin),
        GLOp::Cos => op(Fcos),
        GLOp::Pow => op(Fpow),
        GLOp::Exp2 => op(Fexp2),
        GLOp::Log2 => op(Flog2),
        GLOp::Sqrt => op(Fsqrt),
        GLOp::InverseSqrt => op(Frsq),
        GLOp::FMin => op(Fmin),
        GLOp::UMin => op(Umin),
        GLOp::SMin => op(Imin),
        GLOp::FMax => op(Fmax),
        GLOp::UMax => op(Umax),
        GLOp::SMax => op(Imax),
        GLOp::FClamp => Lowering::Clamp {
            min: Fmin,
            max: Fmax,
        },
        GLOp::UClamp => Lowering::Clamp {
            min: Umin,
            max: Umax,
        },
        GLOp::SClamp => Lowering::Clamp {
            min: Imin,
            max: Imax,
        },
        GLOp::FMix => op(Flrp),
        GLOp::Fma => op(Ffma),
        GLOp::Length => Lowering::Length,
        GLOp::Distance => Lowering::Distance,
        GLOp::Normalize => Lowering::Normalize,
        _ => return None,
    })
}

impl Lowering {
    fn arity(self) -> usize {
        match self {
            Self::Op(op) => op.num_inputs(),
            Self::Clamp { .. } => 3,
            Self::Distance => 2,
            Self::Scale(_) | Self::Length | Self::Normalize => 1,
        }
    }
}

fn dot_op(width: u32) -> AluOp {
    match width {
        2 => AluOp::Fdot2,
        3 => AluOp::Fdot3,
        4 => AluOp::Fdot4,
        _ => AluOp::Fmul,
    }
}

impl Translator<'_> {
    pub(crate) fn handle_ext_inst(
        &mut self,
        instr: &words::Instruction<'_>,
        at: Cursor,
    ) -> Result<(), ParseError> {
        let ty = self.values.ty(instr.operand(0)?)?;
        let id = instr.operand(1)?;
        if let ExtSet::Unknown(name) = self.values.ext_set(instr.operand(2)?)? {
            return Err(ParseError::Unsupported(format!(
                "extended instruction set {name:?}"
            )));
        }
        let number = instr.operand(3)?;
        let Some(lowering) = GLOp::from_u32(number).and_then(lowering) else {
            return Err(ParseError::Unsupported(format!(
                "GLSL.std.450 instruction {number}"
            )));
        };

        let srcs = instr
            .operands_from(4)
            .iter()
            .map(|&src| self.ssa_def(src, at))
            .collect::<Result<Vec<_>, _>>()?;
        if srcs.len() != lowering.arity() {
            return Err(ParseError::InvalidOperands(Op::ExtInst));
        }
        let components = self.components(ty)?;

        let def = match lowering {
            Lowering::Op(op) => self.alu(at, op, &srcs, components),
            Lowering::Scale(factor) => {
                let factor = self.load_const(at, vec![factor.to_bits()]);
                self.alu(at, AluOp::Fmul, &[srcs[0], factor], components)
            }
            Lowering::Clamp { min, max } => {
                let lower = self.alu(at, max, &[srcs[0], srcs[1]], components);
                self.alu(at, min, &[lower, srcs[2]], components)
            }
            Lowering::Length => self.length(at, srcs[0]),
            Lowering::Distance => {
                let width = self.def_components(at, srcs[0]);
                let delta = self.alu(at, AluOp::Fsub, &srcs, width);
                self.length(at, delta)
            }
            Lowering::Normalize => {
                let width = self.def_components(at, srcs[0]);
                let dot = self.alu(at, dot_op(width), &[srcs[0], srcs[0]], 1);
                let scale = self.alu(at, AluOp::Frsq, &[dot], 1);
                self.alu(at, AluOp::Fmul, &[srcs[0], scale], components)
            }
        };
        self.push_leaf(id, ty, def)
    }

    fn length(&mut self, at: Cursor, v: Handle<Instruction>) -> Handle<Instruction> {
        let width = self.def_components(at, v);
        let dot = self.alu(at, dot_op(width), &[v, v], 1);
        self.alu(at, AluOp::Fsqrt, &[dot], 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_is_to_even() {
        assert_eq!(lowering(GLOp::Round), Some(op(AluOp::FroundEven)));
        assert_eq!(
            lowering(GLOp::RoundEven),
            Some(op(AluOp::FroundEven))
        );
    }

    #[test]
    fn clamps_pick_matching_signedness() {
        assert_eq!(
            lowering(GLOp::SClamp),
            Some(Lowering::Clamp {
                min: AluOp::Imin,
                max: AluOp::Imax
            })
        );
        assert_eq!(lowering(GLOp::UClamp).map(Lowering::arity), Some(3));
    }

    #[test]
    fn trigonometry_beyond_sin_cos_is_unsupported() {
        assert_eq!(lowering(GLOp::Tan), None);
        assert_eq!(lowering(GLOp::Cross), None);
        assert_eq!(lowering(GLOp::Sin), Some(op(AluOp::Fsin)));
    }

    #[test]
    fn geometric_ops_take_vectors() {
        assert_eq!(lowering(GLOp::Distance).map(Lowering::arity), Some(2));
        assert_eq!(lowering(GLOp::Normalize).map(Lowering::arity), Some(1));
        assert_eq!(dot_op(3), AluOp::Fdot3);
        assert_eq!(dot_op(1), AluOp::Fmul);
    }
}
