//! Sampling and texel fetches.

use kiln_ir::{Cursor, Instruction, TexOp, TexSrc, TexSrcKind, Texture, TypeInner};
use spirv::{ImageOperands, Op};

use crate::ParseError;
use crate::translate::Translator;
use crate::words;

impl Translator<'_> {
    pub(crate) fn handle_texture(
        &mut self,
        instr: &words::Instruction<'_>,
        at: Cursor,
    ) -> Result<(), ParseError> {
        let ty = self.values.ty(instr.operand(0)?)?;
        let id = instr.operand(1)?;
        let sampler = self.values.deref(instr.operand(2)?)?.clone();
        let TypeInner::Sampler {
            dim,
            shadow,
            arrayed,
            result,
        } = *self.inner(sampler.ty)
        else {
            return Err(ParseError::Lowering(format!(
                "%{} is not a sampler",
                instr.operand(2)?
            )));
        };

        let coord = self.ssa_def(instr.operand(3)?, at)?;
        let mut srcs = vec![TexSrc {
            kind: TexSrcKind::Coord,
            value: coord,
        }];

        let mut next = 4;
        let mut op = match instr.op {
            Op::ImageSampleImplicitLod | Op::ImageSampleDrefImplicitLod => TexOp::Tex,
            Op::ImageSampleExplicitLod | Op::ImageSampleDrefExplicitLod => TexOp::Txl,
            Op::ImageFetch => TexOp::Txf,
            op => return Err(ParseError::UnsupportedOpcode(op)),
        };
        if matches!(
            instr.op,
            Op::ImageSampleDrefImplicitLod | Op::ImageSampleDrefExplicitLod
        ) {
            let dref = self.ssa_def(instr.operand(next)?, at)?;
            srcs.push(TexSrc {
                kind: TexSrcKind::Comparator,
                value: dref,
            });
            next += 1;
        }

        if next < instr.operands().len() {
            let mask = ImageOperands::from_bits_truncate(instr.operand(next)?);
            next += 1;
            if mask.contains(ImageOperands::CONST_OFFSETS) {
                return Err(ParseError::Unsupported("ConstOffsets image operand".into()));
            }
            let mut take = |t: &mut Self, kind| -> Result<(), ParseError> {
                let value = t.ssa_def(instr.operand(next)?, at)?;
                next += 1;
                srcs.push(TexSrc { kind, value });
                Ok(())
            };
            if mask.contains(ImageOperands::BIAS) {
                op = TexOp::Txb;
                take(self, TexSrcKind::Bias)?;
            }
            if mask.contains(ImageOperands::LOD) {
                take(self, TexSrcKind::Lod)?;
            }
            if mask.contains(ImageOperands::GRAD) {
                op = TexOp::Txd;
                take(self, TexSrcKind::Ddx)?;
                take(self, TexSrcKind::Ddy)?;
            }
            if mask.contains(ImageOperands::CONST_OFFSET) {
                take(self, TexSrcKind::Offset)?;
            }
            if mask.contains(ImageOperands::OFFSET) {
                take(self, TexSrcKind::Offset)?;
            }
            if mask.contains(ImageOperands::SAMPLE) {
                take(self, TexSrcKind::MsIndex)?;
            }
            if mask.contains(ImageOperands::MIN_LOD) {
                take(self, TexSrcKind::MinLod)?;
            }
        }

        let texture = Texture {
            op,
            sampler: sampler.deref,
            dim,
            is_array: arrayed,
            is_shadow: shadow,
            dest_type: result,
            coord_components: self.def_components(at, coord),
            srcs,
            components: self.components(ty)?,
        };
        let def = self.emit(at, Instruction::Texture(Box::new(texture)));
        self.push_leaf(id, ty, def)
    }
}
