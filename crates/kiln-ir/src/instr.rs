//! SSA instructions.

use crate::arena::Handle;
use crate::cf::Block;
use crate::deref::Deref;
use crate::types::{SamplerDim, ScalarKind};

/// Bit pattern of boolean `true`. `false` is `0`.
pub const TRUE: u32 = u32::MAX;

/// An ALU opcode.
///
/// Per-component ops read lane `swizzle[c]` of each source for output lane
/// `c`. Ops with a fixed input width ([`AluOp::input_width`]) read lanes
/// `swizzle[0..width]` instead.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum AluOp {
    Fmov,
    Imov,
    Fneg,
    Ineg,
    Inot,
    Fabs,
    Iabs,
    Fsign,
    Isign,
    Fadd,
    Iadd,
    Fsub,
    Isub,
    Fmul,
    Imul,
    Fdiv,
    Idiv,
    Udiv,
    Umod,
    Fmod,
    Flt,
    Fge,
    Feq,
    Fne,
    Ilt,
    Ige,
    Ult,
    Uge,
    Ieq,
    Ine,
    Iand,
    Ior,
    Ixor,
    Ishl,
    Ishr,
    Ushr,
    F2i,
    F2u,
    I2f,
    U2f,
    /// `srcs[0] ? srcs[1] : srcs[2]`, per component.
    Bcsel,
    Fdot2,
    Fdot3,
    Fdot4,
    Bany2,
    Bany3,
    Bany4,
    Ball2,
    Ball3,
    Ball4,
    /// Builds a vector from the first lane of each source.
    Vec2,
    Vec3,
    Vec4,
    Fddx,
    Fddy,
    FddxFine,
    FddyFine,
    FddxCoarse,
    FddyCoarse,
    Ffloor,
    Fceil,
    Ffract,
    Ftrunc,
    /// Round half to even.
    FroundEven,
    Fsqrt,
    Frsq,
    Fexp2,
    Flog2,
    Fsin,
    Fcos,
    Fpow,
    Fmin,
    Fmax,
    Imin,
    Imax,
    Umin,
    Umax,
    /// `srcs[0] * (1 - srcs[2]) + srcs[1] * srcs[2]`.
    Flrp,
    Ffma,
}

impl AluOp {
    /// Number of sources the op takes.
    pub fn num_inputs(self) -> usize {
        use AluOp::*;
        match self {
            Fmov | Imov | Fneg | Ineg | Inot | Fabs | Iabs | Fsign | Isign | F2i | F2u | I2f
            | U2f | Bany2 | Bany3 | Bany4 | Ball2 | Ball3 | Ball4 | Fddx | Fddy | FddxFine
            | FddyFine | FddxCoarse | FddyCoarse | Ffloor | Fceil | Ffract | Ftrunc
            | FroundEven | Fsqrt | Frsq | Fexp2 | Flog2 | Fsin | Fcos => 1,
            Vec3 | Bcsel | Flrp | Ffma => 3,
            Vec4 => 4,
            _ => 2,
        }
    }

    /// Lanes read from each source by ops whose inputs have a fixed width.
    pub fn input_width(self) -> Option<u32> {
        use AluOp::*;
        match self {
            Fdot2 | Bany2 | Ball2 => Some(2),
            Fdot3 | Bany3 | Ball3 => Some(3),
            Fdot4 | Bany4 | Ball4 => Some(4),
            Vec2 | Vec3 | Vec4 => Some(1),
            _ => None,
        }
    }

    /// Returns the vector construction op for `components` lanes; a single
    /// lane is a plain move.
    pub fn vec(components: u32) -> Self {
        match components {
            2 => Self::Vec2,
            3 => Self::Vec3,
            4 => Self::Vec4,
            _ => Self::Imov,
        }
    }

    pub fn name(self) -> &'static str {
        use AluOp::*;
        match self {
            Fmov => "fmov",
            Imov => "imov",
            Fneg => "fneg",
            Ineg => "ineg",
            Inot => "inot",
            Fabs => "fabs",
            Iabs => "iabs",
            Fsign => "fsign",
            Isign => "isign",
            Fadd => "fadd",
            Iadd => "iadd",
            Fsub => "fsub",
            Isub => "isub",
            Fmul => "fmul",
            Imul => "imul",
            Fdiv => "fdiv",
            Idiv => "idiv",
            Udiv => "udiv",
            Umod => "umod",
            Fmod => "fmod",
            Flt => "flt",
            Fge => "fge",
            Feq => "feq",
            Fne => "fne",
            Ilt => "ilt",
            Ige => "ige",
            Ult => "ult",
            Uge => "uge",
            Ieq => "ieq",
            Ine => "ine",
            Iand => "iand",
            Ior => "ior",
            Ixor => "ixor",
            Ishl => "ishl",
            Ishr => "ishr",
            Ushr => "ushr",
            F2i => "f2i",
            F2u => "f2u",
            I2f => "i2f",
            U2f => "u2f",
            Bcsel => "bcsel",
            Fdot2 => "fdot2",
            Fdot3 => "fdot3",
            Fdot4 => "fdot4",
            Bany2 => "bany2",
            Bany3 => "bany3",
            Bany4 => "bany4",
            Ball2 => "ball2",
            Ball3 => "ball3",
            Ball4 => "ball4",
            Vec2 => "vec2",
            Vec3 => "vec3",
            Vec4 => "vec4",
            Fddx => "fddx",
            Fddy => "fddy",
            FddxFine => "fddx_fine",
            FddyFine => "fddy_fine",
            FddxCoarse => "fddx_coarse",
            FddyCoarse => "fddy_coarse",
            Ffloor => "ffloor",
            Fceil => "fceil",
            Ffract => "ffract",
            Ftrunc => "ftrunc",
            FroundEven => "fround_even",
            Fsqrt => "fsqrt",
            Frsq => "frsq",
            Fexp2 => "fexp2",
            Flog2 => "flog2",
            Fsin => "fsin",
            Fcos => "fcos",
            Fpow => "fpow",
            Fmin => "fmin",
            Fmax => "fmax",
            Imin => "imin",
            Imax => "imax",
            Umin => "umin",
            Umax => "umax",
            Flrp => "flrp",
            Ffma => "ffma",
        }
    }
}

/// An ALU source with a per-lane swizzle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AluSrc {
    pub value: Handle<Instruction>,
    pub swizzle: [u8; 4],
}

impl AluSrc {
    /// Reads the source lanes in order.
    pub fn new(value: Handle<Instruction>) -> Self {
        Self {
            value,
            swizzle: [0, 1, 2, 3],
        }
    }

    /// Reads one lane of the source for every output lane.
    pub fn lane(value: Handle<Instruction>, lane: u8) -> Self {
        Self {
            value,
            swizzle: [lane; 4],
        }
    }

    /// Reads a source with `components` lanes, replicating its last lane
    /// into wider outputs.
    pub fn fit(value: Handle<Instruction>, components: u32) -> Self {
        let last = components.clamp(1, 4) as u8 - 1;
        Self {
            value,
            swizzle: [0, 1u8.min(last), 2u8.min(last), 3u8.min(last)],
        }
    }
}

/// One incoming value of a phi.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PhiSource {
    pub pred: Handle<Block>,
    pub value: Handle<Instruction>,
}

/// A structured jump. Always the last instruction of its block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Jump {
    Break,
    Continue,
    Return,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TexOp {
    /// Implicit-LOD sample.
    Tex,
    /// Sample with LOD bias.
    Txb,
    /// Sample at an explicit LOD.
    Txl,
    /// Sample with explicit gradients.
    Txd,
    /// Texel fetch.
    Txf,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TexSrcKind {
    Coord,
    Projector,
    Comparator,
    Bias,
    Lod,
    Ddx,
    Ddy,
    Offset,
    MsIndex,
    MinLod,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TexSrc {
    pub kind: TexSrcKind,
    pub value: Handle<Instruction>,
}

/// A texture operation against a sampler variable.
#[derive(Clone, Debug, PartialEq)]
pub struct Texture {
    pub op: TexOp,
    pub sampler: Deref,
    pub dim: SamplerDim,
    pub is_array: bool,
    pub is_shadow: bool,
    pub dest_type: ScalarKind,
    pub coord_components: u32,
    /// Sources in emission order; the coordinate is always first.
    pub srcs: Vec<TexSrc>,
    pub components: u32,
}

/// An SSA instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// A constant vector of raw lane bit patterns.
    LoadConst { bits: Vec<u32> },
    /// An undefined value.
    Undef { components: u32 },
    Alu {
        op: AluOp,
        srcs: Vec<AluSrc>,
        components: u32,
    },
    /// Selects a value by incoming edge. Phis lead their block.
    Phi {
        srcs: Vec<PhiSource>,
        components: u32,
    },
    LoadVar { deref: Deref, components: u32 },
    StoreVar {
        deref: Deref,
        value: Handle<Instruction>,
        writemask: u8,
    },
    CopyVar { dst: Deref, src: Deref },
    Texture(Box<Texture>),
    /// Fragment discard.
    Discard,
    Jump(Jump),
}

impl Instruction {
    /// Number of lanes of the value this instruction defines; `0` when it
    /// defines none.
    pub fn components(&self) -> u32 {
        match *self {
            Self::LoadConst { ref bits } => bits.len() as u32,
            Self::Undef { components }
            | Self::Alu { components, .. }
            | Self::Phi { components, .. }
            | Self::LoadVar { components, .. } => components,
            Self::Texture(ref tex) => tex.components,
            Self::StoreVar { .. } | Self::CopyVar { .. } | Self::Discard | Self::Jump(_) => 0,
        }
    }

    pub fn as_jump(&self) -> Option<Jump> {
        match *self {
            Self::Jump(jump) => Some(jump),
            _ => None,
        }
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Self::Phi { .. })
    }

    /// Every SSA value this instruction reads.
    pub fn sources(&self) -> Vec<Handle<Instruction>> {
        match *self {
            Self::LoadConst { .. } | Self::Undef { .. } | Self::Discard | Self::Jump(_) => {
                Vec::new()
            }
            Self::Alu { ref srcs, .. } => srcs.iter().map(|src| src.value).collect(),
            Self::Phi { ref srcs, .. } => srcs.iter().map(|src| src.value).collect(),
            Self::LoadVar { ref deref, .. } => deref.indirect_sources().collect(),
            Self::StoreVar {
                ref deref, value, ..
            } => deref
                .indirect_sources()
                .chain(std::iter::once(value))
                .collect(),
            Self::CopyVar { ref dst, ref src } => {
                dst.indirect_sources().chain(src.indirect_sources()).collect()
            }
            Self::Texture(ref tex) => tex
                .sampler
                .indirect_sources()
                .chain(tex.srcs.iter().map(|src| src.value))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_replicates_last_lane() {
        let h = Handle::from_index(0);
        assert_eq!(AluSrc::fit(h, 1).swizzle, [0, 0, 0, 0]);
        assert_eq!(AluSrc::fit(h, 2).swizzle, [0, 1, 1, 1]);
        assert_eq!(AluSrc::fit(h, 4).swizzle, [0, 1, 2, 3]);
    }

    #[test]
    fn vec_op_by_width() {
        assert_eq!(AluOp::vec(1), AluOp::Imov);
        assert_eq!(AluOp::vec(3), AluOp::Vec3);
        assert_eq!(AluOp::Vec3.num_inputs(), 3);
        assert_eq!(AluOp::Vec3.input_width(), Some(1));
        assert_eq!(AluOp::Fdot4.input_width(), Some(4));
        assert_eq!(AluOp::Fadd.input_width(), None);
    }

    #[test]
    fn components_of_side_effects_are_zero() {
        assert_eq!(Instruction::Discard.components(), 0);
        assert_eq!(Instruction::Jump(Jump::Return).components(), 0);
        assert_eq!(
            Instruction::LoadConst {
                bits: vec![0, 0, 0]
            }
            .components(),
            3
        );
    }
}
