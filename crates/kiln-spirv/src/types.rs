//! Type declarations.

use kiln_ir::{
    Interpolation, SamplerDim, Scalar, ScalarKind, StructMember, Type, TypeInner, VectorSize,
};
use spirv::{Decoration, Dim, Op};

use crate::ParseError;
use crate::translate::Translator;
use crate::value::{PointerInfo, TypeValue, Value};
use crate::words::Instruction;

impl Translator<'_> {
    pub(crate) fn handle_type(&mut self, instr: &Instruction<'_>) -> Result<(), ParseError> {
        let id = instr.operand(0)?;
        if let Some(value) = self.derived_type(instr)? {
            return self.values.push(id, Value::Type(value));
        }
        let inner = match instr.op {
            Op::TypeVoid => TypeInner::Void,
            Op::TypeBool => TypeInner::Scalar(Scalar::BOOL),
            Op::TypeInt => {
                check_width(instr)?;
                TypeInner::Scalar(if instr.operand(2)? != 0 {
                    Scalar::I32
                } else {
                    Scalar::U32
                })
            }
            Op::TypeFloat => {
                check_width(instr)?;
                TypeInner::Scalar(Scalar::F32)
            }
            Op::TypeVector => {
                let scalar = self.scalar_of(instr.operand(1)?)?;
                let size = vector_size(instr, instr.operand(2)?)?;
                TypeInner::Vector { size, scalar }
            }
            Op::TypeMatrix => {
                let column = self.values.ty(instr.operand(1)?)?;
                let TypeInner::Vector { size, scalar } = self.module.types[column].inner else {
                    return Err(ParseError::InvalidOperands(instr.op));
                };
                TypeInner::Matrix {
                    columns: vector_size(instr, instr.operand(2)?)?,
                    rows: size,
                    scalar,
                }
            }
            Op::TypeArray => {
                let base = self.values.ty(instr.operand(1)?)?;
                let length = self.values.constant(instr.operand(2)?)?;
                let len = self.module.constants[length]
                    .bits()
                    .and_then(|bits| bits.first().copied())
                    .ok_or(ParseError::InvalidOperands(instr.op))?;
                TypeInner::Array { base, len }
            }
            Op::TypeStruct => TypeInner::Struct {
                members: self.struct_members(id, instr.operands_from(1))?,
            },
            Op::TypeFunction => TypeInner::Function {
                result: self.values.ty(instr.operand(1)?)?,
                params: instr
                    .operands_from(2)
                    .iter()
                    .map(|&param| self.values.ty(param))
                    .collect::<Result<_, _>>()?,
            },
            Op::TypeImage => self.image_type(instr)?,
            op => return Err(ParseError::UnsupportedOpcode(op)),
        };
        let ty = self.module.types.insert(Type {
            name: self.values.name(id),
            inner,
        });
        self.values
            .push(id, Value::Type(TypeValue { ty, pointer: None }))
    }

    /// Types that reuse the IR type of another declaration.
    fn derived_type(&self, instr: &Instruction<'_>) -> Result<Option<TypeValue>, ParseError> {
        Ok(match instr.op {
            Op::TypePointer => {
                let raw = instr.operand(1)?;
                let storage = spirv::StorageClass::from_u32(raw)
                    .ok_or(ParseError::InvalidOperands(instr.op))?;
                let pointee = instr.operand(2)?;
                Some(TypeValue {
                    ty: self.values.ty(pointee)?,
                    pointer: Some(PointerInfo { pointee, storage }),
                })
            }
            Op::TypeSampledImage => Some(self.values.type_value(instr.operand(1)?)?),
            _ => None,
        })
    }

    fn scalar_of(&self, id: u32) -> Result<Scalar, ParseError> {
        let ty = self.values.ty(id)?;
        match self.module.types[ty].inner {
            TypeInner::Scalar(scalar) => Ok(scalar),
            _ => Err(ParseError::Lowering(format!("type %{id} is not a scalar"))),
        }
    }

    fn struct_members(&self, id: u32, member_ids: &[u32]) -> Result<Vec<StructMember>, ParseError> {
        let mut members = member_ids
            .iter()
            .enumerate()
            .map(|(i, &member)| {
                let mut m = StructMember::new(self.values.ty(member)?);
                m.name = self.values.member_name(id, i as u32);
                Ok(m)
            })
            .collect::<Result<Vec<_>, ParseError>>()?;

        for dec in self.values.decorations(id)? {
            let Some(index) = dec.member else {
                continue;
            };
            let Some(member) = members.get_mut(index as usize) else {
                return Err(ParseError::Lowering(format!(
                    "decoration on member {index} of struct %{id} with {} members",
                    member_ids.len()
                )));
            };
            match dec.kind {
                Decoration::Offset => member.offset = dec.literal(),
                Decoration::Location => member.location = dec.literal(),
                Decoration::Component => member.component = dec.literal(),
                Decoration::Flat => member.interpolation = Some(Interpolation::Flat),
                Decoration::NoPerspective => {
                    member.interpolation = Some(Interpolation::NoPerspective);
                }
                Decoration::Centroid => member.centroid = true,
                Decoration::Sample => member.sample = true,
                Decoration::BuiltIn => {
                    member.builtin = dec.literal().and_then(crate::variable::builtin);
                }
                kind => log::warn!("dropping {kind:?} on member {index} of struct %{id}"),
            }
        }
        Ok(members)
    }

    fn image_type(&self, instr: &Instruction<'_>) -> Result<TypeInner, ParseError> {
        let result = self.scalar_of(instr.operand(1)?)?.kind;
        let dim = Dim::from_u32(instr.operand(2)?).ok_or(ParseError::InvalidOperands(instr.op))?;
        let multisampled = instr.operand(5)? != 0;
        let dim = match dim {
            Dim::Dim1D => SamplerDim::D1,
            Dim::Dim2D if multisampled => SamplerDim::Ms,
            Dim::Dim2D => SamplerDim::D2,
            Dim::Dim3D => SamplerDim::D3,
            Dim::DimCube => SamplerDim::Cube,
            Dim::DimRect => SamplerDim::Rect,
            Dim::DimBuffer => SamplerDim::Buffer,
            other => return Err(ParseError::Unsupported(format!("image dimension {other:?}"))),
        };
        if result == ScalarKind::Bool {
            return Err(ParseError::InvalidOperands(instr.op));
        }
        Ok(TypeInner::Sampler {
            dim,
            shadow: instr.operand(3)? == 1,
            arrayed: instr.operand(4)? != 0,
            result,
        })
    }
}

fn check_width(instr: &Instruction<'_>) -> Result<(), ParseError> {
    match instr.operand(1)? {
        32 => Ok(()),
        width => Err(ParseError::Unsupported(format!(
            "{width}-bit {:?}",
            instr.op
        ))),
    }
}

fn vector_size(instr: &Instruction<'_>, count: u32) -> Result<VectorSize, ParseError> {
    VectorSize::from_components(count).ok_or(ParseError::InvalidOperands(instr.op))
}

#[cfg(test)]
mod tests {
    use spirv::StorageClass;

    use crate::assembler::Assembler;
    use crate::translate::Translator;
    use crate::words::walk;
    use crate::{HEADER_WORDS, Options};

    use super::*;

    fn preamble(words: &[u32]) -> Translator<'_> {
        let mut ctx = Translator::new(words, words[3], Options::default());
        walk(words, HEADER_WORDS, words.len(), |instr| {
            ctx.handle_preamble(&instr)
        })
        .unwrap();
        ctx
    }

    #[test]
    fn vectors_and_matrices() {
        let mut asm = Assembler::new();
        let float = asm.type_float(32);
        let vec3 = asm.type_vector(float, 3);
        let mat = asm.type_matrix(vec3, 4);
        let words = asm.finish();
        let ctx = preamble(&words);

        let ty = ctx.values.ty(mat).unwrap();
        assert_eq!(
            ctx.module.types[ty].inner,
            TypeInner::Matrix {
                columns: VectorSize::Quad,
                rows: VectorSize::Tri,
                scalar: Scalar::F32,
            }
        );
        let ty = ctx.values.ty(vec3).unwrap();
        assert_eq!(ctx.module.types[ty].inner.components(), Some(3));
    }

    #[test]
    fn identical_declarations_share_a_type() {
        let mut asm = Assembler::new();
        let a = asm.type_float(32);
        let b = asm.type_float(32);
        let words = asm.finish();
        let ctx = preamble(&words);
        assert_eq!(ctx.values.ty(a).unwrap(), ctx.values.ty(b).unwrap());
    }

    #[test]
    fn array_length_comes_from_constant() {
        let mut asm = Assembler::new();
        let uint = asm.type_int(32, false);
        let four = asm.constant(uint, 4);
        let arr = asm.type_array(uint, four);
        let words = asm.finish();
        let ctx = preamble(&words);

        let ty = ctx.values.ty(arr).unwrap();
        assert_eq!(ctx.module.types[ty].inner.child_count(), Some(4));
    }

    #[test]
    fn struct_members_take_names_and_decorations() {
        let mut asm = Assembler::new();
        let float = asm.type_float(32);
        let vec4 = asm.type_vector(float, 4);
        let st = asm.id();
        asm.name(st, "Light");
        asm.member_name(st, 1, "color");
        asm.member_decorate(st, 1, Decoration::Offset, &[16]);
        asm.member_decorate(st, 0, Decoration::BuiltIn, &[spirv::BuiltIn::Position as u32]);
        asm.emit(Op::TypeStruct, &[st, vec4, vec4]);
        let words = asm.finish();
        let ctx = preamble(&words);

        let ty = ctx.values.ty(st).unwrap();
        let Type { ref name, ref inner } = ctx.module.types[ty];
        assert_eq!(name.as_deref(), Some("Light"));
        let TypeInner::Struct { ref members } = *inner else {
            panic!("expected a struct");
        };
        assert_eq!(members[1].name.as_deref(), Some("color"));
        assert_eq!(members[1].offset, Some(16));
        assert_eq!(members[0].builtin, Some(kiln_ir::BuiltIn::Position));
    }

    #[test]
    fn pointers_keep_storage_class() {
        let mut asm = Assembler::new();
        let float = asm.type_float(32);
        let ptr = asm.type_pointer(StorageClass::Output, float);
        let words = asm.finish();
        let ctx = preamble(&words);

        let value = ctx.values.type_value(ptr).unwrap();
        assert_eq!(value.ty, ctx.values.ty(float).unwrap());
        assert_eq!(
            value.pointer,
            Some(PointerInfo {
                pointee: float,
                storage: StorageClass::Output
            })
        );
    }

    #[test]
    fn sampled_images_become_samplers() {
        let mut asm = Assembler::new();
        let float = asm.type_float(32);
        let image = asm.type_image(float, Dim::Dim2D, true, true, false);
        let sampled = asm.type_sampled_image(image);
        let words = asm.finish();
        let ctx = preamble(&words);

        let ty = ctx.values.ty(sampled).unwrap();
        assert_eq!(
            ctx.module.types[ty].inner,
            TypeInner::Sampler {
                dim: SamplerDim::D2,
                shadow: true,
                arrayed: true,
                result: ScalarKind::Float,
            }
        );
    }

    #[test]
    fn wide_scalars_are_unsupported() {
        let mut asm = Assembler::new();
        asm.type_float(64);
        let words = asm.finish();
        let mut ctx = Translator::new(&words, words[3], Options::default());
        let result = walk(&words, HEADER_WORDS, words.len(), |instr| {
            ctx.handle_preamble(&instr)
        });
        assert!(matches!(result, Err(ParseError::Unsupported(_))));
    }
}
