//! Constant declarations.

use kiln_ir::{Constant, ConstantValue, Handle, TRUE, Type, TypeInner};
use spirv::Op;

use crate::ParseError;
use crate::translate::Translator;
use crate::value::Value;
use crate::words::Instruction;

impl Translator<'_> {
    pub(crate) fn handle_constant(&mut self, instr: &Instruction<'_>) -> Result<(), ParseError> {
        let ty = self.values.ty(instr.operand(0)?)?;
        let id = instr.operand(1)?;
        let value = match instr.op {
            Op::ConstantTrue | Op::SpecConstantTrue => ConstantValue::Flat(vec![TRUE]),
            Op::ConstantFalse | Op::SpecConstantFalse => ConstantValue::Flat(vec![0]),
            Op::Constant | Op::SpecConstant => ConstantValue::Flat(vec![instr.operand(2)?]),
            Op::ConstantComposite | Op::SpecConstantComposite => {
                self.composite_value(ty, instr.operands_from(2))?
            }
            Op::ConstantNull => {
                let name = self.values.name(id);
                let handle = self.zero_constant(ty, name)?;
                return self.values.push(id, Value::Constant(handle));
            }
            op => return Err(ParseError::UnsupportedOpcode(op)),
        };
        let handle = self.module.constants.append(Constant {
            name: self.values.name(id),
            ty,
            value,
        });
        self.values.push(id, Value::Constant(handle))
    }

    /// `OpUndef` outside a function: a zero constant.
    pub(crate) fn preamble_undef(&mut self, instr: &Instruction<'_>) -> Result<(), ParseError> {
        let ty = self.values.ty(instr.operand(0)?)?;
        let id = instr.operand(1)?;
        let name = self.values.name(id);
        let handle = self.zero_constant(ty, name)?;
        self.values.push(id, Value::Constant(handle))
    }

    fn composite_value(
        &mut self,
        ty: Handle<Type>,
        constituents: &[u32],
    ) -> Result<ConstantValue, ParseError> {
        let children = constituents
            .iter()
            .map(|&c| self.values.constant(c))
            .collect::<Result<Vec<_>, _>>()?;
        let inner = self.inner(ty);
        let expected = inner.child_count().or_else(|| inner.components());
        if expected != Some(children.len() as u32) {
            return Err(ParseError::InvalidOperands(Op::ConstantComposite));
        }
        match *self.inner(ty) {
            TypeInner::Vector { .. } | TypeInner::Matrix { .. } => {
                let mut bits = Vec::new();
                for child in children {
                    let lanes = self.module.constants[child]
                        .bits()
                        .ok_or(ParseError::InvalidOperands(Op::ConstantComposite))?;
                    bits.extend_from_slice(lanes);
                }
                Ok(ConstantValue::Flat(bits))
            }
            _ => Ok(ConstantValue::Composite(children)),
        }
    }

    /// A constant of type `ty` with every lane zero.
    pub(crate) fn zero_constant(
        &mut self,
        ty: Handle<Type>,
        name: Option<String>,
    ) -> Result<Handle<Constant>, ParseError> {
        let value = match *self.inner(ty) {
            TypeInner::Scalar(_) | TypeInner::Vector { .. } | TypeInner::Matrix { .. } => {
                let lanes = match *self.inner(ty) {
                    TypeInner::Matrix { columns, rows, .. } => columns as usize * rows as usize,
                    ref inner => inner.components().unwrap_or(1) as usize,
                };
                ConstantValue::Flat(vec![0; lanes])
            }
            TypeInner::Array { len, .. } => {
                let base = self.child_type(ty, 0)?;
                let children = (0..len)
                    .map(|_| self.zero_constant(base, None))
                    .collect::<Result<_, _>>()?;
                ConstantValue::Composite(children)
            }
            TypeInner::Struct { ref members } => {
                let tys: Vec<_> = members.iter().map(|m| m.ty).collect();
                let children = tys
                    .into_iter()
                    .map(|member| self.zero_constant(member, None))
                    .collect::<Result<_, _>>()?;
                ConstantValue::Composite(children)
            }
            _ => {
                return Err(ParseError::Lowering(format!(
                    "type {ty:?} has no null value"
                )));
            }
        };
        Ok(self.module.constants.append(Constant { name, ty, value }))
    }
}

#[cfg(test)]
mod tests {
    use crate::assembler::Assembler;
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
    fn booleans_use_all_ones() {
        let mut asm = Assembler::new();
        let b = asm.type_bool();
        let t = asm.constant_bool(b, true);
        let f = asm.constant_bool(b, false);
        let words = asm.finish();
        let ctx = preamble(&words);
        let t = ctx.values.constant(t).unwrap();
        let f = ctx.values.constant(f).unwrap();
        assert_eq!(ctx.module.constants[t].bits(), Some(&[TRUE][..]));
        assert_eq!(ctx.module.constants[f].bits(), Some(&[0][..]));
    }

    #[test]
    fn matrices_flatten_column_major() {
        let mut asm = Assembler::new();
        let float = asm.type_float(32);
        let vec2 = asm.type_vector(float, 2);
        let mat = asm.type_matrix(vec2, 2);
        let lanes: Vec<_> = (1..=4).map(|i| asm.constant_f32(float, i as f32)).collect();
        let c0 = asm.constant_composite(vec2, &lanes[..2]);
        let c1 = asm.constant_composite(vec2, &lanes[2..]);
        let m = asm.constant_composite(mat, &[c0, c1]);
        let words = asm.finish();
        let ctx = preamble(&words);

        let m = ctx.values.constant(m).unwrap();
        let expected: Vec<u32> = [1.0f32, 2.0, 3.0, 4.0].iter().map(|f| f.to_bits()).collect();
        assert_eq!(ctx.module.constants[m].bits(), Some(&expected[..]));
    }

    #[test]
    fn arrays_and_structs_nest() {
        let mut asm = Assembler::new();
        let uint = asm.type_int(32, false);
        let float = asm.type_float(32);
        let two = asm.constant(uint, 2);
        let arr = asm.type_array(float, two);
        let st = asm.type_struct(&[arr, uint]);
        let half = asm.constant_f32(float, 0.5);
        let a = asm.constant_composite(arr, &[half, half]);
        let s = asm.constant_composite(st, &[a, two]);
        let words = asm.finish();
        let ctx = preamble(&words);

        let s = ctx.values.constant(s).unwrap();
        assert_eq!(ctx.module.constants[s].child_count(), 2);
        assert_eq!(kiln_ir::count_leaves(&ctx.module.constants, s), 3);
    }

    #[test]
    fn null_struct_is_zero_tree() {
        let mut asm = Assembler::new();
        let float = asm.type_float(32);
        let vec3 = asm.type_vector(float, 3);
        let st = asm.type_struct(&[vec3, float]);
        let null = asm.constant_null(st);
        let words = asm.finish();
        let ctx = preamble(&words);

        let null = ctx.values.constant(null).unwrap();
        let ConstantValue::Composite(ref children) = ctx.module.constants[null].value else {
            panic!("expected a composite");
        };
        assert_eq!(ctx.module.constants[children[0]].bits(), Some(&[0, 0, 0][..]));
        assert_eq!(ctx.module.constants[children[1]].bits(), Some(&[0][..]));
    }

    #[test]
    fn composite_arity_is_checked() {
        let mut asm = Assembler::new();
        let float = asm.type_float(32);
        let vec3 = asm.type_vector(float, 3);
        let one = asm.constant_f32(float, 1.0);
        asm.constant_composite(vec3, &[one, one]);
        let words = asm.finish();
        let mut ctx = Translator::new(&words, words[3], Options::default());
        let result = walk(&words, HEADER_WORDS, words.len(), |instr| {
            ctx.handle_preamble(&instr)
        });
        assert!(matches!(result, Err(ParseError::InvalidOperands(_))));
    }
}
