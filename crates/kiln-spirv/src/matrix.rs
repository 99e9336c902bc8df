//! Matrix operations.
//!
//! A matrix value is a tree with one leaf per column. Transposes are cached
//! on both the source and the result, so a multiply whose left operand was
//! produced by (or has produced) a transpose can use row dot products.
//! `A * B` with both transposes cached is computed as `(B^T * A^T)^T`.

use kiln_ir::{AluOp, AluSrc, Cursor, Handle, Instruction, Scalar, ScalarKind, matrix_type};
use spirv::Op;

use crate::ParseError;
use crate::ssa::{SsaNode, SsaValue};
use crate::translate::Translator;
use crate::value::Value;
use crate::words;

impl Translator<'_> {
    pub(crate) fn handle_matrix(
        &mut self,
        instr: &words::Instruction<'_>,
        at: Cursor,
    ) -> Result<(), ParseError> {
        let ty = self.values.ty(instr.operand(0)?)?;
        let id = instr.operand(1)?;
        let a = self.ssa_value(instr.operand(2)?, at)?;
        let result = match instr.op {
            Op::Transpose => self.transpose(a, at)?,
            Op::MatrixTimesScalar => {
                let scalar = self.ssa_def(instr.operand(3)?, at)?;
                let columns = self.columns(a)?;
                let rows = self.def_components(at, first_column(&columns)?);
                let column_ty = self.child_type(ty, 0)?;
                let elems = columns
                    .into_iter()
                    .map(|column| {
                        let def = self.alu(at, AluOp::Fmul, &[column, scalar], rows);
                        self.ssa.append(SsaValue::leaf(column_ty, def))
                    })
                    .collect();
                self.ssa.append(SsaValue::elems(ty, elems))
            }
            Op::VectorTimesMatrix => {
                let matrix = self.ssa_value(instr.operand(3)?, at)?;
                let transposed = self.transpose(matrix, at)?;
                self.multiply(transposed, a, at)?
            }
            Op::MatrixTimesVector | Op::MatrixTimesMatrix => {
                let b = self.ssa_value(instr.operand(3)?, at)?;
                self.multiply(a, b, at)?
            }
            Op::OuterProduct => {
                let column = self.leaf_def(a)?;
                let row = self.ssa_def(instr.operand(3)?, at)?;
                let rows = self.def_components(at, column);
                let count = self.def_components(at, row);
                let column_ty = self.child_type(ty, 0)?;
                let elems = (0..count)
                    .map(|i| {
                        let def = self.alu_with(
                            at,
                            AluOp::Fmul,
                            vec![AluSrc::new(column), AluSrc::lane(row, i as u8)],
                            rows,
                        );
                        self.ssa.append(SsaValue::leaf(column_ty, def))
                    })
                    .collect();
                self.ssa.append(SsaValue::elems(ty, elems))
            }
            op => return Err(ParseError::UnsupportedOpcode(op)),
        };
        self.values.push(id, Value::Ssa(result))
    }

    /// Column definitions of a matrix; a vector is a single column.
    fn columns(&self, value: Handle<SsaValue>) -> Result<Vec<Handle<Instruction>>, ParseError> {
        match self.ssa[value].node {
            SsaNode::Leaf(def) => Ok(vec![def]),
            SsaNode::Elems(ref elems) => elems.iter().map(|&e| self.leaf_def(e)).collect(),
        }
    }

    fn scalar_of_value(&self, value: Handle<SsaValue>) -> Result<Scalar, ParseError> {
        self.inner(self.ssa[value].ty)
            .scalar()
            .ok_or_else(|| ParseError::Lowering("matrix operand is not numeric".into()))
    }

    /// Builds a matrix (or, with one column, a vector) value from columns.
    fn matrix_value(
        &mut self,
        scalar: Scalar,
        columns: Vec<Handle<Instruction>>,
        rows: u32,
    ) -> Result<Handle<SsaValue>, ParseError> {
        let shape = || ParseError::Lowering(format!("no {}x{rows} matrix type", columns.len()));
        let ty = matrix_type(&mut self.module.types, scalar, columns.len() as u32, rows)
            .ok_or_else(shape)?;
        if let [column] = columns[..] {
            return Ok(self.ssa.append(SsaValue::leaf(ty, column)));
        }
        let column_ty = self.child_type(ty, 0)?;
        let elems = columns
            .into_iter()
            .map(|column| self.ssa.append(SsaValue::leaf(column_ty, column)))
            .collect();
        Ok(self.ssa.append(SsaValue::elems(ty, elems)))
    }

    pub(crate) fn transpose(
        &mut self,
        matrix: Handle<SsaValue>,
        at: Cursor,
    ) -> Result<Handle<SsaValue>, ParseError> {
        if let Some(cached) = self.ssa[matrix].transposed {
            return Ok(cached);
        }
        let columns = self.columns(matrix)?;
        let rows = self.def_components(at, first_column(&columns)?);
        let scalar = self.scalar_of_value(matrix)?;
        let transposed_columns = (0..rows)
            .map(|row| {
                let lanes: Vec<_> = columns.iter().map(|&column| (column, row)).collect();
                self.gather(at, &lanes)
            })
            .collect();
        let transposed = self.matrix_value(scalar, transposed_columns, columns.len() as u32)?;
        self.ssa[transposed].transposed = Some(matrix);
        self.ssa[matrix].transposed = Some(transposed);
        Ok(transposed)
    }

    /// `a * b` for matrices and column vectors.
    pub(crate) fn multiply(
        &mut self,
        a: Handle<SsaValue>,
        b: Handle<SsaValue>,
        at: Cursor,
    ) -> Result<Handle<SsaValue>, ParseError> {
        if let (Some(a_t), Some(b_t)) = (self.ssa[a].transposed, self.ssa[b].transposed) {
            let product = self.multiply_columns(b_t, a_t, at)?;
            return self.transpose(product, at);
        }
        self.multiply_columns(a, b, at)
    }

    fn multiply_columns(
        &mut self,
        a: Handle<SsaValue>,
        b: Handle<SsaValue>,
        at: Cursor,
    ) -> Result<Handle<SsaValue>, ParseError> {
        let scalar = self.scalar_of_value(a)?;
        let a_columns = self.columns(a)?;
        let b_columns = self.columns(b)?;
        let a_first = first_column(&a_columns)?;
        let rows = self.def_components(at, a_first);
        let inner = a_columns.len() as u32;
        if self.def_components(at, first_column(&b_columns)?) != inner {
            return Err(ParseError::Lowering(
                "matrix multiply with mismatched dimensions".into(),
            ));
        }

        let mut dest = Vec::with_capacity(b_columns.len());
        match self.ssa[a].transposed {
            Some(rows_of_a) if scalar.kind == ScalarKind::Float => {
                let a_rows = self.columns(rows_of_a)?;
                let dot = match inner {
                    2 => AluOp::Fdot2,
                    3 => AluOp::Fdot3,
                    4 => AluOp::Fdot4,
                    _ => AluOp::Fmul,
                };
                for &column in &b_columns {
                    let lanes: Vec<_> = a_rows
                        .iter()
                        .map(|&row| (self.alu(at, dot, &[row, column], 1), 0))
                        .collect();
                    dest.push(self.gather(at, &lanes));
                }
            }
            _ => {
                for &column in &b_columns {
                    let mut acc = self.alu_with(
                        at,
                        AluOp::Fmul,
                        vec![AluSrc::new(a_first), AluSrc::lane(column, 0)],
                        rows,
                    );
                    for (j, &a_column) in a_columns.iter().enumerate().skip(1) {
                        let term = self.alu_with(
                            at,
                            AluOp::Fmul,
                            vec![AluSrc::new(a_column), AluSrc::lane(column, j as u8)],
                            rows,
                        );
                        acc = self.alu(at, AluOp::Fadd, &[acc, term], rows);
                    }
                    dest.push(acc);
                }
            }
        }
        self.matrix_value(scalar, dest, rows)
    }
}

fn first_column(columns: &[Handle<Instruction>]) -> Result<Handle<Instruction>, ParseError> {
    columns
        .first()
        .copied()
        .ok_or_else(|| ParseError::Lowering("matrix operand has no columns".into()))
}

#[cfg(test)]
mod tests {
    use kiln_ir::{CfList, Function, TypeInner, VectorSize};

    use super::*;
    use crate::Options;

    fn setup(words: &[u32]) -> (Translator<'_>, Cursor) {
        let mut ctx = Translator::new(words, 16, Options::default());
        let f = ctx.module.functions.append(Function::new(None));
        (ctx, Cursor::end_of(f, CfList::Body))
    }

    fn constant_matrix(
        ctx: &mut Translator<'_>,
        at: Cursor,
        columns: &[[f32; 2]],
    ) -> Handle<SsaValue> {
        let defs = columns
            .iter()
            .map(|c| ctx.load_const(at, c.iter().map(|f| f.to_bits()).collect()))
            .collect();
        ctx.matrix_value(Scalar::F32, defs, 2).unwrap()
    }

    fn count(ctx: &Translator<'_>, at: Cursor, op: AluOp) -> usize {
        ctx.module.functions[at.function]
            .instructions
            .iter()
            .filter(|(_, i)| matches!(i, Instruction::Alu { op: o, .. } if *o == op))
            .count()
    }

    #[test]
    fn transpose_is_cached_both_ways() {
        let words = [0; 5];
        let (mut ctx, at) = setup(&words);
        let m = constant_matrix(&mut ctx, at, &[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        let t = ctx.transpose(m, at).unwrap();
        assert_eq!(
            ctx.module.types[ctx.ssa[t].ty].inner,
            TypeInner::Matrix {
                columns: VectorSize::Bi,
                rows: VectorSize::Tri,
                scalar: Scalar::F32,
            }
        );
        assert_eq!(ctx.transpose(t, at).unwrap(), m);
        assert_eq!(ctx.transpose(m, at).unwrap(), t);
    }

    #[test]
    fn plain_multiply_accumulates_columns() {
        let words = [0; 5];
        let (mut ctx, at) = setup(&words);
        let a = constant_matrix(&mut ctx, at, &[[1.0, 2.0], [3.0, 4.0]]);
        let b = constant_matrix(&mut ctx, at, &[[5.0, 6.0], [7.0, 8.0]]);
        let product = ctx.multiply(a, b, at).unwrap();
        assert_eq!(ctx.columns(product).unwrap().len(), 2);
        assert_eq!(count(&ctx, at, AluOp::Fdot2), 0);
        assert_eq!(count(&ctx, at, AluOp::Fadd), 2);
    }

    #[test]
    fn transposed_operand_uses_dot_products() {
        let words = [0; 5];
        let (mut ctx, at) = setup(&words);
        let a = constant_matrix(&mut ctx, at, &[[1.0, 2.0], [3.0, 4.0]]);
        let t = ctx.transpose(a, at).unwrap();
        let v = ctx.load_const(at, vec![1.0f32.to_bits(), 1.0f32.to_bits()]);
        let ty = kiln_ir::vector_type(&mut ctx.module.types, Scalar::F32, 2).unwrap();
        let v = ctx.ssa.append(SsaValue::leaf(ty, v));
        let product = ctx.multiply(t, v, at).unwrap();
        assert!(matches!(ctx.ssa[product].node, SsaNode::Leaf(_)));
        assert_eq!(count(&ctx, at, AluOp::Fdot2), 2);
    }

    #[test]
    fn product_of_two_transposes_is_swapped_once() {
        let words = [0; 5];
        let (mut ctx, at) = setup(&words);
        let a = constant_matrix(&mut ctx, at, &[[1.0, 2.0], [3.0, 4.0]]);
        let b = constant_matrix(&mut ctx, at, &[[5.0, 6.0], [7.0, 8.0]]);
        let a_t = ctx.transpose(a, at).unwrap();
        let b_t = ctx.transpose(b, at).unwrap();
        let product = ctx.multiply(a_t, b_t, at).unwrap();
        assert_eq!(ctx.columns(product).unwrap().len(), 2);
        // b * a through the rows of b, then one transpose of the result
        assert_eq!(count(&ctx, at, AluOp::Fdot2), 4);
        assert_eq!(count(&ctx, at, AluOp::Fadd), 0);
        assert!(ctx.ssa[product].transposed.is_some());
    }

    #[test]
    fn matrix_without_columns_is_an_error() {
        let words = [0; 5];
        let (mut ctx, at) = setup(&words);
        let ty = matrix_type(&mut ctx.module.types, Scalar::F32, 2, 2).unwrap();
        let empty = ctx.ssa.append(SsaValue::elems(ty, Vec::new()));
        assert!(matches!(
            ctx.transpose(empty, at),
            Err(ParseError::Lowering(_))
        ));
        let m = constant_matrix(&mut ctx, at, &[[1.0, 2.0], [3.0, 4.0]]);
        assert!(matches!(
            ctx.multiply(empty, m, at),
            Err(ParseError::Lowering(_))
        ));
        assert!(matches!(
            ctx.multiply(m, empty, at),
            Err(ParseError::Lowering(_))
        ));
    }
}
