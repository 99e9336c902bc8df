//! Variables and memory access.
//!
//! Every pointer is a [`Deref`] chain rooted at a variable. Aggregates are
//! loaded and stored one leaf at a time, so a load of a struct produces an
//! SSA tree of per-leaf loads.

use kiln_ir::{
    AluOp, ArrayIndex, BuiltIn, Cursor, Deref, DerefLink, FRAG_RESULT_DATA0, Function, Handle,
    Instruction, Interpolation, ResourceBinding, ScalarKind, ShaderStage, Type, TypeInner,
    VARYING_SLOT_VAR0, VERT_ATTRIB_GENERIC0, Variable, VariableMode,
};
use spirv::{Decoration, StorageClass};

use crate::ParseError;
use crate::ssa::{SsaNode, SsaValue};
use crate::translate::Translator;
use crate::value::{DerefValue, Lane, Value};
use crate::words;

/// Maps a SPIR-V builtin to the IR's, when it has one.
pub(crate) fn builtin(raw: u32) -> Option<BuiltIn> {
    use spirv::BuiltIn as B;
    Some(match B::from_u32(raw)? {
        B::Position => BuiltIn::Position,
        B::PointSize => BuiltIn::PointSize,
        B::ClipDistance => BuiltIn::ClipDistance,
        B::CullDistance => BuiltIn::CullDistance,
        B::VertexId => BuiltIn::VertexId,
        B::InstanceId => BuiltIn::InstanceId,
        B::VertexIndex => BuiltIn::VertexIndex,
        B::InstanceIndex => BuiltIn::InstanceIndex,
        B::PrimitiveId => BuiltIn::PrimitiveId,
        B::InvocationId => BuiltIn::InvocationId,
        B::Layer => BuiltIn::Layer,
        B::ViewportIndex => BuiltIn::ViewportIndex,
        B::FragCoord => BuiltIn::FragCoord,
        B::PointCoord => BuiltIn::PointCoord,
        B::FrontFacing => BuiltIn::FrontFacing,
        B::SampleId => BuiltIn::SampleId,
        B::SamplePosition => BuiltIn::SamplePosition,
        B::SampleMask => BuiltIn::SampleMask,
        B::FragDepth => BuiltIn::FragDepth,
        B::HelperInvocation => BuiltIn::HelperInvocation,
        B::NumWorkgroups => BuiltIn::NumWorkgroups,
        B::WorkgroupId => BuiltIn::WorkgroupId,
        B::LocalInvocationId => BuiltIn::LocalInvocationId,
        B::GlobalInvocationId => BuiltIn::GlobalInvocationId,
        B::LocalInvocationIndex => BuiltIn::LocalInvocationIndex,
        _ => return None,
    })
}

/// Slot base added to `Location` for an interface variable.
fn location_base(stage: Option<ShaderStage>, mode: VariableMode) -> u32 {
    match (stage, mode) {
        (Some(ShaderStage::Fragment), VariableMode::ShaderOut) => FRAG_RESULT_DATA0,
        (Some(ShaderStage::Vertex), VariableMode::ShaderIn) => VERT_ATTRIB_GENERIC0,
        (_, VariableMode::ShaderIn | VariableMode::ShaderOut) => VARYING_SLOT_VAR0,
        _ => 0,
    }
}

/// The deref of child `index` of a value of type `ty` stored at `deref`.
fn child_deref(deref: &Deref, ty: &TypeInner, index: u32) -> Deref {
    match *ty {
        TypeInner::Struct { .. } => deref.member(index),
        _ => deref.element(index),
    }
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

impl Translator<'_> {
    /// `OpVariable`, at module scope or inside `function`.
    pub(crate) fn handle_variable(
        &mut self,
        instr: &words::Instruction<'_>,
        function: Option<Handle<Function>>,
    ) -> Result<(), ParseError> {
        let pointer = self.values.type_value(instr.operand(0)?)?;
        if pointer.pointer.is_none() {
            return Err(ParseError::InvalidOperands(instr.op));
        }
        let id = instr.operand(1)?;
        let storage = StorageClass::from_u32(instr.operand(2)?)
            .ok_or(ParseError::InvalidOperands(instr.op))?;
        let decorations = self.values.decorations(id)?;

        let mode = match storage {
            StorageClass::UniformConstant | StorageClass::Uniform | StorageClass::PushConstant => {
                VariableMode::Uniform
            }
            StorageClass::Input => {
                let system_value = decorations.iter().any(|dec| {
                    dec.kind == Decoration::BuiltIn
                        && dec
                            .literal()
                            .and_then(builtin)
                            .is_some_and(BuiltIn::is_system_value)
                });
                if system_value {
                    VariableMode::SystemValue
                } else {
                    VariableMode::ShaderIn
                }
            }
            StorageClass::Output => VariableMode::ShaderOut,
            StorageClass::Private => VariableMode::Global,
            StorageClass::Function => VariableMode::Local,
            other => return Err(ParseError::UnsupportedStorageClass(other)),
        };

        let ty = pointer.ty;
        let mut var = Variable::new(self.values.name(id), ty, mode);
        let mut binding = ResourceBinding {
            descriptor_set: 0,
            binding: 0,
        };
        let mut bound = false;
        for dec in decorations.iter().filter(|dec| dec.member.is_none()) {
            match dec.kind {
                Decoration::Binding => {
                    binding.binding = dec.literal().unwrap_or(0);
                    bound = true;
                }
                Decoration::DescriptorSet => {
                    binding.descriptor_set = dec.literal().unwrap_or(0);
                    bound = true;
                }
                Decoration::BuiltIn => {
                    let raw = dec.literal().unwrap_or(u32::MAX);
                    var.builtin = builtin(raw);
                    if var.builtin.is_none() {
                        log::warn!("dropping unknown builtin {raw} on %{id}");
                    }
                }
                Decoration::Location => {
                    var.location = dec
                        .literal()
                        .map(|loc| loc + location_base(self.stage, mode));
                }
                Decoration::Component => var.component = dec.literal(),
                Decoration::Index => var.index = dec.literal(),
                Decoration::Flat => var.interpolation = Some(Interpolation::Flat),
                Decoration::NoPerspective => var.interpolation = Some(Interpolation::NoPerspective),
                Decoration::Centroid => var.centroid = true,
                Decoration::Sample => var.sample = true,
                Decoration::Invariant => var.invariant = true,
                Decoration::Patch => var.patch = true,
                Decoration::NonWritable => var.read_only = true,
                Decoration::RelaxedPrecision
                | Decoration::Block
                | Decoration::BufferBlock
                | Decoration::ArrayStride
                | Decoration::MatrixStride
                | Decoration::RowMajor
                | Decoration::ColMajor => log::trace!("ignoring {:?} on %{id}", dec.kind),
                kind => log::warn!("dropping {kind:?} on %{id}"),
            }
        }
        if bound {
            var.binding = Some(binding);
        }
        if let Some(&init) = instr.operands().get(3) {
            var.init = Some(self.values.constant(init)?);
        }

        let function = function.filter(|_| mode == VariableMode::Local);
        let var = self.module.add_variable(var, function);
        self.values.push(
            id,
            Value::Deref(DerefValue {
                deref: Deref::var(var),
                ty,
                lane: None,
            }),
        )
    }

    // -----------------------------------------------------------------------
    // Access chains
    // -----------------------------------------------------------------------

    pub(crate) fn access_chain(
        &mut self,
        instr: &words::Instruction<'_>,
        at: Cursor,
    ) -> Result<(), ParseError> {
        let id = instr.operand(1)?;
        let base = self.values.deref(instr.operand(2)?)?.clone();
        if base.lane.is_some() {
            return Err(ParseError::Lowering(format!(
                "%{id} indexes into a vector component"
            )));
        }
        let DerefValue { mut deref, mut ty, .. } = base;
        let mut lane = None;

        for &index in instr.operands_from(3) {
            if lane.is_some() {
                return Err(ParseError::Lowering(format!(
                    "%{id} indexes past a vector component"
                )));
            }
            let constant = self
                .values
                .try_constant(index)?
                .and_then(|c| self.module.constants[c].bits()?.first().copied());
            match *self.inner(ty) {
                TypeInner::Struct { .. } => {
                    let member = constant.ok_or(ParseError::NonConstantStructIndex(index))?;
                    deref = deref.member(member);
                    ty = self.child_type(ty, member)?;
                }
                TypeInner::Array { .. } | TypeInner::Matrix { .. } => {
                    let link = match constant {
                        Some(i) => ArrayIndex::Direct(i),
                        None => ArrayIndex::Indirect(self.ssa_def(index, at)?),
                    };
                    deref = deref.with(DerefLink::Array(link));
                    ty = self.child_type(ty, 0)?;
                }
                TypeInner::Vector { .. } => {
                    let index = match constant {
                        Some(i) => ArrayIndex::Direct(i),
                        None => ArrayIndex::Indirect(self.ssa_def(index, at)?),
                    };
                    lane = Some(Lane { index, vector: ty });
                    ty = self.child_type(ty, 0)?;
                }
                _ => {
                    return Err(ParseError::Lowering(format!(
                        "%{id} indexes into a non-composite type"
                    )));
                }
            }
        }

        self.values
            .push(id, Value::Deref(DerefValue { deref, ty, lane }))
    }

    // -----------------------------------------------------------------------
    // Loads
    // -----------------------------------------------------------------------

    pub(crate) fn load(&mut self, instr: &words::Instruction<'_>, at: Cursor) -> Result<(), ParseError> {
        let id = instr.operand(1)?;
        let src = self.values.deref(instr.operand(2)?)?.clone();

        if matches!(self.inner(src.ty), TypeInner::Sampler { .. }) {
            return self.values.push(id, Value::Deref(src));
        }

        if let Some(Lane { index, vector }) = src.lane {
            let components = self.components(vector)?;
            let whole = self.load_leaf(&src.deref, vector, at)?;
            let def = match index {
                ArrayIndex::Direct(i) => self.extract_lane(at, whole, i),
                ArrayIndex::Indirect(index) => {
                    self.extract_dynamic(at, whole, components, index)
                }
            };
            return self.push_leaf(id, src.ty, def);
        }

        let tree = self.load_tree(&src.deref, src.ty, at)?;
        self.values.push(id, Value::Ssa(tree))
    }

    fn load_tree(
        &mut self,
        deref: &Deref,
        ty: Handle<Type>,
        at: Cursor,
    ) -> Result<Handle<SsaValue>, ParseError> {
        if self.inner(ty).is_vector_or_scalar() {
            let def = self.load_leaf(deref, ty, at)?;
            return Ok(self.ssa.append(SsaValue::leaf(ty, def)));
        }
        let count = self.inner(ty).child_count().ok_or_else(|| {
            ParseError::Lowering(format!("cannot load a value of type {ty:?}"))
        })?;
        let mut elems = Vec::with_capacity(count as usize);
        for i in 0..count {
            let child = child_deref(deref, self.inner(ty), i);
            let child_ty = self.child_type(ty, i)?;
            elems.push(self.load_tree(&child, child_ty, at)?);
        }
        Ok(self.ssa.append(SsaValue::elems(ty, elems)))
    }

    /// Loads one scalar or vector. Booleans read from uniforms are
    /// normalized to `0`/`TRUE`.
    fn load_leaf(
        &mut self,
        deref: &Deref,
        ty: Handle<Type>,
        at: Cursor,
    ) -> Result<Handle<Instruction>, ParseError> {
        let components = self.components(ty)?;
        let def = self.emit(
            at,
            Instruction::LoadVar {
                deref: deref.clone(),
                components,
            },
        );
        let is_bool = self
            .inner(ty)
            .scalar()
            .is_some_and(|s| s.kind == ScalarKind::Bool);
        if is_bool && self.module.variables[deref.var].mode == VariableMode::Uniform {
            let zero = self.load_const(at, vec![0]);
            return Ok(self.alu(at, AluOp::Ine, &[def, zero], components));
        }
        Ok(def)
    }

    // -----------------------------------------------------------------------
    // Stores and copies
    // -----------------------------------------------------------------------

    pub(crate) fn store(&mut self, instr: &words::Instruction<'_>, at: Cursor) -> Result<(), ParseError> {
        let dest = self.values.deref(instr.operand(0)?)?.clone();
        let value = instr.operand(1)?;

        if let Some(Lane { index, vector }) = dest.lane {
            let components = self.components(vector)?;
            let scalar = self.ssa_def(value, at)?;
            let whole = self.emit(
                at,
                Instruction::LoadVar {
                    deref: dest.deref.clone(),
                    components,
                },
            );
            let updated = match index {
                ArrayIndex::Direct(i) => {
                    let lanes: Vec<_> = (0..components)
                        .map(|c| if c == i { (scalar, 0) } else { (whole, c) })
                        .collect();
                    self.gather(at, &lanes)
                }
                ArrayIndex::Indirect(index) => {
                    self.insert_dynamic(at, whole, components, scalar, index)
                }
            };
            self.emit(
                at,
                Instruction::StoreVar {
                    deref: dest.deref,
                    value: updated,
                    writemask: writemask(components),
                },
            );
            return Ok(());
        }

        let tree = self.ssa_value(value, at)?;
        self.store_tree(&dest.deref, tree, at)
    }

    pub(crate) fn store_tree(
        &mut self,
        deref: &Deref,
        tree: Handle<SsaValue>,
        at: Cursor,
    ) -> Result<(), ParseError> {
        let ty = self.ssa[tree].ty;
        match self.ssa[tree].node {
            SsaNode::Leaf(value) => {
                let components = self.components(ty)?;
                self.emit(
                    at,
                    Instruction::StoreVar {
                        deref: deref.clone(),
                        value,
                        writemask: writemask(components),
                    },
                );
            }
            SsaNode::Elems(ref elems) => {
                let elems = elems.clone();
                for (i, elem) in elems.into_iter().enumerate() {
                    let child = child_deref(deref, self.inner(ty), i as u32);
                    self.store_tree(&child, elem, at)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn copy_memory(
        &mut self,
        instr: &words::Instruction<'_>,
        at: Cursor,
    ) -> Result<(), ParseError> {
        let dst = self.values.deref(instr.operand(0)?)?.clone();
        let src = self.values.deref(instr.operand(1)?)?.clone();
        if dst.lane.is_some() || src.lane.is_some() {
            return Err(ParseError::Lowering(
                "copy through a vector component".into(),
            ));
        }
        self.copy_tree(&dst.deref, &src.deref, src.ty, at)
    }

    fn copy_tree(
        &mut self,
        dst: &Deref,
        src: &Deref,
        ty: Handle<Type>,
        at: Cursor,
    ) -> Result<(), ParseError> {
        if self.inner(ty).is_vector_or_scalar() {
            self.emit(
                at,
                Instruction::CopyVar {
                    dst: dst.clone(),
                    src: src.clone(),
                },
            );
            return Ok(());
        }
        let count = self.inner(ty).child_count().ok_or_else(|| {
            ParseError::Lowering(format!("cannot copy a value of type {ty:?}"))
        })?;
        for i in 0..count {
            let inner = self.inner(ty);
            let (d, s) = (child_deref(dst, inner, i), child_deref(src, inner, i));
            let child_ty = self.child_type(ty, i)?;
            self.copy_tree(&d, &s, child_ty, at)?;
        }
        Ok(())
    }
}

fn writemask(components: u32) -> u8 {
    ((1u32 << components) - 1) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writemask_covers_components() {
        assert_eq!(writemask(1), 0b1);
        assert_eq!(writemask(3), 0b111);
        assert_eq!(writemask(4), 0b1111);
    }

    #[test]
    fn location_bases_follow_stage() {
        assert_eq!(
            location_base(Some(ShaderStage::Fragment), VariableMode::ShaderOut),
            FRAG_RESULT_DATA0
        );
        assert_eq!(
            location_base(Some(ShaderStage::Fragment), VariableMode::ShaderIn),
            VARYING_SLOT_VAR0
        );
        assert_eq!(
            location_base(Some(ShaderStage::Vertex), VariableMode::ShaderIn),
            VERT_ATTRIB_GENERIC0
        );
        assert_eq!(
            location_base(Some(ShaderStage::Vertex), VariableMode::ShaderOut),
            VARYING_SLOT_VAR0
        );
        assert_eq!(location_base(None, VariableMode::Uniform), 0);
    }

    #[test]
    fn builtins_map_by_value() {
        assert_eq!(
            builtin(spirv::BuiltIn::FragCoord as u32),
            Some(BuiltIn::FragCoord)
        );
        assert_eq!(
            builtin(spirv::BuiltIn::VertexIndex as u32),
            Some(BuiltIn::VertexIndex)
        );
        assert_eq!(builtin(spirv::BuiltIn::TessCoord as u32), None);
        assert_eq!(builtin(9999), None);
    }

    #[test]
    fn struct_children_are_members() {
        let var = Deref::var(Handle::from_index(0));
        let st = TypeInner::Struct {
            members: Vec::new(),
        };
        let arr = TypeInner::Array {
            base: Handle::from_index(0),
            len: 2,
        };
        assert_eq!(child_deref(&var, &st, 1), var.member(1));
        assert_eq!(child_deref(&var, &arr, 1), var.element(1));
    }
}
