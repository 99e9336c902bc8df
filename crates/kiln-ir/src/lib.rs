//! kiln intermediate representation.
//!
//! An arena-based SSA IR with structured control flow, built by the SPIR-V
//! frontend and consumed by later passes. Registers are vector-native (up to
//! four 32-bit lanes); aggregates exist only in memory, behind [`Deref`]
//! chains.

pub mod arena;
mod cf;
mod constant;
mod deref;
mod display;
mod error;
pub mod eval;
mod func;
mod global;
mod instr;
mod types;
mod validate;

pub use arena::{Arena, Handle, UniqueArena};
pub use cf::{Block, CfList, CfNode, Cursor, IfNode, LoopNode, Position};
pub use constant::{Constant, ConstantValue, count_leaves};
pub use deref::{ArrayIndex, Deref, DerefLink};
pub use display::{dump_function, dump_module, format_type};
pub use error::IrError;
pub use func::{EntryPoint, Function, ShaderStage};
pub use global::{
    BuiltIn, FRAG_RESULT_DATA0, Interpolation, ResourceBinding, VARYING_SLOT_VAR0,
    VERT_ATTRIB_GENERIC0, Variable, VariableMode,
};
pub use instr::{
    AluOp, AluSrc, Instruction, Jump, PhiSource, TRUE, TexOp, TexSrc, TexSrcKind, Texture,
};
pub use types::{
    Bytes, SamplerDim, Scalar, ScalarKind, StructMember, Type, TypeInner, VectorSize,
    child_type, matrix_type, vector_type,
};
pub use validate::validate;

/// A translated shader module.
#[derive(Clone, Debug, Default)]
pub struct Module {
    /// Deduplicated type arena.
    pub types: UniqueArena<Type>,
    /// Constant trees referenced by variable initializers.
    pub constants: Arena<Constant>,
    /// Every variable, whatever its mode.
    pub variables: Arena<Variable>,
    pub inputs: Vec<Handle<Variable>>,
    pub outputs: Vec<Handle<Variable>>,
    pub uniforms: Vec<Handle<Variable>>,
    pub globals: Vec<Handle<Variable>>,
    pub locals: Vec<Handle<Variable>>,
    pub system_values: Vec<Handle<Variable>>,
    pub functions: Arena<Function>,
    pub entry_points: Vec<EntryPoint>,
}

impl Module {
    /// Adds a variable and files it under its mode. Local variables are
    /// also recorded on `function`.
    pub fn add_variable(
        &mut self,
        var: Variable,
        function: Option<Handle<Function>>,
    ) -> Handle<Variable> {
        let mode = var.mode;
        let handle = self.variables.append(var);
        let list = match mode {
            VariableMode::Uniform => &mut self.uniforms,
            VariableMode::ShaderIn => &mut self.inputs,
            VariableMode::ShaderOut => &mut self.outputs,
            VariableMode::Global => &mut self.globals,
            VariableMode::Local => &mut self.locals,
            VariableMode::SystemValue => &mut self.system_values,
        };
        list.push(handle);
        if let (VariableMode::Local, Some(function)) = (mode, function) {
            self.functions[function].locals.push(handle);
        }
        handle
    }

    /// Variables of one mode, in declaration order.
    pub fn variables_with_mode(&self, mode: VariableMode) -> &[Handle<Variable>] {
        match mode {
            VariableMode::Uniform => &self.uniforms,
            VariableMode::ShaderIn => &self.inputs,
            VariableMode::ShaderOut => &self.outputs,
            VariableMode::Global => &self.globals,
            VariableMode::Local => &self.locals,
            VariableMode::SystemValue => &self.system_values,
        }
    }

    /// Places `instr` at `at`.
    pub fn insert(&mut self, at: Cursor, instr: Instruction) -> Handle<Instruction> {
        self.functions[at.function].insert(at.position, instr)
    }

    /// Looks up a variable by debug name.
    pub fn variable_by_name(&self, name: &str) -> Option<Handle<Variable>> {
        self.variables
            .iter()
            .find(|(_, var)| var.name.as_deref() == Some(name))
            .map(|(handle, _)| handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variables_are_partitioned_by_mode() {
        let mut module = Module::default();
        let f32_ty = module.types.insert(Type::anonymous(TypeInner::Scalar(Scalar::F32)));
        let func = module.functions.append(Function::new(Some("main".into())));

        let input = module.add_variable(
            Variable::new(Some("in_color".into()), f32_ty, VariableMode::ShaderIn),
            None,
        );
        let local = module.add_variable(
            Variable::new(Some("tmp".into()), f32_ty, VariableMode::Local),
            Some(func),
        );

        assert_eq!(module.variables_with_mode(VariableMode::ShaderIn), &[input]);
        assert_eq!(module.variables_with_mode(VariableMode::Local), &[local]);
        assert!(module.outputs.is_empty());
        assert_eq!(module.functions[func].locals, vec![local]);
        assert_eq!(module.variable_by_name("tmp"), Some(local));
    }
}
