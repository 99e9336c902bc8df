//! Shader variables, their storage modes, and interface metadata.

use crate::arena::Handle;
use crate::constant::Constant;
use crate::types::Type;

/// First slot of fragment shader outputs.
pub const FRAG_RESULT_DATA0: u32 = 4;
/// First slot of generic vertex shader inputs.
pub const VERT_ATTRIB_GENERIC0: u32 = 17;
/// First slot of generic varyings between stages.
pub const VARYING_SLOT_VAR0: u32 = 32;

/// Where a variable lives and who can see it.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum VariableMode {
    /// Read-only data bound by the application (uniforms, samplers, push
    /// constants).
    Uniform,
    /// Per-invocation input from the previous stage.
    ShaderIn,
    /// Per-invocation output to the next stage.
    ShaderOut,
    /// Module-scope private storage.
    Global,
    /// Function-local storage.
    Local,
    /// Input supplied by fixed-function hardware (vertex index, front facing...).
    SystemValue,
}

/// `layout(set = N, binding = N)` resource binding.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct ResourceBinding {
    pub descriptor_set: u32,
    pub binding: u32,
}

/// Interpolation qualifier of a varying.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Interpolation {
    Smooth,
    Flat,
    NoPerspective,
}

/// Built-in shader inputs/outputs.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum BuiltIn {
    Position,
    PointSize,
    ClipDistance,
    CullDistance,
    VertexId,
    InstanceId,
    VertexIndex,
    InstanceIndex,
    PrimitiveId,
    InvocationId,
    Layer,
    ViewportIndex,
    FragCoord,
    PointCoord,
    FrontFacing,
    SampleId,
    SamplePosition,
    SampleMask,
    FragDepth,
    HelperInvocation,
    NumWorkgroups,
    WorkgroupId,
    LocalInvocationId,
    GlobalInvocationId,
    LocalInvocationIndex,
}

impl BuiltIn {
    /// Returns `true` for builtins that are system values rather than
    /// varyings when read as shader inputs.
    pub fn is_system_value(self) -> bool {
        matches!(
            self,
            Self::VertexId
                | Self::InstanceId
                | Self::VertexIndex
                | Self::InstanceIndex
                | Self::PrimitiveId
                | Self::InvocationId
                | Self::FrontFacing
                | Self::SampleId
                | Self::SamplePosition
                | Self::SampleMask
                | Self::HelperInvocation
                | Self::NumWorkgroups
                | Self::WorkgroupId
                | Self::LocalInvocationId
                | Self::GlobalInvocationId
                | Self::LocalInvocationIndex
        )
    }
}

/// A variable of any storage mode.
#[derive(Clone, Debug)]
pub struct Variable {
    pub name: Option<String>,
    pub ty: Handle<Type>,
    pub mode: VariableMode,
    /// Interface slot, already offset by the stage's slot base.
    pub location: Option<u32>,
    pub component: Option<u32>,
    /// Dual-source blend index.
    pub index: Option<u32>,
    pub builtin: Option<BuiltIn>,
    pub binding: Option<ResourceBinding>,
    pub interpolation: Option<Interpolation>,
    pub centroid: bool,
    pub sample: bool,
    pub invariant: bool,
    pub patch: bool,
    pub read_only: bool,
    /// Initial contents.
    pub init: Option<Handle<Constant>>,
}

impl Variable {
    /// A variable with no interface metadata.
    pub fn new(name: Option<String>, ty: Handle<Type>, mode: VariableMode) -> Self {
        Self {
            name,
            ty,
            mode,
            location: None,
            component: None,
            index: None,
            builtin: None,
            binding: None,
            interpolation: None,
            centroid: false,
            sample: false,
            invariant: false,
            patch: false,
            read_only: false,
            init: None,
        }
    }
}
