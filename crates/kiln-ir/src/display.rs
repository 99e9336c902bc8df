//! Display implementations and text dump for debugging.

use std::fmt;
use std::fmt::Write as _;

use crate::Module;
use crate::arena::{Arena, Handle, UniqueArena};
use crate::cf::CfNode;
use crate::constant::{Constant, ConstantValue};
use crate::deref::{ArrayIndex, Deref, DerefLink};
use crate::func::{Function, ShaderStage};
use crate::global::{BuiltIn, Interpolation, ResourceBinding, Variable, VariableMode};
use crate::instr::{AluOp, AluSrc, Instruction, Jump, TexOp, TexSrcKind};
use crate::types::{SamplerDim, Scalar, ScalarKind, Type, TypeInner, VectorSize};

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Sint => write!(f, "sint"),
            Self::Uint => write!(f, "uint"),
            Self::Float => write!(f, "float"),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ScalarKind::Bool => write!(f, "bool"),
            ScalarKind::Sint => write!(f, "i{}", self.width * 8),
            ScalarKind::Uint => write!(f, "u{}", self.width * 8),
            ScalarKind::Float => write!(f, "f{}", self.width * 8),
        }
    }
}

impl fmt::Display for VectorSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u32)
    }
}

impl fmt::Display for SamplerDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::D1 => "1d",
            Self::D2 => "2d",
            Self::D3 => "3d",
            Self::Cube => "cube",
            Self::Rect => "rect",
            Self::Buffer => "buffer",
            Self::Ms => "ms",
        };
        write!(f, "{name}")
    }
}

impl fmt::Display for VariableMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uniform => "uniform",
            Self::ShaderIn => "shader_in",
            Self::ShaderOut => "shader_out",
            Self::Global => "global",
            Self::Local => "local",
            Self::SystemValue => "system_value",
        };
        write!(f, "{name}")
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Smooth => write!(f, "smooth"),
            Self::Flat => write!(f, "flat"),
            Self::NoPerspective => write!(f, "noperspective"),
        }
    }
}

impl fmt::Display for BuiltIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Position => "position",
            Self::PointSize => "point_size",
            Self::ClipDistance => "clip_distance",
            Self::CullDistance => "cull_distance",
            Self::VertexId => "vertex_id",
            Self::InstanceId => "instance_id",
            Self::VertexIndex => "vertex_index",
            Self::InstanceIndex => "instance_index",
            Self::PrimitiveId => "primitive_id",
            Self::InvocationId => "invocation_id",
            Self::Layer => "layer",
            Self::ViewportIndex => "viewport_index",
            Self::FragCoord => "frag_coord",
            Self::PointCoord => "point_coord",
            Self::FrontFacing => "front_facing",
            Self::SampleId => "sample_id",
            Self::SamplePosition => "sample_position",
            Self::SampleMask => "sample_mask",
            Self::FragDepth => "frag_depth",
            Self::HelperInvocation => "helper_invocation",
            Self::NumWorkgroups => "num_workgroups",
            Self::WorkgroupId => "workgroup_id",
            Self::LocalInvocationId => "local_invocation_id",
            Self::GlobalInvocationId => "global_invocation_id",
            Self::LocalInvocationIndex => "local_invocation_index",
        };
        write!(f, "{name}")
    }
}

impl fmt::Display for ResourceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@set({}) @binding({})", self.descriptor_set, self.binding)
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vertex => "vertex",
            Self::TessControl => "tess_control",
            Self::TessEval => "tess_eval",
            Self::Geometry => "geometry",
            Self::Fragment => "fragment",
            Self::Compute => "compute",
        };
        write!(f, "{name}")
    }
}

impl fmt::Display for AluOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl fmt::Display for Jump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Break => write!(f, "break"),
            Self::Continue => write!(f, "continue"),
            Self::Return => write!(f, "return"),
        }
    }
}

impl fmt::Display for TexOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tex => "tex",
            Self::Txb => "txb",
            Self::Txl => "txl",
            Self::Txd => "txd",
            Self::Txf => "txf",
        };
        write!(f, "{name}")
    }
}

impl fmt::Display for TexSrcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Coord => "coord",
            Self::Projector => "projector",
            Self::Comparator => "comparator",
            Self::Bias => "bias",
            Self::Lod => "lod",
            Self::Ddx => "ddx",
            Self::Ddy => "ddy",
            Self::Offset => "offset",
            Self::MsIndex => "ms_index",
            Self::MinLod => "min_lod",
        };
        write!(f, "{name}")
    }
}

/// Formats a type using the type arena for resolving inner references.
pub fn format_type(ty: &Type, types: &UniqueArena<Type>) -> String {
    if let Some(ref name) = ty.name {
        return name.clone();
    }
    match ty.inner {
        TypeInner::Void => "void".into(),
        TypeInner::Scalar(s) => format!("{s}"),
        TypeInner::Vector { size, scalar } => format!("vec{size}<{scalar}>"),
        TypeInner::Matrix {
            columns,
            rows,
            scalar,
        } => format!("mat{columns}x{rows}<{scalar}>"),
        TypeInner::Array { base, len } => {
            format!("array<{}, {len}>", format_type(&types[base], types))
        }
        TypeInner::Struct { ref members } => {
            let fields: Vec<_> = members
                .iter()
                .map(|m| format_type(&types[m.ty], types))
                .collect();
            format!("struct {{ {} }}", fields.join(", "))
        }
        TypeInner::Function { result, ref params } => {
            let params: Vec<_> = params
                .iter()
                .map(|&p| format_type(&types[p], types))
                .collect();
            format!(
                "fn({}) -> {}",
                params.join(", "),
                format_type(&types[result], types)
            )
        }
        TypeInner::Sampler {
            dim,
            shadow,
            arrayed,
            result,
        } => {
            let array = if arrayed { "_array" } else { "" };
            let shadow = if shadow { "_shadow" } else { "" };
            format!("sampler{dim}{array}{shadow}<{result}>")
        }
    }
}

fn format_constant(handle: Handle<Constant>, constants: &Arena<Constant>) -> String {
    match constants[handle].value {
        ConstantValue::Flat(ref bits) => {
            let lanes: Vec<_> = bits.iter().map(|b| format!("{b:#010x}")).collect();
            format!("({})", lanes.join(", "))
        }
        ConstantValue::Composite(ref children) => {
            let children: Vec<_> = children
                .iter()
                .map(|&c| format_constant(c, constants))
                .collect();
            format!("{{{}}}", children.join(", "))
        }
    }
}

fn format_deref(deref: &Deref, variables: &Arena<Variable>) -> String {
    let mut out = match variables.try_get(deref.var).and_then(|v| v.name.as_deref()) {
        Some(name) => name.to_string(),
        None => format!("@{}", deref.var.index()),
    };
    for link in &deref.path {
        match *link {
            DerefLink::Array(ArrayIndex::Direct(i)) => {
                let _ = write!(out, "[{i}]");
            }
            DerefLink::Array(ArrayIndex::Indirect(h)) => {
                let _ = write!(out, "[%{}]", h.index());
            }
            DerefLink::Struct(i) => {
                let _ = write!(out, ".{i}");
            }
        }
    }
    out
}

fn format_alu_src(src: &AluSrc, lanes: u32) -> String {
    const NAMES: [char; 4] = ['x', 'y', 'z', 'w'];
    let swizzle: String = src.swizzle[..lanes.clamp(1, 4) as usize]
        .iter()
        .map(|&lane| NAMES[usize::from(lane & 3)])
        .collect();
    format!("%{}.{swizzle}", src.value.index())
}

fn format_instruction(instr: &Instruction, variables: &Arena<Variable>) -> String {
    match *instr {
        Instruction::LoadConst { ref bits } => {
            let lanes: Vec<_> = bits.iter().map(|b| format!("{b:#010x}")).collect();
            format!("load_const ({})", lanes.join(", "))
        }
        Instruction::Undef { components } => format!("undef{components}"),
        Instruction::Alu {
            op,
            ref srcs,
            components,
        } => {
            let lanes = op.input_width().unwrap_or(components);
            let srcs: Vec<_> = srcs.iter().map(|s| format_alu_src(s, lanes)).collect();
            format!("{op} {}", srcs.join(", "))
        }
        Instruction::Phi { ref srcs, .. } => {
            let srcs: Vec<_> = srcs
                .iter()
                .map(|s| format!("b{}: %{}", s.pred.index(), s.value.index()))
                .collect();
            format!("phi {}", srcs.join(", "))
        }
        Instruction::LoadVar { ref deref, .. } => {
            format!("load_var {}", format_deref(deref, variables))
        }
        Instruction::StoreVar {
            ref deref,
            value,
            writemask,
        } => format!(
            "store_var {}, %{} (wrmask {writemask:#x})",
            format_deref(deref, variables),
            value.index()
        ),
        Instruction::CopyVar { ref dst, ref src } => format!(
            "copy_var {}, {}",
            format_deref(dst, variables),
            format_deref(src, variables)
        ),
        Instruction::Texture(ref tex) => {
            let srcs: Vec<_> = tex
                .srcs
                .iter()
                .map(|s| format!("{} %{}", s.kind, s.value.index()))
                .collect();
            format!(
                "{} {} ({})",
                tex.op,
                format_deref(&tex.sampler, variables),
                srcs.join(", ")
            )
        }
        Instruction::Discard => "discard".into(),
        Instruction::Jump(jump) => format!("{jump}"),
    }
}

fn write_list(out: &mut String, func: &Function, list: &[CfNode], module: &Module, indent: usize) {
    let pad = " ".repeat(indent);
    for node in list {
        match *node {
            CfNode::Block(block) => {
                let _ = writeln!(out, "{pad}block b{}:", block.index());
                for &h in &func.blocks[block].instructions {
                    let instr = &func.instructions[h];
                    let text = format_instruction(instr, &module.variables);
                    if instr.components() > 0 {
                        let _ = writeln!(out, "{pad}  %{} = {text}", h.index());
                    } else {
                        let _ = writeln!(out, "{pad}  {text}");
                    }
                }
            }
            CfNode::If(h) => {
                let node = &func.ifs[h];
                let _ = writeln!(out, "{pad}if %{} {{", node.condition.index());
                write_list(out, func, &node.then_body, module, indent + 4);
                let _ = writeln!(out, "{pad}}} else {{");
                write_list(out, func, &node.else_body, module, indent + 4);
                let _ = writeln!(out, "{pad}}}");
            }
            CfNode::Loop(h) => {
                let _ = writeln!(out, "{pad}loop {{");
                write_list(out, func, &func.loops[h].body, module, indent + 4);
                let _ = writeln!(out, "{pad}}}");
            }
        }
    }
}

/// Renders one function of `module`.
pub fn dump_function(module: &Module, handle: Handle<Function>) -> String {
    let func = &module.functions[handle];
    let name = func.name.as_deref().unwrap_or("_");
    let ret = match func.result {
        Some(ty) => format!(" -> {}", format_type(&module.types[ty], &module.types)),
        None => String::new(),
    };
    let mut out = format!("  fn {name} [{}]{ret} {{\n", handle.index());
    for &local in &func.locals {
        let var = &module.variables[local];
        let _ = writeln!(
            out,
            "    local {}: {}",
            var.name.as_deref().unwrap_or("_"),
            format_type(&module.types[var.ty], &module.types)
        );
    }
    write_list(&mut out, func, &func.body, module, 4);
    out.push_str("  }\n");
    out
}

fn format_variable(var: &Variable, types: &UniqueArena<Type>) -> String {
    let name = var.name.as_deref().unwrap_or("_");
    let mut out = format!("{} {name}: {}", var.mode, format_type(&types[var.ty], types));
    if let Some(location) = var.location {
        let _ = write!(out, " @location({location})");
    }
    if let Some(component) = var.component {
        let _ = write!(out, " @component({component})");
    }
    if let Some(builtin) = var.builtin {
        let _ = write!(out, " @builtin({builtin})");
    }
    if let Some(binding) = var.binding {
        let _ = write!(out, " {binding}");
    }
    if let Some(interp) = var.interpolation {
        let _ = write!(out, " @{interp}");
    }
    if var.centroid {
        out.push_str(" @centroid");
    }
    if var.sample {
        out.push_str(" @sample");
    }
    if var.read_only {
        out.push_str(" readonly");
    }
    out
}

/// Produces a human-readable text dump of a [`Module`] for debugging.
pub fn dump_module(module: &Module) -> String {
    let mut out = String::new();

    out.push_str("Types:\n");
    for (handle, ty) in module.types.iter() {
        let formatted = format_type(ty, &module.types);
        let _ = writeln!(out, "  {handle:?} {formatted}");
    }

    if !module.constants.is_empty() {
        out.push_str("\nConstants:\n");
        for (handle, constant) in module.constants.iter() {
            let ty = format_type(&module.types[constant.ty], &module.types);
            let value = format_constant(handle, &module.constants);
            let _ = writeln!(out, "  {handle:?} {ty} = {value}");
        }
    }

    if !module.variables.is_empty() {
        out.push_str("\nVariables:\n");
        for (handle, var) in module.variables.iter() {
            if var.mode == VariableMode::Local {
                continue;
            }
            let _ = writeln!(out, "  {handle:?} {}", format_variable(var, &module.types));
        }
    }

    if !module.functions.is_empty() {
        out.push_str("\nFunctions:\n");
        for handle in module.functions.handles() {
            out.push_str(&dump_function(module, handle));
        }
    }

    if !module.entry_points.is_empty() {
        out.push_str("\nEntry Points:\n");
        for ep in &module.entry_points {
            let _ = writeln!(out, "  {} {} -> {:?}", ep.stage, ep.name, ep.function);
        }
    }

    out
}
