//! Translation context and instruction dispatch.

use std::collections::HashMap;

use kiln_ir::{Arena, Block, Cursor, EntryPoint, Handle, Module, ShaderStage};
use spirv::Op;

use crate::cfg::{SpvBlock, SpvFunction};
use crate::ssa::SsaValue;
use crate::value::{ExtSet, Value, ValueTable};
use crate::words::{Instruction, walk};
use crate::{HEADER_WORDS, Options, ParseError, read_header};

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

struct PendingEntryPoint {
    name: String,
    stage: ShaderStage,
    function: u32,
}

/// Translation-scoped state. Everything allocated during translation lives
/// here and is dropped together once the module is returned.
pub(crate) struct Translator<'w> {
    pub(crate) words: &'w [u32],
    pub(crate) options: Options,
    pub(crate) values: ValueTable,
    pub(crate) module: Module,
    pub(crate) ssa: Arena<SsaValue>,
    pub(crate) blocks: Arena<SpvBlock>,
    pub(crate) functions: Arena<SpvFunction>,
    entry_points: Vec<PendingEntryPoint>,
    /// Stage of the first entry point; selects interface location offsets.
    pub(crate) stage: Option<ShaderStage>,
    /// IR blocks of the function being emitted, mapped to the SPIR-V block
    /// control leaves them as.
    pub(crate) end_blocks: HashMap<Handle<Block>, Handle<SpvBlock>>,
    /// Phis awaiting their sources, by result id.
    pub(crate) pending_phis: HashMap<u32, Handle<SsaValue>>,
    /// Set while emitting a block entered by a plain branch that continued
    /// the current IR block.
    pub(crate) linear_pred: Option<Handle<SpvBlock>>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub(crate) fn translate(words: &[u32], options: &Options) -> Result<Module, ParseError> {
    let header = read_header(words)?;
    log::info!(
        "translating SPIR-V module: generator {:#010x}, bound {}",
        header.generator,
        header.bound
    );

    let mut ctx = Translator::new(words, header.bound, *options);
    let end = words.len();
    let body = walk(words, HEADER_WORDS, end, |instr| {
        let more = ctx.handle_preamble(&instr)?;
        if more {
            log::debug!("{:?} [{}]", instr.op, instr.word_count());
        }
        Ok(more)
    })?;

    ctx.prepass(body, end)?;
    for func in ctx.functions.handles() {
        ctx.emit_function(func)?;
    }
    ctx.finish_entry_points()?;
    Ok(ctx.module)
}

impl<'w> Translator<'w> {
    pub(crate) fn new(words: &'w [u32], bound: u32, options: Options) -> Self {
        Self {
            words,
            options,
            values: ValueTable::new(bound),
            module: Module::default(),
            ssa: Arena::new(),
            blocks: Arena::new(),
            functions: Arena::new(),
            entry_points: Vec::new(),
            stage: None,
            end_blocks: HashMap::new(),
            pending_phis: HashMap::new(),
            linear_pred: None,
        }
    }

    fn finish_entry_points(&mut self) -> Result<(), ParseError> {
        for ep in std::mem::take(&mut self.entry_points) {
            let func = self.values.function(ep.function)?;
            self.module.entry_points.push(EntryPoint {
                name: ep.name,
                stage: ep.stage,
                function: self.functions[func].ir,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Preamble
// ---------------------------------------------------------------------------

impl Translator<'_> {
    /// Handles one preamble instruction; returns `false` at the first
    /// instruction that does not belong to the preamble.
    pub(crate) fn handle_preamble(&mut self, instr: &Instruction<'_>) -> Result<bool, ParseError> {
        match instr.op {
            Op::Nop
            | Op::Source
            | Op::SourceContinued
            | Op::SourceExtension
            | Op::Extension
            | Op::Capability
            | Op::MemoryModel
            | Op::ExecutionMode
            | Op::ModuleProcessed
            | Op::Line
            | Op::NoLine => log::trace!("ignoring {:?}", instr.op),
            Op::String => {
                let (text, _) = instr.string(1)?;
                self.values.push(instr.operand(0)?, Value::String(text))?;
            }
            Op::Name => {
                let (name, _) = instr.string(1)?;
                self.values.set_name(instr.operand(0)?, name)?;
            }
            Op::MemberName => {
                let (name, _) = instr.string(2)?;
                self.values
                    .set_member_name(instr.operand(0)?, instr.operand(1)?, name)?;
            }
            Op::ExtInstImport => {
                let (name, _) = instr.string(1)?;
                let set = match name.as_str() {
                    "GLSL.std.450" => ExtSet::Glsl450,
                    _ => ExtSet::Unknown(name),
                };
                self.values
                    .push(instr.operand(0)?, Value::ExtensionImport(set))?;
            }
            Op::EntryPoint => self.handle_entry_point(instr)?,
            Op::Decorate
            | Op::MemberDecorate
            | Op::DecorationGroup
            | Op::GroupDecorate
            | Op::GroupMemberDecorate => self.handle_decoration(instr)?,
            Op::TypeVoid
            | Op::TypeBool
            | Op::TypeInt
            | Op::TypeFloat
            | Op::TypeVector
            | Op::TypeMatrix
            | Op::TypeImage
            | Op::TypeSampledImage
            | Op::TypeArray
            | Op::TypeStruct
            | Op::TypeFunction
            | Op::TypePointer => self.handle_type(instr)?,
            Op::ConstantTrue
            | Op::ConstantFalse
            | Op::Constant
            | Op::ConstantComposite
            | Op::ConstantNull
            | Op::SpecConstantTrue
            | Op::SpecConstantFalse
            | Op::SpecConstant
            | Op::SpecConstantComposite => self.handle_constant(instr)?,
            Op::Undef => self.preamble_undef(instr)?,
            Op::Variable => self.handle_variable(instr, None)?,
            Op::TypeSampler
            | Op::TypeRuntimeArray
            | Op::TypeOpaque
            | Op::TypeForwardPointer
            | Op::ConstantSampler
            | Op::SpecConstantOp => return Err(ParseError::UnsupportedOpcode(instr.op)),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn handle_entry_point(&mut self, instr: &Instruction<'_>) -> Result<(), ParseError> {
        let raw = instr.operand(0)?;
        let model =
            spirv::ExecutionModel::from_u32(raw).ok_or(ParseError::InvalidOperands(instr.op))?;
        let stage = match model {
            spirv::ExecutionModel::Vertex => ShaderStage::Vertex,
            spirv::ExecutionModel::TessellationControl => ShaderStage::TessControl,
            spirv::ExecutionModel::TessellationEvaluation => ShaderStage::TessEval,
            spirv::ExecutionModel::Geometry => ShaderStage::Geometry,
            spirv::ExecutionModel::Fragment => ShaderStage::Fragment,
            spirv::ExecutionModel::GLCompute => ShaderStage::Compute,
            other => {
                return Err(ParseError::Unsupported(format!(
                    "execution model {other:?}"
                )));
            }
        };
        let function = instr.operand(1)?;
        let (name, _) = instr.string(2)?;
        log::info!("entry point {name:?} ({stage}) -> %{function}");
        self.stage.get_or_insert(stage);
        self.entry_points.push(PendingEntryPoint {
            name,
            stage,
            function,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Function bodies
// ---------------------------------------------------------------------------

impl Translator<'_> {
    /// Handles one instruction of a block body, emitting at `at`.
    pub(crate) fn handle_body(
        &mut self,
        instr: &Instruction<'_>,
        at: Cursor,
    ) -> Result<(), ParseError> {
        log::debug!("{:?} [{}]", instr.op, instr.word_count());
        match instr.op {
            Op::Nop | Op::Line | Op::NoLine => Ok(()),
            Op::Undef => self.body_undef(instr, at),
            Op::Variable => self.handle_variable(instr, Some(at.function)),
            Op::AccessChain | Op::InBoundsAccessChain => self.access_chain(instr, at),
            Op::Load => self.load(instr, at),
            Op::Store => self.store(instr, at),
            Op::CopyMemory => self.copy_memory(instr, at),
            Op::Phi => self.phi_placeholder(instr, at),
            Op::CompositeConstruct
            | Op::CompositeExtract
            | Op::CompositeInsert
            | Op::VectorShuffle
            | Op::VectorExtractDynamic
            | Op::VectorInsertDynamic
            | Op::CopyObject => self.handle_composite(instr, at),
            Op::Transpose
            | Op::MatrixTimesScalar
            | Op::VectorTimesMatrix
            | Op::MatrixTimesVector
            | Op::MatrixTimesMatrix
            | Op::OuterProduct => self.handle_matrix(instr, at),
            Op::ImageSampleImplicitLod
            | Op::ImageSampleExplicitLod
            | Op::ImageSampleDrefImplicitLod
            | Op::ImageSampleDrefExplicitLod
            | Op::ImageFetch => self.handle_texture(instr, at),
            Op::ExtInst => self.handle_ext_inst(instr, at),
            op if crate::alu::is_alu(op) => self.handle_alu(instr, at),
            op => Err(ParseError::UnsupportedOpcode(op)),
        }
    }
}
