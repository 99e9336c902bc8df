//! A small SPIR-V assembler.
//!
//! Emits word streams the frontend accepts: the header carries
//! [`SUPPORTED_VERSION`](crate::SUPPORTED_VERSION) and the bound is patched
//! in from the ids handed out. Used by tests and to build fuzz seeds.

use spirv::{Decoration, Dim, ExecutionModel, Op, StorageClass, Word};

use crate::{HEADER_WORDS, SUPPORTED_VERSION};

/// Generator magic written into assembled modules.
pub const GENERATOR: Word = 0x000b_0001;

/// Encodes `text` as a NUL-terminated little-endian literal string.
pub fn encode_string(text: &str) -> Vec<Word> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(0);
    bytes.resize(bytes.len().next_multiple_of(4), 0);
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[derive(Clone, Debug)]
pub struct Assembler {
    words: Vec<Word>,
    next_id: Word,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            words: vec![spirv::MAGIC_NUMBER, SUPPORTED_VERSION, GENERATOR, 0, 0],
            next_id: 1,
        }
    }

    /// Allocates a fresh id.
    pub fn id(&mut self) -> Word {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Emits `op` with raw operands.
    pub fn emit(&mut self, op: Op, operands: &[Word]) {
        let count = (operands.len() + 1) as Word;
        self.words.push((count << 16) | op as Word);
        self.words.extend_from_slice(operands);
    }

    /// Emits `op` with a result type and a fresh result id, returning the id.
    pub fn instr(&mut self, op: Op, result_type: Word, operands: &[Word]) -> Word {
        let id = self.id();
        let mut all = vec![result_type, id];
        all.extend_from_slice(operands);
        self.emit(op, &all);
        id
    }

    /// Words emitted so far, header included.
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// The module so far, with the bound set to the ids handed out.
    pub fn finish(self) -> Vec<Word> {
        let bound = self.next_id;
        self.finish_with_bound(bound)
    }

    pub fn finish_with_bound(mut self, bound: Word) -> Vec<Word> {
        self.words[3] = bound;
        debug_assert!(self.words.len() >= HEADER_WORDS);
        self.words
    }

    /// Little-endian bytes of the finished module.
    pub fn finish_bytes(self) -> Vec<u8> {
        self.finish().iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    // --- debug and mode-setting ---

    pub fn capability(&mut self, capability: spirv::Capability) {
        self.emit(Op::Capability, &[capability as Word]);
    }

    pub fn ext_inst_import(&mut self, name: &str) -> Word {
        let id = self.id();
        let mut operands = vec![id];
        operands.extend(encode_string(name));
        self.emit(Op::ExtInstImport, &operands);
        id
    }

    pub fn memory_model(&mut self) {
        self.emit(
            Op::MemoryModel,
            &[
                spirv::AddressingModel::Logical as Word,
                spirv::MemoryModel::GLSL450 as Word,
            ],
        );
    }

    pub fn entry_point(
        &mut self,
        model: ExecutionModel,
        function: Word,
        name: &str,
        interface: &[Word],
    ) {
        let mut operands = vec![model as Word, function];
        operands.extend(encode_string(name));
        operands.extend_from_slice(interface);
        self.emit(Op::EntryPoint, &operands);
    }

    pub fn name(&mut self, target: Word, name: &str) {
        let mut operands = vec![target];
        operands.extend(encode_string(name));
        self.emit(Op::Name, &operands);
    }

    pub fn member_name(&mut self, target: Word, member: Word, name: &str) {
        let mut operands = vec![target, member];
        operands.extend(encode_string(name));
        self.emit(Op::MemberName, &operands);
    }

    // --- annotations ---

    pub fn decorate(&mut self, target: Word, decoration: Decoration, literals: &[Word]) {
        let mut operands = vec![target, decoration as Word];
        operands.extend_from_slice(literals);
        self.emit(Op::Decorate, &operands);
    }

    pub fn member_decorate(
        &mut self,
        target: Word,
        member: Word,
        decoration: Decoration,
        literals: &[Word],
    ) {
        let mut operands = vec![target, member, decoration as Word];
        operands.extend_from_slice(literals);
        self.emit(Op::MemberDecorate, &operands);
    }

    /// Declares a group; decorate `group` before calling this.
    pub fn decoration_group(&mut self, group: Word) {
        self.emit(Op::DecorationGroup, &[group]);
    }

    pub fn group_decorate(&mut self, group: Word, targets: &[Word]) {
        let mut operands = vec![group];
        operands.extend_from_slice(targets);
        self.emit(Op::GroupDecorate, &operands);
    }

    pub fn group_member_decorate(&mut self, group: Word, targets: &[(Word, Word)]) {
        let mut operands = vec![group];
        for &(target, member) in targets {
            operands.extend([target, member]);
        }
        self.emit(Op::GroupMemberDecorate, &operands);
    }

    // --- types ---

    fn ty(&mut self, op: Op, operands: &[Word]) -> Word {
        let id = self.id();
        let mut all = vec![id];
        all.extend_from_slice(operands);
        self.emit(op, &all);
        id
    }

    pub fn type_void(&mut self) -> Word {
        self.ty(Op::TypeVoid, &[])
    }

    pub fn type_bool(&mut self) -> Word {
        self.ty(Op::TypeBool, &[])
    }

    pub fn type_int(&mut self, width: Word, signed: bool) -> Word {
        self.ty(Op::TypeInt, &[width, Word::from(signed)])
    }

    pub fn type_float(&mut self, width: Word) -> Word {
        self.ty(Op::TypeFloat, &[width])
    }

    pub fn type_vector(&mut self, component: Word, count: Word) -> Word {
        self.ty(Op::TypeVector, &[component, count])
    }

    pub fn type_matrix(&mut self, column: Word, count: Word) -> Word {
        self.ty(Op::TypeMatrix, &[column, count])
    }

    /// `length` is the id of a constant.
    pub fn type_array(&mut self, element: Word, length: Word) -> Word {
        self.ty(Op::TypeArray, &[element, length])
    }

    pub fn type_struct(&mut self, members: &[Word]) -> Word {
        self.ty(Op::TypeStruct, members)
    }

    pub fn type_pointer(&mut self, storage: StorageClass, pointee: Word) -> Word {
        self.ty(Op::TypePointer, &[storage as Word, pointee])
    }

    pub fn type_function(&mut self, result: Word, params: &[Word]) -> Word {
        let mut operands = vec![result];
        operands.extend_from_slice(params);
        self.ty(Op::TypeFunction, &operands)
    }

    pub fn type_image(
        &mut self,
        sampled_type: Word,
        dim: Dim,
        depth: bool,
        arrayed: bool,
        multisampled: bool,
    ) -> Word {
        self.ty(
            Op::TypeImage,
            &[
                sampled_type,
                dim as Word,
                Word::from(depth),
                Word::from(arrayed),
                Word::from(multisampled),
                1,
                spirv::ImageFormat::Unknown as Word,
            ],
        )
    }

    pub fn type_sampled_image(&mut self, image: Word) -> Word {
        self.ty(Op::TypeSampledImage, &[image])
    }

    // --- constants and variables ---

    pub fn constant(&mut self, ty: Word, bits: Word) -> Word {
        self.instr(Op::Constant, ty, &[bits])
    }

    pub fn constant_f32(&mut self, ty: Word, value: f32) -> Word {
        self.constant(ty, value.to_bits())
    }

    pub fn constant_bool(&mut self, ty: Word, value: bool) -> Word {
        let op = if value {
            Op::ConstantTrue
        } else {
            Op::ConstantFalse
        };
        self.instr(op, ty, &[])
    }

    pub fn constant_composite(&mut self, ty: Word, constituents: &[Word]) -> Word {
        self.instr(Op::ConstantComposite, ty, constituents)
    }

    pub fn constant_null(&mut self, ty: Word) -> Word {
        self.instr(Op::ConstantNull, ty, &[])
    }

    /// `pointer_type` must be an `OpTypePointer` of `storage`.
    pub fn variable(&mut self, pointer_type: Word, storage: StorageClass) -> Word {
        self.instr(Op::Variable, pointer_type, &[storage as Word])
    }

    pub fn variable_with_init(
        &mut self,
        pointer_type: Word,
        storage: StorageClass,
        init: Word,
    ) -> Word {
        self.instr(Op::Variable, pointer_type, &[storage as Word, init])
    }

    // --- functions and control flow ---

    pub fn function(&mut self, result: Word, function_type: Word) -> Word {
        self.instr(Op::Function, result, &[0, function_type])
    }

    /// Opens function `id`, usually reserved ahead for an entry point.
    pub fn function_with_id(&mut self, id: Word, result: Word, function_type: Word) {
        self.emit(Op::Function, &[result, id, 0, function_type]);
    }

    pub fn function_end(&mut self) {
        self.emit(Op::FunctionEnd, &[]);
    }

    /// Places the label `id`, usually allocated ahead with [`Self::id`].
    pub fn label(&mut self, id: Word) {
        self.emit(Op::Label, &[id]);
    }

    pub fn branch(&mut self, target: Word) {
        self.emit(Op::Branch, &[target]);
    }

    pub fn branch_conditional(&mut self, condition: Word, then_target: Word, else_target: Word) {
        self.emit(Op::BranchConditional, &[condition, then_target, else_target]);
    }

    pub fn selection_merge(&mut self, merge: Word) {
        self.emit(Op::SelectionMerge, &[merge, 0]);
    }

    pub fn loop_merge(&mut self, merge: Word, continue_target: Word) {
        self.emit(Op::LoopMerge, &[merge, continue_target, 0]);
    }

    pub fn ret(&mut self) {
        self.emit(Op::Return, &[]);
    }

    pub fn kill(&mut self) {
        self.emit(Op::Kill, &[]);
    }

    // --- body instructions ---

    pub fn load(&mut self, ty: Word, pointer: Word) -> Word {
        self.instr(Op::Load, ty, &[pointer])
    }

    pub fn store(&mut self, pointer: Word, value: Word) {
        self.emit(Op::Store, &[pointer, value]);
    }

    pub fn access_chain(&mut self, ty: Word, base: Word, indices: &[Word]) -> Word {
        let mut operands = vec![base];
        operands.extend_from_slice(indices);
        self.instr(Op::AccessChain, ty, &operands)
    }

    pub fn phi(&mut self, ty: Word, id: Word, incoming: &[(Word, Word)]) {
        let mut operands = vec![ty, id];
        for &(value, parent) in incoming {
            operands.extend([value, parent]);
        }
        self.emit(Op::Phi, &operands);
    }

    pub fn ext_inst(&mut self, ty: Word, set: Word, instruction: Word, operands: &[Word]) -> Word {
        let mut all = vec![set, instruction];
        all.extend_from_slice(operands);
        self.instr(Op::ExtInst, ty, &all)
    }
}
