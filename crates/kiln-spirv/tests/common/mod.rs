use kiln_ir::eval::Evaluator;
use kiln_ir::{AluOp, CfNode, Function, Handle, Instruction, Module, Variable, VariableMode};
use kiln_spirv::assembler::Assembler;
use kiln_spirv::{Options, parse_with_options};
use spirv::{Capability, ExecutionModel, StorageClass};

/// A module under construction with the usual scalar and vector types
/// declared and an entry point `main` reserved.
#[allow(dead_code)]
pub struct Shader {
    pub asm: Assembler,
    pub main: u32,
    pub void: u32,
    pub boolean: u32,
    pub uint: u32,
    pub int: u32,
    pub float: u32,
    pub vec2: u32,
    pub vec4: u32,
}

#[allow(dead_code)]
impl Shader {
    pub fn new(model: ExecutionModel) -> Self {
        let mut asm = Assembler::new();
        asm.capability(Capability::Shader);
        asm.memory_model();
        let main = asm.id();
        asm.entry_point(model, main, "main", &[]);
        let void = asm.type_void();
        let boolean = asm.type_bool();
        let uint = asm.type_int(32, false);
        let int = asm.type_int(32, true);
        let float = asm.type_float(32);
        let vec2 = asm.type_vector(float, 2);
        let vec4 = asm.type_vector(float, 4);
        Self {
            asm,
            main,
            void,
            boolean,
            uint,
            int,
            float,
            vec2,
            vec4,
        }
    }

    pub fn fragment() -> Self {
        Self::new(ExecutionModel::Fragment)
    }

    /// Declares a variable of `ty` in `storage`, returning the variable id.
    pub fn var(&mut self, storage: StorageClass, ty: u32) -> u32 {
        let ptr = self.asm.type_pointer(storage, ty);
        self.asm.variable(ptr, storage)
    }

    /// Opens `main` and its entry block, returning the entry label.
    pub fn begin(&mut self) -> u32 {
        let fn_ty = self.asm.type_function(self.void, &[]);
        self.asm.function_with_id(self.main, self.void, fn_ty);
        let entry = self.asm.id();
        self.asm.label(entry);
        entry
    }

    /// Returns from the current block and closes `main`.
    pub fn end(mut self) -> Vec<u32> {
        self.asm.ret();
        self.asm.function_end();
        self.asm.finish()
    }
}

/// Translate with default options, panicking on failure.
#[allow(dead_code)]
pub fn translate(words: &[u32]) -> Module {
    translate_with(words, &Options::default())
}

#[allow(dead_code)]
pub fn translate_with(words: &[u32], options: &Options) -> Module {
    let module = parse_with_options(words, options).expect("SPIR-V translation failed");
    kiln_ir::validate(&module).expect("translated module should validate");
    module
}

/// The IR function of entry point `main`.
#[allow(dead_code)]
pub fn main_function(module: &Module) -> Handle<Function> {
    module
        .entry_points
        .iter()
        .find(|ep| ep.name == "main")
        .expect("module has no main entry point")
        .function
}

/// Number of ALU instructions with `op` in `function`.
#[allow(dead_code)]
pub fn count_alu(module: &Module, function: Handle<Function>, op: AluOp) -> usize {
    module.functions[function]
        .instructions
        .iter()
        .filter(|(_, instr)| matches!(instr, Instruction::Alu { op: o, .. } if *o == op))
        .count()
}

/// Number of instructions matching `pred` in `function`.
#[allow(dead_code)]
pub fn count(
    module: &Module,
    function: Handle<Function>,
    pred: impl Fn(&Instruction) -> bool,
) -> usize {
    module.functions[function]
        .instructions
        .iter()
        .filter(|(_, instr)| pred(instr))
        .count()
}

/// The single variable of `mode`.
#[allow(dead_code)]
pub fn only_var(module: &Module, mode: VariableMode) -> Handle<Variable> {
    let vars = module.variables_with_mode(mode);
    assert_eq!(vars.len(), 1, "expected one {mode:?} variable");
    vars[0]
}

/// Runs `main` to completion.
#[allow(dead_code)]
pub fn run(module: &Module, setup: impl FnOnce(&mut Evaluator<'_>)) -> Evaluator<'_> {
    let mut eval = Evaluator::new(module);
    setup(&mut eval);
    eval.run(main_function(module)).expect("evaluation failed");
    eval
}

/// Top-level control-flow node kinds of `function`, in order.
#[allow(dead_code)]
pub fn shape(module: &Module, function: Handle<Function>) -> Vec<&'static str> {
    module.functions[function]
        .body
        .iter()
        .map(|node| match node {
            CfNode::Block(_) => "block",
            CfNode::If(_) => "if",
            CfNode::Loop(_) => "loop",
        })
        .collect()
}
