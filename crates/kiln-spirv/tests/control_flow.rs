//! Structured control flow and phi resolution.

mod common;

use common::{Shader, count, main_function, only_var, run, shape, translate};
use kiln_ir::{CfNode, Function, Handle, Instruction, Jump, Module, VariableMode};
use kiln_spirv::{ParseError, parse};
use spirv::{Op, StorageClass};

fn loops(func: &Function) -> Vec<&[CfNode]> {
    func.body
        .iter()
        .filter_map(|node| match *node {
            CfNode::Loop(h) => Some(&func.loops[h].body[..]),
            _ => None,
        })
        .collect()
}

fn last_jump(func: &Function, list: &[CfNode]) -> Option<Jump> {
    match list.last()? {
        CfNode::Block(block) => func.block_jump(*block),
        _ => None,
    }
}

fn phis(module: &Module, f: Handle<Function>) -> Vec<usize> {
    module.functions[f]
        .instructions
        .iter()
        .filter_map(|(_, instr)| match instr {
            Instruction::Phi { srcs, .. } => Some(srcs.len()),
            _ => None,
        })
        .collect()
}

/// `for (i = 0; i < 4; i++) out = i + 1;` with the exit test at the top.
fn counting_loop() -> Vec<u32> {
    let mut shader = Shader::fragment();
    let uint = shader.uint;
    let boolean = shader.boolean;
    let zero = shader.asm.constant(uint, 0);
    let one = shader.asm.constant(uint, 1);
    let four = shader.asm.constant(uint, 4);
    let out = shader.var(StorageClass::Output, uint);
    let entry = shader.begin();
    let (header, body, merge) = (shader.asm.id(), shader.asm.id(), shader.asm.id());
    let (i, next) = (shader.asm.id(), shader.asm.id());
    shader.asm.branch(header);

    shader.asm.label(header);
    shader.asm.phi(uint, i, &[(zero, entry), (next, body)]);
    let done = shader.asm.instr(Op::UGreaterThanEqual, boolean, &[i, four]);
    shader.asm.loop_merge(merge, body);
    shader.asm.branch_conditional(done, merge, body);

    shader.asm.label(body);
    shader.asm.emit(Op::IAdd, &[uint, next, i, one]);
    shader.asm.store(out, next);
    shader.asm.branch(header);

    shader.asm.label(merge);
    shader.end()
}

#[test]
fn conditional_break_is_a_single_if() {
    let module = translate(&counting_loop());
    let f = main_function(&module);
    let func = &module.functions[f];
    assert_eq!(shape(&module, f), ["block", "loop", "block"]);

    let body = loops(func)[0];
    let ifs: Vec<_> = body
        .iter()
        .filter_map(|node| match *node {
            CfNode::If(h) => Some(&func.ifs[h]),
            _ => None,
        })
        .collect();
    assert_eq!(ifs.len(), 1, "break arm must not nest another if");
    assert_eq!(last_jump(func, &ifs[0].then_body), Some(Jump::Break));
    assert_eq!(last_jump(func, &ifs[0].else_body), None);
    // the continued path follows the if and loops back
    assert_eq!(last_jump(func, body), Some(Jump::Continue));
    let stores = count(&module, f, |i| matches!(i, Instruction::StoreVar { .. }));
    assert_eq!(stores, 1);
}

#[test]
fn loop_header_phi_has_preheader_and_latch_sources() {
    let module = translate(&counting_loop());
    let f = main_function(&module);
    assert_eq!(phis(&module, f), [2]);

    let out = only_var(&module, VariableMode::ShaderOut);
    let eval = run(&module, |_| {});
    assert_eq!(eval.read(out, &[])[0], 4);
}

/// `out = in < 0.5 ? 1.0 : 2.0` through a two-sided branch and a merge phi.
fn diamond() -> Vec<u32> {
    let mut shader = Shader::fragment();
    let (float, boolean) = (shader.float, shader.boolean);
    let half = shader.asm.constant_f32(float, 0.5);
    let one = shader.asm.constant_f32(float, 1.0);
    let two = shader.asm.constant_f32(float, 2.0);
    let input = shader.var(StorageClass::Input, float);
    let out = shader.var(StorageClass::Output, float);
    shader.begin();
    let (then_label, else_label, merge) = (shader.asm.id(), shader.asm.id(), shader.asm.id());
    let x = shader.asm.load(float, input);
    let below = shader.asm.instr(Op::FOrdLessThan, boolean, &[x, half]);
    shader.asm.selection_merge(merge);
    shader.asm.branch_conditional(below, then_label, else_label);

    shader.asm.label(then_label);
    shader.asm.branch(merge);
    shader.asm.label(else_label);
    shader.asm.branch(merge);

    shader.asm.label(merge);
    let picked = shader.asm.id();
    shader
        .asm
        .phi(float, picked, &[(one, then_label), (two, else_label)]);
    shader.asm.store(out, picked);
    shader.end()
}

#[test]
fn two_sided_branch_becomes_one_if() {
    let module = translate(&diamond());
    let f = main_function(&module);
    assert_eq!(shape(&module, f), ["block", "if", "block"]);
    assert_eq!(phis(&module, f), [2]);

    let input = only_var(&module, VariableMode::ShaderIn);
    let out = only_var(&module, VariableMode::ShaderOut);
    let below = run(&module, |eval| eval.write_f32(input, &[], &[0.25]));
    assert_eq!(below.read_f32(out, &[])[0], 1.0);
    let above = run(&module, |eval| eval.write_f32(input, &[], &[0.75]));
    assert_eq!(above.read_f32(out, &[])[0], 2.0);
}

#[test]
fn straight_line_blocks_share_an_ir_block() {
    let mut shader = Shader::fragment();
    let float = shader.float;
    let one = shader.asm.constant_f32(float, 1.0);
    let out = shader.var(StorageClass::Output, float);
    let entry = shader.begin();
    let next = shader.asm.id();
    shader.asm.branch(next);
    shader.asm.label(next);
    let value = shader.asm.id();
    shader.asm.phi(float, value, &[(one, entry)]);
    shader.asm.store(out, value);
    let words = shader.end();

    let module = translate(&words);
    let f = main_function(&module);
    assert_eq!(shape(&module, f), ["block"]);
    assert!(phis(&module, f).is_empty());
    let out = only_var(&module, VariableMode::ShaderOut);
    assert_eq!(run(&module, |_| {}).read_f32(out, &[])[0], 1.0);
}

#[test]
fn kill_discards() {
    let mut shader = Shader::fragment();
    shader.begin();
    shader.asm.kill();
    shader.asm.function_end();
    let words = shader.asm.finish();

    let module = translate(&words);
    let eval = run(&module, |_| {});
    assert!(eval.discarded());
}

#[test]
fn branch_without_merge_is_rejected() {
    let mut shader = Shader::fragment();
    let boolean = shader.boolean;
    let truth = shader.asm.instr(Op::ConstantTrue, boolean, &[]);
    shader.begin();
    let (a, b) = (shader.asm.id(), shader.asm.id());
    shader.asm.branch_conditional(truth, a, b);
    shader.asm.label(a);
    shader.asm.ret();
    shader.asm.label(b);
    let words = shader.end();
    assert!(matches!(
        parse(&words),
        Err(ParseError::MissingSelectionMerge(_))
    ));
}
