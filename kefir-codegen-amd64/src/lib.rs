//! AMD64 code generation: lowering from the optimizer IR to the asmcmp
//! instruction stream, register allocation and stack frame layout,
//! post-allocation peephole cleanup, and the xasmgen assembly printer.

pub mod frame;
pub mod lower;
pub mod post;
pub mod regalloc;
pub mod xasmgen;

pub use post::DEFAULT_CODEGEN_PIPELINE;

use frame::StackFrame;
use kefir_ir::function::Function;
use kefir_ir::module::Module;
use xasmgen::Syntax;

/// Run the whole backend pipeline over one function: lower, allocate frame
/// and registers, peephole, print. The optimizer pipeline (`kefir-opt`) is
/// expected to have already run over `function` by the time this is called.
pub fn compile_function(
    module: &Module,
    function: &Function,
    codegen_pipeline: &str,
    syntax: Syntax,
) -> kefir_ir::Result<String> {
    let mut ctx = lower::lower_function(function)?;
    let mut frame = StackFrame::new();
    frame.layout_locals(function, &module.types);
    let allocation = regalloc::allocate(&ctx.stream, &ctx.vregs, &mut frame, &ctx.pins);
    regalloc::rewrite_operands(&mut ctx.stream, &ctx.vregs, &allocation, &frame);
    regalloc::protect_stashes(&mut ctx.stream, &allocation, &ctx.stashes);
    post::run_pipeline(codegen_pipeline, &mut ctx.stream)?;
    Ok(xasmgen::emit(&ctx.stream, &frame, &function.name, syntax))
}
