//! Orchestrates the full compiler module input → assembly text output path:
//! run the optimizer pipeline over every defined function, then the AMD64
//! backend, per `Config`.

use crate::config::Config;
use kefir_ir::module::Module;
use kefir_ir::Result;
use kefir_opt::passes::PassConfig;

/// Compile every defined function in `module`, returning one assembly text
/// blob concatenating all of them in declaration order.
pub fn compile_module(module: &mut Module, config: &Config) -> Result<String> {
    let pass_config = PassConfig::default();
    for id in module.function_ids().collect::<Vec<_>>() {
        // Taken out of the module rather than borrowed from it: constant
        // folding needs `&mut Module` to intern a freshly-computed bigint,
        // which would alias a `&mut Function` borrowed from the same module.
        if let Some(mut function) = module.take_function_body(id) {
            kefir_opt::passes::run_pipeline(&config.optimizer_pipeline, module, &mut function, &pass_config)?;
            module.define_function(id, function);
        }
    }

    let mut output = String::new();
    for id in module.function_ids().collect::<Vec<_>>() {
        if let Some(function) = module.function_body(id) {
            let text = kefir_codegen_amd64::compile_function(module, function, &config.codegen_pipeline, config.syntax)?;
            output.push_str(&text);
        }
    }
    Ok(output)
}
