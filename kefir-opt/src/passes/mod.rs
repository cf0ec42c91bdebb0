//! The five stateless IR-rewrite passes plus the pipeline that strings them
//! together by name.

mod branch_removal;
mod const_fold;
mod mem2reg;
mod op_simplify;
mod phi_pull;

pub use branch_removal::BranchRemoval;
pub use const_fold::ConstantFold;
pub use mem2reg::Mem2Reg;
pub use op_simplify::OpSimplify;
pub use phi_pull::PhiPull;

use kefir_ir::function::Function;
use kefir_ir::module::Module;
use kefir_ir::Result;

/// Configuration threaded through every pass invocation. `max_inline_depth`
/// and `max_inlines_per_function` bound IR growth from inlining (performed
/// upstream of this pipeline, out of scope, but the limits are carried here
/// so a future inliner and this pipeline share one `PassConfig`).
#[derive(Debug, Clone)]
pub struct PassConfig {
    pub max_inline_depth: u32,
    pub max_inlines_per_function: u32,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self { max_inline_depth: 4, max_inlines_per_function: 64 }
    }
}

/// A stateless IR-to-IR rewrite. Every pass must be idempotent: running it
/// twice with no intervening structural change must leave the IR unchanged
/// (callers rely on this to run the pipeline to a fixed point cheaply).
pub trait Pass {
    /// The name this pass is selected by in a pipeline spec string, e.g.
    /// `"constant-fold"`.
    fn name(&self) -> &'static str;

    fn apply(&self, module: &mut Module, function: &mut Function, config: &PassConfig) -> Result<()>;
}

/// Construct the pass named `name`, or `None` if the pipeline spec string
/// names something unknown (propagated by the caller as an invalid parameter).
pub fn lookup(name: &str) -> Option<Box<dyn Pass>> {
    match name {
        "constant-fold" => Some(Box::new(ConstantFold)),
        "op-simplify" => Some(Box::new(OpSimplify)),
        "mem2reg" => Some(Box::new(Mem2Reg)),
        "phi-pull" => Some(Box::new(PhiPull)),
        "branch-removal" => Some(Box::new(BranchRemoval)),
        _ => None,
    }
}

/// Run the named passes in order. The default optimizer pipeline spec is
/// `"phi-pull,mem2reg,phi-pull,constant-fold,op-simplify,branch-removal"`.
pub fn run_pipeline(spec: &str, module: &mut Module, function: &mut Function, config: &PassConfig) -> Result<()> {
    for name in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let pass = lookup(name)
            .ok_or_else(|| kefir_ir::Error::invalid_parameter(format!("unknown optimizer pass '{name}'")))?;
        log::debug!("running pass {}", pass.name());
        pass.apply(module, function, config)?;
    }
    Ok(())
}

pub const DEFAULT_OPTIMIZER_PIPELINE: &str = "phi-pull,mem2reg,phi-pull,constant-fold,op-simplify,branch-removal";
