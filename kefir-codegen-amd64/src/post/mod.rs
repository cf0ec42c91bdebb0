//! Post-allocation peephole passes: cleanup that only makes sense once every
//! vreg has become a physical register or a frame-relative memory operand.
//! Run in this fixed order; `peephole` runs last and to a fixed point since
//! it can expose new opportunities for the earlier passes (a `propagate_jump`
//! rewrite can leave a label with nothing pointing at it).

mod drop_virtual;
mod eliminate_label;
mod peephole;
mod propagate_jump;

use kefir_asmcmp::Stream;
use kefir_ir::Result;

pub const DEFAULT_CODEGEN_PIPELINE: &str = "amd64-drop-virtual,amd64-propagate-jump,amd64-eliminate-label,amd64-peephole";

/// Run the named post-allocation passes in order, mirroring
/// `kefir_opt::passes::run_pipeline`'s name-driven dispatch.
pub fn run_pipeline(spec: &str, stream: &mut Stream) -> Result<()> {
    for name in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        log::debug!("running post-allocation pass {name}");
        match name {
            "amd64-drop-virtual" => drop_virtual::run(stream),
            "amd64-propagate-jump" => propagate_jump::run(stream),
            "amd64-eliminate-label" => eliminate_label::run(stream),
            "amd64-peephole" => {
                loop {
                    if !peephole::run(stream) {
                        break;
                    }
                }
            }
            other => {
                return Err(kefir_ir::Error::invalid_parameter(format!("unknown codegen pass '{other}'")));
            }
        }
    }
    Ok(())
}
