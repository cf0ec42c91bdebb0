//! Collapses φ-nodes that don't actually need to be φs: every incoming link
//! carrying the same value (including a φ with a single remaining
//! predecessor, which is that case with one link), or a φ whose only links
//! point back at itself once the trivial value is substituted in.
//!
//! Runs both before and after `mem2reg` in the default pipeline:
//! `mem2reg` deliberately leaves trivial φs for this pass to clean up rather
//! than performing the rewrite-in-place substitution mem2reg would need to
//! detect them itself mid-construction.

use super::{Pass, PassConfig};
use kefir_ir::function::{Function, Inst};
use kefir_ir::module::Module;
use kefir_ir::Result;

pub struct PhiPull;

impl Pass for PhiPull {
    fn name(&self) -> &'static str {
        "phi-pull"
    }

    fn apply(&self, _module: &mut Module, function: &mut Function, _config: &PassConfig) -> Result<()> {
        // Iterate to a fixed point: collapsing one φ can make another φ that
        // referenced it trivial in turn (a chain of φs around a loop that all
        // carry the same value).
        loop {
            let mut changed = false;
            let phis: Vec<Inst> = collect_phis(function);
            for phi in phis {
                if !function.is_phi(phi) {
                    continue;
                }
                let Ok(data) = function.phi_data(phi) else { continue };
                if let Some(value) = trivial_value(phi, data) {
                    function.replace_references(phi, value);
                    function.remove_phi(phi);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        Ok(())
    }
}

fn collect_phis(function: &Function) -> Vec<Inst> {
    function
        .block_order()
        .into_iter()
        .flat_map(|b| function.block_phis(b).to_vec())
        .collect()
}

/// The single value every link agrees on, if any — ignoring self-references
/// (a link back to the φ's own id contributes no information and shouldn't
/// block collapsing, since once resolved to the shared value that link would
/// agree too).
fn trivial_value(phi: Inst, data: &kefir_ir::function::PhiNode) -> Option<Inst> {
    let mut candidate = None;
    for &(_, value) in data.links() {
        if value == phi {
            continue;
        }
        match candidate {
            None => candidate = Some(value),
            Some(v) if v == value => {}
            Some(_) => return None,
        }
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use kefir_ir::function::{InstData, IntWidth, Signature};

    #[test]
    fn phi_with_uniform_links_collapses() {
        let mut module = Module::new();
        let mut f = Function::new("f", Signature::default());
        let entry = f.create_block();
        let a = f.create_block();
        let b = f.create_block();
        let join = f.create_block();

        let c = f.append_inst(entry, InstData::IntConst { width: IntWidth::W32, value: 9 });
        let cond = f.append_inst(entry, InstData::IntConst { width: IntWidth::W8, value: 1 });
        f.append_inst(entry, InstData::Branch { cond, negate: false, then_block: a, else_block: b });
        f.append_inst(a, InstData::Jump { target: join });
        f.append_inst(b, InstData::Jump { target: join });

        let phi = f.append_phi(join);
        f.phi_data_mut(phi).unwrap().set_link(a, c);
        f.phi_data_mut(phi).unwrap().set_link(b, c);
        let ret = f.append_inst(join, InstData::Return { value: Some(phi) });

        PhiPull.apply(&mut module, &mut f, &PassConfig::default()).unwrap();

        assert!(!f.is_phi(phi));
        let InstData::Return { value: Some(v) } = f.inst_data(ret).unwrap() else { panic!() };
        assert_eq!(*v, c);
    }

    #[test]
    fn phi_with_divergent_links_is_kept() {
        let mut module = Module::new();
        let mut f = Function::new("f", Signature::default());
        let entry = f.create_block();
        let a = f.create_block();
        let b = f.create_block();
        let join = f.create_block();

        let one = f.append_inst(entry, InstData::IntConst { width: IntWidth::W32, value: 1 });
        let two = f.append_inst(entry, InstData::IntConst { width: IntWidth::W32, value: 2 });
        let cond = f.append_inst(entry, InstData::IntConst { width: IntWidth::W8, value: 1 });
        f.append_inst(entry, InstData::Branch { cond, negate: false, then_block: a, else_block: b });
        f.append_inst(a, InstData::Jump { target: join });
        f.append_inst(b, InstData::Jump { target: join });

        let phi = f.append_phi(join);
        f.phi_data_mut(phi).unwrap().set_link(a, one);
        f.phi_data_mut(phi).unwrap().set_link(b, two);
        f.append_inst(join, InstData::Return { value: Some(phi) });

        PhiPull.apply(&mut module, &mut f, &PassConfig::default()).unwrap();

        assert!(f.is_phi(phi));
    }
}
