//! Per-block liveness: which values defined elsewhere are still needed when
//! control reaches the start of a given block.
//!
//! This is a coarse, block-granular backward dataflow (not a precise
//! interval-based liveness as a register allocator would want) — exactly
//! enough for the lowering to decide whether a φ's target vreg must stay
//! distinct from its source, per §4.3 of the optimizer's contract.

use kefir_entity::SecondaryMap;
use kefir_ir::function::{Block, Function, Inst};
use std::collections::HashSet;

#[derive(Debug, Default, Clone)]
pub struct Liveness {
    alive_at_entry: SecondaryMap<Block, HashSet<Inst>>,
}

impl Liveness {
    pub fn alive_at_entry(&self, block: Block) -> &HashSet<Inst> {
        self.alive_at_entry.get(block)
    }

    pub fn is_alive_at_entry(&self, block: Block, value: Inst) -> bool {
        self.alive_at_entry(block).contains(&value)
    }
}

/// `alive(pred) = (alive(succ) ∪ used(succ)) \ def(succ)`, iterated to a
/// fixed point over all blocks.
pub fn compute_liveness(function: &Function) -> Liveness {
    let blocks = function.block_order();

    let mut def: SecondaryMap<Block, HashSet<Inst>> = SecondaryMap::new();
    let mut used: SecondaryMap<Block, HashSet<Inst>> = SecondaryMap::new();
    for &block in &blocks {
        let defs = def.get_mut(block);
        for phi in function.block_phis(block) {
            defs.insert(*phi);
        }
        for inst in function.block_insts(block) {
            defs.insert(inst);
        }
    }
    for &block in &blocks {
        let mut u = HashSet::new();
        for inst in function.block_insts(block) {
            if let Ok(data) = function.inst_data(inst) {
                data.for_each_value(|v| {
                    if !def.get(block).contains(&v) {
                        u.insert(v);
                    }
                });
            }
        }
        // A φ-node's incoming links are "used" attributed to the block that
        // owns the φ: that's what keeps the predecessor's defined value
        // alive across the edge.
        for phi in function.block_phis(block) {
            if let Ok(phi_data) = function.phi_data(*phi) {
                for &(_, value) in phi_data.links() {
                    if !def.get(block).contains(&value) {
                        u.insert(value);
                    }
                }
            }
        }
        *used.get_mut(block) = u;
    }

    let mut alive_at_entry: SecondaryMap<Block, HashSet<Inst>> = SecondaryMap::new();
    let mut changed = true;
    let mut guard = 0;
    while changed {
        changed = false;
        guard += 1;
        assert!(guard < 10_000, "liveness dataflow failed to converge");
        for &block in blocks.iter().rev() {
            let mut alive_out = HashSet::new();
            for succ in function.successors(block) {
                alive_out.extend(alive_at_entry.get(succ).iter().copied());
            }
            let mut new_in = used.get(block).clone();
            for v in alive_out {
                if !def.get(block).contains(&v) {
                    new_in.insert(v);
                }
            }
            if new_in != *alive_at_entry.get(block) {
                *alive_at_entry.get_mut(block) = new_in;
                changed = true;
            }
        }
    }

    Liveness { alive_at_entry }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kefir_ir::function::{IntWidth, InstData, Signature};

    #[test]
    fn value_defined_before_loop_is_live_into_header() {
        let mut f = Function::new("f", Signature::default());
        let entry = f.create_block();
        let header = f.create_block();
        let latch = f.create_block();
        let exit = f.create_block();

        let init = f.append_inst(entry, InstData::IntConst { width: IntWidth::W32, value: 0 });
        f.append_inst(entry, InstData::Jump { target: header });

        let phi = f.append_phi(header);
        f.append_inst(header, InstData::Branch { cond: phi, negate: false, then_block: latch, else_block: exit });

        let next = f.append_inst(latch, InstData::Binary {
            op: kefir_ir::function::BinaryOp::Add,
            width: IntWidth::W32,
            signed: true,
            lhs: phi,
            rhs: init,
        });
        f.append_inst(latch, InstData::Jump { target: header });
        f.append_inst(exit, InstData::Return { value: None });

        f.phi_data_mut(phi).unwrap().set_link(entry, init);
        f.phi_data_mut(phi).unwrap().set_link(latch, next);

        let liveness = compute_liveness(&f);
        // `init` is used by the latch's add but defined in `entry`; it must
        // stay alive across the header.
        assert!(liveness.is_alive_at_entry(header, init));
    }
}
