//! Folds a branch whose condition is a known constant into an unconditional
//! jump, then drops whichever successor becomes unreachable as a result.

use super::{Pass, PassConfig};
use kefir_ir::function::{Block, Function, Inst, InstData};
use kefir_ir::module::Module;
use kefir_ir::Result;
use std::collections::HashSet;

pub struct BranchRemoval;

impl Pass for BranchRemoval {
    fn name(&self) -> &'static str {
        "branch-removal"
    }

    fn apply(&self, _module: &mut Module, function: &mut Function, _config: &PassConfig) -> Result<()> {
        let candidates: Vec<Inst> = function.all_insts().collect();
        let mut dropped_targets = Vec::new();
        for inst in candidates {
            if !function.is_inserted(inst) {
                continue;
            }
            let Ok(data) = function.inst_data(inst) else { continue };
            let InstData::Branch { cond, negate, then_block, else_block } = data else { continue };
            let (then_block, else_block) = (*then_block, *else_block);
            let Some(taken) = constant_branch_target(function, *cond, *negate, then_block, else_block) else {
                continue;
            };
            let dropped = if taken == then_block { else_block } else { then_block };
            function.fold_instruction(inst, InstData::Jump { target: taken });
            dropped_targets.push(dropped);
        }
        recompute_reachability(function, dropped_targets);
        Ok(())
    }
}

fn constant_branch_target(
    function: &Function,
    cond: kefir_ir::function::Value,
    negate: bool,
    then_block: Block,
    else_block: Block,
) -> Option<Block> {
    let truth = match function.inst_data(cond).ok()? {
        InstData::IntConst { value, .. } => *value != 0,
        InstData::UintConst { value, .. } => *value != 0,
        _ => return None,
    };
    let truth = truth ^ negate;
    Some(if truth { then_block } else { else_block })
}

/// Blocks left with no predecessor after folding away the only edge into them
/// are unreachable; remove them (and anything that becomes unreachable in
/// turn — dropping a block can orphan its own successors).
fn recompute_reachability(function: &mut Function, seeds: Vec<Block>) {
    let mut worklist: Vec<Block> = seeds;
    let mut removed: HashSet<Block> = HashSet::new();
    while let Some(block) = worklist.pop() {
        if removed.contains(&block) {
            continue;
        }
        if Some(block) == function.entry_block() {
            continue;
        }
        if !function.predecessors(block).is_empty() {
            continue;
        }
        let successors = function.successors(block);
        function.remove_unreachable_block(block);
        removed.insert(block);
        worklist.extend(successors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kefir_ir::function::{IntWidth, Signature};

    #[test]
    fn constant_true_condition_becomes_a_jump() {
        let mut module = Module::new();
        let mut f = Function::new("f", Signature::default());
        let entry = f.create_block();
        let then_b = f.create_block();
        let else_b = f.create_block();
        let cond = f.append_inst(entry, InstData::IntConst { width: IntWidth::W8, value: 1 });
        f.append_inst(entry, InstData::Branch { cond, negate: false, then_block: then_b, else_block: else_b });
        f.append_inst(then_b, InstData::Return { value: None });
        f.append_inst(else_b, InstData::Return { value: None });

        BranchRemoval.apply(&mut module, &mut f, &PassConfig::default()).unwrap();

        let term = f.block_insts(entry).last().copied().unwrap();
        assert_eq!(f.inst_data(term).unwrap(), &InstData::Jump { target: then_b });
        assert!(f.block_insts(else_b).is_empty());
    }

    #[test]
    fn negated_constant_condition_takes_else_branch() {
        let mut module = Module::new();
        let mut f = Function::new("f", Signature::default());
        let entry = f.create_block();
        let then_b = f.create_block();
        let else_b = f.create_block();
        let cond = f.append_inst(entry, InstData::IntConst { width: IntWidth::W8, value: 1 });
        f.append_inst(entry, InstData::Branch { cond, negate: true, then_block: then_b, else_block: else_b });
        f.append_inst(then_b, InstData::Return { value: None });
        f.append_inst(else_b, InstData::Return { value: None });

        BranchRemoval.apply(&mut module, &mut f, &PassConfig::default()).unwrap();

        let term = f.block_insts(entry).last().copied().unwrap();
        assert_eq!(f.inst_data(term).unwrap(), &InstData::Jump { target: else_b });
    }
}
