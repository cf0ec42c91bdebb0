//! Linearizes a function's blocks into the order the backend emits them in,
//! so that lowering can tell whether a branch's target is the physical
//! fall-through and elide the jump.

use kefir_ir::function::{Block, Function};
use kefir_entity::SecondaryMap;
use std::collections::HashSet;

/// Maps every block to its position in the final linear emission order.
#[derive(Debug, Default)]
pub struct Schedule {
    order: Vec<Block>,
    linear_index: SecondaryMap<Block, u32>,
}

impl Schedule {
    pub fn linear_index(&self, block: Block) -> u32 {
        self.linear_index[block]
    }

    pub fn order(&self) -> &[Block] {
        &self.order
    }

    /// Whether `target` is the block physically emitted right after `source`
    /// — the condition under which a `jmp target` can be elided.
    pub fn is_fall_through(&self, source: Block, target: Block) -> bool {
        self.linear_index(target) == self.linear_index(source) + 1
    }
}

/// Order blocks by reverse postorder, with a profile-free tie-break:
/// at a conditional, prefer as fall-through whichever successor's block was
/// declared earlier in the function (the one that "lexically follows" the
/// branch in the absence of any other information).
pub fn compute_schedule(function: &Function) -> Schedule {
    let Some(entry) = function.entry_block() else {
        return Schedule::default();
    };
    let mut visited = HashSet::new();
    let mut postorder = Vec::new();
    visit(function, entry, &mut visited, &mut postorder);

    // Any block unreachable from the entry (shouldn't happen after
    // branch-removal recomputes reachability, but defensive) is appended at
    // the end in declaration order so every block still gets a linear index.
    for block in function.block_order() {
        if !visited.contains(&block) {
            visit(function, block, &mut visited, &mut postorder);
        }
    }

    postorder.reverse();
    let mut linear_index = SecondaryMap::new();
    for (i, &block) in postorder.iter().enumerate() {
        *linear_index.get_mut(block) = i as u32;
    }
    Schedule { order: postorder, linear_index }
}

fn visit(function: &Function, block: Block, visited: &mut HashSet<Block>, postorder: &mut Vec<Block>) {
    if !visited.insert(block) {
        return;
    }
    let successors = function.successors(block);
    // Prefer the successor that was declared earlier (smaller block id) as
    // the one to visit *last*, so it ends up earliest in the final
    // (reversed) order and is likelier to land immediately after this block.
    let mut ordered_successors = successors;
    ordered_successors.sort_by_key(|b| std::cmp::Reverse(block_decl_order(function, *b)));
    for succ in ordered_successors {
        visit(function, succ, visited, postorder);
    }
    postorder.push(block);
}

fn block_decl_order(function: &Function, block: Block) -> usize {
    function.block_order().iter().position(|&b| b == block).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kefir_ir::function::{InstData, Signature};

    #[test]
    fn linear_fall_through_detection() {
        let mut f = Function::new("f", Signature::default());
        let entry = f.create_block();
        let then_b = f.create_block();
        let else_b = f.create_block();
        let c = f.append_inst(entry, InstData::IntConst { width: kefir_ir::function::IntWidth::W8, value: 1 });
        f.append_inst(entry, InstData::Branch { cond: c, negate: false, then_block: then_b, else_block: else_b });
        f.append_inst(then_b, InstData::Return { value: None });
        f.append_inst(else_b, InstData::Return { value: None });

        let schedule = compute_schedule(&f);
        assert_eq!(schedule.linear_index(entry), 0);
        // then_b was declared before else_b, so it schedules as the
        // fall-through immediately after entry.
        assert!(schedule.is_fall_through(entry, then_b));
    }
}
