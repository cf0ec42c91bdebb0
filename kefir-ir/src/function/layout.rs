//! The ordering of blocks and control-flow instructions within a function.
//!
//! Blocks form a doubly linked list in program order; within a block, the
//! *control-flow thread* — the side-effecting instructions a `Cursor` walks —
//! is itself a doubly linked list. Non-side-effecting instructions (pure
//! arithmetic, loads of immutable values, etc.) are not part of this thread at
//! all: the scheduler is free to place them wherever is convenient during
//! lowering. Everything is expressed as arena ids, never as a Rust reference,
//! so the layout can be queried and mutated while other borrows of the
//! function are alive elsewhere.

use super::entities::{Block, Inst};
use kefir_entity::SecondaryMap;

#[derive(Clone, Copy, Default)]
struct BlockNode {
    prev: Option<Block>,
    next: Option<Block>,
    first_inst: Option<Inst>,
    last_inst: Option<Inst>,
}

#[derive(Clone, Copy, Default)]
struct InstNode {
    prev: Option<Inst>,
    next: Option<Inst>,
    block: Option<Block>,
}

/// The doubly linked layout of a function's blocks and control-flow thread.
#[derive(Default)]
pub struct Layout {
    blocks: SecondaryMap<Block, BlockNode>,
    insts: SecondaryMap<Inst, InstNode>,
    first_block: Option<Block>,
    last_block: Option<Block>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a newly created block to the end of the function.
    pub fn append_block(&mut self, block: Block) {
        let node = BlockNode { prev: self.last_block, next: None, first_inst: None, last_inst: None };
        *self.blocks.get_mut(block) = node;
        if let Some(last) = self.last_block {
            self.blocks.get_mut(last).next = Some(block);
        } else {
            self.first_block = Some(block);
        }
        self.last_block = Some(block);
    }

    /// Blocks in program order.
    pub fn block_order(&self) -> Vec<Block> {
        let mut out = Vec::new();
        let mut cur = self.first_block;
        while let Some(b) = cur {
            out.push(b);
            cur = self.blocks.get(b).next;
        }
        out
    }

    pub fn next_block(&self, block: Block) -> Option<Block> {
        self.blocks.get(block).next
    }

    /// Append `inst` to the control-flow thread of `block`.
    pub fn append_inst(&mut self, block: Block, inst: Inst) {
        let prev = self.blocks.get(block).last_inst;
        *self.insts.get_mut(inst) = InstNode { prev, next: None, block: Some(block) };
        if let Some(prev) = prev {
            self.insts.get_mut(prev).next = Some(inst);
        } else {
            self.blocks.get_mut(block).first_inst = Some(inst);
        }
        self.blocks.get_mut(block).last_inst = Some(inst);
    }

    /// Insert `inst` immediately before `before`, in the same block.
    pub fn insert_before(&mut self, before: Inst, inst: Inst) {
        let block = self.insts.get(before).block.expect("instruction not in layout");
        let prev = self.insts.get(before).prev;
        *self.insts.get_mut(inst) = InstNode { prev, next: Some(before), block: Some(block) };
        self.insts.get_mut(before).prev = Some(inst);
        match prev {
            Some(p) => self.insts.get_mut(p).next = Some(inst),
            None => self.blocks.get_mut(block).first_inst = Some(inst),
        }
    }

    /// Remove `inst` from the control-flow thread. Its slot (the gap between
    /// its former neighbors) is what a folded instruction's replacement can be
    /// spliced into, via `insert_before`/`append_inst` on the freed neighbor.
    pub fn remove_inst(&mut self, inst: Inst) {
        let node = *self.insts.get(inst);
        let Some(block) = node.block else { return };
        match node.prev {
            Some(p) => self.insts.get_mut(p).next = node.next,
            None => self.blocks.get_mut(block).first_inst = node.next,
        }
        match node.next {
            Some(n) => self.insts.get_mut(n).prev = node.prev,
            None => self.blocks.get_mut(block).last_inst = node.prev,
        }
        *self.insts.get_mut(inst) = InstNode::default();
    }

    pub fn is_inserted(&self, inst: Inst) -> bool {
        self.insts.get(inst).block.is_some()
    }

    pub fn inst_block(&self, inst: Inst) -> Option<Block> {
        self.insts.get(inst).block
    }

    /// Instructions of `block`'s control-flow thread, in order.
    pub fn block_insts(&self, block: Block) -> Vec<Inst> {
        let mut out = Vec::new();
        let mut cur = self.blocks.get(block).first_inst;
        while let Some(i) = cur {
            out.push(i);
            cur = self.insts.get(i).next;
        }
        out
    }

    pub fn last_inst(&self, block: Block) -> Option<Inst> {
        self.blocks.get(block).last_inst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kefir_entity::EntityRef;

    #[test]
    fn append_and_iterate_preserves_order() {
        let mut layout = Layout::new();
        let b0 = Block::new(0);
        layout.append_block(b0);
        let (i0, i1, i2) = (Inst::new(0), Inst::new(1), Inst::new(2));
        layout.append_inst(b0, i0);
        layout.append_inst(b0, i1);
        layout.append_inst(b0, i2);
        assert_eq!(layout.block_insts(b0), vec![i0, i1, i2]);
    }

    #[test]
    fn remove_then_insert_before_splices_cleanly() {
        let mut layout = Layout::new();
        let b0 = Block::new(0);
        layout.append_block(b0);
        let (i0, i1, i2) = (Inst::new(0), Inst::new(1), Inst::new(2));
        layout.append_inst(b0, i0);
        layout.append_inst(b0, i1);
        layout.append_inst(b0, i2);
        layout.remove_inst(i1);
        assert_eq!(layout.block_insts(b0), vec![i0, i2]);
        assert!(!layout.is_inserted(i1));
        let i3 = Inst::new(3);
        layout.insert_before(i2, i3);
        assert_eq!(layout.block_insts(b0), vec![i0, i3, i2]);
    }
}
