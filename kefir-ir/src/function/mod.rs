//! The optimizer IR container (`opt_code` in the spec): one function's blocks,
//! instructions, and φ-nodes.

mod entities;
mod layout;
mod opcode;
mod phi;

pub use entities::{Block, Inst, LocalVar, Value};
pub use layout::Layout;
pub use opcode::*;
pub use phi::PhiNode;

use crate::debug::{DebugCursor, SourceLocation};
use crate::error::{Error, Result};
use crate::types::TypeId;
use kefir_entity::{PrimaryMap, SecondaryMap};

/// A function's parameter/return types. Variadic functions still have a fixed
/// `params` prefix; the varargs tail is a front-end concern (ABI classifies
/// only the fixed prefix, callers materialize the rest via `va_list`).
#[derive(Clone, Debug, Default)]
pub struct Signature {
    pub params: Vec<TypeId>,
    pub return_type: Option<TypeId>,
    pub variadic: bool,
}

#[derive(Clone, Debug)]
struct LocalVarData {
    ty: TypeId,
    /// Cleared by `mem2reg` once every use of the slot has been rewritten to
    /// reference SSA values directly; a frame still sized for it after that
    /// point would be dead space.
    promoted: bool,
}

enum Def {
    Inst(InstData),
    Phi(PhiNode),
}

/// One function's optimizer IR: the container every pass mutates in place.
pub struct Function {
    pub name: String,
    pub signature: Signature,
    blocks: PrimaryMap<Block, ()>,
    block_phis: SecondaryMap<Block, Vec<Inst>>,
    defs: PrimaryMap<Inst, Def>,
    locations: SecondaryMap<Inst, Option<SourceLocation>>,
    locals: PrimaryMap<LocalVar, LocalVarData>,
    layout: Layout,
    cursor: DebugCursor,
    entry: Option<Block>,
}

impl Function {
    pub fn new(name: impl Into<String>, signature: Signature) -> Self {
        Self {
            name: name.into(),
            signature,
            blocks: PrimaryMap::new(),
            block_phis: SecondaryMap::new(),
            defs: PrimaryMap::new(),
            locations: SecondaryMap::new(),
            locals: PrimaryMap::new(),
            layout: Layout::new(),
            cursor: DebugCursor::new(),
            entry: None,
        }
    }

    pub fn debug_cursor(&mut self) -> &mut DebugCursor {
        &mut self.cursor
    }

    // -- blocks --------------------------------------------------------

    pub fn create_block(&mut self) -> Block {
        let block = self.blocks.push(());
        self.layout.append_block(block);
        if self.entry.is_none() {
            self.entry = Some(block);
        }
        block
    }

    pub fn entry_block(&self) -> Option<Block> {
        self.entry
    }

    pub fn block_order(&self) -> Vec<Block> {
        self.layout.block_order()
    }

    pub fn block_insts(&self, block: Block) -> Vec<Inst> {
        self.layout.block_insts(block)
    }

    pub fn block_phis(&self, block: Block) -> &[Inst] {
        self.block_phis.get(block)
    }

    /// Every predecessor of `block`, derived from scanning terminators (the
    /// IR does not maintain an explicit CFG edge list; the scheduler and
    /// liveness pass build one on demand from this).
    pub fn predecessors(&self, block: Block) -> Vec<Block> {
        self.block_order()
            .into_iter()
            .filter(|&b| self.successors(b).contains(&block))
            .collect()
    }

    pub fn successors(&self, block: Block) -> Vec<Block> {
        match self.layout.last_inst(block) {
            Some(term) => self.inst_data(term).map(|d| d.branch_targets()).unwrap_or_default(),
            None => vec![],
        }
    }

    /// Drop a block that has no remaining predecessors and is not the entry
    /// block. Used by `branch-removal` after folding a conditional jump frees
    /// its untaken successor.
    pub fn remove_unreachable_block(&mut self, block: Block) {
        if Some(block) == self.entry {
            return;
        }
        for inst in self.layout.block_insts(block) {
            self.layout.remove_inst(inst);
        }
        self.block_phis.get_mut(block).clear();
    }

    // -- locals ----------------------------------------------------------

    pub fn declare_local(&mut self, ty: TypeId) -> LocalVar {
        self.locals.push(LocalVarData { ty, promoted: false })
    }

    pub fn local_type(&self, slot: LocalVar) -> TypeId {
        self.locals.get(slot).expect("dangling LocalVar").ty
    }

    pub fn mark_local_promoted(&mut self, slot: LocalVar) {
        self.locals.get_mut(slot).expect("dangling LocalVar").promoted = true;
    }

    pub fn is_local_promoted(&self, slot: LocalVar) -> bool {
        self.locals.get(slot).map(|l| l.promoted).unwrap_or(false)
    }

    pub fn locals(&self) -> impl Iterator<Item = LocalVar> + '_ {
        self.locals.keys()
    }

    // -- instructions ------------------------------------------------------

    /// Append a new instruction to the end of `block`'s control-flow thread,
    /// tagging it with the debug cursor's current location.
    pub fn append_inst(&mut self, block: Block, data: InstData) -> Inst {
        let inst = self.defs.push(Def::Inst(data));
        *self.locations.get_mut(inst) = self.cursor.current();
        self.layout.append_inst(block, inst);
        inst
    }

    /// Append a new instruction without inserting it into the control-flow
    /// thread. Used for values (e.g. a folded constant) that are spliced in
    /// explicitly by the caller, which decides where the old instruction's
    /// thread slot should go.
    pub fn create_detached_inst(&mut self, data: InstData, location: Option<SourceLocation>) -> Inst {
        let inst = self.defs.push(Def::Inst(data));
        *self.locations.get_mut(inst) = location;
        inst
    }

    pub fn insert_before(&mut self, before: Inst, inst: Inst) {
        self.layout.insert_before(before, inst);
    }

    pub fn insert_at_end(&mut self, block: Block, inst: Inst) {
        self.layout.append_inst(block, inst);
    }

    pub fn remove_inst(&mut self, inst: Inst) {
        self.layout.remove_inst(inst);
    }

    pub fn is_inserted(&self, inst: Inst) -> bool {
        self.layout.is_inserted(inst)
    }

    pub fn inst_block(&self, inst: Inst) -> Option<Block> {
        self.layout.inst_block(inst)
    }

    pub fn inst_data(&self, inst: Inst) -> Result<&InstData> {
        match self.defs.get(inst) {
            Some(Def::Inst(data)) => Ok(data),
            Some(Def::Phi(_)) => Err(Error::invalid_parameter(format!("{inst} is a phi-node, not an instruction"))),
            None => Err(Error::not_found(format!("no instruction {inst}"))),
        }
    }

    pub fn inst_data_mut(&mut self, inst: Inst) -> Result<&mut InstData> {
        match self.defs.get_mut(inst) {
            Some(Def::Inst(data)) => Ok(data),
            Some(Def::Phi(_)) => Err(Error::invalid_parameter(format!("{inst} is a phi-node, not an instruction"))),
            None => Err(Error::not_found(format!("no instruction {inst}"))),
        }
    }

    pub fn location_of(&self, inst: Inst) -> Option<SourceLocation> {
        *self.locations.get(inst)
    }

    pub fn set_location(&mut self, inst: Inst, location: Option<SourceLocation>) {
        *self.locations.get_mut(inst) = location;
    }

    // -- phi-nodes -----------------------------------------------------

    pub fn append_phi(&mut self, block: Block) -> Inst {
        let phi = self.defs.push(Def::Phi(PhiNode::new(block)));
        self.block_phis.get_mut(block).push(phi);
        phi
    }

    pub fn phi_data(&self, inst: Inst) -> Result<&PhiNode> {
        match self.defs.get(inst) {
            Some(Def::Phi(phi)) => Ok(phi),
            Some(Def::Inst(_)) => Err(Error::invalid_parameter(format!("{inst} is not a phi-node"))),
            None => Err(Error::not_found(format!("no phi {inst}"))),
        }
    }

    pub fn phi_data_mut(&mut self, inst: Inst) -> Result<&mut PhiNode> {
        match self.defs.get_mut(inst) {
            Some(Def::Phi(phi)) => Ok(phi),
            Some(Def::Inst(_)) => Err(Error::invalid_parameter(format!("{inst} is not a phi-node"))),
            None => Err(Error::not_found(format!("no phi {inst}"))),
        }
    }

    pub fn is_phi(&self, inst: Inst) -> bool {
        matches!(self.defs.get(inst), Some(Def::Phi(_)))
    }

    /// Remove a φ-node entirely: used once `phi-pull` has rewritten every use
    /// of its output to some other value.
    pub fn remove_phi(&mut self, inst: Inst) {
        if let Some(block) = self.phi_data(inst).ok().and_then(|p| p.block) {
            self.block_phis.get_mut(block).retain(|&p| p != inst);
        }
    }

    // -- use-def maintenance ---------------------------------------------

    /// Replace every reference to `old` (in instruction operands and in
    /// φ-link tables) with `new`. After this call no reachable reference to
    /// `old` remains, satisfying the pass contract every transform relies on.
    pub fn replace_references(&mut self, old: Inst, new: Inst) {
        if old == new {
            return;
        }
        for (_, def) in self.defs.iter_mut() {
            match def {
                Def::Inst(data) => data.for_each_value_mut(|v| {
                    if *v == old {
                        *v = new;
                    }
                }),
                Def::Phi(phi) => {
                    let links: Vec<(Block, Inst)> = phi.links().to_vec();
                    for (pred, value) in links {
                        if value == old {
                            phi.set_link(pred, new);
                        }
                    }
                }
            }
        }
        // Carry the replaced instruction's debug location forward if the
        // replacement doesn't already have a more specific one.
        if let Some(old_loc) = self.location_of(old) {
            if self.location_of(new).is_none() {
                self.set_location(new, Some(old_loc));
            }
        }
    }

    /// Replace instruction `old` with a freshly computed `new_data`, carrying
    /// over its debug location and its control-flow thread slot (if it had
    /// one), then rewrite every use of `old` to point at the replacement.
    /// This is the shared machinery behind constant folding and phi-pull: "a
    /// folded instruction is dropped; its control-flow slot is transferred to
    /// the replacement if the replacement is not already on the control
    /// thread."
    pub fn fold_instruction(&mut self, old: Inst, new_data: InstData) -> Inst {
        let location = self.location_of(old);
        let new = self.create_detached_inst(new_data, location);
        if self.is_inserted(old) {
            self.insert_before(old, new);
            self.remove_inst(old);
        }
        self.replace_references(old, new);
        new
    }

    /// All instructions (and φ-nodes) in the function, in id order. Intended
    /// for passes that need to scan every instruction regardless of layout
    /// position (e.g. constant folding, which runs per-block but could run
    /// over the whole function the same way).
    pub fn all_insts(&self) -> impl Iterator<Item = Inst> + '_ {
        self.defs.keys()
    }
}
