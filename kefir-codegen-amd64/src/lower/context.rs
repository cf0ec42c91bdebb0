//! Per-function lowering state: the optimizer `Value`/`Block` to asmcmp
//! `VirtualRegister`/`Label` maps, and the instruction stream being built.

use kefir_asmcmp::{
    AsmInstId, Label, LabelTarget, PhysicalRegister, Stash, StashPool, Stream, VirtualRegister, VirtualRegisterFile,
    VirtualRegisterKind,
};
use kefir_entity::SecondaryMap;
use kefir_ir::function::{Block, Function, Inst};
use std::collections::HashMap;

pub struct LoweringContext<'f> {
    pub function: &'f Function,
    pub vregs: VirtualRegisterFile,
    pub stream: Stream,
    /// Physical-register pinning requirements collected during lowering (e.g.
    /// RAX for an atomic load's result, RAX/RCX/RDX for cmpxchg's operands).
    /// Consulted by `regalloc::allocate` alongside the linear-scan intervals.
    pub pins: HashMap<VirtualRegister, PhysicalRegister>,
    /// Caller-saved register stashes created at call boundaries (`Call`,
    /// libatomic call-outs). Populated during lowering, consulted by
    /// `regalloc::protect_stashes` once allocation has located every vreg.
    pub stashes: StashPool,
    value_to_vreg: SecondaryMap<Inst, Option<VirtualRegister>>,
    block_to_label: SecondaryMap<Block, Option<Label>>,
    block_terminator: SecondaryMap<Block, Option<AsmInstId>>,
    next_label: u32,
}

impl<'f> LoweringContext<'f> {
    pub fn new(function: &'f Function) -> Self {
        Self {
            function,
            vregs: VirtualRegisterFile::new(),
            stream: Stream::new(),
            pins: HashMap::new(),
            stashes: StashPool::new(),
            value_to_vreg: SecondaryMap::new(),
            block_to_label: SecondaryMap::new(),
            block_terminator: SecondaryMap::new(),
            next_label: 0,
        }
    }

    /// Require `vreg` to be assigned physical register `reg` by the
    /// allocator, overwriting any earlier pin for the same vreg.
    pub fn pin_vreg(&mut self, vreg: VirtualRegister, reg: PhysicalRegister) {
        self.pins.insert(vreg, reg);
    }

    /// Open a stash protecting `regs` across a call, bound to the call
    /// instruction's position once it's known. Returns the stash so the
    /// caller can set its liveness index after appending the call.
    pub fn preserve_regs(&mut self, regs: impl IntoIterator<Item = PhysicalRegister>) -> Stash {
        let stash = self.stashes.create(None);
        for reg in regs {
            self.stashes.add_register(stash, reg);
        }
        stash
    }

    /// Bind a previously-opened stash to the call instruction it protects, so
    /// `regalloc::protect_stashes` knows which position in the stream to wrap
    /// push/pop pairs around.
    pub fn anchor_stash(&mut self, stash: Stash, call: AsmInstId) {
        use kefir_entity::EntityRef;
        self.stashes.set_liveness_index(stash, call.index() as u32);
    }

    /// The vreg a value's result lives in, creating a fresh `GeneralPurpose`
    /// vreg on first reference. Block-local: an optimizer `Value` referenced
    /// before it's been lowered (a forward reference across a φ edge) still
    /// gets a stable vreg to write the eventual copy into.
    pub fn vreg_of(&mut self, value: Inst) -> VirtualRegister {
        if let Some(v) = *self.value_to_vreg.get(value) {
            return v;
        }
        let kind = if self.function.is_phi(value) {
            VirtualRegisterKind::Unspecified
        } else {
            VirtualRegisterKind::GeneralPurpose
        };
        let vreg = self.vregs.create(kind);
        *self.value_to_vreg.get_mut(value) = Some(vreg);
        vreg
    }

    pub fn bind_vreg(&mut self, value: Inst, vreg: VirtualRegister) {
        *self.value_to_vreg.get_mut(value) = Some(vreg);
    }

    /// The label a block's code starts at, minting a fresh internal label on
    /// first reference so forward branches can be lowered before their
    /// target block has been emitted.
    pub fn label_of(&mut self, block: Block) -> Label {
        if let Some(l) = *self.block_to_label.get(block) {
            return l;
        }
        let label = kefir_entity::EntityRef::new(self.next_label as usize);
        self.next_label += 1;
        *self.block_to_label.get_mut(block) = Some(label);
        label
    }

    pub fn label_target(&mut self, block: Block) -> LabelTarget {
        LabelTarget::Internal(self.label_of(block))
    }

    /// Record `inst` as the control-flow terminator emitted for `block`, so a
    /// φ copy destined for one of `block`'s successors can later be spliced in
    /// right before it instead of landing at the stream's tail.
    pub fn set_terminator(&mut self, block: Block, inst: AsmInstId) {
        *self.block_terminator.get_mut(block) = Some(inst);
    }

    pub fn terminator_of(&self, block: Block) -> Option<AsmInstId> {
        *self.block_terminator.get(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kefir_ir::function::{Function, InstData, IntWidth, Signature};

    #[test]
    fn vreg_of_is_stable_across_calls() {
        let mut f = Function::new("f", Signature::default());
        let block = f.create_block();
        let inst = f.append_inst(block, InstData::IntConst { width: IntWidth::W32, value: 1 });
        let mut ctx = LoweringContext::new(&f);
        let first = ctx.vreg_of(inst);
        let second = ctx.vreg_of(inst);
        assert_eq!(first, second);
    }

    #[test]
    fn phi_gets_unspecified_vreg() {
        let mut f = Function::new("f", Signature::default());
        let block = f.create_block();
        let phi = f.append_phi(block);
        let mut ctx = LoweringContext::new(&f);
        let vreg = ctx.vreg_of(phi);
        assert_eq!(ctx.vregs.kind(vreg), &VirtualRegisterKind::Unspecified);
    }

    #[test]
    fn label_of_is_stable_and_distinct_per_block() {
        let mut f = Function::new("f", Signature::default());
        let block_a = f.create_block();
        let block_b = f.create_block();
        let mut ctx = LoweringContext::new(&f);
        let label_a1 = ctx.label_of(block_a);
        let label_a2 = ctx.label_of(block_a);
        let label_b = ctx.label_of(block_b);
        assert_eq!(label_a1, label_a2);
        assert_ne!(label_a1, label_b);
    }

    #[test]
    fn terminator_round_trips() {
        let mut f = Function::new("f", Signature::default());
        let block = f.create_block();
        let mut ctx = LoweringContext::new(&f);
        assert_eq!(ctx.terminator_of(block), None);
        let id = ctx.stream.append(kefir_asmcmp::AsmOpcode::Ret, None, [None, None, None], None);
        ctx.set_terminator(block, id);
        assert_eq!(ctx.terminator_of(block), Some(id));
    }
}
