//! Promotes scalar local variables whose address never escapes into SSA
//! values, inserting φ-nodes at the blocks where the promoted value's reaching
//! definition would otherwise be ambiguous.
//!
//! The construction follows the same "resolve recursively, breaking cycles
//! with an eagerly-created φ" shape as a classic lazy SSA builder (the one
//! `cranelift-frontend`'s `FunctionBuilder` performs incrementally via
//! `use_var`/`seal_block`); since `Function`'s CFG is already complete by the
//! time this pass runs, every predecessor is already known and there's no
//! need to track incomplete φs across block construction.

use super::{Pass, PassConfig};
use kefir_ir::function::{Block, Function, Inst, InstData, IntWidth, LocalVar};
use kefir_ir::module::Module;
use kefir_ir::types::TypeEntry;
use kefir_ir::Result;
use std::collections::{HashMap, HashSet};

pub struct Mem2Reg;

impl Pass for Mem2Reg {
    fn name(&self) -> &'static str {
        "mem2reg"
    }

    fn apply(&self, module: &mut Module, function: &mut Function, _config: &PassConfig) -> Result<()> {
        let locals: Vec<LocalVar> = function.locals().collect();
        for local in locals {
            if function.is_local_promoted(local) {
                continue;
            }
            if promotable_width(module, function, local).is_none() {
                continue;
            }
            promote(function, local);
        }
        Ok(())
    }
}

/// Only plain scalar locals (no aggregates, no `BitInt`, no floats) are
/// promoted; everything else keeps its stack slot. Widening this is possible
/// but each of those needs its own merge semantics (SROA for aggregates, a
/// separate float/BitInt value lattice) that this pass doesn't implement.
fn promotable_width(module: &Module, function: &Function, local: LocalVar) -> Option<IntWidth> {
    let ty = module.types.get(function.local_type(local));
    if ty.top_level_len() != 1 {
        return None;
    }
    match ty.entries().first()? {
        TypeEntry::Int8 | TypeEntry::Bool => Some(IntWidth::W8),
        TypeEntry::Int16 => Some(IntWidth::W16),
        TypeEntry::Int32 => Some(IntWidth::W32),
        TypeEntry::Int64 | TypeEntry::Pointer => Some(IntWidth::W64),
        _ => None,
    }
}

/// `true` if `addr` (a `LocalAddr` result) is used anywhere other than as the
/// pointer of a `Load` or the pointer (never the stored value) of a `Store`.
fn escapes(function: &Function, addr: Inst) -> bool {
    for inst in function.all_insts() {
        if inst == addr {
            continue;
        }
        let Ok(data) = function.inst_data(inst) else { continue };
        let safe = match data {
            InstData::Load { ptr } => *ptr == addr,
            InstData::Store { ptr, value } => *ptr == addr && *value != addr,
            _ => false,
        };
        if safe {
            continue;
        }
        let mut used = false;
        data.for_each_value(|v| {
            if v == addr {
                used = true;
            }
        });
        if used {
            return true;
        }
    }
    false
}

struct Resolver<'a> {
    function: &'a mut Function,
    addr_set: &'a HashSet<Inst>,
    entry: HashMap<Block, Option<Inst>>,
    exit: HashMap<Block, Option<Inst>>,
    visiting: HashSet<Block>,
    created_phis: Vec<Inst>,
}

impl<'a> Resolver<'a> {
    fn entry_value(&mut self, block: Block) -> Option<Inst> {
        if let Some(v) = self.entry.get(&block) {
            return *v;
        }
        if !self.visiting.insert(block) {
            // Re-entered this block's resolution without an earlier cache
            // insert to break the cycle (a single-predecessor chain that
            // loops back on itself without ever merging). Give up on proving
            // a value here rather than recursing forever.
            return None;
        }
        let preds = self.function.predecessors(block);
        let result = if preds.is_empty() {
            None
        } else if preds.len() == 1 {
            self.exit_value(preds[0])
        } else {
            let phi = self.function.append_phi(block);
            self.created_phis.push(phi);
            self.entry.insert(block, Some(phi));
            for pred in preds {
                if let Some(value) = self.exit_value(pred) {
                    self.function.phi_data_mut(phi).unwrap().set_link(pred, value);
                }
            }
            Some(phi)
        };
        self.entry.insert(block, result);
        self.visiting.remove(&block);
        result
    }

    fn exit_value(&mut self, block: Block) -> Option<Inst> {
        if let Some(v) = self.exit.get(&block) {
            return *v;
        }
        let mut current = self.entry_value(block);
        for inst in self.function.block_insts(block) {
            if let Ok(InstData::Store { ptr, value }) = self.function.inst_data(inst) {
                if self.addr_set.contains(ptr) {
                    current = Some(*value);
                }
            }
        }
        self.exit.insert(block, current);
        current
    }
}

fn promote(function: &mut Function, local: LocalVar) {
    let addr_insts: Vec<Inst> = function
        .all_insts()
        .filter(|&i| matches!(function.inst_data(i), Ok(InstData::LocalAddr { slot }) if *slot == local))
        .collect();
    if addr_insts.is_empty() || addr_insts.iter().any(|&a| escapes(function, a)) {
        return;
    }
    let addr_set: HashSet<Inst> = addr_insts.iter().copied().collect();

    let mut resolver =
        Resolver { function, addr_set: &addr_set, entry: HashMap::new(), exit: HashMap::new(), visiting: HashSet::new(), created_phis: Vec::new() };

    let blocks = resolver.function.block_order();
    let mut planned_loads: Vec<(Inst, Option<Inst>)> = Vec::new();
    let mut stores_to_remove: Vec<Inst> = Vec::new();

    for block in blocks {
        let mut current = resolver.entry_value(block);
        for inst in resolver.function.block_insts(block) {
            match resolver.function.inst_data(inst) {
                Ok(InstData::Load { ptr }) if addr_set.contains(ptr) => {
                    planned_loads.push((inst, current));
                }
                Ok(InstData::Store { ptr, value }) if addr_set.contains(ptr) => {
                    current = Some(*value);
                    stores_to_remove.push(inst);
                }
                _ => {}
            }
        }
    }

    if planned_loads.iter().any(|(_, v)| v.is_none()) {
        // A path reaches a load before any store ever defines this local.
        // Back out: drop the φs we speculatively created and leave the
        // local on its stack slot.
        for phi in resolver.created_phis {
            resolver.function.remove_phi(phi);
        }
        return;
    }

    let function = resolver.function;
    for (load, value) in planned_loads {
        let value = value.expect("checked above");
        function.replace_references(load, value);
        if function.is_inserted(load) {
            function.remove_inst(load);
        }
    }
    for store in stores_to_remove {
        if function.is_inserted(store) {
            function.remove_inst(store);
        }
    }
    for addr in addr_insts {
        if function.is_inserted(addr) {
            function.remove_inst(addr);
        }
    }
    function.mark_local_promoted(local);
}
