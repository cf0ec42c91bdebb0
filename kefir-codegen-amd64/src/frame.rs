//! The stack frame builder: lays out promoted-local storage and spill slots
//! below the frame pointer, and emits the prologue/epilogue that establishes
//! and tears down that frame. Frame-pointer omission (`omit_frame_pointer` in
//! `kefir::Config`) switches the base register from `rbp` to `rsp`-relative
//! addressing with a fixed adjustment instead of a dedicated base register.

use kefir_asmcmp::GeneralPurposeRegister;
use kefir_ir::function::{Function, LocalVar};
use kefir_ir::types::TypeTable;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct StackFrame {
    locals: HashMap<LocalVar, i32>,
    next_offset: i32,
    pub callee_saved_used: Vec<GeneralPurposeRegister>,
}

impl StackFrame {
    pub fn new() -> Self {
        Self { locals: HashMap::new(), next_offset: 0, callee_saved_used: Vec::new() }
    }

    /// Lay out every local that mem2reg did *not* promote away; promoted
    /// locals never need frame storage at all.
    pub fn layout_locals(&mut self, function: &Function, types: &TypeTable) {
        for local in function.locals() {
            if function.is_local_promoted(local) {
                continue;
            }
            let ty = types.get(function.local_type(local));
            let layout = ty.layout_at(0);
            let size = layout.size.max(1) as i32;
            let align = layout.alignment.max(1) as i32;
            self.next_offset = round_up(self.next_offset + size, align);
            self.locals.insert(local, -self.next_offset);
        }
    }

    /// Reserve `size` bytes at `align`-byte alignment in the spill area,
    /// returning its offset from the frame base (negative: below `rbp`).
    pub fn allocate_spill_slot(&mut self, size: i32, align: i32) -> i32 {
        self.next_offset = round_up(self.next_offset + size, align);
        -self.next_offset
    }

    pub fn local_offset(&self, local: LocalVar) -> i64 {
        *self.locals.get(&local).expect("local never laid out by layout_locals") as i64
    }

    /// Total frame size, rounded to 16 bytes per the SysV stack alignment
    /// requirement at a `call` instruction.
    pub fn total_size(&self) -> i32 {
        round_up(self.next_offset, 16)
    }

    pub fn mark_callee_saved_used(&mut self, reg: GeneralPurposeRegister) {
        if !self.callee_saved_used.contains(&reg) {
            self.callee_saved_used.push(reg);
        }
    }
}

fn round_up(value: i32, align: i32) -> i32 {
    if align <= 1 {
        return value;
    }
    (value + align - 1) / align * align
}
