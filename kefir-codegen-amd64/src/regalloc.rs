//! A linear-scan register allocator over the asmcmp `Stream`: computes one
//! live interval per vreg from its def position to its last use, then walks
//! those intervals in start order handing out physical registers from a
//! small free pool, spilling to the frame's spill area when the pool runs
//! dry. Grounded on the classic Poletto/Sarkar linear-scan shape (the same
//! algorithm `cranelift-codegen`'s allocator documentation describes before
//! falling back to `regalloc2`), simplified here to one pass with no
//! register-to-register move coalescing.

use crate::frame::StackFrame;
use kefir_asmcmp::{
    AsmOpcode, GeneralPurposeRegister, Operand, PhysicalRegister, StashPool, Stream, VirtualRegister,
    VirtualRegisterFile, VirtualRegisterKind, XmmRegister,
};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Location {
    Register(PhysicalRegister),
    /// Offset from the frame base, in bytes, of a spill slot or promoted
    /// local's storage.
    Stack(i32),
}

pub struct Allocation {
    locations: HashMap<VirtualRegister, Location>,
    /// `(register, start, end)` for every vreg that landed in a physical
    /// register, kept around so `protect_stashes` can tell whether a call
    /// boundary needs a particular register saved.
    reg_spans: Vec<(PhysicalRegister, u32, u32)>,
}

impl Allocation {
    pub fn location(&self, vreg: VirtualRegister) -> Option<Location> {
        self.locations.get(&vreg).copied()
    }

    /// Whether some vreg is resident in `reg` at `position` (the position of
    /// a call instruction in the stream, per `compute_intervals`'s
    /// numbering).
    fn live_at(&self, reg: PhysicalRegister, position: u32) -> bool {
        self.reg_spans.iter().any(|&(r, start, end)| r == reg && start <= position && position <= end)
    }
}

#[derive(Clone, Copy)]
struct Interval {
    vreg: VirtualRegister,
    start: u32,
    end: u32,
    is_float: bool,
}

const GPR_POOL: [GeneralPurposeRegister; 7] = [
    GeneralPurposeRegister::Rax,
    GeneralPurposeRegister::Rcx,
    GeneralPurposeRegister::Rdx,
    GeneralPurposeRegister::Rbx,
    GeneralPurposeRegister::R10,
    GeneralPurposeRegister::R11,
    GeneralPurposeRegister::R12,
];

const XMM_POOL: [XmmRegister; 8] = [
    XmmRegister::Xmm0,
    XmmRegister::Xmm1,
    XmmRegister::Xmm2,
    XmmRegister::Xmm3,
    XmmRegister::Xmm4,
    XmmRegister::Xmm5,
    XmmRegister::Xmm6,
    XmmRegister::Xmm7,
];

/// Computes one interval per vreg referenced in `stream`: `start` is the
/// position of the earliest instruction mentioning it, `end` the position of
/// the latest. Immediate/local/external vregs never need a physical home and
/// are excluded.
fn compute_intervals(stream: &Stream, vregs: &VirtualRegisterFile) -> Vec<Interval> {
    let mut bounds: HashMap<VirtualRegister, (u32, u32)> = HashMap::new();
    for (position, id) in stream.iter().enumerate() {
        let inst = stream.inst(id);
        for operand in inst.operands.iter().flatten() {
            if let Some(vreg) = operand_vreg(operand) {
                let position = position as u32;
                bounds
                    .entry(vreg)
                    .and_modify(|(_, end)| *end = (*end).max(position))
                    .or_insert((position, position));
            }
        }
    }
    bounds
        .into_iter()
        .filter(|(vreg, _)| needs_physical_home(vregs, *vreg))
        .map(|(vreg, (start, end))| Interval { vreg, start, end, is_float: matches!(vregs.kind(vreg), VirtualRegisterKind::FloatingPoint) })
        .collect()
}

fn operand_vreg(operand: &Operand) -> Option<VirtualRegister> {
    match operand {
        Operand::Virtual(v) => Some(*v),
        Operand::Memory(m) => m.base.or(m.index.map(|(v, _)| v)),
        _ => None,
    }
}

fn needs_physical_home(vregs: &VirtualRegisterFile, vreg: VirtualRegister) -> bool {
    matches!(vregs.kind(vreg), VirtualRegisterKind::GeneralPurpose | VirtualRegisterKind::FloatingPoint)
}

/// Every `X87` vreg referenced in `stream`, in first-reference order. These
/// never enter the linear-scan pool at all: SPEC_FULL.md requires long
/// doubles to go through x87 or memory exclusively, and this backend models
/// that by giving each one a fixed frame slot up front.
fn x87_vregs(stream: &Stream, vregs: &VirtualRegisterFile) -> Vec<VirtualRegister> {
    let mut seen = Vec::new();
    for id in stream.iter() {
        for operand in stream.inst(id).operands.iter().flatten() {
            if let Some(vreg) = operand_vreg(operand) {
                if matches!(vregs.kind(vreg), VirtualRegisterKind::X87) && !seen.contains(&vreg) {
                    seen.push(vreg);
                }
            }
        }
    }
    seen
}

/// Run linear-scan allocation, spilling into `frame`'s spill area when a
/// pool is exhausted. `pins` forces specific vregs into specific physical
/// registers (e.g. `expected` into `RAX` for `cmpxchg`); a pinned interval is
/// serviced before the free-pool scan runs so its register is never handed
/// to an unrelated, coincidentally-overlapping vreg.
pub fn allocate(
    stream: &Stream,
    vregs: &VirtualRegisterFile,
    frame: &mut StackFrame,
    pins: &HashMap<VirtualRegister, PhysicalRegister>,
) -> Allocation {
    let mut intervals = compute_intervals(stream, vregs);
    intervals.sort_by_key(|i| (!pins.contains_key(&i.vreg), i.start));

    let mut locations = HashMap::new();
    let mut reg_spans = Vec::new();
    let mut active_gpr: Vec<(u32, GeneralPurposeRegister)> = Vec::new();
    let mut active_xmm: Vec<(u32, XmmRegister)> = Vec::new();
    let mut free_gpr: Vec<GeneralPurposeRegister> = GPR_POOL.to_vec();
    let mut free_xmm: Vec<XmmRegister> = XMM_POOL.to_vec();

    for vreg in x87_vregs(stream, vregs) {
        // 16 bytes: SysV reserves 16-byte-aligned storage for an 80-bit long
        // double.
        let offset = frame.allocate_spill_slot(16, 16);
        locations.insert(vreg, Location::Stack(offset));
    }

    for interval in intervals {
        active_gpr.retain(|&(end, reg)| {
            if end < interval.start {
                free_gpr.push(reg);
                false
            } else {
                true
            }
        });
        active_xmm.retain(|&(end, reg)| {
            if end < interval.start {
                free_xmm.push(reg);
                false
            } else {
                true
            }
        });

        if let Some(&pinned) = pins.get(&interval.vreg) {
            match pinned {
                PhysicalRegister::Gpr(reg) => {
                    free_gpr.retain(|&r| r != reg);
                    active_gpr.push((interval.end, reg));
                }
                PhysicalRegister::Xmm(reg) => {
                    free_xmm.retain(|&r| r != reg);
                    active_xmm.push((interval.end, reg));
                }
            }
            locations.insert(interval.vreg, Location::Register(pinned));
            reg_spans.push((pinned, interval.start, interval.end));
            continue;
        }

        if interval.is_float {
            match free_xmm.pop() {
                Some(reg) => {
                    locations.insert(interval.vreg, Location::Register(PhysicalRegister::Xmm(reg)));
                    active_xmm.push((interval.end, reg));
                    reg_spans.push((PhysicalRegister::Xmm(reg), interval.start, interval.end));
                }
                None => {
                    let offset = frame.allocate_spill_slot(8, 8);
                    locations.insert(interval.vreg, Location::Stack(offset));
                }
            }
        } else {
            match free_gpr.pop() {
                Some(reg) => {
                    locations.insert(interval.vreg, Location::Register(PhysicalRegister::Gpr(reg)));
                    active_gpr.push((interval.end, reg));
                    reg_spans.push((PhysicalRegister::Gpr(reg), interval.start, interval.end));
                }
                None => {
                    let offset = frame.allocate_spill_slot(8, 8);
                    locations.insert(interval.vreg, Location::Stack(offset));
                }
            }
        }
    }

    Allocation { locations, reg_spans }
}

/// For every stash whose protected call has been placed in `stream`, push
/// each of its registers that is actually live across that call and pop it
/// back immediately after, so a caller-saved register the allocator handed
/// to an unrelated vreg doesn't get clobbered by the call. XMM registers
/// aren't stack-pushable on AMD64 (`push`/`pop` only move GPR-width values),
/// so this only protects `Gpr` stash entries; an `Xmm` entry is left to the
/// caller to keep spilled instead of register-resident across a call.
pub fn protect_stashes(stream: &mut Stream, allocation: &Allocation, stashes: &StashPool) {
    use kefir_entity::EntityRef;

    for stash in stashes.iter() {
        let Some(call_index) = stashes.liveness_index(stash) else { continue };
        let Some(call_id) = stream.iter().find(|id| id.index() as u32 == call_index) else { continue };
        for &reg in stashes.registers(stash) {
            let PhysicalRegister::Gpr(_) = reg else { continue };
            if !allocation.live_at(reg, call_index) {
                continue;
            }
            stream.insert_before(call_id, AsmOpcode::Push, None, [Some(Operand::Physical(reg)), None, None], None);
            match stream.next(call_id) {
                Some(after) => {
                    stream.insert_before(after, AsmOpcode::Pop, None, [Some(Operand::Physical(reg)), None, None], None);
                }
                None => {
                    stream.append(AsmOpcode::Pop, None, [Some(Operand::Physical(reg)), None, None], None);
                }
            }
        }
    }
}

/// Rewrite every `Operand::Virtual` vreg reference in `stream` into its
/// assigned physical register or frame-relative memory operand.
/// `ImmediateInteger`/`LocalVariable`/`ExternalMemory`/`Pair` vregs are
/// resolved directly from their `VirtualRegisterKind` rather than via
/// `Allocation`, since those never entered the scan. Lowering never builds an
/// `Operand::Memory` with a vreg base directly — a local's address always
/// goes through `Operand::Virtual(local_vreg)` first — so there is no
/// separate memory-operand rewrite here.
pub fn rewrite_operands(stream: &mut Stream, vregs: &VirtualRegisterFile, allocation: &Allocation, frame: &StackFrame) {
    let ids: Vec<_> = stream.iter().collect();
    for id in ids {
        let inst = stream.inst_mut(id);
        for slot in inst.operands.iter_mut() {
            if let Some(operand) = slot.take() {
                *slot = Some(resolve_operand(operand, vregs, allocation, frame));
            }
        }
    }
}

fn resolve_operand(operand: Operand, vregs: &VirtualRegisterFile, allocation: &Allocation, frame: &StackFrame) -> Operand {
    match operand {
        Operand::Virtual(v) => resolve_vreg(v, vregs, allocation, frame),
        other => other,
    }
}

fn resolve_vreg(vreg: VirtualRegister, vregs: &VirtualRegisterFile, allocation: &Allocation, frame: &StackFrame) -> Operand {
    match vregs.kind(vreg) {
        VirtualRegisterKind::ImmediateInteger(value) => Operand::Immediate(*value),
        VirtualRegisterKind::LocalVariable(slot) => {
            // No explicit base vreg: a bare `disp` with no base/index is
            // understood (by xasmgen) as relative to the frame base register.
            Operand::Memory(kefir_asmcmp::MemoryRef { base: None, index: None, disp: frame.local_offset(*slot), rip_relative: false })
        }
        VirtualRegisterKind::ExternalMemory(name) => {
            Operand::Label(kefir_asmcmp::LabelTarget::External { name: name.clone(), reloc: kefir_asmcmp::RelocKind::Absolute })
        }
        _ => match allocation.location(vreg) {
            Some(Location::Register(reg)) => Operand::Physical(reg),
            Some(Location::Stack(offset)) => Operand::Memory(kefir_asmcmp::MemoryRef { base: None, index: None, disp: offset as i64, rip_relative: false }),
            None => Operand::Virtual(vreg),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::StackFrame;
    use kefir_asmcmp::{AsmOpcode, OperandWidth};

    #[test]
    fn disjoint_intervals_reuse_the_same_register() {
        let mut vregs = VirtualRegisterFile::new();
        let a = vregs.create(VirtualRegisterKind::GeneralPurpose);
        let b = vregs.create(VirtualRegisterKind::GeneralPurpose);
        let mut stream = Stream::new();
        stream.append(AsmOpcode::Mov, Some(OperandWidth::Qword), [Some(Operand::Virtual(a)), Some(Operand::Immediate(1)), None], None);
        stream.append(AsmOpcode::Ret, None, [Some(Operand::Virtual(a)), None, None], None);
        stream.append(AsmOpcode::Mov, Some(OperandWidth::Qword), [Some(Operand::Virtual(b)), Some(Operand::Immediate(2)), None], None);
        stream.append(AsmOpcode::Ret, None, [Some(Operand::Virtual(b)), None, None], None);

        let mut frame = StackFrame::new();
        let allocation = allocate(&stream, &vregs, &mut frame, &HashMap::new());
        assert_eq!(allocation.location(a), allocation.location(b));
    }

    #[test]
    fn pool_exhaustion_spills_to_stack() {
        let mut vregs = VirtualRegisterFile::new();
        let mut stream = Stream::new();
        // One more simultaneously-live vreg than GPR_POOL has slots.
        let live: Vec<_> = (0..GPR_POOL.len() + 1)
            .map(|i| {
                let v = vregs.create(VirtualRegisterKind::GeneralPurpose);
                stream.append(AsmOpcode::Mov, Some(OperandWidth::Qword), [Some(Operand::Virtual(v)), Some(Operand::Immediate(i as i64)), None], None);
                v
            })
            .collect();
        for &v in &live {
            stream.append(AsmOpcode::Ret, None, [Some(Operand::Virtual(v)), None, None], None);
        }

        let mut frame = StackFrame::new();
        let allocation = allocate(&stream, &vregs, &mut frame, &HashMap::new());
        let spilled = live.iter().filter(|&&v| matches!(allocation.location(v), Some(Location::Stack(_)))).count();
        assert_eq!(spilled, 1);
    }

    #[test]
    fn immediate_integer_vreg_resolves_without_allocation() {
        let mut vregs = VirtualRegisterFile::new();
        let v = vregs.create(VirtualRegisterKind::ImmediateInteger(42));
        let frame = StackFrame::new();
        let allocation = Allocation { locations: HashMap::new(), reg_spans: Vec::new() };
        assert_eq!(resolve_vreg(v, &vregs, &allocation, &frame), Operand::Immediate(42));
    }

    #[test]
    fn pinned_vreg_is_honored_even_under_pool_pressure() {
        let mut vregs = VirtualRegisterFile::new();
        let mut stream = Stream::new();
        // Fill the whole GPR pool, then pin one more vreg to RAX: a plain
        // scan would have nothing free, but the pin must still win.
        let filler: Vec<_> = (0..GPR_POOL.len())
            .map(|i| {
                let v = vregs.create(VirtualRegisterKind::GeneralPurpose);
                stream.append(AsmOpcode::Mov, Some(OperandWidth::Qword), [Some(Operand::Virtual(v)), Some(Operand::Immediate(i as i64)), None], None);
                v
            })
            .collect();
        let pinned = vregs.create(VirtualRegisterKind::GeneralPurpose);
        stream.append(AsmOpcode::Mov, Some(OperandWidth::Qword), [Some(Operand::Virtual(pinned)), Some(Operand::Immediate(99)), None], None);
        for &v in filler.iter().chain(std::iter::once(&pinned)) {
            stream.append(AsmOpcode::Ret, None, [Some(Operand::Virtual(v)), None, None], None);
        }

        let mut pins = HashMap::new();
        pins.insert(pinned, PhysicalRegister::Gpr(GeneralPurposeRegister::Rax));
        let mut frame = StackFrame::new();
        let allocation = allocate(&stream, &vregs, &mut frame, &pins);
        assert_eq!(allocation.location(pinned), Some(Location::Register(PhysicalRegister::Gpr(GeneralPurposeRegister::Rax))));
    }

    #[test]
    fn x87_vreg_never_lands_in_the_xmm_pool() {
        let mut vregs = VirtualRegisterFile::new();
        let v = vregs.create(VirtualRegisterKind::X87);
        let mut stream = Stream::new();
        stream.append(AsmOpcode::X87Store, None, [Some(Operand::Virtual(v)), None, None], None);

        let mut frame = StackFrame::new();
        let allocation = allocate(&stream, &vregs, &mut frame, &HashMap::new());
        assert!(matches!(allocation.location(v), Some(Location::Stack(_))));
    }

    #[test]
    fn protect_stashes_wraps_a_live_caller_saved_register_around_the_call() {
        use kefir_entity::EntityRef;

        let mut vregs = VirtualRegisterFile::new();
        let live = vregs.create(VirtualRegisterKind::GeneralPurpose);
        let mut stream = Stream::new();
        stream.append(AsmOpcode::Mov, Some(OperandWidth::Qword), [Some(Operand::Virtual(live)), Some(Operand::Immediate(1)), None], None);
        let call_id = stream.append(AsmOpcode::Call, None, [None, None, None], None);
        stream.append(AsmOpcode::Ret, None, [Some(Operand::Virtual(live)), None, None], None);

        let mut pins = HashMap::new();
        pins.insert(live, PhysicalRegister::Gpr(GeneralPurposeRegister::Rcx));
        let mut frame = StackFrame::new();
        let allocation = allocate(&stream, &vregs, &mut frame, &pins);

        let mut stashes = StashPool::new();
        let stash = stashes.create(None);
        stashes.add_register(stash, PhysicalRegister::Gpr(GeneralPurposeRegister::Rcx));
        stashes.set_liveness_index(stash, call_id.index() as u32);

        protect_stashes(&mut stream, &allocation, &stashes);
        let opcodes: Vec<_> = stream.iter().map(|id| stream.inst(id).opcode).collect();
        let push_pos = opcodes.iter().position(|o| *o == AsmOpcode::Push).unwrap();
        let call_pos = opcodes.iter().position(|o| *o == AsmOpcode::Call).unwrap();
        let pop_pos = opcodes.iter().position(|o| *o == AsmOpcode::Pop).unwrap();
        assert!(push_pos < call_pos && call_pos < pop_pos);
    }
}
