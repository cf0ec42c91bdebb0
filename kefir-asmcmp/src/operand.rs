//! Operand shapes an `AsmInst` slot can hold, and the label/relocation model
//! used for jump and call targets.

use crate::physical::PhysicalRegister;
use crate::vreg::VirtualRegister;
use kefir_entity::entity_impl;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Label(u32);
entity_impl!(Label, "label");

/// How a call/jump target's address is to be resolved by the assembler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelocKind {
    /// Resolved at link time against the procedure linkage table; used for
    /// calls to functions that may live in a shared object.
    Plt,
    /// Resolved directly, RIP-relative; used for symbols known to be local
    /// to the final link (internal labels, `static` functions).
    Absolute,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LabelTarget {
    /// A label owned by this same asmcmp stream.
    Internal(Label),
    /// A symbol resolved outside this stream, with its own relocation kind.
    External { name: String, reloc: RelocKind },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandWidth {
    Byte,
    Word,
    Dword,
    Qword,
}

/// `[base + index*scale + disp]`, or RIP-relative when `rip_relative` is set
/// (in which case `base`/`index` are unused — the displacement is resolved
/// against the instruction pointer once the final encoding is known).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MemoryRef {
    pub base: Option<VirtualRegister>,
    pub index: Option<(VirtualRegister, u8)>,
    pub disp: i64,
    pub rip_relative: bool,
}

impl MemoryRef {
    pub fn direct(base: VirtualRegister, disp: i64) -> Self {
        Self { base: Some(base), index: None, disp, rip_relative: false }
    }

    pub fn rip_relative(disp: i64) -> Self {
        Self { base: None, index: None, disp, rip_relative: true }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Immediate(i64),
    Virtual(VirtualRegister),
    Physical(PhysicalRegister),
    Memory(MemoryRef),
    Label(LabelTarget),
}

impl Operand {
    pub fn as_virtual(&self) -> Option<VirtualRegister> {
        match self {
            Operand::Virtual(v) => Some(*v),
            Operand::Memory(m) => m.base.or(m.index.map(|(v, _)| v)),
            _ => None,
        }
    }
}
