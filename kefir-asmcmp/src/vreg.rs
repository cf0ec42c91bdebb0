//! Virtual registers: the allocator's input alphabet. A vreg's kind is fixed
//! at creation except for `Unspecified`, which defers to a later call that
//! resolves it from another, already-typed vreg — `Phi` lowering relies on
//! this to create a φ's placement before either of its sources is known.

use kefir_entity::{entity_impl, PrimaryMap};
use kefir_ir::function::LocalVar;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualRegister(u32);
entity_impl!(VirtualRegister, "vreg");

/// Distinguishes the two ways a `Pair` vreg's halves combine into one
/// source-level value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PairKind {
    ComplexFloatSingle,
    ComplexFloatDouble,
}

#[derive(Clone, Debug, PartialEq)]
pub enum VirtualRegisterKind {
    /// Type deferred; resolved by `specify_type_dependent`.
    Unspecified,
    GeneralPurpose,
    FloatingPoint,
    /// A long-double or complex-long-double value. Never placed in the XMM
    /// pool; the allocator gives it a dedicated frame slot and lowering
    /// reaches it through the x87 stack rather than SSE moves.
    X87,
    /// `(length_qwords, alignment_qwords)`; materializes as a stack slot the
    /// frame builder carves out of the spill area.
    SpillSpace { length_qwords: u32, alignment_qwords: u32 },
    LocalVariable(LocalVar),
    ImmediateInteger(i64),
    ExternalMemory(String),
    /// Two sub-vregs that together hold one source-level value (a complex
    /// float/double) too wide for a single GPR/XMM.
    Pair { first: VirtualRegister, second: VirtualRegister, kind: PairKind },
}

#[derive(Debug, Default)]
pub struct VirtualRegisterFile {
    kinds: PrimaryMap<VirtualRegister, VirtualRegisterKind>,
}

impl VirtualRegisterFile {
    pub fn new() -> Self {
        Self { kinds: PrimaryMap::new() }
    }

    pub fn create(&mut self, kind: VirtualRegisterKind) -> VirtualRegister {
        self.kinds.push(kind)
    }

    pub fn kind(&self, vreg: VirtualRegister) -> &VirtualRegisterKind {
        self.kinds.get(vreg).expect("dangling VirtualRegister")
    }

    pub fn is_unspecified(&self, vreg: VirtualRegister) -> bool {
        matches!(self.kind(vreg), VirtualRegisterKind::Unspecified)
    }

    /// Resolve an `Unspecified` vreg's kind to match `source`'s, once a
    /// concretely-typed vreg is paired with it (e.g. a φ's first incoming
    /// edge). Pair vregs propagate their structure so both halves share kind.
    pub fn specify_type_dependent(&mut self, vreg: VirtualRegister, source: VirtualRegister) {
        if !self.is_unspecified(vreg) {
            return;
        }
        let resolved = match self.kind(source) {
            VirtualRegisterKind::FloatingPoint => VirtualRegisterKind::FloatingPoint,
            VirtualRegisterKind::X87 => VirtualRegisterKind::X87,
            VirtualRegisterKind::Pair { kind, .. } => {
                let first = self.create(VirtualRegisterKind::FloatingPoint);
                let second = self.create(VirtualRegisterKind::FloatingPoint);
                VirtualRegisterKind::Pair { first, second, kind: *kind }
            }
            _ => VirtualRegisterKind::GeneralPurpose,
        };
        *self.kinds.get_mut(vreg).expect("dangling VirtualRegister") = resolved;
    }

    pub fn new_virtual_register_of_type(&mut self, source: VirtualRegister) -> VirtualRegister {
        match self.kind(source).clone() {
            VirtualRegisterKind::Pair { kind, .. } => {
                let first = self.create(VirtualRegisterKind::FloatingPoint);
                let second = self.create(VirtualRegisterKind::FloatingPoint);
                self.create(VirtualRegisterKind::Pair { first, second, kind })
            }
            VirtualRegisterKind::FloatingPoint => self.create(VirtualRegisterKind::FloatingPoint),
            VirtualRegisterKind::X87 => self.create(VirtualRegisterKind::X87),
            _ => self.create(VirtualRegisterKind::GeneralPurpose),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unspecified_resolves_from_source_kind() {
        let mut file = VirtualRegisterFile::new();
        let phi_output = file.create(VirtualRegisterKind::Unspecified);
        let source = file.create(VirtualRegisterKind::FloatingPoint);
        file.specify_type_dependent(phi_output, source);
        assert_eq!(file.kind(phi_output), &VirtualRegisterKind::FloatingPoint);
    }

    #[test]
    fn x87_kind_is_distinct_from_floating_point() {
        let mut file = VirtualRegisterFile::new();
        let v = file.create(VirtualRegisterKind::X87);
        assert_eq!(file.kind(v), &VirtualRegisterKind::X87);
        assert_ne!(file.kind(v), &VirtualRegisterKind::FloatingPoint);
    }

    #[test]
    fn already_specified_vreg_is_not_overwritten() {
        let mut file = VirtualRegisterFile::new();
        let target = file.create(VirtualRegisterKind::GeneralPurpose);
        let source = file.create(VirtualRegisterKind::FloatingPoint);
        file.specify_type_dependent(target, source);
        assert_eq!(file.kind(target), &VirtualRegisterKind::GeneralPurpose);
    }
}
