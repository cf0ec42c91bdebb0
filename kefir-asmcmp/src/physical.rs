//! Names for the physical AMD64 registers the allocator assigns virtual
//! registers to and the frame builder reserves for its own bookkeeping (the
//! frame pointer, the stack pointer).

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GeneralPurposeRegister {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    Rbp,
    Rsp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

impl GeneralPurposeRegister {
    pub const CALLEE_SAVED: [GeneralPurposeRegister; 5] = [
        GeneralPurposeRegister::Rbx,
        GeneralPurposeRegister::R12,
        GeneralPurposeRegister::R13,
        GeneralPurposeRegister::R14,
        GeneralPurposeRegister::R15,
    ];

    pub const CALLER_SAVED: [GeneralPurposeRegister; 9] = [
        GeneralPurposeRegister::Rax,
        GeneralPurposeRegister::Rcx,
        GeneralPurposeRegister::Rdx,
        GeneralPurposeRegister::Rsi,
        GeneralPurposeRegister::Rdi,
        GeneralPurposeRegister::R8,
        GeneralPurposeRegister::R9,
        GeneralPurposeRegister::R10,
        GeneralPurposeRegister::R11,
    ];

    /// Integer argument registers in System V order.
    pub const ARGUMENT_ORDER: [GeneralPurposeRegister; 6] = [
        GeneralPurposeRegister::Rdi,
        GeneralPurposeRegister::Rsi,
        GeneralPurposeRegister::Rdx,
        GeneralPurposeRegister::Rcx,
        GeneralPurposeRegister::R8,
        GeneralPurposeRegister::R9,
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum XmmRegister {
    Xmm0,
    Xmm1,
    Xmm2,
    Xmm3,
    Xmm4,
    Xmm5,
    Xmm6,
    Xmm7,
    Xmm8,
    Xmm9,
    Xmm10,
    Xmm11,
    Xmm12,
    Xmm13,
    Xmm14,
    Xmm15,
}

impl XmmRegister {
    /// SSE argument registers in System V order; none are callee-saved.
    pub const ARGUMENT_ORDER: [XmmRegister; 8] = [
        XmmRegister::Xmm0,
        XmmRegister::Xmm1,
        XmmRegister::Xmm2,
        XmmRegister::Xmm3,
        XmmRegister::Xmm4,
        XmmRegister::Xmm5,
        XmmRegister::Xmm6,
        XmmRegister::Xmm7,
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhysicalRegister {
    Gpr(GeneralPurposeRegister),
    Xmm(XmmRegister),
}

impl PhysicalRegister {
    pub fn is_gpr(self) -> bool {
        matches!(self, PhysicalRegister::Gpr(_))
    }

    pub fn is_xmm(self) -> bool {
        matches!(self, PhysicalRegister::Xmm(_))
    }
}
