//! The pre-allocation AMD64 instruction stream ("asmcmp"): virtual
//! registers, operands, register stashes and labels. `kefir-codegen-amd64`
//! lowers the optimizer IR into this representation; the register allocator
//! consumes it and rewrites every `Operand::Virtual` into `Operand::Physical`
//! or a stack-slot `Operand::Memory` in place.

pub mod inst;
pub mod operand;
pub mod physical;
pub mod stash;
pub mod vreg;

pub use inst::{AsmInst, AsmInstId, AsmOpcode, ConditionCode, Stream};
pub use operand::{Label, LabelTarget, MemoryRef, Operand, OperandWidth, RelocKind};
pub use physical::{GeneralPurposeRegister, PhysicalRegister, XmmRegister};
pub use stash::{Stash, StashData, StashPool};
pub use vreg::{PairKind, VirtualRegister, VirtualRegisterFile, VirtualRegisterKind};
