//! `amd64-peephole`: local, opcode + immediate-operand pattern cleanup that
//! only becomes visible post-allocation (an immediate operand that happened
//! to land on an identity value for its opcode). Returns whether anything
//! changed, so the caller can iterate to a fixed point.

use kefir_asmcmp::{AsmOpcode, Operand, Stream};

pub fn run(stream: &mut Stream) -> bool {
    let mut changed = false;
    let candidates: Vec<_> = stream.iter().collect();
    for id in candidates {
        if is_identity_arithmetic(stream, id) {
            stream.remove(id);
            changed = true;
        }
    }
    changed
}

/// `add/sub/or/xor/shl/shr/sar reg, 0` and `imul reg, 1` never change their
/// destination; safe to drop once the operand is a concrete immediate.
fn is_identity_arithmetic(stream: &Stream, id: kefir_asmcmp::AsmInstId) -> bool {
    let inst = stream.inst(id);
    let Some(Operand::Immediate(imm)) = inst.operands[1].clone() else { return false };
    match inst.opcode {
        AsmOpcode::Add | AsmOpcode::Sub | AsmOpcode::Or | AsmOpcode::Xor | AsmOpcode::Shl | AsmOpcode::Shr | AsmOpcode::Sar => {
            imm == 0
        }
        AsmOpcode::IMul => imm == 1,
        _ => false,
    }
}
