//! `amd64-drop-virtual`: once the allocator has rewritten every vreg to a
//! physical register or memory operand, a `Mov`/`Phi` whose destination and
//! source resolved to the *same* location is a no-op — a coalescing
//! artifact of allocating overlapping intervals to the same register.

use kefir_asmcmp::{AsmOpcode, Operand, Stream};

pub fn run(stream: &mut Stream) {
    let candidates: Vec<_> = stream.iter().collect();
    for id in candidates {
        let inst = stream.inst(id);
        if !matches!(inst.opcode, AsmOpcode::Mov | AsmOpcode::Phi) {
            continue;
        }
        let same = match (&inst.operands[0], &inst.operands[1]) {
            (Some(a), Some(b)) => operands_equal(a, b),
            _ => false,
        };
        if same {
            stream.remove(id);
        }
    }
}

fn operands_equal(a: &Operand, b: &Operand) -> bool {
    match (a, b) {
        (Operand::Physical(x), Operand::Physical(y)) => x == y,
        (Operand::Memory(x), Operand::Memory(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kefir_asmcmp::{GeneralPurposeRegister, PhysicalRegister};

    #[test]
    fn self_move_is_dropped() {
        let mut stream = Stream::new();
        let reg = Operand::Physical(PhysicalRegister::Gpr(GeneralPurposeRegister::Rax));
        let id = stream.append(AsmOpcode::Mov, None, [Some(reg.clone()), Some(reg), None], None);
        run(&mut stream);
        assert_eq!(stream.iter().collect::<Vec<_>>(), Vec::<_>::new());
        let _ = id;
    }
}
