//! `amd64-propagate-jump`: collapses jump-to-jump chains. If `Jmp L1` and
//! `L1`'s block consists of nothing but another `Jmp L2` (or `JmpCc`/`Nop`
//! instructions with no side effect preceding it), rewrite the first jump to
//! target `L2` directly. Iterates to a fixed point since collapsing one hop
//! can expose another.

use kefir_asmcmp::{AsmOpcode, LabelTarget, Stream};
use std::collections::HashMap;

pub fn run(stream: &mut Stream) {
    loop {
        let targets = label_to_final_jump(stream);
        if targets.is_empty() {
            return;
        }
        let mut changed = false;
        let ids: Vec<_> = stream.iter().collect();
        for id in ids {
            let inst = stream.inst(id);
            if !matches!(inst.opcode, AsmOpcode::Jmp | AsmOpcode::JmpCc(_)) {
                continue;
            }
            let Some(LabelTarget::Internal(label)) = inst.label.clone() else { continue };
            if let Some(&retarget) = targets.get(&label) {
                if retarget != label {
                    stream.inst_mut(id).label = Some(LabelTarget::Internal(retarget));
                    changed = true;
                }
            }
        }
        if !changed {
            return;
        }
    }
}

/// A label whose first non-`Nop` instruction is an unconditional `Jmp`
/// resolves to that jump's own target — a block that's nothing but a jump is
/// transparent to any branch into it.
fn label_to_final_jump(stream: &Stream) -> HashMap<kefir_asmcmp::Label, kefir_asmcmp::Label> {
    let mut label_position = HashMap::new();
    for (position, id) in stream.iter().enumerate() {
        if let Some(LabelTarget::Internal(label)) = stream.inst(id).label.clone() {
            label_position.insert(label, position);
        }
    }
    let ids: Vec<_> = stream.iter().collect();
    let mut result = HashMap::new();
    for (&label, &position) in &label_position {
        // Skip past the label-bearing Nop itself.
        let mut cursor = position + 1;
        while cursor < ids.len() && stream.inst(ids[cursor]).opcode == AsmOpcode::Nop {
            cursor += 1;
        }
        if cursor < ids.len() {
            if let AsmOpcode::Jmp = stream.inst(ids[cursor]).opcode {
                if let Some(LabelTarget::Internal(target)) = stream.inst(ids[cursor]).label.clone() {
                    result.insert(label, target);
                }
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use kefir_entity::EntityRef;

    #[test]
    fn jump_to_jump_chain_collapses() {
        let mut stream = Stream::new();
        let l1: kefir_asmcmp::Label = EntityRef::new(0);
        let l2: kefir_asmcmp::Label = EntityRef::new(1);
        let jmp_to_l1 = stream.append(AsmOpcode::Jmp, None, [None, None, None], Some(LabelTarget::Internal(l1)));
        stream.append(AsmOpcode::Nop, None, [None, None, None], Some(LabelTarget::Internal(l1)));
        stream.append(AsmOpcode::Jmp, None, [None, None, None], Some(LabelTarget::Internal(l2)));
        stream.append(AsmOpcode::Nop, None, [None, None, None], Some(LabelTarget::Internal(l2)));
        stream.append(AsmOpcode::Ret, None, [None, None, None], None);

        run(&mut stream);

        assert_eq!(stream.inst(jmp_to_l1).label, Some(LabelTarget::Internal(l2)));
    }
}
