//! `amd64-eliminate-label`: drops a block-entry `Nop` whose label is no
//! longer referenced by any jump, branch, or call once `propagate_jump` has
//! retargeted everything that used to point at it.

use kefir_asmcmp::{AsmOpcode, LabelTarget, Stream};
use std::collections::HashSet;

pub fn run(stream: &mut Stream) {
    let mut referenced = HashSet::new();
    for id in stream.iter() {
        if let Some(LabelTarget::Internal(label)) = stream.inst(id).label.clone() {
            if stream.inst(id).opcode != AsmOpcode::Nop {
                referenced.insert(label);
            }
        }
    }
    let candidates: Vec<_> = stream.iter().collect();
    for id in candidates {
        let inst = stream.inst(id);
        if inst.opcode != AsmOpcode::Nop {
            continue;
        }
        let Some(LabelTarget::Internal(label)) = inst.label.clone() else { continue };
        if !referenced.contains(&label) {
            stream.remove(id);
        }
    }
}
