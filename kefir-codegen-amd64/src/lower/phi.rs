//! φ-output vreg mapping, per the two-phase algorithm: a φ's vreg cannot be
//! chosen until every block has been lowered (its kind — GPR vs. XMM — is only
//! known once at least one incoming value has a concrete vreg), but the copy
//! that feeds it must land at the end of each predecessor, which has already
//! been emitted by the time the whole function is walked once.
//!
//! Phase 1 (`lower::inst`, during the single forward walk): every φ gets an
//! `Unspecified` vreg up front via `LoweringContext::vreg_of`, so the forward
//! walk can reference it before its type is known.
//!
//! Phase 2 (this module, after the forward walk): for every φ, resolve its
//! vreg's kind from one resolved incoming value, then append a `Phi` copy
//! instruction at the tail of each predecessor block feeding the value in —
//! `amd64-propagate-jump` later folds that copy's placement against whatever
//! jump already ends the predecessor.

use crate::lower::context::LoweringContext;
use kefir_asmcmp::{AsmOpcode, Operand};
use kefir_ir::function::Block;

pub fn resolve_phis(ctx: &mut LoweringContext<'_>) {
    for block in ctx.function.block_order() {
        let phis = ctx.function.block_phis(block).to_vec();
        for phi in phis {
            let Ok(phi_data) = ctx.function.phi_data(phi) else { continue };
            let links: Vec<(Block, kefir_ir::function::Inst)> = phi_data.links().to_vec();
            let output = ctx.vreg_of(phi);

            // Resolve the output's kind from the first incoming value that
            // already has a concrete (non-Unspecified) vreg.
            for &(_, source) in &links {
                let source_vreg = ctx.vreg_of(source);
                if !ctx.vregs.is_unspecified(source_vreg) {
                    ctx.vregs.specify_type_dependent(output, source_vreg);
                    break;
                }
            }

            for (pred, source) in links {
                let source_vreg = ctx.vreg_of(source);
                let operands = [Some(Operand::Virtual(output)), Some(Operand::Virtual(source_vreg)), None];
                match ctx.terminator_of(pred) {
                    Some(terminator) => {
                        ctx.stream.insert_before(terminator, AsmOpcode::Phi, None, operands, None);
                    }
                    // A predecessor with no recorded terminator (shouldn't
                    // happen once every block has been lowered) falls back to
                    // the stream's tail rather than panicking.
                    None => {
                        ctx.stream.append(AsmOpcode::Phi, None, operands, None);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kefir_ir::function::{Function, InstData, IntWidth, Signature};

    #[test]
    fn phi_copy_lands_before_each_predecessors_terminator() {
        let mut f = Function::new("f", Signature::default());
        let entry = f.create_block();
        let latch = f.create_block();
        let header = f.create_block();

        let init = f.append_inst(entry, InstData::IntConst { width: IntWidth::W32, value: 1 });
        let next = f.append_inst(latch, InstData::IntConst { width: IntWidth::W32, value: 2 });
        let phi = f.append_phi(header);
        f.phi_data_mut(phi).unwrap().set_link(entry, init);
        f.phi_data_mut(phi).unwrap().set_link(latch, next);

        let mut ctx = LoweringContext::new(&f);
        // Stand-in terminators: in a real lowering walk these would be the
        // `jmp`/`ret` that `lower::inst` records via `set_terminator`.
        ctx.vreg_of(init);
        ctx.vreg_of(next);
        let entry_term = ctx.stream.append(AsmOpcode::Jmp, None, [None, None, None], None);
        ctx.set_terminator(entry, entry_term);
        let latch_term = ctx.stream.append(AsmOpcode::Jmp, None, [None, None, None], None);
        ctx.set_terminator(latch, latch_term);

        resolve_phis(&mut ctx);

        let insts: Vec<_> = ctx.stream.iter().collect();
        let entry_term_pos = insts.iter().position(|&id| id == entry_term).unwrap();
        let latch_term_pos = insts.iter().position(|&id| id == latch_term).unwrap();
        assert_eq!(ctx.stream.inst(insts[entry_term_pos - 1]).opcode, AsmOpcode::Phi);
        assert_eq!(ctx.stream.inst(insts[latch_term_pos - 1]).opcode, AsmOpcode::Phi);
    }

    #[test]
    fn phi_output_kind_resolves_from_source() {
        let mut f = Function::new("f", Signature::default());
        let entry = f.create_block();
        let header = f.create_block();
        let init = f.append_inst(entry, InstData::IntConst { width: IntWidth::W32, value: 7 });
        let phi = f.append_phi(header);
        f.phi_data_mut(phi).unwrap().set_link(entry, init);

        let mut ctx = LoweringContext::new(&f);
        let output = ctx.vreg_of(phi);
        assert!(ctx.vregs.is_unspecified(output));
        let term = ctx.stream.append(AsmOpcode::Ret, None, [None, None, None], None);
        ctx.set_terminator(entry, term);

        resolve_phis(&mut ctx);

        assert!(!ctx.vregs.is_unspecified(output));
    }
}
