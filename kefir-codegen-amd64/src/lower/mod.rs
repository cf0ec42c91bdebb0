//! Lowers one optimizer IR function into an asmcmp `Stream`: a forward walk
//! over every block in schedule order emitting one or more asmcmp
//! instructions per `InstData`, followed by the φ-output resolution pass
//! (§4.5) once every value in the function has a concrete vreg.

pub mod context;
mod inst;
mod phi;

use context::LoweringContext;
use kefir_ir::function::Function;
use kefir_ir::Result;
use kefir_opt::schedule::compute_schedule;

pub fn lower_function(function: &Function) -> Result<LoweringContext<'_>> {
    let mut ctx = LoweringContext::new(function);
    let schedule = compute_schedule(function);
    for &block in schedule.order() {
        // A block-entry label is attached to a placeholder nop rather than
        // folded into the first real instruction: the first instruction of a
        // block may later be dropped (a trivial mov a peephole pass elides),
        // which would otherwise orphan the label.
        let label = ctx.label_target(block);
        ctx.stream.append(kefir_asmcmp::AsmOpcode::Nop, None, [None, None, None], Some(label));

        for phi in function.block_phis(block) {
            ctx.vreg_of(*phi);
        }
        for inst_id in function.block_insts(block) {
            if let Ok(data) = function.inst_data(inst_id) {
                inst::lower_inst(&mut ctx, inst_id, data)?;
            }
        }
    }
    phi::resolve_phis(&mut ctx);
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kefir_asmcmp::AsmOpcode;
    use kefir_ir::function::{BinaryOp, InstData, IntWidth, Signature};

    #[test]
    fn lowers_constant_add_and_return() {
        let mut f = Function::new("f", Signature::default());
        let block = f.create_block();
        let a = f.append_inst(block, InstData::IntConst { width: IntWidth::W32, value: 2 });
        let b = f.append_inst(block, InstData::IntConst { width: IntWidth::W32, value: 40 });
        let sum = f.append_inst(
            block,
            InstData::Binary { op: BinaryOp::Add, width: IntWidth::W32, signed: true, lhs: a, rhs: b },
        );
        f.append_inst(block, InstData::Return { value: Some(sum) });

        let ctx = lower_function(&f).unwrap();
        let opcodes: Vec<_> = ctx.stream.iter().map(|id| ctx.stream.inst(id).opcode).collect();
        assert!(opcodes.contains(&AsmOpcode::Add));
        assert!(opcodes.contains(&AsmOpcode::Ret));
    }

    #[test]
    fn every_block_gets_a_label_carrying_nop() {
        let mut f = Function::new("f", Signature::default());
        let entry = f.create_block();
        let other = f.create_block();
        f.append_inst(entry, InstData::Return { value: None });
        f.append_inst(other, InstData::Return { value: None });

        let ctx = lower_function(&f).unwrap();
        let nop_count = ctx.stream.iter().filter(|&id| ctx.stream.inst(id).opcode == AsmOpcode::Nop).count();
        assert_eq!(nop_count, 2);
    }

    #[test]
    fn rejects_non_seq_cst_atomic_order() {
        use kefir_ir::function::{AtomicWidth, MemOrder};
        let mut f = Function::new("f", Signature::default());
        let block = f.create_block();
        let ptr = f.append_inst(block, InstData::Param { index: 0 });
        f.append_inst(block, InstData::AtomicLoad { width: AtomicWidth::W64, ptr, order: MemOrder::Relaxed });
        f.append_inst(block, InstData::Return { value: None });

        assert!(lower_function(&f).is_err());
    }
}
