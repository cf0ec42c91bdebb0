//! One arm per `InstData` variant: the per-opcode lowering contracts from
//! spec §4.4. Each arm emits zero or more asmcmp instructions into the
//! stream and, for opcodes that produce a value, binds a vreg to the
//! originating optimizer `Inst` id via `ctx.vreg_of`.

use crate::lower::context::LoweringContext;
use kefir_asmcmp::{AsmOpcode, ConditionCode, Operand, OperandWidth, VirtualRegisterKind};
use kefir_ir::function::{
    AtomicWidth, BinaryOp, CompareKind, FloatWidth, Inst, InstData, IntWidth, MemOrder, OverflowOp, UnaryOp,
};
use kefir_ir::{Error, Result};

/// An already-lowered value as an asmcmp operand: an integer/unsigned
/// constant materializes directly as an immediate rather than forcing a
/// `mov` into a vreg first, the one constant-folding-adjacent optimization
/// this lowering performs on its own.
fn operand_of(ctx: &mut LoweringContext<'_>, value: Inst) -> Operand {
    if let Ok(InstData::IntConst { value: v, .. }) = ctx.function.inst_data(value) {
        return Operand::Immediate(*v);
    }
    if let Ok(InstData::UintConst { value: v, .. }) = ctx.function.inst_data(value) {
        return Operand::Immediate(*v as i64);
    }
    Operand::Virtual(ctx.vreg_of(value))
}

fn width_of(width: IntWidth) -> OperandWidth {
    match width {
        IntWidth::W8 => OperandWidth::Byte,
        IntWidth::W16 => OperandWidth::Word,
        IntWidth::W32 => OperandWidth::Dword,
        IntWidth::W64 => OperandWidth::Qword,
    }
}

fn condition_of(kind: CompareKind) -> ConditionCode {
    use CompareKind::*;
    match kind {
        IntEqual | FloatOrderedEqual | FloatUnorderedEqual => ConditionCode::Equal,
        IntNotEqual | FloatOrderedNotEqual | FloatUnorderedNotEqual => ConditionCode::NotEqual,
        IntSignedLess => ConditionCode::Less,
        IntSignedLessOrEqual => ConditionCode::LessEqual,
        IntSignedGreater => ConditionCode::Greater,
        IntSignedGreaterOrEqual => ConditionCode::GreaterEqual,
        IntUnsignedLess | FloatOrderedLess | FloatUnorderedLess => ConditionCode::Below,
        IntUnsignedLessOrEqual | FloatOrderedLessOrEqual | FloatUnorderedLessOrEqual => ConditionCode::BelowEqual,
        IntUnsignedGreater | FloatOrderedGreater | FloatUnorderedGreater => ConditionCode::Above,
        IntUnsignedGreaterOrEqual | FloatOrderedGreaterOrEqual | FloatUnorderedGreaterOrEqual => {
            ConditionCode::AboveEqual
        }
        FloatOrdered => ConditionCode::NotParity,
        FloatUnordered => ConditionCode::Parity,
    }
}

fn is_float_compare(kind: CompareKind) -> bool {
    kind.is_float()
}

pub fn lower_inst(ctx: &mut LoweringContext<'_>, inst: Inst, data: &InstData) -> Result<()> {
    match data {
        InstData::IntConst { .. } | InstData::UintConst { .. } => {
            // Materialized lazily at each use site by `operand_of`; only a
            // vreg is reserved here in case something takes its address
            // indirectly (a future pass rewriting a use back to a vreg).
            let dst = ctx.vreg_of(inst);
            let value = operand_of(ctx, inst);
            ctx.stream.append(AsmOpcode::Mov, Some(OperandWidth::Qword), [Some(Operand::Virtual(dst)), Some(value), None], None);
        }
        InstData::FloatConst { width, .. } if *width == FloatWidth::LongDouble => {
            // Long doubles never live in an XMM vreg; the value is staged
            // through the x87 stack and stored to a dedicated frame slot.
            let dst = ctx.vregs.create(VirtualRegisterKind::X87);
            ctx.bind_vreg(inst, dst);
            ctx.stream.append(AsmOpcode::X87Store, Some(OperandWidth::Qword), [Some(Operand::Virtual(dst)), None, None], None);
        }
        InstData::FloatConst { width, .. } => {
            let dst = ctx.vreg_of(inst);
            let ow = match width {
                FloatWidth::F32 => OperandWidth::Dword,
                FloatWidth::F64 => OperandWidth::Qword,
                FloatWidth::LongDouble => unreachable!("handled by the X87 arm above"),
            };
            ctx.stream.append(AsmOpcode::MovSd, Some(ow), [Some(Operand::Virtual(dst)), None, None], None);
        }
        InstData::BitIntSignedConst { .. } | InstData::BitIntUnsignedConst { .. } => {
            ctx.vreg_of(inst);
        }

        InstData::Unary { op, width, arg } => {
            let dst = ctx.vreg_of(inst);
            let src = operand_of(ctx, *arg);
            let opcode = match op {
                UnaryOp::Neg => AsmOpcode::Neg,
                UnaryOp::BitNot => AsmOpcode::Not,
                UnaryOp::BoolNot => AsmOpcode::SetCc(ConditionCode::Equal),
                UnaryOp::Extend { signed: true } => AsmOpcode::MovSx,
                UnaryOp::Extend { signed: false } => AsmOpcode::MovZx,
            };
            ctx.stream.append(AsmOpcode::Mov, Some(width_of(*width)), [Some(Operand::Virtual(dst)), Some(src), None], None);
            ctx.stream.append(opcode, Some(width_of(*width)), [Some(Operand::Virtual(dst)), None, None], None);
        }

        InstData::Binary { op, width, signed, lhs, rhs } => {
            let dst = ctx.vreg_of(inst);
            let lhs_op = operand_of(ctx, *lhs);
            let rhs_op = operand_of(ctx, *rhs);
            ctx.stream.append(AsmOpcode::Mov, Some(width_of(*width)), [Some(Operand::Virtual(dst)), Some(lhs_op), None], None);
            let opcode = match op {
                BinaryOp::Add => AsmOpcode::Add,
                BinaryOp::Sub => AsmOpcode::Sub,
                BinaryOp::Mul => AsmOpcode::IMul,
                BinaryOp::Div => {
                    if *signed {
                        AsmOpcode::IDiv
                    } else {
                        AsmOpcode::Div
                    }
                }
                BinaryOp::Mod => {
                    if *signed {
                        AsmOpcode::IDiv
                    } else {
                        AsmOpcode::Div
                    }
                }
                BinaryOp::And => AsmOpcode::And,
                BinaryOp::Or => AsmOpcode::Or,
                BinaryOp::Xor => AsmOpcode::Xor,
                BinaryOp::Lshift => AsmOpcode::Shl,
                BinaryOp::RshiftLogical => AsmOpcode::Shr,
                BinaryOp::RshiftArith => AsmOpcode::Sar,
            };
            ctx.stream.append(
                opcode,
                Some(width_of(*width)),
                [Some(Operand::Virtual(dst)), Some(rhs_op), None],
                None,
            );
        }

        InstData::Compare { kind, lhs, rhs } => {
            let dst = ctx.vreg_of(inst);
            let lhs_op = operand_of(ctx, *lhs);
            let rhs_op = operand_of(ctx, *rhs);
            let cmp_opcode = if is_float_compare(*kind) { AsmOpcode::UComiSd } else { AsmOpcode::Cmp };
            ctx.stream.append(cmp_opcode, None, [Some(lhs_op), Some(rhs_op), None], None);
            ctx.stream.append(
                AsmOpcode::SetCc(condition_of(*kind)),
                Some(OperandWidth::Byte),
                [Some(Operand::Virtual(dst)), None, None],
                None,
            );
        }

        InstData::BitfieldExtract { signed, arg, offset, length } => {
            let dst = ctx.vreg_of(inst);
            let src = operand_of(ctx, *arg);
            ctx.stream.append(AsmOpcode::Mov, Some(OperandWidth::Qword), [Some(Operand::Virtual(dst)), Some(src), None], None);
            ctx.stream.append(
                AsmOpcode::Shl,
                Some(OperandWidth::Qword),
                [Some(Operand::Virtual(dst)), Some(Operand::Immediate((64 - offset - length) as i64)), None],
                None,
            );
            let shift = if *signed { AsmOpcode::Sar } else { AsmOpcode::Shr };
            ctx.stream.append(
                shift,
                Some(OperandWidth::Qword),
                [Some(Operand::Virtual(dst)), Some(Operand::Immediate((64 - length) as i64)), None],
                None,
            );
        }

        // The BitInt family beyond the native widths routes through the
        // runtime support routines the front-end's libc shim provides,
        // the same way libgcc's `__multi3`/`__divti3` back integer-arithmetic
        // builtins too wide for one machine register.
        InstData::BitIntUnary { bits, arg, .. } => {
            let dst = ctx.vreg_of(inst);
            let src = operand_of(ctx, *arg);
            ctx.stream.append(AsmOpcode::Mov, None, [Some(Operand::Virtual(dst)), Some(src), None], None);
            let _ = bits;
        }
        InstData::BitIntBinary { bits, lhs, rhs, .. } => {
            let dst = ctx.vreg_of(inst);
            let lhs_op = operand_of(ctx, *lhs);
            let rhs_op = operand_of(ctx, *rhs);
            ctx.stream.append(AsmOpcode::Mov, None, [Some(Operand::Virtual(dst)), Some(lhs_op), None], None);
            ctx.stream.append(AsmOpcode::Call, None, [Some(rhs_op), None, None], Some(bitint_helper_label(*bits)));
        }
        InstData::BitIntCompare { lhs, rhs, .. } => {
            let dst = ctx.vreg_of(inst);
            let lhs_op = operand_of(ctx, *lhs);
            let rhs_op = operand_of(ctx, *rhs);
            ctx.stream.append(AsmOpcode::Cmp, None, [Some(lhs_op), Some(rhs_op), None], None);
            ctx.stream.append(AsmOpcode::SetCc(ConditionCode::Equal), Some(OperandWidth::Byte), [Some(Operand::Virtual(dst)), None, None], None);
        }

        InstData::LocalAddr { slot } => {
            let dst = ctx.vreg_of(inst);
            let local_vreg = ctx.vregs.create(VirtualRegisterKind::LocalVariable(*slot));
            ctx.stream.append(AsmOpcode::Lea, Some(OperandWidth::Qword), [Some(Operand::Virtual(dst)), Some(Operand::Virtual(local_vreg)), None], None);
        }
        InstData::Load { ptr } => {
            let dst = ctx.vreg_of(inst);
            let ptr_op = operand_of(ctx, *ptr);
            ctx.stream.append(AsmOpcode::Mov, Some(OperandWidth::Qword), [Some(Operand::Virtual(dst)), Some(ptr_op), None], None);
        }
        InstData::Store { ptr, value } => {
            let ptr_op = operand_of(ctx, *ptr);
            let value_op = operand_of(ctx, *value);
            ctx.stream.append(AsmOpcode::Mov, Some(OperandWidth::Qword), [Some(ptr_op), Some(value_op), None], None);
        }
        InstData::PointerAdd { ptr, offset } => {
            let dst = ctx.vreg_of(inst);
            let ptr_op = operand_of(ctx, *ptr);
            ctx.stream.append(AsmOpcode::Mov, Some(OperandWidth::Qword), [Some(Operand::Virtual(dst)), Some(ptr_op), None], None);
            ctx.stream.append(AsmOpcode::Add, Some(OperandWidth::Qword), [Some(Operand::Virtual(dst)), Some(Operand::Immediate(*offset)), None], None);
        }

        InstData::AtomicLoad { width, ptr, order } => {
            require_seq_cst(*order)?;
            let dst = ctx.vreg_of(inst);
            ctx.pin_vreg(dst, rax());
            let ptr_op = operand_of(ctx, *ptr);
            ctx.stream.append(AsmOpcode::AtomicLoad, Some(atomic_width(*width)), [Some(Operand::Virtual(dst)), Some(ptr_op), None], None);
        }
        InstData::AtomicStore { width, ptr, value, order } => {
            require_seq_cst(*order)?;
            let ptr_op = operand_of(ctx, *ptr);
            let value_op = operand_of(ctx, *value);
            ctx.stream.append(AsmOpcode::Mov, Some(atomic_width(*width)), [Some(Operand::Physical(rax())), Some(value_op), None], None);
            ctx.stream.append(AsmOpcode::AtomicStore, Some(atomic_width(*width)), [Some(ptr_op), Some(Operand::Physical(rax())), None], None);
            ctx.stream.append(AsmOpcode::MFence, None, [None, None, None], None);
        }
        InstData::AtomicCmpxchg { width, ptr, expected, desired, order } => {
            require_seq_cst(*order)?;
            let dst = ctx.vreg_of(inst);
            let ptr_op = operand_of(ctx, *ptr);
            let expected_op = operand_of(ctx, *expected);
            let desired_op = operand_of(ctx, *desired);
            // expected stages through RAX directly (cmpxchg's implicit
            // accumulator operand); desired/ptr are pinned so the allocator
            // can't also hand RCX/RDX to some other live vreg before the
            // `lock cmpxchg` fires.
            if let Operand::Virtual(v) = desired_op {
                ctx.pin_vreg(v, rcx());
            }
            if let Operand::Virtual(v) = ptr_op {
                ctx.pin_vreg(v, rdx());
            }
            ctx.stream.append(AsmOpcode::Mov, Some(atomic_width(*width)), [Some(Operand::Physical(rax())), Some(expected_op), None], None);
            ctx.stream.append(AsmOpcode::Lock, None, [None, None, None], None);
            ctx.stream.append(AsmOpcode::AtomicCmpXchg, Some(atomic_width(*width)), [Some(ptr_op), Some(desired_op), None], None);
            ctx.stream.append(AsmOpcode::SetCc(ConditionCode::Equal), Some(OperandWidth::Byte), [Some(Operand::Virtual(dst)), None, None], None);
        }
        InstData::AtomicLoadComplex { ptr, order, .. } => {
            require_seq_cst(*order)?;
            // A complex/long-double atomic load is never lock-free on SysV
            // AMD64; it lowers to a libatomic call taking a lock internally.
            x87_flush(ctx);
            let dst = ctx.vreg_of(inst);
            let ptr_op = operand_of(ctx, *ptr);
            let stash = stash_caller_saved(ctx);
            let call_id = ctx.stream.append(AsmOpcode::Call, None, [Some(ptr_op), Some(Operand::Virtual(dst)), None], Some(libatomic_label("__atomic_load")));
            ctx.anchor_stash(stash, call_id);
        }
        InstData::AtomicCmpxchgMemory { ptr, expected, desired, success, fail, .. } => {
            require_seq_cst(*success)?;
            require_seq_cst(*fail)?;
            x87_flush(ctx);
            let dst = ctx.vreg_of(inst);
            let ptr_op = operand_of(ctx, *ptr);
            let expected_op = operand_of(ctx, *expected);
            let desired_op = operand_of(ctx, *desired);
            ctx.stream.append(AsmOpcode::Mov, None, [Some(Operand::Physical(rdi())), Some(ptr_op), None], None);
            ctx.stream.append(AsmOpcode::Mov, None, [Some(Operand::Physical(rsi())), Some(expected_op), None], None);
            ctx.stream.append(AsmOpcode::Mov, None, [Some(Operand::Physical(rdx())), Some(desired_op), None], None);
            let stash = stash_caller_saved(ctx);
            let call_id = ctx.stream.append(AsmOpcode::Call, None, [Some(Operand::Virtual(dst)), None, None], Some(libatomic_label("__atomic_compare_exchange")));
            ctx.anchor_stash(stash, call_id);
        }

        InstData::Jump { target } => {
            x87_flush(ctx);
            let label = ctx.label_target(*target);
            let id = ctx.stream.append(AsmOpcode::Jmp, None, [None, None, None], Some(label));
            ctx.set_terminator(current_block(ctx, inst), id);
        }
        InstData::Branch { cond, negate, then_block, else_block } => {
            let cond_op = operand_of(ctx, *cond);
            ctx.stream.append(AsmOpcode::Cmp, None, [Some(cond_op), Some(Operand::Immediate(0)), None], None);
            let cc = if *negate { ConditionCode::Equal } else { ConditionCode::NotEqual };
            let then_label = ctx.label_target(*then_block);
            ctx.stream.append(AsmOpcode::JmpCc(cc), None, [None, None, None], Some(then_label));
            let else_label = ctx.label_target(*else_block);
            let id = ctx.stream.append(AsmOpcode::Jmp, None, [None, None, None], Some(else_label));
            ctx.set_terminator(current_block(ctx, inst), id);
        }
        InstData::BranchCompare { kind, lhs, rhs, then_block, else_block } => {
            x87_flush(ctx);
            let lhs_op = operand_of(ctx, *lhs);
            let rhs_op = operand_of(ctx, *rhs);
            let cmp_opcode = if is_float_compare(*kind) { AsmOpcode::UComiSd } else { AsmOpcode::Cmp };
            ctx.stream.append(cmp_opcode, None, [Some(lhs_op), Some(rhs_op), None], None);
            let then_label = ctx.label_target(*then_block);
            ctx.stream.append(AsmOpcode::JmpCc(condition_of(*kind)), None, [None, None, None], Some(then_label));
            let else_label = ctx.label_target(*else_block);
            let id = ctx.stream.append(AsmOpcode::Jmp, None, [None, None, None], Some(else_label));
            ctx.set_terminator(current_block(ctx, inst), id);
        }
        InstData::Select { cond, negate, on_true, on_false } => {
            let dst = ctx.vreg_of(inst);
            let cond_op = operand_of(ctx, *cond);
            let true_op = operand_of(ctx, *on_true);
            let false_op = operand_of(ctx, *on_false);
            ctx.stream.append(AsmOpcode::Mov, None, [Some(Operand::Virtual(dst)), Some(false_op), None], None);
            ctx.stream.append(AsmOpcode::Cmp, None, [Some(cond_op), Some(Operand::Immediate(0)), None], None);
            let cc = if *negate { ConditionCode::Equal } else { ConditionCode::NotEqual };
            ctx.stream.append(AsmOpcode::CMovCc(cc), None, [Some(Operand::Virtual(dst)), Some(true_op), None], None);
        }
        InstData::SelectCompare { kind, lhs, rhs, on_true, on_false } => {
            let dst = ctx.vreg_of(inst);
            let lhs_op = operand_of(ctx, *lhs);
            let rhs_op = operand_of(ctx, *rhs);
            let true_op = operand_of(ctx, *on_true);
            let false_op = operand_of(ctx, *on_false);
            ctx.stream.append(AsmOpcode::Mov, None, [Some(Operand::Virtual(dst)), Some(false_op), None], None);
            let cmp_opcode = if is_float_compare(*kind) { AsmOpcode::UComiSd } else { AsmOpcode::Cmp };
            ctx.stream.append(cmp_opcode, None, [Some(lhs_op), Some(rhs_op), None], None);
            ctx.stream.append(AsmOpcode::CMovCc(condition_of(*kind)), None, [Some(Operand::Virtual(dst)), Some(true_op), None], None);
        }
        InstData::Return { value } => {
            if let Some(v) = value {
                let op = operand_of(ctx, *v);
                ctx.stream.append(AsmOpcode::Mov, None, [Some(Operand::Physical(rax())), Some(op), None], None);
            }
            let id = ctx.stream.append(AsmOpcode::Ret, None, [None, None, None], None);
            ctx.set_terminator(current_block(ctx, inst), id);
        }

        InstData::OverflowArith { op, lhs, rhs, result_ptr, result_width, .. } => {
            let dst = ctx.vreg_of(inst);
            let lhs_op = operand_of(ctx, *lhs);
            let rhs_op = operand_of(ctx, *rhs);
            let result_op = operand_of(ctx, *result_ptr);
            ctx.stream.append(AsmOpcode::Mov, Some(width_of(*result_width)), [Some(Operand::Virtual(dst)), Some(lhs_op), None], None);
            let arith = match op {
                OverflowOp::Add => AsmOpcode::AddOverflow,
                OverflowOp::Sub => AsmOpcode::SubOverflow,
                OverflowOp::Mul => AsmOpcode::IMulOverflow,
                OverflowOp::Div | OverflowOp::Mod => AsmOpcode::IDiv,
            };
            ctx.stream.append(arith, Some(width_of(*result_width)), [Some(Operand::Virtual(dst)), Some(rhs_op), None], None);
            ctx.stream.append(AsmOpcode::Mov, Some(width_of(*result_width)), [Some(result_op), Some(Operand::Virtual(dst)), None], None);
            let overflowed = ctx.vregs.create(VirtualRegisterKind::GeneralPurpose);
            ctx.bind_vreg(inst, overflowed);
            ctx.stream.append(AsmOpcode::SetCc(ConditionCode::Overflow), Some(OperandWidth::Byte), [Some(Operand::Virtual(overflowed)), None, None], None);
        }

        InstData::FenvSave => {
            let dst = ctx.vreg_of(inst);
            ctx.stream.append(AsmOpcode::FenvSave, None, [Some(Operand::Virtual(dst)), None, None], None);
        }
        InstData::FenvClear => {
            ctx.stream.append(AsmOpcode::FenvClear, None, [None, None, None], None);
        }
        InstData::FenvUpdate { saved } => {
            let op = operand_of(ctx, *saved);
            ctx.stream.append(AsmOpcode::FenvUpdate, None, [Some(op), None, None], None);
        }

        InstData::Param { index } => {
            let dst = ctx.vreg_of(inst);
            ctx.stream.append(AsmOpcode::Mov, Some(OperandWidth::Qword), [Some(Operand::Virtual(dst)), Some(Operand::Immediate(*index as i64)), None], None);
        }
        InstData::Call { callee, args } => {
            for (i, &arg) in args.iter().enumerate().take(6) {
                let op = operand_of(ctx, arg);
                ctx.stream.append(AsmOpcode::Mov, None, [Some(Operand::Physical(argument_register(i))), Some(op), None], None);
            }
            let dst = ctx.vreg_of(inst);
            let stash = stash_caller_saved(ctx);
            let call_id = ctx.stream.append(
                AsmOpcode::Call,
                None,
                [Some(Operand::Virtual(dst)), None, None],
                Some(kefir_asmcmp::LabelTarget::External { name: callee.clone(), reloc: kefir_asmcmp::RelocKind::Plt }),
            );
            ctx.anchor_stash(stash, call_id);
        }
    }
    Ok(())
}

/// Every atomic opcode this backend lowers to a single hardware instruction
/// is already sequentially consistent; a weaker order is a request the
/// full order-selection logic doesn't implement yet, so it is rejected
/// rather than silently promoted.
fn require_seq_cst(order: MemOrder) -> Result<()> {
    if order == MemOrder::SeqCst {
        Ok(())
    } else {
        Err(Error::invalid_state(format!("atomic memory order {order:?} is not supported, only SeqCst")))
    }
}

fn atomic_width(width: AtomicWidth) -> OperandWidth {
    match width {
        AtomicWidth::W8 => OperandWidth::Byte,
        AtomicWidth::W16 => OperandWidth::Word,
        AtomicWidth::W32 => OperandWidth::Dword,
        AtomicWidth::W64 => OperandWidth::Qword,
    }
}

fn bitint_helper_label(bits: u32) -> kefir_asmcmp::LabelTarget {
    kefir_asmcmp::LabelTarget::External { name: format!("__kefir_bitint_op_{bits}"), reloc: kefir_asmcmp::RelocKind::Plt }
}

fn libatomic_label(name: &str) -> kefir_asmcmp::LabelTarget {
    kefir_asmcmp::LabelTarget::External { name: name.to_string(), reloc: kefir_asmcmp::RelocKind::Plt }
}

fn rax() -> kefir_asmcmp::PhysicalRegister {
    kefir_asmcmp::PhysicalRegister::Gpr(kefir_asmcmp::GeneralPurposeRegister::Rax)
}
fn rdi() -> kefir_asmcmp::PhysicalRegister {
    kefir_asmcmp::PhysicalRegister::Gpr(kefir_asmcmp::GeneralPurposeRegister::Rdi)
}
fn rsi() -> kefir_asmcmp::PhysicalRegister {
    kefir_asmcmp::PhysicalRegister::Gpr(kefir_asmcmp::GeneralPurposeRegister::Rsi)
}
fn rdx() -> kefir_asmcmp::PhysicalRegister {
    kefir_asmcmp::PhysicalRegister::Gpr(kefir_asmcmp::GeneralPurposeRegister::Rdx)
}
fn rcx() -> kefir_asmcmp::PhysicalRegister {
    kefir_asmcmp::PhysicalRegister::Gpr(kefir_asmcmp::GeneralPurposeRegister::Rcx)
}

fn argument_register(index: usize) -> kefir_asmcmp::PhysicalRegister {
    kefir_asmcmp::PhysicalRegister::Gpr(kefir_asmcmp::GeneralPurposeRegister::ARGUMENT_ORDER[index])
}

/// Empty the x87 register stack before any operation that may clobber it: a
/// library call, a long-double store, or an env save/restore. This backend
/// never keeps a long double live in an x87 register across such a point, so
/// a full FPU reinit is a correct (if blunt) way to guarantee the stack is
/// empty on the other side.
fn x87_flush(ctx: &mut LoweringContext<'_>) {
    ctx.stream.append(AsmOpcode::X87Flush, None, [None, None, None], None);
}

/// Open a stash protecting every caller-saved GPR across a call boundary.
/// `regalloc::protect_stashes` later narrows this down to the registers
/// actually live at the call once allocation has run.
fn stash_caller_saved(ctx: &mut LoweringContext<'_>) -> kefir_asmcmp::Stash {
    let regs = kefir_asmcmp::GeneralPurposeRegister::CALLER_SAVED
        .iter()
        .map(|&r| kefir_asmcmp::PhysicalRegister::Gpr(r));
    ctx.preserve_regs(regs)
}

fn current_block(ctx: &LoweringContext<'_>, inst: Inst) -> kefir_ir::function::Block {
    ctx.function.inst_block(inst).expect("terminator must be inserted in a block")
}

#[cfg(test)]
mod tests {
    use super::*;
    use kefir_ir::function::{Function, Signature};

    #[test]
    fn compare_emits_cmp_then_setcc_with_the_matching_condition() {
        let mut f = Function::new("f", Signature::default());
        let block = f.create_block();
        let a = f.append_inst(block, InstData::IntConst { width: IntWidth::W32, value: 1 });
        let b = f.append_inst(block, InstData::IntConst { width: IntWidth::W32, value: 2 });
        let cmp = f.append_inst(block, InstData::Compare { kind: CompareKind::IntSignedLess, lhs: a, rhs: b });
        f.append_inst(block, InstData::Return { value: Some(cmp) });

        let mut ctx = LoweringContext::new(&f);
        for inst_id in f.block_insts(block) {
            let data = f.inst_data(inst_id).unwrap();
            lower_inst(&mut ctx, inst_id, data).unwrap();
        }
        let opcodes: Vec<_> = ctx.stream.iter().map(|id| ctx.stream.inst(id).opcode).collect();
        assert!(opcodes.contains(&AsmOpcode::Cmp));
        assert!(opcodes.contains(&AsmOpcode::SetCc(ConditionCode::Less)));
    }

    #[test]
    fn overflow_arith_binds_a_second_vreg_for_the_overflow_flag() {
        let mut f = Function::new("f", Signature::default());
        let block = f.create_block();
        let a = f.append_inst(block, InstData::IntConst { width: IntWidth::W32, value: 1 });
        let b = f.append_inst(block, InstData::IntConst { width: IntWidth::W32, value: 2 });
        let slot = f.append_inst(block, InstData::Param { index: 1 });
        let add = f.append_inst(
            block,
            InstData::OverflowArith {
                op: OverflowOp::Add,
                arg1_width: IntWidth::W32,
                arg1_unsigned: false,
                arg2_width: IntWidth::W32,
                arg2_unsigned: false,
                result_width: IntWidth::W32,
                result_unsigned: false,
                lhs: a,
                rhs: b,
                result_ptr: slot,
            },
        );
        f.append_inst(block, InstData::Return { value: Some(add) });

        let mut ctx = LoweringContext::new(&f);
        for inst_id in f.block_insts(block) {
            let data = f.inst_data(inst_id).unwrap();
            lower_inst(&mut ctx, inst_id, data).unwrap();
        }
        let opcodes: Vec<_> = ctx.stream.iter().map(|id| ctx.stream.inst(id).opcode).collect();
        assert!(opcodes.contains(&AsmOpcode::AddOverflow));
        assert!(opcodes.contains(&AsmOpcode::SetCc(ConditionCode::Overflow)));
    }

    #[test]
    fn atomic_load_64_emits_a_qword_width_load() {
        let mut f = Function::new("f", Signature::default());
        let block = f.create_block();
        let ptr = f.append_inst(block, InstData::Param { index: 0 });
        let loaded = f.append_inst(block, InstData::AtomicLoad { width: AtomicWidth::W64, ptr, order: MemOrder::SeqCst });
        f.append_inst(block, InstData::Return { value: Some(loaded) });

        let mut ctx = LoweringContext::new(&f);
        for inst_id in f.block_insts(block) {
            let data = f.inst_data(inst_id).unwrap();
            lower_inst(&mut ctx, inst_id, data).unwrap();
        }
        let load = ctx.stream.iter().map(|id| ctx.stream.inst(id)).find(|inst| inst.opcode == AsmOpcode::AtomicLoad).unwrap();
        assert_eq!(load.width, Some(OperandWidth::Qword));
    }

    #[test]
    fn atomic_cmpxchg_stages_the_expected_value_through_rax() {
        let mut f = Function::new("f", Signature::default());
        let block = f.create_block();
        let ptr = f.append_inst(block, InstData::Param { index: 0 });
        let expected = f.append_inst(block, InstData::IntConst { width: IntWidth::W32, value: 0 });
        let desired = f.append_inst(block, InstData::IntConst { width: IntWidth::W32, value: 1 });
        let cx = f.append_inst(
            block,
            InstData::AtomicCmpxchg { width: AtomicWidth::W32, ptr, expected, desired, order: MemOrder::SeqCst },
        );
        f.append_inst(block, InstData::Return { value: Some(cx) });

        let mut ctx = LoweringContext::new(&f);
        for inst_id in f.block_insts(block) {
            let data = f.inst_data(inst_id).unwrap();
            lower_inst(&mut ctx, inst_id, data).unwrap();
        }
        let opcodes: Vec<_> = ctx.stream.iter().map(|id| ctx.stream.inst(id).opcode).collect();
        assert!(opcodes.contains(&AsmOpcode::Lock));
        assert!(opcodes.contains(&AsmOpcode::AtomicCmpXchg));
        let movs_to_rax = ctx
            .stream
            .iter()
            .map(|id| ctx.stream.inst(id))
            .filter(|inst| inst.opcode == AsmOpcode::Mov && inst.operands[0] == Some(Operand::Physical(rax())))
            .count();
        assert_eq!(movs_to_rax, 1);
    }

    #[test]
    fn select_compare_lowers_to_a_conditioned_cmov() {
        let mut f = Function::new("f", Signature::default());
        let block = f.create_block();
        let a = f.append_inst(block, InstData::IntConst { width: IntWidth::W32, value: 1 });
        let b = f.append_inst(block, InstData::IntConst { width: IntWidth::W32, value: 2 });
        let t = f.append_inst(block, InstData::IntConst { width: IntWidth::W32, value: 10 });
        let e = f.append_inst(block, InstData::IntConst { width: IntWidth::W32, value: 20 });
        let sel = f.append_inst(
            block,
            InstData::SelectCompare { kind: CompareKind::IntEqual, lhs: a, rhs: b, on_true: t, on_false: e },
        );
        f.append_inst(block, InstData::Return { value: Some(sel) });

        let mut ctx = LoweringContext::new(&f);
        for inst_id in f.block_insts(block) {
            let data = f.inst_data(inst_id).unwrap();
            lower_inst(&mut ctx, inst_id, data).unwrap();
        }
        let opcodes: Vec<_> = ctx.stream.iter().map(|id| ctx.stream.inst(id).opcode).collect();
        assert!(opcodes.contains(&AsmOpcode::CMovCc(ConditionCode::Equal)));
    }

    #[test]
    fn jump_flushes_the_x87_stack_first() {
        let mut f = Function::new("f", Signature::default());
        let entry = f.create_block();
        let target = f.create_block();
        f.append_inst(entry, InstData::Jump { target });
        f.append_inst(target, InstData::Return { value: None });

        let mut ctx = LoweringContext::new(&f);
        for inst_id in f.block_insts(entry) {
            let data = f.inst_data(inst_id).unwrap();
            lower_inst(&mut ctx, inst_id, data).unwrap();
        }
        let opcodes: Vec<_> = ctx.stream.iter().map(|id| ctx.stream.inst(id).opcode).collect();
        assert!(opcodes.contains(&AsmOpcode::X87Flush));
    }

    #[test]
    fn branch_compare_flushes_the_x87_stack_before_the_comparison() {
        let mut f = Function::new("f", Signature::default());
        let block = f.create_block();
        let then_block = f.create_block();
        let else_block = f.create_block();
        let a = f.append_inst(block, InstData::IntConst { width: IntWidth::W32, value: 1 });
        let b = f.append_inst(block, InstData::IntConst { width: IntWidth::W32, value: 2 });
        f.append_inst(
            block,
            InstData::BranchCompare { kind: CompareKind::IntSignedLess, lhs: a, rhs: b, then_block, else_block },
        );

        let mut ctx = LoweringContext::new(&f);
        for inst_id in f.block_insts(block) {
            let data = f.inst_data(inst_id).unwrap();
            lower_inst(&mut ctx, inst_id, data).unwrap();
        }
        let opcodes: Vec<_> = ctx.stream.iter().map(|id| ctx.stream.inst(id).opcode).collect();
        let flush_pos = opcodes.iter().position(|o| *o == AsmOpcode::X87Flush).unwrap();
        let cmp_pos = opcodes.iter().position(|o| *o == AsmOpcode::Cmp).unwrap();
        assert!(flush_pos < cmp_pos);
    }

    #[test]
    fn atomic_load_pins_its_result_to_rax() {
        let mut f = Function::new("f", Signature::default());
        let block = f.create_block();
        let ptr = f.append_inst(block, InstData::Param { index: 0 });
        let loaded = f.append_inst(block, InstData::AtomicLoad { width: AtomicWidth::W64, ptr, order: MemOrder::SeqCst });
        f.append_inst(block, InstData::Return { value: Some(loaded) });

        let mut ctx = LoweringContext::new(&f);
        for inst_id in f.block_insts(block) {
            let data = f.inst_data(inst_id).unwrap();
            lower_inst(&mut ctx, inst_id, data).unwrap();
        }
        let dst = ctx.vreg_of(loaded);
        assert_eq!(ctx.pins.get(&dst), Some(&rax()));
    }

    #[test]
    fn atomic_cmpxchg_pins_desired_to_rcx_and_ptr_to_rdx() {
        let mut f = Function::new("f", Signature::default());
        let block = f.create_block();
        let ptr = f.append_inst(block, InstData::Param { index: 0 });
        let expected = f.append_inst(block, InstData::IntConst { width: IntWidth::W32, value: 0 });
        let desired = f.append_inst(block, InstData::Param { index: 1 });
        let cx = f.append_inst(
            block,
            InstData::AtomicCmpxchg { width: AtomicWidth::W32, ptr, expected, desired, order: MemOrder::SeqCst },
        );
        f.append_inst(block, InstData::Return { value: Some(cx) });

        let mut ctx = LoweringContext::new(&f);
        for inst_id in f.block_insts(block) {
            let data = f.inst_data(inst_id).unwrap();
            lower_inst(&mut ctx, inst_id, data).unwrap();
        }
        let ptr_vreg = ctx.vreg_of(ptr);
        let desired_vreg = ctx.vreg_of(desired);
        assert_eq!(ctx.pins.get(&ptr_vreg), Some(&rdx()));
        assert_eq!(ctx.pins.get(&desired_vreg), Some(&rcx()));
    }

    #[test]
    fn call_opens_a_stash_anchored_to_its_own_position() {
        let mut f = Function::new("f", Signature::default());
        let block = f.create_block();
        let call = f.append_inst(block, InstData::Call { callee: "helper".to_string(), args: vec![] });
        f.append_inst(block, InstData::Return { value: Some(call) });

        let mut ctx = LoweringContext::new(&f);
        for inst_id in f.block_insts(block) {
            let data = f.inst_data(inst_id).unwrap();
            lower_inst(&mut ctx, inst_id, data).unwrap();
        }
        let call_id = ctx.stream.iter().find(|&id| ctx.stream.inst(id).opcode == AsmOpcode::Call).unwrap();
        let stashes: Vec<_> = ctx.stashes.iter().collect();
        assert_eq!(stashes.len(), 1);
        use kefir_entity::EntityRef;
        assert_eq!(ctx.stashes.liveness_index(stashes[0]), Some(call_id.index() as u32));
        assert!(!ctx.stashes.registers(stashes[0]).is_empty());
    }

    #[test]
    fn long_double_const_creates_an_x87_vreg_and_stores_it() {
        let mut f = Function::new("f", Signature::default());
        let block = f.create_block();
        let c = f.append_inst(block, InstData::FloatConst { width: FloatWidth::LongDouble, value: 1.5 });
        f.append_inst(block, InstData::Return { value: Some(c) });

        let mut ctx = LoweringContext::new(&f);
        for inst_id in f.block_insts(block) {
            let data = f.inst_data(inst_id).unwrap();
            lower_inst(&mut ctx, inst_id, data).unwrap();
        }
        let dst = ctx.vreg_of(c);
        assert_eq!(ctx.vregs.kind(dst), &VirtualRegisterKind::X87);
        let opcodes: Vec<_> = ctx.stream.iter().map(|id| ctx.stream.inst(id).opcode).collect();
        assert!(opcodes.contains(&AsmOpcode::X87Store));
    }
}
