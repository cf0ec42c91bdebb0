//! The assembly text printer. Three syntax dialects share one opcode-naming
//! table and differ only in operand order and decoration: AT&T puts the
//! destination last and prefixes registers/immediates (`%rax`, `$5`); both
//! Intel dialects put it first and need no prefix on the mnemonic, differing
//! only in whether register names themselves carry a `%`-less or decorated
//! form (kept identical here — the distinction historically matters for
//! segment-override syntax, which this backend never emits).

use crate::frame::StackFrame;
use kefir_asmcmp::{GeneralPurposeRegister, MemoryRef, Operand, PhysicalRegister, Stream, XmmRegister};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Syntax {
    IntelNoPrefix,
    IntelPrefix,
    AttPrefix,
}

pub fn emit(stream: &Stream, frame: &StackFrame, function_name: &str, syntax: Syntax) -> String {
    let mut out = String::new();
    out.push_str(&format!(".globl {function_name}\n{function_name}:\n"));
    emit_prologue(&mut out, frame, syntax);
    for id in stream.iter() {
        let inst = stream.inst(id);
        if let Some(label) = &inst.label {
            if let kefir_asmcmp::LabelTarget::Internal(l) = label {
                if inst.opcode == kefir_asmcmp::AsmOpcode::Nop {
                    out.push_str(&format!(".L{}:\n", label_number(*l)));
                    continue;
                }
            }
        }
        if inst.opcode == kefir_asmcmp::AsmOpcode::Ret {
            emit_epilogue(&mut out, syntax);
        }
        out.push_str(&format!("\t{}\n", mnemonic_line(inst, syntax)));
    }
    out
}

fn label_number(label: kefir_asmcmp::Label) -> usize {
    use kefir_entity::EntityRef;
    label.index()
}

fn emit_prologue(out: &mut String, frame: &StackFrame, syntax: Syntax) {
    let size = frame.total_size();
    match syntax {
        Syntax::AttPrefix => {
            out.push_str("\tpushq %rbp\n\tmovq %rsp, %rbp\n");
            if size > 0 {
                out.push_str(&format!("\tsubq ${size}, %rsp\n"));
            }
        }
        Syntax::IntelNoPrefix | Syntax::IntelPrefix => {
            out.push_str("\tpush rbp\n\tmov rbp, rsp\n");
            if size > 0 {
                out.push_str(&format!("\tsub rsp, {size}\n"));
            }
        }
    }
}

/// Undoes `emit_prologue`: every prologue unconditionally pushes `rbp`
/// regardless of frame size, so every `ret` needs the matching `leave`
/// (`mov rsp, rbp; pop rbp`) first or the caller's frame and return address
/// are corrupted.
fn emit_epilogue(out: &mut String, _syntax: Syntax) {
    // `leave` has no operands, so its text is identical across all three
    // dialects this printer supports.
    out.push_str("\tleave\n");
}

fn mnemonic_line(inst: &kefir_asmcmp::AsmInst, syntax: Syntax) -> String {
    let width = inst.width.unwrap_or(kefir_asmcmp::OperandWidth::Qword);
    let name = opcode_name(inst.opcode, width, syntax);
    let operands: Vec<String> = inst.operands.iter().flatten().map(|o| operand_text(o, width, syntax)).collect();
    let operands = match syntax {
        Syntax::AttPrefix => {
            let mut rev = operands;
            rev.reverse();
            rev
        }
        _ => operands,
    };
    if operands.is_empty() {
        name
    } else {
        format!("{} {}", name, operands.join(", "))
    }
}

/// Opcodes whose AT&T form takes a `b`/`w`/`l`/`q` size suffix because their
/// operand size can't be inferred from a fixed-width register name alone
/// (e.g. an immediate-to-memory move). Conservative: applied to every
/// general-purpose arithmetic/data-movement mnemonic, skipped for opcodes
/// whose mnemonic or register operand already disambiguates size (`lea`,
/// `call`, `jmp`/`jcc`, `push`/`pop`, the SSE mnemonics, which carry their
/// own `ss`/`sd` suffix).
fn takes_att_size_suffix(opcode: kefir_asmcmp::AsmOpcode) -> bool {
    use kefir_asmcmp::AsmOpcode::*;
    matches!(
        opcode,
        Mov | Add
            | AddOverflow
            | Sub
            | SubOverflow
            | IMul
            | IMulOverflow
            | IDiv
            | Div
            | And
            | Or
            | Xor
            | Not
            | Neg
            | Shl
            | Shr
            | Sar
            | Cmp
            | Test
            | Phi
            | AtomicLoad
            | AtomicStore
            | AtomicCmpXchg
            | AtomicRmw
    )
}

fn att_size_suffix(width: kefir_asmcmp::OperandWidth) -> &'static str {
    use kefir_asmcmp::OperandWidth::*;
    match width {
        Byte => "b",
        Word => "w",
        Dword => "l",
        Qword => "q",
    }
}

fn condition_suffix(cc: kefir_asmcmp::ConditionCode) -> &'static str {
    use kefir_asmcmp::ConditionCode::*;
    match cc {
        Equal => "e",
        NotEqual => "ne",
        Less => "l",
        LessEqual => "le",
        Greater => "g",
        GreaterEqual => "ge",
        Below => "b",
        BelowEqual => "be",
        Above => "a",
        AboveEqual => "ae",
        Sign => "s",
        NotSign => "ns",
        Overflow => "o",
        NotOverflow => "no",
        Parity => "p",
        NotParity => "np",
    }
}

fn opcode_name(opcode: kefir_asmcmp::AsmOpcode, width: kefir_asmcmp::OperandWidth, syntax: Syntax) -> String {
    use kefir_asmcmp::AsmOpcode::*;
    let base = match opcode {
        Nop => "nop",
        Mov => "mov",
        MovZx => "movzx",
        MovSx => "movsx",
        Lea => "lea",
        Add | AddOverflow => "add",
        Sub | SubOverflow => "sub",
        IMul | IMulOverflow => "imul",
        IDiv => "idiv",
        Div => "div",
        And => "and",
        Or => "or",
        Xor => "xor",
        Not => "not",
        Neg => "neg",
        Shl => "shl",
        Shr => "shr",
        Sar => "sar",
        Cmp => "cmp",
        Test => "test",
        SetCc(cc) => return format!("set{}", condition_suffix(cc)),
        CMovCc(cc) => return format!("cmov{}", condition_suffix(cc)),
        Phi => "mov",
        Jmp => "jmp",
        JmpCc(cc) => return format!("j{}", condition_suffix(cc)),
        BranchCompare(cc) => return format!("j{}", condition_suffix(cc)),
        Select(cc) | SelectCompare(cc) => return format!("cmov{}", condition_suffix(cc)),
        Call => "call",
        Ret => "ret",
        Push => "push",
        Pop => "pop",
        AtomicLoad => "mov",
        AtomicStore => "xchg",
        AtomicCmpXchg => "cmpxchg",
        AtomicRmw => "xadd",
        Lock => "lock",
        MFence => "mfence",
        MovSs => "movss",
        MovSd => "movsd",
        AddSs => "addss",
        AddSd => "addsd",
        SubSs => "subss",
        SubSd => "subsd",
        MulSs => "mulss",
        MulSd => "mulsd",
        DivSs => "divss",
        DivSd => "divsd",
        UComiSs => "ucomiss",
        UComiSd => "ucomisd",
        Cvt => "cvt",
        FenvSave => "fnstenv",
        FenvClear => "fnclex",
        FenvUpdate => "fldenv",
        X87Store => "fstp",
        X87Flush => "fninit",
    };
    if syntax == Syntax::AttPrefix && takes_att_size_suffix(opcode) {
        format!("{base}{}", att_size_suffix(width))
    } else {
        base.to_string()
    }
}

fn operand_text(operand: &Operand, width: kefir_asmcmp::OperandWidth, syntax: Syntax) -> String {
    match operand {
        Operand::Immediate(v) => match syntax {
            Syntax::AttPrefix => format!("${v}"),
            _ => v.to_string(),
        },
        Operand::Physical(r) => register_text(*r, width, syntax),
        Operand::Virtual(v) => format!("%v{}", {
            use kefir_entity::EntityRef;
            v.index()
        }),
        Operand::Memory(m) => memory_text(m, syntax),
        Operand::Label(l) => label_target_text(l),
    }
}

fn register_text(reg: PhysicalRegister, width: kefir_asmcmp::OperandWidth, syntax: Syntax) -> String {
    let name = match reg {
        PhysicalRegister::Gpr(g) => gpr_name(g, width),
        PhysicalRegister::Xmm(x) => xmm_name(x),
    };
    match syntax {
        Syntax::AttPrefix => format!("%{name}"),
        _ => name.to_string(),
    }
}

fn gpr_name(reg: GeneralPurposeRegister, width: kefir_asmcmp::OperandWidth) -> &'static str {
    use kefir_asmcmp::OperandWidth::*;
    use GeneralPurposeRegister::*;
    match (reg, width) {
        (Rax, Qword) => "rax",
        (Rbx, Qword) => "rbx",
        (Rcx, Qword) => "rcx",
        (Rdx, Qword) => "rdx",
        (Rsi, Qword) => "rsi",
        (Rdi, Qword) => "rdi",
        (Rbp, Qword) => "rbp",
        (Rsp, Qword) => "rsp",
        (R8, Qword) => "r8",
        (R9, Qword) => "r9",
        (R10, Qword) => "r10",
        (R11, Qword) => "r11",
        (R12, Qword) => "r12",
        (R13, Qword) => "r13",
        (R14, Qword) => "r14",
        (R15, Qword) => "r15",

        (Rax, Dword) => "eax",
        (Rbx, Dword) => "ebx",
        (Rcx, Dword) => "ecx",
        (Rdx, Dword) => "edx",
        (Rsi, Dword) => "esi",
        (Rdi, Dword) => "edi",
        (Rbp, Dword) => "ebp",
        (Rsp, Dword) => "esp",
        (R8, Dword) => "r8d",
        (R9, Dword) => "r9d",
        (R10, Dword) => "r10d",
        (R11, Dword) => "r11d",
        (R12, Dword) => "r12d",
        (R13, Dword) => "r13d",
        (R14, Dword) => "r14d",
        (R15, Dword) => "r15d",

        (Rax, Word) => "ax",
        (Rbx, Word) => "bx",
        (Rcx, Word) => "cx",
        (Rdx, Word) => "dx",
        (Rsi, Word) => "si",
        (Rdi, Word) => "di",
        (Rbp, Word) => "bp",
        (Rsp, Word) => "sp",
        (R8, Word) => "r8w",
        (R9, Word) => "r9w",
        (R10, Word) => "r10w",
        (R11, Word) => "r11w",
        (R12, Word) => "r12w",
        (R13, Word) => "r13w",
        (R14, Word) => "r14w",
        (R15, Word) => "r15w",

        (Rax, Byte) => "al",
        (Rbx, Byte) => "bl",
        (Rcx, Byte) => "cl",
        (Rdx, Byte) => "dl",
        (Rsi, Byte) => "sil",
        (Rdi, Byte) => "dil",
        (Rbp, Byte) => "bpl",
        (Rsp, Byte) => "spl",
        (R8, Byte) => "r8b",
        (R9, Byte) => "r9b",
        (R10, Byte) => "r10b",
        (R11, Byte) => "r11b",
        (R12, Byte) => "r12b",
        (R13, Byte) => "r13b",
        (R14, Byte) => "r14b",
        (R15, Byte) => "r15b",
    }
}

fn xmm_name(reg: XmmRegister) -> &'static str {
    use XmmRegister::*;
    match reg {
        Xmm0 => "xmm0",
        Xmm1 => "xmm1",
        Xmm2 => "xmm2",
        Xmm3 => "xmm3",
        Xmm4 => "xmm4",
        Xmm5 => "xmm5",
        Xmm6 => "xmm6",
        Xmm7 => "xmm7",
        Xmm8 => "xmm8",
        Xmm9 => "xmm9",
        Xmm10 => "xmm10",
        Xmm11 => "xmm11",
        Xmm12 => "xmm12",
        Xmm13 => "xmm13",
        Xmm14 => "xmm14",
        Xmm15 => "xmm15",
    }
}

fn memory_text(mem: &MemoryRef, syntax: Syntax) -> String {
    if mem.rip_relative {
        return match syntax {
            Syntax::AttPrefix => format!("{}(%rip)", mem.disp),
            _ => format!("[rip+{}]", mem.disp),
        };
    }
    // Every `Memory` operand reaching xasmgen came from the frame
    // builder's spill/local slots, which are always relative to the frame
    // base register — the allocator never leaves a bare vreg base behind.
    let base = "rbp";
    match syntax {
        Syntax::AttPrefix => format!("{}(%{})", mem.disp, base),
        _ => format!("[{}{:+}]", base, mem.disp),
    }
}

fn label_target_text(label: &kefir_asmcmp::LabelTarget) -> String {
    match label {
        kefir_asmcmp::LabelTarget::Internal(l) => format!(".L{}", label_number(*l)),
        kefir_asmcmp::LabelTarget::External { name, .. } => name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::StackFrame;
    use kefir_asmcmp::{AsmOpcode, OperandWidth, PhysicalRegister};

    #[test]
    fn mov_immediate_to_register_and_ret() {
        let mut stream = Stream::new();
        stream.append(
            AsmOpcode::Mov,
            Some(OperandWidth::Dword),
            [Some(Operand::Physical(PhysicalRegister::Gpr(GeneralPurposeRegister::Rax))), Some(Operand::Immediate(42)), None],
            None,
        );
        stream.append(AsmOpcode::Ret, None, [None, None, None], None);
        let frame = StackFrame::new();

        let text = emit(&stream, &frame, "f", Syntax::AttPrefix);
        assert!(text.contains("movl $42, %eax"));
        assert!(text.contains("ret"));
    }

    #[test]
    fn ret_is_preceded_by_a_leave_restoring_the_callers_frame() {
        let mut stream = Stream::new();
        stream.append(AsmOpcode::Ret, None, [None, None, None], None);
        let frame = StackFrame::new();

        let text = emit(&stream, &frame, "f", Syntax::AttPrefix);
        let leave_pos = text.find("leave").expect("epilogue must emit leave");
        let ret_pos = text.find("ret").expect("ret must still be emitted");
        assert!(leave_pos < ret_pos, "leave must come before ret: {text}");
    }

    #[test]
    fn att_syntax_reverses_operand_order() {
        let mut stream = Stream::new();
        stream.append(
            AsmOpcode::Mov,
            Some(OperandWidth::Qword),
            [Some(Operand::Physical(PhysicalRegister::Gpr(GeneralPurposeRegister::Rax))), Some(Operand::Immediate(1)), None],
            None,
        );
        let frame = StackFrame::new();

        let att = emit(&stream, &frame, "f", Syntax::AttPrefix);
        let intel = emit(&stream, &frame, "f", Syntax::IntelNoPrefix);
        assert!(att.contains("movq $1, %rax"));
        assert!(intel.contains("mov rax, 1"));
    }

    #[test]
    fn set_cc_and_jmp_cc_carry_their_condition_in_the_mnemonic() {
        let mut stream = Stream::new();
        stream.append(
            AsmOpcode::SetCc(kefir_asmcmp::ConditionCode::Equal),
            Some(OperandWidth::Byte),
            [Some(Operand::Physical(PhysicalRegister::Gpr(GeneralPurposeRegister::Rax))), None, None],
            None,
        );
        stream.append(
            AsmOpcode::JmpCc(kefir_asmcmp::ConditionCode::GreaterEqual),
            None,
            [Some(Operand::Label(kefir_asmcmp::LabelTarget::Internal(kefir_entity::EntityRef::new(3)))), None, None],
            None,
        );
        let frame = StackFrame::new();

        let text = emit(&stream, &frame, "f", Syntax::AttPrefix);
        assert!(text.contains("sete %al"));
        assert!(text.contains("jge .L3"));
    }

    #[test]
    fn internal_label_is_emitted_once_as_a_dot_l_line() {
        let mut stream = Stream::new();
        stream.append(AsmOpcode::Nop, None, [None, None, None], Some(kefir_asmcmp::LabelTarget::Internal(kefir_entity::EntityRef::new(0))));
        stream.append(AsmOpcode::Ret, None, [None, None, None], None);
        let frame = StackFrame::new();

        let text = emit(&stream, &frame, "f", Syntax::AttPrefix);
        assert_eq!(text.matches(".L0:").count(), 1);
    }

    #[test]
    fn memory_operand_is_frame_relative() {
        let mem = MemoryRef { base: None, index: None, disp: -16, rip_relative: false };
        assert_eq!(memory_text(&mem, Syntax::AttPrefix), "-16(%rbp)");
        assert_eq!(memory_text(&mem, Syntax::IntelNoPrefix), "[rbp-16]");
    }
}
