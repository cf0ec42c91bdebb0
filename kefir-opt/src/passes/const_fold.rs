//! Constant folding: an instruction all of whose value operands are constants
//! is replaced by a single constant carrying the computed result.
//!
//! Folds cover scalar int unary/binary/compare, bitfield extract, and the
//! full `BitInt` family (unary, binary, compare, and the signed/unsigned/float
//! conversions). An instruction whose operation has no well-defined result for
//! the given constants (division by zero, a shift past the operand width) is
//! left alone rather than folded to garbage.

use super::{Pass, PassConfig};
use kefir_ir::bigint::{BigIntId, BigIntValue};
use kefir_ir::function::{
    BinaryOp, BitIntBinaryOp, BitIntCompareKind, BitIntUnaryOp, CompareKind, FloatWidth, Function,
    InstData, IntWidth, UnaryOp, Value,
};
use kefir_ir::module::Module;
use kefir_ir::Result;
use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive, Zero};

pub struct ConstantFold;

impl Pass for ConstantFold {
    fn name(&self) -> &'static str {
        "constant-fold"
    }

    fn apply(&self, module: &mut Module, function: &mut Function, _config: &PassConfig) -> Result<()> {
        // Collect first: `fold` only reads `function`, but applying a fold
        // mutates it, and we must not fold an instruction using operands that
        // a fold earlier in this same pass already replaced out from under us.
        let candidates: Vec<Value> = function.all_insts().collect();
        for inst in candidates {
            if function.is_phi(inst) || !function.is_inserted(inst) {
                continue;
            }
            let Ok(data) = function.inst_data(inst) else { continue };
            if let Some(folded) = fold(module, function, data) {
                function.fold_instruction(inst, folded);
            }
        }
        Ok(())
    }
}

fn fold(module: &mut Module, function: &Function, data: &InstData) -> Option<InstData> {
    match data {
        InstData::Unary { op, width, arg } => {
            let (_, bits) = scalar_bits(function, *arg)?;
            fold_unary(*op, *width, bits)
        }
        InstData::Binary { op, width, signed, lhs, rhs } => {
            let (_, lb) = scalar_bits(function, *lhs)?;
            let (_, rb) = scalar_bits(function, *rhs)?;
            let value = fold_binary(*op, *width, *signed, lb, rb)?;
            Some(InstData::IntConst { width: *width, value: value as i64 })
        }
        InstData::Compare { kind, lhs, rhs } => fold_compare(function, *kind, *lhs, *rhs),
        InstData::BitfieldExtract { signed, arg, offset, length } => {
            let (_, bits) = scalar_bits(function, *arg)?;
            fold_bitfield_extract(*signed, bits, *offset, *length)
        }
        InstData::BitIntUnary { op, bits, arg } => fold_bitint_unary_dispatch(module, function, *op, *bits, *arg),
        InstData::BitIntBinary { op, bits, signed, lhs, rhs } => {
            let (_, _, lid) = bitint_bits(function, *lhs)?;
            let (_, _, rid) = bitint_bits(function, *rhs)?;
            let l = module.bigints.get(lid).clone();
            let r = module.bigints.get(rid).clone();
            let result = fold_bitint_binary(*op, *bits, *signed, &l, &r)?;
            let id = module.bigints.intern_signed(result, *bits);
            Some(InstData::BitIntSignedConst { bits: *bits, value: id })
        }
        InstData::BitIntCompare { kind, lhs, rhs, .. } => {
            let (_, _, lid) = bitint_bits(function, *lhs)?;
            let (_, _, rid) = bitint_bits(function, *rhs)?;
            let l = module.bigints.get(lid);
            let r = module.bigints.get(rid);
            let result = fold_bitint_compare(*kind, l, r);
            Some(InstData::IntConst { width: IntWidth::W8, value: result as i64 })
        }
        _ => None,
    }
}

fn scalar_bits(function: &Function, v: Value) -> Option<(IntWidth, u64)> {
    match function.inst_data(v).ok()? {
        InstData::IntConst { width, value } => Some((*width, (*value as u64) & width.mask())),
        InstData::UintConst { width, value } => Some((*width, *value & width.mask())),
        _ => None,
    }
}

fn float_bits(function: &Function, v: Value) -> Option<(FloatWidth, f64)> {
    match function.inst_data(v).ok()? {
        InstData::FloatConst { width, value } => Some((*width, *value)),
        _ => None,
    }
}

fn bitint_bits(function: &Function, v: Value) -> Option<(u32, bool, BigIntId)> {
    match function.inst_data(v).ok()? {
        InstData::BitIntSignedConst { bits, value } => Some((*bits, true, *value)),
        InstData::BitIntUnsignedConst { bits, value } => Some((*bits, false, *value)),
        _ => None,
    }
}

/// Sign-extend the low `width.bits()` bits of `bits` to a full `i64`.
fn sign_extend(width: IntWidth, bits: u64) -> i64 {
    let shift = 64 - width.bits();
    ((bits << shift) as i64) >> shift
}

fn fold_unary(op: UnaryOp, width: IntWidth, bits: u64) -> Option<InstData> {
    let mask = width.mask();
    match op {
        UnaryOp::Neg => Some(InstData::IntConst { width, value: (bits.wrapping_neg() & mask) as i64 }),
        UnaryOp::BitNot => Some(InstData::IntConst { width, value: (!bits & mask) as i64 }),
        UnaryOp::BoolNot => {
            let value = if bits & mask == 0 { 1 } else { 0 };
            Some(InstData::IntConst { width, value })
        }
        UnaryOp::Extend { signed } => {
            let value = if signed { sign_extend(width, bits) } else { (bits & mask) as i64 };
            Some(InstData::IntConst { width: IntWidth::W64, value })
        }
    }
}

fn fold_binary(op: BinaryOp, width: IntWidth, signed: bool, lb: u64, rb: u64) -> Option<u64> {
    let mask = width.mask();
    let bits_n = width.bits();
    let (lb, rb) = (lb & mask, rb & mask);
    match op {
        BinaryOp::Add => Some(lb.wrapping_add(rb) & mask),
        BinaryOp::Sub => Some(lb.wrapping_sub(rb) & mask),
        BinaryOp::Mul => Some(lb.wrapping_mul(rb) & mask),
        BinaryOp::Div | BinaryOp::Mod => {
            if rb == 0 {
                return None;
            }
            if signed {
                let l = sign_extend(width, lb);
                let r = sign_extend(width, rb);
                let min = if bits_n == 64 { i64::MIN } else { -(1i64 << (bits_n - 1)) };
                if l == min && r == -1 {
                    // Overflow: `INT_MIN / -1` has no representable result.
                    return None;
                }
                let result = if matches!(op, BinaryOp::Div) { l.wrapping_div(r) } else { l.wrapping_rem(r) };
                Some((result as u64) & mask)
            } else {
                let result = if matches!(op, BinaryOp::Div) { lb / rb } else { lb % rb };
                Some(result & mask)
            }
        }
        BinaryOp::And => Some(lb & rb),
        BinaryOp::Or => Some(lb | rb),
        BinaryOp::Xor => Some(lb ^ rb),
        BinaryOp::Lshift => {
            if rb >= bits_n as u64 {
                return None;
            }
            Some((lb << rb) & mask)
        }
        BinaryOp::RshiftLogical => {
            if rb >= bits_n as u64 {
                return None;
            }
            Some(lb >> rb)
        }
        BinaryOp::RshiftArith => {
            if rb >= bits_n as u64 {
                return None;
            }
            let l = sign_extend(width, lb);
            Some(((l >> rb) as u64) & mask)
        }
    }
}

fn fold_compare(function: &Function, kind: CompareKind, lhs: Value, rhs: Value) -> Option<InstData> {
    let result = if kind.is_float() {
        let (_, l) = float_bits(function, lhs)?;
        let (_, r) = float_bits(function, rhs)?;
        fold_float_compare(kind, l, r)
    } else {
        let (width, lb) = scalar_bits(function, lhs)?;
        let (_, rb) = scalar_bits(function, rhs)?;
        fold_int_compare(kind, width, lb, rb)?
    };
    Some(InstData::IntConst { width: IntWidth::W8, value: result as i64 })
}

fn fold_int_compare(kind: CompareKind, width: IntWidth, lb: u64, rb: u64) -> Option<bool> {
    let mask = width.mask();
    let (lb, rb) = (lb & mask, rb & mask);
    Some(match kind {
        CompareKind::IntEqual => lb == rb,
        CompareKind::IntNotEqual => lb != rb,
        CompareKind::IntSignedLess => sign_extend(width, lb) < sign_extend(width, rb),
        CompareKind::IntSignedLessOrEqual => sign_extend(width, lb) <= sign_extend(width, rb),
        CompareKind::IntSignedGreater => sign_extend(width, lb) > sign_extend(width, rb),
        CompareKind::IntSignedGreaterOrEqual => sign_extend(width, lb) >= sign_extend(width, rb),
        CompareKind::IntUnsignedLess => lb < rb,
        CompareKind::IntUnsignedLessOrEqual => lb <= rb,
        CompareKind::IntUnsignedGreater => lb > rb,
        CompareKind::IntUnsignedGreaterOrEqual => lb >= rb,
        _ => return None,
    })
}

fn fold_float_compare(kind: CompareKind, l: f64, r: f64) -> bool {
    let has_nan = l.is_nan() || r.is_nan();
    match kind {
        CompareKind::FloatOrdered => !has_nan,
        CompareKind::FloatUnordered => has_nan,
        _ if has_nan => kind.unordered_is_true(),
        CompareKind::FloatOrderedEqual | CompareKind::FloatUnorderedEqual => l == r,
        CompareKind::FloatOrderedNotEqual | CompareKind::FloatUnorderedNotEqual => l != r,
        CompareKind::FloatOrderedLess | CompareKind::FloatUnorderedLess => l < r,
        CompareKind::FloatOrderedLessOrEqual | CompareKind::FloatUnorderedLessOrEqual => l <= r,
        CompareKind::FloatOrderedGreater | CompareKind::FloatUnorderedGreater => l > r,
        CompareKind::FloatOrderedGreaterOrEqual | CompareKind::FloatUnorderedGreaterOrEqual => l >= r,
        _ => false,
    }
}

fn width_for_bits(length: u32) -> IntWidth {
    if length <= 8 {
        IntWidth::W8
    } else if length <= 16 {
        IntWidth::W16
    } else if length <= 32 {
        IntWidth::W32
    } else {
        IntWidth::W64
    }
}

fn fold_bitfield_extract(signed: bool, bits: u64, offset: u32, length: u32) -> Option<InstData> {
    if length == 0 || length > 64 || offset + length > 64 {
        return None;
    }
    let field_mask = if length == 64 { u64::MAX } else { (1u64 << length) - 1 };
    let extracted = (bits >> offset) & field_mask;
    let width = width_for_bits(length);
    if signed {
        let shift = 64 - length;
        let value = ((extracted << shift) as i64) >> shift;
        Some(InstData::IntConst { width, value: value & width.mask() as i64 })
    } else {
        Some(InstData::UintConst { width, value: extracted & width.mask() })
    }
}

fn shift_amount(amount: &BigInt, bits: u32) -> Option<u32> {
    let v = amount.to_u32()?;
    if v >= bits {
        None
    } else {
        Some(v)
    }
}

fn fold_bitint_binary(op: BitIntBinaryOp, bits: u32, signed: bool, lhs: &BigIntValue, rhs: &BigIntValue) -> Option<BigInt> {
    match op {
        BitIntBinaryOp::Add => Some(lhs.to_signed() + rhs.to_signed()),
        BitIntBinaryOp::Sub => Some(lhs.to_signed() - rhs.to_signed()),
        BitIntBinaryOp::Mul => Some(lhs.to_signed() * rhs.to_signed()),
        BitIntBinaryOp::Div | BitIntBinaryOp::Mod => {
            let (a, b) =
                if signed { (lhs.to_signed(), rhs.to_signed()) } else { (lhs.to_unsigned(), rhs.to_unsigned()) };
            if b.is_zero() {
                return None;
            }
            Some(if matches!(op, BitIntBinaryOp::Div) { a / b } else { a % b })
        }
        BitIntBinaryOp::And => Some(lhs.to_signed() & rhs.to_signed()),
        BitIntBinaryOp::Or => Some(lhs.to_signed() | rhs.to_signed()),
        BitIntBinaryOp::Xor => Some(lhs.to_signed() ^ rhs.to_signed()),
        BitIntBinaryOp::Lshift => {
            let amt = shift_amount(&rhs.to_unsigned(), bits)?;
            Some(lhs.to_signed() << amt)
        }
        BitIntBinaryOp::Rshift => {
            let amt = shift_amount(&rhs.to_unsigned(), bits)?;
            Some(lhs.to_unsigned() >> amt)
        }
        BitIntBinaryOp::Arshift => {
            let amt = shift_amount(&rhs.to_unsigned(), bits)?;
            Some(lhs.to_signed() >> amt)
        }
    }
}

fn fold_bitint_compare(kind: BitIntCompareKind, lhs: &BigIntValue, rhs: &BigIntValue) -> bool {
    match kind {
        BitIntCompareKind::Equal => lhs.to_signed() == rhs.to_signed(),
        BitIntCompareKind::SignedGreater => lhs.to_signed() > rhs.to_signed(),
        BitIntCompareKind::SignedLess => lhs.to_signed() < rhs.to_signed(),
        BitIntCompareKind::UnsignedGreater => lhs.to_unsigned() > rhs.to_unsigned(),
        BitIntCompareKind::UnsignedLess => lhs.to_unsigned() < rhs.to_unsigned(),
    }
}

/// Dispatches a `BitIntUnary` before fetching its operand's representation:
/// most variants read a `BitInt`-typed `arg`, but `FromSigned`/`FromUnsigned`
/// read a plain scalar constant and `FromFloat` reads a `FloatConst`, so each
/// needs its own accessor rather than `bitint_bits`.
fn fold_bitint_unary_dispatch(
    module: &mut Module,
    function: &Function,
    op: BitIntUnaryOp,
    bits: u32,
    arg: Value,
) -> Option<InstData> {
    match op {
        BitIntUnaryOp::FromSigned { to_bits } => {
            let (width, raw) = scalar_bits(function, arg)?;
            let value = BigInt::from(sign_extend(width, raw));
            let id = module.bigints.intern_signed(value, to_bits);
            Some(InstData::BitIntSignedConst { bits: to_bits, value: id })
        }
        BitIntUnaryOp::FromUnsigned { to_bits } => {
            let (_, raw) = scalar_bits(function, arg)?;
            let id = module.bigints.intern_unsigned(BigInt::from(raw), to_bits);
            Some(InstData::BitIntUnsignedConst { bits: to_bits, value: id })
        }
        BitIntUnaryOp::FromFloat(_) => {
            let (_, f) = float_bits(function, arg)?;
            let value = BigInt::from_f64(f.trunc())?;
            let id = module.bigints.intern_signed(value, bits);
            Some(InstData::BitIntSignedConst { bits, value: id })
        }
        _ => {
            let (_, _, id) = bitint_bits(function, arg)?;
            let value = module.bigints.get(id).clone();
            fold_bitint_unary(module, op, bits, &value)
        }
    }
}

fn fold_bitint_unary(module: &mut Module, op: BitIntUnaryOp, bits: u32, value: &BigIntValue) -> Option<InstData> {
    match op {
        BitIntUnaryOp::Invert => {
            let inverted = !value.to_signed();
            let id = module.bigints.intern_signed(inverted, bits);
            Some(InstData::BitIntSignedConst { bits, value: id })
        }
        BitIntUnaryOp::Negate => {
            let negated = -value.to_signed();
            let id = module.bigints.intern_signed(negated, bits);
            Some(InstData::BitIntSignedConst { bits, value: id })
        }
        BitIntUnaryOp::BoolNot => {
            let result = value.is_zero() as i64;
            Some(InstData::IntConst { width: IntWidth::W8, value: result })
        }
        BitIntUnaryOp::ToBool => {
            let result = (!value.is_zero()) as i64;
            Some(InstData::IntConst { width: IntWidth::W8, value: result })
        }
        BitIntUnaryOp::Cast { to_bits, to_signed } => {
            let id = if to_signed {
                module.bigints.intern_signed(value.to_signed(), to_bits)
            } else {
                module.bigints.intern_unsigned(value.to_unsigned(), to_bits)
            };
            Some(if to_signed {
                InstData::BitIntSignedConst { bits: to_bits, value: id }
            } else {
                InstData::BitIntUnsignedConst { bits: to_bits, value: id }
            })
        }
        BitIntUnaryOp::ToSigned { to_bits } | BitIntUnaryOp::ToUnsigned { to_bits } => {
            if to_bits > 64 {
                return None;
            }
            let width = width_for_bits(to_bits);
            let signed_result = matches!(op, BitIntUnaryOp::ToSigned { .. });
            let numeric = if signed_result { value.to_signed() } else { value.to_unsigned() };
            let bits64 = numeric.to_i64()?;
            Some(InstData::IntConst { width, value: bits64 & width.mask() as i64 })
        }
        BitIntUnaryOp::ToFloat(width) => {
            let f = value.to_signed().to_f64()?;
            Some(InstData::FloatConst { width, value: f })
        }
        BitIntUnaryOp::FromSigned { .. } | BitIntUnaryOp::FromUnsigned { .. } | BitIntUnaryOp::FromFloat(_) => {
            // Routed through `fold_bitint_unary_dispatch` before reaching
            // here, since they read a scalar/float operand rather than a
            // `BitInt` one; unreachable in practice, kept for exhaustiveness.
            None
        }
    }
}
