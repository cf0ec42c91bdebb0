//! Arena-owned arbitrary-width integers backing `_BitInt(N)` constants.
//!
//! The IR never stores a `BitInt` value inline in an instruction — instructions
//! are small, fixed-size, and copyable, while a `_BitInt(8192)` constant is not.
//! Instead a `BITINT_*_CONST` instruction carries a `BigIntId` indexing into the
//! module-owned `BigIntPool`, which is append-only for the lifetime of a
//! compilation (constant folding interns new values as it computes them, it
//! never mutates one in place, since existing ids may still be referenced by
//! other instructions or by a not-yet-rewritten use).

use kefir_entity::{entity_impl, PrimaryMap};
use num_bigint::{BigInt, Sign};
use num_traits::{One, Zero};
use std::ops::Rem;

/// A reference to an interned arbitrary-width integer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BigIntId(u32);
entity_impl!(BigIntId, "bigint");

/// An interned value: its two's-complement bit pattern truncated to `width`
/// bits, plus the width itself (needed because e.g. `BitInt<8>` and
/// `BitInt<16>` holding the numeric value 3 are distinct constants).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigIntValue {
    /// Canonical signed representation: the bit pattern reduced modulo 2^width
    /// and mapped back into the signed range `[-2^(width-1), 2^(width-1))`.
    signed: BigInt,
    width: u32,
}

impl BigIntValue {
    pub fn width(&self) -> u32 {
        self.width
    }

    /// The value interpreted as a signed two's-complement integer.
    pub fn to_signed(&self) -> BigInt {
        self.signed.clone()
    }

    /// The value interpreted as an unsigned integer (same bit pattern).
    pub fn to_unsigned(&self) -> BigInt {
        if self.signed.sign() == Sign::Minus {
            self.signed.clone() + (BigInt::one() << self.width)
        } else {
            self.signed.clone()
        }
    }

    pub fn is_zero(&self) -> bool {
        self.signed.is_zero()
    }
}

/// The arena owning every interned `BitInt` value for one IR module.
#[derive(Debug, Default)]
pub struct BigIntPool {
    values: PrimaryMap<BigIntId, BigIntValue>,
}

impl BigIntPool {
    pub fn new() -> Self {
        Self { values: PrimaryMap::new() }
    }

    pub fn get(&self, id: BigIntId) -> &BigIntValue {
        self.values.get(id).expect("dangling BigIntId")
    }

    /// Intern a signed value, truncating/sign-extending it to `width` bits first.
    pub fn intern_signed(&mut self, value: BigInt, width: u32) -> BigIntId {
        let canon = canonicalize_signed(value, width);
        self.values.push(BigIntValue { signed: canon, width })
    }

    /// Intern a value given by its unsigned bit pattern.
    pub fn intern_unsigned(&mut self, value: BigInt, width: u32) -> BigIntId {
        let canon = canonicalize_signed(value, width);
        self.values.push(BigIntValue { signed: canon, width })
    }
}

/// Reduce `value` modulo 2^width and map the result into the signed range.
/// This is the single source of truth for BitInt wraparound semantics used by
/// both literal construction and constant folding.
fn canonicalize_signed(value: BigInt, width: u32) -> BigInt {
    assert!(width > 0, "BitInt width must be positive");
    let modulus = BigInt::one() << width;
    let mut reduced = value.rem(&modulus);
    if reduced.sign() == Sign::Minus {
        reduced += &modulus;
    }
    let half = BigInt::one() << (width - 1);
    if reduced >= half {
        reduced -= modulus;
    }
    reduced
}
