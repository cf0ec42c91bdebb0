//! A compact `Option<EntityRef>` that costs no more than the entity itself.
//!
//! Ordinary `Option<T>` doubles the size of a 32-bit entity reference because of
//! the discriminant. Arenas store millions of these (every instruction operand is
//! `PackedOption<Value>`), so we reserve one value of the underlying `u32` space
//! (`u32::MAX`) to mean "none" instead.

use crate::EntityRef;
use core::fmt;

/// A value that can designate a distinguished "reserved" bit pattern standing in
/// for `None`.
pub trait ReservedValue {
    /// The reserved value, used by `PackedOption` to mean "no entity".
    fn reserved_value() -> Self;

    /// Check if `self` is the reserved value.
    fn is_reserved_value(&self) -> bool;
}

/// Memory-efficient `Option<T>` for entity references.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackedOption<T: ReservedValue>(T);

impl<T: ReservedValue> PackedOption<T> {
    /// Returns `true` if this is a `None` value.
    pub fn is_none(&self) -> bool {
        self.0.is_reserved_value()
    }

    /// Returns `true` if this is a `Some` value.
    pub fn is_some(&self) -> bool {
        !self.is_none()
    }

    /// Convert to a plain `Option`.
    pub fn expand(self) -> Option<T> {
        if self.is_none() {
            None
        } else {
            Some(self.0)
        }
    }

    /// Unwrap, panicking if this is `None`.
    pub fn unwrap(self) -> T {
        self.expand().expect("PackedOption is None")
    }
}

impl<T: ReservedValue> Default for PackedOption<T> {
    fn default() -> Self {
        Self(T::reserved_value())
    }
}

impl<T: ReservedValue> From<T> for PackedOption<T> {
    fn from(v: T) -> Self {
        debug_assert!(!v.is_reserved_value(), "value collides with the None sentinel");
        Self(v)
    }
}

impl<T: ReservedValue> From<Option<T>> for PackedOption<T> {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Self::default(),
        }
    }
}

impl<T: ReservedValue + EntityRef + fmt::Debug> fmt::Debug for PackedOption<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.expand() {
            Some(v) => write!(f, "Some({v:?})"),
            None => write!(f, "None"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity_impl;

    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct Id(u32);
    entity_impl!(Id, "id");

    #[test]
    fn none_round_trips() {
        let none: PackedOption<Id> = None.into();
        assert!(none.is_none());
        assert_eq!(none.expand(), None);
    }

    #[test]
    fn some_round_trips() {
        let some: PackedOption<Id> = Some(Id::new(3)).into();
        assert!(some.is_some());
        assert_eq!(some.expand(), Some(Id::new(3)));
    }
}
