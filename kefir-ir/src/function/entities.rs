//! Entity references scoped to a single function body.

use kefir_entity::entity_impl;

/// A basic block.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// An instruction. Every instruction that produces a result is also a `Value`
/// other instructions can consume — there is no separate value numbering, the
/// instruction's own id *is* its result reference, mirroring how a φ-node's
/// `output_ref` is "consumed like any other id".
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Inst(u32);
entity_impl!(Inst, "v");

/// An SSA value: the result of some instruction (possibly a φ-node).
pub type Value = Inst;

/// A local (stack) variable slot, as seen by `mem2reg` before it is promoted
/// away.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalVar(u32);
entity_impl!(LocalVar, "local");
