//! Register stashes: the set of physical registers a call instruction needs
//! saved across it, recorded against the liveness index the scheduler
//! assigns the call. The allocator consults the stash when deciding which
//! caller-saved registers must be spilled rather than left live through a
//! call.

use crate::physical::PhysicalRegister;
use kefir_entity::{entity_impl, PrimaryMap};
use smallvec::SmallVec;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Stash(u32);
entity_impl!(Stash, "stash");

#[derive(Clone, Debug, Default)]
pub struct StashData {
    /// Liveness index of the call this stash is attached to, as computed by
    /// `kefir-opt`'s scheduler; `None` until the scheduler has run.
    pub liveness_index: Option<u32>,
    pub registers: SmallVec<[PhysicalRegister; 8]>,
}

#[derive(Debug, Default)]
pub struct StashPool {
    stashes: PrimaryMap<Stash, StashData>,
}

impl StashPool {
    pub fn new() -> Self {
        Self { stashes: PrimaryMap::new() }
    }

    pub fn create(&mut self, liveness_index: Option<u32>) -> Stash {
        self.stashes.push(StashData { liveness_index, registers: SmallVec::new() })
    }

    pub fn add_register(&mut self, stash: Stash, reg: PhysicalRegister) {
        let data = self.stashes.get_mut(stash).expect("dangling Stash");
        if !data.registers.contains(&reg) {
            data.registers.push(reg);
        }
    }

    pub fn registers(&self, stash: Stash) -> &[PhysicalRegister] {
        &self.stashes.get(stash).expect("dangling Stash").registers
    }

    pub fn liveness_index(&self, stash: Stash) -> Option<u32> {
        self.stashes.get(stash).expect("dangling Stash").liveness_index
    }

    /// Bind a stash to the call it protects, once the call instruction has
    /// actually been appended to the stream and its position is known.
    pub fn set_liveness_index(&mut self, stash: Stash, liveness_index: u32) {
        self.stashes.get_mut(stash).expect("dangling Stash").liveness_index = Some(liveness_index);
    }

    pub fn iter(&self) -> impl Iterator<Item = Stash> + '_ {
        self.stashes.keys()
    }
}
