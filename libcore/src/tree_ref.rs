//! Stable references into a pool.
//!
//! A [`Node`](crate::node::Node) dies at the first mutation; a [`TreeRef`]
//! survives them. It names a slot in the pool's reference table, and every
//! block motion keeps the slot's offset current. Slots carry a generation
//! counter so a handle whose tree is gone resolves to `None` instead of to
//! whatever tree later occupies the slot.
//!
//! A handle may carry a re-initializer: a function that can rebuild the
//! tree from scratch. Resolving such a handle after its tree was evicted
//! or unwound reconstructs it transparently, which is how long-lived
//! trees (stored variables, last results) survive aggressive pool
//! housekeeping.

use crate::pool::{Pool, PoolError};

/// Rebuilds a tree at the pool cursor, returning its offset.
pub type Rebuild = fn(&mut Pool) -> Result<usize, PoolError>;

#[derive(Clone)]
pub struct TreeRef {
    slot: usize,
    generation: u32,
    rebuild: Option<Rebuild>,
}

impl TreeRef {
    pub fn has_rebuild(&self) -> bool {
        self.rebuild.is_some()
    }
}

struct Slot {
    offset: usize,
    generation: u32,
    live: bool,
}

pub(crate) struct RefTable {
    slots: Vec<Slot>,
    next_victim: usize,
}

impl RefTable {
    pub(crate) fn new(capacity: usize) -> RefTable {
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(Slot {
                offset: 0,
                generation: 0,
                live: false,
            });
        }
        RefTable {
            slots,
            next_victim: 0,
        }
    }

    /// Claim a slot for `offset`. A dead slot is reused when one exists;
    /// otherwise the round-robin victim is evicted, stranding its handle.
    fn bind(&mut self, offset: usize) -> (usize, u32) {
        let index = match self.slots.iter().position(|slot| !slot.live) {
            Some(index) => index,
            None => {
                let victim = self.next_victim;
                self.next_victim = (self.next_victim + 1) % self.slots.len();
                victim
            }
        };
        let slot = &mut self.slots[index];
        slot.generation += 1;
        slot.offset = offset;
        slot.live = true;
        (index, slot.generation)
    }

    fn offset_of(&self, index: usize, generation: u32) -> Option<usize> {
        let slot = self.slots.get(index)?;
        if slot.live && slot.generation == generation {
            Some(slot.offset)
        } else {
            None
        }
    }

    fn kill(&mut self, index: usize, generation: u32) {
        if let Some(slot) = self.slots.get_mut(index) {
            if slot.live && slot.generation == generation {
                slot.live = false;
                slot.generation += 1;
            }
        }
    }

    /// Apply a block motion to every live slot.
    pub(crate) fn remap<F: Fn(usize) -> usize>(&mut self, f: &F) {
        for slot in self.slots.iter_mut() {
            if slot.live {
                slot.offset = f(slot.offset);
            }
        }
    }

    /// Strand every slot pointing at or past `size`.
    pub(crate) fn invalidate_from(&mut self, size: usize) {
        for slot in self.slots.iter_mut() {
            if slot.live && slot.offset >= size {
                slot.live = false;
                slot.generation += 1;
            }
        }
    }
}

impl Pool {
    /// A stable handle to the tree at `offset`.
    pub fn bind(&mut self, offset: usize) -> TreeRef {
        debug_assert!(offset < self.size());
        let (slot, generation) = self.refs.bind(offset);
        TreeRef {
            slot,
            generation,
            rebuild: None,
        }
    }

    /// A stable handle that can resurrect its tree after invalidation.
    pub fn bind_with(&mut self, offset: usize, rebuild: Rebuild) -> TreeRef {
        let mut reference = self.bind(offset);
        reference.rebuild = Some(rebuild);
        reference
    }

    /// Current offset of the referenced tree, `None` once stranded.
    pub fn resolve(&self, reference: &TreeRef) -> Option<usize> {
        self.refs.offset_of(reference.slot, reference.generation)
    }

    /// Like [`Pool::resolve`], but a stranded handle with a re-initializer
    /// rebuilds its tree and re-binds in place. `Ok(None)` means stranded
    /// for good.
    pub fn resolve_or_rebuild(
        &mut self,
        reference: &mut TreeRef,
    ) -> Result<Option<usize>, PoolError> {
        if let Some(offset) = self.resolve(reference) {
            return Ok(Some(offset));
        }
        let rebuild = match reference.rebuild {
            Some(rebuild) => rebuild,
            None => return Ok(None),
        };
        let offset = rebuild(self)?;
        let (slot, generation) = self.refs.bind(offset);
        reference.slot = slot;
        reference.generation = generation;
        Ok(Some(offset))
    }

    /// Give the slot back. Resolving the handle afterwards yields `None`;
    /// the tree itself stays in the pool.
    pub fn release(&mut self, reference: TreeRef) {
        self.refs.kill(reference.slot, reference.generation);
    }
}
