#![forbid(unsafe_code)]

//! Per-batch description of how a collection changed.
//!
//! An [`IndexMap`] has one [`Slot`] per element of the collection *after* the
//! batch. `Slot::Existing(i)` means the element was at index `i` before the
//! batch; `Slot::Inserted` means it is new. Indices that held an element
//! before the batch and no longer do are listed in
//! [`deleted`](IndexMap::deleted), sorted and unique.
//!
//! # Invariants
//!
//! 1. `slots().len()` equals the collection length after the batch.
//! 2. Every pre-batch index appears exactly once, either in an `Existing`
//!    slot or in `deleted()`.
//! 3. An element inserted and removed within the same batch leaves no trace.
//! 4. Replacing an element in place reports the old index as deleted and the
//!    slot as inserted.

use crate::value::Value;

/// Origin of one post-batch element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// The element was at this index before the batch.
    Existing(usize),
    /// The element was added during the batch.
    Inserted,
}

/// Mutation record delivered to collection subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexMap {
    slots: Vec<Slot>,
    deleted: Vec<usize>,
    keys: Vec<Value>,
}

impl IndexMap {
    /// Map describing an unchanged collection of `len` elements.
    #[must_use]
    pub fn identity(len: usize) -> Self {
        Self {
            slots: (0..len).map(Slot::Existing).collect(),
            deleted: Vec::new(),
            keys: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Slot> {
        self.slots.get(index).copied()
    }

    /// Pre-batch indices whose elements are gone, ascending.
    #[must_use]
    pub fn deleted(&self) -> &[usize] {
        &self.deleted
    }

    /// Keys touched by map/set mutations in this batch, in first-touch order.
    #[must_use]
    pub fn keys(&self) -> &[Value] {
        &self.keys
    }

    /// Post-batch positions holding new elements.
    pub fn inserted(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| **slot == Slot::Inserted)
            .map(|(index, _)| index)
    }

    /// Whether the batch left every element where it was.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.deleted.is_empty()
            && self
                .slots
                .iter()
                .enumerate()
                .all(|(index, slot)| *slot == Slot::Existing(index))
    }

    fn record_deleted(&mut self, slot: Slot) {
        if let Slot::Existing(index) = slot {
            if let Err(position) = self.deleted.binary_search(&index) {
                self.deleted.insert(position, index);
            }
        }
    }

    pub(crate) fn record_key(&mut self, key: &Value) {
        if !self.keys.contains(key) {
            self.keys.push(key.clone());
        }
    }

    /// Mirror `Vec::splice(start..start + delete_count, insert_count items)`.
    pub(crate) fn splice(&mut self, start: usize, delete_count: usize, insert_count: usize) {
        let removed: Vec<Slot> = self
            .slots
            .splice(
                start..start + delete_count,
                std::iter::repeat_n(Slot::Inserted, insert_count),
            )
            .collect();
        for slot in removed {
            self.record_deleted(slot);
        }
    }

    pub(crate) fn push_inserted(&mut self, count: usize) {
        let len = self.slots.len();
        self.splice(len, 0, count);
    }

    /// Mark `index` as replaced in place.
    pub(crate) fn replace(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            let old = std::mem::replace(slot, Slot::Inserted);
            self.record_deleted(old);
        }
    }

    /// Reorder so that new position `i` takes the slot at `order[i]`.
    pub(crate) fn permute(&mut self, order: &[usize]) {
        debug_assert_eq!(order.len(), self.slots.len());
        self.slots = order.iter().map(|&from| self.slots[from]).collect();
    }

    /// Return the accumulated map and start a fresh identity map.
    pub(crate) fn take(&mut self) -> Self {
        let len = self.slots.len();
        std::mem::replace(self, Self::identity(len))
    }
}
